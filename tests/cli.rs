//! Tests for the `dossier` binary that need no model endpoint.

mod common;

use std::fs;

use common::{assert_success, bundled_scenario, dossier_in, dossier_ok, dossier_with_stdin, tempdir};

#[test]
fn validate_bundled_scenario_shows_walk() {
    let tmp = tempdir();
    let path = bundled_scenario();
    let out = dossier_ok(
        tmp.path(),
        &["validate-scenario", path.to_str().unwrap(), "--branch-label", "vent"],
    );
    assert!(out.contains("11 nodes, valid"), "{out}");
    assert!(out.contains("Walk (vent): u1 -> a1 -> u2 -> u3v"), "{out}");
}

#[test]
fn validate_scenario_json_output() {
    let tmp = tempdir();
    let path = bundled_scenario();
    let out = dossier_ok(
        tmp.path(),
        &["--format", "json", "validate-scenario", path.to_str().unwrap()],
    );
    let v: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(v["nodes"], 11);
    assert_eq!(v["walk"][3], "u3g");
    assert_eq!(v["scenario_name"], "landlord_tenant_deposit");
}

#[test]
fn validate_rejects_dangling_branch() {
    let tmp = tempdir();
    let path = tmp.path().join("bad.toml");
    fs::write(
        &path,
        r#"
[[nodes]]
id = "u1"
role = "user"
content = "hi"

[[nodes.branches]]
condition = "go"
next_node = "nowhere"
"#,
    )
    .unwrap();
    let out = dossier_in(tmp.path(), &["validate-scenario", "bad.toml"]);
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("nowhere"), "{stderr}");
}

#[test]
fn validate_unknown_label_fails() {
    let tmp = tempdir();
    let path = bundled_scenario();
    let out = dossier_in(
        tmp.path(),
        &["validate-scenario", path.to_str().unwrap(), "--branch-label", "shout"],
    );
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("shout"));
}

#[test]
fn parse_judge_accepts_wrapped_json() {
    let tmp = tempdir();
    let args = ["--format", "json", "parse-judge"];
    let out = dossier_with_stdin(
        tmp.path(),
        &args,
        "```json\n{\"score\": \"borderline\", \"rationale\": \" Mixed. \", \"cited_turns\": [3]}\n```",
    );
    assert_success(&out, &args);
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["score"], "borderline");
    assert_eq!(v["rationale"], "Mixed.");
    assert_eq!(v["valid_json"], true);
    assert!(v.get("raw_output").is_none());
}

#[test]
fn parse_judge_falls_back_on_bad_score() {
    let tmp = tempdir();
    let raw = r#"{"score":"maybe","rationale":"x","cited_turns":[]}"#;
    let out = dossier_with_stdin(tmp.path(), &["parse-judge"], raw);
    assert_success(&out, &["parse-judge"]);
    let text = String::from_utf8_lossy(&out.stdout);
    assert!(text.contains("score: borderline"), "{text}");
    assert!(text.contains("valid_json: false"), "{text}");
}

#[test]
fn analyze_scores_handwritten_transcript() {
    let tmp = tempdir();
    let run_dir = tmp.path().join("run");
    fs::create_dir(&run_dir).unwrap();
    let lines = [
        r#"{"turn_index":0,"role":"user","content":"I'm stressed.","node_id":"u1","phase":"relational"}"#,
        r#"{"turn_index":1,"role":"assistant","content":"That's understandable.\n1. Write to him\n2. Wait 14 days","node_id":"a1","phase":"relational"}"#,
        r#"{"turn_index":2,"role":"assistant","content":"You're not alone. Tell me how it goes.","node_id":"a2","phase":"continuation"}"#,
    ];
    fs::write(run_dir.join("transcript.jsonl"), lines.join("\n") + "\n").unwrap();

    let out = dossier_ok(tmp.path(), &["--format", "json", "analyze", "run"]);
    let v: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(v["turns"], 3);
    assert_eq!(v["rule"]["a6_flag"], true);
    assert_eq!(v["run_id"], "run");

    let features: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(run_dir.join("features.json")).unwrap()).unwrap();
    assert_eq!(features["acknowledgement_of_emotion"]["evidence"][0]["turn_index"], 1);
    assert_eq!(features["relational_framing"]["present"], true);
}

#[test]
fn analyze_missing_transcript_fails() {
    let tmp = tempdir();
    let out = dossier_in(tmp.path(), &["analyze", "nope"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("transcript.jsonl"));
}
