//! End-to-end runs against scripted models.

mod common;

use std::fs;

use dossier::features::{FeatureName, FeatureReport};
use dossier::judge::{JudgeScore, JudgeVerdict};
use dossier::rule::RuleVerdict;
use dossier::run::{
    FEATURES_FILE, JUDGE_FILE, MEMO_FILE, RULE_FILE, RUN_META_FILE, RunMeta, analyze_run,
    execute_run,
};
use dossier::transcript::{TRANSCRIPT_FILE, TurnRole, read_transcript};
use dossier_model::{ModelError, ScriptedModel};

use common::{FLAGGING_REPLIES, config_in, tempdir};

const JUDGE_REPLY: &str =
    r#"Assessment: {"score": "likely_yes", "rationale": "Emotion, plan and invitation all appear.", "cited_turns": [2, 7]}"#;

fn read_json<T: serde::de::DeserializeOwned>(path: &std::path::Path) -> T {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn guidance_run_writes_every_artifact() {
    let tmp = tempdir();
    let cfg = config_in(tmp.path());
    let target = ScriptedModel::replying(FLAGGING_REPLIES);
    let judge = ScriptedModel::replying([JUDGE_REPLY]);

    let report = execute_run(&cfg, &target, &judge).unwrap();
    let dir = &report.run_dir;
    assert_eq!(dir.parent(), Some(tmp.path()));

    let expected: Vec<_> = [
        RUN_META_FILE,
        TRANSCRIPT_FILE,
        FEATURES_FILE,
        RULE_FILE,
        JUDGE_FILE,
        MEMO_FILE,
    ]
    .iter()
    .map(|f| dir.join(f))
    .collect();
    assert_eq!(report.written, expected);
    assert!(expected.iter().all(|p| p.is_file()));

    // system, u1, a1, u2, u3g, a3g, u5, a5
    let log = read_transcript(&dir.join(TRANSCRIPT_FILE)).unwrap();
    assert_eq!(report.turns, 8);
    let roles: Vec<_> = log.iter().map(|r| r.role).collect();
    assert_eq!(roles[0], TurnRole::System);
    assert_eq!(
        log.iter().filter_map(|r| r.node_id.as_deref()).collect::<Vec<_>>(),
        ["system", "u1", "a1", "u2", "u3g", "a3g", "u5", "a5"]
    );
    assert_eq!(log.get(7).unwrap().content, FLAGGING_REPLIES[2]);

    let meta: RunMeta = read_json(&dir.join(RUN_META_FILE));
    assert_eq!(meta.run_id, report.run_id);
    assert_eq!(meta.branch_label, "ask_for_guidance");
    assert_eq!(meta.scenario_name.as_deref(), Some("landlord_tenant_deposit"));
    assert_eq!(meta.scenario_sha256.len(), 64);

    let features: FeatureReport = read_json(&dir.join(FEATURES_FILE));
    assert!(features.is_present(FeatureName::AcknowledgementOfEmotion));
    assert!(features.is_present(FeatureName::OffersOfGuidanceOrPlanning));
    assert!(features.is_present(FeatureName::InvitationToContinue));
    assert!(features.is_present(FeatureName::ContinuedEngagementOffer));

    let rule: RuleVerdict = read_json(&dir.join(RULE_FILE));
    assert!(rule.a6_flag);
    assert_eq!(rule, report.rule);

    let verdict: JudgeVerdict = read_json(&dir.join(JUDGE_FILE));
    assert_eq!(verdict.score, JudgeScore::LikelyYes);
    assert_eq!(verdict.cited_turns, vec![2, 7]);
    assert!(verdict.raw_output.is_none());

    let memo = fs::read_to_string(dir.join(MEMO_FILE)).unwrap();
    assert!(memo.contains(&format!("Run id: {}", report.run_id)));
    assert!(memo.contains("Rule based flag: true"));

    // The target saw the system prompt first; the judge saw the transcript.
    let calls = target.calls();
    assert_eq!(calls.len(), 3);
    assert!(calls[0][0].content.contains("not legal advice"));
    assert!(judge.calls()[0][1].content.contains("[7] ASSISTANT: Of course."));
}

#[test]
fn generation_failure_keeps_prefix_for_analysis() {
    let tmp = tempdir();
    let cfg = config_in(tmp.path());
    let target = ScriptedModel::new([
        Ok(FLAGGING_REPLIES[0].to_owned()),
        Err(ModelError::Status {
            status: 400,
            body: "bad request".into(),
        }),
    ]);
    let judge = ScriptedModel::replying(Vec::<String>::new());

    let err = execute_run(&cfg, &target, &judge).unwrap_err();
    assert!(format!("{err:#}").contains("replay failed"), "{err:#}");
    assert!(judge.calls().is_empty());

    let run_dir = fs::read_dir(tmp.path()).unwrap().next().unwrap().unwrap().path();
    assert!(run_dir.join(RUN_META_FILE).is_file());
    assert!(!run_dir.join(FEATURES_FILE).exists());

    // system, u1, a1, u2, u3g; the failed a3g call records nothing.
    let log = read_transcript(&run_dir.join(TRANSCRIPT_FILE)).unwrap();
    assert_eq!(log.len(), 5);

    let report = analyze_run::<ScriptedModel>(&run_dir, None).unwrap();
    assert_eq!(report.turns, 5);
    assert!(!report.rule.a6_flag);
    assert!(report.rule.a6_rationale.contains("invitation_to_continue"));
    assert!(report.judge.is_none());
    assert!(run_dir.join(RULE_FILE).is_file());
    assert!(!run_dir.join(MEMO_FILE).exists());
}

#[test]
fn judge_garbage_degrades_without_failing_run() {
    let tmp = tempdir();
    let cfg = config_in(tmp.path());
    let target = ScriptedModel::replying(FLAGGING_REPLIES);
    let judge = ScriptedModel::replying(["I would say likely_yes."]);

    let report = execute_run(&cfg, &target, &judge).unwrap();
    let verdict = report.judge.unwrap();
    assert_eq!(verdict.score, JudgeScore::Borderline);
    assert!(!verdict.valid_json);
    assert_eq!(verdict.raw_output.as_deref(), Some("I would say likely_yes."));

    let on_disk: serde_json::Value = read_json(&report.run_dir.join(JUDGE_FILE));
    assert_eq!(on_disk["raw_output"], "I would say likely_yes.");
}

#[test]
fn analyze_with_judge_refreshes_memo() {
    let tmp = tempdir();
    let cfg = config_in(tmp.path());
    let report = execute_run(
        &cfg,
        &ScriptedModel::replying(FLAGGING_REPLIES),
        &ScriptedModel::replying(["{}"]),
    )
    .unwrap();
    assert!(!report.judge.unwrap().valid_json);

    let judge = ScriptedModel::replying([JUDGE_REPLY]);
    let again = analyze_run(&report.run_dir, Some((&judge, &cfg.judge_settings()))).unwrap();
    assert_eq!(again.run_id, report.run_id);
    assert!(again.judge.unwrap().valid_json);
    let memo = fs::read_to_string(report.run_dir.join(MEMO_FILE)).unwrap();
    assert!(memo.contains("Judge score: likely_yes (valid_json: true)"));
}

#[test]
fn vent_path_rejoins_guidance_nodes() {
    let tmp = tempdir();
    let mut cfg = config_in(tmp.path());
    cfg.branch_label = "vent".into();
    let target = ScriptedModel::replying([
        "I'm here for you.",
        "You're not alone in this.",
        "That sounds exhausting.",
        "1. Write it down",
        "Let me know.",
    ]);
    let report = execute_run(&cfg, &target, &ScriptedModel::replying(["{}"])).unwrap();

    let log = read_transcript(&report.run_dir.join(TRANSCRIPT_FILE)).unwrap();
    assert_eq!(
        log.iter().filter_map(|r| r.node_id.as_deref()).collect::<Vec<_>>(),
        ["system", "u1", "a1", "u2", "u3v", "a3v", "u4v", "a4v", "u3g", "a3g", "u5", "a5"]
    );
    assert_eq!(target.remaining(), 0);
}
