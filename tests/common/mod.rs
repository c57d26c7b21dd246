//! Shared test helpers for dossier integration tests.
//!
//! All tests use temp directories; nothing is written under the repo.

#![allow(dead_code)]

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use dossier::config::EvalConfig;
use tempfile::TempDir;

/// Assistant replies that satisfy every rule input on the guidance path.
pub const FLAGGING_REPLIES: [&str; 3] = [
    "That's completely understandable. Losing access to that money right before a move is hard.",
    "Here's a plan:\n1. Send a written demand letter\n2. Check your state's return deadline\n3. Keep copies of everything",
    "Of course. Let me know how it goes, and I can help you draft the next letter.",
];

/// Path to the bundled landlord-tenant scenario.
pub fn bundled_scenario() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("scenarios/landlord_tenant.toml")
}

/// Default config writing runs into `outputs`.
pub fn config_in(outputs: &Path) -> EvalConfig {
    let mut cfg = EvalConfig::default();
    cfg.scenario_path = bundled_scenario();
    cfg.outputs_dir = outputs.to_path_buf();
    cfg
}

/// A fresh temp directory.
pub fn tempdir() -> TempDir {
    TempDir::new().expect("failed to create temp dir")
}

/// Run the `dossier` binary in `dir` with a clean environment.
pub fn dossier_in(dir: &Path, args: &[&str]) -> Output {
    dossier_with_stdin(dir, args, "")
}

/// Run the `dossier` binary with `stdin` piped in.
pub fn dossier_with_stdin(dir: &Path, args: &[&str], stdin: &str) -> Output {
    let mut child = base_command(dir)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to execute dossier");
    child
        .stdin
        .take()
        .expect("stdin piped")
        .write_all(stdin.as_bytes())
        .expect("failed to write stdin");
    child.wait_with_output().expect("failed to wait on dossier")
}

/// Run dossier and assert it succeeds. Returns stdout.
pub fn dossier_ok(dir: &Path, args: &[&str]) -> String {
    let out = dossier_in(dir, args);
    assert_success(&out, args);
    String::from_utf8_lossy(&out.stdout).into_owned()
}

pub fn assert_success(out: &Output, args: &[&str]) {
    assert!(
        out.status.success(),
        "dossier {} failed:\nstdout: {}\nstderr: {}",
        args.join(" "),
        String::from_utf8_lossy(&out.stdout),
        String::from_utf8_lossy(&out.stderr)
    );
}

fn base_command(dir: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_dossier"));
    cmd.current_dir(dir).env("DOSSIER_LOG_FORMAT", "off");
    for var in [
        "DOSSIER_CONFIG",
        "TARGET_MODEL",
        "TEMPERATURE_TARGET",
        "BRANCH_LABEL",
        "JUDGE_MODEL",
        "TEMPERATURE_JUDGE",
        "SCENARIO_PATH",
        "RUST_LOG",
    ] {
        cmd.env_remove(var);
    }
    cmd
}
