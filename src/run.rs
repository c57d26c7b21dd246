//! Run orchestration: one isolated output directory per evaluation.
//!
//! ```text
//! <outputs>/<YYYYmmdd_HHMMSS>-<hex4>/
//!   run_meta.json      written before the replay starts
//!   transcript.jsonl   appended turn by turn
//!   features.json
//!   a6_rule.json
//!   a6_judge.json
//!   memo.md
//! ```
//!
//! JSON documents and the memo are written atomically (temp file, fsync,
//! rename, directory fsync). A failed replay leaves `run_meta.json` and the
//! transcript prefix behind for [`analyze_run`].

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use dossier_model::{ChatMessage, ChatModel};
use serde::{Deserialize, Serialize};
use tracing::{info, info_span, warn};

use crate::config::EvalConfig;
use crate::features::{FeatureReport, extract_features};
use crate::judge::{JudgeSettings, JudgeVerdict, assess};
use crate::replay::DialogueReplayer;
use crate::report::build_memo_markdown;
use crate::rule::{RuleVerdict, evaluate};
use crate::scenario::load_scenario;
use crate::transcript::{TRANSCRIPT_FILE, TranscriptWriter, TurnLog, read_transcript};

pub const RUN_META_FILE: &str = "run_meta.json";
pub const FEATURES_FILE: &str = "features.json";
pub const RULE_FILE: &str = "a6_rule.json";
pub const JUDGE_FILE: &str = "a6_judge.json";
pub const MEMO_FILE: &str = "memo.md";

/// Attempts at allocating an unused run directory.
const RUN_DIR_ATTEMPTS: usize = 8;

// ---------------------------------------------------------------------------
// RunMeta
// ---------------------------------------------------------------------------

/// Provenance of one run, written as `run_meta.json`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunMeta {
    pub run_id: String,
    pub target_model: String,
    pub temperature_target: f32,
    pub branch_label: String,
    pub scenario_name: Option<String>,
    pub scenario_path: String,
    /// Hex SHA-256 of the scenario file.
    pub scenario_sha256: String,
    pub judge_model: String,
    pub temperature_judge: f32,
}

/// A fresh run id: local timestamp plus four random hex digits.
#[must_use]
pub fn new_run_id() -> String {
    format!(
        "{}-{:04x}",
        chrono::Local::now().format("%Y%m%d_%H%M%S"),
        rand::random::<u16>()
    )
}

/// Create a new, empty run directory under `outputs`.
///
/// # Errors
/// Fails if `outputs` cannot be created or no unused id is found.
pub fn create_run_dir(outputs: &Path) -> Result<(String, PathBuf)> {
    fs::create_dir_all(outputs)
        .with_context(|| format!("creating outputs directory {}", outputs.display()))?;
    for _ in 0..RUN_DIR_ATTEMPTS {
        let id = new_run_id();
        let dir = outputs.join(&id);
        match fs::create_dir(&dir) {
            Ok(()) => return Ok((id, dir)),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => {
                return Err(e).with_context(|| format!("creating run directory {}", dir.display()));
            }
        }
    }
    bail!(
        "could not allocate a run directory under {} after {RUN_DIR_ATTEMPTS} attempts",
        outputs.display()
    )
}

// ---------------------------------------------------------------------------
// Atomic writes
// ---------------------------------------------------------------------------

/// Write `value` as pretty JSON with a trailing newline, atomically.
///
/// # Errors
/// Serialization or I/O failure.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut json = serde_json::to_string_pretty(value)
        .with_context(|| format!("serializing {}", path.display()))?;
    json.push('\n');
    write_atomic(path, json.as_bytes())
}

/// Replace `path` with `bytes` via temp file, fsync and rename.
///
/// # Errors
/// Any I/O failure along the way.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .with_context(|| format!("no parent directory for {}", path.display()))?;
    let name = path
        .file_name()
        .with_context(|| format!("no file name in {}", path.display()))?;
    let tmp = dir.join(format!(".{}.tmp", name.to_string_lossy()));

    let mut file = fs::File::create(&tmp).with_context(|| format!("create {}", tmp.display()))?;
    file.write_all(bytes)
        .with_context(|| format!("write {}", tmp.display()))?;
    file.sync_all()
        .with_context(|| format!("fsync {}", tmp.display()))?;
    drop(file);

    fs::rename(&tmp, path)
        .with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))?;

    // Persist the rename itself. Not every platform can open a directory.
    if let Ok(d) = fs::File::open(dir)
        && let Err(e) = d.sync_all()
    {
        warn!(dir = %dir.display(), error = %e, "directory fsync failed");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// What a run or analysis produced.
#[derive(Clone, Debug, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub run_dir: PathBuf,
    pub turns: usize,
    /// Files written, in write order.
    pub written: Vec<PathBuf>,
    pub rule: RuleVerdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub judge: Option<JudgeVerdict>,
}

/// Replay the configured scenario against `target`, then analyze the
/// transcript and ask `judge` for its verdict.
///
/// # Errors
/// Scenario, replay (generation included) and I/O failures. The judge never
/// fails the run.
pub fn execute_run<T, J>(config: &EvalConfig, target: &T, judge: &J) -> Result<RunReport>
where
    T: ChatModel + ?Sized,
    J: ChatModel + ?Sized,
{
    let scenario = load_scenario(&config.scenario_path, &config.entry_node)
        .with_context(|| format!("loading scenario {}", config.scenario_path.display()))?;
    let (run_id, run_dir) = create_run_dir(&config.outputs_dir)?;
    let _span = info_span!("run", run_id = %run_id).entered();

    let meta = RunMeta {
        run_id: run_id.clone(),
        target_model: config.target.model.clone(),
        temperature_target: config.target.temperature,
        branch_label: config.branch_label.clone(),
        scenario_name: scenario.graph.name().map(str::to_owned),
        scenario_path: scenario.path.display().to_string(),
        scenario_sha256: scenario.sha256.clone(),
        judge_model: config.judge.model.clone(),
        temperature_judge: config.judge.temperature,
    };
    let mut written = Vec::new();
    let meta_path = run_dir.join(RUN_META_FILE);
    write_json_atomic(&meta_path, &meta)?;
    written.push(meta_path);

    let transcript_path = run_dir.join(TRANSCRIPT_FILE);
    let mut writer = TranscriptWriter::create(&transcript_path)?;
    let settings = config.replay_settings();
    let context = if config.system_prompt.is_empty() {
        Vec::new()
    } else {
        vec![ChatMessage::system(&config.system_prompt)]
    };
    DialogueReplayer::new(&scenario.graph, target, &settings)
        .replay(context, &mut writer)
        .with_context(|| {
            format!(
                "replay failed; partial transcript kept at {}",
                transcript_path.display()
            )
        })?;
    drop(writer);
    written.push(transcript_path.clone());

    // Analyze what is on disk, not what is in memory.
    let log = read_transcript(&transcript_path)?;
    let (rule, analysis_files) = write_analysis(&run_dir, &log)?;
    written.extend(analysis_files);

    let verdict = assess(judge, &log, &config.judge_settings());
    written.extend(write_judgement(&run_dir, &meta, &log, &rule, &verdict)?);

    info!(turns = log.len(), flag = rule.a6_flag, score = %verdict.score, "run complete");
    Ok(RunReport {
        run_id,
        run_dir,
        turns: log.len(),
        written,
        rule,
        judge: Some(verdict),
    })
}

/// Re-analyze an existing run directory.
///
/// Works on partial transcripts. With `judge`, also refreshes
/// `a6_judge.json` and `memo.md`.
///
/// # Errors
/// Missing or malformed transcript, or I/O failure.
pub fn analyze_run<J>(run_dir: &Path, judge: Option<(&J, &JudgeSettings)>) -> Result<RunReport>
where
    J: ChatModel + ?Sized,
{
    let log = read_transcript(&run_dir.join(TRANSCRIPT_FILE))?;
    let (rule, mut written) = write_analysis(run_dir, &log)?;

    let meta = read_run_meta(run_dir)?;
    let verdict = match judge {
        Some((model, settings)) => {
            let verdict = assess(model, &log, settings);
            written.extend(write_judgement(run_dir, &meta, &log, &rule, &verdict)?);
            Some(verdict)
        }
        None => None,
    };

    Ok(RunReport {
        run_id: meta.run_id,
        run_dir: run_dir.to_path_buf(),
        turns: log.len(),
        written,
        rule,
        judge: verdict,
    })
}

/// Read `run_meta.json`, or synthesize a minimal one from the directory
/// name when it is missing.
///
/// # Errors
/// The file exists but cannot be read or parsed.
pub fn read_run_meta(run_dir: &Path) -> Result<RunMeta> {
    let path = run_dir.join(RUN_META_FILE);
    match fs::read_to_string(&path) {
        Ok(s) => serde_json::from_str(&s).with_context(|| format!("parsing {}", path.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "run metadata missing; memo header will be sparse");
            Ok(RunMeta {
                run_id: run_dir
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                target_model: String::new(),
                temperature_target: 0.0,
                branch_label: String::new(),
                scenario_name: None,
                scenario_path: String::new(),
                scenario_sha256: String::new(),
                judge_model: String::new(),
                temperature_judge: 0.0,
            })
        }
        Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
    }
}

fn write_analysis(run_dir: &Path, log: &TurnLog) -> Result<(RuleVerdict, Vec<PathBuf>)> {
    let features: FeatureReport = extract_features(log);
    let rule = {
        let _span = info_span!("rule").entered();
        evaluate(&features)
    };

    let features_path = run_dir.join(FEATURES_FILE);
    write_json_atomic(&features_path, &features)?;
    let rule_path = run_dir.join(RULE_FILE);
    write_json_atomic(&rule_path, &rule)?;
    Ok((rule, vec![features_path, rule_path]))
}

fn write_judgement(
    run_dir: &Path,
    meta: &RunMeta,
    log: &TurnLog,
    rule: &RuleVerdict,
    verdict: &JudgeVerdict,
) -> Result<Vec<PathBuf>> {
    let judge_path = run_dir.join(JUDGE_FILE);
    write_json_atomic(&judge_path, verdict)?;
    let memo_path = run_dir.join(MEMO_FILE);
    write_atomic(
        &memo_path,
        build_memo_markdown(meta, log, rule, verdict).as_bytes(),
    )?;
    Ok(vec![judge_path, memo_path])
}
