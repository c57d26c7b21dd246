use std::io::Read as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use dossier::config::{DEFAULT_CONFIG_FILE, EvalConfig};
use dossier::judge::{JudgeVerdict, parse_judge_output};
use dossier::replay::dry_walk;
use dossier::run::{RunReport, analyze_run, execute_run};
use dossier::scenario::{DEFAULT_ENTRY_NODE, load_scenario};
use dossier_model::HttpChatModel;
use serde::Serialize;

mod format;
mod telemetry;

use format::OutputFormat;

/// Scripted-dialogue replay and evidentiary analysis
///
/// Replays a branching conversation script against a model, records every
/// turn to a run directory, scores the assistant turns for five
/// evidentiary features, and combines them into a rule-based verdict. A
/// reviewer model is separately asked for a holistic verdict, which is
/// validated defensively.
///
/// QUICK START:
///
///   export OPENAI_API_KEY=...
///   dossier validate-scenario scenarios/landlord_tenant.toml
///   dossier run --branch-label vent
///   dossier analyze outputs/<run-id>
///
/// CONFIGURATION (lowest precedence first):
///
///   built-in defaults, dossier.toml, environment (TARGET_MODEL,
///   TEMPERATURE_TARGET, BRANCH_LABEL, JUDGE_MODEL, TEMPERATURE_JUDGE,
///   SCENARIO_PATH), then command-line flags.
#[derive(Parser)]
#[command(name = "dossier")]
#[command(version, about)]
#[command(propagate_version = true)]
#[command(after_help = "See 'dossier <command> --help' for more information on a specific command.")]
struct Cli {
    /// Config file (missing file means defaults)
    #[arg(long, global = true, env = "DOSSIER_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Output format for command results
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay the scenario, analyze the transcript and ask the judge
    ///
    /// Writes run_meta.json, transcript.jsonl, features.json, a6_rule.json,
    /// a6_judge.json and memo.md to a fresh directory under the outputs
    /// directory. A generation failure aborts the run but keeps the
    /// transcript prefix.
    Run(RunArgs),

    /// Re-run feature extraction and the rule over an existing run
    ///
    /// Works on partial transcripts left by an aborted run.
    Analyze {
        /// Run directory containing transcript.jsonl
        run_dir: PathBuf,

        /// Also call the judge and rewrite a6_judge.json and memo.md
        #[arg(long)]
        judge: bool,
    },

    /// Load and validate a scenario, then show the walk for a label
    ///
    /// No model is called.
    ValidateScenario {
        /// Scenario file (.toml or .json)
        path: PathBuf,

        /// Branch label to walk
        #[arg(long, default_value = "ask_for_guidance")]
        branch_label: String,

        /// Entry node id
        #[arg(long, default_value = DEFAULT_ENTRY_NODE)]
        entry: String,
    },

    /// Validate raw judge output read from stdin
    ParseJudge,
}

#[derive(Args)]
struct RunArgs {
    /// Model under test
    #[arg(long)]
    target_model: Option<String>,

    /// Sampling temperature for the model under test
    #[arg(long)]
    target_temperature: Option<f32>,

    /// Reviewer model
    #[arg(long)]
    judge_model: Option<String>,

    /// Sampling temperature for the reviewer
    #[arg(long)]
    judge_temperature: Option<f32>,

    /// Branch label used at user nodes that declare branches
    #[arg(long)]
    branch_label: Option<String>,

    /// Scenario file
    #[arg(long)]
    scenario: Option<PathBuf>,

    /// Directory receiving run directories
    #[arg(long)]
    outputs: Option<PathBuf>,

    /// Per-call timeout in seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Retries for transient model failures
    #[arg(long)]
    max_retries: Option<u32>,
}

impl RunArgs {
    fn apply(self, cfg: &mut EvalConfig) {
        if let Some(v) = self.target_model {
            cfg.target.model = v;
        }
        if let Some(v) = self.target_temperature {
            cfg.target.temperature = v;
        }
        if let Some(v) = self.judge_model {
            cfg.judge.model = v;
        }
        if let Some(v) = self.judge_temperature {
            cfg.judge.temperature = v;
        }
        if let Some(v) = self.branch_label {
            cfg.branch_label = v;
        }
        if let Some(v) = self.scenario {
            cfg.scenario_path = v;
        }
        if let Some(v) = self.outputs {
            cfg.outputs_dir = v;
        }
        if let Some(v) = self.timeout_secs {
            cfg.policy.timeout_secs = Some(v);
        }
        if let Some(v) = self.max_retries {
            cfg.policy.max_retries = v;
        }
    }
}

fn main() -> Result<()> {
    telemetry::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => {
            let mut cfg = load_config(&cli.config)?;
            args.apply(&mut cfg);
            let model = http_model(&cfg)?;
            let report = execute_run(&cfg, &model, &model)?;
            print_report(cli.format, &report)
        }
        Commands::Analyze { run_dir, judge } => {
            let report = if judge {
                let cfg = load_config(&cli.config)?;
                let model = http_model(&cfg)?;
                let settings = cfg.judge_settings();
                analyze_run(&run_dir, Some((&model, &settings)))?
            } else {
                analyze_run::<HttpChatModel>(&run_dir, None)?
            };
            print_report(cli.format, &report)
        }
        Commands::ValidateScenario {
            path,
            branch_label,
            entry,
        } => validate_scenario(cli.format, &path, &branch_label, &entry),
        Commands::ParseJudge => {
            let mut raw = String::new();
            std::io::stdin()
                .read_to_string(&mut raw)
                .context("reading judge output from stdin")?;
            let verdict = parse_judge_output(&raw);
            println!("{}", cli.format.render(&verdict, judge_text)?);
            Ok(())
        }
    }
}

fn load_config(path: &Path) -> Result<EvalConfig> {
    let mut cfg = EvalConfig::load(path)?;
    cfg.apply_env(|name| std::env::var(name).ok())?;
    Ok(cfg)
}

fn http_model(cfg: &EvalConfig) -> Result<HttpChatModel> {
    let endpoint = cfg.http_endpoint(|name| std::env::var(name).ok());
    if endpoint.api_key.is_none() {
        tracing::warn!(
            var = %cfg.endpoint.api_key_env,
            "no API key set; requests will be unauthenticated"
        );
    }
    HttpChatModel::new(endpoint).context("building HTTP model client")
}

fn print_report(format: OutputFormat, report: &RunReport) -> Result<()> {
    let out = format.render(report, |r| {
        let mut lines = vec![String::new(), "Wrote".to_owned()];
        lines.extend(r.written.iter().map(|p| p.display().to_string()));
        lines.push(String::new());
        lines.push(format!("Turns: {}", r.turns));
        lines.push(format!("Rule based flag: {}", r.rule.a6_flag));
        if let Some(j) = &r.judge {
            lines.push(format!("Judge score: {} (valid_json: {})", j.score, j.valid_json));
        }
        lines.join("\n")
    })?;
    println!("{out}");
    Ok(())
}

#[derive(Serialize)]
struct ScenarioSummary {
    path: PathBuf,
    scenario_name: Option<String>,
    sha256: String,
    nodes: usize,
    branch_label: String,
    walk: Vec<String>,
}

fn validate_scenario(format: OutputFormat, path: &Path, label: &str, entry: &str) -> Result<()> {
    let loaded = load_scenario(path, entry)?;
    let walk = dry_walk(&loaded.graph, label)
        .with_context(|| format!("walking scenario with branch label '{label}'"))?;
    let summary = ScenarioSummary {
        path: loaded.path.clone(),
        scenario_name: loaded.graph.name().map(str::to_owned),
        sha256: loaded.sha256.clone(),
        nodes: loaded.graph.len(),
        branch_label: label.to_owned(),
        walk,
    };
    let out = format.render(&summary, |s| {
        format!(
            "{}: {} nodes, valid\nWalk ({}): {}",
            s.path.display(),
            s.nodes,
            s.branch_label,
            s.walk.join(" -> ")
        )
    })?;
    println!("{out}");
    Ok(())
}

fn judge_text(v: &JudgeVerdict) -> String {
    let turns: Vec<String> = v.cited_turns.iter().map(ToString::to_string).collect();
    format!(
        "score: {}\nvalid_json: {}\nrationale: {}\ncited_turns: [{}]",
        v.score,
        v.valid_json,
        v.rationale,
        turns.join(", ")
    )
}
