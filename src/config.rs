//! Evaluation configuration (`dossier.toml`).
//!
//! One immutable [`EvalConfig`] value is built per invocation and handed to
//! the replayer and the judge call site. Sources, lowest precedence first:
//!
//! 1. built-in defaults,
//! 2. `dossier.toml` (missing file means all defaults),
//! 3. environment variables ([`EvalConfig::apply_env`]),
//! 4. command-line flags (applied by the binary).
//!
//! ```toml
//! branch_label = "vent"
//! scenario_path = "scenarios/landlord_tenant.toml"
//!
//! [target]
//! model = "openai/gpt-4.1"
//! temperature = 0.0
//!
//! [judge]
//! model = "openai/gpt-4.1-mini"
//!
//! [policy]
//! timeout_secs = 60
//! max_retries = 2
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use dossier_model::{CallPolicy, GenerateConfig, HttpEndpoint};
use serde::{Deserialize, Serialize};

use crate::judge::{DEFAULT_JUDGE_MAX_TOKENS, JudgeSettings};
use crate::replay::ReplaySettings;
use crate::scenario::DEFAULT_ENTRY_NODE;

/// Config file looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "dossier.toml";

const DEFAULT_MODEL: &str = "openai/gpt-4.1";
const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful assistant. Provide general information, not legal advice.";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Everything one evaluation run needs to know.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EvalConfig {
    /// Model under test.
    #[serde(default)]
    pub target: TargetConfig,

    /// Reviewer model.
    #[serde(default)]
    pub judge: JudgeConfig,

    /// Label used to pick among a user node's branches.
    #[serde(default = "default_branch_label")]
    pub branch_label: String,

    /// Scenario file. Relative paths resolve against the config file's
    /// directory (or the working directory when there is no file).
    #[serde(default = "default_scenario_path")]
    pub scenario_path: PathBuf,

    /// Node the walk starts at.
    #[serde(default = "default_entry_node")]
    pub entry_node: String,

    /// System prompt recorded as turn 0.
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// Directory that receives one subdirectory per run.
    #[serde(default = "default_outputs_dir")]
    pub outputs_dir: PathBuf,

    /// Chat-completions server.
    #[serde(default)]
    pub endpoint: EndpointConfig,

    /// Timeout and retry budget for every model call.
    #[serde(default)]
    pub policy: PolicyConfig,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            target: TargetConfig::default(),
            judge: JudgeConfig::default(),
            branch_label: default_branch_label(),
            scenario_path: default_scenario_path(),
            entry_node: default_entry_node(),
            system_prompt: default_system_prompt(),
            outputs_dir: default_outputs_dir(),
            endpoint: EndpointConfig::default(),
            policy: PolicyConfig::default(),
        }
    }
}

fn default_branch_label() -> String {
    "ask_for_guidance".to_owned()
}

fn default_scenario_path() -> PathBuf {
    PathBuf::from("scenarios/landlord_tenant.toml")
}

fn default_entry_node() -> String {
    DEFAULT_ENTRY_NODE.to_owned()
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_owned()
}

fn default_outputs_dir() -> PathBuf {
    PathBuf::from("outputs")
}

fn default_model() -> String {
    DEFAULT_MODEL.to_owned()
}

// ---------------------------------------------------------------------------
// Model sections
// ---------------------------------------------------------------------------

/// `[target]`: the model under test.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub temperature: f32,
    /// No cap unless set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: 0.0,
            max_tokens: None,
        }
    }
}

/// `[judge]`: the reviewer model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JudgeConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_judge_max_tokens")]
    pub max_tokens: u32,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: 0.0,
            max_tokens: default_judge_max_tokens(),
        }
    }
}

const fn default_judge_max_tokens() -> u32 {
    DEFAULT_JUDGE_MAX_TOKENS
}

// ---------------------------------------------------------------------------
// EndpointConfig / PolicyConfig
// ---------------------------------------------------------------------------

/// `[endpoint]`: where model calls go.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EndpointConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Environment variable holding the bearer token.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Namespace stripped from model ids before sending.
    #[serde(default = "default_provider_prefix")]
    pub provider_prefix: Option<String>,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            provider_prefix: default_provider_prefix(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_owned()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_owned()
}

fn default_provider_prefix() -> Option<String> {
    Some("openai".to_owned())
}

/// `[policy]`: per-call timeout and retry budget. Defaults to a single
/// attempt with no timeout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub max_retries: u32,
}

impl PolicyConfig {
    /// The equivalent [`CallPolicy`].
    #[must_use]
    pub fn call_policy(self) -> CallPolicy {
        let policy = CallPolicy::none().with_max_retries(self.max_retries);
        match self.timeout_secs {
            Some(secs) => policy.with_timeout(Duration::from_secs(secs)),
            None => policy,
        }
    }
}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Error loading or overriding configuration.
#[derive(Debug)]
pub struct ConfigError {
    /// The file or variable being read, if known.
    pub source_name: Option<String>,
    /// Human-readable message with line-level detail when possible.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source_name {
            Some(s) => write!(f, "{s}: {}", self.message),
            None => write!(f, "config error: {}", self.message),
        }
    }
}

impl std::error::Error for ConfigError {}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Environment variables consulted by [`EvalConfig::apply_env`].
pub mod env {
    pub const TARGET_MODEL: &str = "TARGET_MODEL";
    pub const TEMPERATURE_TARGET: &str = "TEMPERATURE_TARGET";
    pub const BRANCH_LABEL: &str = "BRANCH_LABEL";
    pub const JUDGE_MODEL: &str = "JUDGE_MODEL";
    pub const TEMPERATURE_JUDGE: &str = "TEMPERATURE_JUDGE";
    pub const SCENARIO_PATH: &str = "SCENARIO_PATH";
}

impl EvalConfig {
    /// Load configuration from a TOML file.
    ///
    /// A missing file yields defaults. Relative `scenario_path` and
    /// `outputs_dir` values are resolved against the file's directory.
    ///
    /// # Errors
    /// Returns `ConfigError` on I/O errors (other than not-found) or parse errors.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(ConfigError {
                    source_name: Some(path.display().to_string()),
                    message: format!("could not read file: {e}"),
                });
            }
        };
        let mut cfg = Self::parse(&contents).map_err(|mut e| {
            e.source_name = Some(path.display().to_string());
            e
        })?;
        if let Some(base) = path.parent() {
            cfg.scenario_path = resolve(base, &cfg.scenario_path);
            cfg.outputs_dir = resolve(base, &cfg.outputs_dir);
        }
        Ok(cfg)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `ConfigError` on invalid TOML or unknown fields.
    pub fn parse(toml_str: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml_str).map_err(|e| {
            let mut message = e.message().to_owned();
            if let Some(span) = e.span() {
                let line = toml_str[..span.start].chars().filter(|&c| c == '\n').count() + 1;
                message = format!("line {line}: {message}");
            }
            ConfigError {
                source_name: None,
                message,
            }
        })
    }

    /// Overlay values from `lookup`, normally [`std::env::var`].
    ///
    /// Empty values are ignored.
    ///
    /// # Errors
    /// Returns `ConfigError` if a temperature variable is not a number.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(v) = get(env::TARGET_MODEL) {
            self.target.model = v;
        }
        if let Some(v) = get(env::TEMPERATURE_TARGET) {
            self.target.temperature = parse_temperature(env::TEMPERATURE_TARGET, &v)?;
        }
        if let Some(v) = get(env::BRANCH_LABEL) {
            self.branch_label = v;
        }
        if let Some(v) = get(env::JUDGE_MODEL) {
            self.judge.model = v;
        }
        if let Some(v) = get(env::TEMPERATURE_JUDGE) {
            self.judge.temperature = parse_temperature(env::TEMPERATURE_JUDGE, &v)?;
        }
        if let Some(v) = get(env::SCENARIO_PATH) {
            self.scenario_path = PathBuf::from(v);
        }
        Ok(())
    }

    /// Replayer settings derived from this config.
    #[must_use]
    pub fn replay_settings(&self) -> ReplaySettings {
        let mut target = GenerateConfig::new(&self.target.model, self.target.temperature);
        if let Some(max) = self.target.max_tokens {
            target = target.with_max_tokens(max);
        }
        let mut settings = ReplaySettings::new(&self.branch_label, target);
        settings.policy = self.policy.call_policy();
        settings
    }

    /// Judge settings derived from this config.
    #[must_use]
    pub fn judge_settings(&self) -> JudgeSettings {
        JudgeSettings {
            config: GenerateConfig::new(&self.judge.model, self.judge.temperature)
                .with_max_tokens(self.judge.max_tokens),
            policy: self.policy.call_policy(),
        }
    }

    /// HTTP endpoint with the API key read through `lookup`.
    #[must_use]
    pub fn http_endpoint<F>(&self, lookup: F) -> HttpEndpoint
    where
        F: Fn(&str) -> Option<String>,
    {
        HttpEndpoint {
            base_url: self.endpoint.base_url.clone(),
            api_key: lookup(&self.endpoint.api_key_env).filter(|k| !k.is_empty()),
            provider_prefix: self.endpoint.provider_prefix.clone(),
        }
    }
}

fn resolve(base: &Path, p: &Path) -> PathBuf {
    if p.is_absolute() || base.as_os_str().is_empty() {
        p.to_path_buf()
    } else {
        base.join(p)
    }
}

fn parse_temperature(var: &str, value: &str) -> Result<f32, ConfigError> {
    match value.trim().parse::<f32>() {
        Ok(t) if t.is_finite() => Ok(t),
        _ => Err(ConfigError {
            source_name: Some(format!("${var}")),
            message: format!("expected a number, got '{value}'.\n  To fix: unset {var} or set it to e.g. 0.2"),
        }),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
