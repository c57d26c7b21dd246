//! Judge assessment: ask a reviewer model for a holistic A6 verdict.
//!
//! The judge path degrades instead of failing. A malformed payload or a
//! failed call yields the fallback verdict (`borderline`, `valid_json =
//! false`) with whatever raw text was received kept for audit.

pub mod parse;
pub mod prompt;

use std::fmt;

use dossier_model::{CallPolicy, ChatModel, GenerateConfig, generate};
use serde::{Deserialize, Serialize};
use tracing::{info, info_span, warn};

use crate::transcript::TurnLog;

pub use parse::{
    INVALID_JSON_RATIONALE, JudgePayloadError, NO_JSON_RATIONALE, extract_first_json_object,
    parse_judge_output, validate_payload,
};
pub use prompt::{JUDGE_SYSTEM_PROMPT, judge_messages, judge_prompt, render_transcript};

/// Token cap applied to judge calls unless configured otherwise.
pub const DEFAULT_JUDGE_MAX_TOKENS: u32 = 400;

/// The judge's three-way opinion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JudgeScore {
    LikelyYes,
    Borderline,
    LikelyNo,
}

impl JudgeScore {
    /// Parse the exact wire spelling. No case folding.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "likely_yes" => Some(Self::LikelyYes),
            "borderline" => Some(Self::Borderline),
            "likely_no" => Some(Self::LikelyNo),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LikelyYes => "likely_yes",
            Self::Borderline => "borderline",
            Self::LikelyNo => "likely_no",
        }
    }
}

impl fmt::Display for JudgeScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The judge verdict document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JudgeVerdict {
    pub score: JudgeScore,
    pub rationale: String,
    pub cited_turns: Vec<i64>,
    pub valid_json: bool,
    /// Raw judge text; only present on fallback verdicts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<String>,
}

impl JudgeVerdict {
    /// The fixed fallback verdict for `err`, retaining `raw`.
    #[must_use]
    pub fn fallback(err: &JudgePayloadError, raw: &str) -> Self {
        let rationale = match err {
            JudgePayloadError::NoJsonObject => NO_JSON_RATIONALE,
            _ => INVALID_JSON_RATIONALE,
        };
        Self {
            score: JudgeScore::Borderline,
            rationale: rationale.to_owned(),
            cited_turns: Vec::new(),
            valid_json: false,
            raw_output: Some(raw.to_owned()),
        }
    }
}

/// Model settings and call policy for the judge.
#[derive(Clone, Debug, PartialEq)]
pub struct JudgeSettings {
    pub config: GenerateConfig,
    pub policy: CallPolicy,
}

impl JudgeSettings {
    /// Settings for `model` at `temperature` with the default token cap and
    /// no timeout or retries.
    #[must_use]
    pub fn new(model: impl Into<String>, temperature: f32) -> Self {
        Self {
            config: GenerateConfig::new(model, temperature).with_max_tokens(DEFAULT_JUDGE_MAX_TOKENS),
            policy: CallPolicy::none(),
        }
    }
}

/// Ask `model` to assess `log`. Never fails; see the module docs.
pub fn assess<M: ChatModel + ?Sized>(model: &M, log: &TurnLog, settings: &JudgeSettings) -> JudgeVerdict {
    let _span = info_span!("judge", model = %settings.config.model).entered();

    let messages = judge_messages(log);
    let raw = match generate(model, &messages, &settings.config, &settings.policy) {
        Ok(raw) => raw,
        Err(err) => {
            warn!(error = %err, "judge call failed; using fallback verdict");
            String::new()
        }
    };

    let verdict = parse_judge_output(&raw);
    info!(score = %verdict.score, valid_json = verdict.valid_json, "judge verdict");
    verdict
}

#[cfg(test)]
mod tests {
    use dossier_model::{ModelError, Role, ScriptedModel};

    use super::*;
    use crate::transcript::{TurnRecord, TurnRole};

    fn log() -> TurnLog {
        TurnLog::from_records(vec![TurnRecord {
            turn_index: 0,
            role: TurnRole::Assistant,
            content: "I'm here for you.".into(),
            node_id: Some("a1".into()),
            phase: Some("relational".into()),
        }])
        .unwrap()
    }

    #[test]
    fn valid_reply_is_returned_validated() {
        let model = ScriptedModel::replying([
            "Here you go: {\"score\": \"likely_no\", \"rationale\": \"Thin.\", \"cited_turns\": [0]}",
        ]);
        let v = assess(&model, &log(), &JudgeSettings::new("judge-x", 0.0));
        assert_eq!(v.score, JudgeScore::LikelyNo);
        assert!(v.valid_json);

        let calls = model.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0][0].role, Role::System);
        assert!(calls[0][1].content.contains("[0] ASSISTANT: I'm here for you."));
    }

    #[test]
    fn transport_failure_degrades_to_fallback() {
        let model = ScriptedModel::new([Err(ModelError::Timeout { elapsed_ms: 10 })]);
        let v = assess(&model, &log(), &JudgeSettings::new("judge-x", 0.0));
        assert_eq!(v.score, JudgeScore::Borderline);
        assert!(!v.valid_json);
        assert_eq!(v.rationale, NO_JSON_RATIONALE);
        assert_eq!(v.raw_output.as_deref(), Some(""));
    }

    #[test]
    fn retry_policy_reaches_the_judge_call() {
        let model = ScriptedModel::new([
            Err(ModelError::Timeout { elapsed_ms: 10 }),
            Ok(r#"{"score":"likely_yes","rationale":"r","cited_turns":[]}"#.to_owned()),
        ]);
        let mut settings = JudgeSettings::new("judge-x", 0.0);
        settings.policy = CallPolicy::none().with_max_retries(1);
        let v = assess(&model, &log(), &settings);
        assert!(v.valid_json);
        assert_eq!(model.remaining(), 0);
    }

    #[test]
    fn raw_output_is_omitted_when_valid() {
        let v = parse_judge_output(r#"{"score":"borderline","rationale":"r","cited_turns":[]}"#);
        let json = serde_json::to_value(&v).unwrap();
        assert!(json.get("raw_output").is_none());
        let fb = serde_json::to_value(JudgeVerdict::fallback(&JudgePayloadError::NotAnObject, "[]")).unwrap();
        assert_eq!(fb["raw_output"], "[]");
    }

    #[test]
    fn default_settings_cap_tokens() {
        assert_eq!(JudgeSettings::new("m", 0.2).config.max_tokens, Some(DEFAULT_JUDGE_MAX_TOKENS));
    }
}
