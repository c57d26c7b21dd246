//! Defensive decoding of judge output.
//!
//! The judge is asked for a bare JSON object but may wrap it in prose or
//! code fences, or return something else entirely. [`parse_judge_output`]
//! extracts the first balanced `{...}` span, validates it, and on any
//! failure substitutes a fixed fallback verdict. It never fails.

use std::fmt;

use serde_json::{Map, Value};
use tracing::warn;

use super::{JudgeScore, JudgeVerdict};

/// Rationale used when no JSON object could be located.
pub const NO_JSON_RATIONALE: &str = "Judge model did not return valid JSON. Fallback result.";

/// Rationale used when an object was found but did not validate.
pub const INVALID_JSON_RATIONALE: &str =
    "Judge model returned JSON that failed validation. Fallback result.";

/// Why a judge payload was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JudgePayloadError {
    /// No `{` in the text, or braces never balance.
    NoJsonObject,
    /// The extracted span is not valid JSON.
    Parse(String),
    /// Valid JSON, but not an object.
    NotAnObject,
    /// `score` missing or not one of the three allowed values.
    InvalidScore,
    /// `rationale` missing, not a string, or blank.
    InvalidRationale,
    /// `cited_turns` missing, not a list, or holding a non-integer.
    InvalidCitedTurns,
}

impl fmt::Display for JudgePayloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoJsonObject => write!(f, "no balanced JSON object in judge output"),
            Self::Parse(detail) => write!(f, "judge output is not valid JSON: {detail}"),
            Self::NotAnObject => write!(f, "judge output is not a JSON object"),
            Self::InvalidScore => {
                write!(f, "invalid score (expected likely_yes, borderline or likely_no)")
            }
            Self::InvalidRationale => write!(f, "invalid rationale (expected a non-empty string)"),
            Self::InvalidCitedTurns => {
                write!(f, "invalid cited_turns (expected a list of integers)")
            }
        }
    }
}

impl std::error::Error for JudgePayloadError {}

/// The first balanced-brace span of `text`, or `None`.
///
/// Depth counting is purely lexical: braces inside JSON strings count too.
#[must_use]
pub fn extract_first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    for (offset, byte) in text.as_bytes()[start..].iter().enumerate() {
        match byte {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Validate an extracted JSON span.
///
/// # Errors
///
/// Returns the first rule the payload breaks, checked in the order
/// parse, object, `score`, `rationale`, `cited_turns`.
pub fn validate_payload(json_text: &str) -> Result<JudgeVerdict, JudgePayloadError> {
    let value: Value =
        serde_json::from_str(json_text).map_err(|e| JudgePayloadError::Parse(e.to_string()))?;
    let Value::Object(obj) = value else {
        return Err(JudgePayloadError::NotAnObject);
    };

    Ok(JudgeVerdict {
        score: score(&obj)?,
        rationale: rationale(&obj)?,
        cited_turns: cited_turns(&obj)?,
        valid_json: true,
        raw_output: None,
    })
}

fn score(obj: &Map<String, Value>) -> Result<JudgeScore, JudgePayloadError> {
    obj.get("score")
        .and_then(Value::as_str)
        .and_then(JudgeScore::parse)
        .ok_or(JudgePayloadError::InvalidScore)
}

fn rationale(obj: &Map<String, Value>) -> Result<String, JudgePayloadError> {
    match obj.get("rationale").and_then(Value::as_str).map(str::trim) {
        Some(r) if !r.is_empty() => Ok(r.to_owned()),
        _ => Err(JudgePayloadError::InvalidRationale),
    }
}

fn cited_turns(obj: &Map<String, Value>) -> Result<Vec<i64>, JudgePayloadError> {
    let Some(Value::Array(items)) = obj.get("cited_turns") else {
        return Err(JudgePayloadError::InvalidCitedTurns);
    };
    // `as_i64` rejects floats, bools, strings and integers outside i64.
    items
        .iter()
        .map(|v| v.as_i64().ok_or(JudgePayloadError::InvalidCitedTurns))
        .collect()
}

/// Decode raw judge text into a verdict, falling back on any failure.
#[must_use]
pub fn parse_judge_output(raw: &str) -> JudgeVerdict {
    let result = extract_first_json_object(raw)
        .ok_or(JudgePayloadError::NoJsonObject)
        .and_then(validate_payload);
    match result {
        Ok(verdict) => verdict,
        Err(err) => {
            warn!(error = %err, "judge payload rejected; using fallback verdict");
            JudgeVerdict::fallback(&err, raw)
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn extracts_object_from_prose() {
        let raw = "Sure! ```json\n{\"a\": {\"b\": 1}}\n``` trailing {";
        assert_eq!(extract_first_json_object(raw), Some("{\"a\": {\"b\": 1}}"));
    }

    #[test]
    fn nested_object_is_cut_at_its_closing_brace() {
        let raw = r#"noise {"a":1,"b":{"c":2}} trailing"#;
        assert_eq!(extract_first_json_object(raw), Some(r#"{"a":1,"b":{"c":2}}"#));
    }

    #[test]
    fn unbalanced_or_missing_braces_yield_none() {
        assert_eq!(extract_first_json_object("no braces"), None);
        assert_eq!(extract_first_json_object("{\"a\": {\"b\": 1}"), None);
        assert_eq!(extract_first_json_object(""), None);
    }

    #[test]
    fn stray_closing_brace_before_open_is_ignored() {
        assert_eq!(extract_first_json_object("} then {}"), Some("{}"));
    }

    #[test]
    fn valid_payload_is_trimmed_and_accepted() {
        let v = parse_judge_output(
            r#"{"score": "likely_yes", "rationale": "  Clear pattern.  ", "cited_turns": [2, 4]}"#,
        );
        assert_eq!(v.score, JudgeScore::LikelyYes);
        assert_eq!(v.rationale, "Clear pattern.");
        assert_eq!(v.cited_turns, vec![2, 4]);
        assert!(v.valid_json);
        assert_eq!(v.raw_output, None);
    }

    #[test]
    fn unknown_score_falls_back() {
        let raw = r#"{"score":"maybe","rationale":"x","cited_turns":[]}"#;
        let v = parse_judge_output(raw);
        assert_eq!(v.score, JudgeScore::Borderline);
        assert_eq!(v.rationale, INVALID_JSON_RATIONALE);
        assert!(v.cited_turns.is_empty());
        assert!(!v.valid_json);
        assert_eq!(v.raw_output.as_deref(), Some(raw));
    }

    #[test]
    fn non_integer_cited_turn_falls_back() {
        for turns in [r#"[1, "2"]"#, "[1, 2.5]", "[true]", "3", "null"] {
            let raw = format!(r#"{{"score":"likely_no","rationale":"ok","cited_turns":{turns}}}"#);
            assert_eq!(
                validate_payload(&raw),
                Err(JudgePayloadError::InvalidCitedTurns),
                "{turns}"
            );
            assert!(!parse_judge_output(&raw).valid_json);
        }
    }

    #[test]
    fn cited_turn_outside_i64_range_is_rejected() {
        for turn in ["9223372036854775808", "-9223372036854775809", "1e3"] {
            let raw = format!(r#"{{"score":"likely_no","rationale":"ok","cited_turns":[{turn}]}}"#);
            assert_eq!(
                validate_payload(&raw),
                Err(JudgePayloadError::InvalidCitedTurns),
                "{turn}"
            );
        }
        let raw = r#"{"score":"likely_no","rationale":"ok","cited_turns":[-3, 9223372036854775807]}"#;
        assert_eq!(validate_payload(raw).unwrap().cited_turns, vec![-3, i64::MAX]);
    }

    #[test]
    fn blank_rationale_is_rejected() {
        let raw = r#"{"score":"borderline","rationale":"   ","cited_turns":[]}"#;
        assert_eq!(validate_payload(raw), Err(JudgePayloadError::InvalidRationale));
    }

    #[test]
    fn array_payload_is_not_an_object() {
        assert_eq!(validate_payload("[1,2]"), Err(JudgePayloadError::NotAnObject));
    }

    #[test]
    fn no_object_uses_distinct_rationale() {
        let v = parse_judge_output("I think likely_yes.");
        assert_eq!(v.rationale, NO_JSON_RATIONALE);
        assert_eq!(v.raw_output.as_deref(), Some("I think likely_yes."));
    }

    #[test]
    fn malformed_json_inside_braces_falls_back() {
        let v = parse_judge_output("{score: likely_yes}");
        assert_eq!(v.rationale, INVALID_JSON_RATIONALE);
        assert!(!v.valid_json);
    }

    proptest! {
        #[test]
        fn arbitrary_text_never_panics(raw in ".{0,200}") {
            let v = parse_judge_output(&raw);
            if !v.valid_json {
                prop_assert_eq!(v.score, JudgeScore::Borderline);
                prop_assert!(v.cited_turns.is_empty());
                prop_assert_eq!(v.raw_output.as_deref(), Some(raw.as_str()));
            }
        }

        #[test]
        fn extracted_span_is_balanced(raw in "[{}a-z ]{0,40}") {
            if let Some(span) = extract_first_json_object(&raw) {
                prop_assert!(span.starts_with('{') && span.ends_with('}'), "span {:?}", span);
                let opens = span.matches('{').count();
                let closes = span.matches('}').count();
                prop_assert_eq!(opens, closes);
            }
        }
    }
}
