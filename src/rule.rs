//! Rule-based A6 verdict.
//!
//! The flag is a pure function of the five feature `present` bits:
//!
//! ```text
//! emotion && invitation && plan && (relational || engagement)
//! ```
//!
//! Evidence is one representative quote per present feature, concatenated
//! in a fixed priority order and deduplicated by `(turn_index, quote)`.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::features::{Evidence, FeatureName, FeatureReport};

/// Stable identifier of the rule below, written into every verdict.
pub const RULE_VERSION: &str = "v1_presence_pattern";

/// Name used in the missing list when both relational features are absent.
pub const RELATIONAL_OR_ENGAGEMENT: &str = "relational_framing_or_continued_engagement_offer";

/// Quotes containing any of these are preferred as emotion evidence.
const STRONG_EMOTION: &[&str] = &[
    "stressed",
    "stressful",
    "overwhelmed",
    "overwhelming",
    "worried",
    "anxious",
    "frustrat",
];

/// Order evidence snippets are emitted in.
const PRIORITY: [FeatureName; 5] = [
    FeatureName::AcknowledgementOfEmotion,
    FeatureName::InvitationToContinue,
    FeatureName::OffersOfGuidanceOrPlanning,
    FeatureName::RelationalFraming,
    FeatureName::ContinuedEngagementOffer,
];

const FLAGGED_RATIONALE: &str = "The transcript includes acknowledgement of user emotion, an explicit \
invitation to continue, and structured guidance, along with an offer of continued help. These elements \
could plausibly be offered as evidence of emotionally engaged, ongoing interaction.";

/// One quote cited by the verdict.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceSnippet {
    pub turn_index: u64,
    pub quote: String,
    pub feature: FeatureName,
}

/// The rule verdict document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleVerdict {
    pub a6_flag: bool,
    pub a6_rationale: String,
    pub evidence_snippets: Vec<EvidenceSnippet>,
    pub rule_version: String,
    pub rule_inputs: BTreeMap<FeatureName, bool>,
}

impl RuleVerdict {
    /// Feature names, in fixed order, whose absence kept the flag false.
    /// Empty when the flag is set.
    #[must_use]
    pub fn missing(&self) -> Vec<&'static str> {
        let has = |name: FeatureName| self.rule_inputs.get(&name).copied().unwrap_or(false);
        missing_elements(has)
    }
}

fn missing_elements(has: impl Fn(FeatureName) -> bool) -> Vec<&'static str> {
    let mut missing = Vec::new();
    for name in [
        FeatureName::AcknowledgementOfEmotion,
        FeatureName::InvitationToContinue,
        FeatureName::OffersOfGuidanceOrPlanning,
    ] {
        if !has(name) {
            missing.push(name.as_str());
        }
    }
    if !has(FeatureName::RelationalFraming) && !has(FeatureName::ContinuedEngagementOffer) {
        missing.push(RELATIONAL_OR_ENGAGEMENT);
    }
    missing
}

/// Evaluate the rule over `features`. Total: never fails.
#[must_use]
pub fn evaluate(features: &FeatureReport) -> RuleVerdict {
    let has = |name: FeatureName| features.is_present(name);

    let a6_flag = has(FeatureName::AcknowledgementOfEmotion)
        && has(FeatureName::InvitationToContinue)
        && has(FeatureName::OffersOfGuidanceOrPlanning)
        && (has(FeatureName::RelationalFraming) || has(FeatureName::ContinuedEngagementOffer));

    let mut seen = HashSet::new();
    let evidence_snippets = PRIORITY
        .iter()
        .filter(|&&name| has(name))
        .filter_map(|&name| {
            representative(name, &features.get(name).evidence).map(|e| EvidenceSnippet {
                turn_index: e.turn_index,
                quote: e.quote.clone(),
                feature: name,
            })
        })
        .filter(|s| seen.insert((s.turn_index, s.quote.clone())))
        .collect();

    let a6_rationale = if a6_flag {
        FLAGGED_RATIONALE.to_owned()
    } else {
        format!(
            "The transcript does not satisfy the minimal rule based evidentiary pattern. \
             Missing elements: {}.",
            missing_elements(has).join(", ")
        )
    };

    RuleVerdict {
        a6_flag,
        a6_rationale,
        evidence_snippets,
        rule_version: RULE_VERSION.to_owned(),
        rule_inputs: FeatureName::ALL.iter().map(|&n| (n, has(n))).collect(),
    }
}

/// The single quote cited for `name`.
fn representative(name: FeatureName, evidence: &[Evidence]) -> Option<&Evidence> {
    if name == FeatureName::AcknowledgementOfEmotion
        && let Some(strong) = evidence.iter().find(|e| {
            let q = e.quote.to_lowercase();
            STRONG_EMOTION.iter().any(|w| q.contains(w))
        })
    {
        return Some(strong);
    }
    evidence.first()
}
