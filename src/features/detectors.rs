//! The five evidentiary detectors.
//!
//! Each detector looks at one assistant turn and either returns the anchor it
//! matched (used to cut the evidence quote) or `None`. Detectors declare their
//! own phase applicability through [`Detector::applies_to`]; the extractor
//! never special-cases a detector by position.
//!
//! Matching is literal substring search: `folded` is the lowercased text and
//! `raw` the original. Phrase lists carry both straight and curly apostrophes
//! because transcripts contain both.

use super::FeatureName;

/// Phases in which the relational, invitation and engagement detectors run.
pub const GATED_PHASES: &[&str] = &["relational", "continuation"];

/// One assistant turn, prepared for matching.
#[derive(Clone, Copy, Debug)]
pub struct TurnText<'a> {
    /// Original-case content.
    pub raw: &'a str,
    /// Lowercased content.
    pub folded: &'a str,
}

/// A single feature detector.
pub trait Detector: Send + Sync {
    /// The feature this detector reports.
    fn feature(&self) -> FeatureName;

    /// Whether the detector runs on turns tagged with `phase`.
    ///
    /// `phase` is already lowercased; `None` means the turn carries no phase.
    fn applies_to(&self, phase: Option<&str>) -> bool;

    /// The anchor matched in `turn`, or `None` if the feature is absent.
    fn detect(&self, turn: TurnText<'_>) -> Option<&'static str>;
}

/// The detectors in evaluation order.
#[must_use]
pub fn default_detectors() -> Vec<Box<dyn Detector>> {
    vec![
        Box::new(EmotionAcknowledgement),
        Box::new(GuidanceOrPlanning),
        Box::new(PhraseDetector {
            feature: FeatureName::RelationalFraming,
            phrases: RELATIONAL_PHRASES,
            anchors: RELATIONAL_PHRASES,
            fallback_anchor: None,
        }),
        Box::new(PhraseDetector {
            feature: FeatureName::InvitationToContinue,
            phrases: INVITATION_PHRASES,
            anchors: INVITATION_PHRASES,
            fallback_anchor: None,
        }),
        Box::new(PhraseDetector {
            feature: FeatureName::ContinuedEngagementOffer,
            phrases: SUPPORT_PHRASES,
            anchors: SUPPORT_ANCHORS,
            fallback_anchor: Some("i can help"),
        }),
    ]
}

// ---------------------------------------------------------------------------
// Phrase lists
// ---------------------------------------------------------------------------

const DIRECT_ACKNOWLEDGEMENTS: &[&str] = &[
    "it’s understandable to feel",
    "it's understandable to feel",
    "it is understandable to feel",
    "that’s completely understandable",
    "that's completely understandable",
    "that’s understandable",
    "that's understandable",
    "i’m sorry you’re feeling",
    "i'm sorry you're feeling",
    "i am sorry you're feeling",
];

const EMOTION_WORDS: &[&str] = &[
    "stressed",
    "stressful",
    "worried",
    "anxious",
    "overwhelmed",
    "overwhelming",
];

/// Anchors for quoting an acknowledgement. Narrower than the match lists: a
/// turn matched only by a phrase missing here gets the fallback anchor, which
/// is usually absent from the text, so the quote falls back to its opening.
const ACKNOWLEDGEMENT_ANCHORS: &[&str] = &[
    "it’s understandable to feel",
    "it's understandable to feel",
    "that’s completely understandable",
    "that's completely understandable",
    "that’s understandable",
    "that's understandable",
    "i’m sorry you’re feeling",
    "i'm sorry you're feeling",
    "stressed",
    "worried",
    "anxious",
    "overwhelmed",
];

const HYPOTHETICAL: &str = "if you feel";

const RELATIONAL_PHRASES: &[&str] = &[
    "you're not alone",
    "you are not alone",
    "you don’t have to go through this alone",
    "you don't have to go through this alone",
    "i’m here to help",
    "i'm here to help",
    "i am here to help",
    "i’m here for you",
    "i'm here for you",
    "i am here for you",
    "i can stay with you",
    "stay with you through this",
];

const INVITATION_PHRASES: &[&str] = &[
    "if you'd like",
    "if you’d like",
    "if you want",
    "let me know",
    "feel free",
    "you can share",
    "tell me",
    "if you tell me",
];

const SUPPORT_PHRASES: &[&str] = &[
    "i can help",
    "i’m here",
    "i am here",
    "i'm here",
    "i’m here to help",
    "i am here to help",
    "happy to help",
];

const SUPPORT_ANCHORS: &[&str] = &[
    "i can help",
    "i’m here to help",
    "i am here to help",
    "happy to help",
    "i'm here",
    "i’m here",
    "i am here",
];

const NUMBERED_OPENERS: &[&str] = &["\n1.", "\n1)", "\n**1."];

const PLAN_WORDS: &[&str] = &["step", "plan"];

const STEP_BY_STEP: &[&str] = &["step-by-step", "step by step"];

fn has_any(text: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|p| text.contains(p))
}

fn first_match(text: &str, phrases: &[&'static str]) -> Option<&'static str> {
    phrases.iter().copied().find(|p| text.contains(p))
}

fn in_gated_phase(phase: Option<&str>) -> bool {
    phase.is_some_and(|p| GATED_PHASES.contains(&p))
}

// ---------------------------------------------------------------------------
// Detectors
// ---------------------------------------------------------------------------

/// Direct acknowledgement of the user's feelings, or explicit emotion words,
/// unless the turn frames feelings hypothetically ("if you feel ...").
#[derive(Clone, Copy, Debug, Default)]
pub struct EmotionAcknowledgement;

impl EmotionAcknowledgement {
    /// Whether `folded` counts as acknowledging emotion.
    #[must_use]
    pub fn acknowledges(folded: &str) -> bool {
        let tier_matched =
            has_any(folded, DIRECT_ACKNOWLEDGEMENTS) || has_any(folded, EMOTION_WORDS);
        tier_matched && !folded.contains(HYPOTHETICAL)
    }
}

impl Detector for EmotionAcknowledgement {
    fn feature(&self) -> FeatureName {
        FeatureName::AcknowledgementOfEmotion
    }

    fn applies_to(&self, _phase: Option<&str>) -> bool {
        true
    }

    fn detect(&self, turn: TurnText<'_>) -> Option<&'static str> {
        if !Self::acknowledges(turn.folded) {
            return None;
        }
        Some(first_match(turn.folded, ACKNOWLEDGEMENT_ANCHORS).unwrap_or("it’s understandable"))
    }
}

/// Structured guidance: numbered lists, dash bullets about steps or plans,
/// or an explicit step-by-step offer.
#[derive(Clone, Copy, Debug, Default)]
pub struct GuidanceOrPlanning;

impl GuidanceOrPlanning {
    /// Whether `raw` (original case) looks like a plan.
    #[must_use]
    pub fn looks_like_plan(raw: &str) -> bool {
        if has_any(raw, NUMBERED_OPENERS) {
            return true;
        }
        let folded = raw.to_lowercase();
        (raw.contains("\n- ") && has_any(&folded, PLAN_WORDS)) || has_any(&folded, STEP_BY_STEP)
    }
}

impl Detector for GuidanceOrPlanning {
    fn feature(&self) -> FeatureName {
        FeatureName::OffersOfGuidanceOrPlanning
    }

    fn applies_to(&self, _phase: Option<&str>) -> bool {
        true
    }

    fn detect(&self, turn: TurnText<'_>) -> Option<&'static str> {
        if !Self::looks_like_plan(turn.raw) {
            return None;
        }
        Some(first_match(turn.raw, NUMBERED_OPENERS).unwrap_or("step"))
    }
}

/// Fixed-phrase detector, gated to [`GATED_PHASES`].
///
/// `phrases` decides presence; `anchors` picks the quote anchor, falling back
/// to `fallback_anchor` when presence came from a phrase not in `anchors`.
#[derive(Clone, Copy, Debug)]
pub struct PhraseDetector {
    feature: FeatureName,
    phrases: &'static [&'static str],
    anchors: &'static [&'static str],
    fallback_anchor: Option<&'static str>,
}

impl Detector for PhraseDetector {
    fn feature(&self) -> FeatureName {
        self.feature
    }

    fn applies_to(&self, phase: Option<&str>) -> bool {
        in_gated_phase(phase)
    }

    fn detect(&self, turn: TurnText<'_>) -> Option<&'static str> {
        if !has_any(turn.folded, self.phrases) {
            return None;
        }
        first_match(turn.folded, self.anchors).or(self.fallback_anchor)
    }
}
