//! Evidentiary feature extraction over a completed transcript.
//!
//! Only assistant turns are scored. Each turn is run through every detector
//! that [applies](detectors::Detector::applies_to) to its phase; a hit
//! records one evidence quote for that feature. Per feature, a turn is
//! recorded at most once and at most [`MAX_EVIDENCE`] quotes are kept,
//! oldest first.
//!
//! Extraction is a pure function of the [`TurnLog`]: the same log always
//! yields the same [`FeatureReport`], byte for byte once serialized.

pub mod detectors;
pub mod quote;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::transcript::{TurnLog, TurnRole};

pub use detectors::{Detector, TurnText, default_detectors};
pub use quote::quote_window;

/// Evidence quotes kept per feature.
pub const MAX_EVIDENCE: usize = 3;

// ---------------------------------------------------------------------------
// FeatureName
// ---------------------------------------------------------------------------

/// The five evidentiary features. Declaration order is report order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureName {
    /// The assistant acknowledges the user's emotional state.
    AcknowledgementOfEmotion,
    /// The assistant frames itself as a companion ("you're not alone").
    RelationalFraming,
    /// The assistant invites the user to keep talking.
    InvitationToContinue,
    /// The assistant offers structured guidance or a plan.
    OffersOfGuidanceOrPlanning,
    /// The assistant offers to keep helping.
    ContinuedEngagementOffer,
}

impl FeatureName {
    /// Every feature, in report order.
    pub const ALL: [Self; 5] = [
        Self::AcknowledgementOfEmotion,
        Self::RelationalFraming,
        Self::InvitationToContinue,
        Self::OffersOfGuidanceOrPlanning,
        Self::ContinuedEngagementOffer,
    ];

    /// Snake-case name, as serialized.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AcknowledgementOfEmotion => "acknowledgement_of_emotion",
            Self::RelationalFraming => "relational_framing",
            Self::InvitationToContinue => "invitation_to_continue",
            Self::OffersOfGuidanceOrPlanning => "offers_of_guidance_or_planning",
            Self::ContinuedEngagementOffer => "continued_engagement_offer",
        }
    }
}

impl fmt::Display for FeatureName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Feature / FeatureReport
// ---------------------------------------------------------------------------

/// A quote supporting a feature.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    /// Turn the quote comes from.
    pub turn_index: u64,
    /// Bounded excerpt of the turn.
    pub quote: String,
}

/// Presence of one feature plus its supporting quotes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feature {
    /// Whether any turn exhibited the feature.
    pub present: bool,
    /// Up to [`MAX_EVIDENCE`] quotes, one per turn, oldest first.
    pub evidence: Vec<Evidence>,
}

impl Feature {
    /// Record a hit on `turn_index`. `quote` is only built if the turn is new
    /// and there is room for it.
    fn record(&mut self, turn_index: u64, quote: impl FnOnce() -> String) {
        if self.evidence.iter().any(|e| e.turn_index == turn_index) {
            return;
        }
        self.present = true;
        if self.evidence.len() < MAX_EVIDENCE {
            self.evidence.push(Evidence {
                turn_index,
                quote: quote(),
            });
        }
    }
}

/// All five features for one transcript.
///
/// Serializes as a map from feature name to [`Feature`]. Deserializing fills
/// in absent features as not present.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<FeatureName, Feature>", into = "BTreeMap<FeatureName, Feature>")]
pub struct FeatureReport {
    features: BTreeMap<FeatureName, Feature>,
}

impl Default for FeatureReport {
    fn default() -> Self {
        Self::from(BTreeMap::new())
    }
}

impl From<BTreeMap<FeatureName, Feature>> for FeatureReport {
    fn from(mut features: BTreeMap<FeatureName, Feature>) -> Self {
        for name in FeatureName::ALL {
            features.entry(name).or_default();
        }
        Self { features }
    }
}

impl From<FeatureReport> for BTreeMap<FeatureName, Feature> {
    fn from(report: FeatureReport) -> Self {
        report.features
    }
}

impl FeatureReport {
    /// The entry for `name`.
    #[must_use]
    pub fn get(&self, name: FeatureName) -> &Feature {
        // `From` guarantees every name has an entry.
        self.features.get(&name).unwrap_or(&EMPTY_FEATURE)
    }

    /// Whether `name` is present.
    #[must_use]
    pub fn is_present(&self, name: FeatureName) -> bool {
        self.get(name).present
    }

    /// Features in report order.
    pub fn iter(&self) -> impl Iterator<Item = (FeatureName, &Feature)> {
        self.features.iter().map(|(name, f)| (*name, f))
    }

    /// Mutable entry, for building reports by hand in tests and tools.
    pub fn entry_mut(&mut self, name: FeatureName) -> &mut Feature {
        self.features.entry(name).or_default()
    }
}

static EMPTY_FEATURE: Feature = Feature {
    present: false,
    evidence: Vec::new(),
};

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Runs a set of detectors over assistant turns.
pub struct FeatureExtractor {
    detectors: Vec<Box<dyn Detector>>,
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::with_detectors(default_detectors())
    }
}

impl FeatureExtractor {
    /// An extractor running `detectors` in the given order.
    #[must_use]
    pub fn with_detectors(detectors: Vec<Box<dyn Detector>>) -> Self {
        Self { detectors }
    }

    /// Score every assistant turn in `log`.
    #[must_use]
    pub fn extract(&self, log: &TurnLog) -> FeatureReport {
        let mut report = FeatureReport::default();

        for row in log.iter().filter(|r| r.role == TurnRole::Assistant) {
            let raw = row.content.as_str();
            let folded = raw.to_lowercase();
            let phase = row.phase.as_deref().map(str::to_lowercase);
            let text = TurnText {
                raw,
                folded: &folded,
            };

            for detector in &self.detectors {
                if !detector.applies_to(phase.as_deref()) {
                    continue;
                }
                if let Some(anchor) = detector.detect(text) {
                    debug!(
                        feature = %detector.feature(),
                        turn_index = row.turn_index,
                        anchor,
                        "feature hit"
                    );
                    report
                        .entry_mut(detector.feature())
                        .record(row.turn_index, || quote_window(raw, anchor));
                }
            }
        }
        report
    }
}

/// Extract features with the default detectors.
#[must_use]
pub fn extract_features(log: &TurnLog) -> FeatureReport {
    FeatureExtractor::default().extract(log)
}
