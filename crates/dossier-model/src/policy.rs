//! Call policy: how long one attempt may take and how many attempts are allowed.
//!
//! The default policy is one attempt with no timeout, which is exactly the
//! single-shot behaviour the replayer and judge rely on. Callers that want
//! more must say so explicitly.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timeout and retry budget for a model call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallPolicy {
    /// Per-attempt timeout. `None` waits indefinitely.
    #[serde(default, with = "opt_secs")]
    pub timeout: Option<Duration>,
    /// Additional attempts after the first, for retryable errors only.
    #[serde(default)]
    pub max_retries: u32,
}

impl CallPolicy {
    /// One attempt, no timeout.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            timeout: None,
            max_retries: 0,
        }
    }

    /// Builder-style per-attempt timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Builder-style retry budget.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Total attempts this policy allows.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

mod opt_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(value: &Option<Duration>, ser: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => ser.serialize_some(&d.as_secs()),
            None => ser.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(de)?.map(Duration::from_secs))
    }
}
