//! Error types for model calls.
//!
//! [`ModelError`] is the single error type returned by all
//! [`ChatModel`](crate::ChatModel) methods. Variants are split by failure mode
//! so [`generate`](crate::generate) can decide what is worth another attempt
//! without parsing messages.

use thiserror::Error;

/// Errors returned by [`ChatModel`](crate::ChatModel) operations.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The request never produced an HTTP response (DNS, TLS, connection reset).
    #[error("transport error talking to `{endpoint}`: {message}")]
    Transport {
        /// The URL that was being called.
        endpoint: String,
        /// Description from the HTTP client.
        message: String,
    },

    /// The provider answered with a non-success status code.
    #[error("provider returned HTTP {status}: {body}")]
    Status {
        /// The HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// The response body could not be decoded into a completion.
    #[error("could not decode provider response: {message}")]
    Decode {
        /// What was wrong with the body.
        message: String,
    },

    /// The provider answered successfully but returned no generated text.
    #[error("provider returned no completion text for model `{model}`")]
    EmptyResponse {
        /// The model that was asked.
        model: String,
    },

    /// The call exceeded the timeout configured in the call policy.
    #[error("model call timed out after {elapsed_ms} ms")]
    Timeout {
        /// The configured timeout, in milliseconds.
        elapsed_ms: u128,
    },

    /// Every attempt allowed by the call policy failed.
    #[error("model call failed after {attempts} attempts; last error: {last}")]
    Exhausted {
        /// How many attempts were made.
        attempts: u32,
        /// The error from the final attempt.
        #[source]
        last: Box<ModelError>,
    },

    /// A scripted test double ran out of replies or was told to fail.
    #[error("scripted model: {message}")]
    Script {
        /// Why the scripted call failed.
        message: String,
    },
}

impl ModelError {
    /// Whether another attempt could plausibly succeed.
    ///
    /// Transport failures, timeouts, rate limiting (429) and 5xx responses are
    /// retryable. Decode failures, client errors and scripted failures are not.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } | Self::Timeout { .. } => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Decode { .. }
            | Self::EmptyResponse { .. }
            | Self::Exhausted { .. }
            | Self::Script { .. } => false,
        }
    }
}
