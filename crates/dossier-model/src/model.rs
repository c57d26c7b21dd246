//! The [`ChatModel`] trait: the abstraction boundary between dossier and
//! whatever produces text.
//!
//! Implementations make exactly one attempt per [`ChatModel::complete`] call.
//! Retry and timeout decisions live in [`generate`], driven by an explicit
//! [`CallPolicy`], so every backend gets the same behaviour.

use std::time::Duration;

use tracing::{debug, warn};

use crate::error::ModelError;
use crate::policy::CallPolicy;
use crate::types::{ChatMessage, GenerateConfig};

/// A request/response text generator.
///
/// # Object safety
///
/// This trait is object-safe. Callers may hold `&dyn ChatModel` or
/// `Box<dyn ChatModel>`.
pub trait ChatModel {
    /// Short backend description for logs (e.g. `"http:api.openai.com"`).
    fn describe(&self) -> String;

    /// Make one generation attempt over `messages`.
    ///
    /// `timeout` is the per-attempt limit from the active [`CallPolicy`];
    /// backends that can enforce it must, and report [`ModelError::Timeout`].
    ///
    /// # Errors
    /// Returns [`ModelError`] if the attempt fails for any reason.
    fn complete(
        &self,
        messages: &[ChatMessage],
        config: &GenerateConfig,
        timeout: Option<Duration>,
    ) -> Result<String, ModelError>;
}

impl<M: ChatModel + ?Sized> ChatModel for &M {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn complete(
        &self,
        messages: &[ChatMessage],
        config: &GenerateConfig,
        timeout: Option<Duration>,
    ) -> Result<String, ModelError> {
        (**self).complete(messages, config, timeout)
    }
}

impl<M: ChatModel + ?Sized> ChatModel for Box<M> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn complete(
        &self,
        messages: &[ChatMessage],
        config: &GenerateConfig,
        timeout: Option<Duration>,
    ) -> Result<String, ModelError> {
        (**self).complete(messages, config, timeout)
    }
}

/// Generate a completion under `policy`.
///
/// Makes up to [`CallPolicy::attempts`] calls, stopping at the first success
/// or the first non-retryable error. With the default policy this is a
/// single call whose error is returned unchanged.
///
/// # Errors
/// Returns the failing attempt's [`ModelError`], wrapped in
/// [`ModelError::Exhausted`] when more than one attempt was made.
pub fn generate<M: ChatModel + ?Sized>(
    model: &M,
    messages: &[ChatMessage],
    config: &GenerateConfig,
    policy: &CallPolicy,
) -> Result<String, ModelError> {
    let attempts = policy.attempts();
    let mut attempt = 0;
    loop {
        attempt += 1;
        debug!(
            backend = %model.describe(),
            model = %config.model,
            attempt,
            messages = messages.len(),
            "model call"
        );
        match model.complete(messages, config, policy.timeout) {
            Ok(text) => return Ok(text),
            Err(err) if attempt < attempts && err.is_retryable() => {
                warn!(attempt, error = %err, "model call failed; retrying");
            }
            Err(err) if attempt > 1 => {
                return Err(ModelError::Exhausted {
                    attempts: attempt,
                    last: Box::new(err),
                });
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripted::ScriptedModel;

    fn cfg() -> GenerateConfig {
        GenerateConfig::new("test/model", 0.0)
    }

    #[test]
    fn default_policy_makes_one_attempt() {
        let model = ScriptedModel::new(Vec::<Result<String, ModelError>>::new());
        let err = generate(&model, &[ChatMessage::user("hi")], &cfg(), &CallPolicy::none())
            .unwrap_err();
        assert!(matches!(err, ModelError::Script { .. }), "{err}");
        assert_eq!(model.calls().len(), 1);
    }

    #[test]
    fn retryable_errors_consume_budget() {
        let model = ScriptedModel::new(vec![
            Err(ModelError::Timeout { elapsed_ms: 10 }),
            Err(ModelError::Status {
                status: 503,
                body: String::new(),
            }),
            Ok("third time".to_owned()),
        ]);
        let policy = CallPolicy::none().with_max_retries(2);
        let text = generate(&model, &[ChatMessage::user("hi")], &cfg(), &policy).unwrap();
        assert_eq!(text, "third time");
        assert_eq!(model.calls().len(), 3);
    }

    #[test]
    fn non_retryable_error_stops_immediately() {
        let model = ScriptedModel::new(vec![
            Err(ModelError::Status {
                status: 401,
                body: "bad key".to_owned(),
            }),
            Ok("never reached".to_owned()),
        ]);
        let policy = CallPolicy::none().with_max_retries(5);
        let err = generate(&model, &[ChatMessage::user("hi")], &cfg(), &policy).unwrap_err();
        assert!(matches!(err, ModelError::Status { status: 401, .. }), "{err}");
        assert_eq!(model.calls().len(), 1);
    }

    #[test]
    fn exhausted_budget_wraps_last_error() {
        let model = ScriptedModel::new(vec![
            Err(ModelError::Timeout { elapsed_ms: 1 }),
            Err(ModelError::Timeout { elapsed_ms: 2 }),
        ]);
        let policy = CallPolicy::none().with_max_retries(1);
        let err = generate(&model, &[ChatMessage::user("hi")], &cfg(), &policy).unwrap_err();
        match err {
            ModelError::Exhausted { attempts, last } => {
                assert_eq!(attempts, 2);
                assert!(matches!(*last, ModelError::Timeout { elapsed_ms: 2 }));
            }
            other => panic!("expected Exhausted, got {other:?}"),
        }
    }
}
