//! Deterministic test double for [`ChatModel`].
//!
//! [`ScriptedModel`] hands out canned replies in order and records every
//! message list it was called with. An exhausted script fails with
//! [`ModelError::Script`], which is how tests simulate a generation failure
//! part-way through a replay.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use crate::error::ModelError;
use crate::model::ChatModel;
use crate::types::{ChatMessage, GenerateConfig};

/// A [`ChatModel`] that replays a fixed list of outcomes.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<String, ModelError>>>,
    calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedModel {
    /// A model that returns `replies` in order, one per call.
    pub fn new<I>(replies: I) -> Self
    where
        I: IntoIterator<Item = Result<String, ModelError>>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// A model that answers every call successfully, in order.
    pub fn replying<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(texts.into_iter().map(|t| Ok(t.into())))
    }

    /// Every message list this model has been called with, oldest first.
    #[must_use]
    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    /// Replies not yet handed out.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.replies.lock().map(|r| r.len()).unwrap_or_default()
    }
}

impl ChatModel for ScriptedModel {
    fn describe(&self) -> String {
        "scripted".to_owned()
    }

    fn complete(
        &self,
        messages: &[ChatMessage],
        _config: &GenerateConfig,
        _timeout: Option<Duration>,
    ) -> Result<String, ModelError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(messages.to_vec());
        }
        let next = self
            .replies
            .lock()
            .map_err(|_| ModelError::Script {
                message: "reply queue poisoned".to_owned(),
            })?
            .pop_front();
        next.unwrap_or_else(|| {
            Err(ModelError::Script {
                message: "no scripted reply left".to_owned(),
            })
        })
    }
}
