//! OpenAI-compatible chat-completions backend.
//!
//! Speaks the `POST {base_url}/chat/completions` protocol shared by OpenAI,
//! OpenRouter, vLLM, llama.cpp server and friends. One call, one blocking
//! request: retries and timeouts come from [`generate`](crate::generate).

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ModelError;
use crate::model::ChatModel;
use crate::types::{ChatMessage, GenerateConfig};

/// Longest response body kept in a [`ModelError::Status`].
const MAX_ERROR_BODY: usize = 2048;

/// Where and how to reach a chat-completions server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpEndpoint {
    /// Base URL up to and including the API version, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    /// Bearer token, if the server requires one.
    pub api_key: Option<String>,
    /// Provider namespace stripped from model ids before sending
    /// (`"openai"` turns `openai/gpt-4.1` into `gpt-4.1`).
    pub provider_prefix: Option<String>,
}

impl HttpEndpoint {
    /// The model name as the server expects it.
    #[must_use]
    pub fn wire_model<'a>(&self, model: &'a str) -> &'a str {
        match &self.provider_prefix {
            Some(prefix) => model
                .strip_prefix(prefix.as_str())
                .and_then(|rest| rest.strip_prefix('/'))
                .unwrap_or(model),
            None => model,
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

/// [`ChatModel`] backed by a blocking `reqwest` client.
#[derive(Debug)]
pub struct HttpChatModel {
    endpoint: HttpEndpoint,
    client: reqwest::blocking::Client,
}

impl HttpChatModel {
    /// Build a backend for `endpoint`.
    ///
    /// # Errors
    /// Returns [`ModelError::Transport`] if the HTTP client cannot be built
    /// (e.g. the TLS backend fails to initialise).
    pub fn new(endpoint: HttpEndpoint) -> Result<Self, ModelError> {
        let client = reqwest::blocking::Client::builder()
            // Per-request timeouts come from the call policy.
            .timeout(None::<Duration>)
            .build()
            .map_err(|e| ModelError::Transport {
                endpoint: endpoint.base_url.clone(),
                message: e.to_string(),
            })?;
        Ok(Self { endpoint, client })
    }

    /// The endpoint this backend talks to.
    #[must_use]
    pub const fn endpoint(&self) -> &HttpEndpoint {
        &self.endpoint
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatModel for HttpChatModel {
    fn describe(&self) -> String {
        format!("http:{}", self.endpoint.base_url)
    }

    fn complete(
        &self,
        messages: &[ChatMessage],
        config: &GenerateConfig,
        timeout: Option<Duration>,
    ) -> Result<String, ModelError> {
        let url = self.endpoint.completions_url();
        let body = CompletionRequest {
            model: self.endpoint.wire_model(&config.model),
            messages,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        };

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.endpoint.api_key {
            request = request.bearer_auth(key);
        }
        if let Some(limit) = timeout {
            request = request.timeout(limit);
        }

        let response = request.send().map_err(|e| {
            if e.is_timeout() {
                ModelError::Timeout {
                    elapsed_ms: timeout.map_or(0, |t| t.as_millis()),
                }
            } else {
                ModelError::Transport {
                    endpoint: url.clone(),
                    message: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        let text = response.text().map_err(|e| ModelError::Transport {
            endpoint: url.clone(),
            message: format!("reading response body: {e}"),
        })?;
        debug!(status = status.as_u16(), bytes = text.len(), "chat completion response");

        if !status.is_success() {
            return Err(ModelError::Status {
                status: status.as_u16(),
                body: truncate(&text, MAX_ERROR_BODY),
            });
        }

        parse_completion(&text, &config.model)
    }
}

/// Pull the first choice's text out of a chat-completions response body.
///
/// A choice with `null` content yields an empty string; a body with no
/// choices at all is an [`ModelError::EmptyResponse`].
fn parse_completion(body: &str, model: &str) -> Result<String, ModelError> {
    let parsed: CompletionResponse =
        serde_json::from_str(body).map_err(|e| ModelError::Decode {
            message: e.to_string(),
        })?;
    parsed
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content.unwrap_or_default())
        .ok_or_else(|| ModelError::EmptyResponse {
            model: model.to_owned(),
        })
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_owned(),
    }
}
