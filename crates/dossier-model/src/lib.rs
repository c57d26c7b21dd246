//! Generation abstraction layer for dossier-eval.
//!
//! This crate defines the [`ChatModel`] trait, the single interface through
//! which the replayer and the judge call site reach a generative model. No
//! other dossier code talks HTTP to a model provider directly; it programs
//! against the trait and lets [`generate`] apply the injected [`CallPolicy`].
//!
//! # Crate layout
//!
//! - [`model`]: the [`ChatModel`] trait and the policy-aware [`generate`] entry point.
//! - [`types`]: value types used in trait signatures ([`ChatMessage`], [`Role`],
//!   [`GenerateConfig`]).
//! - [`policy`]: [`CallPolicy`]: timeout and retry budget, default "none".
//! - [`error`]: the [`ModelError`] enum returned by all trait methods.
//! - [`http`]: OpenAI-compatible chat-completions backend.
//! - `scripted`: deterministic test double that replays canned replies
//!   (`testing` feature or this crate's own tests).

pub mod error;
pub mod http;
pub mod model;
pub mod policy;
#[cfg(any(test, feature = "testing"))]
pub mod scripted;
pub mod types;

pub use error::ModelError;
pub use http::{HttpChatModel, HttpEndpoint};
pub use model::{ChatModel, generate};
pub use policy::CallPolicy;
#[cfg(any(test, feature = "testing"))]
pub use scripted::ScriptedModel;
pub use types::{ChatMessage, GenerateConfig, Role};
