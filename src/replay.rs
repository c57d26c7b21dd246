//! Dialogue replay: walk a scenario graph against a model and record every turn.
//!
//! # State machine
//!
//! ```text
//! [system prompt?] ─▶ AwaitingNode(entry)
//! AwaitingNode(user)      ─ emit user turn ─▶ AwaitingNode(branch target | default_next) | Terminated
//! AwaitingNode(assistant) ─ generate, emit ─▶ AwaitingNode(default_next if it is a user node) | Terminated
//! ```
//!
//! An assistant node continues only when the node *declared after it* is a
//! user node, whichever branch led to it. Two assistant nodes in a row end
//! the walk after the first.
//!
//! Every turn reaches the [`TurnSink`] before the next step starts. A
//! generation failure aborts the run without recording a turn for the
//! failed call; whatever was already appended stays valid.

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use dossier_model::{CallPolicy, ChatMessage, ChatModel, GenerateConfig, ModelError, generate};
use tracing::{debug, info, info_span};

use crate::scenario::{Node, NodeRole, ScenarioError, ScenarioGraph, select_branch};
use crate::transcript::{TranscriptError, TurnLog, TurnRecord, TurnRole, TurnSink};

/// Node id recorded on the system-prompt turn.
pub const SYSTEM_NODE_ID: &str = "system";

// ---------------------------------------------------------------------------
// Settings and errors
// ---------------------------------------------------------------------------

/// Everything a replay needs besides the graph and the model.
#[derive(Clone, Debug)]
pub struct ReplaySettings {
    /// Label used to pick among a user node's branches.
    pub branch_label: String,
    /// Model id and sampling settings for assistant turns.
    pub target: GenerateConfig,
    /// Timeout/retry policy for each generation call.
    pub policy: CallPolicy,
}

impl ReplaySettings {
    /// Settings with the default (single attempt, no timeout) policy.
    pub fn new(branch_label: impl Into<String>, target: GenerateConfig) -> Self {
        Self {
            branch_label: branch_label.into(),
            target,
            policy: CallPolicy::none(),
        }
    }
}

/// Fatal replay failures.
#[derive(Debug)]
pub enum ReplayError {
    /// Missing node, unmatched branch label or malformed node.
    Scenario(ScenarioError),

    /// The model call for an assistant node failed.
    Generation {
        /// The assistant node being generated.
        node_id: String,
        /// What the model layer reported.
        source: ModelError,
    },

    /// A turn could not be appended to the transcript.
    Transcript(TranscriptError),

    /// The walk reached a node it had already visited. With a fixed branch
    /// label every later step would repeat, so the walk could never end.
    Cycle {
        /// The node reached a second time.
        node_id: String,
    },
}

impl fmt::Display for ReplayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scenario(e) => write!(f, "scenario error: {e}"),
            Self::Generation { node_id, source } => {
                write!(f, "generation failed at assistant node '{node_id}': {source}")
            }
            Self::Transcript(e) => write!(f, "transcript error: {e}"),
            Self::Cycle { node_id } => write!(
                f,
                "replay revisited node '{node_id}' and would loop forever.\n  \
                 To fix: break the branch cycle through '{node_id}' in the scenario."
            ),
        }
    }
}

impl std::error::Error for ReplayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Scenario(e) => Some(e),
            Self::Generation { source, .. } => Some(source),
            Self::Transcript(e) => Some(e),
            Self::Cycle { .. } => None,
        }
    }
}

impl From<ScenarioError> for ReplayError {
    fn from(e: ScenarioError) -> Self {
        Self::Scenario(e)
    }
}

impl From<TranscriptError> for ReplayError {
    fn from(e: TranscriptError) -> Self {
        Self::Transcript(e)
    }
}

// ---------------------------------------------------------------------------
// Replayer
// ---------------------------------------------------------------------------

/// Result of a completed walk.
#[derive(Clone, Debug)]
pub struct ReplayOutcome {
    /// Every emitted turn, in order.
    pub log: TurnLog,
    /// Scenario node ids visited, in order.
    pub visited: Vec<String>,
    /// The conversation context as last sent to or received from the model.
    pub context: Vec<ChatMessage>,
}

#[derive(Debug)]
enum ReplayState {
    AwaitingNode(String),
    Terminated,
}

/// Walks a [`ScenarioGraph`] against a [`ChatModel`].
pub struct DialogueReplayer<'a, M: ChatModel + ?Sized> {
    graph: &'a ScenarioGraph,
    model: &'a M,
    settings: &'a ReplaySettings,
}

impl<'a, M: ChatModel + ?Sized> DialogueReplayer<'a, M> {
    /// A replayer over `graph` that generates assistant turns with `model`.
    pub const fn new(graph: &'a ScenarioGraph, model: &'a M, settings: &'a ReplaySettings) -> Self {
        Self {
            graph,
            model,
            settings,
        }
    }

    /// Replay the scenario from its entry node.
    ///
    /// `context` is the caller's initial conversation. If its first message
    /// is a system message, that message is recorded as turn 0 with node id
    /// `"system"` before the walk begins. The context is then extended with
    /// every user and assistant turn and sent whole to the model at each
    /// assistant node.
    ///
    /// # Errors
    /// Any [`ReplayError`]. Turns already appended to `sink` remain.
    pub fn replay(
        &self,
        mut context: Vec<ChatMessage>,
        sink: &mut dyn TurnSink,
    ) -> Result<ReplayOutcome, ReplayError> {
        let span = info_span!(
            "replay",
            scenario = self.graph.name().unwrap_or("unnamed"),
            branch_label = %self.settings.branch_label,
            model = %self.settings.target.model,
        );
        let _enter = span.enter();

        let mut emitter = Emitter {
            sink,
            log: TurnLog::new(),
        };
        let mut visited = Vec::new();
        let mut seen = HashSet::new();

        if let Some(first) = context.first()
            && first.role == dossier_model::Role::System
        {
            let content = first.content.clone();
            emitter.emit(TurnRole::System, content, Some(SYSTEM_NODE_ID), None)?;
        }

        let mut state = ReplayState::AwaitingNode(self.graph.entry().to_owned());
        while let ReplayState::AwaitingNode(id) = state {
            let node = self.graph.node(&id)?;
            if !seen.insert(node.id.as_str()) {
                return Err(ReplayError::Cycle { node_id: id });
            }
            visited.push(node.id.clone());
            state = match node.role {
                NodeRole::User => self.step_user(node, &mut context, &mut emitter)?,
                NodeRole::Assistant => self.step_assistant(node, &mut context, &mut emitter)?,
            };
        }

        info!(turns = emitter.log.len(), nodes = visited.len(), "replay terminated");
        Ok(ReplayOutcome {
            log: emitter.log,
            visited,
            context,
        })
    }

    fn step_user(
        &self,
        node: &Node,
        context: &mut Vec<ChatMessage>,
        emitter: &mut Emitter<'_>,
    ) -> Result<ReplayState, ReplayError> {
        let content = node.content.clone().ok_or_else(|| {
            ScenarioError::invalid(Some(&node.id), "user node has no content")
        })?;
        context.push(ChatMessage::user(content.clone()));
        emitter.emit(TurnRole::User, content, Some(&node.id), node.phase.as_deref())?;

        let next = if node.branches.is_some() {
            Some(select_branch(node, &self.settings.branch_label)?.to_owned())
        } else {
            node.default_next.clone()
        };
        Ok(next.map_or(ReplayState::Terminated, ReplayState::AwaitingNode))
    }

    fn step_assistant(
        &self,
        node: &Node,
        context: &mut Vec<ChatMessage>,
        emitter: &mut Emitter<'_>,
    ) -> Result<ReplayState, ReplayError> {
        let content = generate(self.model, context.as_slice(), &self.settings.target, &self.settings.policy)
            .map_err(|source| ReplayError::Generation {
                node_id: node.id.clone(),
                source,
            })?;
        context.push(ChatMessage::assistant(content.clone()));
        emitter.emit(TurnRole::Assistant, content, Some(&node.id), node.phase.as_deref())?;

        let Some(next_id) = node.default_next.as_deref() else {
            return Ok(ReplayState::Terminated);
        };
        let next = self.graph.node(next_id)?;
        if next.is_user() {
            Ok(ReplayState::AwaitingNode(next.id.clone()))
        } else {
            debug!(node = %node.id, next = %next.id, "next declared node is not a user node; terminating");
            Ok(ReplayState::Terminated)
        }
    }
}

/// Node ids `label` would visit, without calling a model.
///
/// Assistant nodes are filled with empty text, so the walk follows exactly
/// the transitions [`DialogueReplayer::replay`] would take.
///
/// # Errors
/// The same scenario failures a real replay would hit.
pub fn dry_walk(graph: &ScenarioGraph, branch_label: &str) -> Result<Vec<String>, ReplayError> {
    let settings = ReplaySettings::new(branch_label, GenerateConfig::new("dry-run", 0.0));
    let mut log = TurnLog::new();
    let outcome = DialogueReplayer::new(graph, &SilentModel, &settings).replay(Vec::new(), &mut log)?;
    Ok(outcome.visited)
}

struct SilentModel;

impl ChatModel for SilentModel {
    fn describe(&self) -> String {
        "dry-run".to_owned()
    }

    fn complete(
        &self,
        _messages: &[ChatMessage],
        _config: &GenerateConfig,
        _timeout: Option<Duration>,
    ) -> Result<String, ModelError> {
        Ok(String::new())
    }
}

/// Assigns indices and writes each turn to the sink, then the in-memory log.
struct Emitter<'s> {
    sink: &'s mut dyn TurnSink,
    log: TurnLog,
}

impl Emitter<'_> {
    fn emit(
        &mut self,
        role: TurnRole,
        content: String,
        node_id: Option<&str>,
        phase: Option<&str>,
    ) -> Result<(), ReplayError> {
        let record = TurnRecord {
            turn_index: self.log.next_index(),
            role,
            content,
            node_id: node_id.map(str::to_owned),
            phase: phase.map(str::to_owned),
        };
        self.sink.append(&record)?;
        debug!(
            turn_index = record.turn_index,
            role = %record.role,
            node_id = record.node_id.as_deref().unwrap_or(""),
            "turn recorded"
        );
        self.log.append(&record)?;
        Ok(())
    }
}
