//! Branching conversation scripts.
//!
//! A scenario is an ordered list of user and assistant nodes. User nodes
//! carry literal text and may declare labelled branches; assistant nodes are
//! placeholders filled in by the model under test. Loading a scenario
//! resolves every node's positional successor once, into an explicit
//! [`Node::default_next`] edge, so nothing downstream depends on list order.
//!
//! - [`graph`]: [`ScenarioGraph`], [`Node`], [`NodeSpec`] and validation.
//! - [`branch`]: [`select_branch`]: label → next node id.
//! - [`load`]: reading TOML/JSON scenario files from disk.

pub mod branch;
pub mod graph;
pub mod load;

use std::fmt;
use std::path::PathBuf;

pub use branch::select_branch;
pub use graph::{Branch, Node, NodeRole, NodeSpec, ScenarioDocument, ScenarioGraph, ScenarioMetadata};
pub use load::{LoadedScenario, load_scenario};

/// Entry node id used when the caller does not name one.
pub const DEFAULT_ENTRY_NODE: &str = "u1";

// ---------------------------------------------------------------------------
// ScenarioError
// ---------------------------------------------------------------------------

/// Errors raised while loading or walking a scenario. All of them are fatal
/// to a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScenarioError {
    /// A node id was referenced but no node with that id exists.
    NodeNotFound {
        /// The missing id.
        id: String,
        /// Where the reference came from (`"entry"` or a node id).
        referenced_from: String,
    },

    /// No branch on the node matched the configured label.
    BranchNotFound {
        /// The label that was looked up.
        label: String,
        /// The node whose branches were scanned.
        node_id: String,
        /// Conditions the node does declare, in order.
        available: Vec<String>,
    },

    /// The scenario is structurally invalid.
    InvalidScenario {
        /// The offending node, if the problem is local to one.
        node_id: Option<String>,
        /// What is wrong.
        reason: String,
    },

    /// The scenario file could not be read or parsed.
    Load {
        /// Path that was being loaded.
        path: PathBuf,
        /// Human-readable description of the problem.
        detail: String,
    },
}

impl ScenarioError {
    pub(crate) fn invalid(node_id: Option<&str>, reason: impl Into<String>) -> Self {
        Self::InvalidScenario {
            node_id: node_id.map(str::to_owned),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ScenarioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NodeNotFound {
                id,
                referenced_from,
            } => write!(
                f,
                "node '{id}' (referenced from {referenced_from}) does not exist in the scenario.\n  \
                 To fix: add a node with id '{id}' or correct the reference."
            ),
            Self::BranchNotFound {
                label,
                node_id,
                available,
            } => {
                write!(f, "branch '{label}' not found on node '{node_id}'")?;
                if available.is_empty() {
                    write!(f, " (the node declares no branches)")
                } else {
                    write!(
                        f,
                        ".\n  To fix: set the branch label to one of: {}",
                        available.join(", ")
                    )
                }
            }
            Self::InvalidScenario { node_id, reason } => match node_id {
                Some(id) => write!(f, "invalid scenario at node '{id}': {reason}"),
                None => write!(f, "invalid scenario: {reason}"),
            },
            Self::Load { path, detail } => {
                write!(f, "failed to load scenario {}: {detail}", path.display())
            }
        }
    }
}

impl std::error::Error for ScenarioError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn branch_not_found_lists_alternatives() {
        let err = ScenarioError::BranchNotFound {
            label: "ask_for_help".to_owned(),
            node_id: "u2".to_owned(),
            available: vec!["ask_for_guidance".to_owned(), "vent".to_owned()],
        };
        let msg = err.to_string();
        assert!(msg.contains("'ask_for_help'"), "{msg}");
        assert!(msg.contains("'u2'"), "{msg}");
        assert!(msg.contains("ask_for_guidance, vent"), "{msg}");
    }

    #[test]
    fn node_not_found_names_the_reference() {
        let err = ScenarioError::NodeNotFound {
            id: "a9".to_owned(),
            referenced_from: "u3".to_owned(),
        };
        assert!(err.to_string().contains("referenced from u3"));
    }
}
