//! The immutable scenario graph.
//!
//! [`ScenarioDocument`] is the on-disk shape: metadata plus an ordered list of
//! [`NodeSpec`]s. [`ScenarioGraph::build`] validates it and produces resolved
//! [`Node`]s, each carrying its explicit `default_next` edge (the node that
//! follows it in declared order, or `None` for the last node).

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::ScenarioError;

// ---------------------------------------------------------------------------
// Serialized form
// ---------------------------------------------------------------------------

/// Who speaks at a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    /// Scripted text sent on the user's behalf.
    User,
    /// A turn produced by the model under test.
    Assistant,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => f.write_str("user"),
            Self::Assistant => f.write_str("assistant"),
        }
    }
}

/// One labelled continuation of a user node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Branch {
    /// Label that selects this branch (exact, case-sensitive).
    pub condition: String,
    /// Node to continue at when selected.
    pub next_node: String,
}

/// A node as declared in a scenario file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeSpec {
    /// Unique node id.
    pub id: String,
    /// Who speaks.
    pub role: NodeRole,
    /// Literal text; required for user nodes, ignored for assistant nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Optional phase tag used to gate detectors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    /// Labelled continuations (user nodes only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branches: Option<Vec<Branch>>,
}

impl NodeSpec {
    /// A user node with literal `content`.
    pub fn user(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: NodeRole::User,
            content: Some(content.into()),
            phase: None,
            branches: None,
        }
    }

    /// An assistant placeholder node.
    pub fn assistant(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: NodeRole::Assistant,
            content: None,
            phase: None,
            branches: None,
        }
    }

    /// Builder-style phase tag.
    #[must_use]
    pub fn with_phase(mut self, phase: impl Into<String>) -> Self {
        self.phase = Some(phase.into());
        self
    }

    /// Builder-style branch, appended after any existing ones.
    #[must_use]
    pub fn with_branch(mut self, condition: impl Into<String>, next_node: impl Into<String>) -> Self {
        self.branches.get_or_insert_with(Vec::new).push(Branch {
            condition: condition.into(),
            next_node: next_node.into(),
        });
        self
    }
}

/// Descriptive metadata carried alongside the nodes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioMetadata {
    /// Short machine-friendly name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario_name: Option<String>,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A scenario file: metadata plus nodes in declared order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioDocument {
    /// Descriptive metadata.
    #[serde(default)]
    pub metadata: ScenarioMetadata,
    /// Nodes, in traversal-fallback order.
    pub nodes: Vec<NodeSpec>,
}

// ---------------------------------------------------------------------------
// Resolved graph
// ---------------------------------------------------------------------------

/// A validated node with its default edge resolved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Node {
    /// Unique node id.
    pub id: String,
    /// Who speaks.
    pub role: NodeRole,
    /// Literal text (always present for user nodes).
    pub content: Option<String>,
    /// Optional phase tag.
    pub phase: Option<String>,
    /// Labelled continuations, if declared.
    pub branches: Option<Vec<Branch>>,
    /// The node that follows this one in declared order.
    pub default_next: Option<String>,
}

impl Node {
    /// Whether this node is spoken by the scripted user.
    #[must_use]
    pub fn is_user(&self) -> bool {
        self.role == NodeRole::User
    }
}

/// An immutable, validated scenario.
///
/// Invariants established by [`ScenarioGraph::build`]:
/// - node ids are unique and non-empty;
/// - every user node has `content`; only user nodes have `branches`;
/// - every branch target and the entry node exist.
#[derive(Clone, Debug)]
pub struct ScenarioGraph {
    metadata: ScenarioMetadata,
    nodes: Vec<Node>,
    index: HashMap<String, usize>,
    entry: String,
}

impl ScenarioGraph {
    /// Validate `doc` and resolve default edges, starting at `entry`.
    ///
    /// # Errors
    /// - [`ScenarioError::InvalidScenario`] for empty scenarios, duplicate or
    ///   empty ids, user nodes without content, or branches on assistant nodes.
    /// - [`ScenarioError::NodeNotFound`] if the entry node or a branch target
    ///   does not exist.
    pub fn build(doc: ScenarioDocument, entry: &str) -> Result<Self, ScenarioError> {
        if doc.nodes.is_empty() {
            return Err(ScenarioError::invalid(None, "scenario declares no nodes"));
        }

        let mut index = HashMap::with_capacity(doc.nodes.len());
        for (pos, spec) in doc.nodes.iter().enumerate() {
            if spec.id.trim().is_empty() {
                return Err(ScenarioError::invalid(
                    None,
                    format!("node at position {pos} has an empty id"),
                ));
            }
            if index.insert(spec.id.clone(), pos).is_some() {
                return Err(ScenarioError::invalid(
                    Some(&spec.id),
                    "duplicate node id",
                ));
            }
        }

        for spec in &doc.nodes {
            validate_node(spec, &index)?;
        }

        if !index.contains_key(entry) {
            return Err(ScenarioError::NodeNotFound {
                id: entry.to_owned(),
                referenced_from: "entry".to_owned(),
            });
        }

        let next_ids: Vec<Option<String>> = doc
            .nodes
            .iter()
            .skip(1)
            .map(|n| Some(n.id.clone()))
            .chain(std::iter::once(None))
            .collect();

        let nodes = doc
            .nodes
            .into_iter()
            .zip(next_ids)
            .map(|(spec, default_next)| Node {
                id: spec.id,
                role: spec.role,
                content: spec.content,
                phase: spec.phase,
                branches: spec.branches,
                default_next,
            })
            .collect();

        Ok(Self {
            metadata: doc.metadata,
            nodes,
            index,
            entry: entry.to_owned(),
        })
    }

    /// Convenience for tests and programmatic scenarios.
    ///
    /// # Errors
    /// Same as [`ScenarioGraph::build`].
    pub fn from_nodes(nodes: Vec<NodeSpec>, entry: &str) -> Result<Self, ScenarioError> {
        Self::build(
            ScenarioDocument {
                metadata: ScenarioMetadata::default(),
                nodes,
            },
            entry,
        )
    }

    /// Look up a node by id.
    ///
    /// # Errors
    /// Returns [`ScenarioError::NodeNotFound`] if no node has that id.
    pub fn node(&self, id: &str) -> Result<&Node, ScenarioError> {
        self.index
            .get(id)
            .map(|&pos| &self.nodes[pos])
            .ok_or_else(|| ScenarioError::NodeNotFound {
                id: id.to_owned(),
                referenced_from: "lookup".to_owned(),
            })
    }

    /// The entry node id.
    #[must_use]
    pub fn entry(&self) -> &str {
        &self.entry
    }

    /// Scenario metadata.
    #[must_use]
    pub const fn metadata(&self) -> &ScenarioMetadata {
        &self.metadata
    }

    /// Scenario name from metadata, if any.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.metadata.scenario_name.as_deref()
    }

    /// Nodes in declared order.
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false for a built graph; present for API symmetry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

fn validate_node(spec: &NodeSpec, index: &HashMap<String, usize>) -> Result<(), ScenarioError> {
    match spec.role {
        NodeRole::User => {
            if spec.content.as_deref().is_none_or(|c| c.trim().is_empty()) {
                return Err(ScenarioError::invalid(
                    Some(&spec.id),
                    "user node has no content",
                ));
            }
        }
        NodeRole::Assistant => {
            if spec.branches.is_some() {
                return Err(ScenarioError::invalid(
                    Some(&spec.id),
                    "branches are only allowed on user nodes",
                ));
            }
        }
    }

    for branch in spec.branches.iter().flatten() {
        if !index.contains_key(&branch.next_node) {
            return Err(ScenarioError::NodeNotFound {
                id: branch.next_node.clone(),
                referenced_from: spec.id.clone(),
            });
        }
    }
    Ok(())
}
