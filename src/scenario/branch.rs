//! Branch selection on user nodes.

use super::ScenarioError;
use super::graph::Node;

/// Resolve `label` to the next node id among `node`'s declared branches.
///
/// Branches are scanned in declared order and the first whose `condition`
/// equals `label` exactly (case-sensitive) wins.
///
/// # Errors
/// Returns [`ScenarioError::BranchNotFound`] if nothing matches, including
/// when the node declares no branches at all.
pub fn select_branch<'a>(node: &'a Node, label: &str) -> Result<&'a str, ScenarioError> {
    let branches = node.branches.as_deref().unwrap_or_default();
    branches
        .iter()
        .find(|b| b.condition == label)
        .map(|b| b.next_node.as_str())
        .ok_or_else(|| ScenarioError::BranchNotFound {
            label: label.to_owned(),
            node_id: node.id.clone(),
            available: branches.iter().map(|b| b.condition.clone()).collect(),
        })
}
