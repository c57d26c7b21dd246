//! Reading scenario files.
//!
//! Scenarios are TOML (`.toml`) or JSON (`.json`). Any other extension is
//! parsed as TOML. The SHA-256 of the file bytes is kept so run metadata can
//! pin exactly which script was replayed.

use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use super::ScenarioError;
use super::graph::{ScenarioDocument, ScenarioGraph};

/// A validated graph plus where it came from.
#[derive(Clone, Debug)]
pub struct LoadedScenario {
    /// The validated graph.
    pub graph: ScenarioGraph,
    /// Path the scenario was read from.
    pub path: PathBuf,
    /// Lowercase hex SHA-256 of the file contents.
    pub sha256: String,
}

/// Load and validate the scenario at `path`, entering at `entry`.
///
/// # Errors
/// Returns [`ScenarioError::Load`] if the file cannot be read or parsed, or
/// any validation error from [`ScenarioGraph::build`].
pub fn load_scenario(path: &Path, entry: &str) -> Result<LoadedScenario, ScenarioError> {
    let bytes = fs::read(path).map_err(|e| ScenarioError::Load {
        path: path.to_owned(),
        detail: e.to_string(),
    })?;
    let text = String::from_utf8(bytes).map_err(|e| ScenarioError::Load {
        path: path.to_owned(),
        detail: format!("not valid UTF-8: {e}"),
    })?;

    let doc = parse_document(&text, path)?;
    let graph = ScenarioGraph::build(doc, entry)?;
    Ok(LoadedScenario {
        graph,
        path: path.to_owned(),
        sha256: sha256_hex(text.as_bytes()),
    })
}

fn parse_document(text: &str, path: &Path) -> Result<ScenarioDocument, ScenarioError> {
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    let parsed = if is_json {
        serde_json::from_str(text).map_err(|e| e.to_string())
    } else {
        toml::from_str(text).map_err(|e| e.to_string())
    };
    parsed.map_err(|detail| ScenarioError::Load {
        path: path.to_owned(),
        detail,
    })
}

fn sha256_hex(bytes: &[u8]) -> String {
    use std::fmt::Write as _;

    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(out, "{byte:02x}");
    }
    out
}
