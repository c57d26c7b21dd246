use anyhow::Result;
use clap::ValueEnum;
use serde::Serialize;

/// How command results are printed to stdout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// Pretty JSON, machine-parseable.
    Json,
}

impl OutputFormat {
    /// Render `data` as JSON, or with `text` in text mode.
    ///
    /// # Errors
    /// JSON serialization failure.
    pub fn render<T: Serialize>(self, data: &T, text: impl FnOnce(&T) -> String) -> Result<String> {
        match self {
            Self::Json => serde_json::to_string_pretty(data)
                .map_err(|e| anyhow::anyhow!("JSON serialization failed: {e}")),
            Self::Text => Ok(text(data)),
        }
    }
}
