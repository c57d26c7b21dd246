//! Telemetry initialization.
//!
//! Controlled by `DOSSIER_LOG_FORMAT`:
//! - unset or `"text"` → human-readable events to stderr
//! - `"json"` → JSON spans/events to stderr
//! - `"off"` → no subscriber (tracing disabled)
//!
//! `RUST_LOG` filters in every mode; the default level is `warn`.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

/// Environment variable selecting the log format.
pub const LOG_FORMAT_ENV: &str = "DOSSIER_LOG_FORMAT";

/// How events reach stderr.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
    Off,
}

impl LogFormat {
    /// Interpret a `DOSSIER_LOG_FORMAT` value. Unknown values fall back to
    /// text with a warning on stderr.
    #[must_use]
    pub fn from_env_value(value: Option<&str>) -> Self {
        match value.map(str::trim).map(str::to_ascii_lowercase).as_deref() {
            None | Some("" | "text") => Self::Text,
            Some("json") => Self::Json,
            Some("off" | "none") => Self::Off,
            Some(other) => {
                eprintln!("warning: unknown {LOG_FORMAT_ENV} '{other}', using text");
                Self::Text
            }
        }
    }
}

/// Install the global subscriber selected by `DOSSIER_LOG_FORMAT`.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init() {
    let format = LogFormat::from_env_value(std::env::var(LOG_FORMAT_ENV).ok().as_deref());
    if format == LogFormat::Off {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let registry = tracing_subscriber::registry().with(filter);

    let result = match format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE),
            )
            .try_init(),
        LogFormat::Text | LogFormat::Off => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    };
    if let Err(e) = result {
        eprintln!("warning: telemetry already initialized: {e}");
    }
}
