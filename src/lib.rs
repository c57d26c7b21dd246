//! dossier library crate: re-exports for the binary and integration tests.
//!
//! The primary interface is the `dossier` binary. The pipeline is:
//!
//! ```text
//! scenario ─▶ replay ─▶ transcript ─▶ features ─▶ rule verdict
//!                           └────────▶ judge ───▶ judge verdict
//! ```
//!
//! and [`run`] ties the stages to an output directory.

pub mod config;
pub mod features;
pub mod judge;
pub mod replay;
pub mod report;
pub mod rule;
pub mod run;
pub mod scenario;
pub mod transcript;

// Private modules only used by the binary, not re-exported:
// format, telemetry
