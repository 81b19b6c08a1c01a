use stampede_core::ConfigError;
use thiserror::Error;

/// Errors that abort a test before it produces a report.
///
/// Per-iteration failures never surface here; they are recorded as samples
/// and show up in the report's error rate instead.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
}
