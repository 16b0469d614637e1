use thiserror::Error;

/// Faults that stop a run before it can reach an outcome.
///
/// A command that is missing, exits non-zero or times out is not an error here:
/// those are classified into `ProbeOutcome` / `TraceResult` and drive the
/// fallback chain. Only configuration problems and runner I/O faults that
/// cannot be classified end up as `Err`.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("config load failed: {0}")]
    ConfigLoad(String),

    #[error("invalid config: {0}")]
    ConfigValidation(String),

    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
}
