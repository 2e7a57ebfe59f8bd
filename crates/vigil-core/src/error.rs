use thiserror::Error;

/// Failures at the assistant/session boundary.
///
/// Everything else in the crate reports through `anyhow`; these variants
/// exist so callers can tell "not ready" apart from transport errors.
#[derive(Debug, Error)]
pub enum AssistError {
    #[error("service not initialized")]
    NotInitialized,

    #[error("unknown model provider: {0}")]
    UnknownProvider(String),

    #[error("missing API key: set the {0} environment variable")]
    MissingApiKey(String),
}
