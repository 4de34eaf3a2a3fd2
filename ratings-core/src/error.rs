//! Error taxonomy (§7): a typed kind at the provider boundary, and a
//! top-level error composing it with persistence/config/internal
//! failures. Transience is decided where the error is constructed,
//! never downstream.

use thiserror::Error;

/// Errors returned by a single C1 provider-client operation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("rate limited")]
    RateLimited,
    #[error("request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
    #[error("not found")]
    NotFound,
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("unknown error: {0}")]
    Unknown(String),
}

impl ProviderError {
    /// Transient errors are worth retrying inside C1; if they still
    /// escape, the caller treats the signal as missing rather than
    /// aborting the album.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited | ProviderError::Timeout | ProviderError::Network(_)
        )
    }
}

/// Errors surfaced by the pipeline above the provider-client boundary.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("provider error ({provider}): {source}")]
    Provider {
        provider: &'static str,
        source: ProviderError,
    },

    #[error("auth error for provider {0}")]
    Auth(&'static str),

    #[error(transparent)]
    Persist(#[from] ratings_common::Error),

    #[error("cancelled")]
    Cancelled,

    #[error("invariant violated: {0}")]
    FatalInternal(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
