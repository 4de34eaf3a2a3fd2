//! Common error types for the ratings engine

use thiserror::Error;

/// Common result type for ratings-engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the core pipeline and its collaborators
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
