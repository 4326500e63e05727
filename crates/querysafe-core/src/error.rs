use thiserror::Error;

/// Core error type shared across Querysafe crates.
#[derive(Debug, Error)]
pub enum Error {
    /// Database error or adapter failure.
    #[error("database error: {0}")]
    Db(String),
    /// The catalog snapshot violates internal invariants.
    #[error("invalid catalog: {0}")]
    InvalidCatalog(String),
    /// A requested feature is not yet supported.
    #[error("unsupported: {0}")]
    Unsupported(String),
    /// Catch-all error for unexpected failures.
    #[error("other error: {0}")]
    Other(String),
}

/// Convenience alias for results returned by Querysafe crates.
pub type Result<T> = std::result::Result<T, Error>;
