use thiserror::Error;

/// The error taxonomy shared across crates.
///
/// Each variant lines up with a failure class a caller needs to react to
/// differently (retry, degrade, log-and-exit0, surface to the user).
#[derive(Error, Debug)]
pub enum CcEngramError {
  #[error("not found: {entity} {id}")]
  NotFound { entity: &'static str, id: String },

  #[error("validation: {0}")]
  Validation(String),

  #[error("database: {0}")]
  Database(String),

  #[error("embedding provider unavailable")]
  EmbeddingUnavailable,

  #[error("index: {0}")]
  Index(String),

  #[error("storage integrity check failed: {0}")]
  Integrity(String),

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("timed out after {0}s")]
  Timeout(u64),

  #[error("upstream error: {0}")]
  Upstream(String),

  #[error("io: {0}")]
  Io(#[from] std::io::Error),
}

/// Short alias, used throughout the workspace.
pub type Error = CcEngramError;
pub type Result<T> = std::result::Result<T, Error>;
