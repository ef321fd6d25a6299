use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("validation error: {0}")]
    ValidationError(String),
    /// A writer panicked while holding the store lock.
    #[error("storage lock poisoned")]
    Poisoned,
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;
