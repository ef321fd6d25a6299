use thiserror::Error;

/// Generic error type used by service layer functions.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ServiceError {
    /// Requested catalog was not found.
    #[error("not found")]
    NotFound,
    /// The feed document could not be turned into a catalog.
    #[error("import failed: {0}")]
    Import(String),
    /// A value did not satisfy a domain constraint.
    #[error("type constraint violation: {0}")]
    TypeConstraint(String),
    /// An unexpected internal error occurred.
    #[error("internal error")]
    Internal,
}

/// Convenient alias for results returned from service functions.
pub type ServiceResult<T> = Result<T, ServiceError>;
