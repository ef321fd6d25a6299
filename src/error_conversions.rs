//! Error conversion glue between layers.
//!
//! The domain layer must not depend on service/repository error types, so
//! the `From` impls connecting them live here.

use crate::domain::errors::CatalogError;
use crate::domain::types::TypeConstraintError;
use crate::repository::errors::RepositoryError;
use crate::services::errors::ServiceError;

impl From<TypeConstraintError> for ServiceError {
    fn from(val: TypeConstraintError) -> Self {
        ServiceError::TypeConstraint(val.to_string())
    }
}

impl From<TypeConstraintError> for RepositoryError {
    fn from(val: TypeConstraintError) -> Self {
        RepositoryError::ValidationError(val.to_string())
    }
}

impl From<CatalogError> for ServiceError {
    fn from(val: CatalogError) -> Self {
        ServiceError::Import(val.to_string())
    }
}

impl From<RepositoryError> for ServiceError {
    fn from(val: RepositoryError) -> Self {
        match val {
            RepositoryError::ValidationError(message) => ServiceError::TypeConstraint(message),
            RepositoryError::Poisoned => ServiceError::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_errors_between_layers() {
        let err: ServiceError = TypeConstraintError::EmptyString("product id").into();
        assert_eq!(err, ServiceError::TypeConstraint("product id cannot be empty".into()));

        let err: ServiceError = RepositoryError::Poisoned.into();
        assert_eq!(err, ServiceError::Internal);

        let err: ServiceError = CatalogError::MalformedDocument("eof".into()).into();
        assert_eq!(err, ServiceError::Import("malformed document: eof".into()));
    }
}
