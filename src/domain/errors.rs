use thiserror::Error;

/// Whole-document failures. Field-level problems never surface here: they
/// are absorbed into best-effort values during normalization.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// No shop node and no offer collection could be located.
    #[error("catalog structure not found: searched {searched}")]
    StructureNotFound { searched: String },
    /// The document could not be parsed even after one repair pass.
    #[error("malformed document: {0}")]
    MalformedDocument(String),
    /// Metadata required to export the catalog is absent or invalid.
    #[error("missing required metadata: {0}")]
    MissingRequiredMetadata(String),
}

pub type CatalogResult<T> = Result<T, CatalogError>;
