//! Storage seam for catalogs.
//!
//! Hosts persist catalogs however they like by implementing
//! [`CatalogReader`] and [`CatalogWriter`]; [`memory::MemoryRepository`] is
//! the bundled in-process store.

use crate::domain::catalog::Catalog;
use crate::domain::types::CatalogId;

pub mod errors;
pub mod memory;

pub use errors::{RepositoryError, RepositoryResult};
pub use memory::MemoryRepository;

/// Page selection, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: usize,
    pub per_page: usize,
}

/// Query parameters used when listing catalogs.
#[derive(Debug, Clone, Default)]
pub struct CatalogListQuery {
    /// Case-insensitive match against the catalog or shop name.
    pub search: Option<String>,
    /// Pagination parameters.
    pub pagination: Option<Pagination>,
}

impl CatalogListQuery {
    pub fn search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }
    pub fn paginate(mut self, page: usize, per_page: usize) -> Self {
        self.pagination = Some(Pagination { page, per_page });
        self
    }
}

/// Read-only operations for catalogs.
pub trait CatalogReader {
    /// List catalogs matching the query, sorted by name, with the total
    /// count before pagination.
    fn list_catalogs(&self, query: CatalogListQuery) -> RepositoryResult<(usize, Vec<Catalog>)>;
    /// Retrieve a catalog by its identifier.
    fn get_catalog_by_id(&self, id: &CatalogId) -> RepositoryResult<Option<Catalog>>;
}

/// Write operations for catalogs.
pub trait CatalogWriter {
    /// Insert or replace a catalog.
    fn save_catalog(&self, catalog: &Catalog) -> RepositoryResult<()>;
    /// Delete a catalog, returning whether it existed.
    fn delete_catalog(&self, id: &CatalogId) -> RepositoryResult<bool>;
}
