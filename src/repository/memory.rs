use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::domain::catalog::Catalog;
use crate::domain::types::CatalogId;
use crate::repository::{
    CatalogListQuery, CatalogReader, CatalogWriter, RepositoryError, RepositoryResult,
};

/// In-process catalog store.
///
/// Clones share the same storage, so the repository can be handed to several
/// workflows at once.
#[derive(Debug, Clone, Default)]
pub struct MemoryRepository {
    catalogs: Arc<RwLock<HashMap<CatalogId, Catalog>>>,
}

impl MemoryRepository {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store seeded with `catalogs`.
    pub fn with_catalogs(catalogs: impl IntoIterator<Item = Catalog>) -> Self {
        let catalogs = catalogs
            .into_iter()
            .map(|catalog| (catalog.id.clone(), catalog))
            .collect();
        Self {
            catalogs: Arc::new(RwLock::new(catalogs)),
        }
    }
}

impl CatalogReader for MemoryRepository {
    fn list_catalogs(&self, query: CatalogListQuery) -> RepositoryResult<(usize, Vec<Catalog>)> {
        let catalogs = self.catalogs.read().map_err(|_| RepositoryError::Poisoned)?;

        let needle = query.search.as_deref().map(str::to_lowercase);
        let mut matching: Vec<&Catalog> = catalogs
            .values()
            .filter(|catalog| match &needle {
                Some(needle) => {
                    catalog.name.to_lowercase().contains(needle)
                        || catalog.metadata.shop_name.to_lowercase().contains(needle)
                }
                None => true,
            })
            .collect();
        matching.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));

        let total = matching.len();
        let page: Vec<Catalog> = match query.pagination {
            Some(pagination) => matching
                .into_iter()
                .skip(pagination.page.saturating_sub(1) * pagination.per_page)
                .take(pagination.per_page)
                .cloned()
                .collect(),
            None => matching.into_iter().cloned().collect(),
        };
        Ok((total, page))
    }

    fn get_catalog_by_id(&self, id: &CatalogId) -> RepositoryResult<Option<Catalog>> {
        let catalogs = self.catalogs.read().map_err(|_| RepositoryError::Poisoned)?;
        Ok(catalogs.get(id).cloned())
    }
}

impl CatalogWriter for MemoryRepository {
    fn save_catalog(&self, catalog: &Catalog) -> RepositoryResult<()> {
        let mut catalogs = self.catalogs.write().map_err(|_| RepositoryError::Poisoned)?;
        catalogs.insert(catalog.id.clone(), catalog.clone());
        Ok(())
    }

    fn delete_catalog(&self, id: &CatalogId) -> RepositoryResult<bool> {
        let mut catalogs = self.catalogs.write().map_err(|_| RepositoryError::Poisoned)?;
        Ok(catalogs.remove(id).is_some())
    }
}
