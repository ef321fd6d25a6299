//! Catalog workflows over a storage backend: import, merge, and the
//! preview/apply halves of an update.

use serde::Serialize;

use crate::config::Settings;
use crate::domain::catalog::Catalog;
use crate::domain::diff::{DiffKind, FieldSelection, ProductDiff};
use crate::domain::types::CatalogId;
use crate::repository::{CatalogReader, CatalogWriter};
use crate::services::merge::merge_duplicates;
use crate::services::reconcile::{apply_diff, diff};

use super::{ServiceError, ServiceResult};

/// A freshly built snapshot and its differences from the stored catalog.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogUpdate {
    pub catalog_id: CatalogId,
    pub fresh: Catalog,
    pub diffs: Vec<ProductDiff>,
}

impl CatalogUpdate {
    pub fn new_products(&self) -> usize {
        self.diffs.iter().filter(|d| d.kind == DiffKind::New).count()
    }

    pub fn changed_products(&self) -> usize {
        self.diffs
            .iter()
            .filter(|d| d.kind == DiffKind::Changed)
            .count()
    }
}

/// Builds a catalog from `raw` and stores it.
pub async fn import_catalog<R>(
    raw: &str,
    display_name: &str,
    source_url: Option<&str>,
    settings: &Settings,
    repo: &R,
) -> ServiceResult<Catalog>
where
    R: CatalogWriter,
{
    let mut builder = settings.catalog_builder(display_name);
    if let Some(url) = source_url {
        builder = builder.source_url(url);
    }

    let catalog = builder
        .build_batched(raw, settings.batch_size, |processed, total| {
            log::debug!("Imported {processed}/{total} offers");
        })
        .await
        .map_err(|e| {
            log::error!("Failed to import catalog '{display_name}': {e}");
            ServiceError::from(e)
        })?;

    match repo.save_catalog(&catalog) {
        Ok(()) => {
            log::info!(
                "Stored catalog '{}' with {} products",
                catalog.name,
                catalog.products.len()
            );
            Ok(catalog)
        }
        Err(e) => {
            log::error!("Failed to save catalog: {e}");
            Err(ServiceError::Internal)
        }
    }
}

/// Merges duplicate listings of a stored catalog and stores the result.
pub fn merge_catalog<R>(
    catalog_id: &CatalogId,
    merge_attributes: &[String],
    repo: &R,
) -> ServiceResult<Catalog>
where
    R: CatalogReader + CatalogWriter,
{
    let stored = load(catalog_id, repo)?;
    let merged = merge_duplicates(&stored, merge_attributes);

    match repo.save_catalog(&merged) {
        Ok(()) => Ok(merged),
        Err(e) => {
            log::error!("Failed to save merged catalog: {e}");
            Err(ServiceError::Internal)
        }
    }
}

/// Builds a fresh snapshot of a stored catalog's source and diffs it against
/// what is stored. Nothing is written.
pub fn preview_catalog_update<R>(
    catalog_id: &CatalogId,
    raw: &str,
    settings: &Settings,
    repo: &R,
) -> ServiceResult<CatalogUpdate>
where
    R: CatalogReader,
{
    let stored = load(catalog_id, repo)?;

    let mut builder = settings.catalog_builder(stored.name.clone());
    if let Some(url) = stored.metadata.source_url.as_deref() {
        builder = builder.source_url(url);
    }
    let fresh = builder.build(raw).map_err(|e| {
        log::error!("Failed to build update for catalog {catalog_id}: {e}");
        ServiceError::from(e)
    })?;

    let diffs = diff(&stored, &fresh, &settings.rules, None);
    log::info!(
        "Catalog {catalog_id}: {} differences to review",
        diffs.len()
    );

    Ok(CatalogUpdate {
        catalog_id: catalog_id.clone(),
        fresh,
        diffs,
    })
}

/// Applies the approved part of `update` to the stored catalog.
pub fn apply_catalog_update<R>(
    update: CatalogUpdate,
    selection: &FieldSelection,
    repo: &R,
) -> ServiceResult<Catalog>
where
    R: CatalogReader + CatalogWriter,
{
    let stored = load(&update.catalog_id, repo)?;
    let updated = apply_diff(stored, &update.diffs, selection, update.fresh.categories);

    match repo.save_catalog(&updated) {
        Ok(()) => Ok(updated),
        Err(e) => {
            log::error!("Failed to save updated catalog: {e}");
            Err(ServiceError::Internal)
        }
    }
}

fn load<R>(catalog_id: &CatalogId, repo: &R) -> ServiceResult<Catalog>
where
    R: CatalogReader,
{
    match repo.get_catalog_by_id(catalog_id) {
        Ok(Some(catalog)) => Ok(catalog),
        Ok(None) => Err(ServiceError::NotFound),
        Err(e) => {
            log::error!("Failed to get catalog: {e}");
            Err(ServiceError::Internal)
        }
    }
}
