use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::domain::category::Category;
use crate::domain::errors::{CatalogError, CatalogResult};
use crate::domain::product::Product;
use crate::domain::types::{CatalogId, CategoryId, CurrencyCode, ProductId, ShopUrl};

/// Mapping from every product id folded into a merge group to the id of the
/// group's master record.
///
/// Kept on the catalog metadata so later reconciliation passes can tell a
/// merged-away variant from a deleted product.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct MergeIdentityMap(BTreeMap<ProductId, ProductId>);

impl MergeIdentityMap {
    /// Creates an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `member` as folded into `master`, replacing any earlier entry.
    pub fn insert(&mut self, member: ProductId, master: ProductId) {
        self.0.insert(member, master);
    }

    /// Borrow the master id `member` was folded into.
    pub fn master_of(&self, member: &ProductId) -> Option<&ProductId> {
        self.0.get(member)
    }

    /// Whether `member` belongs to some merge group.
    pub fn contains(&self, member: &ProductId) -> bool {
        self.0.contains_key(member)
    }

    /// `(member, master)` pairs ordered by member id.
    pub fn iter(&self) -> impl Iterator<Item = (&ProductId, &ProductId)> {
        self.0.iter()
    }

    /// Number of mapped members.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no merge has been recorded.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Descriptive data about where a catalog came from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogMetadata {
    pub shop_name: String,
    pub company: Option<String>,
    /// Where this document was fetched from.
    pub source_url: Option<String>,
    /// What the shop declares as its own site. Required for export.
    pub shop_url: Option<String>,
    /// `date` attribute of the catalog root, verbatim.
    pub feed_date: Option<String>,
    pub currencies: Vec<CurrencyCode>,
    pub date_modified: NaiveDateTime,
    #[serde(default)]
    pub merged_id_map: MergeIdentityMap,
}

/// Canonical catalog: categories plus products, order-irrelevant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Catalog {
    pub id: CatalogId,
    pub name: String,
    pub metadata: CatalogMetadata,
    pub categories: Vec<Category>,
    pub products: Vec<Product>,
}

impl Catalog {
    /// Borrow the product with `id`.
    pub fn product(&self, id: &ProductId) -> Option<&Product> {
        self.products.iter().find(|product| &product.id == id)
    }

    /// Borrow the category with `id`.
    pub fn category(&self, id: &CategoryId) -> Option<&Category> {
        self.categories.iter().find(|category| &category.id == id)
    }

    /// Products flagged for inclusion in exported feeds.
    pub fn exportable_products(&self) -> impl Iterator<Item = &Product> {
        self.products
            .iter()
            .filter(|product| product.include_in_export)
    }

    /// Category ids referenced by products but missing from the category set.
    pub fn orphan_category_ids(&self) -> Vec<&CategoryId> {
        let known: HashSet<&CategoryId> = self.categories.iter().map(|c| &c.id).collect();
        let mut seen = HashSet::new();
        self.products
            .iter()
            .filter_map(|product| product.category_id.as_ref())
            .filter(|id| !known.contains(id) && seen.insert(*id))
            .collect()
    }

    /// Checks the metadata needed to regenerate feed markup.
    ///
    /// The canonical shop URL is optional at parse time but mandatory here.
    pub fn validate_for_export(&self) -> CatalogResult<ShopUrl> {
        let Some(raw_url) = self
            .metadata
            .shop_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
        else {
            return Err(CatalogError::MissingRequiredMetadata(format!(
                "catalog '{}' has no shop url; set the shop's own site address before exporting",
                self.name
            )));
        };

        ShopUrl::new(raw_url).map_err(|e| {
            CatalogError::MissingRequiredMetadata(format!("catalog '{}': {e}", self.name))
        })
    }
}
