use serde::{Deserialize, Serialize};

use crate::domain::raw::RawValue;
use crate::domain::types::{
    AttributeId, CategoryId, CurrencyCode, ExternalId, ProductId, ProductPrice,
};

/// Single `name = value` facet of a product. The value is always flat text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProductAttribute {
    pub id: AttributeId,
    pub name: String,
    pub value: String,
}

impl ProductAttribute {
    pub fn new(id: AttributeId, name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            value: value.into(),
        }
    }

    /// Identity used when comparing or unioning attribute sets.
    pub fn signature(&self) -> (String, String) {
        (
            self.name.trim().to_lowercase(),
            self.value.trim().to_string(),
        )
    }
}

/// Presentation overlays produced outside the import pipeline. They never
/// replace the source fields in place.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GeneratedContent {
    pub name: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
}

/// Canonical product record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
    pub id: ProductId,
    pub external_id: ExternalId,
    pub name: String,
    /// Plain text; markup is stripped at import.
    pub description: String,
    pub price: ProductPrice,
    pub old_price: Option<ProductPrice>,
    pub currency: CurrencyCode,
    pub category_id: Option<CategoryId>,
    pub url: Option<String>,
    pub pictures: Vec<String>,
    pub vendor: String,
    pub vendor_code: String,
    pub available: bool,
    pub attributes: Vec<ProductAttribute>,
    #[serde(default)]
    pub generated: GeneratedContent,
    pub merged_from_variants: Option<usize>,
    pub merged_attribute_names: Option<Vec<String>>,
    pub merged_sizes: Option<Vec<String>>,
    pub merged_colors: Option<Vec<String>>,
    pub include_in_export: bool,
    /// Source record as parsed, kept for field remapping.
    #[serde(default)]
    pub raw: RawValue,
}

impl Product {
    /// URL used to group listings of the same underlying product.
    pub fn grouping_url(&self) -> Option<&str> {
        let canonical = self.url.as_deref().map(str::trim).filter(|u| !u.is_empty());
        canonical.or_else(|| {
            self.generated
                .url
                .as_deref()
                .map(str::trim)
                .filter(|u| !u.is_empty())
        })
    }

    /// Name shown to users: the generated overlay when present.
    pub fn display_name(&self) -> &str {
        self.generated
            .name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.name)
    }

    pub fn attribute(&self, name: &str) -> Option<&ProductAttribute> {
        self.attributes
            .iter()
            .find(|attribute| names_match(&attribute.name, name))
    }
}

/// Case-insensitive attribute name comparison (Unicode-aware, so `Размер`
/// matches `размер`).
pub fn names_match(left: &str, right: &str) -> bool {
    left.trim().to_lowercase() == right.trim().to_lowercase()
}
