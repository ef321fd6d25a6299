//! Drives the resolver and the field normalizers to produce a [`Catalog`].

use std::collections::HashSet;

use chrono::{NaiveDateTime, Utc};

use crate::domain::catalog::{Catalog, CatalogMetadata, MergeIdentityMap};
use crate::domain::category::Category;
use crate::domain::errors::CatalogResult;
use crate::domain::product::{GeneratedContent, Product, ProductAttribute};
use crate::domain::raw::{RawMap, RawValue};
use crate::domain::types::{
    AttributeId, CatalogId, CategoryId, CategoryName, CurrencyCode, ExternalId, ProductId,
};
use crate::import::document::parse_document;
use crate::import::normalize::{
    normalize_attributes, normalize_availability, normalize_description, normalize_old_price,
    normalize_price, normalize_string_list, normalize_text,
};
use crate::import::resolve::{ResolvedShop, resolve_structure};

/// Shop name used when neither the document nor the caller provides one.
pub const UNKNOWN_SHOP: &str = "Unknown Shop";
/// Currency assumed when neither the offer nor the shop declares one.
pub const DEFAULT_CURRENCY: &str = "RUB";

const OFFER_ID_KEYS: [&str; 5] = ["id", "external_id", "externalId", "sku", "offer_id"];
const CATEGORY_REF_KEYS: [&str; 3] = ["categoryId", "category_id", "categoryID"];
const PARENT_KEYS: [&str; 3] = ["parentId", "parent_id", "parent"];
const PICTURE_KEYS: [&str; 4] = ["picture", "pictures", "images", "image"];

/// Configured catalog build.
///
/// ```no_run
/// use pushkind_feeds::import::CatalogBuilder;
///
/// let xml = std::fs::read_to_string("feed.xml").unwrap();
/// let catalog = CatalogBuilder::new("Supplier")
///     .source_url("https://supplier.example.com/feed.xml")
///     .build(&xml)
///     .unwrap();
/// println!("{} products", catalog.products.len());
/// ```
#[derive(Debug, Clone)]
pub struct CatalogBuilder {
    display_name: String,
    source_url: Option<String>,
    modified_at: Option<NaiveDateTime>,
    default_currency: String,
}

impl CatalogBuilder {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            source_url: None,
            modified_at: None,
            default_currency: DEFAULT_CURRENCY.to_string(),
        }
    }

    /// Where the document was fetched from.
    pub fn source_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        self.source_url = (!url.trim().is_empty()).then(|| url.trim().to_string());
        self
    }

    /// Fixes the `date_modified` stamp instead of reading the clock.
    pub fn modified_at(mut self, at: NaiveDateTime) -> Self {
        self.modified_at = Some(at);
        self
    }

    pub fn default_currency(mut self, code: impl Into<String>) -> Self {
        self.default_currency = code.into();
        self
    }

    /// Builds the whole catalog in one pass.
    pub fn build(&self, raw: &str) -> CatalogResult<Catalog> {
        let tree = parse_document(raw)?;
        let resolved = resolve_structure(&tree)?;
        let mut build = Build::new(self, &resolved);

        let products = resolved
            .offers
            .iter()
            .enumerate()
            .map(|(position, offer)| build.product(position, offer))
            .collect();

        Ok(build.finish(products))
    }

    /// Builds the catalog processing offers `batch_size` at a time.
    ///
    /// `on_progress(processed, total)` runs after every batch and the task
    /// yields before the next one. Batches run strictly in order, so the
    /// result equals [`build`](Self::build) for the same input.
    pub async fn build_batched<F>(
        &self,
        raw: &str,
        batch_size: usize,
        mut on_progress: F,
    ) -> CatalogResult<Catalog>
    where
        F: FnMut(usize, usize),
    {
        let tree = parse_document(raw)?;
        let resolved = resolve_structure(&tree)?;
        let mut build = Build::new(self, &resolved);

        let total = resolved.offers.len();
        let mut products = Vec::with_capacity(total);
        for (batch, offers) in resolved.offers.chunks(batch_size.max(1)).enumerate() {
            let offset = batch * batch_size.max(1);
            for (index, offer) in offers.iter().enumerate() {
                products.push(build.product(offset + index, offer));
            }
            on_progress(products.len(), total);
            tokio::task::yield_now().await;
        }

        Ok(build.finish(products))
    }
}

/// Builds a catalog with default settings.
pub fn build_catalog(
    raw: &str,
    display_name: &str,
    source_url: Option<&str>,
) -> CatalogResult<Catalog> {
    builder_for(display_name, source_url).build(raw)
}

/// Batched form of [`build_catalog`].
pub async fn build_catalog_batched<F>(
    raw: &str,
    display_name: &str,
    source_url: Option<&str>,
    batch_size: usize,
    on_progress: F,
) -> CatalogResult<Catalog>
where
    F: FnMut(usize, usize),
{
    builder_for(display_name, source_url)
        .build_batched(raw, batch_size, on_progress)
        .await
}

fn builder_for(display_name: &str, source_url: Option<&str>) -> CatalogBuilder {
    let builder = CatalogBuilder::new(display_name);
    match source_url {
        Some(url) => builder.source_url(url),
        None => builder,
    }
}

/// Maps a declared category id onto the internal identity scheme. UUIDs are
/// kept; anything else is replaced by an id derived from it.
pub fn category_id_for(declared: &str) -> CategoryId {
    match CategoryId::new(declared) {
        Ok(id) if id.is_uuid() => id,
        _ => CategoryId::derive(declared.trim()),
    }
}

/// State scoped to one build call.
struct Build<'b> {
    settings: &'b CatalogBuilder,
    metadata: CatalogMetadata,
    categories: Vec<Category>,
    fallback_currency: CurrencyCode,
    seen_external_ids: HashSet<String>,
    /// Category references in first-seen order, with their declared form.
    referenced_categories: Vec<(CategoryId, String)>,
}

impl<'b> Build<'b> {
    fn new(settings: &'b CatalogBuilder, resolved: &ResolvedShop<'_>) -> Self {
        let metadata = metadata(settings, resolved);
        let fallback_currency = metadata
            .currencies
            .first()
            .cloned()
            .or_else(|| CurrencyCode::normalized(&settings.default_currency).ok())
            .unwrap_or_default();
        let categories = categories(&resolved.categories);

        Self {
            settings,
            metadata,
            categories,
            fallback_currency,
            seen_external_ids: HashSet::new(),
            referenced_categories: Vec::new(),
        }
    }

    fn product(&mut self, position: usize, offer: &RawValue) -> Product {
        let name = offer_name(offer);
        let external_id = self.external_id(position, offer, &name);
        let id = ProductId::derive(external_id.as_str());

        let currency = offer
            .as_keyed()
            .and_then(|map| map.get_any(&["currencyId", "currency", "currency_id"]))
            .map(|value| normalize_text(Some(value)))
            .and_then(|code| CurrencyCode::normalized(code).ok())
            .unwrap_or_else(|| self.fallback_currency.clone());

        let category_id = offer
            .as_keyed()
            .and_then(|map| map.get_any(&CATEGORY_REF_KEYS))
            .map(|value| normalize_text(Some(value)))
            .filter(|declared| !declared.is_empty())
            .map(|declared| {
                let id = category_id_for(&declared);
                if !self.referenced_categories.iter().any(|(seen, _)| seen == &id) {
                    self.referenced_categories.push((id.clone(), declared));
                }
                id
            });

        let attributes = normalize_attributes(offer)
            .into_iter()
            .enumerate()
            .map(|(index, (name, value))| {
                let attribute_id = AttributeId::derive(&format!("{id}:{index}:{name}"));
                ProductAttribute::new(attribute_id, name, value)
            })
            .collect();

        Product {
            external_id,
            name,
            description: normalize_description(offer.get("description")),
            price: normalize_price(offer.get("price")),
            old_price: normalize_old_price(
                offer
                    .as_keyed()
                    .and_then(|map| map.get_any(&["oldprice", "old_price", "oldPrice"])),
            ),
            currency,
            category_id,
            url: Some(normalize_text(
                offer.as_keyed().and_then(|map| map.get_any(&["url", "link"])),
            ))
            .filter(|url| !url.is_empty()),
            pictures: normalize_string_list(
                offer.as_keyed().and_then(|map| map.get_any(&PICTURE_KEYS)),
            ),
            vendor: normalize_text(offer.get("vendor")),
            vendor_code: normalize_text(
                offer
                    .as_keyed()
                    .and_then(|map| map.get_any(&["vendorCode", "vendor_code"])),
            ),
            available: normalize_availability(offer),
            attributes,
            generated: GeneratedContent::default(),
            merged_from_variants: None,
            merged_attribute_names: None,
            merged_sizes: None,
            merged_colors: None,
            include_in_export: true,
            raw: offer.clone(),
            id,
        }
    }

    /// Declared id, or one synthesized from position and name, made unique
    /// within this build by `_1`, `_2`, ... suffixes.
    fn external_id(&mut self, position: usize, offer: &RawValue, name: &str) -> ExternalId {
        let declared = normalize_text(offer.as_keyed().and_then(|map| map.get_any(&OFFER_ID_KEYS)));
        let base = if declared.is_empty() {
            synthesized_external_id(position, name)
        } else {
            declared
        };

        let mut candidate = base.clone();
        let mut suffix = 0;
        while self.seen_external_ids.contains(&candidate) {
            suffix += 1;
            candidate = format!("{base}_{suffix}");
        }
        if suffix > 0 {
            log::debug!("External id '{base}' already used in this import; using '{candidate}'");
        }
        self.seen_external_ids.insert(candidate.clone());

        ExternalId::new(candidate).unwrap_or_else(|_| ExternalId::positional(position))
    }

    fn finish(mut self, products: Vec<Product>) -> Catalog {
        let known: HashSet<CategoryId> = self.categories.iter().map(|c| c.id.clone()).collect();
        let orphans: Vec<Category> = self
            .referenced_categories
            .into_iter()
            .filter(|(id, _)| !known.contains(id))
            .filter_map(|(id, declared)| {
                let name = CategoryName::new(format!("Category {declared}")).ok()?;
                let mut category = Category::new(id, name);
                category.external_id = Some(declared);
                Some(category)
            })
            .collect();
        if !orphans.is_empty() {
            log::warn!(
                "Synthesized {} categories referenced by offers but not declared",
                orphans.len()
            );
            self.categories.extend(orphans);
        }

        let name = match self.settings.display_name.trim() {
            "" => self.metadata.shop_name.clone(),
            display => display.to_string(),
        };
        let id = CatalogId::derive(self.metadata.source_url.as_deref().unwrap_or(&name));

        log::info!(
            "Built catalog '{name}': {} products, {} categories",
            products.len(),
            self.categories.len()
        );

        Catalog {
            id,
            name,
            metadata: self.metadata,
            categories: self.categories,
            products,
        }
    }
}

fn metadata(settings: &CatalogBuilder, resolved: &ResolvedShop<'_>) -> CatalogMetadata {
    let shop = resolved.shop;
    let shop_name = shop_text(shop, "name")
        .or_else(|| shop_text(shop, "title"))
        .or_else(|| {
            let display = settings.display_name.trim();
            (!display.is_empty()).then(|| display.to_string())
        })
        .unwrap_or_else(|| UNKNOWN_SHOP.to_string());

    let feed_date = resolved
        .catalog_root
        .and_then(|root| root.get("date"))
        .map(|value| normalize_text(Some(value)))
        .filter(|date| !date.is_empty());

    CatalogMetadata {
        shop_name,
        company: shop_text(shop, "company"),
        source_url: settings.source_url.clone(),
        shop_url: shop_text(shop, "url"),
        feed_date,
        currencies: shop.map(currencies).unwrap_or_default(),
        date_modified: settings
            .modified_at
            .unwrap_or_else(|| Utc::now().naive_utc()),
        merged_id_map: MergeIdentityMap::new(),
    }
}

fn shop_text(shop: Option<&RawMap>, key: &str) -> Option<String> {
    let text = normalize_text(shop.and_then(|map| map.get(key)));
    (!text.is_empty()).then_some(text)
}

fn currencies(shop: &RawMap) -> Vec<CurrencyCode> {
    let Some(node) = shop.get("currencies") else {
        return Vec::new();
    };
    let entries = match node.get("currency") {
        Some(inner) => inner.items(),
        None => node.items(),
    };

    let mut codes: Vec<CurrencyCode> = Vec::new();
    for entry in entries {
        let code = match entry {
            RawValue::Keyed(map) => normalize_text(map.get("id")),
            other => normalize_text(Some(other)),
        };
        if let Ok(code) = CurrencyCode::normalized(code)
            && !codes.contains(&code)
        {
            codes.push(code);
        }
    }
    codes
}

fn categories(nodes: &[&RawValue]) -> Vec<Category> {
    let mut categories: Vec<Category> = Vec::with_capacity(nodes.len());
    for (position, node) in nodes.iter().enumerate() {
        let declared = normalize_text(node.as_keyed().and_then(|map| map.get("id")));
        let text = match node {
            RawValue::Keyed(map) => normalize_text(map.get_any(&["name", "title", "#text", "text"])),
            other => normalize_text(Some(other)),
        };

        let name = match (text.is_empty(), declared.is_empty()) {
            (false, _) => text,
            (true, false) => format!("Category {declared}"),
            (true, true) => {
                log::debug!("Skipping category #{position} without id or name");
                continue;
            }
        };
        let Ok(name) = CategoryName::new(name) else {
            continue;
        };

        let id = if declared.is_empty() {
            CategoryId::derive(&format!("#{position}:{name}"))
        } else {
            category_id_for(&declared)
        };
        if categories.iter().any(|existing| existing.id == id) {
            log::debug!("Skipping repeated category '{declared}'");
            continue;
        }

        let parent_id = node
            .as_keyed()
            .and_then(|map| map.get_any(&PARENT_KEYS))
            .map(|value| normalize_text(Some(value)))
            .filter(|parent| !parent.is_empty())
            .map(|parent| category_id_for(&parent));

        categories.push(Category {
            id,
            name,
            parent_id,
            external_id: (!declared.is_empty()).then_some(declared),
        });
    }
    categories
}

/// Offer name; `vendor.model` offers without one are named from their parts.
fn offer_name(offer: &RawValue) -> String {
    let name = normalize_text(offer.as_keyed().and_then(|map| map.get_any(&["name", "title"])));
    if !name.is_empty() {
        return name;
    }

    let is_vendor_model = normalize_text(offer.get("type")) == "vendor.model";
    let parts: Vec<String> = if is_vendor_model {
        ["typePrefix", "vendor", "model"]
            .iter()
            .map(|key| normalize_text(offer.get(key)))
            .filter(|part| !part.is_empty())
            .collect()
    } else {
        vec![normalize_text(offer.get("model"))]
    };
    parts.join(" ").trim().to_string()
}

fn synthesized_external_id(position: usize, name: &str) -> String {
    let slug = name
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    let positional = ExternalId::positional(position).into_inner();
    if slug.is_empty() {
        positional
    } else {
        format!("{positional}-{slug}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    fn epoch() -> NaiveDateTime {
        DateTime::from_timestamp(0, 0).unwrap().naive_utc()
    }

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<yml_catalog date="2024-05-01 10:00">
  <shop>
    <name>Tea House</name>
    <company>Tea House LLC</company>
    <url>https://tea.example.com</url>
    <currencies><currency id="rub" rate="1"/></currencies>
    <categories>
      <category id="1">Tea</category>
      <category id="2" parentId="1">Green tea</category>
    </categories>
    <offers>
      <offer id="a1" available="true">
        <name>Sencha</name>
        <price>1 200,50</price>
        <oldprice>1500</oldprice>
        <categoryId>2</categoryId>
        <url>https://tea.example.com/sencha</url>
        <picture>https://tea.example.com/1.jpg</picture>
        <picture>https://tea.example.com/2.jpg</picture>
        <description><![CDATA[<p>Fresh&nbsp;<b>green</b></p>]]></description>
        <param name="Weight" unit="g">100</param>
      </offer>
      <offer id="a1" type="vendor.model">
        <typePrefix>Teapot</typePrefix>
        <vendor>Hario</vendor>
        <model>V60</model>
        <price>abc</price>
        <categoryId>9</categoryId>
        <currencyId>usd</currencyId>
      </offer>
    </offers>
  </shop>
</yml_catalog>"#;

    fn build() -> Catalog {
        CatalogBuilder::new("Supplier")
            .source_url("https://feeds.example.com/tea.xml")
            .modified_at(epoch())
            .build(FEED)
            .unwrap()
    }

    #[test]
    fn reads_metadata() {
        let catalog = build();
        assert_eq!(catalog.name, "Supplier");
        assert_eq!(catalog.metadata.shop_name, "Tea House");
        assert_eq!(catalog.metadata.company.as_deref(), Some("Tea House LLC"));
        assert_eq!(catalog.metadata.shop_url.as_deref(), Some("https://tea.example.com"));
        assert_eq!(
            catalog.metadata.source_url.as_deref(),
            Some("https://feeds.example.com/tea.xml")
        );
        assert_eq!(catalog.metadata.feed_date.as_deref(), Some("2024-05-01 10:00"));
        assert_eq!(catalog.metadata.currencies, vec![CurrencyCode::new("RUB").unwrap()]);
        assert_eq!(catalog.metadata.date_modified, epoch());
        assert_eq!(catalog.id, CatalogId::derive("https://feeds.example.com/tea.xml"));
    }

    #[test]
    fn normalizes_offer_fields() {
        let catalog = build();
        let sencha = &catalog.products[0];
        assert_eq!(sencha.external_id, "a1");
        assert_eq!(sencha.id, ProductId::derive("a1"));
        assert_eq!(sencha.name, "Sencha");
        assert_eq!(sencha.description, "Fresh green");
        assert_eq!(sencha.price, 1200.5);
        assert_eq!(sencha.old_price.map(|p| p.get()), Some(1500.0));
        assert_eq!(sencha.currency, "RUB");
        assert_eq!(sencha.pictures.len(), 2);
        assert_eq!(sencha.url.as_deref(), Some("https://tea.example.com/sencha"));
        assert!(sencha.available);
        assert_eq!(sencha.attributes.len(), 1);
        assert_eq!(sencha.attributes[0].name, "Weight");
        assert_eq!(sencha.attributes[0].value, "100");
        assert_eq!(sencha.category_id, Some(CategoryId::derive("2")));
        assert!(sencha.raw.get("param").is_some());
    }

    #[test]
    fn names_vendor_model_offers_and_suffixes_duplicate_ids() {
        let catalog = build();
        let teapot = &catalog.products[1];
        assert_eq!(teapot.external_id, "a1_1");
        assert_eq!(teapot.name, "Teapot Hario V60");
        assert_eq!(teapot.price, 0.0);
        assert_eq!(teapot.currency, "USD");
        assert_ne!(teapot.id, catalog.products[0].id);
    }

    #[test]
    fn keeps_declared_category_ids_as_external_references() {
        let catalog = build();
        let green = catalog.category(&CategoryId::derive("2")).unwrap();
        assert_eq!(green.name, "Green tea");
        assert_eq!(green.external_id.as_deref(), Some("2"));
        assert_eq!(green.parent_id, Some(CategoryId::derive("1")));
    }

    #[test]
    fn synthesizes_orphan_categories() {
        let catalog = build();
        let orphan = catalog.category(&CategoryId::derive("9")).unwrap();
        assert_eq!(orphan.name, "Category 9");
        assert!(catalog.orphan_category_ids().is_empty());
    }

    #[test]
    fn rebuilding_is_deterministic() {
        assert_eq!(build(), build());
    }

    #[test]
    fn uuid_category_ids_are_kept() {
        let declared = "0b0e3f5c-3d7a-4b1e-9b55-7f3c2c1d9e01";
        assert_eq!(category_id_for(declared).as_str(), declared);
        assert_eq!(category_id_for("12"), CategoryId::derive("12"));
    }

    #[test]
    fn synthesizes_missing_external_ids_from_position_and_name() {
        let catalog = CatalogBuilder::new("x")
            .build("<shop><offers><offer><name>Green Tea</name></offer><offer><name>Green Tea</name></offer></offers></shop>")
            .unwrap();
        let ids: Vec<_> = catalog.products.iter().map(|p| p.external_id.as_str()).collect();
        assert_eq!(ids, vec!["offer-0-green-tea", "offer-1-green-tea"]);
    }

    #[test]
    fn shop_name_falls_back_to_caller_name() {
        let catalog = CatalogBuilder::new("Supplier")
            .build("<shop><offers><offer id=\"1\"><price>5</price></offer></offers></shop>")
            .unwrap();
        assert_eq!(catalog.metadata.shop_name, "Supplier");

        let catalog = CatalogBuilder::new("  ")
            .build("<shop><offers><offer id=\"1\"><price>5</price></offer></offers></shop>")
            .unwrap();
        assert_eq!(catalog.metadata.shop_name, UNKNOWN_SHOP);
        assert_eq!(catalog.name, UNKNOWN_SHOP);
    }

    #[test]
    fn currency_falls_back_to_builder_default() {
        let catalog = CatalogBuilder::new("x")
            .default_currency("eur")
            .build("<shop><offers><offer id=\"1\"/></offers></shop>")
            .unwrap();
        assert_eq!(catalog.products[0].currency, "EUR");
    }

    #[tokio::test]
    async fn batched_build_matches_single_pass() {
        let builder = CatalogBuilder::new("Supplier").modified_at(epoch());
        let single = builder.build(FEED).unwrap();

        let mut progress = Vec::new();
        let batched = builder
            .build_batched(FEED, 1, |done, total| progress.push((done, total)))
            .await
            .unwrap();

        assert_eq!(single, batched);
        assert_eq!(progress, vec![(1, 2), (2, 2)]);
    }
}
