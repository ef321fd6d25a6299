//! Locates the shop node, offer collection and category collection inside
//! documents that do not reliably follow the nominal feed schema.
//!
//! Known layouts are tried in a fixed priority order; when none matches, a
//! bounded depth-first search over the tree takes the first node that looks
//! like an offer or category collection.

use std::fmt::{Display, Formatter};

use crate::domain::errors::{CatalogError, CatalogResult};
use crate::domain::raw::{RawMap, RawValue};
use crate::import::document::CATALOG_ROOT;

/// Deepest level the recursive searches descend to.
pub const MAX_SEARCH_DEPTH: usize = 16;

const RECORD_KEYS: [&str; 3] = ["name", "title", "price"];
const COLLECTION_KEYS: [&str; 3] = ["offers", "items", "products"];
/// Lists that hold record-shaped values but are never offers.
const NON_OFFER_KEYS: [&str; 7] = [
    "param",
    "params",
    "attributes",
    "attribute",
    "currencies",
    "currency",
    "delivery-options",
];

/// Which heuristic located the shop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    /// `yml_catalog > shop`.
    CatalogShop,
    /// `shop` directly under the root.
    RootShop,
    /// The only first-level value holding a `shop`.
    NestedShop(String),
    /// First-level array of records, wrapped in a pseudo-shop.
    RecordArray(String),
    /// First-level object exposing an offers/items/products collection.
    CollectionHolder(String),
    /// Found by the recursive search.
    Search,
}

impl Display for Strategy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CatalogShop => write!(f, "catalog shop"),
            Self::RootShop => write!(f, "root shop"),
            Self::NestedShop(key) => write!(f, "shop under '{key}'"),
            Self::RecordArray(key) => write!(f, "record array '{key}'"),
            Self::CollectionHolder(key) => write!(f, "collection holder '{key}'"),
            Self::Search => write!(f, "recursive search"),
        }
    }
}

/// A located shop-like node: metadata source plus its collections.
#[derive(Debug, Clone)]
pub struct ResolvedShop<'a> {
    /// Node metadata is read from; `None` for a pseudo-shop built around a
    /// bare collection.
    pub shop: Option<&'a RawMap>,
    /// The catalog root element, when the document has one.
    pub catalog_root: Option<&'a RawMap>,
    pub offers: Vec<&'a RawValue>,
    pub categories: Vec<&'a RawValue>,
    pub strategy: Strategy,
}

/// Runs the resolution cascade over a parsed document.
pub fn resolve_structure(tree: &RawValue) -> CatalogResult<ResolvedShop<'_>> {
    let resolved = match tree {
        RawValue::Keyed(root) => resolve_keyed(root),
        RawValue::List(items) if is_record_array(items) => Some(ResolvedShop {
            shop: None,
            catalog_root: None,
            offers: records(tree),
            categories: Vec::new(),
            strategy: Strategy::RecordArray(String::new()),
        }),
        _ => None,
    };

    let resolved = match resolved {
        Some(resolved) => resolved,
        None => search_everywhere(tree)?,
    };

    log::debug!(
        "Resolved feed structure via {} ({} offers, {} categories)",
        resolved.strategy,
        resolved.offers.len(),
        resolved.categories.len()
    );
    Ok(resolved)
}

fn resolve_keyed(root: &RawMap) -> Option<ResolvedShop<'_>> {
    let catalog_root = root.get(CATALOG_ROOT).and_then(RawValue::as_keyed);

    if let Some(shop) = catalog_root.and_then(|c| c.get("shop")).and_then(RawValue::as_keyed) {
        return Some(from_shop(shop, catalog_root, Strategy::CatalogShop));
    }

    if let Some(shop) = root.get("shop").and_then(RawValue::as_keyed) {
        return Some(from_shop(shop, catalog_root, Strategy::RootShop));
    }

    let scopes = scopes(root);

    for &scope in &scopes {
        let holders: Vec<(&str, &RawMap, &RawMap)> = scope
            .iter()
            .filter_map(|(key, value)| {
                let holder = value.as_keyed()?;
                let shop = holder.get("shop")?.as_keyed()?;
                Some((key, holder, shop))
            })
            .collect();
        if let [(key, holder, shop)] = holders.as_slice() {
            return Some(from_shop(
                *shop,
                Some(*holder),
                Strategy::NestedShop(key.to_string()),
            ));
        }
    }

    for &scope in &scopes {
        if let Some((key, value)) = scope
            .iter()
            .filter(|(key, _)| !is_excluded_offer_key(key))
            .find(|(_, value)| value.as_list().is_some_and(is_record_array))
        {
            return Some(ResolvedShop {
                shop: None,
                catalog_root,
                offers: records(value),
                categories: find_categories(scope),
                strategy: Strategy::RecordArray(key.to_string()),
            });
        }
    }

    for &scope in &scopes {
        if let Some((key, holder)) = scope.iter().find_map(|(key, value)| {
            let holder = value.as_keyed()?;
            COLLECTION_KEYS
                .iter()
                .any(|k| holder.contains_key(k))
                .then_some((key, holder))
        }) {
            return Some(from_shop(
                holder,
                catalog_root,
                Strategy::CollectionHolder(key.to_string()),
            ));
        }
    }

    None
}

/// The root itself and, for a single-element document, the element's body.
fn scopes(root: &RawMap) -> Vec<&RawMap> {
    let mut scopes = vec![root];
    if root.len() == 1
        && let Some(body) = root.values().next().and_then(RawValue::as_keyed)
    {
        scopes.push(body);
    }
    scopes
}

fn from_shop<'a>(
    shop: &'a RawMap,
    catalog_root: Option<&'a RawMap>,
    strategy: Strategy,
) -> ResolvedShop<'a> {
    let offers = offers_at(shop)
        .or_else(|| search_children(shop, 1, &offers_at))
        .unwrap_or_else(|| {
            log::debug!("Shop node has no offers; continuing with an empty collection");
            Vec::new()
        });
    ResolvedShop {
        shop: Some(shop),
        catalog_root,
        offers,
        categories: find_categories(shop),
        strategy,
    }
}

fn find_categories(node: &RawMap) -> Vec<&RawValue> {
    categories_at(node)
        .or_else(|| search_children(node, 1, &categories_at))
        .unwrap_or_default()
}

fn search_everywhere(tree: &RawValue) -> CatalogResult<ResolvedShop<'_>> {
    let Some(offers) = search(tree, 0, &offers_at) else {
        return Err(CatalogError::StructureNotFound {
            searched: format!(
                "{CATALOG_ROOT}>shop, shop, nested shop, first-level record arrays, \
                 offers/items/products holders, and a recursive search (depth {MAX_SEARCH_DEPTH}) \
                 for offers.offer, offers, items.item, products.product and categories"
            ),
        });
    };
    let categories = search(tree, 0, &categories_at).unwrap_or_default();

    Ok(ResolvedShop {
        shop: None,
        catalog_root: None,
        offers,
        categories,
        strategy: Strategy::Search,
    })
}

type Probe<'a> = dyn Fn(&'a RawMap) -> Option<Vec<&'a RawValue>>;

/// Depth-first, first hit wins. The input is a tree so no cycle guard is
/// needed; depth is bounded regardless.
fn search<'a>(node: &'a RawValue, depth: usize, probe: &Probe<'a>) -> Option<Vec<&'a RawValue>> {
    if depth > MAX_SEARCH_DEPTH {
        return None;
    }
    match node {
        RawValue::Keyed(map) => probe(map).or_else(|| search_children(map, depth + 1, probe)),
        RawValue::List(items) => items.iter().find_map(|item| search(item, depth + 1, probe)),
        RawValue::Primitive(_) => None,
    }
}

fn search_children<'a>(
    map: &'a RawMap,
    depth: usize,
    probe: &Probe<'a>,
) -> Option<Vec<&'a RawValue>> {
    map.values().find_map(|value| search(value, depth, probe))
}

/// Offer collection shapes, in priority order.
fn offers_at(map: &RawMap) -> Option<Vec<&RawValue>> {
    let nested = [("offers", "offer"), ("items", "item"), ("products", "product")];
    if let Some(found) = nested
        .iter()
        .filter_map(|(outer, inner)| map.get(outer)?.get(inner))
        .map(records)
        .find(|found| !found.is_empty())
    {
        return Some(found);
    }

    if let Some(bare) = map.get("offers").and_then(RawValue::as_list) {
        let found: Vec<&RawValue> = bare.iter().filter(|v| v.as_keyed().is_some()).collect();
        if !found.is_empty() {
            return Some(found);
        }
    }

    map.iter()
        .filter(|(key, _)| !is_excluded_offer_key(key))
        .find_map(|(_, value)| {
            let items = value.as_list()?;
            is_record_array(items).then(|| records(value))
        })
}

/// Category collection shapes, in priority order.
fn categories_at(map: &RawMap) -> Option<Vec<&RawValue>> {
    if let Some(found) = map
        .get("categories")
        .and_then(|c| c.get("category"))
        .map(RawValue::items)
        .filter(|found| !found.is_empty())
    {
        return Some(found);
    }

    if let Some(bare) = map.get("categories").and_then(RawValue::as_list) {
        if !bare.is_empty() {
            return Some(bare.iter().collect());
        }
    }

    if let Some(found) = map.iter().find_map(|(key, value)| {
        let key = key.to_lowercase();
        if !key.contains("categor") || key == "category" || key == "categories" {
            return None;
        }
        let holder = value.as_keyed()?;
        let found = match holder.values().find_map(RawValue::as_list) {
            Some(list) => list.iter().collect::<Vec<_>>(),
            None => holder.values().filter(|v| v.as_keyed().is_some()).collect(),
        };
        (!found.is_empty()).then_some(found)
    }) {
        return Some(found);
    }

    map.get("category")
        .map(RawValue::items)
        .filter(|found| !found.is_empty())
}

fn is_excluded_offer_key(key: &str) -> bool {
    let key = key.to_lowercase();
    NON_OFFER_KEYS.contains(&key.as_str()) || key.contains("categor")
}

fn is_record(value: &RawValue) -> bool {
    value
        .as_keyed()
        .is_some_and(|map| RECORD_KEYS.iter().any(|key| map.contains_key(key)))
}

fn is_record_array(items: &[RawValue]) -> bool {
    items.iter().any(is_record)
}

/// Keyed members of a collection; scalars are not offers.
fn records(value: &RawValue) -> Vec<&RawValue> {
    value
        .items()
        .into_iter()
        .filter(|item| item.as_keyed().is_some())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tree(value: serde_json::Value) -> RawValue {
        RawValue::from(value)
    }

    #[test]
    fn finds_catalog_shop() {
        let doc = tree(json!({
            "yml_catalog": {"date": "2024", "shop": {
                "name": "Shop",
                "categories": {"category": [{"id": "1", "#text": "Tea"}]},
                "offers": {"offer": [{"id": "a", "price": "1"}, {"id": "b", "price": "2"}]}
            }}
        }));
        let resolved = resolve_structure(&doc).unwrap();
        assert_eq!(resolved.strategy, Strategy::CatalogShop);
        assert_eq!(resolved.offers.len(), 2);
        assert_eq!(resolved.categories.len(), 1);
        assert!(resolved.catalog_root.is_some());
    }

    #[test]
    fn finds_root_shop() {
        let doc = tree(json!({"shop": {"offers": {"offer": {"id": "a", "price": "1"}}}}));
        let resolved = resolve_structure(&doc).unwrap();
        assert_eq!(resolved.strategy, Strategy::RootShop);
        assert_eq!(resolved.offers.len(), 1);
    }

    #[test]
    fn finds_shop_under_single_holder() {
        let doc = tree(json!({"export": {"shop": {"offers": [{"name": "A"}]}}}));
        let resolved = resolve_structure(&doc).unwrap();
        assert_eq!(resolved.strategy, Strategy::NestedShop("export".into()));
        assert_eq!(resolved.offers.len(), 1);
    }

    #[test]
    fn finds_nested_shop_under_synthesized_root() {
        let doc = tree(json!({"yml_catalog": {"export": {"shop": {
            "name": "Real Shop",
            "offers": {"offer": [{"id": "1", "name": "A"}]}
        }}}}));
        let resolved = resolve_structure(&doc).unwrap();
        assert_eq!(resolved.strategy, Strategy::NestedShop("export".into()));
        assert_eq!(
            resolved.shop.and_then(|shop| shop.get("name")),
            Some(&RawValue::text("Real Shop"))
        );
        assert_eq!(resolved.offers.len(), 1);
    }

    #[test]
    fn categories_alone_do_not_make_a_catalog() {
        let doc = tree(json!({"root": {"groups": {"categories": [{"id": "1", "name": "Tea"}]}}}));
        assert!(matches!(
            resolve_structure(&doc),
            Err(CatalogError::StructureNotFound { .. })
        ));
    }

    #[test]
    fn wraps_first_level_record_array() {
        let doc = tree(json!({"goods": [{"title": "A"}, {"title": "B"}]}));
        let resolved = resolve_structure(&doc).unwrap();
        assert_eq!(resolved.strategy, Strategy::RecordArray("goods".into()));
        assert!(resolved.shop.is_none());
        assert_eq!(resolved.offers.len(), 2);
    }

    #[test]
    fn wraps_record_array_inside_document_element() {
        let doc = tree(json!({"products": {"product": [{"name": "A"}, {"name": "B"}]}}));
        let resolved = resolve_structure(&doc).unwrap();
        assert_eq!(resolved.strategy, Strategy::RecordArray("product".into()));
        assert_eq!(resolved.offers.len(), 2);
    }

    #[test]
    fn uses_collection_holder() {
        let doc = tree(json!({"catalog": {"name": "X", "items": {"item": [{"price": "3"}]}}}));
        let resolved = resolve_structure(&doc).unwrap();
        assert_eq!(resolved.strategy, Strategy::CollectionHolder("catalog".into()));
        assert_eq!(resolved.offers.len(), 1);
        assert!(resolved.shop.is_some());
    }

    #[test]
    fn searches_deep_offers_and_categories() {
        let doc = tree(json!({
            "root": {"a": {"b": {
                "groups": {"categories": [{"id": "1", "name": "Tea"}]},
                "data": {"offers": {"offer": [{"id": "x"}]}}
            }}}
        }));
        let resolved = resolve_structure(&doc).unwrap();
        assert_eq!(resolved.strategy, Strategy::Search);
        assert_eq!(resolved.offers.len(), 1);
        assert_eq!(resolved.categories.len(), 1);
    }

    #[test]
    fn shop_without_offers_is_valid() {
        let doc = tree(json!({"yml_catalog": {"shop": {
            "name": "Only categories",
            "categories": {"category": {"id": "1", "#text": "Tea"}}
        }}}));
        let resolved = resolve_structure(&doc).unwrap();
        assert!(resolved.offers.is_empty());
        assert_eq!(resolved.categories.len(), 1);
    }

    #[test]
    fn category_lists_are_not_offers() {
        let doc = tree(json!({"shop": {
            "categories": [{"id": "1", "name": "Tea"}],
            "goods": [{"name": "Sencha"}]
        }}));
        let resolved = resolve_structure(&doc).unwrap();
        assert_eq!(resolved.offers.len(), 1);
        assert_eq!(resolved.offers[0].get("name"), Some(&RawValue::text("Sencha")));
    }

    #[test]
    fn category_holder_objects_are_recognised() {
        let doc = tree(json!({"shop": {
            "productCategories": {"entry": [{"id": "1"}, {"id": "2"}]},
            "offers": {"offer": [{"id": "a"}]}
        }}));
        let resolved = resolve_structure(&doc).unwrap();
        assert_eq!(resolved.categories.len(), 2);
    }

    #[test]
    fn reports_what_was_searched() {
        let doc = tree(json!({"html": {"body": {"p": "hello"}}}));
        match resolve_structure(&doc).unwrap_err() {
            CatalogError::StructureNotFound { searched } => {
                assert!(searched.contains("offers.offer"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn search_depth_is_bounded() {
        let mut value = json!({"offers": {"offer": [{"id": "deep"}]}});
        for _ in 0..(MAX_SEARCH_DEPTH + 2) {
            value = json!({"level": value});
        }
        assert!(resolve_structure(&tree(value)).is_err());
    }
}
