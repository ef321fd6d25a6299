//! Snapshot reconciliation: field-level diff between a stored catalog and a
//! freshly built one, and application of the operator-approved subset.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use chrono::{NaiveDateTime, Utc};

use crate::domain::catalog::{Catalog, MergeIdentityMap};
use crate::domain::category::Category;
use crate::domain::diff::{
    DiffField, DiffKind, FieldChange, FieldSelection, FieldValue, ProductDiff, ReconcileRules,
};
use crate::domain::product::{Product, ProductAttribute};
use crate::domain::types::ProductId;

/// Computes per-product differences from `old` to `new`.
///
/// Entries follow the order of `new.products`. When `merge_map` is `None`
/// the map stored on `old` is used.
pub fn diff(
    old: &Catalog,
    new: &Catalog,
    rules: &ReconcileRules,
    merge_map: Option<&MergeIdentityMap>,
) -> Vec<ProductDiff> {
    let merge_map = merge_map.unwrap_or(&old.metadata.merged_id_map);
    let old_products: HashMap<&ProductId, &Product> =
        old.products.iter().map(|product| (&product.id, product)).collect();

    let mut diffs = Vec::new();
    for product in &new.products {
        match old_products.get(&product.id) {
            Some(previous) => {
                let fields = changed_fields(previous, product, rules);
                if !fields.is_empty() {
                    diffs.push(ProductDiff {
                        product_id: product.id.clone(),
                        kind: DiffKind::Changed,
                        fields,
                        old: Some(Box::new((*previous).clone())),
                        new: Box::new(product.clone()),
                    });
                }
            }
            None if rules.ignore_ids_in_merge_map && merge_map.contains(&product.id) => {
                log::debug!("Product {} was merged earlier; not reported as new", product.id);
            }
            None if rules.treat_new_as_new => diffs.push(ProductDiff {
                product_id: product.id.clone(),
                kind: DiffKind::New,
                fields: BTreeMap::new(),
                old: None,
                new: Box::new(product.clone()),
            }),
            None => {}
        }
    }
    diffs
}

fn changed_fields(
    old: &Product,
    new: &Product,
    rules: &ReconcileRules,
) -> BTreeMap<DiffField, FieldChange> {
    DiffField::ALL
        .into_iter()
        .filter(|field| rules.compares(*field))
        .filter(|field| differs(*field, old, new))
        .map(|field| {
            let change = FieldChange {
                old: field_value(field, old),
                new: field_value(field, new),
            };
            (field, change)
        })
        .collect()
}

fn differs(field: DiffField, old: &Product, new: &Product) -> bool {
    match field {
        DiffField::Name => old.name != new.name,
        DiffField::Description => old.description != new.description,
        DiffField::Price => old.price.get() != new.price.get(),
        DiffField::Available => old.available != new.available,
        DiffField::Attributes => {
            attribute_signatures(&old.attributes) != attribute_signatures(&new.attributes)
        }
    }
}

fn field_value(field: DiffField, product: &Product) -> FieldValue {
    match field {
        DiffField::Name => FieldValue::Text(product.name.clone()),
        DiffField::Description => FieldValue::Text(product.description.clone()),
        DiffField::Price => FieldValue::Number(product.price.get()),
        DiffField::Available => FieldValue::Flag(product.available),
        DiffField::Attributes => FieldValue::Attributes(product.attributes.clone()),
    }
}

/// Order-independent identity of an attribute set.
fn attribute_signatures(attributes: &[ProductAttribute]) -> BTreeSet<(String, String)> {
    attributes.iter().map(ProductAttribute::signature).collect()
}

/// Applies approved entries of `diffs` to `old`, stamping the current time.
pub fn apply_diff(
    old: Catalog,
    diffs: &[ProductDiff],
    selection: &FieldSelection,
    new_categories: Vec<Category>,
) -> Catalog {
    apply_diff_at(old, diffs, selection, new_categories, Utc::now().naive_utc())
}

/// [`apply_diff`] with an explicit `date_modified` stamp.
///
/// Approved `Changed` fields are copied onto the stored product, except the
/// attribute set, which becomes the union of old and new by `(name, value)`.
/// Approved `New` entries are appended. Categories are replaced wholesale and
/// the source URL is left untouched. Ids missing from `old` are skipped.
pub fn apply_diff_at(
    mut old: Catalog,
    diffs: &[ProductDiff],
    selection: &FieldSelection,
    new_categories: Vec<Category>,
    at: NaiveDateTime,
) -> Catalog {
    let mut applied_fields = 0usize;
    let mut appended = 0usize;

    for entry in diffs {
        match entry.kind {
            DiffKind::New => {
                if !selection.contains_product(&entry.product_id) {
                    continue;
                }
                if old.product(&entry.product_id).is_some() {
                    log::debug!("Product {} already present; skipping", entry.product_id);
                    continue;
                }
                old.products.push((*entry.new).clone());
                appended += 1;
            }
            DiffKind::Changed => {
                let Some(target) = old
                    .products
                    .iter_mut()
                    .find(|product| product.id == entry.product_id)
                else {
                    log::debug!("Product {} not found; change ignored", entry.product_id);
                    continue;
                };
                for field in entry.fields.keys() {
                    if selection.is_approved(&entry.product_id, *field) {
                        apply_field(target, &entry.new, *field);
                        applied_fields += 1;
                    }
                }
            }
        }
    }

    old.categories = new_categories;
    old.metadata.date_modified = at;

    log::info!(
        "Applied {applied_fields} field changes and {appended} new products to catalog '{}'",
        old.name
    );
    old
}

fn apply_field(target: &mut Product, source: &Product, field: DiffField) {
    match field {
        DiffField::Name => target.name = source.name.clone(),
        DiffField::Description => target.description = source.description.clone(),
        DiffField::Price => target.price = source.price,
        DiffField::Available => target.available = source.available,
        DiffField::Attributes => {
            let mut present: HashSet<(String, String)> =
                target.attributes.iter().map(ProductAttribute::signature).collect();
            for attribute in &source.attributes {
                if present.insert(attribute.signature()) {
                    target.attributes.push(attribute.clone());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::fixtures::catalog;
    use crate::domain::product::fixtures::{attribute, product};
    use crate::domain::types::{CategoryId, CategoryName, ProductPrice};
    use chrono::DateTime;

    fn priced(id: &str, price: f64) -> Product {
        let mut item = product(id);
        item.price = ProductPrice::new(price).unwrap();
        item
    }

    fn id(value: &str) -> ProductId {
        ProductId::new(value).unwrap()
    }

    #[test]
    fn reports_price_change_only() {
        let old = catalog(vec![priced("p1", 100.0)]);
        let new = catalog(vec![priced("p1", 120.0)]);

        let diffs = diff(&old, &new, &ReconcileRules::default(), None);
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].kind, DiffKind::Changed);
        assert_eq!(diffs[0].fields.len(), 1);
        assert_eq!(
            diffs[0].fields[&DiffField::Price],
            FieldChange {
                old: FieldValue::Number(100.0),
                new: FieldValue::Number(120.0),
            }
        );
    }

    #[test]
    fn identical_catalogs_have_no_diff() {
        let mut item = product("p1");
        item.attributes = vec![attribute("Size", "M")];
        let snapshot = catalog(vec![item, product("p2")]);

        assert!(diff(&snapshot, &snapshot, &ReconcileRules::default(), None).is_empty());
        assert!(diff(&snapshot, &snapshot, &ReconcileRules::none(), None).is_empty());
    }

    #[test]
    fn attribute_order_does_not_matter() {
        let mut before = product("p1");
        before.attributes = vec![attribute("Size", "M"), attribute("Color", "red")];
        let mut after = product("p1");
        after.attributes = vec![attribute("color", "red"), attribute("Size", " M ")];

        let diffs = diff(
            &catalog(vec![before]),
            &catalog(vec![after]),
            &ReconcileRules::default(),
            None,
        );
        assert!(diffs.is_empty());
    }

    #[test]
    fn disabled_comparisons_are_skipped() {
        let old = catalog(vec![priced("p1", 100.0)]);
        let new = catalog(vec![priced("p1", 120.0)]);
        let rules = ReconcileRules {
            compare_price: false,
            ..ReconcileRules::default()
        };
        assert!(diff(&old, &new, &rules, None).is_empty());
    }

    #[test]
    fn new_products_respect_rules_and_merge_map() {
        let old = catalog(vec![product("p1")]);
        let new = catalog(vec![product("p1"), product("p2"), product("p3")]);
        let mut merge_map = MergeIdentityMap::new();
        merge_map.insert(id("p2"), id("p1"));

        let diffs = diff(&old, &new, &ReconcileRules::default(), Some(&merge_map));
        let ids: Vec<_> = diffs.iter().map(|d| d.product_id.as_str()).collect();
        assert_eq!(ids, vec!["p3"]);
        assert_eq!(diffs[0].kind, DiffKind::New);

        let rules = ReconcileRules {
            ignore_ids_in_merge_map: false,
            ..ReconcileRules::default()
        };
        assert_eq!(diff(&old, &new, &rules, Some(&merge_map)).len(), 2);

        let rules = ReconcileRules {
            treat_new_as_new: false,
            ..ReconcileRules::default()
        };
        assert!(diff(&old, &new, &rules, Some(&merge_map)).is_empty());
    }

    #[test]
    fn stored_merge_map_is_used_by_default() {
        let mut old = catalog(vec![product("p1")]);
        old.metadata.merged_id_map.insert(id("p2"), id("p1"));
        let new = catalog(vec![product("p1"), product("p2")]);

        assert!(diff(&old, &new, &ReconcileRules::default(), None).is_empty());
    }

    #[test]
    fn applies_only_approved_fields() {
        let mut before = priced("p1", 100.0);
        before.available = true;
        let mut after = priced("p1", 120.0);
        after.available = false;
        after.name = "Renamed".into();

        let old = catalog(vec![before]);
        let new = catalog(vec![after]);
        let diffs = diff(&old, &new, &ReconcileRules::default(), None);

        let mut selection = FieldSelection::new();
        selection.approve(id("p1"), DiffField::Price);
        let at = DateTime::from_timestamp(60, 0).unwrap().naive_utc();
        let updated = apply_diff_at(old, &diffs, &selection, vec![], at);

        let product = updated.product(&id("p1")).unwrap();
        assert_eq!(product.price, 120.0);
        assert!(product.available);
        assert_eq!(product.name, "Product p1");
        assert_eq!(updated.metadata.date_modified, at);
    }

    #[test]
    fn attribute_updates_are_unioned() {
        let mut before = product("p1");
        before.attributes = vec![attribute("Size", "M"), attribute("Local", "note")];
        let mut after = product("p1");
        after.attributes = vec![attribute("Size", "M"), attribute("Size", "L")];

        let old = catalog(vec![before]);
        let diffs = diff(&old, &catalog(vec![after]), &ReconcileRules::default(), None);
        let updated = apply_diff(old, &diffs, &FieldSelection::all(&diffs), vec![]);

        let values: Vec<(&str, &str)> = updated.products[0]
            .attributes
            .iter()
            .map(|a| (a.name.as_str(), a.value.as_str()))
            .collect();
        assert_eq!(values, vec![("Size", "M"), ("Local", "note"), ("Size", "L")]);
    }

    #[test]
    fn approved_new_products_are_appended_and_categories_replaced() {
        let mut old = catalog(vec![product("p1")]);
        old.metadata.source_url = Some("https://feeds.example.com/original.xml".into());
        let mut new = catalog(vec![product("p1"), product("p2"), product("p3")]);
        new.metadata.source_url = Some("https://elsewhere.example.com".into());

        let diffs = diff(&old, &new, &ReconcileRules::default(), None);
        let mut selection = FieldSelection::new();
        selection.approve_new(id("p3"));
        let categories = vec![Category::new(
            CategoryId::derive("1"),
            CategoryName::new("Tea").unwrap(),
        )];

        let updated = apply_diff(old, &diffs, &selection, categories.clone());
        let ids: Vec<_> = updated.products.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p3"]);
        assert_eq!(updated.categories, categories);
        assert_eq!(
            updated.metadata.source_url.as_deref(),
            Some("https://feeds.example.com/original.xml")
        );
    }

    #[test]
    fn unknown_ids_are_ignored_on_apply() {
        let old = catalog(vec![product("p1")]);
        let stray = catalog(vec![priced("ghost", 5.0)]);
        let diffs = diff(&catalog(vec![product("ghost")]), &stray, &ReconcileRules::default(), None);
        assert_eq!(diffs.len(), 1);

        let updated = apply_diff(old.clone(), &diffs, &FieldSelection::all(&diffs), vec![]);
        assert_eq!(updated.products, old.products);
    }
}
