use std::collections::HashSet;

use pushkind_feeds::domain::diff::{DiffKind, ReconcileRules};
use pushkind_feeds::domain::raw::RawValue;
use pushkind_feeds::domain::types::{CategoryId, ProductId};
use pushkind_feeds::import::normalize::{normalize_attribute_value, normalize_availability};
use pushkind_feeds::import::{CatalogBuilder, CatalogError, build_catalog};
use pushkind_feeds::services::merge::{analyze_duplicates, merge_duplicates_at};
use pushkind_feeds::services::reconcile::diff;
use serde_json::json;

mod common;

#[test]
fn every_resolvable_shape_yields_offers() {
    for (shape, document) in common::shaped_documents() {
        let catalog = build_catalog(document, "Shapes", None)
            .unwrap_or_else(|e| panic!("{shape}: {e}"));
        assert!(!catalog.products.is_empty(), "{shape}: no products");
        assert_eq!(catalog.products[0].name, "A", "{shape}");
    }
}

#[test]
fn nested_shop_metadata_survives_without_declaration() {
    let body = r#"<export><shop><name>Real Shop</name><url>https://s.example.com</url><offers><offer id="1"><name>A</name></offer></offers></shop></export>"#;

    for document in [body.to_string(), format!(r#"<?xml version="1.0"?>{body}"#)] {
        let catalog = build_catalog(&document, "Caller", None).expect("feed should build");
        assert_eq!(catalog.metadata.shop_name, "Real Shop");
        assert_eq!(
            catalog.validate_for_export().expect("shop url").as_str(),
            "https://s.example.com"
        );
        assert_eq!(catalog.products.len(), 1);
    }
}

#[test]
fn builds_standard_export() {
    let catalog = common::build(common::SHIRTS);

    assert_eq!(catalog.metadata.shop_name, "Shirt Shop");
    assert_eq!(catalog.metadata.feed_date.as_deref(), Some("2024-06-01 12:00"));
    assert_eq!(catalog.products.len(), 3);
    assert_eq!(catalog.categories.len(), 2);
    assert!(catalog.orphan_category_ids().is_empty());

    let linen = &catalog.products[2];
    assert!(linen.available);
    assert_eq!(linen.category_id, Some(CategoryId::derive("11")));
    assert!(!catalog.products[1].available);
    assert_eq!(catalog.validate_for_export().expect("shop url").as_str(), "https://shirts.example.com");
}

#[test]
fn colliding_external_ids_are_suffixed_in_order() {
    let offers: String = (0..4)
        .map(|i| format!(r#"<offer id="dup"><name>Item {i}</name></offer>"#))
        .collect();
    let document = format!("<yml_catalog><shop><offers>{offers}</offers></shop></yml_catalog>");

    let catalog = common::build(&document);
    let ids: Vec<&str> = catalog
        .products
        .iter()
        .map(|p| p.external_id.as_str())
        .collect();
    assert_eq!(ids, vec!["dup", "dup_1", "dup_2", "dup_3"]);

    let internal: HashSet<&ProductId> = catalog.products.iter().map(|p| &p.id).collect();
    assert_eq!(internal.len(), 4);

    // Dedup state does not leak into the next build.
    assert_eq!(common::build(&document).products[0].external_id, "dup");
}

#[test]
fn categories_are_synthesized_when_none_are_declared() {
    let catalog = common::build(
        r#"<yml_catalog><shop><offers>
            <offer id="1"><categoryId>5</categoryId></offer>
            <offer id="2"><categoryId>5</categoryId></offer>
            <offer id="3"><categoryId>6</categoryId></offer>
        </offers></shop></yml_catalog>"#,
    );
    let names: Vec<&str> = catalog.categories.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["Category 5", "Category 6"]);
    assert_eq!(catalog.categories[0].external_id.as_deref(), Some("5"));
}

#[test]
fn recovers_from_broken_markup() {
    let catalog = common::build(
        "<yml_catalog><shop><offers><offer id=\"1\"><name\u{1}>Tea</name></offer></offers></shop>",
    );
    assert_eq!(catalog.products.len(), 1);
}

#[test]
fn reports_unrecoverable_documents() {
    let err = build_catalog("<yml_catalog><shop></offers></yml_catalog>", "x", None)
        .expect_err("mismatched tags cannot be repaired");
    assert!(matches!(err, CatalogError::MalformedDocument(_)));

    let err = build_catalog("<html><body>nothing here</body></html>", "x", None)
        .expect_err("no catalog data");
    assert!(matches!(err, CatalogError::StructureNotFound { .. }));
}

#[test]
fn metadata_only_documents_are_valid() {
    let catalog = common::build(
        r#"<yml_catalog><shop><name>Empty</name><categories><category id="1">Tea</category></categories></shop></yml_catalog>"#,
    );
    assert!(catalog.products.is_empty());
    assert_eq!(catalog.categories.len(), 1);
}

#[test]
fn attribute_normalization_is_total() {
    let inputs = [
        json!(null),
        json!(0),
        json!("0"),
        json!(false),
        json!([]),
        json!([[null]]),
        json!({}),
        json!({"value": {"label": "XL"}}),
        json!({"deep": {"deeper": [1, 2]}}),
    ];
    for input in inputs {
        let _ = normalize_attribute_value(&RawValue::from(input));
    }
    assert_eq!(normalize_attribute_value(&RawValue::from(json!(0))), "0");
    assert_eq!(normalize_attribute_value(&RawValue::from(json!("0"))), "0");
}

#[test]
fn availability_examples() {
    assert!(!normalize_availability(&RawValue::from(json!({"stock": "0"}))));
    assert!(normalize_availability(&RawValue::from(json!({"price": 10}))));
    assert!(normalize_availability(&RawValue::from(json!({}))));
}

#[test]
fn merges_size_variants() {
    let catalog = common::build(
        r#"<yml_catalog><shop><offers>
            <offer id="1"><url>https://x/1</url><param name="размер">S</param></offer>
            <offer id="2"><url>https://x/1</url><param name="размер">M</param></offer>
        </offers></shop></yml_catalog>"#,
    );
    let merged = merge_duplicates_at(&catalog, &["размер".to_string()], common::epoch());

    assert_eq!(merged.products.len(), 1);
    let master = &merged.products[0];
    assert_eq!(master.attribute("размер").expect("merged attribute").value, "S, M");
    assert_eq!(master.merged_from_variants, Some(2));
}

#[test]
fn merge_is_identity_without_duplicates() {
    let catalog = common::build(
        r#"<yml_catalog><shop><offers>
            <offer id="1"><url>https://x/1</url></offer>
            <offer id="2"><url>https://x/2</url></offer>
            <offer id="3"/>
        </offers></shop></yml_catalog>"#,
    );
    assert!(analyze_duplicates(&catalog).groups.is_empty());
    assert_eq!(merge_duplicates_at(&catalog, &[], common::epoch()), catalog);
}

#[test]
fn merged_variants_are_not_reported_as_new() {
    let catalog = common::build(common::SHIRTS);
    let merged = merge_duplicates_at(&catalog, &[], common::epoch());
    assert_eq!(merged.products.len(), 2);

    let diffs = diff(&merged, &catalog, &ReconcileRules::default(), None);
    assert!(diffs.iter().all(|d| d.kind != DiffKind::New));

    // Only the master differs: its folded attributes versus the first variant's.
    assert_eq!(diffs.len(), 1);
    assert_eq!(diffs[0].product_id, ProductId::derive("s-1"));
}

#[test]
fn diff_of_a_catalog_with_itself_is_empty() {
    let catalog = common::build(common::SHIRTS);
    let all_off = ReconcileRules::none();
    let only_new = ReconcileRules {
        treat_new_as_new: true,
        ..ReconcileRules::none()
    };
    for rules in [ReconcileRules::default(), all_off, only_new] {
        assert!(diff(&catalog, &catalog, &rules, None).is_empty());
    }
}

#[test]
fn rebuilding_reproduces_identity() {
    let first = common::build(common::SHIRTS);
    let second = common::build(common::SHIRTS);
    assert_eq!(first, second);
    assert!(first.categories.iter().all(|c| c.id.is_uuid()));
}

#[tokio::test]
async fn batched_builds_match_for_any_batch_size() {
    let builder = CatalogBuilder::new("Test feed").modified_at(common::epoch());
    let single = builder.build(common::SHIRTS).expect("feed should build");

    for batch_size in [0, 1, 2, 3, 50] {
        let mut reports = Vec::new();
        let batched = builder
            .build_batched(common::SHIRTS, batch_size, |processed, total| {
                reports.push((processed, total))
            })
            .await
            .expect("feed should build");

        assert_eq!(batched, single, "batch size {batch_size}");
        assert_eq!(reports.last(), Some(&(3, 3)), "batch size {batch_size}");
    }
}
