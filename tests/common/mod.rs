//! Helpers for integration tests.
#![allow(dead_code)]

use chrono::{DateTime, NaiveDateTime};
use pushkind_feeds::domain::catalog::Catalog;
use pushkind_feeds::import::CatalogBuilder;

/// Fixed stamp so catalogs built in tests compare equal.
pub fn epoch() -> NaiveDateTime {
    DateTime::from_timestamp(0, 0)
        .expect("valid timestamp")
        .naive_utc()
}

pub fn build(raw: &str) -> Catalog {
    CatalogBuilder::new("Test feed")
        .source_url("https://feeds.example.com/test.xml")
        .modified_at(epoch())
        .build(raw)
        .expect("feed should build")
}

/// Standard export with categories, currencies and two size variants of
/// one shirt sharing a URL.
pub const SHIRTS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<yml_catalog date="2024-06-01 12:00">
  <shop>
    <name>Shirt Shop</name>
    <company>Shirts Ltd</company>
    <url>https://shirts.example.com</url>
    <currencies><currency id="RUB" rate="1"/></currencies>
    <categories>
      <category id="10">Clothes</category>
      <category id="11" parentId="10">Shirts</category>
    </categories>
    <offers>
      <offer id="s-1" available="true">
        <name>Oxford shirt</name>
        <url>https://shirts.example.com/oxford</url>
        <price>2500</price>
        <categoryId>11</categoryId>
        <picture>https://shirts.example.com/oxford-s.jpg</picture>
        <param name="Размер">S</param>
        <param name="Цвет">white</param>
      </offer>
      <offer id="s-2" available="false">
        <name>Oxford shirt</name>
        <url>https://shirts.example.com/oxford</url>
        <price>2500</price>
        <categoryId>11</categoryId>
        <param name="Размер">M</param>
        <param name="Цвет">blue</param>
      </offer>
      <offer id="s-3">
        <name>Linen shirt</name>
        <url>https://shirts.example.com/linen</url>
        <price>3100</price>
        <stock>4</stock>
        <categoryId>11</categoryId>
      </offer>
    </offers>
  </shop>
</yml_catalog>"#;

/// One document per resolvable layout, each carrying offers.
pub fn shaped_documents() -> Vec<(&'static str, &'static str)> {
    vec![
        (
            "catalog shop",
            r#"<yml_catalog><shop><offers><offer id="1"><name>A</name></offer></offers></shop></yml_catalog>"#,
        ),
        (
            "root shop",
            r#"<?xml version="1.0"?><shop><offers><offer id="1"><name>A</name></offer></offers></shop>"#,
        ),
        (
            "nested shop",
            r#"<?xml version="1.0"?><export><shop><offers><offer id="1"><name>A</name></offer></offers></shop></export>"#,
        ),
        (
            "record array",
            r#"{"goods": [{"id": "1", "name": "A"}, {"id": "2", "title": "B"}]}"#,
        ),
        (
            "collection holder",
            r#"<?xml version="1.0"?><catalog><items><item id="1"><name>A</name></item></items></catalog>"#,
        ),
        (
            "deep offers",
            r#"<?xml version="1.0"?><root><a><b><offers><offer id="1"><name>A</name></offer></offers></b></a></root>"#,
        ),
        (
            "root shop without declaration",
            r#"<shop><offers><offer id="1"><name>A</name></offer></offers></shop>"#,
        ),
        (
            "nested shop without declaration",
            r#"<export><shop><offers><offer id="1"><name>A</name></offer></offers></shop></export>"#,
        ),
        (
            "collection holder without declaration",
            r#"<catalog><items><item id="1"><name>A</name></item></items></catalog>"#,
        ),
        (
            "deep offers without declaration",
            r#"<root><a><b><offers><offer id="1"><name>A</name></offer></offers></b></a></root>"#,
        ),
    ]
}
