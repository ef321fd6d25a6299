//! Field normalizers: one raw value of unknown shape in, one canonical value
//! out. None of these functions fail; anything that cannot be interpreted
//! cleanly falls back to a best-effort value.

use std::sync::LazyLock;

use regex::Regex;

use crate::domain::raw::{Primitive, RawMap, RawValue, TEXT_KEY};
use crate::domain::types::ProductPrice;

/// Stand-in for attribute values that could not be rendered at all.
pub const ATTRIBUTE_PLACEHOLDER: &str = "[unreadable value]";

const TRUTHY: [&str; 3] = ["true", "yes", "1"];
const FALSY: [&str; 3] = ["false", "no", "0"];

const AVAILABILITY_KEYS: [&str; 2] = ["available", "availability"];
const STOCK_KEYS: [&str; 5] = ["stock", "stock_quantity", "quantity", "count", "in_stock"];
const ATTRIBUTE_VALUE_KEYS: [&str; 6] = ["value", TEXT_KEY, "text", "name", "label", "id"];

static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Text normalizer. Null or absent values become an empty string.
pub fn normalize_text(value: Option<&RawValue>) -> String {
    let Some(value) = value else {
        return String::new();
    };
    match value {
        RawValue::Primitive(primitive) => primitive.to_text().trim().to_string(),
        RawValue::Keyed(map) => match map.get_any(&[TEXT_KEY, "text"]) {
            Some(inner) => normalize_text(Some(inner)),
            None => {
                log::debug!("Rendering structured text field as JSON");
                value.to_compact_string().unwrap_or_default()
            }
        },
        RawValue::List(items) => items
            .iter()
            .map(|item| normalize_text(Some(item)))
            .find(|text| !text.is_empty())
            .unwrap_or_default(),
    }
}

/// Description normalizer: text with markup reduced to plain text.
pub fn normalize_description(value: Option<&RawValue>) -> String {
    html_to_text(&normalize_text(value))
}

/// Strips tags, decodes the common entities and collapses whitespace.
pub fn html_to_text(html: &str) -> String {
    let without_tags = TAG.replace_all(html, " ");
    let decoded = without_tags
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&");
    WHITESPACE.replace_all(decoded.trim(), " ").into_owned()
}

/// String-list normalizer. Flattens every level of nesting and drops empty
/// entries; always returns a list. An element with character data
/// contributes only that text, not its attributes.
pub fn normalize_string_list(value: Option<&RawValue>) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(value) = value {
        collect_strings(value, &mut out);
    }
    out
}

fn collect_strings(value: &RawValue, out: &mut Vec<String>) {
    match value {
        RawValue::Primitive(primitive) => {
            if !primitive.is_falsy() {
                let text = primitive.to_text().trim().to_string();
                if !text.is_empty() {
                    out.push(text);
                }
            }
        }
        RawValue::List(items) => items.iter().for_each(|item| collect_strings(item, out)),
        RawValue::Keyed(map) => match map.get(TEXT_KEY) {
            Some(text) => collect_strings(text, out),
            None => map.values().for_each(|item| collect_strings(item, out)),
        },
    }
}

/// Availability normalizer over a whole offer record.
///
/// Signals are consulted in order: explicit flag, stock count, model-type
/// marker, positive price. Without any signal the offer counts as
/// available, so uncertain items stay visible.
pub fn normalize_availability(record: &RawValue) -> bool {
    let Some(map) = record.as_keyed() else {
        return true;
    };
    explicit_flag(map)
        .or_else(|| stock_count(map))
        .or_else(|| model_marker(map))
        .or_else(|| positive_price(map))
        .unwrap_or(true)
}

fn explicit_flag(map: &RawMap) -> Option<bool> {
    let value = map.get_any(&AVAILABILITY_KEYS).filter(|v| !v.is_null())?;
    Some(match leaf(value)? {
        Primitive::Null => return None,
        Primitive::Bool(flag) => flag,
        Primitive::Number(number) => number != 0.0,
        Primitive::Text(text) => TRUTHY.contains(&text.trim().to_lowercase().as_str()),
    })
}

fn stock_count(map: &RawMap) -> Option<bool> {
    let value = map.get_any(&STOCK_KEYS).filter(|v| !v.is_null())?;
    Some(match leaf(value)? {
        Primitive::Null => return None,
        Primitive::Bool(flag) => flag,
        Primitive::Number(number) => number > 0.0,
        Primitive::Text(text) => {
            let text = text.trim().to_lowercase();
            if let Some(count) = parse_number(&text) {
                count > 0.0
            } else if TRUTHY.contains(&text.as_str()) {
                true
            } else {
                !text.is_empty() && !FALSY.contains(&text.as_str())
            }
        }
    })
}

fn model_marker(map: &RawMap) -> Option<bool> {
    let marker = normalize_text(map.get("type")).to_lowercase();
    marker.contains("model").then_some(true)
}

fn positive_price(map: &RawMap) -> Option<bool> {
    let price = parse_raw_number(map.get("price")?)?;
    (price > 0.0).then_some(true)
}

/// Reduces a value to the primitive that carries it, looking through the
/// character-data key and taking the first list element.
fn leaf(value: &RawValue) -> Option<Primitive> {
    match value {
        RawValue::Primitive(primitive) => Some(primitive.clone()),
        RawValue::List(items) => items.first().and_then(leaf),
        RawValue::Keyed(map) => map.get_any(&[TEXT_KEY, "text", "value"]).and_then(leaf),
    }
}

/// Lenient number parsing: spaces are ignored and a decimal comma accepted.
pub fn parse_number(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
}

fn parse_raw_number(value: &RawValue) -> Option<f64> {
    match leaf(value)? {
        Primitive::Number(number) => Some(number).filter(|n| n.is_finite()),
        Primitive::Text(text) => parse_number(&text),
        Primitive::Null | Primitive::Bool(_) => None,
    }
}

/// Price normalizer; anything unreadable or negative is zero.
pub fn normalize_price(value: Option<&RawValue>) -> ProductPrice {
    value
        .and_then(parse_raw_number)
        .and_then(|n| ProductPrice::new(n).ok())
        .unwrap_or_default()
}

/// Old-price normalizer; anything unreadable or negative is absent.
pub fn normalize_old_price(value: Option<&RawValue>) -> Option<ProductPrice> {
    value
        .and_then(parse_raw_number)
        .and_then(|n| ProductPrice::new(n).ok())
}

/// Attribute-value normalizer. Total: always returns a flat string.
pub fn normalize_attribute_value(value: &RawValue) -> String {
    match value {
        RawValue::Primitive(primitive) => primitive.to_text().trim().to_string(),
        RawValue::Keyed(map) => {
            if let Some(inner) = ATTRIBUTE_VALUE_KEYS
                .iter()
                .find_map(|key| map.get(key).filter(|v| !v.is_null()))
            {
                return normalize_attribute_value(inner);
            }
            first_primitive(map.values()).unwrap_or_else(|| render_fallback(value))
        }
        RawValue::List(items) => {
            first_primitive(items.iter()).unwrap_or_else(|| render_fallback(value))
        }
    }
}

fn first_primitive<'a>(mut values: impl Iterator<Item = &'a RawValue>) -> Option<String> {
    values.find_map(|value| match value {
        RawValue::Primitive(primitive) if !primitive.is_falsy() || is_zero(primitive) => {
            Some(primitive.to_text().trim().to_string())
        }
        _ => None,
    })
}

fn is_zero(primitive: &Primitive) -> bool {
    matches!(primitive, Primitive::Number(n) if *n == 0.0)
}

fn render_fallback(value: &RawValue) -> String {
    match value.to_compact_string() {
        Some(rendered) => rendered,
        None => {
            log::warn!("Attribute value could not be rendered; using placeholder");
            ATTRIBUTE_PLACEHOLDER.to_string()
        }
    }
}

/// Attribute-list normalizer over a whole offer record.
///
/// Reads `param` elements (`<param name="...">value</param>`) as well as
/// `params`/`attributes` collections, either as a list of name/value records
/// or as a plain name-to-value map. Attributes without a name are dropped.
pub fn normalize_attributes(record: &RawValue) -> Vec<(String, String)> {
    let Some(map) = record.as_keyed() else {
        return Vec::new();
    };

    let mut out = Vec::new();
    for key in ["param", "params", "attributes", "attribute"] {
        let Some(node) = map.get(key) else {
            continue;
        };
        for item in node.items() {
            collect_attributes(item, &mut out);
        }
    }
    out
}

fn collect_attributes(item: &RawValue, out: &mut Vec<(String, String)>) {
    let RawValue::Keyed(map) = item else {
        return;
    };

    if let Some(name) = map.get("name") {
        let name = normalize_text(Some(name));
        if name.is_empty() {
            return;
        }
        let value = map
            .get_any(&[TEXT_KEY, "value", "text"])
            .map(normalize_attribute_value)
            .unwrap_or_default();
        out.push((name, value));
        return;
    }

    if let Some(nested) = map.get_any(&["param", "attribute"]) {
        for inner in nested.items() {
            collect_attributes(inner, out);
        }
        return;
    }

    for (name, value) in map.iter() {
        let name = name.trim();
        if !name.is_empty() && name != TEXT_KEY {
            out.push((name.to_string(), normalize_attribute_value(value)));
        }
    }
}
