//! Raw feed text to [`RawValue`] tree, with the header and character repair
//! passes applied to documents that do not parse as-is.

use std::borrow::Cow;
use std::sync::LazyLock;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use regex::Regex;

use crate::domain::errors::{CatalogError, CatalogResult};
use crate::domain::raw::{RawMap, RawValue, TEXT_KEY};

/// Root element of a catalog export.
pub const CATALOG_ROOT: &str = "yml_catalog";

static NUMERIC_CHAR_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&#(?:[0-9]+|[xX][0-9a-fA-F]+);").expect("valid regex"));
static FIRST_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<([A-Za-z_][\w.:-]*)").expect("valid regex"));
static ROOT_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<yml_catalog(?:\s[^>]*)?>").expect("valid regex"));

/// Parses a feed document into a tree.
///
/// Markup that fails to parse is repaired once (illegal characters stripped,
/// numeric character references blanked) and parsed again; the second
/// failure is fatal. JSON documents are accepted as-is.
pub fn parse_document(raw: &str) -> CatalogResult<RawValue> {
    let trimmed = raw.trim_start_matches('\u{feff}').trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return serde_json::from_str::<serde_json::Value>(trimmed)
            .map(RawValue::from)
            .map_err(|e| CatalogError::MalformedDocument(e.to_string()));
    }

    let prepared = repair_root(trimmed);
    match parse_xml(&prepared) {
        Ok(tree) => Ok(tree),
        Err(first) => {
            log::warn!("Feed did not parse ({first}); retrying after character repair");
            let repaired = repair_characters(&prepared);
            parse_xml(&repaired).map_err(CatalogError::MalformedDocument)
        }
    }
}

/// Makes sure the document has a catalog root element and that it is closed.
///
/// A document that starts with neither an XML declaration nor the catalog
/// root is wrapped in a synthesized root, unless its first element already is
/// the catalog root. An unterminated root gets the missing closing tags
/// appended.
pub fn repair_root(raw: &str) -> Cow<'_, str> {
    let trimmed = raw.trim_start();
    let recognized = trimmed.starts_with("<?xml") || trimmed.starts_with("<yml_catalog");

    if !recognized {
        let first_tag = FIRST_TAG
            .captures(trimmed)
            .and_then(|captures| captures.get(1))
            .map(|m| m.as_str());
        if first_tag != Some(CATALOG_ROOT) {
            log::warn!(
                "Feed starts with <{}> instead of a catalog root; wrapping it",
                first_tag.unwrap_or("?")
            );
            return Cow::Owned(format!("<{CATALOG_ROOT}>{trimmed}</{CATALOG_ROOT}>"));
        }
    }

    let opened = ROOT_OPEN
        .find_iter(trimmed)
        .filter(|m| !m.as_str().ends_with("/>"))
        .count();
    let closed = trimmed.matches("</yml_catalog>").count();
    if opened > closed {
        log::warn!("Catalog root is not terminated; appending {} closing tag(s)", opened - closed);
        let mut fixed = trimmed.to_string();
        for _ in closed..opened {
            fixed.push_str("</yml_catalog>");
        }
        return Cow::Owned(fixed);
    }

    Cow::Borrowed(trimmed)
}

/// Strips characters outside the XML text range and blanks numeric character
/// references.
pub fn repair_characters(raw: &str) -> String {
    let legal: String = raw.chars().filter(|c| is_xml_char(*c)).collect();
    NUMERIC_CHAR_REF.replace_all(&legal, " ").into_owned()
}

fn is_xml_char(c: char) -> bool {
    matches!(c,
        '\u{9}' | '\u{A}' | '\u{D}'
        | '\u{20}'..='\u{D7FF}'
        | '\u{E000}'..='\u{FFFD}'
        | '\u{10000}'..='\u{10FFFF}')
}

/// Element under construction.
struct Frame {
    name: String,
    attributes: RawMap,
    children: RawMap,
    text: String,
}

impl Frame {
    fn open(start: &BytesStart<'_>) -> Self {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let mut attributes = RawMap::new();
        for attribute in start.attributes().with_checks(false).flatten() {
            let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
            let value = match attribute.unescape_value() {
                Ok(value) => value.into_owned(),
                Err(_) => String::from_utf8_lossy(&attribute.value).into_owned(),
            };
            attributes.insert(key, RawValue::text(value));
        }
        Self {
            name,
            attributes,
            children: RawMap::new(),
            text: String::new(),
        }
    }

    fn push_text(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        if !self.text.is_empty() {
            self.text.push(' ');
        }
        self.text.push_str(text);
    }

    fn close(self) -> (String, RawValue) {
        if self.attributes.is_empty() && self.children.is_empty() {
            return (self.name, RawValue::text(self.text));
        }
        let mut node = self.attributes;
        for (key, value) in self.children.iter() {
            node.insert(key, value.clone());
        }
        if !self.text.is_empty() {
            node.insert(TEXT_KEY, RawValue::text(self.text));
        }
        (self.name, RawValue::Keyed(node))
    }
}

fn attach(stack: &mut [Frame], root: &mut RawMap, name: String, value: RawValue) {
    match stack.last_mut() {
        Some(parent) => parent.children.push_child(name, value),
        None => root.push_child(name, value),
    }
}

fn parse_xml(document: &str) -> Result<RawValue, String> {
    let mut reader = Reader::from_str(document);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Frame> = Vec::new();
    let mut root = RawMap::new();

    loop {
        let position = reader.buffer_position();
        match reader.read_event() {
            Ok(Event::Start(start)) => stack.push(Frame::open(&start)),
            Ok(Event::Empty(start)) => {
                let (name, value) = Frame::open(&start).close();
                attach(&mut stack, &mut root, name, value);
            }
            Ok(Event::End(_)) => {
                let Some(frame) = stack.pop() else {
                    return Err(format!("unexpected closing tag at byte {position}"));
                };
                let (name, value) = frame.close();
                attach(&mut stack, &mut root, name, value);
            }
            Ok(Event::Text(text)) => {
                if let Some(frame) = stack.last_mut() {
                    match text.unescape() {
                        Ok(value) => frame.push_text(&value),
                        Err(_) => frame.push_text(&String::from_utf8_lossy(&text)),
                    }
                }
            }
            Ok(Event::CData(data)) => {
                if let Some(frame) = stack.last_mut() {
                    frame.push_text(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(format!("error at byte {position}: {e}")),
        }
    }

    if let Some(frame) = stack.last() {
        return Err(format!("element <{}> is not closed", frame.name));
    }
    if root.is_empty() {
        return Err("document has no elements".to_string());
    }

    Ok(RawValue::Keyed(root))
}
