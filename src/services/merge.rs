//! Duplicate grouping and attribute merge.
//!
//! Products that share a grouping URL are treated as variants of one
//! underlying product. Merging folds every group into its first member and
//! records where each variant went in the catalog's merge identity map.

use std::collections::{HashMap, HashSet};

use chrono::{NaiveDateTime, Utc};
use serde::Serialize;

use crate::domain::catalog::{Catalog, MergeIdentityMap};
use crate::domain::product::{Product, ProductAttribute, names_match};
use crate::domain::types::{AttributeId, ProductId};

pub const SIZE_ATTRIBUTE_NAMES: [&str; 2] = ["size", "размер"];
pub const COLOR_ATTRIBUTE_NAMES: [&str; 3] = ["color", "colour", "цвет"];

/// Separator used when folding variant values into one attribute.
pub const VALUE_SEPARATOR: &str = ", ";

/// Products sharing one grouping key.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DuplicateGroup {
    pub key: String,
    /// Members in arrival order; the first one becomes the master.
    pub product_ids: Vec<ProductId>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct DuplicateAnalysis {
    pub groups: Vec<DuplicateGroup>,
    /// Attribute names seen on grouped products, first spelling wins.
    pub unique_attribute_names: Vec<String>,
    /// Size and color attributes among `unique_attribute_names`.
    pub suggested_merge_attributes: Vec<String>,
}

impl DuplicateAnalysis {
    pub fn has_duplicates(&self) -> bool {
        !self.groups.is_empty()
    }
}

pub fn is_size_attribute(name: &str) -> bool {
    SIZE_ATTRIBUTE_NAMES.iter().any(|size| names_match(name, size))
}

pub fn is_color_attribute(name: &str) -> bool {
    COLOR_ATTRIBUTE_NAMES
        .iter()
        .any(|color| names_match(name, color))
}

/// Lists duplicate groups and the attribute names an operator may merge.
pub fn analyze_duplicates(catalog: &Catalog) -> DuplicateAnalysis {
    let groups = group_products(&catalog.products);

    let mut unique_attribute_names: Vec<String> = Vec::new();
    for (_, members) in &groups {
        for attribute in members.iter().flat_map(|&i| &catalog.products[i].attributes) {
            if !unique_attribute_names
                .iter()
                .any(|seen| names_match(seen, &attribute.name))
            {
                unique_attribute_names.push(attribute.name.trim().to_string());
            }
        }
    }

    let suggested_merge_attributes = unique_attribute_names
        .iter()
        .filter(|name| is_size_attribute(name) || is_color_attribute(name))
        .cloned()
        .collect();

    DuplicateAnalysis {
        groups: groups
            .into_iter()
            .map(|(key, members)| DuplicateGroup {
                key: key.to_string(),
                product_ids: members
                    .iter()
                    .map(|&i| catalog.products[i].id.clone())
                    .collect(),
            })
            .collect(),
        unique_attribute_names,
        suggested_merge_attributes,
    }
}

/// Merges duplicate groups, stamping the result with the current time.
///
/// An empty `merge_attribute_names` merges the suggested size and color
/// attributes.
pub fn merge_duplicates(catalog: &Catalog, merge_attribute_names: &[String]) -> Catalog {
    merge_duplicates_at(catalog, merge_attribute_names, Utc::now().naive_utc())
}

/// [`merge_duplicates`] with an explicit `date_modified` stamp.
pub fn merge_duplicates_at(
    catalog: &Catalog,
    merge_attribute_names: &[String],
    at: NaiveDateTime,
) -> Catalog {
    let merge_set = if merge_attribute_names.is_empty() {
        analyze_duplicates(catalog).suggested_merge_attributes
    } else {
        dedup_names(merge_attribute_names)
    };

    let groups = group_products(&catalog.products);
    let mut merged = catalog.clone();
    merged.metadata.date_modified = at;
    if groups.is_empty() {
        return merged;
    }

    let mut masters: HashMap<usize, Product> = HashMap::new();
    let mut folded: HashSet<usize> = HashSet::new();
    let mut id_map = catalog.metadata.merged_id_map.clone();

    for (key, members) in &groups {
        let group: Vec<&Product> = members.iter().map(|&i| &catalog.products[i]).collect();
        let master = merge_group(&group, &merge_set);
        log::debug!(
            "Merged {} listings sharing '{key}' into {}",
            group.len(),
            master.id
        );

        remap_identities(&mut id_map, &group, &master.id);
        masters.insert(members[0], master);
        folded.extend(members.iter().skip(1).copied());
    }

    merged.products = catalog
        .products
        .iter()
        .enumerate()
        .filter(|(index, _)| !folded.contains(index))
        .map(|(index, product)| masters.remove(&index).unwrap_or_else(|| product.clone()))
        .collect();
    merged.metadata.merged_id_map = id_map;

    log::info!(
        "Merged {} duplicate groups: {} products reduced to {}",
        groups.len(),
        catalog.products.len(),
        merged.products.len()
    );
    merged
}

/// Groups product indices by grouping URL in first-arrival order. Only
/// groups with at least two members are returned.
fn group_products(products: &[Product]) -> Vec<(&str, Vec<usize>)> {
    let mut order: Vec<(&str, Vec<usize>)> = Vec::new();
    let mut positions: HashMap<&str, usize> = HashMap::new();
    for (index, product) in products.iter().enumerate() {
        let Some(key) = product.grouping_url() else {
            continue;
        };
        match positions.get(key) {
            Some(&slot) => order[slot].1.push(index),
            None => {
                positions.insert(key, order.len());
                order.push((key, vec![index]));
            }
        }
    }
    order.retain(|(_, members)| members.len() > 1);
    order
}

fn merge_group(group: &[&Product], merge_set: &[String]) -> Product {
    let mut master = group[0].clone();

    for name in merge_set {
        let values = collect_values(group, |attribute| names_match(&attribute.name, name));
        if values.is_empty() {
            continue;
        }
        fold_attribute(&mut master, group, name, values.join(VALUE_SEPARATOR));
    }

    let sizes = collect_values(group, |attribute| is_size_attribute(&attribute.name));
    let colors = collect_values(group, |attribute| is_color_attribute(&attribute.name));

    master.available = group.iter().any(|product| product.available);
    master.merged_from_variants = Some(group.len());
    master.merged_attribute_names = Some(merge_set.to_vec());
    master.merged_sizes = (!sizes.is_empty()).then_some(sizes);
    master.merged_colors = (!colors.is_empty()).then_some(colors);
    master
}

/// Distinct trimmed values of matching attributes across the group, in
/// first-seen order.
fn collect_values<F>(group: &[&Product], matches: F) -> Vec<String>
where
    F: Fn(&ProductAttribute) -> bool,
{
    let mut values: Vec<String> = Vec::new();
    for attribute in group.iter().flat_map(|product| &product.attributes) {
        let value = attribute.value.trim();
        if matches(attribute) && !value.is_empty() && !values.iter().any(|v| v == value) {
            values.push(value.to_string());
        }
    }
    values
}

/// Replaces the master's attributes named `name` with one folded attribute,
/// keeping the position and id of the master's first occurrence.
fn fold_attribute(master: &mut Product, group: &[&Product], name: &str, value: String) {
    let existing = master
        .attributes
        .iter()
        .position(|attribute| names_match(&attribute.name, name));

    match existing {
        Some(position) => {
            master.attributes[position].value = value;
            let mut index = 0;
            master.attributes.retain(|attribute| {
                let keep = index <= position || !names_match(&attribute.name, name);
                index += 1;
                keep
            });
        }
        None => {
            let spelling = group
                .iter()
                .flat_map(|product| &product.attributes)
                .find(|attribute| names_match(&attribute.name, name))
                .map(|attribute| attribute.name.clone())
                .unwrap_or_else(|| name.to_string());
            let id = AttributeId::derive(&format!("{}:merged:{}", master.id, spelling));
            master.attributes.push(ProductAttribute::new(id, spelling, value));
        }
    }
}

/// Points every member, and anything previously merged into a member, at
/// the new master.
fn remap_identities(map: &mut MergeIdentityMap, group: &[&Product], master: &ProductId) {
    let members: HashSet<&ProductId> = group.iter().map(|product| &product.id).collect();
    let inherited: Vec<ProductId> = map
        .iter()
        .filter(|(_, target)| members.contains(target))
        .map(|(source, _)| source.clone())
        .collect();

    for source in inherited {
        map.insert(source, master.clone());
    }
    for product in group {
        map.insert(product.id.clone(), master.clone());
    }
}

fn dedup_names(names: &[String]) -> Vec<String> {
    let mut unique: Vec<String> = Vec::new();
    for name in names.iter().map(|name| name.trim()) {
        if !name.is_empty() && !unique.iter().any(|seen| names_match(seen, name)) {
            unique.push(name.to_string());
        }
    }
    unique
}
