use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::domain::product::{Product, ProductAttribute};
use crate::domain::types::{ProductId, TypeConstraintError};

/// Product fields the reconciliation engine compares and applies.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum DiffField {
    Name,
    Description,
    Price,
    Available,
    Attributes,
}

impl DiffField {
    pub const ALL: [DiffField; 5] = [
        Self::Name,
        Self::Description,
        Self::Price,
        Self::Available,
        Self::Attributes,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Description => "description",
            Self::Price => "price",
            Self::Available => "available",
            Self::Attributes => "attributes",
        }
    }
}

impl Display for DiffField {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for DiffField {
    type Error = TypeConstraintError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "name" => Ok(Self::Name),
            "description" => Ok(Self::Description),
            "price" => Ok(Self::Price),
            "available" | "availability" => Ok(Self::Available),
            "attributes" => Ok(Self::Attributes),
            other => Err(TypeConstraintError::InvalidValue(format!(
                "diff field: {other}"
            ))),
        }
    }
}

/// Value of one compared field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FieldValue {
    Flag(bool),
    Number(f64),
    Text(String),
    Attributes(Vec<ProductAttribute>),
}

impl Display for FieldValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Flag(value) => write!(f, "{value}"),
            Self::Number(value) => write!(f, "{value}"),
            Self::Text(value) => write!(f, "{value}"),
            Self::Attributes(attributes) => {
                let rendered = attributes
                    .iter()
                    .map(|a| format!("{}: {}", a.name, a.value))
                    .collect::<Vec<_>>();
                write!(f, "{}", rendered.join("; "))
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldChange {
    pub old: FieldValue,
    pub new: FieldValue,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DiffKind {
    New,
    Changed,
}

/// One product's difference between two snapshots.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProductDiff {
    pub product_id: ProductId,
    pub kind: DiffKind,
    /// Only fields that actually differ; empty for `New` entries.
    pub fields: BTreeMap<DiffField, FieldChange>,
    /// Previous record, `None` for `New` entries.
    pub old: Option<Box<Product>>,
    pub new: Box<Product>,
}

/// Which fields are compared and how unknown ids are treated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReconcileRules {
    pub compare_name: bool,
    pub compare_description: bool,
    pub compare_price: bool,
    pub compare_availability: bool,
    pub compare_attributes: bool,
    pub treat_new_as_new: bool,
    pub ignore_ids_in_merge_map: bool,
}

impl Default for ReconcileRules {
    fn default() -> Self {
        Self {
            compare_name: true,
            compare_description: true,
            compare_price: true,
            compare_availability: true,
            compare_attributes: true,
            treat_new_as_new: true,
            ignore_ids_in_merge_map: true,
        }
    }
}

impl ReconcileRules {
    /// Rules that compare nothing and report nothing.
    pub fn none() -> Self {
        Self {
            compare_name: false,
            compare_description: false,
            compare_price: false,
            compare_availability: false,
            compare_attributes: false,
            treat_new_as_new: false,
            ignore_ids_in_merge_map: false,
        }
    }

    pub fn compares(&self, field: DiffField) -> bool {
        match field {
            DiffField::Name => self.compare_name,
            DiffField::Description => self.compare_description,
            DiffField::Price => self.compare_price,
            DiffField::Available => self.compare_availability,
            DiffField::Attributes => self.compare_attributes,
        }
    }
}

/// Operator approval of diff entries, at field granularity.
///
/// A `Changed` entry applies the listed fields; a `New` entry is approved
/// when its product id is present at all.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct FieldSelection(HashMap<ProductId, HashSet<DiffField>>);

impl FieldSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Approves every entry and every field of `diffs`.
    pub fn all(diffs: &[ProductDiff]) -> Self {
        let mut selection = Self::new();
        for diff in diffs {
            match diff.kind {
                DiffKind::New => selection.approve_new(diff.product_id.clone()),
                DiffKind::Changed => {
                    for field in diff.fields.keys() {
                        selection.approve(diff.product_id.clone(), *field);
                    }
                }
            }
        }
        selection
    }

    pub fn approve(&mut self, product_id: ProductId, field: DiffField) {
        self.0.entry(product_id).or_default().insert(field);
    }

    pub fn approve_new(&mut self, product_id: ProductId) {
        self.0.entry(product_id).or_default();
    }

    pub fn contains_product(&self, product_id: &ProductId) -> bool {
        self.0.contains_key(product_id)
    }

    pub fn is_approved(&self, product_id: &ProductId, field: DiffField) -> bool {
        self.0
            .get(product_id)
            .is_some_and(|fields| fields.contains(&field))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
