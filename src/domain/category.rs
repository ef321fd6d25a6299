use serde::{Deserialize, Serialize};

use crate::domain::types::{CategoryId, CategoryName};

/// Feed-scoped category node.
///
/// `parent_id` is not checked for cycles; consumers walking the hierarchy
/// must guard against them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Category {
    pub id: CategoryId,
    pub name: CategoryName,
    pub parent_id: Option<CategoryId>,
    /// Identifier as declared by the source document.
    pub external_id: Option<String>,
}

impl Category {
    pub fn new(id: CategoryId, name: CategoryName) -> Self {
        Self {
            id,
            name,
            parent_id: None,
            external_id: None,
        }
    }
}
