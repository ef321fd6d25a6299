//! Feed import: raw document text to canonical [`Catalog`](crate::domain::catalog::Catalog).
//!
//! The pipeline runs [`document`] (parse and repair), [`resolve`] (locate
//! shop, offers and categories) and [`normalize`] (per-field coercion), tied
//! together by [`builder`].

pub mod builder;
pub mod document;
pub mod normalize;
pub mod resolve;

pub use crate::domain::errors::{CatalogError, CatalogResult};
pub use builder::{CatalogBuilder, build_catalog, build_catalog_batched};
pub use document::parse_document;
pub use resolve::{ResolvedShop, resolve_structure};
