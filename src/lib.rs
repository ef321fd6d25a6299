//! Core library exports for the feeds service.
//!
//! This crate turns loosely structured product-catalog exports into a
//! canonical [`Catalog`](domain::catalog::Catalog), merges duplicate
//! listings, and reconciles stored catalogs against re-fetched snapshots.
//!
//! ```text
//! raw document -> import -> Catalog -> services::merge -> stored Catalog
//! stored Catalog + fresh Catalog -> services::reconcile -> diff -> apply
//! ```

pub mod config;
pub mod domain;
pub mod error_conversions;
pub mod import;
pub mod repository;
pub mod services;
