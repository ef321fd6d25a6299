pub mod catalogs;
pub mod errors;
pub mod merge;
pub mod reconcile;
pub mod report;

pub use errors::{ServiceError, ServiceResult};
