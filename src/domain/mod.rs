pub mod catalog;
pub mod category;
pub mod diff;
pub mod errors;
pub mod product;
pub mod raw;
pub mod types;
