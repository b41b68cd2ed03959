//! likeness-catalog — labeled photo catalog.
//!
//! Scans a directory of per-person photo folders, assigns an integer label to
//! each person and stores `(label, name, PNG)` rows in SQLite.

pub mod catalog;
pub mod error;
pub mod ingest;
pub mod store;

pub use catalog::{decode_png, encode_png, PhotoCatalog};
pub use error::CatalogError;
pub use ingest::{scan_photo_dir, Ingested, LabelRegistry};
pub use store::CatalogStore;
