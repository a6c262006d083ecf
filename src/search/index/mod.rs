//! Tantivy implementation of the index-provider abstractions.
//!
//! One document per non-deleted product, with fields named after the catalog
//! filter fields so that filters translate generically by schema field type.

pub mod document;
pub mod engine;
pub mod indexer;
pub mod store;

pub use document::{build_catalog_schema, ProductDocument, StoredProduct};
pub use engine::TantivySearchEngine;
pub use indexer::CatalogIndexer;
pub use store::{OpenIndex, TantivyIndexProvider, TantivyIndexStore};
