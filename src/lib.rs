//! Faceted product catalog search.
//!
//! Queries are answered from a Tantivy index when one has been built and from
//! the relational catalog otherwise; see [`search`] for the moving parts.

pub mod catalog;
pub mod config;
pub mod error;
pub mod metrics;
pub mod search;

pub use config::Config;
pub use error::{AppError, Result};
pub use search::{
    CatalogSearchQuery, CatalogSearchResult, CatalogSearchService, SearchConfig, SearchError,
};
