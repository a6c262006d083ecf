//! Faceted product catalog search with an index-first, relational-fallback design
//!
//! This module provides:
//!
//! - **Query building**: Fluent product filters, sorts, paging and facet requests
//! - **Indexed search**: Tantivy documents, generic filter translation, spell checking
//! - **Relational fallback**: Predicate trees evaluated over the catalog with joins
//! - **Facets**: Category, brand, price, rating, delivery time, availability, new arrivals
//! - **Lifecycle events**: Handlers observe queries and may replace results
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │           CatalogSearchService                   │
//! ├─────────────────────────────────────────────────┤
//! │  - search()          - prepare_query()          │
//! └─────────────────────────────────────────────────┘
//!            │                         │
//!   index exists                 direct / no index
//!            ▼                         ▼
//! ┌──────────────────────┐  ┌──────────────────────────┐
//! │  TantivySearchEngine │  │ LinqCatalogSearchService │
//! ├──────────────────────┤  ├──────────────────────────┤
//! │  - count / search    │  │  - ProductExpr predicate │
//! │  - facet map         │  │  - joins + grouping      │
//! │  - spell checking    │  │  - facet aggregation     │
//! └──────────────────────┘  └──────────────────────────┘
//!            │                         │
//!            └────────────┬────────────┘
//!                         ▼
//!              CatalogSearchResult
//! ```
//!
//! # Example
//!
//! ```no_run
//! use catalog_search::catalog::{InMemoryCatalog, ProductLoadFlags};
//! use catalog_search::search::{
//!     CatalogSearchQuery, CatalogSearchService, EventPublisher, IndexManager, SearchConfig,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let catalog = Arc::new(InMemoryCatalog::new());
//!     let service = CatalogSearchService::new(
//!         IndexManager::new(),
//!         catalog.clone(),
//!         catalog,
//!         EventPublisher::new(),
//!         Arc::new(SearchConfig::default()),
//!     );
//!
//!     let query = CatalogSearchQuery::new()
//!         .published_only(true)
//!         .with_category_ids(None, &[12])
//!         .slice(0, 24)?;
//!
//!     let result = service.search(query, ProductLoadFlags::empty(), false).await?;
//!     println!("Found {} products", result.total_hits_count);
//!
//!     Ok(())
//! }
//! ```

pub mod catalog_query;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod facets;
pub mod filter;
pub mod index;
pub mod labels;
pub mod linq;
pub mod query;
pub mod result;
pub mod service;
pub mod sort;

pub use catalog_query::{CatalogSearchQuery, ProductOrdering, ProductSortKey, ProductSorting};
pub use config::{CurrencyConfig, SearchConfig, SearchConfigBuilder};
pub use engine::{IndexManager, IndexProvider, IndexStore, SearchEngine, SearchHit, CATALOG_SCOPE};
pub use error::{SearchError, SearchResult};
pub use events::{
    CatalogSearchEventHandler, CatalogSearchedEvent, CatalogSearchingEvent, EventPublisher,
    LogNotifier, Notifier,
};
pub use facets::{
    Facet, FacetDescriptor, FacetGroup, FacetGroupKind, FacetSorting, FacetValue,
};
pub use filter::{
    AttributeSearchFilter, CombinedSearchFilter, FilterValue, RangeSearchFilter, SearchFilter,
    SearchFilterOccurrence,
};
pub use index::{CatalogIndexer, TantivyIndexProvider, TantivyIndexStore, TantivySearchEngine};
pub use linq::{LinqCatalogSearchService, PreparedProductQuery};
pub use query::{ResultFlags, SearchMode, SearchQuery};
pub use result::{CatalogSearchResult, PagedList};
pub use service::CatalogSearchService;
pub use sort::{SearchSort, SortFieldType};
