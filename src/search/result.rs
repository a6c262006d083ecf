//! Search result with lazily materialized product hits

use crate::catalog::Product;
use crate::search::catalog_query::CatalogSearchQuery;
use crate::search::error::SearchResult;
use crate::search::facets::FacetGroup;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Produces the products of a result page on first access
pub type HitsFactory =
    Arc<dyn Fn() -> BoxFuture<'static, SearchResult<Vec<Product>>> + Send + Sync>;

/// One page of items plus paging metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PagedList<T> {
    items: Vec<T>,
    pub page_index: usize,
    pub page_size: usize,
    pub total_count: usize,
}

impl<T> PagedList<T> {
    pub fn new(items: Vec<T>, page_index: usize, page_size: usize, total_count: usize) -> Self {
        Self {
            items,
            page_index,
            page_size,
            total_count,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), 0, 0, 0)
    }

    pub fn total_pages(&self) -> usize {
        if self.total_count == 0 || self.page_size == 0 {
            0
        } else {
            (self.total_count - 1) / self.page_size + 1
        }
    }

    pub fn has_previous_page(&self) -> bool {
        self.page_index > 0
    }

    pub fn has_next_page(&self) -> bool {
        self.page_index + 1 < self.total_pages()
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }
}

impl<T> Deref for PagedList<T> {
    type Target = [T];

    fn deref(&self) -> &Self::Target {
        &self.items
    }
}

/// Outcome of a catalog search, identical in shape for both backends
pub struct CatalogSearchResult {
    /// Index engine name; `None` when served by the relational fallback
    pub engine: Option<String>,
    pub query: CatalogSearchQuery,
    pub total_hits_count: usize,
    /// Ids of the current page, in result order
    pub hits_entity_ids: Vec<i64>,
    pub facets: BTreeMap<String, FacetGroup>,
    pub spell_checker_suggestions: Vec<String>,
    hits_factory: Option<HitsFactory>,
    hits: OnceCell<PagedList<Product>>,
}

impl CatalogSearchResult {
    pub fn new(
        engine: Option<String>,
        query: CatalogSearchQuery,
        total_hits_count: usize,
        hits_entity_ids: Vec<i64>,
        hits_factory: Option<HitsFactory>,
        facets: BTreeMap<String, FacetGroup>,
    ) -> Self {
        Self {
            engine,
            query,
            total_hits_count,
            hits_entity_ids,
            facets,
            spell_checker_suggestions: Vec::new(),
            hits_factory,
            hits: OnceCell::new(),
        }
    }

    /// Result without hits, e.g. for a query that matched nothing
    pub fn empty(query: CatalogSearchQuery) -> Self {
        Self::new(None, query, 0, Vec::new(), None, BTreeMap::new())
    }

    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.spell_checker_suggestions = suggestions;
        self
    }

    /// Products of the current page, loaded once.
    ///
    /// Never holds more than `total_hits_count` items; with no hits the
    /// factory is not invoked.
    pub async fn hits(&self) -> SearchResult<&PagedList<Product>> {
        self.hits
            .get_or_try_init(|| async {
                let mut items = match (&self.hits_factory, self.total_hits_count) {
                    (Some(factory), total) if total > 0 => factory().await?,
                    _ => Vec::new(),
                };
                items.truncate(self.total_hits_count);
                Ok(PagedList::new(
                    items,
                    self.query.page_index(),
                    self.query.take,
                    self.total_hits_count,
                ))
            })
            .await
    }

    pub fn is_hits_loaded(&self) -> bool {
        self.hits.initialized()
    }
}

impl fmt::Debug for CatalogSearchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogSearchResult")
            .field("engine", &self.engine)
            .field("total_hits_count", &self.total_hits_count)
            .field("hits_entity_ids", &self.hits_entity_ids)
            .field("facets", &self.facets.keys().collect::<Vec<_>>())
            .field("spell_checker_suggestions", &self.spell_checker_suggestions)
            .field("hits_loaded", &self.is_hits_loaded())
            .finish()
    }
}
