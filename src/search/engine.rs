//! Index-provider abstractions consumed by the catalog search service

use crate::search::catalog_query::CatalogSearchQuery;
use crate::search::error::SearchResult;
use crate::search::facets::FacetGroup;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Scope of the product index
pub const CATALOG_SCOPE: &str = "Catalog";

/// A scored hit of an index search
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchHit {
    pub entity_id: i64,
    pub score: f32,
}

/// A named index store
pub trait IndexStore: Send + Sync {
    fn scope(&self) -> &str;

    /// Whether a committed index is present
    fn exists(&self) -> bool;
}

/// Executes one query against an index store
#[async_trait]
pub trait SearchEngine: Send + Sync {
    /// Engine name reported on results
    fn name(&self) -> &str;

    /// Total number of hits
    async fn count(&self) -> SearchResult<usize>;

    /// Hits of one page, in result order
    async fn search(&self, skip: usize, take: usize) -> SearchResult<Vec<SearchHit>>;

    /// Unlabelled facet groups keyed by descriptor key
    async fn get_facet_map(&self, total_hits: usize) -> SearchResult<BTreeMap<String, FacetGroup>>;

    /// Spelling suggestions for the query term
    async fn check_spelling(&self, total_hits: usize) -> SearchResult<Vec<String>>;
}

/// Provides index stores and search engines
pub trait IndexProvider: Send + Sync {
    fn get_index_store(&self, scope: &str) -> SearchResult<Arc<dyn IndexStore>>;

    fn get_search_engine(
        &self,
        store: &dyn IndexStore,
        query: &CatalogSearchQuery,
    ) -> SearchResult<Box<dyn SearchEngine>>;
}

/// Registry of index providers by scope
#[derive(Clone, Default)]
pub struct IndexManager {
    providers: Arc<DashMap<String, Arc<dyn IndexProvider>>>,
}

impl IndexManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_provider(&self, scope: impl Into<String>, provider: Arc<dyn IndexProvider>) {
        let scope = scope.into();
        tracing::debug!(scope = %scope, "Registering index provider");
        self.providers.insert(scope, provider);
    }

    pub fn remove_provider(&self, scope: &str) -> bool {
        self.providers.remove(scope).is_some()
    }

    pub fn has_provider(&self, scope: &str) -> bool {
        self.providers.contains_key(scope)
    }

    pub fn get_index_provider(&self, scope: &str) -> Option<Arc<dyn IndexProvider>> {
        self.providers.get(scope).map(|p| p.value().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::error::SearchError;

    struct MissingStore;

    impl IndexStore for MissingStore {
        fn scope(&self) -> &str {
            CATALOG_SCOPE
        }

        fn exists(&self) -> bool {
            false
        }
    }

    struct NullProvider;

    impl IndexProvider for NullProvider {
        fn get_index_store(&self, _scope: &str) -> SearchResult<Arc<dyn IndexStore>> {
            Ok(Arc::new(MissingStore))
        }

        fn get_search_engine(
            &self,
            store: &dyn IndexStore,
            _query: &CatalogSearchQuery,
        ) -> SearchResult<Box<dyn SearchEngine>> {
            Err(SearchError::IndexNotFound(store.scope().to_string()))
        }
    }

    #[test]
    fn test_provider_registry() {
        let manager = IndexManager::new();
        assert!(manager.get_index_provider(CATALOG_SCOPE).is_none());

        manager.register_provider(CATALOG_SCOPE, Arc::new(NullProvider));
        let provider = manager.get_index_provider(CATALOG_SCOPE).unwrap();
        let store = provider.get_index_store(CATALOG_SCOPE).unwrap();
        assert!(!store.exists());
        assert!(provider
            .get_search_engine(store.as_ref(), &CatalogSearchQuery::new())
            .is_err());

        assert!(manager.remove_provider(CATALOG_SCOPE));
        assert!(!manager.has_provider(CATALOG_SCOPE));
    }
}
