//! Main catalog search service implementation

use crate::catalog::{CatalogRepository, Product, ProductLoadFlags, ProductLoader};
use crate::metrics::{
    measure_step, record_degraded, CATALOG_SEARCHES_TOTAL, CATALOG_SEARCH_FALLBACKS_TOTAL,
};
use crate::search::catalog_query::CatalogSearchQuery;
use crate::search::config::SearchConfig;
use crate::search::engine::{IndexManager, IndexProvider, IndexStore, CATALOG_SCOPE};
use crate::search::error::SearchResult;
use crate::search::events::{
    CatalogSearchedEvent, CatalogSearchingEvent, EventPublisher, LogNotifier, Notifier,
};
use crate::search::labels::FacetLabelResolver;
use crate::search::linq::{hits_factory_for, LinqCatalogSearchService, PreparedProductQuery};
use crate::search::query::ResultFlags;
use crate::search::result::{CatalogSearchResult, HitsFactory};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Origin of storefront search page queries
pub const SEARCH_PAGE_ORIGIN: &str = "Search/Search";

/// Where a search is served from
enum Backend {
    Index {
        provider: Arc<dyn IndexProvider>,
        store: Arc<dyn IndexStore>,
    },
    Relational {
        reason: &'static str,
        index_missing: bool,
    },
}

/// Main catalog search service.
///
/// Serves queries from the search index when one is available and falls back
/// to the relational catalog otherwise. Results have the same shape either way.
#[derive(Clone)]
pub struct CatalogSearchService {
    /// Index providers by scope
    index_manager: IndexManager,

    /// Relational fallback
    linq: LinqCatalogSearchService,

    loader: Arc<dyn ProductLoader>,
    labels: FacetLabelResolver,
    events: EventPublisher,
    notifier: Arc<dyn Notifier>,

    /// Configuration
    config: Arc<SearchConfig>,
}

impl CatalogSearchService {
    /// Create a new search service
    pub fn new(
        index_manager: IndexManager,
        repository: Arc<dyn CatalogRepository>,
        loader: Arc<dyn ProductLoader>,
        events: EventPublisher,
        config: Arc<SearchConfig>,
    ) -> Self {
        Self {
            linq: LinqCatalogSearchService::new(
                repository.clone(),
                loader.clone(),
                events.clone(),
                config.clone(),
            ),
            labels: FacetLabelResolver::new(repository),
            index_manager,
            loader,
            events,
            notifier: Arc::new(LogNotifier),
            config,
        }
    }

    /// Replace the notifier told about a missing index
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn index_manager(&self) -> &IndexManager {
        &self.index_manager
    }

    pub fn linq(&self) -> &LinqCatalogSearchService {
        &self.linq
    }

    fn backend(&self, direct: bool) -> SearchResult<Backend> {
        if direct {
            return Ok(Backend::Relational {
                reason: "direct",
                index_missing: false,
            });
        }
        let Some(provider) = self.index_manager.get_index_provider(CATALOG_SCOPE) else {
            return Ok(Backend::Relational {
                reason: "no_provider",
                index_missing: false,
            });
        };
        let store = provider.get_index_store(CATALOG_SCOPE)?;
        if !store.exists() {
            return Ok(Backend::Relational {
                reason: "index_missing",
                index_missing: true,
            });
        }
        Ok(Backend::Index { provider, store })
    }

    /// Search the catalog.
    ///
    /// `direct` bypasses the index and always evaluates against the catalog.
    pub async fn search(
        &self,
        mut query: CatalogSearchQuery,
        load_flags: ProductLoadFlags,
        direct: bool,
    ) -> SearchResult<CatalogSearchResult> {
        query.take = query.take.min(self.config.max_results);

        match self.backend(direct)? {
            Backend::Index { provider, store } => {
                self.search_index(provider, store, query, load_flags).await
            }
            Backend::Relational {
                reason,
                index_missing,
            } => {
                tracing::debug!(reason, "Falling back to relational catalog search");
                CATALOG_SEARCH_FALLBACKS_TOTAL.with_label_values(&[reason]).inc();
                if index_missing && query.is_origin(SEARCH_PAGE_ORIGIN) {
                    self.notifier.indexing_required(CATALOG_SCOPE);
                }
                self.linq.search(query, load_flags, direct).await
            }
        }
    }

    async fn search_index(
        &self,
        provider: Arc<dyn IndexProvider>,
        store: Arc<dyn IndexStore>,
        mut query: CatalogSearchQuery,
        load_flags: ProductLoadFlags,
    ) -> SearchResult<CatalogSearchResult> {
        let engine = provider.get_search_engine(store.as_ref(), &query)?;
        let backend = engine.name().to_string();
        CATALOG_SEARCHES_TOTAL.with_label_values(&[backend.as_str()]).inc();
        tracing::debug!(engine = %backend, term = ?query.term, filters = query.filters.len(), "Searching catalog index");

        self.events
            .publish_searching(&CatalogSearchingEvent { query: &query })
            .await;

        let mut total_hits = 0;
        let mut hits_entity_ids = Vec::new();
        let mut hits_factory: Option<HitsFactory> = None;

        if query.take > 0 {
            total_hits = measure_step(&backend, "count", engine.count()).await?;
            query.skip = query.clamp_skip(total_hits);

            if query.result_flags.contains(ResultFlags::WITH_HITS) {
                let hits = measure_step(&backend, "hits", engine.search(query.skip, query.take)).await?;
                hits_entity_ids = hits.iter().map(|hit| hit.entity_id).collect();
                hits_factory = Some(hits_factory_for(
                    self.loader.clone(),
                    hits_entity_ids.clone(),
                    load_flags,
                ));
            }
        }

        let mut facets = BTreeMap::new();
        if query.result_flags.contains(ResultFlags::WITH_FACETS)
            && !query.facet_descriptors.is_empty()
            && self.config.enable_facets
        {
            match measure_step(&backend, "facets", engine.get_facet_map(total_hits)).await {
                Ok(map) => facets = map,
                Err(e) => {
                    tracing::error!(error = %e, engine = %backend, "Failed to compute facets");
                    record_degraded("facets");
                }
            }
            self.labels
                .apply(&mut facets, &query.facet_descriptors, query.language_id)
                .await;
        }

        let mut suggestions = Vec::new();
        if query.result_flags.contains(ResultFlags::WITH_SUGGESTIONS) && self.config.enable_suggestions {
            match measure_step(&backend, "suggestions", engine.check_spelling(total_hits)).await {
                Ok(found) => suggestions = found,
                Err(e) => {
                    tracing::error!(error = %e, engine = %backend, "Spell checking failed");
                    record_degraded("suggestions");
                }
            }
        }

        let result = CatalogSearchResult::new(
            Some(backend),
            query,
            total_hits,
            hits_entity_ids,
            hits_factory,
            facets,
        )
        .with_suggestions(suggestions);

        let mut event = CatalogSearchedEvent::new(result);
        self.events.publish_searched(&mut event).await;
        Ok(event.result)
    }

    /// Relational query of `query` bound to `base`, or to the whole catalog
    pub async fn prepare_query(
        &self,
        query: &CatalogSearchQuery,
        base: Option<Vec<Product>>,
    ) -> SearchResult<PreparedProductQuery> {
        self.linq.prepare_query(query, base).await
    }
}
