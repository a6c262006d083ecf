//! Relational fallback search evaluated directly against the catalog.
//!
//! Queries are translated into a [`ProductExpr`] predicate over product rows
//! joined with their one-to-many relations; joined rows are collapsed back to
//! one row per product before ordering and paging.

pub mod expr;
pub mod prepared;
pub mod translate;

pub use expr::{Column, CompareOp, ProductExpr, Relation};
pub use prepared::PreparedProductQuery;
pub use translate::{translate, Join, Translation};

use crate::catalog::{CatalogRepository, Product, ProductLoadFlags, ProductLoader, PRODUCT_ENTITY};
use crate::metrics::{measure_step, record_degraded, CATALOG_SEARCHES_TOTAL};
use crate::search::catalog_query::CatalogSearchQuery;
use crate::search::config::SearchConfig;
use crate::search::error::{SearchError, SearchResult};
use crate::search::events::{CatalogSearchedEvent, CatalogSearchingEvent, EventPublisher};
use crate::search::facets::{assemble_facet_group, FacetContext, FacetGroup, FacetProjection};
use crate::search::labels::FacetLabelResolver;
use crate::search::query::ResultFlags;
use crate::search::result::{CatalogSearchResult, HitsFactory};
use chrono::Utc;
use expr::LocalizedText;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

const BACKEND: &str = "linq";

/// Catalog search evaluated against the relational catalog
#[derive(Clone)]
pub struct LinqCatalogSearchService {
    repository: Arc<dyn CatalogRepository>,
    loader: Arc<dyn ProductLoader>,
    labels: FacetLabelResolver,
    events: EventPublisher,
    config: Arc<SearchConfig>,
}

impl LinqCatalogSearchService {
    pub fn new(
        repository: Arc<dyn CatalogRepository>,
        loader: Arc<dyn ProductLoader>,
        events: EventPublisher,
        config: Arc<SearchConfig>,
    ) -> Self {
        Self {
            labels: FacetLabelResolver::new(repository.clone()),
            repository,
            loader,
            events,
            config,
        }
    }

    /// Translate `query` and bind it to `base`, or to the whole catalog
    pub async fn prepare_query(
        &self,
        query: &CatalogSearchQuery,
        base: Option<Vec<Product>>,
    ) -> SearchResult<PreparedProductQuery> {
        let translation = translate(query, &self.config, Utc::now())?;

        let products = match base {
            Some(products) => products,
            None => self.repository.products().await?,
        };

        let joins = translation.joins.clone();
        let mut prepared = PreparedProductQuery::new(translation, products);

        if joins.contains(&Join::StoreMappings) || query.has_filter("storeid") {
            let mut mappings: HashMap<i64, Vec<i64>> = HashMap::new();
            for mapping in self.repository.store_mappings(PRODUCT_ENTITY).await? {
                mappings.entry(mapping.entity_id).or_default().push(mapping.store_id);
            }
            prepared = prepared.with_store_mappings(mappings);
        }

        if joins.contains(&Join::AclRecords) || query.has_filter("roleid") {
            let mut roles: HashMap<i64, Vec<i64>> = HashMap::new();
            for record in self.repository.acl_records(PRODUCT_ENTITY).await? {
                roles.entry(record.entity_id).or_default().push(record.customer_role_id);
            }
            prepared = prepared.with_acl_roles(roles);
        }

        if joins.contains(&Join::LocalizedProperties) {
            let mut localized: HashMap<i64, Vec<LocalizedText>> = HashMap::new();
            for property in self
                .repository
                .localized_properties(PRODUCT_ENTITY, query.language_id)
                .await?
            {
                localized.entry(property.entity_id).or_default().push(LocalizedText {
                    key: property.locale_key,
                    value: property.locale_value,
                });
            }
            prepared = prepared.with_localized(localized);
        }

        tracing::debug!(
            joins = ?prepared.joins,
            grouping = prepared.grouping_required,
            products = prepared.source_len(),
            "Prepared catalog query"
        );
        Ok(prepared)
    }

    /// Search the catalog without an index
    pub async fn search(
        &self,
        mut query: CatalogSearchQuery,
        load_flags: ProductLoadFlags,
        direct: bool,
    ) -> SearchResult<CatalogSearchResult> {
        tracing::debug!(direct, filters = query.filters.len(), "Searching catalog relationally");
        CATALOG_SEARCHES_TOTAL.with_label_values(&[BACKEND]).inc();

        self.events
            .publish_searching(&CatalogSearchingEvent { query: &query })
            .await;

        let prepared = self.prepare_query(&query, None).await?;
        let matches: Vec<i64> = measure_step(BACKEND, "count", async { prepared.ids() }).await;
        let total_hits = matches.len();

        if query.take > 0 {
            query.skip = query.clamp_skip(total_hits);
        }

        let mut hits_entity_ids = Vec::new();
        let mut hits_factory: Option<HitsFactory> = None;
        if query.result_flags.contains(ResultFlags::WITH_HITS) && query.take > 0 {
            hits_entity_ids = matches
                .iter()
                .skip(query.skip)
                .take(query.take)
                .copied()
                .collect();
            hits_factory = Some(hits_factory_for(
                self.loader.clone(),
                hits_entity_ids.clone(),
                load_flags,
            ));
        }

        let mut facets = BTreeMap::new();
        if query.result_flags.contains(ResultFlags::WITH_FACETS)
            && !query.facet_descriptors.is_empty()
            && self.config.enable_facets
        {
            match measure_step(BACKEND, "facets", self.get_facets(&query, total_hits)).await {
                Ok(map) => facets = map,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to compute facets");
                    record_degraded("facets");
                }
            }
            self.labels
                .apply(&mut facets, &query.facet_descriptors, query.language_id)
                .await;
        }

        let result = CatalogSearchResult::new(
            None,
            query,
            total_hits,
            hits_entity_ids,
            hits_factory,
            facets,
        );
        let mut event = CatalogSearchedEvent::new(result);
        self.events.publish_searched(&mut event).await;
        Ok(event.result)
    }

    /// Facet groups of every descriptor of `query`.
    ///
    /// Multi-select groups are counted without their own filters so that
    /// alternatives to the current selection remain visible.
    pub async fn get_facets(
        &self,
        query: &CatalogSearchQuery,
        total_hits: usize,
    ) -> SearchResult<BTreeMap<String, FacetGroup>> {
        let now = Utc::now();
        let ctx = FacetContext::new(now, self.config.new_arrivals_days);
        let rate = self.config.resolve_rate(query.currency_code.as_deref())?;
        let catalog = self.repository.products().await?;

        let mut groups = BTreeMap::new();
        for (key, descriptor) in &query.facet_descriptors {
            let source = if descriptor.is_multi_select {
                query.without_facet_filters(descriptor.kind())
            } else {
                query.clone()
            };
            let prepared = self.prepare_query(&source, Some(catalog.clone())).await?;
            let projections: Vec<FacetProjection> = prepared
                .products()
                .into_iter()
                .map(|p| FacetProjection::from_product(p, now, rate))
                .collect();

            if let Some(group) = assemble_facet_group(descriptor, &projections, total_hits, &ctx) {
                groups.insert(key.clone(), group);
            }
        }
        Ok(groups)
    }
}

/// Deferred loading of a page of products in hit order
pub(crate) fn hits_factory_for(
    loader: Arc<dyn ProductLoader>,
    ids: Vec<i64>,
    flags: ProductLoadFlags,
) -> HitsFactory {
    let ids = Arc::new(ids);
    Arc::new(move || {
        let loader = loader.clone();
        let ids = ids.clone();
        Box::pin(async move {
            loader
                .get_products_by_ids(&ids, flags)
                .await
                .map_err(|e| SearchError::ProductLoad(e.to_string()))
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Category, InMemoryCatalog};
    use crate::search::config::SearchConfigBuilder;
    use crate::search::facets::FacetDescriptor;

    fn service(catalog: InMemoryCatalog) -> LinqCatalogSearchService {
        let catalog = Arc::new(catalog);
        LinqCatalogSearchService::new(
            catalog.clone(),
            catalog,
            EventPublisher::new(),
            Arc::new(SearchConfigBuilder::new().build()),
        )
    }

    #[tokio::test]
    async fn test_search_pages_and_loads_hits() {
        let catalog = InMemoryCatalog::new();
        for id in 1..=5 {
            catalog.save_product(Product::new(id, format!("Lamp {}", id), 10.0));
        }
        let query = CatalogSearchQuery::new().slice(4, 2).unwrap();
        let result = service(catalog)
            .search(query, ProductLoadFlags::empty(), true)
            .await
            .unwrap();

        assert_eq!(result.engine, None);
        assert_eq!(result.total_hits_count, 5);
        assert_eq!(result.hits_entity_ids, vec![5]);
        let hits = result.hits().await.unwrap();
        assert_eq!(hits[0].id, 5);
    }

    #[tokio::test]
    async fn test_out_of_range_page_is_clamped() {
        let catalog = InMemoryCatalog::new();
        for id in 1..=4 {
            catalog.save_product(Product::new(id, "Chair", 10.0));
        }
        let query = CatalogSearchQuery::new().slice(10, 2).unwrap();
        let result = service(catalog)
            .search(query, ProductLoadFlags::empty(), true)
            .await
            .unwrap();

        assert_eq!(result.query.skip, 2);
        assert_eq!(result.hits_entity_ids, vec![3, 4]);
    }

    #[tokio::test]
    async fn test_multi_select_facet_keeps_alternatives() {
        let catalog = InMemoryCatalog::new();
        catalog.save_category(Category::new(1, "Lamps"));
        catalog.save_category(Category::new(2, "Desks"));
        catalog.save_product(Product::new(1, "Lamp", 10.0).in_category(1, 0));
        catalog.save_product(Product::new(2, "Desk", 10.0).in_category(2, 0));

        let query = CatalogSearchQuery::new()
            .with_category_ids(None, &[1])
            .build_facet_map(true)
            .with_facet(FacetDescriptor::new("categoryid").multi_select(true));
        let result = service(catalog)
            .search(query, ProductLoadFlags::empty(), true)
            .await
            .unwrap();

        assert_eq!(result.total_hits_count, 1);
        assert_eq!(result.facets["categoryid"].facets.len(), 2);
    }
}
