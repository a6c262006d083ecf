//! Relational catalog search through the service fallback

mod common;

use async_trait::async_trait;
use catalog_search::catalog::ProductLoadFlags;
use catalog_search::search::*;
use common::*;
use std::sync::Arc;

async fn ids(service: &CatalogSearchService, query: CatalogSearchQuery) -> Vec<i64> {
    service
        .search(query, ProductLoadFlags::empty(), false)
        .await
        .unwrap()
        .hits_entity_ids
}

#[tokio::test]
async fn test_deleted_and_system_products_never_match() {
    let service = relational_service(fixture_catalog());
    let result = service
        .search(CatalogSearchQuery::new(), ProductLoadFlags::empty(), false)
        .await
        .unwrap();

    assert_eq!(result.engine, None);
    assert_eq!(result.total_hits_count, 6);
    assert_eq!(result.hits_entity_ids, vec![1, 2, 3, 4, 5, 8]);
}

#[tokio::test]
async fn test_price_filter_uses_active_price() {
    let service = relational_service(fixture_catalog());
    let query = CatalogSearchQuery::new()
        .with_currency_code("USD")
        .price_between(Some(90.0), Some(110.0), None, None)
        .unwrap();

    // Chair's special price expired; floor lamp's special price of 50 is active
    assert_eq!(ids(&service, query).await, vec![3]);

    let query = CatalogSearchQuery::new()
        .with_currency_code("USD")
        .price_between(Some(40.0), Some(60.0), None, None)
        .unwrap();
    assert_eq!(ids(&service, query).await, vec![2]);
}

#[tokio::test]
async fn test_price_filter_in_foreign_currency() {
    let service = relational_service(fixture_catalog());
    // EUR rate 0.5: the desk costs 200 EUR
    let query = CatalogSearchQuery::new()
        .with_currency_code("EUR")
        .price_between(Some(150.0), None, None, None)
        .unwrap();
    assert_eq!(ids(&service, query).await, vec![4]);
}

#[tokio::test]
async fn test_product_in_several_categories_appears_once() {
    let service = relational_service(fixture_catalog());
    let query = CatalogSearchQuery::new()
        .published_only(true)
        .with_category_ids(None, &[LIGHTING, FURNITURE]);

    let result = service.search(query, ProductLoadFlags::empty(), false).await.unwrap();
    assert_eq!(result.total_hits_count, 5);
    assert_eq!(result.hits_entity_ids, vec![1, 2, 3, 4, 8]);
}

#[tokio::test]
async fn test_absent_ranges_add_no_filters() {
    let query = CatalogSearchQuery::new()
        .price_between(None, None, None, None)
        .unwrap()
        .with_stock_quantity(None, None, None, None)
        .unwrap()
        .created_between(None, None, None, None)
        .unwrap();
    assert!(query.filters.is_empty());
}

#[tokio::test]
async fn test_category_relevance_uses_display_order() {
    let service = relational_service(fixture_catalog());
    let query = CatalogSearchQuery::new()
        .with_category_ids(None, &[LIGHTING])
        .sort_by(ProductSorting::Relevance);
    assert_eq!(ids(&service, query).await, vec![2, 1, 4]);

    // Without any sort products come in id order
    let query = CatalogSearchQuery::new().with_category_ids(None, &[LIGHTING]);
    assert_eq!(ids(&service, query).await, vec![1, 2, 4]);
}

#[tokio::test]
async fn test_sorting_by_price_and_name() {
    let service = relational_service(fixture_catalog());
    let query = CatalogSearchQuery::new()
        .published_only(true)
        .sort_by(ProductSorting::PriceAsc);
    assert_eq!(ids(&service, query).await, vec![1, 2, 3, 8, 4]);

    let query = CatalogSearchQuery::new()
        .published_only(true)
        .sort_by(ProductSorting::NameAsc);
    assert_eq!(ids(&service, query).await, vec![8, 1, 2, 3, 4]);
}

#[tokio::test]
async fn test_available_only_and_store_restriction() {
    let service = relational_service(fixture_catalog());
    let query = CatalogSearchQuery::new().published_only(true).available_only(true);
    assert_eq!(ids(&service, query).await, vec![1, 2, 3, 4]);

    let query = CatalogSearchQuery::new().published_only(true).has_store_id(1);
    assert_eq!(ids(&service, query).await, vec![1, 2, 3, 4]);

    let query = CatalogSearchQuery::new().published_only(true).has_store_id(2);
    assert_eq!(ids(&service, query).await, vec![1, 2, 3, 4, 8]);
}

#[tokio::test]
async fn test_term_search_modes() {
    let service = relational_service(fixture_catalog());

    let query = CatalogSearchQuery::with_term(vec![], "LAMP", SearchMode::Contains);
    assert_eq!(ids(&service, query).await, vec![1, 2, 5]);

    let query = CatalogSearchQuery::with_term(vec!["name".into()], "lamp", SearchMode::StartsWith);
    assert_eq!(ids(&service, query).await, vec![5]);

    let query = CatalogSearchQuery::with_term(vec![], "dl-1", SearchMode::ExactMatch);
    assert_eq!(ids(&service, query).await, vec![1]);
}

#[tokio::test]
async fn test_localized_term_search() {
    let service = relational_service(fixture_catalog());
    let query = CatalogSearchQuery::with_term(vec![], "schreibtisch", SearchMode::Contains)
        .with_language_id(GERMAN);
    assert_eq!(ids(&service, query).await, vec![1]);

    // Without the language only the default names are searched
    let query = CatalogSearchQuery::with_term(vec![], "schreibtisch", SearchMode::Contains);
    assert!(ids(&service, query).await.is_empty());
}

#[tokio::test]
async fn test_out_of_range_page_is_clamped_to_last_page() {
    let service = relational_service(fixture_catalog());
    let query = CatalogSearchQuery::new()
        .published_only(true)
        .slice(10, 3)
        .unwrap();

    let result = service.search(query, ProductLoadFlags::empty(), false).await.unwrap();
    assert_eq!(result.total_hits_count, 5);
    assert_eq!(result.query.skip, 3);
    assert_eq!(result.hits_entity_ids, vec![4, 8]);

    let hits = result.hits().await.unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits.page_index, 1);
}

#[tokio::test]
async fn test_no_hits_never_loads_products() {
    let service = relational_service(fixture_catalog());
    let query = CatalogSearchQuery::with_term(vec![], "sofa", SearchMode::Contains);

    let result = service.search(query, ProductLoadFlags::empty(), false).await.unwrap();
    assert_eq!(result.total_hits_count, 0);
    assert!(result.hits().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_zero_hits_keep_only_selected_facet_groups() {
    let service = relational_service(fixture_catalog());
    let query = CatalogSearchQuery::with_term(vec![], "sofa", SearchMode::Contains)
        .build_facet_map(true)
        .with_facet(
            FacetDescriptor::new("categoryid")
                .add_value(FacetValue::new(LIGHTING).selected(true)),
        )
        .with_facet(FacetDescriptor::new("manufacturerid"))
        .with_facet(FacetDescriptor::new("available"));

    let result = service.search(query, ProductLoadFlags::empty(), false).await.unwrap();

    assert_eq!(result.total_hits_count, 0);
    assert!(result.facets.contains_key("categoryid"));
    assert!(result.facets.contains_key("available"));
    assert!(!result.facets.contains_key("manufacturerid"));
    let category = &result.facets["categoryid"];
    assert!(category.facets.iter().any(|f| f.value.is_selected));
}

#[tokio::test]
async fn test_facet_labels_are_localized() {
    let service = relational_service(fixture_catalog());
    let query = CatalogSearchQuery::new()
        .published_only(true)
        .with_language_id(GERMAN)
        .build_facet_map(true)
        .with_facet(FacetDescriptor::new("categoryid"));

    let result = service.search(query, ProductLoadFlags::empty(), false).await.unwrap();
    let labels: Vec<_> = result.facets["categoryid"]
        .facets
        .iter()
        .filter_map(|f| f.value.label.clone())
        .collect();
    assert!(labels.contains(&"Beleuchtung".to_string()));
    assert!(labels.contains(&"Furniture".to_string()));
}

struct ReplacingHandler;

#[async_trait]
impl CatalogSearchEventHandler for ReplacingHandler {
    async fn on_searched(&self, event: &mut CatalogSearchedEvent) {
        let query = event.result.query.clone();
        event.result = CatalogSearchResult::empty(query).with_suggestions(vec!["replaced".into()]);
    }
}

#[tokio::test]
async fn test_searched_handler_can_replace_result() {
    let catalog = fixture_catalog();
    let events = EventPublisher::new();
    events.subscribe(Arc::new(ReplacingHandler));
    let service = CatalogSearchService::new(
        IndexManager::new(),
        catalog.clone(),
        catalog,
        events,
        Arc::new(SearchConfig::default()),
    );

    let result = service
        .search(CatalogSearchQuery::new(), ProductLoadFlags::empty(), false)
        .await
        .unwrap();
    assert_eq!(result.total_hits_count, 0);
    assert_eq!(result.spell_checker_suggestions, vec!["replaced".to_string()]);
}

#[tokio::test]
async fn test_prepare_query_binds_a_base_set() {
    let catalog = fixture_catalog();
    let service = relational_service(catalog.clone());
    let base = vec![
        catalog_search::catalog::Product::new(100, "Lamp A", 5.0),
        catalog_search::catalog::Product::new(101, "Chair B", 5.0),
    ];
    let query = CatalogSearchQuery::with_term(vec![], "lamp", SearchMode::Contains);

    let prepared = service.prepare_query(&query, Some(base)).await.unwrap();
    assert_eq!(prepared.ids(), vec![100]);
    assert!(!prepared.grouping_required);
}
