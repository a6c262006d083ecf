//! Common test utilities for catalog search testing
//!
//! A small furniture catalog exercising categories, manufacturers, special
//! prices, inventory, store restrictions and localized names.

#![allow(dead_code)]

use catalog_search::catalog::{
    BackorderMode, Category, DeliveryTime, InMemoryCatalog, LocalizedProperty,
    ManageInventoryMethod, Manufacturer, Product, StoreMapping, PRODUCT_ENTITY,
};
use catalog_search::search::{
    CatalogIndexer, CatalogSearchService, EventPublisher, IndexManager, SearchConfig,
    SearchConfigBuilder, TantivyIndexProvider, CATALOG_SCOPE,
};
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;

pub const LIGHTING: i64 = 1;
pub const FURNITURE: i64 = 2;
pub const OFFICE: i64 = 3;

pub const ACME: i64 = 10;
pub const LUMINA: i64 = 11;

pub const GERMAN: i64 = 2;

/// Build the fixture catalog
pub fn fixture_catalog() -> Arc<InMemoryCatalog> {
    let catalog = InMemoryCatalog::new();
    let now = Utc::now();

    catalog.save_category(Category::new(LIGHTING, "Lighting"));
    catalog.save_category(Category::new(FURNITURE, "Furniture"));
    catalog.save_category(Category::new(OFFICE, "Office"));
    catalog.save_manufacturer(Manufacturer::new(ACME, "Acme"));
    catalog.save_manufacturer(Manufacturer::new(LUMINA, "Lumina"));
    catalog.save_delivery_time(DeliveryTime {
        id: 1,
        name: "1-2 days".to_string(),
        display_order: 0,
    });

    let mut desk_lamp = Product::new(1, "Desk Lamp", 30.0)
        .in_category(LIGHTING, 2)
        .with_manufacturer(ACME, 0);
    desk_lamp.sku = Some("DL-1".to_string());
    desk_lamp.manage_inventory_method = ManageInventoryMethod::ManageStock;
    desk_lamp.stock_quantity = 5;
    desk_lamp.delivery_time_id = Some(1);
    catalog.save_product(desk_lamp);

    // Special price active until tomorrow
    let mut floor_lamp = Product::new(2, "Floor Lamp", 100.0)
        .in_category(LIGHTING, 1)
        .with_manufacturer(LUMINA, 0);
    floor_lamp.special_price = Some(50.0);
    floor_lamp.special_price_end_utc = Some(now + Duration::days(1));
    catalog.save_product(floor_lamp);

    // Special price expired yesterday
    let mut chair = Product::new(3, "Office Chair", 100.0)
        .in_category(FURNITURE, 0)
        .in_category(OFFICE, 0)
        .with_manufacturer(ACME, 1);
    chair.special_price = Some(80.0);
    chair.special_price_end_utc = Some(now - Duration::days(1));
    chair.approved_rating_sum = 9;
    chair.approved_total_reviews = 2;
    catalog.save_product(chair);

    let desk = Product::new(4, "Standing Desk", 400.0)
        .in_category(LIGHTING, 3)
        .in_category(FURNITURE, 1)
        .in_category(OFFICE, 1);
    catalog.save_product(desk);

    let mut shade = Product::new(5, "Lamp Shade", 12.0);
    shade.published = false;
    catalog.save_product(shade);

    let mut archived = Product::new(6, "Archived Lamp", 20.0).in_category(LIGHTING, 0);
    archived.deleted = true;
    catalog.save_product(archived);

    let mut gift_card = Product::new(7, "Gift Card", 25.0);
    gift_card.is_system_product = true;
    catalog.save_product(gift_card);

    // Sold out and only sold in store 2
    let mut bookshelf = Product::new(8, "Bookshelf", 150.0).in_category(FURNITURE, 2);
    bookshelf.manage_inventory_method = ManageInventoryMethod::ManageStock;
    bookshelf.stock_quantity = 0;
    bookshelf.backorder_mode = BackorderMode::NoBackorders;
    bookshelf.limited_to_stores = true;
    catalog.save_product(bookshelf);
    catalog.add_store_mapping(StoreMapping {
        entity_name: PRODUCT_ENTITY.to_string(),
        entity_id: 8,
        store_id: 2,
    });

    catalog.add_localized_property(LocalizedProperty::name(PRODUCT_ENTITY, 1, GERMAN, "Schreibtischlampe"));
    catalog.add_localized_property(LocalizedProperty::name("Category", LIGHTING, GERMAN, "Beleuchtung"));

    Arc::new(catalog)
}

/// Search configuration with the index below `temp_dir`
pub fn test_config(temp_dir: &TempDir) -> Arc<SearchConfig> {
    Arc::new(
        SearchConfigBuilder::new()
            .index_path(temp_dir.path().to_path_buf())
            .currency("USD", 1.0)
            .currency("EUR", 0.5)
            .build(),
    )
}

/// Service without an index provider
pub fn relational_service(catalog: Arc<InMemoryCatalog>) -> CatalogSearchService {
    CatalogSearchService::new(
        IndexManager::new(),
        catalog.clone(),
        catalog,
        EventPublisher::new(),
        Arc::new(SearchConfigBuilder::new().currency("USD", 1.0).currency("EUR", 0.5).build()),
    )
}

/// Service whose index provider is registered; the index is built when `build` is set
pub async fn indexed_service(
    catalog: Arc<InMemoryCatalog>,
    temp_dir: &TempDir,
    build: bool,
) -> CatalogSearchService {
    let config = test_config(temp_dir);
    let provider = Arc::new(TantivyIndexProvider::open(config.clone()).unwrap());

    if build {
        CatalogIndexer::new(catalog.clone(), config.clone())
            .rebuild(&provider.store(CATALOG_SCOPE))
            .await
            .unwrap();
    }

    let index_manager = IndexManager::new();
    index_manager.register_provider(CATALOG_SCOPE, provider);
    CatalogSearchService::new(index_manager, catalog.clone(), catalog, EventPublisher::new(), config)
}

/// Metric lines of a Prometheus exposition keyed by metric family
pub fn parse_prometheus_output(output: &str) -> HashMap<String, Vec<String>> {
    let mut metrics: HashMap<String, Vec<String>> = HashMap::new();
    let mut current_metric = String::new();

    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if line.starts_with("# HELP") || line.starts_with("# TYPE") {
            if let Some(name) = line.split_whitespace().nth(2) {
                current_metric = name.to_string();
            }
        } else if !line.starts_with('#') && !current_metric.is_empty() {
            metrics.entry(current_metric.clone()).or_default().push(line.to_string());
        }
    }

    metrics
}

/// Whether `name` follows the Prometheus metric naming rules
pub fn is_valid_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':' => {}
        _ => return false,
    }
    !name.starts_with("__") && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}
