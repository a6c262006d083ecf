use crate::catalog::entities::{
    AclRecord, Category, DeliveryTime, LocalizedProperty, Manufacturer, StoreMapping,
};
use crate::catalog::product::Product;
use crate::catalog::{CatalogRepository, ProductLoadFlags, ProductLoader};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Serializable dump of a whole catalog
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogSnapshot {
    pub products: Vec<Product>,
    pub categories: Vec<Category>,
    pub manufacturers: Vec<Manufacturer>,
    pub delivery_times: Vec<DeliveryTime>,
    pub store_mappings: Vec<StoreMapping>,
    pub acl_records: Vec<AclRecord>,
    pub localized_properties: Vec<LocalizedProperty>,
}

impl CatalogSnapshot {
    /// Read a snapshot from a JSON file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// In-memory catalog (for embedding and testing)
#[derive(Clone, Default)]
pub struct InMemoryCatalog {
    products: Arc<DashMap<i64, Product>>,
    categories: Arc<DashMap<i64, Category>>,
    manufacturers: Arc<DashMap<i64, Manufacturer>>,
    delivery_times: Arc<DashMap<i64, DeliveryTime>>,
    store_mappings: Arc<RwLock<Vec<StoreMapping>>>,
    acl_records: Arc<RwLock<Vec<AclRecord>>>,
    localized_properties: Arc<RwLock<Vec<LocalizedProperty>>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: CatalogSnapshot) -> Self {
        let catalog = Self::new();
        for product in snapshot.products {
            catalog.save_product(product);
        }
        for category in snapshot.categories {
            catalog.save_category(category);
        }
        for manufacturer in snapshot.manufacturers {
            catalog.save_manufacturer(manufacturer);
        }
        for delivery_time in snapshot.delivery_times {
            catalog.save_delivery_time(delivery_time);
        }
        *catalog.store_mappings.write() = snapshot.store_mappings;
        *catalog.acl_records.write() = snapshot.acl_records;
        *catalog.localized_properties.write() = snapshot.localized_properties;
        tracing::debug!(products = catalog.products.len(), "Catalog snapshot loaded");
        catalog
    }

    pub fn save_product(&self, product: Product) {
        self.products.insert(product.id, product);
    }

    pub fn save_category(&self, category: Category) {
        self.categories.insert(category.id, category);
    }

    pub fn save_manufacturer(&self, manufacturer: Manufacturer) {
        self.manufacturers.insert(manufacturer.id, manufacturer);
    }

    pub fn save_delivery_time(&self, delivery_time: DeliveryTime) {
        self.delivery_times.insert(delivery_time.id, delivery_time);
    }

    pub fn add_store_mapping(&self, mapping: StoreMapping) {
        self.store_mappings.write().push(mapping);
    }

    pub fn add_acl_record(&self, record: AclRecord) {
        self.acl_records.write().push(record);
    }

    pub fn add_localized_property(&self, property: LocalizedProperty) {
        self.localized_properties.write().push(property);
    }

    pub fn product_count(&self) -> usize {
        self.products.len()
    }
}

#[async_trait]
impl CatalogRepository for InMemoryCatalog {
    async fn products(&self) -> Result<Vec<Product>> {
        let mut products: Vec<Product> = self
            .products
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        // DashMap iteration order is arbitrary; keep table order stable
        products.sort_by_key(|p| p.id);
        Ok(products)
    }

    async fn categories(&self) -> Result<Vec<Category>> {
        let mut categories: Vec<Category> =
            self.categories.iter().map(|e| e.value().clone()).collect();
        categories.sort_by_key(|c| c.id);
        Ok(categories)
    }

    async fn manufacturers(&self) -> Result<Vec<Manufacturer>> {
        let mut manufacturers: Vec<Manufacturer> =
            self.manufacturers.iter().map(|e| e.value().clone()).collect();
        manufacturers.sort_by_key(|m| m.id);
        Ok(manufacturers)
    }

    async fn delivery_times(&self) -> Result<Vec<DeliveryTime>> {
        let mut delivery_times: Vec<DeliveryTime> =
            self.delivery_times.iter().map(|e| e.value().clone()).collect();
        delivery_times.sort_by_key(|d| d.id);
        Ok(delivery_times)
    }

    async fn store_mappings(&self, entity_name: &str) -> Result<Vec<StoreMapping>> {
        Ok(self
            .store_mappings
            .read()
            .iter()
            .filter(|m| m.entity_name == entity_name)
            .cloned()
            .collect())
    }

    async fn acl_records(&self, entity_name: &str) -> Result<Vec<AclRecord>> {
        Ok(self
            .acl_records
            .read()
            .iter()
            .filter(|r| r.entity_name == entity_name)
            .cloned()
            .collect())
    }

    async fn localized_properties(
        &self,
        locale_key_group: &str,
        language_id: i64,
    ) -> Result<Vec<LocalizedProperty>> {
        Ok(self
            .localized_properties
            .read()
            .iter()
            .filter(|p| p.locale_key_group == locale_key_group && p.language_id == language_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ProductLoader for InMemoryCatalog {
    async fn get_products_by_ids(
        &self,
        ids: &[i64],
        flags: ProductLoadFlags,
    ) -> Result<Vec<Product>> {
        let mut products = Vec::with_capacity(ids.len());
        for id in ids {
            // Missing ids are skipped: the index may lag behind the catalog
            let Some(entry) = self.products.get(id) else {
                tracing::debug!(product_id = id, "Product not found while loading hits");
                continue;
            };
            let mut product = entry.value().clone();
            if product.deleted {
                continue;
            }
            if !flags.contains(ProductLoadFlags::WITH_CATEGORIES) {
                product.categories.clear();
            }
            if !flags.contains(ProductLoadFlags::WITH_MANUFACTURERS) {
                product.manufacturers.clear();
            }
            if !flags.contains(ProductLoadFlags::WITH_TAGS) {
                product.tag_ids.clear();
            }
            if !flags.contains(ProductLoadFlags::WITH_ATTRIBUTE_COMBINATIONS) {
                product.attribute_combinations.clear();
            }
            products.push(product);
        }
        Ok(products)
    }
}

/// Create a catalog from a JSON snapshot on disk
pub fn load_catalog(path: &Path) -> Result<Arc<InMemoryCatalog>> {
    if !path.exists() {
        return Err(AppError::NotFound(format!(
            "Catalog file {} does not exist",
            path.display()
        )));
    }
    tracing::info!(path = %path.display(), "Loading catalog snapshot");
    let snapshot = CatalogSnapshot::from_json_file(path)?;
    Ok(Arc::new(InMemoryCatalog::from_snapshot(snapshot)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_products_sorted_by_id() {
        let catalog = InMemoryCatalog::new();
        catalog.save_product(Product::new(3, "C", 3.0));
        catalog.save_product(Product::new(1, "A", 1.0));
        catalog.save_product(Product::new(2, "B", 2.0));

        let ids: Vec<i64> = catalog.products().await.unwrap().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_load_products_preserves_id_order_and_flags() {
        let catalog = InMemoryCatalog::new();
        catalog.save_product(Product::new(1, "A", 1.0).in_category(5, 0));
        catalog.save_product(Product::new(2, "B", 2.0).in_category(5, 1));

        let products = catalog
            .get_products_by_ids(&[2, 1, 99], ProductLoadFlags::empty())
            .await
            .unwrap();
        assert_eq!(products.iter().map(|p| p.id).collect::<Vec<_>>(), vec![2, 1]);
        assert!(products[0].categories.is_empty());

        let products = catalog
            .get_products_by_ids(&[1], ProductLoadFlags::all())
            .await
            .unwrap();
        assert_eq!(products[0].categories.len(), 1);
    }

    #[tokio::test]
    async fn test_side_tables_filtered() {
        let catalog = InMemoryCatalog::new();
        catalog.add_localized_property(LocalizedProperty::name("Category", 1, 2, "Lampen"));
        catalog.add_localized_property(LocalizedProperty::name("Category", 1, 3, "Lampes"));

        let props = catalog.localized_properties("Category", 2).await.unwrap();
        assert_eq!(props.len(), 1);
        assert_eq!(props[0].locale_value, "Lampen");
    }

    #[test]
    fn test_missing_catalog_file() {
        let result = load_catalog(Path::new("/definitely/not/here.json"));
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
