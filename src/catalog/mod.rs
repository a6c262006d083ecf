//! Relational catalog model consumed by the search services.
//!
//! The catalog is the system of record: products with their one-to-many
//! child collections (category/manufacturer mappings, tags, attribute
//! combinations) plus side tables (store mappings, ACL records, localized
//! properties). The search layer reads it through [`CatalogRepository`] and
//! materializes hits through [`ProductLoader`].

pub mod entities;
pub mod product;
pub mod store;

pub use entities::*;
pub use product::*;
pub use store::{load_catalog, CatalogSnapshot, InMemoryCatalog};

use crate::error::Result;
use async_trait::async_trait;
use bitflags::bitflags;

bitflags! {
    /// Navigation collections to eager-load with product hits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ProductLoadFlags: u32 {
        const WITH_CATEGORIES = 1;
        const WITH_MANUFACTURERS = 1 << 1;
        const WITH_TAGS = 1 << 2;
        const WITH_ATTRIBUTE_COMBINATIONS = 1 << 3;
    }
}

impl Default for ProductLoadFlags {
    fn default() -> Self {
        ProductLoadFlags::empty()
    }
}

/// Read access to the relational catalog
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// All products, ordered by id
    async fn products(&self) -> Result<Vec<Product>>;

    /// All categories
    async fn categories(&self) -> Result<Vec<Category>>;

    /// All manufacturers
    async fn manufacturers(&self) -> Result<Vec<Manufacturer>>;

    /// All delivery times
    async fn delivery_times(&self) -> Result<Vec<DeliveryTime>>;

    /// Store mappings for an entity type
    async fn store_mappings(&self, entity_name: &str) -> Result<Vec<StoreMapping>>;

    /// ACL records for an entity type
    async fn acl_records(&self, entity_name: &str) -> Result<Vec<AclRecord>>;

    /// Localized properties of a key group in one language
    async fn localized_properties(
        &self,
        locale_key_group: &str,
        language_id: i64,
    ) -> Result<Vec<LocalizedProperty>>;
}

/// Loads full product entities for search hits
#[async_trait]
pub trait ProductLoader: Send + Sync {
    /// Load products in the order of `ids`; unknown or deleted ids are skipped
    async fn get_products_by_ids(&self, ids: &[i64], flags: ProductLoadFlags)
        -> Result<Vec<Product>>;
}
