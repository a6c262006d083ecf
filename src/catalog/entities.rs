//! Catalog side tables: taxonomy entities, store mappings, ACL records and
//! localized properties.

use serde::{Deserialize, Serialize};

/// Entity name used by side tables for products
pub const PRODUCT_ENTITY: &str = "Product";

/// Locale key group used for category names
pub const CATEGORY_ENTITY: &str = "Category";

/// Locale key group used for manufacturer names
pub const MANUFACTURER_ENTITY: &str = "Manufacturer";

/// Locale key group used for delivery time names
pub const DELIVERY_TIME_ENTITY: &str = "DeliveryTime";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub parent_category_id: i64,
    pub display_order: i32,
    pub published: bool,
    pub deleted: bool,
}

impl Category {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            published: true,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Manufacturer {
    pub id: i64,
    pub name: String,
    pub display_order: i32,
    pub published: bool,
    pub deleted: bool,
}

impl Manufacturer {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            published: true,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryTime {
    pub id: i64,
    pub name: String,
    pub display_order: i32,
}

/// Restricts an entity to a store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreMapping {
    pub entity_name: String,
    pub entity_id: i64,
    pub store_id: i64,
}

/// Grants a customer role access to an entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclRecord {
    pub entity_name: String,
    pub entity_id: i64,
    pub customer_role_id: i64,
}

/// A translated value of an entity property
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizedProperty {
    pub entity_id: i64,
    pub language_id: i64,
    pub locale_key_group: String,
    pub locale_key: String,
    pub locale_value: String,
}

impl LocalizedProperty {
    pub fn name(group: &str, entity_id: i64, language_id: i64, value: impl Into<String>) -> Self {
        Self {
            entity_id,
            language_id,
            locale_key_group: group.to_string(),
            locale_key: "Name".to_string(),
            locale_value: value.into(),
        }
    }
}
