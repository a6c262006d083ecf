use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// A catalog product with its one-to-many child collections
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Product {
    /// Unique identifier
    pub id: i64,

    /// Product name
    pub name: String,

    /// Short description
    pub short_description: Option<String>,

    /// Full description
    pub full_description: Option<String>,

    /// Stock keeping unit
    pub sku: Option<String>,

    /// Product type
    pub product_type: ProductType,

    /// Parent grouped product (0 if none)
    pub parent_grouped_product_id: i64,

    /// Where the product may be shown
    pub visibility: ProductVisibility,

    /// Product condition
    pub condition: ProductCondition,

    /// Display order within a grouped product
    pub display_order: i32,

    pub published: bool,
    pub deleted: bool,
    pub is_system_product: bool,
    pub show_on_home_page: bool,

    /// Regular price
    pub price: f64,

    /// Special price and its optional validity window
    pub special_price: Option<f64>,
    pub special_price_start_utc: Option<DateTime<Utc>>,
    pub special_price_end_utc: Option<DateTime<Utc>>,

    /// Inventory handling
    pub manage_inventory_method: ManageInventoryMethod,
    pub stock_quantity: i32,
    pub backorder_mode: BackorderMode,
    pub attribute_combinations: Vec<ProductVariantAttributeCombination>,

    /// Availability window
    pub available_start_utc: Option<DateTime<Utc>>,
    pub available_end_utc: Option<DateTime<Utc>>,

    /// Creation timestamp
    pub created_on_utc: DateTime<Utc>,

    /// Review aggregates
    pub approved_rating_sum: i32,
    pub approved_total_reviews: i32,

    /// Delivery time (if any)
    pub delivery_time_id: Option<i64>,

    pub is_download: bool,
    pub is_recurring: bool,
    pub is_ship_enabled: bool,
    pub is_free_shipping: bool,
    pub is_tax_exempt: bool,
    pub is_esd: bool,
    pub has_discounts_applied: bool,

    /// Access control / store restriction switches
    pub subject_to_acl: bool,
    pub limited_to_stores: bool,

    /// Category mappings
    pub categories: Vec<ProductCategory>,

    /// Manufacturer mappings
    pub manufacturers: Vec<ProductManufacturer>,

    /// Product tag ids
    pub tag_ids: Vec<i64>,
}

impl Product {
    /// Create a published, simple product with a price
    pub fn new(id: i64, name: impl Into<String>, price: f64) -> Self {
        Self {
            id,
            name: name.into(),
            price,
            published: true,
            created_on_utc: Utc::now(),
            ..Default::default()
        }
    }

    /// Whether the special price applies at `now`.
    ///
    /// Window bounds are exclusive: a window starting exactly at `now` is not open yet.
    pub fn is_special_price_active(&self, now: DateTime<Utc>) -> bool {
        self.special_price.is_some()
            && self.special_price_start_utc.map_or(true, |start| start < now)
            && self.special_price_end_utc.map_or(true, |end| end > now)
    }

    /// Effective price at `now`
    pub fn active_price(&self, now: DateTime<Utc>) -> f64 {
        match self.special_price {
            Some(special) if self.is_special_price_active(now) => special,
            _ => self.price,
        }
    }

    /// Average approved rating, `None` without reviews
    pub fn average_rating(&self) -> Option<f64> {
        if self.approved_total_reviews == 0 {
            None
        } else {
            Some(self.approved_rating_sum as f64 / self.approved_total_reviews as f64)
        }
    }

    /// Whether the product can currently be ordered
    pub fn is_available(&self) -> bool {
        match self.manage_inventory_method {
            ManageInventoryMethod::DontManageStock => true,
            ManageInventoryMethod::ManageStock => {
                self.stock_quantity > 0 || self.backorder_mode != BackorderMode::NoBackorders
            }
            ManageInventoryMethod::ManageStockByAttributes => self
                .attribute_combinations
                .iter()
                .any(|c| c.stock_quantity > 0 || c.allow_out_of_stock_orders),
        }
    }

    /// Builder helper: add a category mapping
    pub fn in_category(mut self, category_id: i64, display_order: i32) -> Self {
        self.categories.push(ProductCategory {
            category_id,
            display_order,
            is_featured_product: false,
        });
        self
    }

    /// Builder helper: add a manufacturer mapping
    pub fn with_manufacturer(mut self, manufacturer_id: i64, display_order: i32) -> Self {
        self.manufacturers.push(ProductManufacturer {
            manufacturer_id,
            display_order,
            is_featured_product: false,
        });
        self
    }
}

/// Product-to-category mapping
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductCategory {
    pub category_id: i64,
    #[serde(default)]
    pub display_order: i32,
    #[serde(default)]
    pub is_featured_product: bool,
}

/// Product-to-manufacturer mapping
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductManufacturer {
    pub manufacturer_id: i64,
    #[serde(default)]
    pub display_order: i32,
    #[serde(default)]
    pub is_featured_product: bool,
}

/// Attribute combination carrying its own stock
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductVariantAttributeCombination {
    pub id: i64,
    #[serde(default)]
    pub stock_quantity: i32,
    #[serde(default)]
    pub allow_out_of_stock_orders: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display)]
pub enum ProductType {
    #[default]
    SimpleProduct,
    GroupedProduct,
    BundledProduct,
}

impl ProductType {
    pub fn id(self) -> i64 {
        match self {
            ProductType::SimpleProduct => 5,
            ProductType::GroupedProduct => 10,
            ProductType::BundledProduct => 15,
        }
    }
}

/// Visibility levels, ordered from most to least visible
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, EnumString, Display)]
pub enum ProductVisibility {
    #[default]
    Full,
    SearchResults,
    ProductPage,
    Hidden,
}

impl ProductVisibility {
    pub fn id(self) -> i64 {
        match self {
            ProductVisibility::Full => 0,
            ProductVisibility::SearchResults => 10,
            ProductVisibility::ProductPage => 20,
            ProductVisibility::Hidden => 30,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display)]
pub enum ProductCondition {
    #[default]
    New,
    Refurbished,
    Used,
    Damaged,
}

impl ProductCondition {
    pub fn id(self) -> i64 {
        match self {
            ProductCondition::New => 0,
            ProductCondition::Refurbished => 10,
            ProductCondition::Used => 20,
            ProductCondition::Damaged => 30,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display)]
pub enum ManageInventoryMethod {
    #[default]
    DontManageStock,
    ManageStock,
    ManageStockByAttributes,
}

impl ManageInventoryMethod {
    pub fn id(self) -> i64 {
        match self {
            ManageInventoryMethod::DontManageStock => 0,
            ManageInventoryMethod::ManageStock => 1,
            ManageInventoryMethod::ManageStockByAttributes => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display)]
pub enum BackorderMode {
    #[default]
    NoBackorders,
    AllowQtyBelow0,
    AllowQtyBelow0AndNotifyCustomer,
}

impl BackorderMode {
    pub fn id(self) -> i64 {
        match self {
            BackorderMode::NoBackorders => 0,
            BackorderMode::AllowQtyBelow0 => 1,
            BackorderMode::AllowQtyBelow0AndNotifyCustomer => 2,
        }
    }
}
