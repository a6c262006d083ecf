//! Predicate expressions over joined product rows.
//!
//! Evaluation follows SQL three-valued logic: comparing against a missing
//! value yields `None` (unknown), and a row only passes when its predicate
//! evaluates to `Some(true)`.

use crate::catalog::{Product, ProductCategory, ProductManufacturer};
use crate::search::filter::FilterValue;
use crate::search::query::SearchMode;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;

/// A localized product text joined for term search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalizedText {
    pub key: String,
    pub value: String,
}

/// One row of the joined product relation
#[derive(Debug, Clone, Copy)]
pub struct ProductRow<'a> {
    pub product: &'a Product,
    pub category: Option<&'a ProductCategory>,
    pub manufacturer: Option<&'a ProductManufacturer>,
    pub tag_id: Option<i64>,
    pub store_id: Option<i64>,
    pub role_id: Option<i64>,
    pub localized: Option<&'a LocalizedText>,
}

impl<'a> ProductRow<'a> {
    pub fn new(product: &'a Product) -> Self {
        Self {
            product,
            category: None,
            manufacturer: None,
            tag_id: None,
            store_id: None,
            role_id: None,
            localized: None,
        }
    }
}

/// Columns addressable by predicates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Id,
    ParentId,
    TypeId,
    Visibility,
    ConditionId,
    DeliveryId,
    StockQuantity,
    DisplayOrder,
    Published,
    Deleted,
    SystemProduct,
    ShowOnHomePage,
    Download,
    Recurring,
    ShipEnabled,
    ShipFree,
    TaxExempt,
    Esd,
    Discount,
    LimitedToStores,
    SubjectToAcl,
    CreatedOn,
    AvailableStart,
    AvailableEnd,
    Rating,
    Price,
    SpecialPrice,
    SpecialPriceStart,
    SpecialPriceEnd,
    ManageInventory,
    BackorderMode,
    AnyCombinationAvailable,
    Name,
    ShortDescription,
    FullDescription,
    Sku,
    // Joined columns
    CategoryId,
    CategoryFeatured,
    ManufacturerId,
    ManufacturerFeatured,
    TagId,
    StoreId,
    RoleId,
    LocalizedName,
    LocalizedShortDescription,
}

impl Column {
    pub fn value(self, row: &ProductRow<'_>) -> FilterValue {
        let p = row.product;
        match self {
            Column::Id => p.id.into(),
            Column::ParentId => p.parent_grouped_product_id.into(),
            Column::TypeId => p.product_type.id().into(),
            Column::Visibility => p.visibility.id().into(),
            Column::ConditionId => p.condition.id().into(),
            Column::DeliveryId => p.delivery_time_id.into(),
            Column::StockQuantity => p.stock_quantity.into(),
            Column::DisplayOrder => p.display_order.into(),
            Column::Published => p.published.into(),
            Column::Deleted => p.deleted.into(),
            Column::SystemProduct => p.is_system_product.into(),
            Column::ShowOnHomePage => p.show_on_home_page.into(),
            Column::Download => p.is_download.into(),
            Column::Recurring => p.is_recurring.into(),
            Column::ShipEnabled => p.is_ship_enabled.into(),
            Column::ShipFree => p.is_free_shipping.into(),
            Column::TaxExempt => p.is_tax_exempt.into(),
            Column::Esd => p.is_esd.into(),
            Column::Discount => p.has_discounts_applied.into(),
            Column::LimitedToStores => p.limited_to_stores.into(),
            Column::SubjectToAcl => p.subject_to_acl.into(),
            Column::CreatedOn => p.created_on_utc.into(),
            Column::AvailableStart => p.available_start_utc.into(),
            Column::AvailableEnd => p.available_end_utc.into(),
            Column::Rating => p.average_rating().into(),
            Column::Price => p.price.into(),
            Column::SpecialPrice => p.special_price.into(),
            Column::SpecialPriceStart => p.special_price_start_utc.into(),
            Column::SpecialPriceEnd => p.special_price_end_utc.into(),
            Column::ManageInventory => p.manage_inventory_method.id().into(),
            Column::BackorderMode => p.backorder_mode.id().into(),
            Column::AnyCombinationAvailable => p
                .attribute_combinations
                .iter()
                .any(|c| c.stock_quantity > 0 || c.allow_out_of_stock_orders)
                .into(),
            Column::Name => p.name.as_str().into(),
            Column::ShortDescription => p.short_description.clone().into(),
            Column::FullDescription => p.full_description.clone().into(),
            Column::Sku => p.sku.clone().into(),
            Column::CategoryId => row.category.map(|c| c.category_id).into(),
            Column::CategoryFeatured => row.category.map(|c| c.is_featured_product).into(),
            Column::ManufacturerId => row.manufacturer.map(|m| m.manufacturer_id).into(),
            Column::ManufacturerFeatured => {
                row.manufacturer.map(|m| m.is_featured_product).into()
            }
            Column::TagId => row.tag_id.into(),
            Column::StoreId => row.store_id.into(),
            Column::RoleId => row.role_id.into(),
            Column::LocalizedName => localized(row, "Name"),
            Column::LocalizedShortDescription => localized(row, "ShortDescription"),
        }
    }
}

fn localized(row: &ProductRow<'_>, key: &str) -> FilterValue {
    match row.localized {
        Some(text) if text.key == key => text.value.as_str().into(),
        _ => FilterValue::Null,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn test(self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::Ne => ordering != Ordering::Equal,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Le => ordering != Ordering::Greater,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Ge => ordering != Ordering::Less,
        }
    }

    /// Operator of a lower bound
    pub fn lower(inclusive: bool) -> Self {
        if inclusive {
            CompareOp::Ge
        } else {
            CompareOp::Gt
        }
    }

    /// Operator of an upper bound
    pub fn upper(inclusive: bool) -> Self {
        if inclusive {
            CompareOp::Le
        } else {
            CompareOp::Lt
        }
    }
}

/// One-to-many product relations usable without a join
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    Categories,
    Manufacturers,
    Tags,
}

/// Side-table membership: `(column, product id, mapped id)`
pub type MappingLookup<'a> = dyn Fn(Column, i64, i64) -> bool + 'a;

/// A product predicate
#[derive(Debug, Clone, PartialEq)]
pub enum ProductExpr {
    True,
    Compare {
        column: Column,
        op: CompareOp,
        value: FilterValue,
    },
    IsNull(Column),
    Text {
        column: Column,
        mode: SearchMode,
        term: String,
    },
    /// Whether the product has a mapping in `relation` (to one of `ids`,
    /// any when empty), optionally restricted by the featured flag
    AnyRelated {
        relation: Relation,
        ids: Vec<i64>,
        featured: Option<bool>,
    },
    /// Whether the product is mapped to one of `ids` in a side table
    AnyMapped {
        column: Column,
        ids: Vec<i64>,
    },
    And(Vec<ProductExpr>),
    Or(Vec<ProductExpr>),
    Not(Box<ProductExpr>),
}

impl ProductExpr {
    pub fn compare(column: Column, op: CompareOp, value: impl Into<FilterValue>) -> Self {
        ProductExpr::Compare {
            column,
            op,
            value: value.into(),
        }
    }

    pub fn equals(column: Column, value: impl Into<FilterValue>) -> Self {
        Self::compare(column, CompareOp::Eq, value)
    }

    pub fn is_not_null(column: Column) -> Self {
        ProductExpr::Not(Box::new(ProductExpr::IsNull(column)))
    }

    pub fn negate(self) -> Self {
        match self {
            ProductExpr::Not(inner) => *inner,
            other => ProductExpr::Not(Box::new(other)),
        }
    }

    /// Conjunction, flattening trivial cases
    pub fn all(mut parts: Vec<ProductExpr>) -> Self {
        parts.retain(|p| *p != ProductExpr::True);
        match parts.len() {
            0 => ProductExpr::True,
            1 => parts.remove(0),
            _ => ProductExpr::And(parts),
        }
    }

    pub fn any(mut parts: Vec<ProductExpr>) -> Self {
        match parts.len() {
            1 => parts.remove(0),
            _ => ProductExpr::Or(parts),
        }
    }

    /// Evaluate against a row; `None` is unknown
    pub fn eval(&self, row: &ProductRow<'_>, mapped: &MappingLookup<'_>) -> Option<bool> {
        match self {
            ProductExpr::True => Some(true),
            ProductExpr::Compare { column, op, value } => column
                .value(row)
                .compare(value)
                .map(|ordering| op.test(ordering)),
            ProductExpr::IsNull(column) => Some(column.value(row).is_null()),
            ProductExpr::Text { column, mode, term } => {
                let value = column.value(row);
                let text = value.as_str()?.to_lowercase();
                let term = term.to_lowercase();
                Some(match mode {
                    SearchMode::Contains => text.contains(&term),
                    SearchMode::StartsWith => text.starts_with(&term),
                    SearchMode::ExactMatch => text == term,
                })
            }
            ProductExpr::AnyRelated {
                relation,
                ids,
                featured,
            } => Some(related(row.product, *relation, ids, *featured)),
            ProductExpr::AnyMapped { column, ids } => {
                Some(ids.iter().any(|id| mapped(*column, row.product.id, *id)))
            }
            ProductExpr::And(parts) => {
                let mut result = Some(true);
                for part in parts {
                    match part.eval(row, mapped) {
                        Some(false) => return Some(false),
                        None => result = None,
                        Some(true) => {}
                    }
                }
                result
            }
            ProductExpr::Or(parts) => {
                let mut result = Some(false);
                for part in parts {
                    match part.eval(row, mapped) {
                        Some(true) => return Some(true),
                        None => result = None,
                        Some(false) => {}
                    }
                }
                result
            }
            ProductExpr::Not(inner) => inner.eval(row, mapped).map(|b| !b),
        }
    }
}

fn related(product: &Product, relation: Relation, ids: &[i64], featured: Option<bool>) -> bool {
    let accepts = |id: i64, is_featured: bool| {
        (ids.is_empty() || ids.contains(&id)) && featured.map_or(true, |f| f == is_featured)
    };
    match relation {
        Relation::Categories => product
            .categories
            .iter()
            .any(|c| accepts(c.category_id, c.is_featured_product)),
        Relation::Manufacturers => product
            .manufacturers
            .iter()
            .any(|m| accepts(m.manufacturer_id, m.is_featured_product)),
        Relation::Tags => product.tag_ids.iter().any(|id| accepts(*id, false)),
    }
}

/// Open special-price window at `now`: start and end are exclusive
pub fn special_price_window_open(now: DateTime<Utc>) -> ProductExpr {
    ProductExpr::all(vec![
        ProductExpr::is_not_null(Column::SpecialPrice),
        ProductExpr::any(vec![
            ProductExpr::IsNull(Column::SpecialPriceStart),
            ProductExpr::compare(Column::SpecialPriceStart, CompareOp::Lt, now),
        ]),
        ProductExpr::any(vec![
            ProductExpr::IsNull(Column::SpecialPriceEnd),
            ProductExpr::compare(Column::SpecialPriceEnd, CompareOp::Gt, now),
        ]),
    ])
}

/// Compare the active price: the special price inside an open window,
/// otherwise the regular price
pub fn active_price_compare(now: DateTime<Utc>, op: CompareOp, value: f64) -> ProductExpr {
    ProductExpr::any(vec![
        ProductExpr::all(vec![
            special_price_window_open(now),
            ProductExpr::compare(Column::SpecialPrice, op, value),
        ]),
        ProductExpr::all(vec![
            special_price_window_open(now).negate(),
            ProductExpr::compare(Column::Price, op, value),
        ]),
    ])
}

/// Whether the product can be ordered, given its inventory method
pub fn availability() -> ProductExpr {
    use crate::catalog::{BackorderMode, ManageInventoryMethod};

    ProductExpr::any(vec![
        ProductExpr::equals(
            Column::ManageInventory,
            ManageInventoryMethod::DontManageStock.id(),
        ),
        ProductExpr::all(vec![
            ProductExpr::equals(Column::ManageInventory, ManageInventoryMethod::ManageStock.id()),
            ProductExpr::any(vec![
                ProductExpr::compare(Column::StockQuantity, CompareOp::Gt, 0i64),
                ProductExpr::compare(
                    Column::BackorderMode,
                    CompareOp::Ne,
                    BackorderMode::NoBackorders.id(),
                ),
            ]),
        ]),
        ProductExpr::all(vec![
            ProductExpr::equals(
                Column::ManageInventory,
                ManageInventoryMethod::ManageStockByAttributes.id(),
            ),
            ProductExpr::equals(Column::AnyCombinationAvailable, true),
        ]),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn unmapped(_: Column, _: i64, _: i64) -> bool {
        false
    }

    #[test]
    fn test_null_comparison_is_unknown() {
        let product = Product::new(1, "Lamp", 10.0);
        let row = ProductRow::new(&product);
        let expr = ProductExpr::compare(Column::Rating, CompareOp::Ge, 3.0);
        assert_eq!(expr.eval(&row, &unmapped), None);
        assert_eq!(expr.clone().negate().eval(&row, &unmapped), None);

        let or = ProductExpr::Or(vec![expr, ProductExpr::True]);
        assert_eq!(or.eval(&row, &unmapped), Some(true));
    }

    #[test]
    fn test_active_price_disjunction() {
        let now = Utc::now();
        let in_range = ProductExpr::all(vec![
            active_price_compare(now, CompareOp::Ge, 90.0),
            active_price_compare(now, CompareOp::Le, 110.0),
        ]);

        let mut product = Product::new(1, "Lamp", 100.0);
        product.special_price = Some(50.0);
        product.special_price_end_utc = Some(now - Duration::days(1));
        assert_eq!(in_range.eval(&ProductRow::new(&product), &unmapped), Some(true));

        product.special_price_end_utc = Some(now + Duration::days(1));
        assert_eq!(in_range.eval(&ProductRow::new(&product), &unmapped), Some(false));
    }

    #[test]
    fn test_text_modes_ignore_case() {
        let product = Product::new(1, "Desk Lamp", 10.0);
        let row = ProductRow::new(&product);
        let text = |mode, term: &str| ProductExpr::Text {
            column: Column::Name,
            mode,
            term: term.to_string(),
        };
        assert_eq!(text(SearchMode::Contains, "LAMP").eval(&row, &unmapped), Some(true));
        assert_eq!(text(SearchMode::StartsWith, "lamp").eval(&row, &unmapped), Some(false));
        assert_eq!(text(SearchMode::ExactMatch, "desk lamp").eval(&row, &unmapped), Some(true));
        assert_eq!(
            ProductExpr::Text {
                column: Column::Sku,
                mode: SearchMode::Contains,
                term: "x".into()
            }
            .eval(&row, &unmapped),
            None
        );
    }

    #[test]
    fn test_related_with_featured_flag() {
        let mut product = Product::new(1, "Chair", 10.0).in_category(4, 0);
        product.categories[0].is_featured_product = true;
        let row = ProductRow::new(&product);
        let featured = |flag| ProductExpr::AnyRelated {
            relation: Relation::Categories,
            ids: vec![4],
            featured: Some(flag),
        };
        assert_eq!(featured(true).eval(&row, &unmapped), Some(true));
        assert_eq!(featured(false).eval(&row, &unmapped), Some(false));
    }
}
