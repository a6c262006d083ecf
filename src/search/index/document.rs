//! Product documents and the catalog index schema

use crate::catalog::Product;
use crate::search::catalog_query::price_field_name;
use crate::search::config::CurrencyConfig;
use crate::search::facets::FacetProjection;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;
use tantivy::schema::*;
use tantivy::TantivyDocument;

/// Single-valued integer fields
pub const INT_FIELDS: [&str; 8] = [
    "id",
    "parentid",
    "typeid",
    "visibility",
    "conditionid",
    "deliveryid",
    "stockquantity",
    "displayorder",
];

/// Multi-valued id fields; `0` stands for "no mapping"
pub const RELATION_FIELDS: [&str; 9] = [
    "categoryid",
    "featuredcategoryid",
    "notfeaturedcategoryid",
    "manufacturerid",
    "featuredmanufacturerid",
    "notfeaturedmanufacturerid",
    "tagid",
    "storeid",
    "roleid",
];

pub const BOOL_FIELDS: [&str; 10] = [
    "published",
    "showonhomepage",
    "available",
    "download",
    "recurring",
    "shipenabled",
    "shipfree",
    "taxexempt",
    "esd",
    "discount",
];

pub const DATE_FIELDS: [&str; 3] = ["createdon", "availablestart", "availableend"];

/// Stored `category:order` pairs used for relevance ordering
pub const CATEGORY_ORDER_FIELD: &str = "categoryorder";
pub const MANUFACTURER_ORDER_FIELD: &str = "manufacturerorder";

/// Build the catalog schema with one price field per currency
pub fn build_catalog_schema(currencies: &[CurrencyConfig]) -> Schema {
    let mut schema_builder = Schema::builder();

    for name in INT_FIELDS.iter().chain(RELATION_FIELDS.iter()) {
        schema_builder.add_i64_field(name, INDEXED | STORED | FAST);
    }
    for name in BOOL_FIELDS {
        schema_builder.add_bool_field(name, INDEXED | STORED | FAST);
    }
    for name in DATE_FIELDS {
        schema_builder.add_date_field(name, INDEXED | STORED | FAST);
    }

    // Average rating, only present for reviewed products
    schema_builder.add_f64_field("rating", INDEXED | STORED | FAST);

    // Regular price in the primary currency, used for sorting
    schema_builder.add_f64_field("price", INDEXED | STORED | FAST);
    for currency in currencies {
        schema_builder.add_f64_field(&price_field_name(&currency.code), INDEXED | STORED | FAST);
    }

    // Full-text fields
    schema_builder.add_text_field("name", TEXT | STORED);
    schema_builder.add_text_field("shortdescription", TEXT | STORED);
    schema_builder.add_text_field("fulldescription", TEXT);

    // SKU, lowercased and matched as a whole
    schema_builder.add_text_field("sku", STRING | STORED);

    schema_builder.add_text_field(CATEGORY_ORDER_FIELD, STORED);
    schema_builder.add_text_field(MANUFACTURER_ORDER_FIELD, STORED);

    schema_builder.build()
}

/// Lower bound stored for a missing availability start
pub fn open_start() -> DateTime<Utc> {
    DateTime::<Utc>::default()
}

/// Upper bound stored for a missing availability end
///
/// Must stay inside the nanosecond range tantivy dates can hold.
pub fn open_end() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2200, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_default()
}

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Convert to a tantivy date, saturating at the bounds of its nanosecond range
pub fn to_tantivy_date(value: DateTime<Utc>) -> tantivy::DateTime {
    let secs = value
        .timestamp()
        .clamp(i64::MIN / NANOS_PER_SEC, i64::MAX / NANOS_PER_SEC);
    tantivy::DateTime::from_timestamp_secs(secs)
}

pub fn from_tantivy_date(value: tantivy::DateTime) -> DateTime<Utc> {
    DateTime::from_timestamp(value.into_timestamp_secs(), 0).unwrap_or_default()
}

/// A product flattened into index fields
#[derive(Debug, Clone)]
pub struct ProductDocument<'a> {
    pub product: &'a Product,
    /// Store ids when the product is limited to stores
    pub store_ids: &'a [i64],
    /// Customer role ids when the product is subject to ACL
    pub role_ids: &'a [i64],
    /// Active price per currency code
    pub prices: Vec<(String, f64)>,
}

impl<'a> ProductDocument<'a> {
    pub fn new(
        product: &'a Product,
        store_ids: &'a [i64],
        role_ids: &'a [i64],
        currencies: &[CurrencyConfig],
        now: DateTime<Utc>,
    ) -> Self {
        let active_price = product.active_price(now);
        Self {
            product,
            store_ids,
            role_ids,
            prices: currencies
                .iter()
                .map(|c| (price_field_name(&c.code), active_price * c.rate))
                .collect(),
        }
    }

    pub fn to_tantivy_doc(&self, schema: &Schema) -> TantivyDocument {
        let p = self.product;
        let mut doc = TantivyDocument::new();

        let add_i64 = |doc: &mut TantivyDocument, name: &str, value: i64| {
            if let Ok(field) = schema.get_field(name) {
                doc.add_i64(field, value);
            }
        };

        add_i64(&mut doc, "id", p.id);
        add_i64(&mut doc, "parentid", p.parent_grouped_product_id);
        add_i64(&mut doc, "typeid", p.product_type.id());
        add_i64(&mut doc, "visibility", p.visibility.id());
        add_i64(&mut doc, "conditionid", p.condition.id());
        if let Some(delivery_time_id) = p.delivery_time_id {
            add_i64(&mut doc, "deliveryid", delivery_time_id);
        }
        add_i64(&mut doc, "stockquantity", i64::from(p.stock_quantity));
        add_i64(&mut doc, "displayorder", i64::from(p.display_order));

        let categories = |featured: Option<bool>| -> Vec<i64> {
            p.categories
                .iter()
                .filter(|c| featured.map_or(true, |f| c.is_featured_product == f))
                .map(|c| c.category_id)
                .collect()
        };
        let manufacturers = |featured: Option<bool>| -> Vec<i64> {
            p.manufacturers
                .iter()
                .filter(|m| featured.map_or(true, |f| m.is_featured_product == f))
                .map(|m| m.manufacturer_id)
                .collect()
        };
        let relations: [(&str, Vec<i64>); 9] = [
            ("categoryid", categories(None)),
            ("featuredcategoryid", categories(Some(true))),
            ("notfeaturedcategoryid", categories(Some(false))),
            ("manufacturerid", manufacturers(None)),
            ("featuredmanufacturerid", manufacturers(Some(true))),
            ("notfeaturedmanufacturerid", manufacturers(Some(false))),
            ("tagid", p.tag_ids.clone()),
            (
                "storeid",
                if p.limited_to_stores {
                    self.store_ids.to_vec()
                } else {
                    Vec::new()
                },
            ),
            (
                "roleid",
                if p.subject_to_acl {
                    self.role_ids.to_vec()
                } else {
                    Vec::new()
                },
            ),
        ];
        for (name, ids) in relations {
            // Unrestricted store/ACL and missing mappings are indexed as 0
            let unrestricted = match name {
                "storeid" => !p.limited_to_stores,
                "roleid" => !p.subject_to_acl,
                _ => ids.is_empty(),
            };
            if unrestricted {
                add_i64(&mut doc, name, 0);
            }
            for id in ids {
                add_i64(&mut doc, name, id);
            }
        }

        let flags = [
            ("published", p.published),
            ("showonhomepage", p.show_on_home_page),
            ("available", p.is_available()),
            ("download", p.is_download),
            ("recurring", p.is_recurring),
            ("shipenabled", p.is_ship_enabled),
            ("shipfree", p.is_free_shipping),
            ("taxexempt", p.is_tax_exempt),
            ("esd", p.is_esd),
            ("discount", p.has_discounts_applied),
        ];
        for (name, value) in flags {
            if let Ok(field) = schema.get_field(name) {
                doc.add_bool(field, value);
            }
        }

        let dates = [
            ("createdon", p.created_on_utc),
            ("availablestart", p.available_start_utc.unwrap_or_else(open_start)),
            ("availableend", p.available_end_utc.unwrap_or_else(open_end)),
        ];
        for (name, value) in dates {
            if let Ok(field) = schema.get_field(name) {
                doc.add_date(field, to_tantivy_date(value));
            }
        }

        if let (Some(rating), Ok(field)) = (p.average_rating(), schema.get_field("rating")) {
            doc.add_f64(field, rating);
        }
        if let Ok(field) = schema.get_field("price") {
            doc.add_f64(field, p.price);
        }
        for (name, price) in &self.prices {
            if let Ok(field) = schema.get_field(name) {
                doc.add_f64(field, *price);
            }
        }

        if let Ok(field) = schema.get_field("name") {
            doc.add_text(field, &p.name);
        }
        if let (Some(text), Ok(field)) = (&p.short_description, schema.get_field("shortdescription")) {
            doc.add_text(field, text);
        }
        if let (Some(text), Ok(field)) = (&p.full_description, schema.get_field("fulldescription")) {
            doc.add_text(field, text);
        }
        if let (Some(sku), Ok(field)) = (&p.sku, schema.get_field("sku")) {
            doc.add_text(field, sku.to_lowercase());
        }

        if let Ok(field) = schema.get_field(CATEGORY_ORDER_FIELD) {
            for c in &p.categories {
                doc.add_text(field, format!("{}:{}", c.category_id, c.display_order));
            }
        }
        if let Ok(field) = schema.get_field(MANUFACTURER_ORDER_FIELD) {
            for m in &p.manufacturers {
                doc.add_text(field, format!("{}:{}", m.manufacturer_id, m.display_order));
            }
        }

        doc
    }
}

/// Values read back from a stored document
#[derive(Debug, Clone, Default)]
pub struct StoredProduct {
    pub id: i64,
    pub name: String,
    pub price: f64,
    pub display_order: i64,
    pub created_on: DateTime<Utc>,
    pub category_orders: HashMap<i64, i64>,
    pub manufacturer_orders: HashMap<i64, i64>,
    pub projection: FacetProjection,
}

impl StoredProduct {
    /// Read a stored document; `price_field` is the price of the query currency
    pub fn from_doc(doc: &TantivyDocument, schema: &Schema, price_field: &str) -> Self {
        let first_i64 = |name: &str| {
            schema
                .get_field(name)
                .ok()
                .and_then(|field| doc.get_first(field).and_then(|v| v.as_i64()))
        };
        let all_ids = |name: &str| -> Vec<i64> {
            schema
                .get_field(name)
                .ok()
                .map(|field| {
                    doc.get_all(field)
                        .filter_map(|v| v.as_i64())
                        .filter(|id| *id != 0)
                        .collect()
                })
                .unwrap_or_default()
        };
        let first_f64 = |name: &str| {
            schema
                .get_field(name)
                .ok()
                .and_then(|field| doc.get_first(field).and_then(|v| v.as_f64()))
        };
        let first_date = |name: &str| {
            schema
                .get_field(name)
                .ok()
                .and_then(|field| doc.get_first(field).and_then(|v| v.as_datetime()))
                .map(from_tantivy_date)
        };
        let orders = |name: &str| -> HashMap<i64, i64> {
            schema
                .get_field(name)
                .ok()
                .map(|field| {
                    doc.get_all(field)
                        .filter_map(|v| v.as_str())
                        .filter_map(|pair| {
                            let (id, order) = pair.split_once(':')?;
                            Some((id.parse().ok()?, order.parse().ok()?))
                        })
                        .collect()
                })
                .unwrap_or_default()
        };

        let created_on = first_date("createdon").unwrap_or_default();
        let available = schema
            .get_field("available")
            .ok()
            .and_then(|field| doc.get_first(field).and_then(|v| v.as_bool()))
            .unwrap_or(false);
        let name = schema
            .get_field("name")
            .ok()
            .and_then(|field| doc.get_first(field).and_then(|v| v.as_str()))
            .unwrap_or_default()
            .to_string();

        Self {
            id: first_i64("id").unwrap_or_default(),
            name,
            price: first_f64("price").unwrap_or_default(),
            display_order: first_i64("displayorder").unwrap_or_default(),
            created_on,
            category_orders: orders(CATEGORY_ORDER_FIELD),
            manufacturer_orders: orders(MANUFACTURER_ORDER_FIELD),
            projection: FacetProjection {
                category_ids: all_ids("categoryid"),
                manufacturer_ids: all_ids("manufacturerid"),
                delivery_time_id: first_i64("deliveryid"),
                rating: first_f64("rating"),
                price: first_f64(price_field).unwrap_or_default(),
                available,
                created_on,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_has_filter_fields() {
        let schema = build_catalog_schema(&[CurrencyConfig::new("EUR", 0.9)]);
        for name in INT_FIELDS
            .iter()
            .chain(RELATION_FIELDS.iter())
            .chain(BOOL_FIELDS.iter())
            .chain(DATE_FIELDS.iter())
        {
            assert!(schema.get_field(name).is_ok(), "missing {}", name);
        }
        assert!(schema.get_field("price_c-eur").is_ok());
        assert!(schema.get_field("price_c-usd").is_err());
    }

    #[test]
    fn test_document_round_trip() {
        let currencies = [CurrencyConfig::new("USD", 1.0), CurrencyConfig::new("EUR", 0.5)];
        let schema = build_catalog_schema(&currencies);
        let mut product = Product::new(7, "Desk Lamp", 40.0).in_category(3, 2);
        product.special_price = Some(30.0);
        product.sku = Some("DL-7".into());

        let doc = ProductDocument::new(&product, &[], &[], &currencies, Utc::now())
            .to_tantivy_doc(&schema);
        let stored = StoredProduct::from_doc(&doc, &schema, "price_c-eur");

        assert_eq!(stored.id, 7);
        assert_eq!(stored.price, 40.0);
        assert_eq!(stored.projection.price, 15.0);
        assert_eq!(stored.projection.category_ids, vec![3]);
        assert!(stored.projection.manufacturer_ids.is_empty());
        assert_eq!(stored.category_orders.get(&3), Some(&2));
    }

    #[test]
    fn test_open_availability_end_is_indexable() {
        let schema = build_catalog_schema(&[]);
        let product = Product::new(1, "Desk Lamp", 10.0);
        assert!(product.available_end_utc.is_none());

        let doc = ProductDocument::new(&product, &[], &[], &[], Utc::now()).to_tantivy_doc(&schema);
        let field = schema.get_field("availableend").unwrap();
        let stored = doc.get_first(field).and_then(|v| v.as_datetime()).unwrap();
        assert_eq!(from_tantivy_date(stored), open_end());
        assert!(open_end() > Utc::now());
    }

    #[test]
    fn test_extreme_dates_saturate() {
        let far_future = DateTime::<Utc>::MAX_UTC;
        let far_past = DateTime::<Utc>::MIN_UTC;

        let high = to_tantivy_date(far_future).into_timestamp_secs();
        let low = to_tantivy_date(far_past).into_timestamp_secs();
        assert_eq!(high, i64::MAX / NANOS_PER_SEC);
        assert_eq!(low, i64::MIN / NANOS_PER_SEC);

        let schema = build_catalog_schema(&[]);
        let mut product = Product::new(2, "Old Chair", 10.0);
        product.created_on_utc = far_future;
        let doc = ProductDocument::new(&product, &[], &[], &[], Utc::now()).to_tantivy_doc(&schema);
        let field = schema.get_field("createdon").unwrap();
        assert!(doc.get_first(field).and_then(|v| v.as_datetime()).is_some());
    }
}
