//! Execution of translated product queries over an in-memory product set

use crate::catalog::Product;
use crate::search::catalog_query::{ProductOrdering, ProductSortKey};
use crate::search::linq::expr::{Column, LocalizedText, ProductExpr, ProductRow};
use crate::search::linq::translate::{Join, Translation};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};

/// A translated query bound to its product source
#[derive(Debug, Clone)]
pub struct PreparedProductQuery {
    pub predicate: ProductExpr,
    pub joins: BTreeSet<Join>,
    pub grouping_required: bool,
    pub ordering: Vec<ProductOrdering>,
    products: Vec<Product>,
    store_mappings: HashMap<i64, Vec<i64>>,
    acl_roles: HashMap<i64, Vec<i64>>,
    localized: HashMap<i64, Vec<LocalizedText>>,
}

impl PreparedProductQuery {
    pub fn new(translation: Translation, products: Vec<Product>) -> Self {
        let grouping_required = translation.grouping_required();
        Self {
            predicate: translation.predicate,
            joins: translation.joins,
            grouping_required,
            ordering: translation.ordering,
            products,
            store_mappings: HashMap::new(),
            acl_roles: HashMap::new(),
            localized: HashMap::new(),
        }
    }

    /// Store ids by product id
    pub fn with_store_mappings(mut self, mappings: HashMap<i64, Vec<i64>>) -> Self {
        self.store_mappings = mappings;
        self
    }

    /// Customer role ids by product id
    pub fn with_acl_roles(mut self, roles: HashMap<i64, Vec<i64>>) -> Self {
        self.acl_roles = roles;
        self
    }

    /// Localized texts by product id
    pub fn with_localized(mut self, localized: HashMap<i64, Vec<LocalizedText>>) -> Self {
        self.localized = localized;
        self
    }

    pub fn source_len(&self) -> usize {
        self.products.len()
    }

    /// Number of joined rows passing the predicate, before grouping
    pub fn raw_row_count(&self) -> usize {
        self.matching_rows().len()
    }

    /// Matching products, grouped and ordered
    pub fn products(&self) -> Vec<&Product> {
        let mut products: Vec<&Product> = if self.grouping_required {
            let mut seen = HashSet::new();
            self.matching_rows()
                .into_iter()
                .filter(|row| seen.insert(row.product.id))
                .map(|row| row.product)
                .collect()
        } else {
            self.matching_rows().into_iter().map(|row| row.product).collect()
        };

        products.sort_by(|a, b| {
            self.ordering
                .iter()
                .map(|o| compare_products(a, b, o))
                .find(|ordering| *ordering != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        products
    }

    pub fn count(&self) -> usize {
        self.products().len()
    }

    /// Ids of all matches in result order
    pub fn ids(&self) -> Vec<i64> {
        self.products().into_iter().map(|p| p.id).collect()
    }

    /// Ids of one page
    pub fn page(&self, skip: usize, take: usize) -> Vec<i64> {
        self.products()
            .into_iter()
            .skip(skip)
            .take(take)
            .map(|p| p.id)
            .collect()
    }

    fn matching_rows(&self) -> Vec<ProductRow<'_>> {
        let lookup = |column: Column, product_id: i64, id: i64| {
            let table = match column {
                Column::StoreId => &self.store_mappings,
                Column::RoleId => &self.acl_roles,
                _ => return false,
            };
            table.get(&product_id).map_or(false, |ids| ids.contains(&id))
        };

        self.products
            .iter()
            .flat_map(|product| self.rows(product))
            .filter(|row| self.predicate.eval(row, &lookup) == Some(true))
            .collect()
    }

    /// Cross product of the joined relations of one product
    fn rows<'a>(&'a self, product: &'a Product) -> Vec<ProductRow<'a>> {
        let mut rows = vec![ProductRow::new(product)];
        for join in &self.joins {
            rows = match join {
                Join::Categories => expand(rows, &product.categories, |row, c| row.category = Some(c)),
                Join::Manufacturers => {
                    expand(rows, &product.manufacturers, |row, m| row.manufacturer = Some(m))
                }
                Join::Tags => expand(rows, &product.tag_ids, |row, id| row.tag_id = Some(*id)),
                Join::StoreMappings => expand_left(
                    rows,
                    self.store_mappings.get(&product.id),
                    |row, id| row.store_id = Some(*id),
                ),
                Join::AclRecords => expand_left(
                    rows,
                    self.acl_roles.get(&product.id),
                    |row, id| row.role_id = Some(*id),
                ),
                Join::LocalizedProperties => expand_left(
                    rows,
                    self.localized.get(&product.id),
                    |row, text| row.localized = Some(text),
                ),
            };
        }
        rows
    }
}

fn expand<'a, T>(
    rows: Vec<ProductRow<'a>>,
    related: &'a [T],
    set: impl Fn(&mut ProductRow<'a>, &'a T),
) -> Vec<ProductRow<'a>> {
    let mut expanded = Vec::with_capacity(rows.len() * related.len());
    for row in rows {
        for item in related {
            let mut joined = row;
            set(&mut joined, item);
            expanded.push(joined);
        }
    }
    expanded
}

fn expand_left<'a, T>(
    rows: Vec<ProductRow<'a>>,
    related: Option<&'a Vec<T>>,
    set: impl Fn(&mut ProductRow<'a>, &'a T),
) -> Vec<ProductRow<'a>> {
    match related {
        Some(items) if !items.is_empty() => expand(rows, items, set),
        _ => rows,
    }
}

fn compare_products(a: &Product, b: &Product, ordering: &ProductOrdering) -> Ordering {
    let result = match ordering.key {
        ProductSortKey::CategoryOrder(id) => category_order(a, id).cmp(&category_order(b, id)),
        ProductSortKey::ManufacturerOrder(id) => {
            manufacturer_order(a, id).cmp(&manufacturer_order(b, id))
        }
        ProductSortKey::Score => Ordering::Equal,
        ProductSortKey::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
        ProductSortKey::Price => a.price.partial_cmp(&b.price).unwrap_or(Ordering::Equal),
        ProductSortKey::CreatedOn => a.created_on_utc.cmp(&b.created_on_utc),
        ProductSortKey::DisplayOrder => a.display_order.cmp(&b.display_order),
        ProductSortKey::Id => a.id.cmp(&b.id),
    };
    if ordering.descending {
        result.reverse()
    } else {
        result
    }
}

fn category_order(product: &Product, category_id: i64) -> i32 {
    product
        .categories
        .iter()
        .find(|c| c.category_id == category_id)
        .map_or(i32::MAX, |c| c.display_order)
}

fn manufacturer_order(product: &Product, manufacturer_id: i64) -> i32 {
    product
        .manufacturers
        .iter()
        .find(|m| m.manufacturer_id == manufacturer_id)
        .map_or(i32::MAX, |m| m.display_order)
}
