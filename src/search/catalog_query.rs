//! Product-specific query builder on top of [`SearchQuery`]

use crate::catalog::{ProductCondition, ProductType, ProductVisibility};
use crate::search::error::{SearchError, SearchResult};
use crate::search::facets::{FacetDescriptor, FacetGroupKind};
use crate::search::filter::{FilterValue, SearchFilter};
use crate::search::query::{SearchMode, SearchQuery};
use crate::search::sort::SearchSort;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::ops::{Deref, DerefMut};

/// Filter fields holding category ids
pub const CATEGORY_FIELDS: [&str; 3] = ["categoryid", "featuredcategoryid", "notfeaturedcategoryid"];

/// Filter fields holding manufacturer ids
pub const MANUFACTURER_FIELDS: [&str; 3] =
    ["manufacturerid", "featuredmanufacturerid", "notfeaturedmanufacturerid"];

/// Fields matched by a term when the query names none
pub const DEFAULT_TERM_FIELDS: [&str; 4] = ["name", "shortdescription", "fulldescription", "sku"];

/// Prefix of the per-currency price fields
pub const PRICE_FIELD_PREFIX: &str = "price_c-";

/// Name of the price field for a currency code
pub fn price_field_name(currency_code: &str) -> String {
    format!("{}{}", PRICE_FIELD_PREFIX, currency_code.to_lowercase())
}

/// Storefront product orderings
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::EnumString, strum::Display,
)]
#[strum(ascii_case_insensitive)]
pub enum ProductSorting {
    #[default]
    Relevance,
    NameAsc,
    NameDesc,
    PriceAsc,
    PriceDesc,
    CreatedOn,
    CreatedOnAsc,
}

impl ProductSorting {
    pub fn to_sort(self) -> SearchSort {
        match self {
            ProductSorting::Relevance => SearchSort::by_relevance(),
            ProductSorting::NameAsc => SearchSort::by_string_field("name", false),
            ProductSorting::NameDesc => SearchSort::by_string_field("name", true),
            ProductSorting::PriceAsc => SearchSort::by_double_field("price", false),
            ProductSorting::PriceDesc => SearchSort::by_double_field("price", true),
            ProductSorting::CreatedOn => SearchSort::by_datetime_field("createdon", true),
            ProductSorting::CreatedOnAsc => SearchSort::by_datetime_field("createdon", false),
        }
    }
}

/// Resolved product sort key, shared by both backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductSortKey {
    /// Display order of the product within a category
    CategoryOrder(i64),
    /// Display order of the product within a manufacturer
    ManufacturerOrder(i64),
    /// Full-text score (index backend only)
    Score,
    Name,
    Price,
    CreatedOn,
    DisplayOrder,
    Id,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProductOrdering {
    pub key: ProductSortKey,
    pub descending: bool,
}

/// A product search query
#[derive(Debug, Clone, Default)]
pub struct CatalogSearchQuery {
    inner: SearchQuery,
    pub currency_code: Option<String>,
    pub store_id: Option<i64>,
    pub language_id: i64,
}

impl Deref for CatalogSearchQuery {
    type Target = SearchQuery;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for CatalogSearchQuery {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

impl CatalogSearchQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Query matching `term` against `fields` (empty = name, descriptions, sku)
    pub fn with_term(fields: Vec<String>, term: impl Into<String>, mode: SearchMode) -> Self {
        Self {
            inner: SearchQuery::new(fields, Some(term.into()), mode),
            ..Default::default()
        }
    }

    pub fn base(&self) -> &SearchQuery {
        &self.inner
    }

    // Base query passthroughs

    pub fn slice(mut self, skip: i64, take: i64) -> SearchResult<Self> {
        self.inner = self.inner.slice(skip, take)?;
        Ok(self)
    }

    pub fn paged(mut self, page_index: i64, page_size: i64) -> SearchResult<Self> {
        self.inner = self.inner.paged(page_index, page_size)?;
        Ok(self)
    }

    pub fn check_spelling(
        mut self,
        max_suggestions: usize,
        min_query_length: usize,
        max_hit_count: usize,
    ) -> Self {
        self.inner = self
            .inner
            .check_spelling(max_suggestions, min_query_length, max_hit_count);
        self
    }

    pub fn build_facet_map(mut self, build: bool) -> Self {
        self.inner = self.inner.build_facet_map(build);
        self
    }

    pub fn build_hits(mut self, build: bool) -> Self {
        self.inner = self.inner.build_hits(build);
        self
    }

    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.inner = self.inner.origin(origin);
        self
    }

    pub fn with_facet(mut self, descriptor: FacetDescriptor) -> Self {
        self.inner = self.inner.with_facet(descriptor);
        self
    }

    pub fn with_filter(mut self, filter: SearchFilter) -> Self {
        self.inner.filters.push(filter);
        self
    }

    pub fn with_currency_code(mut self, currency_code: impl Into<String>) -> Self {
        self.currency_code = Some(currency_code.into());
        self
    }

    pub fn with_language_id(mut self, language_id: i64) -> Self {
        self.language_id = language_id;
        self
    }

    pub fn sort_by(mut self, sorting: ProductSorting) -> Self {
        self.inner.sorting.push(sorting.to_sort());
        self
    }

    // Visibility

    /// Published products inside their availability window, visible to
    /// anonymous customers or to one of `role_ids`
    pub fn visible_only(self, role_ids: &[i64]) -> Self {
        let now = Utc::now();
        let mut query = self
            .published_only(true)
            .with_filter(
                SearchFilter::by_range("availablestart", None, Some(now), false, false)
                    .mandatory()
                    .exact_match()
                    .not_analyzed(),
            )
            .with_filter(
                SearchFilter::by_range("availableend", Some(now), None, false, false)
                    .mandatory()
                    .exact_match()
                    .not_analyzed(),
            );

        if !role_ids.is_empty() {
            let mut roles = vec![0];
            roles.extend(role_ids.iter().copied().filter(|id| *id != 0));
            query = query.with_filter(id_group("roleid", &roles));
        }
        query
    }

    /// Visibility at most `visibility`
    pub fn with_visibility(self, visibility: ProductVisibility) -> Self {
        self.with_filter(
            SearchFilter::by_range("visibility", None, Some(visibility.id()), false, true)
                .mandatory()
                .exact_match()
                .not_analyzed(),
        )
    }

    pub fn published_only(self, value: bool) -> Self {
        self.with_filter(flag("published", value))
    }

    pub fn home_page_products_only(self, value: bool) -> Self {
        self.with_filter(flag("showonhomepage", value))
    }

    /// Only products that can currently be ordered; `false` adds nothing
    pub fn available_only(self, value: bool) -> Self {
        if value {
            self.with_filter(flag("available", true))
        } else {
            self
        }
    }

    pub fn has_parent_grouped_product(self, parent_ids: &[i64]) -> Self {
        self.with_ids("parentid", parent_ids)
    }

    /// Products of all stores plus those mapped to `store_id`
    pub fn has_store_id(mut self, store_id: i64) -> Self {
        self.store_id = Some(store_id);
        if store_id > 0 {
            self = self.with_filter(id_group("storeid", &[0, store_id]));
        }
        self
    }

    pub fn is_product_type(self, product_type: ProductType) -> Self {
        self.with_filter(id_filter("typeid", product_type.id()))
    }

    pub fn with_product_ids(self, ids: &[i64]) -> Self {
        self.with_ids("id", ids)
    }

    pub fn with_product_id(self, from_id: Option<i64>, to_id: Option<i64>) -> SearchResult<Self> {
        self.with_range("id", from_id, to_id, None, None)
    }

    // Relations

    /// Products in any of `ids`; `featured_only` narrows to featured (`Some(true)`)
    /// or non-featured (`Some(false)`) mappings
    pub fn with_category_ids(self, featured_only: Option<bool>, ids: &[i64]) -> Self {
        let field = match featured_only {
            None => "categoryid",
            Some(true) => "featuredcategoryid",
            Some(false) => "notfeaturedcategoryid",
        };
        self.with_ids(field, ids)
    }

    pub fn has_any_category(self, value: bool) -> Self {
        self.with_filter(any_relation("categoryid", value))
    }

    pub fn with_manufacturer_ids(self, featured_only: Option<bool>, ids: &[i64]) -> Self {
        let field = match featured_only {
            None => "manufacturerid",
            Some(true) => "featuredmanufacturerid",
            Some(false) => "notfeaturedmanufacturerid",
        };
        self.with_ids(field, ids)
    }

    pub fn has_any_manufacturer(self, value: bool) -> Self {
        self.with_filter(any_relation("manufacturerid", value))
    }

    pub fn with_product_tag_ids(self, ids: &[i64]) -> Self {
        self.with_ids("tagid", ids)
    }

    pub fn with_delivery_time_ids(self, ids: &[i64]) -> Self {
        self.with_ids("deliveryid", ids)
    }

    pub fn with_condition(self, condition: ProductCondition) -> Self {
        self.with_filter(id_filter("conditionid", condition.id()))
    }

    // Ranges

    pub fn with_stock_quantity(
        self,
        from: Option<i32>,
        to: Option<i32>,
        include_from: Option<bool>,
        include_to: Option<bool>,
    ) -> SearchResult<Self> {
        self.with_range(
            "stockquantity",
            from.map(i64::from),
            to.map(i64::from),
            include_from,
            include_to,
        )
    }

    /// Active price range in the query currency
    pub fn price_between(
        self,
        from: Option<f64>,
        to: Option<f64>,
        include_from: Option<bool>,
        include_to: Option<bool>,
    ) -> SearchResult<Self> {
        if from.is_none() && to.is_none() {
            return Ok(self);
        }
        let currency_code = self
            .currency_code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| {
                SearchError::invalid_argument("a currency code is required for price filters")
            })?;
        let field = price_field_name(currency_code);
        self.with_range(&field, from, to, include_from, include_to)
    }

    pub fn created_between(
        self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        include_from: Option<bool>,
        include_to: Option<bool>,
    ) -> SearchResult<Self> {
        self.with_range("createdon", from, to, include_from, include_to)
    }

    /// Average approved rating range
    pub fn with_rating(
        self,
        from: Option<f64>,
        to: Option<f64>,
        include_from: Option<bool>,
        include_to: Option<bool>,
    ) -> SearchResult<Self> {
        self.with_range("rating", from, to, include_from, include_to)
    }

    // Flags

    pub fn is_download(self, value: bool) -> Self {
        self.with_filter(flag("download", value))
    }

    pub fn is_recurring(self, value: bool) -> Self {
        self.with_filter(flag("recurring", value))
    }

    pub fn is_shipping_enabled(self, value: bool) -> Self {
        self.with_filter(flag("shipenabled", value))
    }

    pub fn is_free_shipping(self, value: bool) -> Self {
        self.with_filter(flag("shipfree", value))
    }

    pub fn is_tax_exempt(self, value: bool) -> Self {
        self.with_filter(flag("taxexempt", value))
    }

    pub fn is_esd(self, value: bool) -> Self {
        self.with_filter(flag("esd", value))
    }

    pub fn has_discount(self, value: bool) -> Self {
        self.with_filter(flag("discount", value))
    }

    // Shared rules

    fn with_ids(self, field_name: &str, ids: &[i64]) -> Self {
        let mut distinct: Vec<i64> = Vec::with_capacity(ids.len());
        for id in ids {
            if !distinct.contains(id) {
                distinct.push(*id);
            }
        }
        match distinct.as_slice() {
            [] => self,
            [id] => self.with_filter(id_filter(field_name, *id)),
            many => self.with_filter(id_group(field_name, many)),
        }
    }

    fn with_range<T>(
        self,
        field_name: &str,
        from: Option<T>,
        to: Option<T>,
        include_from: Option<bool>,
        include_to: Option<bool>,
    ) -> SearchResult<Self>
    where
        T: Into<FilterValue> + PartialOrd + Copy + std::fmt::Debug,
    {
        if from.is_none() && to.is_none() {
            return Ok(self);
        }

        if let (Some(lower), Some(upper)) = (from, to) {
            match lower.partial_cmp(&upper) {
                Some(Ordering::Equal) => {
                    let filter = SearchFilter::by_field(field_name, lower)
                        .exact_match()
                        .not_analyzed();
                    let forbidden = include_from == Some(false) && include_to == Some(false);
                    let filter = if forbidden {
                        filter.forbidden()
                    } else {
                        filter.mandatory()
                    };
                    return Ok(self.with_filter(filter));
                }
                Some(Ordering::Less) => {}
                _ => {
                    return Err(SearchError::invalid_argument(format!(
                        "{}: lower bound {:?} exceeds upper bound {:?}",
                        field_name, lower, upper
                    )))
                }
            }
        }

        let includes_lower = include_from.unwrap_or(from.is_some());
        let includes_upper = include_to.unwrap_or(to.is_some());
        Ok(self.with_filter(
            SearchFilter::by_range(field_name, from, to, includes_lower, includes_upper)
                .mandatory()
                .exact_match()
                .not_analyzed(),
        ))
    }

    // Introspection used by the backends

    /// Id of the only mandatory equality filter on one of `fields`
    pub fn single_filter_id(&self, fields: &[&str]) -> Option<i64> {
        let mut ids = self.filters.iter().filter_map(|f| match f {
            SearchFilter::Attribute(a)
                if !f.is_forbidden() && fields.contains(&a.field_name.as_str()) =>
            {
                a.term.as_i64()
            }
            _ => None,
        });
        let id = ids.next()?;
        match ids.next() {
            None if id != 0 => Some(id),
            _ => None,
        }
    }

    /// Copy of the query without the filters of a facet group, so that
    /// alternatives of a multi-select group stay countable
    pub fn without_facet_filters(&self, kind: FacetGroupKind) -> Self {
        let mut copy = self.clone();
        copy.remove_filters(&|field| kind.owns_field(field));
        copy
    }

    /// Ordering of product hits; the first key is primary.
    ///
    /// Relevance means the display order within the single filtered category
    /// or manufacturer, or the full-text score when `score_available`.
    /// Without any effective key products are ordered by display order when
    /// filtering by parent grouped product, else by id.
    pub fn resolve_ordering(&self, score_available: bool) -> Vec<ProductOrdering> {
        let mut ordering = Vec::new();

        let relevance = || {
            if let Some(id) = self.single_filter_id(&CATEGORY_FIELDS) {
                Some(ProductSortKey::CategoryOrder(id))
            } else if let Some(id) = self.single_filter_id(&MANUFACTURER_FIELDS) {
                Some(ProductSortKey::ManufacturerOrder(id))
            } else if score_available {
                Some(ProductSortKey::Score)
            } else {
                None
            }
        };

        for sort in &self.sorting {
            let key = if sort.is_relevance() {
                relevance()
            } else {
                match sort.field_name.as_str() {
                    "name" => Some(ProductSortKey::Name),
                    "price" => Some(ProductSortKey::Price),
                    "createdon" => Some(ProductSortKey::CreatedOn),
                    "id" => Some(ProductSortKey::Id),
                    other => {
                        tracing::debug!(field = other, "Ignoring unsupported sort field");
                        None
                    }
                }
            };
            if let Some(key) = key {
                let descending = match key {
                    ProductSortKey::Score => true,
                    _ => sort.descending,
                };
                ordering.push(ProductOrdering { key, descending });
            }
        }

        if ordering.is_empty() && self.sorting.is_empty() && score_available {
            ordering.push(ProductOrdering {
                key: ProductSortKey::Score,
                descending: true,
            });
        }

        if ordering.is_empty() {
            let key = if self.has_filter("parentid") {
                ProductSortKey::DisplayOrder
            } else {
                ProductSortKey::Id
            };
            ordering.push(ProductOrdering {
                key,
                descending: false,
            });
        }

        ordering
    }
}

fn flag(field_name: &str, value: bool) -> SearchFilter {
    SearchFilter::by_field(field_name, value)
        .mandatory()
        .exact_match()
        .not_analyzed()
}

fn id_filter(field_name: &str, id: i64) -> SearchFilter {
    SearchFilter::by_field(field_name, id)
        .mandatory()
        .exact_match()
        .not_analyzed()
}

fn id_group(field_name: &str, ids: &[i64]) -> SearchFilter {
    SearchFilter::combined(ids.iter().map(|id| id_filter(field_name, *id)).collect()).mandatory()
}

/// `true`: at least one mapping (id > 0); `false`: no mapping (id 0)
fn any_relation(field_name: &str, value: bool) -> SearchFilter {
    if value {
        SearchFilter::by_range(field_name, Some(0i64), None, false, false)
            .mandatory()
            .exact_match()
            .not_analyzed()
    } else {
        id_filter(field_name, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::filter::SearchFilterOccurrence;

    fn eur() -> CatalogSearchQuery {
        CatalogSearchQuery::new().with_currency_code("EUR")
    }

    #[test]
    fn test_trivial_ranges_are_noops() {
        let query = eur()
            .price_between(None, None, None, None)
            .unwrap()
            .with_stock_quantity(None, None, None, None)
            .unwrap()
            .created_between(None, None, Some(true), Some(true))
            .unwrap()
            .with_rating(None, None, None, None)
            .unwrap();
        assert!(query.filters.is_empty());
    }

    #[test]
    fn test_price_requires_currency() {
        let result = CatalogSearchQuery::new().price_between(Some(10.0), None, None, None);
        assert!(matches!(result, Err(SearchError::InvalidArgument(_))));

        let result = CatalogSearchQuery::new()
            .with_currency_code("  ")
            .price_between(Some(10.0), None, None, None);
        assert!(result.is_err());
    }

    #[test]
    fn test_price_field_and_default_inclusivity() {
        let query = eur().price_between(Some(10.0), None, None, None).unwrap();
        match &query.filters[0] {
            SearchFilter::Range(r) => {
                assert_eq!(r.field_name, "price_c-eur");
                assert!(r.includes_lower);
                assert!(!r.includes_upper);
                assert_eq!(r.upper_term, None);
            }
            other => panic!("unexpected filter {:?}", other),
        }
    }

    #[test]
    fn test_equal_bounds_collapse() {
        let query = eur().price_between(Some(20.0), Some(20.0), None, None).unwrap();
        match &query.filters[0] {
            SearchFilter::Attribute(a) => {
                assert_eq!(a.term, FilterValue::Double(20.0));
                assert_eq!(a.occurrence, SearchFilterOccurrence::Must);
            }
            other => panic!("unexpected filter {:?}", other),
        }

        let query = eur()
            .price_between(Some(20.0), Some(20.0), Some(false), Some(false))
            .unwrap();
        assert!(query.filters[0].is_forbidden());
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        let result = CatalogSearchQuery::new().with_stock_quantity(Some(5), Some(1), None, None);
        assert!(matches!(result, Err(SearchError::InvalidArgument(_))));
    }

    #[test]
    fn test_category_ids_single_and_group() {
        let query = CatalogSearchQuery::new().with_category_ids(None, &[7]);
        assert!(matches!(&query.filters[0], SearchFilter::Attribute(a) if a.field_name == "categoryid"));

        let query = CatalogSearchQuery::new().with_category_ids(Some(true), &[7, 8, 7]);
        match &query.filters[0] {
            SearchFilter::Combined(c) => {
                assert_eq!(c.filters.len(), 2);
                assert_eq!(query.filters[0].field_name(), Some("featuredcategoryid"));
            }
            other => panic!("unexpected filter {:?}", other),
        }

        let query = CatalogSearchQuery::new().with_manufacturer_ids(None, &[]);
        assert!(query.filters.is_empty());
    }

    #[test]
    fn test_visible_only_adds_role_group() {
        let query = CatalogSearchQuery::new().visible_only(&[3, 4]);
        assert_eq!(query.filters.len(), 4);
        let roles = query.filters.last().unwrap();
        assert_eq!(roles.field_name(), Some("roleid"));
        assert_eq!(roles.to_string(), "+(+roleid:0 OR +roleid:3 OR +roleid:4)");

        let anonymous = CatalogSearchQuery::new().visible_only(&[]);
        assert_eq!(anonymous.filters.len(), 3);
    }

    #[test]
    fn test_store_and_availability() {
        let query = CatalogSearchQuery::new().has_store_id(0).available_only(false);
        assert!(query.filters.is_empty());
        assert_eq!(query.store_id, Some(0));

        let query = CatalogSearchQuery::new().has_store_id(2).available_only(true);
        assert_eq!(query.filters.len(), 2);
    }

    #[test]
    fn test_resolve_ordering() {
        let query = CatalogSearchQuery::new()
            .with_category_ids(None, &[5])
            .sort_by(ProductSorting::Relevance)
            .sort_by(ProductSorting::PriceDesc);
        let ordering = query.resolve_ordering(false);
        assert_eq!(ordering[0].key, ProductSortKey::CategoryOrder(5));
        assert_eq!(
            ordering[1],
            ProductOrdering {
                key: ProductSortKey::Price,
                descending: true
            }
        );

        let grouped = CatalogSearchQuery::new().has_parent_grouped_product(&[9]);
        assert_eq!(grouped.resolve_ordering(false)[0].key, ProductSortKey::DisplayOrder);

        let plain = CatalogSearchQuery::new().sort_by(ProductSorting::Relevance);
        assert_eq!(plain.resolve_ordering(false)[0].key, ProductSortKey::Id);
        assert_eq!(plain.resolve_ordering(true)[0].key, ProductSortKey::Score);
    }

    #[test]
    fn test_without_facet_filters() {
        let query = eur()
            .with_category_ids(None, &[1, 2])
            .with_manufacturer_ids(None, &[3])
            .price_between(Some(1.0), Some(5.0), None, None)
            .unwrap();
        let reduced = query.without_facet_filters(FacetGroupKind::Category);
        assert_eq!(reduced.filters.len(), 2);
        let reduced = query.without_facet_filters(FacetGroupKind::Price);
        assert_eq!(reduced.filters.len(), 2);
        assert_eq!(query.filters.len(), 3);
    }

    #[test]
    fn test_sorting_parse() {
        assert_eq!("pricedesc".parse::<ProductSorting>().unwrap(), ProductSorting::PriceDesc);
    }
}
