//! Translation of catalog search queries into product predicates

use crate::search::catalog_query::{
    CatalogSearchQuery, ProductOrdering, DEFAULT_TERM_FIELDS, PRICE_FIELD_PREFIX,
};
use crate::search::config::SearchConfig;
use crate::search::error::{SearchError, SearchResult};
use crate::search::filter::{FilterValue, RangeSearchFilter, SearchFilter};
use crate::search::linq::expr::{
    active_price_compare, availability, Column, CompareOp, ProductExpr, Relation,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

/// One-to-many relations joined into the product rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Join {
    Categories,
    Manufacturers,
    Tags,
    StoreMappings,
    AclRecords,
    LocalizedProperties,
}

impl Join {
    /// Left joins keep products without a related row
    pub fn is_left(self) -> bool {
        matches!(
            self,
            Join::StoreMappings | Join::AclRecords | Join::LocalizedProperties
        )
    }
}

/// Outcome of translating a query
#[derive(Debug, Clone)]
pub struct Translation {
    pub predicate: ProductExpr,
    pub joins: BTreeSet<Join>,
    pub ordering: Vec<ProductOrdering>,
}

impl Translation {
    pub fn grouping_required(&self) -> bool {
        !self.joins.is_empty()
    }
}

/// Translate filters, term and sorting of `query` evaluated at `now`
pub fn translate(
    query: &CatalogSearchQuery,
    config: &SearchConfig,
    now: DateTime<Utc>,
) -> SearchResult<Translation> {
    let mut translator = Translator {
        config,
        now,
        joins: BTreeSet::new(),
    };

    let mut parts = vec![
        ProductExpr::equals(Column::Deleted, false),
        ProductExpr::equals(Column::SystemProduct, false),
    ];
    if let Some(term) = translator.term(query) {
        parts.push(term);
    }
    for filter in &query.filters {
        if let Some(expr) = translator.filter(filter, false)? {
            parts.push(expr);
        }
    }

    Ok(Translation {
        predicate: ProductExpr::all(parts),
        joins: translator.joins,
        ordering: query.resolve_ordering(false),
    })
}

struct Translator<'a> {
    config: &'a SearchConfig,
    now: DateTime<Utc>,
    joins: BTreeSet<Join>,
}

impl Translator<'_> {
    fn term(&mut self, query: &CatalogSearchQuery) -> Option<ProductExpr> {
        let term = query.term.as_deref().map(str::trim).filter(|t| !t.is_empty())?;
        let fields: Vec<&str> = if query.fields.is_empty() {
            DEFAULT_TERM_FIELDS.to_vec()
        } else {
            query.fields.iter().map(String::as_str).collect()
        };

        let mut columns = Vec::new();
        for field in fields {
            match field.to_lowercase().as_str() {
                "name" => {
                    columns.push(Column::Name);
                    if query.language_id != 0 {
                        columns.push(Column::LocalizedName);
                    }
                }
                "shortdescription" => {
                    columns.push(Column::ShortDescription);
                    if query.language_id != 0 {
                        columns.push(Column::LocalizedShortDescription);
                    }
                }
                "fulldescription" => columns.push(Column::FullDescription),
                "sku" => columns.push(Column::Sku),
                other => tracing::warn!(field = other, "Ignoring unsupported term field"),
            }
        }
        if columns.is_empty() {
            return None;
        }
        if columns
            .iter()
            .any(|c| matches!(c, Column::LocalizedName | Column::LocalizedShortDescription))
        {
            self.joins.insert(Join::LocalizedProperties);
        }

        Some(ProductExpr::any(
            columns
                .into_iter()
                .map(|column| ProductExpr::Text {
                    column,
                    mode: query.mode,
                    term: term.to_string(),
                })
                .collect(),
        ))
    }

    /// Translate one filter. Equality on a relation or side table is an
    /// existence test per filter, so stacked filters on one relation and
    /// "no mapping" alternatives never share a joined row.
    fn filter(&mut self, filter: &SearchFilter, negated: bool) -> SearchResult<Option<ProductExpr>> {
        let negated = negated || filter.is_forbidden();
        let expr = match filter {
            SearchFilter::Attribute(a) => self.equality(&a.field_name, &a.term)?,
            SearchFilter::Range(r) => self.range(r, negated)?,
            SearchFilter::Combined(c) => {
                let mut alternatives = Vec::with_capacity(c.filters.len());
                for child in &c.filters {
                    if let Some(expr) = self.filter(child, negated)? {
                        alternatives.push(expr);
                    }
                }
                (!alternatives.is_empty()).then(|| ProductExpr::any(alternatives))
            }
        };
        Ok(expr.map(|e| if filter.is_forbidden() { e.negate() } else { e }))
    }

    fn equality(&self, field: &str, term: &FilterValue) -> SearchResult<Option<ProductExpr>> {
        if let Some((relation, featured)) = relation_field(field) {
            let id = id_term(field, term)?;
            if id == 0 {
                return Ok(Some(any_related(relation, Vec::new(), featured).negate()));
            }
            return Ok(Some(any_related(relation, vec![id], featured)));
        }

        match field {
            "storeid" | "roleid" => {
                let id = id_term(field, term)?;
                let (column, switch) = if field == "storeid" {
                    (Column::StoreId, Column::LimitedToStores)
                } else {
                    (Column::RoleId, Column::SubjectToAcl)
                };
                if id == 0 {
                    return Ok(Some(ProductExpr::equals(switch, false)));
                }
                Ok(Some(ProductExpr::AnyMapped {
                    column,
                    ids: vec![id],
                }))
            }
            "available" => {
                let available = term.as_bool().ok_or_else(|| {
                    SearchError::invalid_argument("available expects a boolean term")
                })?;
                Ok(Some(if available {
                    availability()
                } else {
                    availability().negate()
                }))
            }
            _ if field.starts_with(PRICE_FIELD_PREFIX) => {
                let value = self.price_value(field, term)?;
                Ok(Some(active_price_compare(self.now, CompareOp::Eq, value)))
            }
            _ => Ok(column_for(field).map(|column| ProductExpr::equals(column, term.clone()))),
        }
    }

    fn range(&mut self, range: &RangeSearchFilter, negated: bool) -> SearchResult<Option<ProductExpr>> {
        let field = range.field_name.as_str();

        if let Some((relation, featured)) = relation_field(field) {
            let any_mapping = range.upper_term.is_none()
                && range
                    .term
                    .as_ref()
                    .map_or(true, |v| v.as_i64() == Some(0) && !range.includes_lower);
            if any_mapping {
                return Ok(Some(any_related(relation, Vec::new(), featured)));
            }
            if negated {
                tracing::warn!(field, "Ignoring excluded id range on a relation");
                return Ok(None);
            }
            let (join, id_column, _) = relation_columns(relation);
            self.joins.insert(join);
            return Ok(Some(ProductExpr::all(bounds(id_column, range))));
        }

        match field {
            "availablestart" | "availableend" => {
                let column = if field == "availablestart" {
                    Column::AvailableStart
                } else {
                    Column::AvailableEnd
                };
                Ok(Some(ProductExpr::any(vec![
                    ProductExpr::IsNull(column),
                    ProductExpr::all(bounds(column, range)),
                ])))
            }
            _ if field.starts_with(PRICE_FIELD_PREFIX) => {
                let mut parts = Vec::new();
                if let Some(lower) = &range.term {
                    let value = self.price_value(field, lower)?;
                    parts.push(active_price_compare(
                        self.now,
                        CompareOp::lower(range.includes_lower),
                        value,
                    ));
                }
                if let Some(upper) = &range.upper_term {
                    let value = self.price_value(field, upper)?;
                    parts.push(active_price_compare(
                        self.now,
                        CompareOp::upper(range.includes_upper),
                        value,
                    ));
                }
                Ok(Some(ProductExpr::all(parts)))
            }
            "storeid" | "roleid" | "available" => {
                tracing::warn!(field, "Ignoring range on a non-ordered field");
                Ok(None)
            }
            _ => Ok(column_for(field).map(|column| ProductExpr::all(bounds(column, range)))),
        }
    }

    /// Price term converted back to the primary currency
    fn price_value(&self, field: &str, term: &FilterValue) -> SearchResult<f64> {
        let code = &field[PRICE_FIELD_PREFIX.len()..];
        let rate = self.config.resolve_rate(Some(code))?;
        let value = term
            .as_f64()
            .ok_or_else(|| SearchError::invalid_argument(format!("{} expects a number", field)))?;
        Ok(value / rate)
    }
}

fn bounds(column: Column, range: &RangeSearchFilter) -> Vec<ProductExpr> {
    let mut parts = Vec::with_capacity(2);
    if let Some(lower) = &range.term {
        parts.push(ProductExpr::compare(
            column,
            CompareOp::lower(range.includes_lower),
            lower.clone(),
        ));
    }
    if let Some(upper) = &range.upper_term {
        parts.push(ProductExpr::compare(
            column,
            CompareOp::upper(range.includes_upper),
            upper.clone(),
        ));
    }
    parts
}

fn any_related(relation: Relation, ids: Vec<i64>, featured: Option<bool>) -> ProductExpr {
    ProductExpr::AnyRelated {
        relation,
        ids,
        featured,
    }
}

fn id_term(field: &str, term: &FilterValue) -> SearchResult<i64> {
    term.as_i64()
        .ok_or_else(|| SearchError::invalid_argument(format!("{} expects an id", field)))
}

fn relation_field(field: &str) -> Option<(Relation, Option<bool>)> {
    match field {
        "categoryid" => Some((Relation::Categories, None)),
        "featuredcategoryid" => Some((Relation::Categories, Some(true))),
        "notfeaturedcategoryid" => Some((Relation::Categories, Some(false))),
        "manufacturerid" => Some((Relation::Manufacturers, None)),
        "featuredmanufacturerid" => Some((Relation::Manufacturers, Some(true))),
        "notfeaturedmanufacturerid" => Some((Relation::Manufacturers, Some(false))),
        "tagid" => Some((Relation::Tags, None)),
        _ => None,
    }
}

fn relation_columns(relation: Relation) -> (Join, Column, Column) {
    match relation {
        Relation::Categories => (Join::Categories, Column::CategoryId, Column::CategoryFeatured),
        Relation::Manufacturers => (
            Join::Manufacturers,
            Column::ManufacturerId,
            Column::ManufacturerFeatured,
        ),
        // Tags carry no featured flag
        Relation::Tags => (Join::Tags, Column::TagId, Column::TagId),
    }
}

fn column_for(field: &str) -> Option<Column> {
    let column = match field {
        "id" => Column::Id,
        "parentid" => Column::ParentId,
        "typeid" => Column::TypeId,
        "visibility" => Column::Visibility,
        "conditionid" => Column::ConditionId,
        "deliveryid" => Column::DeliveryId,
        "stockquantity" => Column::StockQuantity,
        "displayorder" => Column::DisplayOrder,
        "published" => Column::Published,
        "showonhomepage" => Column::ShowOnHomePage,
        "download" => Column::Download,
        "recurring" => Column::Recurring,
        "shipenabled" => Column::ShipEnabled,
        "shipfree" => Column::ShipFree,
        "taxexempt" => Column::TaxExempt,
        "esd" => Column::Esd,
        "discount" => Column::Discount,
        "createdon" => Column::CreatedOn,
        "availablestart" => Column::AvailableStart,
        "availableend" => Column::AvailableEnd,
        "rating" => Column::Rating,
        "name" => Column::Name,
        "sku" => Column::Sku,
        other => {
            tracing::warn!(field = other, "Ignoring filter on unknown field");
            return None;
        }
    };
    Some(column)
}
