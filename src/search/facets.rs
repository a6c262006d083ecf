//! Facet model and the facet assembly shared by both search backends.
//!
//! Backends project every hit of a (possibly filter-reduced) query into a
//! [`FacetProjection`]; [`assemble_facet_group`] turns those projections into a
//! [`FacetGroup`] following the per-kind visibility rules, and
//! [`finalize_facet_group`] applies publication state, ordering and the
//! choice limit once labels are known.

use crate::catalog::Product;
use crate::search::filter::FilterValue;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

/// Scope of catalog facet groups
pub const CATALOG_FACET_SCOPE: &str = "Catalog";

/// Key of the free-form price range facet
pub const CUSTOM_PRICE_FACET_KEY: &str = "custom";

/// Upper bounds of the predefined price facets
pub const PRICE_LADDER: [f64; 7] = [10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0];

/// Minimum average ratings offered as rating facets
pub const RATING_STEPS: [f64; 4] = [4.0, 3.0, 2.0, 1.0];

/// Well-known facet groups of the catalog
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FacetGroupKind {
    #[default]
    Unknown,
    Category,
    Brand,
    Price,
    Rating,
    DeliveryTime,
    Availability,
    NewArrivals,
}

impl FacetGroupKind {
    /// Kind of a facet key or filter field name
    pub fn from_key(key: &str) -> Self {
        match key {
            "categoryid" | "featuredcategoryid" | "notfeaturedcategoryid" => {
                FacetGroupKind::Category
            }
            "manufacturerid" | "featuredmanufacturerid" | "notfeaturedmanufacturerid" => {
                FacetGroupKind::Brand
            }
            "rating" => FacetGroupKind::Rating,
            "deliveryid" => FacetGroupKind::DeliveryTime,
            "available" => FacetGroupKind::Availability,
            "createdon" => FacetGroupKind::NewArrivals,
            k if k.starts_with("price") => FacetGroupKind::Price,
            _ => FacetGroupKind::Unknown,
        }
    }

    /// Whether a filter on `field_name` belongs to this group
    pub fn owns_field(self, field_name: &str) -> bool {
        self != FacetGroupKind::Unknown && FacetGroupKind::from_key(field_name) == self
    }

    /// Groups that are hidden when the query has no hits and nothing is selected
    pub fn hidden_without_hits(self) -> bool {
        matches!(
            self,
            FacetGroupKind::Category
                | FacetGroupKind::Brand
                | FacetGroupKind::Price
                | FacetGroupKind::Rating
                | FacetGroupKind::DeliveryTime
        )
    }

    /// Groups whose values are catalog entity ids
    pub fn is_entity(self) -> bool {
        matches!(
            self,
            FacetGroupKind::Category | FacetGroupKind::Brand | FacetGroupKind::DeliveryTime
        )
    }
}

/// How facet values of a group are ordered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FacetSorting {
    #[default]
    HitsDesc,
    ValueAsc,
    LabelAsc,
    DisplayOrder,
}

/// A facet value, optionally a range, with its selection state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacetValue {
    pub value: FilterValue,
    pub upper_value: Option<FilterValue>,
    pub is_range: bool,
    pub includes_lower: bool,
    pub includes_upper: bool,
    pub is_selected: bool,
    pub label: Option<String>,
    pub display_order: i32,
}

impl FacetValue {
    pub fn new(value: impl Into<FilterValue>) -> Self {
        Self {
            value: value.into(),
            upper_value: None,
            is_range: false,
            includes_lower: true,
            includes_upper: true,
            is_selected: false,
            label: None,
            display_order: 0,
        }
    }

    /// Range value; a `None` bound is open
    pub fn range(lower: Option<FilterValue>, upper: Option<FilterValue>) -> Self {
        Self {
            value: lower.unwrap_or(FilterValue::Null),
            upper_value: upper,
            is_range: true,
            includes_lower: true,
            includes_upper: true,
            is_selected: false,
            label: None,
            display_order: 0,
        }
    }

    pub fn selected(mut self, selected: bool) -> Self {
        self.is_selected = selected;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_display_order(mut self, display_order: i32) -> Self {
        self.display_order = display_order;
        self
    }

    /// Stable string key of the value
    pub fn key(&self) -> String {
        if self.is_range {
            let upper = self.upper_value.as_ref().map(|v| v.to_string()).unwrap_or_default();
            format!("{}~{}", self.value, upper)
        } else {
            self.value.to_string()
        }
    }

    fn upper_f64(&self) -> Option<f64> {
        self.upper_value.as_ref().and_then(FilterValue::as_f64)
    }
}

/// One selectable facet of a group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Facet {
    pub key: String,
    pub value: FacetValue,
    pub hit_count: u64,
    pub published: bool,
}

impl Facet {
    pub fn new(value: FacetValue, hit_count: u64) -> Self {
        Self {
            key: value.key(),
            value,
            hit_count,
            published: true,
        }
    }

    pub fn with_key(key: impl Into<String>, value: FacetValue, hit_count: u64) -> Self {
        Self {
            key: key.into(),
            value,
            hit_count,
            published: true,
        }
    }

    fn label_lower(&self) -> String {
        self.value.label.as_deref().unwrap_or_default().to_lowercase()
    }
}

/// A facet group as returned with a search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacetGroup {
    pub scope: String,
    pub key: String,
    pub label: Option<String>,
    pub kind: FacetGroupKind,
    pub is_multi_select: bool,
    pub display_order: i32,
    pub facets: Vec<Facet>,
}

impl FacetGroup {
    pub fn selected_facets(&self) -> impl Iterator<Item = &Facet> {
        self.facets.iter().filter(|f| f.value.is_selected)
    }

    pub fn has_selection(&self) -> bool {
        self.selected_facets().next().is_some()
    }
}

/// Describes a requested facet group and its current selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacetDescriptor {
    pub key: String,
    pub label: Option<String>,
    pub is_multi_select: bool,
    pub min_hit_count: u64,
    /// 0 means unlimited
    pub max_choices_count: usize,
    pub display_order: i32,
    pub order_by: FacetSorting,
    pub values: Vec<FacetValue>,
}

impl FacetDescriptor {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: None,
            is_multi_select: false,
            min_hit_count: 1,
            max_choices_count: 0,
            display_order: 0,
            order_by: FacetSorting::HitsDesc,
            values: Vec::new(),
        }
    }

    pub fn kind(&self) -> FacetGroupKind {
        FacetGroupKind::from_key(&self.key)
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn multi_select(mut self, multi_select: bool) -> Self {
        self.is_multi_select = multi_select;
        self
    }

    pub fn min_hit_count(mut self, min_hit_count: u64) -> Self {
        self.min_hit_count = min_hit_count;
        self
    }

    pub fn max_choices(mut self, max_choices_count: usize) -> Self {
        self.max_choices_count = max_choices_count;
        self
    }

    pub fn display_order(mut self, display_order: i32) -> Self {
        self.display_order = display_order;
        self
    }

    pub fn order_by(mut self, order_by: FacetSorting) -> Self {
        self.order_by = order_by;
        self
    }

    pub fn add_value(mut self, value: FacetValue) -> Self {
        self.values.push(value);
        self
    }

    pub fn selected_values(&self) -> impl Iterator<Item = &FacetValue> {
        self.values.iter().filter(|v| v.is_selected)
    }

    pub fn has_selection(&self) -> bool {
        self.selected_values().next().is_some()
    }

    fn selected_ids(&self) -> BTreeSet<i64> {
        self.selected_values().filter_map(|v| v.value.as_i64()).collect()
    }

    fn empty_group(&self) -> FacetGroup {
        FacetGroup {
            scope: CATALOG_FACET_SCOPE.to_string(),
            key: self.key.clone(),
            label: self.label.clone(),
            kind: self.kind(),
            is_multi_select: self.is_multi_select,
            display_order: self.display_order,
            facets: Vec::new(),
        }
    }
}

/// The facet-relevant attributes of one hit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FacetProjection {
    pub category_ids: Vec<i64>,
    pub manufacturer_ids: Vec<i64>,
    pub delivery_time_id: Option<i64>,
    pub rating: Option<f64>,
    /// Active price in the query currency
    pub price: f64,
    pub available: bool,
    pub created_on: DateTime<Utc>,
}

impl FacetProjection {
    /// Project a catalog product, pricing it in a currency with `rate`
    pub fn from_product(product: &Product, now: DateTime<Utc>, rate: f64) -> Self {
        Self {
            category_ids: product.categories.iter().map(|c| c.category_id).collect(),
            manufacturer_ids: product.manufacturers.iter().map(|m| m.manufacturer_id).collect(),
            delivery_time_id: product.delivery_time_id,
            rating: product.average_rating(),
            price: product.active_price(now) * rate,
            available: product.is_available(),
            created_on: product.created_on_utc,
        }
    }
}

/// Inputs of facet assembly that do not come from the hits
#[derive(Debug, Clone, Copy)]
pub struct FacetContext {
    pub now: DateTime<Utc>,
    pub new_arrivals_days: i64,
}

impl FacetContext {
    pub fn new(now: DateTime<Utc>, new_arrivals_days: i64) -> Self {
        Self {
            now,
            new_arrivals_days,
        }
    }

    pub fn new_arrivals_since(&self) -> DateTime<Utc> {
        self.now - Duration::days(self.new_arrivals_days)
    }
}

/// Round a price up to an "even" boundary: a multiple of half its order of
/// magnitude (37 -> 40, 123 -> 150, 7.3 -> 7.5). Non-positive prices map to 0.
pub fn make_price_even(price: f64) -> f64 {
    if !price.is_finite() || price <= 0.0 {
        return 0.0;
    }
    let magnitude = 10f64.powf(price.log10().floor());
    let step = magnitude / 2.0;
    // Rounding the quotient guards against 0.7 / 0.05 = 13.999...
    let quotient = ((price / step) * 1e9).round() / 1e9;
    quotient.ceil() * step
}

/// Build the facet group of one descriptor from the projected hits.
///
/// `total_hits` is the hit count of the unreduced query; `None` means the
/// group is not shown at all.
pub fn assemble_facet_group(
    descriptor: &FacetDescriptor,
    projections: &[FacetProjection],
    total_hits: usize,
    ctx: &FacetContext,
) -> Option<FacetGroup> {
    let kind = descriptor.kind();
    if kind.hidden_without_hits() && total_hits == 0 && !descriptor.has_selection() {
        return None;
    }

    let mut group = descriptor.empty_group();
    group.facets = match kind {
        FacetGroupKind::Category => {
            entity_facets(descriptor, projections.iter().flat_map(|p| dedup(&p.category_ids)))
        }
        FacetGroupKind::Brand => entity_facets(
            descriptor,
            projections.iter().flat_map(|p| dedup(&p.manufacturer_ids)),
        ),
        FacetGroupKind::DeliveryTime => {
            entity_facets(descriptor, projections.iter().filter_map(|p| p.delivery_time_id))
        }
        FacetGroupKind::Rating => rating_facets(descriptor, projections),
        FacetGroupKind::Price => price_facets(descriptor, projections, total_hits),
        FacetGroupKind::Availability => {
            let hits = projections.iter().filter(|p| p.available).count() as u64;
            let selected = descriptor
                .selected_values()
                .any(|v| v.value.as_bool() == Some(true));
            vec![Facet::new(
                FacetValue::new(true).selected(selected).with_label("Available"),
                hits,
            )]
        }
        FacetGroupKind::NewArrivals => {
            let since = ctx.new_arrivals_since();
            let hits = projections.iter().filter(|p| p.created_on >= since).count() as u64;
            let selected = descriptor.has_selection();
            if hits == 0 && !selected {
                return None;
            }
            vec![Facet::new(
                FacetValue::range(Some(since.into()), None)
                    .selected(selected)
                    .with_label("New arrivals"),
                hits,
            )]
        }
        FacetGroupKind::Unknown => {
            tracing::debug!(key = %descriptor.key, "Skipping facet descriptor of unknown kind");
            return None;
        }
    };

    Some(group)
}

fn dedup(ids: &[i64]) -> BTreeSet<i64> {
    ids.iter().copied().filter(|id| *id != 0).collect()
}

fn entity_facets(descriptor: &FacetDescriptor, ids: impl Iterator<Item = i64>) -> Vec<Facet> {
    let mut counts: BTreeMap<i64, u64> = BTreeMap::new();
    for id in ids.filter(|id| *id != 0) {
        *counts.entry(id).or_default() += 1;
    }

    let selected = descriptor.selected_ids();
    // Selected values stay visible even when they no longer match
    for id in &selected {
        counts.entry(*id).or_default();
    }

    counts
        .into_iter()
        .filter_map(|(id, hits)| {
            let is_selected = selected.contains(&id);
            if hits < descriptor.min_hit_count && !is_selected {
                return None;
            }
            Some(Facet::new(FacetValue::new(id).selected(is_selected), hits))
        })
        .collect()
}

fn rating_facets(descriptor: &FacetDescriptor, projections: &[FacetProjection]) -> Vec<Facet> {
    RATING_STEPS
        .iter()
        .enumerate()
        .filter_map(|(i, step)| {
            let hits = projections
                .iter()
                .filter(|p| p.rating.map_or(false, |r| r >= *step))
                .count() as u64;
            let is_selected = descriptor
                .selected_values()
                .any(|v| v.value.as_f64() == Some(*step));
            if hits < descriptor.min_hit_count && !is_selected {
                return None;
            }
            let value = FacetValue::range(Some(FilterValue::Double(*step)), None)
                .selected(is_selected)
                .with_label(format!("{} stars & up", step))
                .with_display_order(i as i32);
            Some(Facet::new(value, hits))
        })
        .collect()
}

fn price_facets(
    descriptor: &FacetDescriptor,
    projections: &[FacetProjection],
    total_hits: usize,
) -> Vec<Facet> {
    let mut facets = Vec::new();
    let mut has_active_predefined = false;

    let min_price = projections.iter().map(|p| p.price).fold(f64::INFINITY, f64::min);
    let max_price = projections.iter().map(|p| p.price).fold(f64::NEG_INFINITY, f64::max);

    if !projections.is_empty() {
        let min_price = make_price_even(min_price);
        let max_price = make_price_even(max_price);
        let mut count = 0usize;

        for threshold in PRICE_LADDER {
            if (descriptor.max_choices_count > 0 && count >= descriptor.max_choices_count)
                || threshold > max_price
            {
                break;
            }
            if threshold < min_price {
                continue;
            }

            let is_selected = descriptor.selected_values().any(|v| {
                v.value.is_null() && v.upper_f64() == Some(threshold)
            });
            has_active_predefined |= is_selected;

            count += 1;
            let hits = projections.iter().filter(|p| p.price <= threshold).count() as u64;
            let value = FacetValue::range(None, Some(FilterValue::Double(threshold)))
                .selected(is_selected)
                .with_label(format!("up to {}", threshold))
                .with_display_order(count as i32);
            facets.push(Facet::new(value, hits));
        }
    }

    // The custom facet carries a free-form selection that matches no ladder entry
    let current = descriptor.values.first().filter(|_| !has_active_predefined);
    let lower = current.map(|v| v.value.clone()).filter(|v| !v.is_null());
    let upper = current.and_then(|v| v.upper_value.clone()).filter(|v| !v.is_null());
    let is_selected = lower.is_some() || upper.is_some();
    if !(total_hits == 0 && !is_selected) {
        let value = FacetValue::range(lower, upper).selected(is_selected);
        facets.insert(0, Facet::with_key(CUSTOM_PRICE_FACET_KEY, value, 0));
    }

    facets
}

/// Apply publication state, ordering and the choice limit to a labelled group
pub fn finalize_facet_group(group: &mut FacetGroup, descriptor: &FacetDescriptor) {
    group.facets.retain(|f| f.published || f.value.is_selected);

    if !group.kind.is_entity() {
        return;
    }

    let order_by = descriptor.order_by;
    group.facets.sort_by(|a, b| compare_facets(a, b, order_by));

    let max = descriptor.max_choices_count;
    if max > 0 && group.facets.len() > max {
        let overflow = group.facets.split_off(max);
        // Selected values are never cut off
        group
            .facets
            .extend(overflow.into_iter().filter(|f| f.value.is_selected));
    }
}

fn compare_facets(a: &Facet, b: &Facet, order_by: FacetSorting) -> Ordering {
    match order_by {
        FacetSorting::HitsDesc => b
            .hit_count
            .cmp(&a.hit_count)
            .then_with(|| a.label_lower().cmp(&b.label_lower())),
        FacetSorting::ValueAsc => a
            .value
            .value
            .compare(&b.value.value)
            .unwrap_or(Ordering::Equal),
        FacetSorting::LabelAsc => a.label_lower().cmp(&b.label_lower()),
        FacetSorting::DisplayOrder => a
            .value
            .display_order
            .cmp(&b.value.display_order)
            .then_with(|| a.label_lower().cmp(&b.label_lower())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> FacetContext {
        FacetContext::new(Utc::now(), 30)
    }

    fn projection(categories: &[i64], price: f64) -> FacetProjection {
        FacetProjection {
            category_ids: categories.to_vec(),
            price,
            created_on: Utc::now() - Duration::days(365),
            ..Default::default()
        }
    }

    #[test]
    fn test_make_price_even() {
        assert_eq!(make_price_even(0.0), 0.0);
        assert_eq!(make_price_even(-5.0), 0.0);
        assert_eq!(make_price_even(37.0), 40.0);
        assert_eq!(make_price_even(40.0), 40.0);
        assert_eq!(make_price_even(123.0), 150.0);
        assert_eq!(make_price_even(7.3), 7.5);
        assert_eq!(make_price_even(1000.0), 1000.0);
    }

    #[test]
    fn test_kind_from_key() {
        assert_eq!(FacetGroupKind::from_key("price"), FacetGroupKind::Price);
        assert_eq!(FacetGroupKind::from_key("price_c-eur"), FacetGroupKind::Price);
        assert_eq!(FacetGroupKind::from_key("featuredcategoryid"), FacetGroupKind::Category);
        assert_eq!(FacetGroupKind::from_key("color"), FacetGroupKind::Unknown);
        assert!(FacetGroupKind::Brand.owns_field("manufacturerid"));
        assert!(!FacetGroupKind::Unknown.owns_field("color"));
    }

    #[test]
    fn test_category_counts_and_selection() {
        let descriptor = FacetDescriptor::new("categoryid").add_value(FacetValue::new(9i64).selected(true));
        let hits = vec![projection(&[1, 2], 10.0), projection(&[1], 20.0)];
        let group = assemble_facet_group(&descriptor, &hits, 2, &ctx()).unwrap();

        let counts: Vec<(String, u64, bool)> = group
            .facets
            .iter()
            .map(|f| (f.key.clone(), f.hit_count, f.value.is_selected))
            .collect();
        assert_eq!(
            counts,
            vec![
                ("1".to_string(), 2, false),
                ("2".to_string(), 1, false),
                ("9".to_string(), 0, true),
            ]
        );
    }

    #[test]
    fn test_zero_hits_visibility() {
        let unselected = FacetDescriptor::new("manufacturerid");
        assert!(assemble_facet_group(&unselected, &[], 0, &ctx()).is_none());

        let selected = FacetDescriptor::new("manufacturerid").add_value(FacetValue::new(4i64).selected(true));
        let group = assemble_facet_group(&selected, &[], 0, &ctx()).unwrap();
        assert_eq!(group.facets.len(), 1);
        assert!(group.facets[0].value.is_selected);

        let availability = FacetDescriptor::new("available");
        assert!(assemble_facet_group(&availability, &[], 0, &ctx()).is_some());

        let new_arrivals = FacetDescriptor::new("createdon");
        assert!(assemble_facet_group(&new_arrivals, &[], 0, &ctx()).is_none());
    }

    #[test]
    fn test_price_ladder_bounds() {
        let descriptor = FacetDescriptor::new("price");
        let hits = vec![projection(&[], 37.0), projection(&[], 180.0)];
        let group = assemble_facet_group(&descriptor, &hits, 2, &ctx()).unwrap();

        assert_eq!(group.facets[0].key, CUSTOM_PRICE_FACET_KEY);
        assert!(!group.facets[0].value.is_selected);
        let uppers: Vec<f64> = group.facets[1..]
            .iter()
            .filter_map(|f| f.value.upper_f64())
            .collect();
        // min 37 -> 40, max 180 -> 200
        assert_eq!(uppers, vec![50.0, 100.0]);
        assert_eq!(group.facets[1].hit_count, 1);
    }

    #[test]
    fn test_custom_price_selection() {
        let descriptor = FacetDescriptor::new("price").add_value(
            FacetValue::range(Some(FilterValue::Double(12.0)), Some(FilterValue::Double(33.0)))
                .selected(true),
        );
        let group = assemble_facet_group(&descriptor, &[], 0, &ctx()).unwrap();
        assert_eq!(group.facets.len(), 1);
        assert!(group.facets[0].value.is_selected);
        assert_eq!(group.facets[0].value.upper_value, Some(FilterValue::Double(33.0)));
    }

    #[test]
    fn test_rating_facets_respect_min_hits() {
        let descriptor = FacetDescriptor::new("rating");
        let mut hit = projection(&[], 1.0);
        hit.rating = Some(3.5);
        let group = assemble_facet_group(&descriptor, &[hit], 1, &ctx()).unwrap();
        let steps: Vec<String> = group.facets.iter().map(|f| f.key.clone()).collect();
        assert_eq!(steps, vec!["3~", "2~", "1~"]);
    }

    #[test]
    fn test_finalize_keeps_selected_beyond_limit() {
        let descriptor = FacetDescriptor::new("categoryid")
            .max_choices(1)
            .add_value(FacetValue::new(3i64).selected(true));
        let hits = vec![
            projection(&[1], 1.0),
            projection(&[1], 1.0),
            projection(&[2], 1.0),
            projection(&[3], 1.0),
        ];
        let mut group = assemble_facet_group(&descriptor, &hits, 4, &ctx()).unwrap();
        group.facets[1].published = false;
        finalize_facet_group(&mut group, &descriptor);

        let keys: Vec<&str> = group.facets.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(keys, vec!["1", "3"]);
    }
}
