//! Search filter primitives: equality, range and combined (OR) predicates

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Scalar value carried by filters and facets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum FilterValue {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    Text(String),
    DateTime(DateTime<Utc>),
}

impl FilterValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FilterValue::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FilterValue::Bool(b) => Some(*b),
            FilterValue::Int(i) => Some(*i != 0),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FilterValue::Int(i) => Some(*i),
            FilterValue::Double(d) => Some(*d as i64),
            FilterValue::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FilterValue::Int(i) => Some(*i as f64),
            FilterValue::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FilterValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            FilterValue::DateTime(dt) => Some(*dt),
            _ => None,
        }
    }

    /// Compare two values of compatible kinds.
    ///
    /// Integers and doubles compare numerically, text compares
    /// case-insensitively. `None` when either side is null or the kinds differ.
    pub fn compare(&self, other: &FilterValue) -> Option<Ordering> {
        use FilterValue::*;
        match (self, other) {
            (Null, _) | (_, Null) => None,
            (Bool(a), Bool(b)) => Some(a.cmp(b)),
            (Int(a), Int(b)) => Some(a.cmp(b)),
            (Int(_) | Double(_), Int(_) | Double(_)) => {
                self.as_f64()?.partial_cmp(&other.as_f64()?)
            }
            (Text(a), Text(b)) => Some(a.to_lowercase().cmp(&b.to_lowercase())),
            (DateTime(a), DateTime(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl Default for FilterValue {
    fn default() -> Self {
        FilterValue::Null
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::Null => Ok(()),
            FilterValue::Bool(b) => write!(f, "{}", b),
            FilterValue::Int(i) => write!(f, "{}", i),
            FilterValue::Double(d) => write!(f, "{}", d),
            FilterValue::Text(s) => f.write_str(s),
            FilterValue::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
        }
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        FilterValue::Bool(value)
    }
}

impl From<i32> for FilterValue {
    fn from(value: i32) -> Self {
        FilterValue::Int(i64::from(value))
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        FilterValue::Int(value)
    }
}

impl From<f64> for FilterValue {
    fn from(value: f64) -> Self {
        FilterValue::Double(value)
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::Text(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        FilterValue::Text(value)
    }
}

impl From<DateTime<Utc>> for FilterValue {
    fn from(value: DateTime<Utc>) -> Self {
        FilterValue::DateTime(value)
    }
}

impl<T: Into<FilterValue>> From<Option<T>> for FilterValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(FilterValue::Null, Into::into)
    }
}

/// Whether a filter must or must not match
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchFilterOccurrence {
    #[default]
    Must,
    MustNot,
}

/// Equality predicate on a single field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeSearchFilter {
    pub field_name: String,
    pub term: FilterValue,
    pub occurrence: SearchFilterOccurrence,
    pub is_exact_match: bool,
    pub is_not_analyzed: bool,
    pub boost: Option<f32>,
}

/// Range predicate on a single field; a missing bound is open
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeSearchFilter {
    pub field_name: String,
    pub term: Option<FilterValue>,
    pub upper_term: Option<FilterValue>,
    pub includes_lower: bool,
    pub includes_upper: bool,
    pub occurrence: SearchFilterOccurrence,
    pub is_exact_match: bool,
    pub is_not_analyzed: bool,
    pub boost: Option<f32>,
}

impl RangeSearchFilter {
    /// Whether `value` lies within the range, honouring inclusivity
    pub fn contains(&self, value: &FilterValue) -> bool {
        let lower_ok = match &self.term {
            None => true,
            Some(lower) => match value.compare(lower) {
                Some(Ordering::Greater) => true,
                Some(Ordering::Equal) => self.includes_lower,
                _ => false,
            },
        };
        let upper_ok = match &self.upper_term {
            None => true,
            Some(upper) => match value.compare(upper) {
                Some(Ordering::Less) => true,
                Some(Ordering::Equal) => self.includes_upper,
                _ => false,
            },
        };
        lower_ok && upper_ok
    }
}

/// Alternatives of which at least one must match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedSearchFilter {
    pub filters: Vec<SearchFilter>,
    pub occurrence: SearchFilterOccurrence,
}

/// A predicate accumulated on a search query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SearchFilter {
    Attribute(AttributeSearchFilter),
    Range(RangeSearchFilter),
    Combined(CombinedSearchFilter),
}

impl SearchFilter {
    /// Equality filter on a field
    pub fn by_field(field_name: impl Into<String>, term: impl Into<FilterValue>) -> Self {
        SearchFilter::Attribute(AttributeSearchFilter {
            field_name: field_name.into(),
            term: term.into(),
            occurrence: SearchFilterOccurrence::Must,
            is_exact_match: false,
            is_not_analyzed: false,
            boost: None,
        })
    }

    /// Range filter on a field
    pub fn by_range<T: Into<FilterValue>>(
        field_name: impl Into<String>,
        lower: Option<T>,
        upper: Option<T>,
        includes_lower: bool,
        includes_upper: bool,
    ) -> Self {
        SearchFilter::Range(RangeSearchFilter {
            field_name: field_name.into(),
            term: lower.map(Into::into),
            upper_term: upper.map(Into::into),
            includes_lower,
            includes_upper,
            occurrence: SearchFilterOccurrence::Must,
            is_exact_match: false,
            is_not_analyzed: false,
            boost: None,
        })
    }

    /// OR group of filters
    pub fn combined(filters: Vec<SearchFilter>) -> Self {
        SearchFilter::Combined(CombinedSearchFilter {
            filters,
            occurrence: SearchFilterOccurrence::Must,
        })
    }

    pub fn mandatory(self) -> Self {
        self.with_occurrence(SearchFilterOccurrence::Must)
    }

    pub fn forbidden(self) -> Self {
        self.with_occurrence(SearchFilterOccurrence::MustNot)
    }

    pub fn with_occurrence(mut self, occurrence: SearchFilterOccurrence) -> Self {
        match &mut self {
            SearchFilter::Attribute(f) => f.occurrence = occurrence,
            SearchFilter::Range(f) => f.occurrence = occurrence,
            SearchFilter::Combined(f) => f.occurrence = occurrence,
        }
        self
    }

    pub fn exact_match(mut self) -> Self {
        match &mut self {
            SearchFilter::Attribute(f) => f.is_exact_match = true,
            SearchFilter::Range(f) => f.is_exact_match = true,
            SearchFilter::Combined(f) => {
                f.filters = std::mem::take(&mut f.filters)
                    .into_iter()
                    .map(SearchFilter::exact_match)
                    .collect()
            }
        }
        self
    }

    pub fn not_analyzed(mut self) -> Self {
        match &mut self {
            SearchFilter::Attribute(f) => f.is_not_analyzed = true,
            SearchFilter::Range(f) => f.is_not_analyzed = true,
            SearchFilter::Combined(f) => {
                f.filters = std::mem::take(&mut f.filters)
                    .into_iter()
                    .map(SearchFilter::not_analyzed)
                    .collect()
            }
        }
        self
    }

    pub fn weighted(mut self, boost: f32) -> Self {
        match &mut self {
            SearchFilter::Attribute(f) => f.boost = Some(boost),
            SearchFilter::Range(f) => f.boost = Some(boost),
            SearchFilter::Combined(_) => {}
        }
        self
    }

    pub fn occurrence(&self) -> SearchFilterOccurrence {
        match self {
            SearchFilter::Attribute(f) => f.occurrence,
            SearchFilter::Range(f) => f.occurrence,
            SearchFilter::Combined(f) => f.occurrence,
        }
    }

    pub fn is_forbidden(&self) -> bool {
        self.occurrence() == SearchFilterOccurrence::MustNot
    }

    /// Field name; for combined filters the field shared by all children
    pub fn field_name(&self) -> Option<&str> {
        match self {
            SearchFilter::Attribute(f) => Some(&f.field_name),
            SearchFilter::Range(f) => Some(&f.field_name),
            SearchFilter::Combined(f) => {
                let first = f.filters.first()?.field_name()?;
                f.filters
                    .iter()
                    .all(|c| c.field_name() == Some(first))
                    .then_some(first)
            }
        }
    }

    /// Whether this filter or any of its children targets `field_name`
    pub fn targets(&self, predicate: &dyn Fn(&str) -> bool) -> bool {
        match self {
            SearchFilter::Attribute(f) => predicate(&f.field_name),
            SearchFilter::Range(f) => predicate(&f.field_name),
            SearchFilter::Combined(f) => f.filters.iter().any(|c| c.targets(predicate)),
        }
    }
}

impl fmt::Display for SearchFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.is_forbidden() { "-" } else { "+" };
        match self {
            SearchFilter::Attribute(a) => write!(f, "{}{}:{}", sign, a.field_name, a.term),
            SearchFilter::Range(r) => {
                let open = if r.includes_lower { '[' } else { '{' };
                let close = if r.includes_upper { ']' } else { '}' };
                let lower = r.term.as_ref().map_or("*".to_string(), |v| v.to_string());
                let upper = r.upper_term.as_ref().map_or("*".to_string(), |v| v.to_string());
                write!(f, "{}{}:{}{} TO {}{}", sign, r.field_name, open, lower, upper, close)
            }
            SearchFilter::Combined(c) => {
                let parts: Vec<String> = c.filters.iter().map(|x| x.to_string()).collect();
                write!(f, "{}({})", sign, parts.join(" OR "))
            }
        }
    }
}
