//! Generic search query: term, filters, sorting, paging and result flags

use crate::search::error::{SearchError, SearchResult};
use crate::search::facets::FacetDescriptor;
use crate::search::filter::SearchFilter;
use crate::search::sort::SearchSort;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

bitflags! {
    /// What a search should produce besides the hit count
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ResultFlags: u32 {
        const WITH_HITS = 1;
        const WITH_FACETS = 1 << 1;
        const WITH_SUGGESTIONS = 1 << 2;
    }
}

impl Default for ResultFlags {
    fn default() -> Self {
        ResultFlags::WITH_HITS
    }
}

/// How the search term is matched against text fields
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::EnumString, strum::Display,
)]
#[strum(ascii_case_insensitive)]
pub enum SearchMode {
    #[default]
    Contains,
    StartsWith,
    ExactMatch,
}

/// Take used when the caller does not page: every hit
pub const UNBOUNDED_TAKE: usize = usize::MAX;

/// Generic search query built per request and consumed by one search
#[derive(Debug, Clone)]
pub struct SearchQuery {
    /// Fields the term is matched against; empty means the backend default
    pub fields: Vec<String>,
    pub term: Option<String>,
    pub mode: SearchMode,
    /// Escape query syntax in the term
    pub escape_term: bool,

    pub filters: Vec<SearchFilter>,
    pub sorting: Vec<SearchSort>,
    pub facet_descriptors: BTreeMap<String, FacetDescriptor>,

    pub skip: usize,
    pub take: usize,
    pub result_flags: ResultFlags,

    pub spell_checker_max_suggestions: usize,
    pub spell_checker_min_query_length: usize,
    pub spell_checker_max_hit_count: usize,

    /// Route the query originates from, e.g. `Search/Search`
    pub origin: Option<String>,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            fields: Vec::new(),
            term: None,
            mode: SearchMode::Contains,
            escape_term: true,
            filters: Vec::new(),
            sorting: Vec::new(),
            facet_descriptors: BTreeMap::new(),
            skip: 0,
            take: UNBOUNDED_TAKE,
            result_flags: ResultFlags::default(),
            spell_checker_max_suggestions: 0,
            spell_checker_min_query_length: 4,
            spell_checker_max_hit_count: 3,
            origin: None,
        }
    }
}

impl SearchQuery {
    /// Create a query matching `term` against `fields`
    pub fn new(fields: Vec<String>, term: Option<String>, mode: SearchMode) -> Self {
        Self {
            fields,
            term: term.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()),
            mode,
            ..Default::default()
        }
    }

    pub fn has_term(&self) -> bool {
        self.term.as_deref().map_or(false, |t| !t.is_empty())
    }

    /// Zero-based page index derived from skip and take
    pub fn page_index(&self) -> usize {
        if self.take == 0 {
            0
        } else {
            self.skip / self.take
        }
    }

    /// Set paging; negative values are rejected
    pub fn slice(mut self, skip: i64, take: i64) -> SearchResult<Self> {
        if skip < 0 {
            return Err(SearchError::invalid_argument(format!(
                "skip must not be negative (got {})",
                skip
            )));
        }
        if take < 0 {
            return Err(SearchError::invalid_argument(format!(
                "take must not be negative (got {})",
                take
            )));
        }
        self.skip = skip as usize;
        self.take = take as usize;
        Ok(self)
    }

    /// Page-based paging with a zero-based page index
    pub fn paged(self, page_index: i64, page_size: i64) -> SearchResult<Self> {
        if page_index < 0 || page_size < 0 {
            return Err(SearchError::invalid_argument(
                "page index and page size must not be negative",
            ));
        }
        self.slice(page_index.saturating_mul(page_size), page_size)
    }

    pub fn with_filter(mut self, filter: SearchFilter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn sort_by(mut self, sort: SearchSort) -> Self {
        self.sorting.push(sort);
        self
    }

    pub fn with_facet(mut self, descriptor: FacetDescriptor) -> Self {
        self.facet_descriptors.insert(descriptor.key.clone(), descriptor);
        self
    }

    pub fn build_hits(mut self, build: bool) -> Self {
        self.result_flags.set(ResultFlags::WITH_HITS, build);
        self
    }

    pub fn build_facet_map(mut self, build: bool) -> Self {
        self.result_flags.set(ResultFlags::WITH_FACETS, build);
        self
    }

    /// Enable spell checking: up to `max_suggestions` suggestions for terms of
    /// at least `min_query_length` characters when at most `max_hit_count` hits
    pub fn check_spelling(
        mut self,
        max_suggestions: usize,
        min_query_length: usize,
        max_hit_count: usize,
    ) -> Self {
        self.spell_checker_max_suggestions = max_suggestions;
        self.spell_checker_min_query_length = min_query_length;
        self.spell_checker_max_hit_count = max_hit_count;
        self.result_flags
            .set(ResultFlags::WITH_SUGGESTIONS, max_suggestions > 0);
        self
    }

    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn is_origin(&self, origin: &str) -> bool {
        self.origin
            .as_deref()
            .map_or(false, |o| o.eq_ignore_ascii_case(origin))
    }

    pub fn has_filter(&self, field_name: &str) -> bool {
        self.filters.iter().any(|f| f.targets(&|name| name == field_name))
    }

    /// Drop every filter that touches a field accepted by `predicate`
    pub fn remove_filters(&mut self, predicate: &dyn Fn(&str) -> bool) {
        self.filters.retain(|f| !f.targets(predicate));
    }

    /// Effective skip for a known hit count.
    ///
    /// Out-of-range paging is corrected to the last non-empty page instead of
    /// yielding an empty page.
    pub fn clamp_skip(&self, total_hits: usize) -> usize {
        if self.take == 0 || self.skip == 0 || self.skip < total_hits {
            return self.skip;
        }
        if total_hits == 0 {
            return 0;
        }
        let skip = (total_hits / self.take).saturating_mul(self.take);
        if skip >= total_hits {
            skip - self.take
        } else {
            skip
        }
    }
}
