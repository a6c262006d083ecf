//! Tantivy-backed search engine for catalog queries

use crate::search::catalog_query::{
    price_field_name, CatalogSearchQuery, ProductOrdering, ProductSortKey, DEFAULT_TERM_FIELDS,
    PRICE_FIELD_PREFIX,
};
use crate::search::config::SearchConfig;
use crate::search::engine::{SearchEngine, SearchHit};
use crate::search::error::{SearchError, SearchResult};
use crate::search::facets::{assemble_facet_group, FacetContext, FacetGroup};
use crate::search::filter::{FilterValue, RangeSearchFilter, SearchFilter};
use crate::search::index::document::{to_tantivy_date, StoredProduct};
use crate::search::index::store::OpenIndex;
use crate::search::query::SearchMode;
use async_trait::async_trait;
use chrono::Utc;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Arc;
use tantivy::collector::{Count, DocSetCollector, TopDocs};
use tantivy::query::{
    AllQuery, BooleanQuery, Occur, PhraseQuery, Query, RangeQuery, RegexQuery, TermQuery,
};
use tantivy::schema::{Field, FieldType, IndexRecordOption};
use tantivy::tokenizer::TokenStream;
use tantivy::{TantivyDocument, Term};
use tokio::sync::OnceCell;

pub const ENGINE_NAME: &str = "tantivy";

#[derive(Debug, Clone)]
struct RankedHit {
    score: f32,
    stored: StoredProduct,
}

/// Executes one catalog query against an opened index
pub struct TantivySearchEngine {
    opened: OpenIndex,
    query: CatalogSearchQuery,
    config: Arc<SearchConfig>,
    ranked: OnceCell<Vec<RankedHit>>,
}

impl TantivySearchEngine {
    pub fn new(opened: OpenIndex, query: CatalogSearchQuery, config: Arc<SearchConfig>) -> Self {
        Self {
            opened,
            query,
            config,
            ranked: OnceCell::new(),
        }
    }

    fn field(&self, name: &str) -> Option<Field> {
        self.opened.schema.get_field(name).ok()
    }

    /// Build the Tantivy query of a catalog query
    pub fn build_query(&self, query: &CatalogSearchQuery) -> SearchResult<Box<dyn Query>> {
        let mut clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();

        if let Some(term_query) = self.term_query(query)? {
            clauses.push((Occur::Must, term_query));
        }
        for filter in &query.filters {
            if let Some(filter_query) = self.filter_query(filter)? {
                let occur = if filter.is_forbidden() {
                    Occur::MustNot
                } else {
                    Occur::Must
                };
                clauses.push((occur, filter_query));
            }
        }

        // A boolean query of exclusions alone matches nothing
        if !clauses.iter().any(|(occur, _)| *occur == Occur::Must) {
            clauses.push((Occur::Must, Box::new(AllQuery)));
        }
        Ok(Box::new(BooleanQuery::new(clauses)))
    }

    fn term_query(&self, query: &CatalogSearchQuery) -> SearchResult<Option<Box<dyn Query>>> {
        let Some(term) = query.term.as_deref().map(str::trim).filter(|t| !t.is_empty()) else {
            return Ok(None);
        };
        let field_names: Vec<&str> = if query.fields.is_empty() {
            DEFAULT_TERM_FIELDS.to_vec()
        } else {
            query.fields.iter().map(String::as_str).collect()
        };

        let mut per_field: Vec<(Occur, Box<dyn Query>)> = Vec::new();
        for name in field_names {
            let Some(field) = self.field(&name.to_lowercase()) else {
                tracing::warn!(field = name, "Ignoring unsupported term field");
                continue;
            };
            let tokens = self.analyze(field, term)?;
            if tokens.is_empty() {
                continue;
            }

            let field_query: Box<dyn Query> = match query.mode {
                SearchMode::ExactMatch if tokens.len() == 1 => Box::new(TermQuery::new(
                    Term::from_field_text(field, &tokens[0]),
                    IndexRecordOption::WithFreqs,
                )),
                SearchMode::ExactMatch => Box::new(PhraseQuery::new(
                    tokens
                        .iter()
                        .map(|t| Term::from_field_text(field, t))
                        .collect(),
                )),
                SearchMode::Contains | SearchMode::StartsWith => {
                    let mut token_clauses: Vec<(Occur, Box<dyn Query>)> = Vec::new();
                    for token in &tokens {
                        let pattern = match query.mode {
                            SearchMode::StartsWith => format!("{}.*", regex::escape(token)),
                            _ => format!(".*{}.*", regex::escape(token)),
                        };
                        let regex = RegexQuery::from_pattern(&pattern, field)
                            .map_err(|e| SearchError::QueryParsingFailed(e.to_string()))?;
                        token_clauses.push((Occur::Must, Box::new(regex)));
                    }
                    Box::new(BooleanQuery::new(token_clauses))
                }
            };
            per_field.push((Occur::Should, field_query));
        }

        if per_field.is_empty() {
            return Ok(None);
        }
        Ok(Some(Box::new(BooleanQuery::new(per_field))))
    }

    /// Tokens of `text` as the field's analyzer produces them
    fn analyze(&self, field: Field, text: &str) -> SearchResult<Vec<String>> {
        let mut analyzer = self.opened.index.tokenizer_for_field(field)?;
        let mut stream = analyzer.token_stream(text);
        let mut tokens = Vec::new();
        stream.process(&mut |token| tokens.push(token.text.to_lowercase()));
        Ok(tokens)
    }

    fn filter_query(&self, filter: &SearchFilter) -> SearchResult<Option<Box<dyn Query>>> {
        match filter {
            SearchFilter::Attribute(a) => self.equality_query(&a.field_name, &a.term),
            SearchFilter::Range(r) => self.range_query(r),
            SearchFilter::Combined(c) => {
                let mut alternatives: Vec<(Occur, Box<dyn Query>)> = Vec::new();
                for child in &c.filters {
                    if let Some(child_query) = self.filter_query(child)? {
                        let child_query = if child.is_forbidden() {
                            excluding(child_query)
                        } else {
                            child_query
                        };
                        alternatives.push((Occur::Should, child_query));
                    }
                }
                if alternatives.is_empty() {
                    return Ok(None);
                }
                Ok(Some(Box::new(BooleanQuery::new(alternatives))))
            }
        }
    }

    fn filter_field(&self, name: &str) -> SearchResult<Option<Field>> {
        match self.field(name) {
            Some(field) => Ok(Some(field)),
            None if name.starts_with(PRICE_FIELD_PREFIX) => Err(SearchError::invalid_argument(
                format!("unknown currency code: {}", &name[PRICE_FIELD_PREFIX.len()..]),
            )),
            None => {
                tracing::warn!(field = name, "Ignoring filter on unknown field");
                Ok(None)
            }
        }
    }

    fn equality_query(&self, name: &str, value: &FilterValue) -> SearchResult<Option<Box<dyn Query>>> {
        let Some(field) = self.filter_field(name)? else {
            return Ok(None);
        };
        let mismatch = || SearchError::invalid_argument(format!("{}: unexpected term {:?}", name, value));

        let term = match self.opened.schema.get_field_entry(field).field_type() {
            FieldType::I64(_) => Term::from_field_i64(field, value.as_i64().ok_or_else(mismatch)?),
            FieldType::F64(_) => Term::from_field_f64(field, value.as_f64().ok_or_else(mismatch)?),
            FieldType::Bool(_) => Term::from_field_bool(field, value.as_bool().ok_or_else(mismatch)?),
            FieldType::Date(_) => Term::from_field_date(
                field,
                to_tantivy_date(value.as_datetime().ok_or_else(mismatch)?),
            ),
            FieldType::Str(_) => {
                Term::from_field_text(field, &value.as_str().ok_or_else(mismatch)?.to_lowercase())
            }
            _ => {
                tracing::warn!(field = name, "Ignoring filter on unsupported field type");
                return Ok(None);
            }
        };
        Ok(Some(Box::new(TermQuery::new(term, IndexRecordOption::Basic))))
    }

    fn range_query(&self, range: &RangeSearchFilter) -> SearchResult<Option<Box<dyn Query>>> {
        let name = range.field_name.as_str();
        let Some(field) = self.filter_field(name)? else {
            return Ok(None);
        };
        let mismatch = || SearchError::invalid_argument(format!("{}: unexpected range bound", name));

        let query = match self.opened.schema.get_field_entry(field).field_type() {
            FieldType::I64(_) => {
                let lower = range.term.as_ref().map(|v| v.as_i64().ok_or_else(mismatch)).transpose()?;
                let upper = range
                    .upper_term
                    .as_ref()
                    .map(|v| v.as_i64().ok_or_else(mismatch))
                    .transpose()?;
                RangeQuery::new_i64_bounds(
                    name.to_string(),
                    bound(lower, range.includes_lower),
                    bound(upper, range.includes_upper),
                )
            }
            FieldType::F64(_) => {
                let lower = range.term.as_ref().map(|v| v.as_f64().ok_or_else(mismatch)).transpose()?;
                let upper = range
                    .upper_term
                    .as_ref()
                    .map(|v| v.as_f64().ok_or_else(mismatch))
                    .transpose()?;
                RangeQuery::new_f64_bounds(
                    name.to_string(),
                    bound(lower, range.includes_lower),
                    bound(upper, range.includes_upper),
                )
            }
            FieldType::Date(_) => {
                let lower = range
                    .term
                    .as_ref()
                    .map(|v| v.as_datetime().map(to_tantivy_date).ok_or_else(mismatch))
                    .transpose()?;
                let upper = range
                    .upper_term
                    .as_ref()
                    .map(|v| v.as_datetime().map(to_tantivy_date).ok_or_else(mismatch))
                    .transpose()?;
                RangeQuery::new_date_bounds(
                    name.to_string(),
                    bound(lower, range.includes_lower),
                    bound(upper, range.includes_upper),
                )
            }
            _ => {
                tracing::warn!(field = name, "Ignoring range on a non-ordered field");
                return Ok(None);
            }
        };
        Ok(Some(Box::new(query)))
    }

    /// Price field of the query currency
    fn price_field(&self, query: &CatalogSearchQuery) -> String {
        let code = query
            .currency_code
            .as_deref()
            .unwrap_or(&self.config.primary_currency);
        price_field_name(code)
    }

    /// All hits of the engine's query in result order
    async fn ranked(&self) -> SearchResult<&Vec<RankedHit>> {
        self.ranked
            .get_or_try_init(|| async { self.collect() })
            .await
    }

    fn collect(&self) -> SearchResult<Vec<RankedHit>> {
        let tantivy_query = self.build_query(&self.query)?;
        let searcher = self.opened.reader.searcher();

        let total = searcher
            .search(&*tantivy_query, &Count)
            .map_err(|e| SearchError::SearchFailed(format!("Count failed: {}", e)))?;
        if total == 0 {
            return Ok(Vec::new());
        }

        let top_docs = searcher
            .search(&*tantivy_query, &TopDocs::with_limit(total))
            .map_err(|e| SearchError::SearchFailed(format!("Search failed: {}", e)))?;

        let price_field = self.price_field(&self.query);
        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, doc_address) in top_docs {
            let doc: TantivyDocument = searcher
                .doc(doc_address)
                .map_err(|e| SearchError::SearchFailed(format!("Failed to retrieve doc: {}", e)))?;
            hits.push(RankedHit {
                score,
                stored: StoredProduct::from_doc(&doc, &self.opened.schema, &price_field),
            });
        }

        let ordering = self.query.resolve_ordering(self.query.has_term());
        hits.sort_by(|a, b| {
            ordering
                .iter()
                .map(|o| compare_hits(a, b, o))
                .find(|ordering| *ordering != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.stored.id.cmp(&b.stored.id))
        });
        Ok(hits)
    }
}

#[async_trait]
impl SearchEngine for TantivySearchEngine {
    fn name(&self) -> &str {
        ENGINE_NAME
    }

    async fn count(&self) -> SearchResult<usize> {
        if let Some(ranked) = self.ranked.get() {
            return Ok(ranked.len());
        }
        let tantivy_query = self.build_query(&self.query)?;
        self.opened
            .reader
            .searcher()
            .search(&*tantivy_query, &Count)
            .map_err(|e| SearchError::SearchFailed(format!("Count failed: {}", e)))
    }

    async fn search(&self, skip: usize, take: usize) -> SearchResult<Vec<SearchHit>> {
        Ok(self
            .ranked()
            .await?
            .iter()
            .skip(skip)
            .take(take)
            .map(|hit| SearchHit {
                entity_id: hit.stored.id,
                score: hit.score,
            })
            .collect())
    }

    async fn get_facet_map(&self, total_hits: usize) -> SearchResult<BTreeMap<String, FacetGroup>> {
        let ctx = FacetContext::new(Utc::now(), self.config.new_arrivals_days);
        let price_field = self.price_field(&self.query);
        if self.field(&price_field).is_none() {
            return Err(SearchError::invalid_argument(format!(
                "no price field {} in the index",
                price_field
            )));
        }
        let searcher = self.opened.reader.searcher();

        let mut groups = BTreeMap::new();
        for (key, descriptor) in &self.query.facet_descriptors {
            let source = if descriptor.is_multi_select {
                self.query.without_facet_filters(descriptor.kind())
            } else {
                self.query.clone()
            };
            let tantivy_query = self.build_query(&source)?;
            let doc_addresses = searcher
                .search(&*tantivy_query, &DocSetCollector)
                .map_err(|e| SearchError::SearchFailed(format!("Facet search failed: {}", e)))?;

            let mut projections = Vec::with_capacity(doc_addresses.len());
            for doc_address in doc_addresses {
                let doc: TantivyDocument = searcher.doc(doc_address)?;
                projections
                    .push(StoredProduct::from_doc(&doc, &self.opened.schema, &price_field).projection);
            }

            if let Some(group) = assemble_facet_group(descriptor, &projections, total_hits, &ctx) {
                groups.insert(key.clone(), group);
            }
        }
        Ok(groups)
    }

    async fn check_spelling(&self, total_hits: usize) -> SearchResult<Vec<String>> {
        let Some(term) = self.query.term.as_deref().map(str::trim).filter(|t| !t.is_empty()) else {
            return Ok(Vec::new());
        };
        if self.query.spell_checker_max_suggestions == 0
            || total_hits > self.query.spell_checker_max_hit_count
            || term.chars().count() < self.query.spell_checker_min_query_length
        {
            return Ok(Vec::new());
        }
        let Some(field) = self.field("name") else {
            return Ok(Vec::new());
        };

        let max_distance = usize::from(self.config.spell_check_max_distance);
        let tokens = self.analyze(field, term)?;
        let searcher = self.opened.reader.searcher();

        // candidate -> (distance, document frequency)
        let mut candidates: HashMap<String, (usize, u64)> = HashMap::new();
        for segment_reader in searcher.segment_readers() {
            let inverted_index = segment_reader.inverted_index(field)?;
            let mut stream = inverted_index.terms().stream()?;
            while stream.advance() {
                let Ok(candidate) = std::str::from_utf8(stream.key()) else {
                    continue;
                };
                let doc_freq = u64::from(stream.value().doc_freq);
                for token in &tokens {
                    if candidate.chars().count().abs_diff(token.chars().count()) > max_distance {
                        continue;
                    }
                    let distance = levenshtein_distance(token, candidate);
                    if distance == 0 || distance > max_distance {
                        continue;
                    }
                    let entry = candidates
                        .entry(candidate.to_string())
                        .or_insert((distance, 0));
                    entry.0 = entry.0.min(distance);
                    entry.1 += doc_freq;
                }
            }
        }

        let mut ranked: Vec<(String, (usize, u64))> = candidates.into_iter().collect();
        ranked.sort_by(|(a, (da, fa)), (b, (db, fb))| da.cmp(db).then(fb.cmp(fa)).then(a.cmp(b)));
        Ok(ranked
            .into_iter()
            .take(self.query.spell_checker_max_suggestions)
            .map(|(candidate, _)| candidate)
            .collect())
    }
}

fn bound<T>(value: Option<T>, inclusive: bool) -> Bound<T> {
    match value {
        None => Bound::Unbounded,
        Some(v) if inclusive => Bound::Included(v),
        Some(v) => Bound::Excluded(v),
    }
}

fn excluding(query: Box<dyn Query>) -> Box<dyn Query> {
    Box::new(BooleanQuery::new(vec![
        (Occur::Must, Box::new(AllQuery) as Box<dyn Query>),
        (Occur::MustNot, query),
    ]))
}

fn compare_hits(a: &RankedHit, b: &RankedHit, ordering: &ProductOrdering) -> Ordering {
    let (x, y) = (&a.stored, &b.stored);
    let result = match ordering.key {
        ProductSortKey::CategoryOrder(id) => {
            let order = |p: &StoredProduct| p.category_orders.get(&id).copied().unwrap_or(i64::MAX);
            order(x).cmp(&order(y))
        }
        ProductSortKey::ManufacturerOrder(id) => {
            let order =
                |p: &StoredProduct| p.manufacturer_orders.get(&id).copied().unwrap_or(i64::MAX);
            order(x).cmp(&order(y))
        }
        ProductSortKey::Score => a.score.partial_cmp(&b.score).unwrap_or(Ordering::Equal),
        ProductSortKey::Name => x.name.to_lowercase().cmp(&y.name.to_lowercase()),
        ProductSortKey::Price => x.price.partial_cmp(&y.price).unwrap_or(Ordering::Equal),
        ProductSortKey::CreatedOn => x.created_on.cmp(&y.created_on),
        ProductSortKey::DisplayOrder => x.display_order.cmp(&y.display_order),
        ProductSortKey::Id => x.id.cmp(&y.id),
    };
    if ordering.descending {
        result.reverse()
    } else {
        result
    }
}

/// Calculate Levenshtein distance
fn levenshtein_distance(s1: &str, s2: &str) -> usize {
    let s1: Vec<char> = s1.chars().collect();
    let s2: Vec<char> = s2.chars().collect();

    let mut previous: Vec<usize> = (0..=s2.len()).collect();
    let mut current = vec![0; s2.len() + 1];

    for (i, c1) in s1.iter().enumerate() {
        current[0] = i + 1;
        for (j, c2) in s2.iter().enumerate() {
            let cost = if c1 == c2 { 0 } else { 1 };
            current[j + 1] = (previous[j + 1] + 1)
                .min(current[j] + 1)
                .min(previous[j] + cost);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[s2.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein_distance() {
        assert_eq!(levenshtein_distance("lamp", "lamp"), 0);
        assert_eq!(levenshtein_distance("lamp", "lamps"), 1);
        assert_eq!(levenshtein_distance("lmap", "lamp"), 2);
        assert_eq!(levenshtein_distance("", "abc"), 3);
        assert_eq!(levenshtein_distance("größe", "grosse"), 2);
    }

    #[test]
    fn test_bound() {
        assert_eq!(bound(Some(1), true), Bound::Included(1));
        assert_eq!(bound(Some(1), false), Bound::Excluded(1));
        assert_eq!(bound::<i64>(None, true), Bound::Unbounded);
    }
}
