//! Search configuration

use crate::search::error::{SearchError, SearchResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use validator::Validate;

/// Exchange rate of a currency relative to the primary currency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct CurrencyConfig {
    /// ISO currency code
    #[validate(length(min = 3, max = 3))]
    pub code: String,

    /// Multiplier applied to primary-currency prices
    #[validate(range(exclusive_min = 0.0))]
    pub rate: f64,
}

impl CurrencyConfig {
    pub fn new(code: impl Into<String>, rate: f64) -> Self {
        Self {
            code: code.into(),
            rate,
        }
    }
}

/// Search service configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct SearchConfig {
    /// Root directory of the index stores
    pub index_path: PathBuf,

    /// Index writer heap size in bytes (default: 50MB)
    #[validate(range(min = 15_000_000))]
    pub writer_heap_size: usize,

    /// Commit after every indexing call
    pub realtime_indexing: bool,

    /// Maximum page size a single search may request
    #[validate(range(min = 1))]
    pub max_results: usize,

    /// Enable spell-check suggestions
    pub enable_suggestions: bool,

    /// Enable facet computation
    pub enable_facets: bool,

    /// Maximum edit distance for spell-check candidates
    #[validate(range(min = 1, max = 2))]
    pub spell_check_max_distance: u8,

    /// Products created within this many days count as new arrivals
    pub new_arrivals_days: i64,

    /// Currency the catalog prices are stored in
    pub primary_currency: String,

    /// Currencies that get a dedicated price field in the index
    #[validate(nested)]
    pub currencies: Vec<CurrencyConfig>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            index_path: PathBuf::from("./data/search_index"),
            writer_heap_size: 50_000_000, // 50MB
            realtime_indexing: true,
            max_results: 1000,
            enable_suggestions: true,
            enable_facets: true,
            spell_check_max_distance: 2,
            new_arrivals_days: 30,
            primary_currency: "USD".to_string(),
            currencies: vec![CurrencyConfig::new("USD", 1.0)],
        }
    }
}

impl SearchConfig {
    /// Exchange rate for a currency code (case-insensitive)
    pub fn rate_for(&self, currency_code: &str) -> Option<f64> {
        self.currencies
            .iter()
            .find(|c| c.code.eq_ignore_ascii_case(currency_code))
            .map(|c| c.rate)
    }

    /// Rate of the query currency; no currency means the primary one
    pub fn resolve_rate(&self, currency_code: Option<&str>) -> SearchResult<f64> {
        match currency_code.map(str::trim).filter(|c| !c.is_empty()) {
            None => Ok(1.0),
            Some(code) if code.eq_ignore_ascii_case(&self.primary_currency) => {
                Ok(self.rate_for(code).unwrap_or(1.0))
            }
            Some(code) => self.rate_for(code).ok_or_else(|| {
                SearchError::invalid_argument(format!("unknown currency code: {}", code))
            }),
        }
    }
}

/// Builder for SearchConfig
pub struct SearchConfigBuilder {
    config: SearchConfig,
}

impl SearchConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: SearchConfig::default(),
        }
    }

    pub fn index_path(mut self, path: PathBuf) -> Self {
        self.config.index_path = path;
        self
    }

    pub fn writer_heap_size(mut self, size: usize) -> Self {
        self.config.writer_heap_size = size;
        self
    }

    pub fn realtime_indexing(mut self, enabled: bool) -> Self {
        self.config.realtime_indexing = enabled;
        self
    }

    pub fn max_results(mut self, max: usize) -> Self {
        self.config.max_results = max;
        self
    }

    pub fn enable_suggestions(mut self, enabled: bool) -> Self {
        self.config.enable_suggestions = enabled;
        self
    }

    pub fn enable_facets(mut self, enabled: bool) -> Self {
        self.config.enable_facets = enabled;
        self
    }

    pub fn new_arrivals_days(mut self, days: i64) -> Self {
        self.config.new_arrivals_days = days;
        self
    }

    pub fn currency(mut self, code: impl Into<String>, rate: f64) -> Self {
        let code = code.into();
        self.config.currencies.retain(|c| !c.code.eq_ignore_ascii_case(&code));
        self.config.currencies.push(CurrencyConfig::new(code, rate));
        self
    }

    pub fn build(self) -> SearchConfig {
        self.config
    }
}

impl Default for SearchConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(SearchConfig::default().validate().is_ok());
    }

    #[test]
    fn test_builder_replaces_currency() {
        let config = SearchConfigBuilder::new()
            .currency("usd", 1.0)
            .currency("EUR", 0.9)
            .build();
        assert_eq!(config.currencies.len(), 2);
        assert_eq!(config.rate_for("eur"), Some(0.9));
        assert_eq!(config.rate_for("GBP"), None);
    }

    #[test]
    fn test_small_writer_heap_rejected() {
        let config = SearchConfigBuilder::new().writer_heap_size(1024).build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_resolve_rate() {
        let config = SearchConfigBuilder::new().currency("EUR", 0.9).build();
        assert_eq!(config.resolve_rate(None).unwrap(), 1.0);
        assert_eq!(config.resolve_rate(Some("eur")).unwrap(), 0.9);
        assert!(matches!(
            config.resolve_rate(Some("XYZ")),
            Err(SearchError::InvalidArgument(_))
        ));
    }
}
