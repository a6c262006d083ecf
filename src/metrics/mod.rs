//! Prometheus metrics for catalog searches.
//!
//! Counters track which backend served a search and why the index was
//! bypassed; histograms time the individual search steps. Facet and
//! spell-check failures are swallowed by the services, so they are counted
//! here to stay visible.
//!
//! # Example
//! ```no_run
//! use catalog_search::metrics::{gather_metrics, init_metrics, CATALOG_SEARCHES_TOTAL};
//!
//! init_metrics().ok();
//! CATALOG_SEARCHES_TOTAL.with_label_values(&["linq"]).inc();
//! println!("{}", gather_metrics());
//! ```

use lazy_static::lazy_static;
use prometheus::{CounterVec, HistogramOpts, HistogramVec, Opts, Registry};
use std::future::Future;
use std::time::Instant;

lazy_static! {
    /// Global Prometheus registry for all metrics
    pub static ref PROMETHEUS_REGISTRY: Registry = Registry::new();

    /// Total number of searches served
    ///
    /// Labels: backend
    pub static ref CATALOG_SEARCHES_TOTAL: CounterVec = CounterVec::new(
        Opts::new("searches_total", "Total number of catalog searches")
            .namespace("catalog"),
        &["backend"]
    ).expect("Failed to create CATALOG_SEARCHES_TOTAL metric");

    /// Searches that bypassed the index
    ///
    /// Labels: reason (direct, no_provider, index_missing)
    pub static ref CATALOG_SEARCH_FALLBACKS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("search_fallbacks_total", "Searches served by the relational fallback")
            .namespace("catalog"),
        &["reason"]
    ).expect("Failed to create CATALOG_SEARCH_FALLBACKS_TOTAL metric");

    /// Duration of individual search steps in seconds
    ///
    /// Labels: backend, step (count, hits, facets, suggestions)
    pub static ref CATALOG_SEARCH_STEP_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "search_step_duration_seconds",
            "Duration of catalog search steps in seconds"
        )
        .namespace("catalog")
        .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
        &["backend", "step"]
    ).expect("Failed to create CATALOG_SEARCH_STEP_DURATION_SECONDS metric");

    /// Ancillary concerns that failed and were dropped from a result
    ///
    /// Labels: concern (facets, suggestions, labels)
    pub static ref CATALOG_SEARCH_DEGRADED_TOTAL: CounterVec = CounterVec::new(
        Opts::new("search_degraded_total", "Search results returned without an ancillary concern")
            .namespace("catalog"),
        &["concern"]
    ).expect("Failed to create CATALOG_SEARCH_DEGRADED_TOTAL metric");

    /// Products written by index rebuilds
    pub static ref CATALOG_INDEXED_DOCUMENTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("indexed_documents_total", "Product documents written to the index")
            .namespace("catalog"),
        &["scope"]
    ).expect("Failed to create CATALOG_INDEXED_DOCUMENTS_TOTAL metric");
}

/// Register all metrics with the global registry
pub fn init_metrics() -> Result<(), prometheus::Error> {
    PROMETHEUS_REGISTRY.register(Box::new(CATALOG_SEARCHES_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(CATALOG_SEARCH_FALLBACKS_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(CATALOG_SEARCH_STEP_DURATION_SECONDS.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(CATALOG_SEARCH_DEGRADED_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(CATALOG_INDEXED_DOCUMENTS_TOTAL.clone()))?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Encode all registered metrics in the Prometheus text format
pub fn gather_metrics() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = PROMETHEUS_REGISTRY.gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::from("# Error encoding metrics\n");
    }

    String::from_utf8(buffer).unwrap_or_else(|e| {
        tracing::error!("Failed to convert metrics to string: {}", e);
        String::from("# Error converting metrics\n")
    })
}

/// Time an async search step
pub async fn measure_step<F, T>(backend: &str, step: &str, f: F) -> T
where
    F: Future<Output = T>,
{
    let start = Instant::now();
    let result = f.await;
    CATALOG_SEARCH_STEP_DURATION_SECONDS
        .with_label_values(&[backend, step])
        .observe(start.elapsed().as_secs_f64());
    result
}

/// Record a dropped ancillary concern
pub fn record_degraded(concern: &str) {
    CATALOG_SEARCH_DEGRADED_TOTAL
        .with_label_values(&[concern])
        .inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_initialization() {
        // Registration can only succeed once per process
        let result = init_metrics();
        assert!(result.is_ok() || result.is_err());
    }

    #[test]
    fn test_degraded_counter() {
        record_degraded("facets");
        let value = CATALOG_SEARCH_DEGRADED_TOTAL
            .with_label_values(&["facets"])
            .get();
        assert!(value >= 1.0);
    }

    #[tokio::test]
    async fn test_measure_step_returns_value() {
        let value = measure_step("linq", "count", async { 42 }).await;
        assert_eq!(value, 42);
        let count = CATALOG_SEARCH_STEP_DURATION_SECONDS
            .with_label_values(&["linq", "count"])
            .get_sample_count();
        assert!(count >= 1);
    }

    #[test]
    fn test_gather_metrics() {
        let _ = init_metrics();
        CATALOG_SEARCHES_TOTAL.with_label_values(&["index"]).inc();
        let metrics = gather_metrics();
        assert!(metrics.contains("catalog_search"));
    }
}
