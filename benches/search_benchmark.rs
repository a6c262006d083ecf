//! Criterion benchmarks for catalog search
//!
//! These benchmarks measure:
//! - Relational fallback search with category and price filters
//! - Indexed search for the same queries
//! - Facet computation on both backends

use catalog_search::catalog::{InMemoryCatalog, Product, ProductLoadFlags};
use catalog_search::search::{
    CatalogIndexer, CatalogSearchQuery, CatalogSearchService, EventPublisher, FacetDescriptor,
    IndexManager, SearchConfigBuilder, SearchMode, TantivyIndexProvider, CATALOG_SCOPE,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::runtime::Runtime;

const CATALOG_SIZES: [i64; 2] = [1_000, 10_000];

fn build_catalog(size: i64) -> Arc<InMemoryCatalog> {
    let catalog = InMemoryCatalog::new();
    for id in 1..=size {
        let product = Product::new(id, format!("Product {} lamp", id), (id % 500) as f64 + 1.0)
            .in_category(id % 20 + 1, (id % 7) as i32)
            .with_manufacturer(id % 10 + 1, 0);
        catalog.save_product(product);
    }
    Arc::new(catalog)
}

fn build_service(rt: &Runtime, catalog: Arc<InMemoryCatalog>, temp_dir: &TempDir) -> CatalogSearchService {
    let config = Arc::new(
        SearchConfigBuilder::new()
            .index_path(temp_dir.path().to_path_buf())
            .build(),
    );
    let provider = Arc::new(TantivyIndexProvider::open(config.clone()).unwrap());
    rt.block_on(
        CatalogIndexer::new(catalog.clone(), config.clone()).rebuild(&provider.store(CATALOG_SCOPE)),
    )
    .unwrap();

    let index_manager = IndexManager::new();
    index_manager.register_provider(CATALOG_SCOPE, provider);
    CatalogSearchService::new(index_manager, catalog.clone(), catalog, EventPublisher::new(), config)
}

fn filtered_query() -> CatalogSearchQuery {
    CatalogSearchQuery::new()
        .published_only(true)
        .with_category_ids(None, &[1, 2, 3])
        .with_currency_code("USD")
        .price_between(Some(50.0), Some(250.0), None, None)
        .unwrap()
        .slice(0, 24)
        .unwrap()
}

/// Benchmark filtered searches on both backends
fn bench_filtered_search(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("filtered_search");

    for size in CATALOG_SIZES {
        let temp_dir = TempDir::new().unwrap();
        let service = build_service(&rt, build_catalog(size), &temp_dir);

        for (backend, direct) in [("tantivy", false), ("linq", true)] {
            group.bench_with_input(BenchmarkId::new(backend, size), &direct, |b, &direct| {
                b.to_async(&rt).iter(|| async {
                    let result = service
                        .search(filtered_query(), ProductLoadFlags::empty(), direct)
                        .await
                        .unwrap();
                    black_box(result.total_hits_count)
                });
            });
        }
    }

    group.finish();
}

/// Benchmark term search with facets
fn bench_term_search_with_facets(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let temp_dir = TempDir::new().unwrap();
    let service = build_service(&rt, build_catalog(CATALOG_SIZES[0]), &temp_dir);
    let mut group = c.benchmark_group("term_search_with_facets");

    for (backend, direct) in [("tantivy", false), ("linq", true)] {
        group.bench_function(backend, |b| {
            b.to_async(&rt).iter(|| async {
                let query = CatalogSearchQuery::with_term(vec![], "lamp", SearchMode::Contains)
                    .build_facet_map(true)
                    .with_facet(FacetDescriptor::new("categoryid"))
                    .with_facet(FacetDescriptor::new("manufacturerid"))
                    .slice(0, 24)
                    .unwrap();
                let result = service
                    .search(query, ProductLoadFlags::empty(), direct)
                    .await
                    .unwrap();
                black_box(result.facets.len())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_filtered_search, bench_term_search_with_facets);
criterion_main!(benches);
