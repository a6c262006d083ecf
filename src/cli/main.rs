use anyhow::Context;
use catalog_search::catalog::{load_catalog, ProductLoadFlags};
use catalog_search::config::Config;
use catalog_search::search::{
    CatalogIndexer, CatalogSearchQuery, CatalogSearchService, EventPublisher, FacetDescriptor,
    IndexManager, ProductSorting, SearchMode, TantivyIndexProvider, CATALOG_SCOPE,
};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "catalog-search-cli")]
#[command(about = "Catalog search CLI", long_about = None)]
struct Cli {
    /// Configuration file (defaults to CATALOG_SEARCH_CONFIG)
    #[arg(short, long)]
    config: Option<String>,

    /// Catalog snapshot in JSON
    #[arg(long, default_value = "data/catalog.json")]
    catalog: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build or rebuild the product index
    Index,

    /// Search the catalog
    Search {
        /// Search term
        #[arg(short, long)]
        term: Option<String>,

        /// Term matching: contains, startswith or exactmatch
        #[arg(short, long, default_value = "Contains")]
        mode: SearchMode,

        /// Category ids (any of)
        #[arg(long, value_delimiter = ',')]
        category: Vec<i64>,

        /// Manufacturer ids (any of)
        #[arg(long, value_delimiter = ',')]
        manufacturer: Vec<i64>,

        /// Minimum price
        #[arg(long)]
        price_min: Option<f64>,

        /// Maximum price
        #[arg(long)]
        price_max: Option<f64>,

        /// Currency of prices and price filters
        #[arg(long)]
        currency: Option<String>,

        /// Only products that can be ordered
        #[arg(long)]
        available_only: bool,

        /// Ordering, e.g. NameAsc or PriceDesc
        #[arg(short, long, default_value = "Relevance")]
        sort: ProductSorting,

        #[arg(short, long, default_value = "0")]
        page: i64,

        #[arg(short = 's', long, default_value = "20")]
        page_size: i64,

        /// Facet groups to compute, e.g. categoryid,price
        #[arg(short, long, value_delimiter = ',')]
        facets: Vec<String>,

        /// Return spelling suggestions for weak terms
        #[arg(long)]
        suggest: bool,

        /// Skip the index and search the catalog directly
        #[arg(short, long)]
        direct: bool,
    },

    /// Print Prometheus metrics
    Metrics,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("Failed to load configuration")?;

    init_tracing(&config);

    if config.observability.prometheus_enabled {
        if let Err(e) = catalog_search::metrics::init_metrics() {
            tracing::warn!("Failed to initialize metrics: {}", e);
        }
    }

    validator::Validate::validate(&config.search).context("Invalid search configuration")?;
    let search_config = Arc::new(config.search.clone());

    let load = || {
        load_catalog(&cli.catalog)
            .with_context(|| format!("Failed to load catalog {}", cli.catalog.display()))
    };
    let provider = Arc::new(TantivyIndexProvider::open(search_config.clone())?);

    match cli.command {
        Commands::Index => {
            let catalog = load()?;
            let indexer = CatalogIndexer::new(catalog.clone(), search_config.clone());
            let indexed = indexer.rebuild(&provider.store(CATALOG_SCOPE)).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "scope": CATALOG_SCOPE,
                    "indexed": indexed,
                    "path": provider.store(CATALOG_SCOPE).path(),
                }))?
            );
        }

        Commands::Search {
            term,
            mode,
            category,
            manufacturer,
            price_min,
            price_max,
            currency,
            available_only,
            sort,
            page,
            page_size,
            facets,
            suggest,
            direct,
        } => {
            let catalog = load()?;
            let mut query = match term {
                Some(term) => CatalogSearchQuery::with_term(Vec::new(), term, mode),
                None => CatalogSearchQuery::new(),
            }
            .published_only(true)
            .with_category_ids(None, &category)
            .with_manufacturer_ids(None, &manufacturer)
            .available_only(available_only)
            .sort_by(sort)
            .with_currency_code(currency.unwrap_or_else(|| search_config.primary_currency.clone()));

            query = query
                .price_between(price_min, price_max, None, None)?
                .paged(page, page_size)?;
            if !facets.is_empty() {
                query = query.build_facet_map(true);
                for key in facets {
                    query = query.with_facet(FacetDescriptor::new(key));
                }
            }
            if suggest {
                query = query.check_spelling(3, 4, 3);
            }

            let index_manager = IndexManager::new();
            index_manager.register_provider(CATALOG_SCOPE, provider.clone());
            let service = CatalogSearchService::new(
                index_manager,
                catalog.clone(),
                catalog,
                EventPublisher::new(),
                search_config,
            );

            let result = service.search(query, ProductLoadFlags::empty(), direct).await?;
            let hits = result.hits().await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "engine": &result.engine,
                    "total_hits": result.total_hits_count,
                    "page_index": hits.page_index,
                    "page_size": hits.page_size,
                    "total_pages": hits.total_pages(),
                    "hits": &hits[..],
                    "facets": &result.facets,
                    "suggestions": &result.spell_checker_suggestions,
                }))?
            );
        }

        Commands::Metrics => {
            print!("{}", catalog_search::metrics::gather_metrics());
        }
    }

    Ok(())
}

fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("catalog_search={}", config.observability.log_level).into());

    // Logs go to stderr so that stdout stays valid JSON
    if config.observability.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
