//! Writes catalog products into an index store

use crate::catalog::{CatalogRepository, Product, PRODUCT_ENTITY};
use crate::metrics::CATALOG_INDEXED_DOCUMENTS_TOTAL;
use crate::search::config::SearchConfig;
use crate::search::engine::IndexStore;
use crate::search::error::{SearchError, SearchResult};
use crate::search::index::document::ProductDocument;
use crate::search::index::store::TantivyIndexStore;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tantivy::Term;

/// Builds and maintains the product index of one store
pub struct CatalogIndexer {
    repository: Arc<dyn CatalogRepository>,
    config: Arc<SearchConfig>,
}

/// Side tables needed to index products
struct Restrictions {
    stores: HashMap<i64, Vec<i64>>,
    roles: HashMap<i64, Vec<i64>>,
}

impl Restrictions {
    fn of(&self, product: &Product) -> (&[i64], &[i64]) {
        let stores = self.stores.get(&product.id).map(Vec::as_slice).unwrap_or(&[]);
        let roles = self.roles.get(&product.id).map(Vec::as_slice).unwrap_or(&[]);
        (stores, roles)
    }
}

impl CatalogIndexer {
    pub fn new(repository: Arc<dyn CatalogRepository>, config: Arc<SearchConfig>) -> Self {
        Self { repository, config }
    }

    fn indexable(product: &Product) -> bool {
        !product.deleted && !product.is_system_product
    }

    async fn restrictions(&self) -> SearchResult<Restrictions> {
        let mut stores: HashMap<i64, Vec<i64>> = HashMap::new();
        for mapping in self.repository.store_mappings(PRODUCT_ENTITY).await? {
            stores.entry(mapping.entity_id).or_default().push(mapping.store_id);
        }
        let mut roles: HashMap<i64, Vec<i64>> = HashMap::new();
        for record in self.repository.acl_records(PRODUCT_ENTITY).await? {
            roles.entry(record.entity_id).or_default().push(record.customer_role_id);
        }
        Ok(Restrictions { stores, roles })
    }

    /// Replace the whole content of `store` with the current catalog
    pub async fn rebuild(&self, store: &TantivyIndexStore) -> SearchResult<usize> {
        let products = self.repository.products().await?;
        let restrictions = self.restrictions().await?;
        let now = Utc::now();
        let currencies = &self.config.currencies;

        tracing::info!(scope = store.scope(), products = products.len(), "Rebuilding search index");

        let indexed = store
            .with_writer(|writer, schema| {
                writer.delete_all_documents().map_err(|e| {
                    SearchError::IndexingFailed(format!("Failed to clear index: {}", e))
                })?;

                let mut indexed = 0;
                for product in products.iter().filter(|p| Self::indexable(p)) {
                    let (store_ids, role_ids) = restrictions.of(product);
                    let document = ProductDocument::new(product, store_ids, role_ids, currencies, now);
                    writer.add_document(document.to_tantivy_doc(schema)).map_err(|e| {
                        SearchError::IndexingFailed(format!(
                            "Failed to add product {}: {}",
                            product.id, e
                        ))
                    })?;
                    indexed += 1;
                }

                writer
                    .commit()
                    .map_err(|e| SearchError::IndexingFailed(format!("Failed to commit batch: {}", e)))?;
                Ok(indexed)
            })
            .await?;

        CATALOG_INDEXED_DOCUMENTS_TOTAL
            .with_label_values(&[store.scope()])
            .inc_by(indexed as f64);
        tracing::info!(scope = store.scope(), indexed, "Search index rebuilt");
        Ok(indexed)
    }

    /// Re-index `products`, removing deleted and system products from the index
    pub async fn index_products(
        &self,
        store: &TantivyIndexStore,
        products: &[Product],
    ) -> SearchResult<usize> {
        let restrictions = self.restrictions().await?;
        let now = Utc::now();
        let currencies = &self.config.currencies;
        let realtime = self.config.realtime_indexing;

        let indexed = store
            .with_writer(|writer, schema| {
                let id_field = schema
                    .get_field("id")
                    .map_err(|e| SearchError::IndexingFailed(e.to_string()))?;

                let mut indexed = 0;
                for product in products {
                    // Delete existing document with same ID first
                    writer.delete_term(Term::from_field_i64(id_field, product.id));
                    if !Self::indexable(product) {
                        continue;
                    }
                    let (store_ids, role_ids) = restrictions.of(product);
                    let document = ProductDocument::new(product, store_ids, role_ids, currencies, now);
                    writer.add_document(document.to_tantivy_doc(schema)).map_err(|e| {
                        SearchError::IndexingFailed(format!(
                            "Failed to add product {}: {}",
                            product.id, e
                        ))
                    })?;
                    indexed += 1;
                }

                // Commit if real-time indexing is enabled
                if realtime {
                    writer.commit().map_err(|e| {
                        SearchError::IndexingFailed(format!("Failed to commit products: {}", e))
                    })?;
                }
                Ok(indexed)
            })
            .await?;

        CATALOG_INDEXED_DOCUMENTS_TOTAL
            .with_label_values(&[store.scope()])
            .inc_by(indexed as f64);
        Ok(indexed)
    }

    /// Remove products from the index
    pub async fn delete_products(&self, store: &TantivyIndexStore, ids: &[i64]) -> SearchResult<()> {
        let realtime = self.config.realtime_indexing;
        store
            .with_writer(|writer, schema| {
                let id_field = schema
                    .get_field("id")
                    .map_err(|e| SearchError::IndexingFailed(e.to_string()))?;
                for id in ids {
                    writer.delete_term(Term::from_field_i64(id_field, *id));
                }
                if realtime {
                    writer.commit().map_err(|e| {
                        SearchError::IndexingFailed(format!("Failed to commit deletion: {}", e))
                    })?;
                }
                Ok(())
            })
            .await
    }

    /// Commit pending changes when real-time indexing is disabled
    pub async fn commit(&self, store: &TantivyIndexStore) -> SearchResult<()> {
        store
            .with_writer(|writer, _| {
                writer
                    .commit()
                    .map_err(|e| SearchError::IndexingFailed(format!("Failed to commit: {}", e)))?;
                Ok(())
            })
            .await
    }
}
