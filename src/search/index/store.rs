//! On-disk index stores and their provider

use crate::search::catalog_query::CatalogSearchQuery;
use crate::search::config::SearchConfig;
use crate::search::engine::{IndexProvider, IndexStore, SearchEngine};
use crate::search::error::{SearchError, SearchResult};
use crate::search::index::document::build_catalog_schema;
use crate::search::index::engine::TantivySearchEngine;
use dashmap::DashMap;
use parking_lot::RwLock as SyncRwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tantivy::schema::Schema;
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy};
use tokio::sync::RwLock;

/// An opened index with its reader
#[derive(Clone)]
pub struct OpenIndex {
    pub index: Index,
    pub reader: IndexReader,
    pub schema: Schema,
}

/// A named index store under `<index_path>/<scope>`
pub struct TantivyIndexStore {
    scope: String,
    path: PathBuf,
    schema: Schema,
    writer_heap_size: usize,
    opened: SyncRwLock<Option<OpenIndex>>,
    /// Index writer (wrapped in RwLock for thread-safety)
    writer: RwLock<Option<IndexWriter>>,
}

impl TantivyIndexStore {
    pub fn new(scope: impl Into<String>, path: PathBuf, config: &SearchConfig) -> Self {
        Self {
            scope: scope.into(),
            path,
            schema: build_catalog_schema(&config.currencies),
            writer_heap_size: config.writer_heap_size,
            opened: SyncRwLock::new(None),
            writer: RwLock::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Check if an index exists at the given path
    fn index_exists(path: &Path) -> bool {
        path.join("meta.json").exists()
    }

    /// Open the committed index, failing when none exists
    pub fn open(&self) -> SearchResult<OpenIndex> {
        if let Some(opened) = self.opened.read().as_ref() {
            return Ok(opened.clone());
        }
        if !Self::index_exists(&self.path) {
            return Err(SearchError::IndexNotFound(self.scope.clone()));
        }

        let index = Index::open_in_dir(&self.path)?;
        let opened = self.attach(index)?;
        *self.opened.write() = Some(opened.clone());
        Ok(opened)
    }

    fn attach(&self, index: Index) -> SearchResult<OpenIndex> {
        let reader: IndexReader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;
        let schema = index.schema();
        Ok(OpenIndex {
            index,
            reader,
            schema,
        })
    }

    /// Run `f` with the index writer, creating the index on first use.
    ///
    /// The reader is reloaded after `f` returns so that committed changes
    /// become visible to subsequent searches.
    pub async fn with_writer<T>(
        &self,
        f: impl FnOnce(&mut IndexWriter, &Schema) -> SearchResult<T>,
    ) -> SearchResult<T> {
        let mut guard = self.writer.write().await;

        if guard.is_none() {
            std::fs::create_dir_all(&self.path).map_err(|e| {
                SearchError::IndexingFailed(format!("Failed to create index directory: {}", e))
            })?;
            let index = if Self::index_exists(&self.path) {
                Index::open_in_dir(&self.path)?
            } else {
                tracing::info!(scope = %self.scope, path = %self.path.display(), "Creating search index");
                Index::create_in_dir(&self.path, self.schema.clone())?
            };
            let writer = index.writer(self.writer_heap_size).map_err(|e| {
                SearchError::IndexingFailed(format!("Failed to create writer: {}", e))
            })?;
            *self.opened.write() = Some(self.attach(index)?);
            *guard = Some(writer);
        }

        let writer = guard
            .as_mut()
            .ok_or_else(|| SearchError::IndexingFailed("index writer unavailable".to_string()))?;
        let result = f(writer, &self.schema)?;

        if let Some(opened) = self.opened.read().as_ref() {
            opened.reader.reload()?;
        }
        Ok(result)
    }

    /// Number of searchable documents
    pub fn num_docs(&self) -> SearchResult<u64> {
        Ok(self.open()?.reader.searcher().num_docs())
    }
}

impl IndexStore for TantivyIndexStore {
    fn scope(&self) -> &str {
        &self.scope
    }

    fn exists(&self) -> bool {
        Self::index_exists(&self.path)
    }
}

/// Provides Tantivy index stores below the configured index path
pub struct TantivyIndexProvider {
    config: Arc<SearchConfig>,
    stores: DashMap<String, Arc<TantivyIndexStore>>,
}

impl TantivyIndexProvider {
    pub fn open(config: Arc<SearchConfig>) -> SearchResult<Self> {
        std::fs::create_dir_all(&config.index_path).map_err(|e| {
            SearchError::InvalidConfiguration(format!(
                "Failed to create index directory {}: {}",
                config.index_path.display(),
                e
            ))
        })?;
        Ok(Self {
            config,
            stores: DashMap::new(),
        })
    }

    /// The store of `scope`, created on first access
    pub fn store(&self, scope: &str) -> Arc<TantivyIndexStore> {
        self.stores
            .entry(scope.to_string())
            .or_insert_with(|| {
                Arc::new(TantivyIndexStore::new(
                    scope,
                    self.config.index_path.join(scope),
                    &self.config,
                ))
            })
            .clone()
    }
}

impl IndexProvider for TantivyIndexProvider {
    fn get_index_store(&self, scope: &str) -> SearchResult<Arc<dyn IndexStore>> {
        Ok(self.store(scope))
    }

    fn get_search_engine(
        &self,
        store: &dyn IndexStore,
        query: &CatalogSearchQuery,
    ) -> SearchResult<Box<dyn SearchEngine>> {
        let opened = self.store(store.scope()).open()?;
        Ok(Box::new(TantivySearchEngine::new(
            opened,
            query.clone(),
            self.config.clone(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::config::SearchConfigBuilder;
    use crate::search::engine::CATALOG_SCOPE;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_store_exists_after_first_commit() {
        let temp_dir = TempDir::new().unwrap();
        let config = SearchConfigBuilder::new()
            .index_path(temp_dir.path().to_path_buf())
            .build();
        let provider = TantivyIndexProvider::open(Arc::new(config)).unwrap();

        let store = provider.get_index_store(CATALOG_SCOPE).unwrap();
        assert!(!store.exists());
        assert!(matches!(
            provider.store(CATALOG_SCOPE).open(),
            Err(SearchError::IndexNotFound(_))
        ));

        provider
            .store(CATALOG_SCOPE)
            .with_writer(|writer, _| {
                writer.commit()?;
                Ok(())
            })
            .await
            .unwrap();

        assert!(store.exists());
        assert_eq!(provider.store(CATALOG_SCOPE).num_docs().unwrap(), 0);
    }
}
