//! Search lifecycle events and the indexing notifier

use crate::search::catalog_query::CatalogSearchQuery;
use crate::search::result::CatalogSearchResult;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;

/// Published before a search executes
#[derive(Debug)]
pub struct CatalogSearchingEvent<'a> {
    pub query: &'a CatalogSearchQuery,
}

/// Published after a search; handlers may replace `result`
#[derive(Debug)]
pub struct CatalogSearchedEvent {
    pub result: CatalogSearchResult,
}

impl CatalogSearchedEvent {
    pub fn new(result: CatalogSearchResult) -> Self {
        Self { result }
    }
}

/// Observes catalog searches
#[async_trait]
pub trait CatalogSearchEventHandler: Send + Sync {
    async fn on_searching(&self, _event: &CatalogSearchingEvent<'_>) {}

    async fn on_searched(&self, _event: &mut CatalogSearchedEvent) {}
}

/// Fans search events out to registered handlers in registration order
#[derive(Clone, Default)]
pub struct EventPublisher {
    handlers: Arc<RwLock<Vec<Arc<dyn CatalogSearchEventHandler>>>>,
}

impl EventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, handler: Arc<dyn CatalogSearchEventHandler>) {
        self.handlers.write().push(handler);
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.read().len()
    }

    fn snapshot(&self) -> Vec<Arc<dyn CatalogSearchEventHandler>> {
        self.handlers.read().clone()
    }

    pub async fn publish_searching(&self, event: &CatalogSearchingEvent<'_>) {
        for handler in self.snapshot() {
            handler.on_searching(event).await;
        }
    }

    pub async fn publish_searched(&self, event: &mut CatalogSearchedEvent) {
        for handler in self.snapshot() {
            handler.on_searched(event).await;
        }
    }
}

/// Receives hints that the search index should be (re)built
pub trait Notifier: Send + Sync {
    fn indexing_required(&self, scope: &str);
}

/// Notifier that only logs
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn indexing_required(&self, scope: &str) {
        tracing::warn!(scope = scope, "Search index is missing; rebuild it to enable indexed search");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Recorder {
        searching: AtomicUsize,
        searched: AtomicUsize,
    }

    #[async_trait]
    impl CatalogSearchEventHandler for Recorder {
        async fn on_searching(&self, _event: &CatalogSearchingEvent<'_>) {
            self.searching.fetch_add(1, Ordering::SeqCst);
        }

        async fn on_searched(&self, event: &mut CatalogSearchedEvent) {
            self.searched.fetch_add(1, Ordering::SeqCst);
            event.result.spell_checker_suggestions.push("replaced".into());
        }
    }

    #[tokio::test]
    async fn test_publish_reaches_handlers() {
        let publisher = EventPublisher::new();
        let recorder = Arc::new(Recorder {
            searching: AtomicUsize::new(0),
            searched: AtomicUsize::new(0),
        });
        publisher.subscribe(recorder.clone());
        assert_eq!(publisher.handler_count(), 1);

        let query = CatalogSearchQuery::new();
        publisher
            .publish_searching(&CatalogSearchingEvent { query: &query })
            .await;

        let mut event = CatalogSearchedEvent::new(CatalogSearchResult::empty(query.clone()));
        publisher.publish_searched(&mut event).await;

        assert_eq!(recorder.searching.load(Ordering::SeqCst), 1);
        assert_eq!(recorder.searched.load(Ordering::SeqCst), 1);
        assert_eq!(event.result.spell_checker_suggestions, vec!["replaced".to_string()]);
    }
}
