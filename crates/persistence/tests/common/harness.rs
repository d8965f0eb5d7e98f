//! Wiring of stores, indexes and services for tests.

use std::sync::Arc;

use qa_persistence::backends::memory::{MemorySearchIndex, MemoryStore};
use qa_persistence::config::IndexingConfig;
use qa_persistence::core::{QuestionStorage, ViewStorage};
use qa_persistence::search::{IndexSynchronizer, SearchIndexWriter};
use qa_persistence::service::{QuestionService, QuestionViewedService};

use super::fixtures::seed_users;

/// Everything a pipeline test needs.
pub struct TestContext<S, W> {
    /// The entity store.
    pub store: Arc<S>,
    /// The search index.
    pub index: Arc<W>,
    /// Synchronizer shared by the question service.
    pub synchronizer: Arc<IndexSynchronizer>,
    /// The question write pipeline.
    pub questions: QuestionService,
    /// The view tracker.
    pub views: QuestionViewedService,
}

impl<S, W> TestContext<S, W>
where
    S: QuestionStorage + ViewStorage + 'static,
    W: SearchIndexWriter + 'static,
{
    /// Wires `store` and `index` together and seeds the default users.
    pub async fn new(store: S, index: W, config: IndexingConfig) -> Self {
        let store = Arc::new(store);
        let index = Arc::new(index);
        seed_users(store.as_ref()).await;

        let synchronizer = Arc::new(IndexSynchronizer::new(
            store.clone(),
            index.clone(),
            config,
        ));
        let questions = QuestionService::new(store.clone(), synchronizer.clone());
        let views = QuestionViewedService::new(store.clone());

        Self {
            store,
            index,
            synchronizer,
            questions,
            views,
        }
    }
}

/// A context over the in-memory store and index.
pub type MemoryContext = TestContext<MemoryStore, MemorySearchIndex>;

/// Creates an in-memory context with the given indexing config.
pub async fn memory_context(config: IndexingConfig) -> MemoryContext {
    TestContext::new(MemoryStore::new(), MemorySearchIndex::new(), config).await
}
