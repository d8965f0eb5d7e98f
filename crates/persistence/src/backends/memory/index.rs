//! In-memory search index.

use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use crate::error::IndexError;
use crate::search::SearchIndexWriter;
use crate::types::{IndexDocument, QuestionId};

/// A call received by a [`MemorySearchIndex`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexCall {
    /// `upsert(id, ..)`
    Upsert(QuestionId),
    /// `delete(id)`
    Delete(QuestionId),
}

/// A search index held in memory.
///
/// Every call is recorded, including calls that fail. Failures and latency
/// can be injected to exercise retry and timeout handling.
#[derive(Debug, Default)]
pub struct MemorySearchIndex {
    documents: RwLock<BTreeMap<QuestionId, IndexDocument>>,
    calls: Mutex<Vec<IndexCall>>,
    failures: Mutex<VecDeque<IndexError>>,
    latency: Mutex<Option<Duration>>,
}

impl MemorySearchIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next call fail with `error`. Queued failures are consumed in order.
    pub fn fail_next(&self, error: IndexError) {
        self.failures.lock().push_back(error);
    }

    /// Makes the next `times` calls fail with `error`.
    pub fn fail_times(&self, times: usize, error: IndexError) {
        let mut failures = self.failures.lock();
        for _ in 0..times {
            failures.push_back(error.clone());
        }
    }

    /// Delays every call by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    /// Returns every call received so far.
    pub fn calls(&self) -> Vec<IndexCall> {
        self.calls.lock().clone()
    }

    /// Forgets recorded calls.
    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    /// Returns the stored document for a question.
    pub fn document(&self, id: QuestionId) -> Option<IndexDocument> {
        self.documents.read().get(&id).cloned()
    }

    async fn begin(&self, call: IndexCall) -> Result<(), IndexError> {
        self.calls.lock().push(call);

        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        match self.failures.lock().pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SearchIndexWriter for MemorySearchIndex {
    fn index_name(&self) -> &'static str {
        "memory"
    }

    async fn upsert(&self, id: QuestionId, document: &IndexDocument) -> Result<(), IndexError> {
        self.begin(IndexCall::Upsert(id)).await?;
        self.documents.write().insert(id, document.clone());
        Ok(())
    }

    async fn delete(&self, id: QuestionId) -> Result<bool, IndexError> {
        self.begin(IndexCall::Delete(id)).await?;
        Ok(self.documents.write().remove(&id).is_some())
    }

    async fn get(&self, id: QuestionId) -> Result<Option<IndexDocument>, IndexError> {
        Ok(self.document(id))
    }

    async fn count(&self) -> Result<u64, IndexError> {
        Ok(self.documents.read().len() as u64)
    }
}
