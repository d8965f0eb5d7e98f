//! Search index stored in the SQLite database.

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{Connection, ErrorCode, OptionalExtension, params};

use crate::error::IndexError;
use crate::search::SearchIndexWriter;
use crate::types::{IndexDocument, QuestionId};

use super::SqliteBackend;

/// Keeps projected documents in the `question_index` table.
///
/// Busy and locked databases, and pool exhaustion, are reported as transient
/// so the synchronizer retries them. Every call runs on tokio's blocking
/// pool: a write waiting out `busy_timeout_ms` never stalls a runtime thread,
/// and the synchronizer's write timeout can give up on it. The abandoned
/// statement still completes or fails on its own.
#[derive(Debug, Clone)]
pub struct SqliteSearchIndex {
    backend: SqliteBackend,
}

fn classify(e: rusqlite::Error) -> IndexError {
    match &e {
        rusqlite::Error::SqliteFailure(err, _)
            if matches!(err.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) =>
        {
            IndexError::Transient {
                message: e.to_string(),
            }
        }
        _ => IndexError::Permanent {
            message: e.to_string(),
        },
    }
}

impl SqliteSearchIndex {
    pub(crate) fn new(backend: SqliteBackend) -> Self {
        Self { backend }
    }

    /// Runs `f` on a pooled connection inside `spawn_blocking`.
    async fn blocking<T, F>(&self, f: F) -> Result<T, IndexError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, IndexError> + Send + 'static,
    {
        let pool = self.backend.pool().clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get().map_err(|e| IndexError::Transient {
                message: e.to_string(),
            })?;
            f(&conn)
        })
        .await
        .map_err(|e| IndexError::Permanent {
            message: format!("Index task failed: {}", e),
        })?
    }
}

#[async_trait]
impl SearchIndexWriter for SqliteSearchIndex {
    fn index_name(&self) -> &'static str {
        "sqlite"
    }

    async fn upsert(&self, id: QuestionId, document: &IndexDocument) -> Result<(), IndexError> {
        let bytes = document.to_bytes().map_err(|e| IndexError::Permanent {
            message: format!("Failed to serialize document: {}", e),
        })?;
        let json = String::from_utf8(bytes).map_err(|e| IndexError::Permanent {
            message: e.to_string(),
        })?;

        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO question_index (id, document, indexed_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET document = excluded.document,
                                               indexed_at = excluded.indexed_at",
                params![id.get(), json, Utc::now().to_rfc3339()],
            )
            .map_err(classify)?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, id: QuestionId) -> Result<bool, IndexError> {
        self.blocking(move |conn| {
            let affected = conn
                .execute("DELETE FROM question_index WHERE id = ?1", [id.get()])
                .map_err(classify)?;
            Ok(affected > 0)
        })
        .await
    }

    async fn get(&self, id: QuestionId) -> Result<Option<IndexDocument>, IndexError> {
        let json: Option<String> = self
            .blocking(move |conn| {
                conn.query_row(
                    "SELECT document FROM question_index WHERE id = ?1",
                    [id.get()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(classify)
            })
            .await?;

        json.map(|json| {
            IndexDocument::from_bytes(json.as_bytes()).map_err(|e| IndexError::Permanent {
                message: format!("Corrupt document for question {}: {}", id, e),
            })
        })
        .transpose()
    }

    async fn count(&self) -> Result<u64, IndexError> {
        let count: i64 = self
            .blocking(|conn| {
                conn.query_row("SELECT COUNT(*) FROM question_index", [], |row| row.get(0))
                    .map_err(classify)
            })
            .await?;
        Ok(count as u64)
    }
}
