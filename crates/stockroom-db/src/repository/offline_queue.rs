//! # Offline Queue Repository
//!
//! Durable FIFO of mutations issued while the store was unreachable.
//!
//! ## Entry Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  offline call ──► enqueue()          seq = 41, attempts = 0            │
//! │                      │                                                  │
//! │                      ▼                                                  │
//! │  replay: head() ──► execute against the store                          │
//! │                      │                                                  │
//! │          ┌───────────┴────────────┐                                     │
//! │          ▼                        ▼                                     │
//! │      success                   failure                                  │
//! │   complete(id, remap)     record_failure(id, err)                       │
//! │   one SQL transaction     attempts += 1, stays at head                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! If `complete` fails after the store accepted the command, the entry is
//! left untouched and replays again. Delivery is at least once.
//!
//! `seq` is AUTOINCREMENT, so replay order is enqueue order even across
//! restarts, and a removed seq is never reused.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, SqlitePool};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use stockroom_core::Command;

/// One queued mutation.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct OfflineQueueEntry {
    /// Replay position.
    pub seq: i64,
    pub id: String,
    /// Command kind, e.g. `create_order`.
    pub kind: String,
    pub method: String,
    pub path: String,
    /// The serialized [`Command`].
    pub command: String,
    /// Temporary id handed to the caller for a create made offline.
    pub temp_id: Option<String>,
    pub queued_at: DateTime<Utc>,
    pub attempts: i64,
    pub last_error: Option<String>,
}

impl OfflineQueueEntry {
    /// Decodes the queued command.
    pub fn command(&self) -> DbResult<Command> {
        Ok(serde_json::from_str(&self.command)?)
    }
}

const SELECT_ENTRY: &str = r#"
    SELECT seq, id, kind, method, path, command, temp_id, queued_at, attempts, last_error
    FROM offline_queue
"#;

/// Repository for the `offline_queue` table.
#[derive(Debug, Clone)]
pub struct OfflineQueueRepository {
    pool: SqlitePool,
}

impl OfflineQueueRepository {
    pub fn new(pool: SqlitePool) -> Self {
        OfflineQueueRepository { pool }
    }

    /// Appends a command to the tail of the queue.
    pub async fn enqueue(
        &self,
        command: &Command,
        temp_id: Option<&str>,
    ) -> DbResult<OfflineQueueEntry> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let body = serde_json::to_string(command)?;

        let seq: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO offline_queue (id, kind, method, path, command, temp_id, queued_at, attempts)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0)
            RETURNING seq
            "#,
        )
        .bind(&id)
        .bind(command.kind())
        .bind(command.method().as_str())
        .bind(command.path())
        .bind(&body)
        .bind(temp_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        debug!(seq, kind = command.kind(), path = %command.path(), "Queued offline mutation");

        Ok(OfflineQueueEntry {
            seq,
            id,
            kind: command.kind().to_string(),
            method: command.method().to_string(),
            path: command.path(),
            command: body,
            temp_id: temp_id.map(str::to_string),
            queued_at: now,
            attempts: 0,
            last_error: None,
        })
    }

    /// The oldest entry, if any.
    pub async fn head(&self) -> DbResult<Option<OfflineQueueEntry>> {
        let sql = format!("{SELECT_ENTRY} ORDER BY seq LIMIT 1");
        Ok(sqlx::query_as::<_, OfflineQueueEntry>(&sql)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// Every entry in replay order.
    pub async fn pending(&self) -> DbResult<Vec<OfflineQueueEntry>> {
        let sql = format!("{SELECT_ENTRY} ORDER BY seq");
        Ok(sqlx::query_as::<_, OfflineQueueEntry>(&sql)
            .fetch_all(&self.pool)
            .await?)
    }

    pub async fn len(&self) -> DbResult<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM offline_queue")
            .fetch_one(&self.pool)
            .await?)
    }

    pub async fn is_empty(&self) -> DbResult<bool> {
        Ok(self.len().await? == 0)
    }

    /// Removes an entry. Returns false if it was already gone.
    pub async fn remove(&self, id: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM offline_queue WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Records a failed replay attempt without moving the entry.
    pub async fn record_failure(&self, id: &str, error: &str) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE offline_queue SET attempts = attempts + 1, last_error = ?2 WHERE id = ?1",
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("OfflineQueueEntry", id));
        }
        warn!(id, error, "Offline replay attempt failed");
        Ok(())
    }

    /// Finishes a replayed entry: removes it and, for a create made
    /// offline, points every later queued command at the real id.
    ///
    /// Both happen in one SQL transaction. If this fails the entry is still
    /// at the head and replays again, so delivery is at least once.
    ///
    /// Returns how many later entries were remapped.
    pub async fn complete(&self, id: &str, remap: Option<(&str, &str)>) -> DbResult<u64> {
        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query("DELETE FROM offline_queue WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if removed.rows_affected() == 0 {
            return Err(DbError::not_found("OfflineQueueEntry", id));
        }

        let changed = match remap {
            Some((temp_id, real_id)) => remap_in(&mut tx, temp_id, real_id).await?,
            None => 0,
        };
        tx.commit().await?;

        if let Some((temp_id, real_id)) = remap.filter(|_| changed > 0) {
            debug!(temp_id, real_id, changed, "Remapped temporary id in queued commands");
        }
        Ok(changed)
    }
}

async fn remap_in(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    temp_id: &str,
    real_id: &str,
) -> DbResult<u64> {
    let sql = format!("{SELECT_ENTRY} ORDER BY seq");
    let entries = sqlx::query_as::<_, OfflineQueueEntry>(&sql)
        .fetch_all(&mut **tx)
        .await?;

    let mut changed = 0;
    for entry in entries {
        let mut command = entry.command()?;
        if !command.remap_id(temp_id, real_id) {
            continue;
        }
        sqlx::query("UPDATE offline_queue SET command = ?2, path = ?3 WHERE id = ?1")
            .bind(&entry.id)
            .bind(serde_json::to_string(&command)?)
            .bind(command.path())
            .execute(&mut **tx)
            .await?;
        changed += 1;
    }
    Ok(changed)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    async fn repo() -> OfflineQueueRepository {
        Database::new(DbConfig::in_memory())
            .await
            .unwrap()
            .offline_queue()
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = repo().await;
        let a = queue
            .enqueue(&Command::MarkPaid { id: "a".into() }, None)
            .await
            .unwrap();
        queue
            .enqueue(&Command::DeleteOrder { id: "b".into() }, None)
            .await
            .unwrap();

        assert_eq!(queue.len().await.unwrap(), 2);
        let head = queue.head().await.unwrap().unwrap();
        assert_eq!(head.id, a.id);
        assert_eq!(head.kind, "mark_paid");
        assert_eq!(head.path, "/orders/a");
        assert_eq!(head.command().unwrap(), Command::MarkPaid { id: "a".into() });

        assert!(queue.remove(&a.id).await.unwrap());
        let head = queue.head().await.unwrap().unwrap();
        assert_eq!(head.kind, "delete_order");
    }

    #[tokio::test]
    async fn test_record_failure_keeps_position() {
        let queue = repo().await;
        let a = queue
            .enqueue(&Command::MarkPaid { id: "a".into() }, None)
            .await
            .unwrap();
        queue.enqueue(&Command::SweepRecycleBin, None).await.unwrap();

        queue.record_failure(&a.id, "insufficient stock").await.unwrap();
        queue.record_failure(&a.id, "still insufficient").await.unwrap();

        let head = queue.head().await.unwrap().unwrap();
        assert_eq!(head.id, a.id);
        assert_eq!(head.attempts, 2);
        assert_eq!(head.last_error.as_deref(), Some("still insufficient"));

        assert!(matches!(
            queue.record_failure("missing", "x").await,
            Err(DbError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_complete_removes_and_remaps() {
        let queue = repo().await;
        let create = queue
            .enqueue(&Command::SweepRecycleBin, Some("temp_1"))
            .await
            .unwrap();
        queue
            .enqueue(&Command::MarkPaid { id: "temp_1".into() }, None)
            .await
            .unwrap();
        queue
            .enqueue(&Command::MarkPaid { id: "other".into() }, None)
            .await
            .unwrap();

        let changed = queue
            .complete(&create.id, Some(("temp_1", "real-1")))
            .await
            .unwrap();
        assert_eq!(changed, 1);

        let pending = queue.pending().await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].path, "/orders/real-1");
        assert_eq!(
            pending[0].command().unwrap(),
            Command::MarkPaid { id: "real-1".into() }
        );
        assert_eq!(pending[1].path, "/orders/other");

        assert_eq!(queue.complete(&pending[1].id, None).await.unwrap(), 0);
        assert_eq!(queue.len().await.unwrap(), 1);
        assert!(matches!(
            queue.complete(&create.id, None).await,
            Err(DbError::NotFound { .. })
        ));
    }
}
