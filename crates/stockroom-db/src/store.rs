//! # Document Store
//!
//! JSON documents grouped in collections, with optimistic transactions.
//!
//! ## Transaction Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  store.begin()                                                          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  tx.read(products, p1)   → body + remembers version v7                  │
//! │  tx.read(orders, o1)     → body + remembers version v2                  │
//! │  tx.write(products, p1, …)   buffered                                   │
//! │  tx.write(orders, o1, …)     buffered                                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  tx.commit()  ── one SQL transaction ──────────────────────────────┐   │
//! │  │  UPDATE … SET version = version + 1 WHERE id = p1 AND version = 7 │   │
//! │  │  UPDATE … SET version = version + 1 WHERE id = o1 AND version = 2 │   │
//! │  │  any row count ≠ 1  → ROLLBACK, WriteConflict                     │   │
//! │  └───────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  run_transaction() re-runs the whole work on WriteConflict              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Services are written against [`DocumentStore`] and [`Transaction`], not
//! SQLite. [`SqliteStore`] is the implementation backed by [`Database`].

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use sqlx::{FromRow, SqlitePool};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::error::{DbError, DbResult};
use crate::pool::Database;

// =============================================================================
// Collection
// =============================================================================

/// The persisted collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Products,
    Orders,
    ActivityLog,
    RecycleBin,
}

impl Collection {
    pub const ALL: [Collection; 4] = [
        Collection::Products,
        Collection::Orders,
        Collection::ActivityLog,
        Collection::RecycleBin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Products => "products",
            Collection::Orders => "orders",
            Collection::ActivityLog => "activity_log",
            Collection::RecycleBin => "recycle_bin",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Document
// =============================================================================

/// A stored document with its concurrency version.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub body: Value,
    pub version: i64,
}

impl Document {
    /// Deserializes the body into a domain type.
    pub fn decode<T: DeserializeOwned>(&self) -> DbResult<T> {
        Ok(serde_json::from_value(self.body.clone())?)
    }
}

#[derive(FromRow)]
struct DocumentRow {
    id: String,
    body: String,
    version: i64,
}

impl TryFrom<DocumentRow> for Document {
    type Error = DbError;

    fn try_from(row: DocumentRow) -> DbResult<Self> {
        Ok(Document {
            id: row.id,
            body: serde_json::from_str(&row.body)?,
            version: row.version,
        })
    }
}

// =============================================================================
// Capability Traits
// =============================================================================

/// Read access to the collections plus transactions.
///
/// Every write goes through a [`Transaction`], so a change and the
/// activity-log entry describing it land together or not at all.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: Collection, id: &str) -> DbResult<Option<Document>>;

    /// All documents of a collection, oldest first.
    async fn list(&self, collection: Collection) -> DbResult<Vec<Document>>;

    /// Starts an optimistic transaction.
    async fn begin(&self) -> DbResult<Box<dyn Transaction>>;

    /// Attempts [`run_transaction`] makes before giving up.
    fn transaction_attempts(&self) -> u32;

    /// Receives the collection name after every committed write.
    fn changes(&self) -> broadcast::Receiver<Collection>;
}

/// An optimistic read-then-write unit.
///
/// Reads go to the store immediately and remember the version seen. Writes
/// and deletes are buffered until [`Transaction::commit`], which applies all
/// of them or none.
#[async_trait]
pub trait Transaction: Send {
    /// Reads a document, seeing this transaction's own buffered writes.
    async fn read(&mut self, collection: Collection, id: &str) -> DbResult<Option<Value>>;

    fn write(&mut self, collection: Collection, id: &str, body: Value);

    fn delete(&mut self, collection: Collection, id: &str);

    /// Applies every buffered change, or fails with `WriteConflict` if any
    /// document read or written changed since it was read.
    async fn commit(&mut self) -> DbResult<()>;
}

impl<'a> dyn Transaction + 'a {
    /// Reads and deserializes a document.
    pub async fn read_as<T: DeserializeOwned>(
        &mut self,
        collection: Collection,
        id: &str,
    ) -> DbResult<Option<T>> {
        match self.read(collection, id).await? {
            Some(body) => Ok(Some(serde_json::from_value(body)?)),
            None => Ok(None),
        }
    }

    /// Serializes and buffers a document write.
    pub fn write_as<T: Serialize>(&mut self, collection: Collection, id: &str, doc: &T) -> DbResult<()> {
        let body = serde_json::to_value(doc)?;
        self.write(collection, id, body);
        Ok(())
    }
}

/// Work run inside an optimistic transaction.
///
/// `run` may be called several times; it must derive everything from what
/// it reads through `tx`.
#[async_trait]
pub trait TransactionWork: Send + Sync {
    type Output: Send;
    type Error: From<DbError> + Send;

    async fn run(&self, tx: &mut dyn Transaction) -> Result<Self::Output, Self::Error>;
}

/// Runs `work` in a fresh transaction, retrying from scratch on write conflict.
///
/// ## Errors
/// - whatever `work` returns (not retried)
/// - `RetriesExhausted` once every attempt conflicted
pub async fn run_transaction<W>(store: &dyn DocumentStore, work: &W) -> Result<W::Output, W::Error>
where
    W: TransactionWork + ?Sized,
{
    let attempts = store.transaction_attempts().max(1);

    for attempt in 1..=attempts {
        let mut tx = store.begin().await?;
        let output = work.run(tx.as_mut()).await?;

        match tx.commit().await {
            Ok(()) => {
                if attempt > 1 {
                    debug!(attempt, "Transaction committed after retry");
                }
                return Ok(output);
            }
            Err(DbError::WriteConflict { collection, id }) => {
                debug!(attempt, %collection, %id, "Write conflict, retrying transaction");
            }
            Err(e) => return Err(e.into()),
        }
    }

    warn!(attempts, "Transaction retries exhausted");
    Err(DbError::RetriesExhausted { attempts }.into())
}

// =============================================================================
// SQLite Store
// =============================================================================

/// [`DocumentStore`] over the `documents` table.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    attempts: u32,
    changes: broadcast::Sender<Collection>,
}

impl SqliteStore {
    /// Every store built from the same [`Database`] shares one change feed.
    pub fn new(db: &Database) -> Self {
        SqliteStore {
            pool: db.pool().clone(),
            attempts: db.transaction_attempts(),
            changes: db.change_feed().clone(),
        }
    }

    /// Wraps the store for sharing between services.
    pub fn shared(db: &Database) -> Arc<dyn DocumentStore> {
        Arc::new(Self::new(db))
    }
}

fn notify(changes: &broadcast::Sender<Collection>, collection: Collection) {
    // no receivers is fine
    let _ = changes.send(collection);
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn get(&self, collection: Collection, id: &str) -> DbResult<Option<Document>> {
        let row = sqlx::query_as::<_, DocumentRow>(
            "SELECT id, body, version FROM documents WHERE collection = ?1 AND id = ?2",
        )
        .bind(collection.as_str())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Document::try_from).transpose()
    }

    async fn list(&self, collection: Collection) -> DbResult<Vec<Document>> {
        let rows = sqlx::query_as::<_, DocumentRow>(
            "SELECT id, body, version FROM documents WHERE collection = ?1 ORDER BY created_at, rowid",
        )
        .bind(collection.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Document::try_from).collect()
    }

    async fn begin(&self) -> DbResult<Box<dyn Transaction>> {
        Ok(Box::new(SqliteTransaction {
            pool: self.pool.clone(),
            changes: self.changes.clone(),
            seen: HashMap::new(),
            pending: HashMap::new(),
            committed: false,
        }))
    }

    fn transaction_attempts(&self) -> u32 {
        self.attempts
    }

    fn changes(&self) -> broadcast::Receiver<Collection> {
        self.changes.subscribe()
    }
}

// =============================================================================
// SQLite Transaction
// =============================================================================

type Key = (Collection, String);

/// Buffered optimistic transaction. Version 0 means "read as absent".
struct SqliteTransaction {
    pool: SqlitePool,
    changes: broadcast::Sender<Collection>,
    seen: HashMap<Key, i64>,
    /// `None` is a delete.
    pending: HashMap<Key, Option<Value>>,
    committed: bool,
}

#[async_trait]
impl Transaction for SqliteTransaction {
    async fn read(&mut self, collection: Collection, id: &str) -> DbResult<Option<Value>> {
        let key = (collection, id.to_string());
        if let Some(buffered) = self.pending.get(&key) {
            return Ok(buffered.clone());
        }

        let row = sqlx::query_as::<_, DocumentRow>(
            "SELECT id, body, version FROM documents WHERE collection = ?1 AND id = ?2",
        )
        .bind(collection.as_str())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let doc = row.map(Document::try_from).transpose()?;
        let version = doc.as_ref().map_or(0, |d| d.version);
        // the first version seen is the one commit checks against
        self.seen.entry(key).or_insert(version);

        Ok(doc.map(|d| d.body))
    }

    fn write(&mut self, collection: Collection, id: &str, body: Value) {
        self.pending.insert((collection, id.to_string()), Some(body));
    }

    fn delete(&mut self, collection: Collection, id: &str) {
        self.pending.insert((collection, id.to_string()), None);
    }

    async fn commit(&mut self) -> DbResult<()> {
        if self.committed {
            return Err(DbError::TransactionFailed("already committed".to_string()));
        }

        let now = Utc::now().to_rfc3339();
        let mut sql_tx = self.pool.begin().await?;

        for ((collection, id), change) in &self.pending {
            let expected = self.seen.get(&(*collection, id.clone())).copied();
            let table = collection.as_str();

            let applied = match (change, expected) {
                // blind write
                (Some(body), None) => {
                    sqlx::query(
                        r#"
                        INSERT INTO documents (collection, id, body, version, created_at, updated_at)
                        VALUES (?1, ?2, ?3, 1, ?4, ?4)
                        ON CONFLICT (collection, id) DO UPDATE SET
                            body = excluded.body,
                            version = documents.version + 1,
                            updated_at = excluded.updated_at
                        "#,
                    )
                    .bind(table)
                    .bind(id)
                    .bind(body.to_string())
                    .bind(&now)
                    .execute(&mut *sql_tx)
                    .await?;
                    true
                }
                // read as absent: must still be absent
                (Some(body), Some(0)) => {
                    sqlx::query(
                        r#"
                        INSERT INTO documents (collection, id, body, version, created_at, updated_at)
                        VALUES (?1, ?2, ?3, 1, ?4, ?4)
                        ON CONFLICT (collection, id) DO NOTHING
                        "#,
                    )
                    .bind(table)
                    .bind(id)
                    .bind(body.to_string())
                    .bind(&now)
                    .execute(&mut *sql_tx)
                    .await?
                    .rows_affected()
                        == 1
                }
                (Some(body), Some(version)) => {
                    sqlx::query(
                        r#"
                        UPDATE documents
                        SET body = ?3, version = version + 1, updated_at = ?4
                        WHERE collection = ?1 AND id = ?2 AND version = ?5
                        "#,
                    )
                    .bind(table)
                    .bind(id)
                    .bind(body.to_string())
                    .bind(&now)
                    .bind(version)
                    .execute(&mut *sql_tx)
                    .await?
                    .rows_affected()
                        == 1
                }
                (None, None) => {
                    sqlx::query("DELETE FROM documents WHERE collection = ?1 AND id = ?2")
                        .bind(table)
                        .bind(id)
                        .execute(&mut *sql_tx)
                        .await?;
                    true
                }
                (None, Some(0)) => current_version(&mut sql_tx, *collection, id).await? == 0,
                (None, Some(version)) => {
                    sqlx::query(
                        "DELETE FROM documents WHERE collection = ?1 AND id = ?2 AND version = ?3",
                    )
                    .bind(table)
                    .bind(id)
                    .bind(version)
                    .execute(&mut *sql_tx)
                    .await?
                    .rows_affected()
                        == 1
                }
            };

            if !applied {
                // dropping sql_tx rolls back
                return Err(DbError::conflict(table, id.as_str()));
            }
        }

        for ((collection, id), version) in &self.seen {
            if self.pending.contains_key(&(*collection, id.clone())) {
                continue;
            }
            if current_version(&mut sql_tx, *collection, id).await? != *version {
                return Err(DbError::conflict(collection.as_str(), id.as_str()));
            }
        }

        sql_tx.commit().await?;
        self.committed = true;

        let touched: HashSet<Collection> = self.pending.keys().map(|(c, _)| *c).collect();
        for collection in touched {
            notify(&self.changes, collection);
        }
        Ok(())
    }
}

async fn current_version(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    collection: Collection,
    id: &str,
) -> DbResult<i64> {
    let version: Option<i64> =
        sqlx::query_scalar("SELECT version FROM documents WHERE collection = ?1 AND id = ?2")
            .bind(collection.as_str())
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?;
    Ok(version.unwrap_or(0))
}

// =============================================================================
// Unit Tests
// =============================================================================
