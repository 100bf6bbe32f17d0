//! # Recycle Bin Repository
//!
//! Soft-deleted documents waiting for restore, purge or expiry.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::DbResult;
use crate::repository::{fetch, fetch_all};
use crate::store::{Collection, DocumentStore};
use stockroom_core::RecycleBinEntry;

#[derive(Clone)]
pub struct RecycleBinRepository {
    store: Arc<dyn DocumentStore>,
}

impl RecycleBinRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        RecycleBinRepository { store }
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<RecycleBinEntry>> {
        fetch(self.store.as_ref(), Collection::RecycleBin, id).await
    }

    /// All entries, most recently deleted first.
    pub async fn list(&self) -> DbResult<Vec<RecycleBinEntry>> {
        let mut entries: Vec<RecycleBinEntry> =
            fetch_all(self.store.as_ref(), Collection::RecycleBin).await?;
        entries.sort_by(|a, b| b.deleted_at.cmp(&a.deleted_at).then_with(|| a.id.cmp(&b.id)));
        Ok(entries)
    }

    /// Entries whose `expires_at` is before `now`.
    pub async fn expired(&self, now: DateTime<Utc>) -> DbResult<Vec<RecycleBinEntry>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|entry| entry.is_expired(now))
            .collect())
    }
}
