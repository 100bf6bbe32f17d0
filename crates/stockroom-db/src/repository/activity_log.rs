//! # Activity Log Repository
//!
//! Append-only: entries are written inside the transaction of the change
//! they describe and are never updated or removed.

use std::sync::Arc;

use crate::error::DbResult;
use crate::repository::fetch_all;
use crate::store::{Collection, DocumentStore};
use stockroom_core::{ActivityLogEntry, EntityType};

#[derive(Clone)]
pub struct ActivityLogRepository {
    store: Arc<dyn DocumentStore>,
}

impl ActivityLogRepository {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        ActivityLogRepository { store }
    }

    /// All entries, newest first.
    pub async fn all(&self) -> DbResult<Vec<ActivityLogEntry>> {
        let mut entries: Vec<ActivityLogEntry> =
            fetch_all(self.store.as_ref(), Collection::ActivityLog).await?;
        // stable sort keeps insertion order reversed for equal timestamps
        entries.reverse();
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(entries)
    }

    pub async fn recent(&self, limit: usize) -> DbResult<Vec<ActivityLogEntry>> {
        let mut entries = self.all().await?;
        entries.truncate(limit);
        Ok(entries)
    }

    /// Entries about one entity, newest first.
    pub async fn for_entity(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> DbResult<Vec<ActivityLogEntry>> {
        Ok(self
            .all()
            .await?
            .into_iter()
            .filter(|e| e.entity_type == entity_type && e.entity_id.as_deref() == Some(entity_id))
            .collect())
    }
}
