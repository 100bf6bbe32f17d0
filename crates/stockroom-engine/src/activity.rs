//! # Activity Log
//!
//! Append-only audit trail. Every mutating service call produces exactly one
//! entry; transactional operations write theirs inside the same transaction
//! so the entry exists if and only if the change landed.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::error::EngineResult;
use stockroom_core::{ActivityAction, ActivityLogEntry, EntityType};
use stockroom_db::{ActivityLogRepository, Collection, DbResult, DocumentStore, Transaction};

/// Entries returned by `GET /activity-log` when no limit is given.
pub const DEFAULT_ACTIVITY_LIMIT: usize = 100;

/// Builds an [`ActivityLogEntry`].
///
/// ```rust,ignore
/// let entry = Activity::new(ActivityAction::Delete, EntityType::Order)
///     .entity(&order.id)
///     .describe(format!("Deleted order for {}", order.customer_name))
///     .data(serde_json::to_value(&order)?)
///     .at(now);
/// ```
#[derive(Debug, Clone)]
pub struct Activity {
    action: ActivityAction,
    entity_type: EntityType,
    entity_id: Option<String>,
    description: String,
    data: Option<Value>,
}

impl Activity {
    pub fn new(action: ActivityAction, entity_type: EntityType) -> Self {
        Activity {
            action,
            entity_type,
            entity_id: None,
            description: String::new(),
            data: None,
        }
    }

    pub fn entity(mut self, id: impl Into<String>) -> Self {
        self.entity_id = Some(id.into());
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Stamps the entry with a fresh id.
    pub fn at(self, timestamp: DateTime<Utc>) -> ActivityLogEntry {
        ActivityLogEntry {
            id: Uuid::new_v4().to_string(),
            action: self.action,
            entity_type: self.entity_type,
            entity_id: self.entity_id,
            description: self.description,
            data: self.data,
            timestamp,
        }
    }

    /// Buffers the entry in `tx`; it lands with the rest of the commit.
    pub fn write_in(self, tx: &mut dyn Transaction, timestamp: DateTime<Utc>) -> DbResult<()> {
        let entry = self.at(timestamp);
        tx.write_as(Collection::ActivityLog, &entry.id, &entry)
    }
}

/// Reads activity-log entries. Writes go through [`Activity::write_in`].
#[derive(Clone)]
pub struct ActivityLog {
    entries: ActivityLogRepository,
}

impl ActivityLog {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        ActivityLog {
            entries: ActivityLogRepository::new(store),
        }
    }

    /// Newest first.
    pub async fn recent(&self, limit: usize) -> EngineResult<Vec<ActivityLogEntry>> {
        Ok(self.entries.recent(limit).await?)
    }

    pub async fn for_entity(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> EngineResult<Vec<ActivityLogEntry>> {
        Ok(self.entries.for_entity(entity_type, entity_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stockroom_db::{Database, DbConfig};

    #[tokio::test]
    async fn test_write_and_read_back() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let store = db.store();
        let log = ActivityLog::new(store.clone());
        let now = Utc::now();

        let mut tx = store.begin().await.unwrap();
        Activity::new(ActivityAction::Create, EntityType::Order)
            .entity("o-1")
            .describe("Created order")
            .write_in(tx.as_mut(), now)
            .unwrap();
        Activity::new(ActivityAction::AutoCleanup, EntityType::RecycleBin)
            .describe("Removed 2 expired entries")
            .data(json!({ "count": 2 }))
            .write_in(tx.as_mut(), now + chrono::Duration::seconds(1))
            .unwrap();
        tx.commit().await.unwrap();

        let recent = log.recent(10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].action, ActivityAction::AutoCleanup);
        assert_eq!(recent[0].data, Some(json!({ "count": 2 })));
        assert_eq!(log.recent(1).await.unwrap().len(), 1);

        let for_order = log.for_entity(EntityType::Order, "o-1").await.unwrap();
        assert_eq!(for_order.len(), 1);
        assert_eq!(for_order[0].description, "Created order");
    }

    #[tokio::test]
    async fn test_entry_written_in_transaction_lands_on_commit() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let store = db.store();
        let log = ActivityLog::new(store.clone());

        let mut tx = store.begin().await.unwrap();
        Activity::new(ActivityAction::Update, EntityType::Product)
            .entity("p-1")
            .write_in(tx.as_mut(), Utc::now())
            .unwrap();
        assert!(log.recent(10).await.unwrap().is_empty());

        tx.commit().await.unwrap();
        assert_eq!(log.recent(10).await.unwrap().len(), 1);
    }
}
