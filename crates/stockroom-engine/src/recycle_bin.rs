//! # Recycle Bin
//!
//! Deleted orders wait here for 50 days.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  OrderService::delete ──► entry { expires_at = deleted_at + 50d }      │
//! │                               │                                         │
//! │          ┌────────────────────┼──────────────────────┐                  │
//! │          ▼                    ▼                      ▼                  │
//! │     restore(id)          purge(id)              sweep()                 │
//! │   new live order,     gone for good,       every entry with             │
//! │   new id, restored_at  "permanent_delete"   expires_at < now removed,   │
//! │   "restore"                                 one "auto_cleanup" if any   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use crate::activity::Activity;
use crate::error::{EngineError, EngineResult};
use stockroom_core::validation::validate_id;
use stockroom_core::{
    ActivityAction, CoreError, EntityType, Order, RecycleBinEntry, ValidationError,
};
use stockroom_db::{
    run_transaction, Collection, DocumentStore, RecycleBinRepository, Transaction,
    TransactionWork,
};

/// What a sweep removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub removed: u64,
    pub entry_ids: Vec<String>,
}

#[derive(Clone)]
pub struct RecycleBin {
    store: Arc<dyn DocumentStore>,
    entries: RecycleBinRepository,
}

impl RecycleBin {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        RecycleBin {
            entries: RecycleBinRepository::new(store.clone()),
            store,
        }
    }

    /// Newest deletion first.
    pub async fn list(&self) -> EngineResult<Vec<RecycleBinEntry>> {
        Ok(self.entries.list().await?)
    }

    pub async fn get(&self, id: &str) -> EngineResult<RecycleBinEntry> {
        validate_id("id", id)?;
        self.entries
            .get(id)
            .await?
            .ok_or_else(|| CoreError::not_found("RecycleBinEntry", id).into())
    }

    /// Turns an entry back into a live order under a new id.
    ///
    /// ## Errors
    /// - `NotFound` when the entry is gone
    /// - `NotAllowed` for an entry that does not hold an order
    pub async fn restore(&self, id: &str) -> EngineResult<Order> {
        validate_id("id", id)?;
        let work = RestoreEntry { id: id.to_string() };
        let order = run_transaction(self.store.as_ref(), &work).await?;
        info!(entry_id = id, order_id = %order.id, "Order restored from recycle bin");
        Ok(order)
    }

    /// Deletes an entry for good.
    pub async fn purge(&self, id: &str) -> EngineResult<RecycleBinEntry> {
        validate_id("id", id)?;
        let work = PurgeEntry { id: id.to_string() };
        let entry = run_transaction(self.store.as_ref(), &work).await?;
        info!(entry_id = id, "Recycle bin entry purged");
        Ok(entry)
    }

    /// Removes every expired entry. Safe to run at any time.
    pub async fn sweep(&self) -> EngineResult<SweepReport> {
        self.sweep_at(Utc::now()).await
    }

    /// [`sweep`](Self::sweep) with an explicit clock.
    ///
    /// Entries restored or purged while the sweep runs are skipped; the
    /// report and the `auto_cleanup` entry name only what this sweep removed.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> EngineResult<SweepReport> {
        let candidates: Vec<String> = self
            .entries
            .expired(now)
            .await?
            .into_iter()
            .map(|entry| entry.id)
            .collect();
        if candidates.is_empty() {
            debug!("Recycle bin sweep found nothing to remove");
            return Ok(SweepReport::default());
        }

        let work = SweepExpired { now, candidates };
        let report = run_transaction(self.store.as_ref(), &work).await?;
        if report.removed > 0 {
            info!(removed = report.removed, "Recycle bin sweep removed expired entries");
        }
        Ok(report)
    }
}

// =============================================================================
// Transactions
// =============================================================================

struct RestoreEntry {
    id: String,
}

#[async_trait]
impl TransactionWork for RestoreEntry {
    type Output = Order;
    type Error = EngineError;

    async fn run(&self, tx: &mut dyn Transaction) -> EngineResult<Order> {
        let entry: RecycleBinEntry = tx
            .read_as(Collection::RecycleBin, &self.id)
            .await?
            .ok_or_else(|| CoreError::not_found("RecycleBinEntry", &self.id))?;

        if entry.entity_type != EntityType::Order {
            return Err(ValidationError::NotAllowed {
                field: "type".to_string(),
                allowed: vec![EntityType::Order.as_str().to_string()],
            }
            .into());
        }

        let now = Utc::now();
        let mut order: Order = serde_json::from_value(entry.snapshot.clone())?;
        order.id = Uuid::new_v4().to_string();
        order.restored_at = Some(now);
        order.updated_at = now;

        tx.write_as(Collection::Orders, &order.id, &order)?;
        tx.delete(Collection::RecycleBin, &entry.id);
        Activity::new(ActivityAction::Restore, EntityType::Order)
            .entity(&order.id)
            .describe(format!("Restored order for {}", order.customer_name))
            .data(json!({
                "recycle_entry_id": entry.id,
                "original_id": entry.original_id,
                "order_id": order.id,
            }))
            .write_in(tx, now)?;

        Ok(order)
    }
}

struct SweepExpired {
    now: DateTime<Utc>,
    candidates: Vec<String>,
}

#[async_trait]
impl TransactionWork for SweepExpired {
    type Output = SweepReport;
    type Error = EngineError;

    async fn run(&self, tx: &mut dyn Transaction) -> EngineResult<SweepReport> {
        let mut entry_ids = Vec::new();
        for id in &self.candidates {
            let entry: Option<RecycleBinEntry> = tx.read_as(Collection::RecycleBin, id).await?;
            if let Some(entry) = entry.filter(|e| e.is_expired(self.now)) {
                tx.delete(Collection::RecycleBin, &entry.id);
                entry_ids.push(entry.id);
            }
        }

        if entry_ids.is_empty() {
            return Ok(SweepReport::default());
        }

        let removed = entry_ids.len() as u64;
        Activity::new(ActivityAction::AutoCleanup, EntityType::RecycleBin)
            .describe(format!("Removed {removed} expired recycle bin entries"))
            .data(json!({ "count": removed, "entry_ids": entry_ids }))
            .write_in(tx, Utc::now())?;

        Ok(SweepReport { removed, entry_ids })
    }
}

struct PurgeEntry {
    id: String,
}

#[async_trait]
impl TransactionWork for PurgeEntry {
    type Output = RecycleBinEntry;
    type Error = EngineError;

    async fn run(&self, tx: &mut dyn Transaction) -> EngineResult<RecycleBinEntry> {
        let entry: RecycleBinEntry = tx
            .read_as(Collection::RecycleBin, &self.id)
            .await?
            .ok_or_else(|| CoreError::not_found("RecycleBinEntry", &self.id))?;

        tx.delete(Collection::RecycleBin, &entry.id);
        Activity::new(ActivityAction::PermanentDelete, EntityType::RecycleBin)
            .entity(&entry.id)
            .describe(format!(
                "Permanently deleted {} {}",
                entry.entity_type.as_str(),
                entry.original_id
            ))
            .data(json!({
                "original_id": entry.original_id,
                "type": entry.entity_type,
                "snapshot": entry.snapshot,
            }))
            .write_in(tx, Utc::now())?;

        Ok(entry)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::ActivityLog;
    use crate::error::ErrorCode;
    use crate::orders::OrderService;
    use crate::products::ProductService;
    use chrono::Duration;
    use stockroom_core::{OrderDiscount, OrderInput, OrderLineInput, ProductInput};
    use stockroom_db::{Database, DbConfig};

    struct Fixture {
        orders: OrderService,
        bin: RecycleBin,
        log: ActivityLog,
        product_id: String,
    }

    async fn fixture() -> Fixture {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let store = db.store();
        let product = ProductService::new(store.clone())
            .create(ProductInput {
                brand: "Acme".to_string(),
                name: "Soap".to_string(),
                volume: None,
                description: None,
                stock_quantity: 10,
                cost_cents: 100,
                markup_bps: Some(5000),
                markup_amount_cents: None,
            })
            .await
            .unwrap();
        Fixture {
            orders: OrderService::new(store.clone()),
            bin: RecycleBin::new(store.clone()),
            log: ActivityLog::new(store),
            product_id: product.id,
        }
    }

    async fn deleted_order(f: &Fixture) -> (Order, RecycleBinEntry) {
        let order = f
            .orders
            .create(OrderInput {
                customer_name: "Jane".to_string(),
                customer_address: None,
                items: vec![OrderLineInput {
                    product_id: f.product_id.clone(),
                    quantity: 1,
                    discount_bps: 0,
                }],
                discount: OrderDiscount::None,
            })
            .await
            .unwrap();
        let entry = f.orders.delete(&order.id).await.unwrap();
        (order, entry)
    }

    async fn cleanups(f: &Fixture) -> usize {
        f.log
            .recent(100)
            .await
            .unwrap()
            .iter()
            .filter(|e| e.action == ActivityAction::AutoCleanup)
            .count()
    }

    #[tokio::test]
    async fn test_sweep_respects_ttl() {
        let f = fixture().await;
        let (_, entry) = deleted_order(&f).await;
        assert_eq!(entry.expires_at, entry.deleted_at + Duration::days(50));

        let report = f.bin.sweep_at(entry.deleted_at + Duration::days(49)).await.unwrap();
        assert_eq!(report.removed, 0);
        // expires_at itself is not yet past
        let report = f.bin.sweep_at(entry.expires_at).await.unwrap();
        assert_eq!(report.removed, 0);
        assert_eq!(cleanups(&f).await, 0);
        assert_eq!(f.bin.list().await.unwrap().len(), 1);

        let report = f
            .bin
            .sweep_at(entry.expires_at + Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(report.removed, 1);
        assert_eq!(report.entry_ids, vec![entry.id.clone()]);
        assert!(f.bin.list().await.unwrap().is_empty());
        assert_eq!(cleanups(&f).await, 1);

        // idempotent
        let report = f.bin.sweep_at(entry.expires_at + Duration::days(1)).await.unwrap();
        assert_eq!(report, SweepReport::default());
        assert_eq!(cleanups(&f).await, 1);
    }

    #[tokio::test]
    async fn test_restore_assigns_new_id() {
        let f = fixture().await;
        let (original, entry) = deleted_order(&f).await;

        let restored = f.bin.restore(&entry.id).await.unwrap();
        assert_ne!(restored.id, original.id);
        assert!(restored.restored_at.is_some());
        assert_eq!(restored.items, original.items);
        assert_eq!(restored.total_sales_price_cents, original.total_sales_price_cents);

        assert_eq!(f.orders.get(&restored.id).await.unwrap().id, restored.id);
        assert_eq!(f.bin.get(&entry.id).await.unwrap_err().code(), ErrorCode::NotFound);
        assert_eq!(f.bin.restore(&entry.id).await.unwrap_err().code(), ErrorCode::NotFound);

        let log = f.log.for_entity(EntityType::Order, &restored.id).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].action, ActivityAction::Restore);
        assert_eq!(log[0].data.as_ref().unwrap()["recycle_entry_id"], json!(entry.id));
    }

    #[tokio::test]
    async fn test_sweep_after_restore_keeps_live_order() {
        let f = fixture().await;
        let (_, restored_entry) = deleted_order(&f).await;
        let (_, other_entry) = deleted_order(&f).await;

        let restored = f.bin.restore(&restored_entry.id).await.unwrap();
        let report = f
            .bin
            .sweep_at(other_entry.expires_at + Duration::seconds(1))
            .await
            .unwrap();

        assert_eq!(report.entry_ids, vec![other_entry.id]);
        assert!(f.orders.get(&restored.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_sweep_reports_only_removed_entries() {
        let f = fixture().await;
        let (_, restored_entry) = deleted_order(&f).await;
        let (_, other_entry) = deleted_order(&f).await;
        let now = other_entry.expires_at + Duration::seconds(1);

        // both were expired when scanned; one is restored before the sweep commits
        let work = SweepExpired {
            now,
            candidates: vec![restored_entry.id.clone(), other_entry.id.clone()],
        };
        f.bin.restore(&restored_entry.id).await.unwrap();
        let report = run_transaction(f.bin.store.as_ref(), &work).await.unwrap();

        assert_eq!(report.removed, 1);
        assert_eq!(report.entry_ids, vec![other_entry.id.clone()]);

        let log = f.log.recent(100).await.unwrap();
        let cleanup = log
            .iter()
            .find(|e| e.action == ActivityAction::AutoCleanup)
            .unwrap();
        assert_eq!(
            cleanup.data.as_ref().unwrap(),
            &json!({ "count": 1, "entry_ids": [other_entry.id] })
        );

        let empty = SweepExpired {
            now,
            candidates: vec![restored_entry.id],
        };
        assert_eq!(
            run_transaction(f.bin.store.as_ref(), &empty).await.unwrap(),
            SweepReport::default()
        );
        assert_eq!(cleanups(&f).await, 1);
    }

    #[tokio::test]
    async fn test_purge() {
        let f = fixture().await;
        let (_, entry) = deleted_order(&f).await;

        let purged = f.bin.purge(&entry.id).await.unwrap();
        assert_eq!(purged.id, entry.id);
        assert!(f.bin.list().await.unwrap().is_empty());
        assert_eq!(f.bin.purge(&entry.id).await.unwrap_err().code(), ErrorCode::NotFound);

        let log = f.log.for_entity(EntityType::RecycleBin, &entry.id).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].action, ActivityAction::PermanentDelete);
    }

    #[tokio::test]
    async fn test_restore_rejects_non_order_entries() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let store = db.store();
        let bin = RecycleBin::new(store.clone());

        let now = Utc::now();
        let entry = RecycleBinEntry {
            id: "e-1".to_string(),
            original_id: "p-1".to_string(),
            entity_type: EntityType::Product,
            deleted_at: now,
            expires_at: now + Duration::days(50),
            snapshot: json!({}),
        };
        let mut tx = store.begin().await.unwrap();
        tx.write_as(Collection::RecycleBin, &entry.id, &entry).unwrap();
        tx.commit().await.unwrap();

        let err = bin.restore("e-1").await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::Core(CoreError::Validation(ValidationError::NotAllowed { .. }))
        ));
        assert_eq!(bin.list().await.unwrap().len(), 1);
    }
}
