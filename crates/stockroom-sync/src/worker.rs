//! # Replay Worker
//!
//! The single background consumer of the offline queue.
//!
//! ## Worker Loop
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        ReplayWorker::run                                │
//! │                                                                         │
//! │   ┌──────────────┐  gate online   ┌──────────────┐                     │
//! │   │    IDLE      │ ─────────────► │  REPLAYING   │                     │
//! │   │              │                │              │                     │
//! │   │ waits for:   │ ◄───────────── │ queue.replay │                     │
//! │   │  gate change │    drained     └──────┬───────┘                     │
//! │   │  enqueue     │                       │ head failed                  │
//! │   │  wake()      │                       ▼                              │
//! │   │  shutdown    │                ┌──────────────┐                     │
//! │   └──────────────┘ ◄───────────── │   BACKOFF    │ 500ms, 1s, 2s ...   │
//! │          ▲        gate offline    │              │ capped at max       │
//! │          └─────────────────────── └──────────────┘                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::ReplaySettings;
use crate::error::{SyncError, SyncResult};
use crate::gate::{ConnectionState, ConnectivityGate};
use crate::queue::OfflineQueue;

/// Handle for controlling a running [`ReplayWorker`].
#[derive(Clone)]
pub struct ReplayWorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
    wake_tx: mpsc::Sender<()>,
}

impl ReplayWorkerHandle {
    /// Asks the worker to try a replay now, skipping any pending backoff.
    pub fn wake(&self) -> SyncResult<()> {
        match self.wake_tx.try_send(()) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(())) => Ok(()),
            Err(mpsc::error::TrySendError::Closed(())) => Err(SyncError::ShuttingDown),
        }
    }

    /// Triggers graceful shutdown.
    pub async fn shutdown(&self) -> SyncResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| SyncError::ChannelError("Shutdown channel closed".into()))
    }
}

pub struct ReplayWorker {
    queue: OfflineQueue,
    gate: ConnectivityGate,
    settings: ReplaySettings,
    shutdown_rx: mpsc::Receiver<()>,
    wake_rx: mpsc::Receiver<()>,
}

impl ReplayWorker {
    pub fn new(queue: OfflineQueue, settings: ReplaySettings) -> (Self, ReplayWorkerHandle) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let (wake_tx, wake_rx) = mpsc::channel(1);

        let worker = ReplayWorker {
            gate: queue.gate().clone(),
            queue,
            settings,
            shutdown_rx,
            wake_rx,
        };

        (worker, ReplayWorkerHandle { shutdown_tx, wake_tx })
    }

    /// Spawns the worker on the current runtime.
    pub fn spawn(
        queue: OfflineQueue,
        settings: ReplaySettings,
    ) -> (ReplayWorkerHandle, JoinHandle<()>) {
        let (worker, handle) = Self::new(queue, settings);
        (handle, tokio::spawn(worker.run()))
    }

    /// Runs until shutdown. Spawn this as a background task.
    pub async fn run(mut self) {
        info!("Replay worker starting");

        let mut state = self.gate.subscribe();
        let mut backoff = self.create_backoff();

        loop {
            let online = *state.borrow_and_update() == ConnectionState::Online;

            if online {
                match self.queue.replay().await {
                    Ok(report) => {
                        backoff.reset();
                        if report.replayed > 0 {
                            debug!(replayed = report.replayed, "Replay pass complete");
                        }
                    }
                    Err(e) if e.is_retryable() && !self.gate.is_online() => {
                        debug!(error = %e, "Store lost during replay, waiting for connectivity");
                    }
                    Err(e) => {
                        let Some(delay) = backoff.next_backoff() else {
                            error!("Replay backoff exhausted");
                            break;
                        };
                        warn!(error = %e, ?delay, "Replay halted, retrying after backoff");

                        tokio::select! {
                            _ = tokio::time::sleep(delay) => {}
                            _ = self.wake_rx.recv() => {
                                debug!("Replay woken during backoff");
                            }
                            _ = self.shutdown_rx.recv() => {
                                info!("Shutdown during replay backoff");
                                break;
                            }
                        }
                        continue;
                    }
                }
            }

            tokio::select! {
                changed = state.changed() => {
                    if changed.is_err() {
                        info!("Connectivity gate dropped");
                        break;
                    }
                }
                _ = self.queue.enqueued() => {}
                _ = self.wake_rx.recv() => {}
                _ = self.shutdown_rx.recv() => {
                    info!("Replay worker shutting down");
                    break;
                }
            }
        }

        info!("Replay worker stopped");
    }

    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.settings.initial_backoff(),
            max_interval: self.settings.max_backoff(),
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use stockroom_core::{Method, PaymentStatus, ProductPatch};
    use stockroom_db::{Database, DbConfig};
    use stockroom_engine::Engine;

    fn fast() -> ReplaySettings {
        ReplaySettings {
            initial_backoff_ms: 10,
            max_backoff_secs: 1,
            start_offline: true,
        }
    }

    async fn queue() -> OfflineQueue {
        let store_db = Database::new(DbConfig::in_memory()).await.unwrap();
        let queue_db = Database::new(DbConfig::in_memory()).await.unwrap();
        OfflineQueue::new(
            Engine::new(store_db.store()),
            queue_db.offline_queue(),
            ConnectivityGate::offline(),
        )
    }

    async fn wait_until_drained(queue: &OfflineQueue) {
        tokio::time::timeout(Duration::from_secs(10), async {
            while !queue.is_empty().await.unwrap() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("queue did not drain");
    }

    fn product(stock: i64) -> serde_json::Value {
        json!({
            "brand": "Acme", "name": "Soap", "stock_quantity": stock,
            "cost_cents": 100, "markup_bps": 5000
        })
    }

    #[tokio::test]
    async fn test_replays_when_gate_opens() {
        let queue = queue().await;
        queue.call(Method::Post, "/products", Some(product(1))).await.unwrap();
        queue.call(Method::Post, "/products", Some(product(2))).await.unwrap();

        let (handle, task) = ReplayWorker::spawn(queue.clone(), fast());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(queue.len().await.unwrap(), 2);

        queue.gate().set_online();
        wait_until_drained(&queue).await;
        assert_eq!(queue.engine().products().list().await.unwrap().len(), 2);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
        assert!(matches!(handle.wake(), Err(SyncError::ShuttingDown)));
    }

    #[tokio::test]
    async fn test_retries_halted_head_after_backoff() {
        let queue = queue().await;
        queue.gate().set_online();

        let created = queue.call(Method::Post, "/products", Some(product(2))).await.unwrap();
        let product_id = created["id"].as_str().unwrap().to_string();
        let order = queue
            .call(
                Method::Post,
                "/orders",
                Some(json!({
                    "customer_name": "Jane",
                    "items": [{ "product_id": product_id, "quantity": 2 }]
                })),
            )
            .await
            .unwrap();
        let order_id = order["id"].as_str().unwrap().to_string();
        queue
            .engine()
            .products()
            .update(
                &product_id,
                ProductPatch {
                    stock_quantity: Some(1),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        queue.gate().set_offline();
        queue
            .call(Method::Put, &format!("/orders/{order_id}"), Some(json!({ "action": "mark_paid" })))
            .await
            .unwrap();

        let (handle, task) = ReplayWorker::spawn(queue.clone(), fast());
        queue.gate().set_online();

        // insufficient stock keeps the head in place
        tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                let pending = queue.pending().await.unwrap();
                if pending[0].attempts >= 2 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("replay was not retried");

        queue
            .engine()
            .products()
            .update(
                &product_id,
                ProductPatch {
                    stock_quantity: Some(5),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        handle.wake().unwrap();

        wait_until_drained(&queue).await;
        let paid = queue.engine().orders().get(&order_id).await.unwrap();
        assert_eq!(paid.payment_status, PaymentStatus::Paid);
        assert_eq!(queue.engine().products().get(&product_id).await.unwrap().stock_quantity, 3);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }
}
