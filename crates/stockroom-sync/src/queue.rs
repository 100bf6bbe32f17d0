//! # Offline Queue
//!
//! Routes every call across the online/offline boundary.
//!
//! ## Call Routing
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  call(verb, path, payload) ──► Command::decode                         │
//! │       │                                                                 │
//! │       ├── read ───────────────────────────────► Engine::dispatch       │
//! │       │                                                                 │
//! │       └── mutation                                                      │
//! │             │                                                           │
//! │             ├── gate offline ──────────┐                                │
//! │             ├── queue not empty ───────┤                                │
//! │             │                          ▼                                │
//! │             │                 enqueue ──► optimistic response           │
//! │             │                          ▲  { id: "temp_…", _offline }    │
//! │             │                          │                                │
//! │             └── Engine::dispatch ── transient failure (gate → offline)  │
//! │                      │                                                  │
//! │                      └── ok / application error ──► caller              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Replay
//! Strict FIFO with a single writer. The head is removed only after it
//! succeeds. A failing head stays where it is and replay stops; nothing
//! behind it runs until it succeeds or an operator discards it.
//!
//! When a create made offline replays, its temporary id is rewritten to the
//! real id in every later queued command in the same local transaction that
//! removes the entry. If that transaction fails the entry stays at the head
//! and runs again on the next pass, so a replayed command may reach the
//! store more than once.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Map, Value};
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};
use crate::gate::ConnectivityGate;
use stockroom_core::{Command, Method};
use stockroom_db::{OfflineQueueEntry, OfflineQueueRepository};
use stockroom_engine::Engine;

/// Prefix of ids handed out for creates made while offline.
pub const TEMP_ID_PREFIX: &str = "temp_";

/// Result of one replay pass that drained the queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplayReport {
    pub replayed: usize,
}

/// The online/offline router and its durable FIFO.
#[derive(Clone)]
pub struct OfflineQueue {
    engine: Engine,
    entries: OfflineQueueRepository,
    gate: ConnectivityGate,
    /// Held while a mutation is routed and for a whole replay pass.
    writer: Arc<Mutex<()>>,
    enqueued: Arc<Notify>,
}

impl OfflineQueue {
    pub fn new(engine: Engine, entries: OfflineQueueRepository, gate: ConnectivityGate) -> Self {
        OfflineQueue {
            engine,
            entries,
            gate,
            writer: Arc::new(Mutex::new(())),
            enqueued: Arc::new(Notify::new()),
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn gate(&self) -> &ConnectivityGate {
        &self.gate
    }

    // =========================================================================
    // Calls
    // =========================================================================

    /// Decodes and submits a verb + path + payload call.
    pub async fn call(&self, method: Method, path: &str, payload: Option<Value>) -> SyncResult<Value> {
        let command = Command::decode(method, path, payload)?;
        self.submit(command).await
    }

    /// Runs a command now or queues it.
    ///
    /// Reads always go to the store. A mutation is queued when the gate is
    /// offline, when earlier mutations are still waiting, or when the store
    /// turns out to be unreachable; the caller then gets an optimistic
    /// response marked `_offline: true`.
    pub async fn submit(&self, command: Command) -> SyncResult<Value> {
        if !command.is_mutation() {
            return self.read(command).await;
        }

        let _writer = self.writer.lock().await;

        if !self.gate.is_online() {
            return self.enqueue(command).await;
        }

        if !self.entries.is_empty().await? {
            debug!(kind = command.kind(), "Queue not empty, queueing behind pending replay");
            return self.enqueue(command).await;
        }

        match self.engine.dispatch(command.clone()).await {
            Ok(response) => Ok(response),
            Err(e) if e.is_transient() => {
                warn!(error = %e, kind = command.kind(), "Store unreachable, queueing mutation");
                self.gate.set_offline();
                self.enqueue(command).await
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn read(&self, command: Command) -> SyncResult<Value> {
        match self.engine.dispatch(command).await {
            Ok(response) => Ok(response),
            Err(e) => {
                if e.is_transient() {
                    self.gate.set_offline();
                }
                Err(e.into())
            }
        }
    }

    async fn enqueue(&self, command: Command) -> SyncResult<Value> {
        let temp_id = command
            .assigns_id()
            .then(|| format!("{TEMP_ID_PREFIX}{}", Uuid::new_v4()));
        let entry = self.entries.enqueue(&command, temp_id.as_deref()).await?;
        self.enqueued.notify_one();

        info!(
            seq = entry.seq,
            kind = %entry.kind,
            path = %entry.path,
            "Mutation queued for replay"
        );
        Ok(optimistic_response(&command, &entry))
    }

    // =========================================================================
    // Replay
    // =========================================================================

    /// Replays queued mutations oldest first until the queue is empty.
    ///
    /// ## Errors
    /// `ReplayHalted` when the head fails. The failure is recorded on the
    /// entry, which stays at the head. A transient failure also closes the
    /// gate.
    ///
    /// A local queue error after the store accepted the head is returned as
    /// is. The head is kept and runs again on the next pass.
    pub async fn replay(&self) -> SyncResult<ReplayReport> {
        let _writer = self.writer.lock().await;
        let mut report = ReplayReport::default();

        while let Some(entry) = self.entries.head().await? {
            let command = entry.command()?;

            match self.engine.dispatch(command).await {
                Ok(response) => {
                    let real_id = response.get("id").and_then(Value::as_str);
                    let remap = match (entry.temp_id.as_deref(), real_id) {
                        (Some(temp_id), Some(real_id)) => Some((temp_id, real_id)),
                        (Some(temp_id), None) => {
                            warn!(seq = entry.seq, temp_id, "Replayed create returned no id");
                            None
                        }
                        (None, _) => None,
                    };
                    self.entries.complete(&entry.id, remap).await?;
                    report.replayed += 1;
                    debug!(seq = entry.seq, kind = %entry.kind, "Replayed queued mutation");
                }
                Err(e) => {
                    let transient = e.is_transient();
                    let reason = e.to_string();
                    self.entries.record_failure(&entry.id, &reason).await?;
                    if transient {
                        self.gate.set_offline();
                    }
                    return Err(SyncError::ReplayHalted {
                        entry_id: entry.id,
                        reason,
                        transient,
                    });
                }
            }
        }

        if report.replayed > 0 {
            info!(replayed = report.replayed, "Offline queue drained");
        }
        Ok(report)
    }

    /// Drops the head entry without running it.
    pub async fn discard_head(&self) -> SyncResult<Option<OfflineQueueEntry>> {
        let _writer = self.writer.lock().await;

        let Some(head) = self.entries.head().await? else {
            return Ok(None);
        };
        self.entries.remove(&head.id).await?;

        warn!(
            seq = head.seq,
            id = %head.id,
            kind = %head.kind,
            path = %head.path,
            attempts = head.attempts,
            last_error = ?head.last_error,
            "Discarded head of offline queue"
        );
        Ok(Some(head))
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    pub async fn pending(&self) -> SyncResult<Vec<OfflineQueueEntry>> {
        Ok(self.entries.pending().await?)
    }

    pub async fn len(&self) -> SyncResult<i64> {
        Ok(self.entries.len().await?)
    }

    pub async fn is_empty(&self) -> SyncResult<bool> {
        Ok(self.entries.is_empty().await?)
    }

    /// Resolves after the next enqueue, or at once if one happened unobserved.
    pub(crate) async fn enqueued(&self) {
        self.enqueued.notified().await;
    }
}

/// What the caller sees for a queued mutation: its own input echoed back
/// with an id and the `_offline` marker.
fn optimistic_response(command: &Command, entry: &OfflineQueueEntry) -> Value {
    let echo = match command {
        Command::CreateProduct { input } => serde_json::to_value(input),
        Command::UpdateProduct { patch, .. } => serde_json::to_value(patch),
        Command::CreateOrder { input } | Command::UpdateOrder { input, .. } => {
            serde_json::to_value(input)
        }
        Command::DeleteOrders { ids } => Ok(json!({ "ids": ids })),
        _ => Ok(json!({})),
    };
    let mut body = match echo {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    };

    if let Some(id) = entry.temp_id.as_deref().or_else(|| target_id(command)) {
        body.insert("id".to_string(), json!(id));
    }
    if let Command::MarkPaid { .. } = command {
        body.insert("payment_status".to_string(), json!("paid"));
    }
    body.insert("_offline".to_string(), json!(true));
    body.insert("_queue_id".to_string(), json!(entry.id));
    body.insert("_queued_at".to_string(), json!(entry.queued_at));

    Value::Object(body)
}

fn target_id(command: &Command) -> Option<&str> {
    match command {
        Command::UpdateProduct { id, .. }
        | Command::DeleteProduct { id }
        | Command::UpdateOrder { id, .. }
        | Command::MarkPaid { id }
        | Command::DeleteOrder { id }
        | Command::RestoreRecycleEntry { id }
        | Command::PurgeRecycleEntry { id } => Some(id),
        _ => None,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
