//! # Commands
//!
//! The verb + path + payload surface, decoded once into a tagged enum.
//!
//! ## Route Table
//! ```text
//! ┌────────┬────────────────────────────┬──────────────────────────────┐
//! │ Verb   │ Path                       │ Command                      │
//! ├────────┼────────────────────────────┼──────────────────────────────┤
//! │ GET    │ /products                  │ ListProducts                 │
//! │ GET    │ /products/:id              │ GetProduct                   │
//! │ POST   │ /products                  │ CreateProduct                │
//! │ PUT    │ /products/:id              │ UpdateProduct                │
//! │ DELETE │ /products/:id              │ DeleteProduct                │
//! │ GET    │ /orders                    │ ListOrders                   │
//! │ GET    │ /orders/:id                │ GetOrder                     │
//! │ POST   │ /orders                    │ CreateOrder                  │
//! │ PUT    │ /orders/:id  action=mark_paid │ MarkPaid                  │
//! │ PUT    │ /orders/:id                │ UpdateOrder                  │
//! │ DELETE │ /orders/:id                │ DeleteOrder                  │
//! │ DELETE │ /orders  {ids: [...]}      │ DeleteOrders                 │
//! │ GET    │ /dashboard-stats           │ DashboardStats               │
//! │ GET    │ /recycle-bin               │ ListRecycleBin               │
//! │ GET    │ /recycle-bin/:id           │ GetRecycleEntry              │
//! │ POST   │ /recycle-bin/:id/restore   │ RestoreRecycleEntry          │
//! │ POST   │ /recycle-bin/sweep         │ SweepRecycleBin              │
//! │ DELETE │ /recycle-bin/:id           │ PurgeRecycleEntry            │
//! │ GET    │ /activity-log[?limit=N]    │ ListActivity                 │
//! └────────┴────────────────────────────┴──────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use serde_json::json;
//! use stockroom_core::command::{Command, Method};
//!
//! let cmd = Command::decode(Method::Put, "/orders/abc", Some(json!({"action": "mark_paid"}))).unwrap();
//! assert_eq!(cmd, Command::MarkPaid { id: "abc".into() });
//! assert!(cmd.is_mutation());
//! ```

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ValidationError;
use crate::types::{OrderInput, ProductInput, ProductPatch};
use crate::validation::{validate_id, ValidationResult};

// =============================================================================
// Method
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "DELETE" => Ok(Method::Delete),
            _ => Err(ValidationError::NotAllowed {
                field: "method".to_string(),
                allowed: ["GET", "POST", "PUT", "DELETE"].map(String::from).to_vec(),
            }),
        }
    }
}

// =============================================================================
// Command
// =============================================================================

/// A decoded call. Services match on this, never on path strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    ListProducts,
    GetProduct { id: String },
    CreateProduct { input: ProductInput },
    UpdateProduct { id: String, patch: ProductPatch },
    DeleteProduct { id: String },

    ListOrders,
    GetOrder { id: String },
    CreateOrder { input: OrderInput },
    UpdateOrder { id: String, input: OrderInput },
    MarkPaid { id: String },
    DeleteOrder { id: String },
    DeleteOrders { ids: Vec<String> },

    DashboardStats,

    ListRecycleBin,
    GetRecycleEntry { id: String },
    RestoreRecycleEntry { id: String },
    PurgeRecycleEntry { id: String },
    SweepRecycleBin,

    ListActivity { limit: Option<usize> },
}

/// `{ "action": "mark_paid" }` body of the payment transition.
#[derive(Deserialize)]
struct ActionBody {
    action: String,
}

#[derive(Deserialize)]
struct BulkIds {
    ids: Vec<String>,
}

#[derive(Deserialize)]
struct LimitBody {
    #[serde(default)]
    limit: Option<usize>,
}

impl Command {
    /// Decodes a verb + path + optional JSON payload.
    ///
    /// ## Errors
    /// - `UnknownRoute` when no command is bound to the verb and path
    /// - `Required` / `InvalidFormat` when the payload is missing or malformed
    pub fn decode(method: Method, path: &str, payload: Option<Value>) -> ValidationResult<Self> {
        let (path_only, query) = match path.split_once('?') {
            Some((p, q)) => (p, Some(q)),
            None => (path, None),
        };
        let segments: Vec<&str> = path_only.split('/').filter(|s| !s.is_empty()).collect();

        let unknown = || ValidationError::UnknownRoute {
            method: method.to_string(),
            path: path.to_string(),
        };

        let cmd = match (method, segments.as_slice()) {
            (Method::Get, ["products"]) => Command::ListProducts,
            (Method::Get, ["products", pid]) => Command::GetProduct { id: id(pid)? },
            (Method::Post, ["products"]) => Command::CreateProduct {
                input: body(payload)?,
            },
            (Method::Put, ["products", pid]) => Command::UpdateProduct {
                id: id(pid)?,
                patch: body(payload)?,
            },
            (Method::Delete, ["products", pid]) => Command::DeleteProduct { id: id(pid)? },

            (Method::Get, ["orders"]) => Command::ListOrders,
            (Method::Get, ["orders", oid]) => Command::GetOrder { id: id(oid)? },
            (Method::Post, ["orders"]) => Command::CreateOrder {
                input: body(payload)?,
            },
            (Method::Put, ["orders", oid]) => decode_order_put(id(oid)?, payload)?,
            (Method::Delete, ["orders", oid]) => Command::DeleteOrder { id: id(oid)? },
            (Method::Delete, ["orders"]) => {
                let BulkIds { ids } = body(payload)?;
                for raw in &ids {
                    validate_id("ids", raw)?;
                }
                Command::DeleteOrders { ids }
            }

            (Method::Get, ["dashboard-stats"]) => Command::DashboardStats,

            (Method::Get, ["recycle-bin"]) => Command::ListRecycleBin,
            (Method::Post, ["recycle-bin", "sweep"]) => Command::SweepRecycleBin,
            (Method::Get, ["recycle-bin", rid]) => Command::GetRecycleEntry { id: id(rid)? },
            (Method::Post, ["recycle-bin", rid, "restore"]) => {
                Command::RestoreRecycleEntry { id: id(rid)? }
            }
            (Method::Delete, ["recycle-bin", rid]) => Command::PurgeRecycleEntry { id: id(rid)? },

            (Method::Get, ["activity-log"]) => Command::ListActivity {
                limit: match query.and_then(|q| query_param(q, "limit")) {
                    Some(raw) => Some(raw.parse().map_err(|_| {
                        ValidationError::invalid("limit", "must be a non-negative integer")
                    })?),
                    None => match payload {
                        Some(value) => body::<LimitBody>(Some(value))?.limit,
                        None => None,
                    },
                },
            },

            _ => return Err(unknown()),
        };

        Ok(cmd)
    }

    /// True for every command that writes to the store.
    pub fn is_mutation(&self) -> bool {
        !matches!(
            self,
            Command::ListProducts
                | Command::GetProduct { .. }
                | Command::ListOrders
                | Command::GetOrder { .. }
                | Command::DashboardStats
                | Command::ListRecycleBin
                | Command::GetRecycleEntry { .. }
                | Command::ListActivity { .. }
        )
    }

    /// True for commands whose result is a newly identified document.
    pub fn assigns_id(&self) -> bool {
        matches!(
            self,
            Command::CreateProduct { .. }
                | Command::CreateOrder { .. }
                | Command::RestoreRecycleEntry { .. }
        )
    }

    /// Stable snake_case name, identical to the serde tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Command::ListProducts => "list_products",
            Command::GetProduct { .. } => "get_product",
            Command::CreateProduct { .. } => "create_product",
            Command::UpdateProduct { .. } => "update_product",
            Command::DeleteProduct { .. } => "delete_product",
            Command::ListOrders => "list_orders",
            Command::GetOrder { .. } => "get_order",
            Command::CreateOrder { .. } => "create_order",
            Command::UpdateOrder { .. } => "update_order",
            Command::MarkPaid { .. } => "mark_paid",
            Command::DeleteOrder { .. } => "delete_order",
            Command::DeleteOrders { .. } => "delete_orders",
            Command::DashboardStats => "dashboard_stats",
            Command::ListRecycleBin => "list_recycle_bin",
            Command::GetRecycleEntry { .. } => "get_recycle_entry",
            Command::RestoreRecycleEntry { .. } => "restore_recycle_entry",
            Command::PurgeRecycleEntry { .. } => "purge_recycle_entry",
            Command::SweepRecycleBin => "sweep_recycle_bin",
            Command::ListActivity { .. } => "list_activity",
        }
    }

    /// The verb this command is called with.
    pub fn method(&self) -> Method {
        match self {
            Command::ListProducts
            | Command::GetProduct { .. }
            | Command::ListOrders
            | Command::GetOrder { .. }
            | Command::DashboardStats
            | Command::ListRecycleBin
            | Command::GetRecycleEntry { .. }
            | Command::ListActivity { .. } => Method::Get,
            Command::CreateProduct { .. }
            | Command::CreateOrder { .. }
            | Command::RestoreRecycleEntry { .. }
            | Command::SweepRecycleBin => Method::Post,
            Command::UpdateProduct { .. } | Command::UpdateOrder { .. } | Command::MarkPaid { .. } => {
                Method::Put
            }
            Command::DeleteProduct { .. }
            | Command::DeleteOrder { .. }
            | Command::DeleteOrders { .. }
            | Command::PurgeRecycleEntry { .. } => Method::Delete,
        }
    }

    /// The path this command is called on.
    pub fn path(&self) -> String {
        match self {
            Command::ListProducts | Command::CreateProduct { .. } => "/products".to_string(),
            Command::GetProduct { id }
            | Command::UpdateProduct { id, .. }
            | Command::DeleteProduct { id } => format!("/products/{id}"),
            Command::ListOrders | Command::CreateOrder { .. } | Command::DeleteOrders { .. } => {
                "/orders".to_string()
            }
            Command::GetOrder { id }
            | Command::UpdateOrder { id, .. }
            | Command::MarkPaid { id }
            | Command::DeleteOrder { id } => format!("/orders/{id}"),
            Command::DashboardStats => "/dashboard-stats".to_string(),
            Command::ListRecycleBin => "/recycle-bin".to_string(),
            Command::SweepRecycleBin => "/recycle-bin/sweep".to_string(),
            Command::GetRecycleEntry { id } | Command::PurgeRecycleEntry { id } => {
                format!("/recycle-bin/{id}")
            }
            Command::RestoreRecycleEntry { id } => format!("/recycle-bin/{id}/restore"),
            Command::ListActivity { limit: Some(limit) } => format!("/activity-log?limit={limit}"),
            Command::ListActivity { limit: None } => "/activity-log".to_string(),
        }
    }

    /// Rewrites every reference to `from` (path ids, bulk ids, order line
    /// product ids) to `to`. Returns true when anything changed.
    ///
    /// Used to point queued commands at the real id of a document that was
    /// created offline under a temporary id.
    pub fn remap_id(&mut self, from: &str, to: &str) -> bool {
        let mut changed = false;
        for slot in self.id_slots_mut() {
            if slot == from {
                *slot = to.to_string();
                changed = true;
            }
        }
        changed
    }

    fn id_slots_mut(&mut self) -> Vec<&mut String> {
        match self {
            Command::GetProduct { id }
            | Command::UpdateProduct { id, .. }
            | Command::DeleteProduct { id }
            | Command::GetOrder { id }
            | Command::MarkPaid { id }
            | Command::DeleteOrder { id }
            | Command::GetRecycleEntry { id }
            | Command::RestoreRecycleEntry { id }
            | Command::PurgeRecycleEntry { id } => vec![id],
            Command::DeleteOrders { ids } => ids.iter_mut().collect(),
            Command::CreateOrder { input } => {
                input.items.iter_mut().map(|line| &mut line.product_id).collect()
            }
            Command::UpdateOrder { id, input } => std::iter::once(id)
                .chain(input.items.iter_mut().map(|line| &mut line.product_id))
                .collect(),
            Command::ListProducts
            | Command::CreateProduct { .. }
            | Command::ListOrders
            | Command::DashboardStats
            | Command::ListRecycleBin
            | Command::SweepRecycleBin
            | Command::ListActivity { .. } => Vec::new(),
        }
    }
}

fn decode_order_put(id: String, payload: Option<Value>) -> ValidationResult<Command> {
    let action = payload
        .as_ref()
        .and_then(|p| p.get("action"))
        .map(|_| body::<ActionBody>(payload.clone()))
        .transpose()?;

    match action {
        Some(ActionBody { action }) if action == "mark_paid" => Ok(Command::MarkPaid { id }),
        Some(_) => Err(ValidationError::NotAllowed {
            field: "action".to_string(),
            allowed: vec!["mark_paid".to_string()],
        }),
        None => Ok(Command::UpdateOrder {
            id,
            input: body(payload)?,
        }),
    }
}

fn id(raw: &str) -> ValidationResult<String> {
    validate_id("id", raw)?;
    Ok(raw.to_string())
}

fn body<T: DeserializeOwned>(payload: Option<Value>) -> ValidationResult<T> {
    let value = payload.ok_or_else(|| ValidationError::required("payload"))?;
    serde_json::from_value(value).map_err(|e| ValidationError::invalid("payload", e.to_string()))
}

fn query_param(query: &str, key: &str) -> Option<String> {
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn order_payload() -> Value {
        json!({
            "customer_name": "Jane",
            "items": [{"product_id": "p1", "quantity": 2, "discount_bps": 1000}],
            "discount": {"type": "percentage", "rate_bps": 500}
        })
    }

    #[test]
    fn test_decode_reads() {
        assert_eq!(
            Command::decode(Method::Get, "/products", None).unwrap(),
            Command::ListProducts
        );
        assert_eq!(
            Command::decode(Method::Get, "/orders/o-1/", None).unwrap(),
            Command::GetOrder { id: "o-1".into() }
        );
        assert_eq!(
            Command::decode(Method::Get, "/activity-log?limit=20", None).unwrap(),
            Command::ListActivity { limit: Some(20) }
        );
        assert_eq!(
            Command::decode(Method::Get, "/dashboard-stats", None).unwrap(),
            Command::DashboardStats
        );
    }

    #[test]
    fn test_query_is_percent_decoded() {
        assert_eq!(
            Command::decode(Method::Get, "/activity-log?limit=%31%30", None).unwrap(),
            Command::ListActivity { limit: Some(10) }
        );
        assert_eq!(
            Command::decode(Method::Get, "/activity-log?page=2&limit=3", None).unwrap(),
            Command::ListActivity { limit: Some(3) }
        );
        assert!(Command::decode(Method::Get, "/activity-log?limit=%2D1", None).is_err());
    }

    #[test]
    fn test_decode_order_put() {
        let update = Command::decode(Method::Put, "/orders/o-1", Some(order_payload())).unwrap();
        assert!(matches!(update, Command::UpdateOrder { ref id, .. } if id == "o-1"));

        let paid =
            Command::decode(Method::Put, "/orders/o-1", Some(json!({"action": "mark_paid"}))).unwrap();
        assert_eq!(paid, Command::MarkPaid { id: "o-1".into() });

        let bad = Command::decode(Method::Put, "/orders/o-1", Some(json!({"action": "refund"})));
        assert!(matches!(bad, Err(ValidationError::NotAllowed { .. })));
    }

    #[test]
    fn test_decode_recycle_bin_routes() {
        assert_eq!(
            Command::decode(Method::Post, "/recycle-bin/sweep", None).unwrap(),
            Command::SweepRecycleBin
        );
        assert_eq!(
            Command::decode(Method::Post, "/recycle-bin/r-1/restore", None).unwrap(),
            Command::RestoreRecycleEntry { id: "r-1".into() }
        );
        assert_eq!(
            Command::decode(Method::Delete, "/recycle-bin/r-1", None).unwrap(),
            Command::PurgeRecycleEntry { id: "r-1".into() }
        );
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(
            Command::decode(Method::Get, "/customers", None),
            Err(ValidationError::UnknownRoute { .. })
        ));
        assert!(matches!(
            Command::decode(Method::Post, "/orders", None),
            Err(ValidationError::Required { .. })
        ));
        assert!(matches!(
            Command::decode(Method::Post, "/orders", Some(json!({"items": 3}))),
            Err(ValidationError::InvalidFormat { .. })
        ));
        assert!("PATCH".parse::<Method>().is_err());
        assert_eq!("delete".parse::<Method>().unwrap(), Method::Delete);
    }

    #[test]
    fn test_method_and_path_round_trip() {
        let cases = [
            (Method::Post, "/orders", Some(order_payload())),
            (Method::Put, "/orders/o-1", Some(json!({"action": "mark_paid"}))),
            (Method::Delete, "/orders", Some(json!({"ids": ["a", "b"]}))),
            (Method::Post, "/recycle-bin/r-1/restore", None),
            (Method::Get, "/activity-log?limit=5", None),
        ];
        for (method, path, payload) in cases {
            let cmd = Command::decode(method, path, payload).unwrap();
            assert_eq!(cmd.method(), method);
            assert_eq!(cmd.path(), path);
        }
    }

    #[test]
    fn test_mutation_classification() {
        assert!(!Command::ListOrders.is_mutation());
        assert!(Command::SweepRecycleBin.is_mutation());
        assert!(Command::MarkPaid { id: "x".into() }.is_mutation());
        assert_eq!(Command::MarkPaid { id: "x".into() }.kind(), "mark_paid");
    }

    #[test]
    fn test_serde_tag_matches_kind() {
        let cmd = Command::DeleteOrders {
            ids: vec!["a".into()],
        };
        let value = serde_json::to_value(&cmd).unwrap();
        assert_eq!(value["command"], json!(cmd.kind()));
        let back: Command = serde_json::from_value(value).unwrap();
        assert_eq!(back, cmd);
    }

    #[test]
    fn test_remap_id() {
        let mut paid = Command::MarkPaid {
            id: "temp_1".into(),
        };
        assert!(paid.remap_id("temp_1", "real"));
        assert_eq!(paid, Command::MarkPaid { id: "real".into() });

        let mut create = Command::decode(Method::Post, "/orders", Some(order_payload())).unwrap();
        assert!(create.remap_id("p1", "p-real"));
        assert!(!create.remap_id("temp_9", "x"));
        match create {
            Command::CreateOrder { input } => assert_eq!(input.items[0].product_id, "p-real"),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
