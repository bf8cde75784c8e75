use thiserror::Error;

use crate::db_types::{ActorType, OrderId};

/// Append-only event log and analytics counters, consumed by reporting. The engine only ever calls `record`; it
/// treats failures as non-fatal and never lets them roll back a committed state change.
#[allow(async_fn_in_trait)]
pub trait AuditRecorder {
    async fn record(&self, event_name: &str, event: AuditEvent) -> Result<(), AuditError>;
}

#[derive(Debug, Clone, Default)]
pub struct AuditEvent {
    pub order_id: Option<OrderId>,
    pub customer_id: Option<String>,
    pub vendor_id: Option<String>,
    pub actor_type: Option<ActorType>,
    pub metadata: serde_json::Value,
}

impl AuditEvent {
    pub fn for_order(order_id: &OrderId) -> Self {
        Self { order_id: Some(order_id.clone()), ..Default::default() }
    }

    pub fn with_customer<S: Into<String>>(mut self, customer_id: S) -> Self {
        self.customer_id = Some(customer_id.into());
        self
    }

    pub fn with_vendor<S: Into<String>>(mut self, vendor_id: S) -> Self {
        self.vendor_id = Some(vendor_id.into());
        self
    }

    pub fn with_actor(mut self, actor_type: ActorType) -> Self {
        self.actor_type = Some(actor_type);
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

#[derive(Debug, Clone, Error)]
pub enum AuditError {
    #[error("Could not record audit event. {0}")]
    StorageError(String),
}
