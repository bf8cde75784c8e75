use crate::db_types::{ActorType, Order, OrderStatusType, Payment};

/// A new order was persisted with its initial status.
#[derive(Debug, Clone)]
pub struct OrderCreatedEvent {
    pub order: Order,
}

impl OrderCreatedEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

/// An order moved through the state machine. Carries the updated order plus the transition edge, so subscribers can
/// pick role-appropriate reactions without re-reading history.
#[derive(Debug, Clone)]
pub struct OrderStatusChangedEvent {
    pub order: Order,
    pub from: OrderStatusType,
    pub to: OrderStatusType,
    pub actor_type: ActorType,
    pub note: Option<String>,
}

/// A payment reached its terminal PAID state.
#[derive(Debug, Clone)]
pub struct PaymentSettledEvent {
    pub payment: Payment,
    pub order: Order,
}

/// A payment cycle failed (gateway rejection, verify mismatch, or a failed callback).
#[derive(Debug, Clone)]
pub struct PaymentFailedEvent {
    pub payment: Payment,
    pub order: Order,
}
