//! Post-commit event hooks.
//!
//! The lifecycle and reconciler emit events after their transactions commit. Subscribers (the notification
//! orchestrator, most importantly) react to them without being able to roll the state change back: a failing
//! handler only ever costs a log line, never a committed order.
mod channel;
mod event_types;
mod hooks;

pub use channel::{EventHandler, EventProducer, Handler};
pub use event_types::{OrderCreatedEvent, OrderStatusChangedEvent, PaymentFailedEvent, PaymentSettledEvent};
pub use hooks::{EventHandlers, EventHooks, EventProducers};
