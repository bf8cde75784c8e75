//! The traits that storage backends and external providers implement to act as collaborators for the fulfillment
//! engine. The engine APIs are generic over these traits; the Sqlite backend in [`crate::db`] implements the storage
//! side, and the `provider_tools` crate supplies gateway and channel clients for the rest.
mod audit;
mod fulfillment_database;
mod notification_channels;
mod payment_gateway;

pub use audit::{AuditError, AuditEvent, AuditRecorder};
pub use fulfillment_database::{AttemptOutcome, FulfillmentDatabase, FulfillmentDbError};
pub use notification_channels::{ChannelError, ChatProvider, ChatTarget, ProviderReceipt, SmsProvider};
pub use payment_gateway::{GatewayError, GatewayPaymentRequest, GatewayVerification, PaymentGatewayClient};
