use thiserror::Error;

use crate::{
    db_types::{OrderId, OrderStatusType},
    traits::FulfillmentDbError,
};

#[derive(Debug, Clone, Error)]
pub enum OrderFlowError {
    #[error("Invalid order request. {0}")]
    ValidationError(String),
    #[error("The transition {from} -> {to} is not in the state machine")]
    InvalidTransition { from: OrderStatusType, to: OrderStatusType },
    #[error("The actor is not allowed to perform this transition. {0}")]
    Forbidden(String),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error(transparent)]
    DatabaseError(#[from] FulfillmentDbError),
}

#[derive(Debug, Clone, Error)]
pub enum PaymentsApiError {
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("The requested payment does not exist for track id {0}")]
    PaymentNotFound(String),
    #[error("Order {0} does not require an online payment")]
    PaymentNotRequired(OrderId),
    #[error("Order {0} has already been paid")]
    AlreadyPaid(OrderId),
    #[error("Order {0} is not in a payable state")]
    OrderNotPayable(OrderId),
    #[error("The payment gateway could not be reached. {0}")]
    GatewayUnreachable(String),
    #[error("The payment gateway rejected the request. {0}")]
    GatewayRejected(String),
    #[error(transparent)]
    DatabaseError(#[from] FulfillmentDbError),
}

/// Webhook-specific rejections. These all fail closed: a rejected callback never settles a payment.
#[derive(Debug, Clone, Error)]
pub enum CallbackRejection {
    #[error("Could not parse the callback payload. {0}")]
    MalformedPayload(String),
    #[error("No signature header was supplied")]
    SignatureMissing,
    #[error("The callback signature is invalid")]
    SignatureInvalid,
    #[error("No callback secret is configured; refusing to accept callbacks in production")]
    SecretNotConfigured,
    #[error("The callback timestamp is outside the freshness window")]
    StaleCallback,
    #[error("This callback has already been processed")]
    ReplayDetected,
    #[error("The requested payment does not exist for track id {0}")]
    PaymentNotFound(String),
    #[error(transparent)]
    Payments(#[from] PaymentsApiError),
}

impl From<FulfillmentDbError> for CallbackRejection {
    fn from(e: FulfillmentDbError) -> Self {
        CallbackRejection::Payments(PaymentsApiError::DatabaseError(e))
    }
}
