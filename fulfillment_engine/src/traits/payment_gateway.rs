use thiserror::Error;

use sfg_common::Rial;

use crate::db_types::OrderId;

/// A client for the external payment gateway. The reconciler drives the request → verify protocol through this
/// trait; the concrete Zibal client lives in `provider_tools` and is adapted in the server crate.
#[allow(async_fn_in_trait)]
pub trait PaymentGatewayClient: Clone {
    /// The provider identifier recorded on payment rows, e.g. "ZIBAL".
    fn provider(&self) -> &'static str;

    /// Asks the gateway for a payment session. A transport-level failure is an `Err`; a gateway-level rejection is
    /// an `Ok` with `accepted == false` and the raw response preserved for the attempt ledger.
    async fn request_payment(
        &self,
        amount: Rial,
        track_id: &str,
        order_id: &OrderId,
    ) -> Result<GatewayPaymentRequest, GatewayError>;

    /// Asks the gateway whether the payment identified by `track_id` has actually settled.
    async fn verify_payment(&self, track_id: &str) -> Result<GatewayVerification, GatewayError>;
}

/// Outcome of a payment session request.
#[derive(Debug, Clone)]
pub struct GatewayPaymentRequest {
    pub accepted: bool,
    pub message: Option<String>,
    pub pay_link: Option<String>,
    /// The provider response, verbatim, for the attempt ledger.
    pub raw: serde_json::Value,
}

/// Outcome of a verify call against the gateway.
#[derive(Debug, Clone)]
pub struct GatewayVerification {
    /// Whether the provider result code indicates a settled payment.
    pub success: bool,
    /// The amount the provider reports as settled. Must equal the recorded payment amount or settlement is refused.
    pub amount: Option<Rial>,
    pub ref_number: Option<String>,
    pub paid_at: Option<String>,
    /// The provider response, verbatim, for the attempt ledger.
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("The payment gateway could not be reached. {0}")]
    Unreachable(String),
    #[error("The payment gateway returned an unusable response. {0}")]
    InvalidResponse(String),
}
