use fulfillment_engine::{
    db_types::OrderId,
    traits::{GatewayError, GatewayPaymentRequest, GatewayVerification, PaymentGatewayClient},
};
use provider_tools::{ZibalApi, ZibalApiError};
use sfg_common::Rial;

/// Binds the Zibal client to the engine's gateway trait. Transport failures surface as
/// [`GatewayError::Unreachable`]; gateway-level rejections travel through the typed outcome so the reconciler can
/// ledger the raw response.
#[derive(Clone)]
pub struct ZibalGateway {
    api: ZibalApi,
}

impl ZibalGateway {
    pub fn new(api: ZibalApi) -> Self {
        Self { api }
    }
}

impl PaymentGatewayClient for ZibalGateway {
    fn provider(&self) -> &'static str {
        "ZIBAL"
    }

    async fn request_payment(
        &self,
        amount: Rial,
        track_id: &str,
        _order_id: &OrderId,
    ) -> Result<GatewayPaymentRequest, GatewayError> {
        let outcome = self.api.request(amount.value(), track_id).await.map_err(into_gateway_error)?;
        Ok(GatewayPaymentRequest {
            accepted: outcome.accepted(),
            message: outcome.message,
            pay_link: outcome.pay_link,
            raw: outcome.raw,
        })
    }

    async fn verify_payment(&self, track_id: &str) -> Result<GatewayVerification, GatewayError> {
        let outcome = self.api.verify(track_id).await.map_err(into_gateway_error)?;
        Ok(GatewayVerification {
            success: outcome.settled(),
            amount: outcome.amount.map(Rial::from),
            ref_number: outcome.ref_number,
            paid_at: outcome.paid_at,
            raw: outcome.raw,
        })
    }
}

fn into_gateway_error(e: ZibalApiError) -> GatewayError {
    match e {
        ZibalApiError::InvalidResponse(m) | ZibalApiError::JsonError(m) => GatewayError::InvalidResponse(m),
        other => GatewayError::Unreachable(other.to_string()),
    }
}
