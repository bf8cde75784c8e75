use fulfillment_engine::traits::{ChannelError, ProviderReceipt, SmsProvider};
use provider_tools::{SmsApi, SmsApiError};

/// Binds the Melipayamak REST client to the engine's SMS channel trait. A provider status other than "accepted"
/// is a rejection, so the dispatcher's retry ladder treats it like any other send failure.
#[derive(Clone)]
pub struct SmsChannel {
    api: SmsApi,
}

impl SmsChannel {
    pub fn new(api: SmsApi) -> Self {
        Self { api }
    }
}

impl SmsProvider for SmsChannel {
    async fn send_sms(&self, phone: &str, message: &str) -> Result<ProviderReceipt, ChannelError> {
        let outcome = self.api.send(phone, message).await.map_err(into_channel_error)?;
        if outcome.accepted() {
            Ok(ProviderReceipt { provider_message_id: outcome.value, provider_status: outcome.ret_status })
        } else {
            Err(ChannelError::Rejected(
                outcome.status_text.unwrap_or_else(|| "provider rejected request".to_string()),
            ))
        }
    }
}

fn into_channel_error(e: SmsApiError) -> ChannelError {
    match e {
        SmsApiError::NotConfigured(m) => ChannelError::NotConfigured(m),
        other => ChannelError::Unreachable(other.to_string()),
    }
}
