use fulfillment_engine::traits::{ChannelError, ChatProvider, ChatTarget, ProviderReceipt};
use provider_tools::{BotTarget, TelegramApi, TelegramApiError};

/// Binds the Telegram bot client to the engine's chat channel trait.
#[derive(Clone)]
pub struct TelegramChat {
    api: TelegramApi,
}

impl TelegramChat {
    pub fn new(api: TelegramApi) -> Self {
        Self { api }
    }
}

impl ChatProvider for TelegramChat {
    async fn send_message(
        &self,
        chat_id: &str,
        message: &str,
        target: ChatTarget,
    ) -> Result<ProviderReceipt, ChannelError> {
        let bot = match target {
            ChatTarget::Customer => BotTarget::Customer,
            ChatTarget::Vendor => BotTarget::Vendor,
        };
        let receipt = self.api.send_message(bot, chat_id, message).await.map_err(into_channel_error)?;
        Ok(ProviderReceipt {
            provider_message_id: receipt.message_id.map(|id| id.to_string()),
            provider_status: Some("SENT".to_string()),
        })
    }
}

fn into_channel_error(e: TelegramApiError) -> ChannelError {
    match e {
        TelegramApiError::NotConfigured(m) => ChannelError::NotConfigured(m),
        TelegramApiError::Rejected(m) => ChannelError::Rejected(m),
        other => ChannelError::Unreachable(other.to_string()),
    }
}
