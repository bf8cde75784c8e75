use thiserror::Error;

/// Which bot identity a chat message is sent from. Customers and vendors talk to different bots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatTarget {
    Customer,
    Vendor,
}

/// What the provider told us about an accepted message. Stored on the notification record.
#[derive(Debug, Clone, Default)]
pub struct ProviderReceipt {
    pub provider_message_id: Option<String>,
    pub provider_status: Option<String>,
}

/// The chat-bot channel (e.g. a Telegram bot API client). The dispatcher owns retries and bookkeeping; an
/// implementation only has to make one delivery attempt and report honestly.
#[allow(async_fn_in_trait)]
pub trait ChatProvider: Clone {
    async fn send_message(&self, chat_id: &str, message: &str, target: ChatTarget) -> Result<ProviderReceipt, ChannelError>;
}

/// The SMS gateway channel.
#[allow(async_fn_in_trait)]
pub trait SmsProvider: Clone {
    async fn send_sms(&self, phone: &str, message: &str) -> Result<ProviderReceipt, ChannelError>;
}

#[derive(Debug, Clone, Error)]
pub enum ChannelError {
    #[error("The provider could not be reached. {0}")]
    Unreachable(String),
    #[error("The provider rejected the message. {0}")]
    Rejected(String),
    #[error("The channel is not configured. {0}")]
    NotConfigured(String),
}
