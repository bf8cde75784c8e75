//! Adapters binding the `provider_tools` HTTP clients to the engine's gateway and channel traits.
mod sms;
mod telegram;
mod zibal;

pub use sms::SmsChannel;
pub use telegram::TelegramChat;
pub use zibal::ZibalGateway;
