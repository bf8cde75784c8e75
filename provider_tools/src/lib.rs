//! HTTP clients for the external providers the Sofra gateway talks to: the Zibal payment gateway, the Telegram bot
//! API for chat notifications, and the Melipayamak REST API for SMS. Each client owns its configuration (read from
//! the environment) and exposes a small typed surface; retry policy, bookkeeping and idempotency live with the
//! callers in the engine.
pub mod sms;
pub mod telegram;
pub mod zibal;

pub use sms::{SmsApi, SmsApiError, SmsConfig, SmsSendOutcome};
pub use telegram::{BotTarget, TelegramApi, TelegramApiError, TelegramConfig, TelegramReceipt};
pub use zibal::{ZibalApi, ZibalApiError, ZibalConfig, ZibalRequestOutcome, ZibalVerifyOutcome};
