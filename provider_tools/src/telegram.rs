use std::{env, sync::Arc};

use log::*;
use reqwest::Client;
use serde_json::{json, Value};
use thiserror::Error;

use sfg_common::Secret;

pub const DEFAULT_TELEGRAM_BASE_URL: &str = "https://api.telegram.org";

/// Customers and vendors talk to different bots, so two tokens. Either may be absent; sends through a missing bot
/// fail with [`TelegramApiError::NotConfigured`] and the caller decides what that costs.
#[derive(Clone, Debug, Default)]
pub struct TelegramConfig {
    pub customer_bot_token: Option<Secret<String>>,
    pub vendor_bot_token: Option<Secret<String>>,
    pub base_url: String,
}

impl TelegramConfig {
    pub fn new_from_env_or_default() -> Self {
        let customer_bot_token = env::var("SFG_TELEGRAM_CUSTOMER_BOT_TOKEN").ok().map(Secret::new);
        if customer_bot_token.is_none() {
            warn!("🪛️ SFG_TELEGRAM_CUSTOMER_BOT_TOKEN is not set. Customer chat notifications are disabled.");
        }
        let vendor_bot_token = env::var("SFG_TELEGRAM_VENDOR_BOT_TOKEN").ok().map(Secret::new);
        if vendor_bot_token.is_none() {
            warn!("🪛️ SFG_TELEGRAM_VENDOR_BOT_TOKEN is not set. Vendor chat notifications are disabled.");
        }
        let base_url = env::var("SFG_TELEGRAM_BASE_URL").ok().unwrap_or_else(|| DEFAULT_TELEGRAM_BASE_URL.to_string());
        Self { customer_bot_token, vendor_bot_token, base_url }
    }
}

/// Which bot identity to send from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BotTarget {
    Customer,
    Vendor,
}

#[derive(Clone, Debug)]
pub struct TelegramReceipt {
    pub message_id: Option<i64>,
}

#[derive(Clone)]
pub struct TelegramApi {
    config: TelegramConfig,
    client: Arc<Client>,
}

impl TelegramApi {
    pub fn new(config: TelegramConfig) -> Result<Self, TelegramApiError> {
        let client = Client::builder().build().map_err(|e| TelegramApiError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }

    pub async fn send_message(
        &self,
        target: BotTarget,
        chat_id: &str,
        text: &str,
    ) -> Result<TelegramReceipt, TelegramApiError> {
        let token = match target {
            BotTarget::Customer => self.config.customer_bot_token.as_ref(),
            BotTarget::Vendor => self.config.vendor_bot_token.as_ref(),
        }
        .ok_or_else(|| TelegramApiError::NotConfigured(format!("{target:?} bot token missing")))?;
        let url = format!("{}/bot{}/sendMessage", self.config.base_url, token.reveal());
        let body = json!({ "chat_id": chat_id, "text": text, "parse_mode": "HTML" });
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| TelegramApiError::ResponseError(e.to_string()))?;
        let status = response.status();
        let payload = response.json::<Value>().await.map_err(|e| TelegramApiError::JsonError(e.to_string()))?;
        if !status.is_success() || payload["ok"] != json!(true) {
            let description = payload["description"].as_str().unwrap_or("no description").to_string();
            warn!("🤖️ Telegram rejected a sendMessage call: {description}");
            return Err(TelegramApiError::Rejected(description));
        }
        trace!("🤖️ Telegram message delivered to chat {chat_id}");
        Ok(TelegramReceipt { message_id: payload["result"]["message_id"].as_i64() })
    }
}

#[derive(Debug, Clone, Error)]
pub enum TelegramApiError {
    #[error("Could not initialize the Telegram client. {0}")]
    Initialization(String),
    #[error("The bot is not configured. {0}")]
    NotConfigured(String),
    #[error("Error communicating with Telegram. {0}")]
    ResponseError(String),
    #[error("Could not parse the Telegram response. {0}")]
    JsonError(String),
    #[error("Telegram rejected the message. {0}")]
    Rejected(String),
}
