use std::{env, sync::Arc};

use log::*;
use reqwest::Client;
use serde_json::Value;
use thiserror::Error;

use sfg_common::Secret;

pub const DEFAULT_SMS_BASE_URL: &str = "https://rest.payamak-panel.com/api";

#[derive(Clone, Debug, Default)]
pub struct SmsConfig {
    pub username: String,
    pub password: Secret<String>,
    pub from: String,
    pub base_url: String,
}

impl SmsConfig {
    pub fn new_from_env_or_default() -> Self {
        let username = env::var("SFG_SMS_USERNAME").ok().unwrap_or_default();
        let password = Secret::new(env::var("SFG_SMS_PASSWORD").ok().unwrap_or_default());
        let from = env::var("SFG_SMS_FROM").ok().unwrap_or_default();
        if username.is_empty() || from.is_empty() {
            warn!("🪛️ SMS credentials are incomplete (SFG_SMS_USERNAME / SFG_SMS_PASSWORD / SFG_SMS_FROM). SMS sends will fail.");
        }
        let base_url = env::var("SFG_SMS_BASE_URL").ok().unwrap_or_else(|| DEFAULT_SMS_BASE_URL.to_string());
        Self { username, password, from, base_url }
    }

    pub fn is_configured(&self) -> bool {
        !self.username.is_empty() && !self.password.reveal().is_empty() && !self.from.is_empty()
    }
}

#[derive(Clone, Debug)]
pub struct SmsSendOutcome {
    /// Provider status code; "1" means accepted.
    pub ret_status: Option<String>,
    /// Provider message id.
    pub value: Option<String>,
    pub status_text: Option<String>,
}

impl SmsSendOutcome {
    pub fn accepted(&self) -> bool {
        self.ret_status.as_deref() == Some("1")
    }
}

#[derive(Clone)]
pub struct SmsApi {
    config: SmsConfig,
    client: Arc<Client>,
}

impl SmsApi {
    pub fn new(config: SmsConfig) -> Result<Self, SmsApiError> {
        let client = Client::builder().build().map_err(|e| SmsApiError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }

    pub async fn send(&self, to: &str, text: &str) -> Result<SmsSendOutcome, SmsApiError> {
        if !self.config.is_configured() {
            return Err(SmsApiError::NotConfigured("SMS credentials missing".to_string()));
        }
        let url = format!("{}/SendSMS/SendSMS", self.config.base_url);
        let form = [
            ("username", self.config.username.as_str()),
            ("password", self.config.password.reveal().as_str()),
            ("to", to),
            ("from", self.config.from.as_str()),
            ("text", text),
            ("isflash", "false"),
        ];
        let response =
            self.client.post(&url).form(&form).send().await.map_err(|e| SmsApiError::ResponseError(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.map_err(|e| SmsApiError::ResponseError(e.to_string()))?;
            return Err(SmsApiError::QueryError { status, message });
        }
        let payload = response.json::<Value>().await.map_err(|e| SmsApiError::JsonError(e.to_string()))?;
        let outcome = SmsSendOutcome {
            ret_status: match &payload["RetStatus"] {
                Value::Number(n) => Some(n.to_string()),
                Value::String(s) => Some(s.clone()),
                _ => None,
            },
            value: match &payload["Value"] {
                Value::Number(n) => Some(n.to_string()),
                Value::String(s) => Some(s.clone()),
                _ => None,
            },
            status_text: payload["StrRetStatus"].as_str().map(String::from),
        };
        trace!("📱️ SMS provider answered with status {:?} for recipient {to}", outcome.ret_status);
        Ok(outcome)
    }
}

#[derive(Debug, Clone, Error)]
pub enum SmsApiError {
    #[error("Could not initialize the SMS client. {0}")]
    Initialization(String),
    #[error("The SMS gateway is not configured. {0}")]
    NotConfigured(String),
    #[error("Error communicating with the SMS gateway. {0}")]
    ResponseError(String),
    #[error("Could not parse the SMS gateway response. {0}")]
    JsonError(String),
    #[error("SMS query failed with status {status}: {message}")]
    QueryError { status: u16, message: String },
}
