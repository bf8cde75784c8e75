use std::{env, sync::Arc};

use log::*;
use reqwest::Client;
use serde_json::{json, Value};
use thiserror::Error;

use sfg_common::Secret;

pub const DEFAULT_ZIBAL_BASE_URL: &str = "https://gateway.zibal.ir";

/// Result code the gateway uses for a successful request or a settled payment.
pub const ZIBAL_RESULT_OK: i64 = 100;

#[derive(Clone, Debug, Default)]
pub struct ZibalConfig {
    pub merchant: Secret<String>,
    pub callback_url: String,
    pub base_url: String,
}

impl ZibalConfig {
    pub fn new_from_env_or_default() -> Self {
        let merchant = env::var("SFG_ZIBAL_MERCHANT").ok().unwrap_or_else(|| {
            error!("🪛️ SFG_ZIBAL_MERCHANT is not set. Payment requests will be rejected by the gateway.");
            String::default()
        });
        let callback_url = env::var("SFG_ZIBAL_CALLBACK_URL").ok().unwrap_or_else(|| {
            warn!("🪛️ SFG_ZIBAL_CALLBACK_URL is not set. The gateway will have nowhere to send callbacks.");
            String::default()
        });
        let base_url = env::var("SFG_ZIBAL_BASE_URL").ok().unwrap_or_else(|| DEFAULT_ZIBAL_BASE_URL.to_string());
        Self { merchant: Secret::new(merchant), callback_url, base_url }
    }
}

/// Outcome of a payment session request. `raw` carries the provider response verbatim.
#[derive(Clone, Debug)]
pub struct ZibalRequestOutcome {
    pub result: i64,
    pub message: Option<String>,
    pub pay_link: Option<String>,
    pub raw: Value,
}

impl ZibalRequestOutcome {
    pub fn accepted(&self) -> bool {
        self.result == ZIBAL_RESULT_OK
    }
}

/// Outcome of a verify call. `raw` carries the provider response verbatim.
#[derive(Clone, Debug)]
pub struct ZibalVerifyOutcome {
    pub result: i64,
    pub amount: Option<i64>,
    pub ref_number: Option<String>,
    pub paid_at: Option<String>,
    pub raw: Value,
}

impl ZibalVerifyOutcome {
    pub fn settled(&self) -> bool {
        self.result == ZIBAL_RESULT_OK
    }
}

#[derive(Clone)]
pub struct ZibalApi {
    config: ZibalConfig,
    client: Arc<Client>,
}

impl ZibalApi {
    pub fn new(config: ZibalConfig) -> Result<Self, ZibalApiError> {
        let client = Client::builder().build().map_err(|e| ZibalApiError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }

    /// The hosted payment page for a track id. Used when the request response omits an explicit link.
    pub fn start_link(&self, track_id: &str) -> String {
        format!("{}/start/{track_id}", self.config.base_url)
    }

    /// Ask the gateway to open a payment session for `amount` rials under `track_id`.
    pub async fn request(&self, amount: i64, track_id: &str) -> Result<ZibalRequestOutcome, ZibalApiError> {
        let body = json!({
            "merchant": self.config.merchant.reveal(),
            "amount": amount,
            "callbackUrl": self.config.callback_url,
            "trackId": track_id,
        });
        let raw = self.post("/v1/request", body).await?;
        let result = raw["result"].as_i64().ok_or_else(|| {
            ZibalApiError::InvalidResponse("request response carried no result code".to_string())
        })?;
        trace!("💳️ Zibal request for track {track_id} returned result {result}");
        Ok(ZibalRequestOutcome {
            result,
            message: raw["message"].as_str().map(String::from),
            pay_link: raw["payLink"].as_str().map(String::from).or_else(|| Some(self.start_link(track_id))),
            raw,
        })
    }

    /// Ask the gateway whether the payment under `track_id` settled.
    pub async fn verify(&self, track_id: &str) -> Result<ZibalVerifyOutcome, ZibalApiError> {
        let body = json!({
            "merchant": self.config.merchant.reveal(),
            "trackId": track_id,
        });
        let raw = self.post("/v1/verify", body).await?;
        let result = raw["result"]
            .as_i64()
            .ok_or_else(|| ZibalApiError::InvalidResponse("verify response carried no result code".to_string()))?;
        trace!("💳️ Zibal verify for track {track_id} returned result {result}");
        Ok(ZibalVerifyOutcome {
            result,
            amount: raw["amount"].as_i64(),
            ref_number: match &raw["refNumber"] {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            },
            paid_at: raw["paidAt"].as_str().map(String::from),
            raw,
        })
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, ZibalApiError> {
        let url = format!("{}{path}", self.config.base_url);
        trace!("💳️ Sending gateway query: {url}");
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ZibalApiError::ResponseError(e.to_string()))?;
        if response.status().is_success() {
            response.json::<Value>().await.map_err(|e| ZibalApiError::JsonError(e.to_string()))
        } else {
            let status = response.status().as_u16();
            let message = response.text().await.map_err(|e| ZibalApiError::ResponseError(e.to_string()))?;
            Err(ZibalApiError::QueryError { status, message })
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ZibalApiError {
    #[error("Could not initialize the Zibal client. {0}")]
    Initialization(String),
    #[error("Error communicating with the gateway. {0}")]
    ResponseError(String),
    #[error("Could not parse the gateway response. {0}")]
    JsonError(String),
    #[error("The gateway returned an unusable response. {0}")]
    InvalidResponse(String),
    #[error("Gateway query failed with status {status}: {message}")]
    QueryError { status: u16, message: String },
}
