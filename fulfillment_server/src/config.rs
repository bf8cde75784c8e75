use std::{env, net::IpAddr};

use chrono::Duration;
use log::*;
use rand::RngCore;

use fulfillment_engine::{matching::DeliveryPricing, ReconcilerConfig};
use provider_tools::{SmsConfig, TelegramConfig, ZibalConfig};
use sfg_common::{helpers::parse_boolean_flag, Rial, Secret};

const DEFAULT_SFG_HOST: &str = "127.0.0.1";
const DEFAULT_SFG_PORT: u16 = 8390;
const DEFAULT_CALLBACK_FRESHNESS_SECS: i64 = 300;
const DEFAULT_CALLBACK_REPLAY_TTL_SECS: u64 = 600;

/// Per-route fixed-window rate limits.
pub const VERIFY_RATE_LIMIT: (u32, u64) = (6, 60);
pub const CALLBACK_RATE_LIMIT: (u32, u64) = (3, 60);

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// True when SFG_ENVIRONMENT=production. Controls whether unsigned gateway callbacks are tolerated.
    pub production: bool,
    pub auth: AuthConfig,
    /// Shared secret for the payment gateway callback signature.
    pub callback_secret: Option<Secret<String>>,
    pub callback_freshness: Duration,
    pub callback_replay_ttl: std::time::Duration,
    /// If supplied, callback requests are checked against this IP whitelist. To explicitly disable the whitelist,
    /// set SFG_CALLBACK_IP_WHITELIST to "false", "none", or "0".
    pub callback_whitelist: Option<Vec<IpAddr>>,
    /// Shared secret for the courier webhook HMAC check.
    pub courier_hmac_secret: Secret<String>,
    pub courier_hmac_checks: bool,
    /// If true, the X-Forwarded-For header is used to determine the client's IP address rather than the
    /// connection's remote address.
    pub use_x_forwarded_for: bool,
    pub pricing: DeliveryPricing,
    pub zibal: ZibalConfig,
    pub telegram: TelegramConfig,
    pub sms: SmsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_SFG_HOST.to_string(),
            port: DEFAULT_SFG_PORT,
            database_url: String::default(),
            production: false,
            auth: AuthConfig::default(),
            callback_secret: None,
            callback_freshness: Duration::seconds(DEFAULT_CALLBACK_FRESHNESS_SECS),
            callback_replay_ttl: std::time::Duration::from_secs(DEFAULT_CALLBACK_REPLAY_TTL_SECS),
            callback_whitelist: None,
            courier_hmac_secret: Secret::default(),
            courier_hmac_checks: true,
            use_x_forwarded_for: false,
            pricing: DeliveryPricing::default(),
            zibal: ZibalConfig::default(),
            telegram: TelegramConfig::default(),
            sms: SmsConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("SFG_HOST").ok().unwrap_or_else(|| DEFAULT_SFG_HOST.into());
        let port = env::var("SFG_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!("🪛️ {s} is not a valid port for SFG_PORT. {e} Using the default, {DEFAULT_SFG_PORT}, instead.");
                    DEFAULT_SFG_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_SFG_PORT);
        let database_url = env::var("SFG_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ SFG_DATABASE_URL is not set. Please set it to the URL for the gateway database.");
            String::default()
        });
        let production = env::var("SFG_ENVIRONMENT").map(|s| s.eq_ignore_ascii_case("production")).unwrap_or(false);
        let callback_secret = env::var("SFG_CALLBACK_HMAC_SECRET").ok().map(Secret::new);
        if callback_secret.is_none() {
            let msg = "SFG_CALLBACK_HMAC_SECRET is not set. Gateway callbacks cannot be authenticated.";
            if production {
                error!("🚨️ {msg} Callbacks will be rejected in production.");
            } else {
                warn!("🪛️ {msg}");
            }
        }
        let callback_freshness = env::var("SFG_CALLBACK_FRESHNESS_SECS")
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .map(Duration::seconds)
            .unwrap_or_else(|| Duration::seconds(DEFAULT_CALLBACK_FRESHNESS_SECS));
        let callback_replay_ttl = env::var("SFG_CALLBACK_REPLAY_TTL_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(std::time::Duration::from_secs)
            .unwrap_or_else(|| std::time::Duration::from_secs(DEFAULT_CALLBACK_REPLAY_TTL_SECS));
        let callback_whitelist = read_ip_whitelist();
        let courier_hmac_secret = Secret::new(env::var("SFG_COURIER_HMAC_SECRET").ok().unwrap_or_else(|| {
            warn!("🪛️ SFG_COURIER_HMAC_SECRET is not set. Courier webhook signatures cannot be verified.");
            String::default()
        }));
        let courier_hmac_checks = parse_boolean_flag(env::var("SFG_COURIER_HMAC_CHECKS").ok(), true);
        let use_x_forwarded_for = parse_boolean_flag(env::var("SFG_USE_X_FORWARDED_FOR").ok(), false);
        Self {
            host,
            port,
            database_url,
            production,
            auth: AuthConfig::from_env_or_default(),
            callback_secret,
            callback_freshness,
            callback_replay_ttl,
            callback_whitelist,
            courier_hmac_secret,
            courier_hmac_checks,
            use_x_forwarded_for,
            pricing: pricing_from_env(),
            zibal: ZibalConfig::new_from_env_or_default(),
            telegram: TelegramConfig::new_from_env_or_default(),
            sms: SmsConfig::new_from_env_or_default(),
        }
    }

    pub fn reconciler_config(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            callback_secret: self.callback_secret.clone(),
            enforce_signature: self.production,
            freshness_window: self.callback_freshness,
            replay_ttl: self.callback_replay_ttl,
        }
    }
}

fn read_ip_whitelist() -> Option<Vec<IpAddr>> {
    let raw = env::var("SFG_CALLBACK_IP_WHITELIST").ok()?;
    if ["none", "false", "0"].contains(&raw.to_lowercase().as_str()) {
        info!(
            "🪛️ The callback IP whitelist is disabled. If this is not what you want, set SFG_CALLBACK_IP_WHITELIST \
             to a comma-separated list of IP addresses to enable it."
        );
        return None;
    }
    let addrs = raw
        .split(',')
        .filter_map(|s| {
            let s = s.trim();
            s.parse::<IpAddr>()
                .map_err(|e| warn!("🪛️ Ignoring invalid IP address ({s}) in SFG_CALLBACK_IP_WHITELIST: {e}"))
                .ok()
        })
        .collect::<Vec<IpAddr>>();
    if addrs.is_empty() {
        warn!(
            "🚨️ The callback IP whitelist was configured, but is empty. The server will run, but won't authorise \
             any gateway callbacks."
        );
    }
    Some(addrs)
}

fn pricing_from_env() -> DeliveryPricing {
    let defaults = DeliveryPricing::default();
    let rial = |key: &str, default: Rial| {
        env::var(key)
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .map(Rial::from)
            .unwrap_or(default)
    };
    DeliveryPricing {
        internal_fee: rial("SFG_INTERNAL_DELIVERY_FEE", defaults.internal_fee),
        base_fee: rial("SFG_COURIER_BASE_FEE", defaults.base_fee),
        per_km_rate: rial("SFG_COURIER_PER_KM_FEE", defaults.per_km_rate),
        peak_multiplier: env::var("SFG_COURIER_PEAK_MULTIPLIER")
            .ok()
            .and_then(|s| s.parse::<f64>().ok())
            .unwrap_or(defaults.peak_multiplier),
        max_distance_km: env::var("SFG_COURIER_MAX_KM")
            .ok()
            .and_then(|s| s.parse::<f64>().ok())
            .unwrap_or(defaults.max_distance_km),
    }
}

//-------------------------------------------------  AuthConfig  ------------------------------------------------------
/// HS256 signing material for the session tokens issued by the auth collaborator. The secret must be shared with
/// whatever issues tokens upstream.
#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: Secret<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        warn!(
            "🚨️🚨️🚨️ The JWT secret has not been set. I'm using a random value for this session. DO NOT operate \
             production like this, since every restart invalidates all live tokens. Set SFG_JWT_SECRET instead. 🚨️🚨️🚨️"
        );
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let secret = bytes.iter().map(|b| format!("{b:02x}")).collect::<String>();
        Self { jwt_secret: Secret::new(secret) }
    }
}

impl AuthConfig {
    pub fn from_env_or_default() -> Self {
        match env::var("SFG_JWT_SECRET") {
            Ok(secret) if !secret.is_empty() => Self { jwt_secret: Secret::new(secret) },
            _ => Self::default(),
        }
    }
}
