//! The `Auth.currentUser(token) -> {id, role}` collaborator contract, realised as HS256 JWTs.
//!
//! Tokens are issued by the login surface (OTP flows, admin consoles) with the same shared secret; this module only
//! validates them and exposes the claims to handlers as an extractor.
use std::future::{ready, Ready};

use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use log::*;
use serde::{Deserialize, Serialize};

use fulfillment_engine::db_types::{Actor, ActorType};

use crate::{
    config::AuthConfig,
    errors::{AuthError, ServerError},
};

pub const DEFAULT_TOKEN_VALIDITY: Duration = Duration::hours(24);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Customer id, vendor id or admin user id, depending on `role`.
    pub sub: String,
    pub role: ActorType,
    pub exp: i64,
}

impl JwtClaims {
    pub fn actor(&self) -> Actor {
        Actor { actor_type: self.role, id: self.sub.clone() }
    }

    pub fn require_role(&self, role: ActorType) -> Result<(), ServerError> {
        if self.role == role {
            Ok(())
        } else {
            Err(ServerError::InsufficientPermissions(format!("This endpoint requires the {role} role")))
        }
    }
}

/// Issues and validates access tokens. Shared through app data so the extractor can reach the decoding key.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl TokenIssuer {
    pub fn new(config: &AuthConfig) -> Self {
        let secret = config.jwt_secret.reveal().as_bytes();
        Self { encoding_key: EncodingKey::from_secret(secret), decoding_key: DecodingKey::from_secret(secret) }
    }

    pub fn issue(&self, sub: &str, role: ActorType, validity: Duration) -> Result<String, ServerError> {
        let claims = JwtClaims { sub: sub.to_string(), role, exp: (Utc::now() + validity).timestamp() };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| ServerError::Unspecified(format!("Could not sign access token. {e}")))
    }

    pub fn validate(&self, token: &str) -> Result<JwtClaims, AuthError> {
        let data = decode::<JwtClaims>(token, &self.decoding_key, &Validation::new(Algorithm::HS256))
            .map_err(|e| AuthError::ValidationError(e.to_string()))?;
        Ok(data.claims)
    }
}

impl FromRequest for JwtClaims {
    type Error = ServerError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(extract_claims(req))
    }
}

fn extract_claims(req: &HttpRequest) -> Result<JwtClaims, ServerError> {
    let issuer = req
        .app_data::<web::Data<TokenIssuer>>()
        .ok_or_else(|| ServerError::ConfigurationError("TokenIssuer is not registered".to_string()))?;
    let header = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or(ServerError::AuthenticationError(AuthError::MissingToken))?;
    let token = header.strip_prefix("Bearer ").unwrap_or(header).trim();
    if token.is_empty() {
        return Err(ServerError::AuthenticationError(AuthError::MissingToken));
    }
    let claims = issuer.validate(token).map_err(|e| {
        debug!("💻️ Rejected access token: {e}");
        ServerError::AuthenticationError(e)
    })?;
    Ok(claims)
}
