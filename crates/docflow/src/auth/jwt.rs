//! HS256 bearer token validation
//!
//! Tokens are issued elsewhere (`user_id` claim, optional `token_type` and
//! `exp`); this side only verifies the signature and reads the owner id.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use ring::hmac;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Authenticator;
use crate::error::{Error, Result};
use crate::types::{OwnerId, TokenValidation};

/// Claims read from (and written to) a token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Integer or numeric string
    pub user_id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

impl Claims {
    /// Access-token claims for `owner` expiring `ttl_secs` from now
    pub fn access(owner: OwnerId, ttl_secs: i64) -> Self {
        Self {
            user_id: Value::from(owner.0),
            exp: Some(Utc::now().timestamp() + ttl_secs),
            token_type: Some("access".to_string()),
        }
    }

    fn owner(&self) -> Option<OwnerId> {
        match &self.user_id {
            Value::Number(n) => n.as_i64().map(OwnerId),
            Value::String(s) => s.parse().ok().map(OwnerId),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
struct Header {
    alg: String,
}

/// Validates tokens signed with a shared HMAC-SHA256 secret
pub struct JwtAuthenticator {
    key: hmac::Key,
    leeway_secs: i64,
}

impl JwtAuthenticator {
    pub fn new(secret: &str, leeway_secs: u64) -> Self {
        Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes()),
            leeway_secs: leeway_secs.min(i64::MAX as u64) as i64,
        }
    }

    /// Sign claims into a compact token
    pub fn sign(&self, claims: &Claims) -> Result<String> {
        let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#.as_bytes());
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims)?);
        let signing_input = format!("{}.{}", header, payload);
        let signature = hmac::sign(&self.key, signing_input.as_bytes());
        Ok(format!(
            "{}.{}",
            signing_input,
            URL_SAFE_NO_PAD.encode(signature.as_ref())
        ))
    }

    /// Verify a token and return the owner it names
    pub fn decode(&self, token: &str) -> Result<OwnerId> {
        let unauthorized = |msg: &str| Error::Unauthorized(msg.to_string());

        let mut parts = token.trim().split('.');
        let (Some(header_b64), Some(payload_b64), Some(signature_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(unauthorized("Token is malformed"));
        };

        let header: Header = URL_SAFE_NO_PAD
            .decode(header_b64)
            .ok()
            .and_then(|raw| serde_json::from_slice(&raw).ok())
            .ok_or_else(|| unauthorized("Token header is invalid"))?;
        if header.alg != "HS256" {
            return Err(unauthorized("Token algorithm is not accepted"));
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| unauthorized("Token signature is invalid"))?;
        let signing_input = &token.trim()[..header_b64.len() + 1 + payload_b64.len()];
        hmac::verify(&self.key, signing_input.as_bytes(), &signature)
            .map_err(|_| unauthorized("Token signature is invalid"))?;

        let claims: Claims = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .ok()
            .and_then(|raw| serde_json::from_slice(&raw).ok())
            .ok_or_else(|| unauthorized("Token payload is invalid"))?;

        if let Some(exp) = claims.exp {
            if Utc::now().timestamp() > exp.saturating_add(self.leeway_secs) {
                return Err(unauthorized("Token is expired"));
            }
        }
        if matches!(claims.token_type.as_deref(), Some(t) if t != "access") {
            return Err(unauthorized("Token has wrong type"));
        }

        claims
            .owner()
            .ok_or_else(|| unauthorized("Token carries no user_id"))
    }
}

impl Authenticator for JwtAuthenticator {
    fn validate(&self, token: &str) -> TokenValidation {
        match self.decode(token) {
            Ok(owner) => TokenValidation::valid(owner),
            Err(Error::Unauthorized(msg)) => TokenValidation::invalid(msg),
            Err(other) => TokenValidation::invalid(other.to_string()),
        }
    }
}
