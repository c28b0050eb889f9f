//! ID token claim decoding.
//!
//! The ID token arrives directly from the token endpoint over TLS and its
//! signature is **not** verified. Only the payload segment is decoded. The
//! audience is still compared against the client id when enabled.

use crate::config::Config;
use crate::error::{AuthError, ConfigError};
use serde_json::Value;
use tracing::warn;

/// Claim name to value mapping decoded from an ID token payload.
pub type Claims = serde_json::Map<String, Value>;

/// Decodes the claims of a compact-serialized ID token.
pub trait ClaimsDecoder: Send + Sync {
    fn decode(&self, id_token: &str) -> Result<Claims, AuthError>;
}

/// Reads the payload segment without checking the signature.
#[derive(Debug, Clone)]
pub struct UnverifiedClaimsDecoder {
    expected_audience: Option<String>,
}

impl UnverifiedClaimsDecoder {
    /// `expected_audience` of `None` disables the `aud` check.
    pub fn new(expected_audience: Option<String>) -> Self {
        Self { expected_audience }
    }

    /// Build the decoder described by the `[security]` section.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        if !config.security.skip_signature_verification {
            return Err(ConfigError::SignatureVerificationUnsupported);
        }

        warn!("ID token signature verification is disabled; tokens are trusted as delivered by the token endpoint");

        let expected_audience = config
            .security
            .validate_audience
            .then(|| config.provider.client_id.clone());

        Ok(Self::new(expected_audience))
    }

    fn check_audience(&self, claims: &Claims) -> Result<(), AuthError> {
        let Some(expected) = &self.expected_audience else {
            return Ok(());
        };

        let matches = match claims.get("aud") {
            Some(Value::String(aud)) => aud == expected,
            Some(Value::Array(auds)) => auds.iter().any(|a| a.as_str() == Some(expected.as_str())),
            _ => return Err(AuthError::Identity("ID token has no aud claim".into())),
        };

        if matches {
            Ok(())
        } else {
            Err(AuthError::Identity(
                "ID token audience does not match client id".into(),
            ))
        }
    }
}

impl ClaimsDecoder for UnverifiedClaimsDecoder {
    fn decode(&self, id_token: &str) -> Result<Claims, AuthError> {
        let data = jsonwebtoken::dangerous::insecure_decode::<Claims>(id_token)
            .map_err(|e| AuthError::Protocol(format!("Cannot parse ID token: {}", e)))?;

        self.check_audience(&data.claims)?;

        Ok(data.claims)
    }
}

/// Extract the display username from `claim`.
pub fn extract_username(claims: &Claims, claim: &str) -> Result<String, AuthError> {
    match claims.get(claim) {
        Some(Value::String(name)) if !name.trim().is_empty() => Ok(name.clone()),
        Some(Value::String(_)) => Err(AuthError::Identity(format!(
            "username claim {:?} is empty",
            claim
        ))),
        Some(_) => Err(AuthError::Identity(format!(
            "username claim {:?} is not a string",
            claim
        ))),
        None => Err(AuthError::Identity(format!(
            "ID token has no {:?} claim",
            claim
        ))),
    }
}
