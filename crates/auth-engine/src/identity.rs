//! Access-token claim decoding.
//!
//! Claims are read without validating the signature: the token came straight
//! from the issuer through the host or the login dialog, and the backend
//! validates it again on every call. A [`TokenVerifier`] can be plugged in
//! where local verification is wanted.

use crate::error::DecodeError;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Normalized identity of the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Stable user id (`oid`, falling back to `sub`).
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Token subject (`sub`, falling back to `oid`).
    pub subject: String,
}

#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(default)]
    oid: Option<String>,
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    preferred_username: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    upn: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

/// Extra check run on decoded claims before an identity is accepted.
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str, claims: &Value) -> Result<(), String>;
}

/// Verifier that accepts every token.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAllVerifier;

impl TokenVerifier for AcceptAllVerifier {
    fn verify(&self, _token: &str, _claims: &Value) -> Result<(), String> {
        Ok(())
    }
}

/// Decodes bearer tokens into [`Identity`] records.
#[derive(Clone)]
pub struct IdentityDecoder {
    verifier: Arc<dyn TokenVerifier>,
}

impl Default for IdentityDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityDecoder {
    pub fn new() -> Self {
        Self::with_verifier(Arc::new(AcceptAllVerifier))
    }

    pub fn with_verifier(verifier: Arc<dyn TokenVerifier>) -> Self {
        Self { verifier }
    }

    pub fn decode(&self, token: &str) -> Result<Identity, DecodeError> {
        let raw = decode_claims(token)?;
        self.verifier
            .verify(token, &raw)
            .map_err(DecodeError::Rejected)?;

        let claims: Claims =
            serde_json::from_value(raw).map_err(|e| DecodeError::Claims(e.to_string()))?;

        let id = claims
            .oid
            .clone()
            .or_else(|| claims.sub.clone())
            .filter(|s| !s.is_empty())
            .ok_or(DecodeError::MissingSubject)?;
        let subject = claims
            .sub
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| id.clone());

        Ok(Identity {
            id,
            email: claims.preferred_username.or(claims.email).or(claims.upn),
            name: claims.name,
            subject,
        })
    }
}

impl std::fmt::Debug for IdentityDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityDecoder").finish_non_exhaustive()
    }
}

/// Decode the payload segment of a compact JWT into a JSON object.
pub fn decode_claims(token: &str) -> Result<Value, DecodeError> {
    let mut parts = token.trim().split('.');
    let payload = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(_), Some(payload), Some(_), None) if !payload.is_empty() => payload,
        _ => return Err(DecodeError::Malformed),
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| DecodeError::Base64(e.to_string()))?;
    let value: Value =
        serde_json::from_slice(&bytes).map_err(|e| DecodeError::Claims(e.to_string()))?;

    if !value.is_object() {
        return Err(DecodeError::Claims("claim set is not an object".to_string()));
    }
    Ok(value)
}

/// Build an unsigned compact token for tests.
#[cfg(test)]
pub(crate) fn test_token(claims: Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.c2ln")
}
