//! Stateless JWT simulate/validate utility.
//!
//! Tokens carry the usual `header.payload.signature` shape with base64url
//! JSON segments, but the signature is a keyed FNV-1a digest, not a
//! cryptographic MAC: this gate exists so mock flows can exercise
//! authorized/unauthorized paths, and it must never be treated as a
//! security boundary. Validation checks structure, signature, and expiry.

use crate::model::JwtSettings;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum JwtError {
    #[error("malformed token")]
    Malformed,
    #[error("invalid token signature")]
    InvalidSignature,
    #[error("token expired")]
    Expired,
}

/// Issue a simulated token for `subject`, expiring per the settings.
pub fn issue(settings: &JwtSettings, subject: &str) -> String {
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        sub: subject.to_string(),
        iat: now,
        exp: now + settings.expires_in_secs as i64,
    };
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"SIM","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(
        serde_json::to_string(&claims).unwrap_or_else(|_| "{}".to_string()),
    );
    let signature = sign(&settings.secret, &header, &payload);
    format!("{header}.{payload}.{signature}")
}

/// Validate structure, signature, and expiry; returns the claims.
pub fn validate(token: &str, settings: &JwtSettings) -> Result<Claims, JwtError> {
    let mut parts = token.split('.');
    let (header, payload, signature) = match (parts.next(), parts.next(), parts.next(), parts.next())
    {
        (Some(h), Some(p), Some(s), None) => (h, p, s),
        _ => return Err(JwtError::Malformed),
    };

    if sign(&settings.secret, header, payload) != signature {
        return Err(JwtError::InvalidSignature);
    }

    let decoded = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| JwtError::Malformed)?;
    let claims: Claims = serde_json::from_slice(&decoded).map_err(|_| JwtError::Malformed)?;

    if claims.exp <= chrono::Utc::now().timestamp() {
        return Err(JwtError::Expired);
    }
    Ok(claims)
}

/// Keyed FNV-1a digest, base64url encoded. Deterministic and stateless;
/// not collision-resistant and not meant to be.
fn sign(secret: &str, header: &str, payload: &str) -> String {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = FNV_OFFSET;
    for byte in secret
        .bytes()
        .chain([b'.'])
        .chain(header.bytes())
        .chain([b'.'])
        .chain(payload.bytes())
    {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    URL_SAFE_NO_PAD.encode(hash.to_be_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> JwtSettings {
        JwtSettings {
            enabled: true,
            secret: "hunter2".to_string(),
            expires_in_secs: 60,
        }
    }

    #[test]
    fn issued_token_validates() {
        let s = settings();
        let token = issue(&s, "alice");
        let claims = validate(&token, &s).unwrap();
        assert_eq!(claims.sub, "alice");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn wrong_secret_fails_signature() {
        let s = settings();
        let token = issue(&s, "alice");
        let other = JwtSettings {
            secret: "different".to_string(),
            ..settings()
        };
        assert_eq!(validate(&token, &other), Err(JwtError::InvalidSignature));
    }

    #[test]
    fn garbage_is_malformed() {
        let s = settings();
        assert_eq!(validate("not-a-token", &s), Err(JwtError::Malformed));
        assert_eq!(validate("a.b", &s), Err(JwtError::Malformed));
        assert_eq!(validate("a.b.c.d", &s), Err(JwtError::Malformed));
    }

    #[test]
    fn expired_token_rejected() {
        let s = JwtSettings {
            enabled: true,
            secret: "hunter2".to_string(),
            expires_in_secs: 0,
        };
        let token = issue(&s, "alice");
        assert_eq!(validate(&token, &s), Err(JwtError::Expired));
    }

    #[test]
    fn tampered_payload_fails() {
        let s = settings();
        let token = issue(&s, "alice");
        let mut parts: Vec<&str> = token.split('.').collect();
        let forged = URL_SAFE_NO_PAD.encode(r#"{"sub":"mallory","iat":0,"exp":9999999999}"#);
        parts[1] = &forged;
        let tampered = parts.join(".");
        assert_eq!(validate(&tampered, &s), Err(JwtError::InvalidSignature));
    }
}
