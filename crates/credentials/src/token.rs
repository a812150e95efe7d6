//! Sandbox-token validation.
//!
//! Sandboxes receive an HS256-signed token at creation time carrying
//! the tenant/team they act for. Sandboxes can run attacker-influenced
//! code, so tenant context is only ever taken from a validated token —
//! never from spoofable headers — except in permissive (local dev) mode.

use base64::engine::general_purpose::URL_SAFE_NO_PAD as BASE64URL;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use ifox_domain::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// Claims carried by a sandbox token.
#[derive(Debug, Clone, Deserialize)]
pub struct SandboxClaims {
    pub tenant_id: String,
    pub team_id: String,
    #[serde(default)]
    pub sandbox_name: String,
    /// Unix expiry timestamp.
    #[serde(default)]
    pub exp: Option<i64>,
}

/// Validate a compact HS256 token (`header.payload.signature`) and
/// return its claims.
pub fn validate_sandbox_token(token: &str, secret: &[u8]) -> Result<SandboxClaims> {
    let mut parts = token.split('.');
    let (Some(header), Some(payload), Some(signature)) =
        (parts.next(), parts.next(), parts.next())
    else {
        return Err(Error::Auth("malformed sandbox token".into()));
    };
    if parts.next().is_some() {
        return Err(Error::Auth("malformed sandbox token".into()));
    }

    let expected_sig = BASE64URL
        .decode(signature)
        .map_err(|_| Error::Auth("bad token signature encoding".into()))?;

    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|_| Error::Config("empty sandbox token secret".into()))?;
    mac.update(header.as_bytes());
    mac.update(b".");
    mac.update(payload.as_bytes());
    mac.verify_slice(&expected_sig)
        .map_err(|_| Error::Auth("sandbox token signature mismatch".into()))?;

    let payload_bytes = BASE64URL
        .decode(payload)
        .map_err(|_| Error::Auth("bad token payload encoding".into()))?;
    let claims: SandboxClaims = serde_json::from_slice(&payload_bytes)
        .map_err(|_| Error::Auth("bad token payload".into()))?;

    if let Some(exp) = claims.exp {
        if exp <= chrono::Utc::now().timestamp() {
            return Err(Error::Auth("sandbox token expired".into()));
        }
    }

    Ok(claims)
}

/// Sign claims into a compact token. Used by the control plane when it
/// creates a sandbox, and by tests.
pub fn sign_sandbox_token(claims: &serde_json::Value, secret: &[u8]) -> String {
    let header = BASE64URL.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = BASE64URL.encode(claims.to_string().as_bytes());
    let mut mac = HmacSha256::new_from_slice(secret).expect("hmac accepts any key length");
    mac.update(header.as_bytes());
    mac.update(b".");
    mac.update(payload.as_bytes());
    let signature = BASE64URL.encode(mac.finalize().into_bytes());
    format!("{header}.{payload}.{signature}")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"test-secret";

    fn token(exp_offset: i64) -> String {
        sign_sandbox_token(
            &serde_json::json!({
                "tenant_id": "acme",
                "team_id": "core",
                "sandbox_name": "sbx-1",
                "exp": chrono::Utc::now().timestamp() + exp_offset,
            }),
            SECRET,
        )
    }

    #[test]
    fn valid_token_round_trips() {
        let claims = validate_sandbox_token(&token(3600), SECRET).unwrap();
        assert_eq!(claims.tenant_id, "acme");
        assert_eq!(claims.team_id, "core");
        assert_eq!(claims.sandbox_name, "sbx-1");
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let err = validate_sandbox_token(&token(3600), b"other-secret").unwrap_err();
        assert_eq!(err.kind(), "auth");
    }

    #[test]
    fn expired_token_is_rejected() {
        let err = validate_sandbox_token(&token(-10), SECRET).unwrap_err();
        assert_eq!(err.kind(), "auth");
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let good = token(3600);
        let mut parts: Vec<&str> = good.split('.').collect();
        let forged = BASE64URL.encode(
            serde_json::json!({"tenant_id": "evil", "team_id": "core"})
                .to_string()
                .as_bytes(),
        );
        parts[1] = &forged;
        let tampered = parts.join(".");
        assert!(validate_sandbox_token(&tampered, SECRET).is_err());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(validate_sandbox_token("not-a-token", SECRET).is_err());
        assert!(validate_sandbox_token("a.b", SECRET).is_err());
        assert!(validate_sandbox_token("a.b.c.d", SECRET).is_err());
    }
}
