//! Minimal HS256 compact-token verification.
//!
//! The account service signs each account's tokens with a per-account
//! secret. Only the `HS256` algorithm and the `exp` claim are honoured.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::{Map, Value};
use sha2::Sha256;

use crate::SessionError;

type HmacSha256 = Hmac<Sha256>;

#[derive(Deserialize)]
struct Header {
    alg: String,
}

/// Verifies `token` against `secret` and returns its claims.
///
/// `now` is the current Unix time in seconds; a token whose `exp` is at
/// or before it is rejected.
pub fn verify_hs256(
    token: &str,
    secret: &[u8],
    now: u64,
) -> Result<Map<String, Value>, SessionError> {
    let mut parts = token.split('.');
    let (Some(header), Some(claims), Some(signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(invalid("token must have three segments"));
    };

    let decoded_header: Header = decode_segment(header)?;
    if decoded_header.alg != "HS256" {
        return Err(invalid(format!("unsupported algorithm {}", decoded_header.alg)));
    }

    let mut mac = HmacSha256::new_from_slice(secret).map_err(|e| invalid(e.to_string()))?;
    mac.update(header.as_bytes());
    mac.update(b".");
    mac.update(claims.as_bytes());
    let signature = URL_SAFE_NO_PAD
        .decode(signature)
        .map_err(|e| invalid(format!("signature encoding: {e}")))?;
    mac.verify_slice(&signature)
        .map_err(|_| invalid("signature mismatch"))?;

    let claims: Map<String, Value> = decode_segment(claims)?;
    if let Some(exp) = claims.get("exp").and_then(Value::as_u64) {
        if exp <= now {
            return Err(invalid("token expired"));
        }
    }
    Ok(claims)
}

/// Signs `claims` as an HS256 compact token.
pub fn sign_hs256(claims: &Value, secret: &[u8]) -> Result<String, SessionError> {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let body = serde_json::to_vec(claims).map_err(|e| invalid(e.to_string()))?;
    let body = URL_SAFE_NO_PAD.encode(body);

    let mut mac = HmacSha256::new_from_slice(secret).map_err(|e| invalid(e.to_string()))?;
    mac.update(header.as_bytes());
    mac.update(b".");
    mac.update(body.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    Ok(format!("{header}.{body}.{signature}"))
}

fn decode_segment<T: serde::de::DeserializeOwned>(segment: &str) -> Result<T, SessionError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| invalid(format!("segment encoding: {e}")))?;
    serde_json::from_slice(&bytes).map_err(|e| invalid(format!("segment json: {e}")))
}

fn invalid(reason: impl Into<String>) -> SessionError {
    SessionError::InvalidCredential(reason.into())
}
