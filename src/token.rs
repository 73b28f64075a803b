use base64::Engine;
use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use serde_json::Value as JsonValue;

use crate::error::Error;

/// Refresh begins this long before the access token actually expires.
pub const SAFETY_BUFFER_MS: i64 = 60_000;

/// Claims read from an access token payload.
///
/// Not verified: the signature is the issuing server's business, and the
/// token only ever travels between that server and us over TLS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessClaims {
    /// `sub`, falling back to the wine API's numeric `id` claim.
    pub subject: Option<String>,
    /// `exp` in Unix seconds.
    pub expires_at: i64,
}

impl AccessClaims {
    #[must_use]
    pub fn expires_at_ms(&self) -> i64 {
        self.expires_at.saturating_mul(1000)
    }
}

/// Decodes the access token's expiry in Unix milliseconds.
///
/// Empty or malformed tokens, and tokens without a usable `exp`, decode to
/// `now_ms - 1` so that every expiry check on them reports expired.
#[must_use]
pub fn decode_expiry(token: &str, now_ms: i64) -> i64 {
    match decode_claims(token) {
        Ok(claims) => claims.expires_at_ms(),
        Err(e) => {
            tracing::debug!(error = %e, "Undecodable access token treated as expired");
            now_ms - 1
        }
    }
}

/// `true` once `now_ms` is inside the safety buffer before `expiry_ms`.
#[must_use]
pub fn is_expired(expiry_ms: i64, now_ms: i64) -> bool {
    now_ms >= expiry_ms.saturating_sub(SAFETY_BUFFER_MS)
}

/// Decodes the payload segment of a JWT without verifying it.
///
/// # Errors
///
/// Returns `Error::Token` if the token is not three dot-separated segments,
/// the payload is not base64 JSON, or `exp` is missing or not a number.
pub fn decode_claims(token: &str) -> Result<AccessClaims, Error> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 || parts[1].is_empty() {
        return Err(Error::Token("invalid token format".into()));
    }

    let payload = decode_segment(parts[1])?;
    let json: JsonValue = serde_json::from_slice(&payload)
        .map_err(|e| Error::Token(format!("invalid payload: {e}")))?;

    let expires_at = match json.get("exp") {
        Some(JsonValue::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f as i64)),
        _ => None,
    }
    .ok_or_else(|| Error::Token("missing claim: exp".into()))?;

    let subject = json
        .get("sub")
        .or_else(|| json.get("id"))
        .and_then(|v| match v {
            JsonValue::String(s) => Some(s.clone()),
            JsonValue::Number(n) => Some(n.to_string()),
            _ => None,
        });

    Ok(AccessClaims {
        subject,
        expires_at,
    })
}

// Issuers disagree on padding and alphabet; accept both.
fn decode_segment(segment: &str) -> Result<Vec<u8>, Error> {
    let trimmed = segment.trim_end_matches('=');
    URL_SAFE_NO_PAD
        .decode(trimmed)
        .or_else(|_| STANDARD_NO_PAD.decode(trimmed))
        .map_err(|_| Error::Token("invalid payload encoding".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW_MS: i64 = 1_750_000_000_000;

    fn jwt(payload: &str) -> String {
        let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(payload);
        let signature = URL_SAFE_NO_PAD.encode("fake_sig");
        format!("{header}.{payload}.{signature}")
    }

    #[test]
    fn decodes_exp_in_millis() {
        let token = jwt(r#"{"id":1379,"teamId":"3-1","exp":1750001800}"#);
        assert_eq!(decode_expiry(&token, NOW_MS), 1_750_001_800_000);
    }

    #[test]
    fn decodes_subject_from_id_or_sub() {
        let claims = decode_claims(&jwt(r#"{"id":1379,"exp":1}"#)).unwrap();
        assert_eq!(claims.subject.as_deref(), Some("1379"));
        let claims = decode_claims(&jwt(r#"{"sub":"user_1","id":2,"exp":1}"#)).unwrap();
        assert_eq!(claims.subject.as_deref(), Some("user_1"));
    }

    #[test]
    fn accepts_fractional_exp() {
        let token = jwt(r#"{"exp":1750001800.75}"#);
        assert_eq!(decode_expiry(&token, NOW_MS), 1_750_001_800_000);
    }

    #[test]
    fn accepts_padded_payload() {
        let payload = base64::engine::general_purpose::URL_SAFE.encode(r#"{"exp":17}"#);
        let token = format!("h.{payload}.s");
        assert_eq!(decode_claims(&token).unwrap().expires_at, 17);
    }

    #[test]
    fn malformed_tokens_decode_to_elapsed_instant() {
        let cases = [
            String::new(),
            "not-a-jwt".to_string(),
            "a.b".to_string(),
            "a..c".to_string(),
            "header.!!!invalid!!!.signature".to_string(),
            jwt("not json"),
            jwt(r#"{"sub":"user_1"}"#),
            jwt(r#"{"exp":"1750001800"}"#),
            jwt(r#"{"exp":null}"#),
            jwt("[1,2,3]"),
        ];
        for token in &cases {
            let expiry = decode_expiry(token, NOW_MS);
            assert!(expiry < NOW_MS, "{token:?} decoded to {expiry}");
            assert!(is_expired(expiry, NOW_MS), "{token:?} not expired");
        }
    }

    #[test]
    fn buffer_boundary() {
        let expiry = NOW_MS + 1_800_000;
        assert!(!is_expired(expiry, expiry - SAFETY_BUFFER_MS - 1));
        assert!(is_expired(expiry, expiry - SAFETY_BUFFER_MS));
        assert!(is_expired(expiry, expiry));
        assert!(!is_expired(expiry, NOW_MS));
    }

    #[test]
    fn thirty_seconds_left_is_expired() {
        assert!(is_expired(NOW_MS + 30_000, NOW_MS));
    }

    #[test]
    fn missing_exp_is_reported_by_strict_decoder() {
        let err = decode_claims(&jwt(r#"{"sub":"user_1"}"#)).unwrap_err();
        assert!(err.to_string().contains("missing claim: exp"));
    }
}
