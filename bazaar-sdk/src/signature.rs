//! Signing schemes used by the broadcast service.
//!
//! All signatures are HMAC-SHA256.
//!
//! * **Body signing** (Service API, used by backends to publish events):
//!
//!   ```text
//!   Bazaar-Signature: {unix_timestamp}.{base64_signature}
//!   ```
//!
//!   computed as `HMAC-SHA256("{timestamp}.{json_body}", service_secret)`.
//!
//! * **Channel grants** (returned by `POST /broadcasting/auth`, checked when
//!   the WebSocket client subscribes):
//!
//!   ```text
//!   {app_key}:{hex(HMAC-SHA256("{socket_id}:{channel_name}[:{channel_data}]", app_secret))}
//!   ```
//!
//!   A grant is bound to one `socket_id`, so it cannot be replayed on another
//!   connection.

/// Header name for the body signature.
pub const SIGNATURE_HEADER: &str = "Bazaar-Signature";

/// Maximum allowed age of a body signature (in seconds).
pub const MAX_SIGNATURE_AGE: i64 = 5 * 60;

/// Marker trait for types that can participate in body signing via
/// [`SignedObject`].
pub trait Signature: for<'de> serde::Deserialize<'de> + serde::Serialize {}

/// Errors produced by signature operations.
#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("invalid signature format")]
    InvalidFormat,
    #[error("invalid signature encoding")]
    InvalidEncoding,
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid signature")]
    SignatureMismatch,
    #[error("signature expired")]
    Expired,
}

impl From<ring::error::Unspecified> for SignatureError {
    fn from(_: ring::error::Unspecified) -> Self {
        Self::SignatureMismatch
    }
}

fn hmac_key(secret: &[u8]) -> ring::hmac::Key {
    ring::hmac::Key::new(ring::hmac::HMAC_SHA256, secret)
}

// ---------------------------------------------------------------------------
// SignedObject: body signing
// ---------------------------------------------------------------------------

/// A signed API body carrying its typed payload, timestamp, raw JSON, and
/// HMAC-SHA256 signature.
#[derive(Debug, Clone, PartialEq)]
pub struct SignedObject<T: Signature> {
    pub body: T,
    pub timestamp: i64,
    pub json: String,
    pub signature: Box<[u8]>,
}

impl<T: Signature> SignedObject<T> {
    /// Serialize `body` to JSON and sign `"{timestamp}.{json}"` with `key`.
    pub fn new(body: T, key: &[u8]) -> Result<Self, serde_json::Error> {
        let now = time::OffsetDateTime::now_utc().unix_timestamp();
        let json = serde_json::to_string(&body)?;
        let data = format!("{now}.{json}");
        let signature = ring::hmac::sign(&hmac_key(key), data.as_bytes());
        let signature = signature.as_ref().to_owned().into_boxed_slice();
        Ok(Self {
            body,
            timestamp: now,
            json,
            signature,
        })
    }

    /// Reconstruct a [`SignedObject`] from a raw `Bazaar-Signature` header
    /// value and the JSON request body string.
    ///
    /// This parses the header and deserializes the body but does **not**
    /// verify the HMAC; call [`verify`](Self::verify) for that.
    pub fn from_header_and_body(
        header_value: &str,
        body_json: String,
    ) -> Result<Self, SignatureError> {
        let (timestamp, signature) = parse_signature_header(header_value)?;
        let body: T = serde_json::from_str(&body_json)?;
        Ok(Self {
            body,
            timestamp,
            json: body_json,
            signature,
        })
    }

    /// Verify the HMAC signature and timestamp freshness, consuming `self`
    /// and returning the authenticated payload.
    pub fn verify(self, key: &[u8]) -> Result<T, SignatureError> {
        let data = format!("{}.{}", self.timestamp, self.json);
        ring::hmac::verify(&hmac_key(key), data.as_bytes(), self.signature.as_ref())?;
        check_timestamp(self.timestamp)?;
        Ok(self.body)
    }

    /// Format the full `Bazaar-Signature` header value (`{timestamp}.{b64}`).
    pub fn to_header(&self) -> String {
        format_signature_header(self.timestamp, &self.signature)
    }
}

/// Parse a `Bazaar-Signature` header value (`{timestamp}.{base64}`) into
/// `(timestamp, raw_signature_bytes)`.
pub fn parse_signature_header(value: &str) -> Result<(i64, Box<[u8]>), SignatureError> {
    let (timestamp, encoded) = value.split_once('.').ok_or(SignatureError::InvalidFormat)?;
    let timestamp: i64 = timestamp
        .parse()
        .map_err(|_| SignatureError::InvalidFormat)?;
    let signature_bytes = fast32::base64::RFC4648_NOPAD
        .decode_str(encoded)
        .map_err(|_| SignatureError::InvalidEncoding)?
        .into_boxed_slice();
    Ok((timestamp, signature_bytes))
}

/// Format a `{timestamp}.{base64}` header value from its parts.
pub fn format_signature_header(timestamp: i64, signature: &[u8]) -> String {
    format!(
        "{}.{}",
        timestamp,
        fast32::base64::RFC4648_NOPAD.encode(signature)
    )
}

/// Check that a signature timestamp is within [`MAX_SIGNATURE_AGE`].
pub fn check_timestamp(timestamp: i64) -> Result<(), SignatureError> {
    let now = time::OffsetDateTime::now_utc().unix_timestamp();
    if now - timestamp > MAX_SIGNATURE_AGE {
        return Err(SignatureError::Expired);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Channel grants
// ---------------------------------------------------------------------------

fn grant_message(socket_id: &str, channel_name: &str, channel_data: Option<&str>) -> String {
    match channel_data {
        Some(data) => format!("{socket_id}:{channel_name}:{data}"),
        None => format!("{socket_id}:{channel_name}"),
    }
}

/// Produce the `auth` string granting `socket_id` access to `channel_name`.
pub fn sign_channel_grant(
    app_key: &str,
    app_secret: &[u8],
    socket_id: &str,
    channel_name: &str,
    channel_data: Option<&str>,
) -> String {
    let message = grant_message(socket_id, channel_name, channel_data);
    let tag = ring::hmac::sign(&hmac_key(app_secret), message.as_bytes());
    format!("{app_key}:{}", encode_hex(tag.as_ref()))
}

/// Verify an `auth` string produced by [`sign_channel_grant`].
pub fn verify_channel_grant(
    auth: &str,
    app_key: &str,
    app_secret: &[u8],
    socket_id: &str,
    channel_name: &str,
    channel_data: Option<&str>,
) -> Result<(), SignatureError> {
    let (key, hex) = auth.split_once(':').ok_or(SignatureError::InvalidFormat)?;
    if key != app_key {
        return Err(SignatureError::SignatureMismatch);
    }
    let tag = decode_hex(hex).ok_or(SignatureError::InvalidEncoding)?;
    let message = grant_message(socket_id, channel_name, channel_data);
    ring::hmac::verify(&hmac_key(app_secret), message.as_bytes(), &tag)?;
    Ok(())
}

fn encode_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}

fn decode_hex(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| hex.get(i..i + 2).and_then(|pair| u8::from_str_radix(pair, 16).ok()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::events::{DomainEvent, RecommendationGenerated};

    const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";

    #[test]
    fn test_signed_body_round_trip() {
        let event = DomainEvent::RecommendationGenerated(RecommendationGenerated {
            user_id: 5,
            recommendations: vec![],
            algorithm: "collaborative".to_owned(),
            processing_time_seconds: 0.1,
        });
        let signed = SignedObject::new(event.clone(), SECRET).unwrap();
        let header = signed.to_header();

        let parsed = SignedObject::<DomainEvent>::from_header_and_body(&header, signed.json).unwrap();
        assert_eq!(parsed.verify(SECRET).unwrap(), event);
    }

    #[test]
    fn test_signed_body_rejects_wrong_key() {
        let event = DomainEvent::RecommendationGenerated(RecommendationGenerated {
            user_id: 5,
            recommendations: vec![],
            algorithm: "collaborative".to_owned(),
            processing_time_seconds: 0.1,
        });
        let signed = SignedObject::new(event, SECRET).unwrap();
        assert!(matches!(
            signed.verify(b"another-secret-another-secret"),
            Err(SignatureError::SignatureMismatch)
        ));
    }

    #[test]
    fn test_expired_timestamp() {
        let old = time::OffsetDateTime::now_utc().unix_timestamp() - MAX_SIGNATURE_AGE - 1;
        assert!(matches!(check_timestamp(old), Err(SignatureError::Expired)));
    }

    #[test]
    fn test_malformed_header() {
        assert!(matches!(
            parse_signature_header("no-dot"),
            Err(SignatureError::InvalidFormat)
        ));
        assert!(matches!(
            parse_signature_header("123.!!!"),
            Err(SignatureError::InvalidEncoding)
        ));
    }

    #[test]
    fn test_channel_grant_is_bound_to_socket() {
        let auth = sign_channel_grant("app", SECRET, "1234.5678", "private-ai.user.42", None);
        assert!(auth.starts_with("app:"));
        assert_eq!(auth.len(), "app:".len() + 64);

        assert!(
            verify_channel_grant(&auth, "app", SECRET, "1234.5678", "private-ai.user.42", None)
                .is_ok()
        );
        assert!(
            verify_channel_grant(&auth, "app", SECRET, "9999.0000", "private-ai.user.42", None)
                .is_err()
        );
        assert!(
            verify_channel_grant(&auth, "app", SECRET, "1234.5678", "private-ai.user.43", None)
                .is_err()
        );
        assert!(
            verify_channel_grant(&auth, "other", SECRET, "1234.5678", "private-ai.user.42", None)
                .is_err()
        );
    }

    #[test]
    fn test_presence_grant_covers_channel_data() {
        let data = r#"{"user_id":42}"#;
        let auth = sign_channel_grant("app", SECRET, "1.2", "presence-ai.chat.c1", Some(data));
        assert!(
            verify_channel_grant(&auth, "app", SECRET, "1.2", "presence-ai.chat.c1", Some(data))
                .is_ok()
        );
        assert!(
            verify_channel_grant(
                &auth,
                "app",
                SECRET,
                "1.2",
                "presence-ai.chat.c1",
                Some(r#"{"user_id":1}"#)
            )
            .is_err()
        );
    }

    #[test]
    fn test_hex_helpers() {
        assert_eq!(encode_hex(&[0x00, 0xab, 0xff]), "00abff");
        assert_eq!(decode_hex("00abff"), Some(vec![0x00, 0xab, 0xff]));
        assert_eq!(decode_hex("abc"), None);
        assert_eq!(decode_hex("zz"), None);
    }
}
