//! Web-session pairing.
//!
//! Takes the opaque string produced by the QR scanner, recovers the web
//! session identifier from it and asks the backend to bind that session to
//! this authenticated device. Scanning mechanics live upstream; this module
//! only ever sees the scanned text.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;

use crate::api::Envelope;
use crate::error::AuthKitError;
use crate::identity::DeviceIdentityManager;
use crate::request::AuthHttp;

/// Decoded pairing payload carried by the scanned code.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PairingPayload {
    /// Web session identifier to bind.
    pub sid: String,
}

/// Decodes a scanned pairing string.
///
/// The payload arrives as URL-safe base64, possibly unpadded; it is
/// normalized to standard base64 before decoding, then parsed as JSON.
///
/// # Errors
///
/// Returns [`AuthKitError::MalformedPayload`] on any decode or parse
/// failure — the caller should offer a re-scan.
pub fn decode_payload(raw: &str) -> Result<PairingPayload, AuthKitError> {
    let normalized = normalize_base64(raw);
    let bytes = STANDARD
        .decode(normalized)
        .map_err(|err| AuthKitError::MalformedPayload {
            reason: format!("base64 decode failed: {err}"),
        })?;
    let text = String::from_utf8(bytes).map_err(|err| AuthKitError::MalformedPayload {
        reason: format!("payload is not UTF-8: {err}"),
    })?;
    serde_json::from_str(&text).map_err(|err| AuthKitError::MalformedPayload {
        reason: format!("payload parse failed: {err}"),
    })
}

/// Translates URL-safe base64 to the standard alphabet and restores padding
/// to a multiple of four.
fn normalize_base64(raw: &str) -> String {
    let mut normalized: String = raw
        .chars()
        .map(|character| match character {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();
    while normalized.len() % 4 != 0 {
        normalized.push('=');
    }
    normalized
}

/// Binds scanned web sessions to the authenticated mobile identity.
pub struct PairingHandler {
    http: Arc<AuthHttp>,
    identity: Arc<DeviceIdentityManager>,
}

impl PairingHandler {
    /// Creates a handler over the shared transport and identity.
    #[must_use]
    pub fn new(http: Arc<AuthHttp>, identity: Arc<DeviceIdentityManager>) -> Self {
        Self { http, identity }
    }

    /// Decodes `raw` and asks the backend to pair the web session it names.
    ///
    /// # Errors
    ///
    /// [`AuthKitError::MalformedPayload`] when the scan cannot be decoded;
    /// [`AuthKitError::PairingRejected`] when the backend declines (expired
    /// or unknown session) — the caller decides between retry and cancel,
    /// never this layer.
    pub async fn pair(&self, raw: &str) -> Result<(), AuthKitError> {
        let payload = decode_payload(raw)?;
        let identity = self.identity.cached_identity()?;

        let result: Result<Envelope<serde_json::Value>, AuthKitError> = self
            .http
            .post_json(
                "/web/login/pair",
                json!({
                    "session_id": payload.sid,
                    "signature": raw,
                    "device_fingerprint": identity.fingerprint,
                    "user_agent": identity.user_agent,
                }),
            )
            .await;

        match result {
            Ok(envelope) => envelope
                .into_success()
                .map_err(|err| AuthKitError::PairingRejected {
                    message: err.to_string(),
                }),
            Err(AuthKitError::Api { message }) => {
                Err(AuthKitError::PairingRejected { message })
            }
            Err(AuthKitError::NetworkError {
                status: Some(status),
                error,
                ..
            }) if (400..500).contains(&status) => {
                Err(AuthKitError::PairingRejected { message: error })
            }
            Err(other) => Err(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    use super::*;

    #[test]
    fn test_decode_url_safe_unpadded_payload() {
        let raw = URL_SAFE_NO_PAD.encode(r#"{"sid":"web-session-42","v":1}"#);
        assert!(raw.len() % 4 != 0, "fixture should exercise padding");
        let payload = decode_payload(&raw).expect("decode");
        assert_eq!(payload.sid, "web-session-42");
    }

    #[test]
    fn test_decode_standard_base64_payload() {
        let raw = STANDARD.encode(r#"{"sid":"abc"}"#);
        let payload = decode_payload(&raw).expect("decode");
        assert_eq!(payload.sid, "abc");
    }

    #[test]
    fn test_garbage_is_malformed() {
        match decode_payload("!!!not base64!!!") {
            Err(AuthKitError::MalformedPayload { .. }) => {}
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_json_without_sid_is_malformed() {
        let raw = STANDARD.encode(r#"{"session":"abc"}"#);
        match decode_payload(&raw) {
            Err(AuthKitError::MalformedPayload { .. }) => {}
            other => panic!("unexpected: {other:?}"),
        }
    }
}
