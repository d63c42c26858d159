//! WebSocket upgrade preconditions (RFC 6455 §4.2.1).

use std::sync::LazyLock;

use http::header::{SEC_WEBSOCKET_KEY, SEC_WEBSOCKET_VERSION, UPGRADE};
use http::{HeaderMap, Method, StatusCode};
use regex::Regex;

use crate::error::ProtocolError;

use super::Request;

/// 16 random bytes, base64 encoded.
static WEBSOCKET_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[+/0-9A-Za-z]{22}==$").expect("websocket key pattern is valid")
});

/// Check that `request` may be upgraded to a WebSocket.
///
/// Checks run in order and stop at the first failure: method (405),
/// `Upgrade` header (426), key format (400), version (400).
pub fn validate(request: &Request) -> Result<(), ProtocolError> {
    if request.method() != Method::GET {
        return Err(ProtocolError::Handshake {
            status: StatusCode::METHOD_NOT_ALLOWED,
            reason: "Method Not Allowed",
        });
    }

    if header(request.headers(), &UPGRADE) != Some("websocket") {
        return Err(ProtocolError::Handshake {
            status: StatusCode::UPGRADE_REQUIRED,
            reason: "Upgrade Required",
        });
    }

    let key = header(request.headers(), &SEC_WEBSOCKET_KEY).unwrap_or_default();
    if !WEBSOCKET_KEY.is_match(key.trim()) {
        return Err(ProtocolError::Handshake {
            status: StatusCode::BAD_REQUEST,
            reason: "Bad Request",
        });
    }

    if header(request.headers(), &SEC_WEBSOCKET_VERSION) != Some("13") {
        return Err(ProtocolError::Handshake {
            status: StatusCode::BAD_REQUEST,
            reason: "Bad Request",
        });
    }

    Ok(())
}

fn header<'a>(map: &'a HeaderMap, name: &http::header::HeaderName) -> Option<&'a str> {
    map.get(name).and_then(|value| value.to_str().ok())
}
