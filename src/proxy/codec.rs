//! URL codec (C1): encode absolute URLs into URL-safe tokens and back.
//!
//! Tokens are opaque to every other component — callers never need to
//! know the encoding to carry one through a query string.

use std::collections::HashMap;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

/// Encode an absolute URL as a base64url (no padding) token.
pub fn encode(absolute_url: &str) -> String {
    URL_SAFE_NO_PAD.encode(absolute_url.as_bytes())
}

/// Decode a base64url token back into the absolute URL it carries.
/// Returns `None` on any decoding error, including invalid UTF-8.
pub fn decode(token: &str) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(token).ok()?;
    String::from_utf8(bytes).ok()
}

/// Encode a custom-header map as a percent-encoded JSON token.
pub fn encode_headers(headers: &HashMap<String, String>) -> String {
    let json = serde_json::to_string(headers).unwrap_or_else(|_| "{}".to_string());
    urlencoding::encode(&json).into_owned()
}

/// Decode a percent-encoded JSON header-map token. Any failure — percent
/// decoding, UTF-8, or JSON shape — degrades to "no custom headers"
/// rather than failing the request.
pub fn decode_headers(token: &str) -> Option<HashMap<String, String>> {
    let decoded = urlencoding::decode(token).ok()?;
    serde_json::from_str(&decoded).ok()
}
