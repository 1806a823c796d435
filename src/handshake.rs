//! Client-side opening handshake: building the HTTP Upgrade request and
//! recognizing a successful switching-protocols response.
//!
//! The server's `Sec-WebSocket-Accept` value is *not* cryptographically
//! verified here — acceptance is decided purely by the presence of the
//! `HTTP/1.1 101` status line, matching the behavior of the client this
//! crate is modeled on. See the design notes for why this is a deliberate,
//! documented simplification rather than an oversight.

use base64::prelude::*;
use rand::random;

const SWITCHING_PROTOCOLS: &str = "HTTP/1.1 101";

/// A fresh, random `Sec-WebSocket-Key`: 16 random bytes, base64-encoded.
pub fn generate_sec_websocket_key() -> String {
    let random_bytes: [u8; 16] = random();
    BASE64_STANDARD.encode(random_bytes)
}

/// Builds the literal bytes of the opening handshake request.
pub fn build_websocket_handshake_request(
    host: &str,
    path: &str,
    key: &str,
    extra_headers: &str,
) -> String {
    let mut request = String::new();
    request.push_str(&format!("GET {} HTTP/1.1\r\n", path));
    request.push_str(&format!("Host: {}\r\n", host));
    request.push_str("Upgrade: websocket\r\n");
    request.push_str("Connection: Upgrade\r\n");
    request.push_str(&format!("Sec-WebSocket-Key: {}\r\n", key));
    request.push_str("Sec-WebSocket-Version: 13\r\n");
    if !extra_headers.is_empty() {
        request.push_str(extra_headers);
        if !extra_headers.ends_with("\r\n") {
            request.push_str("\r\n");
        }
    }
    request.push_str("\r\n");
    request
}

/// Whether a (possibly partial) HTTP response buffer already contains the
/// switching-protocols status line.
pub fn response_accepts_upgrade(response: &[u8]) -> bool {
    let text = String::from_utf8_lossy(response);
    text.contains(SWITCHING_PROTOCOLS)
}
