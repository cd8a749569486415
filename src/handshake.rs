//! RFC 6455 opening handshake: request construction, incremental parsing of
//! the peer's HTTP message head, and acceptance validation.
//!
//! Everything here is a pure transformation over byte buffers. "Not enough
//! bytes yet" is a normal outcome (`None` from [`parse_head`]), not an error;
//! the caller keeps accumulating and retries.

use std::collections::HashMap;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use rand::RngCore;
use sha1::{Digest, Sha1};

use crate::errors::ConnectionError;

/// Fixed GUID appended to the handshake key before hashing, per RFC 6455 §1.3.
const WEBSOCKET_GUID: &[u8] = b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

/// A client opening-handshake request for a single connection attempt.
///
/// Carries a fresh 16-byte random nonce, base64-encoded as the
/// `Sec-WebSocket-Key`. A request value is created per connection attempt and
/// discarded once the response has been validated; keys are never reused.
#[derive(Debug, Clone)]
pub struct HandshakeRequest {
    host: String,
    port: u16,
    key: String,
}

impl HandshakeRequest {
    /// Create a request for `host:port` with a freshly generated key.
    #[must_use]
    pub fn new<S: Into<String>>(host: S, port: u16) -> Self {
        let mut key_bytes = [0u8; 16];
        rand::rng().fill_bytes(&mut key_bytes);
        let key = BASE64.encode(key_bytes);
        Self {
            host: host.into(),
            port,
            key,
        }
    }

    /// The base64-encoded nonce sent as `Sec-WebSocket-Key`.
    ///
    /// Keep it around until the response arrives; validation needs it.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Render the request as HTTP/1.1 bytes, ready to write to the stream.
    #[must_use]
    pub fn render(&self) -> Vec<u8> {
        format!(
            "GET / HTTP/1.1\r\n\
             Host: {}:{}\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Key: {}\r\n\
             Sec-WebSocket-Version: 13\r\n\r\n",
            self.host, self.port, self.key
        )
        .into_bytes()
    }
}

/// A parsed HTTP message head: the start line plus a header map.
///
/// Responses (client path) and upgrade requests (server path) share the same
/// head syntax, so both sides of the handshake parse into this type.
#[derive(Debug, Clone)]
pub struct HttpHead {
    start_line: String,
    headers: HashMap<String, String>,
}

impl HttpHead {
    /// The status line of a response, or the request line of a request.
    #[must_use]
    pub fn start_line(&self) -> &str {
        &self.start_line
    }

    /// Look up a header value case-insensitively. Values are trimmed; when a
    /// header was sent more than once, the last occurrence wins.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// Parse an HTTP message head out of accumulated bytes.
///
/// Returns `None` until the `\r\n\r\n` terminator has arrived; the caller
/// must keep buffering and retry. Header lines without a `:` are ignored,
/// not fatal.
#[must_use]
pub fn parse_head(buffer: &[u8]) -> Option<HttpHead> {
    let end = buffer.windows(4).position(|w| w == HEAD_TERMINATOR)?;
    let head = String::from_utf8_lossy(&buffer[..end]);
    let mut lines = head.split("\r\n");
    let start_line = lines.next().unwrap_or_default().to_owned();
    let mut headers = HashMap::new();
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_owned());
        }
    }
    Some(HttpHead {
        start_line,
        headers,
    })
}

/// Compute the `Sec-WebSocket-Accept` value for a handshake key:
/// `base64(SHA-1(key ++ GUID))`.
#[must_use]
pub fn compute_accept(key: &str) -> String {
    let mut sha1 = Sha1::new();
    sha1.update(key.as_bytes());
    sha1.update(WEBSOCKET_GUID);
    BASE64.encode(sha1.finalize())
}

/// Validate a parsed server response against the key sent in the request.
///
/// # Errors
/// Returns the specific rejection when the status line is not `HTTP/1.1 101`,
/// the `Upgrade`/`Connection` headers do not announce the protocol switch, or
/// the `Sec-WebSocket-Accept` value does not match [`compute_accept`]. A
/// rejected handshake must close the connection, never retry the same key.
pub fn validate_response(response: &HttpHead, key: &str) -> Result<(), ConnectionError> {
    let switching = response
        .start_line()
        .strip_prefix("HTTP/1.1 101")
        .is_some_and(|rest| rest.is_empty() || rest.starts_with(' '));
    if !switching {
        return Err(ConnectionError::HandshakeBadStatus);
    }
    let upgrade = response.header("upgrade").map(str::to_ascii_lowercase);
    if upgrade.as_deref() != Some("websocket") {
        return Err(ConnectionError::HandshakeMissingHeader("Upgrade"));
    }
    let connection = response.header("connection").map(str::to_ascii_lowercase);
    if connection.as_deref() != Some("upgrade") {
        return Err(ConnectionError::HandshakeMissingHeader("Connection"));
    }
    if response.header("sec-websocket-accept") != Some(compute_accept(key).as_str()) {
        return Err(ConnectionError::HandshakeInvalidAccept);
    }
    Ok(())
}

/// Build the `101 Switching Protocols` response for a parsed upgrade request.
///
/// Returns `None` when the request is not a well-formed WebSocket upgrade
/// (wrong `Upgrade`/`Connection` headers, missing key, or a version other
/// than 13); the caller decides how to signal an HTTP error. This is the
/// symmetric counterpart of [`validate_response`], used by the server half.
#[must_use]
pub fn build_server_response(request: &HttpHead) -> Option<Vec<u8>> {
    if !request
        .header("upgrade")?
        .eq_ignore_ascii_case("websocket")
    {
        return None;
    }
    if !request
        .header("connection")?
        .eq_ignore_ascii_case("upgrade")
    {
        return None;
    }
    if request.header("sec-websocket-version")? != "13" {
        return None;
    }
    let accept = compute_accept(request.header("sec-websocket-key")?);
    Some(
        format!(
            "HTTP/1.1 101 Switching Protocols\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Accept: {accept}\r\n\r\n"
        )
        .into_bytes(),
    )
}
