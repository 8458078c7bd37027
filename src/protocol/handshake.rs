//! Client side of the opening handshake (RFC 6455 Section 4.1).
//!
//! [`build_request`] turns a `ws://` / `wss://` URL into the HTTP/1.1 upgrade
//! request plus a [`HandshakeContext`] remembering what the server must echo.
//! [`validate_response`] checks the server's reply against that context.

use std::collections::HashMap;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use sha1::{Digest, Sha1};
use url::Url;

use crate::config::Config;
use crate::error::{Error, Result};

/// The WebSocket GUID used in the Sec-WebSocket-Accept calculation (RFC 6455).
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Response headers that must appear at most once.
const UNIQUE_RESPONSE_HEADERS: [&str; 4] = [
    "upgrade",
    "connection",
    "sec-websocket-accept",
    "sec-websocket-protocol",
];

/// Parse HTTP header lines into a map keyed by lowercase name.
///
/// Stops at the first empty line. Names listed in `unique` may not repeat.
///
/// # Errors
/// Returns `Error::InvalidHandshake` for a line without a colon or a
/// repeated unique header.
fn parse_headers<'a, I>(lines: I, unique: &[&str]) -> Result<HashMap<String, String>>
where
    I: Iterator<Item = &'a str>,
{
    let mut headers: HashMap<String, String> = HashMap::new();

    for line in lines {
        if line.is_empty() {
            break;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| Error::InvalidHandshake(format!("Malformed header line: {line}")))?;
        let name_lower = name.trim().to_ascii_lowercase();

        if unique.contains(&name_lower.as_str()) && headers.contains_key(&name_lower) {
            return Err(Error::InvalidHandshake(format!(
                "Duplicate header: {}",
                name.trim()
            )));
        }
        headers.insert(name_lower, value.trim().to_string());
    }

    Ok(headers)
}

/// Reject header names and values that would break the request framing.
///
/// # Errors
/// Returns `Error::InvalidHeaderValue` on CR, LF, or a colon in the name.
fn validate_header(name: &str, value: &str) -> Result<()> {
    if name.is_empty() || name.contains([':', '\r', '\n', ' ']) {
        return Err(Error::InvalidHeaderValue {
            header: name.to_string(),
            reason: "invalid header name".to_string(),
        });
    }
    if value.contains(['\r', '\n']) {
        return Err(Error::InvalidHeaderValue {
            header: name.to_string(),
            reason: "contains CR or LF characters".to_string(),
        });
    }
    Ok(())
}

/// Computes the Sec-WebSocket-Accept value from the client's Sec-WebSocket-Key.
///
/// The accept key is calculated as: Base64(SHA-1(key + GUID))
///
/// # Example
///
/// ```
/// use ws13::protocol::handshake::compute_accept_key;
///
/// let key = "dGhlIHNhbXBsZSBub25jZQ==";
/// let accept = compute_accept_key(key);
/// assert_eq!(accept, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
/// ```
#[must_use]
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Generate a fresh Sec-WebSocket-Key: 16 random bytes, base64 encoded.
///
/// # Errors
/// Returns `Error::Io` if the OS random source is unavailable.
pub fn generate_key() -> Result<String> {
    let mut nonce = [0u8; 16];
    getrandom::getrandom(&mut nonce)
        .map_err(|e| Error::Io(format!("random source unavailable: {e}")))?;
    Ok(BASE64.encode(nonce))
}

/// Offset just past the `\r\n\r\n` that ends an HTTP header block.
#[must_use]
pub fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4)
        .position(|window| window == b"\r\n\r\n")
        .map(|pos| pos + 4)
}

/// State of one connection attempt, kept until the response is validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeContext {
    /// Sec-WebSocket-Key sent in the request.
    pub key: String,
    /// Sec-WebSocket-Accept value the server must return.
    pub expected_accept: String,
    /// Target host, bracketed for IPv6 literals.
    pub host: String,
    /// Target port, defaulted from the scheme.
    pub port: u16,
    /// Request target: path plus query.
    pub path: String,
    /// Whether the URL used `wss`.
    pub secure: bool,
    /// Subprotocol offered in the request.
    pub subprotocol: Option<String>,
}

impl HandshakeContext {
    /// Parse `url` and draw a random key.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidUrl` if the URL does not parse, uses a scheme other
    ///   than `ws`/`wss`, or has no host
    /// - `Error::Io` if no key could be generated
    pub fn from_url(url: &str, subprotocol: Option<String>) -> Result<Self> {
        let parsed = Url::parse(url)?;
        let secure = match parsed.scheme() {
            "ws" => false,
            "wss" => true,
            other => {
                return Err(Error::InvalidUrl(format!(
                    "unsupported scheme {other:?}, expected ws or wss"
                )));
            }
        };
        let host = parsed
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| Error::InvalidUrl(format!("missing host in {url}")))?
            .to_string();
        let port = parsed
            .port_or_known_default()
            .unwrap_or(if secure { 443 } else { 80 });

        let mut path = parsed.path().to_string();
        if path.is_empty() {
            path.push('/');
        }
        if let Some(query) = parsed.query() {
            path.push('?');
            path.push_str(query);
        }

        Ok(Self::with_key(generate_key()?, host, port, path, secure, subprotocol))
    }

    /// Build a context around a known key.
    #[must_use]
    pub fn with_key(
        key: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        path: impl Into<String>,
        secure: bool,
        subprotocol: Option<String>,
    ) -> Self {
        let key = key.into();
        Self {
            expected_accept: compute_accept_key(&key),
            key,
            host: host.into(),
            port,
            path: path.into(),
            secure,
            subprotocol,
        }
    }

    /// Serialize the upgrade request, appending `headers` after the
    /// mandatory ones.
    ///
    /// # Errors
    /// Returns `Error::InvalidHeaderValue` if a header or the subprotocol
    /// would inject CR/LF.
    pub fn request(&self, headers: &[(String, String)]) -> Result<Vec<u8>> {
        let mut request = format!(
            "GET {} HTTP/1.1\r\n\
             Host: {}:{}\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Key: {}\r\n\
             Sec-WebSocket-Version: 13\r\n",
            self.path, self.host, self.port, self.key
        );

        if let Some(ref protocol) = self.subprotocol {
            validate_header("Sec-WebSocket-Protocol", protocol)?;
            request.push_str(&format!("Sec-WebSocket-Protocol: {protocol}\r\n"));
        }
        for (name, value) in headers {
            validate_header(name, value)?;
            request.push_str(&format!("{name}: {value}\r\n"));
        }
        request.push_str("\r\n");

        Ok(request.into_bytes())
    }
}

/// What the server agreed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeResponse {
    /// Status line reason phrase, e.g. `Switching Protocols`.
    pub reason: String,
    /// Subprotocol selected by the server.
    pub protocol: Option<String>,
}

/// Parse `url` and serialize the upgrade request for it.
///
/// # Errors
/// See [`HandshakeContext::from_url`] and [`HandshakeContext::request`].
pub fn build_request(url: &str, config: &Config) -> Result<(HandshakeContext, Vec<u8>)> {
    let context = HandshakeContext::from_url(url, config.subprotocol.clone())?;
    let request = context.request(&config.headers)?;
    Ok((context, request))
}

/// Validate the server's response header block.
///
/// `raw` is the response up to and including the blank line.
///
/// # Errors
///
/// - `Error::InvalidHandshake` for a status other than `HTTP/1.x 101`,
///   a missing or wrong `Upgrade`/`Connection` header, a missing accept
///   header, or a subprotocol that was not offered
/// - `Error::AcceptMismatch` if the accept digest is not the expected one
pub fn validate_response(raw: &[u8], context: &HandshakeContext) -> Result<HandshakeResponse> {
    let text = std::str::from_utf8(raw)
        .map_err(|_| Error::InvalidHandshake("Response is not valid UTF-8".into()))?;
    let mut lines = text.split("\r\n");

    let status_line = lines
        .next()
        .filter(|line| !line.is_empty())
        .ok_or_else(|| Error::InvalidHandshake("Empty response".into()))?;

    let mut parts = status_line.splitn(3, ' ');
    let version = parts.next().unwrap_or_default();
    let status = parts.next().unwrap_or_default();
    let reason = parts.next().unwrap_or_default().to_string();
    if !version.starts_with("HTTP/1.") || status != "101" {
        return Err(Error::InvalidHandshake(format!(
            "Expected 101 status, got: {status_line}"
        )));
    }

    let headers = parse_headers(lines, &UNIQUE_RESPONSE_HEADERS)?;

    let upgrade = headers
        .get("upgrade")
        .ok_or_else(|| Error::InvalidHandshake("Missing Upgrade header in response".into()))?;
    if !upgrade.eq_ignore_ascii_case("websocket") {
        return Err(Error::InvalidHandshake(format!(
            "Invalid Upgrade header: {upgrade}"
        )));
    }

    let connection = headers.get("connection").ok_or_else(|| {
        Error::InvalidHandshake("Missing Connection header in response".into())
    })?;
    if !connection
        .split(',')
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
    {
        return Err(Error::InvalidHandshake(format!(
            "Invalid Connection header: {connection}"
        )));
    }

    let accept = headers
        .get("sec-websocket-accept")
        .ok_or_else(|| Error::InvalidHandshake("Missing Sec-WebSocket-Accept header".into()))?;
    if *accept != context.expected_accept {
        return Err(Error::AcceptMismatch {
            expected: context.expected_accept.clone(),
            actual: accept.clone(),
        });
    }

    let protocol = headers.get("sec-websocket-protocol").cloned();
    if let Some(ref selected) = protocol {
        if context.subprotocol.as_deref() != Some(selected.as_str()) {
            return Err(Error::InvalidHandshake(format!(
                "Server selected subprotocol {selected:?} that was not offered"
            )));
        }
    }

    Ok(HandshakeResponse { reason, protocol })
}
