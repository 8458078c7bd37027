//! Application messages and close status codes (RFC 6455 Sections 5.6 and 7.4).

use std::fmt;

use crate::error::{Error, Result};

/// Longest close reason that still fits in a 125-byte control frame.
pub const MAX_CLOSE_REASON: usize = 123;

/// Status code carried by a Close frame or reported for a closure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum CloseCode {
    /// 1000
    #[default]
    Normal,
    /// 1001, the endpoint is shutting down or navigating away.
    GoingAway,
    /// 1002
    ProtocolError,
    /// 1003, a data type the endpoint cannot accept.
    UnsupportedData,
    /// 1005. Never sent; reported when the peer's Close carried no code.
    NoStatusReceived,
    /// 1006. Never sent; reported when the connection ended without a close
    /// handshake.
    Abnormal,
    /// 1007, e.g. a Text message that is not UTF-8.
    InvalidPayload,
    /// 1008
    PolicyViolation,
    /// 1009
    MessageTooBig,
    /// 1010, the client wanted an extension the server did not agree to.
    MandatoryExtension,
    /// 1011
    InternalError,
    /// Any other value, including registered 1012-1014 and 3000-4999.
    Other(u16),
}

const NAMED_CODES: [(CloseCode, u16); 11] = [
    (CloseCode::Normal, 1000),
    (CloseCode::GoingAway, 1001),
    (CloseCode::ProtocolError, 1002),
    (CloseCode::UnsupportedData, 1003),
    (CloseCode::NoStatusReceived, 1005),
    (CloseCode::Abnormal, 1006),
    (CloseCode::InvalidPayload, 1007),
    (CloseCode::PolicyViolation, 1008),
    (CloseCode::MessageTooBig, 1009),
    (CloseCode::MandatoryExtension, 1010),
    (CloseCode::InternalError, 1011),
];

impl CloseCode {
    #[must_use]
    pub fn from_u16(value: u16) -> Self {
        NAMED_CODES
            .iter()
            .find(|(_, raw)| *raw == value)
            .map_or(CloseCode::Other(value), |(code, _)| *code)
    }

    #[must_use]
    pub fn as_u16(&self) -> u16 {
        if let CloseCode::Other(raw) = self {
            return *raw;
        }
        NAMED_CODES
            .iter()
            .find(|(code, _)| code == self)
            .map_or(0, |(_, raw)| *raw)
    }

    /// Whether the code may be put on the wire (Section 7.4.1): 1000-1003,
    /// 1007-1014 or 3000-4999.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self.as_u16(), 1000..=1003 | 1007..=1014 | 3000..=4999)
    }

    /// 1004, 1005, 1006 and 1015 only ever describe a closure locally.
    #[must_use]
    pub fn is_reserved(&self) -> bool {
        matches!(self.as_u16(), 1004..=1006 | 1015)
    }
}

impl From<u16> for CloseCode {
    fn from(value: u16) -> Self {
        Self::from_u16(value)
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> Self {
        code.as_u16()
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u16())
    }
}

/// Status code and reason of a closure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    pub code: CloseCode,
    /// UTF-8, at most [`MAX_CLOSE_REASON`] bytes when sent.
    pub reason: String,
}

impl CloseFrame {
    #[must_use]
    pub fn new(code: CloseCode, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Decode a received Close payload. An empty payload yields `None`.
    ///
    /// # Errors
    ///
    /// - `Error::ProtocolViolation` for a one-byte payload
    /// - `Error::InvalidCloseCode` for a code that must not appear on the wire
    /// - `Error::InvalidUtf8` for a malformed reason
    pub fn parse(payload: &[u8]) -> Result<Option<Self>> {
        let (raw, reason) = match payload {
            [] => return Ok(None),
            [_] => {
                return Err(Error::ProtocolViolation(
                    "Close payload must be empty or at least 2 bytes".into(),
                ));
            }
            [hi, lo, reason @ ..] => (u16::from_be_bytes([*hi, *lo]), reason),
        };

        let code = CloseCode::from(raw);
        if !code.is_valid() {
            return Err(Error::InvalidCloseCode(raw));
        }
        Ok(Some(Self::new(code, std::str::from_utf8(reason)?)))
    }

    /// Encode as a Close payload: big-endian code, then the reason.
    #[must_use]
    pub fn to_payload(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(2 + self.reason.len());
        data.extend_from_slice(&self.code.as_u16().to_be_bytes());
        data.extend_from_slice(self.reason.as_bytes());
        data
    }
}

impl fmt::Display for CloseFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reason.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{} ({})", self.code, self.reason)
        }
    }
}

/// A message handed to or received from a connection.
///
/// Only `Text` and `Binary` are ever delivered as
/// [`Event::Message`](crate::Event::Message); the control variants exist so
/// that [`Connection::send`](crate::Connection::send) can take any of them.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Message {
    Text(String),
    Binary(Vec<u8>),
    /// At most 125 bytes.
    Ping(Vec<u8>),
    /// At most 125 bytes.
    Pong(Vec<u8>),
    Close(Option<CloseFrame>),
}

impl Message {
    #[must_use]
    pub fn text(s: impl Into<String>) -> Self {
        Message::Text(s.into())
    }

    #[must_use]
    pub fn binary(data: impl Into<Vec<u8>>) -> Self {
        Message::Binary(data.into())
    }

    #[must_use]
    pub fn ping(data: impl Into<Vec<u8>>) -> Self {
        Message::Ping(data.into())
    }

    #[must_use]
    pub fn pong(data: impl Into<Vec<u8>>) -> Self {
        Message::Pong(data.into())
    }

    #[must_use]
    pub fn close(code: CloseCode, reason: impl Into<String>) -> Self {
        Message::Close(Some(CloseFrame::new(code, reason)))
    }

    /// Payload bytes; empty for `Close`.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        match self {
            Message::Text(text) => text.as_bytes(),
            Message::Binary(data) | Message::Ping(data) | Message::Pong(data) => data,
            Message::Close(_) => &[],
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Message::Text(text) => Some(text),
            _ => None,
        }
    }

    #[must_use]
    pub fn into_text(self) -> Option<String> {
        match self {
            Message::Text(text) => Some(text),
            _ => None,
        }
    }

    #[must_use]
    pub fn into_binary(self) -> Option<Vec<u8>> {
        match self {
            Message::Binary(data) => Some(data),
            _ => None,
        }
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Message::Text(text)
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Message::Text(text.to_string())
    }
}

impl From<Vec<u8>> for Message {
    fn from(data: Vec<u8>) -> Self {
        Message::Binary(data)
    }
}
