//! Error types for the WebSocket client engine.
//!
//! Every peer-triggered condition surfaces as a typed [`Error`]. Errors are
//! grouped by [`ErrorKind`] so callers can tell a failed upgrade from a
//! protocol violation or a broken transport.

use thiserror::Error;

use crate::message::CloseCode;

/// Result type alias for WebSocket operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Broad category of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The HTTP upgrade failed or the target URL was unusable.
    Handshake,
    /// The peer violated RFC 6455 framing or messaging rules.
    Protocol,
    /// The underlying byte stream failed, reset, or timed out.
    Transport,
    /// An operation was attempted on a closed connection.
    ConnectionClosed,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Handshake => write!(f, "handshake"),
            ErrorKind::Protocol => write!(f, "protocol"),
            ErrorKind::Transport => write!(f, "transport"),
            ErrorKind::ConnectionClosed => write!(f, "connection closed"),
        }
    }
}

/// Errors that can occur during WebSocket operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The target URL could not be used for a WebSocket connection.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Invalid WebSocket handshake.
    #[error("Invalid handshake: {0}")]
    InvalidHandshake(String),

    /// Sec-WebSocket-Accept did not match the digest of our key.
    #[error("Sec-WebSocket-Accept mismatch: expected {expected}, got {actual}")]
    AcceptMismatch {
        /// Digest derived from the request key.
        expected: String,
        /// Value sent by the server.
        actual: String,
    },

    /// Handshake response exceeded the configured size.
    #[error("Handshake too large: {size} bytes (max: {max})")]
    HandshakeTooLarge {
        /// Bytes received so far.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// A header value supplied by the caller contains CR or LF.
    #[error("Invalid header value for {header}: {reason}")]
    InvalidHeaderValue {
        /// Header name.
        header: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// Protocol violation detected.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Invalid UTF-8 in a text message or close reason.
    #[error("Invalid UTF-8 in text frame")]
    InvalidUtf8,

    /// Frame size exceeds configured maximum.
    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge {
        /// Declared frame size.
        size: u64,
        /// Maximum allowed size.
        max: usize,
    },

    /// Message size exceeds configured maximum.
    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge {
        /// Actual message size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Too many fragments in a single message.
    #[error("Too many fragments: {count} (max: {max})")]
    TooManyFragments {
        /// Actual fragment count.
        count: usize,
        /// Maximum allowed fragments.
        max: usize,
    },

    /// Reserved opcode used.
    #[error("Reserved opcode: {0:#x}")]
    ReservedOpcode(u8),

    /// Control frame fragmented (RFC violation).
    #[error("Control frames cannot be fragmented")]
    FragmentedControlFrame,

    /// Control frame payload too large (>125 bytes).
    #[error("Control frame payload too large: {0} bytes (max: 125)")]
    ControlFrameTooLarge(usize),

    /// Unmasked client frame (security violation).
    #[error("Client frame must be masked")]
    UnmaskedClientFrame,

    /// Masked server frame (security violation).
    #[error("Server frame must not be masked")]
    MaskedServerFrame,

    /// Reserved bits set without extension.
    #[error("Reserved bits set without negotiated extension")]
    ReservedBitsSet,

    /// Invalid close code, either received or passed to `close`.
    #[error("Invalid close code: {0}")]
    InvalidCloseCode(u16),

    /// Close reason longer than the 123 bytes a control frame can carry.
    #[error("Close reason too long: {0} bytes (max: 123)")]
    CloseReasonTooLong(usize),

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(String),

    /// A transport wait exceeded its deadline.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Connection has been closed.
    #[error("Connection closed")]
    ConnectionClosed,
}

impl Error {
    /// Category of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidUrl(_)
            | Error::InvalidHandshake(_)
            | Error::AcceptMismatch { .. }
            | Error::HandshakeTooLarge { .. }
            | Error::InvalidHeaderValue { .. } => ErrorKind::Handshake,
            Error::Io(_) | Error::Timeout(_) => ErrorKind::Transport,
            Error::ConnectionClosed => ErrorKind::ConnectionClosed,
            _ => ErrorKind::Protocol,
        }
    }

    /// Close code to send when this error fails an open connection.
    #[must_use]
    pub const fn close_code(&self) -> CloseCode {
        match self {
            Error::InvalidUtf8 => CloseCode::InvalidPayload,
            Error::FrameTooLarge { .. }
            | Error::MessageTooLarge { .. }
            | Error::TooManyFragments { .. } => CloseCode::MessageTooBig,
            _ => match self.kind() {
                ErrorKind::Protocol => CloseCode::ProtocolError,
                _ => CloseCode::Abnormal,
            },
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(_: std::str::Utf8Error) -> Self {
        Error::InvalidUtf8
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::InvalidUrl(err.to_string())
    }
}
