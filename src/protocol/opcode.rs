//! Frame opcodes (RFC 6455 Section 5.2).

use crate::error::{Error, Result};

/// WebSocket frame opcode.
///
/// The set is closed: every other 4-bit value is reserved and rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    /// Later fragment of a Text or Binary message.
    Continuation = 0x0,
    /// Payload of the whole message must be UTF-8.
    Text = 0x1,
    Binary = 0x2,
    /// Optional status code and reason.
    Close = 0x8,
    /// Answered with a Pong carrying the same payload.
    Ping = 0x9,
    Pong = 0xA,
}

impl OpCode {
    /// Decode the low nibble of the first header byte.
    ///
    /// # Errors
    ///
    /// Returns `Error::ReservedOpcode` for 0x3-0x7, 0xB-0xF and anything wider
    /// than four bits.
    pub const fn from_u8(byte: u8) -> Result<Self> {
        match byte {
            0x0 => Ok(OpCode::Continuation),
            0x1 => Ok(OpCode::Text),
            0x2 => Ok(OpCode::Binary),
            0x8 => Ok(OpCode::Close),
            0x9 => Ok(OpCode::Ping),
            0xA => Ok(OpCode::Pong),
            other => Err(Error::ReservedOpcode(other)),
        }
    }

    /// The 4-bit wire value.
    #[inline]
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            OpCode::Continuation => "Continuation",
            OpCode::Text => "Text",
            OpCode::Binary => "Binary",
            OpCode::Close => "Close",
            OpCode::Ping => "Ping",
            OpCode::Pong => "Pong",
        }
    }

    /// Control frames: Close, Ping, Pong.
    #[inline]
    #[must_use]
    pub const fn is_control(self) -> bool {
        matches!(self, OpCode::Close | OpCode::Ping | OpCode::Pong)
    }

    /// Data frames: Continuation, Text, Binary.
    #[inline]
    #[must_use]
    pub const fn is_data(self) -> bool {
        !self.is_control()
    }
}

impl TryFrom<u8> for OpCode {
    type Error = Error;

    fn try_from(byte: u8) -> Result<Self> {
        Self::from_u8(byte)
    }
}

impl std::fmt::Display for OpCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.name())
    }
}
