//! Header validation for incoming frames (RFC 6455 Sections 5.1, 5.2, 5.5).
//!
//! Runs as soon as a frame header is complete, before its payload has
//! arrived, so a hostile length never causes buffering.

use crate::config::Limits;
use crate::connection::Role;
use crate::error::{Error, Result};
use crate::protocol::OpCode;
use crate::protocol::frame::MAX_CONTROL_FRAME_PAYLOAD;

/// Header fields needed for validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderInfo {
    /// FIN bit.
    pub fin: bool,
    /// RSV1..RSV3 bits, packed as the upper nibble of byte 0.
    pub rsv: u8,
    /// Parsed opcode.
    pub opcode: OpCode,
    /// MASK bit.
    pub masked: bool,
    /// Declared payload length.
    pub payload_len: u64,
}

/// Frame validator for incoming WebSocket frames.
///
/// Enforces the role-dependent masking direction plus the limits of
/// the owning connection.
#[derive(Debug, Clone)]
pub struct FrameValidator {
    role: Role,
    limits: Limits,
    accept_unmasked_frames: bool,
}

impl FrameValidator {
    /// Create a validator for frames received by `role`.
    pub fn new(role: Role, limits: Limits) -> Self {
        Self {
            role,
            limits,
            accept_unmasked_frames: false,
        }
    }

    /// Accept unmasked frames on the server side (non-RFC compliant).
    #[must_use]
    pub fn with_accept_unmasked(mut self, accept: bool) -> Self {
        self.accept_unmasked_frames = accept;
        self
    }

    /// Validate a parsed header.
    ///
    /// # Errors
    ///
    /// - `Error::ReservedBitsSet` - RSV bits set without negotiated extension
    /// - `Error::MaskedServerFrame` / `Error::UnmaskedClientFrame` - wrong masking direction
    /// - `Error::FragmentedControlFrame` - control frame with FIN=0
    /// - `Error::ControlFrameTooLarge` - control payload over 125 bytes
    /// - `Error::FrameTooLarge` - payload over the configured maximum
    /// - `Error::MessageTooLarge` - data payload that alone exceeds the
    ///   message limit
    pub fn validate(&self, header: &HeaderInfo) -> Result<()> {
        if header.rsv != 0 {
            return Err(Error::ReservedBitsSet);
        }

        self.validate_masking(header.masked)?;

        if header.opcode.is_control() {
            if !header.fin {
                return Err(Error::FragmentedControlFrame);
            }
            if header.payload_len > MAX_CONTROL_FRAME_PAYLOAD as u64 {
                return Err(Error::ControlFrameTooLarge(header.payload_len as usize));
            }
        }

        self.limits.check_frame_size(header.payload_len)?;

        if header.opcode.is_data() {
            let size = usize::try_from(header.payload_len).unwrap_or(usize::MAX);
            self.limits.check_message_size(size)?;
        }
        Ok(())
    }

    fn validate_masking(&self, masked: bool) -> Result<()> {
        match self.role {
            Role::Server if !masked && !self.accept_unmasked_frames => {
                Err(Error::UnmaskedClientFrame)
            }
            Role::Client if masked => Err(Error::MaskedServerFrame),
            _ => Ok(()),
        }
    }
}
