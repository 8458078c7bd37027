//! Reassembly of fragmented data messages (RFC 6455 Section 5.4).

use bytes::BytesMut;

use crate::config::Limits;
use crate::error::{Error, Result};
use crate::message::Message;
use crate::protocol::utf8::Utf8Validator;
use crate::protocol::{Frame, OpCode};

/// Folds data frames into complete messages.
///
/// Holds at most one in-progress message. Its opcode is fixed by the first
/// frame; only Continuation frames may follow until one arrives with FIN set.
/// Control frames are never handed to the assembler, so an in-progress
/// message survives any number of interleaved Ping/Pong/Close frames.
#[derive(Debug)]
pub struct MessageAssembler {
    buffer: BytesMut,
    opcode: Option<OpCode>,
    fragment_count: usize,
    utf8: Utf8Validator,
    limits: Limits,
}

impl MessageAssembler {
    #[must_use]
    pub fn new(limits: Limits) -> Self {
        Self {
            buffer: BytesMut::new(),
            opcode: None,
            fragment_count: 0,
            utf8: Utf8Validator::new(),
            limits,
        }
    }

    /// Add a data frame. Returns the message once a frame with FIN arrives.
    ///
    /// On error the partial message is discarded.
    ///
    /// # Errors
    ///
    /// - `Error::ProtocolViolation` for a Continuation with nothing pending,
    ///   a new Text/Binary frame while a message is pending, or a control frame
    /// - `Error::TooManyFragments` / `Error::MessageTooLarge` when limits are hit
    /// - `Error::InvalidUtf8` for a text message that is not valid UTF-8
    pub fn push(&mut self, frame: Frame) -> Result<Option<Message>> {
        let result = self.push_inner(frame);
        if result.is_err() {
            self.reset();
        }
        result
    }

    fn push_inner(&mut self, frame: Frame) -> Result<Option<Message>> {
        let opcode = match (frame.opcode, self.opcode) {
            (OpCode::Continuation, Some(pending)) => pending,
            (OpCode::Continuation, None) => {
                return Err(Error::ProtocolViolation(
                    "Continuation frame without a message in progress".into(),
                ));
            }
            (OpCode::Text | OpCode::Binary, None) => frame.opcode,
            (OpCode::Text | OpCode::Binary, Some(_)) => {
                return Err(Error::ProtocolViolation(
                    "New data frame while a fragmented message is in progress".into(),
                ));
            }
            (control, _) => {
                return Err(Error::ProtocolViolation(format!(
                    "{control} frame is not a data frame"
                )));
            }
        };

        self.limits.check_fragment_count(self.fragment_count + 1)?;
        let new_size = self.buffer.len().saturating_add(frame.payload().len());
        self.limits.check_message_size(new_size)?;

        if opcode == OpCode::Text {
            self.utf8.validate(frame.payload(), frame.fin)?;
        }

        self.opcode = Some(opcode);
        self.fragment_count += 1;
        self.buffer.extend_from_slice(frame.payload());

        if !frame.fin {
            return Ok(None);
        }

        let payload = self.buffer.split().to_vec();
        self.reset();
        let message = if opcode == OpCode::Text {
            Message::Text(String::from_utf8(payload).map_err(|_| Error::InvalidUtf8)?)
        } else {
            Message::Binary(payload)
        };
        Ok(Some(message))
    }

    /// Whether a fragmented message is in progress.
    #[must_use]
    pub const fn is_assembling(&self) -> bool {
        self.opcode.is_some()
    }

    /// Bytes buffered for the in-progress message.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Drop any in-progress message.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.opcode = None;
        self.fragment_count = 0;
        self.utf8.reset();
    }
}
