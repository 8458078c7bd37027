//! Splitting outgoing data messages into frames (RFC 6455 Section 5.4).

use bytes::Bytes;

use crate::protocol::{Frame, OpCode};

/// Iterator over the frames of one outgoing data message.
///
/// With no fragment size the whole payload goes out as one final frame.
/// Otherwise the first frame carries the message opcode, the rest are
/// Continuation frames, and only the last has FIN set. Chunks share the
/// payload buffer rather than copying it.
#[derive(Debug)]
pub struct MessageFragmenter {
    payload: Bytes,
    opcode: OpCode,
    fragment_size: usize,
    offset: usize,
    is_first: bool,
}

impl MessageFragmenter {
    #[must_use]
    pub fn new(payload: Bytes, opcode: OpCode, fragment_size: Option<usize>) -> Self {
        let fragment_size = fragment_size.map_or(usize::MAX, |size| size.max(1));
        Self {
            payload,
            opcode,
            fragment_size,
            offset: 0,
            is_first: true,
        }
    }

    /// Whether the payload spans more than one frame.
    #[inline]
    #[must_use]
    pub fn needs_fragmentation(&self) -> bool {
        self.payload.len() > self.fragment_size
    }

    /// Payload bytes not yet handed out.
    #[inline]
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.payload.len() - self.offset
    }
}

impl Iterator for MessageFragmenter {
    type Item = Frame;

    fn next(&mut self) -> Option<Self::Item> {
        // An empty message is still one frame.
        if !self.is_first && self.offset >= self.payload.len() {
            return None;
        }

        let chunk_size = self.remaining().min(self.fragment_size);
        let end = self.offset + chunk_size;
        let chunk = self.payload.slice(self.offset..end);
        self.offset = end;

        let opcode = if self.is_first {
            self.is_first = false;
            self.opcode
        } else {
            OpCode::Continuation
        };

        Some(Frame::new(end >= self.payload.len(), opcode, chunk))
    }
}
