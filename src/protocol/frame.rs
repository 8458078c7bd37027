//! WebSocket frame encoding and incremental decoding (RFC 6455 Section 5.2).
//!
//! Decoding is resumable: [`FrameDecoder::decode`] never consumes input. It
//! either reports a complete frame together with the number of bytes it
//! occupies, or how many more bytes are needed before it can make progress.

use bytes::{BufMut, Bytes, BytesMut};

use crate::config::Limits;
use crate::connection::Role;
use crate::error::{Error, Result};
use crate::message::CloseFrame;
use crate::protocol::OpCode;
use crate::protocol::mask::{MaskGenerator, apply_mask_fast};
use crate::protocol::validation::{FrameValidator, HeaderInfo};

/// Maximum payload size for control frames (RFC 6455).
pub const MAX_CONTROL_FRAME_PAYLOAD: usize = 125;

/// A WebSocket frame as defined in RFC 6455.
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-------+-+-------------+-------------------------------+
/// |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
/// |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
/// |N|V|V|V|       |S|             |   (if payload len==126/127)   |
/// | |1|2|3|       |K|             |                               |
/// +-+-+-+-+-------+-+-------------+-------------------------------+
/// |                     Masking key (if MASK set)                 |
/// +---------------------------------------------------------------+
/// |                          Payload data                         |
/// +---------------------------------------------------------------+
/// ```
///
/// The payload is always held unmasked. `mask` records the key a decoded
/// frame arrived with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Final fragment flag.
    pub fin: bool,
    /// Reserved bit 1. Must be 0 unless an extension is negotiated.
    pub rsv1: bool,
    /// Reserved bit 2.
    pub rsv2: bool,
    /// Reserved bit 3.
    pub rsv3: bool,
    /// Frame opcode.
    pub opcode: OpCode,
    /// Masking key seen on the wire, if the MASK bit was set.
    pub mask: Option<[u8; 4]>,
    payload: Bytes,
}

impl Frame {
    /// Create a new unmasked frame.
    #[must_use]
    pub fn new(fin: bool, opcode: OpCode, payload: impl Into<Bytes>) -> Self {
        Self {
            fin,
            rsv1: false,
            rsv2: false,
            rsv3: false,
            opcode,
            mask: None,
            payload: payload.into(),
        }
    }

    /// Create a final text frame.
    #[must_use]
    pub fn text(data: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Text, data)
    }

    /// Create a final binary frame.
    #[must_use]
    pub fn binary(data: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Binary, data)
    }

    /// Create a close frame. `None` produces an empty body.
    #[must_use]
    pub fn close(close: Option<&CloseFrame>) -> Self {
        let payload = close.map(CloseFrame::to_payload).unwrap_or_default();
        Self::new(true, OpCode::Close, payload)
    }

    /// Create a ping frame.
    #[must_use]
    pub fn ping(data: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Ping, data)
    }

    /// Create a pong frame.
    #[must_use]
    pub fn pong(data: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Pong, data)
    }

    /// Whether the frame arrived with the MASK bit set.
    #[inline]
    #[must_use]
    pub const fn is_masked(&self) -> bool {
        self.mask.is_some()
    }

    /// Get the (unmasked) payload bytes.
    #[inline]
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Take ownership of the payload.
    #[must_use]
    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// Number of bytes this frame occupies on the wire.
    #[must_use]
    pub fn wire_size(&self, masked: bool) -> usize {
        let len = self.payload.len();
        let extended = match len {
            0..=125 => 0,
            126..=0xFFFF => 2,
            _ => 8,
        };
        2 + extended + if masked { 4 } else { 0 } + len
    }

    /// Append the wire encoding of this frame to `dst`.
    ///
    /// With `Some(key)` the MASK bit is set and the payload is masked with
    /// `key`; with `None` the payload is written as is.
    pub fn write(&self, dst: &mut BytesMut, mask: Option<[u8; 4]>) {
        let len = self.payload.len();
        dst.reserve(self.wire_size(mask.is_some()));

        let mut byte0 = self.opcode.as_u8();
        if self.fin {
            byte0 |= 0x80;
        }
        if self.rsv1 {
            byte0 |= 0x40;
        }
        if self.rsv2 {
            byte0 |= 0x20;
        }
        if self.rsv3 {
            byte0 |= 0x10;
        }
        dst.put_u8(byte0);

        let mask_bit = if mask.is_some() { 0x80 } else { 0x00 };
        if len < 126 {
            dst.put_u8(mask_bit | len as u8);
        } else if len <= 0xFFFF {
            dst.put_u8(mask_bit | 126);
            dst.put_u16(len as u16);
        } else {
            dst.put_u8(mask_bit | 127);
            dst.put_u64(len as u64);
        }

        match mask {
            Some(key) => {
                dst.put_slice(&key);
                let start = dst.len();
                dst.put_slice(&self.payload);
                apply_mask_fast(&mut dst[start..], key);
            }
            None => dst.put_slice(&self.payload),
        }
    }

    /// Encode this frame into a fresh buffer.
    #[must_use]
    pub fn to_bytes(&self, mask: Option<[u8; 4]>) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.wire_size(mask.is_some()));
        self.write(&mut buf, mask);
        buf.freeze()
    }
}

/// Encode a single final frame carrying `payload`.
///
/// When `mask` is true a random key is drawn and the MASK bit set, as every
/// client-originated frame requires.
#[must_use]
pub fn encode(opcode: OpCode, payload: &[u8], mask: bool) -> Bytes {
    let key = mask.then(|| MaskGenerator::new().next_key());
    Frame::new(true, opcode, Bytes::copy_from_slice(payload)).to_bytes(key)
}

/// Outcome of one decode attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A complete frame occupying the first `consumed` bytes of the input.
    Frame {
        /// The decoded, unmasked frame.
        frame: Frame,
        /// Bytes the caller should now discard.
        consumed: usize,
    },
    /// The input ends mid-frame. Retry from the same offset once at least
    /// `needed` more bytes have arrived.
    NeedMoreBytes {
        /// Minimum number of additional bytes required.
        needed: usize,
    },
}

/// Parsed fixed part of a header.
struct RawHeader {
    info: HeaderInfo,
    mask_offset: usize,
    header_len: usize,
}

enum HeaderProgress {
    Complete(RawHeader),
    Partial(usize),
}

/// Parse the frame header, stopping as soon as a stage lacks bytes.
///
/// `validator` runs once the payload length is known, so limits apply before
/// the mask key and payload are waited on.
fn parse_header(buf: &[u8], validator: &FrameValidator) -> Result<HeaderProgress> {
    if buf.len() < 2 {
        return Ok(HeaderProgress::Partial(2 - buf.len()));
    }

    let byte0 = buf[0];
    let byte1 = buf[1];
    let opcode = OpCode::from_u8(byte0 & 0x0F)?;
    let masked = byte1 & 0x80 != 0;

    let (payload_len, len_end) = match byte1 & 0x7F {
        126 => {
            if buf.len() < 4 {
                return Ok(HeaderProgress::Partial(4 - buf.len()));
            }
            (u64::from(u16::from_be_bytes([buf[2], buf[3]])), 4)
        }
        127 => {
            if buf.len() < 10 {
                return Ok(HeaderProgress::Partial(10 - buf.len()));
            }
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&buf[2..10]);
            let len = u64::from_be_bytes(raw);
            if len >> 63 != 0 {
                return Err(Error::ProtocolViolation(
                    "Most significant bit of 64-bit length must be 0".into(),
                ));
            }
            (len, 10)
        }
        short => (u64::from(short), 2),
    };

    let info = HeaderInfo {
        fin: byte0 & 0x80 != 0,
        rsv: byte0 & 0x70,
        opcode,
        masked,
        payload_len,
    };
    validator.validate(&info)?;

    let header_len = if masked { len_end + 4 } else { len_end };
    if buf.len() < header_len {
        return Ok(HeaderProgress::Partial(header_len - buf.len()));
    }

    Ok(HeaderProgress::Complete(RawHeader {
        info,
        mask_offset: len_end,
        header_len,
    }))
}

/// Incremental, role-aware frame decoder.
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    validator: FrameValidator,
}

impl FrameDecoder {
    /// Create a decoder using an explicit validator.
    #[must_use]
    pub fn new(validator: FrameValidator) -> Self {
        Self { validator }
    }

    /// Decoder for frames received by `role` under `limits`.
    #[must_use]
    pub fn for_role(role: Role, limits: Limits) -> Self {
        Self::new(FrameValidator::new(role, limits))
    }

    /// Try to decode one frame from the start of `buf`.
    ///
    /// `buf` is only read. On [`Decoded::NeedMoreBytes`] the caller keeps the
    /// bytes and calls again with more appended.
    ///
    /// # Errors
    ///
    /// - `Error::ReservedOpcode` for an opcode outside the closed set
    /// - `Error::ProtocolViolation` for a 64-bit length with the top bit set
    /// - any error from [`FrameValidator::validate`]
    pub fn decode(&self, buf: &[u8]) -> Result<Decoded> {
        let header = match parse_header(buf, &self.validator)? {
            HeaderProgress::Complete(header) => header,
            HeaderProgress::Partial(needed) => return Ok(Decoded::NeedMoreBytes { needed }),
        };

        // Already bounded by max_frame_size, which is a usize.
        let payload_len = usize::try_from(header.info.payload_len).map_err(|_| {
            Error::FrameTooLarge {
                size: header.info.payload_len,
                max: usize::MAX,
            }
        })?;
        let total = header
            .header_len
            .checked_add(payload_len)
            .ok_or(Error::FrameTooLarge {
                size: header.info.payload_len,
                max: usize::MAX - header.header_len,
            })?;

        if buf.len() < total {
            return Ok(Decoded::NeedMoreBytes {
                needed: total - buf.len(),
            });
        }

        let body = &buf[header.header_len..total];
        let mask = header.info.masked.then(|| {
            let offset = header.mask_offset;
            [buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]]
        });
        let payload = match mask {
            Some(key) => {
                let mut data = body.to_vec();
                apply_mask_fast(&mut data, key);
                Bytes::from(data)
            }
            None => Bytes::copy_from_slice(body),
        };

        let frame = Frame {
            fin: header.info.fin,
            rsv1: false,
            rsv2: false,
            rsv3: false,
            opcode: header.info.opcode,
            mask,
            payload,
        };

        Ok(Decoded::Frame {
            frame,
            consumed: total,
        })
    }
}
