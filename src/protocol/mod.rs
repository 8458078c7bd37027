//! WebSocket protocol core implementation (RFC 6455).

pub mod assembler;
pub mod frame;
pub mod handshake;
pub mod mask;
pub mod opcode;
pub mod utf8;
pub mod validation;

pub use assembler::MessageAssembler;
pub use frame::{Decoded, Frame, FrameDecoder, encode};
pub use handshake::{
    HandshakeContext, HandshakeResponse, WS_GUID, build_request, compute_accept_key,
    validate_response,
};
pub use mask::{MaskGenerator, apply_mask, apply_mask_fast, mask, unmask};
pub use opcode::OpCode;
pub use utf8::{Utf8Validator, validate_utf8};
pub use validation::FrameValidator;
