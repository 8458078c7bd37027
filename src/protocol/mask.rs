//! Payload masking (RFC 6455 Section 5.3).
//!
//! Masking and unmasking are the same operation: byte `i` is XORed with
//! `key[i % 4]`. An all-zero key is legal and leaves the payload unchanged.

/// XOR `data` in place with `key`, one byte at a time.
#[inline]
pub fn apply_mask(data: &mut [u8], key: [u8; 4]) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= key[i % 4];
    }
}

/// XOR `data` in place with `key`, four bytes per step.
///
/// Produces the same output as [`apply_mask`].
#[inline]
pub fn apply_mask_fast(data: &mut [u8], key: [u8; 4]) {
    let key_word = u32::from_ne_bytes(key);
    let mut chunks = data.chunks_exact_mut(4);
    for chunk in &mut chunks {
        let word = u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) ^ key_word;
        chunk.copy_from_slice(&word.to_ne_bytes());
    }
    // The tail starts on a multiple of four, so it lines up with key[0].
    apply_mask(chunks.into_remainder(), key);
}

/// Return a masked copy of `payload`.
#[must_use]
pub fn mask(payload: &[u8], key: [u8; 4]) -> Vec<u8> {
    let mut out = payload.to_vec();
    apply_mask_fast(&mut out, key);
    out
}

/// Return an unmasked copy of `payload`. Identical to [`mask`].
#[must_use]
pub fn unmask(payload: &[u8], key: [u8; 4]) -> Vec<u8> {
    mask(payload, key)
}

/// Produces masking keys for one connection.
///
/// Seeded once from the OS RNG, then stepped with a multiplicative mix. Keys
/// only need to be unpredictable to intermediaries, not cryptographically
/// strong.
#[derive(Debug, Clone)]
pub struct MaskGenerator {
    state: u32,
}

impl Default for MaskGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl MaskGenerator {
    /// Create a generator seeded from `getrandom`, falling back to the clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_seed(random_seed())
    }

    /// Create a generator with a fixed seed.
    #[must_use]
    pub const fn with_seed(seed: u32) -> Self {
        Self { state: seed }
    }

    /// Next 4-byte masking key.
    pub fn next_key(&mut self) -> [u8; 4] {
        self.state = self.state.wrapping_add(0x9E37_79B9);
        let mut z = self.state;
        z = (z ^ (z >> 16)).wrapping_mul(0x85EB_CA6B);
        z = (z ^ (z >> 13)).wrapping_mul(0xC2B2_AE35);
        (z ^ (z >> 16)).to_le_bytes()
    }
}

fn random_seed() -> u32 {
    let mut buf = [0u8; 4];
    if getrandom::getrandom(&mut buf).is_ok() {
        u32::from_le_bytes(buf)
    } else {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u32)
            .unwrap_or(0x1234_5678)
    }
}
