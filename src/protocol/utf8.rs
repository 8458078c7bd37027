//! Incremental UTF-8 validation for text messages (RFC 6455 Section 8.1).
//!
//! A code point may straddle a fragment boundary. Up to three trailing bytes
//! of an unfinished sequence are carried into the next fragment; a final
//! fragment must end on a code point boundary.

use crate::error::{Error, Result};

/// Incremental validator for one text message.
#[derive(Debug, Clone, Default)]
pub struct Utf8Validator {
    pending: [u8; 4],
    pending_len: usize,
}

impl Utf8Validator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the next chunk of a text message.
    ///
    /// With `is_final = false` a truncated sequence at the very end is kept
    /// for the next call. With `is_final = true` it is an error.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidUtf8` on any invalid sequence.
    pub fn validate(&mut self, data: &[u8], is_final: bool) -> Result<()> {
        let rest = if self.pending_len > 0 {
            self.complete_pending(data)?
        } else {
            data
        };

        match std::str::from_utf8(rest) {
            Ok(_) => {}
            // error_len() is None only when the input ends mid-sequence.
            Err(e) if e.error_len().is_none() => {
                let tail = &rest[e.valid_up_to()..];
                self.pending[..tail.len()].copy_from_slice(tail);
                self.pending_len = tail.len();
            }
            Err(_) => return Err(Error::InvalidUtf8),
        }

        if is_final && self.pending_len > 0 {
            self.pending_len = 0;
            return Err(Error::InvalidUtf8);
        }
        Ok(())
    }

    /// Finish the sequence carried over from the previous chunk, returning
    /// the unvalidated remainder of `data`.
    fn complete_pending<'a>(&mut self, data: &'a [u8]) -> Result<&'a [u8]> {
        let mut buf = [0u8; 4];
        buf[..self.pending_len].copy_from_slice(&self.pending[..self.pending_len]);

        let take = (4 - self.pending_len).min(data.len());
        buf[self.pending_len..self.pending_len + take].copy_from_slice(&data[..take]);
        let filled = self.pending_len + take;

        match std::str::from_utf8(&buf[..filled]) {
            Ok(_) => {
                self.pending_len = 0;
                Ok(&data[take..])
            }
            Err(e) if e.valid_up_to() > 0 => {
                // The carried sequence is complete; everything after it in
                // `data` goes through the normal path.
                let used = e.valid_up_to() - self.pending_len;
                self.pending_len = 0;
                Ok(&data[used..])
            }
            Err(e) if e.error_len().is_none() => {
                // Still short of a full code point; `data` was fully absorbed.
                self.pending[..filled].copy_from_slice(&buf[..filled]);
                self.pending_len = filled;
                Ok(&[])
            }
            Err(_) => Err(Error::InvalidUtf8),
        }
    }

    /// Discard any carried bytes.
    pub fn reset(&mut self) {
        self.pending_len = 0;
    }

    /// Whether a partial code point is waiting for more bytes.
    #[must_use]
    pub const fn has_incomplete(&self) -> bool {
        self.pending_len > 0
    }
}

/// Validate a complete, unfragmented payload.
///
/// # Errors
///
/// Returns `Error::InvalidUtf8` if `data` is not valid UTF-8.
pub fn validate_utf8(data: &[u8]) -> Result<()> {
    std::str::from_utf8(data)
        .map(|_| ())
        .map_err(|_| Error::InvalidUtf8)
}
