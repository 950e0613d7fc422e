//! Repeating-key XOR byte cipher.
//!
//! Output byte `i` is input byte `i` XOR key byte `i mod key.len()`. There is
//! no nonce: equal plaintext prefixes produce equal ciphertext prefixes. This
//! is an obfuscation layer matching what the peer expects, not encryption.

use crate::error::SessionError;

/// Fixed ASCII key applied with [`XorCipher::apply`].
#[derive(Clone, PartialEq, Eq)]
pub struct XorCipher {
    key: Vec<u8>,
}

impl std::fmt::Debug for XorCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XorCipher")
            .field("key_len", &self.key.len())
            .finish_non_exhaustive()
    }
}

impl XorCipher {
    /// Create a cipher from a non-empty ASCII key.
    pub fn new(key: &str) -> Result<Self, SessionError> {
        if key.is_empty() {
            return Err(SessionError::Config("cipher key must not be empty".into()));
        }
        if !key.is_ascii() {
            return Err(SessionError::Config("cipher key must be ASCII".into()));
        }
        Ok(Self {
            key: key.as_bytes().to_vec(),
        })
    }

    /// XOR `data` in place. Applying twice restores the input.
    pub fn apply(&self, data: &mut [u8]) {
        for (byte, k) in data.iter_mut().zip(self.key.iter().cycle()) {
            *byte ^= k;
        }
    }
}
