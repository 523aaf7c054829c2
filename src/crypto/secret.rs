//! In-memory holder for raw secret key bytes.
//!
//! `SecretBuffer` owns its bytes in a `Zeroizing` allocation, so the
//! memory is overwritten before it is released.  Plaintext is only
//! reachable through a borrow (`expose`).
//!
//! Taking ownership from a caller-supplied `&mut [u8]` scrubs the
//! caller's buffer with random bytes, so the input does not linger
//! as a second plaintext copy.

use std::fmt;

use rand::RngCore;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

/// Raw secret bytes that are wiped when dropped.
#[derive(Clone)]
pub struct SecretBuffer {
    bytes: Zeroizing<Vec<u8>>,
}

impl SecretBuffer {
    /// Take ownership of an owned byte vector.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Zeroizing::new(bytes),
        }
    }

    /// Copy `input` into a new buffer and overwrite `input` in place
    /// with fresh random bytes.
    pub fn from_mut_slice(input: &mut [u8]) -> Self {
        let buffer = Self::new(input.to_vec());
        rand::rng().fill_bytes(input);
        buffer
    }

    /// Borrow the plaintext for the lifetime of `&self`.
    pub fn expose(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl PartialEq for SecretBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.bytes.len() == other.bytes.len() && bool::from(self.bytes.ct_eq(&other.bytes))
    }
}

impl Eq for SecretBuffer {}

impl fmt::Debug for SecretBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretBuffer([REDACTED; {}])", self.bytes.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expose_returns_original_bytes() {
        let secret = SecretBuffer::new(vec![1, 2, 3, 4]);
        assert_eq!(secret.expose(), &[1, 2, 3, 4]);
        assert_eq!(secret.len(), 4);
    }

    #[test]
    fn from_mut_slice_scrubs_input() {
        let original = [0x5Au8; 32];
        let mut input = original;

        let secret = SecretBuffer::from_mut_slice(&mut input);

        assert_eq!(secret.expose(), &original);
        assert_ne!(input, original, "input buffer must be overwritten");
    }

    #[test]
    fn debug_output_is_redacted() {
        let secret = SecretBuffer::new(vec![0xAB; 32]);
        let shown = format!("{secret:?}");
        assert!(shown.contains("REDACTED"));
        assert!(!shown.contains("171"));
        assert!(!shown.to_lowercase().contains("abab"));
    }

    #[test]
    fn equality_compares_contents() {
        let a = SecretBuffer::new(vec![1, 2, 3]);
        let b = SecretBuffer::new(vec![1, 2, 3]);
        let c = SecretBuffer::new(vec![1, 2, 4]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, SecretBuffer::new(vec![1, 2]));
    }
}
