//! Cryptographic primitives for Knox.
//!
//! This module provides:
//! - NIP-49 passphrase envelope encryption (`cipher`)
//! - Zeroizing holder for raw key bytes (`secret`)
//! - secp256k1 key generation and `nsec` encoding (`keys`)

pub mod cipher;
pub mod keys;
pub mod secret;

// Re-export the most commonly used items so callers can write:
//   use crate::crypto::{PassphraseCipher, SecretBuffer, ...};
pub use cipher::{KeySecurity, PassphraseCipher, DEFAULT_LOG_N};
pub use keys::{decode_nsec, encode_nsec, generate_secret_key, public_key_hex};
pub use secret::SecretBuffer;
