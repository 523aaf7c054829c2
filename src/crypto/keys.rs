//! secp256k1 key helpers and the `nsec` bech32 encoding.
//!
//! Nostr identities are 32-byte secp256k1 secret keys.  The public key
//! is the 32-byte x-only point, rendered as 64 lowercase hex chars.

use bech32::{Bech32, Hrp};
use rand::RngCore;
use secp256k1::{Keypair, Secp256k1, SecretKey};
use zeroize::Zeroizing;

use super::secret::SecretBuffer;
use crate::errors::{KnoxError, Result};

/// Human-readable prefix for plain private keys.
pub const NSEC_HRP: Hrp = Hrp::parse_unchecked("nsec");

/// Human-readable prefix for passphrase-wrapped private keys.
pub const NCRYPTSEC_HRP: Hrp = Hrp::parse_unchecked("ncryptsec");

/// Length of a secret key in bytes.
pub const SECRET_KEY_LEN: usize = 32;

/// Generate a fresh random secret key.
pub fn generate_secret_key() -> SecretBuffer {
    let mut rng = rand::rng();
    loop {
        let mut candidate = Zeroizing::new([0u8; SECRET_KEY_LEN]);
        rng.fill_bytes(&mut candidate[..]);
        // Out-of-range scalars are astronomically rare; draw again.
        if SecretKey::from_slice(&candidate[..]).is_ok() {
            return SecretBuffer::new(candidate.to_vec());
        }
    }
}

/// Check that `bytes` is a valid secp256k1 secret key.
pub fn validate_secret_key(bytes: &[u8]) -> Result<()> {
    if bytes.len() != SECRET_KEY_LEN {
        return Err(KnoxError::InvalidSecretKey(format!(
            "expected {SECRET_KEY_LEN} bytes, got {}",
            bytes.len()
        )));
    }
    SecretKey::from_slice(bytes)
        .map(|_| ())
        .map_err(|e| KnoxError::InvalidSecretKey(e.to_string()))
}

/// Derive the hex x-only public key for a secret key.
pub fn public_key_hex(sec: &SecretBuffer) -> Result<String> {
    let secp = Secp256k1::signing_only();
    let sk = SecretKey::from_slice(sec.expose())
        .map_err(|e| KnoxError::InvalidSecretKey(e.to_string()))?;
    let (xonly, _parity) = Keypair::from_secret_key(&secp, &sk).x_only_public_key();
    Ok(hex::encode(xonly.serialize()))
}

/// Returns `true` if `value` looks like a hex public key (64 lowercase hex chars).
pub fn is_pubkey_hex(value: &str) -> bool {
    value.len() == 64 && value.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Encode a secret key as `nsec1...`.
pub fn encode_nsec(sec: &SecretBuffer) -> Result<String> {
    validate_secret_key(sec.expose())?;
    bech32::encode::<Bech32>(NSEC_HRP, sec.expose())
        .map_err(|e| KnoxError::Serialization(format!("nsec encoding: {e}")))
}

/// Decode an `nsec1...` string into a secret key.
pub fn decode_nsec(value: &str) -> Result<SecretBuffer> {
    let (hrp, data) =
        bech32::decode(value).map_err(|e| KnoxError::InvalidSecretKey(e.to_string()))?;
    let mut data = Zeroizing::new(data);

    if hrp != NSEC_HRP {
        return Err(KnoxError::InvalidSecretKey(format!(
            "expected prefix \"nsec\", got \"{hrp}\""
        )));
    }
    validate_secret_key(&data)?;

    Ok(SecretBuffer::from_mut_slice(data.as_mut_slice()))
}

// ---------------------------------------------------------------------------
// Serde helpers for `nsec`-encoded SecretBuffer fields
// ---------------------------------------------------------------------------

pub(crate) mod nsec_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use zeroize::Zeroizing;

    use super::{decode_nsec, encode_nsec};
    use crate::crypto::SecretBuffer;

    pub fn serialize<S>(sec: &SecretBuffer, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let encoded = Zeroizing::new(encode_nsec(sec).map_err(serde::ser::Error::custom)?);
        serializer.serialize_str(&encoded)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<SecretBuffer, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = Zeroizing::new(String::deserialize(deserializer)?);
        decode_nsec(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_are_valid_and_distinct() {
        let a = generate_secret_key();
        let b = generate_secret_key();
        assert!(validate_secret_key(a.expose()).is_ok());
        assert_eq!(a.len(), SECRET_KEY_LEN);
        assert_ne!(a, b);
    }

    #[test]
    fn public_key_is_64_hex_chars() {
        let sec = generate_secret_key();
        let pubkey = public_key_hex(&sec).unwrap();
        assert!(is_pubkey_hex(&pubkey), "{pubkey}");
    }

    #[test]
    fn known_public_key_vector() {
        // Secret key 1 maps to the generator point G.
        let mut bytes = vec![0u8; 32];
        bytes[31] = 1;
        let pubkey = public_key_hex(&SecretBuffer::new(bytes)).unwrap();
        assert_eq!(
            pubkey,
            "79be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798"
        );
    }

    #[test]
    fn nsec_roundtrip() {
        let sec = generate_secret_key();
        let encoded = encode_nsec(&sec).unwrap();
        assert!(encoded.starts_with("nsec1"));
        assert_eq!(decode_nsec(&encoded).unwrap(), sec);
    }

    #[test]
    fn decode_nsec_rejects_other_prefix() {
        let data = [1u8; 32];
        let npub = bech32::encode::<Bech32>(Hrp::parse_unchecked("npub"), &data).unwrap();
        assert!(matches!(
            decode_nsec(&npub),
            Err(KnoxError::InvalidSecretKey(_))
        ));
    }

    #[test]
    fn decode_nsec_rejects_garbage() {
        assert!(decode_nsec("not-a-key").is_err());
        assert!(decode_nsec("").is_err());
    }

    #[test]
    fn validate_rejects_zero_key() {
        assert!(validate_secret_key(&[0u8; 32]).is_err());
        assert!(validate_secret_key(&[1u8; 16]).is_err());
    }

    #[test]
    fn is_pubkey_hex_rules() {
        assert!(is_pubkey_hex(&"a".repeat(64)));
        assert!(!is_pubkey_hex(&"A".repeat(64)));
        assert!(!is_pubkey_hex(&"a".repeat(63)));
        assert!(!is_pubkey_hex(&"g".repeat(64)));
    }
}
