//! Passphrase-based authenticated encryption (NIP-49 envelope).
//!
//! The passphrase is normalized to Unicode NFKC, stretched with scrypt
//! (`N = 2^log_n, r = 8, p = 1`) into a 32-byte key, and used with
//! XChaCha20-Poly1305.  The key-security byte is bound as associated
//! data.  Every call draws a fresh salt and nonce.
//!
//! Layout of an envelope:
//!
//! ```text
//! [0x02][log_n: 1][salt: 16][nonce: 24][key security: 1][ciphertext + 16-byte tag]
//! ```
//!
//! The same envelope wrapping a single 32-byte key and bech32-encoded
//! with the `ncryptsec` prefix is the portable export format.

use bech32::Bech32;
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use rand::RngCore;
use unicode_normalization::UnicodeNormalization;
use zeroize::Zeroizing;

use super::keys::{validate_secret_key, NCRYPTSEC_HRP, SECRET_KEY_LEN};
use super::secret::SecretBuffer;
use crate::errors::{KnoxError, Result};

/// The only envelope version understood.
pub const ENVELOPE_VERSION: u8 = 0x02;

/// Default scrypt work factor (log2 of N).
pub const DEFAULT_LOG_N: u8 = 16;

/// Largest work factor accepted when decrypting (2^22 * 1 KiB = 4 GiB).
pub const MAX_LOG_N: u8 = 22;

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 24;
const TAG_LEN: usize = 16;
const KEY_LEN: usize = 32;

/// Offsets into the envelope.
const SALT_START: usize = 2;
const NONCE_START: usize = SALT_START + SALT_LEN;
const KSB_POS: usize = NONCE_START + NONCE_LEN;
const CIPHERTEXT_START: usize = KSB_POS + 1;

/// How carefully the wrapped key has been handled, bound as AAD.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum KeySecurity {
    /// The key is known to have been handled insecurely.
    Insecure = 0x00,
    /// The key has not been handled insecurely.
    Secure = 0x01,
    /// Unknown provenance.
    #[default]
    Unknown = 0x02,
}

impl TryFrom<u8> for KeySecurity {
    type Error = KnoxError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x00 => Ok(Self::Insecure),
            0x01 => Ok(Self::Secure),
            0x02 => Ok(Self::Unknown),
            other => Err(KnoxError::MalformedEnvelope(format!(
                "unknown key security byte {other:#04x}"
            ))),
        }
    }
}

/// Encrypts and decrypts with a single passphrase.
#[derive(Clone)]
pub struct PassphraseCipher {
    passphrase: Zeroizing<String>,
    log_n: u8,
    key_security: KeySecurity,
}

impl PassphraseCipher {
    /// Create a cipher using the default work factor.
    pub fn new(passphrase: &str) -> Self {
        Self {
            passphrase: Zeroizing::new(passphrase.nfkc().collect()),
            log_n: DEFAULT_LOG_N,
            key_security: KeySecurity::default(),
        }
    }

    /// Use a different scrypt work factor for `encrypt`.
    ///
    /// `decrypt` always uses the factor recorded in the envelope.
    pub fn with_work_factor(mut self, log_n: u8) -> Self {
        self.log_n = log_n;
        self
    }

    /// Use a different key-security byte for `encrypt`.
    pub fn with_key_security(mut self, key_security: KeySecurity) -> Self {
        self.key_security = key_security;
        self
    }

    /// Encrypt with this cipher's work factor and key-security byte.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        self.encrypt_with(plaintext, self.log_n, self.key_security)
    }

    /// Encrypt with explicit parameters.
    pub fn encrypt_with(
        &self,
        plaintext: &[u8],
        log_n: u8,
        key_security: KeySecurity,
    ) -> Result<Vec<u8>> {
        let mut rng = rand::rng();
        let mut salt = [0u8; SALT_LEN];
        rng.fill_bytes(&mut salt);
        let mut nonce = [0u8; NONCE_LEN];
        rng.fill_bytes(&mut nonce);

        let key = self.derive_key(&salt, log_n)?;
        let cipher = XChaCha20Poly1305::new_from_slice(&key[..])
            .map_err(|e| KnoxError::EncryptionFailed(format!("invalid key length: {e}")))?;

        let aad = [key_security as u8];
        let ciphertext = cipher
            .encrypt(
                XNonce::from_slice(&nonce),
                Payload {
                    msg: plaintext,
                    aad: &aad,
                },
            )
            .map_err(|e| KnoxError::EncryptionFailed(format!("encryption error: {e}")))?;

        let mut output = Vec::with_capacity(CIPHERTEXT_START + ciphertext.len());
        output.push(ENVELOPE_VERSION);
        output.push(log_n);
        output.extend_from_slice(&salt);
        output.extend_from_slice(&nonce);
        output.extend_from_slice(&aad);
        output.extend_from_slice(&ciphertext);
        Ok(output)
    }

    /// Decrypt an envelope produced by `encrypt`.
    pub fn decrypt(&self, envelope: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        let version = envelope.first().copied().unwrap_or_default();
        if version != ENVELOPE_VERSION {
            return Err(KnoxError::UnsupportedVersion(version));
        }

        if envelope.len() < CIPHERTEXT_START + TAG_LEN {
            return Err(KnoxError::MalformedEnvelope(format!(
                "envelope is {} bytes, need at least {}",
                envelope.len(),
                CIPHERTEXT_START + TAG_LEN
            )));
        }

        let log_n = envelope[1];
        if log_n > MAX_LOG_N {
            return Err(KnoxError::MalformedEnvelope(format!(
                "work factor {log_n} exceeds maximum of {MAX_LOG_N}"
            )));
        }

        let salt = &envelope[SALT_START..NONCE_START];
        let nonce = &envelope[NONCE_START..KSB_POS];
        let aad = &envelope[KSB_POS..CIPHERTEXT_START];
        let ciphertext = &envelope[CIPHERTEXT_START..];

        let key = self.derive_key(salt, log_n)?;
        let cipher =
            XChaCha20Poly1305::new_from_slice(&key[..]).map_err(|_| KnoxError::DecryptionFailed)?;

        let plaintext = cipher
            .decrypt(
                XNonce::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad,
                },
            )
            .map_err(|_| KnoxError::DecryptionFailed)?;

        Ok(Zeroizing::new(plaintext))
    }

    /// Wrap a secret key into an `ncryptsec1...` string.
    pub fn encrypt_key(&self, sec: &SecretBuffer) -> Result<String> {
        validate_secret_key(sec.expose())?;
        let envelope = self.encrypt(sec.expose())?;
        bech32::encode::<Bech32>(NCRYPTSEC_HRP, &envelope)
            .map_err(|e| KnoxError::Serialization(format!("ncryptsec encoding: {e}")))
    }

    /// Unwrap an `ncryptsec1...` string into a secret key.
    pub fn decrypt_key(&self, ncryptsec: &str) -> Result<SecretBuffer> {
        let (hrp, envelope) =
            bech32::decode(ncryptsec).map_err(|e| KnoxError::InvalidSecretKey(e.to_string()))?;
        if hrp != NCRYPTSEC_HRP {
            return Err(KnoxError::InvalidSecretKey(format!(
                "expected prefix \"ncryptsec\", got \"{hrp}\""
            )));
        }

        let mut plaintext = self.decrypt(&envelope)?;
        if plaintext.len() != SECRET_KEY_LEN {
            return Err(KnoxError::InvalidSecretKey(format!(
                "wrapped key is {} bytes, expected {SECRET_KEY_LEN}",
                plaintext.len()
            )));
        }
        validate_secret_key(&plaintext)?;

        Ok(SecretBuffer::from_mut_slice(plaintext.as_mut_slice()))
    }

    /// Derive the 32-byte symmetric key with scrypt.
    fn derive_key(&self, salt: &[u8], log_n: u8) -> Result<Zeroizing<[u8; KEY_LEN]>> {
        let params = scrypt::Params::new(log_n, 8, 1, KEY_LEN)
            .map_err(|e| KnoxError::KeyDerivationFailed(format!("invalid scrypt params: {e}")))?;

        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        scrypt::scrypt(self.passphrase.as_bytes(), salt, &params, &mut key[..])
            .map_err(|e| KnoxError::KeyDerivationFailed(format!("scrypt failed: {e}")))?;
        Ok(key)
    }
}

impl std::fmt::Debug for PassphraseCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PassphraseCipher")
            .field("log_n", &self.log_n)
            .field("key_security", &self.key_security)
            .finish_non_exhaustive()
    }
}
