//! Cryptographic primitives (C3): symmetric wrap/unwrap for secrets at
//! rest, X25519-based asymmetric encryption for tenant key material, and
//! password hashing.
//!
//! # Security model
//!
//! - Symmetric wrap uses AES-256-GCM. Every encryption draws a fresh
//!   96-bit nonce from the OS CSPRNG; ciphertext format is
//!   `nonce (12 bytes) || ciphertext || tag (16 bytes)`.
//! - Asymmetric encryption is an ECIES construction over X25519: an
//!   ephemeral keypair, a shared secret via Diffie-Hellman, HKDF-SHA256 to
//!   derive a one-time AES key, then the same AEAD framing as the
//!   symmetric path. The wire format is
//!   `ephemeral_public (32 bytes) || nonce (12 bytes) || ciphertext || tag`.
//! - Password hashes use Argon2id with the crate's recommended parameters.
//! - All key material derives `Zeroize` + `ZeroizeOnDrop` and redacts
//!   itself from `Debug`.

use std::fmt;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng as AesOsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hkdf::Hkdf;
use sha2::Sha256;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const MIN_CIPHERTEXT_LEN: usize = NONCE_LEN + TAG_LEN;
const X25519_PUBLIC_LEN: usize = 32;
const HKDF_INFO: &[u8] = b"xvault-ecies-v1";

/// A 256-bit symmetric key, zeroized on drop. Used as the platform KEK that
/// wraps credentials and tenant private keys.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey([u8; 32]);

impl EncryptionKey {
    /// Build a key from raw bytes, e.g. loaded from configuration.
    #[must_use]
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Parse a key from a base64-encoded string (32 raw bytes).
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidKeyMaterial`] if the string is not
    /// valid base64 or does not decode to exactly 32 bytes.
    pub fn from_base64(s: &str) -> Result<Self, CryptoError> {
        let bytes = BASE64.decode(s).map_err(|e| CryptoError::InvalidKeyMaterial {
            reason: format!("invalid base64: {e}"),
        })?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyMaterial {
                reason: "key must be exactly 32 bytes".to_owned(),
            })?;
        Ok(Self(arr))
    }

    /// Generate a new random key using the OS CSPRNG.
    #[must_use]
    pub fn generate() -> Self {
        let key = Aes256Gcm::generate_key(AesOsRng);
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&key);
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Encrypt plaintext with AES-256-GCM under a fresh random nonce.
///
/// Returns `nonce (12 bytes) || ciphertext || tag (16 bytes)`.
///
/// # Errors
///
/// Returns [`CryptoError::CryptoAuth`] if the AEAD operation fails.
pub fn encrypt(key: &EncryptionKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    let nonce = Aes256Gcm::generate_nonce(&mut AesOsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| CryptoError::CryptoAuth {
            reason: e.to_string(),
        })?;

    let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    combined.extend_from_slice(&nonce);
    combined.extend_from_slice(&ciphertext);
    Ok(combined)
}

/// Decrypt ciphertext produced by [`encrypt`].
///
/// # Errors
///
/// Returns [`CryptoError::CiphertextTooShort`] if shorter than the nonce +
/// tag minimum, or [`CryptoError::CryptoAuth`] if authentication fails.
pub fn decrypt(key: &EncryptionKey, combined: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if combined.len() < MIN_CIPHERTEXT_LEN {
        return Err(CryptoError::CiphertextTooShort {
            expected: MIN_CIPHERTEXT_LEN,
            actual: combined.len(),
        });
    }

    let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
    let nonce = Nonce::from_slice(nonce_bytes);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|e| CryptoError::CryptoAuth {
            reason: e.to_string(),
        })
}

/// Derive a purpose-scoped key from a root key using HKDF-SHA256.
///
/// # Errors
///
/// Returns [`CryptoError::KeyDerivation`] if HKDF expansion fails.
pub fn derive_key(
    root_key: &EncryptionKey,
    salt: Option<&[u8]>,
    info: &[u8],
) -> Result<EncryptionKey, CryptoError> {
    let hk = Hkdf::<Sha256>::new(salt, root_key.as_bytes());
    let mut derived = [0u8; 32];
    hk.expand(info, &mut derived)
        .map_err(|e| CryptoError::KeyDerivation {
            reason: format!("{} expansion failed: {e}", String::from_utf8_lossy(info)),
        })?;
    Ok(EncryptionKey::from_bytes(derived))
}

/// A tenant's X25519 keypair. The public half is stored in the clear; the
/// private half is wrapped under the platform KEK before it ever reaches
/// storage.
pub struct TenantKeypair {
    secret: StaticSecret,
    public: PublicKey,
}

impl TenantKeypair {
    /// Generate a new keypair using the OS CSPRNG.
    #[must_use]
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(rand::rngs::OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// The public key, base64-encoded, as stored in `tenant_keys.public_key`.
    #[must_use]
    pub fn public_base64(&self) -> String {
        BASE64.encode(self.public.as_bytes())
    }

    /// The private key's raw bytes, for wrapping under the platform KEK.
    #[must_use]
    pub fn private_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }

    /// Rebuild a keypair from an unwrapped private key.
    #[must_use]
    pub fn from_private_bytes(bytes: [u8; 32]) -> Self {
        let secret = StaticSecret::from(bytes);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }
}

/// Encrypt `plaintext` to a recipient's X25519 public key (base64-encoded).
///
/// Generates an ephemeral keypair, performs Diffie-Hellman against the
/// recipient's public key, derives a one-time AES key via HKDF, and
/// encrypts under it. The wire format is
/// `ephemeral_public (32 bytes) || nonce (12 bytes) || ciphertext || tag`.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidKeyMaterial`] if `recipient_public_base64`
/// is not valid base64 or not 32 bytes, or [`CryptoError::CryptoAuth`] if
/// the AEAD operation fails.
pub fn encrypt_to(recipient_public_base64: &str, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let recipient_bytes = decode_public(recipient_public_base64)?;
    let recipient_public = PublicKey::from(recipient_bytes);

    let ephemeral_secret = StaticSecret::random_from_rng(rand::rngs::OsRng);
    let ephemeral_public = PublicKey::from(&ephemeral_secret);
    let shared = ephemeral_secret.diffie_hellman(&recipient_public);

    let key = derive_key(
        &EncryptionKey::from_bytes(*shared.as_bytes()),
        None,
        HKDF_INFO,
    )?;
    let body = encrypt(&key, plaintext)?;

    let mut out = Vec::with_capacity(X25519_PUBLIC_LEN + body.len());
    out.extend_from_slice(ephemeral_public.as_bytes());
    out.extend_from_slice(&body);
    Ok(out)
}

/// Decrypt a payload produced by [`encrypt_to`] using the recipient's
/// unwrapped private key.
///
/// # Errors
///
/// Returns [`CryptoError::CiphertextTooShort`] if the payload is shorter
/// than the ephemeral-public-key + AEAD minimum, or
/// [`CryptoError::CryptoAuth`] if authentication fails.
pub fn decrypt_with(recipient: &TenantKeypair, payload: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if payload.len() < X25519_PUBLIC_LEN + MIN_CIPHERTEXT_LEN {
        return Err(CryptoError::CiphertextTooShort {
            expected: X25519_PUBLIC_LEN + MIN_CIPHERTEXT_LEN,
            actual: payload.len(),
        });
    }

    let (ephemeral_bytes, body) = payload.split_at(X25519_PUBLIC_LEN);
    let ephemeral_public = PublicKey::from(decode_public_slice(ephemeral_bytes)?);
    let shared = recipient.secret.diffie_hellman(&ephemeral_public);

    let key = derive_key(
        &EncryptionKey::from_bytes(*shared.as_bytes()),
        None,
        HKDF_INFO,
    )?;
    decrypt(&key, body)
}

fn decode_public(base64_str: &str) -> Result<[u8; 32], CryptoError> {
    let bytes = BASE64.decode(base64_str).map_err(|e| CryptoError::InvalidKeyMaterial {
        reason: format!("invalid base64: {e}"),
    })?;
    decode_public_slice(&bytes)
}

fn decode_public_slice(bytes: &[u8]) -> Result<[u8; 32], CryptoError> {
    bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidKeyMaterial {
            reason: "public key must be exactly 32 bytes".to_owned(),
        })
}

/// Hash a password with Argon2id, returning the PHC string form.
///
/// # Errors
///
/// Returns [`CryptoError::KeyDerivation`] if Argon2 hashing fails.
pub fn hash_password(password: &str) -> Result<String, CryptoError> {
    let salt = SaltString::generate(&mut rand::rngs::OsRng);
    let argon2 = Argon2::default();
    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| CryptoError::KeyDerivation {
            reason: format!("argon2 hashing failed: {e}"),
        })
}

/// Verify a password against a PHC-formatted hash produced by
/// [`hash_password`]. Returns `false` on any verification failure,
/// including a malformed stored hash — never leaks the reason.
#[must_use]
pub fn verify_password(password: &str, phc_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(phc_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let key = EncryptionKey::generate();
        let plaintext = b"tenant ssh credential";
        let ciphertext = encrypt(&key, plaintext).unwrap();
        let decrypted = decrypt(&key, &ciphertext).unwrap();
        assert_eq!(plaintext.as_slice(), decrypted.as_slice());
    }

    #[test]
    fn decrypt_wrong_key_fails() {
        let key1 = EncryptionKey::generate();
        let key2 = EncryptionKey::generate();
        let ciphertext = encrypt(&key1, b"secret").unwrap();
        assert!(decrypt(&key2, &ciphertext).is_err());
    }

    #[test]
    fn decrypt_too_short_fails() {
        let key = EncryptionKey::generate();
        let result = decrypt(&key, &[0u8; 4]);
        assert!(matches!(
            result,
            Err(CryptoError::CiphertextTooShort {
                expected: 28,
                actual: 4
            })
        ));
    }

    #[test]
    fn two_encryptions_differ() {
        let key = EncryptionKey::generate();
        let ct1 = encrypt(&key, b"same").unwrap();
        let ct2 = encrypt(&key, b"same").unwrap();
        assert_ne!(ct1, ct2);
    }

    #[test]
    fn ecies_roundtrip() {
        let recipient = TenantKeypair::generate();
        let payload = encrypt_to(&recipient.public_base64(), b"backup-source-password").unwrap();
        let decrypted = decrypt_with(&recipient, &payload).unwrap();
        assert_eq!(decrypted, b"backup-source-password");
    }

    #[test]
    fn ecies_wrong_recipient_fails() {
        let recipient = TenantKeypair::generate();
        let other = TenantKeypair::generate();
        let payload = encrypt_to(&recipient.public_base64(), b"secret").unwrap();
        assert!(decrypt_with(&other, &payload).is_err());
    }

    #[test]
    fn tenant_keypair_roundtrips_through_private_bytes() {
        let original = TenantKeypair::generate();
        let private = original.private_bytes();
        let rebuilt = TenantKeypair::from_private_bytes(private);
        assert_eq!(original.public_base64(), rebuilt.public_base64());
    }

    #[test]
    fn password_hash_roundtrip() {
        let hash = hash_password("correct horse battery staple").unwrap();
        assert!(verify_password("correct horse battery staple", &hash));
        assert!(!verify_password("wrong password", &hash));
    }

    #[test]
    fn encryption_key_debug_redacts_bytes() {
        let key = EncryptionKey::generate();
        let debug = format!("{key:?}");
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn encryption_key_from_base64_rejects_wrong_length() {
        let err = EncryptionKey::from_base64("YWJjZA==").unwrap_err();
        assert!(matches!(err, CryptoError::InvalidKeyMaterial { .. }));
    }
}
