//! The password-derived secret key.
//!
//! A [`SecretKey`] pairs a 32-byte Argon2id-derived key with the
//! [`KdfParams`] it was derived under, so the parameters can be
//! persisted next to the ciphertexts the key protects. The key bytes
//! are zeroized on drop.

use zeroize::{Zeroizing, ZeroizeOnDrop};

use crate::aead;
use crate::error::CryptoError;
use crate::kdf::{self, KdfCost, KdfParams, PARAMS_LEN};

/// Domain separation for ciphertexts produced by this key.
const ENVELOPE_AAD: &[u8] = b"mk-secret-key-v1";

/// A 32-byte symmetric key derived from a password, plus the
/// derivation parameters needed to re-derive it.
#[derive(ZeroizeOnDrop)]
pub struct SecretKey {
    key: [u8; 32],
    #[zeroize(skip)]
    params: KdfParams,
}

impl SecretKey {
    /// Create a brand-new key from `password`: fresh random salt,
    /// the given cost. Persist [`Self::marshal_params`] so the key can
    /// be re-derived later.
    pub fn new(password: &[u8], cost: KdfCost) -> Result<Self, CryptoError> {
        let params = KdfParams::generate(cost);
        let key = kdf::derive_key(password, &params)?;
        Ok(Self { key, params })
    }

    /// Re-derive a key from `password` and previously marshaled
    /// parameters.
    ///
    /// No password check happens here: a wrong password yields a key
    /// that fails to decrypt existing ciphertext on first use.
    pub fn derive(password: &[u8], marshaled_params: &[u8]) -> Result<Self, CryptoError> {
        let params = KdfParams::unmarshal(marshaled_params)?;
        let key = kdf::derive_key(password, &params)?;
        Ok(Self { key, params })
    }

    /// The marshaled derivation parameters (not secret).
    pub fn marshal_params(&self) -> [u8; PARAMS_LEN] {
        self.params.marshal()
    }

    /// Encrypt `plaintext` into a nonce-prefixed AEAD envelope.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        aead::encrypt(&self.key, plaintext, ENVELOPE_AAD)
    }

    /// Decrypt an envelope produced by [`Self::encrypt`]. Fails with
    /// [`CryptoError::Decrypt`] on a wrong key or corrupted data.
    pub fn decrypt(&self, envelope: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
        aead::decrypt(&self.key, envelope, ENVELOPE_AAD)
    }
}
