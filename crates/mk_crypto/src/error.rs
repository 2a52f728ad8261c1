use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("AEAD encryption failed")]
    Encrypt,

    #[error("AEAD decryption failed (wrong key or corrupted ciphertext)")]
    Decrypt,

    #[error("Malformed key derivation parameters")]
    MalformedParams,
}
