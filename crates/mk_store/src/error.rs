use thiserror::Error;

use mk_crypto::CryptoError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Macaroon store already unlocked")]
    AlreadyUnlocked,

    #[error("Macaroon store is locked, unlock with a password first")]
    StoreLocked,

    #[error("A non-empty password is required")]
    PasswordRequired,

    #[error("Macaroon encryption key not found")]
    EncryptionKeyNotFound,

    #[error("Root key with id {0} doesn't exist")]
    RootKeyNotFound(String),

    #[error("Account not found")]
    AccountNotFound,

    #[error("Malformed data")]
    Malformed,

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Database error: {0}")]
    Db(#[from] sled::Error),
}
