//! mk_store — persistent backing for a macaroon (capability token)
//! authorization system.
//!
//! Two independent stores share one sled database, each in its own
//! tree:
//!
//! - [`RootKeyStore`] (tree `"macrootkeys"`) owns the symmetric root
//!   key that signs and verifies macaroons. The root key is stored
//!   only as AEAD ciphertext under a password-derived encryption key;
//!   the store must be unlocked with the password before any key
//!   material can be read.
//! - [`AccountStore`] (tree `"accounts"`) owns fixed-format balance
//!   records that macaroons can be scoped to. Balances are not
//!   secrets, so they are stored in plaintext.
//!
//! # Encryption strategy
//! - The encryption key is derived from the user password via Argon2id
//!   (see `mk_crypto`); its derivation parameters are persisted, the
//!   key itself never is.
//! - The derived key is held in memory only while the store is
//!   unlocked and is zeroized when the store is closed.
//! - Unlocking does NOT verify the password eagerly: a wrong password
//!   yields a key that fails to decrypt on first use. Callers that
//!   want eager feedback should decrypt something right after
//!   unlocking.
//!
//! # Atomicity
//! Every mutating operation runs as a single sled transaction, so a
//! mid-operation failure never leaves the trees half-written. In
//! particular a password change rewrites the derivation parameters and
//! the re-encrypted root key together or not at all.

pub mod account;
pub mod error;
pub mod rootkey;

mod kv;
mod timecodec;

pub use account::{
    Account, AccountId, AccountStore, AccountType, ACCOUNT_ID_LEN, ACCOUNT_MARSHAL_LEN,
};
pub use error::StoreError;
pub use rootkey::{RootKeyStore, DEFAULT_ROOT_KEY_ID, ROOT_KEY_LEN};
