//! mk_crypto — password-derived secret-key primitive for the macaroon
//! keystore.
//!
//! # Design principles
//! - NO custom crypto; all primitives come from audited Rust crates.
//! - Zeroize all secret material on drop.
//! - The derivation parameters (salt + Argon2id cost) marshal to a
//!   fixed binary blob that the primitive itself can reproduce a key
//!   from, given the correct password.
//!
//! # Module layout
//! - `aead`       — XChaCha20-Poly1305 encrypt/decrypt helpers
//! - `kdf`        — Argon2id derivation, cost/parameter marshaling
//! - `secret_key` — the [`SecretKey`] combining both
//! - `error`      — unified error type

pub mod aead;
pub mod error;
pub mod kdf;
pub mod secret_key;

pub use error::CryptoError;
pub use kdf::{KdfCost, KdfParams};
pub use secret_key::SecretKey;
