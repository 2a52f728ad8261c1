//! Password-protected root-key store.
//!
//! The root key is the symmetric secret the macaroon library signs and
//! verifies tokens with. On disk it only ever exists as AEAD
//! ciphertext under an encryption key derived from the user password;
//! the derivation parameters live next to it in the same tree.
//!
//! Tree layout (`"macrootkeys"`):
//! - `"enckey"` -> marshaled KDF parameters (salt + cost, not secret)
//! - `"0"`     -> ciphertext of the 32-byte root key
//!
//! The layout is id-indexed so that key rotation with multiple ids can
//! be added later without a format migration; today only id `"0"` is
//! populated.
//!
//! # Lifecycle
//! A store starts Locked and becomes Unlocked through
//! [`RootKeyStore::create_unlock`]. There is no way back to Locked
//! other than consuming the store with [`RootKeyStore::close`], which
//! zeroizes the in-memory encryption key.
//!
//! State-changing operations take `&mut self`; read operations take
//! `&self` and are safe to call concurrently once unlocked.

use rand::RngCore;
use zeroize::Zeroizing;

use mk_crypto::{KdfCost, SecretKey};

use crate::error::StoreError;
use crate::kv::run_tx;

/// Length of a root key.
pub const ROOT_KEY_LEN: usize = 32;

/// The id of the default root key. A single id is used until key
/// rotation support lands.
pub const DEFAULT_ROOT_KEY_ID: &[u8] = b"0";

const ROOT_KEY_TREE: &[u8] = b"macrootkeys";

/// Reserved slot holding the encryption-key derivation parameters.
const ENC_KEY_ID: &[u8] = b"enckey";

/// Store for the password-encrypted macaroon root key(s).
pub struct RootKeyStore {
    db: sled::Db,
    tree: sled::Tree,

    /// The derived encryption key. `None` means the store is locked.
    enc_key: Option<SecretKey>,

    /// Argon2id cost used when creating a fresh encryption key.
    kdf_cost: KdfCost,
}

impl RootKeyStore {
    /// Open the store on `db`, creating its tree if needed. The store
    /// starts locked.
    pub fn new(db: sled::Db) -> Result<Self, StoreError> {
        Self::with_kdf_cost(db, KdfCost::default())
    }

    /// Like [`Self::new`] with a custom Argon2id cost for newly
    /// created encryption keys. Existing keys always re-derive with
    /// their stored parameters.
    pub fn with_kdf_cost(db: sled::Db, kdf_cost: KdfCost) -> Result<Self, StoreError> {
        let tree = db.open_tree(ROOT_KEY_TREE)?;
        Ok(Self {
            db,
            tree,
            enc_key: None,
            kdf_cost,
        })
    }

    /// Unlock the store with `password`, creating the encryption key
    /// if none exists yet.
    ///
    /// When derivation parameters are already stored, the key is
    /// re-derived from them without any correctness check: a wrong
    /// password only surfaces as a [`mk_crypto::CryptoError::Decrypt`]
    /// on the first decryption it is used for.
    pub fn create_unlock(&mut self, password: &[u8]) -> Result<(), StoreError> {
        if self.enc_key.is_some() {
            return Err(StoreError::AlreadyUnlocked);
        }
        if password.is_empty() {
            return Err(StoreError::PasswordRequired);
        }

        let cost = self.kdf_cost;
        let enc_key = run_tx(&self.tree, |tx| {
            if let Some(params) = tx.get(ENC_KEY_ID)? {
                // Parameters already stored; re-derive and hope the
                // password is right (lazy verification).
                return match SecretKey::derive(password, &params) {
                    Ok(key) => Ok(key),
                    Err(e) => sled::transaction::abort(e.into()),
                };
            }

            // First unlock ever: create and persist a fresh key.
            let key = match SecretKey::new(password, cost) {
                Ok(key) => key,
                Err(e) => return sled::transaction::abort(e.into()),
            };
            tx.insert(ENC_KEY_ID, &key.marshal_params()[..])?;
            tracing::debug!("created macaroon encryption key");
            Ok(key)
        })?;

        self.enc_key = Some(enc_key);
        Ok(())
    }

    /// Re-encrypt the root key under a key derived from `new_password`.
    ///
    /// Runs as one transaction: the new derivation parameters and the
    /// re-encrypted root key are written together or not at all, so a
    /// mid-failure can never pair old ciphertext with new parameters.
    /// A wrong `old_password` surfaces as a decrypt error.
    pub fn change_password(
        &mut self,
        old_password: &[u8],
        new_password: &[u8],
    ) -> Result<(), StoreError> {
        // The store must already be unlocked; that also guarantees a
        // key exists in the database at all.
        if self.enc_key.is_none() {
            return Err(StoreError::StoreLocked);
        }
        if old_password.is_empty() || new_password.is_empty() {
            return Err(StoreError::PasswordRequired);
        }

        let cost = self.kdf_cost;
        let enc_key = run_tx(&self.tree, |tx| {
            let params = tx.get(ENC_KEY_ID)?;
            let root_ct = tx.get(DEFAULT_ROOT_KEY_ID)?;
            let (Some(params), Some(root_ct)) = (params, root_ct) else {
                return sled::transaction::abort(StoreError::EncryptionKeyNotFound);
            };

            let old_key = match SecretKey::derive(old_password, &params) {
                Ok(key) => key,
                Err(e) => return sled::transaction::abort(e.into()),
            };
            // Wrong old password fails right here.
            let root_key = match old_key.decrypt(&root_ct) {
                Ok(plain) => plain,
                Err(e) => return sled::transaction::abort(e.into()),
            };

            let new_key = match SecretKey::new(new_password, cost) {
                Ok(key) => key,
                Err(e) => return sled::transaction::abort(e.into()),
            };
            let new_ct = match new_key.encrypt(&root_key) {
                Ok(ct) => ct,
                Err(e) => return sled::transaction::abort(e.into()),
            };

            tx.insert(DEFAULT_ROOT_KEY_ID, new_ct)?;
            tx.insert(ENC_KEY_ID, &new_key.marshal_params()[..])?;
            Ok(new_key)
        })?;

        self.enc_key = Some(enc_key);
        tracing::debug!("macaroon store password changed");
        Ok(())
    }

    /// Decrypt and return the root key stored under `id`.
    pub fn get(&self, id: &[u8]) -> Result<Zeroizing<Vec<u8>>, StoreError> {
        let enc_key = self.enc_key.as_ref().ok_or(StoreError::StoreLocked)?;
        let ct = self
            .tree
            .get(id)?
            .ok_or_else(|| StoreError::RootKeyNotFound(hex::encode(id)))?;
        Ok(enc_key.decrypt(&ct)?)
    }

    /// Return the root key for the default id, creating it on first
    /// use.
    ///
    /// Get-or-create runs as a single transaction, so two concurrent
    /// callers can never both generate a key; the ciphertext is
    /// written at most once. The id is returned alongside the key so
    /// the macaroon library can embed it in issued tokens.
    pub fn root_key(&self) -> Result<(Zeroizing<Vec<u8>>, &'static [u8]), StoreError> {
        let enc_key = self.enc_key.as_ref().ok_or(StoreError::StoreLocked)?;

        let root_key = run_tx(&self.tree, |tx| {
            if let Some(ct) = tx.get(DEFAULT_ROOT_KEY_ID)? {
                return match enc_key.decrypt(&ct) {
                    Ok(plain) => Ok(plain),
                    Err(e) => sled::transaction::abort(e.into()),
                };
            }

            let mut root_key = Zeroizing::new(vec![0u8; ROOT_KEY_LEN]);
            rand::rngs::OsRng.fill_bytes(&mut root_key);

            let ct = match enc_key.encrypt(&root_key) {
                Ok(ct) => ct,
                Err(e) => return sled::transaction::abort(e.into()),
            };
            tx.insert(DEFAULT_ROOT_KEY_ID, ct)?;
            tracing::debug!("created macaroon root key");
            Ok(root_key)
        })?;

        Ok((root_key, DEFAULT_ROOT_KEY_ID))
    }

    /// Generate a new root key for the default id, unconditionally
    /// replacing any previous one.
    ///
    /// Macaroons signed under the old key become unverifiable; nothing
    /// here invalidates them explicitly.
    pub fn rotate_root_key(&self) -> Result<(), StoreError> {
        let enc_key = self.enc_key.as_ref().ok_or(StoreError::StoreLocked)?;

        run_tx(&self.tree, |tx| {
            let mut root_key = Zeroizing::new(vec![0u8; ROOT_KEY_LEN]);
            rand::rngs::OsRng.fill_bytes(&mut root_key);

            let ct = match enc_key.encrypt(&root_key) {
                Ok(ct) => ct,
                Err(e) => return sled::transaction::abort(e.into()),
            };
            tx.insert(DEFAULT_ROOT_KEY_ID, ct)?;
            Ok(())
        })?;

        tracing::debug!("rotated macaroon root key");
        Ok(())
    }

    /// Zeroize the in-memory encryption key and flush the database.
    ///
    /// Consuming `self` makes re-locking impossible by construction;
    /// open a new store to start over.
    pub fn close(mut self) -> Result<(), StoreError> {
        // SecretKey zeroizes its bytes on drop; dropping it here
        // rather than with the store makes the wipe explicit.
        drop(self.enc_key.take());
        self.db.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const TEST_COST: KdfCost = KdfCost {
        m_cost: 1024,
        t_cost: 1,
        p_cost: 1,
    };

    fn open_store(dir: &tempfile::TempDir) -> RootKeyStore {
        let db = sled::open(dir.path()).unwrap();
        RootKeyStore::with_kdf_cost(db, TEST_COST).unwrap()
    }

    #[test]
    fn locked_store_refuses_everything() {
        let dir = tempdir().unwrap();
        let mut store = open_store(&dir);

        assert!(matches!(store.get(b"0"), Err(StoreError::StoreLocked)));
        assert!(matches!(store.root_key(), Err(StoreError::StoreLocked)));
        assert!(matches!(
            store.rotate_root_key(),
            Err(StoreError::StoreLocked)
        ));
        assert!(matches!(
            store.change_password(b"a", b"b"),
            Err(StoreError::StoreLocked)
        ));
    }

    #[test]
    fn unlock_twice_fails() {
        let dir = tempdir().unwrap();
        let mut store = open_store(&dir);
        store.create_unlock(b"hunter2").unwrap();
        assert!(matches!(
            store.create_unlock(b"hunter2"),
            Err(StoreError::AlreadyUnlocked)
        ));
    }

    #[test]
    fn empty_password_is_rejected() {
        let dir = tempdir().unwrap();
        let mut store = open_store(&dir);
        assert!(matches!(
            store.create_unlock(b""),
            Err(StoreError::PasswordRequired)
        ));

        store.create_unlock(b"hunter2").unwrap();
        assert!(matches!(
            store.change_password(b"", b"newpw"),
            Err(StoreError::PasswordRequired)
        ));
        assert!(matches!(
            store.change_password(b"hunter2", b""),
            Err(StoreError::PasswordRequired)
        ));
    }

    #[test]
    fn root_key_is_created_once() {
        let dir = tempdir().unwrap();
        let mut store = open_store(&dir);
        store.create_unlock(b"hunter2").unwrap();

        let (k1, id1) = store.root_key().unwrap();
        assert_eq!(k1.len(), ROOT_KEY_LEN);
        assert_eq!(id1, DEFAULT_ROOT_KEY_ID);
        let ct_after_first = store.tree.get(DEFAULT_ROOT_KEY_ID).unwrap().unwrap();

        let (k2, _) = store.root_key().unwrap();
        assert_eq!(&k1[..], &k2[..]);
        // Second call must not rewrite the ciphertext.
        let ct_after_second = store.tree.get(DEFAULT_ROOT_KEY_ID).unwrap().unwrap();
        assert_eq!(ct_after_first, ct_after_second);
    }

    #[test]
    fn get_returns_the_generated_key() {
        let dir = tempdir().unwrap();
        let mut store = open_store(&dir);
        store.create_unlock(b"hunter2").unwrap();

        let (created, _) = store.root_key().unwrap();
        let fetched = store.get(DEFAULT_ROOT_KEY_ID).unwrap();
        assert_eq!(&created[..], &fetched[..]);
    }

    #[test]
    fn get_unknown_id_fails() {
        let dir = tempdir().unwrap();
        let mut store = open_store(&dir);
        store.create_unlock(b"hunter2").unwrap();
        assert!(matches!(
            store.get(b"42"),
            Err(StoreError::RootKeyNotFound(_))
        ));
    }

    #[test]
    fn rotation_replaces_the_key() {
        let dir = tempdir().unwrap();
        let mut store = open_store(&dir);
        store.create_unlock(b"hunter2").unwrap();

        let (before, _) = store.root_key().unwrap();
        store.rotate_root_key().unwrap();
        let (after, _) = store.root_key().unwrap();
        assert_ne!(&before[..], &after[..]);
        assert_eq!(after.len(), ROOT_KEY_LEN);
    }

    #[test]
    fn change_password_requires_existing_root_key() {
        let dir = tempdir().unwrap();
        let mut store = open_store(&dir);
        store.create_unlock(b"hunter2").unwrap();
        // No root key generated yet.
        assert!(matches!(
            store.change_password(b"hunter2", b"newpw"),
            Err(StoreError::EncryptionKeyNotFound)
        ));
    }

    #[test]
    fn change_password_preserves_root_key_across_reopen() {
        let dir = tempdir().unwrap();

        let k1 = {
            let mut store = open_store(&dir);
            store.create_unlock(b"hunter2").unwrap();
            let (k1, _) = store.root_key().unwrap();
            store.change_password(b"hunter2", b"newpw").unwrap();

            // Same instance keeps working with the new key.
            let (k_after, _) = store.root_key().unwrap();
            assert_eq!(&k1[..], &k_after[..]);
            store.close().unwrap();
            k1
        };

        let mut reopened = open_store(&dir);
        reopened.create_unlock(b"newpw").unwrap();
        let (k2, _) = reopened.root_key().unwrap();
        assert_eq!(&k1[..], &k2[..]);
    }

    #[test]
    fn old_password_fails_to_decrypt_after_change() {
        let dir = tempdir().unwrap();
        {
            let mut store = open_store(&dir);
            store.create_unlock(b"hunter2").unwrap();
            store.root_key().unwrap();
            store.change_password(b"hunter2", b"newpw").unwrap();
            store.close().unwrap();
        }

        // Unlocking with the old password succeeds (verification is
        // lazy) but the first decrypt must fail; stale plaintext is
        // never silently returned.
        let mut stale = open_store(&dir);
        stale.create_unlock(b"hunter2").unwrap();
        assert!(matches!(stale.root_key(), Err(StoreError::Crypto(_))));
    }

    #[test]
    fn wrong_password_on_existing_store_fails_on_first_use() {
        let dir = tempdir().unwrap();
        {
            let mut store = open_store(&dir);
            store.create_unlock(b"hunter2").unwrap();
            store.root_key().unwrap();
            store.close().unwrap();
        }

        let mut store = open_store(&dir);
        store.create_unlock(b"wrong").unwrap();
        assert!(matches!(store.root_key(), Err(StoreError::Crypto(_))));
    }

    #[test]
    fn root_key_survives_plain_reopen() {
        let dir = tempdir().unwrap();
        let k1 = {
            let mut store = open_store(&dir);
            store.create_unlock(b"hunter2").unwrap();
            let (k1, _) = store.root_key().unwrap();
            store.close().unwrap();
            k1
        };

        let mut store = open_store(&dir);
        store.create_unlock(b"hunter2").unwrap();
        let (k2, _) = store.root_key().unwrap();
        assert_eq!(&k1[..], &k2[..]);
    }
}
