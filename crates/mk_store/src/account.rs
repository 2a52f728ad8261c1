//! Off-chain balance accounts and their ledger.
//!
//! An account is a spending allowance that issued macaroons can be
//! scoped to. The ledger only stores and retrieves balances; the
//! spending logic that consumes them lives elsewhere.
//!
//! Marshaled account format (63 bytes, fixed width, no framing):
//!
//!   [ id (16) | type (1) | initial_balance (8 LE) |
//!     current_balance (8 LE) | last_update (15) | expiration (15) ]
//!
//! The two timestamps use the 15-byte codec from [`crate::timecodec`].
//! Any stored blob whose length differs from 63 bytes is rejected as
//! malformed.

use chrono::{DateTime, Utc};
use rand::RngCore;

use crate::error::StoreError;
use crate::kv::run_tx;
use crate::timecodec;

/// Length of an account identifier. 16 bytes makes guessing
/// improbable without being mistaken for a SHA256 hash.
pub const ACCOUNT_ID_LEN: usize = 16;

/// A randomly generated, immutable account identifier.
pub type AccountId = [u8; ACCOUNT_ID_LEN];

/// Length of a marshaled account record.
pub const ACCOUNT_MARSHAL_LEN: usize =
    ACCOUNT_ID_LEN + 1 + 8 + 8 + timecodec::TIME_MARSHAL_LEN + timecodec::TIME_MARSHAL_LEN;

const ACCOUNT_TREE: &[u8] = b"accounts";

/// How an account's balance behaves over time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AccountType {
    /// The initial balance is used up when spent and never
    /// replenished.
    OneTime = 0,
    /// The balance is replenished on a schedule (the replenishment
    /// logic is not part of this store).
    Periodic = 1,
}

impl AccountType {
    fn from_byte(b: u8) -> Result<Self, StoreError> {
        match b {
            0 => Ok(Self::OneTime),
            1 => Ok(Self::Periodic),
            _ => Err(StoreError::Malformed),
        }
    }
}

/// Everything needed to keep track of a user's off-chain balance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// Randomly generated identifier, immutable after creation.
    pub id: AccountId,

    /// The account type.
    pub ty: AccountType,

    /// Balance at creation, in milli-units. Never updated.
    pub initial_balance: u64,

    /// Currently available balance in milli-units, updated every time
    /// the account is spent from.
    pub current_balance: u64,

    /// When the current balance last changed.
    pub last_update: DateTime<Utc>,

    /// The account is no longer valid for new spending after this
    /// point; enforcement is the consumer's job.
    pub expiration: DateTime<Utc>,
}

impl Account {
    /// Marshal into the fixed 63-byte storage format.
    pub fn encode(&self) -> [u8; ACCOUNT_MARSHAL_LEN] {
        let mut out = [0u8; ACCOUNT_MARSHAL_LEN];
        out[0..16].copy_from_slice(&self.id);
        out[16] = self.ty as u8;
        out[17..25].copy_from_slice(&self.initial_balance.to_le_bytes());
        out[25..33].copy_from_slice(&self.current_balance.to_le_bytes());
        out[33..48].copy_from_slice(&timecodec::marshal(self.last_update));
        out[48..63].copy_from_slice(&timecodec::marshal(self.expiration));
        out
    }

    /// Unmarshal from the storage format. Any blob whose length is not
    /// exactly 63 bytes fails with [`StoreError::Malformed`], as does
    /// an unknown type byte or an undecodable timestamp.
    pub fn decode(data: &[u8]) -> Result<Self, StoreError> {
        if data.len() != ACCOUNT_MARSHAL_LEN {
            return Err(StoreError::Malformed);
        }

        let mut id = [0u8; ACCOUNT_ID_LEN];
        id.copy_from_slice(&data[0..16]);

        Ok(Self {
            id,
            ty: AccountType::from_byte(data[16])?,
            initial_balance: u64::from_le_bytes([
                data[17], data[18], data[19], data[20], data[21], data[22], data[23], data[24],
            ]),
            current_balance: u64::from_le_bytes([
                data[25], data[26], data[27], data[28], data[29], data[30], data[31], data[32],
            ]),
            last_update: timecodec::unmarshal(&data[33..48])?,
            expiration: timecodec::unmarshal(&data[48..63])?,
        })
    }
}

/// The account ledger: a stateless wrapper around the `"accounts"`
/// tree. Every operation is one transaction against the database; no
/// lock lifecycle applies.
pub struct AccountStore {
    db: sled::Db,
    tree: sled::Tree,
}

impl AccountStore {
    /// Open the ledger on `db`, creating its tree if needed.
    pub fn new(db: sled::Db) -> Result<Self, StoreError> {
        let tree = db.open_tree(ACCOUNT_TREE)?;
        Ok(Self { db, tree })
    }

    /// Create and persist a new one-time account with the given
    /// balance (milli-units) and expiration date.
    ///
    /// The 16-byte id is drawn from the OS RNG. Collisions are not
    /// checked; with 128-bit ids and realistic account volume the
    /// probability is negligible.
    pub fn new_account(
        &self,
        balance: u64,
        expiration: DateTime<Utc>,
    ) -> Result<Account, StoreError> {
        let mut id: AccountId = [0u8; ACCOUNT_ID_LEN];
        rand::rngs::OsRng.fill_bytes(&mut id);

        let account = Account {
            id,
            ty: AccountType::OneTime,
            initial_balance: balance,
            current_balance: balance,
            last_update: Utc::now(),
            expiration,
        };
        let encoded = account.encode();

        run_tx(&self.tree, |tx| {
            tx.insert(&account.id[..], &encoded[..])?;
            Ok(())
        })?;

        tracing::debug!(id = %hex::encode(id), balance, "created account");
        Ok(account)
    }

    /// Look up an account by id.
    pub fn get_account(&self, id: &AccountId) -> Result<Account, StoreError> {
        let encoded = self
            .tree
            .get(&id[..])?
            .ok_or(StoreError::AccountNotFound)?;
        Account::decode(&encoded)
    }

    /// Retrieve every account in the ledger.
    ///
    /// A decode failure on any single record aborts the whole
    /// enumeration; no partial result is returned.
    pub fn get_accounts(&self) -> Result<Vec<Account>, StoreError> {
        let mut accounts = Vec::new();
        for entry in self.tree.iter() {
            let (_, encoded) = entry?;
            accounts.push(Account::decode(&encoded)?);
        }
        Ok(accounts)
    }

    /// Overwrite an account's current balance, bumping its
    /// last-update time. The full record is rewritten in place; the
    /// initial balance is never touched.
    pub fn update_account_balance(
        &self,
        id: &AccountId,
        new_balance: u64,
    ) -> Result<Account, StoreError> {
        run_tx(&self.tree, |tx| {
            let encoded = match tx.get(&id[..])? {
                Some(encoded) => encoded,
                None => return sled::transaction::abort(StoreError::AccountNotFound),
            };
            let mut account = match Account::decode(&encoded) {
                Ok(account) => account,
                Err(e) => return sled::transaction::abort(e),
            };

            account.current_balance = new_balance;
            account.last_update = Utc::now();
            tx.insert(&id[..], &account.encode()[..])?;
            Ok(account)
        })
    }

    /// Flush the ledger to disk. Nothing secret to zero here.
    pub fn close(self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }
}
