//! Small shim over sled's transaction API.
//!
//! sled reports transaction failures as either an application abort or
//! a storage error; both collapse into [`StoreError`] here so store
//! code can use `?` throughout.

use sled::transaction::{
    ConflictableTransactionResult, TransactionError, TransactionalTree,
};

use crate::error::StoreError;

/// Run `f` as one serializable transaction against `tree`.
///
/// The closure may be retried on write conflicts, so it must not have
/// side effects outside the transaction.
pub(crate) fn run_tx<T, F>(tree: &sled::Tree, f: F) -> Result<T, StoreError>
where
    F: Fn(&TransactionalTree) -> ConflictableTransactionResult<T, StoreError>,
{
    tree.transaction(f).map_err(|e| match e {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => StoreError::Db(e),
    })
}
