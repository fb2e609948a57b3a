// Transaction state, lock bookkeeping and undo write sets.

use std::collections::HashSet;
use std::sync::Arc;
use parking_lot::Mutex;
use thiserror::Error;

use crate::common::rid::Rid;
use crate::common::types::TxnId;
use crate::index::Index;
use crate::index::hash::HashIndexError;
use crate::storage::table::error::TableError;
use crate::storage::table::table_heap::TableHeap;
use crate::storage::table::tuple::Tuple;

/// Transaction isolation levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
}

/// Two-phase locking states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Growing,
    Shrinking,
    Committed,
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteType {
    Insert,
    Delete,
    Update,
}

/// Undo record for a table heap mutation. For deletes and updates `tuple`
/// holds the pre-image; for inserts it holds the inserted tuple.
pub struct TableWriteRecord {
    pub rid: Rid,
    pub write_type: WriteType,
    pub tuple: Tuple,
    pub table: Arc<TableHeap>,
}

impl TableWriteRecord {
    pub fn new(rid: Rid, write_type: WriteType, tuple: Tuple, table: Arc<TableHeap>) -> Self {
        Self {
            rid,
            write_type,
            tuple,
            table,
        }
    }
}

/// Undo record for an index mutation. `tuple` is the table row the change was
/// derived from (the new row for updates, with the pre-image in `old_tuple`).
/// `old_rid` is where the pre-image lives; it differs from `rid` only when an
/// update relocated the row to another page, and the abort path must reinsert
/// the old key there rather than at the (by then vacated) new location.
pub struct IndexWriteRecord {
    pub rid: Rid,
    pub old_rid: Rid,
    pub write_type: WriteType,
    pub tuple: Tuple,
    pub old_tuple: Option<Tuple>,
    pub index: Arc<dyn Index>,
}

impl IndexWriteRecord {
    pub fn new(
        rid: Rid,
        write_type: WriteType,
        tuple: Tuple,
        old_tuple: Option<Tuple>,
        index: Arc<dyn Index>,
    ) -> Self {
        Self {
            rid,
            old_rid: rid,
            write_type,
            tuple,
            old_tuple,
            index,
        }
    }

    /// Record for an update, keeping both the new location and the
    /// pre-image's location.
    pub fn update(
        rid: Rid,
        old_rid: Rid,
        new_tuple: Tuple,
        old_tuple: Tuple,
        index: Arc<dyn Index>,
    ) -> Self {
        Self {
            rid,
            old_rid,
            write_type: WriteType::Update,
            tuple: new_tuple,
            old_tuple: Some(old_tuple),
            index,
        }
    }
}

/// Errors that can occur during transaction processing
#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("Transaction {0} is already committed or aborted")]
    InvalidState(TxnId),

    #[error("Transaction {0} not found")]
    NotFound(TxnId),

    #[error("Table error during rollback: {0}")]
    Table(#[from] TableError),

    #[error("Index error during rollback: {0}")]
    Index(#[from] HashIndexError),
}

/// An active transaction. Shared between its worker thread and the lock
/// manager (which mutates other transactions' state on wound), so every
/// field is behind interior mutability.
pub struct Transaction {
    id: TxnId,
    isolation_level: IsolationLevel,
    state: Mutex<TransactionState>,
    shared_lock_set: Mutex<HashSet<Rid>>,
    exclusive_lock_set: Mutex<HashSet<Rid>>,
    table_write_set: Mutex<Vec<TableWriteRecord>>,
    index_write_set: Mutex<Vec<IndexWriteRecord>>,
}

impl Transaction {
    pub fn new(id: TxnId, isolation_level: IsolationLevel) -> Self {
        Self {
            id,
            isolation_level,
            state: Mutex::new(TransactionState::Growing),
            shared_lock_set: Mutex::new(HashSet::new()),
            exclusive_lock_set: Mutex::new(HashSet::new()),
            table_write_set: Mutex::new(Vec::new()),
            index_write_set: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> TxnId {
        self.id
    }

    pub fn isolation_level(&self) -> IsolationLevel {
        self.isolation_level
    }

    pub fn state(&self) -> TransactionState {
        *self.state.lock()
    }

    pub fn set_state(&self, state: TransactionState) {
        *self.state.lock() = state;
    }

    pub fn is_shared_locked(&self, rid: Rid) -> bool {
        self.shared_lock_set.lock().contains(&rid)
    }

    pub fn is_exclusive_locked(&self, rid: Rid) -> bool {
        self.exclusive_lock_set.lock().contains(&rid)
    }

    pub fn add_shared_lock(&self, rid: Rid) {
        self.shared_lock_set.lock().insert(rid);
    }

    pub fn add_exclusive_lock(&self, rid: Rid) {
        self.exclusive_lock_set.lock().insert(rid);
    }

    pub fn remove_shared_lock(&self, rid: Rid) {
        self.shared_lock_set.lock().remove(&rid);
    }

    pub fn remove_exclusive_lock(&self, rid: Rid) {
        self.exclusive_lock_set.lock().remove(&rid);
    }

    /// Every rid this transaction holds a granted lock on.
    pub fn held_rids(&self) -> Vec<Rid> {
        let shared = self.shared_lock_set.lock();
        let exclusive = self.exclusive_lock_set.lock();
        shared.iter().chain(exclusive.iter()).cloned().collect()
    }

    pub fn clear_lock_sets(&self) {
        self.shared_lock_set.lock().clear();
        self.exclusive_lock_set.lock().clear();
    }

    pub fn shared_lock_count(&self) -> usize {
        self.shared_lock_set.lock().len()
    }

    pub fn exclusive_lock_count(&self) -> usize {
        self.exclusive_lock_set.lock().len()
    }

    pub fn append_table_write(&self, record: TableWriteRecord) {
        self.table_write_set.lock().push(record);
    }

    pub fn append_index_write(&self, record: IndexWriteRecord) {
        self.index_write_set.lock().push(record);
    }

    pub fn take_table_writes(&self) -> Vec<TableWriteRecord> {
        std::mem::take(&mut *self.table_write_set.lock())
    }

    pub fn take_index_writes(&self) -> Vec<IndexWriteRecord> {
        std::mem::take(&mut *self.index_write_set.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_transaction_is_growing() {
        let txn = Transaction::new(1, IsolationLevel::RepeatableRead);
        assert_eq!(txn.id(), 1);
        assert_eq!(txn.state(), TransactionState::Growing);
        assert_eq!(txn.isolation_level(), IsolationLevel::RepeatableRead);
        assert_eq!(txn.shared_lock_count(), 0);
        assert_eq!(txn.exclusive_lock_count(), 0);
    }

    #[test]
    fn test_lock_set_bookkeeping() {
        let txn = Transaction::new(2, IsolationLevel::ReadCommitted);
        let a = Rid::new(1, 0);
        let b = Rid::new(1, 1);

        txn.add_shared_lock(a);
        txn.add_exclusive_lock(b);
        assert!(txn.is_shared_locked(a));
        assert!(txn.is_exclusive_locked(b));
        assert!(!txn.is_shared_locked(b));
        assert_eq!(txn.held_rids().len(), 2);

        txn.remove_shared_lock(a);
        assert!(!txn.is_shared_locked(a));

        txn.clear_lock_sets();
        assert_eq!(txn.held_rids().len(), 0);
    }
}
