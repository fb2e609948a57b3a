pub mod hash;

use crate::common::rid::Rid;
use crate::index::hash::HashIndexError;
use crate::storage::table::tuple::Tuple;

/// Interface executors use to maintain a table's secondary indexes. The
/// implementation extracts its key columns from the full table row.
pub trait Index: Send + Sync {
    /// Insert an entry for the given row. False on duplicate.
    fn insert_entry(&self, tuple: &Tuple, rid: Rid) -> Result<bool, HashIndexError>;

    /// Remove the entry for the given row. False when absent.
    fn delete_entry(&self, tuple: &Tuple, rid: Rid) -> Result<bool, HashIndexError>;

    /// Point lookup by key tuple (already projected to the key columns).
    fn scan_key(&self, key: &Tuple) -> Result<Vec<Rid>, HashIndexError>;
}
