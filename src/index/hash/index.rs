// Adapter exposing an extendible hash table as a table index: key columns
// are projected out of the full row and packed into the fixed key width.

use crate::common::rid::Rid;
use crate::index::hash::error::HashIndexError;
use crate::index::hash::extendible::ExtendibleHashIndex;
use crate::index::hash::key::HashKey;
use crate::index::Index;
use crate::storage::table::tuple::Tuple;

pub struct HashTableIndex<K: HashKey> {
    index: ExtendibleHashIndex<K>,
    key_attrs: Vec<usize>,
}

impl<K: HashKey> HashTableIndex<K> {
    pub fn new(index: ExtendibleHashIndex<K>, key_attrs: Vec<usize>) -> Self {
        Self { index, key_attrs }
    }

    pub fn key_attrs(&self) -> &[usize] {
        &self.key_attrs
    }

    fn key_from_row(&self, tuple: &Tuple) -> Result<K, HashIndexError> {
        K::from_tuple(&tuple.key_from_tuple(&self.key_attrs))
    }
}

impl<K: HashKey> Index for HashTableIndex<K> {
    fn insert_entry(&self, tuple: &Tuple, rid: Rid) -> Result<bool, HashIndexError> {
        let key = self.key_from_row(tuple)?;
        self.index.insert(&key, rid)
    }

    fn delete_entry(&self, tuple: &Tuple, rid: Rid) -> Result<bool, HashIndexError> {
        let key = self.key_from_row(tuple)?;
        self.index.remove(&key, rid)
    }

    fn scan_key(&self, key: &Tuple) -> Result<Vec<Rid>, HashIndexError> {
        let key = K::from_tuple(key)?;
        self.index.get(&key)
    }
}
