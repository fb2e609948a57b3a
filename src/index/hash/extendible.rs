// Persistent extendible hash table layered on the buffer pool.
//
// One directory page addresses up to 2^MAX_GLOBAL_DEPTH bucket pages.
// Structural changes (split, merge, directory resize) run under the
// exclusive side of a table-level latch; lookups take it shared. Pages are
// deserialized, mutated, and written back; every fetch is paired with an
// unpin carrying an accurate dirty bit.

use std::sync::Arc;
use log::debug;
use parking_lot::RwLock;

use crate::common::rid::Rid;
use crate::common::types::PageId;
use crate::index::hash::bucket_page::{bucket_array_size, HashBucketPage};
use crate::index::hash::directory_page::{HashDirectoryPage, MAX_GLOBAL_DEPTH};
use crate::index::hash::error::HashIndexError;
use crate::index::hash::key::{HashKey, KeyHashFn};
use crate::storage::buffer::BufferPoolManager;

pub struct ExtendibleHashIndex<K: HashKey> {
    buffer_pool: Arc<BufferPoolManager>,
    directory_page_id: PageId,
    table_latch: RwLock<()>,
    hash_fn: KeyHashFn<K>,
    bucket_capacity: usize,
}

impl<K: HashKey> ExtendibleHashIndex<K> {
    /// Create a table with an empty directory pointing at one bucket.
    pub fn new(
        buffer_pool: Arc<BufferPoolManager>,
        hash_fn: KeyHashFn<K>,
    ) -> Result<Self, HashIndexError> {
        Self::with_bucket_capacity(buffer_pool, hash_fn, bucket_array_size::<K>())
    }

    /// As `new`, with a reduced bucket capacity (used by tests to exercise
    /// split and merge without thousands of keys).
    pub fn with_bucket_capacity(
        buffer_pool: Arc<BufferPoolManager>,
        hash_fn: KeyHashFn<K>,
        bucket_capacity: usize,
    ) -> Result<Self, HashIndexError> {
        let (directory_page, directory_page_id) = buffer_pool.new_page()?;
        let (bucket_page, bucket_page_id) = buffer_pool.new_page()?;

        let mut directory = HashDirectoryPage::new(directory_page_id);
        directory.set_bucket_page_id(0, bucket_page_id);
        directory.set_local_depth(0, 0);
        directory.store(&mut directory_page.write());

        let bucket = HashBucketPage::<K>::with_capacity(bucket_capacity);
        bucket.store(&mut bucket_page.write());

        buffer_pool.unpin_page(directory_page_id, true)?;
        buffer_pool.unpin_page(bucket_page_id, true)?;

        Ok(Self {
            buffer_pool,
            directory_page_id,
            table_latch: RwLock::new(()),
            hash_fn,
            bucket_capacity,
        })
    }

    fn hash(&self, key: &K) -> u32 {
        // Low 32 bits of the user hash address the directory
        (self.hash_fn)(key) as u32
    }

    fn key_to_directory_index(&self, key: &K, directory: &HashDirectoryPage) -> usize {
        (self.hash(key) & directory.global_depth_mask()) as usize
    }

    /// All values stored under `key`.
    pub fn get(&self, key: &K) -> Result<Vec<Rid>, HashIndexError> {
        let _guard = self.table_latch.read();

        let directory_page = self.buffer_pool.fetch_page(self.directory_page_id)?;
        let directory = HashDirectoryPage::load(&directory_page.read());
        let bucket_page_id = directory.bucket_page_id(self.key_to_directory_index(key, &directory));

        let bucket_page = match self.buffer_pool.fetch_page(bucket_page_id) {
            Ok(page) => page,
            Err(e) => {
                self.buffer_pool.unpin_page(self.directory_page_id, false)?;
                return Err(e.into());
            }
        };
        let bucket = HashBucketPage::<K>::load(&bucket_page.read(), self.bucket_capacity);
        let result = bucket.get_value(key);

        self.buffer_pool.unpin_page(bucket_page_id, false)?;
        self.buffer_pool.unpin_page(self.directory_page_id, false)?;
        Ok(result)
    }

    /// Insert a (key, rid) pair, splitting the target bucket when full.
    /// False on a duplicate pair, or when one split was not enough to make
    /// room (every key in the bucket shares the longer address prefix).
    pub fn insert(&self, key: &K, rid: Rid) -> Result<bool, HashIndexError> {
        let _guard = self.table_latch.write();

        let directory_page = self.buffer_pool.fetch_page(self.directory_page_id)?;
        let directory = HashDirectoryPage::load(&directory_page.read());
        let bucket_page_id = directory.bucket_page_id(self.key_to_directory_index(key, &directory));

        let bucket_page = match self.buffer_pool.fetch_page(bucket_page_id) {
            Ok(page) => page,
            Err(e) => {
                self.buffer_pool.unpin_page(self.directory_page_id, false)?;
                return Err(e.into());
            }
        };
        let mut bucket = HashBucketPage::<K>::load(&bucket_page.read(), self.bucket_capacity);

        if bucket.is_full() {
            self.buffer_pool.unpin_page(bucket_page_id, false)?;
            self.buffer_pool.unpin_page(self.directory_page_id, false)?;
            return self.split_insert(key, rid);
        }

        let ok = bucket.insert(key, rid);
        if ok {
            bucket.store(&mut bucket_page.write());
        }
        self.buffer_pool.unpin_page(bucket_page_id, ok)?;
        self.buffer_pool.unpin_page(self.directory_page_id, false)?;
        Ok(ok)
    }

    /// Split the key's bucket, doubling the directory first when the bucket
    /// already uses the full address width, then retry the insert once.
    fn split_insert(&self, key: &K, rid: Rid) -> Result<bool, HashIndexError> {
        let directory_page = self.buffer_pool.fetch_page(self.directory_page_id)?;
        let mut directory = HashDirectoryPage::load(&directory_page.read());

        let origin_idx = self.key_to_directory_index(key, &directory);
        let origin_page_id = directory.bucket_page_id(origin_idx);
        let origin_mask = directory.local_depth_mask(origin_idx);
        let origin_depth = directory.local_depth(origin_idx);
        let new_mask = (origin_mask << 1) | 1;

        if origin_depth == directory.global_depth()
            && directory.global_depth() >= MAX_GLOBAL_DEPTH
        {
            // Directory is at its maximum address width
            self.buffer_pool.unpin_page(self.directory_page_id, false)?;
            return Ok(false);
        }

        let origin_page = match self.buffer_pool.fetch_page(origin_page_id) {
            Ok(page) => page,
            Err(e) => {
                self.buffer_pool.unpin_page(self.directory_page_id, false)?;
                return Err(e.into());
            }
        };
        let mut origin = HashBucketPage::<K>::load(&origin_page.read(), self.bucket_capacity);

        let (new_page, new_page_id) = self.buffer_pool.new_page()?;
        let mut new_bucket = HashBucketPage::<K>::with_capacity(self.bucket_capacity);

        debug!(
            "splitting bucket page {} at local depth {} into page {}",
            origin_page_id, origin_depth, new_page_id
        );

        if origin_depth == directory.global_depth() {
            let size = directory.size();
            for i in 0..size {
                directory.set_bucket_page_id(i + size, directory.bucket_page_id(i));
                directory.set_local_depth(i + size, directory.local_depth(i));
            }
            directory.incr_global_depth();
        }

        // Redistribute: pairs whose next address bit is set move over
        for i in 0..origin.capacity() {
            if let Some((k, v)) = origin.entry_at(i) {
                let h = self.hash(&k);
                if h & origin_mask != h & new_mask {
                    new_bucket.insert(&k, v);
                    origin.remove_at(i);
                }
            }
        }

        // Deepen every slot of the split bucket; retarget the half whose
        // address pattern now differs
        for i in 0..directory.size() {
            if directory.bucket_page_id(i) == origin_page_id {
                directory.incr_local_depth(i);
                if (i as u32 & origin_mask) != (i as u32 & new_mask) {
                    directory.set_bucket_page_id(i, new_page_id);
                }
            }
        }

        let target_page_id =
            directory.bucket_page_id(self.key_to_directory_index(key, &directory));
        let ok = if target_page_id == origin_page_id {
            origin.insert(key, rid)
        } else {
            new_bucket.insert(key, rid)
        };

        directory.store(&mut directory_page.write());
        origin.store(&mut origin_page.write());
        new_bucket.store(&mut new_page.write());

        self.buffer_pool.unpin_page(self.directory_page_id, true)?;
        self.buffer_pool.unpin_page(origin_page_id, true)?;
        self.buffer_pool.unpin_page(new_page_id, true)?;

        Ok(ok)
    }

    /// Remove a (key, rid) pair. A bucket left empty is merged back into its
    /// split image where possible.
    pub fn remove(&self, key: &K, rid: Rid) -> Result<bool, HashIndexError> {
        let _guard = self.table_latch.write();

        let directory_page = self.buffer_pool.fetch_page(self.directory_page_id)?;
        let directory = HashDirectoryPage::load(&directory_page.read());
        let bucket_page_id = directory.bucket_page_id(self.key_to_directory_index(key, &directory));

        let bucket_page = match self.buffer_pool.fetch_page(bucket_page_id) {
            Ok(page) => page,
            Err(e) => {
                self.buffer_pool.unpin_page(self.directory_page_id, false)?;
                return Err(e.into());
            }
        };
        let mut bucket = HashBucketPage::<K>::load(&bucket_page.read(), self.bucket_capacity);

        let ok = bucket.remove(key, rid);
        if ok {
            bucket.store(&mut bucket_page.write());
        }
        let empty = bucket.is_empty();

        self.buffer_pool.unpin_page(bucket_page_id, ok)?;
        self.buffer_pool.unpin_page(self.directory_page_id, false)?;

        if ok && empty {
            self.merge(key)?;
        }
        Ok(ok)
    }

    /// Fold an empty bucket into its split image, then shrink the directory
    /// while no bucket needs its full width.
    fn merge(&self, key: &K) -> Result<(), HashIndexError> {
        let directory_page = self.buffer_pool.fetch_page(self.directory_page_id)?;
        let mut directory = HashDirectoryPage::load(&directory_page.read());

        let bucket_idx = self.key_to_directory_index(key, &directory);
        let bucket_page_id = directory.bucket_page_id(bucket_idx);
        let local_depth = directory.local_depth(bucket_idx);
        if local_depth == 0 {
            self.buffer_pool.unpin_page(self.directory_page_id, false)?;
            return Ok(());
        }

        let pair_idx = directory.split_image_index(bucket_idx);
        let pair_page_id = directory.bucket_page_id(pair_idx);
        if local_depth != directory.local_depth(pair_idx) {
            self.buffer_pool.unpin_page(self.directory_page_id, false)?;
            return Ok(());
        }

        debug!(
            "merging empty bucket page {} into page {}",
            bucket_page_id, pair_page_id
        );

        for i in 0..directory.size() {
            if directory.bucket_page_id(i) == bucket_page_id {
                directory.set_bucket_page_id(i, pair_page_id);
                directory.decr_local_depth(i);
            } else if directory.bucket_page_id(i) == pair_page_id {
                directory.decr_local_depth(i);
            }
        }

        while directory.can_shrink() {
            directory.decr_global_depth();
        }

        directory.store(&mut directory_page.write());
        self.buffer_pool.unpin_page(self.directory_page_id, true)?;
        self.buffer_pool.delete_page(bucket_page_id)?;
        Ok(())
    }

    /// Current directory address width.
    pub fn global_depth(&self) -> Result<u32, HashIndexError> {
        let _guard = self.table_latch.read();
        let directory_page = self.buffer_pool.fetch_page(self.directory_page_id)?;
        let depth = HashDirectoryPage::load(&directory_page.read()).global_depth();
        self.buffer_pool.unpin_page(self.directory_page_id, false)?;
        Ok(depth)
    }

    /// Check the directory's structural invariants.
    pub fn verify_integrity(&self) -> Result<(), HashIndexError> {
        let _guard = self.table_latch.read();
        let directory_page = self.buffer_pool.fetch_page(self.directory_page_id)?;
        let directory = HashDirectoryPage::load(&directory_page.read());
        self.buffer_pool.unpin_page(self.directory_page_id, false)?;
        directory
            .verify_integrity()
            .map_err(HashIndexError::CorruptDirectory)
    }
}
