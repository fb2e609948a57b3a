// Extendible hash bucket page.
//
// Persisted layout, in page order:
//   occupied bitmap: one bit per slot, set once a slot has ever held a pair
//   readable bitmap: one bit per slot, set while the pair is live
//   entries: (key, rid) pairs at the key's fixed width plus 8 rid bytes
//
// The occupied bit outlives removal so scans can stop at the first slot
// that was never written.

use byteorder::{ByteOrder, LittleEndian};

use crate::common::rid::Rid;
use crate::common::types::{Page, PAGE_SIZE};
use crate::index::hash::key::HashKey;

const RID_ENCODED_SIZE: usize = 8;

/// Pairs per bucket: each entry costs its payload plus two metadata bits.
pub const fn bucket_array_size<K: HashKey>() -> usize {
    (4 * PAGE_SIZE) / (4 * (K::ENCODED_SIZE + RID_ENCODED_SIZE) + 1)
}

#[derive(Debug, Clone)]
pub struct HashBucketPage<K: HashKey> {
    capacity: usize,
    occupied: Vec<bool>,
    readable: Vec<bool>,
    entries: Vec<Option<(K, Rid)>>,
}

impl<K: HashKey> HashBucketPage<K> {
    pub fn new() -> Self {
        Self::with_capacity(bucket_array_size::<K>())
    }

    /// A reduced capacity keeps split and merge tests tractable; pages
    /// written with one capacity must always be read with the same one.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            occupied: vec![false; capacity],
            readable: vec![false; capacity],
            entries: vec![None; capacity],
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_readable(&self, idx: usize) -> bool {
        self.readable[idx]
    }

    pub fn is_occupied(&self, idx: usize) -> bool {
        self.occupied[idx]
    }

    pub fn entry_at(&self, idx: usize) -> Option<(K, Rid)> {
        if self.readable[idx] {
            self.entries[idx]
        } else {
            None
        }
    }

    pub fn num_readable(&self) -> usize {
        self.readable.iter().filter(|&&r| r).count()
    }

    pub fn is_full(&self) -> bool {
        self.num_readable() == self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.num_readable() == 0
    }

    /// All rids stored under `key`.
    pub fn get_value(&self, key: &K) -> Vec<Rid> {
        let mut result = Vec::new();
        for idx in 0..self.capacity {
            if !self.occupied[idx] {
                break;
            }
            if self.readable[idx] {
                if let Some((k, rid)) = self.entries[idx] {
                    if k == *key {
                        result.push(rid);
                    }
                }
            }
        }
        result
    }

    /// Insert a pair. False when the exact (key, rid) pair already exists or
    /// the bucket is full.
    pub fn insert(&mut self, key: &K, rid: Rid) -> bool {
        let mut free_slot = None;
        for idx in 0..self.capacity {
            if self.readable[idx] {
                if let Some((k, r)) = self.entries[idx] {
                    if k == *key && r == rid {
                        return false;
                    }
                }
            } else if free_slot.is_none() {
                free_slot = Some(idx);
            }
        }

        match free_slot {
            Some(idx) => {
                self.entries[idx] = Some((*key, rid));
                self.occupied[idx] = true;
                self.readable[idx] = true;
                true
            }
            None => false,
        }
    }

    /// Remove the exact (key, rid) pair. False when absent.
    pub fn remove(&mut self, key: &K, rid: Rid) -> bool {
        for idx in 0..self.capacity {
            if !self.occupied[idx] {
                break;
            }
            if self.readable[idx] {
                if let Some((k, r)) = self.entries[idx] {
                    if k == *key && r == rid {
                        self.readable[idx] = false;
                        return true;
                    }
                }
            }
        }
        false
    }

    /// Clear a slot during split redistribution.
    pub fn remove_at(&mut self, idx: usize) {
        self.readable[idx] = false;
    }

    pub fn load(page: &Page, capacity: usize) -> Self {
        let bitmap_len = (capacity + 7) / 8;
        let data = &page.data;

        let mut bucket = Self::with_capacity(capacity);
        for idx in 0..capacity {
            let byte = idx / 8;
            let bit = idx % 8;
            bucket.occupied[idx] = data[byte] & (1 << bit) != 0;
            bucket.readable[idx] = data[bitmap_len + byte] & (1 << bit) != 0;
        }

        let entry_size = K::ENCODED_SIZE + RID_ENCODED_SIZE;
        let base = 2 * bitmap_len;
        for idx in 0..capacity {
            if bucket.occupied[idx] {
                let offset = base + idx * entry_size;
                let key = K::decode(&data[offset..offset + K::ENCODED_SIZE]);
                let rid_offset = offset + K::ENCODED_SIZE;
                let rid = Rid::new(
                    LittleEndian::read_u32(&data[rid_offset..rid_offset + 4]),
                    LittleEndian::read_u32(&data[rid_offset + 4..rid_offset + 8]),
                );
                bucket.entries[idx] = Some((key, rid));
            }
        }

        bucket
    }

    pub fn store(&self, page: &mut Page) {
        let bitmap_len = (self.capacity + 7) / 8;
        let data = &mut page.data;
        data[..2 * bitmap_len].fill(0);

        for idx in 0..self.capacity {
            let byte = idx / 8;
            let bit = idx % 8;
            if self.occupied[idx] {
                data[byte] |= 1 << bit;
            }
            if self.readable[idx] {
                data[bitmap_len + byte] |= 1 << bit;
            }
        }

        let entry_size = K::ENCODED_SIZE + RID_ENCODED_SIZE;
        let base = 2 * bitmap_len;
        for idx in 0..self.capacity {
            let offset = base + idx * entry_size;
            match self.entries[idx] {
                Some((key, rid)) => {
                    key.encode(&mut data[offset..offset + K::ENCODED_SIZE]);
                    let rid_offset = offset + K::ENCODED_SIZE;
                    LittleEndian::write_u32(&mut data[rid_offset..rid_offset + 4], rid.page_id);
                    LittleEndian::write_u32(&mut data[rid_offset + 4..rid_offset + 8], rid.slot);
                }
                None => {
                    data[offset..offset + entry_size].fill(0);
                }
            }
        }
    }
}

impl<K: HashKey> Default for HashBucketPage<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::hash::key::GenericKey;

    type Key = GenericKey<8>;

    #[test]
    fn test_capacity_fits_in_page() {
        // Payload plus the two bitmaps must fit in the page for every
        // supported key width
        fn check<K: HashKey>() {
            let capacity = bucket_array_size::<K>();
            let bitmap_len = (capacity + 7) / 8;
            let used = 2 * bitmap_len + capacity * (K::ENCODED_SIZE + RID_ENCODED_SIZE);
            assert!(used <= PAGE_SIZE, "capacity {} overflows page", capacity);
        }
        check::<GenericKey<4>>();
        check::<GenericKey<8>>();
        check::<GenericKey<16>>();
        check::<GenericKey<32>>();
        check::<GenericKey<64>>();
    }

    #[test]
    fn test_insert_get_remove() {
        let mut bucket = HashBucketPage::<Key>::new();
        let key = Key::from_i64(42);

        assert!(bucket.insert(&key, Rid::new(1, 0)));
        assert!(bucket.insert(&key, Rid::new(1, 1)));
        // Exact duplicate pair is rejected
        assert!(!bucket.insert(&key, Rid::new(1, 0)));

        let mut rids = bucket.get_value(&key);
        rids.sort();
        assert_eq!(rids, vec![Rid::new(1, 0), Rid::new(1, 1)]);

        assert!(bucket.remove(&key, Rid::new(1, 0)));
        assert!(!bucket.remove(&key, Rid::new(1, 0)));
        assert_eq!(bucket.get_value(&key), vec![Rid::new(1, 1)]);
    }

    #[test]
    fn test_full_and_empty() {
        let mut bucket = HashBucketPage::<Key>::with_capacity(3);
        assert!(bucket.is_empty());

        for i in 0..3 {
            assert!(bucket.insert(&Key::from_i64(i), Rid::new(1, i as u32)));
        }
        assert!(bucket.is_full());
        assert!(!bucket.insert(&Key::from_i64(99), Rid::new(2, 0)));

        for i in 0..3 {
            assert!(bucket.remove(&Key::from_i64(i), Rid::new(1, i as u32)));
        }
        assert!(bucket.is_empty());
    }

    #[test]
    fn test_removed_slot_is_reusable() {
        let mut bucket = HashBucketPage::<Key>::with_capacity(2);
        assert!(bucket.insert(&Key::from_i64(1), Rid::new(1, 0)));
        assert!(bucket.insert(&Key::from_i64(2), Rid::new(1, 1)));
        assert!(bucket.remove(&Key::from_i64(1), Rid::new(1, 0)));

        assert!(bucket.insert(&Key::from_i64(3), Rid::new(1, 2)));
        assert_eq!(bucket.get_value(&Key::from_i64(3)), vec![Rid::new(1, 2)]);
    }

    #[test]
    fn test_serialization_round_trip() {
        let mut bucket = HashBucketPage::<Key>::with_capacity(16);
        for i in 0..10 {
            assert!(bucket.insert(&Key::from_i64(i * 7), Rid::new(i as u32, i as u32)));
        }
        // A tombstoned slot survives the round trip as occupied-not-readable
        assert!(bucket.remove(&Key::from_i64(21), Rid::new(3, 3)));

        let mut page = Page::new(5);
        bucket.store(&mut page);
        let loaded = HashBucketPage::<Key>::load(&page, 16);

        assert_eq!(loaded.num_readable(), bucket.num_readable());
        for i in 0..10i64 {
            assert_eq!(
                loaded.get_value(&Key::from_i64(i * 7)),
                bucket.get_value(&Key::from_i64(i * 7))
            );
        }
        assert!(loaded.is_occupied(3));
        assert!(!loaded.is_readable(3));
    }
}
