// Extendible hash directory page.
//
// Persisted layout, little-endian, packed in page order:
//   page_id: u32
//   global_depth: u32
//   local_depths: u8[DIRECTORY_ARRAY_SIZE]
//   bucket_page_ids: u32[DIRECTORY_ARRAY_SIZE]

use byteorder::{ByteOrder, LittleEndian};

use crate::common::types::{Page, PageId};

/// Upper bound on the directory's address width.
pub const MAX_GLOBAL_DEPTH: u32 = 9;

/// Number of directory slots the page reserves space for.
pub const DIRECTORY_ARRAY_SIZE: usize = 1 << MAX_GLOBAL_DEPTH;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashDirectoryPage {
    page_id: PageId,
    global_depth: u32,
    local_depths: [u8; DIRECTORY_ARRAY_SIZE],
    bucket_page_ids: [PageId; DIRECTORY_ARRAY_SIZE],
}

impl HashDirectoryPage {
    pub fn new(page_id: PageId) -> Self {
        Self {
            page_id,
            global_depth: 0,
            local_depths: [0; DIRECTORY_ARRAY_SIZE],
            bucket_page_ids: [0; DIRECTORY_ARRAY_SIZE],
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn global_depth(&self) -> u32 {
        self.global_depth
    }

    /// Number of live directory slots.
    pub fn size(&self) -> usize {
        1 << self.global_depth
    }

    /// Mask selecting the directory index from a hash.
    pub fn global_depth_mask(&self) -> u32 {
        (1u32 << self.global_depth) - 1
    }

    pub fn local_depth(&self, idx: usize) -> u32 {
        self.local_depths[idx] as u32
    }

    /// Mask of the address bits bucket `idx` actually distinguishes.
    pub fn local_depth_mask(&self, idx: usize) -> u32 {
        (1u32 << self.local_depths[idx]) - 1
    }

    pub fn set_local_depth(&mut self, idx: usize, depth: u32) {
        self.local_depths[idx] = depth as u8;
    }

    pub fn incr_local_depth(&mut self, idx: usize) {
        self.local_depths[idx] += 1;
    }

    pub fn decr_local_depth(&mut self, idx: usize) {
        self.local_depths[idx] -= 1;
    }

    pub fn bucket_page_id(&self, idx: usize) -> PageId {
        self.bucket_page_ids[idx]
    }

    pub fn set_bucket_page_id(&mut self, idx: usize, page_id: PageId) {
        self.bucket_page_ids[idx] = page_id;
    }

    /// Index of the bucket this one split from (or would merge back into).
    pub fn split_image_index(&self, idx: usize) -> usize {
        let depth = self.local_depths[idx] as u32;
        idx ^ (1 << (depth - 1))
    }

    pub fn incr_global_depth(&mut self) {
        self.global_depth += 1;
    }

    pub fn decr_global_depth(&mut self) {
        self.global_depth -= 1;
    }

    /// The directory may halve whenever no bucket uses its full address
    /// width.
    pub fn can_shrink(&self) -> bool {
        (0..self.size()).all(|i| (self.local_depths[i] as u32) < self.global_depth)
    }

    /// Check the structural invariants; returns the first violation found.
    pub fn verify_integrity(&self) -> Result<(), String> {
        for i in 0..self.size() {
            let local = self.local_depths[i] as u32;
            if local > self.global_depth {
                return Err(format!(
                    "slot {}: local depth {} exceeds global depth {}",
                    i, local, self.global_depth
                ));
            }
            if local < self.global_depth {
                let image = i ^ (1 << (self.global_depth - 1));
                if self.bucket_page_ids[i] != self.bucket_page_ids[image] {
                    return Err(format!(
                        "slot {}: shallow bucket not mirrored at slot {}",
                        i, image
                    ));
                }
            }
            // Every slot referencing this bucket must agree on depth
            let page_id = self.bucket_page_ids[i];
            let count = (0..self.size())
                .filter(|&j| self.bucket_page_ids[j] == page_id)
                .count();
            if count != 1 << (self.global_depth - local) {
                return Err(format!(
                    "bucket {} referenced by {} slots, expected {}",
                    page_id,
                    count,
                    1 << (self.global_depth - local)
                ));
            }
        }
        Ok(())
    }

    pub fn load(page: &Page) -> Self {
        let data = &page.data;
        let page_id = LittleEndian::read_u32(&data[0..4]);
        let global_depth = LittleEndian::read_u32(&data[4..8]);

        let mut local_depths = [0u8; DIRECTORY_ARRAY_SIZE];
        local_depths.copy_from_slice(&data[8..8 + DIRECTORY_ARRAY_SIZE]);

        let mut bucket_page_ids = [0u32; DIRECTORY_ARRAY_SIZE];
        let base = 8 + DIRECTORY_ARRAY_SIZE;
        for (i, id) in bucket_page_ids.iter_mut().enumerate() {
            *id = LittleEndian::read_u32(&data[base + i * 4..base + i * 4 + 4]);
        }

        Self {
            page_id,
            global_depth,
            local_depths,
            bucket_page_ids,
        }
    }

    pub fn store(&self, page: &mut Page) {
        let data = &mut page.data;
        LittleEndian::write_u32(&mut data[0..4], self.page_id);
        LittleEndian::write_u32(&mut data[4..8], self.global_depth);

        data[8..8 + DIRECTORY_ARRAY_SIZE].copy_from_slice(&self.local_depths);

        let base = 8 + DIRECTORY_ARRAY_SIZE;
        for (i, &id) in self.bucket_page_ids.iter().enumerate() {
            LittleEndian::write_u32(&mut data[base + i * 4..base + i * 4 + 4], id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialization_round_trip() {
        let mut dir = HashDirectoryPage::new(3);
        dir.incr_global_depth();
        dir.incr_global_depth();
        dir.set_bucket_page_id(0, 10);
        dir.set_bucket_page_id(1, 11);
        dir.set_bucket_page_id(2, 12);
        dir.set_bucket_page_id(3, 11);
        dir.set_local_depth(0, 2);
        dir.set_local_depth(1, 1);
        dir.set_local_depth(2, 2);
        dir.set_local_depth(3, 1);

        let mut page = Page::new(3);
        dir.store(&mut page);
        let loaded = HashDirectoryPage::load(&page);
        assert_eq!(loaded, dir);
    }

    #[test]
    fn test_masks_and_split_image() {
        let mut dir = HashDirectoryPage::new(1);
        assert_eq!(dir.size(), 1);
        assert_eq!(dir.global_depth_mask(), 0);

        dir.incr_global_depth();
        dir.incr_global_depth();
        assert_eq!(dir.size(), 4);
        assert_eq!(dir.global_depth_mask(), 0b11);

        dir.set_local_depth(2, 2);
        assert_eq!(dir.local_depth_mask(2), 0b11);
        assert_eq!(dir.split_image_index(2), 0);

        dir.set_local_depth(1, 1);
        assert_eq!(dir.split_image_index(1), 0);
    }

    #[test]
    fn test_can_shrink() {
        let mut dir = HashDirectoryPage::new(1);
        dir.incr_global_depth();
        dir.set_local_depth(0, 1);
        dir.set_local_depth(1, 1);
        assert!(!dir.can_shrink());

        dir.set_local_depth(0, 0);
        dir.set_local_depth(1, 0);
        assert!(dir.can_shrink());

        dir.decr_global_depth();
        // With a single slot at depth zero the directory is at its floor
        assert!(!dir.can_shrink());
    }

    #[test]
    fn test_verify_integrity() {
        let mut dir = HashDirectoryPage::new(1);
        dir.set_bucket_page_id(0, 7);
        assert!(dir.verify_integrity().is_ok());

        dir.incr_global_depth();
        dir.set_bucket_page_id(1, 7);
        assert!(dir.verify_integrity().is_ok());

        // A shallow bucket must be mirrored across its image slots
        dir.set_bucket_page_id(1, 8);
        assert!(dir.verify_integrity().is_err());

        dir.set_local_depth(0, 1);
        dir.set_local_depth(1, 1);
        assert!(dir.verify_integrity().is_ok());
    }
}
