// Page-granular file I/O. The database is a single file addressed in
// PAGE_SIZE units; page id 0 is reserved as invalid, so page n starts at
// byte (n - 1) * PAGE_SIZE.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use parking_lot::Mutex;
use thiserror::Error;

use crate::common::types::{Page, PageId, PAGE_SIZE};

#[derive(Error, Debug)]
pub enum DiskManagerError {
    #[error("disk I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("page id {0} is not addressable")]
    BadPageId(PageId),
}

/// Owns the database file and hands out page ids. Allocation extends the
/// file, so an allocated page always reads back (as zeros until first
/// written out).
pub struct DiskManager {
    file: Mutex<File>,
    page_count: AtomicU32,
}

impl DiskManager {
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self, DiskManagerError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(db_path)?;
        let page_count = (file.metadata()?.len() / PAGE_SIZE as u64) as u32;

        Ok(Self {
            file: Mutex::new(file),
            page_count: AtomicU32::new(page_count),
        })
    }

    /// Reserve the next page id, growing the file by one zeroed page.
    pub fn allocate_page(&self) -> Result<PageId, DiskManagerError> {
        let file = self.file.lock();
        let page_id = self.page_count.fetch_add(1, Ordering::SeqCst) + 1;
        file.set_len(page_id as u64 * PAGE_SIZE as u64)?;
        Ok(page_id)
    }

    pub fn read_page(&self, page_id: PageId, page: &mut Page) -> Result<(), DiskManagerError> {
        Self::check_addressable(page_id)?;
        page.page_id = page_id;

        // A page id past the end of the file has no bytes yet
        if page_id > self.page_count.load(Ordering::SeqCst) {
            page.data.fill(0);
            return Ok(());
        }

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(Self::offset_of(page_id)))?;
        file.read_exact(&mut page.data)?;
        Ok(())
    }

    pub fn write_page(&self, page: &Page) -> Result<(), DiskManagerError> {
        Self::check_addressable(page.page_id)?;

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(Self::offset_of(page.page_id)))?;
        file.write_all(&page.data)?;
        Ok(())
    }

    fn check_addressable(page_id: PageId) -> Result<(), DiskManagerError> {
        if page_id == 0 {
            return Err(DiskManagerError::BadPageId(page_id));
        }
        Ok(())
    }

    fn offset_of(page_id: PageId) -> u64 {
        (page_id as u64 - 1) * PAGE_SIZE as u64
    }
}
