// Buffer pool: a fixed set of frames caching disk pages.
//
// A page is pinned while any caller holds it. The replacer only ever tracks
// frames whose pin count has reached zero, so victim selection cannot evict
// a page in use. Lock order is page table before frame; no page table guard
// is held across a frame lock.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;
use log::debug;
use parking_lot::{Mutex, RwLock};

use crate::common::types::{Frame, FrameId, FramePtr, Page, PageId, PagePtr};
use crate::storage::buffer::error::BufferPoolError;
use crate::storage::buffer::replacer::LruReplacer;
use crate::storage::disk::DiskManager;

const INVALID_PAGE_ID: PageId = 0;

pub struct BufferPoolManager {
    frames: Vec<FramePtr>,
    page_table: RwLock<HashMap<PageId, FrameId>>,
    free_frames: Mutex<VecDeque<FrameId>>,
    replacer: LruReplacer,
    disk: Arc<DiskManager>,
}

impl BufferPoolManager {
    pub fn new(pool_size: usize, db_path: impl AsRef<Path>) -> Result<Self, BufferPoolError> {
        let disk = Arc::new(DiskManager::new(db_path)?);
        let frames = (0..pool_size)
            .map(|i| {
                let page = Arc::new(RwLock::new(Page::new(INVALID_PAGE_ID)));
                Arc::new(RwLock::new(Frame::new(i as FrameId, page)))
            })
            .collect();
        let free_frames: VecDeque<FrameId> = (0..pool_size as FrameId).collect();

        Ok(Self {
            frames,
            page_table: RwLock::new(HashMap::new()),
            free_frames: Mutex::new(free_frames),
            replacer: LruReplacer::new(pool_size),
            disk,
        })
    }

    pub fn pool_size(&self) -> usize {
        self.frames.len()
    }

    /// Pin a page, reading it in from disk on a miss. Every fetch must be
    /// paired with an `unpin_page`.
    pub fn fetch_page(&self, page_id: PageId) -> Result<PagePtr, BufferPoolError> {
        if page_id == INVALID_PAGE_ID {
            return Err(BufferPoolError::InvalidOperation(
                "fetch of the invalid page id".to_string(),
            ));
        }

        let hit = { self.page_table.read().get(&page_id).copied() };
        if let Some(frame_id) = hit {
            return Ok(self.pin_resident(frame_id));
        }

        let frame_id = self.take_frame()?;
        let frame = &self.frames[frame_id as usize];
        {
            let mut frame_guard = frame.write();
            {
                let mut page_guard = frame_guard.page.write();
                self.disk.read_page(page_id, &mut page_guard)?;
            }
            frame_guard.pin_count = 1;
            frame_guard.is_dirty = false;
        }

        self.page_table.write().insert(page_id, frame_id);
        self.replacer.pin(frame_id);
        Ok(frame.read().page.clone())
    }

    /// Allocate a fresh zeroed page and pin it.
    pub fn new_page(&self) -> Result<(PagePtr, PageId), BufferPoolError> {
        let page_id = self.disk.allocate_page()?;
        let frame_id = self.take_frame()?;
        let frame = &self.frames[frame_id as usize];
        {
            let mut frame_guard = frame.write();
            *frame_guard.page.write() = Page::new(page_id);
            frame_guard.pin_count = 1;
            frame_guard.is_dirty = true;
        }

        self.page_table.write().insert(page_id, frame_id);
        self.replacer.pin(frame_id);
        Ok((frame.read().page.clone(), page_id))
    }

    /// Drop one pin, recording whether the caller mutated the page. At pin
    /// count zero the frame becomes an eviction candidate.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> Result<(), BufferPoolError> {
        let frame_id = self.frame_of(page_id)?;
        let frame = &self.frames[frame_id as usize];

        let now_unused = {
            let mut frame_guard = frame.write();
            if frame_guard.pin_count > 0 {
                frame_guard.pin_count -= 1;
            }
            frame_guard.is_dirty |= is_dirty;
            frame_guard.pin_count == 0
        };
        if now_unused {
            self.replacer.unpin(frame_id);
        }
        Ok(())
    }

    /// Write a page out if it is dirty.
    pub fn flush_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        let frame_id = self.frame_of(page_id)?;
        let frame = &self.frames[frame_id as usize];

        let snapshot = {
            let frame_guard = frame.read();
            if frame_guard.is_dirty {
                Some(frame_guard.page.read().clone())
            } else {
                None
            }
        };
        if let Some(page) = snapshot {
            self.disk.write_page(&page)?;
            frame.write().is_dirty = false;
        }
        Ok(())
    }

    /// Write out every dirty page in the pool.
    pub fn flush_all_pages(&self) -> Result<(), BufferPoolError> {
        let page_ids: Vec<PageId> = self.page_table.read().keys().copied().collect();
        for page_id in page_ids {
            self.flush_page(page_id)?;
        }
        Ok(())
    }

    /// Drop a page from the pool and recycle its frame. A pinned page
    /// cannot be deleted.
    pub fn delete_page(&self, page_id: PageId) -> Result<(), BufferPoolError> {
        if page_id == INVALID_PAGE_ID {
            return Err(BufferPoolError::InvalidOperation(
                "delete of the invalid page id".to_string(),
            ));
        }

        let removed = { self.page_table.write().remove(&page_id) };
        let Some(frame_id) = removed else {
            return Ok(());
        };

        let frame = &self.frames[frame_id as usize];
        {
            let mut frame_guard = frame.write();
            if frame_guard.pin_count > 0 {
                self.page_table.write().insert(page_id, frame_id);
                return Err(BufferPoolError::PagePinned(page_id));
            }
            *frame_guard.page.write() = Page::new(INVALID_PAGE_ID);
            frame_guard.is_dirty = false;
        }

        self.replacer.pin(frame_id);
        self.free_frames.lock().push_back(frame_id);
        Ok(())
    }

    /// Bump the pin count of a resident frame and take it out of the
    /// replacer's candidate set.
    fn pin_resident(&self, frame_id: FrameId) -> PagePtr {
        let frame = &self.frames[frame_id as usize];
        let page = {
            let mut frame_guard = frame.write();
            frame_guard.pin_count += 1;
            frame_guard.page.clone()
        };
        self.replacer.pin(frame_id);
        page
    }

    /// Resolve a page to the frame currently holding it.
    fn frame_of(&self, page_id: PageId) -> Result<FrameId, BufferPoolError> {
        if page_id == INVALID_PAGE_ID {
            return Err(BufferPoolError::InvalidOperation(
                "invalid page id".to_string(),
            ));
        }
        self.page_table
            .read()
            .get(&page_id)
            .copied()
            .ok_or(BufferPoolError::PageNotFound(page_id))
    }

    /// Hand out a frame: free list first, then the replacer's victim. A
    /// dirty victim is written back before its frame is reused.
    fn take_frame(&self) -> Result<FrameId, BufferPoolError> {
        if let Some(frame_id) = self.free_frames.lock().pop_front() {
            return Ok(frame_id);
        }

        let Some(frame_id) = self.replacer.victim() else {
            // Every frame is pinned
            return Err(BufferPoolError::BufferPoolFull);
        };

        let frame = &self.frames[frame_id as usize];
        let (evicted_id, write_back) = {
            let frame_guard = frame.read();
            let page_guard = frame_guard.page.read();
            let snapshot = if frame_guard.is_dirty && page_guard.page_id != INVALID_PAGE_ID {
                Some(page_guard.clone())
            } else {
                None
            };
            (page_guard.page_id, snapshot)
        };

        if let Some(page) = write_back {
            self.disk.write_page(&page)?;
        }
        if evicted_id != INVALID_PAGE_ID {
            debug!("evicted page {} from frame {}", evicted_id, frame_id);
            self.page_table.write().remove(&evicted_id);
        }
        Ok(frame_id)
    }
}
