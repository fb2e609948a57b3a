// Table heap: a chain of slotted pages holding one table's tuples.
//
// Mutators take the acting transaction so a heap never applies regular
// writes for an aborted one; undo entry points (rollback_delete,
// apply_delete, revert_update) bypass that check and are reserved for the
// transaction manager.

use std::sync::Arc;

use crate::common::rid::Rid;
use crate::common::types::{PageId, PAGE_SIZE};
use crate::storage::buffer::BufferPoolManager;
use crate::storage::table::error::TableError;
use crate::storage::table::table_page::{TablePage, HEADER_SIZE, SLOT_SIZE};
use crate::storage::table::tuple::Tuple;
use crate::transaction::transaction::{Transaction, TransactionState};

pub struct TableHeap {
    buffer_pool: Arc<BufferPoolManager>,
    first_page_id: PageId,
}

impl TableHeap {
    /// Create a heap with one empty page.
    pub fn new(buffer_pool: Arc<BufferPoolManager>) -> Result<Self, TableError> {
        let (page, page_id) = buffer_pool.new_page()?;
        {
            let mut page_guard = page.write();
            TablePage::init(&mut page_guard);
        }
        buffer_pool.unpin_page(page_id, true)?;

        Ok(Self {
            buffer_pool,
            first_page_id: page_id,
        })
    }

    pub fn first_page_id(&self) -> PageId {
        self.first_page_id
    }

    /// Insert a tuple at the first page in the chain with room, growing the
    /// chain when every page is full.
    pub fn insert_tuple(&self, tuple: &Tuple, txn: &Transaction) -> Result<Rid, TableError> {
        if txn.state() == TransactionState::Aborted {
            return Err(TableError::TxnAborted(txn.id()));
        }

        let bytes = tuple.to_bytes()?;
        if bytes.len() + SLOT_SIZE + HEADER_SIZE > PAGE_SIZE {
            return Err(TableError::TupleTooLarge(bytes.len()));
        }

        let mut page_id = self.first_page_id;
        loop {
            let page = self.buffer_pool.fetch_page(page_id)?;

            let inserted = {
                let mut page_guard = page.write();
                match TablePage::insert_tuple(&mut page_guard, &bytes) {
                    Ok(slot) => Some(slot),
                    Err(TableError::InsufficientSpace) => None,
                    Err(e) => {
                        drop(page_guard);
                        self.buffer_pool.unpin_page(page_id, false)?;
                        return Err(e);
                    }
                }
            };

            if let Some(slot) = inserted {
                self.buffer_pool.unpin_page(page_id, true)?;
                return Ok(Rid::new(page_id, slot));
            }

            let next = {
                let page_guard = page.read();
                TablePage::next_page_id(&page_guard)
            };

            match next {
                Some(next_page_id) => {
                    self.buffer_pool.unpin_page(page_id, false)?;
                    page_id = next_page_id;
                }
                None => {
                    // Tail is full: grow the chain by one page
                    let (new_page, new_page_id) = self.buffer_pool.new_page()?;
                    let slot = {
                        let mut new_guard = new_page.write();
                        TablePage::init(&mut new_guard);
                        TablePage::set_prev_page_id(&mut new_guard, Some(page_id));
                        TablePage::insert_tuple(&mut new_guard, &bytes)?
                    };
                    {
                        let mut page_guard = page.write();
                        TablePage::set_next_page_id(&mut page_guard, Some(new_page_id));
                    }
                    self.buffer_pool.unpin_page(page_id, true)?;
                    self.buffer_pool.unpin_page(new_page_id, true)?;

                    return Ok(Rid::new(new_page_id, slot));
                }
            }
        }
    }

    /// Tombstone a tuple; the physical delete is applied at commit. Returns
    /// false when the tuple is missing, already tombstoned, or the
    /// transaction is aborted.
    pub fn mark_delete(&self, rid: Rid, txn: &Transaction) -> Result<bool, TableError> {
        if txn.state() == TransactionState::Aborted {
            return Ok(false);
        }

        let page = self.buffer_pool.fetch_page(rid.page_id)?;

        let live = {
            let page_guard = page.read();
            match TablePage::get_tuple(&page_guard, rid.slot) {
                Ok(found) => found.is_some(),
                Err(e) => {
                    drop(page_guard);
                    self.buffer_pool.unpin_page(rid.page_id, false)?;
                    return Err(e);
                }
            }
        };
        if !live {
            self.buffer_pool.unpin_page(rid.page_id, false)?;
            return Ok(false);
        }

        {
            let mut page_guard = page.write();
            TablePage::mark_delete(&mut page_guard, rid.slot)?;
        }
        self.buffer_pool.unpin_page(rid.page_id, true)?;
        Ok(true)
    }

    /// Overwrite a tuple in place. Returns false when the new payload does
    /// not fit in the page, in which case the caller falls back to
    /// delete-and-reinsert.
    pub fn update_tuple(
        &self,
        new_tuple: &Tuple,
        rid: Rid,
        txn: &Transaction,
    ) -> Result<bool, TableError> {
        if txn.state() == TransactionState::Aborted {
            return Ok(false);
        }

        let bytes = new_tuple.to_bytes()?;
        let page = self.buffer_pool.fetch_page(rid.page_id)?;

        let live = {
            let page_guard = page.read();
            match TablePage::get_tuple(&page_guard, rid.slot) {
                Ok(found) => found.is_some(),
                Err(e) => {
                    drop(page_guard);
                    self.buffer_pool.unpin_page(rid.page_id, false)?;
                    return Err(e);
                }
            }
        };
        if !live {
            self.buffer_pool.unpin_page(rid.page_id, false)?;
            return Ok(false);
        }

        let ok = {
            let mut page_guard = page.write();
            TablePage::update_tuple(&mut page_guard, rid.slot, &bytes)?
        };
        self.buffer_pool.unpin_page(rid.page_id, ok)?;
        Ok(ok)
    }

    /// Read a tuple; `None` when tombstoned or physically deleted.
    pub fn get_tuple(&self, rid: Rid) -> Result<Option<Tuple>, TableError> {
        let page = self.buffer_pool.fetch_page(rid.page_id)?;
        let bytes = {
            let page_guard = page.read();
            TablePage::get_tuple(&page_guard, rid.slot)
        };
        self.buffer_pool.unpin_page(rid.page_id, false)?;

        match bytes? {
            Some(bytes) => Ok(Some(Tuple::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Clear a tombstone (abort path).
    pub fn rollback_delete(&self, rid: Rid) -> Result<(), TableError> {
        let page = self.buffer_pool.fetch_page(rid.page_id)?;
        let result = {
            let mut page_guard = page.write();
            TablePage::rollback_delete(&mut page_guard, rid.slot)
        };
        self.buffer_pool.unpin_page(rid.page_id, result.is_ok())?;
        result
    }

    /// Physically vacate a slot (commit path for tombstones, abort path for
    /// inserts).
    pub fn apply_delete(&self, rid: Rid) -> Result<(), TableError> {
        let page = self.buffer_pool.fetch_page(rid.page_id)?;
        let result = {
            let mut page_guard = page.write();
            TablePage::apply_delete(&mut page_guard, rid.slot)
        };
        self.buffer_pool.unpin_page(rid.page_id, result.is_ok())?;
        result
    }

    /// Restore a tuple's previous payload (abort path).
    pub fn revert_update(&self, old_tuple: &Tuple, rid: Rid) -> Result<(), TableError> {
        let bytes = old_tuple.to_bytes()?;
        let page = self.buffer_pool.fetch_page(rid.page_id)?;
        let ok = {
            let mut page_guard = page.write();
            TablePage::update_tuple(&mut page_guard, rid.slot, &bytes)?
        };
        self.buffer_pool.unpin_page(rid.page_id, ok)?;
        if !ok {
            return Err(TableError::InsufficientSpace);
        }
        Ok(())
    }

    /// Rid of the first live tuple in the chain.
    pub fn first_tuple_rid(&self) -> Result<Option<Rid>, TableError> {
        let mut page_id = Some(self.first_page_id);
        while let Some(pid) = page_id {
            let page = self.buffer_pool.fetch_page(pid)?;
            let (slot, next) = {
                let page_guard = page.read();
                (
                    TablePage::first_tuple_slot(&page_guard),
                    TablePage::next_page_id(&page_guard),
                )
            };
            self.buffer_pool.unpin_page(pid, false)?;

            if let Some(slot) = slot {
                return Ok(Some(Rid::new(pid, slot)));
            }
            page_id = next;
        }
        Ok(None)
    }

    /// Rid of the next live tuple after `rid`, hopping pages as needed.
    pub fn next_tuple_rid(&self, rid: Rid) -> Result<Option<Rid>, TableError> {
        let page = self.buffer_pool.fetch_page(rid.page_id)?;
        let (slot, mut page_id) = {
            let page_guard = page.read();
            (
                TablePage::next_tuple_slot(&page_guard, rid.slot),
                TablePage::next_page_id(&page_guard),
            )
        };
        self.buffer_pool.unpin_page(rid.page_id, false)?;

        if let Some(slot) = slot {
            return Ok(Some(Rid::new(rid.page_id, slot)));
        }

        while let Some(pid) = page_id {
            let page = self.buffer_pool.fetch_page(pid)?;
            let (slot, next) = {
                let page_guard = page.read();
                (
                    TablePage::first_tuple_slot(&page_guard),
                    TablePage::next_page_id(&page_guard),
                )
            };
            self.buffer_pool.unpin_page(pid, false)?;

            if let Some(slot) = slot {
                return Ok(Some(Rid::new(pid, slot)));
            }
            page_id = next;
        }
        Ok(None)
    }

    /// Successor page in the chain.
    pub fn next_page_id(&self, page_id: PageId) -> Result<Option<PageId>, TableError> {
        let page = self.buffer_pool.fetch_page(page_id)?;
        let next = {
            let page_guard = page.read();
            TablePage::next_page_id(&page_guard)
        };
        self.buffer_pool.unpin_page(page_id, false)?;
        Ok(next)
    }
}
