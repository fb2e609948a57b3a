// Slotted table page layout.
//
// Tuple payloads grow from the front of the page (after the header); the
// slot array grows from the back. A slot with length zero has been
// physically deleted; the tombstone flag marks a logical delete whose
// physical removal is deferred to commit time.

use byteorder::{ByteOrder, LittleEndian};

use crate::common::types::{Page, PageId, SlotId, PAGE_SIZE};
use crate::storage::table::error::TableError;

pub const HEADER_SIZE: usize = 20;
pub const SLOT_SIZE: usize = 12;

const TOMBSTONE_FLAG: u32 = 1;
const NO_PAGE: u32 = u32::MAX;

#[derive(Debug, Clone, Copy)]
pub struct TablePageHeader {
    pub free_space_offset: u32,
    pub free_space_size: u32,
    pub tuple_count: u32,
    pub next_page_id: Option<PageId>,
    pub prev_page_id: Option<PageId>,
}

impl Default for TablePageHeader {
    fn default() -> Self {
        Self::new()
    }
}

impl TablePageHeader {
    pub fn new() -> Self {
        Self {
            free_space_offset: HEADER_SIZE as u32,
            free_space_size: (PAGE_SIZE - HEADER_SIZE) as u32,
            tuple_count: 0,
            next_page_id: None,
            prev_page_id: None,
        }
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];

        LittleEndian::write_u32(&mut bytes[0..4], self.free_space_offset);
        LittleEndian::write_u32(&mut bytes[4..8], self.free_space_size);
        LittleEndian::write_u32(&mut bytes[8..12], self.tuple_count);
        LittleEndian::write_u32(&mut bytes[12..16], self.next_page_id.unwrap_or(NO_PAGE));
        LittleEndian::write_u32(&mut bytes[16..20], self.prev_page_id.unwrap_or(NO_PAGE));

        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        let free_space_offset = LittleEndian::read_u32(&bytes[0..4]);
        let free_space_size = LittleEndian::read_u32(&bytes[4..8]);
        let tuple_count = LittleEndian::read_u32(&bytes[8..12]);

        let next = LittleEndian::read_u32(&bytes[12..16]);
        let next_page_id = if next == NO_PAGE { None } else { Some(next) };

        let prev = LittleEndian::read_u32(&bytes[16..20]);
        let prev_page_id = if prev == NO_PAGE { None } else { Some(prev) };

        Self {
            free_space_offset,
            free_space_size,
            tuple_count,
            next_page_id,
            prev_page_id,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct TupleSlot {
    offset: u32,
    length: u32,
    flags: u32,
}

impl TupleSlot {
    fn to_bytes(self) -> [u8; SLOT_SIZE] {
        let mut bytes = [0u8; SLOT_SIZE];
        LittleEndian::write_u32(&mut bytes[0..4], self.offset);
        LittleEndian::write_u32(&mut bytes[4..8], self.length);
        LittleEndian::write_u32(&mut bytes[8..12], self.flags);
        bytes
    }

    fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            offset: LittleEndian::read_u32(&bytes[0..4]),
            length: LittleEndian::read_u32(&bytes[4..8]),
            flags: LittleEndian::read_u32(&bytes[8..12]),
        }
    }

    fn is_vacant(&self) -> bool {
        self.length == 0
    }

    fn is_tombstoned(&self) -> bool {
        self.flags & TOMBSTONE_FLAG != 0
    }
}

/// Stateless accessor over the slotted page bytes.
pub struct TablePage;

impl TablePage {
    pub fn init(page: &mut Page) {
        let header = TablePageHeader::new();
        page.data[0..HEADER_SIZE].copy_from_slice(&header.to_bytes());
    }

    pub fn header(page: &Page) -> TablePageHeader {
        TablePageHeader::from_bytes(&page.data[0..HEADER_SIZE])
    }

    pub fn set_header(page: &mut Page, header: &TablePageHeader) {
        page.data[0..HEADER_SIZE].copy_from_slice(&header.to_bytes());
    }

    pub fn next_page_id(page: &Page) -> Option<PageId> {
        Self::header(page).next_page_id
    }

    pub fn set_next_page_id(page: &mut Page, next: Option<PageId>) {
        let mut header = Self::header(page);
        header.next_page_id = next;
        Self::set_header(page, &header);
    }

    pub fn set_prev_page_id(page: &mut Page, prev: Option<PageId>) {
        let mut header = Self::header(page);
        header.prev_page_id = prev;
        Self::set_header(page, &header);
    }

    pub fn tuple_count(page: &Page) -> u32 {
        Self::header(page).tuple_count
    }

    /// Append a tuple, returning its slot number.
    pub fn insert_tuple(page: &mut Page, data: &[u8]) -> Result<SlotId, TableError> {
        let mut header = Self::header(page);

        let tuple_size = data.len() as u32;
        let total_space_needed = tuple_size + SLOT_SIZE as u32;

        if header.free_space_size < total_space_needed {
            return Err(TableError::InsufficientSpace);
        }

        let slot_pos = Self::slot_position(header.tuple_count);

        let slot = TupleSlot {
            offset: header.free_space_offset,
            length: tuple_size,
            flags: 0,
        };

        let data_end = header.free_space_offset as usize + data.len();
        page.data[header.free_space_offset as usize..data_end].copy_from_slice(data);
        page.data[slot_pos..slot_pos + SLOT_SIZE].copy_from_slice(&slot.to_bytes());

        header.free_space_offset += tuple_size;
        header.free_space_size -= total_space_needed;
        header.tuple_count += 1;
        Self::set_header(page, &header);

        Ok(header.tuple_count - 1)
    }

    /// Read a tuple's payload. `None` for tombstoned or vacated slots.
    pub fn get_tuple(page: &Page, slot_id: SlotId) -> Result<Option<Vec<u8>>, TableError> {
        let header = Self::header(page);
        if slot_id >= header.tuple_count {
            return Err(TableError::InvalidSlot(slot_id));
        }

        let slot = Self::slot(page, slot_id);
        if slot.is_vacant() || slot.is_tombstoned() {
            return Ok(None);
        }

        let start = slot.offset as usize;
        let end = start + slot.length as usize;
        Ok(Some(page.data[start..end].to_vec()))
    }

    /// Logical delete: flag the slot, leave the payload in place.
    pub fn mark_delete(page: &mut Page, slot_id: SlotId) -> Result<(), TableError> {
        let header = Self::header(page);
        if slot_id >= header.tuple_count {
            return Err(TableError::InvalidSlot(slot_id));
        }

        let mut slot = Self::slot(page, slot_id);
        if slot.is_vacant() {
            return Err(TableError::InvalidSlot(slot_id));
        }
        if slot.is_tombstoned() {
            return Err(TableError::InvalidSlot(slot_id));
        }

        slot.flags |= TOMBSTONE_FLAG;
        Self::set_slot(page, slot_id, slot);
        Ok(())
    }

    /// Undo a logical delete.
    pub fn rollback_delete(page: &mut Page, slot_id: SlotId) -> Result<(), TableError> {
        let header = Self::header(page);
        if slot_id >= header.tuple_count {
            return Err(TableError::InvalidSlot(slot_id));
        }

        let mut slot = Self::slot(page, slot_id);
        slot.flags &= !TOMBSTONE_FLAG;
        Self::set_slot(page, slot_id, slot);
        Ok(())
    }

    /// Physical delete: vacate the slot. The payload bytes are reclaimed
    /// lazily; slot numbers of surviving tuples never move.
    pub fn apply_delete(page: &mut Page, slot_id: SlotId) -> Result<(), TableError> {
        let header = Self::header(page);
        if slot_id >= header.tuple_count {
            return Err(TableError::InvalidSlot(slot_id));
        }

        let mut slot = Self::slot(page, slot_id);
        slot.length = 0;
        slot.flags = 0;
        Self::set_slot(page, slot_id, slot);
        Ok(())
    }

    /// Overwrite a tuple in place, relocating within the page when the new
    /// payload is larger. Returns `Ok(false)` when the page has no room.
    pub fn update_tuple(page: &mut Page, slot_id: SlotId, data: &[u8]) -> Result<bool, TableError> {
        let header = Self::header(page);
        if slot_id >= header.tuple_count {
            return Err(TableError::InvalidSlot(slot_id));
        }

        let mut slot = Self::slot(page, slot_id);
        if slot.is_vacant() || slot.is_tombstoned() {
            return Err(TableError::TupleNotFound(crate::common::rid::Rid::new(
                page.page_id,
                slot_id,
            )));
        }

        let new_size = data.len() as u32;

        if new_size > slot.length {
            // Relocate to the free space region
            let space_needed = new_size;
            let mut header = header;
            if header.free_space_size < space_needed {
                return Ok(false);
            }

            let new_offset = header.free_space_offset;
            let new_end = new_offset as usize + data.len();
            page.data[new_offset as usize..new_end].copy_from_slice(data);

            slot.offset = new_offset;
            slot.length = new_size;
            Self::set_slot(page, slot_id, slot);

            header.free_space_offset += new_size;
            header.free_space_size -= space_needed;
            Self::set_header(page, &header);

            return Ok(true);
        }

        page.data[slot.offset as usize..slot.offset as usize + data.len()].copy_from_slice(data);

        if new_size < slot.length {
            slot.length = new_size;
            Self::set_slot(page, slot_id, slot);
        }

        Ok(true)
    }

    /// First live (non-tombstoned) slot on the page.
    pub fn first_tuple_slot(page: &Page) -> Option<SlotId> {
        let count = Self::header(page).tuple_count;
        (0..count).find(|&slot_id| {
            let slot = Self::slot(page, slot_id);
            !slot.is_vacant() && !slot.is_tombstoned()
        })
    }

    /// Next live slot after the given one.
    pub fn next_tuple_slot(page: &Page, after: SlotId) -> Option<SlotId> {
        let count = Self::header(page).tuple_count;
        (after + 1..count).find(|&slot_id| {
            let slot = Self::slot(page, slot_id);
            !slot.is_vacant() && !slot.is_tombstoned()
        })
    }

    fn slot_position(slot_id: SlotId) -> usize {
        PAGE_SIZE - SLOT_SIZE * (slot_id as usize + 1)
    }

    fn slot(page: &Page, slot_id: SlotId) -> TupleSlot {
        let pos = Self::slot_position(slot_id);
        TupleSlot::from_bytes(&page.data[pos..pos + SLOT_SIZE])
    }

    fn set_slot(page: &mut Page, slot_id: SlotId, slot: TupleSlot) {
        let pos = Self::slot_position(slot_id);
        page.data[pos..pos + SLOT_SIZE].copy_from_slice(&slot.to_bytes());
    }
}
