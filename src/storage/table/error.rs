use thiserror::Error;

use crate::common::rid::Rid;
use crate::common::types::{SlotId, TxnId};
use crate::storage::buffer::BufferPoolError;

#[derive(Error, Debug)]
pub enum TableError {
    #[error("Insufficient space in page")]
    InsufficientSpace,

    #[error("Invalid slot {0}")]
    InvalidSlot(SlotId),

    #[error("Tuple not found at {0}")]
    TupleNotFound(Rid),

    #[error("Tuple at {0} is already deleted")]
    AlreadyDeleted(Rid),

    #[error("Tuple of {0} bytes does not fit in a page")]
    TupleTooLarge(usize),

    #[error("Transaction {0} is aborted")]
    TxnAborted(TxnId),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Buffer pool error: {0}")]
    BufferPool(#[from] BufferPoolError),
}
