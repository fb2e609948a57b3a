use thiserror::Error;

use crate::storage::buffer::BufferPoolError;

#[derive(Error, Debug)]
pub enum HashIndexError {
    #[error("Key does not fit in {0} bytes")]
    KeyTooLarge(usize),

    #[error("Cannot build an index key from a NULL value")]
    NullKey,

    #[error("Directory invariant violated: {0}")]
    CorruptDirectory(String),

    #[error("Buffer pool error: {0}")]
    BufferPool(#[from] BufferPoolError),
}
