use thiserror::Error;

use crate::catalog::TableOid;
use crate::common::types::TxnId;
use crate::index::hash::HashIndexError;
use crate::storage::buffer::BufferPoolError;
use crate::storage::table::error::TableError;

/// Represents query execution error
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Table {0} not found")]
    TableNotFound(TableOid),

    #[error("Column {0} not found")]
    ColumnNotFound(usize),

    #[error("Type error: {0}")]
    TypeError(String),

    #[error("Transaction {0} aborted")]
    TransactionAborted(TxnId),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Storage error: {0}")]
    Storage(#[from] TableError),

    #[error("Buffer pool error: {0}")]
    BufferPool(#[from] BufferPoolError),

    #[error("Index error: {0}")]
    Index(#[from] HashIndexError),
}

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;
