// Export public modules
pub mod catalog;
pub mod common;
pub mod index;
pub mod query;
pub mod storage;
pub mod transaction;

// Re-export key items for convenient access
pub use storage::buffer::BufferPoolManager;
pub use storage::buffer::BufferPoolError;
pub use storage::buffer::LruReplacer;
pub use storage::table::TableHeap;
pub use transaction::LockManager;
pub use transaction::TransactionManager;
pub use index::hash::ExtendibleHashIndex;
