pub mod bucket_page;
pub mod directory_page;
pub mod error;
pub mod extendible;
pub mod index;
pub mod key;

pub use error::HashIndexError;
pub use extendible::ExtendibleHashIndex;
pub use index::HashTableIndex;
pub use key::{default_hash, GenericKey, HashKey, KeyHashFn};
