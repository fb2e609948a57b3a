pub mod error;
pub mod table_heap;
pub mod table_page;
pub mod tuple;

pub use error::TableError;
pub use table_heap::TableHeap;
pub use tuple::{Tuple, Value};
