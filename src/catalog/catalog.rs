// In-memory table and index registry.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use parking_lot::RwLock;

use crate::catalog::schema::Schema;
use crate::index::Index;
use crate::storage::buffer::BufferPoolManager;
use crate::storage::table::error::TableError;
use crate::storage::table::table_heap::TableHeap;

pub type TableOid = u32;
pub type IndexOid = u32;

pub struct TableInfo {
    pub oid: TableOid,
    pub name: String,
    pub schema: Schema,
    pub table: Arc<TableHeap>,
}

pub struct IndexInfo {
    pub oid: IndexOid,
    pub name: String,
    pub table_name: String,
    pub key_schema: Schema,
    pub key_attrs: Vec<usize>,
    pub index: Arc<dyn Index>,
}

pub struct Catalog {
    buffer_pool: Arc<BufferPoolManager>,
    tables: RwLock<HashMap<TableOid, Arc<TableInfo>>>,
    table_names: RwLock<HashMap<String, TableOid>>,
    indexes: RwLock<HashMap<IndexOid, Arc<IndexInfo>>>,
    table_indexes: RwLock<HashMap<String, Vec<IndexOid>>>,
    next_table_oid: AtomicU32,
    next_index_oid: AtomicU32,
}

impl Catalog {
    pub fn new(buffer_pool: Arc<BufferPoolManager>) -> Self {
        Self {
            buffer_pool,
            tables: RwLock::new(HashMap::new()),
            table_names: RwLock::new(HashMap::new()),
            indexes: RwLock::new(HashMap::new()),
            table_indexes: RwLock::new(HashMap::new()),
            next_table_oid: AtomicU32::new(0),
            next_index_oid: AtomicU32::new(0),
        }
    }

    /// Create a table backed by a fresh heap.
    pub fn create_table(
        &self,
        name: impl Into<String>,
        schema: Schema,
    ) -> Result<Arc<TableInfo>, TableError> {
        let name = name.into();
        let heap = Arc::new(TableHeap::new(Arc::clone(&self.buffer_pool))?);
        let oid = self.next_table_oid.fetch_add(1, Ordering::SeqCst);

        let info = Arc::new(TableInfo {
            oid,
            name: name.clone(),
            schema,
            table: heap,
        });

        self.tables.write().insert(oid, Arc::clone(&info));
        self.table_names.write().insert(name.clone(), oid);
        self.table_indexes.write().entry(name).or_default();
        Ok(info)
    }

    pub fn get_table(&self, oid: TableOid) -> Option<Arc<TableInfo>> {
        self.tables.read().get(&oid).cloned()
    }

    pub fn get_table_by_name(&self, name: &str) -> Option<Arc<TableInfo>> {
        let oid = *self.table_names.read().get(name)?;
        self.get_table(oid)
    }

    /// Register an index over a table. The caller supplies the constructed
    /// index so the catalog stays agnostic of key widths.
    pub fn create_index(
        &self,
        name: impl Into<String>,
        table_name: impl Into<String>,
        key_schema: Schema,
        key_attrs: Vec<usize>,
        index: Arc<dyn Index>,
    ) -> Arc<IndexInfo> {
        let table_name = table_name.into();
        let oid = self.next_index_oid.fetch_add(1, Ordering::SeqCst);

        let info = Arc::new(IndexInfo {
            oid,
            name: name.into(),
            table_name: table_name.clone(),
            key_schema,
            key_attrs,
            index,
        });

        self.indexes.write().insert(oid, Arc::clone(&info));
        self.table_indexes
            .write()
            .entry(table_name)
            .or_default()
            .push(oid);
        info
    }

    pub fn get_index(&self, oid: IndexOid) -> Option<Arc<IndexInfo>> {
        self.indexes.read().get(&oid).cloned()
    }

    /// Every index registered for the named table.
    pub fn get_table_indexes(&self, table_name: &str) -> Vec<Arc<IndexInfo>> {
        let oids = match self.table_indexes.read().get(table_name) {
            Some(oids) => oids.clone(),
            None => return Vec::new(),
        };
        let indexes = self.indexes.read();
        oids.iter()
            .filter_map(|oid| indexes.get(oid).cloned())
            .collect()
    }
}
