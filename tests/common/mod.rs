use std::sync::Arc;
use anyhow::Result;
use tempfile::NamedTempFile;

use emberdb::catalog::{Catalog, Column, DataType, Schema, TableInfo};
use emberdb::index::hash::{ExtendibleHashIndex, GenericKey, HashTableIndex};
use emberdb::query::executor::ExecutorContext;
use emberdb::storage::buffer::BufferPoolManager;
use emberdb::storage::table::{Tuple, Value};
use emberdb::transaction::{
    IsolationLevel, LockManager, Transaction, TransactionManager, TransactionRegistry,
};

/// Everything a test needs to run the engine end to end. The temp file must
/// outlive the buffer pool.
pub struct TestContext {
    pub buffer_pool: Arc<BufferPoolManager>,
    pub catalog: Arc<Catalog>,
    pub registry: Arc<TransactionRegistry>,
    pub lock_manager: Arc<LockManager>,
    pub txn_manager: Arc<TransactionManager>,
    _db_file: NamedTempFile,
}

#[allow(dead_code)]
impl TestContext {
    pub fn new(pool_size: usize) -> Result<Self> {
        let db_file = NamedTempFile::new()?;
        let buffer_pool = Arc::new(BufferPoolManager::new(pool_size, db_file.path())?);
        let catalog = Arc::new(Catalog::new(Arc::clone(&buffer_pool)));
        let registry = Arc::new(TransactionRegistry::new());
        let lock_manager = Arc::new(LockManager::new(Arc::clone(&registry)));
        let txn_manager = Arc::new(TransactionManager::new(
            Arc::clone(&registry),
            Arc::clone(&lock_manager),
        ));

        Ok(Self {
            buffer_pool,
            catalog,
            registry,
            lock_manager,
            txn_manager,
            _db_file: db_file,
        })
    }

    pub fn executor_context(&self, txn: &Arc<Transaction>) -> Arc<ExecutorContext> {
        Arc::new(ExecutorContext::new(
            Arc::clone(txn),
            Arc::clone(&self.catalog),
            Arc::clone(&self.buffer_pool),
            Arc::clone(&self.lock_manager),
        ))
    }

    pub fn begin(&self, level: IsolationLevel) -> Arc<Transaction> {
        self.txn_manager.begin(level)
    }

    /// Table of (id integer, name text, value integer).
    pub fn create_accounts_table(&self) -> Result<Arc<TableInfo>> {
        let schema = Schema::new(vec![
            Column::new("id", DataType::Integer),
            Column::new("name", DataType::Text),
            Column::new("value", DataType::Integer),
        ]);
        Ok(self.catalog.create_table("accounts", schema)?)
    }

    /// Hash index on accounts.id.
    pub fn create_accounts_id_index(&self) {
        let index = ExtendibleHashIndex::<GenericKey<8>>::new(
            Arc::clone(&self.buffer_pool),
            emberdb::index::hash::default_hash,
        )
        .expect("index creation");
        let key_schema = Schema::new(vec![Column::new("id", DataType::Integer)]);
        self.catalog.create_index(
            "accounts_id_idx",
            "accounts",
            key_schema,
            vec![0],
            Arc::new(HashTableIndex::new(index, vec![0])),
        );
    }
}

#[allow(dead_code)]
pub fn account_row(id: i64, name: &str, value: i64) -> Vec<Value> {
    vec![
        Value::Integer(id),
        Value::Text(name.to_string()),
        Value::Integer(value),
    ]
}

#[allow(dead_code)]
pub fn account_tuple(id: i64, name: &str, value: i64) -> Tuple {
    Tuple::new(account_row(id, name, value))
}
