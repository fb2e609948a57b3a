// Update executor: exclusive-lock each source rid, rewrite the tuple in
// place (falling back to delete-and-reinsert when it no longer fits), and
// swap the index entries.

use std::sync::Arc;

use crate::catalog::schema::Schema;
use crate::catalog::TableInfo;
use crate::common::rid::Rid;
use crate::query::error::{QueryError, QueryResult};
use crate::query::executor::{Executor, ExecutorContext};
use crate::query::plan::{UpdatePlan, UpdateType};
use crate::storage::table::tuple::{Tuple, Value};
use crate::transaction::transaction::{
    IndexWriteRecord, TableWriteRecord, TransactionState, WriteType,
};

pub struct UpdateExecutor {
    ctx: Arc<ExecutorContext>,
    plan: UpdatePlan,
    table_info: Arc<TableInfo>,
    child: Box<dyn Executor>,
    end: bool,
    empty_schema: Schema,
}

impl UpdateExecutor {
    pub fn new(
        ctx: Arc<ExecutorContext>,
        plan: UpdatePlan,
        child: Box<dyn Executor>,
    ) -> QueryResult<Self> {
        let table_info = ctx
            .catalog
            .get_table(plan.table_oid)
            .ok_or(QueryError::TableNotFound(plan.table_oid))?;
        Ok(Self {
            ctx,
            plan,
            table_info,
            child,
            end: false,
            empty_schema: Schema::empty(),
        })
    }

    fn generate_updated_tuple(&self, src_tuple: &Tuple) -> Tuple {
        let mut values = Vec::with_capacity(src_tuple.len());
        for (idx, value) in src_tuple.values().iter().enumerate() {
            match self.plan.update_attrs.get(&idx) {
                None => values.push(value.clone()),
                Some(info) => match info.update_type {
                    UpdateType::Set => values.push(Value::Integer(info.value)),
                    UpdateType::Add => values.push(
                        value
                            .add(&Value::Integer(info.value))
                            .unwrap_or_else(|| value.clone()),
                    ),
                },
            }
        }
        Tuple::new(values)
    }
}

impl Executor for UpdateExecutor {
    fn init(&mut self) -> QueryResult<()> {
        self.child.init()?;
        self.end = false;
        Ok(())
    }

    fn next(&mut self) -> QueryResult<Option<(Tuple, Rid)>> {
        if self.end {
            return Ok(None);
        }

        let (_, source_rid) = match self.child.next()? {
            Some(row) => row,
            None => {
                self.end = true;
                return Ok(None);
            }
        };

        let txn = &self.ctx.txn;
        let locked = if txn.is_shared_locked(source_rid) {
            self.ctx.lock_manager.lock_upgrade(txn, source_rid)
        } else if !txn.is_exclusive_locked(source_rid) {
            self.ctx.lock_manager.lock_exclusive(txn, source_rid)
        } else {
            true
        };
        if !locked {
            return Err(QueryError::TransactionAborted(txn.id()));
        }

        let source_tuple = self
            .table_info
            .table
            .get_tuple(source_rid)?
            .ok_or(QueryError::Storage(
                crate::storage::table::error::TableError::TupleNotFound(source_rid),
            ))?;
        let updated_tuple = self.generate_updated_tuple(&source_tuple);

        let mut rid = source_rid;
        let in_place = self
            .table_info
            .table
            .update_tuple(&updated_tuple, source_rid, txn)?;
        if in_place {
            txn.append_table_write(TableWriteRecord::new(
                source_rid,
                WriteType::Update,
                source_tuple.clone(),
                Arc::clone(&self.table_info.table),
            ));
        } else if txn.state() != TransactionState::Aborted {
            // Too large for the page: tombstone and reinsert elsewhere
            if self.table_info.table.mark_delete(source_rid, txn)? {
                txn.append_table_write(TableWriteRecord::new(
                    source_rid,
                    WriteType::Delete,
                    source_tuple.clone(),
                    Arc::clone(&self.table_info.table),
                ));
            }
            rid = self.table_info.table.insert_tuple(&updated_tuple, txn)?;
            txn.append_table_write(TableWriteRecord::new(
                rid,
                WriteType::Insert,
                updated_tuple.clone(),
                Arc::clone(&self.table_info.table),
            ));
        }

        for index_info in self.ctx.catalog.get_table_indexes(&self.table_info.name) {
            index_info.index.delete_entry(&source_tuple, source_rid)?;
            index_info.index.insert_entry(&updated_tuple, rid)?;
            txn.append_index_write(IndexWriteRecord::update(
                rid,
                source_rid,
                updated_tuple.clone(),
                source_tuple.clone(),
                Arc::clone(&index_info.index),
            ));
        }

        Ok(Some((updated_tuple, rid)))
    }

    fn output_schema(&self) -> &Schema {
        &self.empty_schema
    }
}
