// Delete executor: exclusive-lock each victim rid (upgrading a held shared
// lock), tombstone it, and unhook its index entries. The physical delete is
// deferred to commit.

use std::sync::Arc;

use crate::catalog::schema::Schema;
use crate::catalog::TableInfo;
use crate::common::rid::Rid;
use crate::query::error::{QueryError, QueryResult};
use crate::query::executor::{Executor, ExecutorContext};
use crate::query::plan::DeletePlan;
use crate::storage::table::tuple::Tuple;
use crate::transaction::transaction::{IndexWriteRecord, TableWriteRecord, WriteType};

pub struct DeleteExecutor {
    ctx: Arc<ExecutorContext>,
    table_info: Arc<TableInfo>,
    child: Box<dyn Executor>,
    end: bool,
    empty_schema: Schema,
}

impl DeleteExecutor {
    pub fn new(
        ctx: Arc<ExecutorContext>,
        plan: DeletePlan,
        child: Box<dyn Executor>,
    ) -> QueryResult<Self> {
        let table_info = ctx
            .catalog
            .get_table(plan.table_oid)
            .ok_or(QueryError::TableNotFound(plan.table_oid))?;
        Ok(Self {
            ctx,
            table_info,
            child,
            end: false,
            empty_schema: Schema::empty(),
        })
    }
}

impl Executor for DeleteExecutor {
    fn init(&mut self) -> QueryResult<()> {
        self.child.init()?;
        self.end = false;
        Ok(())
    }

    fn next(&mut self) -> QueryResult<Option<(Tuple, Rid)>> {
        if self.end {
            return Ok(None);
        }

        let (delete_tuple, delete_rid) = match self.child.next()? {
            Some(row) => row,
            None => {
                self.end = true;
                return Ok(None);
            }
        };

        let txn = &self.ctx.txn;
        let locked = if txn.is_shared_locked(delete_rid) {
            self.ctx.lock_manager.lock_upgrade(txn, delete_rid)
        } else if !txn.is_exclusive_locked(delete_rid) {
            self.ctx.lock_manager.lock_exclusive(txn, delete_rid)
        } else {
            true
        };
        if !locked {
            return Err(QueryError::TransactionAborted(txn.id()));
        }

        // The raw row is needed for index keys; the child may have projected
        let raw_tuple = self
            .table_info
            .table
            .get_tuple(delete_rid)?
            .unwrap_or_else(|| delete_tuple.clone());

        if self.table_info.table.mark_delete(delete_rid, txn)? {
            txn.append_table_write(TableWriteRecord::new(
                delete_rid,
                WriteType::Delete,
                raw_tuple.clone(),
                Arc::clone(&self.table_info.table),
            ));
        }

        for index_info in self.ctx.catalog.get_table_indexes(&self.table_info.name) {
            index_info.index.delete_entry(&raw_tuple, delete_rid)?;
            txn.append_index_write(IndexWriteRecord::new(
                delete_rid,
                WriteType::Delete,
                raw_tuple.clone(),
                None,
                Arc::clone(&index_info.index),
            ));
        }

        Ok(Some((delete_tuple, delete_rid)))
    }

    fn output_schema(&self) -> &Schema {
        &self.empty_schema
    }
}
