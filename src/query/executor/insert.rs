// Insert executor: raw literal rows or a child's output into the table
// heap, with index maintenance and write-set bookkeeping.

use std::sync::Arc;

use crate::catalog::schema::Schema;
use crate::catalog::{IndexInfo, TableInfo};
use crate::common::rid::Rid;
use crate::query::error::{QueryError, QueryResult};
use crate::query::executor::{Executor, ExecutorContext};
use crate::query::plan::InsertPlan;
use crate::storage::table::tuple::Tuple;
use crate::transaction::transaction::{IndexWriteRecord, TableWriteRecord, WriteType};

pub struct InsertExecutor {
    ctx: Arc<ExecutorContext>,
    plan: InsertPlan,
    table_info: Arc<TableInfo>,
    indexes: Vec<Arc<IndexInfo>>,
    child: Option<Box<dyn Executor>>,
    raw_index: usize,
    end: bool,
    empty_schema: Schema,
}

impl InsertExecutor {
    pub fn new(
        ctx: Arc<ExecutorContext>,
        plan: InsertPlan,
        child: Option<Box<dyn Executor>>,
    ) -> QueryResult<Self> {
        let table_info = ctx
            .catalog
            .get_table(plan.table_oid)
            .ok_or(QueryError::TableNotFound(plan.table_oid))?;
        let indexes = ctx.catalog.get_table_indexes(&table_info.name);
        Ok(Self {
            ctx,
            plan,
            table_info,
            indexes,
            child,
            raw_index: 0,
            end: false,
            empty_schema: Schema::empty(),
        })
    }

    fn insert_row(&self, tuple: &Tuple) -> QueryResult<Rid> {
        let txn = &self.ctx.txn;
        let rid = self.table_info.table.insert_tuple(tuple, txn)?;
        txn.append_table_write(TableWriteRecord::new(
            rid,
            WriteType::Insert,
            tuple.clone(),
            Arc::clone(&self.table_info.table),
        ));

        // Exclusive-lock the new rid before it becomes visible to anyone
        if !self.ctx.lock_manager.lock_exclusive(txn, rid) {
            return Err(QueryError::TransactionAborted(txn.id()));
        }

        for index_info in &self.indexes {
            index_info.index.insert_entry(tuple, rid)?;
            txn.append_index_write(IndexWriteRecord::new(
                rid,
                WriteType::Insert,
                tuple.clone(),
                None,
                Arc::clone(&index_info.index),
            ));
        }
        Ok(rid)
    }
}

impl Executor for InsertExecutor {
    fn init(&mut self) -> QueryResult<()> {
        if let Some(child) = &mut self.child {
            child.init()?;
        } else {
            self.raw_index = 0;
        }
        self.end = false;
        Ok(())
    }

    fn next(&mut self) -> QueryResult<Option<(Tuple, Rid)>> {
        if self.end {
            return Ok(None);
        }

        if self.child.is_none() {
            if self.raw_index >= self.plan.raw_values.len() {
                self.end = true;
                return Ok(None);
            }
            let tuple = Tuple::new(self.plan.raw_values[self.raw_index].clone());
            self.raw_index += 1;
            if self.raw_index == self.plan.raw_values.len() {
                self.end = true;
            }
            let rid = self.insert_row(&tuple)?;
            return Ok(Some((tuple, rid)));
        }

        let child = self.child.as_mut().expect("child checked above");
        match child.next()? {
            Some((tuple, _)) => {
                let rid = self.insert_row(&tuple)?;
                Ok(Some((tuple, rid)))
            }
            None => {
                self.end = true;
                Ok(None)
            }
        }
    }

    fn output_schema(&self) -> &Schema {
        &self.empty_schema
    }
}
