// Sequential scan: walk the table heap rid by rid, project through the
// output expressions, then filter on the projected tuple.

use std::sync::Arc;

use crate::catalog::schema::Schema;
use crate::catalog::TableInfo;
use crate::common::rid::Rid;
use crate::query::error::{QueryError, QueryResult};
use crate::query::executor::{Executor, ExecutorContext};
use crate::query::plan::SeqScanPlan;
use crate::storage::table::tuple::Tuple;

pub struct SeqScanExecutor {
    plan: SeqScanPlan,
    table_info: Arc<TableInfo>,
    cursor: Option<Rid>,
}

impl SeqScanExecutor {
    pub fn new(ctx: Arc<ExecutorContext>, plan: SeqScanPlan) -> QueryResult<Self> {
        let table_info = ctx
            .catalog
            .get_table(plan.table_oid)
            .ok_or(QueryError::TableNotFound(plan.table_oid))?;
        Ok(Self {
            plan,
            table_info,
            cursor: None,
        })
    }
}

impl Executor for SeqScanExecutor {
    fn init(&mut self) -> QueryResult<()> {
        self.cursor = self.table_info.table.first_tuple_rid()?;
        Ok(())
    }

    fn next(&mut self) -> QueryResult<Option<(Tuple, Rid)>> {
        while let Some(rid) = self.cursor {
            self.cursor = self.table_info.table.next_tuple_rid(rid)?;

            let raw_tuple = match self.table_info.table.get_tuple(rid)? {
                Some(tuple) => tuple,
                // Tombstoned or vacated underneath the cursor: skip
                None => continue,
            };

            let mut values = Vec::with_capacity(self.plan.output_exprs.len());
            for expr in &self.plan.output_exprs {
                values.push(expr.evaluate(&raw_tuple, &self.table_info.schema)?);
            }
            let out_tuple = Tuple::new(values);

            let passes = match &self.plan.predicate {
                Some(predicate) => predicate
                    .evaluate(&out_tuple, &self.plan.output_schema)?
                    .is_true(),
                None => true,
            };
            if passes {
                return Ok(Some((out_tuple, rid)));
            }
        }
        Ok(None)
    }

    fn output_schema(&self) -> &Schema {
        &self.plan.output_schema
    }
}
