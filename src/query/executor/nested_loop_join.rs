// Nested-loop join: the right child is re-initialized for every left
// tuple. Matches for one left tuple are buffered and drained before the
// outer loop advances.

use crate::catalog::schema::Schema;
use crate::common::rid::Rid;
use crate::query::error::QueryResult;
use crate::query::executor::Executor;
use crate::query::plan::NestedLoopJoinPlan;
use crate::storage::table::tuple::Tuple;

pub struct NestedLoopJoinExecutor {
    plan: NestedLoopJoinPlan,
    left: Box<dyn Executor>,
    right: Box<dyn Executor>,
    results: Vec<Tuple>,
    end: bool,
}

impl NestedLoopJoinExecutor {
    pub fn new(
        plan: NestedLoopJoinPlan,
        left: Box<dyn Executor>,
        right: Box<dyn Executor>,
    ) -> Self {
        Self {
            plan,
            left,
            right,
            results: Vec::new(),
            end: false,
        }
    }

    fn emit(&self, left_tuple: &Tuple, right_tuple: &Tuple) -> QueryResult<Tuple> {
        let left_schema = self.plan.left.output_schema();
        let right_schema = self.plan.right.output_schema();
        let mut values = Vec::with_capacity(self.plan.output_exprs.len());
        for expr in &self.plan.output_exprs {
            values.push(expr.evaluate_join(
                left_tuple,
                &left_schema,
                right_tuple,
                &right_schema,
            )?);
        }
        Ok(Tuple::new(values))
    }
}

impl Executor for NestedLoopJoinExecutor {
    fn init(&mut self) -> QueryResult<()> {
        self.left.init()?;
        self.right.init()?;
        self.results.clear();
        self.end = false;
        Ok(())
    }

    fn next(&mut self) -> QueryResult<Option<(Tuple, Rid)>> {
        if self.end {
            return Ok(None);
        }
        if let Some(tuple) = self.results.pop() {
            return Ok(Some((tuple, Rid::default())));
        }

        let left_schema = self.plan.left.output_schema();
        let right_schema = self.plan.right.output_schema();

        while let Some((left_tuple, _)) = self.left.next()? {
            self.right.init()?;
            while let Some((right_tuple, _)) = self.right.next()? {
                let matches = match &self.plan.predicate {
                    Some(predicate) => predicate
                        .evaluate_join(&left_tuple, &left_schema, &right_tuple, &right_schema)?
                        .is_true(),
                    None => true,
                };
                if matches {
                    let out = self.emit(&left_tuple, &right_tuple)?;
                    self.results.push(out);
                }
            }
            if let Some(tuple) = self.results.pop() {
                return Ok(Some((tuple, Rid::default())));
            }
        }

        self.end = true;
        Ok(None)
    }

    fn output_schema(&self) -> &Schema {
        &self.plan.output_schema
    }
}
