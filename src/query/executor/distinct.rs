// Distinct: collect the child's output into a set during init, then drain.

use std::collections::HashSet;

use crate::catalog::schema::Schema;
use crate::common::rid::Rid;
use crate::query::error::QueryResult;
use crate::query::executor::Executor;
use crate::storage::table::tuple::Tuple;

pub struct DistinctExecutor {
    child: Box<dyn Executor>,
    schema: Schema,
    distinct: Vec<Tuple>,
    index: usize,
}

impl DistinctExecutor {
    pub fn new(child: Box<dyn Executor>) -> Self {
        let schema = child.output_schema().clone();
        Self {
            child,
            schema,
            distinct: Vec::new(),
            index: 0,
        }
    }
}

impl Executor for DistinctExecutor {
    fn init(&mut self) -> QueryResult<()> {
        self.child.init()?;
        self.distinct.clear();
        self.index = 0;

        let mut seen = HashSet::new();
        while let Some((tuple, _)) = self.child.next()? {
            if seen.insert(tuple.clone()) {
                self.distinct.push(tuple);
            }
        }
        Ok(())
    }

    fn next(&mut self) -> QueryResult<Option<(Tuple, Rid)>> {
        if self.index >= self.distinct.len() {
            return Ok(None);
        }
        let tuple = self.distinct[self.index].clone();
        self.index += 1;
        Ok(Some((tuple, Rid::default())))
    }

    fn output_schema(&self) -> &Schema {
        &self.schema
    }
}
