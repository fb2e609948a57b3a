// Hash join: the left (build) side is materialized into a multimap during
// init, keyed by the left join expression; next probes it once per right
// tuple and emits one output per matching left tuple.

use std::collections::HashMap;

use crate::catalog::schema::Schema;
use crate::common::rid::Rid;
use crate::query::error::QueryResult;
use crate::query::executor::Executor;
use crate::query::plan::HashJoinPlan;
use crate::storage::table::tuple::{Tuple, Value};

pub struct HashJoinExecutor {
    plan: HashJoinPlan,
    left: Box<dyn Executor>,
    right: Box<dyn Executor>,
    hash_table: HashMap<Value, Vec<Tuple>>,
    current_right: Option<Tuple>,
    current_matches: Vec<Tuple>,
    match_index: usize,
    end: bool,
}

impl HashJoinExecutor {
    pub fn new(plan: HashJoinPlan, left: Box<dyn Executor>, right: Box<dyn Executor>) -> Self {
        Self {
            plan,
            left,
            right,
            hash_table: HashMap::new(),
            current_right: None,
            current_matches: Vec::new(),
            match_index: 0,
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

impl Executor for HashJoinExecutor {
    fn init(&mut self) -> QueryResult<()> {
        self.left.init()?;
        self.right.init()?;
        self.hash_table.clear();
        self.current_right = None;
        self.current_matches.clear();
        self.match_index = 0;
        self.end = false;

        let left_schema = self.plan.left.output_schema();
        while let Some((tuple, _)) = self.left.next()? {
            let key = self.plan.left_key.evaluate(&tuple, &left_schema)?;
            self.hash_table.entry(key).or_default().push(tuple);
        }
        Ok(())
    }

    fn next(&mut self) -> QueryResult<Option<(Tuple, Rid)>> {
        if self.end {
            return Ok(None);
        }

        loop {
            if self.match_index < self.current_matches.len() {
                let left_tuple = self.current_matches[self.match_index].clone();
                self.match_index += 1;
                let right_tuple = self
                    .current_right
                    .clone()
                    .expect("matches imply a probe tuple");
                let out = self.emit(&left_tuple, &right_tuple)?;
                return Ok(Some((out, Rid::default())));
            }

            let right_schema = self.plan.right.output_schema();
            match self.right.next()? {
                Some((right_tuple, _)) => {
                    let key = self.plan.right_key.evaluate(&right_tuple, &right_schema)?;
                    self.current_matches = self.hash_table.get(&key).cloned().unwrap_or_default();
                    self.match_index = 0;
                    self.current_right = Some(right_tuple);
                }
                None => {
                    self.end = true;
                    return Ok(None);
                }
            }
        }
    }

    fn output_schema(&self) -> &Schema {
        &self.plan.output_schema
    }
}
