// Hash aggregation: init drains the child into a group-keyed accumulator
// table; next streams the groups through the having clause.

use std::collections::HashMap;

use crate::catalog::schema::Schema;
use crate::common::rid::Rid;
use crate::query::error::QueryResult;
use crate::query::executor::Executor;
use crate::query::plan::{AggregateType, AggregationPlan};
use crate::storage::table::tuple::{Tuple, Value};

pub struct AggregationExecutor {
    plan: AggregationPlan,
    child: Box<dyn Executor>,
    groups: Vec<(Vec<Value>, Vec<Value>)>,
    group_index: usize,
    end: bool,
}

impl AggregationExecutor {
    pub fn new(plan: AggregationPlan, child: Box<dyn Executor>) -> Self {
        Self {
            plan,
            child,
            groups: Vec::new(),
            group_index: 0,
            end: false,
        }
    }

    fn initial_accumulators(&self) -> Vec<Value> {
        self.plan
            .agg_types
            .iter()
            .map(|agg_type| match agg_type {
                AggregateType::CountStar => Value::Integer(0),
                _ => Value::Null,
            })
            .collect()
    }

    fn combine(&self, accumulators: &mut [Value], inputs: &[Value]) {
        for (idx, agg_type) in self.plan.agg_types.iter().enumerate() {
            let input = &inputs[idx];
            let current = accumulators[idx].clone();
            accumulators[idx] = match agg_type {
                AggregateType::CountStar => match current {
                    Value::Integer(count) => Value::Integer(count + 1),
                    other => other,
                },
                AggregateType::Count => {
                    if input.is_null() {
                        current
                    } else {
                        match current {
                            Value::Integer(count) => Value::Integer(count + 1),
                            _ => Value::Integer(1),
                        }
                    }
                }
                AggregateType::Sum => {
                    if input.is_null() {
                        current
                    } else {
                        match current {
                            Value::Null => input.clone(),
                            other => other.add(input).unwrap_or(Value::Null),
                        }
                    }
                }
                AggregateType::Min => {
                    if input.is_null() {
                        current
                    } else {
                        match current {
                            Value::Null => input.clone(),
                            other => {
                                if *input < other {
                                    input.clone()
                                } else {
                                    other
                                }
                            }
                        }
                    }
                }
                AggregateType::Max => {
                    if input.is_null() {
                        current
                    } else {
                        match current {
                            Value::Null => input.clone(),
                            other => {
                                if *input > other {
                                    input.clone()
                                } else {
                                    other
                                }
                            }
                        }
                    }
                }
            };
        }
    }
}

impl Executor for AggregationExecutor {
    fn init(&mut self) -> QueryResult<()> {
        self.child.init()?;
        self.groups.clear();
        self.group_index = 0;
        self.end = false;

        let child_schema = self.child.output_schema().clone();
        let mut table: HashMap<Vec<Value>, Vec<Value>> = HashMap::new();

        while let Some((tuple, _)) = self.child.next()? {
            let mut group_key = Vec::with_capacity(self.plan.group_by_exprs.len());
            for expr in &self.plan.group_by_exprs {
                group_key.push(expr.evaluate(&tuple, &child_schema)?);
            }

            let mut inputs = Vec::with_capacity(self.plan.agg_exprs.len());
            for expr in &self.plan.agg_exprs {
                inputs.push(expr.evaluate(&tuple, &child_schema)?);
            }

            let initial = self.initial_accumulators();
            let accumulators = table.entry(group_key).or_insert(initial);
            self.combine(accumulators, &inputs);
        }

        self.groups = table.into_iter().collect();
        Ok(())
    }

    fn next(&mut self) -> QueryResult<Option<(Tuple, Rid)>> {
        if self.end {
            return Ok(None);
        }

        while self.group_index < self.groups.len() {
            let (group_bys, aggregates) = self.groups[self.group_index].clone();
            self.group_index += 1;

            let passes = match &self.plan.having {
                Some(having) => having.evaluate_aggregate(&group_bys, &aggregates)?.is_true(),
                None => true,
            };
            if !passes {
                continue;
            }

            let mut values = Vec::with_capacity(self.plan.output_exprs.len());
            for expr in &self.plan.output_exprs {
                values.push(expr.evaluate_aggregate(&group_bys, &aggregates)?);
            }
            return Ok(Some((Tuple::new(values), Rid::default())));
        }

        self.end = true;
        Ok(None)
    }

    fn output_schema(&self) -> &Schema {
        &self.plan.output_schema
    }
}
