// Expression trees evaluated by the executors.
//
// A column reference carries a tuple index so the same node works in every
// evaluation context: single-tuple (only index 0 is valid), join (0 = left,
// 1 = right), and aggregate (0 = group-by values, 1 = accumulator values).

use crate::catalog::schema::Schema;
use crate::query::error::{QueryError, QueryResult};
use crate::storage::table::tuple::{Tuple, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    Add,
}

#[derive(Debug, Clone)]
pub enum Expr {
    Column { tuple_idx: usize, col_idx: usize },
    Literal(Value),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

impl Expr {
    /// Reference to a column of the (single) input tuple.
    pub fn column(col_idx: usize) -> Self {
        Expr::Column {
            tuple_idx: 0,
            col_idx,
        }
    }

    /// Reference into one side of a join, or one half of an aggregate row.
    pub fn column_of(tuple_idx: usize, col_idx: usize) -> Self {
        Expr::Column { tuple_idx, col_idx }
    }

    pub fn literal(value: Value) -> Self {
        Expr::Literal(value)
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Equality comparison helper, the common predicate shape.
    pub fn eq(left: Expr, right: Expr) -> Self {
        Self::binary(BinaryOp::Eq, left, right)
    }

    pub fn evaluate(&self, tuple: &Tuple, _schema: &Schema) -> QueryResult<Value> {
        match self {
            Expr::Column { tuple_idx: 0, col_idx } => tuple
                .value(*col_idx)
                .cloned()
                .ok_or(QueryError::ColumnNotFound(*col_idx)),
            Expr::Column { tuple_idx, .. } => Err(QueryError::InvalidOperation(format!(
                "tuple index {} outside a join context",
                tuple_idx
            ))),
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Binary { op, left, right } => {
                let l = left.evaluate(tuple, _schema)?;
                let r = right.evaluate(tuple, _schema)?;
                apply_binary(*op, &l, &r)
            }
        }
    }

    pub fn evaluate_join(
        &self,
        left_tuple: &Tuple,
        left_schema: &Schema,
        right_tuple: &Tuple,
        right_schema: &Schema,
    ) -> QueryResult<Value> {
        match self {
            Expr::Column { tuple_idx, col_idx } => {
                let tuple = match tuple_idx {
                    0 => left_tuple,
                    1 => right_tuple,
                    _ => {
                        return Err(QueryError::InvalidOperation(format!(
                            "tuple index {} in join",
                            tuple_idx
                        )))
                    }
                };
                tuple
                    .value(*col_idx)
                    .cloned()
                    .ok_or(QueryError::ColumnNotFound(*col_idx))
            }
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Binary { op, left, right } => {
                let l = left.evaluate_join(left_tuple, left_schema, right_tuple, right_schema)?;
                let r = right.evaluate_join(left_tuple, left_schema, right_tuple, right_schema)?;
                apply_binary(*op, &l, &r)
            }
        }
    }

    /// Evaluation over an aggregate row: tuple index 0 addresses the
    /// group-by values, 1 the aggregate accumulators.
    pub fn evaluate_aggregate(
        &self,
        group_bys: &[Value],
        aggregates: &[Value],
    ) -> QueryResult<Value> {
        match self {
            Expr::Column { tuple_idx, col_idx } => {
                let values = match tuple_idx {
                    0 => group_bys,
                    1 => aggregates,
                    _ => {
                        return Err(QueryError::InvalidOperation(format!(
                            "tuple index {} in aggregation",
                            tuple_idx
                        )))
                    }
                };
                values
                    .get(*col_idx)
                    .cloned()
                    .ok_or(QueryError::ColumnNotFound(*col_idx))
            }
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Binary { op, left, right } => {
                let l = left.evaluate_aggregate(group_bys, aggregates)?;
                let r = right.evaluate_aggregate(group_bys, aggregates)?;
                apply_binary(*op, &l, &r)
            }
        }
    }
}

fn apply_binary(op: BinaryOp, left: &Value, right: &Value) -> QueryResult<Value> {
    match op {
        BinaryOp::Eq => Ok(Value::Boolean(left == right)),
        BinaryOp::NotEq => Ok(Value::Boolean(left != right)),
        BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
            match left.partial_cmp(right) {
                Some(ordering) => {
                    let result = match op {
                        BinaryOp::Lt => ordering.is_lt(),
                        BinaryOp::LtEq => ordering.is_le(),
                        BinaryOp::Gt => ordering.is_gt(),
                        BinaryOp::GtEq => ordering.is_ge(),
                        _ => unreachable!(),
                    };
                    Ok(Value::Boolean(result))
                }
                // Comparisons touching NULL are not true
                None => Ok(Value::Boolean(false)),
            }
        }
        BinaryOp::And | BinaryOp::Or => match (left, right) {
            (Value::Boolean(l), Value::Boolean(r)) => Ok(Value::Boolean(match op {
                BinaryOp::And => *l && *r,
                _ => *l || *r,
            })),
            _ => Err(QueryError::TypeError(format!(
                "logical operator over {} and {}",
                left, right
            ))),
        },
        BinaryOp::Add => left.add(right).ok_or_else(|| {
            QueryError::TypeError(format!("cannot add {} and {}", left, right))
        }),
    }
}
