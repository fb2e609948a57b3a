// Physical plan nodes: the contract between the (external) planner and the
// executor factory. Plain data, cloned into the executors that run them.

use std::collections::HashMap;

use crate::catalog::schema::Schema;
use crate::catalog::TableOid;
use crate::query::expression::Expr;
use crate::storage::table::tuple::Value;

#[derive(Debug, Clone)]
pub struct SeqScanPlan {
    pub table_oid: TableOid,
    /// One expression per output column, evaluated over the table schema.
    pub output_exprs: Vec<Expr>,
    pub output_schema: Schema,
    /// Applied to the projected tuple.
    pub predicate: Option<Expr>,
}

#[derive(Debug, Clone)]
pub struct InsertPlan {
    pub table_oid: TableOid,
    /// Literal rows for a raw insert; empty when fed by a child.
    pub raw_values: Vec<Vec<Value>>,
    pub child: Option<Box<PlanNode>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateType {
    Set,
    Add,
}

#[derive(Debug, Clone, Copy)]
pub struct UpdateInfo {
    pub update_type: UpdateType,
    pub value: i64,
}

#[derive(Debug, Clone)]
pub struct UpdatePlan {
    pub table_oid: TableOid,
    /// Column position -> modification; untouched columns pass through.
    pub update_attrs: HashMap<usize, UpdateInfo>,
    pub child: Box<PlanNode>,
}

#[derive(Debug, Clone)]
pub struct DeletePlan {
    pub table_oid: TableOid,
    pub child: Box<PlanNode>,
}

#[derive(Debug, Clone)]
pub struct NestedLoopJoinPlan {
    pub left: Box<PlanNode>,
    pub right: Box<PlanNode>,
    pub predicate: Option<Expr>,
    /// Column expressions over (left, right) pairs.
    pub output_exprs: Vec<Expr>,
    pub output_schema: Schema,
}

#[derive(Debug, Clone)]
pub struct HashJoinPlan {
    pub left: Box<PlanNode>,
    pub right: Box<PlanNode>,
    pub left_key: Expr,
    pub right_key: Expr,
    pub output_exprs: Vec<Expr>,
    pub output_schema: Schema,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateType {
    CountStar,
    Count,
    Sum,
    Min,
    Max,
}

#[derive(Debug, Clone)]
pub struct AggregationPlan {
    pub child: Box<PlanNode>,
    pub group_by_exprs: Vec<Expr>,
    /// Argument of each aggregate, evaluated over the child's output.
    pub agg_exprs: Vec<Expr>,
    pub agg_types: Vec<AggregateType>,
    /// Evaluated over (group-by values, accumulator values).
    pub having: Option<Expr>,
    /// Output columns over the same aggregate row shape.
    pub output_exprs: Vec<Expr>,
    pub output_schema: Schema,
}

#[derive(Debug, Clone)]
pub struct DistinctPlan {
    pub child: Box<PlanNode>,
}

#[derive(Debug, Clone)]
pub enum PlanNode {
    SeqScan(SeqScanPlan),
    Insert(InsertPlan),
    Update(UpdatePlan),
    Delete(DeletePlan),
    NestedLoopJoin(NestedLoopJoinPlan),
    HashJoin(HashJoinPlan),
    Aggregation(AggregationPlan),
    Distinct(DistinctPlan),
}

impl PlanNode {
    /// Schema of the tuples this node emits. Mutating nodes emit the rows
    /// they touched, in their child's (or table's) shape; callers normally
    /// just drain them.
    pub fn output_schema(&self) -> Schema {
        match self {
            PlanNode::SeqScan(plan) => plan.output_schema.clone(),
            PlanNode::Insert(_) | PlanNode::Update(_) | PlanNode::Delete(_) => Schema::empty(),
            PlanNode::NestedLoopJoin(plan) => plan.output_schema.clone(),
            PlanNode::HashJoin(plan) => plan.output_schema.clone(),
            PlanNode::Aggregation(plan) => plan.output_schema.clone(),
            PlanNode::Distinct(plan) => plan.child.output_schema(),
        }
    }
}
