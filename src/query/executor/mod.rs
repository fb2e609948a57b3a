// Volcano-style pull executors: every operator exposes init/next and
// streams (tuple, rid) pairs to its parent.

pub mod aggregation;
pub mod delete;
pub mod distinct;
pub mod hash_join;
pub mod insert;
pub mod nested_loop_join;
pub mod seq_scan;
pub mod update;

use std::sync::Arc;

use crate::catalog::schema::Schema;
use crate::catalog::Catalog;
use crate::common::rid::Rid;
use crate::query::error::QueryResult;
use crate::query::plan::PlanNode;
use crate::storage::buffer::BufferPoolManager;
use crate::storage::table::tuple::Tuple;
use crate::transaction::lock_manager::LockManager;
use crate::transaction::transaction::Transaction;

/// The pull-iterator contract. `init` prepares (and for pipeline breakers,
/// materializes); `next` yields one output row at a time.
pub trait Executor: Send {
    fn init(&mut self) -> QueryResult<()>;

    fn next(&mut self) -> QueryResult<Option<(Tuple, Rid)>>;

    fn output_schema(&self) -> &Schema;
}

/// Everything an executor needs from its environment.
pub struct ExecutorContext {
    pub txn: Arc<Transaction>,
    pub catalog: Arc<Catalog>,
    pub buffer_pool: Arc<BufferPoolManager>,
    pub lock_manager: Arc<LockManager>,
}

impl ExecutorContext {
    pub fn new(
        txn: Arc<Transaction>,
        catalog: Arc<Catalog>,
        buffer_pool: Arc<BufferPoolManager>,
        lock_manager: Arc<LockManager>,
    ) -> Self {
        Self {
            txn,
            catalog,
            buffer_pool,
            lock_manager,
        }
    }
}

/// Instantiate the operator tree for a plan.
pub fn build_executor(
    ctx: Arc<ExecutorContext>,
    plan: &PlanNode,
) -> QueryResult<Box<dyn Executor>> {
    match plan {
        PlanNode::SeqScan(plan) => Ok(Box::new(seq_scan::SeqScanExecutor::new(
            ctx,
            plan.clone(),
        )?)),
        PlanNode::Insert(plan) => {
            let child = match &plan.child {
                Some(child_plan) => Some(build_executor(Arc::clone(&ctx), child_plan)?),
                None => None,
            };
            Ok(Box::new(insert::InsertExecutor::new(ctx, plan.clone(), child)?))
        }
        PlanNode::Update(plan) => {
            let child = build_executor(Arc::clone(&ctx), &plan.child)?;
            Ok(Box::new(update::UpdateExecutor::new(ctx, plan.clone(), child)?))
        }
        PlanNode::Delete(plan) => {
            let child = build_executor(Arc::clone(&ctx), &plan.child)?;
            Ok(Box::new(delete::DeleteExecutor::new(ctx, plan.clone(), child)?))
        }
        PlanNode::NestedLoopJoin(plan) => {
            let left = build_executor(Arc::clone(&ctx), &plan.left)?;
            let right = build_executor(Arc::clone(&ctx), &plan.right)?;
            Ok(Box::new(nested_loop_join::NestedLoopJoinExecutor::new(
                plan.clone(),
                left,
                right,
            )))
        }
        PlanNode::HashJoin(plan) => {
            let left = build_executor(Arc::clone(&ctx), &plan.left)?;
            let right = build_executor(Arc::clone(&ctx), &plan.right)?;
            Ok(Box::new(hash_join::HashJoinExecutor::new(
                plan.clone(),
                left,
                right,
            )))
        }
        PlanNode::Aggregation(plan) => {
            let child = build_executor(Arc::clone(&ctx), &plan.child)?;
            Ok(Box::new(aggregation::AggregationExecutor::new(
                plan.clone(),
                child,
            )))
        }
        PlanNode::Distinct(plan) => {
            let child = build_executor(Arc::clone(&ctx), &plan.child)?;
            Ok(Box::new(distinct::DistinctExecutor::new(child)))
        }
    }
}
