pub mod error;
pub mod executor;
pub mod expression;
pub mod plan;

pub use error::{QueryError, QueryResult};
pub use executor::{build_executor, Executor, ExecutorContext};
pub use expression::{BinaryOp, Expr};
pub use plan::PlanNode;
