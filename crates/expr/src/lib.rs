//! Query-tree types, predicate/projection/order parsing, and the
//! cardinality estimator that feeds the cost model.

pub mod cardinality;
pub mod condition;
pub mod error;
pub mod order;
pub mod projection;
pub mod stats;
pub mod tree;

pub use condition::{parse_condition, ConditionNode, Operand, Predicate};
pub use error::ExprError;
pub use order::{parse_order_by, OrderKey};
pub use projection::{parse_projection, ProjectionItem};
pub use stats::{ColumnStatistic, Statistic};
pub use tree::{NodeType, QueryNode};
