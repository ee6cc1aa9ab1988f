pub mod array_ops;
pub mod context;
pub mod evaluator;
pub mod expression;
pub mod statement;
pub mod value;

pub use array_ops::{array_operator_descriptors, ArrayOperator};
pub use context::ExecutionContext;
pub use evaluator::{EvalError, EvalResult, Evaluator};
pub use statement::Step;
pub use value::TypedValue;
