//! IronVec Execution - Vectorized expression evaluation and physical operators
//!
//! Evaluates bound expression trees a column at a time and defines the
//! source/operator/sink contracts that fragments are built from.

pub mod chunk;
pub mod evaluator;
pub mod expression;
pub mod expression_state;
pub mod function;
pub mod operator;
pub mod operators;
pub mod vector;

pub use chunk::DataChunk;
pub use evaluator::ExpressionEvaluator;
pub use expression::Expression;
pub use expression_state::{AggregateFlag, ExpressionState};
pub use function::{
    Accumulator, AggregateFunction, CastFunction, CastParameters, ScalarFunction,
};
pub use operator::{
    Operator, OperatorInputState, OperatorOutputState, QueryContext, Sink, SinkState, Source,
    SourceState,
};
pub use vector::{ColumnRef, ValidityMask, Vector};
