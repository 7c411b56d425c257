//! Physical operators that drive the expression evaluator

mod aggregate;
mod filter;
mod projection;
mod sink;
mod source;

pub use aggregate::AggregateOperator;
pub use filter::FilterOperator;
pub use projection::ProjectionOperator;
pub use sink::CollectSink;
pub use source::ChunkSource;
