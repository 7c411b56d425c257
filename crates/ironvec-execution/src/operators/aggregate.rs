//! Ungrouped aggregate operator
//!
//! Every task folds the batches it sees into its own accumulators and emits
//! a single row when its source runs dry. With several tasks per fragment the
//! sink therefore receives one partial row per task.

use crate::chunk::DataChunk;
use crate::evaluator::ExpressionEvaluator;
use crate::expression::Expression;
use crate::expression_state::{AggregateFlag, ExpressionState};
use crate::operator::{Operator, OperatorInputState, OperatorOutputState, QueryContext};
use crate::vector::Vector;
use ironvec_common::{Error, LogicalType, Result};
use std::sync::Arc;
use tracing::trace;

#[derive(Debug)]
pub struct AggregateOperator {
    aggregates: Vec<Expression>,
    /// Types of the incoming batches; used to bind an empty batch when the
    /// source finishes without a final one
    input_types: Vec<LogicalType>,
}

impl AggregateOperator {
    pub fn new(aggregates: Vec<Expression>, input_types: Vec<LogicalType>) -> Result<Self> {
        if let Some(expr) = aggregates
            .iter()
            .find(|e| !matches!(e, Expression::Aggregate { .. }))
        {
            return Err(Error::InvalidArguments(format!(
                "aggregate operator expects aggregate expressions, got {}",
                expr
            )));
        }
        Ok(AggregateOperator {
            aggregates,
            input_types,
        })
    }
}

impl Operator for AggregateOperator {
    fn name(&self) -> &str {
        "AGGREGATE"
    }

    fn output_types(&self) -> Vec<LogicalType> {
        self.aggregates.iter().map(|e| e.return_type()).collect()
    }

    fn init_output_state(&self, ctx: &QueryContext) -> OperatorOutputState {
        let capacity = ctx.config().vector_size;
        OperatorOutputState {
            expression_states: self
                .aggregates
                .iter()
                .map(|e| ExpressionState::new(e, capacity))
                .collect(),
            columns: self
                .aggregates
                .iter()
                .map(|e| Arc::new(Vector::new(e.return_type(), 1)))
                .collect(),
            ..Default::default()
        }
    }

    fn execute(
        &self,
        ctx: &QueryContext,
        input: &mut OperatorInputState,
        output: &mut OperatorOutputState,
    ) -> Result<()> {
        output.chunk = None;
        if output.finished {
            return Ok(());
        }

        let last = input.source_exhausted;
        let empty;
        let chunk = match input.chunk.as_ref() {
            Some(chunk) => chunk,
            None if last => {
                empty = {
                    let mut chunk = DataChunk::new(&self.input_types, 0);
                    chunk.finalize();
                    chunk
                };
                &empty
            }
            None => return Ok(()),
        };

        let mut evaluator = ExpressionEvaluator::new().with_strict_cast(ctx.config().strict_cast);
        evaluator.init(chunk);

        let OperatorOutputState {
            expression_states,
            columns,
            ..
        } = output;
        for ((expr, state), column) in self
            .aggregates
            .iter()
            .zip(expression_states.iter_mut())
            .zip(columns.iter_mut())
        {
            let flag = if !last {
                AggregateFlag::Running
            } else if state.has_accumulator() {
                AggregateFlag::Finish
            } else {
                AggregateFlag::RunAndFinish
            };
            if last {
                *column = Arc::new(Vector::new(expr.return_type(), 1));
            }
            state.set_aggregate_flag(flag)?;
            evaluator.evaluate(expr, state, column)?;
        }
        ctx.record_cast_failures(evaluator.cast_failures());

        if last {
            trace!(query_id = ctx.query_id(), "aggregate emitted its row");
            output.chunk = Some(DataChunk::from_columns(output.columns.clone()));
            output.finished = true;
        }
        Ok(())
    }
}
