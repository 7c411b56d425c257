//! Projection operator

use crate::chunk::DataChunk;
use crate::evaluator::ExpressionEvaluator;
use crate::expression::Expression;
use crate::expression_state::ExpressionState;
use crate::operator::{Operator, OperatorInputState, OperatorOutputState, QueryContext};
use crate::vector::Vector;
use ironvec_common::{LogicalType, Result};
use std::sync::Arc;

/// Evaluates one expression per output column
#[derive(Debug)]
pub struct ProjectionOperator {
    expressions: Vec<Expression>,
}

impl ProjectionOperator {
    pub fn new(expressions: Vec<Expression>) -> Self {
        ProjectionOperator { expressions }
    }
}

impl Operator for ProjectionOperator {
    fn name(&self) -> &str {
        "PROJECTION"
    }

    fn output_types(&self) -> Vec<LogicalType> {
        self.expressions.iter().map(|e| e.return_type()).collect()
    }

    fn init_output_state(&self, ctx: &QueryContext) -> OperatorOutputState {
        let capacity = ctx.config().vector_size;
        OperatorOutputState {
            expression_states: self
                .expressions
                .iter()
                .map(|e| ExpressionState::new(e, capacity))
                .collect(),
            columns: self
                .expressions
                .iter()
                .map(|e| Arc::new(Vector::new(e.return_type(), capacity)))
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
        let Some(chunk) = input.chunk.as_ref() else {
            return Ok(());
        };

        let mut evaluator = ExpressionEvaluator::new().with_strict_cast(ctx.config().strict_cast);
        evaluator.init(chunk);
        let rows = chunk.row_count();

        let OperatorOutputState {
            expression_states,
            columns,
            ..
        } = output;
        for ((expr, state), column) in self
            .expressions
            .iter()
            .zip(expression_states.iter_mut())
            .zip(columns.iter_mut())
        {
            evaluator.evaluate(expr, state, column)?;
            if column.len() == 1 && rows != 1 {
                *column = Arc::new(column.broadcast(rows)?);
            }
        }
        ctx.record_cast_failures(evaluator.cast_failures());

        output.chunk = Some(DataChunk::from_columns(output.columns.clone()));
        Ok(())
    }
}
