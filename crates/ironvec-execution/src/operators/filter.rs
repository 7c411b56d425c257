//! Filter operator

use crate::chunk::DataChunk;
use crate::evaluator::ExpressionEvaluator;
use crate::expression::Expression;
use crate::expression_state::ExpressionState;
use crate::operator::{Operator, OperatorInputState, OperatorOutputState, QueryContext};
use crate::vector::{row_index, Vector};
use ironvec_common::{Error, LogicalType, Result, Value};
use std::sync::Arc;

/// Keeps the rows for which a BOOLEAN predicate is true. NULL counts as false.
#[derive(Debug)]
pub struct FilterOperator {
    predicate: Expression,
    input_types: Vec<LogicalType>,
}

impl FilterOperator {
    pub fn new(predicate: Expression, input_types: Vec<LogicalType>) -> Result<Self> {
        let predicate_type = predicate.return_type();
        if predicate_type != LogicalType::Boolean {
            return Err(Error::TypeMismatch {
                expected: LogicalType::Boolean.to_string(),
                got: predicate_type.to_string(),
            });
        }
        Ok(FilterOperator {
            predicate,
            input_types,
        })
    }
}

impl Operator for FilterOperator {
    fn name(&self) -> &str {
        "FILTER"
    }

    fn output_types(&self) -> Vec<LogicalType> {
        self.input_types.clone()
    }

    fn init_output_state(&self, ctx: &QueryContext) -> OperatorOutputState {
        let capacity = ctx.config().vector_size;
        OperatorOutputState {
            expression_states: vec![ExpressionState::new(&self.predicate, capacity)],
            columns: vec![Arc::new(Vector::new(LogicalType::Boolean, capacity))],
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

        let (Some(state), Some(column)) = (
            output.expression_states.first_mut(),
            output.columns.first_mut(),
        ) else {
            return Err(Error::Internal(
                "filter executed without its output state".to_string(),
            ));
        };

        let mut evaluator = ExpressionEvaluator::new().with_strict_cast(ctx.config().strict_cast);
        evaluator.init(chunk);
        evaluator.evaluate(&self.predicate, state, column)?;
        ctx.record_cast_failures(evaluator.cast_failures());

        let selected: Vec<usize> = (0..chunk.row_count())
            .filter(|&row| column.get_value(row_index(column, row)) == Value::Boolean(true))
            .collect();

        output.chunk = Some(if selected.len() == chunk.row_count() {
            chunk.clone()
        } else {
            let columns = chunk
                .vectors
                .iter()
                .map(|v| v.select(&selected).map(Arc::new))
                .collect::<Result<Vec<_>>>()?;
            DataChunk::from_columns(columns)
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::scalar;
    use ironvec_common::ExecutionConfig;

    fn run_filter(threshold: i32) -> Option<DataChunk> {
        let ctx = QueryContext::new(1, ExecutionConfig::default());
        let predicate = Expression::function(
            scalar::greater_than(&LogicalType::Integer),
            vec![
                Expression::reference(0, LogicalType::Integer),
                Expression::value(threshold),
            ],
        );
        let filter = FilterOperator::new(predicate, vec![LogicalType::Integer]).unwrap();
        let mut output = filter.init_output_state(&ctx);
        let mut input = OperatorInputState {
            chunk: Some(DataChunk::from_columns(vec![Arc::new(Vector::from_native(&[
                Some(1i32),
                None,
                Some(5),
                Some(9),
            ]))])),
            source_exhausted: true,
        };
        filter.execute(&ctx, &mut input, &mut output).unwrap();
        output.chunk
    }

    #[test]
    fn test_filter_drops_false_and_null() {
        let chunk = run_filter(4).unwrap();
        assert_eq!(
            chunk.to_rows(),
            vec![vec![Value::Integer(5)], vec![Value::Integer(9)]]
        );
    }

    #[test]
    fn test_filter_everything_out() {
        let chunk = run_filter(100).unwrap();
        assert!(chunk.is_empty());
        assert_eq!(chunk.column_count(), 1);
    }

    #[test]
    fn test_predicate_must_be_boolean() {
        let err = FilterOperator::new(Expression::value(1), vec![]).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
    }
}
