//! Vectorized expression evaluation
//!
//! Evaluates a bound expression tree over one input batch at a time,
//! writing whole columns. Children are always evaluated before their
//! parent, left to right, each into its own scratch column.

use crate::chunk::DataChunk;
use crate::expression::Expression;
use crate::expression_state::{AggregateFlag, AggregateState, ExpressionState};
use crate::function::{AggregateFunction, CastFunction, CastParameters, ScalarFunction};
use crate::vector::{ColumnRef, Vector};
use ironvec_common::{Error, Result, Value};
use std::sync::Arc;
use tracing::{debug, error};

/// Evaluates expressions against the batch bound by [`init`](Self::init)
#[derive(Debug)]
pub struct ExpressionEvaluator<'a> {
    input: Option<&'a DataChunk>,
    in_aggregate: bool,
    strict_cast: bool,
    cast_failures: usize,
}

impl<'a> ExpressionEvaluator<'a> {
    pub fn new() -> Self {
        ExpressionEvaluator {
            input: None,
            in_aggregate: false,
            strict_cast: false,
            cast_failures: 0,
        }
    }

    /// Fail casts on the first unconvertible row instead of nulling it
    pub fn with_strict_cast(mut self, strict_cast: bool) -> Self {
        self.strict_cast = strict_cast;
        self
    }

    /// Bind the batch that `Reference` expressions read from
    pub fn init(&mut self, chunk: &'a DataChunk) {
        self.input = Some(chunk);
    }

    /// Rows nulled by casts since this evaluator was created
    pub fn cast_failures(&self) -> usize {
        self.cast_failures
    }

    /// Evaluate `expr` into `output`.
    ///
    /// `state` must have been built from `expr` by [`ExpressionState::new`].
    pub fn evaluate(
        &mut self,
        expr: &Expression,
        state: &mut ExpressionState,
        output: &mut ColumnRef,
    ) -> Result<()> {
        let ExpressionState {
            children,
            aggregate,
            ..
        } = state;
        self.execute(expr, children, aggregate.as_mut(), output)
    }

    fn evaluate_child(&mut self, expr: &Expression, state: &mut ExpressionState) -> Result<()> {
        let ExpressionState {
            output,
            children,
            aggregate,
        } = state;
        self.execute(expr, children, aggregate.as_mut(), output)
    }

    fn execute(
        &mut self,
        expr: &Expression,
        children: &mut [ExpressionState],
        aggregate: Option<&mut AggregateState>,
        output: &mut ColumnRef,
    ) -> Result<()> {
        match expr {
            Expression::Value(value) => execute_value(value, output),
            Expression::Reference { column_index, .. } => self.execute_reference(*column_index, output),
            Expression::Column { name, .. } => {
                error!(column = %name, "column lookup by name is not implemented");
                Err(Error::NotImplemented(format!("column reference by name: {}", name)))
            }
            Expression::Case { .. } => {
                error!("CASE expressions are not implemented");
                Err(Error::NotImplemented("CASE expression".to_string()))
            }
            Expression::In { .. } => {
                error!("IN expressions are not supported");
                Err(Error::NotSupported("IN expression".to_string()))
            }
            Expression::Cast { child, function } => {
                let child_state = single_child(expr, children)?;
                self.execute_cast(child, child_state, function, output)
            }
            Expression::Function {
                function,
                arguments,
            } => self.execute_function(expr, arguments, children, function, output),
            Expression::Aggregate { function, argument } => {
                if self.in_aggregate {
                    error!(expression = %expr, "aggregate nested inside an aggregate");
                    return Err(Error::RecursiveAggregate(expr.to_string()));
                }
                if function.return_type != output.logical_type {
                    let err = Error::TypeMismatch {
                        expected: output.logical_type.to_string(),
                        got: function.return_type.to_string(),
                    };
                    error!(expression = %expr, "{}", err);
                    return Err(err);
                }
                let aggregate = aggregate.ok_or_else(|| {
                    Error::Internal(format!("no aggregate state for {}", expr))
                })?;
                let child_state = single_child(expr, children)?;

                self.in_aggregate = true;
                let result = self.execute_aggregate(function, argument, child_state, aggregate, output);
                self.in_aggregate = false;
                result
            }
        }
    }

    fn execute_reference(&self, column_index: usize, output: &mut ColumnRef) -> Result<()> {
        let input = self.input.ok_or_else(|| {
            error!("reference evaluated before a batch was bound");
            Error::EvaluatorNotInitialized
        })?;
        let column = input.column_ref(column_index).ok_or_else(|| {
            error!(column_index, column_count = input.column_count(), "column index out of range");
            Error::InvalidColumnIndex {
                index: column_index,
                column_count: input.column_count(),
            }
        })?;
        *output = Arc::clone(column);
        Ok(())
    }

    fn execute_cast(
        &mut self,
        child: &Expression,
        child_state: &mut ExpressionState,
        function: &CastFunction,
        output: &mut ColumnRef,
    ) -> Result<()> {
        self.evaluate_child(child, child_state)?;
        let count = child_state.output.len();
        let mut parameters = CastParameters::new(self.strict_cast);

        if let Err(err) = function.call(&child_state.output, output, count, &mut parameters) {
            error!(from = %function.source_type, to = %function.target_type, "{}", err);
            return Err(err);
        }

        if !parameters.all_converted() {
            self.cast_failures += parameters.failed_rows();
            debug!(
                from = %function.source_type,
                to = %function.target_type,
                failed_rows = parameters.failed_rows(),
                "cast nulled unconvertible rows"
            );
            if let Some(err) = parameters.strict_error(&function.target_type) {
                error!("{}", err);
                return Err(err);
            }
        }
        Ok(())
    }

    fn execute_function(
        &mut self,
        expr: &Expression,
        arguments: &[Expression],
        children: &mut [ExpressionState],
        function: &ScalarFunction,
        output: &mut ColumnRef,
    ) -> Result<()> {
        if arguments.len() != children.len() {
            return Err(state_mismatch(expr));
        }
        for (argument, child_state) in arguments.iter().zip(children.iter_mut()) {
            self.evaluate_child(argument, child_state)?;
        }

        let chunk = DataChunk::from_columns(
            children
                .iter()
                .map(|child| Arc::clone(&child.output))
                .collect(),
        );
        function.call(&chunk, output)
    }

    fn execute_aggregate(
        &mut self,
        function: &AggregateFunction,
        argument: &Expression,
        child_state: &mut ExpressionState,
        aggregate: &mut AggregateState,
        output: &mut ColumnRef,
    ) -> Result<()> {
        self.evaluate_child(argument, child_state)?;
        let input = &child_state.output;

        let value = match aggregate.flag {
            AggregateFlag::Uninitialized | AggregateFlag::Running => {
                let accumulator = aggregate.accumulator.get_or_insert_with(|| function.init());
                aggregate.flag = AggregateFlag::Running;
                return accumulator.update(input);
            }
            AggregateFlag::Finish => {
                let mut accumulator = aggregate
                    .accumulator
                    .take()
                    .unwrap_or_else(|| function.init());
                aggregate.flag = AggregateFlag::Uninitialized;
                accumulator.update(input)?;
                accumulator.finalize()?
            }
            AggregateFlag::RunAndFinish => {
                aggregate.accumulator = None;
                aggregate.flag = AggregateFlag::Uninitialized;
                let mut accumulator = function.init();
                accumulator.update(input)?;
                accumulator.finalize()?
            }
        };

        debug!(aggregate = %function.name, result = %value, "aggregate finalized");
        Arc::make_mut(output).append_value(value)
    }
}

impl Default for ExpressionEvaluator<'_> {
    fn default() -> Self {
        Self::new()
    }
}

fn execute_value(value: &Value, output: &mut ColumnRef) -> Result<()> {
    let vector = Vector::prepare_output(output);
    vector.set_value(0, value.clone())?;
    vector.finalize(1);
    Ok(())
}

fn single_child<'s>(
    expr: &Expression,
    children: &'s mut [ExpressionState],
) -> Result<&'s mut ExpressionState> {
    match children {
        [child] => Ok(child),
        _ => Err(state_mismatch(expr)),
    }
}

fn state_mismatch(expr: &Expression) -> Error {
    error!(expression = %expr, "expression state does not match its expression");
    Error::Internal(format!("expression state does not match {}", expr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::{aggregate, cast::bind_cast, scalar};
    use ironvec_common::LogicalType;

    fn int_chunk(values: &[i32]) -> DataChunk {
        let column: Vec<Option<i32>> = values.iter().copied().map(Some).collect();
        DataChunk::from_columns(vec![Arc::new(Vector::from_native(&column))])
    }

    fn output_for(expr: &Expression) -> ColumnRef {
        Arc::new(Vector::new(expr.return_type(), 16))
    }

    fn sum_expr() -> Expression {
        Expression::aggregate(
            aggregate::sum(&LogicalType::Integer).unwrap(),
            Expression::reference(0, LogicalType::Integer),
        )
    }

    #[test]
    fn test_value_is_length_one() {
        let expr = Expression::value(42);
        let mut state = ExpressionState::new(&expr, 16);
        let mut output = output_for(&expr);
        let mut evaluator = ExpressionEvaluator::new();

        evaluator.evaluate(&expr, &mut state, &mut output).unwrap();
        evaluator.evaluate(&expr, &mut state, &mut output).unwrap();
        assert_eq!(output.to_values(), vec![Value::Integer(42)]);
    }

    #[test]
    fn test_reference_aliases_input() {
        let chunk = int_chunk(&[1, 2, 3]);
        let expr = Expression::reference(0, LogicalType::Integer);
        let mut state = ExpressionState::new(&expr, 16);
        let mut output = output_for(&expr);
        let mut evaluator = ExpressionEvaluator::new();
        evaluator.init(&chunk);

        evaluator.evaluate(&expr, &mut state, &mut output).unwrap();
        assert!(Arc::ptr_eq(&output, &chunk.vectors[0]));
    }

    #[test]
    fn test_reference_errors() {
        let expr = Expression::reference(1, LogicalType::Integer);
        let mut state = ExpressionState::new(&expr, 16);
        let mut output = output_for(&expr);

        let mut evaluator = ExpressionEvaluator::new();
        assert_eq!(
            evaluator.evaluate(&expr, &mut state, &mut output),
            Err(Error::EvaluatorNotInitialized)
        );

        let chunk = int_chunk(&[1]);
        evaluator.init(&chunk);
        assert_eq!(
            evaluator.evaluate(&expr, &mut state, &mut output),
            Err(Error::InvalidColumnIndex {
                index: 1,
                column_count: 1
            })
        );
    }

    #[test]
    fn test_function_is_idempotent() {
        let chunk = int_chunk(&[1, 2, 3]);
        let expr = Expression::function(
            scalar::multiply(&LogicalType::Integer).unwrap(),
            vec![
                Expression::reference(0, LogicalType::Integer),
                Expression::value(10),
            ],
        );
        let mut state = ExpressionState::new(&expr, 16);
        let mut output = output_for(&expr);
        let mut evaluator = ExpressionEvaluator::new();
        evaluator.init(&chunk);

        evaluator.evaluate(&expr, &mut state, &mut output).unwrap();
        let first = output.to_values();
        evaluator.evaluate(&expr, &mut state, &mut output).unwrap();
        assert_eq!(output.to_values(), first);
        assert_eq!(
            first,
            vec![Value::Integer(10), Value::Integer(20), Value::Integer(30)]
        );
    }

    #[test]
    fn test_nested_functions() {
        let chunk = int_chunk(&[5, 7]);
        let inner = Expression::function(
            scalar::add(&LogicalType::Integer).unwrap(),
            vec![
                Expression::reference(0, LogicalType::Integer),
                Expression::reference(0, LogicalType::Integer),
            ],
        );
        let expr = Expression::function(
            scalar::greater_than(&LogicalType::Integer),
            vec![inner, Expression::value(12)],
        );
        let mut state = ExpressionState::new(&expr, 16);
        let mut output = output_for(&expr);
        let mut evaluator = ExpressionEvaluator::new();
        evaluator.init(&chunk);

        evaluator.evaluate(&expr, &mut state, &mut output).unwrap();
        assert_eq!(
            output.to_values(),
            vec![Value::Boolean(false), Value::Boolean(true)]
        );
    }

    #[test]
    fn test_cast_round_trip() {
        let chunk = int_chunk(&[-1, 0, 123456]);
        let to_text = bind_cast(&LogicalType::Integer, &LogicalType::Varchar).unwrap();
        let to_int = bind_cast(&LogicalType::Varchar, &LogicalType::Integer).unwrap();
        let expr = Expression::cast(
            Expression::cast(Expression::reference(0, LogicalType::Integer), to_text),
            to_int,
        );
        let mut state = ExpressionState::new(&expr, 16);
        let mut output = output_for(&expr);
        let mut evaluator = ExpressionEvaluator::new();
        evaluator.init(&chunk);

        evaluator.evaluate(&expr, &mut state, &mut output).unwrap();
        assert_eq!(output.to_values(), chunk.column(0).to_values());
        assert_eq!(evaluator.cast_failures(), 0);
    }

    #[test]
    fn test_cast_out_of_range() {
        let chunk = int_chunk(&[1, 1000]);
        let narrow = bind_cast(&LogicalType::Integer, &LogicalType::TinyInt).unwrap();
        let expr = Expression::cast(Expression::reference(0, LogicalType::Integer), narrow);
        let mut state = ExpressionState::new(&expr, 16);
        let mut output = output_for(&expr);

        let mut evaluator = ExpressionEvaluator::new();
        evaluator.init(&chunk);
        evaluator.evaluate(&expr, &mut state, &mut output).unwrap();
        assert_eq!(output.to_values(), vec![Value::TinyInt(1), Value::Null]);
        assert_eq!(evaluator.cast_failures(), 1);

        let mut strict = ExpressionEvaluator::new().with_strict_cast(true);
        strict.init(&chunk);
        let err = strict.evaluate(&expr, &mut state, &mut output).unwrap_err();
        assert!(matches!(err, Error::CastFailed { .. }));
    }

    #[test]
    fn test_aggregate_running_then_finish() {
        let expr = sum_expr();
        let mut state = ExpressionState::new(&expr, 16);
        let mut output = output_for(&expr);
        let batches = [int_chunk(&[1, 2]), int_chunk(&[3]), int_chunk(&[4, 5])];
        let flags = [
            AggregateFlag::Running,
            AggregateFlag::Running,
            AggregateFlag::Finish,
        ];

        for (batch, flag) in batches.iter().zip(flags) {
            let mut evaluator = ExpressionEvaluator::new();
            evaluator.init(batch);
            state.set_aggregate_flag(flag).unwrap();
            evaluator.evaluate(&expr, &mut state, &mut output).unwrap();
            if flag == AggregateFlag::Running {
                assert!(state.has_accumulator());
                assert!(output.is_empty());
            }
        }

        assert_eq!(output.to_values(), vec![Value::BigInt(15)]);
        assert!(!state.has_accumulator());
        assert_eq!(state.aggregate_flag(), Some(AggregateFlag::Uninitialized));
    }

    #[test]
    fn test_aggregate_run_and_finish() {
        let expr = sum_expr();
        let mut state = ExpressionState::new(&expr, 16);
        let mut output = output_for(&expr);
        let chunk = int_chunk(&[1, 2, 3, 4, 5]);
        let mut evaluator = ExpressionEvaluator::new();
        evaluator.init(&chunk);

        state.set_aggregate_flag(AggregateFlag::RunAndFinish).unwrap();
        evaluator.evaluate(&expr, &mut state, &mut output).unwrap();
        assert_eq!(output.to_values(), vec![Value::BigInt(15)]);
    }

    #[test]
    fn test_uninitialized_behaves_as_running() {
        let expr = sum_expr();
        let mut state = ExpressionState::new(&expr, 16);
        let mut output = output_for(&expr);
        let chunk = int_chunk(&[4]);
        let mut evaluator = ExpressionEvaluator::new();
        evaluator.init(&chunk);

        evaluator.evaluate(&expr, &mut state, &mut output).unwrap();
        assert_eq!(state.aggregate_flag(), Some(AggregateFlag::Running));
        assert!(state.has_accumulator());

        state.set_aggregate_flag(AggregateFlag::Finish).unwrap();
        evaluator.evaluate(&expr, &mut state, &mut output).unwrap();
        assert_eq!(output.to_values(), vec![Value::BigInt(8)]);
    }

    #[test]
    fn test_recursive_aggregate_rejected() {
        let inner = sum_expr();
        let expr = Expression::aggregate(aggregate::count(&LogicalType::BigInt), inner);
        let mut state = ExpressionState::new(&expr, 16);
        let mut output = output_for(&expr);
        let chunk = int_chunk(&[1]);
        let mut evaluator = ExpressionEvaluator::new();
        evaluator.init(&chunk);

        let err = evaluator.evaluate(&expr, &mut state, &mut output).unwrap_err();
        assert!(matches!(err, Error::RecursiveAggregate(_)));
        assert!(!state.has_accumulator());
        assert!(!state.children()[0].has_accumulator());

        // The marker is cleared, so a plain aggregate still works afterwards
        let plain = sum_expr();
        let mut plain_state = ExpressionState::new(&plain, 16);
        let mut plain_output = output_for(&plain);
        evaluator
            .evaluate(&plain, &mut plain_state, &mut plain_output)
            .unwrap();
    }

    #[test]
    fn test_aggregate_type_mismatch() {
        let expr = sum_expr();
        let mut state = ExpressionState::new(&expr, 16);
        let mut output: ColumnRef = Arc::new(Vector::new(LogicalType::Integer, 1));
        let chunk = int_chunk(&[1]);
        let mut evaluator = ExpressionEvaluator::new();
        evaluator.init(&chunk);

        let err = evaluator.evaluate(&expr, &mut state, &mut output).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
        assert!(!state.has_accumulator());
    }

    #[test]
    fn test_unimplemented_kinds() {
        let mut evaluator = ExpressionEvaluator::new();
        let exprs = [
            Expression::column("a", LogicalType::Integer),
            Expression::Case {
                when_clauses: vec![],
                else_result: None,
                return_type: LogicalType::Integer,
            },
            Expression::In {
                input: Box::new(Expression::value(1)),
                list: vec![Expression::value(1)],
                negated: false,
            },
        ];
        let results: Vec<Error> = exprs
            .iter()
            .map(|expr| {
                let mut state = ExpressionState::new(expr, 1);
                let mut output = output_for(expr);
                evaluator
                    .evaluate(expr, &mut state, &mut output)
                    .unwrap_err()
            })
            .collect();
        assert!(matches!(results[0], Error::NotImplemented(_)));
        assert!(matches!(results[1], Error::NotImplemented(_)));
        assert!(matches!(results[2], Error::NotSupported(_)));
    }
}
