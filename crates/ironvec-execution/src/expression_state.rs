//! Per-task evaluation state
//!
//! An `ExpressionState` tree mirrors its `Expression` tree node for node.
//! Each node owns a scratch output column and, for aggregates, the running
//! accumulator and its lifecycle flag. State trees are never shared between
//! tasks.

use crate::expression::Expression;
use crate::function::Accumulator;
use crate::vector::{ColumnRef, Vector};
use ironvec_common::{Error, Result};
use std::sync::Arc;

/// What the next evaluation of an aggregate node should do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AggregateFlag {
    /// No accumulator yet; behaves like `Running` after creating one
    #[default]
    Uninitialized,
    /// Fold the batch into the accumulator, produce no output
    Running,
    /// Fold the batch, then emit the result and reset
    Finish,
    /// Fresh accumulator, single batch, emit the result
    RunAndFinish,
}

/// Accumulator slot of an aggregate node
#[derive(Debug, Default)]
pub struct AggregateState {
    pub(crate) flag: AggregateFlag,
    pub(crate) accumulator: Option<Box<dyn Accumulator>>,
}

/// Evaluation state for one expression node
#[derive(Debug)]
pub struct ExpressionState {
    pub(crate) output: ColumnRef,
    pub(crate) children: Vec<ExpressionState>,
    pub(crate) aggregate: Option<AggregateState>,
}

impl ExpressionState {
    /// Build the state tree for `expr`, pre-sizing scratch columns to `capacity` rows
    pub fn new(expr: &Expression, capacity: usize) -> Self {
        let children = expr
            .children()
            .into_iter()
            .map(|child| ExpressionState::new(child, capacity))
            .collect();

        let (capacity, aggregate) = match expr {
            // References alias their input column and never write to scratch
            Expression::Reference { .. } => (0, None),
            Expression::Aggregate { .. } => (1, Some(AggregateState::default())),
            _ => (capacity, None),
        };

        ExpressionState {
            output: Arc::new(Vector::new(expr.return_type(), capacity)),
            children,
            aggregate,
        }
    }

    /// Scratch column holding this node's most recent result
    pub fn output(&self) -> &ColumnRef {
        &self.output
    }

    pub fn children(&self) -> &[ExpressionState] {
        &self.children
    }

    pub fn children_mut(&mut self) -> &mut [ExpressionState] {
        &mut self.children
    }

    /// The lifecycle flag, if this is an aggregate node
    pub fn aggregate_flag(&self) -> Option<AggregateFlag> {
        self.aggregate.as_ref().map(|agg| agg.flag)
    }

    /// Tell an aggregate node what its next evaluation should do
    pub fn set_aggregate_flag(&mut self, flag: AggregateFlag) -> Result<()> {
        match &mut self.aggregate {
            Some(agg) => {
                agg.flag = flag;
                Ok(())
            }
            None => Err(Error::Internal(
                "aggregate flag set on a non-aggregate expression state".to_string(),
            )),
        }
    }

    /// True while an aggregate node holds a live accumulator
    pub fn has_accumulator(&self) -> bool {
        self.aggregate
            .as_ref()
            .map_or(false, |agg| agg.accumulator.is_some())
    }
}
