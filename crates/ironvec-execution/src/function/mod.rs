//! Function-calling contract between the evaluator and the function registry
//!
//! The evaluator never looks inside these callables. It only supplies fully
//! evaluated argument columns and a destination column, in the order and
//! cardinality each expression kind prescribes.

pub mod aggregate;
pub mod cast;
pub mod kernel;
pub mod scalar;

use crate::chunk::DataChunk;
use crate::vector::{ColumnRef, Vector};
use ironvec_common::{Error, LogicalType, Result, Value};
use std::fmt;
use std::sync::Arc;

/// Body of a scalar function: reads the argument chunk, fills the output
pub type ScalarFunctionImpl = Arc<dyn Fn(&DataChunk, &mut ColumnRef) -> Result<()> + Send + Sync>;

/// A bound scalar function
#[derive(Clone)]
pub struct ScalarFunction {
    pub name: String,
    pub argument_types: Vec<LogicalType>,
    pub return_type: LogicalType,
    function: ScalarFunctionImpl,
}

impl ScalarFunction {
    pub fn new<F>(
        name: impl Into<String>,
        argument_types: Vec<LogicalType>,
        return_type: LogicalType,
        function: F,
    ) -> Self
    where
        F: Fn(&DataChunk, &mut ColumnRef) -> Result<()> + Send + Sync + 'static,
    {
        ScalarFunction {
            name: name.into(),
            argument_types,
            return_type,
            function: Arc::new(function),
        }
    }

    pub fn call(&self, input: &DataChunk, output: &mut ColumnRef) -> Result<()> {
        (self.function)(input, output)
    }
}

impl fmt::Debug for ScalarFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScalarFunction")
            .field("name", &self.name)
            .field("argument_types", &self.argument_types)
            .field("return_type", &self.return_type)
            .finish()
    }
}

/// Per-call context for a cast.
///
/// A cast that cannot convert a row nulls that row and records it here. In
/// strict mode the caller turns the first recorded failure into an error.
#[derive(Debug, Clone, Default)]
pub struct CastParameters {
    pub strict: bool,
    failed_rows: usize,
    first_failure: Option<String>,
}

impl CastParameters {
    pub fn new(strict: bool) -> Self {
        CastParameters {
            strict,
            ..Default::default()
        }
    }

    /// Record that `value` could not be converted
    pub fn record_failure(&mut self, value: impl fmt::Display) {
        if self.first_failure.is_none() {
            self.first_failure = Some(value.to_string());
        }
        self.failed_rows += 1;
    }

    pub fn failed_rows(&self) -> usize {
        self.failed_rows
    }

    pub fn all_converted(&self) -> bool {
        self.failed_rows == 0
    }

    /// The error a strict cast must raise, if any row failed
    pub fn strict_error(&self, target: &LogicalType) -> Option<Error> {
        if !self.strict {
            return None;
        }
        self.first_failure.as_ref().map(|value| Error::CastFailed {
            value: value.clone(),
            to: target.to_string(),
        })
    }
}

/// Body of a cast: `(input, output, row_count, parameters)`
pub type CastFunctionImpl =
    Arc<dyn Fn(&ColumnRef, &mut ColumnRef, usize, &mut CastParameters) -> Result<()> + Send + Sync>;

/// A bound conversion between two logical types
#[derive(Clone)]
pub struct CastFunction {
    pub source_type: LogicalType,
    pub target_type: LogicalType,
    function: CastFunctionImpl,
}

impl CastFunction {
    pub fn new<F>(source_type: LogicalType, target_type: LogicalType, function: F) -> Self
    where
        F: Fn(&ColumnRef, &mut ColumnRef, usize, &mut CastParameters) -> Result<()>
            + Send
            + Sync
            + 'static,
    {
        CastFunction {
            source_type,
            target_type,
            function: Arc::new(function),
        }
    }

    pub fn call(
        &self,
        input: &ColumnRef,
        output: &mut ColumnRef,
        count: usize,
        parameters: &mut CastParameters,
    ) -> Result<()> {
        (self.function)(input, output, count, parameters)
    }
}

impl fmt::Debug for CastFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CastFunction({} -> {})", self.source_type, self.target_type)
    }
}

/// Running state of one aggregate over a stream of batches
pub trait Accumulator: Send + fmt::Debug {
    /// Fold one column of input into the running state
    fn update(&mut self, input: &Vector) -> Result<()>;

    /// Produce the aggregate result
    fn finalize(&mut self) -> Result<Value>;
}

/// Creates a fresh accumulator; this is the aggregate's `init`
pub type AccumulatorFactory = Arc<dyn Fn() -> Box<dyn Accumulator> + Send + Sync>;

/// A bound aggregate function
#[derive(Clone)]
pub struct AggregateFunction {
    pub name: String,
    pub argument_type: LogicalType,
    pub return_type: LogicalType,
    init: AccumulatorFactory,
}

impl AggregateFunction {
    pub fn new<F>(
        name: impl Into<String>,
        argument_type: LogicalType,
        return_type: LogicalType,
        init: F,
    ) -> Self
    where
        F: Fn() -> Box<dyn Accumulator> + Send + Sync + 'static,
    {
        AggregateFunction {
            name: name.into(),
            argument_type,
            return_type,
            init: Arc::new(init),
        }
    }

    pub fn init(&self) -> Box<dyn Accumulator> {
        (self.init)()
    }
}

impl fmt::Debug for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateFunction")
            .field("name", &self.name)
            .field("argument_type", &self.argument_type)
            .field("return_type", &self.return_type)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cast_parameters_strict_error() {
        let mut lenient = CastParameters::new(false);
        lenient.record_failure(300);
        assert_eq!(lenient.failed_rows(), 1);
        assert!(lenient.strict_error(&LogicalType::TinyInt).is_none());

        let mut strict = CastParameters::new(true);
        assert!(strict.all_converted());
        strict.record_failure(300);
        strict.record_failure(400);
        assert_eq!(
            strict.strict_error(&LogicalType::TinyInt),
            Some(Error::CastFailed {
                value: "300".to_string(),
                to: "TINYINT".to_string()
            })
        );
    }
}
