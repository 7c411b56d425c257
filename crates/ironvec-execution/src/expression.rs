//! Bound expression trees
//!
//! An `Expression` is produced by the planner with every function already
//! resolved, so evaluation never looks anything up by name. Trees are
//! immutable and shared; all mutable evaluation state lives in the matching
//! [`ExpressionState`](crate::expression_state::ExpressionState) tree.

use crate::function::{AggregateFunction, CastFunction, ScalarFunction};
use ironvec_common::{LogicalType, Value};
use std::fmt;

/// A bound expression
#[derive(Debug, Clone)]
pub enum Expression {
    /// Constant scalar
    Value(Value),
    /// Column of the current input batch, by position
    Reference {
        column_index: usize,
        return_type: LogicalType,
    },
    /// Column by name; resolved to a `Reference` by the planner
    Column { name: String, return_type: LogicalType },
    /// Conversion of the child's result
    Cast {
        child: Box<Expression>,
        function: CastFunction,
    },
    /// CASE WHEN ... THEN ... ELSE ... END
    Case {
        when_clauses: Vec<(Expression, Expression)>,
        else_result: Option<Box<Expression>>,
        return_type: LogicalType,
    },
    /// Scalar function call
    Function {
        function: ScalarFunction,
        arguments: Vec<Expression>,
    },
    /// Aggregate over a single argument
    Aggregate {
        function: AggregateFunction,
        argument: Box<Expression>,
    },
    /// `input [NOT] IN (list)`
    In {
        input: Box<Expression>,
        list: Vec<Expression>,
        negated: bool,
    },
}

impl Expression {
    pub fn value(value: impl Into<Value>) -> Self {
        Expression::Value(value.into())
    }

    pub fn reference(column_index: usize, return_type: LogicalType) -> Self {
        Expression::Reference {
            column_index,
            return_type,
        }
    }

    pub fn column(name: impl Into<String>, return_type: LogicalType) -> Self {
        Expression::Column {
            name: name.into(),
            return_type,
        }
    }

    pub fn cast(child: Expression, function: CastFunction) -> Self {
        Expression::Cast {
            child: Box::new(child),
            function,
        }
    }

    pub fn function(function: ScalarFunction, arguments: Vec<Expression>) -> Self {
        Expression::Function {
            function,
            arguments,
        }
    }

    pub fn aggregate(function: AggregateFunction, argument: Expression) -> Self {
        Expression::Aggregate {
            function,
            argument: Box::new(argument),
        }
    }

    /// The type of the column this expression produces
    pub fn return_type(&self) -> LogicalType {
        match self {
            Expression::Value(value) => value.logical_type(),
            Expression::Reference { return_type, .. }
            | Expression::Column { return_type, .. }
            | Expression::Case { return_type, .. } => return_type.clone(),
            Expression::Cast { function, .. } => function.target_type.clone(),
            Expression::Function { function, .. } => function.return_type.clone(),
            Expression::Aggregate { function, .. } => function.return_type.clone(),
            Expression::In { .. } => LogicalType::Boolean,
        }
    }

    /// Direct children, in evaluation order
    pub fn children(&self) -> Vec<&Expression> {
        match self {
            Expression::Value(_) | Expression::Reference { .. } | Expression::Column { .. } => {
                Vec::new()
            }
            Expression::Cast { child, .. } => vec![child.as_ref()],
            Expression::Aggregate { argument, .. } => vec![argument.as_ref()],
            Expression::Function { arguments, .. } => arguments.iter().collect(),
            Expression::Case {
                when_clauses,
                else_result,
                ..
            } => when_clauses
                .iter()
                .flat_map(|(when, then)| [when, then])
                .chain(else_result.as_deref())
                .collect(),
            Expression::In { input, list, .. } => {
                std::iter::once(input.as_ref()).chain(list.iter()).collect()
            }
        }
    }

    /// True if this expression or any descendant is an aggregate
    pub fn contains_aggregate(&self) -> bool {
        matches!(self, Expression::Aggregate { .. })
            || self.children().iter().any(|child| child.contains_aggregate())
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expression]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Value(Value::Varchar(s)) => write!(f, "'{}'", s),
            Expression::Value(value) => write!(f, "{}", value),
            Expression::Reference { column_index, .. } => write!(f, "#{}", column_index),
            Expression::Column { name, .. } => write!(f, "{}", name),
            Expression::Cast { child, function } => {
                write!(f, "CAST({} AS {})", child, function.target_type)
            }
            Expression::Case {
                when_clauses,
                else_result,
                ..
            } => {
                write!(f, "CASE")?;
                for (when, then) in when_clauses {
                    write!(f, " WHEN {} THEN {}", when, then)?;
                }
                if let Some(else_result) = else_result {
                    write!(f, " ELSE {}", else_result)?;
                }
                write!(f, " END")
            }
            Expression::Function {
                function,
                arguments,
            } => {
                write!(f, "{}(", function.name)?;
                write_list(f, arguments)?;
                write!(f, ")")
            }
            Expression::Aggregate { function, argument } => {
                write!(f, "{}({})", function.name, argument)
            }
            Expression::In {
                input,
                list,
                negated,
            } => {
                write!(f, "{} {}IN (", input, if *negated { "NOT " } else { "" })?;
                write_list(f, list)?;
                write!(f, ")")
            }
        }
    }
}
