//! Built-in scalar functions
//!
//! Integer arithmetic is checked: a row that overflows (or divides by zero)
//! becomes NULL instead of wrapping. Decimal results are rounded to the
//! column's scale and a result wider than the column becomes NULL.

use super::cast::fit_decimal;
use super::kernel::{binary_execute, value_binary_execute};
use super::ScalarFunction;
use crate::vector::NativeType;
use ironvec_common::{Error, LogicalType, Result, Value};
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArithmeticOp {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl ArithmeticOp {
    fn name(self) -> &'static str {
        match self {
            ArithmeticOp::Add => "add",
            ArithmeticOp::Subtract => "subtract",
            ArithmeticOp::Multiply => "multiply",
            ArithmeticOp::Divide => "divide",
        }
    }
}

trait Arithmetic: NativeType {
    fn apply(op: ArithmeticOp, left: Self, right: Self) -> Option<Self>;
}

macro_rules! checked_arithmetic {
    ($($t:ty),*) => {
        $(
            impl Arithmetic for $t {
                fn apply(op: ArithmeticOp, left: Self, right: Self) -> Option<Self> {
                    match op {
                        ArithmeticOp::Add => left.checked_add(right),
                        ArithmeticOp::Subtract => left.checked_sub(right),
                        ArithmeticOp::Multiply => left.checked_mul(right),
                        ArithmeticOp::Divide => left.checked_div(right),
                    }
                }
            }
        )*
    };
}

macro_rules! float_arithmetic {
    ($($t:ty),*) => {
        $(
            impl Arithmetic for $t {
                fn apply(op: ArithmeticOp, left: Self, right: Self) -> Option<Self> {
                    let result = match op {
                        ArithmeticOp::Add => left + right,
                        ArithmeticOp::Subtract => left - right,
                        ArithmeticOp::Multiply => left * right,
                        ArithmeticOp::Divide if right == 0.0 => return None,
                        ArithmeticOp::Divide => left / right,
                    };
                    result.is_finite().then_some(result)
                }
            }
        )*
    };
}

checked_arithmetic!(i8, i16, i32, i64);
float_arithmetic!(f32, f64);

fn native_arithmetic<T: Arithmetic>(op: ArithmeticOp, logical_type: &LogicalType) -> ScalarFunction {
    ScalarFunction::new(
        op.name(),
        vec![logical_type.clone(), logical_type.clone()],
        logical_type.clone(),
        move |input, output| binary_execute::<T, T, T, _>(input, output, |l, r| T::apply(op, l, r)),
    )
}

fn arithmetic(op: ArithmeticOp, logical_type: &LogicalType) -> Result<ScalarFunction> {
    match logical_type {
        LogicalType::TinyInt => Ok(native_arithmetic::<i8>(op, logical_type)),
        LogicalType::SmallInt => Ok(native_arithmetic::<i16>(op, logical_type)),
        LogicalType::Integer => Ok(native_arithmetic::<i32>(op, logical_type)),
        LogicalType::BigInt => Ok(native_arithmetic::<i64>(op, logical_type)),
        LogicalType::Float => Ok(native_arithmetic::<f32>(op, logical_type)),
        LogicalType::Double => Ok(native_arithmetic::<f64>(op, logical_type)),
        LogicalType::Decimal { width, scale } => {
            let (width, scale) = (*width, *scale);
            Ok(ScalarFunction::new(
                op.name(),
                vec![logical_type.clone(), logical_type.clone()],
                logical_type.clone(),
                move |input, output| {
                    value_binary_execute(input, output, |l, r| match (l, r) {
                        (Value::Decimal(a), Value::Decimal(b)) => Ok(match op {
                            ArithmeticOp::Add => a.checked_add(*b),
                            ArithmeticOp::Subtract => a.checked_sub(*b),
                            ArithmeticOp::Multiply => a.checked_mul(*b),
                            ArithmeticOp::Divide => a.checked_div(*b),
                        }
                        .and_then(|d| fit_decimal(d, width, scale))
                        .map(Value::Decimal)),
                        _ => Err(Error::TypeMismatch {
                            expected: "DECIMAL".to_string(),
                            got: format!("{}, {}", l.logical_type(), r.logical_type()),
                        }),
                    })
                },
            ))
        }
        other => Err(Error::InvalidArguments(format!(
            "{} is not defined for {}",
            op.name(),
            other
        ))),
    }
}

/// `a + b` for two columns of `logical_type`
pub fn add(logical_type: &LogicalType) -> Result<ScalarFunction> {
    arithmetic(ArithmeticOp::Add, logical_type)
}

/// `a - b` for two columns of `logical_type`
pub fn subtract(logical_type: &LogicalType) -> Result<ScalarFunction> {
    arithmetic(ArithmeticOp::Subtract, logical_type)
}

/// `a * b` for two columns of `logical_type`
pub fn multiply(logical_type: &LogicalType) -> Result<ScalarFunction> {
    arithmetic(ArithmeticOp::Multiply, logical_type)
}

/// `a / b` for two columns of `logical_type`; division by zero yields NULL
pub fn divide(logical_type: &LogicalType) -> Result<ScalarFunction> {
    arithmetic(ArithmeticOp::Divide, logical_type)
}

fn comparison(
    name: &str,
    logical_type: &LogicalType,
    accept: fn(Ordering) -> bool,
) -> ScalarFunction {
    ScalarFunction::new(
        name,
        vec![logical_type.clone(), logical_type.clone()],
        LogicalType::Boolean,
        move |input, output| {
            value_binary_execute(input, output, |l, r| {
                Ok(l.partial_cmp(r).map(|ord| Value::Boolean(accept(ord))))
            })
        },
    )
}

pub fn equal(logical_type: &LogicalType) -> ScalarFunction {
    comparison("equal", logical_type, |ord| ord == Ordering::Equal)
}

pub fn not_equal(logical_type: &LogicalType) -> ScalarFunction {
    comparison("not_equal", logical_type, |ord| ord != Ordering::Equal)
}

pub fn less_than(logical_type: &LogicalType) -> ScalarFunction {
    comparison("less_than", logical_type, |ord| ord == Ordering::Less)
}

pub fn greater_than(logical_type: &LogicalType) -> ScalarFunction {
    comparison("greater_than", logical_type, |ord| ord == Ordering::Greater)
}

/// String concatenation of two VARCHAR columns
pub fn concat() -> ScalarFunction {
    ScalarFunction::new(
        "concat",
        vec![LogicalType::Varchar, LogicalType::Varchar],
        LogicalType::Varchar,
        |input, output| {
            value_binary_execute(input, output, |l, r| match (l, r) {
                (Value::Varchar(a), Value::Varchar(b)) => {
                    let mut joined = String::with_capacity(a.len() + b.len());
                    joined.push_str(a);
                    joined.push_str(b);
                    Ok(Some(Value::Varchar(joined)))
                }
                _ => Err(Error::TypeMismatch {
                    expected: "VARCHAR".to_string(),
                    got: format!("{}, {}", l.logical_type(), r.logical_type()),
                }),
            })
        },
    )
}
