//! Built-in aggregate functions
//!
//! Every accumulator skips NULL inputs. `sum`, `min`, `max` and `avg` over an
//! input with no non-NULL rows produce NULL; `count` produces 0.

use super::{Accumulator, AggregateFunction};
use crate::vector::Vector;
use ironvec_common::{Error, LogicalType, Result, Value};
use rust_decimal::Decimal;
use std::cmp::Ordering;

#[derive(Debug, Default)]
struct IntegerSum {
    sum: i128,
    seen: bool,
}

impl Accumulator for IntegerSum {
    fn update(&mut self, input: &Vector) -> Result<()> {
        for value in input.to_values() {
            if let Some(i) = value.as_i64() {
                self.sum = self.sum.checked_add(i as i128).ok_or_else(|| Error::Overflow {
                    operation: "sum".to_string(),
                })?;
                self.seen = true;
            }
        }
        Ok(())
    }

    fn finalize(&mut self) -> Result<Value> {
        if !self.seen {
            return Ok(Value::Null);
        }
        i64::try_from(self.sum)
            .map(Value::BigInt)
            .map_err(|_| Error::Overflow {
                operation: "sum".to_string(),
            })
    }
}

#[derive(Debug, Default)]
struct FloatSum {
    sum: f64,
    seen: bool,
}

impl Accumulator for FloatSum {
    fn update(&mut self, input: &Vector) -> Result<()> {
        for value in input.to_values() {
            if let Some(f) = value.as_f64() {
                self.sum += f;
                self.seen = true;
            }
        }
        Ok(())
    }

    fn finalize(&mut self) -> Result<Value> {
        Ok(if self.seen {
            Value::Double(self.sum)
        } else {
            Value::Null
        })
    }
}

#[derive(Debug, Default)]
struct DecimalSum {
    sum: Option<Decimal>,
}

impl Accumulator for DecimalSum {
    fn update(&mut self, input: &Vector) -> Result<()> {
        for value in input.to_values() {
            if let Value::Decimal(d) = value {
                let current = self.sum.unwrap_or(Decimal::ZERO);
                self.sum = Some(current.checked_add(d).ok_or_else(|| Error::Overflow {
                    operation: "sum".to_string(),
                })?);
            }
        }
        Ok(())
    }

    fn finalize(&mut self) -> Result<Value> {
        Ok(self.sum.map(Value::Decimal).unwrap_or(Value::Null))
    }
}

#[derive(Debug, Default)]
struct Count {
    count: i64,
}

impl Accumulator for Count {
    fn update(&mut self, input: &Vector) -> Result<()> {
        self.count += (0..input.len()).filter(|&i| input.is_valid(i)).count() as i64;
        Ok(())
    }

    fn finalize(&mut self) -> Result<Value> {
        Ok(Value::BigInt(self.count))
    }
}

/// Keeps the value that wins against `keep`
#[derive(Debug)]
struct Extremum {
    keep: Ordering,
    current: Option<Value>,
}

impl Accumulator for Extremum {
    fn update(&mut self, input: &Vector) -> Result<()> {
        for value in input.to_values() {
            if value.is_null() {
                continue;
            }
            let replace = match &self.current {
                None => true,
                Some(current) => value.partial_cmp(current) == Some(self.keep),
            };
            if replace {
                self.current = Some(value);
            }
        }
        Ok(())
    }

    fn finalize(&mut self) -> Result<Value> {
        Ok(self.current.clone().unwrap_or(Value::Null))
    }
}

#[derive(Debug, Default)]
struct Average {
    sum: f64,
    count: i64,
}

impl Accumulator for Average {
    fn update(&mut self, input: &Vector) -> Result<()> {
        for value in input.to_values() {
            if let Some(f) = value.as_f64() {
                self.sum += f;
                self.count += 1;
            }
        }
        Ok(())
    }

    fn finalize(&mut self) -> Result<Value> {
        if self.count == 0 {
            Ok(Value::Null)
        } else {
            Ok(Value::Double(self.sum / self.count as f64))
        }
    }
}

fn require_numeric(name: &str, argument_type: &LogicalType) -> Result<()> {
    if argument_type.is_numeric() {
        Ok(())
    } else {
        Err(Error::InvalidArguments(format!(
            "{} is not defined for {}",
            name, argument_type
        )))
    }
}

/// SUM: BIGINT for integers, DOUBLE for floating point, DECIMAL(38, s) for decimals
pub fn sum(argument_type: &LogicalType) -> Result<AggregateFunction> {
    require_numeric("sum", argument_type)?;
    let function = match argument_type {
        LogicalType::Decimal { scale, .. } => AggregateFunction::new(
            "sum",
            argument_type.clone(),
            LogicalType::Decimal {
                width: 38,
                scale: *scale,
            },
            || Box::new(DecimalSum::default()),
        ),
        t if t.is_floating_point() => AggregateFunction::new(
            "sum",
            argument_type.clone(),
            LogicalType::Double,
            || Box::new(FloatSum::default()),
        ),
        _ => AggregateFunction::new("sum", argument_type.clone(), LogicalType::BigInt, || {
            Box::new(IntegerSum::default())
        }),
    };
    Ok(function)
}

/// COUNT of non-NULL rows
pub fn count(argument_type: &LogicalType) -> AggregateFunction {
    AggregateFunction::new("count", argument_type.clone(), LogicalType::BigInt, || {
        Box::new(Count::default())
    })
}

pub fn min(argument_type: &LogicalType) -> AggregateFunction {
    AggregateFunction::new("min", argument_type.clone(), argument_type.clone(), || {
        Box::new(Extremum {
            keep: Ordering::Less,
            current: None,
        })
    })
}

pub fn max(argument_type: &LogicalType) -> AggregateFunction {
    AggregateFunction::new("max", argument_type.clone(), argument_type.clone(), || {
        Box::new(Extremum {
            keep: Ordering::Greater,
            current: None,
        })
    })
}

/// AVG as DOUBLE
pub fn avg(argument_type: &LogicalType) -> Result<AggregateFunction> {
    require_numeric("avg", argument_type)?;
    Ok(AggregateFunction::new(
        "avg",
        argument_type.clone(),
        LogicalType::Double,
        || Box::new(Average::default()),
    ))
}
