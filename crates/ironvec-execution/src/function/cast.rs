//! Bound cast functions
//!
//! `bind_cast` resolves a conversion once at plan-build time. Conversions
//! between integer widths run on native slices; everything else goes through
//! `Value`. A row that cannot be represented in the target type is never
//! wrapped or truncated: it becomes NULL and is recorded on the
//! `CastParameters` of the call.

use super::kernel::{unary_execute, value_unary_execute};
use super::{CastFunction, CastParameters};
use crate::vector::{NativeType, Vector};
use chrono::{NaiveDate, NaiveDateTime};
use ironvec_common::{Error, LogicalType, Result, Value};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

const TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Resolve the conversion from `source` to `target`
pub fn bind_cast(source: &LogicalType, target: &LogicalType) -> Result<CastFunction> {
    if source == target {
        return Ok(CastFunction::new(
            source.clone(),
            target.clone(),
            |input, output, _, _| {
                *output = Arc::clone(input);
                Ok(())
            },
        ));
    }

    if *source == LogicalType::Null {
        return Ok(CastFunction::new(
            source.clone(),
            target.clone(),
            |_, output, count, _| {
                Vector::prepare_output(output).finalize(count);
                Ok(())
            },
        ));
    }

    if source.is_integer() && target.is_integer() {
        return Ok(integer_cast(source, target));
    }

    if can_cast(source, target) {
        return Ok(value_cast(source, target));
    }

    Err(Error::InvalidCast {
        from: source.to_string(),
        to: target.to_string(),
    })
}

fn can_cast(source: &LogicalType, target: &LogicalType) -> bool {
    use LogicalType::*;
    let numeric_like = |t: &LogicalType| t.is_numeric() || *t == Boolean;
    match (source, target) {
        (_, Null) => false,
        (_, Varchar) | (Varchar, _) => true,
        (a, b) if numeric_like(a) && numeric_like(b) => true,
        (Date, Timestamp) | (Timestamp, Date) => true,
        _ => false,
    }
}

fn native_integer_cast<S, T>(source: &LogicalType, target: &LogicalType) -> CastFunction
where
    S: NativeType + Display,
    T: NativeType + TryFrom<S>,
{
    let target_type = target.clone();
    CastFunction::new(
        source.clone(),
        target.clone(),
        move |input, output, count, parameters| {
            unary_execute::<S, T, _>(input, output, count, |v| match T::try_from(v) {
                Ok(converted) => Some(converted),
                Err(_) => {
                    parameters.record_failure(v);
                    None
                }
            })?;
            finish(parameters, &target_type)
        },
    )
}

macro_rules! integer_cast_to {
    ($source_native:ty, $source:expr, $target:expr) => {
        match $target {
            LogicalType::TinyInt => native_integer_cast::<$source_native, i8>($source, $target),
            LogicalType::SmallInt => native_integer_cast::<$source_native, i16>($source, $target),
            LogicalType::Integer => native_integer_cast::<$source_native, i32>($source, $target),
            _ => native_integer_cast::<$source_native, i64>($source, $target),
        }
    };
}

fn integer_cast(source: &LogicalType, target: &LogicalType) -> CastFunction {
    match source {
        LogicalType::TinyInt => integer_cast_to!(i8, source, target),
        LogicalType::SmallInt => integer_cast_to!(i16, source, target),
        LogicalType::Integer => integer_cast_to!(i32, source, target),
        _ => integer_cast_to!(i64, source, target),
    }
}

fn value_cast(source: &LogicalType, target: &LogicalType) -> CastFunction {
    let target_type = target.clone();
    CastFunction::new(
        source.clone(),
        target.clone(),
        move |input, output, count, parameters| {
            value_unary_execute(input, output, count, |value| {
                let converted = cast_value(value, &target_type);
                if converted.is_none() {
                    parameters.record_failure(value);
                }
                Ok(converted)
            })?;
            finish(parameters, &target_type)
        },
    )
}

fn finish(parameters: &CastParameters, target: &LogicalType) -> Result<()> {
    match parameters.strict_error(target) {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Convert one non-NULL value; `None` when it has no representation in `target`
pub fn cast_value(value: &Value, target: &LogicalType) -> Option<Value> {
    match target {
        LogicalType::Null => None,
        LogicalType::Varchar => Some(Value::Varchar(match value {
            Value::Blob(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            other => other.to_string(),
        })),
        LogicalType::Boolean => match value {
            Value::Boolean(b) => Some(*b),
            Value::Varchar(s) => parse_bool(s),
            other => to_i64(other).map(|i| i != 0),
        }
        .map(Value::Boolean),
        LogicalType::TinyInt => to_i64(value)
            .and_then(|i| i8::try_from(i).ok())
            .map(Value::TinyInt),
        LogicalType::SmallInt => to_i64(value)
            .and_then(|i| i16::try_from(i).ok())
            .map(Value::SmallInt),
        LogicalType::Integer => to_i64(value)
            .and_then(|i| i32::try_from(i).ok())
            .map(Value::Integer),
        LogicalType::BigInt => to_i64(value).map(Value::BigInt),
        LogicalType::Float => to_f64(value)
            .map(|f| f as f32)
            .filter(|f| f.is_finite())
            .map(Value::Float),
        LogicalType::Double => to_f64(value).map(Value::Double),
        LogicalType::Decimal { width, scale } => to_decimal(value)
            .and_then(|d| fit_decimal(d, *width, *scale))
            .map(Value::Decimal),
        LogicalType::Blob => match value {
            Value::Varchar(s) => Some(Value::Blob(s.as_bytes().to_vec())),
            _ => None,
        },
        LogicalType::Date => match value {
            Value::Varchar(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok(),
            Value::Timestamp(ts) => Some(ts.date()),
            _ => None,
        }
        .map(Value::Date),
        LogicalType::Timestamp => match value {
            Value::Varchar(s) => parse_timestamp(s.trim()),
            Value::Date(d) => d.and_hms_opt(0, 0, 0),
            _ => None,
        }
        .map(Value::Timestamp),
        LogicalType::Uuid => match value {
            Value::Varchar(s) => Uuid::parse_str(s.trim()).ok().map(Value::Uuid),
            _ => None,
        },
    }
}

/// Round `value` to `scale` fractional digits; `None` when the result needs
/// more than `width` digits in total
pub fn fit_decimal(value: Decimal, width: u8, scale: u8) -> Option<Decimal> {
    let mut rounded = value.round_dp(scale as u32);
    rounded.rescale(scale as u32);
    let integer_digits = width.saturating_sub(scale) as u32;
    // 10^29 is past the largest representable decimal
    if integer_digits > 28 {
        return Some(rounded);
    }
    let limit = Decimal::from_i128_with_scale(10i128.pow(integer_digits), 0);
    (rounded.trunc().abs() < limit).then_some(rounded)
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "1" => Some(true),
        "false" | "f" | "0" => Some(false),
        _ => None,
    }
}

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn float_to_i64(f: f64) -> Option<i64> {
    let rounded = f.round();
    // i64::MAX is not representable as f64; the first value above it is 2^63
    if rounded.is_finite() && rounded >= i64::MIN as f64 && rounded < i64::MAX as f64 {
        Some(rounded as i64)
    } else {
        None
    }
}

fn to_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Boolean(b) => Some(*b as i64),
        Value::Float(f) => float_to_i64(*f as f64),
        Value::Double(f) => float_to_i64(*f),
        Value::Decimal(d) => d.round().to_i64(),
        Value::Varchar(s) => s.trim().parse().ok(),
        other => other.as_i64(),
    }
}

fn to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Decimal(d) => d.to_f64(),
        Value::Varchar(s) => s.trim().parse().ok(),
        other => other.as_f64(),
    }
}

fn to_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Decimal(d) => Some(*d),
        Value::Boolean(b) => Some(Decimal::from(*b as i64)),
        Value::Float(f) => Decimal::from_f32(*f),
        Value::Double(f) => Decimal::from_f64(*f),
        Value::Varchar(s) => Decimal::from_str(s.trim()).ok(),
        other => other.as_i64().map(Decimal::from),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::ColumnRef;

    fn cast(
        values: Vec<Value>,
        source: LogicalType,
        target: LogicalType,
        strict: bool,
    ) -> (Result<Vec<Value>>, CastParameters) {
        let count = values.len();
        let input: ColumnRef = Arc::new(Vector::from_values(&values, source.clone()).unwrap());
        let mut output: ColumnRef = Arc::new(Vector::new(target.clone(), count));
        let mut parameters = CastParameters::new(strict);
        let result = bind_cast(&source, &target)
            .unwrap()
            .call(&input, &mut output, count, &mut parameters)
            .map(|_| output.to_values());
        (result, parameters)
    }

    #[test]
    fn test_integer_text_round_trip() {
        let original = vec![
            Value::Integer(0),
            Value::Integer(-42),
            Value::Integer(i32::MAX),
            Value::Null,
        ];
        let (text, _) = cast(original.clone(), LogicalType::Integer, LogicalType::Varchar, false);
        let text = text.unwrap();
        assert_eq!(text[1], Value::from("-42"));

        let (back, parameters) = cast(text, LogicalType::Varchar, LogicalType::Integer, false);
        assert_eq!(back.unwrap(), original);
        assert!(parameters.all_converted());
    }

    #[test]
    fn test_narrowing_fails_per_row() {
        let (result, parameters) = cast(
            vec![Value::BigInt(1), Value::BigInt(300), Value::BigInt(-129)],
            LogicalType::BigInt,
            LogicalType::TinyInt,
            false,
        );
        assert_eq!(result.unwrap(), vec![Value::TinyInt(1), Value::Null, Value::Null]);
        assert_eq!(parameters.failed_rows(), 2);
    }

    #[test]
    fn test_strict_cast_errors() {
        let (result, _) = cast(
            vec![Value::from("12"), Value::from("twelve")],
            LogicalType::Varchar,
            LogicalType::Integer,
            true,
        );
        assert_eq!(
            result.unwrap_err(),
            Error::CastFailed {
                value: "twelve".to_string(),
                to: "INTEGER".to_string()
            }
        );
    }

    #[test]
    fn test_double_to_integer_rounds_and_checks_range() {
        let (result, parameters) = cast(
            vec![Value::Double(2.6), Value::Double(1e20), Value::Double(f64::NAN)],
            LogicalType::Double,
            LogicalType::Integer,
            false,
        );
        assert_eq!(result.unwrap(), vec![Value::Integer(3), Value::Null, Value::Null]);
        assert_eq!(parameters.failed_rows(), 2);
    }

    #[test]
    fn test_temporal_and_uuid_from_text() {
        let (dates, _) = cast(
            vec![Value::from("2024-02-29")],
            LogicalType::Varchar,
            LogicalType::Date,
            false,
        );
        assert_eq!(
            dates.unwrap(),
            vec![Value::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap())]
        );

        let id = Uuid::new_v4();
        let (uuids, _) = cast(
            vec![Value::Varchar(id.to_string())],
            LogicalType::Varchar,
            LogicalType::Uuid,
            false,
        );
        assert_eq!(uuids.unwrap(), vec![Value::Uuid(id)]);

        let (timestamps, _) = cast(
            vec![Value::Date(NaiveDate::from_ymd_opt(2023, 1, 1).unwrap())],
            LogicalType::Date,
            LogicalType::Timestamp,
            false,
        );
        assert_eq!(
            timestamps.unwrap()[0].to_string(),
            "2023-01-01 00:00:00"
        );
    }

    #[test]
    fn test_decimal_from_text() {
        let (result, _) = cast(
            vec![Value::from("3.14159")],
            LogicalType::Varchar,
            LogicalType::Decimal { width: 10, scale: 2 },
            false,
        );
        assert_eq!(result.unwrap(), vec![Value::Decimal(Decimal::new(314, 2))]);
    }

    #[test]
    fn test_decimal_width_overflow() {
        let (result, parameters) = cast(
            vec![Value::BigInt(12345), Value::BigInt(999), Value::BigInt(-1000)],
            LogicalType::BigInt,
            LogicalType::Decimal { width: 3, scale: 0 },
            false,
        );
        assert_eq!(
            result.unwrap(),
            vec![Value::Null, Value::Decimal(Decimal::new(999, 0)), Value::Null]
        );
        assert_eq!(parameters.failed_rows(), 2);

        // Rounding to the scale can push a value over the width
        let (result, parameters) = cast(
            vec![Value::from("9.996"), Value::from("9.994")],
            LogicalType::Varchar,
            LogicalType::Decimal { width: 3, scale: 2 },
            false,
        );
        assert_eq!(result.unwrap(), vec![Value::Null, Value::Decimal(Decimal::new(999, 2))]);
        assert_eq!(parameters.failed_rows(), 1);
    }

    #[test]
    fn test_fit_decimal_applies_scale() {
        let fitted = fit_decimal(Decimal::new(15, 1), 10, 2).unwrap();
        assert_eq!(fitted.scale(), 2);
        assert_eq!(fitted, Decimal::new(150, 2));
        assert!(fit_decimal(Decimal::new(5, 1), 2, 2).is_some());
        assert!(fit_decimal(Decimal::ONE, 2, 2).is_none());
        assert!(fit_decimal(Decimal::MAX, 38, 0).is_some());
    }

    #[test]
    fn test_identity_aliases_input() {
        let input: ColumnRef = Arc::new(Vector::from_native(&[Some(5i64)]));
        let mut output: ColumnRef = Arc::new(Vector::new(LogicalType::BigInt, 1));
        let mut parameters = CastParameters::new(false);
        bind_cast(&LogicalType::BigInt, &LogicalType::BigInt)
            .unwrap()
            .call(&input, &mut output, 1, &mut parameters)
            .unwrap();
        assert!(Arc::ptr_eq(&input, &output));
    }

    #[test]
    fn test_unsupported_cast() {
        let err = bind_cast(&LogicalType::Uuid, &LogicalType::Date).unwrap_err();
        assert!(matches!(err, Error::InvalidCast { .. }));
    }
}
