//! Column-at-a-time loops shared by the built-in functions
//!
//! Every kernel writes exactly `count` rows into the output. A row is NULL
//! when any input is NULL or when the operation returns `None`, which is how
//! per-row failures such as overflow surface without failing the batch.
//! Length-1 inputs are broadcast.

use crate::chunk::DataChunk;
use crate::vector::{row_index, ColumnRef, NativeType, Vector};
use ironvec_common::{Error, Result, Value};

fn prepare_typed<O: NativeType>(output: &mut ColumnRef) -> Result<&mut Vector> {
    if output.logical_type != O::logical_type() {
        return Err(Error::TypeMismatch {
            expected: output.logical_type.to_string(),
            got: O::logical_type().to_string(),
        });
    }
    Ok(Vector::prepare_output(output))
}

fn expect_arguments(input: &DataChunk, expected: usize) -> Result<()> {
    if input.column_count() != expected {
        return Err(Error::InvalidArguments(format!(
            "expected {} argument columns, got {}",
            expected,
            input.column_count()
        )));
    }
    Ok(())
}

/// Native one-argument kernel
pub fn unary_execute<I, O, F>(
    input: &Vector,
    output: &mut ColumnRef,
    count: usize,
    mut op: F,
) -> Result<()>
where
    I: NativeType,
    O: NativeType,
    F: FnMut(I) -> Option<O>,
{
    let values = input.values::<I>()?;
    let out = prepare_typed::<O>(output)?;
    let Vector {
        data,
        validity,
        count: out_count,
        ..
    } = out;
    let data = O::vec_mut(data).ok_or_else(|| Error::Internal("output storage mismatch".to_string()))?;

    for row in 0..count {
        let idx = row_index(input, row);
        let result = if input.is_valid(idx) {
            op(values[idx])
        } else {
            None
        };
        match result {
            Some(v) => data.push(v),
            None => {
                data.push(O::default());
                validity.set(row, false);
            }
        }
    }
    *out_count = count;
    Ok(())
}

/// Native two-argument kernel over a two-column chunk
pub fn binary_execute<L, R, O, F>(input: &DataChunk, output: &mut ColumnRef, mut op: F) -> Result<()>
where
    L: NativeType,
    R: NativeType,
    O: NativeType,
    F: FnMut(L, R) -> Option<O>,
{
    expect_arguments(input, 2)?;
    let left = input.column(0);
    let right = input.column(1);
    let count = input.row_count();
    let left_values = left.values::<L>()?;
    let right_values = right.values::<R>()?;

    let out = prepare_typed::<O>(output)?;
    let Vector {
        data,
        validity,
        count: out_count,
        ..
    } = out;
    let data = O::vec_mut(data).ok_or_else(|| Error::Internal("output storage mismatch".to_string()))?;

    for row in 0..count {
        let l = row_index(left, row);
        let r = row_index(right, row);
        let result = if left.is_valid(l) && right.is_valid(r) {
            op(left_values[l], right_values[r])
        } else {
            None
        };
        match result {
            Some(v) => data.push(v),
            None => {
                data.push(O::default());
                validity.set(row, false);
            }
        }
    }
    *out_count = count;
    Ok(())
}

/// Value-at-a-time one-argument kernel for types without a native layout
pub fn value_unary_execute<F>(
    input: &Vector,
    output: &mut ColumnRef,
    count: usize,
    mut op: F,
) -> Result<()>
where
    F: FnMut(&Value) -> Result<Option<Value>>,
{
    let out = Vector::prepare_output(output);
    for row in 0..count {
        let value = input.get_value(row_index(input, row));
        let result = if value.is_null() { None } else { op(&value)? };
        out.append_value(result.unwrap_or(Value::Null))?;
    }
    Ok(())
}

/// Value-at-a-time two-argument kernel over a two-column chunk
pub fn value_binary_execute<F>(input: &DataChunk, output: &mut ColumnRef, mut op: F) -> Result<()>
where
    F: FnMut(&Value, &Value) -> Result<Option<Value>>,
{
    expect_arguments(input, 2)?;
    let left = input.column(0);
    let right = input.column(1);
    let count = input.row_count();

    let out = Vector::prepare_output(output);
    for row in 0..count {
        let l = left.get_value(row_index(left, row));
        let r = right.get_value(row_index(right, row));
        let result = if l.is_null() || r.is_null() {
            None
        } else {
            op(&l, &r)?
        };
        out.append_value(result.unwrap_or(Value::Null))?;
    }
    Ok(())
}
