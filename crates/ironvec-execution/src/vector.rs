//! Vector - The core unit of vectorized execution
//!
//! A Vector holds up to one batch of values of the same type plus a validity
//! mask. Vectors are shared through `ColumnRef` so that a column can be
//! aliased by many readers without copying; a writer always goes through
//! [`Vector::prepare_output`] or `Arc::make_mut`, which never touches a
//! buffer someone else can still see.

use chrono::{NaiveDate, NaiveDateTime};
use ironvec_common::{Error, LogicalType, Result, Value};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

/// A shared, immutable-once-published column
pub type ColumnRef = Arc<Vector>;

/// A validity mask indicating which rows are NULL
#[derive(Debug, Clone, PartialEq)]
pub struct ValidityMask {
    /// Bit vector: 1 = valid, 0 = null
    /// None means all values are valid
    mask: Option<Vec<u64>>,
}

impl ValidityMask {
    /// Create a validity mask where all values are valid
    pub fn all_valid() -> Self {
        ValidityMask { mask: None }
    }

    /// Create a validity mask where all values are NULL
    pub fn all_null(count: usize) -> Self {
        let num_words = (count + 63) / 64;
        ValidityMask {
            mask: Some(vec![0; num_words]),
        }
    }

    /// Check if a specific row is valid (not NULL)
    pub fn is_valid(&self, idx: usize) -> bool {
        match &self.mask {
            None => true,
            Some(mask) => {
                let word_idx = idx / 64;
                let bit_idx = idx % 64;
                if word_idx >= mask.len() {
                    return true;
                }
                (mask[word_idx] >> bit_idx) & 1 == 1
            }
        }
    }

    /// Set a row as valid or NULL
    pub fn set(&mut self, idx: usize, valid: bool) {
        if self.mask.is_none() {
            if valid {
                return;
            }
            self.mask = Some(vec![u64::MAX; (idx / 64) + 1]);
        }

        if let Some(mask) = &mut self.mask {
            let word_idx = idx / 64;
            let bit_idx = idx % 64;

            while word_idx >= mask.len() {
                mask.push(u64::MAX);
            }

            if valid {
                mask[word_idx] |= 1 << bit_idx;
            } else {
                mask[word_idx] &= !(1 << bit_idx);
            }
        }
    }

    /// Returns true if all values are valid
    pub fn all_valid_flag(&self) -> bool {
        self.mask.is_none()
    }

    /// Mark every row valid again
    pub fn reset(&mut self) {
        self.mask = None;
    }
}

impl Default for ValidityMask {
    fn default() -> Self {
        Self::all_valid()
    }
}

/// Typed storage behind a vector
#[derive(Debug, Clone, PartialEq)]
pub enum VectorData {
    /// Untyped NULL constants carry no payload
    Null,
    Boolean(Vec<bool>),
    TinyInt(Vec<i8>),
    SmallInt(Vec<i16>),
    Integer(Vec<i32>),
    BigInt(Vec<i64>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    Decimal(Vec<Decimal>),
    Varchar(Vec<String>),
    Blob(Vec<Vec<u8>>),
    Date(Vec<NaiveDate>),
    Timestamp(Vec<NaiveDateTime>),
    Uuid(Vec<Uuid>),
}

impl VectorData {
    fn with_capacity(logical_type: &LogicalType, capacity: usize) -> Self {
        match logical_type {
            LogicalType::Null => VectorData::Null,
            LogicalType::Boolean => VectorData::Boolean(Vec::with_capacity(capacity)),
            LogicalType::TinyInt => VectorData::TinyInt(Vec::with_capacity(capacity)),
            LogicalType::SmallInt => VectorData::SmallInt(Vec::with_capacity(capacity)),
            LogicalType::Integer => VectorData::Integer(Vec::with_capacity(capacity)),
            LogicalType::BigInt => VectorData::BigInt(Vec::with_capacity(capacity)),
            LogicalType::Float => VectorData::Float(Vec::with_capacity(capacity)),
            LogicalType::Double => VectorData::Double(Vec::with_capacity(capacity)),
            LogicalType::Decimal { .. } => VectorData::Decimal(Vec::with_capacity(capacity)),
            LogicalType::Varchar => VectorData::Varchar(Vec::with_capacity(capacity)),
            LogicalType::Blob => VectorData::Blob(Vec::with_capacity(capacity)),
            LogicalType::Date => VectorData::Date(Vec::with_capacity(capacity)),
            LogicalType::Timestamp => VectorData::Timestamp(Vec::with_capacity(capacity)),
            LogicalType::Uuid => VectorData::Uuid(Vec::with_capacity(capacity)),
        }
    }

    fn clear(&mut self) {
        match self {
            VectorData::Null => {}
            VectorData::Boolean(v) => v.clear(),
            VectorData::TinyInt(v) => v.clear(),
            VectorData::SmallInt(v) => v.clear(),
            VectorData::Integer(v) => v.clear(),
            VectorData::BigInt(v) => v.clear(),
            VectorData::Float(v) => v.clear(),
            VectorData::Double(v) => v.clear(),
            VectorData::Decimal(v) => v.clear(),
            VectorData::Varchar(v) => v.clear(),
            VectorData::Blob(v) => v.clear(),
            VectorData::Date(v) => v.clear(),
            VectorData::Timestamp(v) => v.clear(),
            VectorData::Uuid(v) => v.clear(),
        }
    }

    fn truncate(&mut self, len: usize) {
        match self {
            VectorData::Null => {}
            VectorData::Boolean(v) => v.truncate(len),
            VectorData::TinyInt(v) => v.truncate(len),
            VectorData::SmallInt(v) => v.truncate(len),
            VectorData::Integer(v) => v.truncate(len),
            VectorData::BigInt(v) => v.truncate(len),
            VectorData::Float(v) => v.truncate(len),
            VectorData::Double(v) => v.truncate(len),
            VectorData::Decimal(v) => v.truncate(len),
            VectorData::Varchar(v) => v.truncate(len),
            VectorData::Blob(v) => v.truncate(len),
            VectorData::Date(v) => v.truncate(len),
            VectorData::Timestamp(v) => v.truncate(len),
            VectorData::Uuid(v) => v.truncate(len),
        }
    }

    /// Number of physically stored slots
    fn stored(&self) -> Option<usize> {
        Some(match self {
            VectorData::Null => return None,
            VectorData::Boolean(v) => v.len(),
            VectorData::TinyInt(v) => v.len(),
            VectorData::SmallInt(v) => v.len(),
            VectorData::Integer(v) => v.len(),
            VectorData::BigInt(v) => v.len(),
            VectorData::Float(v) => v.len(),
            VectorData::Double(v) => v.len(),
            VectorData::Decimal(v) => v.len(),
            VectorData::Varchar(v) => v.len(),
            VectorData::Blob(v) => v.len(),
            VectorData::Date(v) => v.len(),
            VectorData::Timestamp(v) => v.len(),
            VectorData::Uuid(v) => v.len(),
        })
    }

    fn get(&self, idx: usize) -> Value {
        match self {
            VectorData::Null => Value::Null,
            VectorData::Boolean(v) => Value::Boolean(v[idx]),
            VectorData::TinyInt(v) => Value::TinyInt(v[idx]),
            VectorData::SmallInt(v) => Value::SmallInt(v[idx]),
            VectorData::Integer(v) => Value::Integer(v[idx]),
            VectorData::BigInt(v) => Value::BigInt(v[idx]),
            VectorData::Float(v) => Value::Float(v[idx]),
            VectorData::Double(v) => Value::Double(v[idx]),
            VectorData::Decimal(v) => Value::Decimal(v[idx]),
            VectorData::Varchar(v) => Value::Varchar(v[idx].clone()),
            VectorData::Blob(v) => Value::Blob(v[idx].clone()),
            VectorData::Date(v) => Value::Date(v[idx]),
            VectorData::Timestamp(v) => Value::Timestamp(v[idx]),
            VectorData::Uuid(v) => Value::Uuid(v[idx]),
        }
    }

    /// Store `value` at `idx`, padding with sentinels. Returns false when the
    /// value does not belong in this storage.
    fn put(&mut self, idx: usize, value: Value) -> bool {
        fn store<T: Default>(v: &mut Vec<T>, idx: usize, item: T) {
            while v.len() <= idx {
                v.push(T::default());
            }
            v[idx] = item;
        }

        match (self, value) {
            (VectorData::Null, Value::Null) => {}
            (VectorData::Boolean(v), Value::Boolean(x)) => store(v, idx, x),
            (VectorData::TinyInt(v), Value::TinyInt(x)) => store(v, idx, x),
            (VectorData::SmallInt(v), Value::SmallInt(x)) => store(v, idx, x),
            (VectorData::Integer(v), Value::Integer(x)) => store(v, idx, x),
            (VectorData::BigInt(v), Value::BigInt(x)) => store(v, idx, x),
            (VectorData::Float(v), Value::Float(x)) => store(v, idx, x),
            (VectorData::Double(v), Value::Double(x)) => store(v, idx, x),
            (VectorData::Decimal(v), Value::Decimal(x)) => store(v, idx, x),
            (VectorData::Varchar(v), Value::Varchar(x)) => store(v, idx, x),
            (VectorData::Blob(v), Value::Blob(x)) => store(v, idx, x),
            (VectorData::Date(v), Value::Date(x)) => store(v, idx, x),
            (VectorData::Timestamp(v), Value::Timestamp(x)) => store(v, idx, x),
            (VectorData::Uuid(v), Value::Uuid(x)) => store(v, idx, x),
            _ => return false,
        }
        true
    }
}

/// Rust types that back a fixed-width column directly
pub trait NativeType: Copy + Default + PartialOrd + Send + Sync + std::fmt::Debug + 'static {
    fn logical_type() -> LogicalType;
    fn slice(data: &VectorData) -> Option<&[Self]>;
    fn vec_mut(data: &mut VectorData) -> Option<&mut Vec<Self>>;
    fn into_value(self) -> Value;
}

macro_rules! native_type {
    ($t:ty, $variant:ident) => {
        impl NativeType for $t {
            fn logical_type() -> LogicalType {
                LogicalType::$variant
            }

            fn slice(data: &VectorData) -> Option<&[Self]> {
                match data {
                    VectorData::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn vec_mut(data: &mut VectorData) -> Option<&mut Vec<Self>> {
                match data {
                    VectorData::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn into_value(self) -> Value {
                Value::$variant(self)
            }
        }
    };
}

native_type!(bool, Boolean);
native_type!(i8, TinyInt);
native_type!(i16, SmallInt);
native_type!(i32, Integer);
native_type!(i64, BigInt);
native_type!(f32, Float);
native_type!(f64, Double);

/// A column of values of the same type
#[derive(Debug, Clone, PartialEq)]
pub struct Vector {
    /// The logical type of values in this vector
    pub logical_type: LogicalType,
    /// Validity mask for NULL handling
    pub validity: ValidityMask,
    /// The actual data
    pub data: VectorData,
    /// Logical length; slots at or past it are unused
    pub(crate) count: usize,
}

impl Vector {
    /// Create an empty vector with room for `capacity` rows
    pub fn new(logical_type: LogicalType, capacity: usize) -> Self {
        let data = VectorData::with_capacity(&logical_type, capacity);
        Vector {
            logical_type,
            validity: ValidityMask::all_valid(),
            data,
            count: 0,
        }
    }

    /// Create a length-1 vector holding `value`
    pub fn new_constant(value: Value) -> Self {
        let mut vector = Vector::new(value.logical_type(), 1);
        // The storage was derived from the value's own type, so this cannot mismatch
        let _ = vector.append_value(value);
        vector
    }

    /// Create a vector from a slice of Values
    pub fn from_values(values: &[Value], logical_type: LogicalType) -> Result<Self> {
        let mut vector = Vector::new(logical_type, values.len());
        for value in values {
            vector.append_value(value.clone())?;
        }
        Ok(vector)
    }

    /// Create a vector from native values; `None` entries become NULL
    pub fn from_native<T: NativeType>(values: &[Option<T>]) -> Self {
        let mut vector = Vector::new(T::logical_type(), values.len());
        if let Some(data) = T::vec_mut(&mut vector.data) {
            for (idx, value) in values.iter().enumerate() {
                data.push(value.unwrap_or_default());
                if value.is_none() {
                    vector.validity.set(idx, false);
                }
            }
        }
        vector.count = values.len();
        vector
    }

    /// Get a writable vector out of `column` with its contents cleared.
    ///
    /// A uniquely owned buffer is reused in place; one that is still aliased
    /// elsewhere is left alone and replaced by a fresh allocation.
    pub fn prepare_output(column: &mut ColumnRef) -> &mut Vector {
        if Arc::get_mut(column).is_none() {
            let logical_type = column.logical_type.clone();
            let capacity = column.len();
            *column = Arc::new(Vector::new(logical_type, capacity));
        }
        let vector = Arc::make_mut(column);
        vector.reset();
        vector
    }

    /// Number of rows in this vector
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Clear the contents, keeping type and allocation
    pub fn reset(&mut self) {
        self.data.clear();
        self.validity.reset();
        self.count = 0;
    }

    /// Check if the row at `idx` is valid (not NULL)
    pub fn is_valid(&self, idx: usize) -> bool {
        idx < self.count && self.validity.is_valid(idx)
    }

    /// Get value at index
    pub fn get_value(&self, idx: usize) -> Value {
        if !self.is_valid(idx) {
            return Value::Null;
        }
        self.data.get(idx)
    }

    /// Set value at index; does not change the length
    pub fn set_value(&mut self, idx: usize, value: Value) -> Result<()> {
        if value.is_null() {
            if !self.data.put(idx, self.logical_type.null_sentinel()) {
                return Err(Error::Internal(format!(
                    "column storage does not match its type {}",
                    self.logical_type
                )));
            }
            self.validity.set(idx, false);
            return Ok(());
        }

        let value_type = value.logical_type();
        if !self.data.put(idx, value) {
            return Err(Error::TypeMismatch {
                expected: self.logical_type.to_string(),
                got: value_type.to_string(),
            });
        }
        self.validity.set(idx, true);
        Ok(())
    }

    /// Append a value and grow the length by one
    pub fn append_value(&mut self, value: Value) -> Result<()> {
        self.set_value(self.count, value)?;
        self.count += 1;
        Ok(())
    }

    /// Fix the length at `count`; slots in between are padded with NULLs
    pub fn finalize(&mut self, count: usize) {
        if let Some(stored) = self.data.stored() {
            if stored < count {
                for idx in stored..count {
                    // Sentinels always match the storage
                    let _ = self.set_value(idx, Value::Null);
                }
            } else {
                self.data.truncate(count);
            }
        }
        self.count = count;
    }

    /// Typed view over a fixed-width column
    pub fn values<T: NativeType>(&self) -> Result<&[T]> {
        let slice = T::slice(&self.data).ok_or_else(|| Error::TypeMismatch {
            expected: T::logical_type().to_string(),
            got: self.logical_type.to_string(),
        })?;
        Ok(&slice[..self.count.min(slice.len())])
    }

    /// Materialize a length-1 vector out to `count` rows
    pub fn broadcast(&self, count: usize) -> Result<Vector> {
        if self.count != 1 {
            return Err(Error::Internal(format!(
                "cannot broadcast a vector of length {}",
                self.count
            )));
        }
        let value = self.get_value(0);
        let mut vector = Vector::new(self.logical_type.clone(), count);
        for _ in 0..count {
            vector.append_value(value.clone())?;
        }
        Ok(vector)
    }

    /// Gather the rows at `indices` into a new vector
    pub fn select(&self, indices: &[usize]) -> Result<Vector> {
        let mut vector = Vector::new(self.logical_type.clone(), indices.len());
        for &idx in indices {
            vector.append_value(self.get_value(idx))?;
        }
        Ok(vector)
    }

    /// Get all values as a Vec
    pub fn to_values(&self) -> Vec<Value> {
        (0..self.count).map(|i| self.get_value(i)).collect()
    }
}

/// Row to read from a column that may be a broadcast constant
#[inline]
pub fn row_index(column: &Vector, row: usize) -> usize {
    if column.len() == 1 {
        0
    } else {
        row
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validity_mask() {
        let mut mask = ValidityMask::all_valid();
        assert!(mask.is_valid(0));
        assert!(mask.is_valid(100));

        mask.set(5, false);
        assert!(mask.is_valid(0));
        assert!(!mask.is_valid(5));
        assert!(mask.is_valid(6));

        mask.set(130, false);
        assert!(!mask.is_valid(130));
        mask.reset();
        assert!(mask.is_valid(130));
    }

    #[test]
    fn test_constant_vector() {
        let v = Vector::new_constant(Value::Integer(42));
        assert_eq!(v.len(), 1);
        assert_eq!(v.get_value(0), Value::Integer(42));
    }

    #[test]
    fn test_null_stores_sentinel() {
        let mut v = Vector::new(LogicalType::Integer, 4);
        v.append_value(Value::Integer(7)).unwrap();
        v.append_value(Value::Null).unwrap();
        assert_eq!(v.len(), 2);
        assert_eq!(v.get_value(1), Value::Null);
        assert_eq!(v.values::<i32>().unwrap(), &[7, 0]);
    }

    #[test]
    fn test_type_mismatch_on_append() {
        let mut v = Vector::new(LogicalType::Integer, 1);
        let err = v.append_value(Value::Varchar("x".to_string())).unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
        assert!(v.is_empty());
    }

    #[test]
    fn test_finalize_pads_and_truncates() {
        let mut v = Vector::new(LogicalType::BigInt, 8);
        v.set_value(0, Value::BigInt(1)).unwrap();
        v.finalize(3);
        assert_eq!(v.len(), 3);
        assert_eq!(v.get_value(0), Value::BigInt(1));
        assert_eq!(v.get_value(2), Value::Null);

        v.finalize(1);
        assert_eq!(v.to_values(), vec![Value::BigInt(1)]);
        assert_eq!(v.get_value(2), Value::Null);
    }

    #[test]
    fn test_prepare_output_does_not_touch_aliases() {
        let mut column: ColumnRef = Arc::new(Vector::from_native(&[Some(1i32), Some(2)]));
        let alias = Arc::clone(&column);

        let out = Vector::prepare_output(&mut column);
        out.append_value(Value::Integer(9)).unwrap();

        assert_eq!(alias.to_values(), vec![Value::Integer(1), Value::Integer(2)]);
        assert_eq!(column.to_values(), vec![Value::Integer(9)]);
    }

    #[test]
    fn test_broadcast_and_select() {
        let v = Vector::new_constant(Value::Varchar("a".to_string()));
        let wide = v.broadcast(3).unwrap();
        assert_eq!(wide.len(), 3);

        let nums = Vector::from_native(&[Some(10i64), None, Some(30)]);
        let picked = nums.select(&[2, 1]).unwrap();
        assert_eq!(picked.to_values(), vec![Value::BigInt(30), Value::Null]);
    }
}
