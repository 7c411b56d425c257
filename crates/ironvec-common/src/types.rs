//! Logical type system for IronVec
//!
//! Every column flowing through the executor carries a `LogicalType` that
//! decides how its values are stored and which kernels may touch it.

use std::fmt;

/// The logical type of a value or column.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LogicalType {
    /// The NULL type - the type of an untyped NULL constant
    Null,

    /// Boolean (true/false)
    Boolean,

    // ============================================
    // Numeric types
    // ============================================
    /// 8-bit signed integer
    TinyInt,
    /// 16-bit signed integer
    SmallInt,
    /// 32-bit signed integer
    Integer,
    /// 64-bit signed integer
    BigInt,
    /// 32-bit IEEE 754 floating point
    Float,
    /// 64-bit IEEE 754 floating point
    Double,
    /// Fixed-point decimal with specified width and scale
    Decimal { width: u8, scale: u8 },

    // ============================================
    // Variable-length types
    // ============================================
    /// Variable-length string (UTF-8)
    Varchar,
    /// Binary large object
    Blob,

    // ============================================
    // Temporal and other scalar types
    // ============================================
    /// Date (year, month, day)
    Date,
    /// Timestamp without timezone
    Timestamp,
    /// UUID (128-bit universally unique identifier)
    Uuid,
}

impl LogicalType {
    /// Returns true if this type is a numeric type
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            LogicalType::TinyInt
                | LogicalType::SmallInt
                | LogicalType::Integer
                | LogicalType::BigInt
                | LogicalType::Float
                | LogicalType::Double
                | LogicalType::Decimal { .. }
        )
    }

    /// Returns true if this type is an integer type
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            LogicalType::TinyInt | LogicalType::SmallInt | LogicalType::Integer | LogicalType::BigInt
        )
    }

    /// Returns true if this type is a floating point type
    pub fn is_floating_point(&self) -> bool {
        matches!(self, LogicalType::Float | LogicalType::Double)
    }

    /// Returns true for types whose values have no fixed width
    pub fn is_variable_length(&self) -> bool {
        matches!(self, LogicalType::Varchar | LogicalType::Blob)
    }

    /// Returns the size in bytes for fixed-size types, None for variable-size
    pub fn physical_size(&self) -> Option<usize> {
        match self {
            LogicalType::Boolean | LogicalType::TinyInt => Some(1),
            LogicalType::SmallInt => Some(2),
            LogicalType::Integer | LogicalType::Float | LogicalType::Date => Some(4),
            LogicalType::BigInt | LogicalType::Double | LogicalType::Timestamp => Some(8),
            LogicalType::Decimal { .. } | LogicalType::Uuid => Some(16),
            LogicalType::Varchar | LogicalType::Blob | LogicalType::Null => None,
        }
    }

    /// The value stored in a slot whose validity bit is cleared
    pub fn null_sentinel(&self) -> super::Value {
        use super::Value;
        match self {
            LogicalType::Null => Value::Null,
            LogicalType::Boolean => Value::Boolean(false),
            LogicalType::TinyInt => Value::TinyInt(0),
            LogicalType::SmallInt => Value::SmallInt(0),
            LogicalType::Integer => Value::Integer(0),
            LogicalType::BigInt => Value::BigInt(0),
            LogicalType::Float => Value::Float(0.0),
            LogicalType::Double => Value::Double(0.0),
            LogicalType::Decimal { .. } => Value::Decimal(rust_decimal::Decimal::ZERO),
            LogicalType::Varchar => Value::Varchar(String::new()),
            LogicalType::Blob => Value::Blob(Vec::new()),
            LogicalType::Date => Value::Date(chrono::NaiveDate::default()),
            LogicalType::Timestamp => Value::Timestamp(chrono::NaiveDateTime::default()),
            LogicalType::Uuid => Value::Uuid(uuid::Uuid::nil()),
        }
    }

    /// Returns true if a value of type `other` can be stored in a column of this type
    /// without conversion
    pub fn accepts(&self, other: &LogicalType) -> bool {
        match (self, other) {
            (_, LogicalType::Null) => true,
            (LogicalType::Decimal { .. }, LogicalType::Decimal { .. }) => true,
            (a, b) => a == b,
        }
    }
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalType::Null => write!(f, "NULL"),
            LogicalType::Boolean => write!(f, "BOOLEAN"),
            LogicalType::TinyInt => write!(f, "TINYINT"),
            LogicalType::SmallInt => write!(f, "SMALLINT"),
            LogicalType::Integer => write!(f, "INTEGER"),
            LogicalType::BigInt => write!(f, "BIGINT"),
            LogicalType::Float => write!(f, "FLOAT"),
            LogicalType::Double => write!(f, "DOUBLE"),
            LogicalType::Decimal { width, scale } => write!(f, "DECIMAL({},{})", width, scale),
            LogicalType::Varchar => write!(f, "VARCHAR"),
            LogicalType::Blob => write!(f, "BLOB"),
            LogicalType::Date => write!(f, "DATE"),
            LogicalType::Timestamp => write!(f, "TIMESTAMP"),
            LogicalType::Uuid => write!(f, "UUID"),
        }
    }
}

impl Default for LogicalType {
    fn default() -> Self {
        LogicalType::Null
    }
}
