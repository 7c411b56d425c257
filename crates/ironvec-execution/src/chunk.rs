//! DataChunk - A batch of vectors for processing

use super::vector::{ColumnRef, Vector};
use ironvec_common::{Error, LogicalType, Result, Value};
use std::sync::Arc;

/// A batch of column vectors sharing one row count.
///
/// A chunk is built up row by row or column by column and then finalized;
/// after that its columns are only ever aliased or copied out of.
#[derive(Debug, Clone)]
pub struct DataChunk {
    /// The column vectors
    pub vectors: Vec<ColumnRef>,
    /// Number of valid rows in this chunk
    count: usize,
    finalized: bool,
}

impl DataChunk {
    /// Create a new, empty data chunk with the given column types
    pub fn new(types: &[LogicalType], capacity: usize) -> Self {
        let vectors = types
            .iter()
            .map(|t| Arc::new(Vector::new(t.clone(), capacity)))
            .collect();

        DataChunk {
            vectors,
            count: 0,
            finalized: false,
        }
    }

    /// Create an empty data chunk with no columns
    pub fn empty() -> Self {
        DataChunk {
            vectors: Vec::new(),
            count: 0,
            finalized: false,
        }
    }

    /// Assemble a finalized chunk from already evaluated columns.
    ///
    /// The row count is that of the longest column; length-1 columns stand
    /// for constants and are read as broadcast by the kernels.
    pub fn from_columns(vectors: Vec<ColumnRef>) -> Self {
        let count = vectors.iter().map(|v| v.len()).max().unwrap_or(0);
        DataChunk {
            vectors,
            count,
            finalized: true,
        }
    }

    /// Create a finalized DataChunk from row-based data
    pub fn from_rows(rows: &[Vec<Value>], types: &[LogicalType]) -> Result<Self> {
        let mut chunk = DataChunk::new(types, rows.len());
        for row in rows {
            chunk.append_row(row)?;
        }
        chunk.finalize();
        Ok(chunk)
    }

    /// Get the number of columns
    pub fn column_count(&self) -> usize {
        self.vectors.len()
    }

    /// Get the number of rows
    pub fn row_count(&self) -> usize {
        self.count
    }

    /// Check if this chunk is empty
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Fix the row count; the chunk becomes read-only
    pub fn finalize(&mut self) {
        for vector in &mut self.vectors {
            if vector.len() != self.count {
                Arc::make_mut(vector).finalize(self.count);
            }
        }
        self.finalized = true;
    }

    /// Get a reference to a column vector
    pub fn column(&self, idx: usize) -> &Vector {
        &self.vectors[idx]
    }

    /// Get the shared handle of a column, for zero-copy aliasing
    pub fn column_ref(&self, idx: usize) -> Option<&ColumnRef> {
        self.vectors.get(idx)
    }

    /// Append a row to an unfinalized chunk
    pub fn append_row(&mut self, values: &[Value]) -> Result<()> {
        if self.finalized {
            return Err(Error::Internal(
                "cannot append to a finalized data chunk".to_string(),
            ));
        }
        if values.len() != self.vectors.len() {
            return Err(Error::InvalidArguments(format!(
                "row has {} values, chunk has {} columns",
                values.len(),
                self.vectors.len()
            )));
        }
        for (vector, value) in self.vectors.iter_mut().zip(values) {
            Arc::make_mut(vector).set_value(self.count, value.clone())?;
        }
        self.count += 1;
        for vector in &mut self.vectors {
            Arc::make_mut(vector).finalize(self.count);
        }
        Ok(())
    }

    /// Convert to row-based representation
    pub fn to_rows(&self) -> Vec<Vec<Value>> {
        (0..self.count).map(|row_idx| self.get_row(row_idx)).collect()
    }

    /// Get a single row
    pub fn get_row(&self, row_idx: usize) -> Vec<Value> {
        self.vectors
            .iter()
            .map(|v| v.get_value(super::vector::row_index(v, row_idx)))
            .collect()
    }

    /// Get types of all columns
    pub fn types(&self) -> Vec<LogicalType> {
        self.vectors.iter().map(|v| v.logical_type.clone()).collect()
    }
}
