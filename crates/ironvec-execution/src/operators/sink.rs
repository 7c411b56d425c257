//! Collecting sink

use crate::chunk::DataChunk;
use crate::operator::{QueryContext, Sink, SinkState};
use ironvec_common::{Result, Value};
use parking_lot::Mutex;

/// Appends every sunk chunk to a shared list
#[derive(Debug, Default)]
pub struct CollectSink {
    chunks: Mutex<Vec<DataChunk>>,
}

impl CollectSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return everything collected so far
    pub fn take_chunks(&self) -> Vec<DataChunk> {
        std::mem::take(&mut *self.chunks.lock())
    }

    pub fn row_count(&self) -> usize {
        self.chunks.lock().iter().map(|c| c.row_count()).sum()
    }

    /// All collected rows, chunk by chunk in arrival order
    pub fn rows(&self) -> Vec<Vec<Value>> {
        self.chunks.lock().iter().flat_map(|c| c.to_rows()).collect()
    }
}

impl Sink for CollectSink {
    fn name(&self) -> &str {
        "COLLECT"
    }

    fn execute(&self, _ctx: &QueryContext, chunk: DataChunk, _state: &SinkState) -> Result<()> {
        self.chunks.lock().push(chunk);
        Ok(())
    }
}
