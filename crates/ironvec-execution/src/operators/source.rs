//! In-memory chunk source

use crate::chunk::DataChunk;
use crate::operator::{QueryContext, Source, SourceState};
use ironvec_common::Result;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Hands out queued chunks one per call, to whichever task asks first
#[derive(Debug)]
pub struct ChunkSource {
    chunks: Mutex<VecDeque<DataChunk>>,
}

impl ChunkSource {
    pub fn new(chunks: Vec<DataChunk>) -> Self {
        ChunkSource {
            chunks: Mutex::new(chunks.into()),
        }
    }

    /// Chunks not handed out yet
    pub fn remaining(&self) -> usize {
        self.chunks.lock().len()
    }
}

impl Source for ChunkSource {
    fn name(&self) -> &str {
        "CHUNK_SOURCE"
    }

    fn execute(&self, _ctx: &QueryContext, state: &mut SourceState) -> Result<()> {
        let mut queue = self.chunks.lock();
        state.chunk = queue.pop_front();
        state.exhausted = queue.is_empty();
        Ok(())
    }
}
