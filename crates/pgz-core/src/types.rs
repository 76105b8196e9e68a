use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::PgzError;

pub type Result<T> = std::result::Result<T, PgzError>;

/// An indexed unit of file data flowing through the pipeline.
///
/// Indices are dense and start at zero; the payload is immutable and cheap to
/// clone because it is reference counted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    pub data: Bytes,
}

impl Chunk {
    /// Creates a new chunk.
    ///
    /// # Arguments
    /// * `index` - Sequence index assigned by the producer
    /// * `data` - The chunk payload
    pub fn new(index: usize, data: impl Into<Bytes>) -> Self {
        Self {
            index,
            data: data.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns a reference to the underlying payload as a byte slice.
    pub fn data(&self) -> &[u8] {
        &self.data[..]
    }
}

impl From<(usize, Bytes)> for Chunk {
    fn from((index, data): (usize, Bytes)) -> Self {
        Self { index, data }
    }
}

impl From<Chunk> for Bytes {
    fn from(chunk: Chunk) -> Self {
        chunk.data
    }
}

/// Direction of a pipeline run.
///
/// The mode fixes both the codec operation applied by workers and the
/// chunking strategy used by the producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelineMode {
    /// Fixed-size chunks are compressed into independent codec streams.
    Compress,
    /// Concatenated codec streams are split at their headers and decoded.
    Decompress,
}

impl PipelineMode {
    /// Short lowercase label used in logs and telemetry.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Compress => "compress",
            Self::Decompress => "decompress",
        }
    }
}

impl fmt::Display for PipelineMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
