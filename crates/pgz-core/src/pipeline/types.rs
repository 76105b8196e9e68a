use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::PoolRuntimeSnapshot;
use crate::io::StreamSignature;
use crate::types::PipelineMode;
use crate::{PgzError, Result};

/// Construction config for a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Codec operation and chunking strategy.
    pub mode: PipelineMode,
    /// Fixed chunk size for compression and the read unit in both modes.
    pub chunk_size: usize,
    /// Number of worker threads.
    pub max_threads: usize,
    /// Capacity of the input stage; the producer pauses at half of it.
    pub max_input_chunks: usize,
    /// Output stage size at which workers hold back their results.
    pub max_output_chunks: usize,
    /// Sleep between retries of every polling loop.
    pub poll_interval: Duration,
    /// Minimum time between two progress callbacks.
    pub progress_interval: Duration,
    /// Gzip level used when compressing (0..=9).
    pub compression_level: u32,
    /// Header rule used to split streams when decompressing.
    #[serde(skip)]
    pub signature: StreamSignature,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mode: PipelineMode::Compress,
            chunk_size: 1024 * 1024,
            max_threads: thread::available_parallelism()
                .map(usize::from)
                .unwrap_or(1),
            max_input_chunks: 64,
            max_output_chunks: 64,
            poll_interval: Duration::from_millis(10),
            progress_interval: Duration::from_millis(250),
            compression_level: 6,
            signature: StreamSignature::default(),
        }
    }
}

impl PipelineConfig {
    /// Default configuration for the given mode.
    pub fn new(mode: PipelineMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    pub fn with_mode(mut self, mode: PipelineMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_max_threads(mut self, max_threads: usize) -> Self {
        self.max_threads = max_threads;
        self
    }

    /// Sets both stage capacities at once.
    pub fn with_max_chunks(mut self, max_chunks: usize) -> Self {
        self.max_input_chunks = max_chunks;
        self.max_output_chunks = max_chunks;
        self
    }

    pub fn with_max_input_chunks(mut self, max_input_chunks: usize) -> Self {
        self.max_input_chunks = max_input_chunks;
        self
    }

    pub fn with_max_output_chunks(mut self, max_output_chunks: usize) -> Self {
        self.max_output_chunks = max_output_chunks;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_progress_interval(mut self, progress_interval: Duration) -> Self {
        self.progress_interval = progress_interval;
        self
    }

    pub fn with_compression_level(mut self, level: u32) -> Self {
        self.compression_level = level;
        self
    }

    pub fn with_signature(mut self, signature: StreamSignature) -> Self {
        self.signature = signature;
        self
    }

    /// Checks the settings before any thread is started.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(PgzError::InvalidConfig("chunk size must be greater than zero"));
        }
        if self.max_threads == 0 {
            return Err(PgzError::InvalidConfig("worker count must be greater than zero"));
        }
        if self.max_input_chunks == 0 || self.max_output_chunks == 0 {
            return Err(PgzError::InvalidConfig("stage capacity must be greater than zero"));
        }
        if self.poll_interval.is_zero() {
            return Err(PgzError::InvalidConfig("poll interval must be greater than zero"));
        }
        if self.compression_level > 9 {
            return Err(PgzError::InvalidConfig("compression level must be between 0 and 9"));
        }
        Ok(())
    }
}

/// Point-in-time view of a running pipeline.
#[derive(Debug, Clone)]
pub struct PipelineProgress {
    pub mode: PipelineMode,
    pub elapsed: Duration,
    pub chunks_produced: usize,
    pub chunks_written: usize,
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub input_depth: usize,
    pub output_depth: usize,
    pub producer_done: bool,
    pub runtime: PoolRuntimeSnapshot,
}

/// Summary of a completed pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub mode: PipelineMode,
    pub elapsed: Duration,
    pub chunks: usize,
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub runtime: PoolRuntimeSnapshot,
}

impl PipelineReport {
    /// Output size divided by input size, or zero for empty input.
    pub fn ratio(&self) -> f64 {
        if self.bytes_read == 0 {
            0.0
        } else {
            self.bytes_written as f64 / self.bytes_read as f64
        }
    }

    /// Input bytes processed per second.
    pub fn throughput_bytes_per_sec(&self) -> f64 {
        let seconds = self.elapsed.as_secs_f64();
        if seconds <= f64::EPSILON {
            0.0
        } else {
            self.bytes_read as f64 / seconds
        }
    }
}
