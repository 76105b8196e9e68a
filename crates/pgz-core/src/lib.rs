//! Order-preserving parallel gzip pipeline.
//!
//! A producer splits the source into indexed chunks, a worker pool runs each
//! chunk through a block codec, and a consumer appends the results to the
//! destination strictly in index order. Two [`StagingMap`]s connect the three
//! stages and bound memory through backpressure.

pub mod compression;
pub mod core;
pub mod error;
pub mod io;
pub mod pipeline;
pub mod telemetry;
pub mod types;

pub use compression::{BlockCodec, GZIP_HEADER_LEN, GZIP_MAGIC, GzipCodec, PassthroughCodec};
pub use crate::core::{
    CancellationToken, PipelineCounters, PoolRuntimeSnapshot, StagingMap, WorkerPool,
    WorkerPoolHandle, WorkerRuntimeSnapshot,
};
pub use error::PgzError;
pub use io::{
    ChunkConsumer, ChunkProducer, ChunkingStrategy, FixedChunking, StreamBoundaryChunking,
    StreamSignature,
};
pub use pipeline::{Pipeline, PipelineConfig, PipelineProgress, PipelineReport};
pub use telemetry::worker::{DefaultWorkerTelemetry, WorkerTelemetry};
pub use types::{Chunk, PipelineMode, Result};
