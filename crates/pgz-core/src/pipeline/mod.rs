use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, ScopedJoinHandle};
use std::time::Instant;

use bytes::Bytes;

use crate::compression::{BlockCodec, GzipCodec};
use crate::core::{
    CancellationToken, PipelineCounters, PoolRuntimeSnapshot, StagingMap, WorkerPool,
    WorkerPoolHandle,
};
use crate::error::panic_message;
use crate::io::consumer::open_destination;
use crate::io::producer::open_source;
use crate::io::{
    ChunkConsumer, ChunkProducer, ChunkingStrategy, FixedChunking, StreamBoundaryChunking,
};
use crate::telemetry::worker::{DefaultWorkerTelemetry, WorkerTelemetry};
use crate::telemetry::{self, profile, tags};
use crate::types::PipelineMode;
use crate::{PgzError, Result};

mod types;

pub use types::{PipelineConfig, PipelineProgress, PipelineReport};

const PROFILE_TAG_STACK_PIPELINE: [&str; 2] = [tags::TAG_SYSTEM, tags::TAG_PIPELINE];

/// Order-preserving parallel pipeline: producer, worker pool and consumer
/// connected by two staging maps.
///
/// Every run owns its own stages, counters and cancellation token, so one
/// `Pipeline` can be reused for any number of sequential or concurrent runs.
pub struct Pipeline {
    config: PipelineConfig,
    codec: Arc<dyn BlockCodec>,
    telemetry: Arc<dyn WorkerTelemetry>,
}

impl Pipeline {
    /// Creates a gzip pipeline from `config`.
    pub fn new(config: PipelineConfig) -> Self {
        let codec = Arc::new(GzipCodec::new(config.compression_level));
        Self::with_codec(config, codec)
    }

    /// Creates a pipeline around an arbitrary block codec.
    pub fn with_codec(config: PipelineConfig, codec: Arc<dyn BlockCodec>) -> Self {
        Self {
            config,
            codec,
            telemetry: Arc::new(DefaultWorkerTelemetry),
        }
    }

    /// Replaces the worker telemetry backend.
    pub fn with_worker_telemetry(mut self, telemetry: Arc<dyn WorkerTelemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Processes `source` into the existing file `destination`.
    pub fn run(
        &self,
        source: impl AsRef<Path>,
        destination: impl AsRef<Path>,
    ) -> Result<PipelineReport> {
        self.run_with_progress(source, destination, |_| {})
    }

    /// Like [`run`](Self::run) and emits progress snapshots while processing.
    ///
    /// The destination must already exist; chunks are appended to it.
    pub fn run_with_progress<F>(
        &self,
        source: impl AsRef<Path>,
        destination: impl AsRef<Path>,
        on_progress: F,
    ) -> Result<PipelineReport>
    where
        F: FnMut(PipelineProgress),
    {
        let reader = open_source(source.as_ref())?;
        let writer = open_destination(destination.as_ref())?;

        self.run_streams(reader, writer, on_progress)
            .map(|(_, report)| report)
    }

    /// Runs the pipeline between arbitrary streams and hands the writer back.
    pub fn run_streams<R, W, F>(
        &self,
        reader: R,
        writer: W,
        mut on_progress: F,
    ) -> Result<(W, PipelineReport)>
    where
        R: Read + Send,
        W: Write + Send,
        F: FnMut(PipelineProgress),
    {
        self.config.validate()?;
        let config = &self.config;
        let started_at = Instant::now();

        let input = Arc::new(StagingMap::<Bytes>::with_capacity(config.max_input_chunks));
        let output = Arc::new(StagingMap::<Bytes>::with_capacity(config.max_output_chunks));
        let counters = Arc::new(PipelineCounters::new());
        let cancel = CancellationToken::new();

        let strategy: Box<dyn ChunkingStrategy> = match config.mode {
            PipelineMode::Compress => Box::new(FixedChunking::new(config.chunk_size)),
            PipelineMode::Decompress => Box::new(StreamBoundaryChunking::new(config.signature)),
        };
        let producer = ChunkProducer::new(
            reader,
            Arc::clone(&input),
            strategy,
            Arc::clone(&counters),
            cancel.clone(),
        )
        .with_capacity(config.max_input_chunks)
        .with_read_unit(config.chunk_size)
        .with_poll_interval(config.poll_interval);
        let consumer = ChunkConsumer::new(
            writer,
            Arc::clone(&output),
            Arc::clone(&counters),
            cancel.clone(),
        )
        .with_poll_interval(config.poll_interval);
        let pool = WorkerPool::with_telemetry(
            config.max_threads,
            Arc::clone(&self.codec),
            config.mode,
            Arc::clone(&self.telemetry),
        );

        tracing::debug!(
            target: "pgz.pipeline",
            mode = %config.mode,
            codec = self.codec.name(),
            chunk_size = config.chunk_size,
            workers = pool.num_workers(),
            max_input_chunks = config.max_input_chunks,
            max_output_chunks = config.max_output_chunks,
            "pipeline started"
        );

        let result = thread::scope(|scope| -> Result<(W, PoolRuntimeSnapshot)> {
            let producer_thread = thread::Builder::new()
                .name("pgz-producer".to_string())
                .spawn_scoped(scope, move || producer.run())?;
            let consumer_thread = thread::Builder::new()
                .name("pgz-consumer".to_string())
                .spawn_scoped(scope, move || consumer.run());
            let consumer_thread = match consumer_thread {
                Ok(handle) => handle,
                Err(error) => {
                    cancel.cancel();
                    return Err(PgzError::from(error).with_context("spawning consumer thread"));
                }
            };
            let workers = pool.spawn(
                Arc::clone(&input),
                Arc::clone(&output),
                config.max_output_chunks,
                config.poll_interval,
                cancel.clone(),
            );

            let progress = |workers: &WorkerPoolHandle| PipelineProgress {
                mode: config.mode,
                elapsed: started_at.elapsed(),
                chunks_produced: counters.chunks_produced(),
                chunks_written: counters.chunks_written(),
                bytes_read: counters.bytes_read(),
                bytes_written: counters.bytes_written(),
                input_depth: input.len(),
                output_depth: output.len(),
                producer_done: counters.producer_done(),
                runtime: workers.runtime_snapshot(),
            };

            let mut last_emit = Instant::now();
            loop {
                let producer_failed = producer_thread.is_finished() && !counters.producer_done();
                if counters.is_drained()
                    || producer_failed
                    || workers.has_failed()
                    || consumer_thread.is_finished()
                {
                    break;
                }

                if last_emit.elapsed() >= config.progress_interval {
                    on_progress(progress(&workers));
                    last_emit = Instant::now();
                }
                thread::sleep(config.poll_interval);
            }

            cancel.cancel();
            let final_progress = progress(&workers);
            let pool_result = workers.join();
            let producer_result = join_scoped(producer_thread, "producer");
            let consumer_result = join_scoped(consumer_thread, "consumer");

            let runtime = pool_result?;
            producer_result?;
            let writer = consumer_result?;
            if !counters.is_drained() {
                return Err(PgzError::Other(anyhow::anyhow!(
                    "pipeline stopped with {} of {} chunks written",
                    counters.chunks_written(),
                    counters.chunks_produced()
                )));
            }

            on_progress(final_progress);
            Ok((writer, runtime))
        });

        let elapsed = started_at.elapsed();
        let elapsed_us = profile::elapsed_us(started_at);
        let labels = [("subsystem", "pipeline"), ("mode", config.mode.as_str())];
        telemetry::increment_counter(tags::METRIC_PIPELINE_RUN_COUNT, 1, &labels);
        telemetry::record_histogram(tags::METRIC_PIPELINE_LATENCY_US, elapsed_us, &labels);

        match result {
            Ok((writer, runtime)) => {
                let report = PipelineReport {
                    mode: config.mode,
                    elapsed,
                    chunks: counters.chunks_written(),
                    bytes_read: counters.bytes_read(),
                    bytes_written: counters.bytes_written(),
                    runtime,
                };
                profile::event(
                    tags::PROFILE_PIPELINE,
                    &PROFILE_TAG_STACK_PIPELINE,
                    "run",
                    "ok",
                    elapsed_us,
                    "pipeline completed",
                );
                tracing::debug!(
                    target: "pgz.pipeline",
                    mode = %config.mode,
                    chunks = report.chunks,
                    bytes_read = report.bytes_read,
                    bytes_written = report.bytes_written,
                    elapsed_us,
                    "pipeline completed"
                );
                Ok((writer, report))
            }
            Err(error) => {
                telemetry::increment_counter(tags::METRIC_PIPELINE_FAIL_COUNT, 1, &labels);
                profile::event(
                    tags::PROFILE_PIPELINE,
                    &PROFILE_TAG_STACK_PIPELINE,
                    "run",
                    "error",
                    elapsed_us,
                    "pipeline failed",
                );
                tracing::warn!(
                    target: "pgz.pipeline",
                    mode = %config.mode,
                    chunks_produced = counters.chunks_produced(),
                    chunks_written = counters.chunks_written(),
                    %error,
                    "pipeline failed"
                );
                Err(error)
            }
        }
    }
}

fn join_scoped<T>(handle: ScopedJoinHandle<'_, Result<T>>, role: &str) -> Result<T> {
    match handle.join() {
        Ok(result) => result,
        Err(payload) => Err(PgzError::WorkerPanicked(format!(
            "{role} thread: {}",
            panic_message(payload.as_ref())
        ))),
    }
}
