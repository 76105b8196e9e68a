use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::core::{CancellationToken, PipelineCounters, StagingMap};
use crate::telemetry::{self, Stage, profile, tags};
use crate::{Chunk, PgzError, Result};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Appends processed chunks to the destination strictly in index order.
pub struct ChunkConsumer<W: Write> {
    sink: W,
    stage: Arc<StagingMap<Bytes>>,
    counters: Arc<PipelineCounters>,
    cancel: CancellationToken,
    poll_interval: Duration,
}

impl ChunkConsumer<File> {
    /// Opens an existing destination file for appending.
    ///
    /// # Errors
    /// Fails if the file does not exist; the caller is expected to have
    /// created it.
    pub fn open(
        path: impl AsRef<Path>,
        stage: Arc<StagingMap<Bytes>>,
        counters: Arc<PipelineCounters>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let file = open_destination(path.as_ref())?;
        Ok(Self::new(file, stage, counters, cancel))
    }
}

pub(crate) fn open_destination(path: &Path) -> Result<File> {
    OpenOptions::new().append(true).open(path).map_err(|error| {
        PgzError::from(error).with_context(format!("opening destination {}", path.display()))
    })
}

impl<W: Write> ChunkConsumer<W> {
    pub fn new(
        sink: W,
        stage: Arc<StagingMap<Bytes>>,
        counters: Arc<PipelineCounters>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            sink,
            stage,
            counters,
            cancel,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Writes chunks as they become available until cancelled.
    ///
    /// On cancellation the sink is flushed and handed back.
    ///
    /// # Errors
    /// The first write or flush failure is returned and ends the loop.
    pub fn run(mut self) -> Result<W> {
        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let index = self.stage.next_index();
            if !self.stage.peek_is_next(index) {
                if self.cancel.pause(self.poll_interval) {
                    break;
                }
                continue;
            }

            let Some(chunk) = self.stage.try_take_next().map(Chunk::from) else {
                continue;
            };
            self.write_chunk(chunk.index, chunk.data())?;
        }

        self.sink
            .flush()
            .map_err(|error| PgzError::from(error).with_context("flushing destination"))?;
        tracing::debug!(
            target: "pgz.consumer",
            chunks = self.counters.chunks_written(),
            bytes = self.counters.bytes_written(),
            "consumer stopped"
        );
        Ok(self.sink)
    }

    fn write_chunk(&mut self, index: usize, data: &[u8]) -> Result<()> {
        let started_at = Instant::now();
        let labels = [("subsystem", "consumer"), ("op", "write")];

        if let Err(error) = self.sink.write_all(data) {
            profile::event(
                tags::PROFILE_CONSUMER,
                &[tags::TAG_SYSTEM, tags::TAG_CONSUMER],
                "write",
                "error",
                profile::elapsed_us(started_at),
                "chunk write failed",
            );
            tracing::warn!(target: "pgz.consumer", index, %error, "destination write failed");
            return Err(PgzError::from(error).with_context(format!("writing chunk {index}")));
        }

        self.counters.record_written(data.len());
        let elapsed_us = profile::elapsed_us(started_at);
        telemetry::increment_counter(tags::METRIC_CONSUMER_WRITE_COUNT, 1, &labels);
        telemetry::record_histogram(tags::METRIC_CONSUMER_WRITE_BYTES, data.len() as u64, &labels);
        telemetry::record_histogram(tags::METRIC_CONSUMER_WRITE_LATENCY_US, elapsed_us, &labels);
        telemetry::record_stage_depth(Stage::Output, self.stage.len());
        Ok(())
    }
}
