use std::fs::File;
use std::any::Any;
use std::collections::VecDeque;
use std::io::{self, Read};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use crossbeam_channel::bounded;

use crate::core::{CancellationToken, PipelineCounters, StagingMap};
use crate::error::panic_message;
use crate::io::chunking::ChunkingStrategy;
use crate::telemetry::{self, Stage, profile, tags};
use crate::{PgzError, Result};

const DEFAULT_CAPACITY: usize = 64;
const DEFAULT_READ_UNIT: usize = 1024 * 1024;
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);
const PROFILE_TAG_STACK_PRODUCER: [&str; 2] = [tags::TAG_SYSTEM, tags::TAG_PRODUCER];

/// Reads a source sequentially and stages indexed chunks for the workers.
///
/// Reads happen on a prefetch thread so that the next read is in flight
/// while the chunking strategy scans what was already read. Production
/// pauses while the stage holds half its capacity or more and resumes once
/// it drops below that.
pub struct ChunkProducer<R> {
    source: R,
    stage: Arc<StagingMap<Bytes>>,
    strategy: Box<dyn ChunkingStrategy>,
    counters: Arc<PipelineCounters>,
    cancel: CancellationToken,
    capacity: usize,
    read_unit: usize,
    poll_interval: Duration,
}

impl ChunkProducer<File> {
    /// Creates a producer reading the file at `path`.
    pub fn open(
        path: impl AsRef<Path>,
        stage: Arc<StagingMap<Bytes>>,
        strategy: Box<dyn ChunkingStrategy>,
        counters: Arc<PipelineCounters>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let file = open_source(path.as_ref())?;
        Ok(Self::new(file, stage, strategy, counters, cancel))
    }
}

pub(crate) fn open_source(path: &Path) -> Result<File> {
    File::open(path).map_err(|error| {
        PgzError::from(error).with_context(format!("opening source {}", path.display()))
    })
}

impl<R: Read + Send> ChunkProducer<R> {
    pub fn new(
        source: R,
        stage: Arc<StagingMap<Bytes>>,
        strategy: Box<dyn ChunkingStrategy>,
        counters: Arc<PipelineCounters>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            source,
            stage,
            strategy,
            counters,
            cancel,
            capacity: DEFAULT_CAPACITY,
            read_unit: DEFAULT_READ_UNIT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Maximum number of chunks the stage should hold.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Number of bytes requested per read. A shorter read marks end of input.
    pub fn with_read_unit(mut self, read_unit: usize) -> Self {
        self.read_unit = read_unit.max(1);
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Reads the whole source and stages every chunk.
    ///
    /// Returns the number of chunks staged. When the cancellation token is
    /// raised the producer stops early without marking itself done.
    ///
    /// # Errors
    /// Read failures and staging rejections are returned as-is.
    pub fn run(self) -> Result<usize> {
        let Self {
            mut source,
            stage,
            mut strategy,
            counters,
            cancel,
            capacity,
            read_unit,
            poll_interval,
        } = self;

        let started_at = Instant::now();
        let resume_below = (capacity / 2).max(1);
        let mut staged = StagedChunks {
            stage: &stage,
            counters: &counters,
            next_index: 0,
        };

        let finished = thread::scope(|scope| -> Result<bool> {
            let (request_tx, request_rx) = bounded::<()>(1);
            let (data_tx, data_rx) = bounded::<io::Result<Vec<u8>>>(1);

            let reader = scope.spawn(move || {
                for () in request_rx {
                    let result = read_unit_from(&mut source, read_unit);
                    let last = !matches!(&result, Ok(data) if data.len() == read_unit);
                    if data_tx.send(result).is_err() || last {
                        break;
                    }
                }
            });

            let mut stage_source = || -> Result<bool> {
                let mut leftover = BytesMut::with_capacity(read_unit);
                let mut pending = VecDeque::new();
                let mut end_of_input = false;
                loop {
                    if !staged.wait_for_room(resume_below, resume_below, &cancel, poll_interval) {
                        return Ok(false);
                    }

                    if !end_of_input && request_tx.send(()).is_err() {
                        return Err(reader_stopped());
                    }

                    // Any read is in flight; resolve what is already buffered. A
                    // single read may hold many streams, so the stage is checked
                    // before every insert.
                    pending.extend(strategy.split(&mut leftover));
                    while let Some(chunk) = pending.pop_front() {
                        if !staged.wait_for_room(capacity, resume_below, &cancel, poll_interval) {
                            return Ok(false);
                        }
                        staged.push(chunk)?;
                    }
                    if end_of_input {
                        return Ok(true);
                    }

                    let data = data_rx
                        .recv()
                        .map_err(|_| reader_stopped())?
                        .map_err(|error| PgzError::from(error).with_context("reading source"))?;
                    counters.record_read(data.len());
                    telemetry::increment_counter(
                        tags::METRIC_PRODUCER_READ_COUNT,
                        1,
                        &[("subsystem", "producer"), ("op", "read")],
                    );

                    end_of_input = data.len() < read_unit;
                    leftover.extend_from_slice(&data);
                    if end_of_input {
                        pending.extend(strategy.finish(&mut leftover));
                    }
                }
            };
            let outcome = stage_source();

            // Unblocks the reader before joining it.
            drop(request_tx);
            drop(data_rx);
            match reader.join() {
                Ok(()) => outcome,
                Err(payload) => Err(reader_panicked(payload.as_ref())),
            }
        })?;

        let produced = staged.next_index;
        let elapsed_us = profile::elapsed_us(started_at);
        if finished {
            counters.mark_producer_done();
            profile::event(
                tags::PROFILE_PRODUCER,
                &PROFILE_TAG_STACK_PRODUCER,
                "run",
                "ok",
                elapsed_us,
                "producer finished",
            );
            tracing::debug!(
                target: "pgz.producer",
                chunks = produced,
                bytes = counters.bytes_read(),
                elapsed_us,
                "source fully staged"
            );
        } else {
            tracing::debug!(target: "pgz.producer", chunks = produced, "producer cancelled");
        }

        Ok(produced)
    }
}

/// Assigns dense indices to chunks as they are staged.
struct StagedChunks<'a> {
    stage: &'a StagingMap<Bytes>,
    counters: &'a PipelineCounters,
    next_index: usize,
}

impl StagedChunks<'_> {
    /// Once the stage holds `limit` chunks, waits until it drops below
    /// `resume_below`. Returns false if cancelled meanwhile.
    fn wait_for_room(
        &self,
        limit: usize,
        resume_below: usize,
        cancel: &CancellationToken,
        poll_interval: Duration,
    ) -> bool {
        if self.stage.len() < limit {
            return !cancel.is_cancelled();
        }
        while self.stage.len() >= resume_below {
            telemetry::increment_counter(
                tags::METRIC_PRODUCER_BACKPRESSURE_COUNT,
                1,
                &[("subsystem", "producer"), ("op", "backpressure")],
            );
            if cancel.pause(poll_interval) {
                return false;
            }
        }
        !cancel.is_cancelled()
    }

    fn push(&mut self, chunk: Bytes) -> Result<()> {
        let len = chunk.len();
        self.stage.insert(self.next_index, chunk)?;
        self.next_index += 1;
        self.counters.record_produced();

        let labels = [("subsystem", "producer"), ("op", "stage")];
        telemetry::increment_counter(tags::METRIC_PRODUCER_CHUNK_COUNT, 1, &labels);
        telemetry::record_histogram(tags::METRIC_PRODUCER_CHUNK_BYTES, len as u64, &labels);
        telemetry::record_stage_depth(Stage::Input, self.stage.len());
        Ok(())
    }
}

// Fills up to `read_unit` bytes, retrying short reads until end of input.
fn read_unit_from<R: Read>(source: &mut R, read_unit: usize) -> io::Result<Vec<u8>> {
    let mut data = Vec::with_capacity(read_unit);
    source.by_ref().take(read_unit as u64).read_to_end(&mut data)?;
    Ok(data)
}

fn reader_stopped() -> PgzError {
    PgzError::Other(anyhow::anyhow!("source reader thread stopped unexpectedly"))
        .with_context("reading source")
}

fn reader_panicked(payload: &(dyn Any + Send)) -> PgzError {
    PgzError::Other(anyhow::anyhow!(
        "source reader thread panicked: {}",
        panic_message(payload)
    ))
    .with_context("reading source")
}
