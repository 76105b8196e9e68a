use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::compression::{BlockCodec, apply_codec};
use crate::core::{CancellationToken, StagingMap};
use crate::telemetry::worker::{DefaultWorkerTelemetry, WorkerTelemetry};
use crate::types::{Chunk, PipelineMode, Result};
use crate::error::panic_message;
use crate::PgzError;

/// Fixed set of threads moving chunks from the input stage to the output
/// stage through a codec.
pub struct WorkerPool {
    num_workers: usize,
    codec: Arc<dyn BlockCodec>,
    mode: PipelineMode,
    telemetry: Arc<dyn WorkerTelemetry>,
}

impl WorkerPool {
    /// Creates a worker pool using the default worker telemetry implementation.
    pub fn new(num_workers: usize, codec: Arc<dyn BlockCodec>, mode: PipelineMode) -> Self {
        Self::with_telemetry(num_workers, codec, mode, Arc::new(DefaultWorkerTelemetry))
    }

    /// Creates a worker pool with a custom telemetry backend.
    pub fn with_telemetry(
        num_workers: usize,
        codec: Arc<dyn BlockCodec>,
        mode: PipelineMode,
        telemetry: Arc<dyn WorkerTelemetry>,
    ) -> Self {
        Self {
            num_workers: num_workers.max(1),
            codec,
            mode,
            telemetry,
        }
    }

    /// Number of workers configured in this pool.
    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    pub fn mode(&self) -> PipelineMode {
        self.mode
    }

    /// Spawns the worker threads.
    ///
    /// Each worker takes the next ready chunk from `input`, applies the codec
    /// and stores the result in `output` under the same index. While `output`
    /// holds `throttle` chunks or more, results wait before insertion, except
    /// the one the output cursor is waiting for. Workers run until `cancel` is
    /// raised; the first codec failure raises it too.
    pub fn spawn(
        &self,
        input: Arc<StagingMap<Bytes>>,
        output: Arc<StagingMap<Bytes>>,
        throttle: usize,
        poll_interval: Duration,
        cancel: CancellationToken,
    ) -> WorkerPoolHandle {
        let state = Arc::new(WorkerPoolState::new(
            input,
            output,
            Arc::clone(&self.codec),
            self.mode,
            Arc::clone(&self.telemetry),
            self.num_workers,
            throttle.max(1),
            poll_interval,
            cancel.clone(),
        ));

        let worker_handles = (0..self.num_workers)
            .map(|worker_id| {
                let worker_state = Arc::clone(&state);
                thread::Builder::new()
                    .name(format!("pgz-worker-{worker_id}"))
                    .spawn(move || run_worker_loop(worker_id, worker_state))
            })
            .collect::<std::io::Result<Vec<_>>>();

        let (worker_handles, spawn_error) = match worker_handles {
            Ok(handles) => (handles, None),
            Err(error) => (Vec::new(), Some(error)),
        };

        let handle = WorkerPoolHandle {
            state,
            worker_handles,
        };
        if let Some(error) = spawn_error {
            handle
                .state
                .record_failure(PgzError::from(error).with_context("spawning worker threads"));
        }
        handle
    }
}

struct WorkerPoolState {
    input: Arc<StagingMap<Bytes>>,
    output: Arc<StagingMap<Bytes>>,
    codec: Arc<dyn BlockCodec>,
    mode: PipelineMode,
    telemetry: Arc<dyn WorkerTelemetry>,
    throttle: usize,
    poll_interval: Duration,
    cancel: CancellationToken,
    started_at: Instant,
    failed: AtomicBool,
    failure: Mutex<Option<PgzError>>,
    completed: AtomicUsize,
    task_counts: Vec<AtomicUsize>,
    worker_started_offsets_us: Vec<AtomicU64>,
    worker_stopped_offsets_us: Vec<AtomicU64>,
    worker_busy_us: Vec<AtomicU64>,
}

impl WorkerPoolState {
    #[allow(clippy::too_many_arguments)]
    fn new(
        input: Arc<StagingMap<Bytes>>,
        output: Arc<StagingMap<Bytes>>,
        codec: Arc<dyn BlockCodec>,
        mode: PipelineMode,
        telemetry: Arc<dyn WorkerTelemetry>,
        num_workers: usize,
        throttle: usize,
        poll_interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        let task_counts = (0..num_workers).map(|_| AtomicUsize::new(0)).collect();
        let worker_started_offsets_us = (0..num_workers).map(|_| AtomicU64::new(0)).collect();
        let worker_stopped_offsets_us = (0..num_workers).map(|_| AtomicU64::new(0)).collect();
        let worker_busy_us = (0..num_workers).map(|_| AtomicU64::new(0)).collect();
        Self {
            input,
            output,
            codec,
            mode,
            telemetry,
            throttle,
            poll_interval,
            cancel,
            started_at: Instant::now(),
            failed: AtomicBool::new(false),
            failure: Mutex::new(None),
            completed: AtomicUsize::new(0),
            task_counts,
            worker_started_offsets_us,
            worker_stopped_offsets_us,
            worker_busy_us,
        }
    }

    // Keeps the first failure only and stops the whole pipeline.
    fn record_failure(&self, error: PgzError) {
        {
            let mut slot = match self.failure.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if slot.is_none() {
                tracing::warn!(target: "pgz.worker", %error, "worker failed, cancelling pipeline");
                *slot = Some(error);
            }
        }
        self.failed.store(true, Ordering::Release);
        self.cancel.cancel();
    }

    fn take_failure(&self) -> Option<PgzError> {
        let mut slot = match self.failure.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        slot.take()
    }

    fn offset_us(&self) -> u64 {
        self.started_at.elapsed().as_micros().min(u64::MAX as u128) as u64
    }
}

/// Per-worker runtime metrics captured by the worker pool.
#[derive(Debug, Clone)]
pub struct WorkerRuntimeSnapshot {
    pub worker_id: usize,
    pub tasks_completed: usize,
    pub uptime: Duration,
    pub busy: Duration,
    pub idle: Duration,
    pub utilization: f64,
}

/// Runtime metrics snapshot for the worker pool.
#[derive(Debug, Clone, Default)]
pub struct PoolRuntimeSnapshot {
    pub elapsed: Duration,
    pub completed: usize,
    pub workers: Vec<WorkerRuntimeSnapshot>,
}

/// Runtime handle for a spawned worker pool.
pub struct WorkerPoolHandle {
    state: Arc<WorkerPoolState>,
    worker_handles: Vec<JoinHandle<()>>,
}

impl WorkerPoolHandle {
    /// Raises the shared cancellation token.
    pub fn cancel(&self) {
        self.state.cancel.cancel();
    }

    /// True once any worker has recorded a fatal failure.
    pub fn has_failed(&self) -> bool {
        self.state.failed.load(Ordering::Acquire)
    }

    /// Takes the recorded failure, if any.
    pub fn take_failure(&self) -> Option<PgzError> {
        self.state.take_failure()
    }

    /// Total number of chunks inserted into the output stage.
    pub fn completed_count(&self) -> usize {
        self.state.completed.load(Ordering::Acquire)
    }

    /// Per-worker processed chunk counts.
    pub fn worker_task_counts(&self) -> Vec<usize> {
        self.state
            .task_counts
            .iter()
            .map(|counter| counter.load(Ordering::Acquire))
            .collect()
    }

    /// Returns runtime metrics for the pool and each worker.
    pub fn runtime_snapshot(&self) -> PoolRuntimeSnapshot {
        let elapsed = self.state.started_at.elapsed();
        let elapsed_us = elapsed.as_micros().min(u64::MAX as u128) as u64;

        let workers = (0..self.state.task_counts.len())
            .map(|worker_id| {
                let started_raw =
                    self.state.worker_started_offsets_us[worker_id].load(Ordering::Acquire);
                let stopped_raw =
                    self.state.worker_stopped_offsets_us[worker_id].load(Ordering::Acquire);
                let busy_us_raw = self.state.worker_busy_us[worker_id].load(Ordering::Acquire);

                // Offsets are stored plus one so that zero means "not yet".
                let start_us = started_raw.saturating_sub(1);
                let stop_us = if stopped_raw == 0 {
                    elapsed_us
                } else {
                    stopped_raw.saturating_sub(1)
                };
                let uptime_us = if started_raw == 0 {
                    0
                } else {
                    stop_us.saturating_sub(start_us)
                };
                let busy_us = busy_us_raw.min(uptime_us);
                let utilization = if uptime_us == 0 {
                    0.0
                } else {
                    busy_us as f64 / uptime_us as f64
                };

                WorkerRuntimeSnapshot {
                    worker_id,
                    tasks_completed: self.state.task_counts[worker_id].load(Ordering::Acquire),
                    uptime: Duration::from_micros(uptime_us),
                    busy: Duration::from_micros(busy_us),
                    idle: Duration::from_micros(uptime_us.saturating_sub(busy_us)),
                    utilization,
                }
            })
            .collect();

        PoolRuntimeSnapshot {
            elapsed,
            completed: self.completed_count(),
            workers,
        }
    }

    /// Cancels the workers, waits for them and returns the final runtime metrics.
    ///
    /// # Errors
    /// Returns the first codec failure recorded by a worker, or
    /// [`PgzError::WorkerPanicked`] if a worker thread died outside the codec.
    pub fn join(mut self) -> Result<PoolRuntimeSnapshot> {
        self.cancel();
        let join_result = self.join_workers();

        if let Some(error) = self.take_failure() {
            return Err(error);
        }
        join_result?;
        Ok(self.runtime_snapshot())
    }

    fn join_workers(&mut self) -> Result<()> {
        let mut first_panic = None;
        for handle in self.worker_handles.drain(..) {
            if let Err(payload) = handle.join() {
                first_panic.get_or_insert_with(|| panic_message(payload.as_ref()));
            }
        }

        match first_panic {
            Some(details) => Err(PgzError::WorkerPanicked(details)),
            None => Ok(()),
        }
    }
}

fn run_worker_loop(worker_id: usize, state: Arc<WorkerPoolState>) {
    state.worker_started_offsets_us[worker_id]
        .store(state.offset_us().saturating_add(1), Ordering::Release);

    while !state.cancel.is_cancelled() {
        let Some(chunk) = state.input.try_take_next().map(Chunk::from) else {
            state
                .telemetry
                .on_stage_depth(worker_id, state.input.len());
            if state.cancel.pause(state.poll_interval) {
                break;
            }
            continue;
        };

        let index = chunk.index;
        state.telemetry.on_task_started(worker_id, state.mode);
        let started_at = Instant::now();

        let result = match catch_unwind(AssertUnwindSafe(|| {
            apply_codec(state.codec.as_ref(), state.mode, chunk.data())
        })) {
            Ok(result) => result,
            Err(payload) => Err(PgzError::WorkerPanicked(format!(
                "codec panicked on chunk {index}: {}",
                panic_message(payload.as_ref())
            ))),
        };

        let elapsed = started_at.elapsed();
        let elapsed_us = elapsed.as_micros().min(u64::MAX as u128) as u64;
        state.worker_busy_us[worker_id].fetch_add(elapsed_us, Ordering::AcqRel);

        let processed = match result {
            Ok(processed) => {
                state
                    .telemetry
                    .on_task_finished(worker_id, state.mode, elapsed);
                Bytes::from(processed)
            }
            Err(error) => {
                state
                    .telemetry
                    .on_task_failed(worker_id, state.mode, elapsed);
                state.record_failure(error.with_context(format!("chunk {index}")));
                break;
            }
        };

        if !wait_for_output_room(worker_id, index, &state) {
            break;
        }

        if let Err(error) = state.output.insert(index, processed) {
            state.record_failure(error);
            break;
        }
        state.completed.fetch_add(1, Ordering::AcqRel);
        state.task_counts[worker_id].fetch_add(1, Ordering::AcqRel);
    }

    state.worker_stopped_offsets_us[worker_id]
        .store(state.offset_us().saturating_add(1), Ordering::Release);
}

// Returns false when cancelled while waiting; the result is then dropped.
fn wait_for_output_room(worker_id: usize, index: usize, state: &WorkerPoolState) -> bool {
    loop {
        if state.cancel.is_cancelled() {
            return false;
        }

        // The chunk at the output cursor always goes through, otherwise a full
        // stage of later chunks could never drain.
        let depth = state.output.len();
        if depth < state.throttle || index == state.output.next_index() {
            return true;
        }

        state.telemetry.on_throttled(worker_id, depth);
        if state.cancel.pause(state.poll_interval) {
            return false;
        }
    }
}
