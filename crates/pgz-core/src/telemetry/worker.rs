use std::time::Duration;

use crate::telemetry::{self, Stage, profile, tags};
use crate::types::PipelineMode;

const PROFILE_TAG_STACK_WORKER: [&str; 2] = [tags::TAG_SYSTEM, tags::TAG_WORKER];

/// Telemetry contract for worker runtimes.
///
/// The worker pool calls these hooks so metrics and profiling events stay
/// independent of a specific backend.
pub trait WorkerTelemetry: Send + Sync {
    fn on_stage_depth(&self, worker_id: usize, input_depth: usize);
    fn on_task_started(&self, worker_id: usize, mode: PipelineMode);
    fn on_task_finished(&self, worker_id: usize, mode: PipelineMode, elapsed: Duration);
    fn on_task_failed(&self, worker_id: usize, mode: PipelineMode, elapsed: Duration);
    fn on_throttled(&self, worker_id: usize, output_depth: usize);
}

/// Default telemetry implementation that reports worker metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultWorkerTelemetry;

impl WorkerTelemetry for DefaultWorkerTelemetry {
    fn on_stage_depth(&self, _worker_id: usize, input_depth: usize) {
        telemetry::record_stage_depth(Stage::Input, input_depth);
    }

    fn on_task_started(&self, _worker_id: usize, mode: PipelineMode) {
        telemetry::add_gauge(
            tags::METRIC_WORKER_ACTIVE_COUNT,
            1,
            &[
                ("subsystem", "worker"),
                ("op", "task_start"),
                ("mode", mode.as_str()),
            ],
        );
    }

    fn on_task_finished(&self, worker_id: usize, mode: PipelineMode, elapsed: Duration) {
        let elapsed_us = elapsed.as_micros().min(u64::MAX as u128) as u64;
        let labels = [
            ("subsystem", "worker"),
            ("op", "task"),
            ("result", "ok"),
            ("mode", mode.as_str()),
        ];

        telemetry::increment_counter(tags::METRIC_WORKER_TASK_COUNT, 1, &labels);
        telemetry::record_histogram(tags::METRIC_WORKER_TASK_LATENCY_US, elapsed_us, &labels);
        telemetry::sub_gauge_saturating(tags::METRIC_WORKER_ACTIVE_COUNT, 1, &labels);

        profile::event(
            tags::PROFILE_WORKER,
            &PROFILE_TAG_STACK_WORKER,
            "task_finish",
            "ok",
            elapsed_us,
            "worker task finished",
        );
        tracing::trace!(target: "pgz.worker", worker_id, mode = %mode, elapsed_us, "chunk processed");
    }

    fn on_task_failed(&self, worker_id: usize, mode: PipelineMode, elapsed: Duration) {
        let elapsed_us = elapsed.as_micros().min(u64::MAX as u128) as u64;
        let labels = [
            ("subsystem", "worker"),
            ("op", "task"),
            ("result", "error"),
            ("mode", mode.as_str()),
        ];

        telemetry::increment_counter(tags::METRIC_WORKER_TASK_FAIL_COUNT, 1, &labels);
        telemetry::record_histogram(tags::METRIC_WORKER_TASK_LATENCY_US, elapsed_us, &labels);
        telemetry::sub_gauge_saturating(tags::METRIC_WORKER_ACTIVE_COUNT, 1, &labels);

        profile::event(
            tags::PROFILE_WORKER,
            &PROFILE_TAG_STACK_WORKER,
            "task_finish",
            "error",
            elapsed_us,
            "worker task failed",
        );
        tracing::debug!(target: "pgz.worker", worker_id, mode = %mode, elapsed_us, "chunk processing failed");
    }

    fn on_throttled(&self, _worker_id: usize, output_depth: usize) {
        telemetry::increment_counter(
            tags::METRIC_WORKER_THROTTLE_COUNT,
            1,
            &[("subsystem", "worker"), ("op", "throttle")],
        );
        telemetry::record_stage_depth(Stage::Output, output_depth);
    }
}
