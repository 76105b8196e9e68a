use std::time::{Duration, Instant};

use pgz_core::telemetry::profile;

#[test]
fn elapsed_us_reports_elapsed_time() {
    let started_at = Instant::now();
    std::thread::sleep(Duration::from_millis(1));
    assert!(profile::elapsed_us(started_at) >= 1_000);
}

#[cfg(not(feature = "telemetry"))]
#[test]
fn snapshot_is_empty_without_the_registry() {
    use pgz_core::telemetry::{self, tags};

    telemetry::increment_counter(tags::METRIC_PIPELINE_RUN_COUNT, 1, &[]);
    assert_eq!(telemetry::snapshot(), telemetry::TelemetrySnapshot::default());
}

#[cfg(feature = "profiling")]
mod profile_tag_stack_tests {
    use std::sync::Mutex;

    use pgz_core::telemetry::profile;
    use pgz_core::telemetry::tags;

    static PROFILE_TAG_MUTEX: Mutex<()> = Mutex::new(());

    #[test]
    fn supports_enabling_multiple_tags_together() {
        let _guard = PROFILE_TAG_MUTEX.lock().expect("profile tag lock poisoned");

        profile::set_enabled_tags(&[tags::TAG_PRODUCER, tags::TAG_CONSUMER]);

        assert!(profile::is_tag_stack_enabled(&[tags::TAG_SYSTEM, tags::TAG_PRODUCER]));
        assert!(profile::is_tag_stack_enabled(&[tags::TAG_SYSTEM, tags::TAG_CONSUMER]));
        assert!(!profile::is_tag_stack_enabled(&[tags::TAG_SYSTEM, tags::TAG_WORKER]));

        profile::enable_all_tags();
        assert!(profile::is_tag_stack_enabled(&[tags::TAG_WORKER]));
    }

    #[test]
    fn tag_matching_ignores_case() {
        let _guard = PROFILE_TAG_MUTEX.lock().expect("profile tag lock poisoned");

        profile::set_enabled_tags(&["CODEC"]);
        assert!(profile::is_tag_stack_enabled(&[tags::TAG_CODEC]));
        assert!(!profile::is_tag_stack_enabled(&[tags::TAG_PIPELINE]));

        profile::enable_all_tags();
    }
}

#[cfg(feature = "telemetry")]
mod telemetry_enabled_tests {
    use std::io;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use pgz_core::telemetry::{self, tags};
    use pgz_core::{
        DefaultWorkerTelemetry, PassthroughCodec, Pipeline, PipelineConfig, PipelineMode,
        WorkerTelemetry,
    };

    static TELEMETRY_TEST_MUTEX: Mutex<()> = Mutex::new(());

    #[test]
    fn pipeline_run_records_component_metrics() -> Result<(), Box<dyn std::error::Error>> {
        let _guard = TELEMETRY_TEST_MUTEX
            .lock()
            .expect("telemetry test lock poisoned");
        telemetry::reset();

        let config = PipelineConfig::new(PipelineMode::Compress)
            .with_chunk_size(1024)
            .with_max_threads(2)
            .with_max_chunks(8)
            .with_poll_interval(Duration::from_millis(1));
        let pipeline = Pipeline::with_codec(config, Arc::new(PassthroughCodec));
        let (_, report) =
            pipeline.run_streams(io::Cursor::new(vec![5u8; 10 * 1024]), Vec::new(), |_| {})?;
        assert_eq!(report.chunks, 10);

        let snapshot = telemetry::snapshot();
        assert_eq!(snapshot.counter(tags::METRIC_PRODUCER_CHUNK_COUNT), Some(10));
        assert_eq!(snapshot.counter(tags::METRIC_CODEC_COMPRESS_COUNT), Some(10));
        assert_eq!(snapshot.counter(tags::METRIC_WORKER_TASK_COUNT), Some(10));
        assert_eq!(snapshot.counter(tags::METRIC_CONSUMER_WRITE_COUNT), Some(10));
        assert_eq!(snapshot.counter(tags::METRIC_PIPELINE_RUN_COUNT), Some(1));
        assert_eq!(snapshot.counter(tags::METRIC_PIPELINE_FAIL_COUNT), None);

        let write_bytes = snapshot
            .histogram(tags::METRIC_CONSUMER_WRITE_BYTES)
            .expect("consumer write histogram missing");
        assert_eq!(write_bytes.count, 10);
        assert_eq!(write_bytes.total, 10 * 1024);
        assert_eq!(snapshot.gauge(tags::METRIC_WORKER_ACTIVE_COUNT), Some(0));
        Ok(())
    }

    #[test]
    fn worker_telemetry_tracks_active_tasks() {
        let _guard = TELEMETRY_TEST_MUTEX
            .lock()
            .expect("telemetry test lock poisoned");
        telemetry::reset();

        let worker = DefaultWorkerTelemetry;
        worker.on_task_started(0, PipelineMode::Decompress);
        worker.on_task_started(1, PipelineMode::Decompress);
        assert_eq!(
            telemetry::snapshot().gauge(tags::METRIC_WORKER_ACTIVE_COUNT),
            Some(2)
        );

        worker.on_task_finished(0, PipelineMode::Decompress, Duration::from_micros(40));
        worker.on_task_failed(1, PipelineMode::Decompress, Duration::from_micros(60));
        worker.on_throttled(0, 12);

        let snapshot = telemetry::snapshot();
        assert_eq!(snapshot.gauge(tags::METRIC_WORKER_ACTIVE_COUNT), Some(0));
        assert_eq!(snapshot.counter(tags::METRIC_WORKER_TASK_COUNT), Some(1));
        assert_eq!(snapshot.counter(tags::METRIC_WORKER_TASK_FAIL_COUNT), Some(1));
        assert_eq!(snapshot.counter(tags::METRIC_WORKER_THROTTLE_COUNT), Some(1));
        assert_eq!(snapshot.gauge(tags::METRIC_STAGE_OUTPUT_DEPTH), Some(12));

        let latency = snapshot
            .histogram(tags::METRIC_WORKER_TASK_LATENCY_US)
            .expect("latency histogram missing");
        assert_eq!(latency.count, 2);
        assert_eq!(latency.min, 40);
        assert_eq!(latency.max, 60);
    }
}
