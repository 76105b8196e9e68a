use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use pgz_core::compression::{BlockCodec, GzipCodec, PassthroughCodec};
use pgz_core::{
    CancellationToken, PgzError, PipelineMode, Result as PgzResult, StagingMap, WorkerPool,
    WorkerTelemetry,
};

const POLL: Duration = Duration::from_millis(1);

fn filled_stage(count: usize) -> Result<Arc<StagingMap<Bytes>>, PgzError> {
    let stage = Arc::new(StagingMap::new());
    for index in 0..count {
        stage.insert(index, Bytes::from(vec![index as u8; 32 + index % 5]))?;
    }
    Ok(stage)
}

fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..5_000 {
        if condition() {
            return;
        }
        thread::sleep(POLL);
    }
    panic!("condition not reached in time");
}

/// Sleeps longer on even chunks so that completion order differs from index order.
struct JitterCodec;

impl BlockCodec for JitterCodec {
    fn name(&self) -> &'static str {
        "jitter"
    }

    fn compress(&self, data: &[u8]) -> PgzResult<Vec<u8>> {
        if data.first().is_some_and(|byte| byte % 2 == 0) {
            thread::sleep(Duration::from_millis(3));
        }
        Ok(data.to_vec())
    }

    fn decompress(&self, data: &[u8]) -> PgzResult<Vec<u8>> {
        self.compress(data)
    }
}

#[test]
fn worker_pool_moves_every_chunk_under_its_index() -> Result<(), Box<dyn std::error::Error>> {
    let input = filled_stage(64)?;
    let output = Arc::new(StagingMap::new());
    let pool = WorkerPool::new(4, Arc::new(JitterCodec), PipelineMode::Compress);
    let handle = pool.spawn(
        Arc::clone(&input),
        Arc::clone(&output),
        1_000,
        POLL,
        CancellationToken::new(),
    );

    wait_until(|| output.len() == 64);
    let runtime = handle.join()?;

    assert!(input.is_empty());
    for expected in 0..64usize {
        let (index, data) = output.try_take_next().expect("chunk present");
        assert_eq!(index, expected);
        assert_eq!(data, Bytes::from(vec![expected as u8; 32 + expected % 5]));
    }

    assert_eq!(runtime.completed, 64);
    assert_eq!(runtime.workers.len(), 4);
    let total: usize = runtime
        .workers
        .iter()
        .map(|worker| worker.tasks_completed)
        .sum();
    assert_eq!(total, 64);
    assert!(runtime.workers.iter().all(|worker| worker.utilization <= 1.0));
    Ok(())
}

#[test]
fn gzip_workers_emit_decodable_members() -> Result<(), Box<dyn std::error::Error>> {
    let input = filled_stage(8)?;
    let output = Arc::new(StagingMap::new());
    let pool = WorkerPool::new(2, Arc::new(GzipCodec::default()), PipelineMode::Compress);
    let handle = pool.spawn(
        Arc::clone(&input),
        Arc::clone(&output),
        64,
        POLL,
        CancellationToken::new(),
    );
    wait_until(|| output.len() == 8);
    handle.join()?;

    let codec = GzipCodec::default();
    while let Some((index, member)) = output.try_take_next() {
        assert_eq!(codec.decompress(&member)?, vec![index as u8; 32 + index % 5]);
    }
    Ok(())
}

#[test]
fn codec_failure_cancels_pipeline_and_is_reported() -> Result<(), Box<dyn std::error::Error>> {
    let input = filled_stage(4)?;
    let output = Arc::new(StagingMap::new());
    let cancel = CancellationToken::new();
    // Plain bytes are not gzip members.
    let pool = WorkerPool::new(2, Arc::new(GzipCodec::default()), PipelineMode::Decompress);
    let handle = pool.spawn(Arc::clone(&input), Arc::clone(&output), 64, POLL, cancel.clone());

    wait_until(|| handle.has_failed());
    assert!(cancel.is_cancelled());

    let error = handle.join().expect_err("decompression must fail");
    assert!(error.is_malformed_stream());
    assert!(output.is_empty());
    Ok(())
}

struct PanickingCodec;

impl BlockCodec for PanickingCodec {
    fn name(&self) -> &'static str {
        "panicking"
    }

    fn compress(&self, _data: &[u8]) -> PgzResult<Vec<u8>> {
        panic!("codec exploded")
    }

    fn decompress(&self, _data: &[u8]) -> PgzResult<Vec<u8>> {
        panic!("codec exploded")
    }
}

#[test]
fn codec_panic_becomes_worker_panicked_error() -> Result<(), Box<dyn std::error::Error>> {
    let input = filled_stage(2)?;
    let pool = WorkerPool::new(1, Arc::new(PanickingCodec), PipelineMode::Compress);
    let handle = pool.spawn(
        input,
        Arc::new(StagingMap::new()),
        8,
        POLL,
        CancellationToken::new(),
    );

    wait_until(|| handle.has_failed());
    match handle.join() {
        Err(PgzError::Context { source, .. }) => match *source {
            PgzError::WorkerPanicked(message) => assert!(message.contains("codec exploded")),
            other => panic!("unexpected source: {other:?}"),
        },
        other => panic!("unexpected result: {other:?}"),
    }
    Ok(())
}

#[test]
fn full_output_stage_throttles_workers() -> Result<(), Box<dyn std::error::Error>> {
    let throttle = 4;
    let workers = 3;
    let input = filled_stage(40)?;
    let output = Arc::new(StagingMap::new());
    let pool = WorkerPool::new(workers, Arc::new(PassthroughCodec), PipelineMode::Compress);
    let handle = pool.spawn(
        Arc::clone(&input),
        Arc::clone(&output),
        throttle,
        POLL,
        CancellationToken::new(),
    );

    wait_until(|| output.len() >= throttle);
    thread::sleep(Duration::from_millis(30));
    // Workers that passed the depth check together may each insert once.
    assert!(output.len() <= throttle + workers);
    assert!(input.len() >= 40 - throttle - 2 * workers);

    // Draining the cursor lets the held results through.
    while output.try_take_next().is_some() {}
    wait_until(|| output.len() >= throttle);

    handle.join()?;
    Ok(())
}

#[derive(Default)]
struct CountingTelemetry {
    finished: AtomicUsize,
    failed: AtomicUsize,
}

impl WorkerTelemetry for CountingTelemetry {
    fn on_stage_depth(&self, _worker_id: usize, _input_depth: usize) {}

    fn on_task_started(&self, _worker_id: usize, _mode: PipelineMode) {}

    fn on_task_finished(&self, _worker_id: usize, _mode: PipelineMode, _elapsed: Duration) {
        self.finished.fetch_add(1, Ordering::AcqRel);
    }

    fn on_task_failed(&self, _worker_id: usize, _mode: PipelineMode, _elapsed: Duration) {
        self.failed.fetch_add(1, Ordering::AcqRel);
    }

    fn on_throttled(&self, _worker_id: usize, _output_depth: usize) {}
}

#[test]
fn custom_telemetry_sees_each_task() -> Result<(), Box<dyn std::error::Error>> {
    let telemetry = Arc::new(CountingTelemetry::default());
    let input = filled_stage(10)?;
    let output = Arc::new(StagingMap::new());
    let pool = WorkerPool::with_telemetry(
        2,
        Arc::new(PassthroughCodec),
        PipelineMode::Compress,
        telemetry.clone(),
    );
    let handle = pool.spawn(input, Arc::clone(&output), 64, POLL, CancellationToken::new());

    wait_until(|| output.len() == 10);
    handle.join()?;

    assert_eq!(telemetry.finished.load(Ordering::Acquire), 10);
    assert_eq!(telemetry.failed.load(Ordering::Acquire), 0);
    Ok(())
}
