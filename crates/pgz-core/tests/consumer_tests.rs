use std::fs;
use std::io::{self, Write};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use pgz_core::{CancellationToken, ChunkConsumer, PgzError, PipelineCounters, StagingMap};
use tempfile::NamedTempFile;

fn wait_for_written(counters: &PipelineCounters, expected: usize) {
    for _ in 0..2_000 {
        if counters.chunks_written() >= expected {
            return;
        }
        thread::sleep(Duration::from_millis(1));
    }
    panic!("consumer wrote {} of {expected} chunks", counters.chunks_written());
}

#[test]
fn appends_to_existing_file_in_index_order() -> Result<(), Box<dyn std::error::Error>> {
    let mut file = NamedTempFile::new()?;
    file.write_all(b"head:")?;
    file.flush()?;

    let stage = Arc::new(StagingMap::new());
    let counters = Arc::new(PipelineCounters::new());
    let cancel = CancellationToken::new();
    let consumer = ChunkConsumer::open(
        file.path(),
        Arc::clone(&stage),
        Arc::clone(&counters),
        cancel.clone(),
    )?
    .with_poll_interval(Duration::from_millis(1));
    let handle = thread::spawn(move || consumer.run());

    // Later indices first: nothing may be written until index 0 shows up.
    stage.insert(2, Bytes::from_static(b"three"))?;
    stage.insert(1, Bytes::from_static(b"two,"))?;
    thread::sleep(Duration::from_millis(20));
    assert_eq!(counters.chunks_written(), 0);

    stage.insert(0, Bytes::from_static(b"one,"))?;
    wait_for_written(&counters, 3);
    cancel.cancel();
    handle.join().expect("consumer panicked")?;

    assert_eq!(fs::read(file.path())?, b"head:one,two,three");
    assert_eq!(counters.bytes_written(), 13);
    Ok(())
}

#[test]
fn missing_destination_is_not_created() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("absent.gz");

    let result = ChunkConsumer::open(
        &path,
        Arc::new(StagingMap::new()),
        Arc::new(PipelineCounters::new()),
        CancellationToken::new(),
    );

    assert!(result.is_err());
    assert!(!path.exists());
}

struct FailingWriter {
    accepted: usize,
    limit: usize,
}

impl Write for FailingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.accepted + buf.len() > self.limit {
            return Err(io::Error::new(io::ErrorKind::StorageFull, "no space left"));
        }
        self.accepted += buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn write_failure_ends_the_consumer_with_an_error() -> Result<(), Box<dyn std::error::Error>> {
    let stage = Arc::new(StagingMap::new());
    let counters = Arc::new(PipelineCounters::new());
    for index in 0..4 {
        stage.insert(index, Bytes::from(vec![index as u8; 10]))?;
    }

    let consumer = ChunkConsumer::new(
        FailingWriter {
            accepted: 0,
            limit: 25,
        },
        Arc::clone(&stage),
        Arc::clone(&counters),
        CancellationToken::new(),
    );
    let error = match consumer.run() {
        Ok(_) => panic!("consumer must fail once the writer is full"),
        Err(error) => error,
    };

    match error {
        PgzError::Context { context, source } => {
            assert_eq!(context, "writing chunk 2");
            assert!(matches!(*source, PgzError::Io(ref err) if err.kind() == io::ErrorKind::StorageFull));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(counters.chunks_written(), 2);
    Ok(())
}
