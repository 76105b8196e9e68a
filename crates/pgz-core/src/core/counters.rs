use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

/// Progress counters for one pipeline run.
///
/// Each field has a single writer (the producer owns `chunks_produced`,
/// `bytes_read` and `producer_done`; the consumer owns `chunks_written` and
/// `bytes_written`). Readers only need eventual consistency.
#[derive(Debug, Default)]
pub struct PipelineCounters {
    chunks_produced: AtomicUsize,
    chunks_written: AtomicUsize,
    bytes_read: AtomicU64,
    bytes_written: AtomicU64,
    producer_done: AtomicBool,
}

impl PipelineCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of indices assigned by the producer so far.
    pub fn chunks_produced(&self) -> usize {
        self.chunks_produced.load(Ordering::Acquire)
    }

    /// Number of chunks appended to the destination so far.
    pub fn chunks_written(&self) -> usize {
        self.chunks_written.load(Ordering::Acquire)
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read.load(Ordering::Acquire)
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Acquire)
    }

    /// True once the producer has staged its final chunk.
    pub fn producer_done(&self) -> bool {
        self.producer_done.load(Ordering::Acquire)
    }

    /// True when the producer is done and every produced chunk was written.
    pub fn is_drained(&self) -> bool {
        self.producer_done() && self.chunks_written() >= self.chunks_produced()
    }

    pub(crate) fn record_produced(&self) {
        self.chunks_produced.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn record_read(&self, bytes: usize) {
        self.bytes_read.fetch_add(bytes as u64, Ordering::AcqRel);
    }

    pub(crate) fn record_written(&self, bytes: usize) {
        self.bytes_written.fetch_add(bytes as u64, Ordering::AcqRel);
        self.chunks_written.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn mark_producer_done(&self) {
        self.producer_done.store(true, Ordering::Release);
    }
}
