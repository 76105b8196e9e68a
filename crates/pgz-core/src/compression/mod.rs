use std::time::Instant;

use crate::telemetry::{self, profile, tags};
use crate::types::PipelineMode;
use crate::Result;

pub mod gzip;
pub mod passthrough;

pub use gzip::{GZIP_HEADER_LEN, GZIP_MAGIC, GzipCodec};
pub use passthrough::PassthroughCodec;

/// Single-block codec used by pipeline workers.
///
/// Every call handles one complete, independent stream: `compress` must emit
/// a stream that `decompress` accepts on its own, so that compressed chunks
/// can be concatenated and later split apart again.
pub trait BlockCodec: Send + Sync {
    /// Short name used in logs and telemetry labels.
    fn name(&self) -> &'static str;

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Decodes exactly one stream.
    ///
    /// # Errors
    /// Returns [`PgzError::Decompression`](crate::PgzError::Decompression)
    /// when `data` is not a single valid stream.
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// Runs the codec operation selected by `mode` and records codec telemetry.
pub fn apply_codec(codec: &dyn BlockCodec, mode: PipelineMode, data: &[u8]) -> Result<Vec<u8>> {
    let started_at = Instant::now();
    let result = match mode {
        PipelineMode::Compress => codec.compress(data),
        PipelineMode::Decompress => codec.decompress(data),
    };
    let elapsed_us = profile::elapsed_us(started_at);
    let labels = [("codec", codec.name()), ("mode", mode.as_str())];

    match &result {
        Ok(output) => {
            let counter = match mode {
                PipelineMode::Compress => tags::METRIC_CODEC_COMPRESS_COUNT,
                PipelineMode::Decompress => tags::METRIC_CODEC_DECOMPRESS_COUNT,
            };
            telemetry::increment_counter(counter, 1, &labels);
            telemetry::record_histogram(tags::METRIC_CODEC_LATENCY_US, elapsed_us, &labels);
            telemetry::record_histogram(tags::METRIC_CODEC_INPUT_BYTES, data.len() as u64, &labels);
            telemetry::record_histogram(
                tags::METRIC_CODEC_OUTPUT_BYTES,
                output.len() as u64,
                &labels,
            );
            profile::event(
                tags::PROFILE_CODEC,
                &[tags::TAG_CODEC, codec.name()],
                mode.as_str(),
                "ok",
                elapsed_us,
                "codec applied",
            );
        }
        Err(_) => {
            telemetry::increment_counter(tags::METRIC_CODEC_FAIL_COUNT, 1, &labels);
            profile::event(
                tags::PROFILE_CODEC,
                &[tags::TAG_CODEC, codec.name()],
                mode.as_str(),
                "error",
                elapsed_us,
                "codec failed",
            );
        }
    }

    result
}
