/// Profiling target for codec calls.
pub const PROFILE_CODEC: &str = "pgz.profile.codec";
/// Profiling target for the chunk producer.
pub const PROFILE_PRODUCER: &str = "pgz.profile.producer";
/// Profiling target for worker runtime.
pub const PROFILE_WORKER: &str = "pgz.profile.worker";
/// Profiling target for the chunk consumer.
pub const PROFILE_CONSUMER: &str = "pgz.profile.consumer";
/// Profiling target for the pipeline driver.
pub const PROFILE_PIPELINE: &str = "pgz.profile.pipeline";

/// Global system-level tag shared by all profiling events.
pub const TAG_SYSTEM: &str = "system";
pub const TAG_CODEC: &str = "codec";
pub const TAG_PRODUCER: &str = "producer";
pub const TAG_WORKER: &str = "worker";
pub const TAG_CONSUMER: &str = "consumer";
pub const TAG_PIPELINE: &str = "pipeline";

pub const METRIC_CODEC_COMPRESS_COUNT: &str = "pgz.codec.compress.count";
pub const METRIC_CODEC_DECOMPRESS_COUNT: &str = "pgz.codec.decompress.count";
pub const METRIC_CODEC_FAIL_COUNT: &str = "pgz.codec.fail.count";
pub const METRIC_CODEC_LATENCY_US: &str = "pgz.codec.latency_us";
pub const METRIC_CODEC_INPUT_BYTES: &str = "pgz.codec.input_bytes";
pub const METRIC_CODEC_OUTPUT_BYTES: &str = "pgz.codec.output_bytes";

pub const METRIC_PRODUCER_CHUNK_COUNT: &str = "pgz.producer.chunk.count";
pub const METRIC_PRODUCER_CHUNK_BYTES: &str = "pgz.producer.chunk.bytes";
pub const METRIC_PRODUCER_READ_COUNT: &str = "pgz.producer.read.count";
pub const METRIC_PRODUCER_BACKPRESSURE_COUNT: &str = "pgz.producer.backpressure.count";

pub const METRIC_WORKER_TASK_COUNT: &str = "pgz.worker.task.count";
pub const METRIC_WORKER_TASK_FAIL_COUNT: &str = "pgz.worker.task.fail.count";
pub const METRIC_WORKER_TASK_LATENCY_US: &str = "pgz.worker.task.latency_us";
pub const METRIC_WORKER_ACTIVE_COUNT: &str = "pgz.worker.active.count";
pub const METRIC_WORKER_THROTTLE_COUNT: &str = "pgz.worker.throttle.count";

pub const METRIC_CONSUMER_WRITE_COUNT: &str = "pgz.consumer.write.count";
pub const METRIC_CONSUMER_WRITE_BYTES: &str = "pgz.consumer.write.bytes";
pub const METRIC_CONSUMER_WRITE_LATENCY_US: &str = "pgz.consumer.write.latency_us";

pub const METRIC_STAGE_INPUT_DEPTH: &str = "pgz.stage.input.depth";
pub const METRIC_STAGE_OUTPUT_DEPTH: &str = "pgz.stage.output.depth";

pub const METRIC_PIPELINE_RUN_COUNT: &str = "pgz.pipeline.run.count";
pub const METRIC_PIPELINE_FAIL_COUNT: &str = "pgz.pipeline.fail.count";
pub const METRIC_PIPELINE_LATENCY_US: &str = "pgz.pipeline.latency_us";
