pub mod cancel;
pub mod counters;
pub mod staging;
pub mod worker_pool;

pub use cancel::CancellationToken;
pub use counters::PipelineCounters;
pub use staging::StagingMap;
pub use worker_pool::{PoolRuntimeSnapshot, WorkerPool, WorkerPoolHandle, WorkerRuntimeSnapshot};
