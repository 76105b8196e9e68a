pub mod chunking;
pub mod consumer;
pub mod producer;
pub mod scanner;

pub use chunking::{ChunkingStrategy, FixedChunking, StreamBoundaryChunking};
pub use consumer::ChunkConsumer;
pub use producer::ChunkProducer;
pub use scanner::{StreamSignature, split_streams, split_streams_from};
