use std::any::Any;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PgzError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("compression error: {0}")]
    Compression(String),
    #[error("decompression error: {0}")]
    Decompression(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    #[error("chunk index {index} was already staged (next expected {next_expected})")]
    DuplicateIndex { index: usize, next_expected: usize },
    #[error("worker thread panicked: {0}")]
    WorkerPanicked(String),
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<PgzError>,
    },
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl PgzError {
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Returns true when the error originates from a malformed codec stream.
    pub fn is_malformed_stream(&self) -> bool {
        match self {
            Self::Decompression(_) => true,
            Self::Context { source, .. } => source.is_malformed_stream(),
            _ => false,
        }
    }
}

/// Extracts the message carried by a thread panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
