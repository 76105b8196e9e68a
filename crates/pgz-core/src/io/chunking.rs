use bytes::{Bytes, BytesMut};

use super::scanner::{StreamSignature, split_streams_from};

/// How the producer turns accumulated bytes into chunks.
///
/// `split` is called after every read with everything not yet emitted and
/// must drain the complete chunks it finds, leaving the unresolved tail in
/// `pending`. `finish` is called once at end of input and must drain the rest.
pub trait ChunkingStrategy: Send {
    fn split(&mut self, pending: &mut BytesMut) -> Vec<Bytes>;
    fn finish(&mut self, pending: &mut BytesMut) -> Vec<Bytes>;
}

/// Fixed-size chunks for compression: every chunk holds `chunk_size` bytes
/// except the last one.
#[derive(Debug, Clone, Copy)]
pub struct FixedChunking {
    chunk_size: usize,
}

impl FixedChunking {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

impl ChunkingStrategy for FixedChunking {
    fn split(&mut self, pending: &mut BytesMut) -> Vec<Bytes> {
        let mut chunks = Vec::with_capacity(pending.len() / self.chunk_size);
        while pending.len() >= self.chunk_size {
            chunks.push(pending.split_to(self.chunk_size).freeze());
        }
        chunks
    }

    fn finish(&mut self, pending: &mut BytesMut) -> Vec<Bytes> {
        let mut chunks = self.split(pending);
        if !pending.is_empty() {
            chunks.push(pending.split().freeze());
        }
        chunks
    }
}

/// Stream-bounded chunks for decompression: each chunk runs from one
/// detected stream header up to the next.
#[derive(Debug, Clone, Default)]
pub struct StreamBoundaryChunking {
    signature: StreamSignature,
    resume_at: usize,
}

impl StreamBoundaryChunking {
    pub fn new(signature: StreamSignature) -> Self {
        Self {
            signature,
            resume_at: 0,
        }
    }

    pub fn signature(&self) -> StreamSignature {
        self.signature
    }
}

impl ChunkingStrategy for StreamBoundaryChunking {
    fn split(&mut self, pending: &mut BytesMut) -> Vec<Bytes> {
        let (chunks, resume_at) = split_streams_from(pending, self.resume_at, self.signature);
        self.resume_at = resume_at;
        chunks
    }

    fn finish(&mut self, pending: &mut BytesMut) -> Vec<Bytes> {
        let mut chunks = self.split(pending);
        // The open tail is the last stream; it is emitted exactly once.
        if !pending.is_empty() {
            chunks.push(pending.split().freeze());
        }
        self.resume_at = 0;
        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_chunks_hold_remainder_until_finish() {
        let mut strategy = FixedChunking::new(4);
        let mut pending = BytesMut::from(&b"abcdefghij"[..]);

        let chunks = strategy.split(&mut pending);
        assert_eq!(chunks, vec![Bytes::from("abcd"), Bytes::from("efgh")]);
        assert_eq!(&pending[..], b"ij");

        let rest = strategy.finish(&mut pending);
        assert_eq!(rest, vec![Bytes::from("ij")]);
        assert!(pending.is_empty());
        assert!(strategy.finish(&mut pending).is_empty());
    }

    #[test]
    fn boundary_finish_emits_tail_once() {
        let header = [0x1F, 0x8B, 0x08, 0, 0, 0, 0, 0, 0, 0xFF];
        let mut data = header.to_vec();
        data.extend_from_slice(b"first-payload");
        let first_len = data.len();
        data.extend_from_slice(&header);
        data.extend_from_slice(b"second");

        let mut strategy = StreamBoundaryChunking::default();
        let mut pending = BytesMut::from(&data[..]);
        let chunks = strategy.finish(&mut pending);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), first_len);
        assert_eq!(chunks[1].len(), data.len() - first_len);
        assert!(pending.is_empty());
    }
}
