use bytes::{Bytes, BytesMut};
use memchr::memchr_iter;

use crate::compression::{GZIP_HEADER_LEN, GZIP_MAGIC, gzip};

/// Rule deciding whether a position starts a new codec stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamSignature {
    /// Only the three gzip magic bytes `1F 8B 08` are compared.
    Magic,
    /// Magic bytes plus the RFC 1952 fixed-header sanity checks.
    #[default]
    GzipHeader,
}

impl StreamSignature {
    /// Number of bytes that must be available at a candidate position.
    pub const WINDOW: usize = GZIP_HEADER_LEN;

    /// Tests the header window starting at `window[0]`.
    pub fn matches(self, window: &[u8]) -> bool {
        match self {
            Self::Magic => window.len() >= Self::WINDOW && window[..3] == GZIP_MAGIC,
            Self::GzipHeader => gzip::is_plausible_header(window),
        }
    }
}

/// Splits complete streams off the front of `buffer`.
///
/// Every header start after the first one in the buffer closes the stream
/// before it. Closed streams are returned in order; the still-open tail stays
/// in `buffer` as leftover. Positions closer than [`StreamSignature::WINDOW`]
/// bytes to the end are not inspected, so a buffer shorter than that yields
/// nothing.
///
/// Detection is probabilistic: payload bytes that happen to look like a
/// header will split a stream in two, which the codec then rejects.
pub fn split_streams(buffer: &mut BytesMut, signature: StreamSignature) -> Vec<Bytes> {
    split_streams_from(buffer, 0, signature).0
}

/// Like [`split_streams`], but skips candidates before `resume_at`.
///
/// Returns the closed streams and the offset, relative to the leftover left
/// in `buffer`, at which the next scan may resume.
pub fn split_streams_from(
    buffer: &mut BytesMut,
    resume_at: usize,
    signature: StreamSignature,
) -> (Vec<Bytes>, usize) {
    let len = buffer.len();
    if len < StreamSignature::WINDOW {
        return (Vec::new(), resume_at.min(len));
    }

    let scan_end = len - StreamSignature::WINDOW + 1;
    let mut starts = Vec::new();
    let mut slice_start = 0usize;
    let from = resume_at.min(scan_end);
    for offset in memchr_iter(GZIP_MAGIC[0], &buffer[from..scan_end]) {
        let position = from + offset;
        if position != slice_start && signature.matches(&buffer[position..]) {
            starts.push(position);
            slice_start = position;
        }
    }

    let mut chunks = Vec::with_capacity(starts.len());
    let mut consumed = 0usize;
    for start in starts {
        chunks.push(buffer.split_to(start - consumed).freeze());
        consumed = start;
    }

    (chunks, scan_end - consumed)
}
