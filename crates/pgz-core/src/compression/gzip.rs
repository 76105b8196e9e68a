use std::io::{Read, Write};

use flate2::Compression;
use flate2::bufread::GzDecoder;
use flate2::write::GzEncoder;

use crate::{PgzError, Result};

use super::BlockCodec;

/// ID1, ID2 and CM (deflate) bytes that open every gzip member.
pub const GZIP_MAGIC: [u8; 3] = [0x1F, 0x8B, 0x08];
/// Length of the fixed part of a gzip member header.
pub const GZIP_HEADER_LEN: usize = 10;

const FLG_RESERVED_MASK: u8 = 0b1110_0000;
const OS_UNKNOWN: u8 = 0xFF;
const OS_MAX_KNOWN: u8 = 13;

/// Gzip codec backed by `flate2`.
///
/// Each compressed chunk is a complete gzip member, so the concatenated
/// output is a valid multi-member gzip file readable by any gzip tool.
#[derive(Debug, Clone, Copy)]
pub struct GzipCodec {
    level: Compression,
}

impl Default for GzipCodec {
    fn default() -> Self {
        Self {
            level: Compression::default(),
        }
    }
}

impl GzipCodec {
    /// Creates a codec with compression level `level` (clamped to 0..=9).
    pub fn new(level: u32) -> Self {
        Self {
            level: Compression::new(level.min(9)),
        }
    }

    pub fn level(&self) -> u32 {
        self.level.level()
    }
}

impl BlockCodec for GzipCodec {
    fn name(&self) -> &'static str {
        "gzip"
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2 + 64), self.level);
        encoder
            .write_all(data)
            .map_err(|error| PgzError::Compression(format!("gzip encode failed: {error}")))?;
        encoder
            .finish()
            .map_err(|error| PgzError::Compression(format!("gzip encode failed: {error}")))
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut decoder = GzDecoder::new(data);
        let mut output = Vec::with_capacity(data.len().saturating_mul(3));
        decoder
            .read_to_end(&mut output)
            .map_err(|error| PgzError::Decompression(format!("malformed gzip member: {error}")))?;

        // A second member inside one chunk means a header was missed; reject it
        // instead of silently dropping its payload.
        let trailing = decoder.into_inner();
        if !trailing.is_empty() {
            return Err(PgzError::Decompression(format!(
                "{} trailing bytes after gzip member",
                trailing.len()
            )));
        }

        Ok(output)
    }
}

/// Returns true if `window` starts with a plausible gzip member header.
///
/// Beyond the magic bytes this checks the fixed-header fields RFC 1952
/// constrains: reserved flag bits clear, a defined XFL value and a known OS
/// byte. Requires at least [`GZIP_HEADER_LEN`] bytes.
pub fn is_plausible_header(window: &[u8]) -> bool {
    if window.len() < GZIP_HEADER_LEN || window[..3] != GZIP_MAGIC {
        return false;
    }

    let flags = window[3];
    let extra_flags = window[8];
    let os = window[9];

    flags & FLG_RESERVED_MASK == 0
        && matches!(extra_flags, 0 | 2 | 4)
        && (os <= OS_MAX_KNOWN || os == OS_UNKNOWN)
}
