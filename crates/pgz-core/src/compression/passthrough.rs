use crate::Result;

use super::BlockCodec;

/// Identity codec: output bytes equal input bytes in both directions.
///
/// Useful for exercising chunking and ordering without paying for a real codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughCodec;

impl BlockCodec for PassthroughCodec {
    fn name(&self) -> &'static str {
        "passthrough"
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }
}
