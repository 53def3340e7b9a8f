//! Payload compression.
//!
//! Payloads are zlib-compressed before chunking and inflated after a
//! transfer verifies.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;

/// Compression level configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionLevel {
    /// No compression
    None,
    /// Fast compression (lower ratio)
    Fast,
    /// Default compression (balanced)
    #[default]
    Default,
    /// Best compression (slower, higher ratio)
    Best,
}

impl CompressionLevel {
    /// Converts to flate2 compression level.
    pub fn to_flate2(self) -> flate2::Compression {
        match self {
            CompressionLevel::None => flate2::Compression::none(),
            CompressionLevel::Fast => flate2::Compression::fast(),
            CompressionLevel::Default => flate2::Compression::default(),
            CompressionLevel::Best => flate2::Compression::best(),
        }
    }
}

/// Compresses `data` using zlib.
pub fn compress(data: &[u8], level: CompressionLevel) -> std::io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), level.to_flate2());
    encoder.write_all(data)?;
    encoder.finish()
}

/// Inflates zlib `data`, refusing to produce more than `limit` bytes.
pub fn decompress(data: &[u8], limit: u64) -> std::io::Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data).take(limit.saturating_add(1));
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    if out.len() as u64 > limit {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("inflated payload exceeds {limit} bytes"),
        ));
    }
    Ok(out)
}
