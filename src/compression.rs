use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;

use crate::{Error, Result};

/// Byte-blob compression used for stored posting-list bins.
pub trait Compressor {
    fn compress(&self, bytes: &[u8]) -> Result<Vec<u8>>;

    /// Inflates `bytes` back to `expected_len` bytes.
    fn decompress(&self, bytes: &[u8], expected_len: usize) -> Result<Vec<u8>>;

    /// Whether this compressor stores blobs verbatim.
    fn is_identity(&self) -> bool {
        false
    }
}

/// The default compressor: blobs are stored as they are.
#[derive(Debug, Default, Clone, Copy)]
pub struct Identity;

impl Compressor for Identity {
    fn compress(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        Ok(bytes.to_vec())
    }

    fn decompress(&self, bytes: &[u8], expected_len: usize) -> Result<Vec<u8>> {
        if bytes.len() != expected_len {
            return Err(Error::Compression(format!(
                "expected {expected_len} raw bytes, got {}",
                bytes.len()
            )));
        }
        Ok(bytes.to_vec())
    }

    fn is_identity(&self) -> bool {
        true
    }
}

/// Deflate (zlib format) compression; shrinks typical posting-list
/// databases to about a third.
#[derive(Debug, Default, Clone, Copy)]
pub struct Deflate;

impl Compressor for Deflate {
    fn compress(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(bytes).map_err(|e| Error::Compression(e.to_string()))?;
        encoder.finish().map_err(|e| Error::Compression(e.to_string()))
    }

    fn decompress(&self, bytes: &[u8], expected_len: usize) -> Result<Vec<u8>> {
        let mut output = Vec::with_capacity(expected_len);
        ZlibDecoder::new(bytes)
            .read_to_end(&mut output)
            .map_err(|e| Error::Compression(e.to_string()))?;

        if output.len() != expected_len {
            return Err(Error::Compression(format!(
                "expected {expected_len} bytes after inflation, got {}",
                output.len()
            )));
        }
        Ok(output)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn deflate_round_trip() {
        let bytes: Vec<u8> = (0..1024u32).flat_map(|i| (i % 16).to_le_bytes()).collect();
        let compressed = Deflate.compress(&bytes).unwrap();
        assert!(compressed.len() < bytes.len());
        assert_eq!(Deflate.decompress(&compressed, bytes.len()).unwrap(), bytes);
    }

    #[test]
    fn identity_checks_length() {
        let bytes = vec![1u8, 2, 3, 4];
        assert_eq!(Identity.compress(&bytes).unwrap(), bytes);
        assert_eq!(Identity.decompress(&bytes, 4).unwrap(), bytes);
        assert!(Identity.decompress(&bytes, 8).is_err());
    }
}
