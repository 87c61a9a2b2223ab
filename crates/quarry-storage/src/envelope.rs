//! Storage envelope around an encoded entry
//!
//! `format byte | BER uncompressed size | payload`. A size of zero means the
//! payload is the encoded entry as is; otherwise it is zlib-deflated.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use tracing::debug;

use crate::ber::{append_ber_length, ByteReader};
use crate::error::{StorageError, StorageResult};

/// Envelope format byte
pub const ENVELOPE_VERSION: u8 = 0x01;

const MAX_INITIAL_RESERVE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntryEnvelope {
    compress: bool,
}

impl EntryEnvelope {
    pub fn new(compress: bool) -> Self {
        Self { compress }
    }

    pub fn compresses(&self) -> bool {
        self.compress
    }

    /// Wrap encoded entry bytes, deflating only when that makes them smaller
    pub fn wrap(&self, encoded: &[u8]) -> StorageResult<Vec<u8>> {
        let mut out = Vec::with_capacity(encoded.len() + 6);
        out.push(ENVELOPE_VERSION);

        if self.compress && !encoded.is_empty() {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(encoded)?;
            let deflated = encoder.finish()?;
            if deflated.len() < encoded.len() {
                debug!("Deflated entry from {} to {} bytes", encoded.len(), deflated.len());
                append_ber_length(&mut out, encoded.len())?;
                out.extend_from_slice(&deflated);
                return Ok(out);
            }
        }

        append_ber_length(&mut out, 0)?;
        out.extend_from_slice(encoded);
        Ok(out)
    }

    /// Recover the encoded entry bytes
    pub fn open(bytes: &[u8]) -> StorageResult<Vec<u8>> {
        let mut reader = ByteReader::new(bytes);
        let version = reader.get_u8()?;
        if version != ENVELOPE_VERSION {
            return Err(StorageError::UnsupportedVersion(version));
        }
        let size = reader.get_ber_length()?;
        let start = reader.position();
        let payload = reader.get_bytes(reader.remaining())?;
        if size == 0 {
            return Ok(payload.to_vec());
        }

        // The size comes from the input, so it bounds the output but not the reserve
        let mut inflated = Vec::with_capacity(size.min(MAX_INITIAL_RESERVE));
        ZlibDecoder::new(payload)
            .take(size as u64 + 1)
            .read_to_end(&mut inflated)
            .map_err(|e| StorageError::decode(start, format!("inflate failed: {}", e)))?;
        if inflated.len() > size {
            return Err(StorageError::decode(
                start,
                format!("inflated past the declared {} bytes", size),
            ));
        }
        if inflated.len() != size {
            return Err(StorageError::decode(
                start,
                format!("inflated {} bytes, expected {}", inflated.len(), size),
            ));
        }
        Ok(inflated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_envelope() {
        let wrapped = EntryEnvelope::new(false).wrap(b"abc").unwrap();
        assert_eq!(wrapped, vec![ENVELOPE_VERSION, 0, b'a', b'b', b'c']);
        assert_eq!(EntryEnvelope::open(&wrapped).unwrap(), b"abc");
    }

    #[test]
    fn test_compressed_envelope() {
        let payload = b"objectClass person ".repeat(50);
        let wrapped = EntryEnvelope::new(true).wrap(&payload).unwrap();
        assert!(wrapped.len() < payload.len());
        assert_ne!(wrapped[1], 0);
        assert_eq!(EntryEnvelope::open(&wrapped).unwrap(), payload);
    }

    #[test]
    fn test_incompressible_payload_is_stored_raw() {
        let wrapped = EntryEnvelope::new(true).wrap(b"x").unwrap();
        assert_eq!(wrapped[1], 0);
    }

    #[test]
    fn test_corrupt_envelope() {
        assert!(matches!(
            EntryEnvelope::open(&[0x09, 0]),
            Err(StorageError::UnsupportedVersion(9))
        ));
        assert!(EntryEnvelope::open(&[ENVELOPE_VERSION, 10, 1, 2, 3]).is_err());
    }

    #[test]
    fn test_inflate_stops_at_declared_size() {
        let payload = vec![0u8; 1 << 20];
        let mut wrapped = EntryEnvelope::new(true).wrap(&payload).unwrap();
        assert!(wrapped.len() < 4096);

        // Same deflated stream, but claiming only ten bytes
        let start = 2 + (wrapped[1] & 0x7F) as usize;
        wrapped.splice(1..start, [10u8]);
        let err = EntryEnvelope::open(&wrapped).unwrap_err();
        assert!(err.to_string().contains("past the declared 10 bytes"), "{}", err);
    }
}
