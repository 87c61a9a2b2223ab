//! BER length fields and a cursor over encoded bytes
//!
//! Lengths 0-127 take one byte. Larger lengths take a leading byte
//! `0x80 | n` followed by `n` (1 to 4) big-endian length bytes.

use quarry_core::limits::validate_ber_length;

use crate::error::{StorageError, StorageResult};

/// Append `len` as a BER length
pub fn append_ber_length(buf: &mut Vec<u8>, len: usize) -> StorageResult<()> {
    validate_ber_length(len).map_err(|e| StorageError::Encode(e.to_string()))?;
    if len <= 0x7F {
        buf.push(len as u8);
        return Ok(());
    }
    let bytes = (len as u32).to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    buf.push(0x80 | (4 - skip) as u8);
    buf.extend_from_slice(&bytes[skip..]);
    Ok(())
}

/// Append a BER length followed by the bytes themselves
pub fn append_length_prefixed(buf: &mut Vec<u8>, bytes: &[u8]) -> StorageResult<()> {
    append_ber_length(buf, bytes.len())?;
    buf.extend_from_slice(bytes);
    Ok(())
}

/// Read cursor over an encoded entry
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn get_u8(&mut self) -> StorageResult<u8> {
        let byte = *self
            .bytes
            .get(self.pos)
            .ok_or_else(|| StorageError::decode(self.pos, "unexpected end of data"))?;
        self.pos += 1;
        Ok(byte)
    }

    pub fn get_ber_length(&mut self) -> StorageResult<usize> {
        let start = self.pos;
        let first = self.get_u8()?;
        if first & 0x80 == 0 {
            return Ok(first as usize);
        }
        let count = (first & 0x7F) as usize;
        if count == 0 || count > 4 {
            return Err(StorageError::decode(
                start,
                format!("invalid BER length prefix 0x{:02x}", first),
            ));
        }
        let mut len = 0usize;
        for _ in 0..count {
            len = (len << 8) | self.get_u8()? as usize;
        }
        Ok(len)
    }

    pub fn get_bytes(&mut self, len: usize) -> StorageResult<&'a [u8]> {
        if len > self.remaining() {
            return Err(StorageError::decode(
                self.pos,
                format!("length {} exceeds the {} bytes remaining", len, self.remaining()),
            ));
        }
        let bytes = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    /// BER length then that many bytes
    pub fn get_length_prefixed(&mut self) -> StorageResult<&'a [u8]> {
        let len = self.get_ber_length()?;
        self.get_bytes(len)
    }

    /// Bytes up to a zero terminator, which is consumed
    pub fn get_zero_terminated(&mut self) -> StorageResult<&'a [u8]> {
        let rest = &self.bytes[self.pos..];
        let end = rest
            .iter()
            .position(|b| *b == 0)
            .ok_or_else(|| StorageError::decode(self.pos, "missing zero terminator"))?;
        self.pos += end + 1;
        Ok(&rest[..end])
    }

    pub fn get_string(&mut self, len: usize) -> StorageResult<String> {
        let start = self.pos;
        let bytes = self.get_bytes(len)?;
        utf8(start, bytes)
    }

    pub fn get_zero_terminated_string(&mut self) -> StorageResult<String> {
        let start = self.pos;
        let bytes = self.get_zero_terminated()?;
        utf8(start, bytes)
    }
}

fn utf8(offset: usize, bytes: &[u8]) -> StorageResult<String> {
    String::from_utf8(bytes.to_vec()).map_err(|_| StorageError::decode(offset, "invalid UTF-8"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(len: usize) -> Vec<u8> {
        let mut buf = Vec::new();
        append_ber_length(&mut buf, len).unwrap();
        buf
    }

    #[test]
    fn test_ber_length_widths() {
        assert_eq!(encoded(0), vec![0x00]);
        assert_eq!(encoded(0x7F), vec![0x7F]);
        assert_eq!(encoded(0x80), vec![0x81, 0x80]);
        assert_eq!(encoded(0x1234), vec![0x82, 0x12, 0x34]);
        assert_eq!(encoded(0x01_0000), vec![0x83, 0x01, 0x00, 0x00]);
        assert_eq!(encoded(0xFFFF_FFFF), vec![0x84, 0xFF, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn test_reader_lengths() {
        let mut buf = Vec::new();
        for len in [5, 300, 70_000] {
            append_ber_length(&mut buf, len).unwrap();
        }
        let mut reader = ByteReader::new(&buf);
        assert_eq!(reader.get_ber_length().unwrap(), 5);
        assert_eq!(reader.get_ber_length().unwrap(), 300);
        assert_eq!(reader.get_ber_length().unwrap(), 70_000);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_reader_rejects_corruption() {
        assert!(ByteReader::new(&[0x85, 1, 2, 3, 4, 5]).get_ber_length().is_err());
        assert!(ByteReader::new(&[0x80]).get_ber_length().is_err());
        assert!(ByteReader::new(&[0x82, 0x01]).get_ber_length().is_err());

        let err = ByteReader::new(&[0x05, b'a']).get_length_prefixed().unwrap_err();
        assert!(matches!(err, StorageError::Decode { offset: 1, .. }));
    }

    #[test]
    fn test_zero_terminated() {
        let mut reader = ByteReader::new(b"top\0person\0x");
        assert_eq!(reader.get_zero_terminated_string().unwrap(), "top");
        assert_eq!(reader.get_zero_terminated_string().unwrap(), "person");
        assert!(reader.get_zero_terminated().is_err());
    }
}
