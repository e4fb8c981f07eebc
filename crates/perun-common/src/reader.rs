//! Binary reader for zero-copy parsing of byte slices.
//!
//! This module provides [`BinaryReader`], a cursor over a fully buffered byte
//! slice. Shader containers are small and always held in memory, so every read
//! is a bounds-checked slice access rather than blocking I/O.

use zerocopy::FromBytes;

use crate::{Error, FourCC, Result};

/// A binary reader that provides zero-copy reading from a byte slice.
///
/// Offsets inside DXBC chunks are absolute from the start of the chunk, so the
/// reader also offers offset-based helpers ([`read_cstring_at`](Self::read_cstring_at))
/// that do not disturb the cursor.
///
/// # Example
///
/// ```
/// use perun_common::BinaryReader;
///
/// let data = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];
/// let mut reader = BinaryReader::new(&data);
///
/// assert_eq!(reader.read_u32().unwrap(), 0x04030201);
/// assert_eq!(reader.read_u32().unwrap(), 0x08070605);
/// assert!(reader.is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct BinaryReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> BinaryReader<'a> {
    /// Create a new reader from a byte slice.
    #[inline]
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Get the current position in the buffer.
    #[inline]
    pub const fn position(&self) -> usize {
        self.position
    }

    /// Get the total length of the underlying buffer.
    #[inline]
    pub const fn len(&self) -> usize {
        self.data.len()
    }

    /// Get the number of bytes remaining to read.
    #[inline]
    pub const fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    /// Check if there are no more bytes to read.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.position >= self.data.len()
    }

    /// Seek to an absolute position.
    ///
    /// Seeking to exactly the end of the buffer is allowed; anything past it is
    /// an error.
    pub fn seek(&mut self, position: usize) -> Result<()> {
        if position > self.data.len() {
            return Err(Error::OffsetOutOfBounds {
                offset: position,
                len: self.data.len(),
            });
        }
        self.position = position;
        Ok(())
    }

    /// Get the remaining bytes as a slice.
    #[inline]
    pub fn remaining_bytes(&self) -> &'a [u8] {
        &self.data[self.position.min(self.data.len())..]
    }

    /// Peek at bytes without advancing the position.
    #[inline]
    pub fn peek_bytes(&self, count: usize) -> Result<&'a [u8]> {
        if self.remaining() < count {
            return Err(Error::UnexpectedEof {
                needed: count,
                available: self.remaining(),
            });
        }
        Ok(&self.data[self.position..self.position + count])
    }

    /// Read bytes and advance the position.
    #[inline]
    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        let bytes = self.peek_bytes(count)?;
        self.position += count;
        Ok(bytes)
    }

    /// Read a single byte.
    #[inline]
    pub fn read_u8(&mut self) -> Result<u8> {
        self.read_bytes(1).map(|b| b[0])
    }

    /// Read a little-endian u16.
    #[inline]
    pub fn read_u16(&mut self) -> Result<u16> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    /// Read a little-endian u32.
    #[inline]
    pub fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read a little-endian f32.
    #[inline]
    pub fn read_f32(&mut self) -> Result<f32> {
        self.read_u32().map(f32::from_bits)
    }

    /// Read a four-character chunk tag.
    #[inline]
    pub fn read_fourcc(&mut self) -> Result<FourCC> {
        let bytes = self.read_bytes(4)?;
        Ok(FourCC([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read `count` little-endian u32 values.
    pub fn read_u32_array(&mut self, count: usize) -> Result<Vec<u32>> {
        let byte_len = count.checked_mul(4).ok_or(Error::UnexpectedEof {
            needed: usize::MAX,
            available: self.remaining(),
        })?;
        let bytes = self.read_bytes(byte_len)?;
        Ok(bytes
            .chunks_exact(4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect())
    }

    /// Read a null-terminated string at the cursor.
    pub fn read_cstring(&mut self) -> Result<&'a str> {
        let start = self.position;
        let remaining = self.remaining_bytes();

        let null_pos =
            memchr::memchr(0, remaining).ok_or(Error::MissingNullTerminator(start))?;

        self.position = start + null_pos + 1; // Skip the null terminator

        std::str::from_utf8(&remaining[..null_pos]).map_err(Error::Utf8)
    }

    /// Read a null-terminated string at an absolute offset without moving the cursor.
    pub fn read_cstring_at(&self, offset: usize) -> Result<&'a str> {
        let mut reader = self.clone();
        reader.seek(offset)?;
        reader.read_cstring()
    }

    /// Read a struct using zerocopy.
    ///
    /// The struct must implement `FromBytes` from the zerocopy crate.
    #[inline]
    pub fn read_struct<T: FromBytes>(&mut self) -> Result<T> {
        let size = std::mem::size_of::<T>();
        let bytes = self.read_bytes(size)?;
        T::read_from_bytes(bytes).map_err(|_| Error::UnexpectedEof {
            needed: size,
            available: bytes.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_primitives() {
        let data = [
            0x01u8, 0x02, 0x03, 0x04, // u32: 0x04030201
            0x00, 0x00, 0x80, 0x3F, // f32: 1.0
        ];
        let mut reader = BinaryReader::new(&data);

        assert_eq!(reader.read_u32().unwrap(), 0x04030201);
        assert_eq!(reader.read_f32().unwrap(), 1.0);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_read_cstring() {
        let data = b"hello\0world\0";
        let mut reader = BinaryReader::new(data);

        assert_eq!(reader.read_cstring().unwrap(), "hello");
        assert_eq!(reader.read_cstring().unwrap(), "world");
    }

    #[test]
    fn test_read_cstring_at_keeps_position() {
        let data = b"\x01\x00\x00\x00name\0";
        let mut reader = BinaryReader::new(data);

        assert_eq!(reader.read_cstring_at(4).unwrap(), "name");
        assert_eq!(reader.position(), 0);
        assert_eq!(reader.read_u32().unwrap(), 1);
        assert!(matches!(
            reader.read_cstring_at(64),
            Err(Error::OffsetOutOfBounds { offset: 64, .. })
        ));
    }

    #[test]
    fn test_unterminated_cstring() {
        let reader = BinaryReader::new(b"abc");
        assert!(matches!(
            reader.read_cstring_at(0),
            Err(Error::MissingNullTerminator(0))
        ));
    }

    #[test]
    fn test_seek_bounds() {
        let data = [0u8; 4];
        let mut reader = BinaryReader::new(&data);

        assert!(reader.seek(4).is_ok());
        assert!(reader.is_empty());
        assert!(reader.seek(5).is_err());
    }

    #[test]
    fn test_read_u32_array_and_fourcc() {
        let data = b"SHEX\x02\x00\x00\x00\x03\x00\x00\x00";
        let mut reader = BinaryReader::new(data);

        assert_eq!(reader.read_fourcc().unwrap(), FourCC::new(b"SHEX"));
        assert_eq!(reader.read_u32_array(2).unwrap(), vec![2, 3]);
        assert!(reader.read_u32_array(1).is_err());
    }

    #[test]
    fn test_eof_error() {
        let data = [0x01, 0x02];
        let mut reader = BinaryReader::new(&data);

        assert!(reader.read_u32().is_err());
    }
}
