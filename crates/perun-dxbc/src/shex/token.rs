//! Checked bitfield access on 32-bit program tokens.

use crate::{Error, Result};

/// A raw 32-bit token from the SHEX stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token(pub u32);

impl Token {
    /// Extract `width` bits starting at `shift`.
    ///
    /// Asking for bits beyond the 32-bit token is a decoder bug and is reported
    /// as [`Error::BitRange`].
    #[inline]
    pub fn bits(self, shift: u32, width: u32) -> Result<u32> {
        if width == 0 || shift + width > 32 {
            return Err(Error::BitRange { shift, width });
        }
        if width == 32 {
            return Ok(self.0);
        }
        Ok((self.0 >> shift) & ((1u32 << width) - 1))
    }

    /// Test a single bit.
    #[inline]
    pub fn bit(self, index: u32) -> Result<bool> {
        self.bits(index, 1).map(|b| b != 0)
    }

    /// The high "extended" bit shared by opcode and operand tokens.
    #[inline]
    pub fn is_extended(self) -> bool {
        self.0 & 0x8000_0000 != 0
    }
}

/// Cursor over the dwords of one instruction.
///
/// Reads never cross the end of the slice, so a malformed operand cannot
/// consume tokens belonging to the next instruction.
#[derive(Debug, Clone)]
pub(crate) struct TokenReader<'a> {
    tokens: &'a [u32],
    pos: usize,
    base: usize,
}

impl<'a> TokenReader<'a> {
    /// `base` is the dword index of `tokens[0]` within the program, for errors.
    pub(crate) fn new(tokens: &'a [u32], base: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            base,
        }
    }

    pub(crate) fn read(&mut self) -> Result<Token> {
        let token = self
            .tokens
            .get(self.pos)
            .copied()
            .ok_or(Error::OperandOverrun {
                at: self.base + self.pos,
            })?;
        self.pos += 1;
        Ok(Token(token))
    }

    /// Read a 64-bit value stored as two dwords, low dword first.
    pub(crate) fn read_u64(&mut self) -> Result<u64> {
        let lo = self.read()?.0 as u64;
        let hi = self.read()?.0 as u64;
        Ok(lo | (hi << 32))
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pos >= self.tokens.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_stops_at_slice_end() {
        let tokens = [1u32, 2, 3];
        let mut reader = TokenReader::new(&tokens[..2], 10);

        assert_eq!(reader.read().unwrap(), Token(1));
        assert_eq!(reader.read().unwrap(), Token(2));
        assert!(reader.is_empty());
        assert!(matches!(reader.read(), Err(Error::OperandOverrun { at: 12 })));
    }

    #[test]
    fn test_read_u64_low_first() {
        let tokens = [0x89ab_cdefu32, 0x0123_4567];
        let mut reader = TokenReader::new(&tokens, 0);
        assert_eq!(reader.read_u64().unwrap(), 0x0123_4567_89ab_cdef);
    }

    #[test]
    fn test_bits() {
        let token = Token(0xA5F0_1234);
        assert_eq!(token.bits(0, 4).unwrap(), 0x4);
        assert_eq!(token.bits(24, 8).unwrap(), 0xA5);
        assert_eq!(token.bits(0, 32).unwrap(), 0xA5F0_1234);
        assert!(token.bit(31).unwrap());
        assert!(token.is_extended());
    }

    #[test]
    fn test_oversized_request_is_an_error() {
        assert!(matches!(
            Token(0).bits(30, 4),
            Err(Error::BitRange { shift: 30, width: 4 })
        ));
        assert!(Token(0).bits(0, 0).is_err());
    }
}
