// Copyright (c) the medjpeg Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use std::fmt::Debug;
use std::io::Read;

use crate::byte_stream::ByteReader;
use crate::error::{Error, Result};

pub const MAX_BITS_PER_CALL: u32 = 32;

/// Reads bits MSB-first from a byte source.
///
/// At most one byte of residual bits is kept. With marker stuffing enabled a
/// `0xff 0x00` pair in the source yields a single literal `0xff`, while
/// `0xff` followed by any other byte is a marker: it is left unconsumed in
/// the source and the read fails with [`Error::MarkerInData`].
pub struct BitReader<'a, R> {
    source: &'a mut ByteReader<R>,
    bit_buf: u32,
    bits_in_buf: u32,
    marker_stuffing: bool,
}

impl<R> Debug for BitReader<'_, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "BitReader{{ source: {:?}, bit_buf: {:0width$b}, marker_stuffing: {} }}",
            self.source,
            self.bit_buf,
            self.marker_stuffing,
            width = self.bits_in_buf as usize
        )
    }
}

impl<'a, R: Read> BitReader<'a, R> {
    /// Constructs a BitReader over `source`, with JPEG byte unstuffing enabled.
    pub fn new(source: &'a mut ByteReader<R>) -> BitReader<'a, R> {
        BitReader {
            source,
            bit_buf: 0,
            bits_in_buf: 0,
            marker_stuffing: true,
        }
    }

    pub fn set_marker_stuffing(&mut self, enabled: bool) {
        self.marker_stuffing = enabled;
    }

    /// Reads `num` bits and returns them right-aligned.
    /// ```
    /// # use medjpeg::{bit_reader::BitReader, byte_stream::ByteReader};
    /// let mut source = ByteReader::new(&[0xa5, 0xff, 0x00][..]);
    /// let mut br = BitReader::new(&mut source);
    /// assert_eq!(br.read_bits(4)?, 0b1010);
    /// assert_eq!(br.read_bits(12)?, 0b0101_1111_1111);
    /// assert!(br.read_bits(1).is_err());
    /// # Ok::<(), medjpeg::error::Error>(())
    /// ```
    pub fn read_bits(&mut self, num: u32) -> Result<u32> {
        if num > MAX_BITS_PER_CALL {
            return Err(Error::TooManyBits(num));
        }
        let mut value = 0u64;
        let mut remaining = num;
        while remaining > 0 {
            if self.bits_in_buf == 0 {
                self.bit_buf = self.next_byte()? as u32;
                self.bits_in_buf = 8;
            }
            let take = remaining.min(self.bits_in_buf);
            self.bits_in_buf -= take;
            let bits = (self.bit_buf >> self.bits_in_buf) & ((1u32 << take) - 1);
            self.bit_buf &= (1u32 << self.bits_in_buf) - 1;
            value = (value << take) | bits as u64;
            remaining -= take;
        }
        Ok(value as u32)
    }

    /// Reads a single bit.
    #[inline]
    pub fn read_bit(&mut self) -> Result<u32> {
        if self.bits_in_buf == 0 {
            self.bit_buf = self.next_byte()? as u32;
            self.bits_in_buf = 8;
        }
        self.bits_in_buf -= 1;
        Ok((self.bit_buf >> self.bits_in_buf) & 1)
    }

    /// Shifts `code` left by one and appends the next bit.
    #[inline]
    pub fn add_bit(&mut self, code: &mut u32) -> Result<()> {
        *code = (*code << 1) | self.read_bit()?;
        Ok(())
    }

    /// Drops the residual bits of the current byte.
    pub fn reset(&mut self) {
        self.bit_buf = 0;
        self.bits_in_buf = 0;
    }

    /// Number of residual bits still buffered.
    pub fn pending_bits(&self) -> u32 {
        self.bits_in_buf
    }

    /// Underlying byte source. Residual bits are not returned to it.
    pub fn source(&mut self) -> &mut ByteReader<R> {
        &mut *self.source
    }

    fn next_byte(&mut self) -> Result<u8> {
        let byte = self.source.peek_u8()?.ok_or(Error::EndOfData)?;
        if byte != 0xff || !self.marker_stuffing {
            self.source.read_u8()?;
            return Ok(byte);
        }
        match self.source.peek_at(1)? {
            Some(0) => {
                self.source.skip(2)?;
                Ok(0xff)
            }
            Some(marker) => Err(Error::MarkerInData(marker)),
            None => Err(Error::EndOfData),
        }
    }
}
