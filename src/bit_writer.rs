// Copyright (c) the medjpeg Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use std::io::Write;

use crate::bit_reader::MAX_BITS_PER_CALL;
use crate::byte_stream::ByteWriter;
use crate::error::{Error, Result};

/// Writes bits MSB-first to a byte sink.
///
/// With marker stuffing enabled every literal `0xff` byte is followed by a
/// `0x00`. Call [`BitWriter::reset_out_bits_buffer`] at the end of an
/// entropy-coded segment: the last partial byte is padded with zero bits.
#[derive(Debug)]
pub struct BitWriter<'a, W> {
    sink: &'a mut ByteWriter<W>,
    bit_buf: u32,
    bits_in_buf: u32,
    marker_stuffing: bool,
}

impl<'a, W: Write> BitWriter<'a, W> {
    pub fn new(sink: &'a mut ByteWriter<W>) -> BitWriter<'a, W> {
        BitWriter {
            sink,
            bit_buf: 0,
            bits_in_buf: 0,
            marker_stuffing: true,
        }
    }

    pub fn set_marker_stuffing(&mut self, enabled: bool) {
        self.marker_stuffing = enabled;
    }

    /// Writes the low `num` bits of `value`.
    pub fn write_bits(&mut self, value: u32, num: u32) -> Result<()> {
        if num > MAX_BITS_PER_CALL {
            return Err(Error::TooManyBits(num));
        }
        let mut remaining = num;
        while remaining > 0 {
            let take = remaining.min(8 - self.bits_in_buf);
            remaining -= take;
            let bits = (value >> remaining) & ((1u32 << take) - 1);
            self.bit_buf = (self.bit_buf << take) | bits;
            self.bits_in_buf += take;
            if self.bits_in_buf == 8 {
                self.emit(self.bit_buf as u8)?;
                self.bit_buf = 0;
                self.bits_in_buf = 0;
            }
        }
        Ok(())
    }

    /// Flushes a partial trailing byte, filling the unused low bits with zeros.
    pub fn reset_out_bits_buffer(&mut self) -> Result<()> {
        if self.bits_in_buf > 0 {
            let byte = (self.bit_buf << (8 - self.bits_in_buf)) as u8;
            self.bit_buf = 0;
            self.bits_in_buf = 0;
            self.emit(byte)?;
        }
        Ok(())
    }

    /// Underlying byte sink. Flush pending bits before writing to it.
    pub fn sink(&mut self) -> &mut ByteWriter<W> {
        debug_assert_eq!(self.bits_in_buf, 0);
        &mut *self.sink
    }

    fn emit(&mut self, byte: u8) -> Result<()> {
        self.sink.write_u8(byte)?;
        if byte == 0xff && self.marker_stuffing {
            self.sink.write_u8(0)?;
        }
        Ok(())
    }
}
