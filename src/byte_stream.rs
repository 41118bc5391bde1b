// Copyright (c) the medjpeg Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Byte-level cursors over the external stream.
//!
//! [`ByteReader`] buffers an [`std::io::Read`] and offers a small look-ahead,
//! which is what lets the bit reader tell a stuffed `0xFF 0x00` from a marker
//! without consuming the marker. [`ByteWriter`] wraps an [`std::io::Write`]
//! and counts the bytes written.

use std::fmt::Debug;
use std::io::{ErrorKind, Read, Write};

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};

use crate::error::{Error, Result};

const BUFFER_SIZE: usize = 8192;

/// Buffered reader with absolute position tracking and look-ahead.
pub struct ByteReader<R> {
    inner: R,
    buf: Vec<u8>,
    start: usize,
    end: usize,
    position: u64,
    eof: bool,
}

impl<R> Debug for ByteReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ByteReader{{ position: {}, buffered: {}, eof: {} }}",
            self.position,
            self.end - self.start,
            self.eof
        )
    }
}

impl<R: Read> ByteReader<R> {
    pub fn new(inner: R) -> ByteReader<R> {
        ByteReader {
            inner,
            buf: vec![0; BUFFER_SIZE],
            start: 0,
            end: 0,
            position: 0,
            eof: false,
        }
    }

    /// Makes sure at least `min` bytes are buffered. Returns `false` if the
    /// source ends before that.
    fn fill(&mut self, min: usize) -> Result<bool> {
        debug_assert!(min <= BUFFER_SIZE);
        if self.end - self.start >= min {
            return Ok(true);
        }
        if self.start > 0 {
            self.buf.copy_within(self.start..self.end, 0);
            self.end -= self.start;
            self.start = 0;
        }
        while self.end < min && !self.eof {
            match self.inner.read(&mut self.buf[self.end..]) {
                Ok(0) => self.eof = true,
                Ok(n) => self.end += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(self.end - self.start >= min)
    }

    /// Reads one byte.
    /// ```
    /// # use medjpeg::byte_stream::ByteReader;
    /// let mut br = ByteReader::new(&[0xff, 0xd8][..]);
    /// assert_eq!(br.read_u8()?, 0xff);
    /// assert_eq!(br.read_u8()?, 0xd8);
    /// assert!(br.read_u8().is_err());
    /// # Ok::<(), medjpeg::error::Error>(())
    /// ```
    pub fn read_u8(&mut self) -> Result<u8> {
        if !self.fill(1)? {
            return Err(Error::EndOfData);
        }
        let byte = self.buf[self.start];
        self.start += 1;
        self.position += 1;
        Ok(byte)
    }

    /// Returns the byte `offset` positions ahead of the cursor without
    /// consuming anything, or `None` past the end of the stream.
    pub fn peek_at(&mut self, offset: usize) -> Result<Option<u8>> {
        if !self.fill(offset + 1)? {
            return Ok(None);
        }
        Ok(Some(self.buf[self.start + offset]))
    }

    pub fn peek_u8(&mut self) -> Result<Option<u8>> {
        self.peek_at(0)
    }

    pub fn read_u16_be(&mut self) -> Result<u16> {
        let mut bytes = [0u8; 2];
        self.read_exact(&mut bytes)?;
        Ok(BigEndian::read_u16(&bytes))
    }

    pub fn read_exact(&mut self, out: &mut [u8]) -> Result<()> {
        let mut done = 0;
        while done < out.len() {
            if !self.fill(1)? {
                return Err(Error::EndOfData);
            }
            let n = (self.end - self.start).min(out.len() - done);
            out[done..done + n].copy_from_slice(&self.buf[self.start..self.start + n]);
            self.start += n;
            self.position += n as u64;
            done += n;
        }
        Ok(())
    }

    /// Skips `num` bytes.
    pub fn skip(&mut self, mut num: usize) -> Result<()> {
        while num > 0 {
            if !self.fill(1)? {
                return Err(Error::EndOfData);
            }
            let n = (self.end - self.start).min(num);
            self.start += n;
            self.position += n as u64;
            num -= n;
        }
        Ok(())
    }

    /// Returns true once every byte of the source has been consumed.
    pub fn is_at_end(&mut self) -> Result<bool> {
        Ok(!self.fill(1)?)
    }

    /// Number of bytes consumed so far.
    pub fn position(&self) -> u64 {
        self.position
    }
}

/// Writer that keeps track of how many bytes went out.
#[derive(Debug)]
pub struct ByteWriter<W> {
    inner: W,
    position: u64,
}

impl<W: Write> ByteWriter<W> {
    pub fn new(inner: W) -> ByteWriter<W> {
        ByteWriter { inner, position: 0 }
    }

    pub fn write_u8(&mut self, byte: u8) -> Result<()> {
        self.inner.write_u8(byte)?;
        self.position += 1;
        Ok(())
    }

    pub fn write_u16_be(&mut self, value: u16) -> Result<()> {
        self.inner.write_u16::<BigEndian>(value)?;
        self.position += 2;
        Ok(())
    }

    pub fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner.write_all(bytes)?;
        self.position += bytes.len() as u64;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

#[cfg(test)]
mod test {
    use test_log::test;

    use super::*;
    use crate::error::Error;

    /// Hands out at most one byte per `read` call.
    struct Trickle<'a>(&'a [u8]);

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.0.is_empty() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.0[0];
            self.0 = &self.0[1..];
            Ok(1)
        }
    }

    #[test]
    fn peek_does_not_consume() -> Result<()> {
        let mut br = ByteReader::new(Trickle(&[1, 2, 3]));
        assert_eq!(br.peek_at(1)?, Some(2));
        assert_eq!(br.peek_u8()?, Some(1));
        assert_eq!(br.read_u8()?, 1);
        assert_eq!(br.position(), 1);
        assert_eq!(br.peek_at(2)?, None);
        assert_eq!(br.read_u16_be()?, 0x0203);
        assert!(br.is_at_end()?);
        Ok(())
    }

    #[test]
    fn read_exact_across_refills() -> Result<()> {
        let data: Vec<u8> = (0..=255u8).cycle().take(3 * BUFFER_SIZE + 17).collect();
        let mut br = ByteReader::new(&data[..]);
        br.skip(5)?;
        let mut out = vec![0u8; 2 * BUFFER_SIZE];
        br.read_exact(&mut out)?;
        assert_eq!(&out[..], &data[5..5 + 2 * BUFFER_SIZE]);
        assert_eq!(br.position(), 5 + 2 * BUFFER_SIZE as u64);
        Ok(())
    }

    #[test]
    fn truncated_reads_fail() {
        let mut br = ByteReader::new(&[7u8][..]);
        assert!(matches!(br.read_u16_be(), Err(Error::EndOfData)));
        let mut br = ByteReader::new(&[7u8][..]);
        assert!(matches!(br.skip(2), Err(Error::EndOfData)));
    }

    #[test]
    fn writer_counts_bytes() -> Result<()> {
        let mut bw = ByteWriter::new(Vec::new());
        bw.write_u8(0xff)?;
        bw.write_u16_be(0x1234)?;
        bw.write_all(&[9, 9])?;
        assert_eq!(bw.position(), 5);
        assert_eq!(bw.into_inner(), vec![0xff, 0x12, 0x34, 9, 9]);
        Ok(())
    }
}
