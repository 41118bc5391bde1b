// Copyright (c) the medjpeg Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Marker identification and the marker segments of ITU T.81 annex B.
//!
//! Every segment with a payload implements [`Segment`], so reading and
//! writing go through the same two entry points, [`read_segment`] and
//! [`write_segment`].

use std::io::{Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::byte_stream::{ByteReader, ByteWriter};
use crate::error::{Error, Result};
use crate::tables::ZIGZAG_TO_RASTER;
use crate::util::tracing_wrappers::*;

pub const SOF0: u8 = 0xc0;
pub const SOF1: u8 = 0xc1;
pub const SOF2: u8 = 0xc2;
pub const SOF3: u8 = 0xc3;
pub const DHT: u8 = 0xc4;
pub const DAC: u8 = 0xcc;
pub const RST0: u8 = 0xd0;
pub const SOI: u8 = 0xd8;
pub const EOI: u8 = 0xd9;
pub const SOS: u8 = 0xda;
pub const DQT: u8 = 0xdb;
pub const DRI: u8 = 0xdd;
pub const TEM: u8 = 0x01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    Soi,
    Eoi,
    /// Baseline, extended, progressive or lossless frame (SOF0..SOF3).
    Sof(u8),
    Dht,
    Dqt,
    Sos,
    Dri,
    Rst(u8),
    /// Hierarchical or arithmetic-coded frames, and DAC.
    Unsupported(u8),
    /// A marker without payload that carries no information for us.
    Standalone(u8),
    /// Any other marker followed by a length, skipped when decoding.
    Other(u8),
}

impl Marker {
    pub fn from_id(id: u8) -> Marker {
        match id {
            SOI => Marker::Soi,
            EOI => Marker::Eoi,
            SOF0..=SOF3 => Marker::Sof(id),
            DHT => Marker::Dht,
            DQT => Marker::Dqt,
            SOS => Marker::Sos,
            DRI => Marker::Dri,
            RST0..=0xd7 => Marker::Rst(id - RST0),
            0xc5..=0xc7 | 0xc9..=0xcb | DAC | 0xcd..=0xcf => Marker::Unsupported(id),
            TEM => Marker::Standalone(id),
            _ => Marker::Other(id),
        }
    }

    pub fn id(&self) -> u8 {
        match *self {
            Marker::Soi => SOI,
            Marker::Eoi => EOI,
            Marker::Dht => DHT,
            Marker::Dqt => DQT,
            Marker::Sos => SOS,
            Marker::Dri => DRI,
            Marker::Rst(n) => RST0 + (n & 7),
            Marker::Sof(id)
            | Marker::Unsupported(id)
            | Marker::Standalone(id)
            | Marker::Other(id) => id,
        }
    }
}

/// Scans forward to the next marker. Bytes that are not part of a marker
/// are skipped, as are `0xff` fill bytes and `0xff 0x00` pairs.
pub fn read_next_marker<R: Read>(source: &mut ByteReader<R>) -> Result<Marker> {
    let mut skipped = 0usize;
    loop {
        if source.read_u8()? != 0xff {
            skipped += 1;
            continue;
        }
        let mut id = source.read_u8()?;
        while id == 0xff {
            id = source.read_u8()?;
        }
        if id == 0 {
            skipped += 2;
            continue;
        }
        if skipped > 0 {
            trace!(skipped, "skipped bytes before marker");
        }
        return Ok(Marker::from_id(id));
    }
}

/// Reads the length field of the segment introduced by `marker` and returns
/// its payload.
pub fn read_segment_payload<R: Read>(source: &mut ByteReader<R>, marker: u8) -> Result<Vec<u8>> {
    let length = source.read_u16_be()? as usize;
    if length < 2 {
        return Err(Error::InvalidSegmentLength(marker, length));
    }
    let mut payload = Vec::new();
    payload.try_reserve_exact(length - 2)?;
    payload.resize(length - 2, 0);
    source.read_exact(&mut payload)?;
    Ok(payload)
}

/// Skips the segment introduced by `marker`.
pub fn skip_segment<R: Read>(source: &mut ByteReader<R>, marker: u8) -> Result<()> {
    let length = source.read_u16_be()? as usize;
    if length < 2 {
        return Err(Error::InvalidSegmentLength(marker, length));
    }
    source.skip(length - 2)
}

pub fn write_marker<W: Write>(sink: &mut ByteWriter<W>, marker: u8) -> Result<()> {
    sink.write_u8(0xff)?;
    sink.write_u8(marker)
}

/// A marker segment with a length-prefixed payload.
pub trait Segment: Sized {
    fn parse(payload: &mut SegmentReader) -> Result<Self>;
    fn write_payload(&self, out: &mut Vec<u8>) -> Result<()>;
}

/// Reads and parses the segment introduced by `marker`.
pub fn read_segment<R: Read, S: Segment>(source: &mut ByteReader<R>, marker: u8) -> Result<S> {
    let payload = read_segment_payload(source, marker)?;
    let mut reader = SegmentReader::new(&payload, marker);
    let segment = S::parse(&mut reader)?;
    if !reader.is_empty() {
        return Err(Error::InvalidSegmentLength(marker, payload.len() + 2));
    }
    Ok(segment)
}

/// Writes `marker`, the length field and the payload of `segment`.
pub fn write_segment<W: Write, S: Segment>(
    sink: &mut ByteWriter<W>,
    marker: u8,
    segment: &S,
) -> Result<()> {
    let mut payload = Vec::new();
    segment.write_payload(&mut payload)?;
    let length = u16::try_from(payload.len() + 2)
        .map_err(|_| Error::InvalidSegmentLength(marker, payload.len() + 2))?;
    write_marker(sink, marker)?;
    sink.write_u16_be(length)?;
    sink.write_all(&payload)
}

/// Cursor over a segment payload. Running past its end is a length error.
pub struct SegmentReader<'a> {
    data: &'a [u8],
    marker: u8,
    length: usize,
}

impl<'a> SegmentReader<'a> {
    pub fn new(data: &'a [u8], marker: u8) -> SegmentReader<'a> {
        SegmentReader {
            data,
            marker,
            length: data.len() + 2,
        }
    }

    fn error(&self) -> Error {
        Error::InvalidSegmentLength(self.marker, self.length)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.data.read_u8().map_err(|_| self.error())
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        self.data.read_u16::<BigEndian>().map_err(|_| self.error())
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.data.len() < len {
            return Err(self.error());
        }
        let (head, tail) = self.data.split_at(len);
        self.data = tail;
        Ok(head)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameComponent {
    pub id: u8,
    pub sampling_factor_x: u8,
    pub sampling_factor_y: u8,
    pub quant_table: u8,
}

/// SOF payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    pub precision: u8,
    pub height: u16,
    pub width: u16,
    pub components: Vec<FrameComponent>,
}

impl Segment for FrameHeader {
    fn parse(payload: &mut SegmentReader) -> Result<Self> {
        let precision = payload.read_u8()?;
        let height = payload.read_u16()?;
        let width = payload.read_u16()?;
        let count = payload.read_u8()? as usize;
        let mut components = Vec::with_capacity(count);
        for _ in 0..count {
            let id = payload.read_u8()?;
            let factors = payload.read_u8()?;
            let quant_table = payload.read_u8()?;
            components.push(FrameComponent {
                id,
                sampling_factor_x: factors >> 4,
                sampling_factor_y: factors & 0x0f,
                quant_table,
            });
        }
        Ok(FrameHeader {
            precision,
            height,
            width,
            components,
        })
    }

    fn write_payload(&self, out: &mut Vec<u8>) -> Result<()> {
        out.write_u8(self.precision)?;
        out.write_u16::<BigEndian>(self.height)?;
        out.write_u16::<BigEndian>(self.width)?;
        out.write_u8(self.components.len() as u8)?;
        for c in &self.components {
            out.write_u8(c.id)?;
            out.write_u8((c.sampling_factor_x << 4) | c.sampling_factor_y)?;
            out.write_u8(c.quant_table)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanComponent {
    pub id: u8,
    pub dc_table: u8,
    pub ac_table: u8,
}

/// SOS payload. For lossless scans `spectral_start` holds the predictor and
/// `bit_low` the point transform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanHeader {
    pub components: Vec<ScanComponent>,
    pub spectral_start: u8,
    pub spectral_end: u8,
    pub bit_high: u8,
    pub bit_low: u8,
}

impl Segment for ScanHeader {
    fn parse(payload: &mut SegmentReader) -> Result<Self> {
        let count = payload.read_u8()? as usize;
        let mut components = Vec::with_capacity(count);
        for _ in 0..count {
            let id = payload.read_u8()?;
            let tables = payload.read_u8()?;
            components.push(ScanComponent {
                id,
                dc_table: tables >> 4,
                ac_table: tables & 0x0f,
            });
        }
        let spectral_start = payload.read_u8()?;
        let spectral_end = payload.read_u8()?;
        let bits = payload.read_u8()?;
        Ok(ScanHeader {
            components,
            spectral_start,
            spectral_end,
            bit_high: bits >> 4,
            bit_low: bits & 0x0f,
        })
    }

    fn write_payload(&self, out: &mut Vec<u8>) -> Result<()> {
        out.write_u8(self.components.len() as u8)?;
        for c in &self.components {
            out.write_u8(c.id)?;
            out.write_u8((c.dc_table << 4) | c.ac_table)?;
        }
        out.write_u8(self.spectral_start)?;
        out.write_u8(self.spectral_end)?;
        out.write_u8((self.bit_high << 4) | self.bit_low)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableClass {
    Dc = 0,
    Ac = 1,
}

/// One table of a DHT segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HuffmanTableSpec {
    pub class: TableClass,
    pub id: u8,
    pub counts: [u8; 16],
    pub values: Vec<u8>,
}

/// DHT payload: one or more tables.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HuffmanTablesSegment {
    pub tables: Vec<HuffmanTableSpec>,
}

impl Segment for HuffmanTablesSegment {
    fn parse(payload: &mut SegmentReader) -> Result<Self> {
        let mut tables = Vec::new();
        while !payload.is_empty() {
            let header = payload.read_u8()?;
            let class = match header >> 4 {
                0 => TableClass::Dc,
                1 => TableClass::Ac,
                c => return Err(Error::InvalidHuffmanTable(c, header & 0x0f)),
            };
            let mut counts = [0u8; 16];
            counts.copy_from_slice(payload.read_bytes(16)?);
            let total = counts.iter().map(|&c| c as usize).sum();
            let values = payload.read_bytes(total)?.to_vec();
            tables.push(HuffmanTableSpec {
                class,
                id: header & 0x0f,
                counts,
                values,
            });
        }
        Ok(HuffmanTablesSegment { tables })
    }

    fn write_payload(&self, out: &mut Vec<u8>) -> Result<()> {
        for table in &self.tables {
            out.write_u8(((table.class as u8) << 4) | table.id)?;
            out.extend_from_slice(&table.counts);
            out.extend_from_slice(&table.values);
        }
        Ok(())
    }
}

/// One table of a DQT segment, in raster order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantTableSpec {
    pub id: u8,
    pub values: [u16; 64],
}

impl QuantTableSpec {
    fn needs_16_bits(&self) -> bool {
        self.values.iter().any(|&v| v > 255)
    }
}

/// DQT payload: one or more tables, with 8- or 16-bit entries.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QuantTablesSegment {
    pub tables: Vec<QuantTableSpec>,
}

impl Segment for QuantTablesSegment {
    fn parse(payload: &mut SegmentReader) -> Result<Self> {
        let mut tables = Vec::new();
        while !payload.is_empty() {
            let header = payload.read_u8()?;
            let wide = match header >> 4 {
                0 => false,
                1 => true,
                _ => return Err(Error::InvalidQuantTable(header)),
            };
            let mut values = [0u16; 64];
            for &raster in ZIGZAG_TO_RASTER.iter() {
                values[raster] = if wide {
                    payload.read_u16()?
                } else {
                    payload.read_u8()? as u16
                };
            }
            tables.push(QuantTableSpec {
                id: header & 0x0f,
                values,
            });
        }
        Ok(QuantTablesSegment { tables })
    }

    fn write_payload(&self, out: &mut Vec<u8>) -> Result<()> {
        for table in &self.tables {
            let wide = table.needs_16_bits();
            out.write_u8(((wide as u8) << 4) | table.id)?;
            for &raster in ZIGZAG_TO_RASTER.iter() {
                let value = table.values[raster];
                if wide {
                    out.write_u16::<BigEndian>(value)?;
                } else {
                    out.write_u8(value as u8)?;
                }
            }
        }
        Ok(())
    }
}

/// DRI payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartInterval(pub u16);

impl Segment for RestartInterval {
    fn parse(payload: &mut SegmentReader) -> Result<Self> {
        Ok(RestartInterval(payload.read_u16()?))
    }

    fn write_payload(&self, out: &mut Vec<u8>) -> Result<()> {
        out.write_u16::<BigEndian>(self.0)?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use test_log::test;

    use super::*;

    fn written<S: Segment>(marker: u8, segment: &S) -> Vec<u8> {
        let mut sink = ByteWriter::new(Vec::new());
        write_segment(&mut sink, marker, segment).unwrap();
        sink.into_inner()
    }

    #[test]
    fn marker_ids() {
        assert_eq!(Marker::from_id(0xc0), Marker::Sof(0xc0));
        assert_eq!(Marker::from_id(0xc3), Marker::Sof(0xc3));
        assert_eq!(Marker::from_id(0xc9), Marker::Unsupported(0xc9));
        assert_eq!(Marker::from_id(0xcc), Marker::Unsupported(0xcc));
        assert_eq!(Marker::from_id(0xd5), Marker::Rst(5));
        assert_eq!(Marker::from_id(0xe1), Marker::Other(0xe1));
        assert_eq!(Marker::from_id(0xfe), Marker::Other(0xfe));
        for id in 1..=0xfe {
            assert_eq!(Marker::from_id(id).id(), id);
        }
    }

    #[test]
    fn fill_bytes_and_garbage_are_skipped() -> Result<()> {
        let data = [0x12, 0xff, 0x00, 0xff, 0xff, 0xff, 0xd9];
        let mut source = ByteReader::new(&data[..]);
        assert_eq!(read_next_marker(&mut source)?, Marker::Eoi);
        assert!(matches!(read_next_marker(&mut source), Err(Error::EndOfData)));
        Ok(())
    }

    #[test]
    fn frame_header_layout() -> Result<()> {
        let header = FrameHeader {
            precision: 12,
            height: 0x0102,
            width: 0x0304,
            components: vec![FrameComponent {
                id: 1,
                sampling_factor_x: 2,
                sampling_factor_y: 1,
                quant_table: 0,
            }],
        };
        let bytes = written(SOF1, &header);
        assert_eq!(
            bytes,
            vec![0xff, 0xc1, 0, 11, 12, 1, 2, 3, 4, 1, 1, 0x21, 0]
        );
        let mut source = ByteReader::new(&bytes[2..]);
        let parsed: FrameHeader = read_segment(&mut source, SOF1)?;
        assert_eq!(parsed, header);
        Ok(())
    }

    #[test]
    fn quant_tables_are_zigzag_on_the_wire() -> Result<()> {
        let values: [u16; 64] = array_init::array_init(|i| i as u16 + 1);
        let segment = QuantTablesSegment {
            tables: vec![QuantTableSpec { id: 2, values }],
        };
        let bytes = written(DQT, &segment);
        assert_eq!(bytes.len(), 4 + 1 + 64);
        assert_eq!(bytes[4], 0x02);
        // Third zig-zag entry is raster position 8.
        assert_eq!(bytes[7], 9);

        let mut wide = values;
        wide[63] = 1000;
        let segment = QuantTablesSegment {
            tables: vec![QuantTableSpec { id: 0, values: wide }],
        };
        let bytes = written(DQT, &segment);
        assert_eq!(bytes[4], 0x10);
        let mut source = ByteReader::new(&bytes[2..]);
        let parsed: QuantTablesSegment = read_segment(&mut source, DQT)?;
        assert_eq!(parsed, segment);
        Ok(())
    }

    #[test]
    fn truncated_segment_is_a_length_error() {
        // DHT claiming 1 code of length 1 but carrying no symbol.
        let mut payload = vec![0x00];
        payload.extend_from_slice(&[1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        let mut reader = SegmentReader::new(&payload, DHT);
        assert!(matches!(
            HuffmanTablesSegment::parse(&mut reader),
            Err(Error::InvalidSegmentLength(DHT, 19))
        ));
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let bytes = [0x00, 0x05, 0x00, 0x10, 0x00];
        let mut source = ByteReader::new(&bytes[..]);
        assert!(matches!(
            read_segment::<_, RestartInterval>(&mut source, DRI),
            Err(Error::InvalidSegmentLength(DRI, 5))
        ));
    }
}
