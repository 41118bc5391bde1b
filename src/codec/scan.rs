// Copyright (c) the medjpeg Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Entropy coding of single blocks: sequential DC/AC coding, the four
//! progressive passes, and the symbol stream produced by the encoder.

use std::io::Read;

use crate::bit_reader::BitReader;
use crate::codec::marker::TableClass;
use crate::entropy_coding::amplitude::{
    category, encode_amplitude, read_amplitude, LOSSLESS_FULL_RANGE_CATEGORY,
};
use crate::entropy_coding::huffman::HuffmanTable;
use crate::error::{Error, Result};
use crate::tables::ZIGZAG_TO_RASTER;

const END_OF_BLOCK: u32 = 0x00;
const ZERO_RUN_16: u32 = 0xf0;

/// Reads a Huffman-coded category and the difference it introduces, as
/// used for DC coefficients and lossless samples.
#[inline]
pub fn decode_difference<R: Read>(br: &mut BitReader<R>, table: &HuffmanTable) -> Result<i32> {
    let category = table.read_huffman_code(br)?;
    read_amplitude(br, category)
}

/// Decodes one block of a sequential scan into raster-ordered coefficients.
pub fn decode_block<R: Read>(
    br: &mut BitReader<R>,
    dc: &HuffmanTable,
    ac: &HuffmanTable,
    last_dc_value: &mut i32,
    coefficients: &mut [i32; 64],
) -> Result<()> {
    *last_dc_value = last_dc_value.wrapping_add(decode_difference(br, dc)?);
    coefficients[0] = *last_dc_value;

    let mut k = 1;
    while k < 64 {
        let symbol = ac.read_huffman_code(br)?;
        let run = (symbol >> 4) as usize;
        let size = symbol & 0x0f;
        if size == 0 {
            if symbol == ZERO_RUN_16 {
                k += 16;
                continue;
            }
            break;
        }
        k += run;
        if k >= 64 {
            return Err(Error::InvalidHuffmanCode);
        }
        coefficients[ZIGZAG_TO_RASTER[k]] = read_amplitude(br, size)?;
        k += 1;
    }
    Ok(())
}

/// First DC pass of a progressive scan.
pub fn decode_dc_first<R: Read>(
    br: &mut BitReader<R>,
    dc: &HuffmanTable,
    last_dc_value: &mut i32,
    bit_low: u32,
    coefficients: &mut [i32; 64],
) -> Result<()> {
    *last_dc_value = last_dc_value.wrapping_add(decode_difference(br, dc)?);
    coefficients[0] = last_dc_value.wrapping_shl(bit_low);
    Ok(())
}

/// DC refinement: one more bit of the DC coefficient.
pub fn decode_dc_refine<R: Read>(
    br: &mut BitReader<R>,
    bit_low: u32,
    coefficients: &mut [i32; 64],
) -> Result<()> {
    if br.read_bit()? != 0 {
        coefficients[0] |= 1 << bit_low;
    }
    Ok(())
}

/// Reads the length of an end-of-band run whose symbol carried `run`.
fn read_eob_run<R: Read>(br: &mut BitReader<R>, run: u32) -> Result<u32> {
    Ok((1 << run) + br.read_bits(run)?)
}

/// First AC pass over the band `spectral_start..=spectral_end`.
#[allow(clippy::too_many_arguments)]
pub fn decode_ac_first<R: Read>(
    br: &mut BitReader<R>,
    ac: &HuffmanTable,
    spectral_start: usize,
    spectral_end: usize,
    bit_low: u32,
    eob_run: &mut u32,
    coefficients: &mut [i32; 64],
) -> Result<()> {
    if *eob_run > 0 {
        *eob_run -= 1;
        return Ok(());
    }
    let mut k = spectral_start;
    while k <= spectral_end {
        let symbol = ac.read_huffman_code(br)?;
        let run = symbol >> 4;
        let size = symbol & 0x0f;
        if size == 0 {
            if run == 15 {
                k += 16;
                continue;
            }
            *eob_run = read_eob_run(br, run)? - 1;
            break;
        }
        k += run as usize;
        if k > spectral_end {
            return Err(Error::InvalidHuffmanCode);
        }
        coefficients[ZIGZAG_TO_RASTER[k]] = read_amplitude(br, size)?.wrapping_shl(bit_low);
        k += 1;
    }
    Ok(())
}

// Applies a correction bit to an already nonzero coefficient.
#[inline]
fn refine_nonzero<R: Read>(br: &mut BitReader<R>, coefficient: &mut i32, bit: i32) -> Result<()> {
    if br.read_bit()? != 0 && (*coefficient & bit) == 0 {
        if *coefficient >= 0 {
            *coefficient += bit;
        } else {
            *coefficient -= bit;
        }
    }
    Ok(())
}

/// AC refinement pass: correction bits for coefficients that are already
/// nonzero, and new coefficients of magnitude `1 << bit_low`.
#[allow(clippy::too_many_arguments)]
pub fn decode_ac_refine<R: Read>(
    br: &mut BitReader<R>,
    ac: &HuffmanTable,
    spectral_start: usize,
    spectral_end: usize,
    bit_low: u32,
    eob_run: &mut u32,
    coefficients: &mut [i32; 64],
) -> Result<()> {
    let bit = 1i32 << bit_low;
    let mut k = spectral_start;

    if *eob_run == 0 {
        while k <= spectral_end {
            let symbol = ac.read_huffman_code(br)?;
            let mut run = (symbol >> 4) as i32;
            let size = symbol & 0x0f;
            let mut value = 0;
            if size != 0 {
                if size != 1 {
                    return Err(Error::InvalidHuffmanCode);
                }
                value = if br.read_bit()? != 0 { bit } else { -bit };
            } else if run != 15 {
                *eob_run = read_eob_run(br, run as u32)?;
                break;
            }

            // Skip `run` zero coefficients, refining the nonzero ones on the way.
            while k <= spectral_end {
                let coefficient = &mut coefficients[ZIGZAG_TO_RASTER[k]];
                if *coefficient != 0 {
                    refine_nonzero(br, coefficient, bit)?;
                } else {
                    if run == 0 {
                        break;
                    }
                    run -= 1;
                }
                k += 1;
            }
            if value != 0 {
                if k > spectral_end {
                    return Err(Error::InvalidHuffmanCode);
                }
                coefficients[ZIGZAG_TO_RASTER[k]] = value;
            }
            k += 1;
        }
    }

    if *eob_run > 0 {
        while k <= spectral_end {
            let coefficient = &mut coefficients[ZIGZAG_TO_RASTER[k]];
            if *coefficient != 0 {
                refine_nonzero(br, coefficient, bit)?;
            }
            k += 1;
        }
        *eob_run -= 1;
    }
    Ok(())
}

/// Receiver of the symbols an encoder produces. The first encoding pass
/// counts them, the second writes them.
pub trait SymbolSink {
    fn huffman(&mut self, class: TableClass, table: usize, symbol: u32) -> Result<()>;
    fn bits(&mut self, value: u32, count: u32) -> Result<()>;

    /// End of a restart interval; `index` is the RSTn number, 0..=7.
    fn restart(&mut self, _index: u8) -> Result<()> {
        Ok(())
    }
}

fn write_amplitude_bits<S: SymbolSink>(sink: &mut S, value: i32, category: u32) -> Result<()> {
    match category {
        0 | LOSSLESS_FULL_RANGE_CATEGORY => Ok(()),
        _ => sink.bits(encode_amplitude(value, category), category),
    }
}

/// Emits a difference as category plus amplitude bits.
pub fn encode_difference<S: SymbolSink>(
    sink: &mut S,
    table: usize,
    difference: i32,
) -> Result<()> {
    let category = category(difference);
    sink.huffman(TableClass::Dc, table, category)?;
    write_amplitude_bits(sink, difference, category)
}

/// Emits one block of raster-ordered quantized coefficients.
pub fn encode_block<S: SymbolSink>(
    sink: &mut S,
    dc_table: usize,
    ac_table: usize,
    last_dc_value: &mut i32,
    coefficients: &[i32; 64],
) -> Result<()> {
    encode_difference(sink, dc_table, coefficients[0] - *last_dc_value)?;
    *last_dc_value = coefficients[0];

    let mut run = 0u32;
    for &raster in &ZIGZAG_TO_RASTER[1..] {
        let value = coefficients[raster];
        if value == 0 {
            run += 1;
            continue;
        }
        while run >= 16 {
            sink.huffman(TableClass::Ac, ac_table, ZERO_RUN_16)?;
            run -= 16;
        }
        let size = category(value);
        sink.huffman(TableClass::Ac, ac_table, (run << 4) | size)?;
        write_amplitude_bits(sink, value, size)?;
        run = 0;
    }
    if run > 0 {
        sink.huffman(TableClass::Ac, ac_table, END_OF_BLOCK)?;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use test_log::test;

    use super::*;
    use crate::bit_writer::BitWriter;
    use crate::byte_stream::{ByteReader, ByteWriter};
    use crate::tables::{DEFAULT_AC_LUMINANCE, DEFAULT_DC_LUMINANCE, RASTER_TO_ZIGZAG};

    struct Writer<'a, 'b> {
        bw: BitWriter<'a, Vec<u8>>,
        dc: &'b HuffmanTable,
        ac: &'b HuffmanTable,
    }

    impl SymbolSink for Writer<'_, '_> {
        fn huffman(&mut self, class: TableClass, _table: usize, symbol: u32) -> Result<()> {
            let table = match class {
                TableClass::Dc => self.dc,
                TableClass::Ac => self.ac,
            };
            table.write_huffman_code(symbol, &mut self.bw)
        }

        fn bits(&mut self, value: u32, count: u32) -> Result<()> {
            self.bw.write_bits(value, count)
        }
    }

    fn tables() -> (HuffmanTable, HuffmanTable) {
        (
            HuffmanTable::from_counts(8, &DEFAULT_DC_LUMINANCE.counts, DEFAULT_DC_LUMINANCE.values)
                .unwrap(),
            HuffmanTable::from_counts(8, &DEFAULT_AC_LUMINANCE.counts, DEFAULT_AC_LUMINANCE.values)
                .unwrap(),
        )
    }

    fn encode_blocks(blocks: &[[i32; 64]]) -> Vec<u8> {
        let (dc, ac) = tables();
        let mut sink = ByteWriter::new(Vec::new());
        let mut writer = Writer {
            bw: BitWriter::new(&mut sink),
            dc: &dc,
            ac: &ac,
        };
        let mut last_dc = 0;
        for block in blocks {
            encode_block(&mut writer, 0, 0, &mut last_dc, block).unwrap();
        }
        writer.bw.reset_out_bits_buffer().unwrap();
        sink.into_inner()
    }

    #[test]
    fn sequential_blocks_round_trip() {
        arbtest::arbtest(|u| {
            let count = u.int_in_range(1..=4usize)?;
            let mut blocks = Vec::new();
            for _ in 0..count {
                let mut block = [0i32; 64];
                for _ in 0..u.int_in_range(0..=20)? {
                    let position = u.int_in_range(0..=63usize)?;
                    block[position] = u.int_in_range(-1023..=1023)?;
                }
                blocks.push(block);
            }
            let bytes = encode_blocks(&blocks);
            let (dc, ac) = tables();
            let mut source = ByteReader::new(&bytes[..]);
            let mut br = BitReader::new(&mut source);
            let mut last_dc = 0;
            for block in &blocks {
                let mut decoded = [0i32; 64];
                decode_block(&mut br, &dc, &ac, &mut last_dc, &mut decoded).unwrap();
                assert_eq!(&decoded, block);
            }
            Ok(())
        });
    }

    #[test]
    fn long_zero_runs_use_zrl() {
        let mut block = [0i32; 64];
        block[ZIGZAG_TO_RASTER[40]] = 3;
        let bytes = encode_blocks(&[block]);
        let (dc, ac) = tables();
        let mut source = ByteReader::new(&bytes[..]);
        let mut br = BitReader::new(&mut source);
        let mut decoded = [0i32; 64];
        decode_block(&mut br, &dc, &ac, &mut 0, &mut decoded).unwrap();
        assert_eq!(decoded, block);
        assert_eq!(RASTER_TO_ZIGZAG[ZIGZAG_TO_RASTER[40]], 40);
    }

    fn bits_reader(bits: &str) -> Vec<u8> {
        let mut sink = ByteWriter::new(Vec::new());
        let mut bw = BitWriter::new(&mut sink);
        for c in bits.chars().filter(|c| !c.is_whitespace()) {
            bw.write_bits((c == '1') as u32, 1).unwrap();
        }
        bw.reset_out_bits_buffer().unwrap();
        sink.into_inner()
    }

    #[test]
    fn progressive_passes() -> Result<()> {
        let (dc, ac) = tables();
        // DC first with Al = 1: category 2 ("011") and amplitude 3 ("11"),
        // then a refinement bit "1".
        let bytes = bits_reader("011 11 1");
        let mut source = ByteReader::new(&bytes[..]);
        let mut br = BitReader::new(&mut source);
        let mut block = [0i32; 64];
        let mut last_dc = 0;
        decode_dc_first(&mut br, &dc, &mut last_dc, 1, &mut block)?;
        assert_eq!(block[0], 6);
        decode_dc_refine(&mut br, 0, &mut block)?;
        assert_eq!(block[0], 7);

        // AC first over 1..=5: symbol 0x01 ("00") with amplitude "1", then
        // EOB ("1010").
        let bytes = bits_reader("00 1 1010");
        let mut source = ByteReader::new(&bytes[..]);
        let mut br = BitReader::new(&mut source);
        let mut eob_run = 0;
        decode_ac_first(&mut br, &ac, 1, 5, 1, &mut eob_run, &mut block)?;
        assert_eq!(block[ZIGZAG_TO_RASTER[1]], 2);
        assert_eq!(eob_run, 0);

        // AC refinement: a new coefficient at position 2 ("00" + sign "0"),
        // passing position 1 with correction bit "1", then EOB.
        let bytes = bits_reader("00 0 1 1010");
        let mut source = ByteReader::new(&bytes[..]);
        let mut br = BitReader::new(&mut source);
        decode_ac_refine(&mut br, &ac, 1, 5, 0, &mut eob_run, &mut block)?;
        assert_eq!(block[ZIGZAG_TO_RASTER[1]], 3);
        assert_eq!(block[ZIGZAG_TO_RASTER[2]], -1);
        Ok(())
    }

    #[test]
    fn eob_runs_span_blocks() -> Result<()> {
        let mut counts = [0u8; 16];
        counts[0] = 2;
        let ac = HuffmanTable::from_counts(8, &counts, &[0x20, 0x01])?;
        // EOB2 (code "0") carries two extra bits, "01": a run of 4 + 1 blocks.
        let bytes = bits_reader("0 01");
        let mut source = ByteReader::new(&bytes[..]);
        let mut br = BitReader::new(&mut source);
        let mut eob_run = 0;
        let mut block = [0i32; 64];
        decode_ac_first(&mut br, &ac, 1, 63, 0, &mut eob_run, &mut block)?;
        assert_eq!(eob_run, 4);
        for remaining in (0..4).rev() {
            decode_ac_first(&mut br, &ac, 1, 63, 0, &mut eob_run, &mut block)?;
            assert_eq!(eob_run, remaining);
        }
        assert_eq!(block, [0; 64]);
        Ok(())
    }
}
