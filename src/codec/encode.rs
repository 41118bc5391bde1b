// Copyright (c) the medjpeg Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Encoding. The coded symbols of every scan are produced twice through a
//! [`SymbolSink`]: once to count their frequencies when optimized Huffman
//! tables are built, once to write them.

use std::io::Write;

use crate::api::{EncodeOptions, ImageChannels, JpegProcess};
use crate::bit_writer::BitWriter;
use crate::byte_stream::ByteWriter;
use crate::channel::JpegChannel;
use crate::codec::geometry::{FrameGeometry, ScanLayout};
use crate::codec::lossless::{predict, wrap_difference, Predictor, SampleContext};
use crate::codec::marker::*;
use crate::codec::scan::{encode_block, encode_difference, SymbolSink};
use crate::codec::{JpegCodec, HUFFMAN_SYMBOL_BITS, NUM_HUFFMAN_TABLES};
use crate::dct::forward_dct;
use crate::entropy_coding::huffman::{HuffmanTable, JPEG_MAX_CODE_LENGTH};
use crate::error::{Error, Result};
use crate::quant::scale_for_quality;
use crate::tables::*;
use crate::util::tracing_wrappers::*;

/// Components of one interleaved scan at most.
const MAX_SCAN_COMPONENTS: usize = 4;

#[derive(Debug, Clone, Copy)]
struct ScanCoding {
    /// Set for lossless scans.
    predictor: Option<Predictor>,
    mcu_per_restart_interval: u64,
}

struct FrequencyCounter<'a> {
    dc_tables: &'a mut [HuffmanTable; NUM_HUFFMAN_TABLES],
    ac_tables: &'a mut [HuffmanTable; NUM_HUFFMAN_TABLES],
}

impl SymbolSink for FrequencyCounter<'_> {
    fn huffman(&mut self, class: TableClass, table: usize, symbol: u32) -> Result<()> {
        let tables = match class {
            TableClass::Dc => &mut *self.dc_tables,
            TableClass::Ac => &mut *self.ac_tables,
        };
        tables[table].inc_value_freq(symbol)
    }

    fn bits(&mut self, _value: u32, _count: u32) -> Result<()> {
        Ok(())
    }
}

struct HuffmanWriter<'a, 'w, W> {
    bw: BitWriter<'w, W>,
    dc_tables: &'a [HuffmanTable; NUM_HUFFMAN_TABLES],
    ac_tables: &'a [HuffmanTable; NUM_HUFFMAN_TABLES],
}

impl<W: Write> SymbolSink for HuffmanWriter<'_, '_, W> {
    fn huffman(&mut self, class: TableClass, table: usize, symbol: u32) -> Result<()> {
        let tables = match class {
            TableClass::Dc => self.dc_tables,
            TableClass::Ac => self.ac_tables,
        };
        tables[table].write_huffman_code(symbol, &mut self.bw)
    }

    fn bits(&mut self, value: u32, count: u32) -> Result<()> {
        self.bw.write_bits(value, count)
    }

    fn restart(&mut self, index: u8) -> Result<()> {
        self.bw.reset_out_bits_buffer()?;
        write_marker(self.bw.sink(), RST0 + index)
    }
}

/// Produces the symbols of one scan over `scan` (indices into `channels`).
fn encode_scan<S: SymbolSink>(
    channels: &mut [JpegChannel],
    scan: &[usize],
    frame: &FrameGeometry,
    coding: ScanCoding,
    sink: &mut S,
) -> Result<()> {
    let factors: Vec<(u32, u32)> = scan
        .iter()
        .map(|&i| (channels[i].sampling_factor_x, channels[i].sampling_factor_y))
        .collect();
    let layout = ScanLayout::new(frame, &factors);
    for (&index, &(x, y)) in scan.iter().zip(&layout.blocks_per_mcu) {
        let channel = &mut channels[index];
        channel.blocks_per_mcu_x = x;
        channel.blocks_per_mcu_y = y;
        channel.reset_dc();
    }

    let (mut interval_x, mut interval_y) = (0, 0);
    for mcu in 0..layout.mcu_number_total() {
        let mcu_x = (mcu % layout.mcu_number_x as u64) as usize;
        let mcu_y = (mcu / layout.mcu_number_x as u64) as usize;
        let interval = coding.mcu_per_restart_interval;
        if interval > 0 && mcu > 0 && mcu % interval == 0 {
            sink.restart(((mcu / interval - 1) % 8) as u8)?;
            for &index in scan {
                channels[index].reset_dc();
            }
            (interval_x, interval_y) = (mcu_x, mcu_y);
        }

        for &index in scan {
            let channel = &mut channels[index];
            let (blocks_x, blocks_y) = (channel.blocks_per_mcu_x, channel.blocks_per_mcu_y);
            for block_y in 0..blocks_y {
                for block_x in 0..blocks_x {
                    let x = mcu_x * blocks_x + block_x;
                    let y = mcu_y * blocks_y + block_y;
                    match coding.predictor {
                        Some(predictor) => {
                            let context = SampleContext::of(
                                x,
                                y,
                                interval_x * blocks_x,
                                interval_y * blocks_y,
                            );
                            let prediction = predict(
                                &channel.buffer,
                                channel.size_x,
                                x,
                                y,
                                context,
                                predictor,
                                channel.default_dc_value,
                            );
                            let sample = channel.buffer[y * channel.size_x + x];
                            encode_difference(
                                sink,
                                channel.dc_table,
                                wrap_difference(sample - prediction),
                            )?;
                        }
                        None => {
                            let block = channel.read_block(x, y);
                            encode_block(
                                sink,
                                channel.dc_table,
                                channel.ac_table,
                                &mut channel.last_dc_value,
                                &block,
                            )?;
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

/// Copies `plane` into the channel, box-averaging it down to the channel's
/// sampling factors, and fills the padding by edge replication.
fn fill_channel(channel: &mut JpegChannel, plane: &[i32], frame: &FrameGeometry) {
    let ratio_x = frame.max_sampling_factor_x / channel.sampling_factor_x as usize;
    let ratio_y = frame.max_sampling_factor_y / channel.sampling_factor_y as usize;
    let stride = channel.size_x;
    for y in 0..channel.height {
        let (y0, y1) = (y * ratio_y, ((y + 1) * ratio_y).min(frame.height));
        for x in 0..channel.width {
            let (x0, x1) = (x * ratio_x, ((x + 1) * ratio_x).min(frame.width));
            let mut sum = 0i64;
            for row in plane[y0 * frame.width..y1 * frame.width].chunks_exact(frame.width) {
                sum += row[x0..x1].iter().map(|&s| s as i64).sum::<i64>();
            }
            let count = ((y1 - y0) * (x1 - x0)) as i64;
            channel.buffer[y * stride + x] = ((sum + count / 2) / count) as i32;
        }
        let last = channel.buffer[y * stride + channel.width - 1];
        channel.buffer[y * stride + channel.width..(y + 1) * stride].fill(last);
    }
    let last_row = (channel.height - 1) * stride;
    for y in channel.height..channel.size_y {
        channel
            .buffer
            .copy_within(last_row..last_row + stride, y * stride);
    }
}

fn table_spec(class: TableClass, id: usize, table: &HuffmanTable) -> Result<HuffmanTableSpec> {
    let mut counts = [0u8; 16];
    for (length, count) in counts.iter_mut().enumerate() {
        let codes = table.values_per_length(length + 1);
        *count = u8::try_from(codes).map_err(|_| Error::TooManyHuffmanSymbols(codes as usize, 255))?;
    }
    let values = table
        .ordered_values()
        .iter()
        .map(|&v| u8::try_from(v).map_err(|_| Error::HuffmanSymbolOutOfRange(v)))
        .collect::<Result<Vec<u8>>>()?;
    Ok(HuffmanTableSpec {
        class,
        id: id as u8,
        counts,
        values,
    })
}

/// Turns collected frequencies into a length-limited canonical code without
/// an all-ones codeword.
fn build_optimized_table(table: &mut HuffmanTable) -> Result<()> {
    table.calc_huffman_codes_length(JPEG_MAX_CODE_LENGTH)?;
    table.remove_last_code();
    table.calc_huffman_tables()
}

impl JpegCodec {
    /// Encodes `image` as a single frame.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all))]
    pub fn encode<W: Write>(
        &mut self,
        image: &ImageChannels,
        options: &EncodeOptions,
        writer: W,
    ) -> Result<()> {
        image.validate()?;
        options.validate()?;
        if image.precision != options.precision {
            return Err(Error::InvalidParameter(
                "image and options disagree on the precision",
            ));
        }

        self.reset();
        self.process = options.process.marker();
        self.precision = options.precision as u32;
        self.lossless = options.process.is_lossless();
        self.mcu_per_restart_interval = options.restart_interval as u32;
        let point_transform = match options.process {
            JpegProcess::Lossless {
                predictor,
                point_transform,
            } => {
                self.predictor = predictor;
                point_transform as u32
            }
            _ => 0,
        };

        let frame = self.prepare_channels(image, options)?;
        if self.lossless {
            let default_dc_value = 1 << (self.precision - point_transform - 1);
            for channel in self.channels.iter_mut() {
                channel.point_transform = point_transform;
                channel.default_dc_value = default_dc_value;
                channel
                    .buffer
                    .iter_mut()
                    .for_each(|s| *s >>= point_transform);
            }
        } else {
            self.prepare_quant_tables(options.quality)?;
            self.forward_transform()?;
        }

        let components = self.channels.len();
        let scans: Vec<Vec<usize>> = if components <= MAX_SCAN_COMPONENTS {
            vec![(0..components).collect()]
        } else {
            (0..components).map(|i| vec![i]).collect()
        };
        let table_slots = components.min(2);
        for (i, channel) in self.channels.iter_mut().enumerate() {
            channel.dc_table = i.min(1);
            channel.ac_table = i.min(1);
        }
        let coding = ScanCoding {
            predictor: self.lossless.then_some(self.predictor),
            mcu_per_restart_interval: options.restart_interval as u64,
        };

        let defaults_fit = DEFAULT_DC_LUMINANCE.max_category() as u32 >= self.precision + 3
            && DEFAULT_AC_LUMINANCE.max_category() as u32 >= self.precision + 2;
        if options.optimize_huffman || self.lossless || !defaults_fit {
            self.optimize_tables(&frame, &scans, coding, table_slots)?;
        } else {
            self.load_default_tables(table_slots)?;
        }
        debug!(
            width = frame.width,
            height = frame.height,
            components,
            process = self.process,
            "encoding"
        );

        let mut sink = ByteWriter::new(writer);
        write_marker(&mut sink, SOI)?;
        if !self.lossless {
            let mut segment = QuantTablesSegment::default();
            for id in 0..table_slots as u8 {
                segment.tables.push(QuantTableSpec {
                    id,
                    values: *self.quant.values(id)?,
                });
            }
            write_segment(&mut sink, DQT, &segment)?;
        }
        let frame_header = FrameHeader {
            precision: options.precision,
            height: frame.height as u16,
            width: frame.width as u16,
            components: self
                .channels
                .iter()
                .map(|c| FrameComponent {
                    id: c.id,
                    sampling_factor_x: c.sampling_factor_x as u8,
                    sampling_factor_y: c.sampling_factor_y as u8,
                    quant_table: c.quant_table,
                })
                .collect(),
        };
        write_segment(&mut sink, self.process, &frame_header)?;

        let mut huffman = HuffmanTablesSegment::default();
        for slot in 0..table_slots {
            huffman
                .tables
                .push(table_spec(TableClass::Dc, slot, &self.dc_tables[slot])?);
            if !self.lossless {
                huffman
                    .tables
                    .push(table_spec(TableClass::Ac, slot, &self.ac_tables[slot])?);
            }
        }
        write_segment(&mut sink, DHT, &huffman)?;
        if options.restart_interval > 0 {
            write_segment(&mut sink, DRI, &RestartInterval(options.restart_interval))?;
        }

        for scan in &scans {
            let header = ScanHeader {
                components: scan
                    .iter()
                    .map(|&i| ScanComponent {
                        id: self.channels[i].id,
                        dc_table: self.channels[i].dc_table as u8,
                        ac_table: self.channels[i].ac_table as u8,
                    })
                    .collect(),
                spectral_start: if self.lossless { self.predictor as u8 } else { 0 },
                spectral_end: if self.lossless { 0 } else { 63 },
                bit_high: 0,
                bit_low: point_transform as u8,
            };
            write_segment(&mut sink, SOS, &header)?;

            let mut writer = HuffmanWriter {
                bw: BitWriter::new(&mut sink),
                dc_tables: &self.dc_tables,
                ac_tables: &self.ac_tables,
            };
            encode_scan(&mut self.channels, scan, &frame, coding, &mut writer)?;
            writer.bw.reset_out_bits_buffer()?;
        }

        write_marker(&mut sink, EOI)?;
        sink.flush()
    }

    /// Creates the components, with factor 2 on the first one when the others
    /// are subsampled, and fills their padded planes.
    fn prepare_channels(
        &mut self,
        image: &ImageChannels,
        options: &EncodeOptions,
    ) -> Result<FrameGeometry> {
        let components = image.planes.len();
        let subsample = components > 1;
        for i in 0..components {
            let (x, y) = if i == 0 && subsample {
                (
                    1 + options.subsample_x as u32,
                    1 + options.subsample_y as u32,
                )
            } else {
                (1, 1)
            };
            self.channels
                .push(JpegChannel::new(i as u8 + 1, x, y, i.min(1) as u8)?);
        }
        let frame = FrameGeometry::new(
            image.width,
            image.height,
            self.channels
                .iter()
                .map(|c| (c.sampling_factor_x, c.sampling_factor_y)),
            self.lossless,
        )?;
        for (channel, plane) in self.channels.iter_mut().zip(&image.planes) {
            let (size_x, size_y, width, height) =
                frame.channel_size(channel.sampling_factor_x, channel.sampling_factor_y);
            channel.allocate(size_x, size_y, width, height)?;
            fill_channel(channel, plane, &frame);
        }
        self.frame = Some(frame);
        Ok(frame)
    }

    fn prepare_quant_tables(&mut self, quality: u8) -> Result<()> {
        let max_value = if self.precision > 8 { 32767 } else { 255 };
        self.quant.set_table(
            0,
            scale_for_quality(&DEFAULT_LUMINANCE_QUANT, quality, max_value),
        )?;
        if self.channels.len() > 1 {
            self.quant.set_table(
                1,
                scale_for_quality(&DEFAULT_CHROMINANCE_QUANT, quality, max_value),
            )?;
        }
        Ok(())
    }

    /// Replaces the samples of every block by its quantized coefficients.
    fn forward_transform(&mut self) -> Result<()> {
        let precision = self.precision;
        // Keeps DC differences and AC values inside the categories the
        // sequential processes define for this precision.
        let max_coefficient = (1i32 << (precision + 2)) - 1;
        for channel in self.channels.iter_mut() {
            let scales = self.quant.encode_scales(channel.quant_table)?;
            for block_y in 0..channel.blocks_y() {
                for block_x in 0..channel.blocks_x() {
                    let samples = channel.read_block(block_x, block_y);
                    let mut coefficients = forward_dct(&samples, scales, precision);
                    for c in coefficients.iter_mut() {
                        *c = (*c).clamp(-max_coefficient, max_coefficient);
                    }
                    channel.write_block(block_x, block_y, &coefficients);
                }
            }
        }
        Ok(())
    }

    fn load_default_tables(&mut self, table_slots: usize) -> Result<()> {
        let defaults = [
            (&DEFAULT_DC_LUMINANCE, &DEFAULT_AC_LUMINANCE),
            (&DEFAULT_DC_CHROMINANCE, &DEFAULT_AC_CHROMINANCE),
        ];
        for (slot, (dc, ac)) in defaults.iter().enumerate().take(table_slots) {
            self.dc_tables[slot] =
                HuffmanTable::from_counts(HUFFMAN_SYMBOL_BITS, &dc.counts, dc.values)?;
            self.ac_tables[slot] =
                HuffmanTable::from_counts(HUFFMAN_SYMBOL_BITS, &ac.counts, ac.values)?;
        }
        Ok(())
    }

    fn optimize_tables(
        &mut self,
        frame: &FrameGeometry,
        scans: &[Vec<usize>],
        coding: ScanCoding,
        table_slots: usize,
    ) -> Result<()> {
        for slot in 0..table_slots {
            self.dc_tables[slot].reset();
            self.ac_tables[slot].reset();
        }
        let mut counter = FrequencyCounter {
            dc_tables: &mut self.dc_tables,
            ac_tables: &mut self.ac_tables,
        };
        for scan in scans {
            encode_scan(&mut self.channels, scan, frame, coding, &mut counter)?;
        }
        for slot in 0..table_slots {
            build_optimized_table(&mut self.dc_tables[slot])?;
            if !self.lossless {
                build_optimized_table(&mut self.ac_tables[slot])?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use test_log::test;

    use super::*;
    use crate::util::test::{gradient_plane, random_plane};

    #[test]
    fn subsampling_averages_and_pads() -> Result<()> {
        let frame = FrameGeometry::new(3, 2, [(2, 2), (1, 1)].into_iter(), false)?;
        let mut channel = JpegChannel::new(2, 1, 1, 1)?;
        let (size_x, size_y, width, height) = frame.channel_size(1, 1);
        channel.allocate(size_x, size_y, width, height)?;
        let plane = [10, 20, 30, 30, 40, 50];
        fill_channel(&mut channel, &plane, &frame);
        assert_eq!((channel.width, channel.height), (2, 1));
        // (10 + 20 + 30 + 40) / 4 and (30 + 50) / 2.
        assert_eq!(&channel.buffer[..3], &[25, 40, 40]);
        assert!(channel.buffer.chunks_exact(8).all(|row| row == &channel.buffer[..8]));
        Ok(())
    }

    #[test]
    fn frequency_pass_matches_written_symbols() -> Result<()> {
        let image = ImageChannels::new(16, 16, 8, vec![gradient_plane(16, 16, 255)])?;
        let mut codec = JpegCodec::new();
        let mut first = Vec::new();
        codec.encode(&image, &EncodeOptions::default(), &mut first)?;
        // The engine is reusable and deterministic.
        let mut second = Vec::new();
        codec.encode(&image, &EncodeOptions::default(), &mut second)?;
        assert_eq!(first, second);
        assert_eq!(&first[..2], &[0xff, SOI]);
        assert_eq!(&first[first.len() - 2..], &[0xff, EOI]);
        Ok(())
    }

    #[test]
    fn default_tables_are_used_when_they_fit() -> Result<()> {
        let image = ImageChannels::new(8, 8, 8, vec![gradient_plane(8, 8, 255)])?;
        let options = EncodeOptions {
            optimize_huffman: false,
            ..EncodeOptions::default()
        };
        let mut jpeg = Vec::new();
        JpegCodec::new().encode(&image, &options, &mut jpeg)?;
        // The DHT payload starts with the DC luminance counts.
        let dht = jpeg
            .windows(2)
            .position(|w| w == [0xff, DHT])
            .expect("DHT segment");
        assert_eq!(&jpeg[dht + 5..dht + 21], &DEFAULT_DC_LUMINANCE.counts);
        Ok(())
    }

    #[test]
    fn lossless_scan_round_trips_through_the_engine() -> Result<()> {
        let plane = random_plane(11, 6, 255, 9);
        let image = ImageChannels::new(11, 6, 8, vec![plane.clone()])?;
        let mut codec = JpegCodec::new();
        let mut jpeg = Vec::new();
        codec.encode(&image, &EncodeOptions::lossless(Predictor::Plane, 8), &mut jpeg)?;
        // Lossless streams carry no quantization tables.
        assert!(!jpeg.windows(2).any(|w| w == [0xff, DQT]));
        let decoded = codec.decode(&jpeg[..], &crate::api::DecodeOptions::default())?;
        assert_eq!(decoded.channels[0].samples, plane);
        Ok(())
    }

    #[test]
    fn restart_markers_cycle() -> Result<()> {
        let image = ImageChannels::new(80, 8, 8, vec![gradient_plane(80, 8, 255)])?;
        let options = EncodeOptions {
            restart_interval: 1,
            ..EncodeOptions::default()
        };
        let mut jpeg = Vec::new();
        JpegCodec::new().encode(&image, &options, &mut jpeg)?;
        let restarts: Vec<u8> = jpeg
            .windows(2)
            .filter(|w| w[0] == 0xff && (RST0..=RST0 + 7).contains(&w[1]))
            .map(|w| w[1] - RST0)
            .collect();
        assert_eq!(restarts, vec![0, 1, 2, 3, 4, 5, 6, 7, 0]);
        Ok(())
    }
}
