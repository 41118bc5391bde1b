// Copyright (c) the medjpeg Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Marker-driven decoding.

use std::io::Read;

use crate::api::{DecodeOptions, DecodedChannel, DecodedImage, JpegProcess};
use crate::bit_reader::BitReader;
use crate::byte_stream::ByteReader;
use crate::channel::JpegChannel;
use crate::codec::geometry::{resync_restart, FrameGeometry, ScanLayout};
use crate::codec::lossless::Predictor;
use crate::codec::marker::*;
use crate::codec::scan::{
    decode_ac_first, decode_ac_refine, decode_block, decode_dc_first, decode_dc_refine,
    decode_difference,
};
use crate::codec::{JpegCodec, HUFFMAN_SYMBOL_BITS};
use crate::dct::inverse_dct;
use crate::entropy_coding::huffman::HuffmanTable;
use crate::error::{Error, Result};
use crate::util::tracing_wrappers::*;

impl JpegCodec {
    /// Decodes one image, from SOI to EOI.
    #[cfg_attr(feature = "tracing", tracing::instrument(level = "debug", skip_all))]
    #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
    pub fn decode<R: Read>(&mut self, reader: R, options: &DecodeOptions) -> Result<DecodedImage> {
        self.reset();
        self.limits = options.limits.clone();
        let mut source = ByteReader::new(reader);

        if source.read_u8()? != 0xff || source.read_u8()? != SOI {
            return Err(Error::MissingSoi);
        }

        loop {
            let marker = match self.pending_marker.take() {
                Some(marker) => marker,
                None => read_next_marker(&mut source)?,
            };
            debug!(?marker, position = source.position(), "marker");
            match marker {
                Marker::Soi => self.reset(),
                Marker::Eoi => break,
                Marker::Sof(process) => {
                    self.read_frame(&mut source, process)?;
                    if let Some(expected) = options.expected_components {
                        if expected != self.channels.len() {
                            return Err(Error::ComponentCountMismatch(
                                expected,
                                self.channels.len(),
                            ));
                        }
                    }
                }
                Marker::Dht => self.read_huffman_tables(&mut source)?,
                Marker::Dqt => self.read_quant_tables(&mut source)?,
                Marker::Dri => {
                    let RestartInterval(interval) = read_segment(&mut source, DRI)?;
                    self.mcu_per_restart_interval = interval as u32;
                }
                Marker::Sos => {
                    self.read_scan_header(&mut source)?;
                    self.decode_scan(&mut source)?;
                }
                Marker::Rst(n) => trace!(n, "restart marker outside a scan"),
                Marker::Unsupported(id) => return Err(Error::UnsupportedProcess(id)),
                Marker::Standalone(_) => {}
                Marker::Other(id) => {
                    trace!(id, "skipping segment");
                    skip_segment(&mut source, id)?;
                }
            }
        }

        self.finish()
    }

    fn read_frame<R: Read>(&mut self, source: &mut ByteReader<R>, process: u8) -> Result<()> {
        let header: FrameHeader = read_segment(source, process)?;
        self.reset_frame();

        let lossless = process == SOF3;
        let valid_precision = match process {
            SOF0 => header.precision == 8,
            SOF1 | SOF2 => matches!(header.precision, 8 | 12),
            _ => (2..=16).contains(&header.precision),
        };
        if !valid_precision {
            return Err(Error::UnsupportedPrecision(header.precision));
        }
        let (width, height) = (header.width as usize, header.height as usize);
        if header.components.is_empty() {
            return Err(Error::InvalidComponentCount(0));
        }
        self.limits.check(width, height, header.components.len())?;

        let mut channels = Vec::with_capacity(header.components.len());
        for component in &header.components {
            channels.push(JpegChannel::new(
                component.id,
                component.sampling_factor_x as u32,
                component.sampling_factor_y as u32,
                component.quant_table,
            )?);
        }
        let frame = FrameGeometry::new(
            width,
            height,
            channels
                .iter()
                .map(|c| (c.sampling_factor_x, c.sampling_factor_y)),
            lossless,
        )?;
        for channel in channels.iter_mut() {
            let (size_x, size_y, width, height) =
                frame.channel_size(channel.sampling_factor_x, channel.sampling_factor_y);
            channel.allocate(size_x, size_y, width, height)?;
        }
        debug!(
            width,
            height,
            precision = header.precision,
            components = channels.len(),
            jpeg_width = frame.jpeg_image_size_x,
            jpeg_height = frame.jpeg_image_size_y,
            "frame"
        );

        self.channels = channels;
        self.frame = Some(frame);
        self.process = process;
        self.precision = header.precision as u32;
        self.lossless = lossless;
        Ok(())
    }

    fn read_huffman_tables<R: Read>(&mut self, source: &mut ByteReader<R>) -> Result<()> {
        let segment: HuffmanTablesSegment = read_segment(source, DHT)?;
        for spec in segment.tables {
            let slots = match spec.class {
                TableClass::Dc => &mut self.dc_tables,
                TableClass::Ac => &mut self.ac_tables,
            };
            let slot = slots
                .get_mut(spec.id as usize)
                .ok_or(Error::InvalidHuffmanTable(spec.class as u8, spec.id))?;
            *slot = HuffmanTable::from_counts(HUFFMAN_SYMBOL_BITS, &spec.counts, &spec.values)?;
            trace!(class = ?spec.class, id = spec.id, symbols = spec.values.len(), "huffman table");
        }
        Ok(())
    }

    fn read_quant_tables<R: Read>(&mut self, source: &mut ByteReader<R>) -> Result<()> {
        let segment: QuantTablesSegment = read_segment(source, DQT)?;
        for table in segment.tables {
            self.quant.set_table(table.id, table.values)?;
        }
        Ok(())
    }

    fn read_scan_header<R: Read>(&mut self, source: &mut ByteReader<R>) -> Result<()> {
        let frame = self.frame.ok_or(Error::ScanBeforeFrame)?;
        let header: ScanHeader = read_segment(source, SOS)?;
        if header.components.is_empty() || header.components.len() > 4 {
            return Err(Error::InvalidComponentCount(header.components.len()));
        }
        let invalid = || {
            Error::InvalidScanParameters(
                header.spectral_start,
                header.spectral_end,
                header.bit_high,
                header.bit_low,
            )
        };

        self.reset_scan();
        self.scan_channels.clear();
        for component in &header.components {
            let index = self
                .channels
                .iter()
                .position(|c| c.id == component.id)
                .ok_or(Error::UnknownComponent(component.id))?;
            self.scan_channels.push(index);
        }

        if self.lossless {
            self.predictor = Predictor::try_from(header.spectral_start)?;
            if header.bit_low as u32 >= self.precision {
                return Err(invalid());
            }
        } else if self.process == SOF2 {
            let (ss, se) = (header.spectral_start, header.spectral_end);
            let dc_scan = ss == 0 && se == 0;
            let ac_scan = ss > 0 && ss <= se && se <= 63 && header.components.len() == 1;
            if !(dc_scan || ac_scan) || header.bit_low > 13 {
                return Err(invalid());
            }
            self.spectral_start = ss as usize;
            self.spectral_end = se as usize;
            self.bit_high = header.bit_high as u32;
            self.bit_low = header.bit_low as u32;
        }

        let default_dc_value = if self.lossless {
            1 << (self.precision - header.bit_low as u32 - 1)
        } else {
            0
        };
        for (component, &index) in header.components.iter().zip(&self.scan_channels) {
            let channel = &mut self.channels[index];
            channel.dc_table = component.dc_table as usize;
            channel.ac_table = component.ac_table as usize;
            channel.default_dc_value = default_dc_value;
            if self.lossless {
                channel.point_transform = header.bit_low as u32;
            }
            channel.reset_dc();
        }
        self.check_scan_tables()?;

        let factors: Vec<(u32, u32)> = self
            .scan_channels
            .iter()
            .map(|&i| {
                let channel = &self.channels[i];
                (channel.sampling_factor_x, channel.sampling_factor_y)
            })
            .collect();
        let layout = ScanLayout::new(&frame, &factors);
        for (&index, &(x, y)) in self.scan_channels.iter().zip(&layout.blocks_per_mcu) {
            let channel = &mut self.channels[index];
            channel.blocks_per_mcu_x = x;
            channel.blocks_per_mcu_y = y;
            if self.lossless {
                channel.start_lossless_interval(0, 0);
            }
        }
        self.mcu_number_x = layout.mcu_number_x;
        self.mcu_number_y = layout.mcu_number_y;
        self.mcu_number_total = layout.mcu_number_total();
        self.set_mcu_processed(0);

        debug!(
            components = self.scan_channels.len(),
            ss = header.spectral_start,
            se = header.spectral_end,
            ah = header.bit_high,
            al = header.bit_low,
            mcus_x = self.mcu_number_x,
            mcus_y = self.mcu_number_y,
            "scan"
        );
        Ok(())
    }

    /// Fails when a Huffman table the active scan codes with is undefined.
    fn check_scan_tables(&self) -> Result<()> {
        let progressive = self.process == SOF2;
        let needs_dc = !progressive || (self.spectral_start == 0 && self.bit_high == 0);
        let needs_ac = !self.lossless && (!progressive || self.spectral_start > 0);
        for &index in &self.scan_channels {
            let channel = &self.channels[index];
            if needs_dc && self.dc_tables[channel.dc_table].is_empty() {
                return Err(Error::UndefinedHuffmanTable(channel.dc_table as u8));
            }
            if needs_ac && self.ac_tables[channel.ac_table].is_empty() {
                return Err(Error::UndefinedHuffmanTable(channel.ac_table as u8));
            }
        }
        Ok(())
    }

    /// Decodes entropy-coded segments until the scan is complete or a marker
    /// other than RSTn shows up.
    #[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
    fn decode_scan<R: Read>(&mut self, source: &mut ByteReader<R>) -> Result<()> {
        loop {
            match self.decode_interval(source) {
                Ok(()) => {}
                Err(Error::MarkerInData(id)) => {
                    debug!(
                        id,
                        mcu = self.mcu_processed,
                        "entropy-coded segment interrupted by a marker"
                    );
                }
                Err(err) => return Err(err),
            }
            if self.lossless {
                self.flush_lossless();
            }
            if self.mcu_processed >= self.mcu_number_total {
                return Ok(());
            }
            match read_next_marker(source)? {
                Marker::Rst(n) => self.restart(n),
                marker => {
                    warn!(
                        ?marker,
                        decoded = self.mcu_processed,
                        total = self.mcu_number_total,
                        "scan ended before all MCUs were decoded"
                    );
                    self.pending_marker = Some(marker);
                    return Ok(());
                }
            }
        }
    }

    fn interval_end(&self) -> u64 {
        if self.mcu_per_restart_interval == 0 {
            return self.mcu_number_total;
        }
        (self.mcu_last_restart + self.mcu_per_restart_interval as u64).min(self.mcu_number_total)
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(level = "trace", skip_all))]
    fn decode_interval<R: Read>(&mut self, source: &mut ByteReader<R>) -> Result<()> {
        let mut br = BitReader::new(source);
        let end = self.interval_end();
        while self.mcu_processed < end {
            self.decode_mcu(&mut br)?;
            self.set_mcu_processed(self.mcu_processed + 1);
        }
        Ok(())
    }

    fn decode_mcu<R: Read>(&mut self, br: &mut BitReader<R>) -> Result<()> {
        let (mcu_x, mcu_y) = (self.mcu_processed_x, self.mcu_processed_y);
        let progressive = self.process == SOF2;
        let precision = self.precision;
        for &index in &self.scan_channels {
            let channel = &mut self.channels[index];
            let dc = &self.dc_tables[channel.dc_table];
            let ac = &self.ac_tables[channel.ac_table];
            for block_y in 0..channel.blocks_per_mcu_y {
                for block_x in 0..channel.blocks_per_mcu_x {
                    let x = mcu_x * channel.blocks_per_mcu_x + block_x;
                    let y = mcu_y * channel.blocks_per_mcu_y + block_y;

                    if self.lossless {
                        let difference = decode_difference(br, dc)?;
                        channel.queue_lossless_amplitude(x, y, difference, self.predictor);
                        continue;
                    }

                    if !progressive {
                        let mut coefficients = [0i32; 64];
                        decode_block(br, dc, ac, &mut channel.last_dc_value, &mut coefficients)?;
                        let mut samples = [0i32; 64];
                        inverse_dct(
                            &coefficients,
                            self.quant.decode_multipliers(channel.quant_table)?,
                            precision,
                            &mut samples,
                        );
                        channel.write_block(x, y, &samples);
                        continue;
                    }

                    let mut coefficients = channel.read_block(x, y);
                    match (self.spectral_start, self.bit_high) {
                        (0, 0) => decode_dc_first(
                            br,
                            dc,
                            &mut channel.last_dc_value,
                            self.bit_low,
                            &mut coefficients,
                        )?,
                        (0, _) => decode_dc_refine(br, self.bit_low, &mut coefficients)?,
                        (_, 0) => decode_ac_first(
                            br,
                            ac,
                            self.spectral_start,
                            self.spectral_end,
                            self.bit_low,
                            &mut self.eob_run,
                            &mut coefficients,
                        )?,
                        _ => decode_ac_refine(
                            br,
                            ac,
                            self.spectral_start,
                            self.spectral_end,
                            self.bit_low,
                            &mut self.eob_run,
                            &mut coefficients,
                        )?,
                    }
                    channel.write_block(x, y, &coefficients);
                }
            }
        }
        Ok(())
    }

    fn flush_lossless(&mut self) {
        for &index in &self.scan_channels {
            self.channels[index].flush_lossless(self.predictor);
        }
    }

    /// Handles RSTn inside a scan: finds the MCU the marker belongs to and
    /// resets the predictors.
    fn restart(&mut self, n: u8) {
        if self.mcu_per_restart_interval == 0 {
            warn!(n, "restart marker without a restart interval");
        } else {
            let interval = self.mcu_per_restart_interval as u64;
            let expected = self.mcu_processed.div_ceil(interval).max(1) * interval;
            let processed = resync_restart(self.mcu_processed, interval, n);
            if processed != expected {
                warn!(
                    n,
                    mcu = self.mcu_processed,
                    resynced = processed,
                    "restart markers missing, resynchronizing"
                );
            } else {
                debug!(n, mcu = processed, "restart");
            }
            let processed = processed.min(self.mcu_number_total);
            self.set_mcu_processed(processed);
            self.mcu_last_restart = processed;
        }

        self.eob_run = 0;
        let (mcu_x, mcu_y) = (self.mcu_processed_x, self.mcu_processed_y);
        for &index in &self.scan_channels {
            let channel = &mut self.channels[index];
            channel.reset_dc();
            if self.lossless {
                channel.start_lossless_interval(
                    mcu_x * channel.blocks_per_mcu_x,
                    mcu_y * channel.blocks_per_mcu_y,
                );
            }
        }
    }

    /// Completes the samples after EOI and hands them out.
    fn finish(&mut self) -> Result<DecodedImage> {
        let frame = self.frame.ok_or(Error::MissingFrame)?;
        if self.process == SOF2 {
            self.inverse_transform_coefficients()?;
        }
        if self.lossless {
            for channel in self.channels.iter_mut() {
                let shift = channel.point_transform;
                channel.buffer.iter_mut().for_each(|s| *s <<= shift);
            }
        }

        let process = match self.process {
            SOF0 => JpegProcess::Baseline,
            SOF1 => JpegProcess::Extended,
            SOF2 => JpegProcess::Progressive,
            _ => JpegProcess::Lossless {
                predictor: self.predictor,
                point_transform: self.channels.first().map_or(0, |c| c.point_transform as u8),
            },
        };
        let channels = std::mem::take(&mut self.channels)
            .into_iter()
            .map(|channel| {
                let mut samples = Vec::with_capacity(channel.width * channel.height);
                for row in channel.buffer.chunks_exact(channel.size_x).take(channel.height) {
                    samples.extend_from_slice(&row[..channel.width]);
                }
                DecodedChannel {
                    id: channel.id,
                    sampling_factor_x: channel.sampling_factor_x,
                    sampling_factor_y: channel.sampling_factor_y,
                    width: channel.width,
                    height: channel.height,
                    samples,
                }
            })
            .collect();
        Ok(DecodedImage {
            width: frame.width,
            height: frame.height,
            precision: self.precision as u8,
            process,
            channels,
        })
    }

    /// Runs the inverse transform over the coefficients a progressive decode
    /// accumulated.
    fn inverse_transform_coefficients(&mut self) -> Result<()> {
        for channel in self.channels.iter_mut() {
            let multipliers = self.quant.decode_multipliers(channel.quant_table)?;
            for block_y in 0..channel.blocks_y() {
                for block_x in 0..channel.blocks_x() {
                    let coefficients = channel.read_block(block_x, block_y);
                    let mut samples = [0i32; 64];
                    inverse_dct(&coefficients, multipliers, self.precision, &mut samples);
                    channel.write_block(block_x, block_y, &samples);
                }
            }
        }
        Ok(())
    }
}
