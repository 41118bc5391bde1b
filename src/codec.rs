// Copyright (c) the medjpeg Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! The codec engine: table slots, components and the scan state shared by
//! the decoder ([`decode`]) and the encoder ([`encode`]).

use crate::api::DecoderLimits;
use crate::channel::JpegChannel;
use crate::entropy_coding::huffman::HuffmanTable;
use crate::quant::QuantizationTables;

pub mod decode;
pub mod encode;
pub mod geometry;
pub mod lossless;
pub mod marker;
pub mod scan;

use geometry::FrameGeometry;
use lossless::Predictor;
use marker::{Marker, SOF0};

pub const NUM_HUFFMAN_TABLES: usize = 16;

/// Bits of the largest Huffman symbol: AC symbols are bytes, DC and lossless
/// categories stay below 17.
const HUFFMAN_SYMBOL_BITS: u32 = 8;

/// Encoder and decoder for baseline, extended, progressive (decode only) and
/// lossless JPEG.
///
/// One engine handles one image at a time. It can be reused: every call to
/// [`JpegCodec::decode`] or [`JpegCodec::encode`] starts from empty tables.
#[derive(Debug)]
pub struct JpegCodec {
    dc_tables: [HuffmanTable; NUM_HUFFMAN_TABLES],
    ac_tables: [HuffmanTable; NUM_HUFFMAN_TABLES],
    quant: QuantizationTables,

    channels: Vec<JpegChannel>,
    /// Indices into `channels` of the components of the active scan, in
    /// interleave order.
    scan_channels: Vec<usize>,

    frame: Option<FrameGeometry>,
    process: u8,
    precision: u32,
    lossless: bool,
    predictor: Predictor,

    spectral_start: usize,
    spectral_end: usize,
    bit_high: u32,
    bit_low: u32,
    eob_run: u32,

    mcu_per_restart_interval: u32,
    mcu_processed: u64,
    mcu_processed_x: usize,
    mcu_processed_y: usize,
    mcu_last_restart: u64,
    mcu_number_x: usize,
    mcu_number_y: usize,
    mcu_number_total: u64,

    /// A marker read while finishing a scan, handled next by the marker loop.
    pending_marker: Option<Marker>,
    limits: DecoderLimits,
}

impl Default for JpegCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl JpegCodec {
    pub fn new() -> JpegCodec {
        JpegCodec {
            dc_tables: array_init::array_init(|_| HuffmanTable::new(HUFFMAN_SYMBOL_BITS)),
            ac_tables: array_init::array_init(|_| HuffmanTable::new(HUFFMAN_SYMBOL_BITS)),
            quant: QuantizationTables::new(),
            channels: Vec::new(),
            scan_channels: Vec::new(),
            frame: None,
            process: SOF0,
            precision: 8,
            lossless: false,
            predictor: Predictor::West,
            spectral_start: 0,
            spectral_end: 63,
            bit_high: 0,
            bit_low: 0,
            eob_run: 0,
            mcu_per_restart_interval: 0,
            mcu_processed: 0,
            mcu_processed_x: 0,
            mcu_processed_y: 0,
            mcu_last_restart: 0,
            mcu_number_x: 0,
            mcu_number_y: 0,
            mcu_number_total: 0,
            pending_marker: None,
            limits: DecoderLimits::default(),
        }
    }

    /// Drops every table, component and scan state of the previous image.
    pub fn reset(&mut self) {
        self.dc_tables.iter_mut().for_each(HuffmanTable::reset);
        self.ac_tables.iter_mut().for_each(HuffmanTable::reset);
        self.quant.reset();
        self.reset_frame();
        self.mcu_per_restart_interval = 0;
        self.pending_marker = None;
    }

    fn reset_frame(&mut self) {
        self.channels.clear();
        self.scan_channels.clear();
        self.frame = None;
        self.process = SOF0;
        self.precision = 8;
        self.lossless = false;
        self.predictor = Predictor::West;
        self.reset_scan();
    }

    fn reset_scan(&mut self) {
        self.spectral_start = 0;
        self.spectral_end = 63;
        self.bit_high = 0;
        self.bit_low = 0;
        self.eob_run = 0;
        self.set_mcu_processed(0);
        self.mcu_last_restart = 0;
        self.mcu_number_x = 0;
        self.mcu_number_y = 0;
        self.mcu_number_total = 0;
    }

    fn set_mcu_processed(&mut self, processed: u64) {
        self.mcu_processed = processed;
        if self.mcu_number_x > 0 {
            self.mcu_processed_x = (processed % self.mcu_number_x as u64) as usize;
            self.mcu_processed_y = (processed / self.mcu_number_x as u64) as usize;
        } else {
            self.mcu_processed_x = 0;
            self.mcu_processed_y = 0;
        }
    }
}
