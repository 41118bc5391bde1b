// Copyright (c) the medjpeg Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use crate::codec::lossless::{predict, reconstruct, Predictor, SampleContext};
use crate::error::{Error, Result};

/// Differences kept back before they are applied to the plane.
pub const LOSSLESS_QUEUE_LENGTH: usize = 16;

#[derive(Debug, Clone, Copy)]
struct PendingAmplitude {
    x: usize,
    y: usize,
    amplitude: i32,
}

/// One image component: sampling factors, the plane of samples (or of
/// coefficients during a progressive decode) and the predictor state of the
/// active scan.
#[derive(Debug, Clone)]
pub struct JpegChannel {
    pub id: u8,
    pub sampling_factor_x: u32,
    pub sampling_factor_y: u32,
    pub quant_table: u8,

    /// Allocated plane size, a whole number of MCUs.
    pub size_x: usize,
    pub size_y: usize,
    /// Part of the plane covered by the image.
    pub width: usize,
    pub height: usize,
    pub buffer: Vec<i32>,

    /// Indices into the codec's Huffman table slots.
    pub dc_table: usize,
    pub ac_table: usize,

    /// Blocks (or samples, when lossless) per MCU in the active scan.
    pub blocks_per_mcu_x: usize,
    pub blocks_per_mcu_y: usize,

    pub last_dc_value: i32,
    pub default_dc_value: i32,
    pub point_transform: u32,

    lossless_interval_x: usize,
    lossless_interval_y: usize,
    pending: Vec<PendingAmplitude>,
    pending_context: Option<SampleContext>,
}

impl JpegChannel {
    pub fn new(
        id: u8,
        sampling_factor_x: u32,
        sampling_factor_y: u32,
        quant_table: u8,
    ) -> Result<JpegChannel> {
        let valid = |f: u32| matches!(f, 1 | 2 | 4);
        if !valid(sampling_factor_x) || !valid(sampling_factor_y) {
            return Err(Error::InvalidSamplingFactor(
                sampling_factor_x as u8,
                sampling_factor_y as u8,
            ));
        }
        Ok(JpegChannel {
            id,
            sampling_factor_x,
            sampling_factor_y,
            quant_table,
            size_x: 0,
            size_y: 0,
            width: 0,
            height: 0,
            buffer: Vec::new(),
            dc_table: 0,
            ac_table: 0,
            blocks_per_mcu_x: 1,
            blocks_per_mcu_y: 1,
            last_dc_value: 0,
            default_dc_value: 0,
            point_transform: 0,
            lossless_interval_x: 0,
            lossless_interval_y: 0,
            pending: Vec::with_capacity(LOSSLESS_QUEUE_LENGTH),
            pending_context: None,
        })
    }

    /// Allocates a zeroed plane of `size_x * size_y` samples.
    pub fn allocate(
        &mut self,
        size_x: usize,
        size_y: usize,
        width: usize,
        height: usize,
    ) -> Result<()> {
        let len = size_x
            .checked_mul(size_y)
            .ok_or(Error::ArithmeticOverflow)?;
        let mut buffer = Vec::new();
        buffer.try_reserve_exact(len)?;
        buffer.resize(len, 0);
        self.buffer = buffer;
        self.size_x = size_x;
        self.size_y = size_y;
        self.width = width.min(size_x);
        self.height = height.min(size_y);
        Ok(())
    }

    pub fn blocks_x(&self) -> usize {
        self.size_x / 8
    }

    pub fn blocks_y(&self) -> usize {
        self.size_y / 8
    }

    /// Resets the predictor to its default, as at the start of a scan or
    /// after a restart marker.
    pub fn reset_dc(&mut self) {
        self.last_dc_value = self.default_dc_value;
    }

    /// Copies the 8x8 area of block `(block_x, block_y)` out of the plane.
    pub fn read_block(&self, block_x: usize, block_y: usize) -> [i32; 64] {
        let mut block = [0i32; 64];
        let origin = block_y * 8 * self.size_x + block_x * 8;
        for (row, out) in block.chunks_exact_mut(8).enumerate() {
            let start = origin + row * self.size_x;
            out.copy_from_slice(&self.buffer[start..start + 8]);
        }
        block
    }

    /// Stores `block` into the 8x8 area of block `(block_x, block_y)`.
    pub fn write_block(&mut self, block_x: usize, block_y: usize, block: &[i32; 64]) {
        let origin = block_y * 8 * self.size_x + block_x * 8;
        for (row, values) in block.chunks_exact(8).enumerate() {
            let start = origin + row * self.size_x;
            self.buffer[start..start + 8].copy_from_slice(values);
        }
    }

    /// Marks `(x, y)` as the first sample of a lossless interval.
    pub fn start_lossless_interval(&mut self, x: usize, y: usize) {
        debug_assert!(self.pending.is_empty());
        self.lossless_interval_x = x;
        self.lossless_interval_y = y;
    }

    pub fn lossless_context(&self, x: usize, y: usize) -> SampleContext {
        SampleContext::of(x, y, self.lossless_interval_x, self.lossless_interval_y)
    }

    /// Queues the difference decoded for sample `(x, y)`. Samples must be
    /// queued in coding order.
    pub fn queue_lossless_amplitude(
        &mut self,
        x: usize,
        y: usize,
        amplitude: i32,
        predictor: Predictor,
    ) {
        let context = self.lossless_context(x, y);
        if self.pending_context != Some(context) || self.pending.len() == LOSSLESS_QUEUE_LENGTH {
            self.flush_lossless(predictor);
            self.pending_context = Some(context);
        }
        self.pending.push(PendingAmplitude { x, y, amplitude });
    }

    /// Applies every queued difference to the plane.
    pub fn flush_lossless(&mut self, predictor: Predictor) {
        let Some(context) = self.pending_context.take() else {
            return;
        };
        for i in 0..self.pending.len() {
            let PendingAmplitude { x, y, amplitude } = self.pending[i];
            let prediction = predict(
                &self.buffer,
                self.size_x,
                x,
                y,
                context,
                predictor,
                self.default_dc_value,
            );
            self.buffer[y * self.size_x + x] = reconstruct(prediction, amplitude);
        }
        self.pending.clear();
    }
}

#[cfg(test)]
mod test {
    use test_log::test;

    use super::*;

    #[test]
    fn sampling_factors_are_validated() {
        assert!(JpegChannel::new(1, 2, 1, 0).is_ok());
        assert!(matches!(
            JpegChannel::new(1, 3, 1, 0),
            Err(Error::InvalidSamplingFactor(3, 1))
        ));
        assert!(JpegChannel::new(1, 1, 0, 0).is_err());
    }

    #[test]
    fn blocks_round_trip() -> Result<()> {
        let mut channel = JpegChannel::new(1, 1, 1, 0)?;
        channel.allocate(16, 16, 13, 9)?;
        assert_eq!((channel.width, channel.height), (13, 9));
        let block: [i32; 64] = array_init::array_init(|i| i as i32);
        channel.write_block(1, 1, &block);
        assert_eq!(channel.read_block(1, 1), block);
        assert_eq!(channel.buffer[8 * 16 + 8], 0);
        assert_eq!(channel.buffer[15 * 16 + 15], 63);
        assert_eq!(channel.read_block(0, 0), [0; 64]);
        Ok(())
    }

    #[test]
    fn queued_amplitudes_reconstruct_in_order() -> Result<()> {
        let mut channel = JpegChannel::new(1, 1, 1, 0)?;
        channel.allocate(4, 2, 4, 2)?;
        channel.default_dc_value = 128;
        channel.start_lossless_interval(0, 0);
        let differences = [2, 1, 1, 1, -10, 3, 0, 0];
        for (i, &d) in differences.iter().enumerate() {
            channel.queue_lossless_amplitude(i % 4, i / 4, d, Predictor::Plane);
        }
        channel.flush_lossless(Predictor::Plane);
        // Row 0 predicts from the west, column 0 from the north, the rest
        // with the plane predictor.
        assert_eq!(channel.buffer, vec![130, 131, 132, 133, 120, 124, 125, 126]);
        Ok(())
    }
}
