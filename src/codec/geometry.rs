// Copyright (c) the medjpeg Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use crate::error::{Error, Result};

fn div_ceil(value: usize, divisor: usize) -> usize {
    value.div_ceil(divisor)
}

/// Sizes derived from a frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameGeometry {
    pub width: usize,
    pub height: usize,
    pub max_sampling_factor_x: usize,
    pub max_sampling_factor_y: usize,
    /// Image size rounded up to a whole number of MCUs.
    pub jpeg_image_size_x: usize,
    pub jpeg_image_size_y: usize,
    /// 8 for DCT-based processes, 1 for lossless.
    pub unit: usize,
}

impl FrameGeometry {
    pub fn new(
        width: usize,
        height: usize,
        sampling_factors: impl Iterator<Item = (u32, u32)>,
        lossless: bool,
    ) -> Result<FrameGeometry> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidImageSize(width, height));
        }
        let (max_x, max_y) = sampling_factors.fold((1, 1), |(mx, my), (x, y)| {
            (mx.max(x as usize), my.max(y as usize))
        });
        let unit = if lossless { 1 } else { 8 };
        let round_up = |size: usize, factor: usize| div_ceil(size, factor * unit) * factor * unit;
        Ok(FrameGeometry {
            width,
            height,
            max_sampling_factor_x: max_x,
            max_sampling_factor_y: max_y,
            jpeg_image_size_x: round_up(width, max_x),
            jpeg_image_size_y: round_up(height, max_y),
            unit,
        })
    }

    /// Allocated plane size and visible size of a channel with the given
    /// sampling factors: `(size_x, size_y, width, height)`.
    pub fn channel_size(&self, sampling_factor_x: u32, sampling_factor_y: u32) -> (usize, usize, usize, usize) {
        let (sx, sy) = (sampling_factor_x as usize, sampling_factor_y as usize);
        (
            self.jpeg_image_size_x * sx / self.max_sampling_factor_x,
            self.jpeg_image_size_y * sy / self.max_sampling_factor_y,
            div_ceil(self.width * sx, self.max_sampling_factor_x),
            div_ceil(self.height * sy, self.max_sampling_factor_y),
        )
    }
}

/// MCU layout of one scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanLayout {
    pub mcu_number_x: usize,
    pub mcu_number_y: usize,
    /// Blocks per MCU of each scan component, in scan order.
    pub blocks_per_mcu: Vec<(usize, usize)>,
}

impl ScanLayout {
    /// `sampling_factors` lists the scan's components in scan order.
    ///
    /// A single-component scan codes one block per MCU and covers only the
    /// component's visible blocks. In an interleaved scan each component
    /// codes `factor / minimum factor` blocks per MCU in each direction.
    pub fn new(frame: &FrameGeometry, sampling_factors: &[(u32, u32)]) -> ScanLayout {
        let unit = frame.unit;
        if let [(sx, sy)] = *sampling_factors {
            let (_, _, width, height) = frame.channel_size(sx, sy);
            return ScanLayout {
                mcu_number_x: div_ceil(width, unit),
                mcu_number_y: div_ceil(height, unit),
                blocks_per_mcu: vec![(1, 1)],
            };
        }
        let min_x = sampling_factors.iter().map(|f| f.0).min().unwrap_or(1) as usize;
        let min_y = sampling_factors.iter().map(|f| f.1).min().unwrap_or(1) as usize;
        ScanLayout {
            mcu_number_x: frame.jpeg_image_size_x * min_x / (frame.max_sampling_factor_x * unit),
            mcu_number_y: frame.jpeg_image_size_y * min_y / (frame.max_sampling_factor_y * unit),
            blocks_per_mcu: sampling_factors
                .iter()
                .map(|&(sx, sy)| (sx as usize / min_x, sy as usize / min_y))
                .collect(),
        }
    }

    pub fn mcu_number_total(&self) -> u64 {
        self.mcu_number_x as u64 * self.mcu_number_y as u64
    }
}

/// Returns the number of MCUs processed once the restart marker `found`
/// (0..=7) has been read after `mcu_processed` MCUs.
///
/// The marker closes some restart interval; the interval is the one in
/// progress, or a later one when markers were lost with their data, up to
/// seven intervals ahead.
/// ```
/// # use medjpeg::codec::geometry::resync_restart;
/// // Intervals of 4 MCUs, RST0 read after the first interval.
/// assert_eq!(resync_restart(4, 4, 0), 4);
/// // The segment broke off after 2 MCUs: skip to the interval end.
/// assert_eq!(resync_restart(2, 4, 0), 4);
/// // RST1 went missing: RST2 closes the third interval.
/// assert_eq!(resync_restart(4, 4, 2), 12);
/// ```
pub fn resync_restart(mcu_processed: u64, mcu_per_restart: u64, found: u8) -> u64 {
    let mcu_per_restart = mcu_per_restart.max(1) as i64;
    let mcu_processed = mcu_processed as i64;
    let done = (mcu_processed + mcu_per_restart - 1).div_euclid(mcu_per_restart) - 1;
    let expected = done.rem_euclid(8);
    let mut found = found as i64 & 7;
    if found < expected {
        found += 8;
    }
    let done = done - expected + found;
    ((done + 1) * mcu_per_restart) as u64
}

#[cfg(test)]
mod test {
    use test_log::test;

    use super::*;

    #[test]
    fn frame_rounding() -> Result<()> {
        let frame = FrameGeometry::new(17, 9, [(2, 2), (1, 1), (1, 1)].into_iter(), false)?;
        assert_eq!((frame.jpeg_image_size_x, frame.jpeg_image_size_y), (32, 16));
        assert_eq!(frame.channel_size(2, 2), (32, 16, 17, 9));
        assert_eq!(frame.channel_size(1, 1), (16, 8, 9, 5));

        let lossless = FrameGeometry::new(17, 9, [(2, 1), (1, 1)].into_iter(), true)?;
        assert_eq!((lossless.jpeg_image_size_x, lossless.jpeg_image_size_y), (18, 9));
        assert_eq!(lossless.channel_size(1, 1), (9, 9, 9, 9));

        assert!(matches!(
            FrameGeometry::new(0, 9, [(1, 1)].into_iter(), false),
            Err(Error::InvalidImageSize(0, 9))
        ));
        Ok(())
    }

    #[test]
    fn interleaved_layout() -> Result<()> {
        let frame = FrameGeometry::new(17, 9, [(2, 2), (1, 1), (1, 1)].into_iter(), false)?;
        let layout = ScanLayout::new(&frame, &[(2, 2), (1, 1), (1, 1)]);
        assert_eq!((layout.mcu_number_x, layout.mcu_number_y), (2, 1));
        assert_eq!(layout.blocks_per_mcu, vec![(2, 2), (1, 1), (1, 1)]);
        assert_eq!(layout.mcu_number_total(), 2);
        Ok(())
    }

    #[test]
    fn single_component_layout_covers_visible_blocks() -> Result<()> {
        let frame = FrameGeometry::new(17, 9, [(2, 2), (1, 1), (1, 1)].into_iter(), false)?;
        let luma = ScanLayout::new(&frame, &[(2, 2)]);
        assert_eq!((luma.mcu_number_x, luma.mcu_number_y), (3, 2));
        let chroma = ScanLayout::new(&frame, &[(1, 1)]);
        assert_eq!((chroma.mcu_number_x, chroma.mcu_number_y), (2, 1));
        Ok(())
    }

    #[test]
    fn restart_resync() {
        // Marker at the very start: the first interval is lost.
        assert_eq!(resync_restart(0, 5, 0), 5);
        // Markers wrap around after RST7.
        assert_eq!(resync_restart(40, 5, 7), 40);
        assert_eq!(resync_restart(45, 5, 0), 45);
        // Two markers lost past the wrap: expected RST7, found RST1.
        assert_eq!(resync_restart(40, 5, 1), 50);
        // Broken segment in the middle of an interval.
        assert_eq!(resync_restart(43, 5, 0), 45);
    }

    #[test]
    fn skipped_marker_lands_on_true_position() {
        arbtest::arbtest(|u| {
            let mcu_per_restart = u.int_in_range(1..=64u64)?;
            let interval = u.int_in_range(0..=1000u64)?;
            let lost = u.int_in_range(0..=7u64)?;
            // After `interval` complete intervals the decoder should see
            // RST(interval % 8); `lost` markers were dropped with their data.
            let processed = interval * mcu_per_restart;
            let closing = interval + lost;
            let found = ((closing.wrapping_sub(1)) % 8) as u8;
            if interval == 0 {
                return Ok(());
            }
            assert_eq!(
                resync_restart(processed, mcu_per_restart, found),
                (closing) * mcu_per_restart
            );
            Ok(())
        });
    }
}
