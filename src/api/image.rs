// Copyright (c) the medjpeg Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use crate::api::JpegProcess;
use crate::error::{Error, Result};

/// One decoded component, cropped to its real size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedChannel {
    pub id: u8,
    pub sampling_factor_x: u32,
    pub sampling_factor_y: u32,
    pub width: usize,
    pub height: usize,
    pub samples: Vec<i32>,
}

impl DecodedChannel {
    pub fn sample(&self, x: usize, y: usize) -> i32 {
        self.samples[y * self.width + x]
    }

    /// Returns the channel scaled to `width` x `height` by sample
    /// replication. Full-size channels come back unchanged.
    pub fn upsampled(&self, width: usize, height: usize) -> Vec<i32> {
        if width == self.width && height == self.height {
            return self.samples.clone();
        }
        let mut out = Vec::with_capacity(width * height);
        for y in 0..height {
            let row = (y * self.height / height).min(self.height - 1);
            for x in 0..width {
                let column = (x * self.width / width).min(self.width - 1);
                out.push(self.sample(column, row));
            }
        }
        out
    }
}

/// Result of decoding one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub width: usize,
    pub height: usize,
    pub precision: u8,
    pub process: JpegProcess,
    pub channels: Vec<DecodedChannel>,
}

/// Input of the encoder: equally sized planes of `precision`-bit samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageChannels {
    pub width: usize,
    pub height: usize,
    pub precision: u8,
    pub planes: Vec<Vec<i32>>,
}

impl ImageChannels {
    /// Checks that every plane holds `width * height` samples in range.
    /// ```
    /// # use medjpeg::api::ImageChannels;
    /// let image = ImageChannels::new(2, 2, 8, vec![vec![0, 64, 128, 255]])?;
    /// assert_eq!(image.planes.len(), 1);
    /// assert!(ImageChannels::new(2, 2, 8, vec![vec![0, 64, 128]]).is_err());
    /// assert!(ImageChannels::new(2, 2, 8, vec![vec![0, 64, 128, 256]]).is_err());
    /// # Ok::<(), medjpeg::error::Error>(())
    /// ```
    pub fn new(width: usize, height: usize, precision: u8, planes: Vec<Vec<i32>>) -> Result<Self> {
        let image = ImageChannels {
            width,
            height,
            precision,
            planes,
        };
        image.validate()?;
        Ok(image)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 || self.width > 65535 || self.height > 65535 {
            return Err(Error::InvalidImageSize(self.width, self.height));
        }
        if self.planes.is_empty() || self.planes.len() > 255 {
            return Err(Error::InvalidComponentCount(self.planes.len()));
        }
        if !(2..=16).contains(&self.precision) {
            return Err(Error::UnsupportedPrecision(self.precision));
        }
        let max_sample = (1i32 << self.precision) - 1;
        for plane in &self.planes {
            if plane.len() != self.width * self.height {
                return Err(Error::ChannelSizeMismatch(
                    self.width * self.height,
                    plane.len(),
                ));
            }
            if plane.iter().any(|&s| !(0..=max_sample).contains(&s)) {
                return Err(Error::InvalidParameter("sample outside the precision range"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use test_log::test;

    use super::*;

    #[test]
    fn upsampling_replicates() {
        let channel = DecodedChannel {
            id: 2,
            sampling_factor_x: 1,
            sampling_factor_y: 1,
            width: 2,
            height: 1,
            samples: vec![10, 20],
        };
        assert_eq!(channel.upsampled(4, 2), vec![10, 10, 20, 20, 10, 10, 20, 20]);
        // Odd full width: the last column reuses the last sample.
        assert_eq!(channel.upsampled(3, 1), vec![10, 10, 20]);
        assert_eq!(channel.upsampled(2, 1), vec![10, 20]);
    }

    #[test]
    fn image_validation() {
        assert!(matches!(
            ImageChannels::new(0, 4, 8, vec![vec![]]),
            Err(Error::InvalidImageSize(0, 4))
        ));
        assert!(matches!(
            ImageChannels::new(1, 1, 8, vec![]),
            Err(Error::InvalidComponentCount(0))
        ));
        assert!(matches!(
            ImageChannels::new(2, 1, 8, vec![vec![1]]),
            Err(Error::ChannelSizeMismatch(2, 1))
        ));
        assert!(matches!(
            ImageChannels::new(1, 1, 17, vec![vec![1]]),
            Err(Error::UnsupportedPrecision(17))
        ));
    }
}
