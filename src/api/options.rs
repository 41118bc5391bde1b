// Copyright (c) the medjpeg Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use crate::api::DecoderLimits;
use crate::codec::lossless::Predictor;
use crate::codec::marker::{SOF0, SOF1, SOF2, SOF3};
use crate::error::{Error, Result};

/// The JPEG coding processes this codec handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JpegProcess {
    /// 8-bit sequential DCT (SOF0).
    Baseline,
    /// 8- or 12-bit sequential DCT (SOF1).
    Extended,
    /// Progressive DCT (SOF2). Decoding only.
    Progressive,
    /// Predictive lossless coding (SOF3) of 2 to 16 bit samples.
    Lossless {
        predictor: Predictor,
        point_transform: u8,
    },
}

impl JpegProcess {
    /// The SOF marker that introduces a frame of this process.
    pub fn marker(&self) -> u8 {
        match self {
            JpegProcess::Baseline => SOF0,
            JpegProcess::Extended => SOF1,
            JpegProcess::Progressive => SOF2,
            JpegProcess::Lossless { .. } => SOF3,
        }
    }

    pub fn is_lossless(&self) -> bool {
        matches!(self, JpegProcess::Lossless { .. })
    }

    /// Whether `precision` bits per sample are allowed in this process.
    pub fn supports_precision(&self, precision: u8) -> bool {
        match self {
            JpegProcess::Baseline => precision == 8,
            JpegProcess::Extended | JpegProcess::Progressive => matches!(precision, 8 | 12),
            JpegProcess::Lossless { .. } => (2..=16).contains(&precision),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DecodeOptions {
    pub limits: DecoderLimits,
    /// When set, a frame with a different number of components is rejected.
    pub expected_components: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct EncodeOptions {
    pub process: JpegProcess,
    /// IJG quality, 1..=100. Ignored by the lossless process.
    pub quality: u8,
    /// Bits per sample.
    pub precision: u8,
    /// Halve the resolution of every component but the first.
    pub subsample_x: bool,
    pub subsample_y: bool,
    /// MCUs per restart interval, 0 for none.
    pub restart_interval: u16,
    /// Build Huffman tables from the image statistics instead of using the
    /// ITU example tables. Always done when the example tables cannot code
    /// the data (lossless, 12-bit).
    pub optimize_huffman: bool,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            process: JpegProcess::Baseline,
            quality: 90,
            precision: 8,
            subsample_x: false,
            subsample_y: false,
            restart_interval: 0,
            optimize_huffman: true,
        }
    }
}

impl EncodeOptions {
    pub fn lossless(predictor: Predictor, precision: u8) -> Self {
        Self {
            process: JpegProcess::Lossless {
                predictor,
                point_transform: 0,
            },
            precision,
            ..Self::default()
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if !(1..=100).contains(&self.quality) {
            return Err(Error::InvalidParameter("quality must be in 1..=100"));
        }
        match self.process {
            JpegProcess::Progressive => {
                return Err(Error::InvalidParameter(
                    "progressive encoding is not supported",
                ));
            }
            JpegProcess::Lossless {
                point_transform, ..
            } => {
                if point_transform >= self.precision {
                    return Err(Error::InvalidParameter(
                        "point transform must be smaller than the precision",
                    ));
                }
                if self.subsample_x || self.subsample_y {
                    return Err(Error::InvalidParameter(
                        "lossless encoding does not subsample",
                    ));
                }
            }
            JpegProcess::Baseline | JpegProcess::Extended => {}
        }
        if !self.process.supports_precision(self.precision) {
            return Err(Error::UnsupportedPrecision(self.precision));
        }
        Ok(())
    }
}
