// Copyright (c) the medjpeg Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Predictors of the lossless process (ITU T.81 annex H).

use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

use crate::error::{Error, Result};

#[repr(u8)]
#[derive(Debug, FromPrimitive, Clone, Copy, PartialEq, Eq)]
pub enum Predictor {
    West = 1,
    North = 2,
    NorthWest = 3,
    Plane = 4,
    WestGradient = 5,
    NorthGradient = 6,
    AverageWestAndNorth = 7,
}

impl TryFrom<u8> for Predictor {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        Self::from_u8(value).ok_or(Error::InvalidPredictor(value))
    }
}

impl Predictor {
    pub fn predict_one(&self, west: i32, north: i32, north_west: i32) -> i32 {
        match self {
            Predictor::West => west,
            Predictor::North => north,
            Predictor::NorthWest => north_west,
            Predictor::Plane => west + north - north_west,
            Predictor::WestGradient => west + ((north - north_west) >> 1),
            Predictor::NorthGradient => north + ((west - north_west) >> 1),
            Predictor::AverageWestAndNorth => (west + north) >> 1,
        }
    }
}

/// Which neighbors are available for a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleContext {
    /// First sample of the scan or of a restart interval: no neighbors.
    IntervalStart,
    /// First line of the interval: predicted from the west neighbor.
    FirstRow,
    /// First column of any later line: predicted from the north neighbor.
    FirstColumn,
    /// Everything else uses the scan's predictor.
    Interior,
}

impl SampleContext {
    /// Context of `(x, y)` in an interval that started at
    /// `(interval_x, interval_y)`.
    pub fn of(x: usize, y: usize, interval_x: usize, interval_y: usize) -> SampleContext {
        if x == interval_x && y == interval_y {
            SampleContext::IntervalStart
        } else if y == interval_y {
            SampleContext::FirstRow
        } else if x == 0 {
            SampleContext::FirstColumn
        } else {
            SampleContext::Interior
        }
    }
}

/// Prediction for `(x, y)` of a plane with `stride` samples per line. Every
/// neighbor the context needs must already be reconstructed.
pub fn predict(
    plane: &[i32],
    stride: usize,
    x: usize,
    y: usize,
    context: SampleContext,
    predictor: Predictor,
    default_value: i32,
) -> i32 {
    let at = |x: usize, y: usize| plane[y * stride + x];
    match context {
        SampleContext::IntervalStart => default_value,
        SampleContext::FirstRow if x > 0 => at(x - 1, y),
        SampleContext::FirstRow => default_value,
        SampleContext::FirstColumn => at(x, y - 1),
        SampleContext::Interior => {
            predictor.predict_one(at(x - 1, y), at(x, y - 1), at(x - 1, y - 1))
        }
    }
}

/// Maps a difference into the signed range coded by the entropy coder:
/// differences are taken modulo 2^16, and 32768 is kept positive.
pub fn wrap_difference(difference: i32) -> i32 {
    let wrapped = difference & 0xffff;
    if wrapped > 0x8000 {
        wrapped - 0x10000
    } else {
        wrapped
    }
}

/// Reconstructs a sample from its prediction and coded difference.
pub fn reconstruct(prediction: i32, difference: i32) -> i32 {
    (prediction + difference) & 0xffff
}

#[cfg(test)]
mod test {
    use test_log::test;

    use super::*;

    #[test]
    fn predictor_indices() {
        assert_eq!(Predictor::try_from(1).unwrap(), Predictor::West);
        assert_eq!(Predictor::try_from(7).unwrap(), Predictor::AverageWestAndNorth);
        assert!(matches!(Predictor::try_from(0), Err(Error::InvalidPredictor(0))));
        assert!(matches!(Predictor::try_from(8), Err(Error::InvalidPredictor(8))));
    }

    #[test]
    fn predictor_formulas() {
        let (a, b, c) = (100, 60, 90);
        assert_eq!(Predictor::West.predict_one(a, b, c), 100);
        assert_eq!(Predictor::North.predict_one(a, b, c), 60);
        assert_eq!(Predictor::NorthWest.predict_one(a, b, c), 90);
        assert_eq!(Predictor::Plane.predict_one(a, b, c), 70);
        assert_eq!(Predictor::WestGradient.predict_one(a, b, c), 85);
        assert_eq!(Predictor::NorthGradient.predict_one(a, b, c), 65);
        assert_eq!(Predictor::AverageWestAndNorth.predict_one(a, b, c), 80);
    }

    #[test]
    fn contexts() {
        assert_eq!(SampleContext::of(0, 4, 0, 4), SampleContext::IntervalStart);
        assert_eq!(SampleContext::of(3, 4, 0, 4), SampleContext::FirstRow);
        assert_eq!(SampleContext::of(0, 5, 0, 4), SampleContext::FirstColumn);
        assert_eq!(SampleContext::of(2, 5, 0, 4), SampleContext::Interior);
    }

    #[test]
    fn differences_wrap() {
        assert_eq!(wrap_difference(-1), -1);
        assert_eq!(wrap_difference(32768), 32768);
        assert_eq!(wrap_difference(-32768), 32768);
        assert_eq!(wrap_difference(65535), -1);
        for sample in [0, 1, 4095, 65535] {
            for prediction in [0, 32768, 65535] {
                let difference = wrap_difference(sample - prediction);
                assert_eq!(reconstruct(prediction, difference), sample);
            }
        }
    }
}
