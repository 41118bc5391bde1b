// Copyright (c) the medjpeg Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Size limits applied to decoded frames.

use crate::error::{Error, Result};

/// Configurable limits for the decoder.
///
/// The frame header is checked against these limits before any sample
/// buffer is allocated, so a hostile header cannot make the decoder reserve
/// unbounded memory.
///
/// All limits are `None` (unlimited) by default. Use
/// [`DecoderLimits::default_safe()`] for general use, or
/// [`DecoderLimits::restrictive()`] for untrusted content.
///
/// # Example
///
/// ```
/// use medjpeg::api::DecoderLimits;
///
/// // Trusted content.
/// let limits = DecoderLimits::default();
///
/// // General use.
/// let limits = DecoderLimits::default_safe();
///
/// // Untrusted content.
/// let limits = DecoderLimits::restrictive();
/// assert_eq!(limits.max_components, Some(4));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DecoderLimits {
    /// Maximum frame width in samples.
    /// Default: `None` (unlimited).
    pub max_width: Option<usize>,

    /// Maximum frame height in samples.
    /// Default: `None` (unlimited).
    pub max_height: Option<usize>,

    /// Maximum total samples per component (width * height).
    /// Default: `None` (unlimited).
    /// Recommended safe: `1 << 28`.
    pub max_pixels: Option<usize>,

    /// Maximum number of components in a frame.
    /// Default: `None` (unlimited).
    /// Recommended safe: `16`.
    pub max_components: Option<usize>,
}

impl DecoderLimits {
    /// Returns limits with recommended safe defaults.
    pub fn default_safe() -> Self {
        Self {
            max_width: None,
            max_height: None,
            max_pixels: Some(1 << 28),
            max_components: Some(16),
        }
    }

    /// Returns restrictive limits suitable for untrusted content.
    pub fn restrictive() -> Self {
        Self {
            max_width: Some(16384),
            max_height: Some(16384),
            max_pixels: Some(1 << 26),
            max_components: Some(4),
        }
    }

    /// Returns limits with all restrictions disabled.
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// Checks a frame of `width` x `height` with `components` components.
    pub(crate) fn check(&self, width: usize, height: usize, components: usize) -> Result<()> {
        let exceeds = |limit: Option<usize>, value: usize| limit.is_some_and(|max| value > max);
        let pixels = width
            .checked_mul(height)
            .ok_or(Error::ImageSizeTooLarge(width, height))?;
        if exceeds(self.max_width, width)
            || exceeds(self.max_height, height)
            || exceeds(self.max_pixels, pixels)
        {
            return Err(Error::ImageSizeTooLarge(width, height));
        }
        if exceeds(self.max_components, components) {
            return Err(Error::TooManyComponents(components));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use test_log::test;

    use super::*;

    #[test]
    fn unlimited_accepts_everything() {
        assert!(DecoderLimits::unlimited().check(65535, 65535, 255).is_ok());
    }

    #[test]
    fn limits_are_enforced() {
        let limits = DecoderLimits::restrictive();
        assert!(limits.check(4096, 4096, 3).is_ok());
        assert!(matches!(
            limits.check(20000, 10, 1),
            Err(Error::ImageSizeTooLarge(20000, 10))
        ));
        assert!(matches!(
            limits.check(16384, 16384, 1),
            Err(Error::ImageSizeTooLarge(..))
        ));
        assert!(matches!(
            limits.check(16, 16, 5),
            Err(Error::TooManyComponents(5))
        ));
    }
}
