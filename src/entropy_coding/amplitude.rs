// Copyright (c) the medjpeg Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Magnitude categories: a JPEG amplitude is coded as a Huffman-coded bit
//! count followed by that many raw bits.

use std::io::Read;

use crate::bit_reader::BitReader;
use crate::error::{Error, Result};

/// Lossless differences of category 16 carry no extra bits and always mean
/// 32768.
pub const LOSSLESS_FULL_RANGE_CATEGORY: u32 = 16;

/// Number of bits needed to represent `|value|`.
#[inline]
pub fn category(value: i32) -> u32 {
    32 - value.unsigned_abs().leading_zeros()
}

/// Raw bits written after the category: the value itself when positive,
/// its one's complement when negative.
#[inline]
pub fn encode_amplitude(value: i32, category: u32) -> u32 {
    if value >= 0 {
        value as u32
    } else {
        (value - 1) as u32 & ((1u32 << category) - 1)
    }
}

/// Inverse of [`encode_amplitude`].
/// ```
/// # use medjpeg::entropy_coding::amplitude::extend;
/// assert_eq!(extend(0b011, 3), -4);
/// assert_eq!(extend(0b100, 3), 4);
/// assert_eq!(extend(0, 0), 0);
/// ```
#[inline]
pub fn extend(bits: u32, category: u32) -> i32 {
    if category == 0 {
        return 0;
    }
    if bits < 1 << (category - 1) {
        bits as i32 - ((1i32 << category) - 1)
    } else {
        bits as i32
    }
}

/// Reads the raw bits of an amplitude of the given category.
pub fn read_amplitude<R: Read>(br: &mut BitReader<R>, category: u32) -> Result<i32> {
    match category {
        0 => Ok(0),
        LOSSLESS_FULL_RANGE_CATEGORY => Ok(32768),
        1..=15 => Ok(extend(br.read_bits(category)?, category)),
        _ => Err(Error::InvalidHuffmanCode),
    }
}

#[cfg(test)]
mod test {
    use test_log::test;

    use super::*;
    use crate::byte_stream::ByteReader;

    #[test]
    fn categories() {
        assert_eq!(category(0), 0);
        assert_eq!(category(1), 1);
        assert_eq!(category(-1), 1);
        assert_eq!(category(-2), 2);
        assert_eq!(category(255), 8);
        assert_eq!(category(-256), 9);
        assert_eq!(category(32767), 15);
        assert_eq!(category(32768), 16);
    }

    #[test]
    fn extend_inverts_encoding() {
        for value in -2047..=2047 {
            let c = category(value);
            assert_eq!(extend(encode_amplitude(value, c), c), value, "{value}");
        }
    }

    #[test]
    fn full_range_difference_has_no_bits() -> Result<()> {
        assert_eq!(encode_amplitude(-5, 3), 0b010);
        let bytes = [0b0100_0000];

        let mut source = ByteReader::new(&bytes[..]);
        let mut br = BitReader::new(&mut source);
        assert_eq!(read_amplitude(&mut br, 16)?, 32768);
        assert_eq!(read_amplitude(&mut br, 3)?, -5);
        assert!(matches!(
            read_amplitude(&mut br, 17),
            Err(Error::InvalidHuffmanCode)
        ));
        Ok(())
    }
}
