// Copyright (c) the medjpeg Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Separable 8x8 DCT using the Arai-Agui-Nakajima factorization.
//!
//! The inverse transform runs entirely in fixed point with
//! [`IDCT_PRECISION`] fractional bits, so decoding is bit-reproducible.
//! Dequantization is folded into [`decode_multipliers`], and the AAN output
//! scaling is folded into both the decode multipliers and the forward
//! [`encode_scales`].

/// Fractional bits of the fixed-point inverse transform.
pub const IDCT_PRECISION: u32 = 14;

/// `cos(k * pi / 16) * sqrt(2)` for k > 0, 1 for k = 0.
#[allow(clippy::excessive_precision)]
pub const AAN_SCALE_FACTORS: [f64; 8] = [
    1.0,
    1.387039845,
    1.306562965,
    1.175875602,
    1.0,
    0.785694958,
    0.541196100,
    0.275899379,
];

// Dequantized coefficients are clamped to this magnitude (in fixed point)
// so that corrupt streams cannot overflow the i64 butterflies.
const MAX_DEQUANTIZED: i64 = 1 << 36;

// round(c * 2^IDCT_PRECISION)
const FIX_1_414213562: i64 = 23170;
const FIX_1_847759065: i64 = 30274;
const FIX_1_082392200: i64 = 17734;
const FIX_2_613125930: i64 = 42813;

#[inline(always)]
fn mul(value: i64, constant: i64) -> i64 {
    (value * constant + (1 << (IDCT_PRECISION - 1))) >> IDCT_PRECISION
}

/// Per-coefficient fixed-point multipliers for a quantization table given
/// in raster order.
pub fn decode_multipliers(quant: &[u16; 64]) -> [i64; 64] {
    array_init::array_init(|i| {
        let scale = AAN_SCALE_FACTORS[i / 8] * AAN_SCALE_FACTORS[i % 8];
        (quant[i] as f64 * scale * (1u64 << IDCT_PRECISION) as f64).round() as i64
    })
}

/// Per-coefficient reciprocals that turn forward transform output into
/// quantized coefficients.
pub fn encode_scales(quant: &[u16; 64]) -> [f32; 64] {
    array_init::array_init(|i| {
        let scale = AAN_SCALE_FACTORS[i / 8] * AAN_SCALE_FACTORS[i % 8];
        (1.0 / (quant[i].max(1) as f64 * scale * 8.0)) as f32
    })
}

// One 8-point inverse butterfly. `data` holds 8 values spaced `stride` apart,
// starting at `start`.
#[inline(always)]
fn idct_1d(data: &mut [i64; 64], start: usize, stride: usize) {
    let at = |k: usize| start + k * stride;

    // Even part.
    let tmp0 = data[at(0)];
    let tmp1 = data[at(2)];
    let tmp2 = data[at(4)];
    let tmp3 = data[at(6)];

    let tmp10 = tmp0 + tmp2;
    let tmp11 = tmp0 - tmp2;
    let tmp13 = tmp1 + tmp3;
    let tmp12 = mul(tmp1 - tmp3, FIX_1_414213562) - tmp13;

    let tmp0 = tmp10 + tmp13;
    let tmp3 = tmp10 - tmp13;
    let tmp1 = tmp11 + tmp12;
    let tmp2 = tmp11 - tmp12;

    // Odd part.
    let tmp4 = data[at(1)];
    let tmp5 = data[at(3)];
    let tmp6 = data[at(5)];
    let tmp7 = data[at(7)];

    let z13 = tmp6 + tmp5;
    let z10 = tmp6 - tmp5;
    let z11 = tmp4 + tmp7;
    let z12 = tmp4 - tmp7;

    let tmp7 = z11 + z13;
    let tmp11 = mul(z11 - z13, FIX_1_414213562);

    let z5 = mul(z10 + z12, FIX_1_847759065);
    let tmp10 = mul(z12, FIX_1_082392200) - z5;
    let tmp12 = z5 - mul(z10, FIX_2_613125930);

    let tmp6 = tmp12 - tmp7;
    let tmp5 = tmp11 - tmp6;
    let tmp4 = tmp10 + tmp5;

    data[at(0)] = tmp0 + tmp7;
    data[at(7)] = tmp0 - tmp7;
    data[at(1)] = tmp1 + tmp6;
    data[at(6)] = tmp1 - tmp6;
    data[at(2)] = tmp2 + tmp5;
    data[at(5)] = tmp2 - tmp5;
    data[at(4)] = tmp3 + tmp4;
    data[at(3)] = tmp3 - tmp4;
}

/// Dequantizes and inverse-transforms one block of raster-ordered
/// coefficients into level-shifted samples clamped to `precision` bits.
#[cfg_attr(feature = "tracing", tracing::instrument(level = "trace", skip_all))]
pub fn inverse_dct(
    coefficients: &[i32; 64],
    multipliers: &[i64; 64],
    precision: u32,
    out: &mut [i32; 64],
) {
    let max_sample = (1i64 << precision) - 1;
    let level_shift = 1i64 << (precision - 1);
    let descale = |value: i64| -> i32 {
        let value = (value + (1 << (IDCT_PRECISION + 2))) >> (IDCT_PRECISION + 3);
        (value + level_shift).clamp(0, max_sample) as i32
    };

    if coefficients[1..].iter().all(|&c| c == 0) {
        let dc = (coefficients[0] as i64 * multipliers[0]).clamp(-MAX_DEQUANTIZED, MAX_DEQUANTIZED);
        out.fill(descale(dc));
        return;
    }

    let mut workspace: [i64; 64] = array_init::array_init(|i| {
        (coefficients[i] as i64 * multipliers[i]).clamp(-MAX_DEQUANTIZED, MAX_DEQUANTIZED)
    });

    for row in 0..8 {
        let start = row * 8;
        if workspace[start + 1..start + 8].iter().all(|&v| v == 0) {
            let dc = workspace[start];
            workspace[start..start + 8].fill(dc);
            continue;
        }
        idct_1d(&mut workspace, start, 1);
    }
    for column in 0..8 {
        idct_1d(&mut workspace, column, 8);
    }

    for (o, &w) in out.iter_mut().zip(workspace.iter()) {
        *o = descale(w);
    }
}

// One 8-point forward butterfly.
#[allow(clippy::excessive_precision)]
#[inline(always)]
fn fdct_1d(data: &mut [f32; 64], start: usize, stride: usize) {
    let at = |k: usize| start + k * stride;

    let tmp0 = data[at(0)] + data[at(7)];
    let tmp7 = data[at(0)] - data[at(7)];
    let tmp1 = data[at(1)] + data[at(6)];
    let tmp6 = data[at(1)] - data[at(6)];
    let tmp2 = data[at(2)] + data[at(5)];
    let tmp5 = data[at(2)] - data[at(5)];
    let tmp3 = data[at(3)] + data[at(4)];
    let tmp4 = data[at(3)] - data[at(4)];

    // Even part.
    let tmp10 = tmp0 + tmp3;
    let tmp13 = tmp0 - tmp3;
    let tmp11 = tmp1 + tmp2;
    let tmp12 = tmp1 - tmp2;

    data[at(0)] = tmp10 + tmp11;
    data[at(4)] = tmp10 - tmp11;

    let z1 = (tmp12 + tmp13) * 0.707106781;
    data[at(2)] = tmp13 + z1;
    data[at(6)] = tmp13 - z1;

    // Odd part.
    let tmp10 = tmp4 + tmp5;
    let tmp11 = tmp5 + tmp6;
    let tmp12 = tmp6 + tmp7;

    let z5 = (tmp10 - tmp12) * 0.382683433;
    let z2 = 0.541196100 * tmp10 + z5;
    let z4 = 1.306562965 * tmp12 + z5;
    let z3 = tmp11 * 0.707106781;

    let z11 = tmp7 + z3;
    let z13 = tmp7 - z3;

    data[at(5)] = z13 + z2;
    data[at(3)] = z13 - z2;
    data[at(1)] = z11 + z4;
    data[at(7)] = z11 - z4;
}

/// Level-shifts and forward-transforms one block of raster-ordered samples,
/// returning quantized coefficients in raster order.
#[cfg_attr(feature = "tracing", tracing::instrument(level = "trace", skip_all))]
pub fn forward_dct(samples: &[i32; 64], scales: &[f32; 64], precision: u32) -> [i32; 64] {
    let level_shift = (1i32 << (precision - 1)) as f32;
    let mut workspace: [f32; 64] = array_init::array_init(|i| samples[i] as f32 - level_shift);

    for row in 0..8 {
        fdct_1d(&mut workspace, row * 8, 1);
    }
    for column in 0..8 {
        fdct_1d(&mut workspace, column, 8);
    }

    array_init::array_init(|i| (workspace[i] * scales[i]).round() as i32)
}

#[cfg(test)]
mod test {
    use std::f64::consts::PI;

    use rand::{Rng, SeedableRng};
    use rand_xorshift::XorShiftRng;
    use test_log::test;

    use super::*;
    use crate::util::test::{assert_all_almost_eq, assert_almost_eq};

    const ONES: [u16; 64] = [1; 64];

    fn reference_dct(samples: &[i32; 64], level_shift: f64) -> [f64; 64] {
        let c = |k: usize| if k == 0 { 1.0 / 2f64.sqrt() } else { 1.0 };
        array_init::array_init(|i| {
            let (u, v) = (i / 8, i % 8);
            let mut sum = 0.0;
            for y in 0..8 {
                for x in 0..8 {
                    sum += (samples[y * 8 + x] as f64 - level_shift)
                        * ((2 * y + 1) as f64 * u as f64 * PI / 16.0).cos()
                        * ((2 * x + 1) as f64 * v as f64 * PI / 16.0).cos();
                }
            }
            sum * c(u) * c(v) / 4.0
        })
    }

    #[test]
    fn forward_matches_reference() {
        let mut rng = XorShiftRng::seed_from_u64(7);
        let samples: [i32; 64] = array_init::array_init(|_| rng.random_range(0..256));
        let expected = reference_dct(&samples, 128.0);
        let got = forward_dct(&samples, &encode_scales(&ONES), 8);
        for i in 0..64 {
            assert_almost_eq!(got[i] as f64, expected[i], 0.51);
        }
    }

    #[test]
    fn round_trip_with_unit_quantization() {
        arbtest::arbtest(|u| {
            let precision = if u.arbitrary::<bool>()? { 8 } else { 12 };
            let max = (1 << precision) - 1;
            let mut samples = [0i32; 64];
            for s in samples.iter_mut() {
                *s = u.int_in_range(0..=max)?;
            }
            let coefficients = forward_dct(&samples, &encode_scales(&ONES), precision);
            let mut out = [0i32; 64];
            inverse_dct(&coefficients, &decode_multipliers(&ONES), precision, &mut out);
            // Rounding the coefficients to integers alone costs up to 2 on
            // rare 8-bit blocks, even with an exact inverse.
            let tolerance = if precision == 8 { 2 } else { 1 };
            assert_all_almost_eq!(out, samples, tolerance);
            Ok(())
        });
    }

    #[test]
    fn round_trip_of_smooth_blocks_is_within_one() {
        for precision in [8, 12] {
            let max = (1i32 << precision) - 1;
            for phase in 0..16 {
                let samples: [i32; 64] = array_init::array_init(|i| {
                    ((i / 8 + i % 8 + phase) as i32 * max / 30).min(max)
                });
                let coefficients = forward_dct(&samples, &encode_scales(&ONES), precision);
                let mut out = [0i32; 64];
                inverse_dct(&coefficients, &decode_multipliers(&ONES), precision, &mut out);
                assert_all_almost_eq!(out, samples, 1);
            }
        }
    }

    #[test]
    fn dc_only_block_is_flat() {
        let mut coefficients = [0i32; 64];
        coefficients[0] = -40;
        let multipliers = decode_multipliers(&[2; 64]);
        let mut out = [0i32; 64];
        inverse_dct(&coefficients, &multipliers, 8, &mut out);
        // -40 * 2 / 8 = -10 below mid-gray.
        assert!(out.iter().all(|&s| s == 118));
    }

    #[test]
    fn dc_shortcut_matches_full_transform() {
        let multipliers = decode_multipliers(&[3; 64]);
        for dc in -300..300 {
            let mut coefficients = [0i32; 64];
            coefficients[0] = dc;
            let mut fast = [0i32; 64];
            inverse_dct(&coefficients, &multipliers, 12, &mut fast);
            // A zero AC coefficient with a tiny neighbor forces the full path
            // without changing any sample noticeably.
            coefficients[63] = 1;
            let mut full = [0i32; 64];
            inverse_dct(&coefficients, &multipliers, 12, &mut full);
            assert_all_almost_eq!(fast, full, 1);
        }
    }

    #[test]
    fn output_is_clamped() {
        let mut coefficients = [0i32; 64];
        coefficients[0] = 30000;
        coefficients[1] = -30000;
        let mut out = [0i32; 64];
        inverse_dct(&coefficients, &decode_multipliers(&[255; 64]), 8, &mut out);
        assert!(out.iter().all(|&s| (0..=255).contains(&s)));
    }

    #[test]
    fn fixed_point_constants() {
        assert_eq!(FIX_1_414213562, 23170);
        assert_eq!(decode_multipliers(&ONES)[0], 1 << IDCT_PRECISION);
    }
}
