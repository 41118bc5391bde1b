// Copyright (c) the medjpeg Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use num_traits::Num;

pub fn abs_delta<T: Num + std::cmp::PartialOrd>(left_val: T, right_val: T) -> T {
    if left_val > right_val {
        left_val - right_val
    } else {
        right_val - left_val
    }
}

macro_rules! assert_almost_eq {
    ($left:expr, $right:expr, $max_error:expr $(,)?) => {
        let (left_val, right_val, max_error) = (&$left, &$right, &$max_error);
        match $crate::util::test::abs_delta(*left_val, *right_val).partial_cmp(max_error) {
            Some(std::cmp::Ordering::Greater) | None => panic!(
                "assertion failed: `(left ≈ right)`\n  left: `{:?}`,\n right: `{:?}`,\n max_error: `{:?}`",
                left_val, right_val, max_error
            ),
            _ => {}
        }
    };
}
#[allow(unused_imports)]
pub(crate) use assert_almost_eq;

macro_rules! assert_all_almost_eq {
    ($left:expr, $right:expr, $max_error:expr $(,)?) => {
        let (left_val, right_val, max_error) = (&$left, &$right, &$max_error);
        if left_val.len() != right_val.len() {
            panic!("assertion failed: `(left ≈ right)`\n left.len(): `{}`,\n right.len(): `{}`", left_val.len(), right_val.len());
        }
        for index in 0..left_val.len() {
            match $crate::util::test::abs_delta(left_val[index], right_val[index]).partial_cmp(max_error) {
                Some(std::cmp::Ordering::Greater) | None =>  panic!(
                    "assertion failed: `(left ≈ right)`\n left: `{:?}`,\n right: `{:?}`,\n max_error: `{:?}`,\n left[{}]: `{}`,\n right[{}]: `{}`",
                    left_val, right_val, max_error, index, left_val[index], index, right_val[index]
                ),
                _ => {}
            }
        }
    };
}
pub(crate) use assert_all_almost_eq;

/// Deterministic pseudo-random plane with samples in `0..=max_value`.
pub fn random_plane(width: usize, height: usize, max_value: i32, seed: u64) -> Vec<i32> {
    use rand::{Rng, SeedableRng};
    let mut rng = rand_xorshift::XorShiftRng::seed_from_u64(seed);
    (0..width * height)
        .map(|_| rng.random_range(0..=max_value))
        .collect()
}

/// A smooth gradient plane: well suited to lossy round trips, where noise
/// would be dominated by quantization error.
pub fn gradient_plane(width: usize, height: usize, max_value: i32) -> Vec<i32> {
    let span = (width + height).max(2) as i32 - 2;
    (0..height)
        .flat_map(|y| (0..width).map(move |x| ((x + y) as i32 * max_value) / span.max(1)))
        .collect()
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_with_floats() {
        assert_almost_eq!(1.0000001f64, 1.0000002, 0.000001);
        assert_almost_eq!(1.0, 1.1, 0.2);
    }

    #[test]
    fn test_with_integers() {
        assert_almost_eq!(100, 101, 2);
        assert_almost_eq!(777u32, 770, 7);
        assert_almost_eq!(500i64, 498, 3);
    }

    #[test]
    #[should_panic]
    fn test_panic_integer() {
        assert_almost_eq!(100, 105, 2);
    }

    #[test]
    fn test_slices() {
        assert_all_almost_eq!([1i32, 2, 3], [2i32, 2, 2], 1);
    }

    #[test]
    fn gradient_stays_in_range() {
        let plane = super::gradient_plane(9, 7, 255);
        assert!(plane.iter().all(|&v| (0..=255).contains(&v)));
        assert_eq!(plane[0], 0);
        assert_eq!(plane[plane.len() - 1], 255);
    }
}
