// Copyright (c) the medjpeg Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! The two operations offered to the dataset layer: decode a JPEG stream
//! into component planes, and encode component planes into a JPEG stream.

use std::io::{Read, Write};

use crate::codec::JpegCodec;
use crate::error::Result;

mod image;
mod limits;
mod options;

pub use crate::codec::lossless::Predictor;
pub use image::*;
pub use limits::*;
pub use options::*;

/// Decodes one JPEG image from `reader`.
///
/// Fails without returning partial data when the stream is truncated or
/// corrupted beyond resynchronization.
pub fn decode<R: Read>(reader: R, options: &DecodeOptions) -> Result<DecodedImage> {
    JpegCodec::new().decode(reader, options)
}

/// Encodes `image` into `writer`.
/// ```
/// use medjpeg::api::{decode, encode, DecodeOptions, EncodeOptions, ImageChannels, Predictor};
///
/// let samples: Vec<i32> = (0..64).map(|i| i * 4).collect();
/// let image = ImageChannels::new(8, 8, 8, vec![samples.clone()])?;
/// let mut jpeg = Vec::new();
/// encode(&image, &EncodeOptions::lossless(Predictor::West, 8), &mut jpeg)?;
///
/// let decoded = decode(&jpeg[..], &DecodeOptions::default())?;
/// assert_eq!(decoded.channels[0].samples, samples);
/// # Ok::<(), medjpeg::error::Error>(())
/// ```
pub fn encode<W: Write>(image: &ImageChannels, options: &EncodeOptions, writer: W) -> Result<()> {
    JpegCodec::new().encode(image, options, writer)
}
