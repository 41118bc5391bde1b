// Copyright (c) the medjpeg Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

#![deny(unsafe_code)]
pub mod api;
pub mod bit_reader;
pub mod bit_writer;
pub mod byte_stream;
pub mod channel;
pub mod codec;
pub mod dct;
pub mod entropy_coding;
pub mod error;
pub mod quant;
pub mod tables;
pub mod util;

pub use api::{decode, encode};
pub use codec::JpegCodec;
