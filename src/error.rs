// Copyright (c) the medjpeg Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use std::collections::TryReserveError;

use thiserror::Error;

use crate::entropy_coding::huffman::HUFFMAN_MAX_LENGTH_SLOTS;

/// Coarse classification of [`Error`], used by callers that translate codec
/// failures into their own error space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A Huffman or quantization table could not be built.
    MalformedTable,
    /// The byte stream ended early or contained a marker where data was expected.
    Stream,
    /// The stream uses a feature this codec does not implement, or is corrupted.
    Unsupported,
    /// The image exceeds a caller-configured limit.
    SizeLimit,
    /// The underlying reader or writer failed.
    Io,
}

#[derive(Error, Debug)]
pub enum Error {
    // Table construction
    #[error("Huffman code length {0} exceeds the table capacity of {max}", max = HUFFMAN_MAX_LENGTH_SLOTS)]
    HuffmanLengthTooLarge(usize),
    #[error("Too many Huffman symbols: {0}, table holds {1}")]
    TooManyHuffmanSymbols(usize, usize),
    #[error("Huffman symbol {0} is out of range for the table")]
    HuffmanSymbolOutOfRange(u32),
    #[error("Huffman symbol {0} has no assigned code")]
    HuffmanSymbolNotCoded(u32),
    #[error("Invalid Huffman code in entropy-coded data")]
    InvalidHuffmanCode,
    #[error("Huffman table {0} used before being defined")]
    UndefinedHuffmanTable(u8),

    // Stream errors
    #[error("Unexpected end of data")]
    EndOfData,
    #[error("Unexpected marker 0xff{0:02x} inside entropy-coded data")]
    MarkerInData(u8),
    #[error("Bit count {0} exceeds the 32 bits allowed per call")]
    TooManyBits(u32),
    #[error("Marker segment 0xff{0:02x} has invalid length {1}")]
    InvalidSegmentLength(u8, usize),
    #[error("Stream does not start with a JPEG SOI marker")]
    MissingSoi,
    #[error("Scan found before any frame header")]
    ScanBeforeFrame,
    #[error("Image ended without a frame header")]
    MissingFrame,

    // Unsupported or corrupted content
    #[error("Unsupported JPEG process marker 0xff{0:02x}")]
    UnsupportedProcess(u8),
    #[error("Unsupported sample precision: {0} bits")]
    UnsupportedPrecision(u8),
    #[error("Invalid sampling factor {0}x{1}, factors must be 1, 2 or 4")]
    InvalidSamplingFactor(u8, u8),
    #[error("Invalid lossless predictor: {0}")]
    InvalidPredictor(u8),
    #[error("Invalid quantization table index: {0}")]
    InvalidQuantTable(u8),
    #[error("Invalid Huffman table index: class {0}, id {1}")]
    InvalidHuffmanTable(u8, u8),
    #[error("Scan references unknown component id {0}")]
    UnknownComponent(u8),
    #[error("Invalid component count: {0}")]
    InvalidComponentCount(usize),
    #[error("Invalid spectral selection {0}..={1} or approximation {2}/{3}")]
    InvalidScanParameters(u8, u8, u8, u8),
    #[error("Invalid image size: {0}x{1}")]
    InvalidImageSize(usize, usize),
    #[error("Expected {0} components, stream has {1}")]
    ComponentCountMismatch(usize, usize),
    #[error("Invalid encoder parameter: {0}")]
    InvalidParameter(&'static str),
    #[error("Channel holds {1} samples, expected {0}")]
    ChannelSizeMismatch(usize, usize),

    // Size limits
    #[error("Image size too large: {0}x{1}")]
    ImageSizeTooLarge(usize, usize),
    #[error("Too many components: {0}")]
    TooManyComponents(usize),
    #[error("Out of memory: {0}")]
    OutOfMemory(#[from] TryReserveError),
    // Generic arithmetic overflow. Prefer using other errors if possible.
    #[error("Arithmetic overflow")]
    ArithmeticOverflow,

    #[error("I/O error: {0}")]
    Io(std::io::Error),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            Error::EndOfData
        } else {
            Error::Io(err)
        }
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        use Error::*;
        match self {
            HuffmanLengthTooLarge(_)
            | TooManyHuffmanSymbols(..)
            | HuffmanSymbolOutOfRange(_)
            | HuffmanSymbolNotCoded(_) => ErrorKind::MalformedTable,
            InvalidHuffmanCode
            | EndOfData
            | MarkerInData(_)
            | TooManyBits(_)
            | InvalidSegmentLength(..)
            | MissingSoi
            | ScanBeforeFrame
            | MissingFrame => ErrorKind::Stream,
            UndefinedHuffmanTable(_)
            | UnsupportedProcess(_)
            | UnsupportedPrecision(_)
            | InvalidSamplingFactor(..)
            | InvalidPredictor(_)
            | InvalidQuantTable(_)
            | InvalidHuffmanTable(..)
            | UnknownComponent(_)
            | InvalidComponentCount(_)
            | InvalidScanParameters(..)
            | InvalidImageSize(..)
            | ComponentCountMismatch(..)
            | InvalidParameter(_)
            | ChannelSizeMismatch(..) => ErrorKind::Unsupported,
            ImageSizeTooLarge(..) | TooManyComponents(_) | OutOfMemory(_) | ArithmeticOverflow => {
                ErrorKind::SizeLimit
            }
            Io(_) => ErrorKind::Io,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn unexpected_eof_maps_to_end_of_data() {
        let err: Error = std::io::Error::from(std::io::ErrorKind::UnexpectedEof).into();
        assert!(matches!(err, Error::EndOfData));
        assert_eq!(err.kind(), ErrorKind::Stream);
    }

    #[test]
    fn other_io_errors_are_kept() {
        let err: Error = std::io::Error::from(std::io::ErrorKind::PermissionDenied).into();
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn messages_name_their_limits() {
        assert_eq!(
            Error::HuffmanLengthTooLarge(300).to_string(),
            format!(
                "Huffman code length 300 exceeds the table capacity of {}",
                HUFFMAN_MAX_LENGTH_SLOTS
            )
        );
        assert_eq!(
            Error::ChannelSizeMismatch(64, 63).to_string(),
            "Channel holds 63 samples, expected 64"
        );
    }

    #[test]
    fn taxonomy() {
        assert_eq!(Error::HuffmanLengthTooLarge(200).kind(), ErrorKind::MalformedTable);
        assert_eq!(Error::MarkerInData(0xd0).kind(), ErrorKind::Stream);
        assert_eq!(Error::InvalidPredictor(9).kind(), ErrorKind::Unsupported);
        assert_eq!(Error::ImageSizeTooLarge(1, 2).kind(), ErrorKind::SizeLimit);
    }
}
