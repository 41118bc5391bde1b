// Copyright (c) the medjpeg Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use crate::dct::{decode_multipliers, encode_scales};
use crate::error::{Error, Result};

pub const NUM_QUANT_TABLES: usize = 16;

#[derive(Debug, Clone)]
struct QuantTable {
    values: [u16; 64],
    decode: [i64; 64],
    encode: [f32; 64],
}

/// Quantization table slots, each holding the raw raster-order table and
/// the multipliers the transforms derive from it.
#[derive(Debug, Clone)]
pub struct QuantizationTables {
    tables: [Option<Box<QuantTable>>; NUM_QUANT_TABLES],
}

impl Default for QuantizationTables {
    fn default() -> Self {
        Self::new()
    }
}

impl QuantizationTables {
    pub fn new() -> QuantizationTables {
        QuantizationTables {
            tables: array_init::array_init(|_| None),
        }
    }

    pub fn reset(&mut self) {
        self.tables.iter_mut().for_each(|t| *t = None);
    }

    fn slot(&self, id: u8) -> Result<&QuantTable> {
        self.tables
            .get(id as usize)
            .and_then(|t| t.as_deref())
            .ok_or(Error::InvalidQuantTable(id))
    }

    /// Stores a raster-order table in slot `id`.
    pub fn set_table(&mut self, id: u8, values: [u16; 64]) -> Result<()> {
        let slot = self
            .tables
            .get_mut(id as usize)
            .ok_or(Error::InvalidQuantTable(id))?;
        if values.contains(&0) {
            return Err(Error::InvalidQuantTable(id));
        }
        *slot = Some(Box::new(QuantTable {
            values,
            decode: decode_multipliers(&values),
            encode: encode_scales(&values),
        }));
        Ok(())
    }

    pub fn values(&self, id: u8) -> Result<&[u16; 64]> {
        Ok(&self.slot(id)?.values)
    }

    pub fn decode_multipliers(&self, id: u8) -> Result<&[i64; 64]> {
        Ok(&self.slot(id)?.decode)
    }

    pub fn encode_scales(&self, id: u8) -> Result<&[f32; 64]> {
        Ok(&self.slot(id)?.encode)
    }
}

/// Scales a base table with the IJG quality curve: 50 keeps the table,
/// 100 gives all ones, lower values coarsen it.
/// ```
/// # use medjpeg::{quant::scale_for_quality, tables::DEFAULT_LUMINANCE_QUANT};
/// let table = scale_for_quality(&DEFAULT_LUMINANCE_QUANT, 50, 255);
/// assert_eq!(table, DEFAULT_LUMINANCE_QUANT);
/// assert!(scale_for_quality(&DEFAULT_LUMINANCE_QUANT, 100, 255).iter().all(|&q| q == 1));
/// ```
pub fn scale_for_quality(base: &[u16; 64], quality: u8, max_value: u16) -> [u16; 64] {
    let quality = quality.clamp(1, 100) as u32;
    let scale = if quality < 50 {
        5000 / quality
    } else {
        200 - 2 * quality
    };
    array_init::array_init(|i| {
        let value = (base[i] as u32 * scale + 50) / 100;
        value.clamp(1, max_value as u32) as u16
    })
}
