// Copyright (c) the medjpeg Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Canonical Huffman tables as used by JPEG.
//!
//! A table is filled either from symbol frequencies (encoder:
//! [`HuffmanTable::inc_value_freq`], [`HuffmanTable::calc_huffman_codes_length`],
//! [`HuffmanTable::remove_last_code`]) or from a serialized DHT segment
//! (decoder: [`HuffmanTable::set_values_per_length`],
//! [`HuffmanTable::add_ordered_value`]). Both paths finish with
//! [`HuffmanTable::calc_huffman_tables`], which assigns the canonical codes.

use std::cmp::Reverse;
use std::collections::BTreeSet;
use std::io::{Read, Write};

use crate::bit_reader::BitReader;
use crate::bit_writer::BitWriter;
use crate::error::{Error, Result};

/// Number of entries in the length histogram. Index 0 is unused.
pub const HUFFMAN_MAX_LENGTH_SLOTS: usize = 128;

/// Longest code a DHT segment can describe.
pub const JPEG_MAX_CODE_LENGTH: usize = 16;

/// Codes are handed to the bit writer in one call, so they must fit in 32 bits.
const MAX_ASSIGNABLE_LENGTH: usize = 32;

#[derive(Debug, Clone, Copy, Default)]
struct ValueFreq {
    freq: u32,
    code_length: u32,
    // Next symbol merged into the same subtree.
    next_code: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct HuffmanTable {
    max_value_length: u32,
    values_freq: Vec<ValueFreq>,
    values_per_length: [u32; HUFFMAN_MAX_LENGTH_SLOTS],
    ordered_values: Vec<u32>,

    first_valid_length: u32,
    first_min_value: u32,
    first_max_value: u32,
    first_values_per_length: u32,
    max_length: u32,
    min_value_per_length: [u32; HUFFMAN_MAX_LENGTH_SLOTS],
    max_value_per_length: [u32; HUFFMAN_MAX_LENGTH_SLOTS],

    values_to_huffman: Vec<u32>,
    values_to_huffman_length: Vec<u32>,
}

impl HuffmanTable {
    /// Creates a table for symbols of at most `max_value_length` bits. One
    /// extra slot past the largest symbol is reserved so that the encoder
    /// never produces an all-ones code.
    pub fn new(max_value_length: u32) -> HuffmanTable {
        let slots = (1usize << max_value_length) + 1;
        HuffmanTable {
            max_value_length,
            values_freq: vec![ValueFreq::default(); slots],
            values_per_length: [0; HUFFMAN_MAX_LENGTH_SLOTS],
            ordered_values: Vec::new(),
            first_valid_length: 0,
            first_min_value: 0,
            first_max_value: 0,
            first_values_per_length: 0,
            max_length: 0,
            min_value_per_length: [0; HUFFMAN_MAX_LENGTH_SLOTS],
            max_value_per_length: [0; HUFFMAN_MAX_LENGTH_SLOTS],
            values_to_huffman: vec![0; slots],
            values_to_huffman_length: vec![0; slots],
        }
    }

    /// Clears frequencies, lengths and every derived code.
    pub fn reset(&mut self) {
        self.values_freq.fill(ValueFreq::default());
        self.values_per_length = [0; HUFFMAN_MAX_LENGTH_SLOTS];
        self.ordered_values.clear();
        self.first_valid_length = 0;
        self.first_min_value = 0;
        self.first_max_value = 0;
        self.first_values_per_length = 0;
        self.max_length = 0;
        self.min_value_per_length = [0; HUFFMAN_MAX_LENGTH_SLOTS];
        self.max_value_per_length = [0; HUFFMAN_MAX_LENGTH_SLOTS];
        self.values_to_huffman.fill(0);
        self.values_to_huffman_length.fill(0);
    }

    /// The slot used as a placeholder for the all-ones code.
    pub fn reserved_value(&self) -> u32 {
        1 << self.max_value_length
    }

    fn check_value(&self, value: u32) -> Result<usize> {
        if value >= self.reserved_value() {
            return Err(Error::HuffmanSymbolOutOfRange(value));
        }
        Ok(value as usize)
    }

    pub fn inc_value_freq(&mut self, value: u32) -> Result<()> {
        let index = self.check_value(value)?;
        let entry = &mut self.values_freq[index];
        entry.freq = entry.freq.saturating_add(1);
        Ok(())
    }

    /// Computes optimal code lengths from the collected frequencies, then
    /// limits them to `max_code_length` bits.
    ///
    /// The reserved slot always takes part with frequency 1; call
    /// [`HuffmanTable::remove_last_code`] afterwards to drop it.
    pub fn calc_huffman_codes_length(&mut self, max_code_length: usize) -> Result<()> {
        if max_code_length == 0 || max_code_length >= HUFFMAN_MAX_LENGTH_SLOTS {
            return Err(Error::HuffmanLengthTooLarge(max_code_length));
        }
        let reserved = self.reserved_value() as usize;
        self.values_freq[reserved].freq = 1;

        let mut freqs: Vec<u64> = Vec::with_capacity(self.values_freq.len());
        for entry in self.values_freq.iter_mut() {
            entry.code_length = 0;
            entry.next_code = None;
            freqs.push(entry.freq as u64);
        }

        // Lowest frequency first; on ties the larger symbol goes first.
        let mut queue: BTreeSet<(u64, Reverse<u32>)> = freqs
            .iter()
            .enumerate()
            .filter(|(_, &freq)| freq != 0)
            .map(|(value, &freq)| (freq, Reverse(value as u32)))
            .collect();

        while queue.len() > 1 {
            let (Some((_, Reverse(value1))), Some((_, Reverse(value2)))) =
                (queue.pop_first(), queue.pop_first())
            else {
                break;
            };
            freqs[value1 as usize] += freqs[value2 as usize];
            freqs[value2 as usize] = 0;

            let tail = self.lengthen_chain(value1);
            self.values_freq[tail as usize].next_code = Some(value2);
            self.lengthen_chain(value2);

            queue.insert((freqs[value1 as usize], Reverse(value1)));
        }

        // A lone symbol still needs one bit.
        if let Some((_, Reverse(value))) = queue.first() {
            let entry = &mut self.values_freq[*value as usize];
            if entry.code_length == 0 {
                entry.code_length = 1;
            }
        }

        let mut by_length: Vec<(u32, u32)> = self
            .values_freq
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.code_length != 0)
            .map(|(value, entry)| (entry.code_length, value as u32))
            .collect();
        by_length.sort_unstable();

        self.values_per_length = [0; HUFFMAN_MAX_LENGTH_SLOTS];
        self.ordered_values.clear();
        for &(length, value) in &by_length {
            let length = length as usize;
            if length >= HUFFMAN_MAX_LENGTH_SLOTS {
                return Err(Error::HuffmanLengthTooLarge(length));
            }
            self.values_per_length[length] += 1;
            self.ordered_values.push(value);
        }

        self.limit_lengths(max_code_length)
    }

    /// Adds one to the length of every symbol in the chain starting at
    /// `value`, returning the last symbol of the chain.
    fn lengthen_chain(&mut self, value: u32) -> u32 {
        let mut current = value;
        loop {
            let entry = &mut self.values_freq[current as usize];
            entry.code_length += 1;
            match entry.next_code {
                Some(next) => current = next,
                None => return current,
            }
        }
    }

    // ITU T.81 K.3: pairs of codes at a too-long length are replaced by one
    // code one bit shorter, and a shorter leaf is split to keep the tree full.
    fn limit_lengths(&mut self, max_code_length: usize) -> Result<()> {
        let total_before: u32 = self.values_per_length.iter().sum();
        for length in (max_code_length + 1..HUFFMAN_MAX_LENGTH_SLOTS).rev() {
            while self.values_per_length[length] != 0 {
                let mut shorter = length - 2;
                while shorter > 0 && self.values_per_length[shorter] == 0 {
                    shorter -= 1;
                }
                if shorter == 0 || self.values_per_length[length] < 2 {
                    return Err(Error::TooManyHuffmanSymbols(
                        total_before as usize,
                        1 << max_code_length,
                    ));
                }
                self.values_per_length[length] -= 2;
                self.values_per_length[length - 1] += 1;
                self.values_per_length[shorter + 1] += 2;
                self.values_per_length[shorter] -= 1;
            }
        }
        debug_assert_eq!(total_before, self.values_per_length.iter().sum::<u32>());
        Ok(())
    }

    /// Gives up the numerically last code, which belongs to the longest
    /// length, so that no symbol is coded with all ones.
    pub fn remove_last_code(&mut self) {
        let Some(length) = (1..HUFFMAN_MAX_LENGTH_SLOTS)
            .rev()
            .find(|&length| self.values_per_length[length] != 0)
        else {
            return;
        };
        self.values_per_length[length] -= 1;
        let reserved = self.reserved_value();
        match self.ordered_values.iter().position(|&v| v == reserved) {
            Some(position) => {
                self.ordered_values.remove(position);
            }
            None => {
                self.ordered_values.pop();
            }
        }
    }

    /// Sets the number of codes with `length` bits, as read from a DHT segment.
    pub fn set_values_per_length(&mut self, length: usize, count: u32) -> Result<()> {
        if length == 0 || length >= HUFFMAN_MAX_LENGTH_SLOTS {
            return Err(Error::HuffmanLengthTooLarge(length));
        }
        self.values_per_length[length] = count;
        Ok(())
    }

    /// Appends the next symbol in canonical order, as read from a DHT segment.
    pub fn add_ordered_value(&mut self, value: u32) -> Result<()> {
        self.check_value(value)?;
        if self.ordered_values.len() >= self.values_freq.len() {
            return Err(Error::TooManyHuffmanSymbols(
                self.ordered_values.len() + 1,
                self.values_freq.len(),
            ));
        }
        self.ordered_values.push(value);
        Ok(())
    }

    pub fn values_per_length(&self, length: usize) -> u32 {
        self.values_per_length.get(length).copied().unwrap_or(0)
    }

    pub fn ordered_values(&self) -> &[u32] {
        &self.ordered_values
    }

    /// Code length of `value`, 0 if the symbol has no code.
    pub fn code_length(&self, value: u32) -> u32 {
        self.values_to_huffman_length
            .get(value as usize)
            .copied()
            .unwrap_or(0)
    }

    /// True when no code has been assigned yet.
    pub fn is_empty(&self) -> bool {
        self.first_valid_length == 0
    }

    /// Assigns canonical codes: within a length codes are consecutive, and
    /// the running code is shifted left by one bit for each longer length.
    pub fn calc_huffman_tables(&mut self) -> Result<()> {
        self.first_valid_length = 0;
        self.max_length = 0;
        self.min_value_per_length = [0; HUFFMAN_MAX_LENGTH_SLOTS];
        self.max_value_per_length = [0; HUFFMAN_MAX_LENGTH_SLOTS];
        self.values_to_huffman.fill(0);
        self.values_to_huffman_length.fill(0);

        let total: usize = self.values_per_length.iter().map(|&c| c as usize).sum();
        if total > self.ordered_values.len() {
            return Err(Error::TooManyHuffmanSymbols(total, self.ordered_values.len()));
        }

        let mut code = 0u64;
        let mut index = 0usize;
        for length in 1..HUFFMAN_MAX_LENGTH_SLOTS {
            let count = self.values_per_length[length];
            if count != 0 {
                if length > MAX_ASSIGNABLE_LENGTH {
                    return Err(Error::HuffmanLengthTooLarge(length));
                }
                if code + count as u64 > 1u64 << length {
                    return Err(Error::TooManyHuffmanSymbols(
                        (code + count as u64) as usize,
                        1 << length,
                    ));
                }
                let min = code as u32;
                let max = (code + count as u64 - 1) as u32;
                if self.first_valid_length == 0 {
                    self.first_valid_length = length as u32;
                    self.first_min_value = min;
                    self.first_max_value = max;
                    self.first_values_per_length = count;
                }
                self.min_value_per_length[length] = min;
                self.max_value_per_length[length] = max;
                self.max_length = length as u32;
                for _ in 0..count {
                    let value = self.ordered_values[index] as usize;
                    self.values_to_huffman[value] = code as u32;
                    self.values_to_huffman_length[value] = length as u32;
                    code += 1;
                    index += 1;
                }
            }
            code <<= 1;
            if code > 1u64 << MAX_ASSIGNABLE_LENGTH {
                // Every remaining length is empty, or the table is invalid.
                if self.values_per_length[length + 1..].iter().any(|&c| c != 0) {
                    return Err(Error::HuffmanLengthTooLarge(length + 1));
                }
                break;
            }
        }
        Ok(())
    }

    fn ordered_value(&self, index: u32) -> Result<u32> {
        self.ordered_values
            .get(index as usize)
            .copied()
            .ok_or(Error::InvalidHuffmanCode)
    }

    /// Reads one Huffman-coded symbol.
    #[inline]
    pub fn read_huffman_code<R: Read>(&self, br: &mut BitReader<R>) -> Result<u32> {
        if self.first_valid_length == 0 {
            return Err(Error::InvalidHuffmanCode);
        }
        let mut length = self.first_valid_length;
        let mut code = br.read_bits(length)?;
        if code <= self.first_max_value {
            let index = code
                .checked_sub(self.first_min_value)
                .ok_or(Error::InvalidHuffmanCode)?;
            return self.ordered_value(index);
        }

        let mut offset = self.first_values_per_length;
        for next_length in self.first_valid_length + 1..=self.max_length {
            let count = self.values_per_length[next_length as usize];
            if count == 0 {
                continue;
            }
            let delta = next_length - length;
            code = (code << delta) | br.read_bits(delta)?;
            length = next_length;
            if code <= self.max_value_per_length[length as usize] {
                let index = code - self.min_value_per_length[length as usize];
                return self.ordered_value(offset + index);
            }
            offset += count;
        }
        Err(Error::InvalidHuffmanCode)
    }

    /// Writes the code assigned to `value`.
    #[inline]
    pub fn write_huffman_code<W: Write>(&self, value: u32, bw: &mut BitWriter<W>) -> Result<()> {
        let index = self.check_value(value)?;
        let length = self.values_to_huffman_length[index];
        if length == 0 {
            return Err(Error::HuffmanSymbolNotCoded(value));
        }
        bw.write_bits(self.values_to_huffman[index], length)
    }

    /// Builds a table from DHT-style data: `counts[i]` codes of length `i + 1`
    /// followed by the symbols in canonical order.
    pub fn from_counts(max_value_length: u32, counts: &[u8; 16], values: &[u8]) -> Result<Self> {
        let mut table = HuffmanTable::new(max_value_length);
        for (i, &count) in counts.iter().enumerate() {
            table.set_values_per_length(i + 1, count as u32)?;
        }
        for &value in values {
            table.add_ordered_value(value as u32)?;
        }
        table.calc_huffman_tables()?;
        Ok(table)
    }
}
