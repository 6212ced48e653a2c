//! Arbitrary-width bit strings.
//!
//! Hash inputs, ternary keys and hash coefficient rows are all wider than a
//! machine word. `BitVector` stores them as little-endian 64-bit words: bit 0
//! is the least-significant bit of word 0.
//!
//! Bits above `width` are always zero. Every mutator re-masks the top word so
//! that equality and parity never see stale high bits.

use std::fmt;
use std::ops::BitXor;

use smallvec::{smallvec, SmallVec};
use thiserror::Error;

/// Most keys fit in four words (256 bits) without spilling to the heap.
type Words = SmallVec<[u64; 4]>;

/// Errors from parsing bit vector literals.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BitVectorError {
    /// The literal contains a non-hex digit.
    #[error("invalid hex literal '{0}'")]
    InvalidHex(String),

    /// The literal has set bits above the requested width.
    #[error("literal '{literal}' does not fit in {width} bits")]
    TooWide {
        /// The offending literal.
        literal: String,
        /// The requested width.
        width: usize,
    },
}

/// Mask covering the low `bits` bits of a word.
#[inline]
pub fn low_mask(bits: usize) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

/// A fixed-width bit string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BitVector {
    width: usize,
    words: Words,
}

impl BitVector {
    /// Create an all-zero vector of `width` bits.
    pub fn new(width: usize) -> Self {
        Self {
            width,
            words: smallvec![0; word_count(width)],
        }
    }

    /// Create a vector from a single word, truncated to `width`.
    pub fn from_u64(value: u64, width: usize) -> Self {
        let mut bv = Self::new(width);
        if let Some(w) = bv.words.first_mut() {
            *w = value;
        }
        bv.mask_top();
        bv
    }

    /// Create a vector from little-endian words, truncated to `width`.
    pub fn from_words(words: &[u64], width: usize) -> Self {
        let mut bv = Self::new(width);
        for (dst, src) in bv.words.iter_mut().zip(words) {
            *dst = *src;
        }
        bv.mask_top();
        bv
    }

    /// Create a vector with exactly the listed bits set.
    ///
    /// Bit indices at or above `width` are ignored.
    pub fn from_bits(bits: &[usize], width: usize) -> Self {
        let mut bv = Self::new(width);
        for &bit in bits {
            bv.set(bit, true);
        }
        bv
    }

    /// Parse a hex literal (optional `0x` prefix, `_` separators allowed).
    pub fn from_hex(literal: &str, width: usize) -> Result<Self, BitVectorError> {
        let digits: String = literal
            .trim()
            .trim_start_matches("0x")
            .trim_start_matches("0X")
            .chars()
            .filter(|c| *c != '_')
            .collect();

        if digits.is_empty() {
            return Err(BitVectorError::InvalidHex(literal.to_string()));
        }

        let mut bv = Self::new(width);
        // Walk nibbles from least significant.
        for (nibble_idx, c) in digits.chars().rev().enumerate() {
            let nibble = c
                .to_digit(16)
                .ok_or_else(|| BitVectorError::InvalidHex(literal.to_string()))?
                as u64;
            if nibble == 0 {
                continue;
            }
            let lo = nibble_idx * 4;
            if lo + (64 - nibble.leading_zeros() as usize) > width {
                return Err(BitVectorError::TooWide {
                    literal: literal.to_string(),
                    width,
                });
            }
            bv.insert(lo, 4, nibble);
        }
        Ok(bv)
    }

    /// Width in bits.
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of backing words.
    #[inline]
    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    /// Backing words, least significant first.
    #[inline]
    pub fn words(&self) -> &[u64] {
        &self.words
    }

    /// Word `index`, or zero past the end.
    #[inline]
    pub fn word(&self, index: usize) -> u64 {
        self.words.get(index).copied().unwrap_or(0)
    }

    /// Overwrite word `index`. Returns false if the word is past the end.
    pub fn set_word(&mut self, index: usize, value: u64) -> bool {
        match self.words.get_mut(index) {
            Some(w) => {
                *w = value;
                self.mask_top();
                true
            }
            None => false,
        }
    }

    /// Bits of word `index` that lie below `width`. Zero past the end.
    pub fn word_mask(&self, index: usize) -> u64 {
        let lo = index * 64;
        if index >= self.words.len() || lo >= self.width {
            return 0;
        }
        low_mask(self.width - lo)
    }

    /// Read a single bit. Bits at or above `width` read as zero.
    #[inline]
    pub fn get(&self, bit: usize) -> bool {
        if bit >= self.width {
            return false;
        }
        (self.words[bit / 64] >> (bit % 64)) & 1 == 1
    }

    /// Write a single bit. Writes at or above `width` are dropped.
    #[inline]
    pub fn set(&mut self, bit: usize, value: bool) {
        if bit >= self.width {
            return;
        }
        let word = &mut self.words[bit / 64];
        if value {
            *word |= 1 << (bit % 64);
        } else {
            *word &= !(1 << (bit % 64));
        }
    }

    /// Extract `len` bits (at most 64) starting at `lo`.
    ///
    /// Bits beyond `width` read as zero, so a field running off the end is
    /// zero-extended rather than an error.
    pub fn extract(&self, lo: usize, len: usize) -> u64 {
        let len = len.min(64);
        if len == 0 || lo >= self.width {
            return 0;
        }
        let word_idx = lo / 64;
        let shift = lo % 64;
        let mut value = self.word(word_idx) >> shift;
        if shift != 0 {
            value |= self.word(word_idx + 1) << (64 - shift);
        }
        value & low_mask(len)
    }

    /// Insert the low `len` bits of `value` (at most 64) starting at `lo`.
    pub fn insert(&mut self, lo: usize, len: usize, value: u64) {
        let len = len.min(64);
        for i in 0..len {
            self.set(lo + i, (value >> i) & 1 == 1);
        }
    }

    /// Low 64 bits.
    #[inline]
    pub fn to_u64(&self) -> u64 {
        self.word(0)
    }

    /// Number of set bits.
    pub fn count_ones(&self) -> u32 {
        self.words.iter().map(|w| w.count_ones()).sum()
    }

    /// Bitwise AND. The result takes the narrower width.
    pub fn and(&self, other: &BitVector) -> BitVector {
        let width = self.width.min(other.width);
        let mut out = BitVector::new(width);
        for (i, w) in out.words.iter_mut().enumerate() {
            *w = self.word(i) & other.word(i);
        }
        out.mask_top();
        out
    }

    /// GF(2) dot product: parity of `self & other`.
    ///
    /// Words missing from the shorter operand count as zero.
    pub fn and_parity(&self, other: &BitVector) -> bool {
        let n = self.words.len().min(other.words.len());
        let ones: u32 = (0..n)
            .map(|i| (self.words[i] & other.words[i]).count_ones())
            .sum();
        ones & 1 == 1
    }

    /// `(self & mask) == (value & mask)`, treating missing words as zero.
    pub fn masked_eq(&self, value: &BitVector, mask: &BitVector) -> bool {
        let n = self
            .words
            .len()
            .max(value.words.len())
            .max(mask.words.len());
        (0..n).all(|i| {
            let m = mask.word(i);
            self.word(i) & m == value.word(i) & m
        })
    }

    /// Resize in place, zero-filling new bits and dropping truncated ones.
    pub fn resize(&mut self, width: usize) {
        self.width = width;
        self.words.resize(word_count(width), 0);
        self.mask_top();
    }

    fn mask_top(&mut self) {
        if self.width == 0 {
            self.words.iter_mut().for_each(|w| *w = 0);
            return;
        }
        let rem = self.width % 64;
        if rem != 0 {
            if let Some(top) = self.words.last_mut() {
                *top &= low_mask(rem);
            }
        }
    }
}

impl BitXor for &BitVector {
    type Output = BitVector;

    /// XOR. The result takes the wider width.
    fn bitxor(self, rhs: &BitVector) -> BitVector {
        let width = self.width.max(rhs.width);
        let mut out = BitVector::new(width);
        for (i, w) in out.words.iter_mut().enumerate() {
            *w = self.word(i) ^ rhs.word(i);
        }
        out
    }
}

impl fmt::Display for BitVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x")?;
        let mut started = false;
        for w in self.words.iter().rev() {
            if started {
                write!(f, "{:016X}", w)?;
            } else if *w != 0 {
                write!(f, "{:X}", w)?;
                started = true;
            }
        }
        if !started {
            write!(f, "0")?;
        }
        Ok(())
    }
}

#[inline]
fn word_count(width: usize) -> usize {
    width.div_ceil(64).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_across_word_boundary() {
        let bv = BitVector::from_words(&[0xF000_0000_0000_0000, 0x0000_0000_0000_000A], 128);
        // Bits 60..68 = 0xF (low nibble) | 0xA (high nibble)
        assert_eq!(bv.extract(60, 8), 0xAF);
        assert_eq!(bv.extract(64, 4), 0xA);
    }

    #[test]
    fn test_extract_past_width_reads_zero() {
        let bv = BitVector::from_u64(0xFF, 8);
        assert_eq!(bv.extract(4, 16), 0xF);
        assert_eq!(bv.extract(8, 8), 0);
    }

    #[test]
    fn test_top_word_masked() {
        let bv = BitVector::from_u64(u64::MAX, 12);
        assert_eq!(bv.to_u64(), 0xFFF);

        let mut bv = BitVector::new(70);
        bv.set_word(1, u64::MAX);
        assert_eq!(bv.word(1), 0x3F);
        assert_eq!(bv.count_ones(), 6);
    }

    #[test]
    fn test_masked_eq() {
        let key = BitVector::from_u64(0x1234, 16);
        let value = BitVector::from_u64(0x1200, 16);
        let mask = BitVector::from_u64(0xFF00, 16);
        assert!(key.masked_eq(&value, &mask));

        let mask = BitVector::from_u64(0xFFFF, 16);
        assert!(!key.masked_eq(&value, &mask));
    }

    #[test]
    fn test_and_parity() {
        let a = BitVector::from_u64(0b1011, 4);
        let b = BitVector::from_u64(0b0011, 4);
        // a & b = 0b0011 -> two ones -> even
        assert!(!a.and_parity(&b));
        let c = BitVector::from_u64(0b0001, 4);
        assert!(a.and_parity(&c));
    }

    #[test]
    fn test_hex_parse_and_display() {
        let bv = BitVector::from_hex("0x1_0000_0000_0000_00FF", 80).unwrap();
        assert_eq!(bv.word(0), 0xFF);
        assert_eq!(bv.word(1), 0x1);
        assert_eq!(bv.to_string(), "0x100000000000000FF");

        assert_eq!(BitVector::new(8).to_string(), "0x0");
    }

    #[test]
    fn test_hex_parse_rejects_bad_input() {
        assert!(matches!(
            BitVector::from_hex("0xZZ", 8),
            Err(BitVectorError::InvalidHex(_))
        ));
        assert!(matches!(
            BitVector::from_hex("0x1FF", 8),
            Err(BitVectorError::TooWide { .. })
        ));
        // Leading zeros beyond the width are fine
        assert!(BitVector::from_hex("0x00FF", 8).is_ok());
    }

    #[test]
    fn test_xor_takes_wider_width() {
        let a = BitVector::from_u64(0xF0, 8);
        let b = BitVector::from_u64(0xFF0F, 16);
        let c = &a ^ &b;
        assert_eq!(c.width(), 16);
        assert_eq!(c.to_u64(), 0xFFFF);
    }

    #[test]
    fn test_insert_and_resize() {
        let mut bv = BitVector::new(16);
        bv.insert(4, 8, 0xAB);
        assert_eq!(bv.to_u64(), 0x0AB0);
        bv.resize(8);
        assert_eq!(bv.to_u64(), 0xB0);
    }

    #[test]
    fn test_zero_width_holds_no_bits() {
        let bv = BitVector::from_u64(0xABCD, 0);
        assert_eq!(bv.to_u64(), 0);
        assert_eq!(bv, BitVector::new(0));

        let mut bv = BitVector::from_u64(0xFF, 8);
        bv.resize(0);
        assert_eq!(bv.to_u64(), 0);
        assert!(!bv.set_word(1, 1));
        assert!(bv.set_word(0, 0x1));
        assert_eq!(bv.word(0), 0);
    }

    #[test]
    fn test_word_mask() {
        let bv = BitVector::new(70);
        assert_eq!(bv.word_mask(0), u64::MAX);
        assert_eq!(bv.word_mask(1), 0x3F);
        assert_eq!(bv.word_mask(2), 0);
        assert_eq!(BitVector::new(64).word_mask(0), u64::MAX);
        assert_eq!(BitVector::new(0).word_mask(0), 0);
    }
}
