//! Hash engine.
//!
//! Each hash group is a linear transform over GF(2). Output bit `i` is the
//! parity of the input bits selected by coefficient row `i`, XORed with seed
//! bit `i`:
//!
//! ```text
//!   out[i] = seed[i] ^ XOR_j (coeff[i][j] & in[j])
//! ```
//!
//! All groups see the same input vector, which is assembled by the stage-wide
//! input crossbar. Consumers never hash on their own. They slice a group's
//! output with a [`HashSlice`], so overlapping slices always agree with each
//! other.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::bitvec::{low_mask, BitVector};
use crate::phv::PhvLayout;
use crate::store::ConfigError;

use super::input_xbar::KeySelect;
use super::spec::{MAX_HASH_GROUP_BITS, NUM_HASH_GROUPS};

/// One hash group: a coefficient row per output bit plus a seed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HashGroup {
    /// Coefficient rows, one per output bit (row `i` drives output bit `i`)
    pub rows: Vec<BitVector>,
    /// Seed, XORed into the output
    pub seed: u64,
}

impl HashGroup {
    /// Create a group from explicit rows and a seed.
    pub fn new(rows: Vec<BitVector>, seed: u64) -> Self {
        Self { rows, seed }
    }

    /// All-zero coefficients: output degenerates to the seed.
    pub fn zeroed(output_bits: usize, input_bits: usize, seed: u64) -> Self {
        Self::new(vec![BitVector::new(input_bits); output_bits], seed)
    }

    /// Output bit `i` = input bit `i`. Handy for tests and pass-through hashing.
    pub fn identity(output_bits: usize, input_bits: usize) -> Self {
        let rows = (0..output_bits)
            .map(|i| BitVector::from_bits(&[i], input_bits))
            .collect();
        Self::new(rows, 0)
    }

    /// Output width in bits.
    #[inline]
    pub fn width(&self) -> usize {
        self.rows.len()
    }

    /// True when `seed` has no bits above the group width.
    #[inline]
    pub fn seed_fits(&self, seed: u64) -> bool {
        seed & !low_mask(self.width()) == 0
    }

    /// Set or clear a single coefficient.
    pub fn set_coefficient(&mut self, output_bit: usize, input_bit: usize, value: bool) {
        if let Some(row) = self.rows.get_mut(output_bit) {
            row.set(input_bit, value);
        }
    }

    /// Compute this group's output for an input vector.
    pub fn compute(&self, input: &BitVector) -> HashValue {
        let mut value = 0u64;
        for (i, row) in self.rows.iter().take(MAX_HASH_GROUP_BITS).enumerate() {
            if row.and_parity(input) {
                value |= 1u64 << i;
            }
        }
        let width = self.rows.len().min(MAX_HASH_GROUP_BITS) as u8;
        HashValue {
            value: (value ^ self.seed) & low_mask(width as usize),
            width,
        }
    }
}

/// A computed hash group output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HashValue {
    /// Output bits, above `width` always zero
    pub value: u64,
    /// Output width in bits
    pub width: u8,
}

impl HashValue {
    /// Extract `width` bits starting at `lo`. Bits past the group width read zero.
    #[inline]
    pub fn slice(&self, lo: u8, width: u8) -> u64 {
        if lo >= 64 {
            return 0;
        }
        (self.value >> lo) & low_mask(width as usize)
    }
}

/// A bit range of one hash group's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HashSlice {
    /// Source hash group
    pub group: usize,
    /// Lowest bit
    pub lo: u8,
    /// Width in bits (at most 64)
    pub width: u8,
}

impl HashSlice {
    pub fn new(group: usize, lo: u8, width: u8) -> Self {
        Self { group, lo, width }
    }
}

/// Outputs of every hash group for one packet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HashOutputs {
    values: SmallVec<[HashValue; NUM_HASH_GROUPS]>,
}

impl HashOutputs {
    /// Output of group `group`, if configured.
    #[inline]
    pub fn group(&self, group: usize) -> Option<HashValue> {
        self.values.get(group).copied()
    }

    /// Extract a slice. Unconfigured groups read as zero.
    #[inline]
    pub fn slice(&self, slice: &HashSlice) -> u64 {
        self.group(slice.group)
            .map(|v| v.slice(slice.lo, slice.width))
            .unwrap_or(0)
    }

    /// Number of groups computed.
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if no groups were computed.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// The stage hash engine: input crossbar plus hash groups.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HashEngine {
    /// Input crossbar feeding every group
    pub input: KeySelect,
    /// Hash groups, indexed by group number
    pub groups: Vec<HashGroup>,
}

impl HashEngine {
    pub fn new(input: KeySelect, groups: Vec<HashGroup>) -> Self {
        Self { input, groups }
    }

    /// Compute every group's output from an assembled input vector.
    pub fn compute_hashes(&self, input: &BitVector) -> HashOutputs {
        HashOutputs {
            values: self.groups.iter().map(|g| g.compute(input)).collect(),
        }
    }

    /// Check group geometry and the input crossbar.
    pub fn validate(&self, layout: &PhvLayout) -> Result<(), ConfigError> {
        self.input.validate(layout)?;
        if self.groups.len() > NUM_HASH_GROUPS {
            return Err(ConfigError::IndexOutOfRange {
                what: "hash group",
                index: self.groups.len(),
                limit: NUM_HASH_GROUPS,
            });
        }
        for (index, group) in self.groups.iter().enumerate() {
            if group.width() > MAX_HASH_GROUP_BITS {
                return Err(ConfigError::HashGroupTooWide {
                    group: index,
                    bits: group.width(),
                    max: MAX_HASH_GROUP_BITS,
                });
            }
            if !group.seed_fits(group.seed) {
                return Err(ConfigError::ValueOutOfRange {
                    field: "hash seed",
                    value: group.seed,
                });
            }
        }
        Ok(())
    }

    /// Check that a slice refers to a configured group and stays in one word.
    pub fn validate_slice(&self, slice: &HashSlice) -> Result<(), ConfigError> {
        if slice.group >= self.groups.len() {
            return Err(ConfigError::IndexOutOfRange {
                what: "hash group",
                index: slice.group,
                limit: self.groups.len(),
            });
        }
        if slice.lo as usize + slice.width as usize > MAX_HASH_GROUP_BITS {
            return Err(ConfigError::ValueOutOfRange {
                field: "hash slice",
                value: slice.lo as u64 + slice.width as u64,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::spec::HASH_GROUP_BITS;
    use crate::testing::XorShift;

    fn random_group(rng: &mut XorShift, out: usize, input: usize, seed: u64) -> HashGroup {
        HashGroup::new((0..out).map(|_| rng.vector(input)).collect(), seed)
    }

    #[test]
    fn test_identity_hash() {
        let group = HashGroup::identity(16, 32);
        let out = group.compute(&BitVector::from_u64(0xDEAD_BEEF, 32));
        assert_eq!(out.value, 0xBEEF);
        assert_eq!(out.width, 16);
    }

    #[test]
    fn test_parity_of_selected_bits() {
        let mut group = HashGroup::zeroed(1, 8, 0);
        group.set_coefficient(0, 0, true);
        group.set_coefficient(0, 3, true);

        assert_eq!(group.compute(&BitVector::from_u64(0b0000_0001, 8)).value, 1);
        assert_eq!(group.compute(&BitVector::from_u64(0b0000_1001, 8)).value, 0);
        assert_eq!(group.compute(&BitVector::from_u64(0b1111_0110, 8)).value, 0);
    }

    #[test]
    fn test_zero_coefficients_yield_seed() {
        let group = HashGroup::zeroed(HASH_GROUP_BITS, 64, 0xA_BCDE_F012_3456);
        let out = group.compute(&BitVector::from_u64(u64::MAX, 64));
        assert_eq!(out.value, 0xA_BCDE_F012_3456);
    }

    #[test]
    fn test_seed_truncated_to_group_width() {
        let group = HashGroup::zeroed(8, 8, 0x1FF);
        assert_eq!(group.compute(&BitVector::new(8)).value, 0xFF);
    }

    #[test]
    fn test_hash_linearity() {
        let mut rng = XorShift::new(0x9E37_79B9_7F4A_7C15);
        for _ in 0..32 {
            let seed = rng.next() & low_mask(HASH_GROUP_BITS);
            let group = random_group(&mut rng, HASH_GROUP_BITS, 200, seed);
            let a = rng.vector(200);
            let b = rng.vector(200);

            let seed_only = group.compute(&BitVector::new(200)).value;
            assert_eq!(seed_only, seed);

            let ab = group.compute(&(&a ^ &b)).value;
            let ha = group.compute(&a).value;
            let hb = group.compute(&b).value;
            // Affine over GF(2): the seed cancels in pairs
            assert_eq!(ab ^ seed_only, ha ^ hb);
        }
    }

    #[test]
    fn test_overlapping_slices_agree_with_full_hash() {
        let mut rng = XorShift::new(42);
        let engine = HashEngine::new(
            KeySelect::default(),
            vec![random_group(&mut rng, HASH_GROUP_BITS, 96, 0x1234)],
        );
        let outputs = engine.compute_hashes(&rng.vector(96));
        let full = outputs.group(0).unwrap().value;

        let a = outputs.slice(&HashSlice::new(0, 0, 16));
        let b = outputs.slice(&HashSlice::new(0, 8, 16));
        assert_eq!(a, full & 0xFFFF);
        assert_eq!(b, (full >> 8) & 0xFFFF);
        // The overlapping byte is the same bits in both slices
        assert_eq!(a >> 8, b & 0xFF);
    }

    #[test]
    fn test_unconfigured_group_slices_to_zero() {
        let engine = HashEngine::default();
        let outputs = engine.compute_hashes(&BitVector::new(8));
        assert!(outputs.is_empty());
        assert_eq!(outputs.slice(&HashSlice::new(3, 0, 10)), 0);
    }

    #[test]
    fn test_validate_group_width() {
        let engine = HashEngine::new(KeySelect::default(), vec![HashGroup::zeroed(65, 8, 0)]);
        assert!(matches!(
            engine.validate(&PhvLayout::tofino()),
            Err(ConfigError::HashGroupTooWide { group: 0, bits: 65, .. })
        ));
    }

    #[test]
    fn test_validate_seed_width() {
        let layout = PhvLayout::tofino();
        let engine = HashEngine::new(KeySelect::default(), vec![HashGroup::zeroed(8, 8, 0xFF)]);
        assert_eq!(engine.validate(&layout), Ok(()));

        let engine = HashEngine::new(KeySelect::default(), vec![HashGroup::zeroed(8, 8, 0x100)]);
        assert_eq!(
            engine.validate(&layout),
            Err(ConfigError::ValueOutOfRange {
                field: "hash seed",
                value: 0x100
            })
        );
        assert!(HashGroup::zeroed(64, 8, 0).seed_fits(u64::MAX));
    }

    #[test]
    fn test_validate_slice() {
        let engine = HashEngine::new(KeySelect::default(), vec![HashGroup::identity(52, 64)]);
        assert!(engine.validate_slice(&HashSlice::new(0, 40, 12)).is_ok());
        assert!(engine.validate_slice(&HashSlice::new(1, 0, 8)).is_err());
        assert!(engine.validate_slice(&HashSlice::new(0, 60, 8)).is_err());
    }
}
