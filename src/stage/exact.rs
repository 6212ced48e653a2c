//! Exact match unit (hash table).
//!
//! Each way of a logical exact-match table slices its own hash value out of
//! the hash engine and splits it into a RAM row and an expected tag:
//!
//! ```text
//!   way hash:  [ tag (remaining bits) | row bits (addr_bits) ]
//!   row      = vpn_offset + (way_hash & ((1 << addr_bits) - 1))
//!   tag      = way_hash >> addr_bits
//! ```
//!
//! A row hits only when it is valid, its stored tag equals the expected tag,
//! and its version is visible to the packet. A populated, valid row with the
//! wrong tag is a miss (hash collision). Ways are probed in index order and the
//! lowest hitting way wins.

use smallvec::SmallVec;

use crate::bitvec::low_mask;

use super::hash::{HashOutputs, HashSlice};
use super::spec::WIDE_ROW_WORDS;

/// Bits of row word 0 that carry fields; everything above is reserved.
const ROW_WORD0_BITS: u32 = 44;

/// One SRAM row of an exact-match way.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExactRow {
    /// Row holds an entry
    pub valid: bool,
    /// Stored tag
    pub tag: u64,
    /// 2-bit entry version
    pub version: u8,
    /// Raw match address / data-RAM pointer
    pub payload: u32,
    /// Next table carried by the entry
    pub next_table: Option<u8>,
}

impl ExactRow {
    /// A valid version-0 row.
    pub fn new(tag: u64, payload: u32) -> Self {
        Self {
            valid: true,
            tag,
            version: 0,
            payload,
            next_table: None,
        }
    }

    /// Set the entry version.
    pub fn with_version(mut self, version: u8) -> Self {
        self.version = version;
        self
    }

    /// Set the entry's next table.
    pub fn with_next_table(mut self, next_table: u8) -> Self {
        self.next_table = Some(next_table);
        self
    }

    /// Decode a row from its two-word wide-row encoding.
    ///
    /// ```text
    /// word0: [31:0] payload  [39:32] next table  [40] next-table valid
    ///        [42:41] version [43] valid
    /// word1: tag
    /// ```
    pub fn from_words(words: [u64; WIDE_ROW_WORDS]) -> Self {
        let w0 = words[0];
        Self {
            valid: (w0 >> 43) & 1 == 1,
            tag: words[1],
            version: ((w0 >> 41) & 0x3) as u8,
            payload: w0 as u32,
            next_table: ((w0 >> 40) & 1 == 1).then_some((w0 >> 32) as u8),
        }
    }

    /// Decode a row, refusing reserved bits in word 0.
    pub fn decode(words: [u64; WIDE_ROW_WORDS]) -> Option<Self> {
        (words[0] >> ROW_WORD0_BITS == 0).then(|| Self::from_words(words))
    }

    /// Encode to the two-word wide-row format.
    pub fn to_words(&self) -> [u64; WIDE_ROW_WORDS] {
        let mut w0 = self.payload as u64;
        if let Some(nt) = self.next_table {
            w0 |= (nt as u64) << 32;
            w0 |= 1 << 40;
        }
        w0 |= ((self.version & 0x3) as u64) << 41;
        if self.valid {
            w0 |= 1 << 43;
        }
        [w0, self.tag]
    }
}

/// One way of an exact-match table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExactWay {
    /// Hash bits feeding this way
    pub hash: HashSlice,
    /// Low bits of the way hash used as the row address
    pub addr_bits: u8,
    /// Virtual page offset added to the row address
    pub vpn_offset: u32,
    /// SRAM rows
    pub rows: Vec<ExactRow>,
}

impl ExactWay {
    /// A way with `rows` empty rows.
    pub fn new(hash: HashSlice, addr_bits: u8, rows: usize) -> Self {
        Self {
            hash,
            addr_bits,
            vpn_offset: 0,
            rows: vec![ExactRow::default(); rows],
        }
    }

    /// Set the virtual page offset.
    pub fn with_vpn_offset(mut self, vpn_offset: u32) -> Self {
        self.vpn_offset = vpn_offset;
        self
    }

    /// Split a way hash into (row index, expected tag).
    #[inline]
    pub fn split(&self, way_hash: u64) -> (usize, u64) {
        let low = way_hash & low_mask(self.addr_bits as usize);
        let tag = way_hash.checked_shr(self.addr_bits as u32).unwrap_or(0);
        (self.vpn_offset as usize + low as usize, tag)
    }

    /// Probe this way. Returns the hitting row index.
    fn probe(&self, way_hash: u64, visible: &impl Fn(u8) -> bool) -> Option<usize> {
        let (row, tag) = self.split(way_hash);
        let entry = self.rows.get(row)?;
        (entry.valid && entry.tag == tag && visible(entry.version)).then_some(row)
    }
}

/// Result of an exact-match lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExactResult {
    /// A row hit
    pub hit: bool,
    /// Raw match address (the row payload)
    pub address: u32,
    /// Winning way
    pub way: usize,
    /// Winning row within the way
    pub row: usize,
    /// Next table carried by the row
    pub next_table: Option<u8>,
}

impl ExactResult {
    /// A miss.
    pub fn miss() -> Self {
        Self::default()
    }
}

/// A logical exact-match table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExactTable {
    /// Ways, probed in index order
    pub ways: Vec<ExactWay>,
}

impl ExactTable {
    pub fn new(ways: Vec<ExactWay>) -> Self {
        Self { ways }
    }

    /// Slice every way's hash from the hash engine outputs.
    pub fn way_hashes(&self, hashes: &HashOutputs) -> SmallVec<[u64; 8]> {
        self.ways.iter().map(|w| hashes.slice(&w.hash)).collect()
    }

    /// Probe every way. Lowest hitting way wins.
    ///
    /// Ways without a corresponding hash value are not probed.
    pub fn lookup(&self, way_hashes: &[u64], visible: impl Fn(u8) -> bool) -> ExactResult {
        for (way_idx, (way, &hash)) in self.ways.iter().zip(way_hashes).enumerate() {
            if let Some(row) = way.probe(hash, &visible) {
                let entry = &way.rows[row];
                return ExactResult {
                    hit: true,
                    address: entry.payload,
                    way: way_idx,
                    row,
                    next_table: entry.next_table,
                };
            }
        }
        ExactResult::miss()
    }

    /// Probe with every version visible.
    pub fn match_exact(&self, way_hashes: &[u64]) -> ExactResult {
        self.lookup(way_hashes, |_| true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn way(addr_bits: u8, rows: usize) -> ExactWay {
        ExactWay::new(HashSlice::new(0, 0, 20), addr_bits, rows)
    }

    #[test]
    fn test_split() {
        let w = way(4, 16).with_vpn_offset(32);
        assert_eq!(w.split(0xAB5), (32 + 5, 0xAB));
    }

    #[test]
    fn test_hit_on_matching_tag() {
        let mut w = way(4, 16);
        w.rows[5] = ExactRow::new(0xAB, 0x1234);
        let table = ExactTable::new(vec![w]);

        let r = table.match_exact(&[0xAB5]);
        assert!(r.hit);
        assert_eq!(r.address, 0x1234);
        assert_eq!((r.way, r.row), (0, 5));
    }

    #[test]
    fn test_tag_mismatch_misses() {
        let mut w = way(4, 16);
        w.rows[5] = ExactRow::new(0xAA, 0x1234);
        let table = ExactTable::new(vec![w]);

        // Same row, different tag
        let r = table.match_exact(&[0xAB5]);
        assert!(!r.hit);
    }

    #[test]
    fn test_invalid_row_misses() {
        let mut w = way(4, 16);
        w.rows[5] = ExactRow::new(0xAB, 1);
        w.rows[5].valid = false;
        assert!(!ExactTable::new(vec![w]).match_exact(&[0xAB5]).hit);
    }

    #[test]
    fn test_row_beyond_ram_misses() {
        let mut w = way(4, 4).with_vpn_offset(2);
        w.rows[3] = ExactRow::new(0, 9);
        let table = ExactTable::new(vec![w]);
        assert!(table.match_exact(&[0x1]).hit);
        // Row 2 + 5 = 7 does not exist
        assert!(!table.match_exact(&[0x5]).hit);
    }

    #[test]
    fn test_lowest_way_wins() {
        let mut w0 = way(4, 16);
        w0.rows[1] = ExactRow::new(0x7, 100);
        let mut w1 = way(4, 16);
        w1.rows[2] = ExactRow::new(0x7, 200);
        let table = ExactTable::new(vec![w0, w1]);

        let r = table.match_exact(&[0x71, 0x72]);
        assert_eq!((r.way, r.address), (0, 100));

        // Only way 1 hits
        let r = table.match_exact(&[0x00, 0x72]);
        assert_eq!((r.way, r.address), (1, 200));
    }

    #[test]
    fn test_version_visibility() {
        let mut w = way(4, 16);
        w.rows[0] = ExactRow::new(0, 1).with_version(2);
        let table = ExactTable::new(vec![w]);
        assert!(table.lookup(&[0], |v| v >= 2).hit);
        assert!(!table.lookup(&[0], |v| v < 2).hit);
    }

    #[test]
    fn test_row_word_encoding() {
        let row = ExactRow::new(0xDEAD_BEEF_0000_0001, 0x00AB_CDEF)
            .with_version(3)
            .with_next_table(0x42);
        let words = row.to_words();
        assert_eq!(
            words[0],
            0x00AB_CDEF_u64 | (0x42_u64 << 32) | (1_u64 << 40) | (3_u64 << 41) | (1_u64 << 43)
        );
        assert_eq!(words[1], 0xDEAD_BEEF_0000_0001);
        assert_eq!(ExactRow::from_words(words), row);

        let empty = ExactRow::from_words([0, 0]);
        assert!(!empty.valid);
        assert_eq!(empty.next_table, None);
    }

    #[test]
    fn test_decode_rejects_reserved_bits() {
        let words = ExactRow::new(0x5, 0x77).to_words();
        assert_eq!(ExactRow::decode(words), Some(ExactRow::new(0x5, 0x77)));
        assert_eq!(ExactRow::decode([words[0] | (1 << 44), words[1]]), None);
        assert_eq!(ExactRow::decode([1 << 63, 0]), None);
    }

    #[test]
    fn test_way_hashes_slice_engine_output() {
        use crate::bitvec::BitVector;
        use crate::stage::hash::{HashEngine, HashGroup};
        use crate::stage::input_xbar::KeySelect;

        let engine = HashEngine::new(KeySelect::default(), vec![HashGroup::identity(32, 32)]);
        let outputs = engine.compute_hashes(&BitVector::from_u64(0x1234_5678, 32));

        let table = ExactTable::new(vec![
            ExactWay::new(HashSlice::new(0, 0, 16), 8, 256),
            ExactWay::new(HashSlice::new(0, 8, 16), 8, 256),
        ]);
        let hashes = table.way_hashes(&outputs);
        assert_eq!(hashes.as_slice(), &[0x5678, 0x3456]);
    }
}
