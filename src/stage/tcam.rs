//! Ternary match unit.
//!
//! A logical ternary table spans one or more physical TCAM banks. Each bank
//! holds entries in physical row order and has an output priority that is
//! configured separately from its rows.
//!
//! # Priority
//!
//! Every bank reports its lowest matching row. The winner across banks is
//! then chosen by:
//!
//! 1. lowest physical row,
//! 2. lowest bank output priority,
//! 3. lowest bank index.
//!
//! Since (bank, row) is unique the order is total, so two matching entries
//! never tie. Duplicate value/mask pairs are not diagnosed; the physical
//! order alone decides.
//!
//! # Entry index
//!
//! Entries are numbered flat across banks: bank 0 rows first, then bank 1,
//! and so on. The optional indirection RAM maps that index to the raw match
//! address seen by address distribution.

use crate::bitvec::BitVector;

/// One ternary entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TernaryEntry {
    /// Match value
    pub value: BitVector,
    /// Care mask (1 = compare this bit)
    pub mask: BitVector,
    /// Entry participates in matching
    pub valid: bool,
    /// 2-bit entry version
    pub version: u8,
}

impl TernaryEntry {
    /// A valid version-0 entry.
    pub fn new(value: BitVector, mask: BitVector) -> Self {
        Self {
            value,
            mask,
            valid: true,
            version: 0,
        }
    }

    /// Convenience constructor for keys that fit in one word.
    pub fn from_u64(value: u64, mask: u64, width: usize) -> Self {
        Self::new(BitVector::from_u64(value, width), BitVector::from_u64(mask, width))
    }

    /// Set the entry version.
    pub fn with_version(mut self, version: u8) -> Self {
        self.version = version;
        self
    }

    /// `(key & mask) == (value & mask)`. Ignores validity and version.
    #[inline]
    pub fn matches(&self, key: &BitVector) -> bool {
        key.masked_eq(&self.value, &self.mask)
    }
}

/// One physical TCAM bank.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TcamBank {
    /// Priority among banks of the same table (lower wins a row tie)
    pub output_priority: u8,
    /// Rows per next-table group is `1 << group_shift`
    pub group_shift: u8,
    /// Next table per entry group
    pub next_tables: Vec<u8>,
    /// Entries in physical row order
    pub entries: Vec<TernaryEntry>,
}

impl TcamBank {
    /// A bank of `rows` empty (invalid) entries.
    pub fn new(rows: usize) -> Self {
        Self {
            entries: vec![TernaryEntry::default(); rows],
            ..Default::default()
        }
    }

    /// A bank populated from an entry list.
    pub fn from_entries(entries: Vec<TernaryEntry>) -> Self {
        Self {
            entries,
            ..Default::default()
        }
    }

    /// Next table for a row, if its group has one.
    pub fn next_table(&self, row: usize) -> Option<u8> {
        let group = row.checked_shr(self.group_shift as u32).unwrap_or(0);
        self.next_tables.get(group).copied()
    }

    /// Lowest visible matching row.
    fn first_match(&self, key: &BitVector, visible: &impl Fn(u8) -> bool) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.valid && visible(e.version) && e.matches(key))
    }
}

/// Result of a ternary lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TernaryResult {
    /// An entry matched
    pub hit: bool,
    /// Flat entry index of the winner
    pub entry_index: u32,
    /// Raw match address (indirection applied)
    pub address: u32,
    /// Next table from the winner's entry group
    pub next_table: Option<u8>,
    /// Physical (bank, row) of the winner
    pub location: Option<(usize, usize)>,
}

impl TernaryResult {
    /// A miss.
    pub fn miss() -> Self {
        Self::default()
    }
}

/// A logical ternary table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TernaryTable {
    /// Physical banks
    pub banks: Vec<TcamBank>,
    /// Optional entry-index to raw-address map
    pub indirection: Option<Vec<u32>>,
}

impl TernaryTable {
    pub fn new(banks: Vec<TcamBank>) -> Self {
        Self {
            banks,
            indirection: None,
        }
    }

    /// A single-bank table holding `entries` at rows 0..n.
    pub fn from_entries(entries: Vec<TernaryEntry>) -> Self {
        Self::new(vec![TcamBank::from_entries(entries)])
    }

    /// Attach an indirection RAM.
    pub fn with_indirection(mut self, indirection: Vec<u32>) -> Self {
        self.indirection = Some(indirection);
        self
    }

    /// Total entries across banks.
    pub fn len(&self) -> usize {
        self.banks.iter().map(|b| b.entries.len()).sum()
    }

    /// True if the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flat index of (bank, row).
    pub fn entry_index(&self, bank: usize, row: usize) -> u32 {
        let base: usize = self.banks.iter().take(bank).map(|b| b.entries.len()).sum();
        (base + row) as u32
    }

    /// Match a key against every visible entry.
    ///
    /// `visible` decides, from an entry's version, whether the packet may see
    /// it.
    pub fn lookup(&self, key: &BitVector, visible: impl Fn(u8) -> bool) -> TernaryResult {
        let winner = self
            .banks
            .iter()
            .enumerate()
            .filter_map(|(b, bank)| bank.first_match(key, &visible).map(|row| (b, row)))
            .min_by_key(|&(b, row)| (row, self.banks[b].output_priority, b));

        let Some((bank, row)) = winner else {
            return TernaryResult::miss();
        };

        let entry_index = self.entry_index(bank, row);
        // Indices past the end of the indirection RAM read zero
        let address = match &self.indirection {
            Some(ram) => ram.get(entry_index as usize).copied().unwrap_or(0),
            None => entry_index,
        };

        TernaryResult {
            hit: true,
            entry_index,
            address,
            next_table: self.banks[bank].next_table(row),
            location: Some((bank, row)),
        }
    }

    /// Look up with every version visible.
    pub fn match_ternary(&self, key: &BitVector) -> TernaryResult {
        self.lookup(key, |_| true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::XorShift;

    fn key(v: u64) -> BitVector {
        BitVector::from_u64(v, 8)
    }

    #[test]
    fn test_single_entry_hit_and_miss() {
        let table = TernaryTable::from_entries(vec![TernaryEntry::from_u64(0x10, 0xFF, 8)]);

        let hit = table.match_ternary(&key(0x10));
        assert!(hit.hit);
        assert_eq!(hit.entry_index, 0);

        let miss = table.match_ternary(&key(0x20));
        assert!(!miss.hit);
    }

    #[test]
    fn test_lowest_row_wins() {
        let mut table = TernaryTable::from_entries(vec![
            TernaryEntry::from_u64(0x00, 0x00, 8),
            TernaryEntry::from_u64(0x10, 0xF0, 8),
            TernaryEntry::from_u64(0x12, 0xFF, 8),
        ]);
        // Invalid wildcard at row 0 never matches
        table.banks[0].entries[0].valid = false;

        let r = table.match_ternary(&key(0x12));
        assert_eq!(r.entry_index, 1);
    }

    #[test]
    fn test_row_order_before_output_priority() {
        // Bank 0 matches at row 3, bank 1 at row 1: row order decides even
        // though bank 0 has the better output priority.
        let mut bank0 = TcamBank::new(4);
        bank0.output_priority = 0;
        bank0.entries[3] = TernaryEntry::from_u64(0, 0, 8);

        let mut bank1 = TcamBank::new(4);
        bank1.output_priority = 5;
        bank1.entries[1] = TernaryEntry::from_u64(0, 0, 8);

        let table = TernaryTable::new(vec![bank0, bank1]);
        let r = table.match_ternary(&key(0xAB));
        assert_eq!(r.location, Some((1, 1)));
        assert_eq!(r.entry_index, 5);
    }

    #[test]
    fn test_output_priority_breaks_row_ties() {
        let mut bank0 = TcamBank::new(2);
        bank0.output_priority = 3;
        bank0.entries[0] = TernaryEntry::from_u64(0, 0, 8);

        let mut bank1 = TcamBank::new(2);
        bank1.output_priority = 1;
        bank1.entries[0] = TernaryEntry::from_u64(0, 0, 8);

        let table = TernaryTable::new(vec![bank0.clone(), bank1.clone()]);
        assert_eq!(table.match_ternary(&key(0)).location, Some((1, 0)));

        // Equal priorities fall back to bank index
        bank1.output_priority = 3;
        let table = TernaryTable::new(vec![bank0, bank1]);
        assert_eq!(table.match_ternary(&key(0)).location, Some((0, 0)));
    }

    #[test]
    fn test_duplicate_entries_resolved_by_position() {
        let e = TernaryEntry::from_u64(0x42, 0xFF, 8);
        let table = TernaryTable::from_entries(vec![TernaryEntry::default(), e.clone(), e]);
        assert_eq!(table.match_ternary(&key(0x42)).entry_index, 1);
    }

    #[test]
    fn test_next_table_groups() {
        let mut bank = TcamBank::from_entries(vec![TernaryEntry::from_u64(0, 0xFF, 8); 4]);
        bank.entries[0].valid = false;
        bank.entries[1].valid = false;
        bank.group_shift = 1;
        bank.next_tables = vec![7, 9];

        let table = TernaryTable::new(vec![bank]);
        let r = table.match_ternary(&key(0));
        assert_eq!(r.entry_index, 2);
        assert_eq!(r.next_table, Some(9));
    }

    #[test]
    fn test_indirection() {
        let table = TernaryTable::from_entries(vec![
            TernaryEntry::from_u64(0x1, 0xFF, 8),
            TernaryEntry::from_u64(0x2, 0xFF, 8),
        ])
        .with_indirection(vec![0x100]);

        assert_eq!(table.match_ternary(&key(1)).address, 0x100);
        // Past the end of the indirection RAM
        assert_eq!(table.match_ternary(&key(2)).address, 0);
    }

    #[test]
    fn test_version_visibility() {
        let table = TernaryTable::from_entries(vec![
            TernaryEntry::from_u64(0, 0, 8).with_version(1),
            TernaryEntry::from_u64(0, 0, 8).with_version(2),
        ]);
        let r = table.lookup(&key(0), |v| v == 2);
        assert_eq!(r.entry_index, 1);
        assert!(!table.lookup(&key(0), |v| v == 3).hit);
    }

    #[test]
    fn test_wide_keys() {
        let mut value = BitVector::new(100);
        value.set(99, true);
        let mut mask = BitVector::new(100);
        mask.set(99, true);
        mask.set(0, true);
        let table = TernaryTable::from_entries(vec![TernaryEntry::new(value, mask)]);

        let mut k = BitVector::new(100);
        k.set(99, true);
        k.set(50, true);
        assert!(table.match_ternary(&k).hit);
        k.set(0, true);
        assert!(!table.match_ternary(&k).hit);
    }

    #[test]
    fn test_priority_monotonicity() {
        let mut rng = XorShift::new(0xC0FF_EE00);
        for _ in 0..200 {
            let entries: Vec<TernaryEntry> = (0..8)
                .map(|_| TernaryEntry::from_u64(rng.next() & 0xFF, rng.next() & 0xFF, 8))
                .collect();
            let k = key(rng.next() & 0xFF);
            let table = TernaryTable::from_entries(entries.clone());
            let base = table.match_ternary(&k);

            if base.hit {
                // Removing any lower-priority entry leaves the result alone
                for victim in (base.entry_index as usize + 1)..entries.len() {
                    let mut t = table.clone();
                    t.banks[0].entries[victim].valid = false;
                    assert_eq!(t.match_ternary(&k).entry_index, base.entry_index);
                }
            }

            // Inserting a matching entry at higher priority can only make it win
            let insert_at = match base.hit {
                true => rng.next() as usize % (base.entry_index as usize + 1),
                false => rng.next() as usize % entries.len(),
            };
            let mut t = table.clone();
            t.banks[0].entries.insert(insert_at, TernaryEntry::from_u64(k.to_u64(), 0xFF, 8));
            let r = t.match_ternary(&k);
            assert!(r.hit);
            assert_eq!(r.entry_index as usize, insert_at);
        }
    }
}
