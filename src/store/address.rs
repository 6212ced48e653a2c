//! Configuration addresses.
//!
//! Addresses name a field of the stage configuration structurally rather than
//! by a physical register offset. Scalar addresses carry one 64-bit value,
//! row addresses carry a two-word wide row.
//!
//! # Scalar encodings
//!
//! ```text
//! TcamControl        [0] valid  [2:1] version
//! OperandSelect      [1:0] kind  [3:2] granularity  [11:4] slot
//! VersionWindow      [1:0] lo  [9:8] hi
//! DistSource         0 unwired, 1 ternary, 2 exact, 3 any
//! Precedence         0 ternary-first, 1 exact-first
//! ```
//!
//! # Row encodings
//!
//! ```text
//! TcamEntry   word0 = value chunk, word1 = mask chunk (64-bit chunk `word`)
//! ExactRow    word0 = [31:0] payload [39:32] next table [40] nt valid
//!                     [42:41] version [43] valid
//!             word1 = tag
//! ActionData  word0 = bytes 0..8, word1 = bytes 8..16
//! ```

use std::fmt;

use crate::stage::distribution::ResourceClass;

/// Address of a scalar configuration field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigAddress {
    /// Hash group seed
    HashSeed { group: usize },
    /// 64-bit chunk `word` of the coefficient row driving `output_bit`
    HashCoefficients {
        group: usize,
        output_bit: usize,
        word: usize,
    },
    /// Valid bit and version of a TCAM row
    TcamControl { table: u8, bank: usize, row: usize },
    /// Output priority of a TCAM bank
    TcamPriority { table: u8, bank: usize },
    /// Next table of a TCAM entry group
    TcamNextTable {
        table: u8,
        bank: usize,
        group: usize,
    },
    /// Ternary indirection RAM entry
    TernaryIndirection { table: u8, index: usize },
    /// Virtual page offset of an exact way
    ExactVpnOffset { table: u8, way: usize },
    /// Source of a resource class
    DistSource { table: u8, class: ResourceClass },
    /// Right shift of a resource class
    DistShift { table: u8, class: ResourceClass },
    /// Mask of a resource class
    DistMask { table: u8, class: ResourceClass },
    /// Default (unwired) value of a resource class
    DistDefault { table: u8, class: ResourceClass },
    /// Miss value of a resource class
    DistMiss { table: u8, class: ResourceClass },
    /// Ternary/exact precedence
    Precedence { table: u8 },
    /// Next table on a hit without an entry next table
    NextTableHit { table: u8 },
    /// Next table on a miss
    NextTableMiss { table: u8 },
    /// Visible entry versions for one packet version
    VersionWindow { table: u8, packet_version: u8 },
    /// Crossbar source of one container in one instruction
    OperandSelect { instruction: usize, container: usize },
    /// Immediate data row
    Immediate { row: usize },
}

impl ConfigAddress {
    /// Table this address belongs to, if any.
    pub fn table(&self) -> Option<u8> {
        match *self {
            ConfigAddress::TcamControl { table, .. }
            | ConfigAddress::TcamPriority { table, .. }
            | ConfigAddress::TcamNextTable { table, .. }
            | ConfigAddress::TernaryIndirection { table, .. }
            | ConfigAddress::ExactVpnOffset { table, .. }
            | ConfigAddress::DistSource { table, .. }
            | ConfigAddress::DistShift { table, .. }
            | ConfigAddress::DistMask { table, .. }
            | ConfigAddress::DistDefault { table, .. }
            | ConfigAddress::DistMiss { table, .. }
            | ConfigAddress::Precedence { table }
            | ConfigAddress::NextTableHit { table }
            | ConfigAddress::NextTableMiss { table }
            | ConfigAddress::VersionWindow { table, .. } => Some(table),
            ConfigAddress::HashSeed { .. }
            | ConfigAddress::HashCoefficients { .. }
            | ConfigAddress::OperandSelect { .. }
            | ConfigAddress::Immediate { .. } => None,
        }
    }
}

impl fmt::Display for ConfigAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigAddress::HashSeed { group } => write!(f, "hash[{}].seed", group),
            ConfigAddress::HashCoefficients {
                group,
                output_bit,
                word,
            } => write!(f, "hash[{}].coeff[{}].word[{}]", group, output_bit, word),
            ConfigAddress::TcamControl { table, bank, row } => {
                write!(f, "table[{}].tcam[{}].row[{}].control", table, bank, row)
            }
            ConfigAddress::TcamPriority { table, bank } => {
                write!(f, "table[{}].tcam[{}].priority", table, bank)
            }
            ConfigAddress::TcamNextTable { table, bank, group } => {
                write!(f, "table[{}].tcam[{}].next_table[{}]", table, bank, group)
            }
            ConfigAddress::TernaryIndirection { table, index } => {
                write!(f, "table[{}].indirection[{}]", table, index)
            }
            ConfigAddress::ExactVpnOffset { table, way } => {
                write!(f, "table[{}].way[{}].vpn_offset", table, way)
            }
            ConfigAddress::DistSource { table, class } => {
                write!(f, "table[{}].{}.source", table, class)
            }
            ConfigAddress::DistShift { table, class } => {
                write!(f, "table[{}].{}.shift", table, class)
            }
            ConfigAddress::DistMask { table, class } => {
                write!(f, "table[{}].{}.mask", table, class)
            }
            ConfigAddress::DistDefault { table, class } => {
                write!(f, "table[{}].{}.default", table, class)
            }
            ConfigAddress::DistMiss { table, class } => {
                write!(f, "table[{}].{}.miss", table, class)
            }
            ConfigAddress::Precedence { table } => write!(f, "table[{}].precedence", table),
            ConfigAddress::NextTableHit { table } => write!(f, "table[{}].next_table.hit", table),
            ConfigAddress::NextTableMiss { table } => {
                write!(f, "table[{}].next_table.miss", table)
            }
            ConfigAddress::VersionWindow {
                table,
                packet_version,
            } => write!(f, "table[{}].version_window[{}]", table, packet_version),
            ConfigAddress::OperandSelect {
                instruction,
                container,
            } => write!(f, "instr[{}].operand[{}]", instruction, container),
            ConfigAddress::Immediate { row } => write!(f, "immediate[{}]", row),
        }
    }
}

/// Address of a wide (two-word) configuration row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowAddress {
    /// 64-bit chunk `word` of a TCAM entry's value and mask
    TcamEntry {
        table: u8,
        bank: usize,
        row: usize,
        word: usize,
    },
    /// Exact-match way row
    ExactRow { table: u8, way: usize, row: usize },
    /// Action data RAM row
    ActionData { row: usize },
}

impl fmt::Display for RowAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowAddress::TcamEntry {
                table,
                bank,
                row,
                word,
            } => write!(f, "table[{}].tcam[{}].row[{}].word[{}]", table, bank, row, word),
            RowAddress::ExactRow { table, way, row } => {
                write!(f, "table[{}].way[{}].row[{}]", table, way, row)
            }
            RowAddress::ActionData { row } => write!(f, "action_data[{}]", row),
        }
    }
}
