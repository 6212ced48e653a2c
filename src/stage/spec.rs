//! Match-action stage architecture constants.
//!
//! Field widths and memory geometry that the model enforces. Address widths
//! are applied after a distribution rule's shift and mask, reproducing the
//! hardware's silent truncation.

// ============================================================================
// Hash Engine
// ============================================================================

/// Number of independent hash groups per stage.
pub const NUM_HASH_GROUPS: usize = 8;

/// Typical hash group output width.
pub const HASH_GROUP_BITS: usize = 52;

/// Widest hash group the model supports (one machine word).
pub const MAX_HASH_GROUP_BITS: usize = 64;

/// Maximum input crossbar width in bytes (1024 bits).
pub const MAX_INPUT_XBAR_BYTES: usize = 128;

// ============================================================================
// Tables
// ============================================================================

/// Maximum logical tables per stage.
pub const MAX_LOGICAL_TABLES: usize = 16;

/// Entry version field width.
pub const VERSION_BITS: u32 = 2;

/// Number of distinct packet versions.
pub const NUM_VERSIONS: usize = 1 << VERSION_BITS;

/// Largest version value.
pub const MAX_VERSION: u8 = (NUM_VERSIONS - 1) as u8;

// ============================================================================
// Resource Address Widths
// ============================================================================

/// Action instruction address width.
pub const ACTION_INSTR_ADDR_BITS: u32 = 7;

/// Immediate data address width.
pub const IMMEDIATE_ADDR_BITS: u32 = 32;

/// Action data RAM address width.
pub const ACTION_DATA_ADDR_BITS: u32 = 23;

/// Statistics address width.
pub const STATS_ADDR_BITS: u32 = 19;

/// Meter address width.
pub const METER_ADDR_BITS: u32 = 23;

/// Idle-time address width.
pub const IDLETIME_ADDR_BITS: u32 = 21;

// ============================================================================
// Action Buses
// ============================================================================

/// Immediate data bus width: one 32-bit row.
pub const IMMEDIATE_BUS_BYTES: usize = 4;

/// Action data bus width: one 128-bit RAM row.
pub const ACTION_DATA_BUS_BYTES: usize = 16;

/// Number of 64-bit words in a wide configuration row.
pub const WIDE_ROW_WORDS: usize = 2;
