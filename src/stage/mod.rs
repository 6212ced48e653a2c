//! Match-action stage model.
//!
//! One pipeline stage, evaluated one packet at a time:
//!
//! ```text
//!   PHV in
//!     |
//!     +--> input_xbar --> hash ------> exact ----+
//!     |                                          +--> distribution --> action --> PHV out
//!     +--> table key ------------------> tcam ---+
//! ```
//!
//! - [`input_xbar`]: byte selects from the PHV into keys
//! - [`hash`]: GF(2) hash groups over the stage-wide input vector
//! - [`tcam`]: ternary match with physical-row priority
//! - [`exact`]: multi-way hash match with tag and version checks
//! - [`distribution`]: raw match address to per-resource addresses
//! - [`action`]: operand placement into output containers
//! - [`table`]: logical tables tying the units together
//! - [`engine`]: [`process_packet`]

pub mod action;
pub mod distribution;
pub mod engine;
pub mod exact;
pub mod hash;
pub mod input_xbar;
pub mod spec;
pub mod table;
pub mod tcam;

pub use action::{ActionInstruction, ActionMemory, Bus, ContainerOp, Granularity, OperandSource};
pub use distribution::{
    AddressSource, DistributionRule, DistributionRules, NextTableRule, Precedence,
    ResourceAddresses, ResourceClass,
};
pub use engine::{process_packet, StageOutput};
pub use exact::{ExactResult, ExactRow, ExactTable, ExactWay};
pub use hash::{HashEngine, HashGroup, HashOutputs, HashSlice, HashValue};
pub use input_xbar::{ByteSelect, KeySelect};
pub use table::{LogicalTable, TableResult, VersionWindow};
pub use tcam::{TcamBank, TernaryEntry, TernaryResult, TernaryTable};
