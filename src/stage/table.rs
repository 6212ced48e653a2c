//! Logical match tables.
//!
//! A logical table bundles a ternary part, an exact part (either or both may
//! be absent), the distribution rules that turn their results into resource
//! addresses, and the version windows that decide which entries a packet may
//! see.

use serde::{Deserialize, Serialize};

use crate::phv::{Gress, PacketVersion, Phv};

use super::distribution::{DistributionRules, ResourceAddresses};
use super::exact::{ExactResult, ExactTable};
use super::hash::HashOutputs;
use super::input_xbar::KeySelect;
use super::spec::{MAX_VERSION, NUM_VERSIONS};
use super::tcam::{TernaryResult, TernaryTable};

/// Inclusive range of entry versions visible to one packet version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionWindow {
    pub lo: u8,
    pub hi: u8,
}

impl Default for VersionWindow {
    fn default() -> Self {
        Self::full()
    }
}

impl VersionWindow {
    pub fn new(lo: u8, hi: u8) -> Self {
        Self { lo, hi }
    }

    /// Every version visible.
    pub fn full() -> Self {
        Self::new(0, MAX_VERSION)
    }

    /// Exactly one version visible.
    pub fn only(version: u8) -> Self {
        Self::new(version, version)
    }

    #[inline]
    pub fn contains(&self, version: u8) -> bool {
        self.lo <= version && version <= self.hi
    }

    /// Register encoding: `[1:0]` lo, `[9:8]` hi.
    pub fn encode(&self) -> u64 {
        (self.lo as u64 & 0x3) | ((self.hi as u64 & 0x3) << 8)
    }

    /// Decode the register encoding. Reserved bits must be zero.
    pub fn decode(value: u64) -> Option<Self> {
        if value & !0x303 != 0 {
            return None;
        }
        Some(Self::new((value & 0x3) as u8, ((value >> 8) & 0x3) as u8))
    }
}

/// Lookup results of one table for one packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TableResult {
    /// Logical table id
    pub table_id: u8,
    /// Ternary part result (miss if the table has no ternary part)
    pub ternary: TernaryResult,
    /// Exact part result (miss if the table has no exact part)
    pub exact: ExactResult,
    /// Distributed addresses, including the next table
    pub addresses: ResourceAddresses,
}

impl TableResult {
    /// True if either part hit.
    pub fn hit(&self) -> bool {
        self.ternary.hit || self.exact.hit
    }

    /// Next table chosen by distribution.
    pub fn next_table(&self) -> u8 {
        self.addresses.next_table
    }
}

/// One logical match table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogicalTable {
    /// Logical table id, unique in the stage
    pub id: u8,
    /// Human-readable name
    pub name: String,
    /// Pipeline the table belongs to
    pub gress: Gress,
    /// Ternary key select
    pub key: KeySelect,
    /// Ternary part
    pub ternary: Option<TernaryTable>,
    /// Exact part
    pub exact: Option<ExactTable>,
    /// Address distribution rules
    pub distribution: DistributionRules,
    /// Visible entry versions, indexed by packet version
    pub version_windows: [VersionWindow; NUM_VERSIONS],
}

impl LogicalTable {
    /// An empty ingress table.
    pub fn new(id: u8, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_gress(mut self, gress: Gress) -> Self {
        self.gress = gress;
        self
    }

    pub fn with_key(mut self, key: KeySelect) -> Self {
        self.key = key;
        self
    }

    pub fn with_ternary(mut self, ternary: TernaryTable) -> Self {
        self.ternary = Some(ternary);
        self
    }

    pub fn with_exact(mut self, exact: ExactTable) -> Self {
        self.exact = Some(exact);
        self
    }

    pub fn with_distribution(mut self, distribution: DistributionRules) -> Self {
        self.distribution = distribution;
        self
    }

    /// Set the window for one packet version.
    pub fn with_version_window(mut self, packet_version: u8, window: VersionWindow) -> Self {
        if let Some(w) = self.version_windows.get_mut(packet_version as usize) {
            *w = window;
        }
        self
    }

    /// True if a packet of this gress is looked up in this table.
    #[inline]
    pub fn applies_to(&self, packet: PacketVersion) -> bool {
        self.gress == packet.gress
    }

    /// Window for a packet version.
    #[inline]
    pub fn window(&self, packet_version: u8) -> VersionWindow {
        self.version_windows[(packet_version & MAX_VERSION) as usize]
    }

    /// Look up one packet. Returns `None` if the packet's gress skips this table.
    pub fn evaluate(
        &self,
        phv: &Phv,
        hashes: &HashOutputs,
        packet: PacketVersion,
    ) -> Option<TableResult> {
        if !self.applies_to(packet) {
            return None;
        }
        let window = self.window(packet.version);
        let visible = |v: u8| window.contains(v);

        let ternary = match &self.ternary {
            Some(t) => t.lookup(&self.key.assemble(phv), visible),
            None => TernaryResult::miss(),
        };
        let exact = match &self.exact {
            Some(e) => e.lookup(&e.way_hashes(hashes), visible),
            None => ExactResult::miss(),
        };
        let addresses = self.distribution.distribute(&ternary, &exact);

        Some(TableResult {
            table_id: self.id,
            ternary,
            exact,
            addresses,
        })
    }
}
