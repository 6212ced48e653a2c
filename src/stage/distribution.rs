//! Address distribution unit.
//!
//! Converts a table's match results into the six resource addresses plus the
//! next table. Each resource class is handled independently:
//!
//! ```text
//!   source unwired          -> default            (verbatim)
//!   source wired, no match  -> miss               (verbatim)
//!   source wired, match     -> ((raw >> shift) & mask) & class_width_mask
//! ```
//!
//! All arithmetic is unsigned. Bits above a class's hardware width are dropped
//! silently; a shift of 32 or more yields zero.
//!
//! When a class is wired to both match units (`AddressSource::Any`) and both
//! hit, the table's [`Precedence`] picks the raw address.

use serde::{Deserialize, Serialize};

use super::exact::ExactResult;
use super::spec::{
    ACTION_DATA_ADDR_BITS, ACTION_INSTR_ADDR_BITS, IDLETIME_ADDR_BITS, IMMEDIATE_ADDR_BITS,
    METER_ADDR_BITS, STATS_ADDR_BITS,
};
use super::tcam::TernaryResult;

/// The six per-table output resource classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceClass {
    /// Action instruction memory address
    ActionInstr,
    /// Immediate data address
    Immediate,
    /// Action data RAM address
    ActionData,
    /// Statistics address
    Stats,
    /// Meter address
    Meter,
    /// Idle-time address
    IdleTime,
}

impl ResourceClass {
    /// Every class, in output order.
    pub const ALL: [ResourceClass; 6] = [
        ResourceClass::ActionInstr,
        ResourceClass::Immediate,
        ResourceClass::ActionData,
        ResourceClass::Stats,
        ResourceClass::Meter,
        ResourceClass::IdleTime,
    ];

    /// Hardware address width.
    pub fn width_bits(self) -> u32 {
        match self {
            ResourceClass::ActionInstr => ACTION_INSTR_ADDR_BITS,
            ResourceClass::Immediate => IMMEDIATE_ADDR_BITS,
            ResourceClass::ActionData => ACTION_DATA_ADDR_BITS,
            ResourceClass::Stats => STATS_ADDR_BITS,
            ResourceClass::Meter => METER_ADDR_BITS,
            ResourceClass::IdleTime => IDLETIME_ADDR_BITS,
        }
    }

    /// Mask covering the hardware width.
    #[inline]
    pub fn width_mask(self) -> u32 {
        match self.width_bits() {
            32 => u32::MAX,
            bits => (1u32 << bits) - 1,
        }
    }

    /// Position in [`ResourceClass::ALL`].
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Class at `index` in [`ResourceClass::ALL`].
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

impl std::fmt::Display for ResourceClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ResourceClass::ActionInstr => "action_instr",
            ResourceClass::Immediate => "immediate",
            ResourceClass::ActionData => "action_data",
            ResourceClass::Stats => "stats",
            ResourceClass::Meter => "meter",
            ResourceClass::IdleTime => "idletime",
        };
        write!(f, "{}", name)
    }
}

/// Which match unit drives a resource class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressSource {
    /// Not connected: always the default value
    #[default]
    Unwired,
    /// Ternary match result
    Ternary,
    /// Exact match result
    Exact,
    /// Either unit, resolved by the table precedence
    Any,
}

impl AddressSource {
    /// Register encoding.
    pub fn encode(self) -> u64 {
        match self {
            AddressSource::Unwired => 0,
            AddressSource::Ternary => 1,
            AddressSource::Exact => 2,
            AddressSource::Any => 3,
        }
    }

    /// Decode the register encoding.
    pub fn decode(value: u64) -> Option<Self> {
        match value {
            0 => Some(AddressSource::Unwired),
            1 => Some(AddressSource::Ternary),
            2 => Some(AddressSource::Exact),
            3 => Some(AddressSource::Any),
            _ => None,
        }
    }
}

/// Which unit wins when both hit and a class is wired to both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precedence {
    /// Ternary result takes precedence
    #[default]
    TernaryFirst,
    /// Exact result takes precedence
    ExactFirst,
}

/// Shift, mask and default for one class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ShiftMaskDefault {
    /// Right shift applied to the raw match address
    pub shift: u8,
    /// Mask applied after the shift
    pub mask: u32,
    /// Value used when the class is unwired
    pub default: u32,
}

impl ShiftMaskDefault {
    /// `(raw >> shift) & mask`. Shifts of 32 or more yield zero.
    #[inline]
    pub fn transform(&self, raw: u32) -> u32 {
        raw.checked_shr(self.shift as u32).unwrap_or(0) & self.mask
    }
}

/// Distribution rule for one resource class of one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributionRule {
    /// Driving match unit
    pub source: AddressSource,
    /// Right shift applied to the raw match address
    pub shift: u8,
    /// Mask applied after the shift
    pub mask: u32,
    /// Value when the class is unwired
    pub default: u32,
    /// Value when wired but nothing matched
    pub miss: u32,
}

impl DistributionRule {
    /// An unwired rule that always yields `default`.
    pub fn unwired(default: u32) -> Self {
        Self {
            default,
            ..Default::default()
        }
    }

    /// A wired rule.
    pub fn wired(source: AddressSource, shift: u8, mask: u32, miss: u32) -> Self {
        Self {
            source,
            shift,
            mask,
            default: 0,
            miss,
        }
    }

    /// The shift/mask/default triple.
    pub fn shift_mask_default(&self) -> ShiftMaskDefault {
        ShiftMaskDefault {
            shift: self.shift,
            mask: self.mask,
            default: self.default,
        }
    }

    /// Resolve this rule for one class.
    ///
    /// `raw` is the raw address selected for this rule's source, or `None` if
    /// that source did not hit.
    pub fn resolve(&self, class: ResourceClass, raw: Option<u32>) -> u32 {
        if self.source == AddressSource::Unwired {
            return self.default;
        }
        match raw {
            Some(raw) => self.shift_mask_default().transform(raw) & class.width_mask(),
            None => self.miss,
        }
    }
}

/// Next-table selection for a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NextTableRule {
    /// Used on a hit whose entry carries no next table
    pub hit: u8,
    /// Used on a miss
    pub miss: u8,
}

/// Per-table distribution configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DistributionRules {
    /// Rules indexed by [`ResourceClass::index`]
    pub rules: [DistributionRule; 6],
    /// Tie-break when a class is wired to both units
    pub precedence: Precedence,
    /// Next-table selection
    pub next_table: NextTableRule,
}

impl DistributionRules {
    /// Rule for one class.
    #[inline]
    pub fn rule(&self, class: ResourceClass) -> &DistributionRule {
        &self.rules[class.index()]
    }

    /// Mutable rule for one class.
    #[inline]
    pub fn rule_mut(&mut self, class: ResourceClass) -> &mut DistributionRule {
        &mut self.rules[class.index()]
    }

    /// Replace the rule for one class.
    pub fn with_rule(mut self, class: ResourceClass, rule: DistributionRule) -> Self {
        self.rules[class.index()] = rule;
        self
    }

    /// Set the precedence.
    pub fn with_precedence(mut self, precedence: Precedence) -> Self {
        self.precedence = precedence;
        self
    }

    /// Set the next-table rule.
    pub fn with_next_table(mut self, hit: u8, miss: u8) -> Self {
        self.next_table = NextTableRule { hit, miss };
        self
    }

    /// Pick the winning unit among those a source allows.
    fn select(&self, source: AddressSource, ternary: &TernaryResult, exact: &ExactResult) -> Winner {
        let t = ternary.hit.then_some(Winner::Ternary);
        let e = exact.hit.then_some(Winner::Exact);
        let winner = match source {
            AddressSource::Unwired => None,
            AddressSource::Ternary => t,
            AddressSource::Exact => e,
            AddressSource::Any => match self.precedence {
                Precedence::TernaryFirst => t.or(e),
                Precedence::ExactFirst => e.or(t),
            },
        };
        winner.unwrap_or(Winner::None)
    }

    /// Derive every resource address from one table's match results.
    pub fn distribute(&self, ternary: &TernaryResult, exact: &ExactResult) -> ResourceAddresses {
        let mut out = ResourceAddresses::default();
        for class in ResourceClass::ALL {
            let rule = self.rule(class);
            let raw = match self.select(rule.source, ternary, exact) {
                Winner::Ternary => Some(ternary.address),
                Winner::Exact => Some(exact.address),
                Winner::None => None,
            };
            out.set(class, rule.resolve(class, raw));
        }

        // Next table follows the table-level precedence over whichever unit hit
        let next = match self.select(AddressSource::Any, ternary, exact) {
            Winner::Ternary => Some(ternary.next_table.unwrap_or(self.next_table.hit)),
            Winner::Exact => Some(exact.next_table.unwrap_or(self.next_table.hit)),
            Winner::None => None,
        };
        out.next_table = next.unwrap_or(self.next_table.miss);
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Winner {
    Ternary,
    Exact,
    None,
}

/// Distributed resource addresses for one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResourceAddresses {
    pub action_instr: u32,
    pub immediate: u32,
    pub action_data: u32,
    pub stats: u32,
    pub meter: u32,
    pub idletime: u32,
    pub next_table: u8,
}

impl ResourceAddresses {
    /// Address for one class.
    pub fn get(&self, class: ResourceClass) -> u32 {
        match class {
            ResourceClass::ActionInstr => self.action_instr,
            ResourceClass::Immediate => self.immediate,
            ResourceClass::ActionData => self.action_data,
            ResourceClass::Stats => self.stats,
            ResourceClass::Meter => self.meter,
            ResourceClass::IdleTime => self.idletime,
        }
    }

    /// Set the address for one class.
    pub fn set(&mut self, class: ResourceClass, value: u32) {
        match class {
            ResourceClass::ActionInstr => self.action_instr = value,
            ResourceClass::Immediate => self.immediate = value,
            ResourceClass::ActionData => self.action_data = value,
            ResourceClass::Stats => self.stats = value,
            ResourceClass::Meter => self.meter = value,
            ResourceClass::IdleTime => self.idletime = value,
        }
    }
}
