//! Stage program files.
//!
//! A stage program is a TOML document describing one stage's complete
//! configuration. It is parsed into plain data structures and then fed
//! through [`StageConfigBuilder`], so a program that loads is always valid.
//!
//! # Example Program
//!
//! ```toml
//! phv = "tofino"          # or: containers = [32, 32, 16, 8]
//!
//! [hash]
//! input = { containers = [0] }
//!
//! [[hash.groups]]
//! identity = 32
//!
//! [[tables]]
//! id = 0
//! name = "acl"
//! key = { containers = [0] }
//! next_table = { hit = 1, miss = 255 }
//!
//! [[tables.ternary.banks]]
//! rows = 16
//! entries = [{ value = "0x0a000000", mask = "0xff000000" }]
//!
//! [tables.distribution.action_instr]
//! source = "ternary"
//! mask = 0x7f
//!
//! [[actions.instructions]]
//! index = 0
//! ops = [{ container = 1, kind = "slot", bus = "immediate", granularity = "word", slot = 0 }]
//! ```
//!
//! Values wider than a TOML integer (masks, tags, seeds, coefficient rows) are
//! written as hex strings. Narrow values may use either form.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::bitvec::BitVector;
use crate::config::Config;
use crate::phv::{ContainerWidth, Gress, PhvLayout};
use crate::stage::{
    ActionInstruction, ActionMemory, ByteSelect, DistributionRule, DistributionRules, ExactRow,
    ExactTable, ExactWay, HashEngine, HashGroup, HashSlice, KeySelect, LogicalTable,
    OperandSource, Precedence, ResourceClass, TcamBank, TernaryEntry, TernaryTable,
    VersionWindow,
};
use crate::store::{ConfigError, StageConfig, StageConfigBuilder};

/// An integer given either as a TOML integer or as a (hex or decimal) string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Int(u64),
    Str(String),
}

impl Default for Literal {
    fn default() -> Self {
        Literal::Int(0)
    }
}

impl Literal {
    /// Value as a 64-bit word.
    pub fn to_u64(&self) -> Result<u64, ConfigError> {
        match self {
            Literal::Int(v) => Ok(*v),
            Literal::Str(s) => {
                let t = s.trim().replace('_', "");
                let parsed = match t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
                    Some(hex) => u64::from_str_radix(hex, 16),
                    None => t.parse(),
                };
                parsed.map_err(|_| ConfigError::BadLiteral(s.clone()))
            }
        }
    }

    /// Value as a bit vector of `width` bits.
    ///
    /// `0x` strings may be wider than 64 bits; anything else is read as by
    /// [`Literal::to_u64`].
    pub fn to_bits(&self, width: usize) -> Result<BitVector, ConfigError> {
        if let Literal::Str(s) = self {
            let t = s.trim();
            if t.starts_with("0x") || t.starts_with("0X") {
                return BitVector::from_hex(t, width)
                    .map_err(|e| ConfigError::BadLiteral(e.to_string()));
            }
        }
        let v = self.to_u64()?;
        let bv = BitVector::from_u64(v, width);
        if bv.to_u64() != v {
            return Err(ConfigError::BadLiteral(format!(
                "{:#x} does not fit in {} bits",
                v, width
            )));
        }
        Ok(bv)
    }
}

/// Top-level program document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProgramDef {
    /// PHV layout preset name
    pub phv: Option<String>,
    /// Explicit container widths, overriding `phv`
    pub containers: Option<Vec<ContainerWidth>>,
    pub hash: HashDef,
    pub tables: Vec<TableDef>,
    pub actions: ActionsDef,
}

/// Key select: whole containers, then individual bytes.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KeyDef {
    pub containers: Vec<usize>,
    pub bytes: Vec<ByteSelect>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HashDef {
    pub input: KeyDef,
    pub groups: Vec<HashGroupDef>,
}

/// One hash group: either `identity = <bits>` or explicit `rows`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HashGroupDef {
    pub identity: Option<usize>,
    /// Coefficient row per output bit, bit 0 first
    pub rows: Vec<Literal>,
    pub seed: Literal,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TableDef {
    pub id: u8,
    pub name: String,
    pub gress: Gress,
    pub key: KeyDef,
    pub ternary: Option<TernaryDef>,
    pub exact: Option<ExactDef>,
    pub distribution: DistributionDef,
    pub precedence: Precedence,
    pub next_table: NextTableDef,
    /// Windows for packet versions 0, 1, ...; missing ones see every version
    pub version_windows: Vec<VersionWindow>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NextTableDef {
    pub hit: u8,
    pub miss: u8,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TernaryDef {
    pub banks: Vec<BankDef>,
    pub indirection: Option<Vec<u32>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BankDef {
    pub output_priority: u8,
    pub group_shift: u8,
    pub next_tables: Vec<u8>,
    /// Bank depth; grows to fit `entries`
    pub rows: usize,
    /// Entries from row 0
    pub entries: Vec<TernaryEntryDef>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TernaryEntryDef {
    pub value: Literal,
    pub mask: Literal,
    #[serde(default = "default_valid")]
    pub valid: bool,
    #[serde(default)]
    pub version: u8,
}

fn default_valid() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExactDef {
    pub ways: Vec<WayDef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WayDef {
    pub hash: HashSlice,
    pub addr_bits: u8,
    pub vpn_offset: u32,
    pub rows: usize,
    pub entries: Vec<ExactEntryDef>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExactEntryDef {
    pub row: usize,
    pub tag: Literal,
    pub payload: u32,
    #[serde(default)]
    pub version: u8,
    #[serde(default)]
    pub next_table: Option<u8>,
}

/// Distribution rule per resource class; missing classes are unwired.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DistributionDef {
    pub action_instr: Option<DistributionRule>,
    pub immediate: Option<DistributionRule>,
    pub action_data: Option<DistributionRule>,
    pub stats: Option<DistributionRule>,
    pub meter: Option<DistributionRule>,
    pub idletime: Option<DistributionRule>,
}

impl DistributionDef {
    fn rule(&self, class: ResourceClass) -> Option<DistributionRule> {
        match class {
            ResourceClass::ActionInstr => self.action_instr,
            ResourceClass::Immediate => self.immediate,
            ResourceClass::ActionData => self.action_data,
            ResourceClass::Stats => self.stats,
            ResourceClass::Meter => self.meter,
            ResourceClass::IdleTime => self.idletime,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ActionsDef {
    /// Depths; each memory grows to fit its listed contents
    pub instruction_rows: usize,
    pub immediate_rows: usize,
    pub action_data_rows: usize,
    pub instructions: Vec<InstructionDef>,
    /// Immediate rows from row 0
    pub immediate: Vec<u32>,
    /// Action data rows from row 0, two words each
    pub action_data: Vec<[Literal; 2]>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InstructionDef {
    pub index: usize,
    pub ops: Vec<OpDef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpDef {
    pub container: usize,
    #[serde(flatten)]
    pub source: OperandSource,
}

fn key_select(layout: &PhvLayout, def: &KeyDef) -> KeySelect {
    let mut bytes = KeySelect::containers(layout, &def.containers).bytes().to_vec();
    bytes.extend_from_slice(&def.bytes);
    KeySelect::new(bytes)
}

impl ProgramDef {
    /// Parse a program document.
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).context("Failed to parse stage program")
    }

    /// PHV layout, falling back to `default` when the program names none.
    pub fn layout(&self, default: &PhvLayout) -> Result<PhvLayout> {
        if let Some(widths) = &self.containers {
            return Ok(PhvLayout::new(widths.clone()));
        }
        match &self.phv {
            Some(name) => PhvLayout::from_preset(name)
                .with_context(|| format!("Unknown PHV preset '{}'", name)),
            None => Ok(default.clone()),
        }
    }

    /// Build and validate the stage configuration.
    pub fn build(&self, default_layout: &PhvLayout) -> Result<StageConfig> {
        let layout = self.layout(default_layout)?;
        let hash = self.build_hash(&layout)?;

        let mut builder = StageConfigBuilder::new(layout.clone()).hash(hash);
        for def in &self.tables {
            let table = build_table(&layout, def)
                .with_context(|| format!("Invalid table {} ({})", def.id, def.name))?;
            builder = builder.table(table);
        }
        builder = builder.actions(self.build_actions()?);

        Ok(builder.build()?)
    }

    fn build_hash(&self, layout: &PhvLayout) -> Result<HashEngine> {
        let input = key_select(layout, &self.hash.input);
        let input_bits = input.width_bits();

        let mut groups = Vec::with_capacity(self.hash.groups.len());
        for (index, def) in self.hash.groups.iter().enumerate() {
            let mut group = match def.identity {
                Some(bits) => HashGroup::identity(bits, input_bits),
                None => {
                    let rows = def
                        .rows
                        .iter()
                        .map(|r| r.to_bits(input_bits))
                        .collect::<Result<Vec<_>, _>>()
                        .with_context(|| format!("Invalid coefficients in hash group {}", index))?;
                    HashGroup::new(rows, 0)
                }
            };
            group.seed = def.seed.to_u64()?;
            groups.push(group);
        }
        Ok(HashEngine::new(input, groups))
    }

    fn build_actions(&self) -> Result<ActionMemory> {
        let def = &self.actions;
        let instr_rows = def
            .instructions
            .iter()
            .map(|i| i.index + 1)
            .max()
            .unwrap_or(0)
            .max(def.instruction_rows);
        let mut mem = ActionMemory::with_capacity(
            instr_rows,
            def.immediate_rows.max(def.immediate.len()),
            def.action_data_rows.max(def.action_data.len()),
        );

        for instr in &def.instructions {
            let mut built = ActionInstruction::new();
            for op in &instr.ops {
                built.set_op(op.container, op.source);
            }
            mem.instructions[instr.index] = built;
        }
        mem.immediate[..def.immediate.len()].copy_from_slice(&def.immediate);
        for (row, [lo, hi]) in def.action_data.iter().enumerate() {
            mem.action_data[row] = [lo.to_u64()?, hi.to_u64()?];
        }
        Ok(mem)
    }

    /// Read and build a program file.
    ///
    /// Relative paths resolve against the configured program directory. The
    /// configured PHV preset is the default layout.
    pub fn load(path: impl AsRef<Path>) -> Result<StageConfig> {
        let settings = Config::get();
        let path = settings.resolve_program(path);
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read program {}", path.display()))?;
        let config = Self::parse(&text)?
            .build(&settings.phv_layout())
            .with_context(|| format!("Invalid program {}", path.display()))?;
        log::info!("Loaded stage program {}", path.display());
        Ok(config)
    }
}

fn build_table(layout: &PhvLayout, def: &TableDef) -> Result<LogicalTable, ConfigError> {
    let key = key_select(layout, &def.key);
    let key_bits = key.width_bits();

    let mut distribution = DistributionRules::default()
        .with_precedence(def.precedence)
        .with_next_table(def.next_table.hit, def.next_table.miss);
    for class in ResourceClass::ALL {
        if let Some(rule) = def.distribution.rule(class) {
            distribution = distribution.with_rule(class, rule);
        }
    }

    let mut table = LogicalTable::new(def.id, def.name.clone())
        .with_gress(def.gress)
        .with_key(key)
        .with_distribution(distribution);

    if def.version_windows.len() > table.version_windows.len() {
        return Err(ConfigError::IndexOutOfRange {
            what: "packet version",
            index: def.version_windows.len() - 1,
            limit: table.version_windows.len(),
        });
    }
    for (version, window) in def.version_windows.iter().enumerate() {
        table.version_windows[version] = *window;
    }

    if let Some(ternary) = &def.ternary {
        let mut banks = Vec::with_capacity(ternary.banks.len());
        for bank_def in &ternary.banks {
            let mut bank = TcamBank::new(bank_def.rows.max(bank_def.entries.len()));
            bank.output_priority = bank_def.output_priority;
            bank.group_shift = bank_def.group_shift;
            bank.next_tables = bank_def.next_tables.clone();
            for (row, e) in bank_def.entries.iter().enumerate() {
                let mut entry = TernaryEntry::new(e.value.to_bits(key_bits)?, e.mask.to_bits(key_bits)?)
                    .with_version(e.version);
                entry.valid = e.valid;
                bank.entries[row] = entry;
            }
            banks.push(bank);
        }
        let mut built = TernaryTable::new(banks);
        built.indirection = ternary.indirection.clone();
        table = table.with_ternary(built);
    }

    if let Some(exact) = &def.exact {
        let mut ways = Vec::with_capacity(exact.ways.len());
        for way_def in &exact.ways {
            let depth = way_def
                .entries
                .iter()
                .map(|e| e.row + 1)
                .max()
                .unwrap_or(0)
                .max(way_def.rows);
            let mut way = ExactWay::new(way_def.hash, way_def.addr_bits, depth)
                .with_vpn_offset(way_def.vpn_offset);
            for e in &way_def.entries {
                let mut row = ExactRow::new(e.tag.to_u64()?, e.payload).with_version(e.version);
                row.next_table = e.next_table;
                way.rows[e.row] = row;
            }
            ways.push(way);
        }
        table = table.with_exact(ExactTable::new(ways));
    }

    Ok(table)
}
