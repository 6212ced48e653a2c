//! Configuration store.
//!
//! The store owns the stage's [`StageConfig`] and is the only way to change
//! it after it is built. Changes arrive as [`ConfigCommand`]s, the model's
//! equivalent of register writes from the control plane.
//!
//! # Command Application
//!
//! 1. Build a [`StageConfig`] with [`StageConfigBuilder`] (geometry, layout)
//! 2. Wrap it in a [`ConfigStore`]
//! 3. Apply commands to populate entries, rules and action data
//! 4. Call [`ConfigStore::process`] per packet
//!
//! Every command is checked before anything is modified, so a rejected
//! command leaves the configuration untouched. Rejections are logged and
//! counted, never panicked on.

pub mod address;
pub mod builder;
pub mod stage_config;

use thiserror::Error;

use crate::phv::{PacketVersion, Phv};
use crate::stage::distribution::{AddressSource, Precedence};
use crate::stage::exact::{ExactRow, ExactTable};
use crate::stage::table::{LogicalTable, VersionWindow};
use crate::stage::tcam::TernaryTable;
use crate::stage::spec::WIDE_ROW_WORDS;
use crate::stage::{process_packet, OperandSource, StageOutput};

pub use address::{ConfigAddress, RowAddress};
pub use builder::StageConfigBuilder;
pub use stage_config::StageConfig;

/// Configuration rejected at the configuration boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("unknown table {0}")]
    UnknownTable(u8),

    #[error("duplicate table id {0}")]
    DuplicateTable(u8),

    #[error("{what} index {index} out of range (limit {limit})")]
    IndexOutOfRange {
        what: &'static str,
        index: usize,
        limit: usize,
    },

    #[error("value {value:#x} out of range for {field}")]
    ValueOutOfRange { field: &'static str, value: u64 },

    #[error("byte {byte} of container {container} does not exist")]
    BadByteSelect { container: usize, byte: u8 },

    #[error("hash group {group} is {bits} bits wide (max {max})")]
    HashGroupTooWide {
        group: usize,
        bits: usize,
        max: usize,
    },

    #[error("bad literal: {0}")]
    BadLiteral(String),
}

/// One configuration command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Overwrite a scalar field
    Write { address: ConfigAddress, value: u64 },
    /// Read-modify-write the bits of a scalar field selected by `mask`
    MaskWrite {
        address: ConfigAddress,
        mask: u64,
        value: u64,
    },
    /// Overwrite a wide row
    RowWrite {
        address: RowAddress,
        data: [u64; WIDE_ROW_WORDS],
    },
}

/// Statistics about command application.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfigStats {
    /// Total commands seen
    pub commands: usize,
    /// Accepted scalar writes
    pub writes: usize,
    /// Accepted mask writes
    pub mask_writes: usize,
    /// Accepted row writes
    pub row_writes: usize,
    /// Rejected commands
    pub rejected: usize,
}

/// Owns a stage configuration and applies commands to it.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    config: StageConfig,
    /// Command statistics since creation
    pub stats: ConfigStats,
}

fn out_of_range(what: &'static str, index: usize, limit: usize) -> ConfigError {
    ConfigError::IndexOutOfRange { what, index, limit }
}

fn slot<'a, T>(
    items: &'a mut [T],
    what: &'static str,
    index: usize,
) -> Result<&'a mut T, ConfigError> {
    let limit = items.len();
    items.get_mut(index).ok_or(out_of_range(what, index, limit))
}

fn narrow<T: TryFrom<u64>>(field: &'static str, value: u64) -> Result<T, ConfigError> {
    T::try_from(value).map_err(|_| ConfigError::ValueOutOfRange { field, value })
}

impl ConfigStore {
    pub fn new(config: StageConfig) -> Self {
        Self {
            config,
            stats: ConfigStats::default(),
        }
    }

    /// The current configuration.
    pub fn config(&self) -> &StageConfig {
        &self.config
    }

    /// Give up the store, keeping the configuration.
    pub fn into_config(self) -> StageConfig {
        self.config
    }

    /// Process one packet against the current configuration.
    pub fn process(&self, phv: &Phv, packet: PacketVersion) -> StageOutput {
        process_packet(&self.config, phv, packet)
    }

    /// Apply one command.
    pub fn apply(&mut self, cmd: &ConfigCommand) -> Result<(), ConfigError> {
        self.stats.commands += 1;
        let result = match *cmd {
            ConfigCommand::Write { address, value } => {
                log::debug!("write {} = {:#x}", address, value);
                self.write(address, value).map(|_| self.stats.writes += 1)
            }
            ConfigCommand::MaskWrite {
                address,
                mask,
                value,
            } => {
                log::debug!("mask write {} mask={:#x} value={:#x}", address, mask, value);
                self.mask_write(address, mask, value)
                    .map(|_| self.stats.mask_writes += 1)
            }
            ConfigCommand::RowWrite { address, data } => {
                log::debug!("row write {} = [{:#x}, {:#x}]", address, data[0], data[1]);
                self.write_row(address, data)
                    .map(|_| self.stats.row_writes += 1)
            }
        };

        if let Err(e) = &result {
            self.stats.rejected += 1;
            log::warn!("rejected config command {:?}: {}", cmd, e);
        }
        result
    }

    /// Apply a batch, continuing past rejected commands.
    ///
    /// Returns the number of rejected commands.
    pub fn apply_all<'a>(&mut self, cmds: impl IntoIterator<Item = &'a ConfigCommand>) -> usize {
        cmds.into_iter().filter(|cmd| self.apply(cmd).is_err()).count()
    }

    /// Read-modify-write of a scalar field.
    pub fn mask_write(
        &mut self,
        address: ConfigAddress,
        mask: u64,
        value: u64,
    ) -> Result<(), ConfigError> {
        let current = self.read(address)?;
        self.write(address, (current & !mask) | (value & mask))
    }

    /// Read a scalar field.
    pub fn read(&self, address: ConfigAddress) -> Result<u64, ConfigError> {
        let cfg = &self.config;
        let table = |id: u8| cfg.table(id).ok_or(ConfigError::UnknownTable(id));

        let value = match address {
            ConfigAddress::HashSeed { group } => {
                let limit = cfg.hash.groups.len();
                cfg.hash
                    .groups
                    .get(group)
                    .ok_or(out_of_range("hash group", group, limit))?
                    .seed
            }
            ConfigAddress::HashCoefficients {
                group,
                output_bit,
                word,
            } => {
                let limit = cfg.hash.groups.len();
                let g = cfg
                    .hash
                    .groups
                    .get(group)
                    .ok_or(out_of_range("hash group", group, limit))?;
                let row = g
                    .rows
                    .get(output_bit)
                    .ok_or(out_of_range("hash output bit", output_bit, g.rows.len()))?;
                if word >= row.word_count() {
                    return Err(out_of_range("coefficient word", word, row.word_count()));
                }
                row.word(word)
            }
            ConfigAddress::TcamControl {
                table: id,
                bank,
                row,
            } => {
                let banks = &ternary(table(id)?)?.banks;
                let b = banks
                    .get(bank)
                    .ok_or(out_of_range("tcam bank", bank, banks.len()))?;
                let e = b
                    .entries
                    .get(row)
                    .ok_or(out_of_range("tcam row", row, b.entries.len()))?;
                (e.valid as u64) | ((e.version as u64) << 1)
            }
            ConfigAddress::TcamPriority { table: id, bank } => {
                let banks = &ternary(table(id)?)?.banks;
                banks
                    .get(bank)
                    .ok_or(out_of_range("tcam bank", bank, banks.len()))?
                    .output_priority as u64
            }
            ConfigAddress::TcamNextTable {
                table: id,
                bank,
                group,
            } => {
                let banks = &ternary(table(id)?)?.banks;
                let b = banks
                    .get(bank)
                    .ok_or(out_of_range("tcam bank", bank, banks.len()))?;
                *b.next_tables
                    .get(group)
                    .ok_or(out_of_range("next-table group", group, b.next_tables.len()))?
                    as u64
            }
            ConfigAddress::TernaryIndirection { table: id, index } => {
                let ram = ternary(table(id)?)?.indirection.as_deref().unwrap_or(&[]);
                *ram.get(index)
                    .ok_or(out_of_range("indirection entry", index, ram.len()))? as u64
            }
            ConfigAddress::ExactVpnOffset { table: id, way } => {
                let t = table(id)?;
                let ways = t.exact.as_ref().map(|e| e.ways.as_slice()).unwrap_or(&[]);
                ways.get(way)
                    .ok_or(out_of_range("exact way", way, ways.len()))?
                    .vpn_offset as u64
            }
            ConfigAddress::DistSource { table: id, class } => {
                table(id)?.distribution.rule(class).source.encode()
            }
            ConfigAddress::DistShift { table: id, class } => {
                table(id)?.distribution.rule(class).shift as u64
            }
            ConfigAddress::DistMask { table: id, class } => {
                table(id)?.distribution.rule(class).mask as u64
            }
            ConfigAddress::DistDefault { table: id, class } => {
                table(id)?.distribution.rule(class).default as u64
            }
            ConfigAddress::DistMiss { table: id, class } => {
                table(id)?.distribution.rule(class).miss as u64
            }
            ConfigAddress::Precedence { table: id } => match table(id)?.distribution.precedence {
                Precedence::TernaryFirst => 0,
                Precedence::ExactFirst => 1,
            },
            ConfigAddress::NextTableHit { table: id } => {
                table(id)?.distribution.next_table.hit as u64
            }
            ConfigAddress::NextTableMiss { table: id } => {
                table(id)?.distribution.next_table.miss as u64
            }
            ConfigAddress::VersionWindow {
                table: id,
                packet_version,
            } => {
                let windows = &table(id)?.version_windows;
                windows
                    .get(packet_version as usize)
                    .ok_or(out_of_range(
                        "packet version",
                        packet_version as usize,
                        windows.len(),
                    ))?
                    .encode()
            }
            ConfigAddress::OperandSelect {
                instruction,
                container,
            } => {
                let instrs = &cfg.actions.instructions;
                if container >= cfg.layout.len() {
                    return Err(out_of_range("container", container, cfg.layout.len()));
                }
                instrs
                    .get(instruction)
                    .ok_or(out_of_range("instruction", instruction, instrs.len()))?
                    .op(container)
                    .encode()
            }
            ConfigAddress::Immediate { row } => {
                let rows = &cfg.actions.immediate;
                *rows
                    .get(row)
                    .ok_or(out_of_range("immediate row", row, rows.len()))? as u64
            }
        };
        Ok(value)
    }

    /// Write a scalar field.
    pub fn write(&mut self, address: ConfigAddress, value: u64) -> Result<(), ConfigError> {
        let layout_len = self.config.layout.len();
        let cfg = &mut self.config;

        match address {
            ConfigAddress::HashSeed { group } => {
                let g = slot(&mut cfg.hash.groups, "hash group", group)?;
                if !g.seed_fits(value) {
                    return Err(ConfigError::ValueOutOfRange {
                        field: "hash seed",
                        value,
                    });
                }
                g.seed = value;
            }
            ConfigAddress::HashCoefficients {
                group,
                output_bit,
                word,
            } => {
                let g = slot(&mut cfg.hash.groups, "hash group", group)?;
                let row = slot(&mut g.rows, "hash output bit", output_bit)?;
                let limit = row.word_count();
                if word >= limit {
                    return Err(out_of_range("coefficient word", word, limit));
                }
                if value & !row.word_mask(word) != 0 {
                    return Err(ConfigError::ValueOutOfRange {
                        field: "hash coefficients",
                        value,
                    });
                }
                row.set_word(word, value);
            }
            ConfigAddress::TcamControl {
                table: id,
                bank,
                row,
            } => {
                if value >> 3 != 0 {
                    return Err(ConfigError::ValueOutOfRange {
                        field: "tcam control",
                        value,
                    });
                }
                let t = ternary_mut(cfg.table_mut(id)?)?;
                let b = slot(&mut t.banks, "tcam bank", bank)?;
                let e = slot(&mut b.entries, "tcam row", row)?;
                e.valid = value & 1 == 1;
                e.version = ((value >> 1) & 0x3) as u8;
            }
            ConfigAddress::TcamPriority { table: id, bank } => {
                let priority = narrow("tcam priority", value)?;
                let t = ternary_mut(cfg.table_mut(id)?)?;
                slot(&mut t.banks, "tcam bank", bank)?.output_priority = priority;
            }
            ConfigAddress::TcamNextTable {
                table: id,
                bank,
                group,
            } => {
                let next = narrow("next table", value)?;
                let t = ternary_mut(cfg.table_mut(id)?)?;
                let b = slot(&mut t.banks, "tcam bank", bank)?;
                *slot(&mut b.next_tables, "next-table group", group)? = next;
            }
            ConfigAddress::TernaryIndirection { table: id, index } => {
                let addr = narrow("indirection entry", value)?;
                let t = ternary_mut(cfg.table_mut(id)?)?;
                let ram = t
                    .indirection
                    .as_mut()
                    .ok_or(out_of_range("indirection entry", index, 0))?;
                *slot(ram, "indirection entry", index)? = addr;
            }
            ConfigAddress::ExactVpnOffset { table: id, way } => {
                let offset = narrow("vpn offset", value)?;
                let exact = exact_mut(cfg.table_mut(id)?, way)?;
                slot(&mut exact.ways, "exact way", way)?.vpn_offset = offset;
            }
            ConfigAddress::DistSource { table: id, class } => {
                let source = AddressSource::decode(value).ok_or(ConfigError::ValueOutOfRange {
                    field: "address source",
                    value,
                })?;
                let rule = cfg.table_mut(id)?.distribution.rule_mut(class);
                if source != AddressSource::Unwired && rule.shift as u32 >= u32::BITS {
                    return Err(ConfigError::ValueOutOfRange {
                        field: "shift",
                        value: rule.shift as u64,
                    });
                }
                rule.source = source;
            }
            ConfigAddress::DistShift { table: id, class } => {
                if value >= u32::BITS as u64 {
                    return Err(ConfigError::ValueOutOfRange {
                        field: "shift",
                        value,
                    });
                }
                cfg.table_mut(id)?.distribution.rule_mut(class).shift = value as u8;
            }
            ConfigAddress::DistMask { table: id, class } => {
                let mask = narrow("mask", value)?;
                cfg.table_mut(id)?.distribution.rule_mut(class).mask = mask;
            }
            ConfigAddress::DistDefault { table: id, class } => {
                let default = narrow("default", value)?;
                cfg.table_mut(id)?.distribution.rule_mut(class).default = default;
            }
            ConfigAddress::DistMiss { table: id, class } => {
                let miss = narrow("miss", value)?;
                cfg.table_mut(id)?.distribution.rule_mut(class).miss = miss;
            }
            ConfigAddress::Precedence { table: id } => {
                let precedence = match value {
                    0 => Precedence::TernaryFirst,
                    1 => Precedence::ExactFirst,
                    _ => {
                        return Err(ConfigError::ValueOutOfRange {
                            field: "precedence",
                            value,
                        })
                    }
                };
                cfg.table_mut(id)?.distribution.precedence = precedence;
            }
            ConfigAddress::NextTableHit { table: id } => {
                let next = narrow("next table", value)?;
                cfg.table_mut(id)?.distribution.next_table.hit = next;
            }
            ConfigAddress::NextTableMiss { table: id } => {
                let next = narrow("next table", value)?;
                cfg.table_mut(id)?.distribution.next_table.miss = next;
            }
            ConfigAddress::VersionWindow {
                table: id,
                packet_version,
            } => {
                let window = VersionWindow::decode(value)
                    .filter(|w| w.lo <= w.hi)
                    .ok_or(ConfigError::ValueOutOfRange {
                        field: "version window",
                        value,
                    })?;
                let t = cfg.table_mut(id)?;
                *slot(
                    &mut t.version_windows,
                    "packet version",
                    packet_version as usize,
                )? = window;
            }
            ConfigAddress::OperandSelect {
                instruction,
                container,
            } => {
                let source = OperandSource::decode(value).ok_or(ConfigError::ValueOutOfRange {
                    field: "operand select",
                    value,
                })?;
                if container >= layout_len {
                    return Err(out_of_range("container", container, layout_len));
                }
                slot(&mut cfg.actions.instructions, "instruction", instruction)?
                    .set_op(container, source);
            }
            ConfigAddress::Immediate { row } => {
                let data = narrow("immediate data", value)?;
                *slot(&mut cfg.actions.immediate, "immediate row", row)? = data;
            }
        }
        Ok(())
    }

    /// Write a wide row.
    pub fn write_row(
        &mut self,
        address: RowAddress,
        data: [u64; WIDE_ROW_WORDS],
    ) -> Result<(), ConfigError> {
        let cfg = &mut self.config;
        match address {
            RowAddress::TcamEntry {
                table: id,
                bank,
                row,
                word,
            } => {
                let t = ternary_mut(cfg.table_mut(id)?)?;
                let b = slot(&mut t.banks, "tcam bank", bank)?;
                let e = slot(&mut b.entries, "tcam row", row)?;
                let limit = e.value.word_count();
                if word >= limit {
                    return Err(out_of_range("tcam word", word, limit));
                }
                let checks = [
                    ("tcam value", data[0], e.value.word_mask(word)),
                    ("tcam mask", data[1], e.mask.word_mask(word)),
                ];
                for (field, chunk, keep) in checks {
                    if chunk & !keep != 0 {
                        return Err(ConfigError::ValueOutOfRange {
                            field,
                            value: chunk,
                        });
                    }
                }
                e.value.set_word(word, data[0]);
                e.mask.set_word(word, data[1]);
            }
            RowAddress::ExactRow { table: id, way, row } => {
                let decoded = ExactRow::decode(data).ok_or(ConfigError::ValueOutOfRange {
                    field: "exact row",
                    value: data[0],
                })?;
                let exact = exact_mut(cfg.table_mut(id)?, way)?;
                let w = slot(&mut exact.ways, "exact way", way)?;
                *slot(&mut w.rows, "exact row", row)? = decoded;
            }
            RowAddress::ActionData { row } => {
                *slot(&mut cfg.actions.action_data, "action data row", row)? = data;
            }
        }
        Ok(())
    }
}

fn ternary(table: &LogicalTable) -> Result<&TernaryTable, ConfigError> {
    table.ternary.as_ref().ok_or(out_of_range("tcam bank", 0, 0))
}

fn ternary_mut(table: &mut LogicalTable) -> Result<&mut TernaryTable, ConfigError> {
    table.ternary.as_mut().ok_or(out_of_range("tcam bank", 0, 0))
}

fn exact_mut(table: &mut LogicalTable, way: usize) -> Result<&mut ExactTable, ConfigError> {
    table.exact.as_mut().ok_or(out_of_range("exact way", way, 0))
}
