//! The complete configuration of one stage.

use crate::bitvec::BitVector;
use crate::phv::{Phv, PhvLayout};
use crate::stage::distribution::{AddressSource, ResourceAddresses, ResourceClass};
use crate::stage::spec::{MAX_LOGICAL_TABLES, MAX_VERSION};
use crate::stage::{
    ActionMemory, ExactResult, HashEngine, HashOutputs, LogicalTable, TernaryResult,
};

use super::ConfigError;

/// Everything packet processing reads.
///
/// Built and validated by [`super::StageConfigBuilder`]; afterwards only
/// [`super::ConfigStore`] mutates it, one checked field at a time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageConfig {
    /// PHV container layout
    pub layout: PhvLayout,
    /// Stage hash engine
    pub hash: HashEngine,
    /// Logical tables in evaluation order
    pub tables: Vec<LogicalTable>,
    /// Action instruction and data memories
    pub actions: ActionMemory,
}

impl StageConfig {
    /// Table with logical id `id`.
    pub fn table(&self, id: u8) -> Option<&LogicalTable> {
        self.tables.iter().find(|t| t.id == id)
    }

    /// Mutable table with logical id `id`.
    pub fn table_mut(&mut self, id: u8) -> Result<&mut LogicalTable, ConfigError> {
        self.tables
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(ConfigError::UnknownTable(id))
    }

    /// Hash every group over an assembled input vector.
    pub fn compute_hashes(&self, input: &BitVector) -> HashOutputs {
        self.hash.compute_hashes(input)
    }

    /// Ternary lookup in one table with every version visible.
    ///
    /// Unknown tables and tables without a ternary part miss.
    pub fn match_ternary(&self, table_id: u8, key: &BitVector) -> TernaryResult {
        self.table(table_id)
            .and_then(|t| t.ternary.as_ref())
            .map(|t| t.match_ternary(key))
            .unwrap_or_default()
    }

    /// Exact lookup in one table with every version visible.
    pub fn match_exact(&self, table_id: u8, way_hashes: &[u64]) -> ExactResult {
        self.table(table_id)
            .and_then(|t| t.exact.as_ref())
            .map(|e| e.match_exact(way_hashes))
            .unwrap_or_default()
    }

    /// Distribute one table's match results. Unknown tables yield all zeros.
    pub fn distribute(
        &self,
        table_id: u8,
        ternary: &TernaryResult,
        exact: &ExactResult,
    ) -> ResourceAddresses {
        self.table(table_id)
            .map(|t| t.distribution.distribute(ternary, exact))
            .unwrap_or_default()
    }

    /// Run one action over a PHV.
    pub fn apply_action(
        &self,
        action_instr_addr: u32,
        immediate_addr: u32,
        action_data_addr: u32,
        phv_in: &Phv,
    ) -> Phv {
        self.actions
            .apply_action(action_instr_addr, immediate_addr, action_data_addr, phv_in)
    }

    /// Check every cross-reference in the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.hash.validate(&self.layout)?;

        if self.tables.len() > MAX_LOGICAL_TABLES {
            return Err(ConfigError::IndexOutOfRange {
                what: "logical table",
                index: self.tables.len(),
                limit: MAX_LOGICAL_TABLES,
            });
        }
        for (i, table) in self.tables.iter().enumerate() {
            if self.tables[..i].iter().any(|t| t.id == table.id) {
                return Err(ConfigError::DuplicateTable(table.id));
            }
            self.validate_table(table)?;
        }

        self.validate_actions()
    }

    fn validate_table(&self, table: &LogicalTable) -> Result<(), ConfigError> {
        table.key.validate(&self.layout)?;

        if let Some(ternary) = &table.ternary {
            for entry in ternary.banks.iter().flat_map(|b| &b.entries) {
                check_version(entry.version)?;
            }
        }

        if let Some(exact) = &table.exact {
            for way in &exact.ways {
                self.hash.validate_slice(&way.hash)?;
                if way.addr_bits as u32 > u32::BITS {
                    return Err(ConfigError::ValueOutOfRange {
                        field: "addr_bits",
                        value: way.addr_bits as u64,
                    });
                }
                for row in &way.rows {
                    check_version(row.version)?;
                }
            }
        }

        for window in &table.version_windows {
            if window.lo > window.hi || window.hi > MAX_VERSION {
                return Err(ConfigError::ValueOutOfRange {
                    field: "version window",
                    value: window.encode(),
                });
            }
        }

        for class in ResourceClass::ALL {
            let rule = table.distribution.rule(class);
            if rule.source != AddressSource::Unwired && rule.shift as u32 >= u32::BITS {
                return Err(ConfigError::ValueOutOfRange {
                    field: "shift",
                    value: rule.shift as u64,
                });
            }
        }
        Ok(())
    }

    fn validate_actions(&self) -> Result<(), ConfigError> {
        for instr in &self.actions.instructions {
            for op in &instr.ops {
                if op.container >= self.layout.len() {
                    return Err(ConfigError::IndexOutOfRange {
                        what: "container",
                        index: op.container,
                        limit: self.layout.len(),
                    });
                }
            }
        }
        Ok(())
    }
}

fn check_version(version: u8) -> Result<(), ConfigError> {
    if version > MAX_VERSION {
        return Err(ConfigError::ValueOutOfRange {
            field: "version",
            value: version as u64,
        });
    }
    Ok(())
}
