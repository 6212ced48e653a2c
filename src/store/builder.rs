//! Validated assembly of a [`StageConfig`].

use crate::phv::PhvLayout;
use crate::stage::{ActionMemory, HashEngine, LogicalTable};

use super::{ConfigError, StageConfig};

/// Builder for a [`StageConfig`].
///
/// ```ignore
/// let config = StageConfigBuilder::new(PhvLayout::tofino())
///     .hash(engine)
///     .table(acl)
///     .actions(memory)
///     .build()?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct StageConfigBuilder {
    config: StageConfig,
}

impl StageConfigBuilder {
    pub fn new(layout: PhvLayout) -> Self {
        Self {
            config: StageConfig {
                layout,
                ..Default::default()
            },
        }
    }

    /// Set the hash engine.
    pub fn hash(mut self, hash: HashEngine) -> Self {
        self.config.hash = hash;
        self
    }

    /// Append a logical table. Tables evaluate in the order they are added.
    pub fn table(mut self, table: LogicalTable) -> Self {
        self.config.tables.push(table);
        self
    }

    /// Set the action memories.
    pub fn actions(mut self, actions: ActionMemory) -> Self {
        self.config.actions = actions;
        self
    }

    /// Normalize and validate.
    ///
    /// Ternary entries left at zero width (empty rows) are widened to their
    /// table's key, so later row writes have somewhere to land.
    pub fn build(mut self) -> Result<StageConfig, ConfigError> {
        for table in &mut self.config.tables {
            let width = table.key.width_bits();
            let Some(ternary) = table.ternary.as_mut() else {
                continue;
            };
            for entry in ternary.banks.iter_mut().flat_map(|b| b.entries.iter_mut()) {
                for bits in [&mut entry.value, &mut entry.mask] {
                    match bits.width() {
                        0 => bits.resize(width),
                        w if w == width => {}
                        w => {
                            return Err(ConfigError::ValueOutOfRange {
                                field: "ternary entry width",
                                value: w as u64,
                            })
                        }
                    }
                }
            }
        }

        self.config.validate()?;
        log::debug!(
            "stage config: {} containers, {} hash group(s), {} table(s), {} instruction(s)",
            self.config.layout.len(),
            self.config.hash.groups.len(),
            self.config.tables.len(),
            self.config.actions.instructions.len()
        );
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phv::ContainerWidth;
    use crate::stage::{KeySelect, TcamBank, TernaryEntry, TernaryTable};

    fn layout() -> PhvLayout {
        PhvLayout::uniform(ContainerWidth::W32, 2)
    }

    #[test]
    fn test_empty_rows_take_key_width() {
        let table = LogicalTable::new(0, "t")
            .with_key(KeySelect::containers(&layout(), &[0, 1]))
            .with_ternary(TernaryTable::new(vec![TcamBank::new(4)]));
        let config = StageConfigBuilder::new(layout()).table(table).build().unwrap();

        let entry = &config.tables[0].ternary.as_ref().unwrap().banks[0].entries[3];
        assert_eq!(entry.value.width(), 64);
        assert_eq!(entry.mask.width(), 64);
        assert!(!entry.valid);
    }

    #[test]
    fn test_mismatched_entry_width() {
        let table = LogicalTable::new(0, "t")
            .with_key(KeySelect::containers(&layout(), &[0]))
            .with_ternary(TernaryTable::from_entries(vec![TernaryEntry::from_u64(
                1, 1, 16,
            )]));
        assert_eq!(
            StageConfigBuilder::new(layout()).table(table).build(),
            Err(ConfigError::ValueOutOfRange {
                field: "ternary entry width",
                value: 16
            })
        );
    }

    #[test]
    fn test_bad_key_rejected() {
        let table = LogicalTable::new(0, "t")
            .with_key(KeySelect::new(vec![crate::stage::ByteSelect::new(5, 0)]));
        assert_eq!(
            StageConfigBuilder::new(layout()).table(table).build(),
            Err(ConfigError::BadByteSelect {
                container: 5,
                byte: 0
            })
        );
    }
}
