//! Per-packet stage evaluation.
//!
//! ```text
//!   phv_in --+--> input xbar --> hash groups --+--> exact ways ---+
//!            |                                 |                  |
//!            +--> table key select -----------------> tcam -------+--> distribution
//!                                                                        |
//!   phv_out <----------------- action / crossbar <-----------------------+
//! ```
//!
//! Every table of the packet's gress reads the same `phv_in` and the same hash
//! outputs, so table order only matters when merging writes: tables are
//! applied in configuration order and a later table overwrites an earlier one.

use crate::phv::{PacketVersion, Phv};
use crate::store::StageConfig;

use super::table::TableResult;

/// Result of pushing one packet through the stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOutput {
    /// Output PHV
    pub phv: Phv,
    /// One result per evaluated table, in table order
    pub tables: Vec<TableResult>,
}

impl StageOutput {
    /// Result of one table, if it was evaluated.
    pub fn table(&self, id: u8) -> Option<&TableResult> {
        self.tables.iter().find(|t| t.table_id == id)
    }
}

/// Process one packet. Never fails: configuration is validated up front.
pub fn process_packet(config: &StageConfig, phv_in: &Phv, packet: PacketVersion) -> StageOutput {
    let hash_input = config.hash.input.assemble(phv_in);
    let hashes = config.hash.compute_hashes(&hash_input);
    log::trace!("hash input {} -> {} group(s)", hash_input, hashes.len());

    let mut phv = phv_in.clone();
    let mut tables = Vec::with_capacity(config.tables.len());

    for table in &config.tables {
        let Some(result) = table.evaluate(phv_in, &hashes, packet) else {
            log::trace!("table {} ({}) skipped for {}", table.id, table.name, packet.gress);
            continue;
        };

        let a = &result.addresses;
        log::trace!(
            "table {} ternary={} exact={} instr={} imm={:#x} adata={:#x} next={}",
            table.id,
            result.ternary.hit,
            result.exact.hit,
            a.action_instr,
            a.immediate,
            a.action_data,
            a.next_table
        );

        for (container, value) in config
            .actions
            .writes(a.action_instr, a.immediate, a.action_data)
        {
            if phv.set(container, value) {
                log::trace!("  phv[{}] <- {:#x}", container, value);
            }
        }
        tables.push(result);
    }

    StageOutput { phv, tables }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phv::{ContainerWidth, Gress, PhvLayout};
    use crate::stage::action::{ActionInstruction, ActionMemory, Granularity, OperandSource};
    use crate::stage::distribution::{
        AddressSource, DistributionRule, DistributionRules, ResourceClass,
    };
    use crate::stage::exact::{ExactRow, ExactTable, ExactWay};
    use crate::stage::hash::{HashEngine, HashGroup, HashSlice};
    use crate::stage::input_xbar::KeySelect;
    use crate::stage::table::LogicalTable;
    use crate::stage::tcam::{TernaryEntry, TernaryTable};
    use crate::store::StageConfigBuilder;
    use crate::testing::XorShift;

    fn layout() -> PhvLayout {
        PhvLayout::new(vec![
            ContainerWidth::W32,
            ContainerWidth::W32,
            ContainerWidth::W16,
            ContainerWidth::W8,
        ])
    }

    /// Ternary on container 0 writes the immediate word into container 1.
    fn ternary_table(id: u8) -> LogicalTable {
        LogicalTable::new(id, "ternary")
            .with_key(KeySelect::containers(&layout(), &[0]))
            .with_ternary(TernaryTable::from_entries(vec![
                TernaryEntry::from_u64(0x0A00_0001, 0xFFFF_FFFF, 32),
                TernaryEntry::from_u64(0x0A00_0000, 0xFF00_0000, 32),
            ]))
            .with_distribution(
                DistributionRules::default()
                    .with_rule(
                        ResourceClass::ActionInstr,
                        DistributionRule::wired(AddressSource::Ternary, 0, 0x7F, 0),
                    )
                    .with_rule(
                        ResourceClass::Immediate,
                        DistributionRule::wired(AddressSource::Ternary, 0, 0xFFFF_FFFF, 3),
                    )
                    .with_next_table(4, 0xFF),
            )
    }

    fn actions() -> ActionMemory {
        let mut mem = ActionMemory::with_capacity(4, 4, 0);
        mem.instructions[0] = ActionInstruction::new()
            .with_op(1, OperandSource::immediate(Granularity::Word, 0));
        mem.instructions[1] = ActionInstruction::new()
            .with_op(2, OperandSource::immediate(Granularity::Half, 0));
        mem.immediate = vec![0x1111_1111, 0x2222_2222, 0, 0xDEAD_BEEF];
        mem
    }

    fn config() -> StageConfig {
        StageConfigBuilder::new(layout())
            .table(ternary_table(0))
            .actions(actions())
            .build()
            .unwrap()
    }

    #[test]
    fn test_ternary_hit_and_miss() {
        let cfg = config();

        // The /32 entry wins over the /8 entry
        let phv = Phv::from_values(&layout(), &[0x0A00_0001, 0, 0, 0]);
        let out = process_packet(&cfg, &phv, PacketVersion::ingress());
        let r = out.table(0).unwrap();
        assert!(r.ternary.hit);
        assert_eq!(r.ternary.entry_index, 0);
        assert_eq!(r.addresses.action_instr, 0);
        assert_eq!(r.addresses.immediate, 0);
        assert_eq!(r.next_table(), 4);
        assert_eq!(out.phv.value(1), 0x1111_1111);

        // The /8 entry
        let phv = Phv::from_values(&layout(), &[0x0A12_3456, 0, 0, 0]);
        let out = process_packet(&cfg, &phv, PacketVersion::ingress());
        let r = out.table(0).unwrap();
        assert_eq!(r.ternary.entry_index, 1);
        assert_eq!(out.phv.value(2), 0x2222);
        assert_eq!(out.phv.value(1), 0);

        // Miss: both addresses take their miss values
        let phv = Phv::from_values(&layout(), &[0x0B00_0000, 0, 0, 0]);
        let out = process_packet(&cfg, &phv, PacketVersion::ingress());
        let r = out.table(0).unwrap();
        assert!(!r.ternary.hit);
        assert_eq!(r.addresses.immediate, 3);
        assert_eq!(r.next_table(), 0xFF);
        assert_eq!(out.phv.value(1), 0xDEAD_BEEF);
    }

    #[test]
    fn test_miss_to_noop_is_identity() {
        let mut mem = actions();
        // Miss lands on instruction 0, which is now empty
        mem.instructions[0] = ActionInstruction::new();
        let cfg = StageConfigBuilder::new(layout())
            .table(ternary_table(0))
            .actions(mem)
            .build()
            .unwrap();

        let phv = Phv::from_values(&layout(), &[0x0B00_0000, 7, 8, 9]);
        let out = process_packet(&cfg, &phv, PacketVersion::ingress());
        assert_eq!(out.phv, phv);
        // Reprocessing the output is stable
        assert_eq!(process_packet(&cfg, &out.phv, PacketVersion::ingress()).phv, phv);
    }

    #[test]
    fn test_exact_table_end_to_end() {
        let hash = HashEngine::new(
            KeySelect::containers(&layout(), &[0]),
            vec![HashGroup::identity(32, 32)],
        );
        let mut way = ExactWay::new(HashSlice::new(0, 0, 16), 8, 256);
        // key 0x1234 -> row 0x34, tag 0x12
        way.rows[0x34] = ExactRow::new(0x12, 0x0002_0003).with_next_table(7);
        let table = LogicalTable::new(1, "exact")
            .with_exact(ExactTable::new(vec![way]))
            .with_distribution(
                DistributionRules::default()
                    .with_rule(
                        ResourceClass::ActionInstr,
                        DistributionRule::wired(AddressSource::Exact, 16, 0x7F, 0),
                    )
                    .with_rule(
                        ResourceClass::ActionData,
                        DistributionRule::wired(AddressSource::Exact, 0, 0xFFFF, 0),
                    ),
            );

        let mut mem = ActionMemory::with_capacity(4, 0, 4);
        mem.instructions[2] = ActionInstruction::new()
            .with_op(3, OperandSource::action_data(Granularity::Byte, 1));
        mem.action_data[3] = [0xAB00, 0];

        let cfg = StageConfigBuilder::new(layout())
            .hash(hash)
            .table(table)
            .actions(mem)
            .build()
            .unwrap();

        let out = process_packet(
            &cfg,
            &Phv::from_values(&layout(), &[0x1234, 0, 0, 0]),
            PacketVersion::ingress(),
        );
        let r = out.table(1).unwrap();
        assert!(r.exact.hit);
        assert_eq!((r.addresses.action_instr, r.addresses.action_data), (2, 3));
        assert_eq!(r.next_table(), 7);
        assert_eq!(out.phv.value(3), 0xAB);

        // Tag mismatch on the same row
        let out = process_packet(
            &cfg,
            &Phv::from_values(&layout(), &[0x9934, 0, 0, 0]),
            PacketVersion::ingress(),
        );
        assert!(!out.table(1).unwrap().exact.hit);
        assert_eq!(out.phv.value(3), 0);
    }

    #[test]
    fn test_gress_filtering() {
        let cfg = StageConfigBuilder::new(layout())
            .table(ternary_table(0))
            .table(ternary_table(1).with_gress(Gress::Egress))
            .actions(actions())
            .build()
            .unwrap();

        let phv = Phv::from_values(&layout(), &[0x0A00_0001, 0, 0, 0]);
        let out = process_packet(&cfg, &phv, PacketVersion::ingress());
        assert_eq!(out.tables.len(), 1);
        assert_eq!(out.tables[0].table_id, 0);

        let out = process_packet(&cfg, &phv, PacketVersion::egress());
        assert_eq!(out.tables.len(), 1);
        assert_eq!(out.tables[0].table_id, 1);
    }

    #[test]
    fn test_later_table_wins_merge() {
        // On a miss both tables write container 1, from different immediate rows
        let mut second = ternary_table(1);
        second.distribution = second.distribution.with_rule(
            ResourceClass::Immediate,
            DistributionRule::wired(AddressSource::Ternary, 0, 0xFFFF_FFFF, 1),
        );
        let cfg = StageConfigBuilder::new(layout())
            .table(ternary_table(0))
            .table(second)
            .actions(actions())
            .build()
            .unwrap();

        let phv = Phv::from_values(&layout(), &[0x0B00_0000, 0, 0, 0]);
        let out = process_packet(&cfg, &phv, PacketVersion::ingress());
        // Table 0 misses to immediate row 3, table 1 to row 1
        assert_eq!(out.phv.value(1), 0x2222_2222);
    }

    #[test]
    fn test_tables_read_phv_in() {
        // Table 1 keys on container 1, which table 0 writes. It must see the
        // input value, not table 0's write.
        let second = LogicalTable::new(1, "reader")
            .with_key(KeySelect::containers(&layout(), &[1]))
            .with_ternary(TernaryTable::from_entries(vec![TernaryEntry::from_u64(
                0, 0xFFFF_FFFF, 32,
            )]))
            .with_distribution(DistributionRules::default().with_next_table(5, 6));
        let cfg = StageConfigBuilder::new(layout())
            .table(ternary_table(0))
            .table(second)
            .actions(actions())
            .build()
            .unwrap();

        let phv = Phv::from_values(&layout(), &[0x0A00_0001, 0, 0, 0]);
        let out = process_packet(&cfg, &phv, PacketVersion::ingress());
        assert_eq!(out.phv.value(1), 0x1111_1111);
        assert!(out.table(1).unwrap().ternary.hit);
    }

    #[test]
    fn test_determinism() {
        let cfg = config();
        let mut rng = XorShift::new(7);
        for _ in 0..100 {
            let values: Vec<u32> = (0..4).map(|_| rng.next() as u32).collect();
            let phv = Phv::from_values(&layout(), &values);
            let a = process_packet(&cfg, &phv, PacketVersion::ingress());
            let b = process_packet(&cfg, &phv, PacketVersion::ingress());
            assert_eq!(a, b);
        }
    }
}
