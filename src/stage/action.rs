//! Action / crossbar unit.
//!
//! Places operands from the immediate and action-data buses into output PHV
//! containers. The instruction word at the distributed action-instruction
//! address lists, per destination container, which bus slot drives it:
//!
//! ```text
//!   immediate bus   (4 bytes)   -- byte/half/word slots --+
//!                                                         +--> container
//!   action-data bus (16 bytes)  -- byte/half/word slots --+
//!                                    (or pass-through)
//! ```
//!
//! # Defaults
//!
//! - A container with no op passes its input value through unchanged.
//! - An unpopulated instruction address is a no-op instruction.
//! - A slot past the end of its bus, or a row past the end of its memory,
//!   reads as zero.
//!
//! Slot values are read little-endian and truncated to the destination width.
//! A container written by an action becomes valid.

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::phv::Phv;

use super::spec::{ACTION_DATA_BUS_BYTES, IMMEDIATE_BUS_BYTES};

/// Slot granularity on a data bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    /// 8-bit slot
    Byte,
    /// 16-bit slot
    Half,
    /// 32-bit slot
    Word,
}

impl Granularity {
    /// Slot size in bytes.
    #[inline]
    pub fn bytes(self) -> usize {
        match self {
            Granularity::Byte => 1,
            Granularity::Half => 2,
            Granularity::Word => 4,
        }
    }

    fn encode(self) -> u64 {
        match self {
            Granularity::Byte => 0,
            Granularity::Half => 1,
            Granularity::Word => 2,
        }
    }

    fn decode(value: u64) -> Option<Self> {
        match value {
            0 => Some(Granularity::Byte),
            1 => Some(Granularity::Half),
            2 => Some(Granularity::Word),
            _ => None,
        }
    }
}

/// Operand data bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bus {
    /// Immediate data
    Immediate,
    /// Action data RAM
    ActionData,
}

/// Crossbar source for one output container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OperandSource {
    /// Keep the input value
    PassThrough,
    /// Take a slot from a data bus
    Slot {
        bus: Bus,
        granularity: Granularity,
        slot: u8,
    },
}

impl OperandSource {
    /// Immediate-bus slot.
    pub fn immediate(granularity: Granularity, slot: u8) -> Self {
        OperandSource::Slot {
            bus: Bus::Immediate,
            granularity,
            slot,
        }
    }

    /// Action-data-bus slot.
    pub fn action_data(granularity: Granularity, slot: u8) -> Self {
        OperandSource::Slot {
            bus: Bus::ActionData,
            granularity,
            slot,
        }
    }

    /// Operand select register encoding.
    ///
    /// ```text
    /// [1:0]  kind         0 = pass-through, 1 = immediate, 2 = action data
    /// [3:2]  granularity  0 = byte, 1 = half, 2 = word
    /// [11:4] slot
    /// ```
    pub fn encode(&self) -> u64 {
        match *self {
            OperandSource::PassThrough => 0,
            OperandSource::Slot {
                bus,
                granularity,
                slot,
            } => {
                let kind = match bus {
                    Bus::Immediate => 1,
                    Bus::ActionData => 2,
                };
                kind | (granularity.encode() << 2) | ((slot as u64) << 4)
            }
        }
    }

    /// Decode an operand select register.
    pub fn decode(value: u64) -> Option<Self> {
        if value >> 12 != 0 {
            return None;
        }
        let granularity = Granularity::decode((value >> 2) & 0x3)?;
        let slot = ((value >> 4) & 0xFF) as u8;
        match value & 0x3 {
            0 if value == 0 => Some(OperandSource::PassThrough),
            1 => Some(OperandSource::immediate(granularity, slot)),
            2 => Some(OperandSource::action_data(granularity, slot)),
            _ => None,
        }
    }
}

/// One operand placement of an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerOp {
    /// Destination container
    pub container: usize,
    /// Crossbar source
    pub source: OperandSource,
}

/// A VLIW action instruction: one optional op per container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionInstruction {
    /// Ops in container order; at most one per container
    pub ops: Vec<ContainerOp>,
}

impl ActionInstruction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) the op for one container.
    pub fn with_op(mut self, container: usize, source: OperandSource) -> Self {
        self.set_op(container, source);
        self
    }

    /// Set the op for one container. `PassThrough` removes it.
    pub fn set_op(&mut self, container: usize, source: OperandSource) {
        self.ops.retain(|op| op.container != container);
        if source != OperandSource::PassThrough {
            let pos = self.ops.partition_point(|op| op.container < container);
            self.ops.insert(pos, ContainerOp { container, source });
        }
    }

    /// Source for one container.
    pub fn op(&self, container: usize) -> OperandSource {
        self.ops
            .iter()
            .find(|op| op.container == container)
            .map(|op| op.source)
            .unwrap_or(OperandSource::PassThrough)
    }

    /// True if every container passes through.
    pub fn is_noop(&self) -> bool {
        self.ops.is_empty()
    }
}

/// A container write produced by an action.
pub type ContainerWrite = (usize, u32);

/// Action instruction, immediate and action-data memories.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionMemory {
    /// Instruction memory
    pub instructions: Vec<ActionInstruction>,
    /// Immediate data rows (32-bit)
    pub immediate: Vec<u32>,
    /// Action data rows (128-bit, two little-endian words)
    pub action_data: Vec<[u64; 2]>,
}

impl ActionMemory {
    /// Empty memories of the given depths.
    pub fn with_capacity(instructions: usize, immediate: usize, action_data: usize) -> Self {
        Self {
            instructions: vec![ActionInstruction::default(); instructions],
            immediate: vec![0; immediate],
            action_data: vec![[0; 2]; action_data],
        }
    }

    fn immediate_bus(&self, addr: u32) -> [u8; IMMEDIATE_BUS_BYTES] {
        let row = self.immediate.get(addr as usize).copied().unwrap_or(0);
        row.to_le_bytes()
    }

    fn action_data_bus(&self, addr: u32) -> [u8; ACTION_DATA_BUS_BYTES] {
        let mut bus = [0u8; ACTION_DATA_BUS_BYTES];
        if let Some(row) = self.action_data.get(addr as usize) {
            LittleEndian::write_u64_into(row, &mut bus);
        }
        bus
    }

    /// Compute the container writes of one action without touching the PHV.
    pub fn writes(
        &self,
        action_instr_addr: u32,
        immediate_addr: u32,
        action_data_addr: u32,
    ) -> SmallVec<[ContainerWrite; 8]> {
        let Some(instr) = self.instructions.get(action_instr_addr as usize) else {
            return SmallVec::new();
        };
        if instr.is_noop() {
            return SmallVec::new();
        }

        let imm = self.immediate_bus(immediate_addr);
        let adb = self.action_data_bus(action_data_addr);

        instr
            .ops
            .iter()
            .filter_map(|op| match op.source {
                OperandSource::PassThrough => None,
                OperandSource::Slot {
                    bus,
                    granularity,
                    slot,
                } => {
                    let data: &[u8] = match bus {
                        Bus::Immediate => &imm,
                        Bus::ActionData => &adb,
                    };
                    Some((op.container, read_slot(data, granularity, slot)))
                }
            })
            .collect()
    }

    /// Run one action over a PHV.
    pub fn apply_action(
        &self,
        action_instr_addr: u32,
        immediate_addr: u32,
        action_data_addr: u32,
        phv_in: &Phv,
    ) -> Phv {
        let mut phv_out = phv_in.clone();
        for (container, value) in self.writes(action_instr_addr, immediate_addr, action_data_addr) {
            phv_out.set(container, value);
        }
        phv_out
    }
}

/// Read one slot. Slots past the end of the bus read zero.
fn read_slot(bus: &[u8], granularity: Granularity, slot: u8) -> u32 {
    let n = granularity.bytes();
    let start = slot as usize * n;
    let Some(bytes) = bus.get(start..start + n) else {
        return 0;
    };
    match granularity {
        Granularity::Byte => bytes[0] as u32,
        Granularity::Half => LittleEndian::read_u16(bytes) as u32,
        Granularity::Word => LittleEndian::read_u32(bytes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phv::{ContainerWidth, PhvLayout};

    fn layout() -> PhvLayout {
        PhvLayout::new(vec![
            ContainerWidth::W32,
            ContainerWidth::W16,
            ContainerWidth::W8,
            ContainerWidth::W32,
        ])
    }

    fn memory() -> ActionMemory {
        let mut mem = ActionMemory::with_capacity(4, 4, 4);
        mem.immediate[1] = 0xAABB_CCDD;
        mem.action_data[2] = [0x0706_0504_0302_0100, 0x0F0E_0D0C_0B0A_0908];
        mem
    }

    #[test]
    fn test_pass_through_identity() {
        let mem = memory();
        let phv = Phv::from_values(&layout(), &[1, 2, 3]);
        // Instruction 0 is empty
        assert_eq!(mem.apply_action(0, 1, 2, &phv), phv);
        // Instruction address past the memory
        assert_eq!(mem.apply_action(99, 1, 2, &phv), phv);
    }

    #[test]
    fn test_immediate_slots() {
        let mut mem = memory();
        mem.instructions[1] = ActionInstruction::new()
            .with_op(0, OperandSource::immediate(Granularity::Word, 0))
            .with_op(1, OperandSource::immediate(Granularity::Half, 1))
            .with_op(2, OperandSource::immediate(Granularity::Byte, 1));

        let phv = Phv::from_values(&layout(), &[0, 0, 0, 0x55]);
        let out = mem.apply_action(1, 1, 0, &phv);
        assert_eq!(out.value(0), 0xAABB_CCDD);
        assert_eq!(out.value(1), 0xAABB);
        assert_eq!(out.value(2), 0xCC);
        // Untouched container keeps its value
        assert_eq!(out.value(3), 0x55);
    }

    #[test]
    fn test_action_data_slots() {
        let mut mem = memory();
        mem.instructions[2] = ActionInstruction::new()
            .with_op(0, OperandSource::action_data(Granularity::Word, 3))
            .with_op(1, OperandSource::action_data(Granularity::Half, 2))
            .with_op(2, OperandSource::action_data(Granularity::Byte, 9));

        let out = mem.apply_action(2, 0, 2, &Phv::new(&layout()));
        assert_eq!(out.value(0), 0x0F0E_0D0C);
        assert_eq!(out.value(1), 0x0504);
        assert_eq!(out.value(2), 0x09);
        assert!(out.is_valid(0));
        assert!(!out.is_valid(3));
    }

    #[test]
    fn test_unpopulated_slots_read_zero() {
        let mut mem = memory();
        mem.instructions[3] = ActionInstruction::new()
            .with_op(0, OperandSource::immediate(Granularity::Word, 1))
            .with_op(1, OperandSource::action_data(Granularity::Half, 8))
            .with_op(3, OperandSource::action_data(Granularity::Word, 0));

        let phv = Phv::from_values(&layout(), &[0xFFFF_FFFF, 0xFFFF, 0xFF, 0x1234]);
        // Action data row 3 is unwritten, row 100 does not exist
        let out = mem.apply_action(3, 1, 100, &phv);
        assert_eq!(out.value(0), 0);
        assert_eq!(out.value(1), 0);
        assert_eq!(out.value(3), 0);
        assert_eq!(out.value(2), 0xFF);
    }

    #[test]
    fn test_wide_source_truncated_to_container() {
        let mut mem = memory();
        mem.instructions[1] =
            ActionInstruction::new().with_op(2, OperandSource::immediate(Granularity::Word, 0));
        let out = mem.apply_action(1, 1, 0, &Phv::new(&layout()));
        assert_eq!(out.value(2), 0xDD);
    }

    #[test]
    fn test_set_op_keeps_one_op_per_container() {
        let mut instr = ActionInstruction::new()
            .with_op(5, OperandSource::immediate(Granularity::Byte, 0))
            .with_op(1, OperandSource::immediate(Granularity::Byte, 1));
        instr.set_op(5, OperandSource::immediate(Granularity::Half, 0));
        assert_eq!(instr.ops.len(), 2);
        assert_eq!(instr.ops[0].container, 1);
        assert_eq!(instr.op(5), OperandSource::immediate(Granularity::Half, 0));

        instr.set_op(5, OperandSource::PassThrough);
        assert_eq!(instr.op(5), OperandSource::PassThrough);
        assert_eq!(instr.ops.len(), 1);
    }

    #[test]
    fn test_operand_encoding() {
        let src = OperandSource::action_data(Granularity::Half, 7);
        assert_eq!(src.encode(), 2 | (1 << 2) | (7 << 4));
        assert_eq!(OperandSource::decode(src.encode()), Some(src));
        assert_eq!(OperandSource::decode(0), Some(OperandSource::PassThrough));
        // Kind 3 and granularity 3 are reserved
        assert_eq!(OperandSource::decode(3), None);
        assert_eq!(OperandSource::decode(1 | (3 << 2)), None);
        assert_eq!(OperandSource::decode(1 << 12), None);
    }
}
