//! Packet Header Vector.
//!
//! The PHV is the per-packet working set that flows through the pipeline: an
//! ordered list of fixed-width containers, each holding one header field or
//! metadata value plus a validity bit.
//!
//! ```text
//!  index:   0 ........ 63 | 64 ...... 127 | 128 ...... 223
//!  width:   32-bit        | 8-bit         | 16-bit          (tofino preset)
//! ```
//!
//! Container widths are fixed by the layout and never change while a packet
//! is in flight. Values written to a container are truncated to its width.

use serde::{Deserialize, Serialize};

/// Width of a PHV container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ContainerWidth {
    /// 8-bit container
    W8,
    /// 16-bit container
    W16,
    /// 32-bit container
    W32,
}

impl ContainerWidth {
    /// Width in bits.
    #[inline]
    pub fn bits(self) -> u32 {
        match self {
            ContainerWidth::W8 => 8,
            ContainerWidth::W16 => 16,
            ContainerWidth::W32 => 32,
        }
    }

    /// Width in bytes.
    #[inline]
    pub fn bytes(self) -> u8 {
        (self.bits() / 8) as u8
    }

    /// Mask covering the container's bits.
    #[inline]
    pub fn mask(self) -> u32 {
        match self {
            ContainerWidth::W8 => 0xFF,
            ContainerWidth::W16 => 0xFFFF,
            ContainerWidth::W32 => 0xFFFF_FFFF,
        }
    }
}

impl TryFrom<u8> for ContainerWidth {
    type Error = String;

    fn try_from(bits: u8) -> Result<Self, Self::Error> {
        match bits {
            8 => Ok(ContainerWidth::W8),
            16 => Ok(ContainerWidth::W16),
            32 => Ok(ContainerWidth::W32),
            other => Err(format!("unsupported container width {}", other)),
        }
    }
}

impl From<ContainerWidth> for u8 {
    fn from(width: ContainerWidth) -> u8 {
        width.bits() as u8
    }
}

/// Container layout of a PHV.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhvLayout {
    widths: Vec<ContainerWidth>,
}

impl PhvLayout {
    /// Create a layout from explicit container widths.
    pub fn new(widths: Vec<ContainerWidth>) -> Self {
        Self { widths }
    }

    /// `count` containers all of one width.
    pub fn uniform(width: ContainerWidth, count: usize) -> Self {
        Self::new(vec![width; count])
    }

    /// The 224-container layout: 64 x 32-bit, 64 x 8-bit, 96 x 16-bit.
    pub fn tofino() -> Self {
        let mut widths = Vec::with_capacity(224);
        widths.extend(std::iter::repeat(ContainerWidth::W32).take(64));
        widths.extend(std::iter::repeat(ContainerWidth::W8).take(64));
        widths.extend(std::iter::repeat(ContainerWidth::W16).take(96));
        Self::new(widths)
    }

    /// Look up a named preset.
    pub fn from_preset(name: &str) -> Option<Self> {
        match name {
            "tofino" => Some(Self::tofino()),
            "uniform32" => Some(Self::uniform(ContainerWidth::W32, 64)),
            _ => None,
        }
    }

    /// Number of containers.
    #[inline]
    pub fn len(&self) -> usize {
        self.widths.len()
    }

    /// True if the layout has no containers.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.widths.is_empty()
    }

    /// Width of container `index`.
    #[inline]
    pub fn width(&self, index: usize) -> Option<ContainerWidth> {
        self.widths.get(index).copied()
    }

    /// All widths in container order.
    pub fn widths(&self) -> &[ContainerWidth] {
        &self.widths
    }
}

/// A single PHV container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Container {
    /// Fixed width
    pub width: ContainerWidth,
    /// Value, always within `width`
    pub value: u32,
    /// Validity bit
    pub valid: bool,
}

impl Container {
    /// An empty (zero, invalid) container.
    pub fn new(width: ContainerWidth) -> Self {
        Self {
            width,
            value: 0,
            valid: false,
        }
    }

    /// Byte `index` of the value (0 = least significant).
    ///
    /// Bytes above the container width read as zero.
    #[inline]
    pub fn byte(&self, index: u8) -> u8 {
        if index >= self.width.bytes() {
            return 0;
        }
        (self.value >> (index as u32 * 8)) as u8
    }
}

/// Packet Header Vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phv {
    containers: Vec<Container>,
}

impl Phv {
    /// Create an all-invalid PHV for a layout.
    pub fn new(layout: &PhvLayout) -> Self {
        Self {
            containers: layout.widths().iter().map(|w| Container::new(*w)).collect(),
        }
    }

    /// Create a PHV with every container set (and valid) from `values`.
    ///
    /// Missing trailing values leave their containers invalid.
    pub fn from_values(layout: &PhvLayout, values: &[u32]) -> Self {
        let mut phv = Self::new(layout);
        for (index, value) in values.iter().enumerate() {
            phv.set(index, *value);
        }
        phv
    }

    /// Number of containers.
    #[inline]
    pub fn len(&self) -> usize {
        self.containers.len()
    }

    /// True if the PHV has no containers.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }

    /// Container `index`.
    #[inline]
    pub fn get(&self, index: usize) -> Option<&Container> {
        self.containers.get(index)
    }

    /// Value of container `index`, or zero if it does not exist.
    #[inline]
    pub fn value(&self, index: usize) -> u32 {
        self.containers.get(index).map(|c| c.value).unwrap_or(0)
    }

    /// Validity of container `index`.
    #[inline]
    pub fn is_valid(&self, index: usize) -> bool {
        self.containers.get(index).map(|c| c.valid).unwrap_or(false)
    }

    /// Write container `index`, truncating to its width and marking it valid.
    ///
    /// Returns false if the container does not exist.
    pub fn set(&mut self, index: usize, value: u32) -> bool {
        match self.containers.get_mut(index) {
            Some(c) => {
                c.value = value & c.width.mask();
                c.valid = true;
                true
            }
            None => false,
        }
    }

    /// Clear the validity bit of container `index`.
    pub fn invalidate(&mut self, index: usize) {
        if let Some(c) = self.containers.get_mut(index) {
            c.valid = false;
        }
    }

    /// Byte `byte` of container `index` (zero for unknown containers).
    #[inline]
    pub fn byte(&self, index: usize, byte: u8) -> u8 {
        self.containers.get(index).map(|c| c.byte(byte)).unwrap_or(0)
    }

    /// Iterate over containers in index order.
    pub fn iter(&self) -> impl Iterator<Item = &Container> {
        self.containers.iter()
    }

    /// The layout this PHV was built from.
    pub fn layout(&self) -> PhvLayout {
        PhvLayout::new(self.containers.iter().map(|c| c.width).collect())
    }
}

/// Pipeline direction a packet (or table) belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gress {
    /// Ingress pipeline
    #[default]
    Ingress,
    /// Egress pipeline
    Egress,
}

impl std::fmt::Display for Gress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Gress::Ingress => write!(f, "ingress"),
            Gress::Egress => write!(f, "egress"),
        }
    }
}

/// Per-packet version tag, supplied by the upstream parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PacketVersion {
    /// Which pipeline the packet is in
    pub gress: Gress,
    /// 2-bit table version
    pub version: u8,
}

impl PacketVersion {
    /// Create a version tag. The version is truncated to its 2-bit field.
    pub fn new(gress: Gress, version: u8) -> Self {
        Self {
            gress,
            version: version & 0x3,
        }
    }

    /// Ingress packet at version 0.
    pub fn ingress() -> Self {
        Self::new(Gress::Ingress, 0)
    }

    /// Egress packet at version 0.
    pub fn egress() -> Self {
        Self::new(Gress::Egress, 0)
    }
}
