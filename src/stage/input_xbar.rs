//! Input crossbar: assembles match keys and hash inputs from PHV bytes.
//!
//! The crossbar is byte-granular. Each output byte names a source container
//! and a byte within it:
//!
//! ```text
//!   key bit:   [ 7:0 ]   [ 15:8 ]  [ 23:16 ] ...
//!   source:    sel[0]    sel[1]    sel[2]
//! ```
//!
//! Byte 0 of a container is its least-significant byte.

use serde::{Deserialize, Serialize};

use crate::bitvec::BitVector;
use crate::phv::{Phv, PhvLayout};
use crate::store::ConfigError;

use super::spec::MAX_INPUT_XBAR_BYTES;

/// One crossbar byte select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteSelect {
    /// Source PHV container
    pub container: usize,
    /// Byte within the container (0 = least significant)
    pub byte: u8,
}

impl ByteSelect {
    pub fn new(container: usize, byte: u8) -> Self {
        Self { container, byte }
    }
}

/// An ordered list of byte selects forming one key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeySelect {
    bytes: Vec<ByteSelect>,
}

impl KeySelect {
    pub fn new(bytes: Vec<ByteSelect>) -> Self {
        Self { bytes }
    }

    /// Select every byte of each listed container, low byte first.
    ///
    /// A container missing from the layout keeps a single byte-0 select, so
    /// [`KeySelect::validate`] reports it.
    pub fn containers(layout: &PhvLayout, containers: &[usize]) -> Self {
        let bytes = containers
            .iter()
            .flat_map(|&c| {
                let n = layout.width(c).map_or(1, |w| w.bytes());
                (0..n).map(move |b| ByteSelect::new(c, b))
            })
            .collect();
        Self { bytes }
    }

    /// Key width in bits.
    #[inline]
    pub fn width_bits(&self) -> usize {
        self.bytes.len() * 8
    }

    /// The byte selects in key order.
    pub fn bytes(&self) -> &[ByteSelect] {
        &self.bytes
    }

    /// Build the key for a packet.
    pub fn assemble(&self, phv: &Phv) -> BitVector {
        let mut key = BitVector::new(self.width_bits());
        for (i, sel) in self.bytes.iter().enumerate() {
            key.insert(i * 8, 8, phv.byte(sel.container, sel.byte) as u64);
        }
        key
    }

    /// Check every select against the PHV layout.
    pub fn validate(&self, layout: &PhvLayout) -> Result<(), ConfigError> {
        if self.bytes.len() > MAX_INPUT_XBAR_BYTES {
            return Err(ConfigError::IndexOutOfRange {
                what: "input crossbar byte",
                index: self.bytes.len(),
                limit: MAX_INPUT_XBAR_BYTES,
            });
        }
        for sel in &self.bytes {
            match layout.width(sel.container) {
                Some(w) if sel.byte < w.bytes() => {}
                _ => {
                    return Err(ConfigError::BadByteSelect {
                        container: sel.container,
                        byte: sel.byte,
                    })
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phv::ContainerWidth;

    fn layout() -> PhvLayout {
        PhvLayout::new(vec![ContainerWidth::W32, ContainerWidth::W8, ContainerWidth::W16])
    }

    #[test]
    fn test_assemble_orders_bytes_low_first() {
        let phv = Phv::from_values(&layout(), &[0x1122_3344, 0x55, 0x6677]);
        let key = KeySelect::new(vec![
            ByteSelect::new(1, 0),
            ByteSelect::new(0, 3),
            ByteSelect::new(2, 0),
        ])
        .assemble(&phv);

        assert_eq!(key.width(), 24);
        assert_eq!(key.to_u64(), 0x77_11_55);
    }

    #[test]
    fn test_containers_helper() {
        let sel = KeySelect::containers(&layout(), &[2, 1]);
        assert_eq!(sel.width_bits(), 24);
        let phv = Phv::from_values(&layout(), &[0, 0xAA, 0xBBCC]);
        assert_eq!(sel.assemble(&phv).to_u64(), 0xAA_BBCC);
    }

    #[test]
    fn test_containers_helper_keeps_unknown_container() {
        let sel = KeySelect::containers(&layout(), &[1, 5]);
        assert_eq!(sel.bytes(), &[ByteSelect::new(1, 0), ByteSelect::new(5, 0)]);
        assert_eq!(
            sel.validate(&layout()),
            Err(ConfigError::BadByteSelect { container: 5, byte: 0 })
        );
    }

    #[test]
    fn test_validate_rejects_bytes_outside_container() {
        let sel = KeySelect::new(vec![ByteSelect::new(1, 1)]);
        assert_eq!(
            sel.validate(&layout()),
            Err(ConfigError::BadByteSelect { container: 1, byte: 1 })
        );

        let sel = KeySelect::new(vec![ByteSelect::new(7, 0)]);
        assert!(sel.validate(&layout()).is_err());

        let sel = KeySelect::new(vec![ByteSelect::new(0, 3), ByteSelect::new(2, 1)]);
        assert!(sel.validate(&layout()).is_ok());
    }
}
