//! mau-model library
//!
//! Behavioral model of one match-action stage of a programmable switch
//! pipeline: hash engine, ternary and exact match units, address
//! distribution and the action crossbar, driven by a validated stage
//! configuration.

pub mod bitvec;
pub mod config;
pub mod phv;
pub mod program;
pub mod stage;
pub mod store;
pub mod testing;

pub use phv::{PacketVersion, Phv, PhvLayout};
pub use stage::{process_packet, StageOutput};
pub use store::{ConfigCommand, ConfigError, ConfigStore, StageConfig, StageConfigBuilder};
