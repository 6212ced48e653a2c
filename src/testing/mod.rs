//! Test harness for running packet scenarios through the stage model.
//!
//! This module provides infrastructure for:
//! - Loading TOML scenarios (program, packets, expected results)
//! - Running every packet and collecting mismatches
//!
//! # Usage
//!
//! ```ignore
//! let scenario = Scenario::from_file("scenarios/acl.toml")?;
//! let report = ScenarioRunner::new().run(&scenario)?;
//! assert!(report.passed(), "{}", report);
//! ```

pub mod scenario;

pub use scenario::{Mismatch, Scenario, ScenarioReport, ScenarioRunner};

#[cfg(test)]
pub(crate) use rng::XorShift;
