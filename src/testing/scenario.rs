//! Scenario runner: packets through a stage program, checked against
//! expected outputs.
//!
//! # Example Scenario
//!
//! ```toml
//! [scenario]
//! name = "acl_hit"
//!
//! [program]
//! containers = [32, 32]
//! # ... any stage program, see `crate::program`
//!
//! [[packets]]
//! phv = [{ container = 0, value = "0x0a000001" }]
//!
//! [[packets.expect.containers]]
//! container = 1
//! value = "0x11111111"
//!
//! [[packets.expect.tables]]
//! id = 0
//! hit = true
//! action_instr = 0
//! next_table = 1
//! ```
//!
//! Expected table fields are optional; only the listed ones are compared.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fmt;
use std::path::Path;

use crate::config::Config;
use crate::phv::{Gress, PacketVersion, Phv, PhvLayout};
use crate::program::{Literal, ProgramDef};
use crate::stage::{process_packet, ResourceClass, StageOutput};
use crate::store::StageConfig;

/// A complete scenario.
#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub scenario: ScenarioInfo,
    pub program: ProgramDef,
    #[serde(default)]
    pub packets: Vec<PacketDef>,
}

/// Basic scenario metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioInfo {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// One input packet and its expectations.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PacketDef {
    pub gress: Gress,
    pub version: u8,
    /// Container values; unlisted containers start invalid
    pub phv: Vec<ContainerValue>,
    pub expect: ExpectDef,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContainerValue {
    pub container: usize,
    pub value: Literal,
    /// Only checked in expectations
    #[serde(default)]
    pub valid: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ExpectDef {
    pub containers: Vec<ContainerValue>,
    pub tables: Vec<TableExpect>,
    /// Tables expected to be evaluated, in order
    pub evaluated: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TableExpect {
    pub id: u8,
    pub hit: Option<bool>,
    pub ternary_hit: Option<bool>,
    pub exact_hit: Option<bool>,
    pub action_instr: Option<u32>,
    pub immediate: Option<u32>,
    pub action_data: Option<u32>,
    pub stats: Option<u32>,
    pub meter: Option<u32>,
    pub idletime: Option<u32>,
    pub next_table: Option<u8>,
}

/// One failed comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    /// Packet index within the scenario
    pub packet: usize,
    /// What was compared, e.g. `phv[3]` or `table 0 stats`
    pub what: String,
    pub expected: u64,
    pub actual: u64,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "packet {}: {} expected {:#x}, got {:#x}",
            self.packet, self.what, self.expected, self.actual
        )
    }
}

/// Result of running a scenario.
#[derive(Debug, Clone, Default)]
pub struct ScenarioReport {
    pub name: String,
    pub packets: usize,
    pub checks: usize,
    pub mismatches: Vec<Mismatch>,
}

impl ScenarioReport {
    pub fn passed(&self) -> bool {
        self.mismatches.is_empty()
    }

    fn check(&mut self, packet: usize, what: impl Into<String>, expected: u64, actual: u64) {
        self.checks += 1;
        if expected != actual {
            self.mismatches.push(Mismatch {
                packet,
                what: what.into(),
                expected,
                actual,
            });
        }
    }
}

impl fmt::Display for ScenarioReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.passed() { "PASS" } else { "FAIL" };
        writeln!(
            f,
            "{} {}: {} packet(s), {}/{} checks",
            status,
            self.name,
            self.packets,
            self.checks - self.mismatches.len(),
            self.checks
        )?;
        for m in &self.mismatches {
            writeln!(f, "  {}", m)?;
        }
        Ok(())
    }
}

impl Scenario {
    /// Load a scenario from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("In scenario {}", path.display()))
    }

    /// Parse a scenario document.
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).context("Failed to parse scenario")
    }
}

/// Runs scenarios.
pub struct ScenarioRunner {
    /// Layout for programs that do not declare one
    default_layout: PhvLayout,
}

impl ScenarioRunner {
    /// Runner using the configured default PHV layout.
    pub fn new() -> Self {
        Self {
            default_layout: Config::get().phv_layout(),
        }
    }

    /// Override the default PHV layout.
    pub fn with_layout(mut self, layout: PhvLayout) -> Self {
        self.default_layout = layout;
        self
    }

    /// Build the program and run every packet.
    ///
    /// Fails only if the program or a packet literal is invalid; output
    /// differences are reported in the returned report.
    pub fn run(&self, scenario: &Scenario) -> Result<ScenarioReport> {
        let config = scenario
            .program
            .build(&self.default_layout)
            .with_context(|| format!("Scenario '{}' has an invalid program", scenario.scenario.name))?;

        let mut report = ScenarioReport {
            name: scenario.scenario.name.clone(),
            packets: scenario.packets.len(),
            ..Default::default()
        };

        for (index, packet) in scenario.packets.iter().enumerate() {
            let out = run_packet(&config, packet)
                .with_context(|| format!("Packet {} of '{}'", index, scenario.scenario.name))?;
            compare(&mut report, index, &packet.expect, &out)?;
        }

        log::debug!(
            "scenario {}: {} mismatch(es)",
            report.name,
            report.mismatches.len()
        );
        Ok(report)
    }
}

impl Default for ScenarioRunner {
    fn default() -> Self {
        Self::new()
    }
}

fn run_packet(config: &StageConfig, packet: &PacketDef) -> Result<StageOutput> {
    let mut phv = Phv::new(&config.layout);
    for cv in &packet.phv {
        let value = cv.value.to_u64()?;
        let value = u32::try_from(value)
            .with_context(|| format!("Value {:#x} too wide for a container", value))?;
        if !phv.set(cv.container, value) {
            anyhow::bail!("Container {} does not exist", cv.container);
        }
        if cv.valid == Some(false) {
            phv.invalidate(cv.container);
        }
    }
    Ok(process_packet(
        config,
        &phv,
        PacketVersion::new(packet.gress, packet.version),
    ))
}

fn compare(
    report: &mut ScenarioReport,
    packet: usize,
    expect: &ExpectDef,
    out: &StageOutput,
) -> Result<()> {
    for cv in &expect.containers {
        report.check(
            packet,
            format!("phv[{}]", cv.container),
            cv.value.to_u64()?,
            out.phv.value(cv.container) as u64,
        );
        if let Some(valid) = cv.valid {
            report.check(
                packet,
                format!("phv[{}].valid", cv.container),
                valid as u64,
                out.phv.is_valid(cv.container) as u64,
            );
        }
    }

    if let Some(ids) = &expect.evaluated {
        let actual: Vec<u8> = out.tables.iter().map(|t| t.table_id).collect();
        report.check(packet, "evaluated table count", ids.len() as u64, actual.len() as u64);
        for (i, (e, a)) in ids.iter().zip(&actual).enumerate() {
            report.check(packet, format!("evaluated[{}]", i), *e as u64, *a as u64);
        }
    }

    for te in &expect.tables {
        let Some(result) = out.table(te.id) else {
            // Expected a result, table was skipped
            report.check(packet, format!("table {} evaluated", te.id), 1, 0);
            continue;
        };
        let id = te.id;
        let flags = [
            ("hit", te.hit, result.hit()),
            ("ternary hit", te.ternary_hit, result.ternary.hit),
            ("exact hit", te.exact_hit, result.exact.hit),
        ];
        for (name, expected, actual) in flags {
            if let Some(expected) = expected {
                report.check(packet, format!("table {} {}", id, name), expected as u64, actual as u64);
            }
        }

        let addresses = [
            (ResourceClass::ActionInstr, te.action_instr),
            (ResourceClass::Immediate, te.immediate),
            (ResourceClass::ActionData, te.action_data),
            (ResourceClass::Stats, te.stats),
            (ResourceClass::Meter, te.meter),
            (ResourceClass::IdleTime, te.idletime),
        ];
        for (class, expected) in addresses {
            if let Some(expected) = expected {
                report.check(
                    packet,
                    format!("table {} {}", id, class),
                    expected as u64,
                    result.addresses.get(class) as u64,
                );
            }
        }

        if let Some(expected) = te.next_table {
            report.check(
                packet,
                format!("table {} next_table", id),
                expected as u64,
                result.next_table() as u64,
            );
        }
    }
    Ok(())
}
