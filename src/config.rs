//! Model settings.
//!
//! Settings are loaded from multiple sources in priority order:
//! 1. Environment variables (`MAU_MODEL_PROGRAM_DIR`, `MAU_MODEL_PHV_PRESET`)
//! 2. Project-local config file (`./mau-model.toml`)
//! 3. User config file (`~/.config/mau-model/config.toml`)
//! 4. Built-in defaults
//!
//! # Config File Format
//!
//! ```toml
//! # mau-model.toml
//!
//! # Directory that relative stage program names resolve against
//! program_dir = "/home/user/stage-programs"
//!
//! # PHV layout used when a program does not declare one
//! phv_preset = "tofino"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::phv::PhvLayout;

/// Global cached settings.
static CONFIG: OnceLock<Config> = OnceLock::new();

const DEFAULT_PRESET: &str = "tofino";

/// mau-model settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Directory holding stage program files.
    pub program_dir: Option<String>,

    /// Name of the default PHV layout preset.
    pub phv_preset: Option<String>,
}

impl Config {
    /// Load settings from all sources.
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(user_config) = Self::load_user_config() {
            config.merge(user_config);
        }

        if let Some(local_config) = Self::load_local_config() {
            config.merge(local_config);
        }

        // Environment variables override everything
        config.apply_env_overrides();

        config
    }

    /// Get the cached global settings, loading them on first call.
    pub fn get() -> &'static Config {
        CONFIG.get_or_init(|| {
            let config = Self::load();
            log::debug!("Loaded configuration: {:?}", config);
            config
        })
    }

    /// Program directory, defaulting to the current directory.
    pub fn program_dir(&self) -> PathBuf {
        self.program_dir
            .as_deref()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Resolve a program path. Absolute paths are returned unchanged.
    pub fn resolve_program(&self, name: impl AsRef<Path>) -> PathBuf {
        let name = name.as_ref();
        if name.is_absolute() {
            name.to_path_buf()
        } else {
            self.program_dir().join(name)
        }
    }

    /// Default PHV layout preset name.
    pub fn phv_preset(&self) -> &str {
        self.phv_preset.as_deref().unwrap_or(DEFAULT_PRESET)
    }

    /// Default PHV layout. An unknown preset falls back to `tofino`.
    pub fn phv_layout(&self) -> PhvLayout {
        PhvLayout::from_preset(self.phv_preset()).unwrap_or_else(|| {
            log::warn!("Unknown PHV preset '{}', using {}", self.phv_preset(), DEFAULT_PRESET);
            PhvLayout::tofino()
        })
    }

    /// Load user settings from ~/.config/mau-model/config.toml
    fn load_user_config() -> Option<Self> {
        Self::load_from_file(&Self::user_config_path()?)
    }

    /// Load project-local settings from ./mau-model.toml
    fn load_local_config() -> Option<Self> {
        if let Some(config) = Self::load_from_file(Path::new("mau-model.toml")) {
            return Some(config);
        }

        // Fall back to the crate root when run under cargo
        if let Ok(manifest_dir) = std::env::var("CARGO_MANIFEST_DIR") {
            let project_path = Path::new(&manifest_dir).join("mau-model.toml");
            if let Some(config) = Self::load_from_file(&project_path) {
                return Some(config);
            }
        }

        None
    }

    /// Load settings from a specific file.
    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    log::info!("Loaded config from {}", path.display());
                    Some(config)
                }
                Err(e) => {
                    log::warn!("Failed to parse {}: {}", path.display(), e);
                    None
                }
            },
            Err(e) => {
                log::warn!("Failed to read {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Merge another config into this one.
    /// Only overrides fields that are Some in the other config.
    fn merge(&mut self, other: Self) {
        if other.program_dir.is_some() {
            self.program_dir = other.program_dir;
        }
        if other.phv_preset.is_some() {
            self.phv_preset = other.phv_preset;
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("MAU_MODEL_PROGRAM_DIR") {
            log::info!("Using MAU_MODEL_PROGRAM_DIR from environment: {}", dir);
            self.program_dir = Some(dir);
        }
        if let Ok(preset) = std::env::var("MAU_MODEL_PHV_PRESET") {
            log::info!("Using MAU_MODEL_PHV_PRESET from environment: {}", preset);
            self.phv_preset = Some(preset);
        }
    }

    /// Path to the user config file.
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("mau-model").join("config.toml"))
    }

    /// Sample config file content.
    pub fn sample_config() -> String {
        r#"# mau-model configuration
# Place this file at ~/.config/mau-model/config.toml or ./mau-model.toml

# Directory that relative stage program names resolve against
# program_dir = "/home/user/stage-programs"

# PHV layout used when a program does not declare one: tofino | uniform32
phv_preset = "tofino"
"#
        .to_string()
    }
}
