//! Synchronization tunables and config file resolution

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "SYNCPLAY_CONFIG";

/// Tunables shared by every coordinator in a player tree
///
/// Neither the drift tolerance nor the resync period can be recovered from
/// observed behavior, so both are configurable with conservative defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Maximum divergence (ms) between a cluster member and the timeline
    /// reference before a corrective seek is issued
    pub drift_tolerance_ms: u64,

    /// Period (ms) of the single runtime timer driving drift correction,
    /// throttled position broadcasts and self-owned clocks
    pub tick_interval_ms: u64,

    /// How far ahead (ms) of a clip boundary the sequencer binds the next engine
    pub prefetch_lead_ms: u64,

    /// Position report period (ms) used by the simulated engine
    pub position_report_interval_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            drift_tolerance_ms: 250,
            tick_interval_ms: 200,
            prefetch_lead_ms: 1500,
            position_report_interval_ms: 200,
        }
    }
}

impl SyncConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: SyncConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid config TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Resolve configuration following priority order:
    /// 1. Command-line path (highest priority, must exist)
    /// 2. `SYNCPLAY_CONFIG` environment variable (must exist)
    /// 3. Platform config file (`<config_dir>/syncplay/config.toml`, if present)
    /// 4. Compiled defaults (fallback)
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = cli_path {
            info!("Loading config from command line path {}", path.display());
            return Self::from_file(path);
        }

        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            info!("Loading config from {}={}", CONFIG_ENV_VAR, path);
            return Self::from_file(Path::new(&path));
        }

        if let Some(path) = default_config_path() {
            if path.exists() {
                info!("Loading config from {}", path.display());
                return Self::from_file(&path);
            }
        }

        debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Reject values that would stall or spin the runtime timer
    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_ms == 0 {
            return Err(Error::Config("tick_interval_ms must be greater than 0".to_string()));
        }
        if self.drift_tolerance_ms == 0 {
            return Err(Error::Config("drift_tolerance_ms must be greater than 0".to_string()));
        }
        if self.position_report_interval_ms == 0 {
            return Err(Error::Config(
                "position_report_interval_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn position_report_interval(&self) -> Duration {
        Duration::from_millis(self.position_report_interval_ms)
    }
}

/// Platform config file location
fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("syncplay").join("config.toml"))
}
