//! Orchestrator configuration: the recognized options of §6.4, loaded from
//! an optional TOML file and layered with environment variable overrides,
//! the way the teacher's own config module resolves `AgentOvenConfig`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::classifier::DefaultOnUnknown;
use crate::error::{OrchestratorError, OrchestratorResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub inflight_per_subscription: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self { inflight_per_subscription: 8 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    pub retry_max_per_profile: u32,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self { retry_max_per_profile: 3 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CallbackSettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for CallbackSettings {
    fn default() -> Self {
        Self { max_attempts: 5, base_delay_ms: 1000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BlobConfig {
    pub batch_delete_size: usize,
    pub base_url: String,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self { batch_delete_size: 1000, base_url: "blob://local".to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaClassifierConfig {
    pub default_on_unknown: DefaultOnUnknown,
}

impl Default for MediaClassifierConfig {
    fn default() -> Self {
        Self { default_on_unknown: DefaultOnUnknown::Video }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub bus: BusConfig,
    pub aggregator: AggregatorConfig,
    pub callback: CallbackSettings,
    pub blob: BlobConfig,
    pub media_classifier: MediaClassifierConfig,
    /// Replaces the bus with an in-process queue for development (§6.4).
    pub disable_bus: bool,
}

impl OrchestratorConfig {
    /// Loads from `path` if it exists, then applies `TRANSCODE_*` environment
    /// overrides on top — file first, environment wins, mirroring the
    /// teacher's config precedence.
    pub fn load(path: Option<&Path>) -> OrchestratorResult<Self> {
        let mut config = match path {
            Some(path) if path.exists() => Self::from_file(path)?,
            _ => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> OrchestratorResult<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| OrchestratorError::Config(format!("reading {}: {e}", path.display())))?;
        toml::from_str(&contents).map_err(|e| OrchestratorError::Config(format!("parsing {}: {e}", path.display())))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var("TRANSCODE_BUS_INFLIGHT_PER_SUBSCRIPTION") {
            if let Ok(parsed) = value.parse() {
                self.bus.inflight_per_subscription = parsed;
            }
        }
        if let Ok(value) = std::env::var("TRANSCODE_AGGREGATOR_RETRY_MAX_PER_PROFILE") {
            if let Ok(parsed) = value.parse() {
                self.aggregator.retry_max_per_profile = parsed;
            }
        }
        if let Ok(value) = std::env::var("TRANSCODE_CALLBACK_MAX_ATTEMPTS") {
            if let Ok(parsed) = value.parse() {
                self.callback.max_attempts = parsed;
            }
        }
        if let Ok(value) = std::env::var("TRANSCODE_DISABLE_BUS") {
            self.disable_bus = value == "1" || value.eq_ignore_ascii_case("true");
        }
    }

    /// The conventional config file location, `~/.config/transcode/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs_next::config_dir().map(|dir| dir.join("transcode").join("config.toml"))
    }
}
