//! Configuration loading and parsing

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sim_bridge::{BridgeConfig, EventCode};
use std::fs;
use std::path::{Path, PathBuf};

/// Main application configuration (loaded from config.toml)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub library: LibraryConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LibraryConfig {
    pub path: Option<PathBuf>,
    /// Exported `int32_t (*)(void* ctx)` to call once the session is open
    pub entry_point: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    #[serde(default = "default_session_name")]
    pub name: String,
    /// Event names or codes to subscribe to
    #[serde(default)]
    pub events: Vec<String>,
}

fn default_session_name() -> String {
    "sim-bridge-cli".to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name: default_session_name(),
            events: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OutputConfig {
    /// Write the callback transcript as JSON
    pub json: Option<PathBuf>,
}

impl AppConfig {
    /// Parse the configured event names
    pub fn event_codes(&self) -> Result<Vec<EventCode>> {
        self.session
            .events
            .iter()
            .map(|name| {
                name.parse::<EventCode>()
                    .with_context(|| format!("Invalid event in [session] events: {:?}", name))
            })
            .collect()
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    Ok(config)
}
