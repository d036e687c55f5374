use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Defaults read from the user's config file. Command-line flags win.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default = "default_base_branch")]
    pub default_base_branch: String,
    #[serde(default)]
    pub api_base_url: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_base_branch: default_base_branch(),
            api_base_url: None,
        }
    }
}

fn default_base_branch() -> String {
    "main".into()
}

/// Config file path: `~/.config/branch-def-sync/config.toml`
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("branch-def-sync").join("config.toml"))
}

/// Load config from the default location, falling back to defaults.
pub fn load_config() -> AppConfig {
    match config_path() {
        Some(path) => load_config_from(&path),
        None => AppConfig::default(),
    }
}

/// Load config from `path`. A missing file means defaults; an unreadable or
/// malformed one also means defaults, with a warning.
pub fn load_config_from(path: &Path) -> AppConfig {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return AppConfig::default(),
        Err(e) => {
            warn!("failed to read config at {}: {e}, using defaults", path.display());
            return AppConfig::default();
        }
    };

    match toml::from_str::<AppConfig>(&contents) {
        Ok(config) => config,
        Err(e) => {
            warn!("failed to parse config at {}: {e}, using defaults", path.display());
            AppConfig::default()
        }
    }
}
