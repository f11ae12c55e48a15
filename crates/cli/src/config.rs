use anyhow::{Context, Result};
use context_server::EndpointsConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Everything a process invocation needs: where the database and
/// settings file live, what address to bind, and where the upstream AI
/// services are. Loaded from an optional TOML file and layered with
/// defaults, never from environment variables the user didn't ask for.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub bind_addr: String,
    pub db_path: PathBuf,
    pub settings_path: PathBuf,
    pub vector_store_path: PathBuf,
    pub endpoints: EndpointsConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("context-workspace");
        Self::rooted_at(data_dir)
    }
}

impl AppConfig {
    fn rooted_at(data_dir: PathBuf) -> Self {
        Self {
            bind_addr: "127.0.0.1:8787".to_string(),
            db_path: data_dir.join("workspace.db"),
            settings_path: data_dir.join("settings.toml"),
            vector_store_path: data_dir.join("vectors"),
            endpoints: EndpointsConfig::default(),
        }
    }

    /// Loads `path` if it exists; a missing file is not an error — it
    /// falls back to defaults rooted next to `path` itself (so a fresh
    /// `--config some/dir/config.toml` never touches the OS data dir),
    /// or the OS data dir when no path was given at all. A
    /// present-and-malformed file is a configuration error (exit code 2,
    /// §6).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            let data_dir = path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));
            return Ok(Self::rooted_at(data_dir));
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))
    }
}
