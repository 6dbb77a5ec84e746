//! Configuration system for fsgate
//!
//! Reads an optional TOML file (default `~/.config/fsgate/config.toml`);
//! command-line flags override whatever the file sets. The result is
//! built once at startup and never changes afterwards.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
        }
    }
}

/// Workspace configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Directory exposed over HTTP, created if missing
    pub root: Option<PathBuf>,
    /// File holding the shared secret
    pub passwd_file: Option<PathBuf>,
}

/// Full application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub workspace: WorkspaceConfig,
}

/// Values given on the command line
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub root: Option<PathBuf>,
    pub passwd_file: Option<PathBuf>,
}

impl Config {
    /// Load from `explicit` if given (it must exist), else from the default
    /// path when present, else defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from_path(path);
        }

        let path = Self::default_config_path();
        if path.is_file() {
            Self::load_from_path(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Get default config path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("fsgate")
            .join("config.toml")
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(host) = overrides.host {
            self.server.host = host;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if overrides.root.is_some() {
            self.workspace.root = overrides.root;
        }
        if overrides.passwd_file.is_some() {
            self.workspace.passwd_file = overrides.passwd_file;
        }
    }

    pub fn workspace_root(&self) -> Result<&Path> {
        self.workspace
            .root
            .as_deref()
            .context("no workspace directory configured: pass --workpath or set [workspace] root")
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
