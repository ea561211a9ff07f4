//! Configuration management for govrun.
//!
//! Handles loading configuration from TOML files.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::actions::SuiteCommand;
use crate::output::OutputFormat;

/// Local config file name, looked up in the current directory.
pub const LOCAL_CONFIG: &str = ".govrun.toml";

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Output settings
    pub output: OutputConfig,

    /// Eval suite runner
    pub evals: EvalsConfig,

    /// Notification delivery
    pub notify: NotifyConfig,
}

/// General settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Root of the runbook store and workspace for filesystem actions.
    /// Defaults to the current directory.
    pub repo_root: Option<PathBuf>,
}

/// Output settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Default response format
    pub format: OutputFormat,
}

/// External eval suite runner.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalsConfig {
    /// Executable to spawn
    pub program: String,

    /// Arguments placed before the suite name
    pub args: Vec<String>,
}

/// Notification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Print notify records to stdout as JSON lines
    pub stdout: bool,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Looks for config in:
    /// 1. `.govrun.toml` in current directory
    /// 2. `~/.config/govrun/config.toml`
    /// 3. Falls back to defaults
    pub fn load() -> anyhow::Result<Self> {
        let local_config = PathBuf::from(LOCAL_CONFIG);
        if local_config.exists() {
            return Self::load_from_file(&local_config);
        }

        if let Some(global_config) = Self::config_dir().map(|d| d.join("config.toml")) {
            if global_config.exists() {
                return Self::load_from_file(&global_config);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        tracing::debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Get the config directory path.
    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("govrun"))
    }

    /// Repo root, falling back to the current directory.
    ///
    /// A leading `~` is expanded.
    pub fn repo_root(&self) -> anyhow::Result<PathBuf> {
        match self.general.repo_root {
            Some(ref root) => {
                let expanded = shellexpand::tilde(&root.to_string_lossy()).into_owned();
                Ok(PathBuf::from(expanded))
            }
            None => Ok(std::env::current_dir()?),
        }
    }

    /// The eval suite command line.
    pub fn suite_command(&self) -> SuiteCommand {
        SuiteCommand { program: self.evals.program.clone(), args: self.evals.args.clone() }
    }
}

impl Default for EvalsConfig {
    fn default() -> Self {
        Self { program: "aaa".to_string(), args: vec!["eval".to_string(), "run".to_string()] }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self { stdout: true }
    }
}
