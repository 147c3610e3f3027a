//! Configuration file handling.
//!
//! Defaults for the `render` command live in a TOML file; command-line
//! flags override them.
//!
//! # Configuration Location
//!
//! - Linux: `~/.config/vulnreport/config.toml`
//! - macOS: `~/Library/Application Support/vulnreport/config.toml`
//! - Windows: `%APPDATA%\vulnreport\config.toml`
//!
//! # Example Configuration
//!
//! ```toml
//! default_format = "table"
//! severities = ["HIGH", "CRITICAL"]
//! light = false
//! exit_code = 1
//! template = "@/etc/vulnreport/junit.tpl"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::model::Severity;

/// Application configuration.
///
/// # Example
///
/// ```no_run
/// use vulnreport::Config;
///
/// let config = Config::load().unwrap();
/// println!("Default format: {}", config.default_format);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Output format when no `--format` flag is given: "table", "json" or "template".
    ///
    /// Default: "table"
    pub default_format: String,

    /// Severities shown by the table format. Empty shows all.
    ///
    /// Default: empty
    pub severities: Vec<Severity>,

    /// Compact tables without the title column.
    ///
    /// Default: false
    pub light: bool,

    /// Template source, or `@path` to a template file, for the template format.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,

    /// Exit code when the report has vulnerabilities.
    ///
    /// Default: 0 (findings do not fail the run)
    pub exit_code: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_format: "table".to_string(),
            severities: Vec::new(),
            light: false,
            template: None,
            exit_code: 0,
        }
    }
}

impl Config {
    /// Loads configuration from the config file, or defaults if there is none.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Loads configuration from `path`, or defaults if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Saves the configuration to the config file, creating its directory.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Returns the path to the configuration file.
    ///
    /// # Example
    ///
    /// ```
    /// use vulnreport::Config;
    ///
    /// let path = Config::config_path();
    /// assert!(path.ends_with("vulnreport/config.toml"));
    /// ```
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("vulnreport")
            .join("config.toml")
    }

    /// The default configuration as TOML text.
    pub fn generate_default_config() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}
