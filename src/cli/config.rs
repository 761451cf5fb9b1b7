//! TOML configuration file support.
//!
//! Defaults shared by many conversion files can live in a config file
//! instead of CLI flags:
//!
//! ```toml
//! # confluence.toml
//! [conversion]
//! profile = "fast"
//! compression = "gzip"
//! compression_level = 6
//! buffer_mib = 256
//! overwrite = false
//! stub_test = false
//! output_folder = "/scratch/stores"
//! ```
//!
//! Every value sits below the command-line flags; `profile` only applies
//! when `--profile` is not given.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use super::Profile;

const MIB: u64 = 1024 * 1024;

/// Root configuration structure for confluence.toml files.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Conversion-specific settings.
    #[serde(default)]
    pub conversion: ConversionConfig,
}

/// Configuration for the convert command.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConversionConfig {
    /// Conversion profile (fast, balanced, max-compression).
    pub profile: Option<String>,

    /// Dataset codec ("gzip" or "none").
    pub compression: Option<String>,

    /// Gzip level (0-9).
    pub compression_level: Option<u32>,

    /// Streaming buffer budget in MiB.
    pub buffer_mib: Option<u64>,

    /// Streaming buffer budget in bytes; wins over `buffer_mib`.
    pub buffer_bytes: Option<u64>,

    /// Replace existing output stores.
    pub overwrite: Option<bool>,

    /// Write only a short prefix of every dataset.
    pub stub_test: Option<bool>,

    /// Base folder for relative source paths.
    pub data_folder: Option<PathBuf>,

    /// Folder receiving the output stores.
    pub output_folder: Option<PathBuf>,
}

impl ConversionConfig {
    /// The configured profile, if any.
    pub fn profile(&self) -> Result<Option<Profile>> {
        self.profile
            .as_deref()
            .map(Profile::from_str)
            .transpose()
            .map_err(anyhow::Error::msg)
    }

    /// Run options set in this config, laid over `base`.
    pub fn apply(&self, base: &mut Map<String, Value>) {
        if let Some(compression) = &self.compression {
            base.insert("compression".into(), json!(compression));
        }
        if let Some(level) = self.compression_level {
            base.insert("compression_level".into(), json!(level));
        }
        if let Some(mib) = self.buffer_mib {
            base.insert("buffer_bytes".into(), json!(mib.saturating_mul(MIB)));
        }
        if let Some(bytes) = self.buffer_bytes {
            base.insert("buffer_bytes".into(), json!(bytes));
        }
        if let Some(stub) = self.stub_test {
            base.insert("stub_test".into(), json!(stub));
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse TOML configuration")
    }

    /// Load `path` if given, otherwise the empty configuration.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        path.map_or_else(|| Ok(Self::default()), Self::from_file)
    }
}
