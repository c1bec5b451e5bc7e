//! TOML configuration for the command-line tool
//!
//! ```toml
//! [fonts]
//! "Noto Sans" = "/usr/share/fonts/noto/NotoSans-Regular.ttf"
//!
//! [session]
//! preview_dpi = 150
//! compact_exports = true
//! ```
//!
//! Relative font paths are resolved against the config file's directory.
//! Without a `[fonts]` table the built-in font table is used, relative to the
//! working directory.

use anyhow::Context;
use pdfstamp_core::{FontCatalog, FontSource, SessionConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Font display name → font file
    #[serde(default)]
    pub fonts: BTreeMap<String, PathBuf>,
    #[serde(default)]
    pub session: SessionConfig,
    /// Directory relative font paths are resolved against
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut config = Self::parse(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        config.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn parse(s: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(s).context("Failed to parse TOML configuration")?;
        if !(config.session.preview_dpi.is_finite() && config.session.preview_dpi > 0.0) {
            anyhow::bail!(
                "session.preview_dpi must be positive, got {}",
                config.session.preview_dpi
            );
        }
        Ok(config)
    }

    /// Config from `path`, or the defaults when no path is given
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn font_catalog(&self) -> FontCatalog {
        if self.fonts.is_empty() {
            return FontCatalog::with_defaults(&self.base_dir);
        }
        let mut catalog = FontCatalog::new();
        for (name, path) in &self.fonts {
            catalog.insert(name.clone(), FontSource::File(self.base_dir.join(path)));
        }
        catalog
    }
}
