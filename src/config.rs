//! User settings and processing configuration.
//!
//! Settings are a single small record persisted between sessions. They are
//! read once per batch and passed in explicitly; the engine itself holds no
//! global state.
//!
//! ## File Location
//!
//! ```text
//! <config dir>/picslim/settings.toml     # e.g. ~/.config/picslim/settings.toml
//! ```
//!
//! `--settings FILE` on the command line points the store somewhere else.
//!
//! ## Format
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [picslim_settings]
//! quality = 90                      # 0-100; 100 = lossless PNG tier
//! # output_dir = "/home/me/Pictures/PicSlim"   # omit for the default
//! oversize_policy = "write_encoded" # or "keep_original"
//!
//! [picslim_settings.processing]
//! # max_workers = 4                 # omit for auto = min(cores, 8)
//! ```
//!
//! ## Partial and Broken Records
//!
//! Stored values are merged over stock defaults, so a record only needs the
//! keys it changes. Loading never fails: a missing, unparsable, or invalid
//! record falls back to defaults with a warning. Unknown keys count as
//! invalid so typos do not go unnoticed.

use crate::types::{CompressionSettings, OversizePolicy};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Top-level table the record lives under.
pub const SETTINGS_KEY: &str = "picslim_settings";

/// Worker ceiling when the user has not picked a number.
const AUTO_WORKER_CAP: usize = 8;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Settings validation error: {0}")]
    Validation(String),
}

/// Persisted user settings.
///
/// All fields have defaults; a stored record need only specify the values
/// it overrides. Unknown keys are rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Target quality (0-100).
    pub quality: u32,
    /// Output directory; `None` means the platform default.
    pub output_dir: Option<PathBuf>,
    /// What to do when re-encoding does not make a file smaller.
    pub oversize_policy: OversizePolicy,
    /// Worker pool settings.
    pub processing: ProcessingConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            quality: 90,
            output_dir: None,
            oversize_policy: OversizePolicy::default(),
            processing: ProcessingConfig::default(),
        }
    }
}

impl Settings {
    /// Validate values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.quality > 100 {
            return Err(ConfigError::Validation("quality must be 0-100".into()));
        }
        if self.processing.max_workers == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_workers must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// The output directory, resolving an unset one to the platform default.
    pub fn resolved_output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(crate::engine::get_default_output_dir)
    }

    /// Batch settings derived from these user settings.
    pub fn compression_settings(&self) -> CompressionSettings {
        CompressionSettings::new(self.quality, self.resolved_output_dir())
            .with_oversize_policy(self.oversize_policy)
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of compression workers.
    /// When absent, defaults to the core count capped at 8.
    /// Values larger than the core count are clamped down.
    pub max_workers: Option<usize>,
}

/// Resolve the effective worker count from config.
///
/// - `None` → `min(cores, 8)`
/// - `Some(n)` → `n` clamped to `1..=cores` (user can constrain down, not up)
pub fn effective_workers(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    match config.max_workers {
        Some(n) => n.clamp(1, cores),
        None => cores.min(AUTO_WORKER_CAP),
    }
}

/// Returns the stock default settings as a `toml::Value::Table`.
///
/// This is the base layer stored records are merged on top of.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(Settings::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Parse a settings file's contents: pick the record out of its table,
/// merge over defaults, deserialize and validate.
pub fn parse_settings(content: &str) -> Result<Settings, ConfigError> {
    let document: toml::Value = toml::from_str(content)?;
    let record = document
        .get(SETTINGS_KEY)
        .cloned()
        .unwrap_or_else(|| toml::Value::Table(toml::map::Map::new()));
    let merged = merge_toml(stock_defaults_value()?, record);
    let settings: Settings = merged.try_into()?;
    settings.validate()?;
    Ok(settings)
}

/// Render settings as a file with the record under [`SETTINGS_KEY`].
pub fn render_settings(settings: &Settings) -> Result<String, ConfigError> {
    let mut document = toml::map::Map::new();
    document.insert(SETTINGS_KEY.to_string(), toml::Value::try_from(settings)?);
    Ok(toml::to_string_pretty(&toml::Value::Table(document))?)
}

/// Reads and writes the settings file.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config dir>/picslim/settings.toml`, if the platform has a config dir.
    pub fn default_location() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("picslim").join("settings.toml"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored record, or `None` if there is no file yet.
    pub fn try_load(&self) -> Result<Option<Settings>, ConfigError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)?;
        parse_settings(&content).map(Some)
    }

    /// Load settings, falling back to defaults on any problem.
    pub fn load(&self) -> Settings {
        match self.try_load() {
            Ok(Some(settings)) => settings,
            Ok(None) => Settings::default(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "ignoring unreadable settings");
                Settings::default()
            }
        }
    }

    /// Validate and write atomically (temp file + rename in the same
    /// directory).
    pub fn save(&self, settings: &Settings) -> Result<(), ConfigError> {
        settings.validate()?;
        let rendered = render_settings(settings)?;
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(rendered.as_bytes())?;
        tmp.flush()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }

    /// Read-modify-write. Returns the saved settings.
    pub fn update(&self, change: impl FnOnce(&mut Settings)) -> Result<Settings, ConfigError> {
        let mut settings = self.load();
        change(&mut settings);
        self.save(&settings)?;
        Ok(settings)
    }

    /// Store the defaults.
    pub fn reset(&self) -> Result<Settings, ConfigError> {
        let settings = Settings::default();
        self.save(&settings)?;
        Ok(settings)
    }
}

/// Returns a fully-commented stock settings file with all keys and
/// explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# PicSlim Settings
# ================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Default location: <config dir>/picslim/settings.toml
# Unknown keys make the whole record fall back to defaults.

[picslim_settings]
# Target quality (0 = smallest, 100 = best).
# JPEG: mozjpeg quality. PNG: 100 keeps every pixel, lower values reduce the
# palette. GIF: controls dithering and how aggressively similar pixels merge.
quality = 90

# Where compressed files are written.
# Omit to use <Pictures>/PicSlim.
# output_dir = "/path/to/output"

# What to do when a re-encoded file comes out larger than the original:
#   "write_encoded" - write it anyway and report the growth
#   "keep_original" - write the original bytes and report no change
oversize_policy = "write_encoded"

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[picslim_settings.processing]
# Maximum parallel compression workers.
# Omit or comment out to auto-detect (= CPU cores, at most 8).
# max_workers = 4
"##
}
