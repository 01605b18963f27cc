//! Configuration module.
//!
//! Handles loading, validating, and merging config layers. Stock defaults are
//! the base layer; each file on top only needs the keys it wants to change.
//!
//! ## Config File Location
//!
//! Layers, lowest first:
//!
//! 1. stock defaults
//! 2. `~/.simple-pano.toml`, if it exists
//! 3. the file given with `--config`, which must exist
//!
//! Layers merge key by key, so a project file can change one key of a section
//! and keep the rest of that section from the home file.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [krpano]
//! tools = "krpanotools"              # krpano tools binary
//! template = "vtour-multires.config" # path, or name under <tools dir>/templates
//! timeout_secs = 1800                # bound on every tool invocation
//!
//! [directories]
//! panoramas = "panoramas"            # root for resolving image references
//!
//! [staleness]                        # "modified" or "status-changed"
//! scene_document = "status-changed"
//! preview = "status-changed"
//! twitter_card = "status-changed"
//! mirror = "modified"
//!
//! [mirror]
//! exclude_extensions = []
//!
//! [processing]
//! max_processes = 4                  # omit for auto = CPU cores
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::staleness::StalenessPolicy;
use crate::tiling::{self, TilingSettings};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// File name of the default config in the home directory.
pub const DEFAULT_CONFIG_NAME: &str = ".simple-pano.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Configuration loaded from `.simple-pano.toml`.
///
/// All fields have defaults. Unknown keys are rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PanoConfig {
    pub krpano: KrpanoConfig,
    pub directories: DirectoriesConfig,
    /// Timestamp basis per artifact class.
    pub staleness: StalenessPolicy,
    pub mirror: MirrorConfig,
    pub processing: ProcessingConfig,
}

impl PanoConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.krpano.tools.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "krpano.tools must not be empty".into(),
            ));
        }
        if self.krpano.template.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "krpano.template must not be empty".into(),
            ));
        }
        if self.krpano.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "krpano.timeout_secs must be positive".into(),
            ));
        }
        if self.processing.max_processes == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_processes must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.krpano.timeout_secs)
    }

    /// Tiling settings with the template resolved against the tools path.
    pub fn tiling_settings(&self) -> TilingSettings {
        TilingSettings {
            template: tiling::resolve_template(&self.krpano.tools, &self.krpano.template),
            staleness: self.staleness.clone(),
        }
    }
}

/// The external krpano tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KrpanoConfig {
    pub tools: PathBuf,
    pub template: PathBuf,
    pub timeout_secs: u64,
}

impl Default for KrpanoConfig {
    fn default() -> Self {
        Self {
            tools: PathBuf::from("krpanotools"),
            template: PathBuf::from("vtour-multires.config"),
            timeout_secs: 30 * 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DirectoriesConfig {
    /// Root against which descriptor image references are resolved.
    pub panoramas: PathBuf,
}

impl Default for DirectoriesConfig {
    fn default() -> Self {
        Self {
            panoramas: PathBuf::from("panoramas"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MirrorConfig {
    /// Extensions left out of mirrored trees, e.g. `["tif"]`.
    pub exclude_extensions: Vec<String>,
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of panoramas built in parallel.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(PanoConfig::default())?)
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

/// The default config location, `~/.simple-pano.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(DEFAULT_CONFIG_NAME))
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge overlays onto a base value in order, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlays: Vec<toml::Value>,
) -> Result<PanoConfig, ConfigError> {
    let merged = overlays.into_iter().fold(base, merge_toml);
    let config: PanoConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load the home config, then `explicit` on top of it.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// and validates the result.
pub fn load_config(explicit: Option<&Path>) -> Result<PanoConfig, ConfigError> {
    let mut overlays = Vec::new();
    if let Some(path) = default_config_path()
        && let Some(home) = load_raw_config(&path)?
    {
        overlays.push(home);
    }
    if let Some(path) = explicit {
        overlays.push(
            load_raw_config(path)?.ok_or_else(|| ConfigError::NotFound(path.to_path_buf()))?,
        );
    }
    resolve_config(stock_defaults_value()?, overlays)
}

/// Returns a fully-commented stock `.simple-pano.toml` with all keys and
/// explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Simple Pano Configuration
# =========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Read from ~/.simple-pano.toml; a file given with --config is layered on top.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# krpano tools
# ---------------------------------------------------------------------------
[krpano]
# Path of the krpano tools binary (krpanotools).
tools = "krpanotools"

# Tiling template passed to makepano as -config=. Either an existing path,
# or a name looked up in the templates/ directory next to the tools binary.
template = "vtour-multires.config"

# Every makepano/protect run is killed after this many seconds.
timeout_secs = 1800

# ---------------------------------------------------------------------------
# Directories
# ---------------------------------------------------------------------------
[directories]
# Image references in descriptors (input, preview, twittercard) are tried
# as literal paths first, then relative to this directory.
panoramas = "panoramas"

# ---------------------------------------------------------------------------
# Staleness
# ---------------------------------------------------------------------------
# Which file timestamp decides whether a derived file is out of date:
#   "modified"        last content modification (mtime)
#   "status-changed"  last inode change (ctime); also catches sources copied
#                     in with an old preserved mtime
[staleness]
scene_document = "status-changed"
preview = "status-changed"
twitter_card = "status-changed"
# Mirrored copies keep the source mtime, so compare mtimes here.
mirror = "modified"

# ---------------------------------------------------------------------------
# Directory mirroring
# ---------------------------------------------------------------------------
[mirror]
# File extensions left out of mirrored trees, e.g. ["tif"] to keep
# master images out of backups.
exclude_extensions = []

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum panoramas built in parallel.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4
"##
}
