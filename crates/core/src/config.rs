//! Application configuration.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{ensure, Context, Result};
use chrono::Duration;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::ads::DEFAULT_TTL_HOURS;

/// Directory under the user's config dir holding `config.toml`.
pub const CONFIG_DIR: &str = "adshell";
/// Configuration file name.
pub const CONFIG_FILE: &str = "config.toml";
/// Prefix for environment overrides, e.g. `ADSHELL_ADS_ENABLED=false`.
pub const ENV_PREFIX: &str = "ADSHELL";
/// Longest accepted `ttl_hours`, thirty days.
pub const MAX_TTL_HOURS: i64 = 24 * 30;

const DEFAULT_CONFIG: &str = r#"# adshell configuration

# Master switch for every ad surface.
ads_enabled = true

# Ad units used by the app open cache and the native batch preloader.
app_open_unit_id = "ca-app-pub-3940256099942544/9257395921"
native_unit_id = "ca-app-pub-3940256099942544/2247696110"

# Native ads requested per batch and views preallocated per unit.
native_batch_size = 3
view_pool_size = 2

# Hours before a cached app open ad is considered stale.
ttl_hours = 4
"#;

/// Settings consumed by the ad core and the shell binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Initial value of the "ads enabled" preference.
    pub ads_enabled: bool,
    /// Ad unit for app open ads.
    pub app_open_unit_id: String,
    /// Ad unit for native ads.
    pub native_unit_id: String,
    /// Native ads requested per batch.
    pub native_batch_size: usize,
    /// Views preallocated per native ad unit.
    pub view_pool_size: usize,
    /// Lifetime of a cached app open ad, in hours.
    pub ttl_hours: i64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ads_enabled: true,
            app_open_unit_id: "ca-app-pub-3940256099942544/9257395921".to_string(),
            native_unit_id: "ca-app-pub-3940256099942544/2247696110".to_string(),
            native_batch_size: 3,
            view_pool_size: 2,
            ttl_hours: DEFAULT_TTL_HOURS,
        }
    }
}

impl AppConfig {
    /// Default location of the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(CONFIG_DIR)
            .join(CONFIG_FILE)
    }

    /// Load from the default location layered with environment overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(Self::config_path())
    }

    /// Load from `path` (optional) layered with environment overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let settings = Config::builder()
            .add_source(
                File::from(path.to_path_buf())
                    .format(FileFormat::Toml)
                    .required(false),
            )
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .with_context(|| format!("failed to read config {}", path.display()))?;

        let config: AppConfig = settings
            .try_deserialize()
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Cache lifetime as a duration, clamped to `1..=MAX_TTL_HOURS` hours.
    pub fn ttl(&self) -> Duration {
        Duration::hours(self.ttl_hours.clamp(1, MAX_TTL_HOURS))
    }

    fn validate(&self) -> Result<()> {
        ensure!(self.ttl_hours > 0, "ttl_hours must be positive, got {}", self.ttl_hours);
        ensure!(
            self.ttl_hours <= MAX_TTL_HOURS,
            "ttl_hours must be at most {MAX_TTL_HOURS}, got {}",
            self.ttl_hours
        );
        ensure!(
            !self.app_open_unit_id.trim().is_empty(),
            "app_open_unit_id must not be empty"
        );
        ensure!(
            !self.native_unit_id.trim().is_empty(),
            "native_unit_id must not be empty"
        );
        Ok(())
    }
}

/// Write the default configuration file if none exists yet.
pub fn ensure_default_config() -> Result<PathBuf> {
    ensure_default_config_at(AppConfig::config_path())
}

/// Write the default configuration to `path` unless it already exists.
pub fn ensure_default_config_at(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    if path.exists() {
        return Ok(path.to_path_buf());
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create config directory {}", parent.display()))?;
    }
    fs::write(path, DEFAULT_CONFIG)
        .with_context(|| format!("failed to write default config {}", path.display()))?;
    Ok(path.to_path_buf())
}
