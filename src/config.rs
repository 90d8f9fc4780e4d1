use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::orchestration::{ExecOptions, MergeOrder, PoolKind, DEFAULT_POOL_SIZE, MAX_POOL_SIZE};
use crate::{tglog_debug, Error, Result};

/// Largest accepted per-task delay, in seconds.
pub const MAX_DELAY: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Run independent tasks concurrently.
    pub parallel: bool,
    pub pool_size: usize,
    /// Seconds each demo task sleeps.
    pub delay: u64,
    pub substrate: PoolKind,
    pub merge_order: MergeOrder,
    /// Write logs here instead of stderr.
    pub log_file: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            parallel: false,
            pool_size: DEFAULT_POOL_SIZE,
            delay: 0,
            substrate: PoolKind::default(),
            merge_order: MergeOrder::default(),
            log_file: None,
        }
    }
}

impl Config {
    pub fn taskgraph_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir()
            .ok_or(Error::NoHomeDir)?
            .join(".taskgraph"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::taskgraph_dir()?.join("taskgraph.toml"))
    }

    /// Load from the default location, falling back to defaults.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        tglog_debug!("Config::load_from path={}", path.display());
        if !path.exists() {
            tglog_debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        config.validate()?;
        tglog_debug!(
            "Config loaded: parallel={}, pool_size={}, delay={}, substrate={}",
            config.parallel,
            config.pool_size,
            config.delay,
            config.substrate
        );
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Write the config, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                tglog_debug!("Creating config directory: {}", parent.display());
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        tglog_debug!("Config saved to {}", path.display());
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.pool_size == 0 || self.pool_size > MAX_POOL_SIZE {
            return Err(Error::Validation(format!(
                "pool_size must be between 1 and {}, got {}",
                MAX_POOL_SIZE, self.pool_size
            )));
        }
        if self.delay > MAX_DELAY {
            return Err(Error::Validation(format!(
                "delay must be between 0 and {}, got {}",
                MAX_DELAY, self.delay
            )));
        }
        Ok(())
    }

    pub fn log_path(&self) -> Option<PathBuf> {
        self.log_file.as_deref().map(expand_tilde)
    }
}

impl From<&Config> for ExecOptions {
    fn from(config: &Config) -> Self {
        Self {
            pool_size: config.pool_size,
            substrate: config.substrate,
            merge_order: config.merge_order,
        }
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
