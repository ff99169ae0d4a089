use anyhow::{Context, Result};
use confyg::{env, Confygery};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::fingerprint::FingerprintConfig;
use crate::pool::PoolConfig;

/// Configuration for sonance.
///
/// Configuration is loaded from multiple sources with the following priority:
/// 1. CLI arguments (highest priority)
/// 2. Environment variables (SONANCE_* prefix)
/// 3. Config file (~/.config/sonance/config.toml)
/// 4. Built-in defaults (lowest priority)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the SQLite fingerprint store.
    ///
    /// Can be set via:
    /// - CLI: --db /path/to/db
    /// - ENV: SONANCE_DATABASE_PATH
    /// - Config: database_path = "/path/to/db"
    /// - Default: ~/.local/share/sonance/sonance.db
    #[serde(default = "default_db_path")]
    pub database_path: PathBuf,

    /// Minimum number of matching hash tables for a stored sub-fingerprint
    /// to count as a candidate.
    #[serde(default = "default_threshold_votes")]
    pub threshold_votes: u32,

    /// Spectral analysis and hashing parameters. Changing these invalidates
    /// every stored fingerprint.
    #[serde(default)]
    pub fingerprint: FingerprintConfig,

    /// Limits on concurrently used fingerprinters.
    #[serde(default)]
    pub pool: PoolConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_db_path(),
            threshold_votes: default_threshold_votes(),
            fingerprint: FingerprintConfig::default(),
            pool: PoolConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment variables.
    ///
    /// Searches for config file at: ~/.config/sonance/config.toml
    /// Reads environment variables with SONANCE_ prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed, or
    /// if the fingerprint or pool settings are invalid.
    pub fn load() -> Result<Self> {
        let config_path = config_file_path();

        let mut builder = Confygery::new().context("Failed to create config builder")?;

        if config_path.exists() {
            let path_str = config_path
                .to_str()
                .ok_or_else(|| anyhow::anyhow!("Config path contains invalid UTF-8"))?;
            builder
                .add_file(path_str)
                .context("Failed to load config file")?;
        }

        let env_opts = env::Options::with_top_level("sonance");
        builder
            .add_env(env_opts)
            .context("Failed to load environment variables")?;

        let config: Self = builder.build().context("Failed to build configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with custom database path.
    ///
    /// This is used when the --db CLI flag is provided.
    pub fn load_with_db_path(db_path: PathBuf) -> Result<Self> {
        let mut config = Self::load()?;
        config.database_path = db_path;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.fingerprint
            .validate()
            .context("Invalid [fingerprint] settings")?;
        self.pool.validate().context("Invalid [pool] settings")?;
        if self.threshold_votes == 0 {
            anyhow::bail!("threshold_votes must be at least 1");
        }
        let tables = self.fingerprint.hashing.tables;
        if self.threshold_votes as usize > tables {
            anyhow::bail!(
                "threshold_votes ({}) exceeds the number of hash tables ({})",
                self.threshold_votes,
                tables
            );
        }
        Ok(())
    }
}

const fn default_threshold_votes() -> u32 {
    5
}

/// Returns: ~/.local/share/sonance/sonance.db (or platform equivalent)
fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sonance")
        .join("sonance.db")
}

/// Get the config file path.
///
/// Returns:
/// - Linux: ~/.config/sonance/config.toml
/// - macOS: ~/Library/Application Support/sonance/config.toml
/// - Windows: %APPDATA%\sonance\config.toml
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sonance")
        .join("config.toml")
}

/// Get the example config file content.
pub fn example_config() -> &'static str {
    r#"# Sonance Configuration File
#
# Configuration is loaded from multiple sources with the following priority:
# 1. CLI arguments (highest priority)
# 2. Environment variables (SONANCE_* prefix)
# 3. This config file
# 4. Built-in defaults (lowest priority)

# Path to the SQLite fingerprint store
#
# Can also be set via:
# - CLI: sonance --db /custom/path.db ingest /music
# - Environment: SONANCE_DATABASE_PATH=/custom/path.db
#
# Default: Platform-specific data directory
#database_path = "/path/to/custom/sonance.db"

# Hash tables a stored sub-fingerprint must share with a query fingerprint
# before it counts as a match (1 to hashing.tables)
#threshold_votes = 5

# Spectral analysis and hashing.
#
# Ingest and query must agree on every value here; changing any of them
# requires re-ingesting the whole store.
[fingerprint]
#sample_rate = 5512
#frame_size = 2048
#hop_size = 64
#window = "hann"
#min_frequency = 318.0
#max_frequency = 2000.0
#bands = 32
#image_frames = 128
#top_wavelets = 200

# Distance between fingerprint starts: a fixed number of samples, or a
# seeded random draw between min and max samples
#stride = { kind = "static", samples = 512 }
#stride = { kind = "random", min = 256, max = 768, seed = 7 }

# Distance between query images. Denser than stride, so a clip matches
# wherever it starts inside a stored track
#query_stride = { kind = "static", samples = 64 }

[fingerprint.hashing]
#tables = 25
#keys_per_table = 4
#seed = 42

# Fingerprinters shared by concurrent ingest tasks
[pool]
#min_size = 1
#max_size = 8
#max_waiting = 256
"#
}

/// Create default config file if it doesn't exist.
///
/// Returns true if a new file was created, false if it already existed.
pub fn ensure_config_file() -> Result<bool> {
    let config_path = config_file_path();

    if config_path.exists() {
        return Ok(false);
    }

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create config directory")?;
    }

    std::fs::write(&config_path, example_config()).context("Failed to write config file")?;

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(!config.database_path.as_os_str().is_empty());
        assert_eq!(config.threshold_votes, 5);
        config.validate().unwrap();
    }

    #[test]
    fn test_config_load() {
        // Should not fail even if config file doesn't exist
        let result = Config::load();
        assert!(result.is_ok());
    }

    #[test]
    fn test_config_with_custom_db_path() {
        let custom_path = PathBuf::from("/tmp/test.db");
        let config = Config::load_with_db_path(custom_path.clone());
        assert!(config.is_ok());
        assert_eq!(config.unwrap().database_path, custom_path);
    }

    #[test]
    fn test_example_config_parses() {
        let config: Config = toml::from_str(example_config()).unwrap();
        assert_eq!(config.fingerprint, FingerprintConfig::default());
        assert_eq!(config.threshold_votes, 5);
    }

    #[test]
    fn test_threshold_above_table_count_rejected() {
        let config = Config {
            threshold_votes: 26,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
