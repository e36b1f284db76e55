//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub stats: StatsConfig,

    #[serde(default)]
    pub tree: TreeConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which estimator recalculates index statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatsMethod {
    /// Level descent plus leaf dives below distinct-value boundaries
    Persistent,
    /// Random root-to-leaf dives, cheaper and coarser
    Transient,
}

impl std::str::FromStr for StatsMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "persistent" => Ok(StatsMethod::Persistent),
            "transient" => Ok(StatsMethod::Transient),
            other => Err(ConfigError::Invalid(format!("unknown stats method: {}", other))),
        }
    }
}

impl std::fmt::Display for StatsMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatsMethod::Persistent => write!(f, "persistent"),
            StatsMethod::Transient => write!(f, "transient"),
        }
    }
}

/// Statistics estimation configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StatsConfig {
    #[serde(default = "default_method")]
    pub method: StatsMethod,

    /// Leaf pages sampled per key prefix by the persistent estimator
    #[serde(default = "default_sample_pages")]
    pub sample_pages: u64,

    /// Leaf pages sampled by the transient estimator
    #[serde(default = "default_transient_sample_pages")]
    pub transient_sample_pages: u64,

    /// A level is good enough once it holds this many times `sample_pages` distinct keys
    #[serde(default = "default_diff_required_multiplier")]
    pub diff_required_multiplier: u64,

    /// Count delete-marked leaf records as if they were live
    #[serde(default)]
    pub include_delete_marked: bool,

    /// Recalculate automatically once enough rows changed
    #[serde(default = "default_auto_recalc")]
    pub auto_recalc: bool,

    #[serde(default = "default_recalc_interval")]
    pub recalc_interval_ms: u64,

    /// Fixed seed for sample selection; random when unset
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_method() -> StatsMethod {
    StatsMethod::Persistent
}

fn default_sample_pages() -> u64 {
    20
}

fn default_transient_sample_pages() -> u64 {
    8
}

fn default_diff_required_multiplier() -> u64 {
    10
}

fn default_auto_recalc() -> bool {
    true
}

fn default_recalc_interval() -> u64 {
    1000
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            method: default_method(),
            sample_pages: default_sample_pages(),
            transient_sample_pages: default_transient_sample_pages(),
            diff_required_multiplier: default_diff_required_multiplier(),
            include_delete_marked: false,
            auto_recalc: default_auto_recalc(),
            recalc_interval_ms: default_recalc_interval(),
            seed: None,
        }
    }
}

impl StatsConfig {
    /// Distinct keys a level must hold before the descent stops there
    pub fn diff_required(&self) -> u64 {
        self.sample_pages.saturating_mul(self.diff_required_multiplier)
    }
}

/// Page layout of in-memory trees
#[derive(Debug, Clone, Deserialize)]
pub struct TreeConfig {
    /// Records per page before it splits
    #[serde(default = "default_page_capacity")]
    pub page_capacity: usize,

    /// Bytes per page, used to size overflow storage
    #[serde(default = "default_page_size")]
    pub page_size: u64,

    /// Fraction of each page filled by bulk loads
    #[serde(default = "default_fill_factor")]
    pub fill_factor: f64,
}

fn default_page_capacity() -> usize {
    64
}

fn default_page_size() -> u64 {
    16 * 1024 // 16 KB
}

fn default_fill_factor() -> f64 {
    0.9
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            page_capacity: default_page_capacity(),
            page_size: default_page_size(),
            fill_factor: default_fill_factor(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("keystats").join("config.toml")),
            Some(PathBuf::from("./keystats.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Reject settings the estimator cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stats.sample_pages == 0 {
            return Err(ConfigError::Invalid("stats.sample_pages must be > 0".into()));
        }
        if self.stats.transient_sample_pages == 0 {
            return Err(ConfigError::Invalid(
                "stats.transient_sample_pages must be > 0".into(),
            ));
        }
        if self.stats.diff_required_multiplier == 0 {
            return Err(ConfigError::Invalid(
                "stats.diff_required_multiplier must be > 0".into(),
            ));
        }
        if self.tree.page_capacity < 3 {
            return Err(ConfigError::Invalid("tree.page_capacity must be >= 3".into()));
        }
        if !(self.tree.fill_factor > 0.0 && self.tree.fill_factor <= 1.0) {
            return Err(ConfigError::Invalid(
                "tree.fill_factor must be in (0, 1]".into(),
            ));
        }
        Ok(())
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        if let Ok(pages) = std::env::var("KEYSTATS_SAMPLE_PAGES") {
            if let Ok(p) = pages.parse() {
                self.stats.sample_pages = p;
            }
        }
        if let Ok(pages) = std::env::var("KEYSTATS_TRANSIENT_SAMPLE_PAGES") {
            if let Ok(p) = pages.parse() {
                self.stats.transient_sample_pages = p;
            }
        }
        if let Ok(method) = std::env::var("KEYSTATS_STATS_METHOD") {
            match method.parse() {
                Ok(m) => self.stats.method = m,
                Err(e) => tracing::warn!("Ignoring KEYSTATS_STATS_METHOD: {}", e),
            }
        }
        if let Ok(flag) = std::env::var("KEYSTATS_INCLUDE_DELETE_MARKED") {
            if let Ok(b) = flag.parse() {
                self.stats.include_delete_marked = b;
            }
        }

        if let Ok(level) = std::env::var("KEYSTATS_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("KEYSTATS_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Keystats Configuration
#
# Environment variables override these settings:
# - KEYSTATS_SAMPLE_PAGES
# - KEYSTATS_TRANSIENT_SAMPLE_PAGES
# - KEYSTATS_STATS_METHOD
# - KEYSTATS_INCLUDE_DELETE_MARKED
# - KEYSTATS_LOG_LEVEL
# - KEYSTATS_LOG_FORMAT

[stats]
# Estimator: persistent (level descent + leaf dives) or transient (random dives)
method = "persistent"

# Leaf pages sampled per key prefix (persistent)
sample_pages = 20

# Leaf pages sampled per index (transient)
transient_sample_pages = 8

# A tree level is used for sampling once it holds
# diff_required_multiplier * sample_pages distinct keys
diff_required_multiplier = 10

# Count delete-marked records that purge has not removed yet
include_delete_marked = false

# Recalculate in the background once enough rows changed
auto_recalc = true
recalc_interval_ms = 1000

# Fixed seed for reproducible sampling
# seed = 42

[tree]
# Records per page before a split
page_capacity = 64

# Page size in bytes; overflow field lengths are divided by this
page_size = 16384

# Fraction of each page filled by bulk loads
fill_factor = 0.9

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.stats.method, StatsMethod::Persistent);
        assert_eq!(config.stats.sample_pages, 20);
        assert_eq!(config.stats.diff_required(), 200);
        assert!(!config.stats.include_delete_marked);
        assert_eq!(config.tree.page_size, 16384);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_generated_config_parses() {
        let config: Config = toml::from_str(&generate_default_config()).unwrap();
        assert_eq!(config.stats.transient_sample_pages, 8);
        assert_eq!(config.tree.page_capacity, 64);
        assert_eq!(config.logging.format, "pretty");
        assert!(config.stats.seed.is_none());
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[stats]\nmethod = \"transient\"\nseed = 7\n").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.stats.method, StatsMethod::Transient);
        assert_eq!(config.stats.seed, Some(7));
        // Untouched sections keep their defaults
        assert_eq!(config.stats.sample_pages, 20);
        assert_eq!(config.tree.page_capacity, 64);
    }

    #[test]
    fn test_load_rejects_invalid() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[stats]\nsample_pages = 0\n").unwrap();

        let err = Config::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[tree]\nfill_factor = 1.5\n").unwrap();
        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn test_load_missing_and_malformed() {
        let err = Config::load(Path::new("/nonexistent/keystats.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[stats\nmethod = ").unwrap();
        let err = Config::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_method_from_str() {
        assert_eq!("Transient".parse::<StatsMethod>().unwrap(), StatsMethod::Transient);
        assert!("sampled".parse::<StatsMethod>().is_err());
        assert_eq!(StatsMethod::Persistent.to_string(), "persistent");
    }
}
