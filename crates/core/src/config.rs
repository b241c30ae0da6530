//! Configuration
//!
//! Precedence, highest first: command flags > `KUBECTL_SMART_*` environment
//! variables > user config file (`~/.config/kubectl-smart/config.toml`) >
//! built-in defaults. Flags are applied by the CLI after [`Config::load`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, SmartError};

pub const DEFAULT_MAX_CONCURRENT_COLLECTORS: usize = 5;
pub const DEFAULT_COLLECTOR_TIMEOUT_SECS: f64 = 1.0;
pub const DEFAULT_RUN_TIMEOUT_SECS: f64 = 3.0;
pub const DEFAULT_MAX_DISPLAY_ISSUES: usize = 10;
pub const DEFAULT_HORIZON_HOURS: u32 = 48;
pub const MAX_HORIZON_HOURS: u32 = 168;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn parse(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(SmartError::Input(format!(
                "invalid output format '{other}' (expected text or json)"
            ))),
        }
    }
}

/// Effective configuration for one invocation.
#[derive(Debug, Clone)]
pub struct Config {
    pub max_concurrent_collectors: usize,
    pub collector_timeout: Duration,
    pub run_timeout: Duration,
    pub colors_enabled: Option<bool>,
    pub max_display_issues: usize,
    pub default_format: OutputFormat,
    pub weights_file: Option<PathBuf>,
    pub log_correlation: bool,
    pub default_horizon_hours: u32,
    pub cache_dir: Option<PathBuf>,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent_collectors: DEFAULT_MAX_CONCURRENT_COLLECTORS,
            collector_timeout: Duration::from_secs_f64(DEFAULT_COLLECTOR_TIMEOUT_SECS),
            run_timeout: Duration::from_secs_f64(DEFAULT_RUN_TIMEOUT_SECS),
            colors_enabled: None,
            max_display_issues: DEFAULT_MAX_DISPLAY_ISSUES,
            default_format: OutputFormat::Text,
            weights_file: None,
            log_correlation: false,
            default_horizon_hours: DEFAULT_HORIZON_HOURS,
            cache_dir: None,
            log_level: "info".to_string(),
        }
    }
}

/// Raw shape of the TOML config file; every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    #[serde(default)]
    performance: PerformanceSection,
    #[serde(default)]
    output: OutputSection,
    #[serde(default)]
    scoring: ScoringSection,
    #[serde(default)]
    forecast: ForecastSection,
    #[serde(default)]
    logging: LoggingSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PerformanceSection {
    max_concurrent_collectors: Option<usize>,
    collector_timeout_seconds: Option<f64>,
    run_timeout_seconds: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct OutputSection {
    colors_enabled: Option<bool>,
    max_display_issues: Option<usize>,
    default_format: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScoringSection {
    weights_file: Option<PathBuf>,
    log_correlation: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ForecastSection {
    default_horizon_hours: Option<u32>,
    cache_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct LoggingSection {
    level: Option<String>,
}

impl Config {
    /// Load defaults, then the user config file, then the environment.
    pub fn load() -> Result<Self> {
        let mut config = Self::default();
        if let Some(path) = Self::user_config_path() {
            if path.exists() {
                config.merge_file(&path)?;
            }
        }
        config.merge_env();
        config.clamp();
        Ok(config)
    }

    /// Load from an explicit file path plus the environment.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = Self::default();
        config.merge_file(path)?;
        config.merge_env();
        config.clamp();
        Ok(config)
    }

    fn user_config_path() -> Option<PathBuf> {
        dirs_next::home_dir().map(|home| home.join(".config").join("kubectl-smart").join("config.toml"))
    }

    fn merge_file(&mut self, path: &Path) -> Result<()> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SmartError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        let file: FileConfig = toml::from_str(&content).map_err(|e| {
            SmartError::Config(format!("failed to parse {}: {e}", path.display()))
        })?;

        if let Some(v) = file.performance.max_concurrent_collectors {
            self.max_concurrent_collectors = v;
        }
        if let Some(v) = file.performance.collector_timeout_seconds {
            self.collector_timeout = Duration::from_secs_f64(v);
        }
        if let Some(v) = file.performance.run_timeout_seconds {
            self.run_timeout = Duration::from_secs_f64(v);
        }
        if let Some(v) = file.output.colors_enabled {
            self.colors_enabled = Some(v);
        }
        if let Some(v) = file.output.max_display_issues {
            self.max_display_issues = v;
        }
        if let Some(v) = file.output.default_format {
            self.default_format = OutputFormat::parse(&v)
                .map_err(|_| SmartError::Config(format!("invalid output.default_format '{v}'")))?;
        }
        if let Some(v) = file.scoring.weights_file {
            self.weights_file = Some(v);
        }
        if let Some(v) = file.scoring.log_correlation {
            self.log_correlation = v;
        }
        if let Some(v) = file.forecast.default_horizon_hours {
            self.default_horizon_hours = v;
        }
        if let Some(v) = file.forecast.cache_dir {
            self.cache_dir = Some(v);
        }
        if let Some(v) = file.logging.level {
            self.log_level = v;
        }
        Ok(())
    }

    fn merge_env(&mut self) {
        if let Some(v) = env_parse::<usize>("KUBECTL_SMART_MAX_CONCURRENT_COLLECTORS") {
            self.max_concurrent_collectors = v;
        }
        if let Some(v) = env_parse::<f64>("KUBECTL_SMART_COLLECTOR_TIMEOUT_SECONDS") {
            self.collector_timeout = Duration::from_secs_f64(v);
        }
        if let Some(v) = env_parse::<f64>("KUBECTL_SMART_RUN_TIMEOUT_SECONDS") {
            self.run_timeout = Duration::from_secs_f64(v);
        }
        if let Ok(v) = std::env::var("KUBECTL_SMART_COLORS") {
            self.colors_enabled = Some(matches!(v.to_ascii_lowercase().as_str(), "1" | "true"));
        }
        if let Some(v) = env_parse::<usize>("KUBECTL_SMART_MAX_DISPLAY_ISSUES") {
            self.max_display_issues = v;
        }
        if let Ok(v) = std::env::var("KUBECTL_SMART_DEFAULT_FORMAT") {
            if let Ok(format) = OutputFormat::parse(&v) {
                self.default_format = format;
            }
        }
        if let Ok(v) = std::env::var("KUBECTL_SMART_WEIGHTS_FILE") {
            self.weights_file = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("KUBECTL_SMART_LOG_CORRELATION") {
            self.log_correlation = matches!(v.to_ascii_lowercase().as_str(), "1" | "true");
        }
        if let Some(v) = env_parse::<u32>("KUBECTL_SMART_HORIZON_HOURS") {
            self.default_horizon_hours = v;
        }
        if let Ok(v) = std::env::var("KUBECTL_SMART_CACHE_DIR") {
            self.cache_dir = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("KUBECTL_SMART_LOG_LEVEL") {
            self.log_level = v;
        }
    }

    fn clamp(&mut self) {
        self.default_horizon_hours = self.default_horizon_hours.clamp(1, MAX_HORIZON_HOURS);
        self.max_concurrent_collectors = self.max_concurrent_collectors.max(1);
    }

    /// Directory for the forecast sample cache, honoring the override.
    pub fn effective_cache_dir(&self) -> Option<PathBuf> {
        if let Some(dir) = &self.cache_dir {
            return Some(dir.clone());
        }
        dirs_next::home_dir().map(|home| home.join(".kubectl-smart").join("cache"))
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.max_concurrent_collectors, 5);
        assert_eq!(config.collector_timeout, Duration::from_secs(1));
        assert_eq!(config.run_timeout, Duration::from_secs(3));
        assert_eq!(config.max_display_issues, 10);
        assert_eq!(config.default_horizon_hours, 48);
        assert!(!config.log_correlation);
    }

    #[test]
    fn file_values_override_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[performance]\nmax_concurrent_collectors = 8\ncollector_timeout_seconds = 0.5\n\n\
             [forecast]\ndefault_horizon_hours = 24\n\n[output]\nmax_display_issues = 3"
        )
        .unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.max_concurrent_collectors, 8);
        assert_eq!(config.collector_timeout, Duration::from_millis(500));
        assert_eq!(config.default_horizon_hours, 24);
        assert_eq!(config.max_display_issues, 3);
    }

    #[test]
    fn horizon_is_clamped_to_bounds() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[forecast]\ndefault_horizon_hours = 500").unwrap();
        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.default_horizon_hours, MAX_HORIZON_HOURS);
    }

    #[test]
    fn unknown_keys_are_config_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[performance]\nmax_workers = 3").unwrap();
        assert!(matches!(
            Config::load_from(file.path()),
            Err(SmartError::Config(_))
        ));
    }
}
