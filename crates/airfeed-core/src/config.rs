use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::rules::DatasetRules;

pub const DEFAULT_SOURCE_URL: &str = "https://davidmegginson.github.io/ourairports-data/airports.csv";
pub const DEFAULT_OUTPUT_PATH: &str = "data/airports.csv";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_INTERVAL_HOURS: f64 = 24.0;

/// Settings for the refresh process, loadable from a TOML file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    pub source_url: String,
    pub output_path: PathBuf,
    pub staging_dir: Option<PathBuf>,
    pub timeout_secs: u64,
    pub interval_hours: f64,
    pub rules: DatasetRules,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            source_url: DEFAULT_SOURCE_URL.to_string(),
            output_path: PathBuf::from(DEFAULT_OUTPUT_PATH),
            staging_dir: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            interval_hours: DEFAULT_INTERVAL_HOURS,
            rules: DatasetRules::airports(),
        }
    }
}

impl RefreshConfig {
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = reqwest::Url::parse(&self.source_url).map_err(|err| {
            ConfigError::Invalid(format!("source_url '{}' is not a URL: {err}", self.source_url))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid(format!(
                "source_url must use http or https, got '{}'",
                url.scheme()
            )));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeout_secs must be positive".into()));
        }
        if !self.interval_hours.is_finite() || self.interval_hours <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "interval_hours must be a positive number, got {}",
                self.interval_hours
            )));
        }
        if Duration::try_from_secs_f64(self.interval_hours * 3600.0).is_err() {
            return Err(ConfigError::Invalid(format!(
                "interval_hours {} is too large",
                self.interval_hours
            )));
        }
        if self.output_path.file_name().is_none() {
            return Err(ConfigError::Invalid(format!(
                "output_path '{}' does not name a file",
                self.output_path.display()
            )));
        }
        self.rules.validate().map_err(ConfigError::Invalid)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Saturates at `Duration::MAX` for values `validate` would reject.
    pub fn interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.interval_hours * 3600.0).unwrap_or(Duration::MAX)
    }

    /// Staging directory, defaulting to `.staging` next to the published file.
    pub fn staging_dir(&self) -> PathBuf {
        match &self.staging_dir {
            Some(dir) => dir.clone(),
            None => self
                .output_path
                .parent()
                .unwrap_or_else(|| Path::new(""))
                .join(".staging"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = RefreshConfig::default();
        config.validate().unwrap();
        assert_eq!(config.interval(), Duration::from_secs(24 * 3600));
        assert_eq!(config.staging_dir(), PathBuf::from("data/.staging"));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: RefreshConfig = toml::from_str(
            r#"
                output_path = "out/us.csv"
                interval_hours = 0.5

                [rules]
                excluded_fields = ["id"]
            "#,
        )
        .unwrap();

        assert_eq!(config.source_url, DEFAULT_SOURCE_URL);
        assert_eq!(config.output_path, PathBuf::from("out/us.csv"));
        assert_eq!(config.interval(), Duration::from_secs(1800));
        assert_eq!(config.rules.selection, DatasetRules::airports().selection);
        assert_eq!(config.rules.excluded_fields.excluded.len(), 1);
    }

    #[test]
    fn rejects_bad_values() {
        let mut config = RefreshConfig {
            interval_hours: 0.0,
            ..RefreshConfig::default()
        };
        assert!(config.validate().is_err());

        config.interval_hours = 1.0;
        config.source_url = "ftp://example.com/a.csv".into();
        assert!(config.validate().is_err());

        config.source_url = DEFAULT_SOURCE_URL.into();
        config.timeout_secs = 0;
        assert!(config.validate().is_err());

        config.timeout_secs = DEFAULT_TIMEOUT_SECS;
        config.interval_hours = 1e16;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        assert_eq!(config.interval(), Duration::MAX);
    }
}
