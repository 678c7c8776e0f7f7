pub mod error;

pub use error::*;

use diskflow_cloud::{PollConfig, RetryConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable pointing directly at a config file
pub const CONFIG_PATH_ENV: &str = "DISKFLOW_CONFIG_PATH";

const LOCAL_CANDIDATES: [&str; 2] = ["diskflow.yaml", ".diskflow.yaml"];

/// Which DiskClient implementation to drive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    #[default]
    Azure,
    Simulated,
}

/// Defaults for disk parameters not given on the command line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiskDefaults {
    pub location: String,
    pub sku: String,
    pub lun: u32,
}

impl Default for DiskDefaults {
    fn default() -> Self {
        Self {
            location: "eastus".to_string(),
            sku: "Standard_LRS".to_string(),
            lun: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollSettings {
    pub interval_secs: u64,
    pub timeout_secs: u64,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval_secs: 5,
            timeout_secs: 600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub initial_delay_secs: u64,
    pub max_delay_secs: u64,
    pub multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_secs: 2,
            max_delay_secs: 30,
            multiplier: 2.0,
        }
    }
}

/// DiskFlow configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub provider: ProviderKind,

    /// Path or name of the az executable
    pub az_path: String,

    /// Seconds a single az invocation may take
    pub az_timeout_secs: u64,

    pub subscription: Option<String>,

    /// Where workflow runs are persisted
    pub state_dir: Option<PathBuf>,

    pub defaults: DiskDefaults,

    pub poll: PollSettings,

    pub retry: RetrySettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            az_path: "az".to_string(),
            az_timeout_secs: 300,
            subscription: None,
            state_dir: None,
            defaults: DiskDefaults::default(),
            poll: PollSettings::default(),
            retry: RetrySettings::default(),
        }
    }
}

impl Config {
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_yaml_str(&content)?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.poll.interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "poll.interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.poll.timeout_secs < self.poll.interval_secs {
            return Err(ConfigError::Invalid(
                "poll.timeout_secs must not be shorter than poll.interval_secs".to_string(),
            ));
        }
        if self.az_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "az_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.retry.multiplier < 1.0 {
            return Err(ConfigError::Invalid(
                "retry.multiplier must be at least 1.0".to_string(),
            ));
        }
        Ok(())
    }

    /// Configured state directory, or the platform data directory
    pub fn state_dir(&self) -> Result<PathBuf> {
        match &self.state_dir {
            Some(dir) => Ok(dir.clone()),
            None => default_state_dir(),
        }
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.retry.max_retries,
            initial_delay: Duration::from_secs(self.retry.initial_delay_secs),
            max_delay: Duration::from_secs(self.retry.max_delay_secs),
            multiplier: self.retry.multiplier,
        }
    }

    pub fn az_timeout(&self) -> Duration {
        Duration::from_secs(self.az_timeout_secs)
    }

    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            interval: Duration::from_secs(self.poll.interval_secs),
            timeout: Duration::from_secs(self.poll.timeout_secs),
        }
    }
}

/// ~/.local/share/diskflow (platform equivalent)
pub fn default_state_dir() -> Result<PathBuf> {
    Ok(dirs::data_dir()
        .ok_or(ConfigError::ConfigDirNotFound)?
        .join("diskflow"))
}

/// Find the config file
///
/// Search order:
/// 1. DISKFLOW_CONFIG_PATH environment variable (direct path)
/// 2. Current directory: diskflow.yaml, .diskflow.yaml
/// 3. ~/.config/diskflow/config.yaml (global config)
///
/// No file is not an error; built-in defaults apply.
pub fn find_config_file() -> Result<Option<PathBuf>> {
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(Some(path));
        }
        return Err(ConfigError::ConfigFileNotFound(path));
    }

    let current_dir = std::env::current_dir()?;
    for filename in &LOCAL_CANDIDATES {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(Some(path));
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join("diskflow").join("config.yaml");
        if global_config.exists() {
            return Ok(Some(global_config));
        }
    }

    Ok(None)
}

/// Load the config from `explicit`, or from the first discovered file
pub fn load(explicit: Option<&Path>) -> Result<Config> {
    if let Some(path) = explicit {
        if !path.exists() {
            return Err(ConfigError::ConfigFileNotFound(path.to_path_buf()));
        }
        return Config::from_file(path);
    }

    match find_config_file()? {
        Some(path) => Config::from_file(&path),
        None => {
            tracing::debug!("No config file found, using defaults");
            Ok(Config::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.provider, ProviderKind::Azure);
        assert_eq!(config.retry_config(), RetryConfig::default());
        assert_eq!(config.poll_config(), PollConfig::default());
        assert_eq!(config.defaults.sku, "Standard_LRS");
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = Config::from_yaml_str(
            r#"
provider: simulated
defaults:
  location: westeurope
poll:
  timeout_secs: 60
"#,
        )
        .unwrap();

        assert_eq!(config.provider, ProviderKind::Simulated);
        assert_eq!(config.defaults.location, "westeurope");
        assert_eq!(config.defaults.sku, "Standard_LRS");
        assert_eq!(config.poll.interval_secs, 5);
        assert_eq!(config.poll_config().timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_invalid_poll_settings() {
        let result = Config::from_yaml_str("poll:\n  interval_secs: 0\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
        let result = Config::from_yaml_str("az_timeout_secs: 0\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_unknown_provider_is_yaml_error() {
        let result = Config::from_yaml_str("provider: gcp\n");
        assert!(matches!(result, Err(ConfigError::Yaml(_))));
    }

    #[test]
    fn test_explicit_path_missing() {
        let temp_dir = tempfile::tempdir().unwrap();
        let missing = temp_dir.path().join("nope.yaml");
        assert!(matches!(
            load(Some(&missing)),
            Err(ConfigError::ConfigFileNotFound(_))
        ));
    }

    #[test]
    #[serial]
    fn test_find_config_file_in_current_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let original_dir = std::env::current_dir().unwrap();

        fs::write(temp_dir.path().join("diskflow.yaml"), "provider: simulated\n").unwrap();
        std::env::set_current_dir(&temp_dir).unwrap();

        let found = temp_env::with_var_unset(CONFIG_PATH_ENV, find_config_file).unwrap();
        assert!(found.unwrap().ends_with("diskflow.yaml"));

        let config = temp_env::with_var_unset(CONFIG_PATH_ENV, || load(None)).unwrap();
        assert_eq!(config.provider, ProviderKind::Simulated);

        std::env::set_current_dir(original_dir).unwrap();
    }

    #[test]
    #[serial]
    fn test_find_config_file_env_var() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("custom.yaml");
        fs::write(
            &config_path,
            "az_path: /opt/az/bin/az\naz_timeout_secs: 90\n",
        )
        .unwrap();

        let config = temp_env::with_var(CONFIG_PATH_ENV, Some(&config_path), || load(None))
            .unwrap();
        assert_eq!(config.az_path, "/opt/az/bin/az");
        assert_eq!(config.az_timeout(), Duration::from_secs(90));
    }

    #[test]
    #[serial]
    fn test_env_var_pointing_nowhere() {
        let result = temp_env::with_var(
            CONFIG_PATH_ENV,
            Some("/definitely/not/here/diskflow.yaml"),
            find_config_file,
        );
        assert!(matches!(result, Err(ConfigError::ConfigFileNotFound(_))));
    }
}
