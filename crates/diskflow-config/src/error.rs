use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config directory not found")]
    ConfigDirNotFound,

    #[error(
        "Config file not found: {0}\n\
        Searched:\n\
        - --config / DISKFLOW_CONFIG_PATH\n\
        - current directory: diskflow.yaml, .diskflow.yaml\n\
        - ~/.config/diskflow/config.yaml"
    )]
    ConfigFileNotFound(PathBuf),

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
