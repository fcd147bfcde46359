mod schema;

pub use schema::*;

use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Invalid value for {name}: {value}")]
    InvalidEnv { name: &'static str, value: String },
    #[error("Invalid config: {0}")]
    Invalid(String),
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    Ok(config)
}

impl Config {
    /// Apply `DB_HOST`, `DB_PORT`, `DB_USER` and `DB_PASS` from the environment
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("DB_HOST") {
            self.database.host = host;
        }
        if let Some(port) = lookup("DB_PORT") {
            self.database.port = port.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                name: "DB_PORT",
                value: port,
            })?;
        }
        if let Some(user) = lookup("DB_USER") {
            self.database.user = user;
        }
        if let Some(password) = lookup("DB_PASS") {
            self.database.password = password;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.host.trim().is_empty() {
            return Err(ConfigError::Invalid("database.host is empty".into()));
        }
        if self.check.interval_ms == 0 {
            return Err(ConfigError::Invalid("check.interval_ms must be > 0".into()));
        }
        if self.check.query_timeout_ms == 0 {
            return Err(ConfigError::Invalid("check.query_timeout_ms must be > 0".into()));
        }
        if self.check.reclaim_timeout_ms == 0 {
            return Err(ConfigError::Invalid("check.reclaim_timeout_ms must be > 0".into()));
        }
        Ok(())
    }
}
