//! Config loading, environment overrides, and validation.

use super::model::Config;
use super::types::{ENV_EVENTS_PATH, ENV_LISTEN_ADDR};
use crate::error::{Result, TaskLockError};
use std::net::SocketAddr;
use std::path::Path;

impl Config {
    /// Load config from a YAML file without validating it.
    ///
    /// Values may still be overridden by the environment or flags, so
    /// validation is left to [`Config::resolve`].
    ///
    /// # Returns
    ///
    /// * `Ok(Config)` - Successfully read and parsed config
    /// * `Err(TaskLockError::ConfigError)` - Read error or parse error
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            TaskLockError::ConfigError(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::parse_yaml(&content)
    }

    /// Parse and validate config from a YAML string.
    ///
    /// Unknown fields in the YAML are silently ignored for forward compatibility.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config = Self::parse_yaml(yaml)?;
        config.validate()?;
        Ok(config)
    }

    fn parse_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| {
            TaskLockError::ConfigError(format!("failed to parse config YAML: {}", e))
        })
    }

    /// Serialize config to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| {
            TaskLockError::ConfigError(format!("failed to serialize config to YAML: {}", e))
        })
    }

    /// Resolve the effective config: file (or defaults), then environment,
    /// then an explicit listen address, then validation.
    pub fn resolve(path: Option<&Path>, listen_override: Option<&str>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };

        config.apply_env_overrides();
        if let Some(addr) = listen_override {
            config.listen_addr = addr.to_string();
        }

        config.validate()?;
        Ok(config)
    }

    /// Apply `TASKLOCK_*` environment overrides. Blank values are ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Some(addr) = env_value(ENV_LISTEN_ADDR) {
            self.listen_addr = addr;
        }
        if let Some(path) = env_value(ENV_EVENTS_PATH) {
            self.events_path = Some(path);
        }
    }

    /// Validate config values and return error on invalid values.
    ///
    /// Validation rules:
    /// - `listen_addr` must be a socket address with a non-zero port
    /// - `max_frame_bytes` and `outbox_capacity` must be positive
    /// - `lock_token_header` must be a non-empty lowercase header name
    pub fn validate(&self) -> Result<()> {
        let addr = self.socket_addr()?;
        if addr.port() == 0 {
            return Err(TaskLockError::ConfigError(
                "config validation failed: listen_addr port must be greater than 0".to_string(),
            ));
        }

        if self.max_frame_bytes == 0 {
            return Err(TaskLockError::ConfigError(
                "config validation failed: max_frame_bytes must be greater than 0".to_string(),
            ));
        }

        if self.outbox_capacity == 0 {
            return Err(TaskLockError::ConfigError(
                "config validation failed: outbox_capacity must be greater than 0".to_string(),
            ));
        }

        let header = &self.lock_token_header;
        if header.is_empty() {
            return Err(TaskLockError::ConfigError(
                "config validation failed: lock_token_header must be non-empty".to_string(),
            ));
        }
        let valid_header = header
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-');
        if !valid_header {
            return Err(TaskLockError::ConfigError(format!(
                "config validation failed: lock_token_header must use lowercase letters, \
                 digits, and '-' (found '{}'). Use '{}' instead.",
                header,
                header.to_ascii_lowercase()
            )));
        }

        Ok(())
    }

    /// Parse `listen_addr`.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.listen_addr.parse().map_err(|e| {
            TaskLockError::ConfigError(format!(
                "config validation failed: listen_addr '{}' is not a socket address: {}",
                self.listen_addr, e
            ))
        })
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
