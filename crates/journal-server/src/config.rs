//! Server configuration.
//!
//! Values come from an optional TOML file and are then overridden by
//! environment variables:
//!
//! | variable                        | field                           |
//! |---------------------------------|---------------------------------|
//! | `RPC_URL`                       | `rpc_url`                       |
//! | `SERVICE_PRIVATE_KEY`           | `service_private_key`           |
//! | `PROGRAM_ID`                    | `program_id`                    |
//! | `HOST`                          | `host`                          |
//! | `PORT`                          | `port`                          |
//! | `COMMITMENT`                    | `commitment`                    |
//! | `LOG_LEVEL`                     | `log_level`                     |
//! | `INITIALIZE_COUNTER_ON_STARTUP` | `initialize_counter_on_startup` |
//! | `MAX_COMPOSE_ATTEMPTS`          | `max_compose_attempts`          |

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use journal_core::{Commitment, RpcConfig, DEFAULT_MAX_COMPOSE_ATTEMPTS, DEFAULT_PROGRAM_ID};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};
use solana_wire::{Keypair, Pubkey};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: &'static str, message: String },

    #[error("validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub rpc_url: String,
    pub program_id: Pubkey,
    pub commitment: Commitment,
    /// Base58 64-byte keypair or a `solana-keygen` JSON array.
    #[serde(deserialize_with = "deserialize_secret")]
    pub service_private_key: Option<SecretString>,
    pub log_level: String,
    pub initialize_counter_on_startup: bool,
    pub max_compose_attempts: u32,
    pub request_timeout_secs: u64,
    pub confirm_poll_interval_ms: u64,
    pub confirm_max_polls: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
            rpc_url: "http://127.0.0.1:8899".into(),
            program_id: DEFAULT_PROGRAM_ID,
            commitment: Commitment::Confirmed,
            service_private_key: None,
            log_level: "info".into(),
            initialize_counter_on_startup: true,
            max_compose_attempts: DEFAULT_MAX_COMPOSE_ATTEMPTS,
            request_timeout_secs: 30,
            confirm_poll_interval_ms: 500,
            confirm_max_polls: 60,
        }
    }
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.map(SecretString::from))
}

impl ServerConfig {
    /// Load from `path` (if any), apply process environment overrides and
    /// validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        Self::from_toml(&std::fs::read_to_string(path)?)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Override fields from `lookup`, normally the process environment.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(v) = lookup("RPC_URL") {
            self.rpc_url = v;
        }
        if let Some(v) = lookup("SERVICE_PRIVATE_KEY") {
            self.service_private_key = Some(SecretString::from(v));
        }
        if let Some(v) = lookup("PROGRAM_ID") {
            self.program_id = parse_var("PROGRAM_ID", &v)?;
        }
        if let Some(v) = lookup("HOST") {
            self.host = v;
        }
        if let Some(v) = lookup("PORT") {
            self.port = parse_var("PORT", &v)?;
        }
        if let Some(v) = lookup("COMMITMENT") {
            self.commitment = parse_var("COMMITMENT", &v)?;
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            self.log_level = v;
        }
        if let Some(v) = lookup("INITIALIZE_COUNTER_ON_STARTUP") {
            self.initialize_counter_on_startup = parse_var("INITIALIZE_COUNTER_ON_STARTUP", &v)?;
        }
        if let Some(v) = lookup("MAX_COMPOSE_ATTEMPTS") {
            self.max_compose_attempts = parse_var("MAX_COMPOSE_ATTEMPTS", &v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.rpc_url.starts_with("http://") || self.rpc_url.starts_with("https://")) {
            return Err(ConfigError::Validation(format!(
                "rpc_url must be an http(s) URL, got '{}'",
                self.rpc_url
            )));
        }
        if self.port == 0 {
            return Err(ConfigError::Validation("port must be non-zero".into()));
        }
        if self.max_compose_attempts == 0 {
            return Err(ConfigError::Validation(
                "max_compose_attempts must be at least 1".into(),
            ));
        }
        if self.confirm_max_polls == 0 {
            return Err(ConfigError::Validation(
                "confirm_max_polls must be at least 1".into(),
            ));
        }
        self.service_keypair()?;
        Ok(())
    }

    /// Decode the service identity.
    pub fn service_keypair(&self) -> Result<Keypair, ConfigError> {
        let secret = self
            .service_private_key
            .as_ref()
            .ok_or_else(|| ConfigError::Validation("service_private_key is not set".into()))?;
        Keypair::parse(secret.expose_secret()).map_err(|e| ConfigError::InvalidValue {
            key: "service_private_key",
            message: e.to_string(),
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn rpc_config(&self) -> RpcConfig {
        RpcConfig {
            url: self.rpc_url.clone(),
            commitment: self.commitment,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            confirm_poll_interval: Duration::from_millis(self.confirm_poll_interval_ms),
            confirm_max_polls: self.confirm_max_polls,
        }
    }
}

fn parse_var<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key,
        message: e.to_string(),
    })
}
