//! Configuration management for agentdesk.
//!
//! Configuration can be set via environment variables:
//! - `OPENAI_API_KEY` - Required. API key for the instruction interpreter.
//! - `INTERPRETER_MODEL` - Optional. Chat model used to decompose instructions. Defaults to `gpt-4o`.
//! - `HOST` - Optional. Server host. Defaults to `127.0.0.1`.
//! - `PORT` - Optional. Server port. Defaults to `3000`.
//! - `STORE` - Optional. Storage backend (`memory` or `sqlite`). Defaults to `sqlite`.
//! - `DATA_DIR` - Optional. Directory for the sqlite database. Defaults to `./data`.
//! - `MOCK_SUCCESS_RATE` - Optional. Probability that a simulated external call succeeds. Defaults to `0.9`.
//! - `MOCK_MIN_DELAY_MS` - Optional. Lower bound of the simulated processing window. Defaults to `2000`.
//! - `MOCK_MAX_DELAY_MS` - Optional. Upper bound of the simulated processing window. Defaults to `5000`.

use std::path::PathBuf;
use thiserror::Error;

use crate::store::StoreType;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Shape of the simulated external services.
///
/// The mock telephony/calendar/email/chat capabilities sleep for a random
/// duration inside `[min_delay_ms, max_delay_ms]` and succeed with
/// probability `success_rate`.
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Probability in [0.0, 1.0] that a simulated call succeeds
    pub success_rate: f64,

    /// Lower bound of the simulated processing time, in milliseconds
    pub min_delay_ms: u64,

    /// Upper bound of the simulated processing time, in milliseconds
    pub max_delay_ms: u64,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            success_rate: 0.9,
            min_delay_ms: 2000,
            max_delay_ms: 5000,
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// API key for the interpreter LLM
    pub api_key: String,

    /// Chat model used to decompose instructions
    pub interpreter_model: String,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Storage backend selection
    pub store: StoreType,

    /// Directory for persistent data (sqlite database)
    pub data_dir: PathBuf,

    /// Simulated external service behavior
    pub mock: MockConfig,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if `OPENAI_API_KEY` is not set.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("OPENAI_API_KEY".to_string()))?;

        let interpreter_model =
            std::env::var("INTERPRETER_MODEL").unwrap_or_else(|_| "gpt-4o".to_string());

        let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|e| ConfigError::InvalidValue("PORT".to_string(), format!("{}", e)))?;

        let store = std::env::var("STORE")
            .map(|s| StoreType::from_str(&s))
            .unwrap_or_default();

        let data_dir = std::env::var("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data"));

        let success_rate = std::env::var("MOCK_SUCCESS_RATE")
            .unwrap_or_else(|_| "0.9".to_string())
            .parse::<f64>()
            .map_err(|e| {
                ConfigError::InvalidValue("MOCK_SUCCESS_RATE".to_string(), format!("{}", e))
            })?;
        if !(0.0..=1.0).contains(&success_rate) {
            return Err(ConfigError::InvalidValue(
                "MOCK_SUCCESS_RATE".to_string(),
                format!("{} is outside [0.0, 1.0]", success_rate),
            ));
        }

        let min_delay_ms = parse_env_u64("MOCK_MIN_DELAY_MS", 2000)?;
        let max_delay_ms = parse_env_u64("MOCK_MAX_DELAY_MS", 5000)?;
        if min_delay_ms > max_delay_ms {
            return Err(ConfigError::InvalidValue(
                "MOCK_MIN_DELAY_MS".to_string(),
                format!("{} exceeds MOCK_MAX_DELAY_MS ({})", min_delay_ms, max_delay_ms),
            ));
        }

        Ok(Self {
            api_key,
            interpreter_model,
            host,
            port,
            store,
            data_dir,
            mock: MockConfig {
                success_rate,
                min_delay_ms,
                max_delay_ms,
            },
        })
    }

    /// Create a config with custom values (useful for testing).
    pub fn new(api_key: String, interpreter_model: String) -> Self {
        Self {
            api_key,
            interpreter_model,
            host: "127.0.0.1".to_string(),
            port: 3000,
            store: StoreType::Memory,
            data_dir: PathBuf::from("./data"),
            mock: MockConfig::default(),
        }
    }
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), format!("{}", e))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_config_defaults() {
        let mock = MockConfig::default();
        assert_eq!(mock.success_rate, 0.9);
        assert!(mock.min_delay_ms <= mock.max_delay_ms);
    }

    #[test]
    fn test_config_new_defaults_to_memory_store() {
        let config = Config::new("key".to_string(), "gpt-4o".to_string());
        assert_eq!(config.store, StoreType::Memory);
        assert_eq!(config.port, 3000);
    }
}
