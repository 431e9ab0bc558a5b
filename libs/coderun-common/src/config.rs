use std::env;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_ENDPOINTS: &str = "https://emkc.org/api/v2/piston,http://localhost:2000/api/v2";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("No execution endpoints configured")]
    NoEndpoints,

    #[error("{0} must be greater than zero")]
    ZeroTimeout(&'static str),
}

/// Application configuration
/// Provides defaults with environment variable overrides
#[derive(Debug, Clone)]
pub struct Config {
    /// Ordered backend base URLs, tried first to last
    pub endpoints: Vec<String>,
    pub run_timeout_ms: u64,
    pub compile_timeout_ms: u64,
    /// Wall-clock deadline for a single endpoint attempt
    pub attempt_deadline_ms: u64,
    pub language_config_path: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_vars(|key| env::var(key).ok())
    }

    pub fn from_vars<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let millis = |key: &str, default: u64| {
            lookup(key)
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(default)
        };

        Self {
            endpoints: endpoints_from_vars(&lookup),
            run_timeout_ms: millis("RUN_TIMEOUT_MS", 10_000),
            compile_timeout_ms: millis("COMPILE_TIMEOUT_MS", 10_000),
            attempt_deadline_ms: millis("ATTEMPT_DEADLINE_MS", 15_000),
            language_config_path: lookup("LANGUAGE_CONFIG_PATH").filter(|p| !p.trim().is_empty()),
        }
    }

    pub fn new() -> Self {
        Self::from_env()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoints.is_empty() {
            return Err(ConfigError::NoEndpoints);
        }
        if self.run_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout("RUN_TIMEOUT_MS"));
        }
        if self.compile_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout("COMPILE_TIMEOUT_MS"));
        }
        if self.attempt_deadline_ms == 0 {
            return Err(ConfigError::ZeroTimeout("ATTEMPT_DEADLINE_MS"));
        }
        Ok(())
    }

    pub fn attempt_deadline(&self) -> Duration {
        Duration::from_millis(self.attempt_deadline_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

/// Endpoint list as the environment currently has it
pub fn endpoints_from_env() -> Vec<String> {
    endpoints_from_vars(|key| env::var(key).ok())
}

pub fn endpoints_from_vars<F>(lookup: F) -> Vec<String>
where
    F: Fn(&str) -> Option<String>,
{
    parse_endpoints(&lookup("EXECUTION_ENDPOINTS").unwrap_or_else(|| DEFAULT_ENDPOINTS.to_string()))
}

/// Split a comma-separated endpoint list, dropping blanks and trailing slashes
pub fn parse_endpoints(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|e| e.trim().trim_end_matches('/'))
        .filter(|e| !e.is_empty())
        .map(|e| e.to_string())
        .collect()
}
