use std::env;
use std::time::Duration;

use serde::Deserialize;

use crate::Error;

const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Settings for a [`Database`](crate::Database) pool and the sessions it
/// hands out.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default)]
    pub log_queries: bool,
}

impl Config {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            log_queries: false,
        }
    }

    /// Connection settings from the `DATABASE_URL` environment variable.
    pub fn from_env() -> Result<Self, Error> {
        let url = env::var("DATABASE_URL")
            .map_err(|_| Error::Configuration("DATABASE_URL is not set".to_string()))?;
        Ok(Self::new(url))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

fn default_max_connections() -> u32 {
    DEFAULT_MAX_CONNECTIONS
}

fn default_connect_timeout_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_applies_the_defaults() {
        let config = Config::new("postgres://localhost/app");
        assert_eq!(config.max_connections, 5);
        assert_eq!(config.connect_timeout(), Duration::from_secs(5));
        assert!(!config.log_queries);
    }

    #[test]
    fn deserialization_fills_in_missing_fields() {
        let config: Config =
            serde_json::from_value(serde_json::json!({ "url": "postgres://localhost/app" }))
                .unwrap();
        assert_eq!(config.url, "postgres://localhost/app");
        assert_eq!(config.max_connections, 5);
        assert_eq!(config.connect_timeout_secs, 5);
        assert!(!config.log_queries);
    }

    #[test]
    fn deserialization_honors_overrides() {
        let config: Config = serde_json::from_value(serde_json::json!({
            "url": "postgres://localhost/app",
            "max_connections": 20,
            "connect_timeout_secs": 1,
            "log_queries": true
        }))
        .unwrap();
        assert_eq!(config.max_connections, 20);
        assert_eq!(config.connect_timeout(), Duration::from_secs(1));
        assert!(config.log_queries);
    }
}
