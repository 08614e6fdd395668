use std::{env, net::SocketAddr, time::Duration};

use thiserror::Error;

pub const DEFAULT_OPENWEATHER_BASE_URL: &str = "https://api.openweathermap.org";

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub bind_port: u16,
    pub openweather_api_key: Option<String>,
    pub openweather_base_url: String,
    pub upstream_timeout: Duration,
    pub event_buffer_size: usize,
    pub sse_keep_alive: Duration,
    pub shutdown_grace: Duration,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("BIND_PORT must be a valid u16")]
    InvalidPort,
    #[error("invalid bind address or port")]
    InvalidSocket,
    #[error("{0} must be a positive integer")]
    InvalidNumber(&'static str),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let positive = |key: &'static str, default: u64| -> Result<u64, ConfigError> {
            match var(key) {
                None => Ok(default),
                Some(value) => value
                    .parse::<u64>()
                    .ok()
                    .filter(|number| *number > 0)
                    .ok_or(ConfigError::InvalidNumber(key)),
            }
        };

        let bind_addr = var("BIND_ADDR").unwrap_or_else(|| "127.0.0.1".to_string());
        let bind_port = var("BIND_PORT")
            .map(|value| value.parse::<u16>().map_err(|_| ConfigError::InvalidPort))
            .transpose()?
            .unwrap_or(8080);

        let config = Self {
            bind_addr,
            bind_port,
            openweather_api_key: var("OPENWEATHER_API_KEY"),
            openweather_base_url: var("OPENWEATHER_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENWEATHER_BASE_URL.to_string()),
            upstream_timeout: Duration::from_secs(positive("UPSTREAM_TIMEOUT_SECS", 10)?),
            event_buffer_size: positive("MCP_EVENT_BUFFER_SIZE", 256)? as usize,
            sse_keep_alive: Duration::from_secs(positive("MCP_SSE_KEEPALIVE_SECS", 15)?),
            shutdown_grace: Duration::from_secs(positive("MCP_SHUTDOWN_GRACE_SECS", 10)?),
        };

        let _ = config.bind_socket()?;
        Ok(config)
    }

    pub fn bind_socket(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.bind_addr, self.bind_port)
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidSocket)
    }

    pub fn weather_api_configured(&self) -> bool {
        self.openweather_api_key.is_some()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn parse_defaults() {
        let config = from_pairs(&[]).expect("config should parse");
        assert_eq!(config.bind_addr, "127.0.0.1");
        assert_eq!(config.bind_port, 8080);
        assert_eq!(config.openweather_api_key, None);
        assert_eq!(config.openweather_base_url, DEFAULT_OPENWEATHER_BASE_URL);
        assert_eq!(config.event_buffer_size, 256);
        assert_eq!(config.shutdown_grace, Duration::from_secs(10));
        assert!(!config.weather_api_configured());
    }

    #[test]
    fn blank_api_key_counts_as_missing() {
        let config = from_pairs(&[("OPENWEATHER_API_KEY", "   ")]).expect("config should parse");
        assert!(!config.weather_api_configured());

        let config = from_pairs(&[("OPENWEATHER_API_KEY", "abc")]).expect("config should parse");
        assert_eq!(config.openweather_api_key.as_deref(), Some("abc"));
    }

    #[test]
    fn invalid_port_fails() {
        let err = from_pairs(&[("BIND_PORT", "70000")]).expect_err("expected invalid port");
        assert!(matches!(err, ConfigError::InvalidPort));
    }

    #[test]
    fn invalid_bind_addr_fails() {
        let err = from_pairs(&[("BIND_ADDR", "not an address")]).expect_err("expected bad socket");
        assert!(matches!(err, ConfigError::InvalidSocket));
    }

    #[test]
    fn zero_buffer_size_fails() {
        let err = from_pairs(&[("MCP_EVENT_BUFFER_SIZE", "0")]).expect_err("expected invalid size");
        assert!(matches!(err, ConfigError::InvalidNumber("MCP_EVENT_BUFFER_SIZE")));
    }

    #[test]
    fn overrides_session_settings() {
        let config = from_pairs(&[
            ("MCP_EVENT_BUFFER_SIZE", "32"),
            ("MCP_SSE_KEEPALIVE_SECS", "5"),
            ("MCP_SHUTDOWN_GRACE_SECS", "2"),
        ])
        .expect("config should parse");

        assert_eq!(config.event_buffer_size, 32);
        assert_eq!(config.sse_keep_alive, Duration::from_secs(5));
        assert_eq!(config.shutdown_grace, Duration::from_secs(2));
    }
}
