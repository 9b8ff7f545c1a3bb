//! Client configuration parsed from environment variables.

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;

use crate::net::connection::ConnectionOptions;

pub const DEFAULT_API_URL: &str = "http://localhost:3001";
pub const DEFAULT_WS_URL: &str = "ws://localhost:3001/ws";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("websocket URL must start with ws:// or wss://: {0}")]
    InvalidWsUrl(String),
    #[error("API URL must start with http:// or https://: {0}")]
    InvalidApiUrl(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of the bootstrap HTTP API, without a trailing slash.
    pub api_url: String,
    /// Websocket URL of the event channel, without a trailing slash.
    pub ws_url: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_owned(),
            ws_url: DEFAULT_WS_URL.to_owned(),
        }
    }
}

impl ClientConfig {
    /// Build typed client config from environment variables.
    ///
    /// Optional:
    /// - `AUCTION_API_URL`: default `http://localhost:3001`
    /// - `AUCTION_WS_URL`: default `ws://localhost:3001/ws`
    ///
    /// # Errors
    ///
    /// Returns an error when a URL has the wrong scheme.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_url = std::env::var("AUCTION_API_URL").ok();
        let ws_url = std::env::var("AUCTION_WS_URL").ok();
        Self::from_values(api_url.as_deref(), ws_url.as_deref())
    }

    /// Build config from explicit values, falling back to defaults.
    ///
    /// # Errors
    ///
    /// Returns an error when a URL has the wrong scheme.
    pub fn from_values(api_url: Option<&str>, ws_url: Option<&str>) -> Result<Self, ConfigError> {
        let api_url = normalize(api_url, DEFAULT_API_URL);
        if !(api_url.starts_with("http://") || api_url.starts_with("https://")) {
            return Err(ConfigError::InvalidApiUrl(api_url));
        }
        let ws_url = normalize(ws_url, DEFAULT_WS_URL);
        if !(ws_url.starts_with("ws://") || ws_url.starts_with("wss://")) {
            return Err(ConfigError::InvalidWsUrl(ws_url));
        }
        Ok(Self { api_url, ws_url })
    }

    #[must_use]
    pub fn connection_options(&self) -> ConnectionOptions {
        ConnectionOptions::new(self.ws_url.clone())
    }
}

fn normalize(raw: Option<&str>, default: &str) -> String {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(default)
        .trim_end_matches('/')
        .to_owned()
}
