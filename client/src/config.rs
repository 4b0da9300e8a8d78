//! Client configuration.

use crate::error::ConfigError;
use reqwest::Url;
use std::env;
use std::time::Duration;

/// Connection settings for a Nimbus backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// API root, e.g. `http://localhost:1337/1`
    pub api_endpoint: String,
    /// Sent as `X-Parse-Application-Id`
    pub application_id: String,
    /// Sent as `X-Parse-Client-Key`
    pub client_key: Option<String>,
    /// Sent as `X-Parse-Session-Token`
    pub session_token: Option<String>,
    /// Whole-request timeout.
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(api_endpoint: impl Into<String>, application_id: impl Into<String>) -> Self {
        Self {
            api_endpoint: api_endpoint.into(),
            application_id: application_id.into(),
            client_key: None,
            session_token: None,
            timeout: Duration::from_secs(30),
        }
    }

    /// Load configuration from environment variables (and `.env`).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let api_endpoint =
            env::var("NIMBUS_API_ENDPOINT").map_err(|_| ConfigError::MissingApiEndpoint)?;
        let application_id =
            env::var("NIMBUS_APPLICATION_ID").map_err(|_| ConfigError::MissingApplicationId)?;

        let timeout = match env::var("NIMBUS_TIMEOUT_SECS") {
            Ok(raw) => Duration::from_secs(raw.parse().map_err(|_| ConfigError::InvalidTimeout)?),
            Err(_) => Duration::from_secs(30),
        };

        let config = Self {
            api_endpoint,
            application_id,
            client_key: env::var("NIMBUS_CLIENT_KEY").ok(),
            session_token: env::var("NIMBUS_SESSION_TOKEN").ok(),
            timeout,
        };
        config.base_url()?;
        Ok(config)
    }

    pub fn with_client_key(mut self, key: impl Into<String>) -> Self {
        self.client_key = Some(key.into());
        self
    }

    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The endpoint as a URL ending in `/`, so relative paths join under it.
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        let mut raw = self.api_endpoint.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        let url = Url::parse(&raw)
            .map_err(|_| ConfigError::InvalidEndpoint(self.api_endpoint.clone()))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            _ => Err(ConfigError::InvalidEndpoint(self.api_endpoint.clone())),
        }
    }

    /// Absolute path of the API root, as used by batch sub-requests.
    pub fn path_prefix(&self) -> Result<String, ConfigError> {
        Ok(self.base_url()?.path().trim_end_matches('/').to_string())
    }
}
