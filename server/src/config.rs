//! Configuration management for the server.

use std::env;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Path the REST API is served under, e.g. `/1`
    pub mount_path: String,
    /// When set, API requests must carry this `X-Parse-Application-Id`
    pub application_id: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let port = env::var("PORT")
            .unwrap_or_else(|_| "1337".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidPort)?;

        let mount_path = normalize_mount_path(
            &env::var("MOUNT_PATH").unwrap_or_else(|_| "/1".to_string()),
        )?;

        let application_id = env::var("APPLICATION_ID").ok().filter(|id| !id.is_empty());

        Ok(Self {
            host,
            port,
            mount_path,
            application_id,
        })
    }

    /// Configuration for tests and embedding: no app id check.
    pub fn new(mount_path: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            mount_path: normalize_mount_path(mount_path)?,
            application_id: None,
        })
    }

    pub fn with_application_id(mut self, id: impl Into<String>) -> Self {
        self.application_id = Some(id.into());
        self
    }
}

/// `"1"`, `"/1"` and `"/1/"` all become `"/1"`; `"/"` becomes `""`.
fn normalize_mount_path(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        return Ok(String::new());
    }
    if trimmed.contains(|c: char| c.is_whitespace() || c == '{' || c == '}') {
        return Err(ConfigError::InvalidMountPath(raw.to_string()));
    }
    Ok(format!("/{trimmed}"))
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid PORT value")]
    InvalidPort,

    #[error("Invalid MOUNT_PATH value '{0}'")]
    InvalidMountPath(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mount_path_is_normalized() {
        assert_eq!(normalize_mount_path("1").unwrap(), "/1");
        assert_eq!(normalize_mount_path("/1/").unwrap(), "/1");
        assert_eq!(normalize_mount_path("/parse/v1").unwrap(), "/parse/v1");
        assert_eq!(normalize_mount_path("/").unwrap(), "");
        assert!(normalize_mount_path("/a b").is_err());
    }
}
