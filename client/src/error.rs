//! Client error types.

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("NIMBUS_API_ENDPOINT environment variable is required")]
    MissingApiEndpoint,

    #[error("NIMBUS_APPLICATION_ID environment variable is required")]
    MissingApplicationId,

    #[error("Invalid API endpoint '{0}'")]
    InvalidEndpoint(String),

    #[error("Invalid NIMBUS_TIMEOUT_SECS value")]
    InvalidTimeout,
}

/// Errors raised while building a client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid header value for {0}")]
    InvalidHeader(&'static str),
}
