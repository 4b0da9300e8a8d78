//! # Nimbus Client
//!
//! Connects the engine's [`Synchronizer`] to a backend over HTTP.
//!
//! ```rust,no_run
//! use nimbus_client::{connect, ClientConfig};
//! use nimbus_engine::Record;
//!
//! let config = ClientConfig::new("http://localhost:1337/1", "myAppId");
//! let sync = connect(&config)?;
//!
//! let mut score = Record::new("GameScore");
//! score.put("score", 1337i32)?;
//! score.save(&sync)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod error;
pub mod http;

pub use config::ClientConfig;
pub use error::{ClientError, ConfigError};
pub use http::HttpTransport;

use nimbus_engine::Synchronizer;
use std::sync::Arc;

/// Build a synchronizer talking to the configured endpoint.
///
/// Batch sub-request paths are prefixed with the endpoint's URL path.
pub fn connect(config: &ClientConfig) -> Result<Synchronizer, ClientError> {
    let transport = HttpTransport::new(config)?;
    let prefix = config.path_prefix()?;
    tracing::debug!(endpoint = %transport.base_url(), "Connecting");
    Ok(Synchronizer::new(Arc::new(transport)).with_path_prefix(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_uses_endpoint_path_as_prefix() {
        let sync = connect(&ClientConfig::new("http://localhost:1337/1/", "app")).unwrap();
        assert_eq!(sync.path_prefix(), "/1");
    }

    #[test]
    fn connect_rejects_invalid_endpoint() {
        assert!(matches!(
            connect(&ClientConfig::new("nope", "app")),
            Err(ClientError::Config(ConfigError::InvalidEndpoint(_)))
        ));
    }
}
