//! HTTP transport backed by `reqwest`'s blocking client.

use crate::config::ClientConfig;
use crate::error::ClientError;
use nimbus_engine::{Method, Request, Response, Transport, TransportError};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Url;
use std::io::Read;
use std::sync::RwLock;
use tracing::{debug, warn};

const CHUNK_SIZE: usize = 8 * 1024;

/// Sends engine requests to a real backend.
///
/// Request paths are resolved relative to the configured API endpoint, so
/// `classes/Post` against `http://host/1` goes to `http://host/1/classes/Post`.
pub struct HttpTransport {
    client: Client,
    base_url: Url,
    last_error: RwLock<Option<String>>,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let base_url = config.base_url()?;

        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("x-parse-application-id"),
            header_value(&config.application_id, "X-Parse-Application-Id")?,
        );
        if let Some(key) = &config.client_key {
            headers.insert(
                HeaderName::from_static("x-parse-client-key"),
                header_value(key, "X-Parse-Client-Key")?,
            );
        }
        if let Some(token) = &config.session_token {
            headers.insert(
                HeaderName::from_static("x-parse-session-token"),
                header_value(token, "X-Parse-Session-Token")?,
            );
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            base_url,
            last_error: RwLock::new(None),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The most recent network-level failure, if any.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().ok().and_then(|e| e.clone())
    }

    fn set_error(&self, error: &str) {
        if let Ok(mut guard) = self.last_error.write() {
            *guard = Some(error.to_string());
        }
    }

    fn clear_error(&self) {
        if let Ok(mut guard) = self.last_error.write() {
            *guard = None;
        }
    }

    fn url_for(&self, path: &str) -> Result<Url, TransportError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| TransportError(format!("invalid request path '{path}': {e}")))
    }

    fn send(&self, request: &Request) -> Result<Response, TransportError> {
        let url = self.url_for(&request.path)?;
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self.client.request(method, url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            let bytes = serde_json::to_vec(body)
                .map_err(|e| TransportError(format!("failed to serialize request: {e}")))?;
            let has_content_type = request
                .headers
                .keys()
                .any(|name| name.eq_ignore_ascii_case(CONTENT_TYPE.as_str()));
            if !has_content_type {
                builder = builder.header(CONTENT_TYPE, "application/json");
            }
            builder = builder.body(bytes);
        }

        request.report_progress(0);
        let mut response = builder
            .send()
            .map_err(|e| TransportError(e.to_string()))?;

        let status = response.status().as_u16();
        let total = response.content_length();
        let body = read_body(&mut response, total, request)?;
        request.report_progress(100);

        Ok(Response::new(status, body))
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl Transport for HttpTransport {
    fn perform(&self, request: &Request) -> Result<Response, TransportError> {
        debug!(method = %request.method, path = %request.path, "Sending request");
        match self.send(request) {
            Ok(response) => {
                self.clear_error();
                Ok(response)
            }
            Err(e) => {
                warn!(path = %request.path, error = %e.0, "Request failed");
                self.set_error(&e.0);
                Err(e)
            }
        }
    }
}

fn header_value(value: &str, name: &'static str) -> Result<HeaderValue, ClientError> {
    HeaderValue::from_str(value).map_err(|_| ClientError::InvalidHeader(name))
}

/// Reads the response body in chunks, reporting download progress when the
/// length is known.
fn read_body(
    reader: &mut impl Read,
    total: Option<u64>,
    request: &Request,
) -> Result<Vec<u8>, TransportError> {
    let mut body = Vec::with_capacity(total.unwrap_or(0).min(1 << 20) as usize);
    let mut chunk = [0u8; CHUNK_SIZE];
    loop {
        let read = reader
            .read(&mut chunk)
            .map_err(|e| TransportError(format!("failed to read response: {e}")))?;
        if read == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..read]);
        if let Some(total) = total.filter(|t| *t > 0) {
            let percent = (body.len() as u64 * 100 / total).min(99) as u8;
            request.report_progress(percent);
        }
    }
    Ok(body)
}
