//! Mutually authenticated HTTPS access to the InCommon API.
//!
//! The pipeline only sees the [`Transport`] and [`Connector`] traits, so the
//! poller can open a fresh connection per attempt and tests can script the
//! server side.

use std::{error::Error as StdError, fs, path::Path, time::Duration};

use reqwest::{
    blocking::{Client, RequestBuilder},
    Identity,
};
use thiserror::Error;
use tracing::debug;

use crate::{
    config::ApiConfig,
    error::{RequestError, Result},
};

#[derive(Debug, Error)]
pub enum TransportError {
    /// The server answered with something that is not a well framed HTTP
    /// response. The collect endpoint does this while a certificate is still
    /// being processed, and the connection can't be reused afterwards.
    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("transport error: {0}")]
    Fatal(String),
}

impl TransportError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Malformed(_))
    }
}

/// First `hyper::Error` in the cause chain of a client error.
fn hyper_cause<'a>(err: &'a (dyn StdError + 'static)) -> Option<&'a hyper::Error> {
    let mut cause = Some(err);
    while let Some(err) = cause {
        if let Some(hyper_err) = err.downcast_ref::<hyper::Error>() {
            return Some(hyper_err);
        }
        cause = err.source();
    }
    None
}

impl From<reqwest::Error> for TransportError {
    /// Only an unparsable or empty status line is `Malformed`. Resets, TLS
    /// alerts, timeouts and refused connections are all `Fatal`.
    fn from(err: reqwest::Error) -> Self {
        let framing = hyper_cause(&err)
            .is_some_and(|cause| cause.is_parse() || cause.is_incomplete_message());
        if framing {
            Self::Malformed(err.to_string())
        } else {
            Self::Fatal(err.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub reason: String,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Headers sent with every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiHeaders {
    pub content_type: String,
    pub login: String,
    pub customer_uri: String,
}

impl ApiHeaders {
    pub fn new(config: &ApiConfig, login: &str) -> Self {
        Self {
            content_type: config.content_type.clone(),
            login: login.to_owned(),
            customer_uri: config.customer_uri.clone(),
        }
    }

    pub fn pairs(&self) -> [(&'static str, &str); 3] {
        [
            ("Content-type", self.content_type.as_str()),
            ("login", self.login.as_str()),
            ("customerUri", self.customer_uri.as_str()),
        ]
    }
}

/// One open connection to the API.
pub trait Transport {
    fn get(&mut self, path: &str, headers: &ApiHeaders) -> Result<ApiResponse, TransportError>;

    fn post(
        &mut self,
        path: &str,
        headers: &ApiHeaders,
        body: &serde_json::Value,
    ) -> Result<ApiResponse, TransportError>;

    fn close(&mut self);
}

/// Opens new connections bound to the operator's credentials.
pub trait Connector {
    type Conn: Transport;

    fn connect(&self) -> Result<Self::Conn, TransportError>;
}

/// Operator certificate and key, checked before any request is made.
#[derive(Clone)]
pub struct ClientCredentials {
    pem: Vec<u8>,
}

impl ClientCredentials {
    pub fn load(cert_path: &Path, key_path: &Path) -> Result<Self> {
        let read = |path: &Path| {
            fs::read(path).map_err(|err| {
                RequestError::validation(format!("can't read credential file {path:?}: {err}"))
            })
        };
        let mut pem = read(cert_path)?;
        pem.extend_from_slice(b"\n");
        pem.extend_from_slice(&read(key_path)?);

        let credentials = Self { pem };
        credentials.identity()?;
        Ok(credentials)
    }

    fn identity(&self) -> Result<Identity> {
        Identity::from_pem(&self.pem).map_err(|err| {
            RequestError::validation(format!("invalid user certificate or key: {err}"))
        })
    }
}

pub struct HttpsConnector {
    base_url: String,
    timeout: Duration,
    credentials: ClientCredentials,
}

impl HttpsConnector {
    pub fn new(config: &ApiConfig, credentials: ClientCredentials) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            timeout: Duration::from_secs(config.timeout_secs),
            credentials,
        }
    }
}

impl Connector for HttpsConnector {
    type Conn = HttpsConnection;

    fn connect(&self) -> Result<HttpsConnection, TransportError> {
        let identity = self
            .credentials
            .identity()
            .map_err(|err| TransportError::Fatal(err.to_string()))?;
        // no idle pool, so every connector call gets its own TLS session
        let client = Client::builder()
            .use_rustls_tls()
            .identity(identity)
            .timeout(self.timeout)
            .pool_max_idle_per_host(0)
            .no_proxy()
            .build()?;
        Ok(HttpsConnection {
            base_url: self.base_url.clone(),
            client: Some(client),
        })
    }
}

pub struct HttpsConnection {
    base_url: String,
    client: Option<Client>,
}

impl HttpsConnection {
    fn send(
        &self,
        build: impl FnOnce(&Client, String) -> RequestBuilder,
        path: &str,
        headers: &ApiHeaders,
    ) -> Result<ApiResponse, TransportError> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| TransportError::Fatal("connection already closed".into()))?;
        let url = format!("{}{}", self.base_url, path);
        let mut request = build(client, url);
        for (name, value) in headers.pairs() {
            request = request.header(name, value);
        }
        let response = request.send()?;
        let status = response.status();
        let body = response.bytes()?.to_vec();
        debug!("HTTP {} ({} bytes)", status, body.len());
        Ok(ApiResponse {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or_default().to_owned(),
            body,
        })
    }
}

impl Transport for HttpsConnection {
    fn get(&mut self, path: &str, headers: &ApiHeaders) -> Result<ApiResponse, TransportError> {
        debug!("GET {}", path);
        self.send(|client, url| client.get(url), path, headers)
    }

    fn post(
        &mut self,
        path: &str,
        headers: &ApiHeaders,
        body: &serde_json::Value,
    ) -> Result<ApiResponse, TransportError> {
        debug!("POST {}", path);
        let body = body.to_string();
        self.send(|client, url| client.post(url).body(body), path, headers)
    }

    fn close(&mut self) {
        self.client.take();
    }
}
