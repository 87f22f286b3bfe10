//! Transport collaborator boundary.
//!
//! The core never touches bytes: every remote operation goes through the
//! [`Transport`] trait, which exchanges the structured documents of
//! [`crate::wire`]. The trait is synchronous by design; each call is one
//! blocking round trip and the caller's thread suspends until it returns.
//! Cancellation and timeouts belong to the implementation, not the core.
//!
//! [`HttpTransport`] is the bundled implementation over a blocking
//! `reqwest` client with the JSON document encoding; tests substitute an
//! in-memory fake.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::wire::{Entry, Feed, ServiceDocument, WireAce};

/// Failure reported by a transport implementation.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct TransportError {
    /// HTTP status code, when the failure carries one.
    pub status: Option<u16>,
    /// Human-readable description.
    pub message: String,
}

impl TransportError {
    /// A transport error without an HTTP status.
    pub fn new(message: impl Into<String>) -> Self {
        Self { status: None, message: message.into() }
    }

    /// A transport error for a rejected HTTP request.
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self { status: Some(status), message: message.into() }
    }
}

/// Blocking document-level transport to one remote repository.
///
/// Implementations own HTTP verb execution, authentication and the
/// byte-level document encoding. All URLs are absolute; the core obtains
/// them from repository links and URI templates.
pub trait Transport: fmt::Debug + Send + Sync {
    /// Fetch the repository's service document.
    fn get_service_document(&self, url: &str) -> Result<ServiceDocument, TransportError>;

    /// Fetch a single entry.
    fn get_entry(&self, url: &str) -> Result<Entry, TransportError>;

    /// Fetch one feed page.
    fn get_feed(&self, url: &str) -> Result<Feed, TransportError>;

    /// Fetch a standalone allowable-actions document.
    fn get_actions(&self, url: &str) -> Result<BTreeMap<String, String>, TransportError>;

    /// Fetch a standalone ACL document.
    fn get_acl(&self, url: &str) -> Result<Vec<WireAce>, TransportError>;

    /// POST an entry (creation, refiling, checkout); returns the resulting
    /// entry as the repository reports it.
    fn post_entry(&self, url: &str, entry: &Entry) -> Result<Entry, TransportError>;

    /// PUT an entry to an object's self link (attribute update, checkin).
    fn put_entry(&self, url: &str, entry: &Entry) -> Result<Entry, TransportError>;

    /// PUT an ACL document; returns the ACL as the repository applied it.
    fn put_acl(&self, url: &str, aces: &[WireAce]) -> Result<Vec<WireAce>, TransportError>;

    /// The authenticated user name, used as the author of created entries.
    fn user(&self) -> Option<&str> {
        None
    }
}

/// HTTP transport over a blocking `reqwest` client.
#[derive(Debug)]
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    credentials: Option<(String, String)>,
}

impl HttpTransport {
    /// Build a transport with default settings (30s timeout, no auth).
    pub fn new() -> Result<Self, TransportError> {
        HttpTransportBuilder::default().build()
    }

    /// Start configuring a transport.
    pub fn builder() -> HttpTransportBuilder {
        HttpTransportBuilder::default()
    }

    fn request(
        &self,
        method: reqwest::Method,
        url: &str,
    ) -> reqwest::blocking::RequestBuilder {
        let mut req = self.client.request(method, url);
        if let Some((user, password)) = &self.credentials {
            req = req.basic_auth(user, Some(password));
        }
        req
    }

    fn execute<T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        url: &str,
        body: Option<&impl Serialize>,
    ) -> Result<T, TransportError> {
        debug!(%method, url, "remote round trip");
        let mut req = self.request(method, url);
        if let Some(body) = body {
            req = req.json(body);
        }
        let response = req.send().map_err(|e| TransportError::new(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            return Err(TransportError::status(status.as_u16(), text));
        }
        response.json().map_err(|e| TransportError::new(e.to_string()))
    }
}

impl Transport for HttpTransport {
    fn get_service_document(&self, url: &str) -> Result<ServiceDocument, TransportError> {
        self.execute(reqwest::Method::GET, url, None::<&Entry>)
    }

    fn get_entry(&self, url: &str) -> Result<Entry, TransportError> {
        self.execute(reqwest::Method::GET, url, None::<&Entry>)
    }

    fn get_feed(&self, url: &str) -> Result<Feed, TransportError> {
        self.execute(reqwest::Method::GET, url, None::<&Entry>)
    }

    fn get_actions(&self, url: &str) -> Result<BTreeMap<String, String>, TransportError> {
        self.execute(reqwest::Method::GET, url, None::<&Entry>)
    }

    fn get_acl(&self, url: &str) -> Result<Vec<WireAce>, TransportError> {
        self.execute(reqwest::Method::GET, url, None::<&Entry>)
    }

    fn post_entry(&self, url: &str, entry: &Entry) -> Result<Entry, TransportError> {
        self.execute(reqwest::Method::POST, url, Some(entry))
    }

    fn put_entry(&self, url: &str, entry: &Entry) -> Result<Entry, TransportError> {
        self.execute(reqwest::Method::PUT, url, Some(entry))
    }

    fn put_acl(&self, url: &str, aces: &[WireAce]) -> Result<Vec<WireAce>, TransportError> {
        self.execute(reqwest::Method::PUT, url, Some(&aces))
    }

    fn user(&self) -> Option<&str> {
        self.credentials.as_ref().map(|(user, _)| user.as_str())
    }
}

/// Configuration for [`HttpTransport`].
#[derive(Debug, Default)]
pub struct HttpTransportBuilder {
    credentials: Option<(String, String)>,
    timeout: Option<Duration>,
    user_agent: Option<String>,
}

impl HttpTransportBuilder {
    /// Authenticate every request with HTTP basic auth.
    pub fn basic_auth(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((user.into(), password.into()));
        self
    }

    /// Per-request timeout; defaults to 30 seconds.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Override the User-Agent header.
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Build the transport.
    pub fn build(self) -> Result<HttpTransport, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout.unwrap_or(Duration::from_secs(30)))
            .user_agent(self.user_agent.unwrap_or_else(|| {
                format!("cmis-client/{}", env!("CARGO_PKG_VERSION"))
            }))
            .build()
            .map_err(|e| TransportError::new(e.to_string()))?;
        Ok(HttpTransport { client, credentials: self.credentials })
    }
}
