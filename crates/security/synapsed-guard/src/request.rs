//! Request view handed to strategies

use std::collections::BTreeMap;
use std::fmt;

use http::header::{AsHeaderName, HeaderName, HeaderValue};
use http::{HeaderMap, Method};

/// The parts of an incoming request strategies can read.
///
/// Form fields are expected to be decoded already by the transport layer.
#[derive(Clone)]
pub struct AuthRequest {
    method: Method,
    path: String,
    headers: HeaderMap,
    form: BTreeMap<String, String>,
}

impl AuthRequest {
    /// Create a request with no headers or form fields
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            form: BTreeMap::new(),
        }
    }

    /// `POST` request
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// `GET` request
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// Append a header
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Set a decoded form field
    #[must_use]
    pub fn with_form_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.form.insert(name.into(), value.into());
        self
    }

    /// Request method
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Request path
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// All headers
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// First value of a header, if it is visible ASCII
    pub fn header_str<K: AsHeaderName>(&self, name: K) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Value of a form field
    #[must_use]
    pub fn form_value(&self, name: &str) -> Option<&str> {
        self.form.get(name).map(String::as_str)
    }
}

impl From<http::request::Parts> for AuthRequest {
    fn from(parts: http::request::Parts) -> Self {
        Self {
            method: parts.method,
            path: parts.uri.path().to_string(),
            headers: parts.headers,
            form: BTreeMap::new(),
        }
    }
}

impl fmt::Debug for AuthRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthRequest")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("form", &self.form.keys().collect::<Vec<_>>())
            .finish()
    }
}
