use std::collections::HashMap;

use crate::protocol::{Body, Headers, DEFAULT_PROTOCOL_VERSION};

/// A quasi-http response.
#[derive(Debug)]
pub struct Response {
    pub status_code: u16,
    pub status_message: String,
    pub version: String,
    pub headers: Headers,
    pub body: Body,
    pub environment: HashMap<String, String>,
}

impl Response {
    pub fn new(status_code: u16) -> Self {
        Self {
            status_code,
            status_message: String::new(),
            version: DEFAULT_PROTOCOL_VERSION.to_string(),
            headers: Headers::new(),
            body: Body::Empty,
            environment: HashMap::new(),
        }
    }

    pub fn with_status_message(mut self, message: impl Into<String>) -> Self {
        self.status_message = message.into();
        self
    }

    pub fn with_body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.entry(name.into()).or_default().push(value.into());
        self
    }

    /// Whether the status code indicates success (2xx).
    #[inline]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}
