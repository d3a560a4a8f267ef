use std::collections::HashMap;

use crate::protocol::{Body, Headers, DEFAULT_PROTOCOL_VERSION};

/// A quasi-http request.
///
/// Methods and targets are free-form printable-ASCII strings; quasi-http does
/// not restrict them to the HTTP method registry. The environment map is a
/// side channel for transport-specific metadata and never reaches the wire.
#[derive(Debug)]
pub struct Request {
    pub method: String,
    pub target: String,
    pub version: String,
    pub headers: Headers,
    pub body: Body,
    pub environment: HashMap<String, String>,
}

impl Request {
    pub fn new(method: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            target: target.into(),
            version: DEFAULT_PROTOCOL_VERSION.to_string(),
            headers: Headers::new(),
            body: Body::Empty,
            environment: HashMap::new(),
        }
    }

    pub fn with_body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.entry(name.into()).or_default().push(value.into());
        self
    }
}
