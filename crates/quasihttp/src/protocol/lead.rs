use crate::protocol::{Body, BodySize, Headers, Request, Response};

/// The serialized head of a quasi-http message, sent framed as one TLV record
/// ahead of any body bytes.
///
/// A lead chunk is created fresh per request or response and is immutable once
/// serialized. Which optional fields are populated depends on the direction:
/// requests carry method and target, responses carry status code and message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeadChunk {
    pub method: Option<String>,
    pub target: Option<String>,
    pub version: Option<String>,
    pub status_code: Option<u16>,
    pub status_message: Option<String>,
    /// Content-length sentinel: 0 = no body, positive = exact byte count,
    /// negative = chunk-encoded body of unknown length.
    pub content_length: i64,
    pub headers: Headers,
}

impl LeadChunk {
    /// Builds the lead chunk announcing `request`.
    pub fn from_request(request: &Request) -> Self {
        Self {
            method: Some(request.method.clone()),
            target: Some(request.target.clone()),
            version: Some(request.version.clone()),
            status_code: None,
            status_message: None,
            content_length: request.body.size().to_content_length(),
            headers: request.headers.clone(),
        }
    }

    /// Builds the lead chunk announcing `response`.
    pub fn from_response(response: &Response) -> Self {
        Self {
            method: None,
            target: None,
            version: Some(response.version.clone()),
            status_code: Some(response.status_code),
            status_message: Some(response.status_message.clone()),
            content_length: response.body.size().to_content_length(),
            headers: response.headers.clone(),
        }
    }

    /// Classifies the announced body.
    pub fn body_size(&self) -> BodySize {
        BodySize::from_content_length(self.content_length)
    }

    /// Materializes a request head from this lead chunk; the body stays empty
    /// until the caller attaches the decoded byte stream.
    pub fn into_request(self) -> Request {
        let mut request = Request::new(
            self.method.unwrap_or_default(),
            self.target.unwrap_or_default(),
        );
        if let Some(version) = self.version {
            request.version = version;
        }
        request.headers = self.headers;
        request.body = Body::Empty;
        request
    }

    /// Materializes a response head from this lead chunk; the body stays empty
    /// until the caller attaches the decoded byte stream.
    pub fn into_response(self) -> Response {
        let mut response = Response::new(self.status_code.unwrap_or_default());
        if let Some(message) = self.status_message {
            response.status_message = message;
        }
        if let Some(version) = self.version {
            response.version = version;
        }
        response.headers = self.headers;
        response.body = Body::Empty;
        response
    }
}
