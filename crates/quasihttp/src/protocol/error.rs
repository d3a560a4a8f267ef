use std::io;
use thiserror::Error;

/// The error taxonomy of the quasi-http protocol engine.
///
/// Every variant is fatal to the transfer it occurs on; no transparent retries
/// exist at this layer. Cleanup failures are swallowed by the coordinator and
/// never mask the primary error.
#[derive(Debug, Error)]
pub enum QuasiHttpError {
    #[error("invalid frame: {reason}")]
    InvalidFrame { reason: String },

    #[error("protocol violation: {reason}")]
    ProtocolViolation { reason: String },

    #[error("message too large, current: {current_size} exceed the limit {max_size}")]
    MessageTooLarge { current_size: usize, max_size: usize },

    #[error("body exceeds the limit of {max_size} bytes")]
    BodyTooLarge { max_size: u64 },

    #[error("content length not satisfied, expected {expected} bytes but only {received} arrived")]
    ContentLengthNotSatisfied { expected: u64, received: u64 },

    #[error("unexpected end of input")]
    UnexpectedEndOfInput,

    #[error("send timeout")]
    Timeout,

    #[error("send cancelled: {reason}")]
    Cancelled { reason: String },

    #[error("missing dependency: {name}")]
    MissingDependency { name: &'static str },

    #[error("expected a response but none arrived")]
    NoResponse,

    #[error("response body exceeds the buffering limit of {limit} bytes")]
    BodySizeLimitExceeded { limit: u64 },

    #[error("io error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

impl QuasiHttpError {
    pub fn invalid_frame<S: ToString>(reason: S) -> Self {
        Self::InvalidFrame { reason: reason.to_string() }
    }

    pub fn protocol_violation<S: ToString>(reason: S) -> Self {
        Self::ProtocolViolation { reason: reason.to_string() }
    }

    pub fn message_too_large(current_size: usize, max_size: usize) -> Self {
        Self::MessageTooLarge { current_size, max_size }
    }

    pub fn cancelled<S: ToString>(reason: S) -> Self {
        Self::Cancelled { reason: reason.to_string() }
    }

    pub fn missing_dependency(name: &'static str) -> Self {
        Self::MissingDependency { name }
    }

    pub fn io<E: Into<io::Error>>(e: E) -> Self {
        Self::Io { source: e.into() }
    }

    /// Wraps this error into an `io::Error` so it can travel through the
    /// `AsyncRead`/`AsyncWrite` body adapters. The inverse is [`Self::from_io`].
    pub fn into_io(self) -> io::Error {
        match self {
            Self::Io { source } => source,
            e => io::Error::other(e),
        }
    }

    /// Recovers a typed error smuggled through an `io::Error` by [`Self::into_io`],
    /// falling back to plain `Io` for foreign errors.
    pub fn from_io(e: io::Error) -> Self {
        match e.downcast::<Self>() {
            Ok(err) => err,
            Err(e) => Self::Io { source: e },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_round_trip_preserves_kind() {
        let err = QuasiHttpError::ContentLengthNotSatisfied { expected: 10, received: 3 };
        let io_err = err.into_io();
        match QuasiHttpError::from_io(io_err) {
            QuasiHttpError::ContentLengthNotSatisfied { expected, received } => {
                assert_eq!(expected, 10);
                assert_eq!(received, 3);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_foreign_io_error_becomes_io_variant() {
        let io_err = io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed");
        assert!(matches!(QuasiHttpError::from_io(io_err), QuasiHttpError::Io { .. }));
    }
}
