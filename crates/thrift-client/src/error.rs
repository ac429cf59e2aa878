//! Client error types.

use thiserror::Error;
use thrift_wire::{ApplicationException, ApplicationExceptionKind, Value, WireError};

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// A business exception declared in a method's result schema and reported
/// by the peer.
#[derive(Debug, Clone, PartialEq)]
pub struct DeclaredException {
    /// Method that raised it.
    pub method: String,
    /// Result field that carried it, e.g. `not_found`.
    pub field: String,
    /// The exception value as decoded.
    pub value: Value,
}

impl std::fmt::Display for DeclaredException {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} raised {}", self.method, self.field)
    }
}

/// Outcome of a failed call.
///
/// Every variant other than [`ClientError::Application`],
/// [`ClientError::Declared`], [`ClientError::UnknownMethod`] and
/// [`ClientError::InvalidArgument`] leaves the connection closed; see
/// [`ClientError::closes_connection`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// The call exceeded the configured timeout.
    #[error("call timed out")]
    Timeout,

    /// The connection was already closed, or the transport failed mid-call.
    #[error("connection closed")]
    ConnectionClosed {
        #[source]
        source: Option<std::io::Error>,
    },

    /// The peer answered with an `EXCEPTION` message.
    #[error("application exception ({kind:?}): {0}", kind = .0.kind)]
    Application(ApplicationException),

    /// The response violated the call protocol: a bad sequence id or a
    /// missing result.
    #[error("protocol error ({kind:?}): {0}", kind = .0.kind)]
    Protocol(ApplicationException),

    /// The peer raised an exception declared by the method.
    #[error("declared exception: {0}")]
    Declared(DeclaredException),

    /// The peer sent data the codec could not decode.
    #[error("codec error: {0}")]
    Codec(#[source] WireError),

    /// The sequence counter would overflow; ids cannot be reused.
    #[error("sequence ids exhausted")]
    SequenceExhausted,

    /// The service descriptor has no such method.
    #[error("unknown method: {0}")]
    UnknownMethod(String),

    /// Arguments do not match the method's argument schema.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Establishing the TCP connection failed.
    #[error("connect failed: {0}")]
    Connect(#[source] std::io::Error),
}

impl ClientError {
    /// A `ConnectionClosed` error with no underlying cause.
    pub fn closed() -> Self {
        Self::ConnectionClosed { source: None }
    }

    /// Returns true if this outcome leaves the connection closed.
    pub fn closes_connection(&self) -> bool {
        match self {
            Self::Timeout
            | Self::ConnectionClosed { .. }
            | Self::Protocol(_)
            | Self::Codec(_)
            | Self::SequenceExhausted
            | Self::Connect(_) => true,
            Self::Application(_)
            | Self::Declared(_)
            | Self::UnknownMethod(_)
            | Self::InvalidArgument(_) => false,
        }
    }

    /// Returns the exception kind of an `Application` or `Protocol` error.
    pub fn application_kind(&self) -> Option<ApplicationExceptionKind> {
        match self {
            Self::Application(e) | Self::Protocol(e) => Some(e.kind),
            _ => None,
        }
    }
}

impl From<WireError> for ClientError {
    /// Transport failures become `ConnectionClosed`; anything else is a
    /// decoding failure.
    fn from(e: WireError) -> Self {
        match e {
            WireError::Io(io) => Self::ConnectionClosed { source: Some(io) },
            other => Self::Codec(other),
        }
    }
}
