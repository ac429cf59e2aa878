//! Wire protocol error types.

use thiserror::Error;

/// Result type for wire protocol operations.
pub type WireResult<T> = Result<T, WireError>;

/// Errors that can occur while encoding or decoding Thrift messages.
#[derive(Debug, Error)]
pub enum WireError {
    /// Strict message header carried an unexpected protocol version.
    #[error("bad protocol version: 0x{0:08x}")]
    BadVersion(u32),

    /// Non-strict message header received while strict reads are required.
    #[error("missing protocol version in message header (strict read enabled)")]
    MissingVersion,

    /// Message type byte is not CALL, REPLY, EXCEPTION or ONEWAY.
    #[error("invalid message type: {0}")]
    InvalidMessageType(u8),

    /// Type tag is not a known Thrift type.
    #[error("invalid type tag: {0}")]
    InvalidType(u8),

    /// A length or element count was negative.
    #[error("negative size: {0}")]
    NegativeSize(i32),

    /// A length or element count exceeded the configured limit.
    #[error("size {size} exceeds limit {limit}")]
    SizeLimit { size: usize, limit: usize },

    /// A `string` field was not valid UTF-8.
    #[error("invalid utf-8 in string field")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// Nesting exceeded the maximum decode depth.
    #[error("struct nesting deeper than {0}")]
    DepthLimit(usize),

    /// I/O error on the underlying transport.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl WireError {
    /// Returns true if the error came from the transport rather than the data.
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}
