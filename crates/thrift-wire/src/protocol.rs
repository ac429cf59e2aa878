//! Protocol-level constants: type tags, message kinds, and message headers.

use std::fmt;

use crate::error::{WireError, WireResult};

/// Version word of the strict binary protocol.
pub const VERSION_1: u32 = 0x8001_0000;

/// Mask selecting the version bits of a strict header word.
pub const VERSION_MASK: u32 = 0xffff_0000;

/// Mask selecting the message type bits of a strict header word.
pub const TYPE_MASK: u32 = 0x0000_00ff;

/// Default limit for string and binary lengths (16 MiB).
pub const DEFAULT_MAX_STRING_LEN: usize = 16 * 1024 * 1024;

/// Default limit for list, set and map element counts.
pub const DEFAULT_MAX_CONTAINER_LEN: usize = 1024 * 1024;

/// Maximum nesting of structs and containers accepted by the decoder.
pub const MAX_DEPTH: usize = 64;

/// Thrift wire type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TType {
    Stop = 0,
    Void = 1,
    Bool = 2,
    Byte = 3,
    Double = 4,
    I16 = 6,
    I32 = 8,
    I64 = 10,
    String = 11,
    Struct = 12,
    Map = 13,
    Set = 14,
    List = 15,
}

impl TType {
    /// Parses a type tag byte.
    pub fn from_u8(value: u8) -> WireResult<Self> {
        Ok(match value {
            0 => Self::Stop,
            1 => Self::Void,
            2 => Self::Bool,
            3 => Self::Byte,
            4 => Self::Double,
            6 => Self::I16,
            8 => Self::I32,
            10 => Self::I64,
            11 => Self::String,
            12 => Self::Struct,
            13 => Self::Map,
            14 => Self::Set,
            15 => Self::List,
            other => return Err(WireError::InvalidType(other)),
        })
    }
}

/// Kind of a Thrift message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    /// Client request.
    Call = 1,
    /// Successful or declared-exception response.
    Reply = 2,
    /// Protocol-level exception response.
    Exception = 3,
    /// Request that expects no response.
    Oneway = 4,
}

impl MessageType {
    /// Parses a message type byte.
    pub fn from_u8(value: u8) -> WireResult<Self> {
        match value {
            1 => Ok(Self::Call),
            2 => Ok(Self::Reply),
            3 => Ok(Self::Exception),
            4 => Ok(Self::Oneway),
            other => Err(WireError::InvalidMessageType(other)),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Call => write!(f, "CALL"),
            Self::Reply => write!(f, "REPLY"),
            Self::Exception => write!(f, "EXCEPTION"),
            Self::Oneway => write!(f, "ONEWAY"),
        }
    }
}

/// The header that begins every message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHeader {
    /// Method name.
    pub name: String,
    /// Message kind.
    pub kind: MessageType,
    /// Sequence id correlating a response to its request.
    pub seq_id: i32,
}

impl MessageHeader {
    /// Creates a new message header.
    pub fn new(name: impl Into<String>, kind: MessageType, seq_id: i32) -> Self {
        Self {
            name: name.into(),
            kind,
            seq_id,
        }
    }
}

/// Binary protocol options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolConfig {
    /// Reject message headers without a version word.
    pub strict_read: bool,
    /// Write message headers with a version word.
    pub strict_write: bool,
    /// Maximum accepted string or binary length in bytes.
    pub max_string_len: usize,
    /// Maximum accepted element count for lists, sets and maps.
    pub max_container_len: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            strict_read: true,
            strict_write: true,
            max_string_len: DEFAULT_MAX_STRING_LEN,
            max_container_len: DEFAULT_MAX_CONTAINER_LEN,
        }
    }
}

impl ProtocolConfig {
    /// Sets whether unversioned message headers are rejected.
    pub fn with_strict_read(mut self, strict: bool) -> Self {
        self.strict_read = strict;
        self
    }

    /// Sets whether message headers are written with a version word.
    pub fn with_strict_write(mut self, strict: bool) -> Self {
        self.strict_write = strict;
        self
    }

    /// Sets the string length limit.
    pub fn with_max_string_len(mut self, limit: usize) -> Self {
        self.max_string_len = limit;
        self
    }

    /// Sets the container element count limit.
    pub fn with_max_container_len(mut self, limit: usize) -> Self {
        self.max_container_len = limit;
        self
    }
}
