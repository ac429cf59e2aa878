//! The generic application exception carried by `EXCEPTION` messages.

use std::fmt;
use std::sync::OnceLock;

use crate::schema::{StructSchema, TypeSpec};
use crate::value::{Struct, Value};

const MESSAGE_FIELD_ID: i16 = 1;
const KIND_FIELD_ID: i16 = 2;

/// Kind of an [`ApplicationException`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApplicationExceptionKind {
    Unknown,
    UnknownMethod,
    InvalidMessageType,
    WrongMethodName,
    BadSequenceId,
    MissingResult,
    InternalError,
    ProtocolError,
    InvalidTransform,
    InvalidProtocol,
    UnsupportedClientType,
    /// A code this library does not recognise, preserved as received.
    Other(i32),
}

impl ApplicationExceptionKind {
    /// Maps a wire code to a kind.
    pub fn from_i32(code: i32) -> Self {
        match code {
            0 => Self::Unknown,
            1 => Self::UnknownMethod,
            2 => Self::InvalidMessageType,
            3 => Self::WrongMethodName,
            4 => Self::BadSequenceId,
            5 => Self::MissingResult,
            6 => Self::InternalError,
            7 => Self::ProtocolError,
            8 => Self::InvalidTransform,
            9 => Self::InvalidProtocol,
            10 => Self::UnsupportedClientType,
            other => Self::Other(other),
        }
    }

    /// Returns the wire code.
    pub fn as_i32(self) -> i32 {
        match self {
            Self::Unknown => 0,
            Self::UnknownMethod => 1,
            Self::InvalidMessageType => 2,
            Self::WrongMethodName => 3,
            Self::BadSequenceId => 4,
            Self::MissingResult => 5,
            Self::InternalError => 6,
            Self::ProtocolError => 7,
            Self::InvalidTransform => 8,
            Self::InvalidProtocol => 9,
            Self::UnsupportedClientType => 10,
            Self::Other(code) => code,
        }
    }

    fn default_message(self) -> &'static str {
        match self {
            Self::UnknownMethod => "Unknown method",
            Self::InvalidMessageType => "Invalid message type",
            Self::WrongMethodName => "Wrong method name",
            Self::BadSequenceId => "Bad sequence ID",
            Self::MissingResult => "Missing result",
            Self::InternalError => "Internal error",
            Self::ProtocolError => "Protocol error",
            Self::InvalidTransform => "Invalid transform",
            Self::InvalidProtocol => "Invalid protocol",
            Self::UnsupportedClientType => "Unsupported client type",
            Self::Unknown | Self::Other(_) => "Default (unknown) TApplicationException",
        }
    }
}

/// Protocol-level exception: either reported by the peer in an `EXCEPTION`
/// message or raised locally when a response violates the call protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationException {
    /// Exception kind.
    pub kind: ApplicationExceptionKind,
    /// Human-readable message; may be empty.
    pub message: String,
}

impl ApplicationException {
    /// Creates a new exception.
    pub fn new(kind: ApplicationExceptionKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Returns the wire schema: `{1: string message, 2: i32 type}`.
    pub fn schema() -> &'static StructSchema {
        static SCHEMA: OnceLock<StructSchema> = OnceLock::new();
        SCHEMA.get_or_init(|| {
            StructSchema::new("TApplicationException")
                .with_field(MESSAGE_FIELD_ID, "message", TypeSpec::String)
                .with_field(KIND_FIELD_ID, "type", TypeSpec::I32)
        })
    }

    /// Builds an exception from a decoded struct. Missing fields default to
    /// an empty message and `Unknown`.
    pub fn from_struct(s: &Struct) -> Self {
        let message = s
            .get(MESSAGE_FIELD_ID)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let kind = s
            .get(KIND_FIELD_ID)
            .and_then(Value::as_i32)
            .map_or(ApplicationExceptionKind::Unknown, ApplicationExceptionKind::from_i32);
        Self { kind, message }
    }

    /// Converts to a struct for encoding.
    pub fn to_struct(&self) -> Struct {
        Struct::new()
            .with_named(MESSAGE_FIELD_ID, "message", self.message.as_str())
            .with_named(KIND_FIELD_ID, "type", self.kind.as_i32())
    }
}

impl fmt::Display for ApplicationException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.kind.default_message())
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for ApplicationException {}
