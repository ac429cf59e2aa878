//! # thrift-wire: Thrift binary protocol
//!
//! This crate provides the codec used by `thrift-client`: message headers,
//! a dynamic [`Value`] model, [`StructSchema`]s as emitted by an IDL
//! compiler, the generic [`ApplicationException`], and an async
//! [`BinaryEncoder`] / [`BinaryDecoder`] pair.
//!
//! ## Message Format
//!
//! ```text
//! ┌──────────────────────┬─────────────────────────┬─────┐
//! │ header               │ struct body             │ end │
//! │ (name, type, seq id) │ (fields..., STOP)       │     │
//! └──────────────────────┴─────────────────────────┴─────┘
//! ```
//!
//! The binary protocol has no explicit message trailer; `write_message_end`
//! and `read_message_end` exist to keep the framing discipline explicit.
//!
//! ## Example
//!
//! ```
//! use bytes::BytesMut;
//! use thrift_wire::{MessageHeader, MessageType, Struct, encode_message_begin, encode_struct};
//!
//! let mut buf = BytesMut::new();
//! encode_message_begin(&mut buf, &MessageHeader::new("add", MessageType::Call, 1), true)?;
//! encode_struct(&mut buf, &Struct::new().with_field(1, 2i32).with_field(2, 3i32))?;
//! assert_eq!(&buf[..4], &[0x80, 0x01, 0x00, 0x01]);
//! # Ok::<(), thrift_wire::WireError>(())
//! ```

mod binary;
mod error;
mod exception;
mod protocol;
mod schema;
mod value;

pub use binary::{BinaryDecoder, BinaryEncoder, encode_message_begin, encode_struct, encode_value};
pub use error::{WireError, WireResult};
pub use exception::{ApplicationException, ApplicationExceptionKind};
pub use protocol::{
    DEFAULT_MAX_CONTAINER_LEN, DEFAULT_MAX_STRING_LEN, MAX_DEPTH, MessageHeader, MessageType,
    ProtocolConfig, TType, VERSION_1,
};
pub use schema::{FieldSpec, SUCCESS_FIELD_ID, SUCCESS_FIELD_NAME, StructSchema, TypeSpec};
pub use value::{Field, List, Map, Struct, Value};
