//! # thrift-client: async Thrift client connection
//!
//! A [`Connection`] speaks the Thrift call protocol over one duplex byte
//! stream: it encodes a request tagged with a fresh sequence id, flushes it,
//! waits (bounded by an optional timeout) for the response with the same id,
//! and decodes it into a return value, a declared exception, or an error.
//!
//! The method table comes from a [`ServiceDescriptor`], the schema an IDL
//! compiler would emit. Values are the dynamic [`Value`] model from
//! `thrift-wire`.
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use thrift_client::{Args, ClientConfig, ClientError, MethodDescriptor, ServiceDescriptor};
//! use thrift_client::{StructSchema, TypeSpec, connect};
//!
//! # async fn example() -> Result<(), ClientError> {
//! let service = ServiceDescriptor::new("KeyValue")
//!     .with_method(MethodDescriptor::new(
//!         "get",
//!         StructSchema::new("get_args").with_field(1, "key", TypeSpec::String),
//!         StructSchema::new("get_result")
//!             .with_success(TypeSpec::String)
//!             .with_field(1, "not_found", TypeSpec::structure(StructSchema::new("NotFound"))),
//!     ))
//!     .with_method(MethodDescriptor::oneway(
//!         "touch",
//!         StructSchema::new("touch_args").with_field(1, "key", TypeSpec::String),
//!     ));
//!
//! let conn = connect(Arc::new(service), "127.0.0.1:6000", ClientConfig::default()).await?;
//!
//! match conn.call("get", Args::new().arg("greeting")).await {
//!     Ok(value) => println!("{value:?}"),
//!     Err(ClientError::Declared(e)) => println!("{} raised {}", e.method, e.field),
//!     Err(e) => return Err(e),
//! }
//!
//! // Bound method handle
//! conn.method("touch")?.call(Args::new().arg("greeting")).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Failure semantics
//!
//! Timeouts, transport failures, bad sequence ids, missing results and
//! undecodable responses close the connection; see
//! [`ClientError::closes_connection`]. There is no reconnect and no retry:
//! build a new connection.

mod args;
mod config;
mod connection;
mod error;
mod service;

pub use args::Args;
pub use config::ClientConfig;
pub use connection::{Connection, MethodHandle, connect};
pub use error::{ClientError, ClientResult, DeclaredException};
pub use service::{MethodDescriptor, ServiceDescriptor};

// Re-export useful types from dependencies
pub use thrift_wire::{
    ApplicationException, ApplicationExceptionKind, ProtocolConfig, Struct, StructSchema, TType,
    TypeSpec, Value,
};

#[cfg(test)]
mod tests;
