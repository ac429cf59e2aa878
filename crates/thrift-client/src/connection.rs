//! The client connection and its call/response state machine.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use thrift_wire::{
    ApplicationException, ApplicationExceptionKind, BinaryDecoder, BinaryEncoder, MessageHeader,
    MessageType, SUCCESS_FIELD_ID, SUCCESS_FIELD_NAME, Struct, Value,
};
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, trace, warn};

use crate::args::Args;
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult, DeclaredException};
use crate::service::{MethodDescriptor, ServiceDescriptor};

/// Names of the public methods of [`Connection`]. A service method with one
/// of these names can only be reached through [`Connection::call`] or
/// [`Connection::method`].
///
/// Must list every public method of `Connection`; a public method added
/// without an entry here will not be warned about. Kept sorted.
const CONNECTION_METHODS: &[&str] = &[
    "address",
    "call",
    "close",
    "is_closed",
    "method",
    "sequence",
    "service",
    "timeout",
    "with_address",
];

/// Opens a TCP connection to a Thrift server.
///
/// The connect is bounded by `config.connect_timeout`; exceeding it returns
/// [`ClientError::Timeout`].
pub async fn connect(
    service: Arc<ServiceDescriptor>,
    addr: impl ToSocketAddrs,
    config: ClientConfig,
) -> ClientResult<Connection<TcpStream>> {
    let connecting = TcpStream::connect(addr);
    let stream = match config.connect_timeout {
        Some(limit) => tokio::time::timeout(limit, connecting)
            .await
            .map_err(|_| ClientError::Timeout)?,
        None => connecting.await,
    }
    .map_err(ClientError::Connect)?;
    stream.set_nodelay(true).map_err(ClientError::Connect)?;
    let peer = stream.peer_addr().map_err(ClientError::Connect)?;
    debug!(service = service.name(), address = %peer, "connected");

    Ok(Connection::new(service, stream, config).with_address(peer.to_string()))
}

/// Encoder and decoder over the two halves of the transport.
struct Io<T> {
    encoder: BinaryEncoder<WriteHalf<T>>,
    decoder: BinaryDecoder<ReadHalf<T>>,
}

/// State touched by a call. Held under the connection's mutex for the whole
/// send/receive cycle, so at most one call is in flight.
struct State<T> {
    /// `None` once the connection is closed.
    io: Option<Io<T>>,
    /// Last sequence id sent.
    seq_id: i32,
}

/// A Thrift client connection over a single duplex stream.
///
/// Calls are strictly sequential: each one sends a request tagged with a
/// fresh sequence id and waits for the response carrying the same id.
/// Concurrent callers queue on an internal lock.
///
/// Any timeout, transport failure or protocol violation closes the
/// connection for good; every later call fails with
/// [`ClientError::ConnectionClosed`] without touching the transport.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// use thrift_client::{Args, ClientConfig, MethodDescriptor, ServiceDescriptor, connect};
/// use thrift_client::{StructSchema, TypeSpec};
///
/// # async fn example() -> Result<(), thrift_client::ClientError> {
/// let service = ServiceDescriptor::new("Calculator").with_method(MethodDescriptor::new(
///     "add",
///     StructSchema::new("add_args")
///         .with_field(1, "a", TypeSpec::I32)
///         .with_field(2, "b", TypeSpec::I32),
///     StructSchema::new("add_result").with_success(TypeSpec::I32),
/// ));
///
/// let config = ClientConfig::default().with_timeout(Duration::from_secs(5));
/// let conn = connect(Arc::new(service), "127.0.0.1:6000", config).await?;
/// let sum = conn.call("add", Args::new().arg(1i32).arg(2i32)).await?;
/// # Ok(())
/// # }
/// ```
pub struct Connection<T> {
    service: Arc<ServiceDescriptor>,
    config: ClientConfig,
    address: Option<String>,
    closed: AtomicBool,
    state: Mutex<State<T>>,
}

impl<T> Connection<T>
where
    T: AsyncRead + AsyncWrite + Send + Unpin,
{
    /// Wraps an established transport. No I/O is performed.
    pub fn new(service: Arc<ServiceDescriptor>, transport: T, config: ClientConfig) -> Self {
        for name in service.method_names() {
            if collides_with_connection(name) {
                warn!(
                    service = service.name(),
                    method = name,
                    "method name collides with a connection method; use call(\"{name}\", ..)"
                );
            }
        }

        let (reader, writer) = tokio::io::split(transport);
        let io = Io {
            encoder: BinaryEncoder::with_capacity(writer, config.protocol, config.buffer_size),
            decoder: BinaryDecoder::new(reader, config.protocol),
        };

        Self {
            service,
            config,
            address: None,
            closed: AtomicBool::new(false),
            state: Mutex::new(State {
                io: Some(io),
                seq_id: 0,
            }),
        }
    }

    /// Sets the informational endpoint label.
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Returns the service this connection speaks.
    pub fn service(&self) -> &ServiceDescriptor {
        &self.service
    }

    /// Returns the endpoint label, if known.
    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    /// Returns the per-call timeout.
    pub fn timeout(&self) -> Option<Duration> {
        self.config.timeout
    }

    /// Returns true once the connection has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Returns the last sequence id sent, or 0 before the first call.
    ///
    /// Waits for any in-flight call to finish.
    pub async fn sequence(&self) -> i32 {
        self.state.lock().await.seq_id
    }

    /// Returns a handle that calls one method of the service.
    pub fn method(&self, name: &str) -> ClientResult<MethodHandle<'_, T>> {
        let descriptor = self
            .service
            .method(name)
            .ok_or_else(|| ClientError::UnknownMethod(name.to_string()))?;
        Ok(MethodHandle {
            conn: self,
            descriptor,
        })
    }

    /// Performs one call.
    ///
    /// Returns `Ok(Some(value))` for a method that returned a value, and
    /// `Ok(None)` for void and oneway methods. A declared exception is
    /// returned as [`ClientError::Declared`] and leaves the connection open.
    ///
    /// # Errors
    ///
    /// - [`ClientError::ConnectionClosed`] if the connection is closed or
    ///   the transport fails
    /// - [`ClientError::Timeout`] if the call exceeds the configured timeout
    /// - [`ClientError::Protocol`] on a sequence id mismatch or missing result
    /// - [`ClientError::Application`] if the peer replies with an exception
    /// - [`ClientError::UnknownMethod`] / [`ClientError::InvalidArgument`]
    ///   before anything is sent
    pub async fn call(&self, method: &str, args: impl Into<Args>) -> ClientResult<Option<Value>> {
        if self.is_closed() {
            return Err(ClientError::closed());
        }
        let descriptor = self
            .service
            .method(method)
            .ok_or_else(|| ClientError::UnknownMethod(method.to_string()))?;
        let args = args.into().bind(&descriptor.args)?;

        let state = self.state.lock().await;
        if self.is_closed() || state.io.is_none() {
            return Err(ClientError::closed());
        }

        // If this future is dropped mid-call the guard closes the connection.
        let mut call = InFlight {
            conn: self,
            state,
            finished: false,
        };
        let outcome = match self.config.timeout {
            Some(limit) => tokio::time::timeout(limit, call.state.round_trip(descriptor, &args))
                .await
                .unwrap_or(Err(ClientError::Timeout)),
            None => call.state.round_trip(descriptor, &args).await,
        };
        call.finished = true;

        if let Err(e) = &outcome {
            if e.closes_connection() {
                warn!(
                    method = %descriptor.name,
                    seq_id = call.state.seq_id,
                    address = ?self.address,
                    error = %e,
                    "closing connection"
                );
                self.shutdown(&mut call.state);
            }
        }
        outcome
    }

    /// Closes the connection, waiting for any in-flight call to finish first.
    /// Closing twice is a no-op.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let mut state = self.state.lock().await;
        if state.io.is_some() {
            debug!(address = ?self.address, "closed by caller");
        }
        self.shutdown(&mut state);
    }
}

impl<T> Connection<T> {
    fn shutdown(&self, state: &mut State<T>) {
        // Dropping both halves drops the transport.
        state.io = None;
        self.closed.store(true, Ordering::Release);
    }
}

fn collides_with_connection(name: &str) -> bool {
    CONNECTION_METHODS.binary_search(&name).is_ok()
}

/// A call holding the connection lock.
///
/// Dropped before `finished` is set, the call was cancelled between sending
/// and receiving: the stream position is unknown, so the connection closes.
struct InFlight<'a, T> {
    conn: &'a Connection<T>,
    state: MutexGuard<'a, State<T>>,
    finished: bool,
}

impl<T> Drop for InFlight<'_, T> {
    fn drop(&mut self) {
        if !self.finished {
            warn!(
                seq_id = self.state.seq_id,
                address = ?self.conn.address,
                "call cancelled mid-flight; closing connection"
            );
            self.conn.shutdown(&mut self.state);
        }
    }
}

impl<T> State<T>
where
    T: AsyncRead + AsyncWrite + Send + Unpin,
{
    async fn round_trip(
        &mut self,
        method: &MethodDescriptor,
        args: &Struct,
    ) -> ClientResult<Option<Value>> {
        let io = self.io.as_mut().ok_or_else(ClientError::closed)?;
        let seq_id = self
            .seq_id
            .checked_add(1)
            .ok_or(ClientError::SequenceExhausted)?;
        self.seq_id = seq_id;

        io.encoder
            .write_message_begin(&MessageHeader::new(&method.name, MessageType::Call, seq_id))?;
        io.encoder.write_struct(args)?;
        io.encoder.write_message_end();
        io.encoder.flush().await?;
        trace!(method = %method.name, seq_id, "request sent");

        if method.oneway {
            return Ok(None);
        }

        let header = io.decoder.read_message_begin().await?;
        if header.seq_id != seq_id {
            return Err(ClientError::Protocol(ApplicationException::new(
                ApplicationExceptionKind::BadSequenceId,
                format!("{} failed: out of sequence response", header.name),
            )));
        }
        if header.name != method.name {
            debug!(expected = %method.name, received = %header.name, "response method name differs");
        }

        if header.kind == MessageType::Exception {
            let body = io.decoder.read_struct(ApplicationException::schema()).await?;
            io.decoder.read_message_end().await?;
            return Err(ClientError::Application(ApplicationException::from_struct(
                &body,
            )));
        }

        let result = io.decoder.read_struct(&method.result).await?;
        io.decoder.read_message_end().await?;
        trace!(method = %method.name, seq_id, "response received");
        resolve_result(method, result)
    }
}

/// Turns a decoded result struct into the call outcome.
///
/// The first populated exception field, in schema order, wins.
fn resolve_result(method: &MethodDescriptor, mut result: Struct) -> ClientResult<Option<Value>> {
    let has_success = method.result.success_field().is_some();
    if has_success {
        if let Some(value) = result.take(SUCCESS_FIELD_ID) {
            return Ok(Some(value));
        }
    }

    if method.result.is_empty() {
        return Ok(None);
    }

    for field in method.result.fields() {
        if field.name == SUCCESS_FIELD_NAME {
            continue;
        }
        if let Some(value) = result.take(field.id) {
            return Err(ClientError::Declared(DeclaredException {
                method: method.name.clone(),
                field: field.name.clone(),
                value,
            }));
        }
    }

    if has_success {
        return Err(ClientError::Protocol(ApplicationException::new(
            ApplicationExceptionKind::MissingResult,
            format!("{} failed: unknown result", method.name),
        )));
    }
    Ok(None)
}

impl<T> fmt::Debug for Connection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("service", &self.service.name())
            .field("address", &self.address)
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

/// A connection bound to one method of its service.
///
/// Obtained from [`Connection::method`]; forwards to [`Connection::call`].
pub struct MethodHandle<'a, T> {
    conn: &'a Connection<T>,
    descriptor: &'a MethodDescriptor,
}

impl<'a, T> MethodHandle<'a, T>
where
    T: AsyncRead + AsyncWrite + Send + Unpin,
{
    /// Returns the method name.
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Returns true if the method is oneway.
    pub fn is_oneway(&self) -> bool {
        self.descriptor.oneway
    }

    /// Returns the method's descriptor.
    pub fn descriptor(&self) -> &'a MethodDescriptor {
        self.descriptor
    }

    /// Calls the method.
    pub async fn call(&self, args: impl Into<Args>) -> ClientResult<Option<Value>> {
        self.conn.call(&self.descriptor.name, args).await
    }
}
