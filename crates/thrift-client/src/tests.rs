//! Call/response tests against a scripted peer on an in-memory duplex stream.

use std::sync::Arc;
use std::time::Duration;

use thrift_wire::{
    ApplicationException, ApplicationExceptionKind, BinaryDecoder, BinaryEncoder, MessageHeader,
    MessageType, ProtocolConfig, Struct, StructSchema, TypeSpec, Value,
};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream};

use crate::{
    Args, ClientConfig, ClientError, Connection, MethodDescriptor, ServiceDescriptor, connect,
};

// ============================================================================
// Fixtures
// ============================================================================

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn not_found_schema() -> StructSchema {
    StructSchema::new("NotFound").with_field(1, "key", TypeSpec::String)
}

fn denied_schema() -> StructSchema {
    StructSchema::new("Denied").with_field(1, "reason", TypeSpec::String)
}

fn get_args() -> StructSchema {
    StructSchema::new("get_args").with_field(1, "key", TypeSpec::String)
}

fn add_args() -> StructSchema {
    StructSchema::new("add_args")
        .with_field(1, "a", TypeSpec::I32)
        .with_field(2, "b", TypeSpec::I32)
}

fn notify_args() -> StructSchema {
    StructSchema::new("notify_args").with_field(1, "message", TypeSpec::String)
}

fn service() -> Arc<ServiceDescriptor> {
    Arc::new(
        ServiceDescriptor::new("KeyValue")
            .with_method(MethodDescriptor::new(
                "get",
                get_args(),
                StructSchema::new("get_result")
                    .with_success(TypeSpec::String)
                    .with_field(1, "not_found", TypeSpec::structure(not_found_schema()))
                    .with_field(2, "denied", TypeSpec::structure(denied_schema())),
            ))
            .with_method(MethodDescriptor::new(
                "add",
                add_args(),
                StructSchema::new("add_result").with_success(TypeSpec::I32),
            ))
            .with_method(MethodDescriptor::new(
                "ping",
                StructSchema::new("ping_args"),
                StructSchema::new("ping_result"),
            ))
            .with_method(MethodDescriptor::new(
                "delete",
                get_args(),
                StructSchema::new("delete_result")
                    .with_field(1, "denied", TypeSpec::structure(denied_schema())),
            ))
            .with_method(MethodDescriptor::oneway("notify", notify_args()))
            .with_method(MethodDescriptor::new(
                "close",
                StructSchema::new("close_args"),
                StructSchema::new("close_result"),
            )),
    )
}

/// The server side of a stream, driven step by step by each test.
struct Peer<S = DuplexStream> {
    stream: S,
}

impl<S> Peer<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin,
{
    async fn read_call(&mut self, schema: &StructSchema) -> (MessageHeader, Struct) {
        let mut decoder = BinaryDecoder::new(&mut self.stream, ProtocolConfig::default());
        let header = decoder.read_message_begin().await.unwrap();
        let args = decoder.read_struct(schema).await.unwrap();
        decoder.read_message_end().await.unwrap();
        (header, args)
    }

    async fn send(&mut self, header: MessageHeader, body: &Struct) {
        let mut encoder = BinaryEncoder::new(&mut self.stream, ProtocolConfig::default());
        encoder.write_message_begin(&header).unwrap();
        encoder.write_struct(body).unwrap();
        encoder.write_message_end();
        encoder.flush().await.unwrap();
    }

    async fn reply(&mut self, name: &str, seq_id: i32, body: &Struct) {
        self.send(MessageHeader::new(name, MessageType::Reply, seq_id), body)
            .await;
    }

    /// Reads until the client side is dropped.
    async fn remaining(mut self) -> Vec<u8> {
        let mut rest = Vec::new();
        self.stream.read_to_end(&mut rest).await.unwrap();
        rest
    }
}

fn pair(config: ClientConfig) -> (Connection<DuplexStream>, Peer) {
    let (client, server) = tokio::io::duplex(64 * 1024);
    (
        Connection::new(service(), client, config),
        Peer { stream: server },
    )
}

fn success(value: impl Into<Value>) -> Struct {
    Struct::new().with_field(0, value)
}

// ============================================================================
// Successful calls
// ============================================================================

#[tokio::test]
async fn test_success_value_returned_unchanged() {
    init_tracing();
    let (conn, mut peer) = pair(ClientConfig::default());

    let (result, ()) = tokio::join!(conn.call("get", Args::new().arg("hello")), async {
        let (header, args) = peer.read_call(&get_args()).await;
        assert_eq!(header, MessageHeader::new("get", MessageType::Call, 1));
        assert_eq!(args.get_by_name("key"), Some(&Value::from("hello")));
        peer.reply("get", header.seq_id, &success("world")).await;
    });

    assert_eq!(result.unwrap(), Some(Value::from("world")));
    assert!(!conn.is_closed());
}

#[tokio::test]
async fn test_sequence_ids_increase_by_one() {
    let (conn, mut peer) = pair(ClientConfig::default());
    assert_eq!(conn.sequence().await, 0);

    for n in 1..=5 {
        let (result, seen) = tokio::join!(conn.call("add", Args::new().arg(n).arg(n)), async {
            let (header, args) = peer.read_call(&add_args()).await;
            let a = args.get(1).and_then(Value::as_i32).unwrap();
            let b = args.get(2).and_then(Value::as_i32).unwrap();
            peer.reply("add", header.seq_id, &success(a + b)).await;
            header.seq_id
        });
        assert_eq!(seen, n);
        assert_eq!(result.unwrap(), Some(Value::I32(2 * n)));
    }
    assert_eq!(conn.sequence().await, 5);
}

#[tokio::test]
async fn test_void_without_throws_reads_only_the_terminator() {
    let (conn, mut peer) = pair(ClientConfig::default());

    let (result, ()) = tokio::join!(conn.call("ping", Args::new()), async {
        let (header, _) = peer.read_call(&StructSchema::new("ping_args")).await;
        peer.reply("ping", header.seq_id, &Struct::new()).await;
        // Next reply queued right behind the first one.
        peer.reply("add", header.seq_id + 1, &success(7i32)).await;
    });
    assert_eq!(result.unwrap(), None);

    // The queued reply is intact, so nothing past the terminator was read.
    let (result, _) = tokio::join!(conn.call("add", Args::new().arg(3i32).arg(4i32)), async {
        peer.read_call(&add_args()).await
    });
    assert_eq!(result.unwrap(), Some(Value::I32(7)));
}

#[tokio::test]
async fn test_void_with_throws_and_nothing_raised() {
    let (conn, mut peer) = pair(ClientConfig::default());

    let (result, ()) = tokio::join!(conn.call("delete", Args::new().arg("k")), async {
        let (header, _) = peer.read_call(&get_args()).await;
        peer.reply("delete", header.seq_id, &Struct::new()).await;
    });
    assert_eq!(result.unwrap(), None);
    assert!(!conn.is_closed());
}

#[tokio::test]
async fn test_named_arguments_override_positional() {
    let (conn, mut peer) = pair(ClientConfig::default());

    let args = Args::new().arg(1i32).arg(2i32).named("a", 10i32);
    let (result, ()) = tokio::join!(conn.call("add", args), async {
        let (header, args) = peer.read_call(&add_args()).await;
        assert_eq!(args.get_by_name("a"), Some(&Value::I32(10)));
        assert_eq!(args.get_by_name("b"), Some(&Value::I32(2)));
        peer.reply("add", header.seq_id, &success(12i32)).await;
    });
    assert_eq!(result.unwrap(), Some(Value::I32(12)));
}

// ============================================================================
// Oneway
// ============================================================================

#[tokio::test]
async fn test_oneway_never_reads_a_response() {
    let (conn, mut peer) = pair(ClientConfig::default());

    // A response is already waiting; the oneway call must leave it alone.
    peer.reply("add", 2, &success(99i32)).await;

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        conn.call("notify", Args::new().arg("hi")),
    )
    .await
    .expect("oneway call must not wait for a response");
    assert_eq!(result.unwrap(), None);

    let (header, args) = peer.read_call(&notify_args()).await;
    assert_eq!(header, MessageHeader::new("notify", MessageType::Call, 1));
    assert_eq!(args.get_by_name("message"), Some(&Value::from("hi")));

    // The next two-way call picks up the waiting response.
    let (result, _) = tokio::join!(conn.call("add", Args::new().arg(1i32).arg(1i32)), async {
        peer.read_call(&add_args()).await
    });
    assert_eq!(result.unwrap(), Some(Value::I32(99)));
}

// ============================================================================
// Exceptions
// ============================================================================

#[tokio::test]
async fn test_declared_exception_keeps_connection_open() {
    let (conn, mut peer) = pair(ClientConfig::default());

    let not_found = Struct::new().with_field(1, "missing-key");
    let (result, ()) = tokio::join!(conn.call("get", Args::new().arg("missing-key")), async {
        let (header, _) = peer.read_call(&get_args()).await;
        peer.reply("get", header.seq_id, &Struct::new().with_field(1, not_found))
            .await;
    });

    match result {
        Err(ClientError::Declared(e)) => {
            assert_eq!(e.method, "get");
            assert_eq!(e.field, "not_found");
            let value = e.value.as_struct().unwrap();
            assert_eq!(value.get_by_name("key"), Some(&Value::from("missing-key")));
        }
        other => panic!("expected declared exception, got {other:?}"),
    }
    assert!(!conn.is_closed());

    let (result, ()) = tokio::join!(conn.call("get", Args::new().arg("k")), async {
        let (header, _) = peer.read_call(&get_args()).await;
        assert_eq!(header.seq_id, 2);
        peer.reply("get", header.seq_id, &success("v")).await;
    });
    assert_eq!(result.unwrap(), Some(Value::from("v")));
}

#[tokio::test]
async fn test_peer_exception_message() {
    let (conn, mut peer) = pair(ClientConfig::default());

    let exc = ApplicationException::new(ApplicationExceptionKind::InternalError, "db down");
    let (result, ()) = tokio::join!(conn.call("get", Args::new().arg("k")), async {
        let (header, _) = peer.read_call(&get_args()).await;
        peer.send(
            MessageHeader::new("get", MessageType::Exception, header.seq_id),
            &exc.to_struct(),
        )
        .await;
    });

    match result {
        Err(ClientError::Application(e)) => assert_eq!(e, exc),
        other => panic!("expected application exception, got {other:?}"),
    }
    assert!(!conn.is_closed());

    let (result, ()) = tokio::join!(conn.call("ping", Args::new()), async {
        let (header, _) = peer.read_call(&StructSchema::new("ping_args")).await;
        peer.reply("ping", header.seq_id, &Struct::new()).await;
    });
    assert_eq!(result.unwrap(), None);
}

// ============================================================================
// Connection-closing faults
// ============================================================================

#[tokio::test]
async fn test_bad_sequence_id_closes() {
    init_tracing();
    let (conn, mut peer) = pair(ClientConfig::default());

    let (result, ()) = tokio::join!(conn.call("get", Args::new().arg("k")), async {
        let (header, _) = peer.read_call(&get_args()).await;
        peer.reply("get", header.seq_id + 1, &success("v")).await;
    });

    let err = result.unwrap_err();
    assert!(matches!(err, ClientError::Protocol(_)));
    assert_eq!(
        err.application_kind(),
        Some(ApplicationExceptionKind::BadSequenceId)
    );
    assert!(conn.is_closed());

    let err = conn.call("get", Args::new().arg("k")).await.unwrap_err();
    assert!(matches!(err, ClientError::ConnectionClosed { source: None }));

    drop(conn);
    assert!(peer.remaining().await.is_empty());
}

#[tokio::test]
async fn test_missing_result_closes() {
    let (conn, mut peer) = pair(ClientConfig::default());

    let (result, ()) = tokio::join!(conn.call("get", Args::new().arg("k")), async {
        let (header, _) = peer.read_call(&get_args()).await;
        peer.reply("get", header.seq_id, &Struct::new()).await;
    });

    let err = result.unwrap_err();
    assert_eq!(
        err.application_kind(),
        Some(ApplicationExceptionKind::MissingResult)
    );
    assert!(conn.is_closed());
}

#[tokio::test(start_paused = true)]
async fn test_timeout_closes() {
    let config = ClientConfig::default().with_timeout(Duration::from_millis(200));
    let (conn, mut peer) = pair(config);
    assert_eq!(conn.timeout(), Some(Duration::from_millis(200)));

    // The peer reads the request and never answers.
    let (result, _) = tokio::join!(conn.call("get", Args::new().arg("k")), async {
        peer.read_call(&get_args()).await
    });

    assert!(matches!(result, Err(ClientError::Timeout)));
    assert!(conn.is_closed());

    let err = conn.call("get", Args::new().arg("k")).await.unwrap_err();
    assert!(matches!(err, ClientError::ConnectionClosed { source: None }));

    drop(conn);
    assert!(peer.remaining().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_call_closes() {
    let (conn, mut peer) = pair(ClientConfig::default());

    // The caller gives up before the reply arrives.
    let (outcome, (header, _)) = tokio::join!(
        tokio::time::timeout(
            Duration::from_millis(50),
            conn.call("add", Args::new().arg(1i32).arg(2i32)),
        ),
        async { peer.read_call(&add_args()).await }
    );
    assert!(outcome.is_err());
    assert!(conn.is_closed());

    // The reply to seq 1 is never read, so no later call may proceed.
    assert_eq!(header.seq_id, 1);
    let err = conn
        .call("add", Args::new().arg(5i32).arg(5i32))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::ConnectionClosed { source: None }));

    drop(conn);
    assert!(peer.remaining().await.is_empty());
}

#[tokio::test]
async fn test_peer_hangup_is_connection_closed() {
    let (conn, mut peer) = pair(ClientConfig::default());

    let (result, ()) = tokio::join!(conn.call("get", Args::new().arg("k")), async {
        peer.read_call(&get_args()).await;
        peer.stream.shutdown().await.unwrap();
    });

    match result {
        Err(ClientError::ConnectionClosed { source: Some(io) }) => {
            assert_eq!(io.kind(), std::io::ErrorKind::UnexpectedEof);
        }
        other => panic!("expected connection closed, got {other:?}"),
    }
    assert!(conn.is_closed());
}

#[tokio::test]
async fn test_malformed_response_closes() {
    let (conn, mut peer) = pair(ClientConfig::default());

    let (result, ()) = tokio::join!(conn.call("get", Args::new().arg("k")), async {
        peer.read_call(&get_args()).await;
        // Unversioned header while the client reads strictly.
        peer.stream
            .write_all(&[0, 0, 0, 3, b'g', b'e', b't', 2, 0, 0, 0, 1])
            .await
            .unwrap();
    });

    assert!(matches!(
        result,
        Err(ClientError::Codec(thrift_wire::WireError::MissingVersion))
    ));
    assert!(conn.is_closed());
}

// ============================================================================
// Close and local failures
// ============================================================================

#[tokio::test]
async fn test_calls_after_close_write_nothing() {
    let (conn, peer) = pair(ClientConfig::default());

    conn.close().await;
    conn.close().await;
    assert!(conn.is_closed());

    for _ in 0..3 {
        let err = conn.call("notify", Args::new().arg("x")).await.unwrap_err();
        assert!(matches!(err, ClientError::ConnectionClosed { source: None }));
    }
    assert_eq!(conn.sequence().await, 0);

    // Transport already released by close().
    assert!(peer.remaining().await.is_empty());
}

#[tokio::test]
async fn test_local_errors_leave_connection_untouched() {
    let (conn, mut peer) = pair(ClientConfig::default());

    let err = conn.call("frobnicate", Args::new()).await.unwrap_err();
    assert!(matches!(err, ClientError::UnknownMethod(ref m) if m == "frobnicate"));

    let err = conn.call("add", Args::new().arg("one")).await.unwrap_err();
    assert!(matches!(err, ClientError::InvalidArgument(_)));
    assert!(!err.closes_connection());

    assert!(!conn.is_closed());
    assert_eq!(conn.sequence().await, 0);

    let (result, ()) = tokio::join!(conn.call("add", Args::new().arg(1i32).arg(2i32)), async {
        let (header, _) = peer.read_call(&add_args()).await;
        assert_eq!(header.seq_id, 1);
        peer.reply("add", header.seq_id, &success(3i32)).await;
    });
    assert_eq!(result.unwrap(), Some(Value::I32(3)));
}

// ============================================================================
// Concurrency and method handles
// ============================================================================

#[tokio::test]
async fn test_concurrent_calls_are_serialized() {
    let (conn, mut peer) = pair(ClientConfig::default());

    let (first, second, seqs) = tokio::join!(
        conn.call("add", Args::new().arg(1i32).arg(1i32)),
        conn.call("add", Args::new().arg(2i32).arg(2i32)),
        async {
            let mut seqs = Vec::new();
            for _ in 0..2 {
                let (header, args) = peer.read_call(&add_args()).await;
                let a = args.get(1).and_then(Value::as_i32).unwrap();
                let b = args.get(2).and_then(Value::as_i32).unwrap();
                peer.reply("add", header.seq_id, &success(a + b)).await;
                seqs.push(header.seq_id);
            }
            seqs
        }
    );

    assert_eq!(seqs, vec![1, 2]);
    assert_eq!(first.unwrap(), Some(Value::I32(2)));
    assert_eq!(second.unwrap(), Some(Value::I32(4)));
}

#[tokio::test]
async fn test_method_handle() {
    init_tracing();
    let (conn, mut peer) = pair(ClientConfig::default());

    let add = conn.method("add").unwrap();
    assert_eq!(add.name(), "add");
    assert!(!add.is_oneway());
    assert!(conn.method("notify").unwrap().is_oneway());
    assert!(matches!(
        conn.method("nope"),
        Err(ClientError::UnknownMethod(_))
    ));

    let (result, ()) = tokio::join!(add.call(Args::new().arg(20i32).arg(22i32)), async {
        let (header, _) = peer.read_call(&add_args()).await;
        peer.reply("add", header.seq_id, &success(42i32)).await;
    });
    assert_eq!(result.unwrap(), Some(Value::I32(42)));

    // `close` collides with Connection::close but stays callable by name.
    let (result, ()) = tokio::join!(conn.call("close", Args::new()), async {
        let (header, _) = peer.read_call(&StructSchema::new("close_args")).await;
        assert_eq!(header.name, "close");
        peer.reply("close", header.seq_id, &Struct::new()).await;
    });
    assert_eq!(result.unwrap(), None);
    assert!(!conn.is_closed());
}

// ============================================================================
// Protocol options and TCP
// ============================================================================

#[tokio::test]
async fn test_non_strict_write() {
    let config = ClientConfig::default()
        .with_protocol(ProtocolConfig::default().with_strict_write(false));
    let (conn, mut peer) = pair(config);

    let (result, ()) = tokio::join!(conn.call("ping", Args::new()), async {
        let mut decoder = BinaryDecoder::new(
            &mut peer.stream,
            ProtocolConfig::default().with_strict_read(false),
        );
        let header = decoder.read_message_begin().await.unwrap();
        decoder
            .read_struct(&StructSchema::new("ping_args"))
            .await
            .unwrap();
        assert_eq!(header, MessageHeader::new("ping", MessageType::Call, 1));
        peer.reply("ping", header.seq_id, &Struct::new()).await;
    });
    assert_eq!(result.unwrap(), None);
}

#[tokio::test]
async fn test_connect_over_tcp() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut peer = Peer { stream };
        let (header, args) = peer.read_call(&add_args()).await;
        let a = args.get(1).and_then(Value::as_i32).unwrap();
        let b = args.get(2).and_then(Value::as_i32).unwrap();
        peer.reply("add", header.seq_id, &success(a * b)).await;
        peer
    });

    let config = ClientConfig::default().with_timeout(Duration::from_secs(5));
    let conn = connect(service(), addr, config).await.unwrap();
    assert_eq!(conn.address(), Some(addr.to_string().as_str()));

    let result = conn.call("add", Args::new().arg(6i32).arg(7i32)).await;
    assert_eq!(result.unwrap(), Some(Value::I32(42)));

    let _peer = server.await.unwrap();
    conn.close().await;
}

#[tokio::test]
async fn test_connect_refused() {
    // Grab a free port, then release it so nothing is listening.
    let addr = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };

    let err = connect(service(), addr, ClientConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Connect(_)));
}
