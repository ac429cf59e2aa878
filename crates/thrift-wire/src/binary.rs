//! Binary protocol encoder and decoder.
//!
//! The encoder serializes a whole message into an in-memory buffer and
//! writes it to the sink on [`BinaryEncoder::flush`]. The decoder reads
//! directly from an async source, so each header, field and terminator read
//! is a suspension point.
//!
//! ## Message header
//!
//! ```text
//! strict:     ┌──────────────────────┬──────────┬────────┐
//!             │ 0x8001_00 | type (4) │ name     │ seq (4)│
//!             └──────────────────────┴──────────┴────────┘
//! non-strict: ┌──────────┬──────────┬────────┐
//!             │ name     │ type (1) │ seq (4)│
//!             └──────────┴──────────┴────────┘
//! ```
//!
//! Strings are an `i32` length followed by the bytes. All integers are
//! big-endian.

use bytes::{BufMut, Bytes, BytesMut};
use futures::future::{BoxFuture, FutureExt};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::error::{WireError, WireResult};
use crate::protocol::{
    MAX_DEPTH, MessageHeader, MessageType, ProtocolConfig, TType, TYPE_MASK, VERSION_1,
    VERSION_MASK,
};
use crate::schema::{StructSchema, TypeSpec};
use crate::value::{List, Map, Struct, Value};

/// Upper bound on capacity reserved up front for a container, whatever its
/// declared length.
const PREALLOC_LIMIT: usize = 1024;

// ============================================================================
// Encoding
// ============================================================================

/// Appends a message header.
pub fn encode_message_begin(
    buf: &mut BytesMut,
    header: &MessageHeader,
    strict: bool,
) -> WireResult<()> {
    if strict {
        buf.put_u32(VERSION_1 | header.kind as u32);
        encode_bytes(buf, header.name.as_bytes())?;
        buf.put_i32(header.seq_id);
    } else {
        encode_bytes(buf, header.name.as_bytes())?;
        buf.put_u8(header.kind as u8);
        buf.put_i32(header.seq_id);
    }
    Ok(())
}

/// Appends a struct: each field header and value, then a STOP byte.
pub fn encode_struct(buf: &mut BytesMut, s: &Struct) -> WireResult<()> {
    for field in s.fields() {
        buf.put_u8(field.value.ttype() as u8);
        buf.put_i16(field.id);
        encode_value(buf, &field.value)?;
    }
    buf.put_u8(TType::Stop as u8);
    Ok(())
}

/// Appends a single value without a field header.
///
/// Fails with [`WireError::SizeLimit`] if a string or container is longer
/// than an `i32` length prefix can express.
pub fn encode_value(buf: &mut BytesMut, value: &Value) -> WireResult<()> {
    match value {
        Value::Bool(v) => buf.put_u8(u8::from(*v)),
        Value::Byte(v) => buf.put_i8(*v),
        Value::I16(v) => buf.put_i16(*v),
        Value::I32(v) => buf.put_i32(*v),
        Value::I64(v) => buf.put_i64(*v),
        Value::Double(v) => buf.put_f64(*v),
        Value::String(v) => encode_bytes(buf, v.as_bytes())?,
        Value::Binary(v) => encode_bytes(buf, v)?,
        Value::Struct(v) => encode_struct(buf, v)?,
        Value::List(list) | Value::Set(list) => {
            buf.put_u8(list.elem as u8);
            encode_len(buf, list.items.len())?;
            for item in &list.items {
                encode_value(buf, item)?;
            }
        }
        Value::Map(map) => {
            buf.put_u8(map.key as u8);
            buf.put_u8(map.value as u8);
            encode_len(buf, map.entries.len())?;
            for (k, v) in &map.entries {
                encode_value(buf, k)?;
                encode_value(buf, v)?;
            }
        }
    }
    Ok(())
}

fn encode_bytes(buf: &mut BytesMut, bytes: &[u8]) -> WireResult<()> {
    encode_len(buf, bytes.len())?;
    buf.put_slice(bytes);
    Ok(())
}

fn encode_len(buf: &mut BytesMut, len: usize) -> WireResult<()> {
    let len = i32::try_from(len).map_err(|_| WireError::SizeLimit {
        size: len,
        limit: i32::MAX as usize,
    })?;
    buf.put_i32(len);
    Ok(())
}

/// Buffers outgoing messages and writes them to an async sink.
#[derive(Debug)]
pub struct BinaryEncoder<W> {
    sink: W,
    buf: BytesMut,
    config: ProtocolConfig,
}

impl<W> BinaryEncoder<W>
where
    W: AsyncWrite + Unpin,
{
    /// Creates an encoder over `sink`.
    pub fn new(sink: W, config: ProtocolConfig) -> Self {
        Self::with_capacity(sink, config, 4096)
    }

    /// Creates an encoder with a pre-sized write buffer.
    pub fn with_capacity(sink: W, config: ProtocolConfig, capacity: usize) -> Self {
        Self {
            sink,
            buf: BytesMut::with_capacity(capacity),
            config,
        }
    }

    /// Buffers a message header.
    pub fn write_message_begin(&mut self, header: &MessageHeader) -> WireResult<()> {
        let mark = self.buf.len();
        let strict = self.config.strict_write;
        self.rollback_on_error(mark, |buf| encode_message_begin(buf, header, strict))
    }

    /// Buffers a struct body. On error nothing of the struct stays buffered.
    pub fn write_struct(&mut self, s: &Struct) -> WireResult<()> {
        let mark = self.buf.len();
        self.rollback_on_error(mark, |buf| encode_struct(buf, s))
    }

    /// Ends a message. The binary protocol has no message trailer.
    pub fn write_message_end(&mut self) {}

    /// Returns the bytes buffered since the last flush.
    pub fn buffered(&self) -> &[u8] {
        &self.buf
    }

    /// Writes all buffered bytes to the sink and flushes it.
    pub async fn flush(&mut self) -> WireResult<()> {
        self.sink.write_all(&self.buf).await?;
        self.buf.clear();
        self.sink.flush().await?;
        Ok(())
    }

    /// Returns the underlying sink.
    pub fn get_ref(&self) -> &W {
        &self.sink
    }

    /// Consumes the encoder, returning the sink. Unflushed bytes are dropped.
    pub fn into_inner(self) -> W {
        self.sink
    }

    fn rollback_on_error(
        &mut self,
        mark: usize,
        encode: impl FnOnce(&mut BytesMut) -> WireResult<()>,
    ) -> WireResult<()> {
        let result = encode(&mut self.buf);
        if result.is_err() {
            self.buf.truncate(mark);
        }
        result
    }
}

// ============================================================================
// Decoding
// ============================================================================

/// Reads messages from an async source.
#[derive(Debug)]
pub struct BinaryDecoder<R> {
    source: R,
    config: ProtocolConfig,
}

impl<R> BinaryDecoder<R>
where
    R: AsyncRead + Unpin + Send,
{
    /// Creates a decoder over `source`.
    pub fn new(source: R, config: ProtocolConfig) -> Self {
        Self { source, config }
    }

    /// Reads a message header in either strict or non-strict form.
    pub async fn read_message_begin(&mut self) -> WireResult<MessageHeader> {
        let word = self.source.read_i32().await?;
        if word < 0 {
            let word = word as u32;
            if word & VERSION_MASK != VERSION_1 {
                return Err(WireError::BadVersion(word));
            }
            let kind = MessageType::from_u8((word & TYPE_MASK) as u8)?;
            let name = self.read_name().await?;
            let seq_id = self.source.read_i32().await?;
            Ok(MessageHeader { name, kind, seq_id })
        } else {
            if self.config.strict_read {
                return Err(WireError::MissingVersion);
            }
            let len = self.check_len(word, self.config.max_string_len)?;
            let name = String::from_utf8(self.read_exact_bytes(len).await?.to_vec())?;
            let kind = MessageType::from_u8(self.source.read_u8().await?)?;
            let seq_id = self.source.read_i32().await?;
            Ok(MessageHeader { name, kind, seq_id })
        }
    }

    /// Ends a message. The binary protocol has no message trailer.
    pub async fn read_message_end(&mut self) -> WireResult<()> {
        Ok(())
    }

    /// Reads a struct, keeping only fields declared by `schema` with a
    /// matching wire type. Other fields are read and discarded.
    pub async fn read_struct(&mut self, schema: &StructSchema) -> WireResult<Struct> {
        self.read_fields(Some(schema), 0).await
    }

    /// Reads a value of the given wire type without a schema.
    pub async fn read_value(&mut self, ttype: TType) -> WireResult<Value> {
        self.read_any(ttype, None, 0).await
    }

    /// Returns the underlying source.
    pub fn get_ref(&self) -> &R {
        &self.source
    }

    /// Consumes the decoder, returning the source.
    pub fn into_inner(self) -> R {
        self.source
    }

    async fn read_name(&mut self) -> WireResult<String> {
        let raw = self.read_bytes().await?;
        Ok(String::from_utf8(raw.to_vec())?)
    }

    async fn read_bytes(&mut self) -> WireResult<Bytes> {
        let raw = self.source.read_i32().await?;
        let len = self.check_len(raw, self.config.max_string_len)?;
        self.read_exact_bytes(len).await
    }

    async fn read_exact_bytes(&mut self, len: usize) -> WireResult<Bytes> {
        let mut buf = vec![0u8; len];
        self.source.read_exact(&mut buf).await?;
        Ok(Bytes::from(buf))
    }

    async fn read_container_len(&mut self) -> WireResult<usize> {
        let raw = self.source.read_i32().await?;
        self.check_len(raw, self.config.max_container_len)
    }

    fn check_len(&self, raw: i32, limit: usize) -> WireResult<usize> {
        if raw < 0 {
            return Err(WireError::NegativeSize(raw));
        }
        let size = raw as usize;
        if size > limit {
            return Err(WireError::SizeLimit { size, limit });
        }
        Ok(size)
    }

    fn read_fields<'a>(
        &'a mut self,
        schema: Option<&'a StructSchema>,
        depth: usize,
    ) -> BoxFuture<'a, WireResult<Struct>> {
        async move {
            if depth > MAX_DEPTH {
                return Err(WireError::DepthLimit(MAX_DEPTH));
            }
            let mut out = Struct::new();
            loop {
                let tag = TType::from_u8(self.source.read_u8().await?)?;
                if tag == TType::Stop {
                    break;
                }
                let id = self.source.read_i16().await?;
                match schema {
                    Some(schema) => {
                        match schema.field_by_id(id).filter(|f| f.ty.ttype() == tag) {
                            Some(field) => {
                                let value = self.read_any(tag, Some(&field.ty), depth).await?;
                                out.set(id, Some(field.name.clone()), value);
                            }
                            None => {
                                trace!(schema = schema.name(), field_id = id, ?tag, "skipping field");
                                self.read_any(tag, None, depth).await?;
                            }
                        }
                    }
                    None => {
                        let value = self.read_any(tag, None, depth).await?;
                        out.set(id, None, value);
                    }
                }
            }
            Ok(out)
        }
        .boxed()
    }

    fn read_any<'a>(
        &'a mut self,
        ttype: TType,
        spec: Option<&'a TypeSpec>,
        depth: usize,
    ) -> BoxFuture<'a, WireResult<Value>> {
        async move {
            let spec = spec.filter(|s| s.ttype() == ttype);
            let value = match ttype {
                TType::Bool => Value::Bool(self.source.read_u8().await? != 0),
                TType::Byte => Value::Byte(self.source.read_i8().await?),
                TType::Double => Value::Double(self.source.read_f64().await?),
                TType::I16 => Value::I16(self.source.read_i16().await?),
                TType::I32 => Value::I32(self.source.read_i32().await?),
                TType::I64 => Value::I64(self.source.read_i64().await?),
                TType::String => {
                    let raw = self.read_bytes().await?;
                    match spec {
                        Some(TypeSpec::Binary) => Value::Binary(raw),
                        Some(TypeSpec::String) => Value::String(String::from_utf8(raw.to_vec())?),
                        _ => match std::str::from_utf8(&raw) {
                            Ok(text) => Value::String(text.to_owned()),
                            Err(_) => Value::Binary(raw),
                        },
                    }
                }
                TType::Struct => {
                    let schema = match spec {
                        Some(TypeSpec::Struct(schema)) => Some(schema.as_ref()),
                        _ => None,
                    };
                    Value::Struct(self.read_fields(schema, depth + 1).await?)
                }
                TType::List | TType::Set => {
                    let elem = TType::from_u8(self.source.read_u8().await?)?;
                    let len = self.read_container_len().await?;
                    let elem_spec = match spec {
                        Some(TypeSpec::List(e) | TypeSpec::Set(e)) => Some(e.as_ref()),
                        _ => None,
                    };
                    let mut items = Vec::with_capacity(len.min(PREALLOC_LIMIT));
                    for _ in 0..len {
                        items.push(self.read_nested(elem, elem_spec, depth).await?);
                    }
                    let list = List { elem, items };
                    if ttype == TType::List {
                        Value::List(list)
                    } else {
                        Value::Set(list)
                    }
                }
                TType::Map => {
                    let key = TType::from_u8(self.source.read_u8().await?)?;
                    let value = TType::from_u8(self.source.read_u8().await?)?;
                    let len = self.read_container_len().await?;
                    let (key_spec, value_spec) = match spec {
                        Some(TypeSpec::Map(k, v)) => (Some(k.as_ref()), Some(v.as_ref())),
                        _ => (None, None),
                    };
                    let mut entries = Vec::with_capacity(len.min(PREALLOC_LIMIT));
                    for _ in 0..len {
                        let k = self.read_nested(key, key_spec, depth).await?;
                        let v = self.read_nested(value, value_spec, depth).await?;
                        entries.push((k, v));
                    }
                    Value::Map(Map {
                        key,
                        value,
                        entries,
                    })
                }
                TType::Stop | TType::Void => return Err(WireError::InvalidType(ttype as u8)),
            };
            Ok(value)
        }
        .boxed()
    }

    fn read_nested<'a>(
        &'a mut self,
        ttype: TType,
        spec: Option<&'a TypeSpec>,
        depth: usize,
    ) -> BoxFuture<'a, WireResult<Value>> {
        if depth + 1 > MAX_DEPTH {
            return futures::future::ready(Err(WireError::DepthLimit(MAX_DEPTH))).boxed();
        }
        self.read_any(ttype, spec, depth + 1)
    }
}
