//! Dynamic Thrift values.

use bytes::Bytes;

use crate::protocol::TType;
use crate::schema::{StructSchema, TypeSpec};

/// A Thrift value of any type.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Byte(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    Double(f64),
    String(String),
    Binary(Bytes),
    Struct(Struct),
    List(List),
    Set(List),
    Map(Map),
}

/// Elements of a list or set, with their declared element type.
#[derive(Debug, Clone, PartialEq)]
pub struct List {
    /// Element wire type.
    pub elem: TType,
    /// Elements in wire order.
    pub items: Vec<Value>,
}

/// Entries of a map, with declared key and value types.
#[derive(Debug, Clone, PartialEq)]
pub struct Map {
    /// Key wire type.
    pub key: TType,
    /// Value wire type.
    pub value: TType,
    /// Entries in wire order.
    pub entries: Vec<(Value, Value)>,
}

/// A populated struct field.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Field id on the wire.
    pub id: i16,
    /// Field name, known when the struct was built or decoded with a schema.
    pub name: Option<String>,
    /// Field value.
    pub value: Value,
}

/// A struct value: the populated fields, in the order they were set or read.
///
/// Unset optional fields are simply absent.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Struct {
    fields: Vec<Field>,
}

impl Struct {
    /// Creates an empty struct.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a field by id, replacing any existing value.
    pub fn with_field(mut self, id: i16, value: impl Into<Value>) -> Self {
        self.set(id, None, value.into());
        self
    }

    /// Sets a named field by id, replacing any existing value.
    pub fn with_named(mut self, id: i16, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(id, Some(name.into()), value.into());
        self
    }

    /// Sets a field, replacing any existing value with the same id.
    pub fn set(&mut self, id: i16, name: Option<String>, value: Value) {
        match self.fields.iter_mut().find(|f| f.id == id) {
            Some(field) => {
                field.value = value;
                if name.is_some() {
                    field.name = name;
                }
            }
            None => self.fields.push(Field { id, name, value }),
        }
    }

    /// Returns the value of a field by id.
    pub fn get(&self, id: i16) -> Option<&Value> {
        self.fields.iter().find(|f| f.id == id).map(|f| &f.value)
    }

    /// Returns the value of a field by name.
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|f| f.name.as_deref() == Some(name))
            .map(|f| &f.value)
    }

    /// Removes a field and returns its value.
    pub fn take(&mut self, id: i16) -> Option<Value> {
        let pos = self.fields.iter().position(|f| f.id == id)?;
        Some(self.fields.remove(pos).value)
    }

    /// Returns the populated fields.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Returns the number of populated fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if no field is populated.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns true if every populated field is declared by `schema` with a
    /// matching type.
    pub fn conforms(&self, schema: &StructSchema) -> bool {
        self.fields.iter().all(|f| {
            schema
                .field_by_id(f.id)
                .is_some_and(|spec| f.value.conforms(&spec.ty))
        })
    }
}

impl Value {
    /// Returns the wire tag for this value.
    pub fn ttype(&self) -> TType {
        match self {
            Self::Bool(_) => TType::Bool,
            Self::Byte(_) => TType::Byte,
            Self::I16(_) => TType::I16,
            Self::I32(_) => TType::I32,
            Self::I64(_) => TType::I64,
            Self::Double(_) => TType::Double,
            Self::String(_) | Self::Binary(_) => TType::String,
            Self::Struct(_) => TType::Struct,
            Self::List(_) => TType::List,
            Self::Set(_) => TType::Set,
            Self::Map(_) => TType::Map,
        }
    }

    /// Returns true if this value can be written where `spec` is declared.
    pub fn conforms(&self, spec: &TypeSpec) -> bool {
        match (self, spec) {
            (Self::Bool(_), TypeSpec::Bool)
            | (Self::Byte(_), TypeSpec::Byte)
            | (Self::I16(_), TypeSpec::I16)
            | (Self::I32(_), TypeSpec::I32)
            | (Self::I64(_), TypeSpec::I64)
            | (Self::Double(_), TypeSpec::Double)
            | (Self::String(_), TypeSpec::String)
            | (Self::String(_) | Self::Binary(_), TypeSpec::Binary) => true,
            (Self::Struct(s), TypeSpec::Struct(schema)) => s.conforms(schema),
            (Self::List(l), TypeSpec::List(elem)) | (Self::Set(l), TypeSpec::Set(elem)) => {
                l.elem == elem.ttype() && l.items.iter().all(|v| v.conforms(elem))
            }
            (Self::Map(m), TypeSpec::Map(key, value)) => {
                m.key == key.ttype()
                    && m.value == value.ttype()
                    && m.entries
                        .iter()
                        .all(|(k, v)| k.conforms(key) && v.conforms(value))
            }
            _ => false,
        }
    }

    /// Builds a list value from items of the given element type.
    pub fn list(elem: TType, items: Vec<Value>) -> Self {
        Self::List(List { elem, items })
    }

    /// Builds a set value from items of the given element type.
    pub fn set(elem: TType, items: Vec<Value>) -> Self {
        Self::Set(List { elem, items })
    }

    /// Builds a map value from entries of the given key and value types.
    pub fn map(key: TType, value: TType, entries: Vec<(Value, Value)>) -> Self {
        Self::Map(Map {
            key,
            value,
            entries,
        })
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Self::I32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::I64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&Struct> {
        match self {
            Self::Struct(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i8> for Value {
    fn from(v: i8) -> Self {
        Self::Byte(v)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Self::I16(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::I32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::I64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<Bytes> for Value {
    fn from(v: Bytes) -> Self {
        Self::Binary(v)
    }
}

impl From<Struct> for Value {
    fn from(v: Struct) -> Self {
        Self::Struct(v)
    }
}
