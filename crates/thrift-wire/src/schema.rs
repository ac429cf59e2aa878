//! Struct schemas.
//!
//! A schema is what an IDL compiler emits for a struct: an ordered list of
//! fields, each with an id, a name and a declared type. Schemas drive
//! argument binding on the client and typed decoding of results.

use std::sync::Arc;

use crate::protocol::TType;

/// Field id of the `success` slot in a method result struct.
pub const SUCCESS_FIELD_ID: i16 = 0;

/// Name of the `success` slot in a method result struct.
pub const SUCCESS_FIELD_NAME: &str = "success";

/// Declared type of a field or container element.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeSpec {
    Bool,
    Byte,
    I16,
    I32,
    I64,
    Double,
    /// UTF-8 text.
    String,
    /// Raw bytes; shares the `STRING` wire tag.
    Binary,
    Struct(Arc<StructSchema>),
    List(Box<TypeSpec>),
    Set(Box<TypeSpec>),
    Map(Box<TypeSpec>, Box<TypeSpec>),
}

impl TypeSpec {
    /// Returns the wire tag for this type.
    pub fn ttype(&self) -> TType {
        match self {
            Self::Bool => TType::Bool,
            Self::Byte => TType::Byte,
            Self::I16 => TType::I16,
            Self::I32 => TType::I32,
            Self::I64 => TType::I64,
            Self::Double => TType::Double,
            Self::String | Self::Binary => TType::String,
            Self::Struct(_) => TType::Struct,
            Self::List(_) => TType::List,
            Self::Set(_) => TType::Set,
            Self::Map(_, _) => TType::Map,
        }
    }

    /// Shorthand for `TypeSpec::List(Box::new(elem))`.
    pub fn list(elem: TypeSpec) -> Self {
        Self::List(Box::new(elem))
    }

    /// Shorthand for `TypeSpec::Set(Box::new(elem))`.
    pub fn set(elem: TypeSpec) -> Self {
        Self::Set(Box::new(elem))
    }

    /// Shorthand for `TypeSpec::Map(Box::new(key), Box::new(value))`.
    pub fn map(key: TypeSpec, value: TypeSpec) -> Self {
        Self::Map(Box::new(key), Box::new(value))
    }

    /// Shorthand for `TypeSpec::Struct(Arc::new(schema))`.
    pub fn structure(schema: StructSchema) -> Self {
        Self::Struct(Arc::new(schema))
    }
}

/// A single declared field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    /// Field id on the wire.
    pub id: i16,
    /// Field name in the IDL.
    pub name: String,
    /// Declared type.
    pub ty: TypeSpec,
}

/// Schema for a struct, exception, or method argument/result wrapper.
///
/// Fields are kept in ascending id order, which is the order positional
/// arguments bind in and the order declared exceptions are scanned in.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StructSchema {
    name: String,
    fields: Vec<FieldSpec>,
}

impl StructSchema {
    /// Creates an empty schema.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Adds a field.
    ///
    /// Ids and names must be unique within a schema; a duplicate is ignored.
    pub fn with_field(mut self, id: i16, name: impl Into<String>, ty: TypeSpec) -> Self {
        let name = name.into();
        debug_assert!(
            self.field_by_id(id).is_none() && self.field_by_name(&name).is_none(),
            "duplicate field {id}:{name} in {}",
            self.name
        );
        if self.field_by_id(id).is_some() || self.field_by_name(&name).is_some() {
            return self;
        }
        let pos = self.fields.partition_point(|f| f.id < id);
        self.fields.insert(pos, FieldSpec { id, name, ty });
        self
    }

    /// Adds the `success` slot of a result struct.
    pub fn with_success(self, ty: TypeSpec) -> Self {
        self.with_field(SUCCESS_FIELD_ID, SUCCESS_FIELD_NAME, ty)
    }

    /// Returns the struct name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the fields in id order.
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Returns true if no fields are declared.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Looks up a field by id.
    pub fn field_by_id(&self, id: i16) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.id == id)
    }

    /// Looks up a field by name.
    pub fn field_by_name(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Returns the `success` slot, if this is a result struct for a
    /// non-void method.
    pub fn success_field(&self) -> Option<&FieldSpec> {
        self.field_by_id(SUCCESS_FIELD_ID)
            .filter(|f| f.name == SUCCESS_FIELD_NAME)
    }
}
