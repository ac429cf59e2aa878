//! Call arguments and their binding onto an argument schema.

use thrift_wire::{StructSchema, Struct, Value};

use crate::error::{ClientError, ClientResult};

/// Arguments for one call: positional values bound in schema field order,
/// then named values, which override positional ones.
///
/// ```
/// use thrift_client::Args;
///
/// let args = Args::new().arg(1i32).arg("two").named("verbose", true);
/// assert_eq!(args.len(), 3);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    positional: Vec<Value>,
    named: Vec<(String, Value)>,
}

impl Args {
    /// Creates an empty argument list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a positional value.
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Sets a value by argument name.
    pub fn named(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.named.push((name.into(), value.into()));
        self
    }

    /// Returns the number of values supplied.
    pub fn len(&self) -> usize {
        self.positional.len() + self.named.len()
    }

    /// Returns true if no values were supplied.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Binds the values onto `schema`, producing the argument struct in
    /// field-id order. Arguments left unset are omitted from the struct.
    pub fn bind(self, schema: &StructSchema) -> ClientResult<Struct> {
        let fields = schema.fields();
        if self.positional.len() > fields.len() {
            return Err(ClientError::InvalidArgument(format!(
                "{} takes {} arguments but {} positional values were given",
                schema.name(),
                fields.len(),
                self.positional.len()
            )));
        }

        let mut slots: Vec<Option<Value>> = vec![None; fields.len()];
        for (slot, value) in slots.iter_mut().zip(self.positional) {
            *slot = Some(value);
        }
        for (name, value) in self.named {
            let pos = fields.iter().position(|f| f.name == name).ok_or_else(|| {
                ClientError::InvalidArgument(format!("{} has no argument `{name}`", schema.name()))
            })?;
            slots[pos] = Some(value);
        }

        let mut out = Struct::new();
        for (field, slot) in fields.iter().zip(slots) {
            let Some(value) = slot else { continue };
            if !value.conforms(&field.ty) {
                return Err(ClientError::InvalidArgument(format!(
                    "argument `{}` of {}: expected {:?}, got {:?}",
                    field.name,
                    schema.name(),
                    field.ty.ttype(),
                    value.ttype()
                )));
            }
            out.set(field.id, Some(field.name.clone()), value);
        }
        Ok(out)
    }
}

impl From<Vec<Value>> for Args {
    fn from(positional: Vec<Value>) -> Self {
        Self {
            positional,
            named: Vec::new(),
        }
    }
}
