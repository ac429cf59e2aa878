//! Service descriptors: the method table a connection dispatches through.

use std::collections::HashMap;

use thrift_wire::StructSchema;

/// One method of a service.
#[derive(Debug, Clone)]
pub struct MethodDescriptor {
    /// Method name on the wire.
    pub name: String,
    /// Schema of the `<method>_args` struct.
    pub args: StructSchema,
    /// Schema of the `<method>_result` struct: an optional `success` field at
    /// id 0 followed by declared exception fields.
    pub result: StructSchema,
    /// Fire-and-forget: no response is sent or awaited.
    pub oneway: bool,
}

impl MethodDescriptor {
    /// Creates a two-way method.
    pub fn new(name: impl Into<String>, args: StructSchema, result: StructSchema) -> Self {
        Self {
            name: name.into(),
            args,
            result,
            oneway: false,
        }
    }

    /// Creates a oneway method. Its result schema is empty.
    pub fn oneway(name: impl Into<String>, args: StructSchema) -> Self {
        let name = name.into();
        let result = StructSchema::new(format!("{name}_result"));
        Self {
            name,
            args,
            result,
            oneway: true,
        }
    }
}

/// Immutable table of a service's methods, as produced by an IDL compiler.
#[derive(Debug, Clone, Default)]
pub struct ServiceDescriptor {
    name: String,
    methods: HashMap<String, MethodDescriptor>,
}

impl ServiceDescriptor {
    /// Creates an empty service.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: HashMap::new(),
        }
    }

    /// Adds a method, replacing any method with the same name.
    pub fn with_method(mut self, method: MethodDescriptor) -> Self {
        self.methods.insert(method.name.clone(), method);
        self
    }

    /// Returns the service name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Looks up a method by name.
    pub fn method(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.get(name)
    }

    /// Returns the method names, sorted.
    pub fn method_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
