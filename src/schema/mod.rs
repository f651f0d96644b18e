//! Field layouts and the schema registries that produce them.
//!
//! A [`FieldLayout`] is the ordered field structure of one message type.
//! Layouts are resolved by a [`SchemaRegistry`]; the reader caches every
//! layout it resolves for the lifetime of the reader.

mod msg;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::{Error, Result};

pub use msg::MsgRegistry;

/// Fixed-width and string primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Bool,
    Byte,
    Char,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float32,
    Float64,
    String,
    WString,
}

impl ScalarKind {
    /// Look up a primitive by its interface-definition name.
    pub fn from_name(name: &str) -> Option<Self> {
        let kind = match name {
            "bool" => ScalarKind::Bool,
            "byte" | "octet" => ScalarKind::Byte,
            "char" => ScalarKind::Char,
            "int8" => ScalarKind::Int8,
            "uint8" => ScalarKind::UInt8,
            "int16" => ScalarKind::Int16,
            "uint16" => ScalarKind::UInt16,
            "int32" => ScalarKind::Int32,
            "uint32" => ScalarKind::UInt32,
            "int64" => ScalarKind::Int64,
            "uint64" => ScalarKind::UInt64,
            "float32" => ScalarKind::Float32,
            "float64" => ScalarKind::Float64,
            "string" => ScalarKind::String,
            "wstring" => ScalarKind::WString,
            _ => return None,
        };
        Some(kind)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ScalarKind::Bool => "bool",
            ScalarKind::Byte => "byte",
            ScalarKind::Char => "char",
            ScalarKind::Int8 => "int8",
            ScalarKind::UInt8 => "uint8",
            ScalarKind::Int16 => "int16",
            ScalarKind::UInt16 => "uint16",
            ScalarKind::Int32 => "int32",
            ScalarKind::UInt32 => "uint32",
            ScalarKind::Int64 => "int64",
            ScalarKind::UInt64 => "uint64",
            ScalarKind::Float32 => "float32",
            ScalarKind::Float64 => "float64",
            ScalarKind::String => "string",
            ScalarKind::WString => "wstring",
        }
    }

    /// Wire width of fixed-width kinds; `None` for strings.
    pub fn width(&self) -> Option<usize> {
        match self {
            ScalarKind::Bool
            | ScalarKind::Byte
            | ScalarKind::Char
            | ScalarKind::Int8
            | ScalarKind::UInt8 => Some(1),
            ScalarKind::Int16 | ScalarKind::UInt16 => Some(2),
            ScalarKind::Int32 | ScalarKind::UInt32 | ScalarKind::Float32 => Some(4),
            ScalarKind::Int64 | ScalarKind::UInt64 | ScalarKind::Float64 => Some(8),
            ScalarKind::String | ScalarKind::WString => None,
        }
    }
}

/// The kind of a single field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Scalar(ScalarKind),
    /// A nested message, decoded recursively.
    Nested(Arc<FieldLayout>),
    /// Length-prefixed sequence, optionally with an upper bound.
    Sequence {
        element: Box<FieldKind>,
        bound: Option<usize>,
    },
    /// Fixed-length array; no length prefix on the wire.
    Array { element: Box<FieldKind>, len: usize },
}

impl FieldKind {
    pub fn sequence(element: FieldKind) -> Self {
        FieldKind::Sequence {
            element: Box::new(element),
            bound: None,
        }
    }

    pub fn bounded_sequence(element: FieldKind, bound: usize) -> Self {
        FieldKind::Sequence {
            element: Box::new(element),
            bound: Some(bound),
        }
    }

    pub fn array(element: FieldKind, len: usize) -> Self {
        FieldKind::Array {
            element: Box::new(element),
            len,
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Scalar(kind) => f.write_str(kind.name()),
            FieldKind::Nested(layout) => f.write_str(&layout.type_name),
            FieldKind::Sequence {
                element,
                bound: None,
            } => write!(f, "{element}[]"),
            FieldKind::Sequence {
                element,
                bound: Some(bound),
            } => write!(f, "{element}[<={bound}]"),
            FieldKind::Array { element, len } => write!(f, "{element}[{len}]"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub kind: FieldKind,
}

/// Ordered `(name, kind)` pairs describing one message type.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldLayout {
    pub type_name: String,
    pub fields: Vec<Field>,
}

impl FieldLayout {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(Field {
            name: name.into(),
            kind,
        });
        self
    }

    pub fn scalar(self, name: impl Into<String>, kind: ScalarKind) -> Self {
        self.field(name, FieldKind::Scalar(kind))
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Resolves a logical type name (`pkg/msg/Name`) to its field layout.
pub trait SchemaRegistry: Send + Sync {
    /// Fails with [`Error::UnknownType`] when the type cannot be resolved.
    fn resolve(&self, type_name: &str) -> Result<Arc<FieldLayout>>;
}

impl<R: SchemaRegistry + ?Sized> SchemaRegistry for Arc<R> {
    fn resolve(&self, type_name: &str) -> Result<Arc<FieldLayout>> {
        (**self).resolve(type_name)
    }
}

impl<R: SchemaRegistry + ?Sized> SchemaRegistry for Box<R> {
    fn resolve(&self, type_name: &str) -> Result<Arc<FieldLayout>> {
        (**self).resolve(type_name)
    }
}

/// Registry backed by layouts registered in code.
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    layouts: HashMap<String, Arc<FieldLayout>>,
}

const STD_WRAPPERS: &[(&str, ScalarKind)] = &[
    ("Bool", ScalarKind::Bool),
    ("Byte", ScalarKind::Byte),
    ("Char", ScalarKind::Char),
    ("Float32", ScalarKind::Float32),
    ("Float64", ScalarKind::Float64),
    ("Int8", ScalarKind::Int8),
    ("UInt8", ScalarKind::UInt8),
    ("Int16", ScalarKind::Int16),
    ("UInt16", ScalarKind::UInt16),
    ("Int32", ScalarKind::Int32),
    ("UInt32", ScalarKind::UInt32),
    ("Int64", ScalarKind::Int64),
    ("UInt64", ScalarKind::UInt64),
    ("String", ScalarKind::String),
];

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with `builtin_interfaces`, `std_msgs/msg/Header`
    /// and the single-`data` wrappers from `std_msgs` and `example_interfaces`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        let time = Arc::new(
            FieldLayout::new("builtin_interfaces/msg/Time")
                .scalar("sec", ScalarKind::Int32)
                .scalar("nanosec", ScalarKind::UInt32),
        );
        registry.insert_arc(Arc::clone(&time));
        registry.insert(
            FieldLayout::new("builtin_interfaces/msg/Duration")
                .scalar("sec", ScalarKind::Int32)
                .scalar("nanosec", ScalarKind::UInt32),
        );
        registry.insert(
            FieldLayout::new("std_msgs/msg/Header")
                .field("stamp", FieldKind::Nested(time))
                .scalar("frame_id", ScalarKind::String),
        );
        for package in ["std_msgs", "example_interfaces"] {
            for (name, kind) in STD_WRAPPERS {
                registry.insert(FieldLayout::new(format!("{package}/msg/{name}")).scalar("data", *kind));
            }
            registry.insert(FieldLayout::new(format!("{package}/msg/Empty")));
        }
        registry
    }

    pub fn insert(&mut self, layout: FieldLayout) {
        self.insert_arc(Arc::new(layout));
    }

    pub fn insert_arc(&mut self, layout: Arc<FieldLayout>) {
        self.layouts.insert(layout.type_name.clone(), layout);
    }

    pub fn get(&self, type_name: &str) -> Option<Arc<FieldLayout>> {
        self.layouts.get(type_name).cloned()
    }

    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }
}

impl SchemaRegistry for StaticRegistry {
    fn resolve(&self, type_name: &str) -> Result<Arc<FieldLayout>> {
        self.get(type_name).ok_or_else(|| Error::UnknownType {
            type_name: type_name.to_string(),
        })
    }
}
