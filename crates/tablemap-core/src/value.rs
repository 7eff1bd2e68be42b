//! Column values and the conversion between Rust field types and values.
//!
//! A row carries only five scalar kinds: boolean, 64-bit integer, 64-bit
//! float, string and raw bytes. Every other Rust type still has a
//! [`FieldKind`] so that validation can name it, but it cannot produce a
//! [`Value`].

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

/// A scalar column value as stored in a row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Boolean(bool),
    Integer(i64),
    Double(f64),
    String(String),
    Binary(Vec<u8>),
}

impl Value {
    /// Short name of the value kind, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::Binary(_) => "binary",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view of the value; integers widen to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(n) => Some(*n as f64),
            Value::Double(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Binary(v)
    }
}

/// The native kind of a record field, derived from its Rust type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Bool,
    I8,
    I16,
    I32,
    I64,
    Isize,
    U8,
    U16,
    U32,
    U64,
    Usize,
    F32,
    F64,
    Char,
    String,
    Bytes,
    Sequence,
    Map,
    Optional,
    Struct,
}

impl FieldKind {
    /// Whether values of this kind can be written to a row column.
    pub fn is_persistable(self) -> bool {
        matches!(
            self,
            FieldKind::Bool | FieldKind::I64 | FieldKind::F64 | FieldKind::String | FieldKind::Bytes
        )
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::Bool => "bool",
            FieldKind::I8 => "i8",
            FieldKind::I16 => "i16",
            FieldKind::I32 => "i32",
            FieldKind::I64 => "i64",
            FieldKind::Isize => "isize",
            FieldKind::U8 => "u8",
            FieldKind::U16 => "u16",
            FieldKind::U32 => "u32",
            FieldKind::U64 => "u64",
            FieldKind::Usize => "usize",
            FieldKind::F32 => "f32",
            FieldKind::F64 => "f64",
            FieldKind::Char => "char",
            FieldKind::String => "String",
            FieldKind::Bytes => "Vec<u8>",
            FieldKind::Sequence => "sequence",
            FieldKind::Map => "map",
            FieldKind::Optional => "Option",
            FieldKind::Struct => "struct",
        };
        f.write_str(name)
    }
}

/// Conversion between a Rust field type and a column [`Value`].
///
/// The defaults describe an opaque nested structure: kind `Struct`, no column
/// value, and no assignment from a column. Nested record types opt in with an
/// empty impl (`impl FieldType for Address {}`), which lets validation report
/// them by name instead of failing to compile.
pub trait FieldType: Sized {
    const KIND: FieldKind = FieldKind::Struct;

    /// The column value for this field, or `None` if the kind is not
    /// persistable.
    fn to_value(&self) -> Option<Value> {
        None
    }

    /// Build a field value from a column value, coercing where lossless.
    fn from_value(_value: Value) -> Option<Self> {
        None
    }
}

impl FieldType for bool {
    const KIND: FieldKind = FieldKind::Bool;

    fn to_value(&self) -> Option<Value> {
        Some(Value::Boolean(*self))
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Boolean(b) => Some(b),
            _ => None,
        }
    }
}

impl FieldType for i64 {
    const KIND: FieldKind = FieldKind::I64;

    fn to_value(&self) -> Option<Value> {
        Some(Value::Integer(*self))
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Integer(n) => Some(n),
            _ => None,
        }
    }
}

impl FieldType for f64 {
    const KIND: FieldKind = FieldKind::F64;

    fn to_value(&self) -> Option<Value> {
        Some(Value::Double(*self))
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Double(n) => Some(n),
            Value::Integer(n) => Some(n as f64),
            _ => None,
        }
    }
}

impl FieldType for String {
    const KIND: FieldKind = FieldKind::String;

    fn to_value(&self) -> Option<Value> {
        Some(Value::String(self.clone()))
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

impl FieldType for Vec<u8> {
    const KIND: FieldKind = FieldKind::Bytes;

    fn to_value(&self) -> Option<Value> {
        Some(Value::Binary(self.clone()))
    }

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Binary(b) => Some(b),
            Value::String(s) => Some(s.into_bytes()),
            _ => None,
        }
    }
}

macro_rules! kind_only {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            impl FieldType for $ty {
                const KIND: FieldKind = FieldKind::$kind;
            }
        )*
    };
}

kind_only! {
    i8 => I8,
    i16 => I16,
    i32 => I32,
    isize => Isize,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    usize => Usize,
    f32 => F32,
    char => Char,
    Vec<String> => Sequence,
    Vec<i64> => Sequence,
    Vec<f64> => Sequence,
    Vec<bool> => Sequence,
}

impl<T: FieldType> FieldType for Option<T> {
    const KIND: FieldKind = FieldKind::Optional;
}

impl<V> FieldType for HashMap<String, V> {
    const KIND: FieldKind = FieldKind::Map;
}

impl<V> FieldType for BTreeMap<String, V> {
    const KIND: FieldKind = FieldKind::Map;
}
