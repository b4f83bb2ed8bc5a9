//! Module: value
//! Responsibility: the dynamic field value exchanged between records and
//! field handlers.
//! Does not own: byte encodings.

use std::fmt;

///
/// Value
///
/// One field's runtime value. `Null` stands for an absent optional, an
/// unset collection reference, or an absent embedded object.
///

#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float64(f64),
    Text(String),
    Blob(Vec<u8>),
    Enum(u64),
    List(Vec<Value>),
    /// Id of a nested collection owned by the row.
    Collection(u64),
    Object(ObjectValue),
}

impl Value {
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Short label used in diagnostics.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Uint(_) => "uint",
            Self::Float64(_) => "float64",
            Self::Text(_) => "text",
            Self::Blob(_) => "blob",
            Self::Enum(_) => "enum",
            Self::List(_) => "list",
            Self::Collection(_) => "collection",
            Self::Object(_) => "object",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Uint(v) | Self::Enum(v) => write!(f, "{v}"),
            Self::Float64(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v:?}"),
            Self::Blob(v) => write!(f, "blob[{}]", v.len()),
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Self::Collection(id) => write!(f, "collection#{id}"),
            Self::Object(ObjectValue::Inline(fields)) => write!(f, "object({} fields)", fields.len()),
            Self::Object(ObjectValue::SameAs(ordinal)) => write!(f, "object(same as #{ordinal})"),
        }
    }
}

///
/// ObjectValue
///
/// An embedded sub-record. Inline instances get ordinals 1, 2, ... in the
/// order they are written within one row value; `SameAs` refers back to an
/// earlier inline instance of the same value instead of repeating it.
///

#[derive(Clone, Debug, PartialEq)]
pub enum ObjectValue {
    Inline(Vec<Value>),
    SameAs(u32),
}

/// Render a key tuple for error messages.
#[must_use]
pub fn format_key(values: &[Value]) -> String {
    let parts: Vec<String> = values.iter().map(ToString::to_string).collect();

    format!("[{}]", parts.join(", "))
}
