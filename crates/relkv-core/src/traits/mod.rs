//! Module: traits
//! Responsibility: the typed surface records and their fields implement.
//! Does not own: byte encodings; records only exchange `Value`s.
//! Boundary: `record!` and `record_enum!` generate these impls.

use crate::{
    codec::CodecError,
    db::field::FieldKind,
    model::RelationModel,
    value::Value,
};
use std::fmt::Debug;

// ============================================================================
// RECORDS
// ============================================================================

///
/// Record
///
/// One row type of a relation. `Default` supplies the values of fields a
/// stored row predates.
///

pub trait Record: Clone + Debug + Default + 'static {
    /// Declared shape of the relation this record belongs to.
    fn model() -> RelationModel;

    /// Current value of a row field, or `None` for an unknown name.
    fn get_value(&self, field: &str) -> Option<Value>;

    /// Assign a row field. Returns `Ok(false)` for an unknown name.
    fn set_value(&mut self, field: &str, value: Value) -> Result<bool, CodecError>;
}

// ============================================================================
// FIELD VALUES
// ============================================================================

///
/// FieldValue
///
/// Conversion between a Rust field type and its declared kind.
///

pub trait FieldValue: Sized {
    fn kind() -> FieldKind;

    fn to_value(&self) -> Value;

    fn from_value(value: Value) -> Result<Self, CodecError>;
}

fn unexpected(kind: &'static str, value: &Value) -> CodecError {
    CodecError::invalid_value(kind, format!("unexpected {} value", value.label()))
}

impl FieldValue for bool {
    fn kind() -> FieldKind {
        FieldKind::Bool
    }

    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }

    fn from_value(value: Value) -> Result<Self, CodecError> {
        match value {
            Value::Bool(v) => Ok(v),
            other => Err(unexpected("bool", &other)),
        }
    }
}

macro_rules! impl_signed_field_value {
    ($($ty:ty),*) => {
        $(
            impl FieldValue for $ty {
                fn kind() -> FieldKind {
                    FieldKind::Int
                }

                fn to_value(&self) -> Value {
                    Value::Int(i64::from(*self))
                }

                fn from_value(value: Value) -> Result<Self, CodecError> {
                    match value {
                        Value::Int(v) => <$ty>::try_from(v)
                            .map_err(|_| CodecError::invalid_value("int", format!("{v} out of range"))),
                        other => Err(unexpected("int", &other)),
                    }
                }
            }
        )*
    };
}

macro_rules! impl_unsigned_field_value {
    ($($ty:ty),*) => {
        $(
            impl FieldValue for $ty {
                fn kind() -> FieldKind {
                    FieldKind::Uint
                }

                fn to_value(&self) -> Value {
                    Value::Uint(u64::from(*self))
                }

                fn from_value(value: Value) -> Result<Self, CodecError> {
                    match value {
                        Value::Uint(v) => <$ty>::try_from(v)
                            .map_err(|_| CodecError::invalid_value("uint", format!("{v} out of range"))),
                        other => Err(unexpected("uint", &other)),
                    }
                }
            }
        )*
    };
}

impl_signed_field_value!(i16, i32, i64);
impl_unsigned_field_value!(u16, u32, u64);

impl FieldValue for f64 {
    fn kind() -> FieldKind {
        FieldKind::Float64
    }

    fn to_value(&self) -> Value {
        Value::Float64(*self)
    }

    fn from_value(value: Value) -> Result<Self, CodecError> {
        match value {
            Value::Float64(v) => Ok(v),
            other => Err(unexpected("float64", &other)),
        }
    }
}

impl FieldValue for String {
    fn kind() -> FieldKind {
        FieldKind::Text
    }

    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }

    fn from_value(value: Value) -> Result<Self, CodecError> {
        match value {
            Value::Text(v) => Ok(v),
            other => Err(unexpected("text", &other)),
        }
    }
}

impl<T: FieldValue> FieldValue for Option<T> {
    fn kind() -> FieldKind {
        FieldKind::optional(T::kind())
    }

    fn to_value(&self) -> Value {
        self.as_ref().map_or(Value::Null, FieldValue::to_value)
    }

    fn from_value(value: Value) -> Result<Self, CodecError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: FieldValue> FieldValue for Vec<T> {
    fn kind() -> FieldKind {
        FieldKind::list(T::kind())
    }

    fn to_value(&self) -> Value {
        Value::List(self.iter().map(FieldValue::to_value).collect())
    }

    fn from_value(value: Value) -> Result<Self, CodecError> {
        match value {
            Value::List(items) => items.into_iter().map(T::from_value).collect(),
            other => Err(unexpected("list", &other)),
        }
    }
}

///
/// Blob
///
/// Opaque byte field.
///

#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct Blob(pub Vec<u8>);

impl FieldValue for Blob {
    fn kind() -> FieldKind {
        FieldKind::Blob
    }

    fn to_value(&self) -> Value {
        Value::Blob(self.0.clone())
    }

    fn from_value(value: Value) -> Result<Self, CodecError> {
        match value {
            Value::Blob(bytes) => Ok(Self(bytes)),
            other => Err(unexpected("blob", &other)),
        }
    }
}

///
/// CollectionId
///
/// Reference to a nested collection owned by the row. `0` means none; the
/// collection is freed together with the row that last references it.
///

#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct CollectionId(pub u64);

impl CollectionId {
    #[must_use]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl FieldValue for CollectionId {
    fn kind() -> FieldKind {
        FieldKind::Dictionary
    }

    fn to_value(&self) -> Value {
        if self.is_none() {
            Value::Null
        } else {
            Value::Collection(self.0)
        }
    }

    fn from_value(value: Value) -> Result<Self, CodecError> {
        match value {
            Value::Null => Ok(Self(0)),
            Value::Collection(id) => Ok(Self(id)),
            other => Err(unexpected("dictionary", &other)),
        }
    }
}

///
/// TESTS
///
