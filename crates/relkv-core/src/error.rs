use crate::{
    codec::CodecError,
    db::{cursor::CursorError, index::IndexError, relation::RelationError, schema::SchemaError},
};
use std::fmt;
use thiserror::Error as ThisError;

///
/// InternalError
///
/// Every fallible engine operation returns this. Callers branch on `class`;
/// `detail` keeps the typed domain error that produced it.
///

#[derive(Debug, ThisError)]
#[error("{message}")]
pub struct InternalError {
    pub class: ErrorClass,
    pub origin: ErrorOrigin,
    pub message: String,

    /// Matches `origin` when present.
    pub detail: Option<ErrorDetail>,
}

impl InternalError {
    /// Store-origin corruption and invariant errors get a store detail.
    pub fn new(class: ErrorClass, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        let message = message.into();

        let detail = match (class, origin) {
            (ErrorClass::Corruption, ErrorOrigin::Store) => {
                Some(ErrorDetail::Store(StoreError::Corrupt {
                    message: message.clone(),
                }))
            }
            (ErrorClass::InvariantViolation, ErrorOrigin::Store) => {
                Some(ErrorDetail::Store(StoreError::InvariantViolation {
                    message: message.clone(),
                }))
            }
            _ => None,
        };

        Self {
            class,
            origin,
            message,
            detail,
        }
    }

    /// Construct a store-origin corruption error.
    pub(crate) fn store_corruption(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Corruption, ErrorOrigin::Store, message.into())
    }

    /// Construct a store-origin invariant violation.
    pub(crate) fn store_invariant(message: impl Into<String>) -> Self {
        Self::new(
            ErrorClass::InvariantViolation,
            ErrorOrigin::Store,
            message.into(),
        )
    }

    /// Construct a relation-origin not-found error for a key that must exist.
    pub fn key_not_found(relation: &str, key: impl Into<String>) -> Self {
        RelationError::KeyNotFound {
            relation: relation.to_string(),
            key: key.into(),
        }
        .into()
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self.detail,
            Some(ErrorDetail::Relation(RelationError::KeyNotFound { .. }))
        )
    }

    /// Structural modification detected mid-scan; callers may retry the scan.
    #[must_use]
    pub const fn is_iteration_invalidated(&self) -> bool {
        matches!(self.class, ErrorClass::IterationInvalidated)
    }

    #[must_use]
    pub const fn is_schema_violation(&self) -> bool {
        matches!(self.class, ErrorClass::SchemaViolation)
    }

    #[must_use]
    pub const fn is_index_fault(&self) -> bool {
        matches!(self.class, ErrorClass::IndexConsistency)
    }

    #[must_use]
    pub fn display_with_class(&self) -> String {
        format!("{}:{}: {}", self.origin, self.class, self.message)
    }
}

///
/// ErrorDetail
///
/// Structured, origin-specific error detail carried by [`InternalError`].
///

#[derive(Debug, ThisError)]
pub enum ErrorDetail {
    #[error("{0}")]
    Store(StoreError),

    #[error("{0}")]
    Codec(CodecError),

    #[error("{0}")]
    Schema(SchemaError),

    #[error("{0}")]
    Index(IndexError),

    #[error("{0}")]
    Cursor(CursorError),

    #[error("{0}")]
    Relation(RelationError),
}

///
/// StoreError
///
/// Detail for errors raised while reading raw store contents.
///

#[derive(Debug, ThisError)]
pub enum StoreError {
    #[error("store corruption: {message}")]
    Corrupt { message: String },

    #[error("store invariant violation: {message}")]
    InvariantViolation { message: String },
}

///
/// ErrorClass
/// What kind of failure happened, independent of where.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorClass {
    Corruption,
    NotFound,
    Internal,
    Conflict,
    Unsupported,
    InvariantViolation,
    SchemaViolation,
    IndexConsistency,
    IterationInvalidated,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Corruption => "corruption",
            Self::NotFound => "not_found",
            Self::Internal => "internal",
            Self::Conflict => "conflict",
            Self::Unsupported => "unsupported",
            Self::InvariantViolation => "invariant_violation",
            Self::SchemaViolation => "schema_violation",
            Self::IndexConsistency => "index_consistency",
            Self::IterationInvalidated => "iteration_invalidated",
        };
        write!(f, "{label}")
    }
}

///
/// ErrorOrigin
/// Engine layer that raised the error.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorOrigin {
    Codec,
    Store,
    Schema,
    Index,
    Cursor,
    Relation,
}

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Codec => "codec",
            Self::Store => "store",
            Self::Schema => "schema",
            Self::Index => "index",
            Self::Cursor => "cursor",
            Self::Relation => "relation",
        };
        write!(f, "{label}")
    }
}

///
/// TESTS
///
