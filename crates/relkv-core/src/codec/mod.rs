//! Module: codec
//! Responsibility: byte-level building blocks shared by every field handler.
//! Does not own: field semantics or row layouts.
//! Boundary: handlers read through `ByteReader` and write through `ByteWriter`.

mod buffer;
pub(crate) mod ordered;
pub(crate) mod varint;

use crate::error::{ErrorClass, ErrorDetail, ErrorOrigin, InternalError};
use thiserror::Error as ThisError;

pub use buffer::{ByteReader, ByteWriter};

///
/// CodecError
///
/// Failures raised while encoding or decoding field bytes.
///

#[derive(Debug, ThisError)]
pub enum CodecError {
    #[error("unexpected end of buffer: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEof { needed: usize, remaining: usize },

    #[error("unknown handler type tag {0}")]
    UnknownTag(u8),

    #[error("invalid utf-8 in encoded text")]
    InvalidUtf8,

    #[error("corrupted encoding: {0}")]
    Corrupt(String),

    #[error("value does not fit field kind '{kind}': {message}")]
    InvalidValue { kind: &'static str, message: String },

    #[error("missing value for field '{0}'")]
    MissingField(String),

    #[error("unsupported codec operation: {0}")]
    Unsupported(String),
}

impl CodecError {
    pub(crate) fn invalid_value(kind: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            kind,
            message: message.into(),
        }
    }

    pub(crate) fn corrupt(message: impl Into<String>) -> Self {
        Self::Corrupt(message.into())
    }
}

impl From<CodecError> for InternalError {
    fn from(err: CodecError) -> Self {
        let class = match err {
            CodecError::UnexpectedEof { .. }
            | CodecError::UnknownTag(_)
            | CodecError::InvalidUtf8
            | CodecError::Corrupt(_) => ErrorClass::Corruption,
            CodecError::InvalidValue { .. } | CodecError::MissingField(_) => {
                ErrorClass::InvariantViolation
            }
            CodecError::Unsupported(_) => ErrorClass::Unsupported,
        };

        Self {
            class,
            origin: ErrorOrigin::Codec,
            message: err.to_string(),
            detail: Some(ErrorDetail::Codec(err)),
        }
    }
}
