//! Schema-versioned relations over an ordered key-value store: row codecs,
//! secondary indexes kept in sync by byte splicing, optimistic scans and
//! cascade freeing of nested collections.

#[macro_use]
mod macros;

// public exports are one module level down
pub mod codec;
pub mod db;
pub mod error;
pub mod kv;
pub mod model;
pub mod obs;
pub mod traits;
pub mod value;

pub use relkv_config::{DbConfig, RebuildStrategy};

///
/// Prelude
///
/// Vocabulary for declaring records and working with relations.
///

pub mod prelude {
    pub use crate::{
        DbConfig,
        db::{NestedCollection, Relation, ScanOrder},
        error::InternalError,
        kv::{KeyValueTransaction, MemoryStore},
        traits::{Blob, CollectionId, FieldValue, Record},
        value::Value,
    };
}
