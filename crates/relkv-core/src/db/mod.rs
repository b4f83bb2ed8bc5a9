//! Module: db
//! Responsibility: relations over the ordered store, from schema versions
//! down to key layouts, secondary indexes and nested collections.
//! Does not own: the store itself (`kv`) or value representations (`value`).

pub mod collection;
pub mod cursor;
pub mod field;
pub mod index;
pub mod prefix;
pub mod registry;
pub mod relation;
pub mod schema;

pub(crate) mod free;
pub(crate) mod row;

pub use collection::{CollectionIter, NestedCollection};
pub use cursor::ScanOrder;
pub use registry::{relation_names, resolve_relation_id};
pub use relation::{IndexIter, Relation, RowIter};
pub use schema::RelationVersion;
