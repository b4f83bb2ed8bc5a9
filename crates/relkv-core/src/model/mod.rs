//! Module: model
//! Responsibility: the declared, in-memory shape of one relation.
//! Does not own: validation against persisted history.
//! Boundary: `Record::model()` is the single source of declared shape.

use crate::db::field::FieldKind;
use std::fmt::{self, Display};

///
/// RelationModel
///
/// Declared fields, primary key, apart fields and secondary indexes of a
/// relation.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RelationModel {
    pub name: String,
    pub fields: Vec<FieldModel>,
    pub primary_key: Vec<String>,

    /// Key fields supplied by the relation handle instead of the row. They
    /// must be the leading primary-key fields.
    pub apart_fields: Vec<FieldModel>,

    pub indexes: Vec<IndexModel>,
}

impl RelationModel {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fields: Vec::new(),
            primary_key: Vec::new(),
            apart_fields: Vec::new(),
            indexes: Vec::new(),
        }
    }

    #[must_use]
    pub fn field(mut self, name: &str, kind: FieldKind) -> Self {
        self.fields.push(FieldModel::new(name, kind));
        self
    }

    #[must_use]
    pub fn apart(mut self, name: &str, kind: FieldKind) -> Self {
        self.apart_fields.push(FieldModel::new(name, kind));
        self
    }

    #[must_use]
    pub fn primary_key(mut self, fields: &[&str]) -> Self {
        self.primary_key = fields.iter().map(ToString::to_string).collect();
        self
    }

    #[must_use]
    pub fn index(mut self, name: &str, fields: &[&str]) -> Self {
        self.indexes.push(IndexModel {
            name: name.to_string(),
            fields: fields.iter().map(ToString::to_string).collect(),
        });
        self
    }

    /// Apart fields first, then row fields, in declaration order.
    pub fn all_fields(&self) -> impl Iterator<Item = &FieldModel> {
        self.apart_fields.iter().chain(&self.fields)
    }

    #[must_use]
    pub fn field_kind(&self, name: &str) -> Option<&FieldKind> {
        self.all_fields()
            .find(|field| field.name == name)
            .map(|field| &field.kind)
    }

    #[must_use]
    pub fn is_apart(&self, name: &str) -> bool {
        self.apart_fields.iter().any(|field| field.name == name)
    }
}

///
/// FieldModel
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FieldModel {
    pub name: String,
    pub kind: FieldKind,
}

impl FieldModel {
    #[must_use]
    pub fn new(name: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
        }
    }
}

///
/// IndexModel
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IndexModel {
    pub name: String,
    pub fields: Vec<String>,
}

impl Display for IndexModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.fields.join(", "))
    }
}
