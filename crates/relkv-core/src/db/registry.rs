//! Relation name registry.
//!
//! Maps relation names to the numeric ids every relation key carries. Ids
//! are allocated once and never reused.

use crate::{
    codec::{ByteReader, ByteWriter},
    db::prefix,
    error::InternalError,
    kv::KeyValueTransaction,
};
use tracing::info;

fn name_key(name: &str) -> Vec<u8> {
    let mut w = ByteWriter::with_prefix(prefix::RELATION_NAMES);
    w.write_str(name);
    w.into_bytes()
}

/// Look up the id of `name`, allocating the next free id on first use.
pub fn resolve_relation_id(
    tr: &mut dyn KeyValueTransaction,
    name: &str,
) -> Result<u64, InternalError> {
    let key = name_key(name);
    tr.set_prefix(prefix::RELATION_NAMES);
    if tr.find_exact(&key) {
        let value = tr.value().unwrap_or_default();
        return Ok(ByteReader::new(value).read_vuint()?);
    }

    let next = relation_names(tr)?
        .iter()
        .map(|(_, id)| *id)
        .max()
        .map_or(1, |max| max + 1);

    let mut value = ByteWriter::new();
    value.write_vuint(next);
    tr.create_or_update(&key, &value.into_bytes());
    info!(relation = name, id = next, "relation registered");

    Ok(next)
}

/// Every registered relation with its id, in name-key order.
pub fn relation_names(
    tr: &mut dyn KeyValueTransaction,
) -> Result<Vec<(String, u64)>, InternalError> {
    tr.set_prefix(prefix::RELATION_NAMES);

    let mut names = Vec::new();
    let mut more = tr.find_first();
    while more {
        let (Some(key), Some(value)) = (tr.key(), tr.value()) else {
            return Err(InternalError::store_invariant("positioned cursor returned no key"));
        };
        let suffix = key.get(prefix::RELATION_NAMES.len()..).unwrap_or_default();
        let name = ByteReader::new(suffix).read_str()?.to_string();
        let id = ByteReader::new(value).read_vuint()?;
        names.push((name, id));
        more = tr.find_next();
    }

    Ok(names)
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryStore;

    #[test]
    fn ids_are_allocated_once_per_name() {
        let mut tr = MemoryStore::new();

        let person = resolve_relation_id(&mut tr, "Person").expect("person");
        let job = resolve_relation_id(&mut tr, "Job").expect("job");
        assert_eq!((person, job), (1, 2));

        assert_eq!(resolve_relation_id(&mut tr, "Person").expect("again"), 1);
        assert_eq!(resolve_relation_id(&mut tr, "Zone").expect("zone"), 3);
    }

    #[test]
    fn names_are_listed_with_ids() {
        let mut tr = MemoryStore::new();
        resolve_relation_id(&mut tr, "b").expect("b");
        resolve_relation_id(&mut tr, "a").expect("a");

        let names = relation_names(&mut tr).expect("names");
        assert_eq!(names, vec![("a".to_string(), 2), ("b".to_string(), 1)]);
    }
}
