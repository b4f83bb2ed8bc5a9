use super::*;
use crate::{
    codec::CodecError,
    db::{
        NestedCollection,
        field::{FieldKind, ObjectShape},
    },
    kv::MemoryStore,
    obs::{metrics_report, metrics_reset_all},
    traits::CollectionId,
    value::ObjectValue,
};

crate::record! {
    struct Person in "Person" {
        id: u64,
        name: String,
        age: u32,
    }
    primary_key(id);
    index by_name(name);
    index by_age(age);
}

crate::record! {
    struct PersonName in "Person" {
        id: u64,
        name: String,
    }
    primary_key(id);
}

crate::record! {
    struct Item in "Item" {
        id: u64,
        label: String,
    }
    primary_key(tenant, id);
    apart(tenant: u64);
    index by_label(label);
}

crate::record! {
    struct Basket in "Basket" {
        id: u64,
        items: CollectionId,
    }
    primary_key(id);
}

///
/// Shelves
/// List of embedded shelf objects; entries may refer back to an earlier one.
///

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Shelves(pub Vec<Value>);

impl FieldValue for Shelves {
    fn kind() -> FieldKind {
        FieldKind::list(FieldKind::Object(ObjectShape::new(
            "Shelf",
            vec![("label", FieldKind::Text), ("items", FieldKind::Dictionary)],
        )))
    }

    fn to_value(&self) -> Value {
        Value::List(self.0.clone())
    }

    fn from_value(value: Value) -> Result<Self, CodecError> {
        match value {
            Value::List(items) => Ok(Self(items)),
            other => Err(CodecError::invalid_value("shelves", other.label())),
        }
    }
}

crate::record! {
    struct Wall in "Wall" {
        id: u64,
        shelves: Shelves,
        label: String,
    }
    primary_key(id);
    index by_label(label);
}

fn person(id: u64, name: &str, age: u32) -> Person {
    Person {
        id,
        name: name.into(),
        age,
    }
}

fn open<R: Record>(tr: &mut MemoryStore) -> Relation<R> {
    Relation::open(tr, &DbConfig::default()).expect("open relation")
}

fn seeded(tr: &mut MemoryStore) -> Relation<Person> {
    let people = open::<Person>(tr);
    for row in [
        person(1, "ada", 36),
        person(2, "bob", 25),
        person(3, "cyd", 36),
        person(4, "dee", 41),
    ] {
        people.insert(tr, &row).expect("insert");
    }
    people
}

fn ids(rows: &[Person]) -> Vec<u64> {
    rows.iter().map(|row| row.id).collect()
}

// ----------------------------------------------------------------------
// Point operations
// ----------------------------------------------------------------------

#[test]
fn insert_then_find() {
    let mut tr = MemoryStore::new();
    let people = seeded(&mut tr);

    let found = people.find_by_id(&mut tr, &[Value::Uint(2)]).expect("find");
    assert_eq!(found, Some(person(2, "bob", 25)));
    assert!(people.contains(&mut tr, &[Value::Uint(4)]).expect("contains"));
    assert!(people.find_by_id(&mut tr, &[Value::Uint(9)]).expect("find").is_none());
    assert_eq!(people.count(&mut tr).expect("count"), 4);
}

#[test]
fn insert_of_existing_key_conflicts() {
    let mut tr = MemoryStore::new();
    let people = seeded(&mut tr);

    let err = people.insert(&mut tr, &person(1, "eve", 20)).expect_err("conflict");
    assert_eq!(err.class, ErrorClass::Conflict);
    assert_eq!(err.origin, ErrorOrigin::Relation);
    assert!(err.message.contains("[1]"), "{}", err.message);
}

#[test]
fn update_of_missing_key_is_not_found() {
    let mut tr = MemoryStore::new();
    let people = seeded(&mut tr);

    let err = people.update(&mut tr, &person(7, "gus", 20)).expect_err("missing");
    assert!(err.is_not_found());

    let err = people
        .find_by_id_or_fail(&mut tr, &[Value::Uint(7)])
        .expect_err("missing");
    assert!(err.is_not_found());
}

#[test]
fn upsert_reports_creation() {
    let mut tr = MemoryStore::new();
    let people = seeded(&mut tr);

    assert!(people.upsert(&mut tr, &person(5, "eve", 30)).expect("create"));
    assert!(!people.upsert(&mut tr, &person(5, "eve", 31)).expect("overwrite"));
    assert_eq!(
        people.find_by_id_or_fail(&mut tr, &[Value::Uint(5)]).expect("find").age,
        31
    );
}

#[test]
fn key_arity_is_checked() {
    let mut tr = MemoryStore::new();
    let people = seeded(&mut tr);

    let err = people
        .find_by_id(&mut tr, &[Value::Uint(1), Value::Uint(2)])
        .expect_err("arity");
    assert_eq!(err.class, ErrorClass::Unsupported);
}

#[test]
fn remove_by_id_erases_index_entries() {
    let mut tr = MemoryStore::new();
    let people = seeded(&mut tr);

    assert!(people.remove_by_id(&mut tr, &[Value::Uint(3)]).expect("remove"));
    assert!(!people.remove_by_id(&mut tr, &[Value::Uint(3)]).expect("again"));
    assert!(
        people
            .remove_by_id_or_fail(&mut tr, &[Value::Uint(3)])
            .expect_err("gone")
            .is_not_found()
    );

    assert_eq!(people.count_by(&mut tr, "by_age", &[Value::Uint(36)]).expect("count"), 1);
    assert!(!people.any_by(&mut tr, "by_name", &[Value::Text("cyd".into())]).expect("any"));
}

// ----------------------------------------------------------------------
// Secondary indexes
// ----------------------------------------------------------------------

#[test]
fn update_moves_changed_index_entries() {
    let mut tr = MemoryStore::new();
    let people = seeded(&mut tr);
    let before = people.modification_count(&tr);

    people.update(&mut tr, &person(2, "bea", 25)).expect("update");
    assert!(people.modification_count(&tr) > before);

    assert!(!people.any_by(&mut tr, "by_name", &[Value::Text("bob".into())]).expect("old"));
    let found = people
        .find_by(&mut tr, "by_name", &[Value::Text("bea".into())])
        .expect("find");
    assert_eq!(found.map(|row| row.id), Some(2));
}

#[test]
fn update_without_key_change_is_not_structural() {
    let mut tr = MemoryStore::new();
    let people = open::<PersonName>(&mut tr);
    people
        .insert(&mut tr, &PersonName { id: 1, name: "a".into() })
        .expect("insert");
    let before = people.modification_count(&tr);

    people
        .update(&mut tr, &PersonName { id: 1, name: "b".into() })
        .expect("update");
    assert_eq!(people.modification_count(&tr), before);
}

#[test]
fn list_by_index_orders_by_index_fields() {
    let mut tr = MemoryStore::new();
    let people = seeded(&mut tr);

    let by_age = people
        .list_by("by_age", &[], .., ScanOrder::Ascending)
        .expect("scan")
        .collect(&mut tr)
        .expect("rows");
    assert_eq!(ids(&by_age), vec![2, 1, 3, 4]);

    let older = people
        .list_by("by_age", &[], Value::Uint(36).., ScanOrder::Descending)
        .expect("scan")
        .collect(&mut tr)
        .expect("rows");
    assert_eq!(ids(&older), vec![4, 3, 1]);

    let exact = people
        .list_by("by_age", &[Value::Uint(36)], .., ScanOrder::Ascending)
        .expect("scan")
        .collect(&mut tr)
        .expect("rows");
    assert_eq!(ids(&exact), vec![1, 3]);
}

#[test]
fn find_by_rejects_ambiguous_matches() {
    let mut tr = MemoryStore::new();
    let people = seeded(&mut tr);

    let err = people
        .find_by(&mut tr, "by_age", &[Value::Uint(36)])
        .expect_err("ambiguous");
    assert_eq!(err.class, ErrorClass::Conflict);

    assert!(
        people
            .find_by(&mut tr, "by_age", &[Value::Uint(99)])
            .expect("none")
            .is_none()
    );
    assert!(
        people
            .find_by_or_fail(&mut tr, "by_age", &[Value::Uint(99)])
            .expect_err("none")
            .is_not_found()
    );
}

#[test]
fn unknown_index_is_unsupported() {
    let mut tr = MemoryStore::new();
    let people = seeded(&mut tr);

    let err = people.count_by(&mut tr, "by_shoe", &[]).expect_err("unknown");
    assert_eq!(err.class, ErrorClass::Unsupported);
}

// ----------------------------------------------------------------------
// Primary-key scans
// ----------------------------------------------------------------------

#[test]
fn list_by_id_honours_bounds_and_order() {
    let mut tr = MemoryStore::new();
    let people = seeded(&mut tr);

    let all = people.list().expect("scan").collect(&mut tr).expect("rows");
    assert_eq!(ids(&all), vec![1, 2, 3, 4]);

    let middle = people
        .list_by_id(&[], Value::Uint(2)..Value::Uint(4), ScanOrder::Ascending)
        .expect("scan")
        .collect(&mut tr)
        .expect("rows");
    assert_eq!(ids(&middle), vec![2, 3]);

    let tail = people
        .list_by_id(&[], (Bound::Excluded(Value::Uint(2)), Bound::Unbounded), ScanOrder::Descending)
        .expect("scan")
        .collect(&mut tr)
        .expect("rows");
    assert_eq!(ids(&tail), vec![4, 3]);
}

#[test]
fn projection_reads_a_narrower_shape() {
    let mut tr = MemoryStore::new();
    let people = seeded(&mut tr);

    let names = people
        .list_as::<PersonName>()
        .expect("scan")
        .collect(&mut tr)
        .expect("rows");
    let names: Vec<_> = names.into_iter().map(|row| row.name).collect();
    assert_eq!(names, vec!["ada", "bob", "cyd", "dee"]);
}

#[test]
fn remove_range_by_id_clears_rows_and_indexes() {
    let mut tr = MemoryStore::new();
    let people = seeded(&mut tr);

    assert_eq!(people.remove_range_by_id(&mut tr, &[]).expect("remove"), 4);
    assert_eq!(people.count(&mut tr).expect("count"), 0);
    assert_eq!(people.count_by(&mut tr, "by_name", &[]).expect("count"), 0);
}

#[test]
fn partial_remove_takes_the_lowest_keys_first() {
    let mut tr = MemoryStore::new();
    let people = seeded(&mut tr);

    assert_eq!(people.remove_by_id_partial(&mut tr, &[], 0).expect("none"), 0);
    assert_eq!(people.remove_by_id_partial(&mut tr, &[], 3).expect("remove"), 3);

    let left = people.list().expect("scan").collect(&mut tr).expect("rows");
    assert_eq!(ids(&left), vec![4]);
    assert_eq!(people.count_by(&mut tr, "by_name", &[]).expect("count"), 1);
    assert_eq!(people.remove_by_id_partial(&mut tr, &[], 10).expect("rest"), 1);
}

#[test]
fn range_bounded_count_any_and_remove_by_id() {
    let mut tr = MemoryStore::new();
    let people = seeded(&mut tr);

    let count = people
        .count_by_id(&mut tr, &[], Value::Uint(2)..Value::Uint(4))
        .expect("count");
    assert_eq!(count, 2);
    assert_eq!(people.count_by_id(&mut tr, &[], ..).expect("all"), 4);
    let past_end = (Bound::Excluded(Value::Uint(4)), Bound::Unbounded);
    assert!(!people.any_by_id(&mut tr, &[], past_end).expect("any"));

    let removed = people
        .remove_by_id_range(&mut tr, &[], Value::Uint(2)..=Value::Uint(3))
        .expect("remove");
    assert_eq!(removed, 2);

    let left = people.list().expect("scan").collect(&mut tr).expect("rows");
    assert_eq!(ids(&left), vec![1, 4]);
    assert_eq!(people.count_by(&mut tr, "by_age", &[Value::Uint(36)]).expect("36"), 1);
    assert!(!people.any_by(&mut tr, "by_name", &[Value::Text("bob".into())]).expect("bob"));
}

#[test]
fn range_bounded_count_and_any_by_index() {
    let mut tr = MemoryStore::new();
    let people = seeded(&mut tr);

    let thirties = people
        .count_by_range(&mut tr, "by_age", &[], Value::Uint(30)..Value::Uint(40))
        .expect("count");
    assert_eq!(thirties, 2);

    let from_b = people
        .count_by_range(&mut tr, "by_name", &[], Value::Text("b".into())..)
        .expect("count");
    assert_eq!(from_b, 3);

    assert!(people
        .any_by_range(&mut tr, "by_age", &[], ..=Value::Uint(25))
        .expect("young"));
    assert!(!people
        .any_by_range(&mut tr, "by_age", &[], Value::Uint(50)..)
        .expect("old"));
}

// ----------------------------------------------------------------------
// Apart fields
// ----------------------------------------------------------------------

#[test]
fn apart_fields_partition_rows() {
    let mut tr = MemoryStore::new();
    let mut items = open::<Item>(&mut tr);

    let err = items
        .insert(&mut tr, &Item { id: 1, label: "x".into() })
        .expect_err("apart unset");
    assert_eq!(err.class, ErrorClass::InvariantViolation);

    items.set_apart_field("tenant", 7u64).expect("tenant");
    items.insert(&mut tr, &Item { id: 1, label: "x".into() }).expect("insert");
    items.insert(&mut tr, &Item { id: 2, label: "y".into() }).expect("insert");

    items.set_apart_field("tenant", 8u64).expect("tenant");
    items.insert(&mut tr, &Item { id: 1, label: "z".into() }).expect("insert");
    assert_eq!(items.count(&mut tr).expect("count"), 1);
    assert_eq!(
        items
            .find_by_or_fail(&mut tr, "by_label", &[Value::Text("z".into())])
            .expect("find")
            .id,
        1
    );
    assert!(!items.any_by(&mut tr, "by_label", &[Value::Text("x".into())]).expect("any"));

    items.set_apart_field("tenant", 7u64).expect("tenant");
    assert_eq!(items.count(&mut tr).expect("count"), 2);

    let err = items.set_apart_field("region", 1u64).expect_err("unknown");
    assert_eq!(err.class, ErrorClass::Unsupported);
}

// ----------------------------------------------------------------------
// Cascade free
// ----------------------------------------------------------------------

fn filled_collection(tr: &mut MemoryStore) -> NestedCollection {
    let collection = NestedCollection::create(tr).expect("collection");
    collection.insert(tr, b"k1", b"v");
    collection.insert(tr, b"k2", b"v");
    collection
}

#[test]
fn removing_a_row_frees_its_collection() {
    let mut tr = MemoryStore::new();
    let baskets = open::<Basket>(&mut tr);
    let collection = filled_collection(&mut tr);

    baskets
        .insert(&mut tr, &Basket { id: 1, items: collection.id() })
        .expect("insert");
    baskets.remove_by_id(&mut tr, &[Value::Uint(1)]).expect("remove");

    assert_eq!(collection.count(&mut tr), 0);
}

#[test]
fn replacing_a_collection_frees_the_old_one() {
    let mut tr = MemoryStore::new();
    let baskets = open::<Basket>(&mut tr);
    let old = filled_collection(&mut tr);
    let new = filled_collection(&mut tr);

    baskets
        .insert(&mut tr, &Basket { id: 1, items: old.id() })
        .expect("insert");
    baskets
        .update(&mut tr, &Basket { id: 1, items: new.id() })
        .expect("update");

    assert_eq!(old.count(&mut tr), 0);
    assert_eq!(new.count(&mut tr), 2);

    // keeping the same collection frees nothing
    baskets
        .update(&mut tr, &Basket { id: 1, items: new.id() })
        .expect("update");
    assert_eq!(new.count(&mut tr), 2);
}

#[test]
fn shallow_update_keeps_the_old_collection() {
    let mut tr = MemoryStore::new();
    let baskets = open::<Basket>(&mut tr);
    let old = filled_collection(&mut tr);

    baskets
        .insert(&mut tr, &Basket { id: 1, items: old.id() })
        .expect("insert");
    baskets
        .shallow_update(&mut tr, &Basket { id: 1, items: CollectionId(0) })
        .expect("update");

    assert_eq!(old.count(&mut tr), 2);
}

#[test]
fn shallow_removes_keep_collections() {
    let mut tr = MemoryStore::new();
    let baskets = open::<Basket>(&mut tr);
    let first = filled_collection(&mut tr);
    let second = filled_collection(&mut tr);

    baskets
        .insert(&mut tr, &Basket { id: 1, items: first.id() })
        .expect("insert");
    baskets
        .insert(&mut tr, &Basket { id: 2, items: second.id() })
        .expect("insert");

    assert!(baskets.shallow_remove_by_id(&mut tr, &[Value::Uint(1)]).expect("remove"));
    assert_eq!(first.count(&mut tr), 2);

    assert_eq!(baskets.shallow_remove_range_by_id(&mut tr, &[]).expect("range"), 1);
    assert_eq!(second.count(&mut tr), 2);
    assert_eq!(baskets.count(&mut tr).expect("count"), 0);
}

#[test]
fn partial_remove_frees_collections_of_removed_rows_only() {
    let mut tr = MemoryStore::new();
    let baskets = open::<Basket>(&mut tr);
    let first = filled_collection(&mut tr);
    let second = filled_collection(&mut tr);

    baskets
        .insert(&mut tr, &Basket { id: 1, items: first.id() })
        .expect("insert");
    baskets
        .insert(&mut tr, &Basket { id: 2, items: second.id() })
        .expect("insert");

    assert_eq!(baskets.remove_by_id_partial(&mut tr, &[], 1).expect("remove"), 1);
    assert_eq!(first.count(&mut tr), 0);
    assert_eq!(second.count(&mut tr), 2);
}

// ----------------------------------------------------------------------
// Embedded objects
// ----------------------------------------------------------------------

fn shared_shelves(collection: &NestedCollection) -> Shelves {
    Shelves(vec![
        Value::Object(ObjectValue::Inline(vec![
            Value::Text("top".into()),
            Value::Collection(collection.id().0),
        ])),
        Value::Object(ObjectValue::SameAs(1)),
    ])
}

#[test]
fn shared_object_round_trips_and_is_skipped_by_index_splicing() {
    let mut tr = MemoryStore::new();
    let walls = open::<Wall>(&mut tr);
    let collection = filled_collection(&mut tr);
    let shelves = shared_shelves(&collection);

    let wall = Wall {
        id: 1,
        shelves: shelves.clone(),
        label: "oak".into(),
    };
    walls.insert(&mut tr, &wall).expect("insert");
    assert_eq!(walls.find_by_id(&mut tr, &[Value::Uint(1)]).expect("find"), Some(wall));

    // the old index key is spliced out of a value holding the back-reference
    walls
        .update(
            &mut tr,
            &Wall {
                id: 1,
                shelves,
                label: "pine".into(),
            },
        )
        .expect("update");
    assert!(!walls.any_by(&mut tr, "by_label", &[Value::Text("oak".into())]).expect("oak"));
    let found = walls
        .find_by_or_fail(&mut tr, "by_label", &[Value::Text("pine".into())])
        .expect("pine");
    assert_eq!(found.id, 1);
    assert_eq!(collection.count(&mut tr), 2);
}

#[test]
fn shared_object_collection_is_freed_once() {
    let mut tr = MemoryStore::new();
    let walls = open::<Wall>(&mut tr);
    let collection = filled_collection(&mut tr);

    walls
        .insert(
            &mut tr,
            &Wall {
                id: 1,
                shelves: shared_shelves(&collection),
                label: "oak".into(),
            },
        )
        .expect("insert");

    metrics_reset_all();
    assert!(walls.remove_by_id(&mut tr, &[Value::Uint(1)]).expect("remove"));

    assert_eq!(collection.count(&mut tr), 0);
    assert_eq!(metrics_report().ops.collections_freed, 1);
    assert_eq!(walls.count_by(&mut tr, "by_label", &[]).expect("index"), 0);
}
