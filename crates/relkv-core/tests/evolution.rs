//! Schema evolution across reopenings of the same store.

use relkv_core::{
    error::ErrorClass,
    obs::{metrics_report, metrics_reset_all},
    prelude::*,
};

mod v1 {
    relkv_core::record! {
        pub struct Person in "Person" {
            id: u64,
            name: String,
        }
        primary_key(id);
    }
}

mod v2 {
    relkv_core::record! {
        pub struct Person in "Person" {
            id: u64,
            name: String,
        }
        primary_key(id);
        index by_name(name);
    }
}

mod v3 {
    relkv_core::record! {
        pub struct Person in "Person" {
            id: u64,
            name: String,
            tag: String,
        }
        primary_key(id);
        index by_name(name);
        index by_tag(tag);
    }
}

fn seed(tr: &mut MemoryStore) {
    let people = Relation::<v1::Person>::open(tr, &DbConfig::default()).expect("open v1");
    for (id, name) in [(1, "ada"), (2, "bob"), (3, "cyd")] {
        people
            .insert(tr, &v1::Person { id, name: name.into() })
            .expect("insert");
    }
}

#[test]
fn adding_an_index_rebuilds_it_from_existing_rows() {
    let mut tr = MemoryStore::new();
    seed(&mut tr);
    metrics_reset_all();

    let people = Relation::<v2::Person>::open(&mut tr, &DbConfig::default()).expect("open v2");
    assert_eq!(people.versions().len(), 2);
    assert_eq!(metrics_report().ops.indexes_rebuilt, 1);

    let bob = people
        .find_by(&mut tr, "by_name", &[Value::Text("bob".into())])
        .expect("find")
        .expect("bob");
    assert_eq!(bob.id, 2);
}

#[test]
fn rebuilt_name_index_lists_in_name_order() {
    let mut tr = MemoryStore::new();
    let people = Relation::<v1::Person>::open(&mut tr, &DbConfig::default()).expect("open v1");
    people
        .insert(&mut tr, &v1::Person { id: 1, name: "a".into() })
        .expect("insert");
    people
        .insert(&mut tr, &v1::Person { id: 2, name: "b".into() })
        .expect("insert");

    let people = Relation::<v2::Person>::open(&mut tr, &DbConfig::default()).expect("open v2");
    assert_eq!(people.count_by(&mut tr, "by_name", &[]).expect("count"), 2);

    let names: Vec<_> = people
        .list_by("by_name", &[], .., ScanOrder::Ascending)
        .expect("scan")
        .collect(&mut tr)
        .expect("rows")
        .into_iter()
        .map(|row| row.name)
        .collect();
    assert_eq!(names, vec!["a", "b"]);
}

#[test]
fn new_field_with_default_is_indexed_for_legacy_rows() {
    let mut tr = MemoryStore::new();
    seed(&mut tr);
    Relation::<v2::Person>::open(&mut tr, &DbConfig::default()).expect("open v2");

    let people = Relation::<v3::Person>::open(&mut tr, &DbConfig::default()).expect("open v3");
    assert_eq!(people.current_version().version(), 3);
    assert_eq!(
        people.count_by(&mut tr, "by_tag", &[Value::Text(String::new())]).expect("count"),
        3
    );

    // the kept index keeps its id and entries
    assert_eq!(people.count_by(&mut tr, "by_name", &[]).expect("count"), 3);

    people
        .update(
            &mut tr,
            &v3::Person {
                id: 1,
                name: "ada".into(),
                tag: "vip".into(),
            },
        )
        .expect("update");
    let vip = people
        .list_by("by_tag", &[Value::Text("vip".into())], .., ScanOrder::Ascending)
        .expect("scan")
        .collect(&mut tr)
        .expect("rows");
    assert_eq!(vip.len(), 1);
    assert_eq!(vip[0].id, 1);

    // legacy rows read with the new field defaulted
    let legacy = people.find_by_id_or_fail(&mut tr, &[Value::Uint(2)]).expect("legacy");
    assert_eq!(legacy.tag, "");
}

#[test]
fn reopening_unchanged_declaration_reuses_the_version() {
    let mut tr = MemoryStore::new();
    seed(&mut tr);
    metrics_reset_all();

    let people = Relation::<v1::Person>::open(&mut tr, &DbConfig::default()).expect("reopen");
    assert_eq!(people.versions().len(), 1);
    assert_eq!(metrics_report().ops.schema_reused, 1);
    assert_eq!(people.count(&mut tr).expect("count"), 3);
}

#[test]
fn dropping_an_index_erases_its_entries() {
    let mut tr = MemoryStore::new();
    seed(&mut tr);
    Relation::<v2::Person>::open(&mut tr, &DbConfig::default()).expect("open v2");
    let before = tr.len();

    let people = Relation::<v1::Person>::open(&mut tr, &DbConfig::default()).expect("back to v1");
    assert_eq!(people.versions().len(), 3);
    // three index entries gone, one descriptor added
    assert_eq!(tr.len(), before - 3 + 1);
}

// ----------------------------------------------------------------------
// Enum keys
// ----------------------------------------------------------------------

mod status_v1 {
    relkv_core::record_enum! {
        pub enum Status { Open = 1 }
    }

    relkv_core::record! {
        pub struct Ticket in "Ticket" {
            status: Status,
            id: u64,
        }
        primary_key(status, id);
    }
}

mod status_v2 {
    relkv_core::record_enum! {
        pub enum Status { Open = 1, Closed = 2 }
    }

    relkv_core::record! {
        pub struct Ticket in "Ticket" {
            status: Status,
            id: u64,
        }
        primary_key(status, id);
    }
}

mod status_v3 {
    relkv_core::record_enum! {
        pub enum Status { Open = 1, Closed = 2, Archived = 3 }
    }

    relkv_core::record! {
        pub struct Ticket in "Ticket" {
            status: Status,
            id: u64,
        }
        primary_key(status, id);
    }
}

mod status_narrow {
    relkv_core::record_enum! {
        pub enum Status { Open = 1, Archived = 3 }
    }

    relkv_core::record! {
        pub struct Ticket in "Ticket" {
            status: Status,
            id: u64,
        }
        primary_key(status, id);
    }
}

fn ticket_store() -> MemoryStore {
    let mut tr = MemoryStore::new();
    let tickets =
        Relation::<status_v1::Ticket>::open(&mut tr, &DbConfig::default()).expect("open v1");
    tickets
        .insert(
            &mut tr,
            &status_v1::Ticket {
                status: status_v1::Status::Open,
                id: 7,
            },
        )
        .expect("insert");
    tr
}

#[test]
fn enum_key_widening_over_several_versions() {
    let mut tr = ticket_store();

    let v2 = Relation::<status_v2::Ticket>::open(&mut tr, &DbConfig::default()).expect("open v2");
    v2.insert(
        &mut tr,
        &status_v2::Ticket {
            status: status_v2::Status::Closed,
            id: 8,
        },
    )
    .expect("insert");

    let v3 = Relation::<status_v3::Ticket>::open(&mut tr, &DbConfig::default()).expect("open v3");
    assert_eq!(v3.versions().len(), 3);

    let rows = v3.list().expect("scan").collect(&mut tr).expect("rows");
    let statuses: Vec<_> = rows.iter().map(|row| row.status).collect();
    assert_eq!(statuses, vec![status_v3::Status::Open, status_v3::Status::Closed]);
}

#[test]
fn enum_key_narrowing_is_rejected() {
    let mut tr = ticket_store();
    Relation::<status_v3::Ticket>::open(&mut tr, &DbConfig::default()).expect("open v3");

    let err = Relation::<status_narrow::Ticket>::open(&mut tr, &DbConfig::default())
        .expect_err("narrowed key");
    assert_eq!(err.class, ErrorClass::SchemaViolation);
    assert!(err.is_schema_violation());

    // nothing was persisted
    let v3 = Relation::<status_v3::Ticket>::open(&mut tr, &DbConfig::default()).expect("reopen");
    assert_eq!(v3.versions().len(), 2);
    assert_eq!(v3.count(&mut tr).expect("count"), 1);
}

#[test]
fn self_healing_resets_incompatible_relations() {
    let mut tr = ticket_store();
    Relation::<status_v3::Ticket>::open(&mut tr, &DbConfig::default()).expect("open v3");
    metrics_reset_all();

    let config = DbConfig::default().with_self_healing(true);
    let tickets = Relation::<status_narrow::Ticket>::open(&mut tr, &config).expect("healed");

    assert_eq!(tickets.count(&mut tr).expect("count"), 0);
    assert_eq!(tickets.versions().len(), 3);
    assert_eq!(metrics_report().ops.self_heal_resets, 1);
}
