use super::*;
use crate::kv::MemoryStore;

fn store() -> MemoryStore {
    let mut store = MemoryStore::new();
    for key in [&b"a1"[..], b"a2", b"a3", b"a4", b"b1", b"b2"] {
        store.create_or_update(key, b"v");
    }
    store
}

fn drain(scan: &mut PrefixScan, tr: &mut dyn KeyValueTransaction) -> Vec<Vec<u8>> {
    let mut keys = Vec::new();
    while scan.advance(tr, 0).expect("scan step") {
        keys.push(tr.key().expect("positioned").to_vec());
    }
    keys
}

#[test]
fn full_scan_in_both_orders() {
    let mut tr = store();

    let forward = drain(&mut PrefixScan::all(b"a".to_vec(), ScanOrder::Ascending), &mut tr);
    assert_eq!(forward, vec![b"a1".to_vec(), b"a2".to_vec(), b"a3".to_vec(), b"a4".to_vec()]);

    let backward = drain(&mut PrefixScan::all(b"b".to_vec(), ScanOrder::Descending), &mut tr);
    assert_eq!(backward, vec![b"b2".to_vec(), b"b1".to_vec()]);
}

#[test]
fn bounds_resolve_to_a_closed_window() {
    let mut tr = store();

    let mut scan = PrefixScan::new(
        b"a".to_vec(),
        Bound::Excluded(b"a1".to_vec()),
        Bound::Included(b"a3".to_vec()),
        ScanOrder::Ascending,
    );
    assert_eq!(drain(&mut scan, &mut tr), vec![b"a2".to_vec(), b"a3".to_vec()]);

    // absent bounds fall between keys
    let mut scan = PrefixScan::new(
        b"a".to_vec(),
        Bound::Included(b"a15".to_vec()),
        Bound::Excluded(b"a35".to_vec()),
        ScanOrder::Descending,
    );
    assert_eq!(drain(&mut scan, &mut tr), vec![b"a3".to_vec(), b"a2".to_vec()]);
}

#[test]
fn inverted_or_empty_window_yields_nothing() {
    let mut tr = store();

    let mut inverted = PrefixScan::new(
        b"a".to_vec(),
        Bound::Included(b"a4".to_vec()),
        Bound::Included(b"a1".to_vec()),
        ScanOrder::Ascending,
    );
    assert!(drain(&mut inverted, &mut tr).is_empty());

    let mut empty = PrefixScan::all(b"c".to_vec(), ScanOrder::Ascending);
    assert!(drain(&mut empty, &mut tr).is_empty());
    assert!(!empty.advance(&mut tr, 0).expect("exhausted stays exhausted"));
}

#[test]
fn foreign_cursor_moves_are_repaired_by_reseek() {
    let mut tr = store();
    let mut scan = PrefixScan::all(b"a".to_vec(), ScanOrder::Ascending);
    let mut keys = Vec::new();

    while scan.advance(&mut tr, 0).expect("scan step") {
        keys.push(tr.key().expect("positioned").to_vec());
        // unrelated write elsewhere moves the shared cursor
        tr.create_or_update(b"c1", b"x");
        tr.set_prefix(b"b");
        tr.find_last();
    }

    assert_eq!(keys.len(), 4);
    assert_eq!(keys[3], b"a4".to_vec());
}

#[test]
fn structural_change_invalidates_the_scan() {
    let mut tr = store();
    let mut scan = PrefixScan::all(b"a".to_vec(), ScanOrder::Ascending);

    assert!(scan.advance(&mut tr, 0).expect("first step"));
    tr.create_or_update(b"a0", b"v");

    let err = scan.advance(&mut tr, 1).expect_err("modified");
    assert!(matches!(err, CursorError::ModifiedDuringIteration));

    let err: InternalError = err.into();
    assert!(err.is_iteration_invalidated());
    assert!(!scan.advance(&mut tr, 1).expect("exhausted after failure"));
}

#[test]
fn unchanged_epoch_skips_the_counter_check() {
    let mut tr = store();
    let mut scan = PrefixScan::all(b"b".to_vec(), ScanOrder::Ascending);

    assert!(scan.advance(&mut tr, 0).expect("first step"));
    // counter moved but nobody touched the cursor
    assert!(scan.advance(&mut tr, 5).expect("physical advance"));
    assert_eq!(tr.key(), Some(&b"b2"[..]));
}
