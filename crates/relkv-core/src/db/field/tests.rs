use super::*;
use crate::value::{ObjectValue, Value};
use proptest::prelude::*;

fn save(kind: &FieldKind, value: &Value) -> Vec<u8> {
    let mut w = ByteWriter::new();
    kind.handler()
        .save(value, &mut w, &mut WriteCtx::default())
        .expect("save should succeed");
    w.into_bytes()
}

fn load(kind: &FieldKind, bytes: &[u8]) -> Value {
    let mut r = ByteReader::new(bytes);
    let value = kind
        .handler()
        .load(&mut r, &mut ReadCtx::default())
        .expect("load should succeed");
    assert!(r.is_empty(), "load must consume the whole encoding");
    value
}

fn skip_len(kind: &FieldKind, bytes: &[u8]) -> usize {
    let mut r = ByteReader::new(bytes);
    kind.handler()
        .skip(&mut r, &mut ReadCtx::default())
        .expect("skip should succeed");
    r.position()
}

fn color() -> FieldKind {
    FieldKind::Enum(EnumConfig::new(&[("Red", 1), ("Green", 2)]))
}

fn wide_color() -> FieldKind {
    FieldKind::Enum(EnumConfig::new(&[("Red", 1), ("Green", 2), ("Blue", 3)]))
}

fn address() -> FieldKind {
    FieldKind::Object(ObjectShape::new(
        "Address",
        vec![("street", FieldKind::Text), ("tags", FieldKind::Dictionary)],
    ))
}

#[test]
fn scalar_values_survive_save_and_load() {
    let cases = [
        (FieldKind::Bool, Value::Bool(true)),
        (FieldKind::Int, Value::Int(-42)),
        (FieldKind::Uint, Value::Uint(1 << 40)),
        (FieldKind::Float64, Value::Float64(-1.25)),
        (FieldKind::Text, Value::Text("zero\0inside".to_string())),
        (FieldKind::Blob, Value::Blob(vec![0, 1, 2, 255])),
        (color(), Value::Enum(2)),
        (FieldKind::optional(FieldKind::Text), Value::Null),
        (
            FieldKind::list(FieldKind::Uint),
            Value::List(vec![Value::Uint(3), Value::Uint(300)]),
        ),
        (FieldKind::Dictionary, Value::Collection(9)),
    ];

    for (kind, value) in cases {
        let bytes = save(&kind, &value);
        assert_eq!(load(&kind, &bytes), value, "{}", kind.describe());
        assert_eq!(skip_len(&kind, &bytes), bytes.len(), "{}", kind.describe());
    }
}

#[test]
fn mismatched_values_are_rejected() {
    let mut w = ByteWriter::new();
    let err = FieldKind::Uint
        .handler()
        .save(&Value::Text("x".into()), &mut w, &mut WriteCtx::default())
        .expect_err("text into uint must fail");

    assert!(matches!(err, CodecError::InvalidValue { kind: "uint", .. }));

    let err = color()
        .handler()
        .save(&Value::Enum(7), &mut w, &mut WriteCtx::default())
        .expect_err("undeclared variant must fail");
    assert!(matches!(err, CodecError::InvalidValue { kind: "enum", .. }));
}

#[test]
fn orderability_follows_composition() {
    assert!(FieldKind::optional(FieldKind::Text).is_orderable());
    assert!(!FieldKind::optional(FieldKind::Blob).is_orderable());
    assert!(!FieldKind::list(FieldKind::Uint).is_orderable());
    assert!(address().needs_context());
    assert!(address().may_free_content());
    assert!(FieldKind::list(FieldKind::Dictionary).may_free_content());
    assert!(!FieldKind::list(FieldKind::Text).may_free_content());
}

#[test]
fn persisted_kind_round_trips_through_tag_and_config() {
    let kinds = [
        FieldKind::Text,
        wide_color(),
        FieldKind::optional(FieldKind::list(FieldKind::Int)),
        address(),
    ];

    for kind in kinds {
        let mut w = ByteWriter::new();
        kind.encode(&mut w);
        let bytes = w.into_bytes();

        let mut r = ByteReader::new(&bytes);
        assert_eq!(FieldKind::decode(&mut r).unwrap(), kind);
        assert!(r.is_empty());

        let rebuilt =
            FieldKind::from_persisted(kind.handler_kind().tag(), &kind.config_bytes()).unwrap();
        assert_eq!(rebuilt.handler().kind(), &kind);
    }
}

#[test]
fn unknown_tag_is_rejected() {
    let err = FieldKind::from_persisted(99, &[]).expect_err("must fail");

    assert!(matches!(err, CodecError::UnknownTag(99)));
}

#[test]
fn back_references_reuse_ordinals() {
    let kind = FieldKind::list(address());
    let first = Value::Object(ObjectValue::Inline(vec![
        Value::Text("Main".into()),
        Value::Collection(4),
    ]));
    let value = Value::List(vec![
        first.clone(),
        Value::Object(ObjectValue::SameAs(1)),
        Value::Null,
    ]);

    let bytes = save(&kind, &value);
    assert_eq!(load(&kind, &bytes), value);
    assert_eq!(skip_len(&kind, &bytes), bytes.len());

    let mut w = ByteWriter::new();
    let err = kind
        .handler()
        .save(
            &Value::List(vec![Value::Object(ObjectValue::SameAs(1))]),
            &mut w,
            &mut WriteCtx::default(),
        )
        .expect_err("dangling back-reference must fail");
    assert!(matches!(err, CodecError::InvalidValue { kind: "object", .. }));
}

#[test]
fn free_content_visits_each_instance_once() {
    let kind = FieldKind::list(address());
    let value = Value::List(vec![
        Value::Object(ObjectValue::Inline(vec![
            Value::Text("a".into()),
            Value::Collection(4),
        ])),
        Value::Object(ObjectValue::SameAs(1)),
        Value::Object(ObjectValue::Inline(vec![
            Value::Text("b".into()),
            Value::Collection(5),
        ])),
    ]);
    let bytes = save(&kind, &value);

    let mut ctx = FreeCtx::default();
    let mut r = ByteReader::new(&bytes);
    kind.handler().free_content(&mut r, &mut ctx).unwrap();

    assert!(r.is_empty());
    assert_eq!(ctx.read.arena.instances(), 2);
    assert_eq!(ctx.into_collections(), vec![4, 5]);
}

#[test]
fn conversion_lattice() {
    assert!(can_convert(&color(), &wide_color()));
    assert!(!can_convert(&wide_color(), &color()));
    assert!(can_convert(&FieldKind::Bool, &FieldKind::Int));
    assert!(can_convert(&FieldKind::Text, &FieldKind::optional(FieldKind::Text)));
    assert!(can_convert(
        &FieldKind::list(FieldKind::Bool),
        &FieldKind::list(FieldKind::Uint)
    ));
    assert!(!can_convert(&FieldKind::Int, &FieldKind::Uint));
    assert!(!can_convert(&FieldKind::optional(FieldKind::Text), &FieldKind::Text));

    assert!(is_key_compatible(&color(), &wide_color()));
    assert!(!is_key_compatible(&FieldKind::Bool, &FieldKind::Int));
}

#[test]
fn renamed_variant_is_not_a_widening() {
    let renamed = FieldKind::Enum(EnumConfig::new(&[("Crimson", 1), ("Green", 2)]));

    assert!(!can_convert(&color(), &renamed));
}

#[test]
fn specialized_handler_reads_legacy_bytes() {
    let bytes = save(&FieldKind::Bool, &Value::Bool(true));
    let source = FieldKind::Bool.handler();
    let view = specialize(&source, &FieldKind::optional(FieldKind::Int)).expect("convertible");

    let mut r = ByteReader::new(&bytes);
    assert_eq!(view.load(&mut r, &mut ReadCtx::default()).unwrap(), Value::Int(1));
    assert!(view.is_orderable());

    let err = view
        .save(&Value::Int(1), &mut ByteWriter::new(), &mut WriteCtx::default())
        .expect_err("views are read-only");
    assert!(matches!(err, CodecError::Unsupported(_)));

    assert!(specialize(&source, &FieldKind::Text).is_none());
    assert!(Arc::ptr_eq(&specialize(&source, &FieldKind::Bool).unwrap(), &source));
}

proptest! {
    #[test]
    fn int_and_text_encodings_sort_like_values(
        a in any::<i64>(),
        b in any::<i64>(),
        s in "[a-z\\x00]{0,8}",
        t in "[a-z\\x00]{0,8}",
    ) {
        let (ea, eb) = (save(&FieldKind::Int, &Value::Int(a)), save(&FieldKind::Int, &Value::Int(b)));
        prop_assert_eq!(a.cmp(&b), ea.cmp(&eb));

        let es = save(&FieldKind::Text, &Value::Text(s.clone()));
        let et = save(&FieldKind::Text, &Value::Text(t.clone()));
        prop_assert_eq!(s.as_bytes().cmp(t.as_bytes()), es.cmp(&et));
    }

    #[test]
    fn optional_uint_sorts_null_first(a in proptest::option::of(any::<u64>()), b in any::<u64>()) {
        let kind = FieldKind::optional(FieldKind::Uint);
        let value = a.map_or(Value::Null, Value::Uint);
        let ea = save(&kind, &value);
        let eb = save(&kind, &Value::Uint(b));

        prop_assert_eq!(a.cmp(&Some(b)), ea.cmp(&eb));
    }
}
