//! Cross-codec invariants
//!
//! The binary and JSON codecs must agree: any value that round-trips
//! through one round-trips through the other to an equal value, encoding
//! is deterministic, and insertion order of keyed containers is never
//! observable in either spelling.

use east_codec::{BinaryCodec, JsonCodec};
use east_core::default::default_of;
use east_core::types::Type;
use east_core::value::Value;
use east_runtime::platform::PlatformTable;
use num_bigint::BigInt;

fn both_roundtrip(ty: &Type, value: &Value) {
    let platform = PlatformTable::new();
    let binary = BinaryCodec::new(ty.clone());
    let bytes = binary.encode(value).unwrap();
    let from_binary = binary.decode(&bytes, &platform).unwrap();
    assert_eq!(&from_binary, value, "binary round-trip of {}", value);

    let json = JsonCodec::new(ty.clone());
    let spelled = json.encode(value).unwrap();
    let from_json = json.decode(&spelled, &platform).unwrap();
    assert_eq!(&from_json, value, "JSON round-trip of {}", value);

    assert_eq!(from_binary, from_json);

    // Determinism: encoding twice is byte-identical.
    assert_eq!(binary.encode(value).unwrap(), bytes);
    assert_eq!(json.encode(value).unwrap(), spelled);
}

#[test]
fn test_boundary_values_roundtrip_in_both_codecs() {
    let two_pow_64 = BigInt::from(2u8).pow(64);
    let cases: Vec<(Type, Value)> = vec![
        (Type::Null, Value::Null),
        (Type::Boolean, Value::Boolean(false)),
        (Type::Integer, Value::Integer(&two_pow_64 + 1)),
        (Type::Integer, Value::Integer(-(&two_pow_64 + 1i32))),
        (Type::Integer, Value::Integer(&two_pow_64 - 1)),
        (Type::Float, Value::Float(f64::MIN_POSITIVE)),
        (Type::Float, Value::Float(f64::NAN)),
        (Type::Float, Value::Float(f64::NEG_INFINITY)),
        (Type::String, Value::string("")),
        (Type::String, Value::string("𝔼𝕒𝕤𝕥")),
        (Type::Blob, Value::blob(vec![])),
        (Type::DateTime, Value::datetime_from_millis(-62_135_596_800_000).unwrap()),
        (Type::array(Type::Integer), Value::array(vec![])),
        (Type::set(Type::String), Value::set_of(vec![])),
        (Type::dict(Type::Integer, Type::String), Value::dict_of(vec![])),
        (
            Type::struct_of(vec![("only", Type::Null)]),
            Value::struct_of(vec![("only", Value::Null)]),
        ),
    ];
    for (ty, value) in &cases {
        both_roundtrip(ty, value);
    }
}

#[test]
fn test_defaults_roundtrip_in_both_codecs() {
    let types = vec![
        Type::Boolean,
        Type::Integer,
        Type::Float,
        Type::String,
        Type::DateTime,
        Type::Blob,
        Type::ref_of(Type::String),
        Type::array(Type::Float),
        Type::set(Type::DateTime),
        Type::dict(Type::String, Type::Blob),
        Type::struct_of(vec![("a", Type::Integer), ("b", Type::Boolean)]),
        Type::variant_of(vec![("none", Type::Null), ("some", Type::Integer)]),
        Type::recursive(Type::variant_of(vec![
            ("leaf", Type::Integer),
            ("node", Type::array(Type::RecRef(0))),
        ])),
        Type::TypeType,
    ];
    for ty in types {
        let value = default_of(&ty).unwrap();
        assert!(value.conforms_to(&ty), "default of {} is malformed", ty);
        both_roundtrip(&ty, &value);
    }
}

#[test]
fn test_insertion_order_invisible_in_both_codecs() {
    let ty = Type::dict(Type::String, Type::Integer);
    let forward = Value::dict_of(vec![
        (Value::string("a"), Value::integer(1)),
        (Value::string("b"), Value::integer(2)),
        (Value::string("c"), Value::integer(3)),
    ]);
    let scrambled = Value::dict_of(vec![
        (Value::string("c"), Value::integer(3)),
        (Value::string("a"), Value::integer(1)),
        (Value::string("b"), Value::integer(2)),
    ]);
    assert_eq!(forward, scrambled);
    assert_eq!(
        BinaryCodec::new(ty.clone()).encode(&forward).unwrap(),
        BinaryCodec::new(ty.clone()).encode(&scrambled).unwrap()
    );
    assert_eq!(
        JsonCodec::new(ty.clone()).encode(&forward).unwrap(),
        JsonCodec::new(ty).encode(&scrambled).unwrap()
    );
}

#[test]
fn test_deeply_nested_recursive_value() {
    let list = Type::recursive(Type::variant_of(vec![
        ("nil", Type::Null),
        (
            "cons",
            Type::struct_of(vec![("head", Type::Integer), ("tail", Type::RecRef(0))]),
        ),
    ]));
    let mut value = Value::variant(&list, "nil", Value::Null).unwrap();
    for i in 0..1200 {
        value = Value::variant(
            &list,
            "cons",
            Value::struct_of(vec![("head", Value::integer(i)), ("tail", value)]),
        )
        .unwrap();
    }
    both_roundtrip(&list, &value);
}

#[test]
fn test_variant_keys_order_by_declared_tags() {
    // Declared tag order deliberately disagrees with name order: if
    // anything sorts these keys alphabetically, the wire order flips.
    let tag_ty = Type::variant_of(vec![("z", Type::Integer), ("a", Type::Integer)]);
    let z = Value::variant(&tag_ty, "z", Value::integer(1)).unwrap();
    let a = Value::variant(&tag_ty, "a", Value::integer(2)).unwrap();
    assert!(z < a, "declared order must put z before a");

    let set_ty = Type::set(tag_ty.clone());
    let forward = Value::set_of(vec![z.clone(), a.clone()]);
    let reverse = Value::set_of(vec![a.clone(), z.clone()]);
    assert_eq!(forward, reverse);

    let bytes = BinaryCodec::new(set_ty.clone()).encode(&forward).unwrap();
    assert_eq!(
        BinaryCodec::new(set_ty.clone()).encode(&reverse).unwrap(),
        bytes
    );
    // Two members; the first on the wire is tag index 0, i.e. z.
    assert_eq!(bytes[0], 2);
    assert_eq!(bytes[1], 0);
    both_roundtrip(&set_ty, &forward);

    let spelled = JsonCodec::new(set_ty).encode(&forward).unwrap();
    assert_eq!(spelled[0]["type"], "z");
    assert_eq!(spelled[1]["type"], "a");

    // Dict keys iterate the same way.
    let dict_ty = Type::dict(tag_ty, Type::String);
    let dict = Value::dict_of(vec![
        (a, Value::string("second")),
        (z, Value::string("first")),
    ]);
    let spelled = JsonCodec::new(dict_ty.clone()).encode(&dict).unwrap();
    assert_eq!(spelled[0][0]["type"], "z");
    assert_eq!(spelled[1][0]["type"], "a");
    both_roundtrip(&dict_ty, &dict);
}

#[test]
fn test_nested_composite_value() {
    // Dict<String, Array<Struct{at: DateTime, tags: Set<String>}>>
    let entry = Type::struct_of(vec![
        ("at", Type::DateTime),
        ("tags", Type::set(Type::String)),
    ]);
    let ty = Type::dict(Type::String, Type::array(entry));
    let value = Value::dict_of(vec![
        (
            Value::string("deploys"),
            Value::array(vec![Value::struct_of(vec![
                ("at", Value::datetime_from_millis(1_700_000_000_000).unwrap()),
                (
                    "tags",
                    Value::set_of(vec![Value::string("prod"), Value::string("eu")]),
                ),
            ])]),
        ),
        (Value::string("rollbacks"), Value::array(vec![])),
    ]);
    both_roundtrip(&ty, &value);
}
