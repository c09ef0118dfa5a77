//! End-to-end function transport scenarios
//!
//! Functions travel the wire as IR and come back callable: encode on one
//! side, decode against the receiver's platform table, call. These tests
//! cover the plain increment round-trip, platform-dependent functions,
//! a struct-embedded callback, multi-argument bodies, and the
//! missing-platform decode failure.

use east_codec::{BinaryCodec, JsonCodec};
use east_core::types::{FunctionFlavor, FunctionType, Type};
use east_core::value::Value;
use east_core::ErrorKind;
use east_runtime::platform::PlatformTable;
use east_runtime::{build, compile};
use std::sync::{Arc, Mutex};

fn sync_fn(params: Vec<Type>, result: Type) -> FunctionType {
    FunctionType {
        params,
        result,
        flavor: FunctionFlavor::Sync,
        allowlist: None,
    }
}

fn compile_decoded(value: &Value, platform: Arc<PlatformTable>) -> east_runtime::CompiledFunction {
    match value {
        Value::Function(f) => compile(f.as_ref().clone(), platform).unwrap(),
        other => panic!("expected function value, got {}", other),
    }
}

#[test]
fn test_increment_roundtrip_binary() {
    // (x: Integer) -> x + 1, no platform.
    let ty = Type::function(vec![Type::Integer], Type::Integer);
    let func = build::function_value(
        sync_fn(vec![Type::Integer], Type::Integer),
        vec!["x"],
        build::add(build::var("x", Type::Integer), build::integer(1)),
    )
    .unwrap();

    let bytes = BinaryCodec::new(ty.clone())
        .encode(&Value::Function(Arc::new(func)))
        .unwrap();

    // Decode against a fresh spelling of the same type.
    let fresh_ty = Type::function(vec![Type::Integer], Type::Integer);
    let platform = Arc::new(PlatformTable::new());
    let decoded = BinaryCodec::new(fresh_ty)
        .decode(&bytes, &platform)
        .unwrap();
    let callable = compile_decoded(&decoded, platform);
    assert_eq!(
        callable.call(vec![Value::integer(10)]).unwrap(),
        Value::integer(11)
    );
}

#[test]
fn test_platform_dependent_roundtrip() {
    // double: (Integer) -> Integer; (x) -> double(x) + 1.
    let make_platform = || {
        let mut table = PlatformTable::new();
        table.register_sync(
            "double",
            vec![Type::Integer],
            Type::Integer,
            |mut args| match args.pop() {
                Some(Value::Integer(n)) => Ok(Value::Integer(n * 2)),
                other => Err(format!("bad argument: {:?}", other).into()),
            },
        );
        Arc::new(table)
    };

    let ty = Type::function(vec![Type::Integer], Type::Integer);
    let func = build::function_value(
        sync_fn(vec![Type::Integer], Type::Integer),
        vec!["x"],
        build::add(
            build::platform_call("double", vec![build::var("x", Type::Integer)], Type::Integer),
            build::integer(1),
        ),
    )
    .unwrap();

    // Sender side: compile locally, then encode.
    let sender = compile(func.clone(), make_platform()).unwrap();
    assert_eq!(
        sender.call(vec![Value::integer(10)]).unwrap(),
        Value::integer(21)
    );
    let bytes = BinaryCodec::new(ty.clone())
        .encode(&Value::Function(Arc::new(func)))
        .unwrap();

    // Receiver side: decode with an equivalent platform, call.
    let platform = make_platform();
    let decoded = BinaryCodec::new(ty).decode(&bytes, &platform).unwrap();
    let callable = compile_decoded(&decoded, platform);
    assert_eq!(
        callable.call(vec![Value::integer(10)]).unwrap(),
        Value::integer(21)
    );
}

#[test]
fn test_struct_containing_callback() {
    // Struct{name: String, processor: Function(Integer -> Integer)}
    // processor = (x) -> { trace(print(x)); x * 3 }
    let processor_ty = Type::function(vec![Type::Integer], Type::Integer);
    let ty = Type::struct_of(vec![
        ("name", Type::String),
        ("processor", processor_ty.clone()),
    ]);

    let traced: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let make_platform = |log: Arc<Mutex<Vec<String>>>| {
        let mut table = PlatformTable::new();
        table.register_sync(
            "print",
            vec![Type::Integer],
            Type::String,
            |mut args| match args.pop() {
                Some(Value::Integer(n)) => Ok(Value::String(n.to_string())),
                other => Err(format!("bad argument: {:?}", other).into()),
            },
        );
        table.register_sync("trace", vec![Type::String], Type::Null, move |mut args| {
            match args.pop() {
                Some(Value::String(s)) => {
                    log.lock().unwrap().push(s);
                    Ok(Value::Null)
                }
                other => Err(format!("bad argument: {:?}", other).into()),
            }
        });
        Arc::new(table)
    };

    let processor = build::function_value(
        sync_fn(vec![Type::Integer], Type::Integer),
        vec!["x"],
        build::block(vec![
            build::platform_call(
                "trace",
                vec![build::platform_call(
                    "print",
                    vec![build::var("x", Type::Integer)],
                    Type::String,
                )],
                Type::Null,
            ),
            build::mul(build::var("x", Type::Integer), build::integer(3)),
        ]),
    )
    .unwrap();
    let value = Value::struct_of(vec![
        ("name", Value::string("tripler")),
        ("processor", Value::Function(Arc::new(processor))),
    ]);

    let bytes = BinaryCodec::new(ty.clone()).encode(&value).unwrap();
    let platform = make_platform(traced.clone());
    let decoded = BinaryCodec::new(ty).decode(&bytes, &platform).unwrap();

    let processor = match &decoded {
        Value::Struct(s) => {
            assert_eq!(s.field("name").unwrap(), &Value::string("tripler"));
            s.field("processor").unwrap().clone()
        }
        other => panic!("expected struct, got {}", other),
    };
    let callable = compile_decoded(&processor, platform);
    assert_eq!(
        callable.call(vec![Value::integer(7)]).unwrap(),
        Value::integer(21)
    );
    assert_eq!(traced.lock().unwrap().as_slice(), ["7"]);
}

#[test]
fn test_multi_arg_function_roundtrip() {
    // (a, b) -> (a + b) * 2
    let ty = Type::function(vec![Type::Integer, Type::Integer], Type::Integer);
    let func = build::function_value(
        sync_fn(vec![Type::Integer, Type::Integer], Type::Integer),
        vec!["a", "b"],
        build::mul(
            build::add(
                build::var("a", Type::Integer),
                build::var("b", Type::Integer),
            ),
            build::integer(2),
        ),
    )
    .unwrap();
    let bytes = BinaryCodec::new(ty.clone())
        .encode(&Value::Function(Arc::new(func)))
        .unwrap();
    let platform = Arc::new(PlatformTable::new());
    let decoded = BinaryCodec::new(ty).decode(&bytes, &platform).unwrap();
    let callable = compile_decoded(&decoded, platform);
    assert_eq!(
        callable
            .call(vec![Value::integer(3), Value::integer(4)])
            .unwrap(),
        Value::integer(14)
    );
}

#[test]
fn test_missing_platform_fails_at_decode() {
    let ty = Type::function(vec![Type::Integer], Type::Integer);
    let func = build::function_value(
        sync_fn(vec![Type::Integer], Type::Integer),
        vec!["x"],
        build::platform_call("double", vec![build::var("x", Type::Integer)], Type::Integer),
    )
    .unwrap();
    let bytes = BinaryCodec::new(ty.clone())
        .encode(&Value::Function(Arc::new(func)))
        .unwrap();

    let empty = PlatformTable::new();
    let err = BinaryCodec::new(ty).decode(&bytes, &empty).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MissingPlatform);
    assert!(format!("{}", err).contains("double"));
}

#[test]
fn test_function_roundtrip_through_json() {
    let ty = Type::function(vec![Type::Integer], Type::Integer);
    let func = build::function_value(
        sync_fn(vec![Type::Integer], Type::Integer),
        vec!["x"],
        build::sub(build::var("x", Type::Integer), build::integer(5)),
    )
    .unwrap();
    let codec = JsonCodec::new(ty);
    let json = codec.encode(&Value::Function(Arc::new(func))).unwrap();
    let platform = Arc::new(PlatformTable::new());
    let decoded = codec.decode(&json, &platform).unwrap();
    let callable = compile_decoded(&decoded, platform);
    assert_eq!(
        callable.call(vec![Value::integer(12)]).unwrap(),
        Value::integer(7)
    );
}

#[test]
fn test_wire_hash_guards_type_confusion() {
    // Encode under (Integer -> Integer), try to decode under
    // (Integer -> String): the hash prefix catches it.
    let encode_ty = Type::function(vec![Type::Integer], Type::Integer);
    let func = build::function_value(
        sync_fn(vec![Type::Integer], Type::Integer),
        vec!["x"],
        build::var("x", Type::Integer),
    )
    .unwrap();
    let bytes = BinaryCodec::new(encode_ty)
        .encode(&Value::Function(Arc::new(func)))
        .unwrap();
    let decode_ty = Type::function(vec![Type::Integer], Type::String);
    let err = BinaryCodec::new(decode_ty)
        .decode(&bytes, &PlatformTable::new())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TypeMismatch);
}

#[test]
fn test_functions_with_only_platform_calls() {
    let ty = Type::function(vec![], Type::Null);
    let func = build::function_value(
        sync_fn(vec![], Type::Null),
        vec![],
        build::platform_call("ping", vec![], Type::Null),
    )
    .unwrap();
    let bytes = BinaryCodec::new(ty.clone())
        .encode(&Value::Function(Arc::new(func)))
        .unwrap();

    let mut table = PlatformTable::new();
    table.register_sync("ping", vec![], Type::Null, |_args| Ok(Value::Null));
    let platform = Arc::new(table);
    let decoded = BinaryCodec::new(ty).decode(&bytes, &platform).unwrap();
    let callable = compile_decoded(&decoded, platform);
    assert_eq!(callable.call(vec![]).unwrap(), Value::Null);
}
