//! The Beast2 binary codec
//!
//! Type-directed encoding and decoding: a codec is produced for a type,
//! and the wire carries no type metadata except where a sum demands it
//! (variant tag index, recursion unfolds transparently). Equal values
//! encode to identical bytes — dict and set entries go out in ascending
//! order and every NaN is written with one canonical bit pattern — so
//! encoding is a pure function of value and type.
//!
//! Function values are written as their declared type's canonical hash
//! followed by parameter names and the body IR; decoding re-runs
//! compilation checks against the receiver's platform table, so a
//! function that references an unprovided platform entry fails right at
//! the decode boundary.

use crate::ir_codec;
use crate::leb128::{self, ByteReader};
use east_core::compare::total_cmp;
use east_core::ir::FunctionValue;
use east_core::types::Type;
use east_core::value::Value;
use east_core::{Error, ErrorKind, Result};
use east_runtime::analysis;
use east_runtime::platform::PlatformTable;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::trace;

/// The bit pattern written for every NaN.
const CANONICAL_NAN: u64 = 0x7ff8_0000_0000_0000;

/// A binary encoder/decoder for one type.
pub struct BinaryCodec {
    ty: Type,
}

impl BinaryCodec {
    pub fn new(ty: Type) -> Self {
        BinaryCodec { ty }
    }

    pub fn ty(&self) -> &Type {
        &self.ty
    }

    /// Encode a value of this codec's type.
    pub fn encode(&self, value: &Value) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        encode_value(&self.ty, value, &mut out)?;
        trace!(bytes = out.len(), ty = %self.ty, "encoded value");
        Ok(out)
    }

    /// Decode a value of this codec's type, consuming the entire input.
    /// Function values are validated and their platform references
    /// resolved against `platform`.
    pub fn decode(&self, bytes: &[u8], platform: &PlatformTable) -> Result<Value> {
        let mut reader = ByteReader::new(bytes);
        let value = decode_value(&self.ty, &mut reader, platform)?;
        if !reader.is_finished() {
            return Err(Error::new(
                ErrorKind::DecodingError,
                format!("{} trailing bytes after value", reader.remaining()),
            ));
        }
        trace!(bytes = bytes.len(), ty = %self.ty, "decoded value");
        Ok(value)
    }
}

fn shape_error(ty: &Type, value: &Value) -> Error {
    Error::new(
        ErrorKind::TypeMismatch,
        format!("cannot encode {} as {}", value.shape_name(), ty),
    )
}

pub(crate) fn encode_value(ty: &Type, value: &Value, out: &mut Vec<u8>) -> Result<()> {
    match ty {
        Type::Never => Err(Error::new(
            ErrorKind::EncodingError,
            "Never has no encodable values",
        )),
        Type::Null => match value {
            Value::Null => Ok(()),
            _ => Err(shape_error(ty, value)),
        },
        Type::Boolean => match value {
            Value::Boolean(b) => {
                out.push(u8::from(*b));
                Ok(())
            }
            _ => Err(shape_error(ty, value)),
        },
        Type::Integer => match value {
            Value::Integer(n) => {
                leb128::write_zigzag_big(n, out);
                Ok(())
            }
            _ => Err(shape_error(ty, value)),
        },
        Type::Float => match value {
            Value::Float(x) => {
                let bits = if x.is_nan() {
                    CANONICAL_NAN
                } else {
                    x.to_bits()
                };
                out.extend_from_slice(&bits.to_le_bytes());
                Ok(())
            }
            _ => Err(shape_error(ty, value)),
        },
        Type::String => match value {
            Value::String(s) => {
                leb128::write_string(s, out);
                Ok(())
            }
            _ => Err(shape_error(ty, value)),
        },
        Type::DateTime => match value {
            Value::DateTime(dt) => {
                leb128::write_zigzag_i64(Value::datetime_to_millis(dt), out);
                Ok(())
            }
            _ => Err(shape_error(ty, value)),
        },
        Type::Blob => match value {
            Value::Blob(bytes) => {
                leb128::write_len(bytes.len(), out);
                out.extend_from_slice(bytes);
                Ok(())
            }
            _ => Err(shape_error(ty, value)),
        },
        Type::Ref(content) => match value {
            // Identity does not cross the wire; only the inhabitant does.
            Value::Ref(cell) => encode_value(content, &cell.get(), out),
            _ => Err(shape_error(ty, value)),
        },
        Type::Array(item) => match value {
            Value::Array(items) => {
                leb128::write_len(items.len(), out);
                for v in items.iter() {
                    encode_value(item, v, out)?;
                }
                Ok(())
            }
            _ => Err(shape_error(ty, value)),
        },
        Type::Set(key) => match value {
            Value::Set(members) => {
                leb128::write_len(members.len(), out);
                for member in members.iter() {
                    encode_value(key, member, out)?;
                }
                Ok(())
            }
            _ => Err(shape_error(ty, value)),
        },
        Type::Dict(key_ty, value_ty) => match value {
            Value::Dict(entries) => {
                leb128::write_len(entries.len(), out);
                for (k, v) in entries.iter() {
                    encode_value(key_ty, k, out)?;
                    encode_value(value_ty, v, out)?;
                }
                Ok(())
            }
            _ => Err(shape_error(ty, value)),
        },
        Type::Struct(st) => match value {
            Value::Struct(sv) => {
                if sv.fields.len() != st.fields.len() {
                    return Err(shape_error(ty, value));
                }
                for ((decl_name, field_ty), (name, field)) in
                    st.fields.iter().zip(sv.fields.iter())
                {
                    if decl_name != name {
                        return Err(Error::new(
                            ErrorKind::TypeMismatch,
                            format!("expected field '{}', found '{}'", decl_name, name),
                        ));
                    }
                    encode_value(field_ty, field, out)?;
                }
                Ok(())
            }
            _ => Err(shape_error(ty, value)),
        },
        Type::Variant(vt) => match value {
            Value::Variant(v) => {
                let index = vt.tag_index(&v.tag).ok_or_else(|| {
                    Error::new(
                        ErrorKind::UnknownVariantTag,
                        format!("variant type has no tag '{}'", v.tag),
                    )
                })?;
                if v.index as usize != index {
                    return Err(Error::new(
                        ErrorKind::TypeMismatch,
                        format!(
                            "variant value carries position {} but tag '{}' is declared at {}",
                            v.index, v.tag, index
                        ),
                    ));
                }
                leb128::write_uleb(index as u64, out);
                let (_, payload_ty) = &vt.tags[index];
                encode_value(payload_ty, &v.payload, out)
            }
            _ => Err(shape_error(ty, value)),
        },
        // Recursion is transparent on the wire: encode the unfolded
        // shape, never a pointer.
        Type::Recursive(_) => encode_value(&ty.unfold(), value, out),
        Type::RecRef(_) => Err(Error::new(
            ErrorKind::EncodingError,
            "unbound recursion reference in encoder type",
        )),
        Type::Function(ft) => match value {
            Value::Function(fv) => {
                if !Type::Function(fv.ty.clone()).compatible(ty) {
                    return Err(Error::new(
                        ErrorKind::TypeMismatch,
                        format!(
                            "function of type {} encoded as {}",
                            Type::Function(fv.ty.clone()),
                            ty
                        ),
                    ));
                }
                out.extend_from_slice(&Type::Function(ft.clone()).canonical_hash());
                leb128::write_len(fv.params.len(), out);
                for param in &fv.params {
                    leb128::write_string(param, out);
                }
                ir_codec::encode_expr(&fv.body, out)
            }
            _ => Err(shape_error(ty, value)),
        },
        Type::TypeType => match value {
            Value::Type(t) => {
                out.extend_from_slice(&t.to_canonical_bytes());
                Ok(())
            }
            _ => Err(shape_error(ty, value)),
        },
    }
}

pub(crate) fn decode_value(
    ty: &Type,
    reader: &mut ByteReader<'_>,
    platform: &PlatformTable,
) -> Result<Value> {
    match ty {
        Type::Never => Err(Error::new(
            ErrorKind::DecodingError,
            "Never has no decodable values",
        )),
        Type::Null => Ok(Value::Null),
        Type::Boolean => match reader.read_u8()? {
            0 => Ok(Value::Boolean(false)),
            1 => Ok(Value::Boolean(true)),
            other => Err(Error::new(
                ErrorKind::DecodingError,
                format!("invalid boolean byte 0x{:02x}", other),
            )),
        },
        Type::Integer => Ok(Value::Integer(reader.read_zigzag_big()?)),
        Type::Float => Ok(Value::Float(reader.read_f64()?)),
        Type::String => Ok(Value::String(reader.read_string()?)),
        Type::DateTime => Value::datetime_from_millis(reader.read_zigzag_i64()?),
        Type::Blob => {
            let len = reader.read_len()?;
            Ok(Value::blob(reader.read_exact(len)?.to_vec()))
        }
        Type::Ref(content) => {
            // Two refs that encoded the same inhabitant decode to two
            // distinct cells.
            Ok(Value::ref_of(decode_value(content, reader, platform)?))
        }
        Type::Array(item) => {
            let len = reader.read_len()?;
            let mut items = Vec::with_capacity(len);
            for _ in 0..len {
                items.push(decode_value(item, reader, platform)?);
            }
            Ok(Value::array(items))
        }
        Type::Set(key) => {
            let len = reader.read_len()?;
            let mut members = std::collections::BTreeSet::new();
            let mut previous: Option<Value> = None;
            for _ in 0..len {
                let member = decode_value(key, reader, platform)?;
                if let Some(previous) = &previous {
                    if total_cmp(previous, &member) != Ordering::Less {
                        return Err(Error::new(
                            ErrorKind::DecodingError,
                            "set members are not strictly ascending",
                        ));
                    }
                }
                previous = Some(member.clone());
                members.insert(member);
            }
            Ok(Value::Set(Arc::new(members)))
        }
        Type::Dict(key_ty, value_ty) => {
            let len = reader.read_len()?;
            let mut entries = std::collections::BTreeMap::new();
            let mut previous: Option<Value> = None;
            for _ in 0..len {
                let key = decode_value(key_ty, reader, platform)?;
                if let Some(previous) = &previous {
                    if total_cmp(previous, &key) != Ordering::Less {
                        return Err(Error::new(
                            ErrorKind::DecodingError,
                            "dict keys are not strictly ascending",
                        ));
                    }
                }
                previous = Some(key.clone());
                let value = decode_value(value_ty, reader, platform)?;
                entries.insert(key, value);
            }
            Ok(Value::Dict(Arc::new(entries)))
        }
        Type::Struct(st) => {
            let mut fields = Vec::with_capacity(st.fields.len());
            for (name, field_ty) in &st.fields {
                fields.push((name.clone(), decode_value(field_ty, reader, platform)?));
            }
            Ok(Value::Struct(Arc::new(east_core::value::StructValue {
                fields,
            })))
        }
        Type::Variant(vt) => {
            let index = reader.read_uleb()? as usize;
            let (tag, payload_ty) = vt.tags.get(index).ok_or_else(|| {
                Error::new(
                    ErrorKind::UnknownVariantTag,
                    format!("variant tag index {} out of range 0..{}", index, vt.tags.len()),
                )
            })?;
            let payload = decode_value(payload_ty, reader, platform)?;
            Ok(Value::variant_at(index as u32, tag.clone(), payload))
        }
        Type::Recursive(_) => decode_value(&ty.unfold(), reader, platform),
        Type::RecRef(_) => Err(Error::new(
            ErrorKind::DecodingError,
            "unbound recursion reference in decoder type",
        )),
        Type::Function(ft) => {
            let written_hash = reader.read_exact(32)?;
            let expected_hash = Type::Function(ft.clone()).canonical_hash();
            if written_hash != expected_hash {
                return Err(Error::new(
                    ErrorKind::TypeMismatch,
                    "function type hash does not match the declared type",
                ));
            }
            let param_count = reader.read_len()?;
            let mut params = Vec::with_capacity(param_count);
            for _ in 0..param_count {
                params.push(reader.read_string()?);
            }
            let body = ir_codec::decode_expr(reader, platform)?;
            let platform_refs = analysis::platform_refs(&body)?;
            let func = FunctionValue {
                ty: ft.clone(),
                params,
                body,
                platform_refs,
            };
            // Re-run compilation against the receiver's platform table.
            east_runtime::validate_function(&func, platform)?;
            Ok(Value::Function(Arc::new(func)))
        }
        Type::TypeType => {
            let (decoded, used) = Type::from_canonical_bytes(reader.tail())?;
            reader.advance(used)?;
            Ok(Value::Type(decoded))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use east_core::default::default_of;

    fn empty_platform() -> PlatformTable {
        PlatformTable::new()
    }

    fn roundtrip(ty: Type, value: Value) -> Vec<u8> {
        let codec = BinaryCodec::new(ty);
        let bytes = codec.encode(&value).unwrap();
        let back = codec.decode(&bytes, &empty_platform()).unwrap();
        assert_eq!(back, value);
        bytes
    }

    #[test]
    fn test_null_encodes_to_zero_bytes() {
        let bytes = roundtrip(Type::Null, Value::Null);
        assert!(bytes.is_empty());
    }

    #[test]
    fn test_boolean_is_one_byte() {
        assert_eq!(roundtrip(Type::Boolean, Value::Boolean(true)), vec![0x01]);
        assert_eq!(roundtrip(Type::Boolean, Value::Boolean(false)), vec![0x00]);
    }

    #[test]
    fn test_integer_boundaries() {
        use num_bigint::BigInt;
        let two_pow_64 = BigInt::from(2u8).pow(64);
        for value in [
            BigInt::from(0),
            &two_pow_64 - 1,
            two_pow_64.clone(),
            &two_pow_64 + 1,
            -(&two_pow_64 - 1i32),
            -two_pow_64.clone(),
            -(&two_pow_64 + 1i32),
        ] {
            roundtrip(Type::Integer, Value::Integer(value));
        }
    }

    #[test]
    fn test_float_special_values() {
        roundtrip(Type::Float, Value::Float(f64::INFINITY));
        roundtrip(Type::Float, Value::Float(f64::NEG_INFINITY));
        roundtrip(Type::Float, Value::Float(-0.0));
        // Every NaN writes one canonical pattern.
        let codec = BinaryCodec::new(Type::Float);
        let a = codec.encode(&Value::Float(f64::NAN)).unwrap();
        let b = codec
            .encode(&Value::Float(f64::from_bits(0x7ff8_dead_beef_0001)))
            .unwrap();
        assert_eq!(a, b);
        match codec.decode(&a, &empty_platform()).unwrap() {
            Value::Float(x) => assert!(x.is_nan()),
            other => panic!("expected float, got {}", other),
        }
    }

    #[test]
    fn test_string_utf8_boundaries() {
        roundtrip(Type::String, Value::string(""));
        roundtrip(Type::String, Value::string("plain"));
        roundtrip(Type::String, Value::string("🌍🦀"));
    }

    #[test]
    fn test_containers_roundtrip() {
        roundtrip(Type::array(Type::Integer), Value::array(vec![]));
        roundtrip(
            Type::array(Type::Integer),
            Value::array(vec![Value::integer(1), Value::integer(-1)]),
        );
        roundtrip(
            Type::set(Type::String),
            Value::set_of(vec![Value::string("b"), Value::string("a")]),
        );
        roundtrip(
            Type::dict(Type::String, Type::Integer),
            Value::dict_of(vec![
                (Value::string("x"), Value::integer(1)),
                (Value::string("y"), Value::integer(2)),
            ]),
        );
    }

    #[test]
    fn test_insertion_order_never_observable() {
        let codec = BinaryCodec::new(Type::dict(Type::Integer, Type::Null));
        let forward = Value::dict_of((0..10).map(|i| (Value::integer(i), Value::Null)));
        let reverse = Value::dict_of((0..10).rev().map(|i| (Value::integer(i), Value::Null)));
        assert_eq!(
            codec.encode(&forward).unwrap(),
            codec.encode(&reverse).unwrap()
        );
    }

    #[test]
    fn test_struct_fields_carry_no_names() {
        let ty = Type::struct_of(vec![("a", Type::Boolean), ("b", Type::Boolean)]);
        let value = Value::struct_of(vec![
            ("a", Value::Boolean(true)),
            ("b", Value::Boolean(false)),
        ]);
        let bytes = roundtrip(ty, value);
        // Two booleans, nothing else.
        assert_eq!(bytes, vec![0x01, 0x00]);
    }

    #[test]
    fn test_variant_tag_index_uses_declared_order() {
        let ty = Type::variant_of(vec![("ok", Type::Integer), ("err", Type::String)]);
        let codec = BinaryCodec::new(ty.clone());
        let err_value = Value::variant(&ty, "err", Value::string("")).unwrap();
        let bytes = codec.encode(&err_value).unwrap();
        assert_eq!(bytes[0], 1);
        let ok_value = Value::variant(&ty, "ok", Value::integer(7)).unwrap();
        roundtrip(ty, ok_value);
    }

    #[test]
    fn test_decoded_tag_out_of_range() {
        let ty = Type::variant_of(vec![("only", Type::Null)]);
        let codec = BinaryCodec::new(ty);
        let err = codec.decode(&[9], &empty_platform()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownVariantTag);
    }

    #[test]
    fn test_recursive_wire_matches_unfolded() {
        let list = Type::recursive(Type::variant_of(vec![
            ("nil", Type::Null),
            (
                "cons",
                Type::struct_of(vec![("head", Type::Integer), ("tail", Type::RecRef(0))]),
            ),
        ]));
        let value = Value::variant(
            &list,
            "cons",
            Value::struct_of(vec![
                ("head", Value::integer(1)),
                ("tail", Value::variant(&list, "nil", Value::Null).unwrap()),
            ]),
        )
        .unwrap();
        let folded = BinaryCodec::new(list.clone()).encode(&value).unwrap();
        let unfolded = BinaryCodec::new(list.unfold()).encode(&value).unwrap();
        assert_eq!(folded, unfolded);
        roundtrip(list, value);
    }

    #[test]
    fn test_deep_recursive_list() {
        let list = Type::recursive(Type::variant_of(vec![
            ("nil", Type::Null),
            (
                "cons",
                Type::struct_of(vec![("head", Type::Integer), ("tail", Type::RecRef(0))]),
            ),
        ]));
        let mut value = Value::variant(&list, "nil", Value::Null).unwrap();
        for i in 0..1000 {
            value = Value::variant(
                &list,
                "cons",
                Value::struct_of(vec![("head", Value::integer(i)), ("tail", value)]),
            )
            .unwrap();
        }
        roundtrip(list, value);
    }

    #[test]
    fn test_ref_identity_not_preserved() {
        let ty = Type::array(Type::ref_of(Type::Integer));
        let shared = Value::ref_of(Value::integer(5));
        let value = Value::array(vec![shared.clone(), shared.clone()]);
        let codec = BinaryCodec::new(ty);
        let decoded = codec
            .decode(&codec.encode(&value).unwrap(), &empty_platform())
            .unwrap();
        match decoded {
            Value::Array(items) => match (&items[0], &items[1]) {
                (Value::Ref(a), Value::Ref(b)) => {
                    assert_eq!(a.get(), b.get());
                    // Distinct cells: writing one leaves the other alone.
                    a.set(Value::integer(9)).unwrap();
                    assert_eq!(b.get(), Value::integer(5));
                }
                _ => panic!("expected refs"),
            },
            other => panic!("expected array, got {}", other),
        }
    }

    #[test]
    fn test_type_values_roundtrip() {
        let ty = Type::dict(Type::String, Type::array(Type::Float));
        roundtrip(Type::TypeType, Value::Type(ty));
    }

    #[test]
    fn test_defaults_roundtrip_for_every_defaultable_type() {
        let types = vec![
            Type::Null,
            Type::Boolean,
            Type::Integer,
            Type::Float,
            Type::String,
            Type::DateTime,
            Type::Blob,
            Type::ref_of(Type::Integer),
            Type::array(Type::String),
            Type::set(Type::Integer),
            Type::dict(Type::String, Type::Integer),
            Type::struct_of(vec![("a", Type::Integer), ("b", Type::String)]),
            Type::variant_of(vec![("nil", Type::Null), ("cons", Type::Integer)]),
            Type::TypeType,
        ];
        for ty in types {
            let value = default_of(&ty).unwrap();
            roundtrip(ty, value);
        }
    }

    #[test]
    fn test_truncated_input_rejected() {
        let ty = Type::struct_of(vec![("s", Type::String), ("n", Type::Integer)]);
        let value = Value::struct_of(vec![
            ("s", Value::string("hello")),
            ("n", Value::integer(300)),
        ]);
        let codec = BinaryCodec::new(ty);
        let bytes = codec.encode(&value).unwrap();
        for cut in 0..bytes.len() {
            assert!(
                codec.decode(&bytes[..cut], &empty_platform()).is_err(),
                "truncation at {} was accepted",
                cut
            );
        }
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let codec = BinaryCodec::new(Type::Boolean);
        let err = codec.decode(&[0x01, 0x00], &empty_platform()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DecodingError);
    }

    #[test]
    fn test_unsorted_dict_bytes_rejected() {
        let codec = BinaryCodec::new(Type::dict(Type::Integer, Type::Null));
        let good = codec
            .encode(&Value::dict_of(vec![
                (Value::integer(1), Value::Null),
                (Value::integer(2), Value::Null),
            ]))
            .unwrap();
        // Swap the two keys: [len, 1zz, 2zz] -> [len, 2zz, 1zz].
        let bad = vec![good[0], good[2], good[1]];
        let err = codec.decode(&bad, &empty_platform()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DecodingError);
    }
}
