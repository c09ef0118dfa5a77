//! The JSON codec
//!
//! A self-describing mirror of the binary codec, for human readability
//! and tooling; the binary form stays canonical for transport. Integers
//! are spelled as strings to preserve arbitrary precision, floats use
//! `"NaN"`/`"Infinity"`/`"-Infinity"` sentinels, datetimes are ISO-8601
//! with milliseconds and a trailing `Z`, blobs are base64, dicts are
//! arrays of `[key, value]` pairs in key order, and variants are
//! `{"type": tag, "value": payload}` objects.

use crate::ir_codec;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::NaiveDateTime;
use east_core::ir::FunctionValue;
use east_core::types::Type;
use east_core::value::Value;
use east_core::{Error, ErrorKind, Result};
use east_runtime::analysis;
use east_runtime::platform::PlatformTable;
use num_bigint::BigInt;
use serde_json::{json, Value as Json};
use std::sync::Arc;

const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// A JSON encoder/decoder for one type.
pub struct JsonCodec {
    ty: Type,
}

impl JsonCodec {
    pub fn new(ty: Type) -> Self {
        JsonCodec { ty }
    }

    pub fn ty(&self) -> &Type {
        &self.ty
    }

    pub fn encode(&self, value: &Value) -> Result<Json> {
        encode_value(&self.ty, value)
    }

    /// Encode to a JSON string.
    pub fn encode_string(&self, value: &Value) -> Result<String> {
        let json = self.encode(value)?;
        serde_json::to_string(&json).map_err(|e| {
            Error::with_cause(ErrorKind::EncodingError, "JSON rendering failed", Box::new(e))
        })
    }

    pub fn decode(&self, json: &Json, platform: &PlatformTable) -> Result<Value> {
        decode_value(&self.ty, json, platform)
    }

    /// Decode from a JSON string.
    pub fn decode_string(&self, text: &str, platform: &PlatformTable) -> Result<Value> {
        let json: Json = serde_json::from_str(text).map_err(|e| {
            Error::with_cause(ErrorKind::DecodingError, "malformed JSON", Box::new(e))
        })?;
        self.decode(&json, platform)
    }
}

fn shape_error(ty: &Type, value: &Value) -> Error {
    Error::new(
        ErrorKind::TypeMismatch,
        format!("cannot encode {} as {}", value.shape_name(), ty),
    )
}

fn spelling_error(ty: &Type, what: &str) -> Error {
    Error::new(
        ErrorKind::DecodingError,
        format!("JSON for {} must be {}", ty, what),
    )
}

pub(crate) fn encode_value(ty: &Type, value: &Value) -> Result<Json> {
    match ty {
        Type::Never => Err(Error::new(
            ErrorKind::EncodingError,
            "Never has no encodable values",
        )),
        Type::Null => match value {
            Value::Null => Ok(Json::Null),
            _ => Err(shape_error(ty, value)),
        },
        Type::Boolean => match value {
            Value::Boolean(b) => Ok(json!(b)),
            _ => Err(shape_error(ty, value)),
        },
        Type::Integer => match value {
            // A string, so readers never round through f64.
            Value::Integer(n) => Ok(json!(n.to_string())),
            _ => Err(shape_error(ty, value)),
        },
        Type::Float => match value {
            Value::Float(x) => Ok(if x.is_nan() {
                json!("NaN")
            } else if *x == f64::INFINITY {
                json!("Infinity")
            } else if *x == f64::NEG_INFINITY {
                json!("-Infinity")
            } else {
                json!(x)
            }),
            _ => Err(shape_error(ty, value)),
        },
        Type::String => match value {
            Value::String(s) => Ok(json!(s)),
            _ => Err(shape_error(ty, value)),
        },
        Type::DateTime => match value {
            Value::DateTime(dt) => Ok(json!(dt.format(DATETIME_FORMAT).to_string())),
            _ => Err(shape_error(ty, value)),
        },
        Type::Blob => match value {
            Value::Blob(bytes) => Ok(json!(BASE64.encode(bytes.as_slice()))),
            _ => Err(shape_error(ty, value)),
        },
        Type::Ref(content) => match value {
            Value::Ref(cell) => encode_value(content, &cell.get()),
            _ => Err(shape_error(ty, value)),
        },
        Type::Array(item) => match value {
            Value::Array(items) => Ok(Json::Array(
                items
                    .iter()
                    .map(|v| encode_value(item, v))
                    .collect::<Result<Vec<_>>>()?,
            )),
            _ => Err(shape_error(ty, value)),
        },
        Type::Set(key) => match value {
            Value::Set(members) => Ok(Json::Array(
                members
                    .iter()
                    .map(|v| encode_value(key, v))
                    .collect::<Result<Vec<_>>>()?,
            )),
            _ => Err(shape_error(ty, value)),
        },
        Type::Dict(key_ty, value_ty) => match value {
            Value::Dict(entries) => Ok(Json::Array(
                entries
                    .iter()
                    .map(|(k, v)| {
                        Ok(Json::Array(vec![
                            encode_value(key_ty, k)?,
                            encode_value(value_ty, v)?,
                        ]))
                    })
                    .collect::<Result<Vec<_>>>()?,
            )),
            _ => Err(shape_error(ty, value)),
        },
        Type::Struct(st) => match value {
            Value::Struct(sv) => {
                if sv.fields.len() != st.fields.len() {
                    return Err(shape_error(ty, value));
                }
                let mut obj = serde_json::Map::new();
                for ((decl_name, field_ty), (name, field)) in
                    st.fields.iter().zip(sv.fields.iter())
                {
                    if decl_name != name {
                        return Err(Error::new(
                            ErrorKind::TypeMismatch,
                            format!("expected field '{}', found '{}'", decl_name, name),
                        ));
                    }
                    obj.insert(name.clone(), encode_value(field_ty, field)?);
                }
                Ok(Json::Object(obj))
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
                let (_, payload_ty) = &vt.tags[index];
                Ok(json!({
                    "type": v.tag,
                    "value": encode_value(payload_ty, &v.payload)?,
                }))
            }
            _ => Err(shape_error(ty, value)),
        },
        Type::Recursive(_) => encode_value(&ty.unfold(), value),
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
                Ok(json!({
                    "type": hex::encode(Type::Function(ft.clone()).canonical_hash()),
                    "params": fv.params,
                    "ir": ir_codec::expr_to_json(&fv.body)?,
                }))
            }
            _ => Err(shape_error(ty, value)),
        },
        Type::TypeType => match value {
            Value::Type(t) => Ok(ir_codec::type_to_json(t)),
            _ => Err(shape_error(ty, value)),
        },
    }
}

pub(crate) fn decode_value(ty: &Type, json: &Json, platform: &PlatformTable) -> Result<Value> {
    match ty {
        Type::Never => Err(Error::new(
            ErrorKind::DecodingError,
            "Never has no decodable values",
        )),
        Type::Null => match json {
            Json::Null => Ok(Value::Null),
            _ => Err(spelling_error(ty, "null")),
        },
        Type::Boolean => json
            .as_bool()
            .map(Value::Boolean)
            .ok_or_else(|| spelling_error(ty, "a boolean")),
        Type::Integer => {
            let text = json
                .as_str()
                .ok_or_else(|| spelling_error(ty, "a decimal string"))?;
            BigInt::parse_bytes(text.as_bytes(), 10)
                .map(Value::Integer)
                .ok_or_else(|| spelling_error(ty, "a decimal string"))
        }
        Type::Float => match json {
            Json::String(s) => match s.as_str() {
                "NaN" => Ok(Value::Float(f64::NAN)),
                "Infinity" => Ok(Value::Float(f64::INFINITY)),
                "-Infinity" => Ok(Value::Float(f64::NEG_INFINITY)),
                _ => Err(spelling_error(ty, "a number or a float sentinel")),
            },
            _ => json
                .as_f64()
                .map(Value::Float)
                .ok_or_else(|| spelling_error(ty, "a number or a float sentinel")),
        },
        Type::String => json
            .as_str()
            .map(Value::string)
            .ok_or_else(|| spelling_error(ty, "a string")),
        Type::DateTime => {
            let text = json
                .as_str()
                .ok_or_else(|| spelling_error(ty, "an ISO-8601 string"))?;
            let dt = NaiveDateTime::parse_from_str(text, DATETIME_FORMAT)
                .map_err(|_| spelling_error(ty, "an ISO-8601 string with milliseconds"))?;
            Ok(Value::DateTime(dt))
        }
        Type::Blob => {
            let text = json
                .as_str()
                .ok_or_else(|| spelling_error(ty, "a base64 string"))?;
            let bytes = BASE64
                .decode(text)
                .map_err(|_| Error::new(ErrorKind::DecodingError, "invalid base64 in blob"))?;
            Ok(Value::blob(bytes))
        }
        Type::Ref(content) => Ok(Value::ref_of(decode_value(content, json, platform)?)),
        Type::Array(item) => {
            let items = json
                .as_array()
                .ok_or_else(|| spelling_error(ty, "an array"))?;
            Ok(Value::array(
                items
                    .iter()
                    .map(|v| decode_value(item, v, platform))
                    .collect::<Result<Vec<_>>>()?,
            ))
        }
        Type::Set(key) => {
            let items = json
                .as_array()
                .ok_or_else(|| spelling_error(ty, "an array"))?;
            let mut members = std::collections::BTreeSet::new();
            for item in items {
                let member = decode_value(key, item, platform)?;
                if !members.insert(member) {
                    return Err(Error::new(
                        ErrorKind::DecodingError,
                        "duplicate set member",
                    ));
                }
            }
            Ok(Value::Set(Arc::new(members)))
        }
        Type::Dict(key_ty, value_ty) => {
            let pairs = json
                .as_array()
                .ok_or_else(|| spelling_error(ty, "an array of [key, value] pairs"))?;
            let mut entries = std::collections::BTreeMap::new();
            for pair in pairs {
                let pair = pair
                    .as_array()
                    .filter(|p| p.len() == 2)
                    .ok_or_else(|| spelling_error(ty, "an array of [key, value] pairs"))?;
                let key = decode_value(key_ty, &pair[0], platform)?;
                let value = decode_value(value_ty, &pair[1], platform)?;
                if entries.insert(key, value).is_some() {
                    return Err(Error::new(ErrorKind::DecodingError, "duplicate dict key"));
                }
            }
            Ok(Value::Dict(Arc::new(entries)))
        }
        Type::Struct(st) => {
            let obj = json
                .as_object()
                .ok_or_else(|| spelling_error(ty, "an object"))?;
            let mut fields = Vec::with_capacity(st.fields.len());
            for (name, field_ty) in &st.fields {
                let field = obj.get(name).ok_or_else(|| {
                    Error::new(
                        ErrorKind::MissingField,
                        format!("struct JSON is missing field '{}'", name),
                    )
                })?;
                fields.push((name.clone(), decode_value(field_ty, field, platform)?));
            }
            if let Some(extra) = obj.keys().find(|k| st.field(k).is_none()) {
                return Err(Error::new(
                    ErrorKind::ExtraField,
                    format!("struct JSON has undeclared field '{}'", extra),
                ));
            }
            Ok(Value::Struct(Arc::new(east_core::value::StructValue {
                fields,
            })))
        }
        Type::Variant(vt) => {
            let obj = json
                .as_object()
                .ok_or_else(|| spelling_error(ty, "a {type, value} object"))?;
            let tag = obj
                .get("type")
                .and_then(Json::as_str)
                .ok_or_else(|| spelling_error(ty, "a {type, value} object"))?;
            let index = vt.tag_index(tag).ok_or_else(|| {
                Error::new(
                    ErrorKind::UnknownVariantTag,
                    format!("variant type has no tag '{}'", tag),
                )
            })?;
            let (_, payload_ty) = &vt.tags[index];
            let payload = obj
                .get("value")
                .ok_or_else(|| spelling_error(ty, "a {type, value} object"))?;
            Ok(Value::variant_at(
                index as u32,
                tag.to_string(),
                decode_value(payload_ty, payload, platform)?,
            ))
        }
        Type::Recursive(_) => decode_value(&ty.unfold(), json, platform),
        Type::RecRef(_) => Err(Error::new(
            ErrorKind::DecodingError,
            "unbound recursion reference in decoder type",
        )),
        Type::Function(ft) => {
            let obj = json
                .as_object()
                .ok_or_else(|| spelling_error(ty, "a {type, params, ir} object"))?;
            let written_hash = obj
                .get("type")
                .and_then(Json::as_str)
                .ok_or_else(|| spelling_error(ty, "a {type, params, ir} object"))?;
            let expected = hex::encode(Type::Function(ft.clone()).canonical_hash());
            if written_hash != expected {
                return Err(Error::new(
                    ErrorKind::TypeMismatch,
                    "function type hash does not match the declared type",
                ));
            }
            let params = obj
                .get("params")
                .and_then(Json::as_array)
                .ok_or_else(|| spelling_error(ty, "a {type, params, ir} object"))?
                .iter()
                .map(|p| {
                    p.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| spelling_error(ty, "string parameter names"))
                })
                .collect::<Result<Vec<_>>>()?;
            let ir = obj
                .get("ir")
                .ok_or_else(|| spelling_error(ty, "a {type, params, ir} object"))?;
            let body = ir_codec::expr_from_json(ir, platform)?;
            let platform_refs = analysis::platform_refs(&body)?;
            let func = FunctionValue {
                ty: ft.clone(),
                params,
                body,
                platform_refs,
            };
            east_runtime::validate_function(&func, platform)?;
            Ok(Value::Function(Arc::new(func)))
        }
        Type::TypeType => Ok(Value::Type(ir_codec::type_from_json(json)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_platform() -> PlatformTable {
        PlatformTable::new()
    }

    fn roundtrip(ty: Type, value: Value) -> Json {
        let codec = JsonCodec::new(ty);
        let json = codec.encode(&value).unwrap();
        let back = codec.decode(&json, &empty_platform()).unwrap();
        assert_eq!(back, value);
        json
    }

    #[test]
    fn test_scalar_spellings() {
        assert_eq!(roundtrip(Type::Null, Value::Null), Json::Null);
        assert_eq!(roundtrip(Type::Boolean, Value::Boolean(true)), json!(true));
        assert_eq!(roundtrip(Type::String, Value::string("hi")), json!("hi"));
    }

    #[test]
    fn test_integer_is_a_string() {
        let big = Value::Integer(
            BigInt::parse_bytes(b"340282366920938463463374607431768211456", 10).unwrap(),
        );
        let json = roundtrip(Type::Integer, big);
        assert_eq!(json, json!("340282366920938463463374607431768211456"));
    }

    #[test]
    fn test_float_sentinels() {
        assert_eq!(roundtrip(Type::Float, Value::Float(f64::NAN)), json!("NaN"));
        assert_eq!(
            roundtrip(Type::Float, Value::Float(f64::INFINITY)),
            json!("Infinity")
        );
        assert_eq!(
            roundtrip(Type::Float, Value::Float(f64::NEG_INFINITY)),
            json!("-Infinity")
        );
        assert_eq!(roundtrip(Type::Float, Value::Float(1.5)), json!(1.5));
    }

    #[test]
    fn test_datetime_iso_spelling() {
        let value = Value::datetime_from_millis(1_700_000_000_123).unwrap();
        let json = roundtrip(Type::DateTime, value);
        assert_eq!(json, json!("2023-11-14T22:13:20.123Z"));
    }

    #[test]
    fn test_blob_is_base64() {
        let json = roundtrip(Type::Blob, Value::blob(vec![1, 2, 3, 255]));
        assert_eq!(json, json!("AQID/w=="));
        let codec = JsonCodec::new(Type::Blob);
        let err = codec
            .decode(&json!("not~base64~"), &empty_platform())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DecodingError);
    }

    #[test]
    fn test_dict_preserves_key_order() {
        let json = roundtrip(
            Type::dict(Type::String, Type::Integer),
            Value::dict_of(vec![
                (Value::string("b"), Value::integer(2)),
                (Value::string("a"), Value::integer(1)),
            ]),
        );
        assert_eq!(json, json!([["a", "1"], ["b", "2"]]));
    }

    #[test]
    fn test_struct_keys_in_declared_order() {
        let ty = Type::struct_of(vec![("zulu", Type::Integer), ("alpha", Type::Integer)]);
        let value = Value::struct_of(vec![
            ("zulu", Value::integer(1)),
            ("alpha", Value::integer(2)),
        ]);
        let json = roundtrip(ty, value);
        let rendered = serde_json::to_string(&json).unwrap();
        // preserve_order keeps declared order, not alphabetical.
        assert_eq!(rendered, r#"{"zulu":"1","alpha":"2"}"#);
    }

    #[test]
    fn test_struct_missing_and_extra_fields() {
        let ty = Type::struct_of(vec![("a", Type::Integer)]);
        let codec = JsonCodec::new(ty);
        let err = codec.decode(&json!({}), &empty_platform()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingField);
        let err = codec
            .decode(&json!({"a": "1", "b": "2"}), &empty_platform())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExtraField);
    }

    #[test]
    fn test_variant_spelling() {
        let ty = Type::variant_of(vec![("ok", Type::Integer), ("err", Type::String)]);
        let ok_value = Value::variant(&ty, "ok", Value::integer(7)).unwrap();
        let json = roundtrip(ty.clone(), ok_value);
        assert_eq!(json, json!({"type": "ok", "value": "7"}));
        let codec = JsonCodec::new(ty);
        let err = codec
            .decode(&json!({"type": "warn", "value": null}), &empty_platform())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownVariantTag);
    }

    #[test]
    fn test_recursive_unfolds() {
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
        roundtrip(list, value);
    }

    #[test]
    fn test_type_values_spell_as_type_objects() {
        let json = roundtrip(Type::TypeType, Value::Type(Type::array(Type::Integer)));
        assert_eq!(json, json!({"kind": "Array", "item": {"kind": "Integer"}}));
    }

    #[test]
    fn test_set_duplicates_rejected() {
        let codec = JsonCodec::new(Type::set(Type::Integer));
        let err = codec
            .decode(&json!(["1", "1"]), &empty_platform())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DecodingError);
    }
}
