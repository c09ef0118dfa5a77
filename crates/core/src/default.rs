//! Default values
//!
//! Every defaultable type has a canonical "zero" inhabitant: empty
//! containers, zero numbers, the epoch instant, a variant's first
//! declared tag with that tag's default payload. `Never` has no
//! inhabitant and function types have no canonical body, so both error.

use crate::error::{Error, ErrorKind, Result};
use crate::types::Type;
use crate::value::Value;

/// Unfold budget for recursive types. A recursive type whose default
/// expansion never reaches a non-recursive tag is reported instead of
/// looping.
const MAX_UNFOLD_DEPTH: u32 = 64;

/// Build the default value of a type.
pub fn default_of(ty: &Type) -> Result<Value> {
    default_depth(ty, 0)
}

fn default_depth(ty: &Type, depth: u32) -> Result<Value> {
    if depth > MAX_UNFOLD_DEPTH {
        return Err(Error::new(
            ErrorKind::TypeMismatch,
            "recursive type has no finite default value",
        ));
    }
    match ty {
        Type::Never => Err(Error::new(
            ErrorKind::TypeMismatch,
            "Never has no default value",
        )),
        Type::Null => Ok(Value::Null),
        Type::Boolean => Ok(Value::Boolean(false)),
        Type::Integer => Ok(Value::integer(0)),
        Type::Float => Ok(Value::Float(0.0)),
        Type::String => Ok(Value::string("")),
        Type::DateTime => Value::datetime_from_millis(0),
        Type::Blob => Ok(Value::blob(Vec::new())),
        Type::Ref(content) => Ok(Value::ref_of(default_depth(content, depth + 1)?)),
        Type::Array(_) => Ok(Value::array(Vec::new())),
        Type::Set(_) => Ok(Value::set_of(Vec::new())),
        Type::Dict(_, _) => Ok(Value::dict_of(Vec::new())),
        Type::Struct(s) => {
            let mut fields = Vec::with_capacity(s.fields.len());
            for (name, field_ty) in &s.fields {
                fields.push((name.clone(), default_depth(field_ty, depth + 1)?));
            }
            Ok(Value::Struct(std::sync::Arc::new(
                crate::value::StructValue { fields },
            )))
        }
        Type::Variant(v) => {
            let (tag, payload_ty) = v.tags.first().ok_or_else(|| {
                Error::new(ErrorKind::TypeMismatch, "variant type has no tags")
            })?;
            Ok(Value::variant_at(
                0,
                tag.clone(),
                default_depth(payload_ty, depth + 1)?,
            ))
        }
        Type::Recursive(_) => default_depth(&ty.unfold(), depth + 1),
        Type::RecRef(_) => Err(Error::new(
            ErrorKind::TypeMismatch,
            "unbound recursion reference has no default value",
        )),
        Type::Function(_) => Err(Error::new(
            ErrorKind::TypeMismatch,
            "function types have no default value",
        )),
        Type::TypeType => Ok(Value::Type(Type::Null)),
    }
}
