//! The East value model
//!
//! Every value has a concrete type known to the caller; nothing here
//! discovers types from values. Containers keep the invariants the codec
//! depends on: dicts and sets iterate in ascending order of the total
//! value order (B-tree backed, so membership, insertion, deletion and
//! range iteration are all logarithmic), structs hold exactly their
//! declared fields in declared order, variants carry exactly one tag.
//!
//! `Array`, `Set`, `Dict`, `Struct` and `Variant` payloads are `Arc`
//! shared for O(1) cloning; mutation goes through [`RefValue`] cells and
//! is copy-on-write, so sharing identity exists only where a `Ref` type
//! says it does.

use crate::ir::FunctionValue;
use crate::types::Type;
use chrono::NaiveDateTime;
use num_bigint::BigInt;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, RwLock};

use crate::error::{Error, ErrorKind, Result};

/// A single-cell mutable reference. Shared by identity within a process;
/// the wire format carries only the inhabitant, never the identity.
///
/// The frozen flag is set by [`Value::freeze`]; writes to a frozen cell
/// fail with `FrozenMutation`.
pub struct RefValue {
    cell: RwLock<Value>,
    frozen: AtomicBool,
}

impl RefValue {
    pub fn new(value: Value) -> Self {
        RefValue {
            cell: RwLock::new(value),
            frozen: AtomicBool::new(false),
        }
    }

    /// Clone of the current inhabitant.
    pub fn get(&self) -> Value {
        self.cell.read().expect("ref cell poisoned").clone()
    }

    /// Replace the inhabitant in place.
    pub fn set(&self, value: Value) -> Result<()> {
        if self.is_frozen() {
            return Err(Error::new(
                ErrorKind::FrozenMutation,
                "assignment to a frozen ref cell",
            ));
        }
        *self.cell.write().expect("ref cell poisoned") = value;
        Ok(())
    }

    /// Mutate the inhabitant through a closure, respecting the frozen
    /// flag. Used by the container operators.
    pub fn update<R>(&self, f: impl FnOnce(&mut Value) -> Result<R>) -> Result<R> {
        if self.is_frozen() {
            return Err(Error::new(
                ErrorKind::FrozenMutation,
                "mutation of a frozen ref cell",
            ));
        }
        f(&mut self.cell.write().expect("ref cell poisoned"))
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(AtomicOrdering::Acquire)
    }

    fn mark_frozen(&self) {
        self.frozen.store(true, AtomicOrdering::Release);
    }
}

impl fmt::Debug for RefValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefValue")
            .field("value", &self.get())
            .field("frozen", &self.is_frozen())
            .finish()
    }
}

/// A struct value: the declared fields, in declared order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct StructValue {
    pub fields: Vec<(String, Value)>,
}

impl StructValue {
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }
}

/// A variant value: exactly one tag and its payload.
///
/// The tag's position in the declared tag list travels with the value:
/// the total order compares declared positions, and the codec writes
/// them as the wire tag index, so neither needs the type at hand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantValue {
    pub tag: String,
    /// Position of the tag in the declared tag list of the value's
    /// variant type.
    pub index: u32,
    pub payload: Value,
}

/// An East value. Equality and ordering are the semantic total order
/// defined in `compare`; two values of the same type always compare.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(BigInt),
    Float(f64),
    String(String),
    /// Millisecond instant, no timezone. Sub-millisecond precision is
    /// truncated on construction.
    DateTime(NaiveDateTime),
    Blob(Arc<Vec<u8>>),
    Ref(Arc<RefValue>),
    Array(Arc<Vec<Value>>),
    Set(Arc<BTreeSet<Value>>),
    Dict(Arc<BTreeMap<Value, Value>>),
    Struct(Arc<StructValue>),
    Variant(Arc<VariantValue>),
    /// A type as a value (of type `TypeType`).
    Type(Type),
    Function(Arc<FunctionValue>),
}

impl Value {
    pub fn integer(n: i64) -> Value {
        Value::Integer(BigInt::from(n))
    }

    pub fn string(s: impl Into<String>) -> Value {
        Value::String(s.into())
    }

    pub fn blob(bytes: Vec<u8>) -> Value {
        Value::Blob(Arc::new(bytes))
    }

    pub fn array(items: Vec<Value>) -> Value {
        Value::Array(Arc::new(items))
    }

    pub fn set_of(members: impl IntoIterator<Item = Value>) -> Value {
        Value::Set(Arc::new(members.into_iter().collect()))
    }

    pub fn dict_of(entries: impl IntoIterator<Item = (Value, Value)>) -> Value {
        Value::Dict(Arc::new(entries.into_iter().collect()))
    }

    pub fn struct_of<S: Into<String>>(fields: Vec<(S, Value)>) -> Value {
        Value::Struct(Arc::new(StructValue {
            fields: fields.into_iter().map(|(n, v)| (n.into(), v)).collect(),
        }))
    }

    /// Construct a variant under its declared type (unfolded as needed);
    /// the tag's declared position is resolved here and drives ordering
    /// and the wire tag index.
    pub fn variant(ty: &Type, tag: impl Into<String>, payload: Value) -> Result<Value> {
        let tag = tag.into();
        match ty.unfold() {
            Type::Variant(vt) => {
                let index = vt.tag_index(&tag).ok_or_else(|| {
                    Error::new(
                        ErrorKind::UnknownVariantTag,
                        format!("variant type has no tag '{}'", tag),
                    )
                })?;
                Ok(Value::variant_at(index as u32, tag, payload))
            }
            other => Err(Error::new(
                ErrorKind::TypeMismatch,
                format!("{} is not a variant type", other),
            )),
        }
    }

    /// Construct a variant from an already-resolved declared position.
    pub fn variant_at(index: u32, tag: impl Into<String>, payload: Value) -> Value {
        Value::Variant(Arc::new(VariantValue {
            tag: tag.into(),
            index,
            payload,
        }))
    }

    pub fn ref_of(value: Value) -> Value {
        Value::Ref(Arc::new(RefValue::new(value)))
    }

    /// Instant from milliseconds since the Unix epoch.
    pub fn datetime_from_millis(millis: i64) -> Result<Value> {
        let dt = chrono::DateTime::from_timestamp_millis(millis).ok_or_else(|| {
            Error::new(
                ErrorKind::DecodingError,
                format!("datetime out of range: {} ms", millis),
            )
        })?;
        Ok(Value::DateTime(dt.naive_utc()))
    }

    /// Milliseconds since the Unix epoch for a DateTime value.
    pub fn datetime_to_millis(dt: &NaiveDateTime) -> i64 {
        dt.and_utc().timestamp_millis()
    }

    /// One-word name of the value's shape, for error messages.
    pub fn shape_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::DateTime(_) => "datetime",
            Value::Blob(_) => "blob",
            Value::Ref(_) => "ref",
            Value::Array(_) => "array",
            Value::Set(_) => "set",
            Value::Dict(_) => "dict",
            Value::Struct(_) => "struct",
            Value::Variant(_) => "variant",
            Value::Type(_) => "type",
            Value::Function(_) => "function",
        }
    }

    /// Mark every ref cell reachable from this value as frozen. Cyclic
    /// structures are handled; each cell is visited once.
    pub fn freeze(&self) {
        let mut visited: Vec<*const RefValue> = Vec::new();
        self.freeze_walk(&mut visited);
    }

    fn freeze_walk(&self, visited: &mut Vec<*const RefValue>) {
        match self {
            Value::Ref(cell) => {
                let ptr = Arc::as_ptr(cell);
                if visited.contains(&ptr) {
                    return;
                }
                visited.push(ptr);
                let inner = cell.get();
                cell.mark_frozen();
                inner.freeze_walk(visited);
            }
            Value::Array(items) => {
                for item in items.iter() {
                    item.freeze_walk(visited);
                }
            }
            Value::Set(members) => {
                for member in members.iter() {
                    member.freeze_walk(visited);
                }
            }
            Value::Dict(entries) => {
                for (k, v) in entries.iter() {
                    k.freeze_walk(visited);
                    v.freeze_walk(visited);
                }
            }
            Value::Struct(s) => {
                for (_, v) in &s.fields {
                    v.freeze_walk(visited);
                }
            }
            Value::Variant(v) => v.payload.freeze_walk(visited),
            _ => {}
        }
    }

    /// Does this value inhabit `ty`? Recursive types are unfolded as
    /// needed; the depth guard rejects pathological nesting rather than
    /// recursing forever.
    pub fn conforms_to(&self, ty: &Type) -> bool {
        self.conforms_depth(ty, 0)
    }

    fn conforms_depth(&self, ty: &Type, depth: u32) -> bool {
        const MAX_DEPTH: u32 = 4096;
        if depth > MAX_DEPTH {
            return false;
        }
        match (self, ty) {
            (_, Type::Recursive(_)) => self.conforms_depth(&ty.unfold(), depth + 1),
            (Value::Null, Type::Null) => true,
            (Value::Boolean(_), Type::Boolean) => true,
            (Value::Integer(_), Type::Integer) => true,
            (Value::Float(_), Type::Float) => true,
            (Value::String(_), Type::String) => true,
            (Value::DateTime(_), Type::DateTime) => true,
            (Value::Blob(_), Type::Blob) => true,
            (Value::Ref(cell), Type::Ref(content)) => {
                cell.get().conforms_depth(content, depth + 1)
            }
            (Value::Array(items), Type::Array(item_ty)) => items
                .iter()
                .all(|v| v.conforms_depth(item_ty, depth + 1)),
            (Value::Set(members), Type::Set(key_ty)) => members
                .iter()
                .all(|v| v.conforms_depth(key_ty, depth + 1)),
            (Value::Dict(entries), Type::Dict(key_ty, value_ty)) => {
                entries.iter().all(|(k, v)| {
                    k.conforms_depth(key_ty, depth + 1) && v.conforms_depth(value_ty, depth + 1)
                })
            }
            (Value::Struct(s), Type::Struct(st)) => {
                s.fields.len() == st.fields.len()
                    && s.fields.iter().zip(st.fields.iter()).all(
                        |((vn, v), (tn, t))| vn == tn && v.conforms_depth(t, depth + 1),
                    )
            }
            (Value::Variant(v), Type::Variant(vt)) => match vt.tag_index(&v.tag) {
                Some(index) if index == v.index as usize => {
                    let (_, payload_ty) = &vt.tags[index];
                    v.payload.conforms_depth(payload_ty, depth + 1)
                }
                _ => false,
            },
            (Value::Type(_), Type::TypeType) => true,
            (Value::Function(f), Type::Function(ft)) => {
                Type::Function(f.ty.clone()).compatible(&Type::Function(ft.clone()))
            }
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(n) => write!(f, "{}", n),
            Value::Float(x) => {
                if x.is_nan() {
                    write!(f, "NaN")
                } else if x.is_infinite() {
                    write!(f, "{}", if *x > 0.0 { "Infinity" } else { "-Infinity" })
                } else {
                    write!(f, "{:?}", x)
                }
            }
            Value::String(s) => write!(f, "{:?}", s),
            Value::DateTime(dt) => write!(f, "{}Z", dt.format("%Y-%m-%dT%H:%M:%S%.3f")),
            Value::Blob(bytes) => write!(f, "0x{}", hex::encode(bytes.as_slice())),
            Value::Ref(cell) => write!(f, "ref({})", cell.get()),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
            Value::Set(members) => {
                write!(f, "{{")?;
                for (i, v) in members.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "}}")
            }
            Value::Dict(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
            Value::Struct(s) => {
                write!(f, "{{")?;
                for (i, (n, v)) in s.fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", n, v)?;
                }
                write!(f, "}}")
            }
            Value::Variant(v) => write!(f, "{}({})", v.tag, v.payload),
            Value::Type(t) => write!(f, "{}", t),
            Value::Function(func) => write!(f, "<function: {}>", Type::Function(func.ty.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ref_set_and_get() {
        let cell = RefValue::new(Value::integer(1));
        assert_eq!(cell.get(), Value::integer(1));
        cell.set(Value::integer(2)).unwrap();
        assert_eq!(cell.get(), Value::integer(2));
    }

    #[test]
    fn test_frozen_ref_rejects_writes() {
        let value = Value::ref_of(Value::integer(1));
        value.freeze();
        match &value {
            Value::Ref(cell) => {
                let err = cell.set(Value::integer(2)).unwrap_err();
                assert_eq!(err.kind(), ErrorKind::FrozenMutation);
                assert_eq!(cell.get(), Value::integer(1));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_freeze_reaches_nested_refs() {
        let inner = Value::ref_of(Value::integer(7));
        let outer = Value::array(vec![inner.clone(), Value::Null]);
        outer.freeze();
        match &inner {
            Value::Ref(cell) => assert!(cell.is_frozen()),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_freeze_handles_cycles() {
        let cell = Value::ref_of(Value::Null);
        if let Value::Ref(r) = &cell {
            // Tie the knot: the cell contains an array containing the cell.
            r.set(Value::array(vec![cell.clone()])).unwrap();
        }
        cell.freeze();
        if let Value::Ref(r) = &cell {
            assert!(r.is_frozen());
        }
    }

    #[test]
    fn test_conforms_to_containers() {
        let ty = Type::dict(Type::String, Type::array(Type::Integer));
        let value = Value::dict_of(vec![(
            Value::string("xs"),
            Value::array(vec![Value::integer(1), Value::integer(2)]),
        )]);
        assert!(value.conforms_to(&ty));
        assert!(!Value::integer(3).conforms_to(&ty));
    }

    #[test]
    fn test_conforms_to_recursive() {
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
        assert!(value.conforms_to(&list));
        assert!(!Value::variant_at(7, "oops", Value::Null).conforms_to(&list));
        // A right tag under a wrong declared position is malformed too.
        assert!(!Value::variant_at(1, "nil", Value::Null).conforms_to(&list));
    }

    #[test]
    fn test_datetime_millis_roundtrip() {
        let v = Value::datetime_from_millis(1_700_000_000_123).unwrap();
        match &v {
            Value::DateTime(dt) => {
                assert_eq!(Value::datetime_to_millis(dt), 1_700_000_000_123);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_display_is_readable() {
        let v = Value::struct_of(vec![
            ("name", Value::string("tripler")),
            ("count", Value::integer(3)),
        ]);
        assert_eq!(format!("{}", v), "{name: \"tripler\", count: 3}");
    }
}
