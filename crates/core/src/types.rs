//! The East type algebra
//!
//! A closed, recursive sum of semantic types. Types are structural: two
//! types are equal iff their shapes match recursively, with struct field
//! order significant and variant tag order insignificant (tags are
//! addressed by name). Types are themselves values — their type is
//! [`Type::TypeType`] — so the codecs can move them between hosts.
//!
//! Recursive types use de Bruijn back-references: `Type::RecRef(0)`
//! inside the body of a `Type::Recursive` refers to the nearest enclosing
//! binder. [`Type::unfold`] expands one level, which is required wherever
//! a recursive value is destructured.
//!
//! Every type has a canonical byte form (variant tags in name order) from
//! which equality, hashing, ordering and the wire-level canonical hash
//! are all derived, so they cannot disagree.

use crate::error::{Error, ErrorKind, Result};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Sync or async flavor of a function type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FunctionFlavor {
    Sync,
    Async,
}

/// A heterogeneous record type with a declared, ordered field list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructType {
    /// Fields in declared order. Order is significant for identity,
    /// comparison and the wire format.
    pub fields: Vec<(String, Type)>,
}

impl StructType {
    pub fn field(&self, name: &str) -> Option<&Type> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, t)| t)
    }
}

/// A tagged union type. A value carries exactly one tag and an inhabitant
/// of that tag's payload type.
#[derive(Debug, Clone)]
pub struct VariantType {
    /// Tags in declared order. Declared order drives value comparison and
    /// the wire tag index, but is insignificant for type identity.
    pub tags: Vec<(String, Type)>,
}

impl VariantType {
    pub fn payload(&self, tag: &str) -> Option<&Type> {
        self.tags.iter().find(|(n, _)| n == tag).map(|(_, t)| t)
    }

    /// Position of a tag in the declared list (the wire tag index).
    pub fn tag_index(&self, tag: &str) -> Option<usize> {
        self.tags.iter().position(|(n, _)| n == tag)
    }
}

// Tag order is insignificant for identity: compare as name-sorted lists.
impl PartialEq for VariantType {
    fn eq(&self, other: &Self) -> bool {
        if self.tags.len() != other.tags.len() {
            return false;
        }
        let mut a: Vec<&(String, Type)> = self.tags.iter().collect();
        let mut b: Vec<&(String, Type)> = other.tags.iter().collect();
        a.sort_by(|x, y| x.0.cmp(&y.0));
        b.sort_by(|x, y| x.0.cmp(&y.0));
        a == b
    }
}

impl Eq for VariantType {}

/// A function type: parameter list, result, flavor, and an optional
/// allowlist restricting which platform functions the body may call.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct FunctionType {
    pub params: Vec<Type>,
    pub result: Type,
    pub flavor: FunctionFlavor,
    pub allowlist: Option<Vec<String>>,
}

/// The closed East type algebra.
#[derive(Debug, Clone)]
pub enum Type {
    /// Uninhabited bottom type.
    Never,
    /// Single inhabitant `null`.
    Null,
    Boolean,
    /// Arbitrary-precision signed integer.
    Integer,
    /// IEEE-754 binary64.
    Float,
    /// Unicode scalar sequence.
    String,
    /// Millisecond instant on the proleptic Gregorian calendar, no zone.
    DateTime,
    /// Opaque byte sequence.
    Blob,
    /// Single-cell mutable reference.
    Ref(Arc<Type>),
    /// Ordered sequence.
    Array(Arc<Type>),
    /// Ordered set, unique members under the total order on the key type.
    Set(Arc<Type>),
    /// Ordered map, unique keys under the total order on the key type.
    Dict(Arc<Type>, Arc<Type>),
    Struct(Arc<StructType>),
    Variant(Arc<VariantType>),
    /// Explicit fix-point: `RecRef(0)` in the body refers to this binder.
    Recursive(Arc<Type>),
    /// De Bruijn back-reference to an enclosing `Recursive` binder.
    RecRef(u32),
    Function(Arc<FunctionType>),
    /// The type of types themselves.
    TypeType,
}

impl Type {
    pub fn ref_of(content: Type) -> Type {
        Type::Ref(Arc::new(content))
    }

    pub fn array(item: Type) -> Type {
        Type::Array(Arc::new(item))
    }

    pub fn set(key: Type) -> Type {
        Type::Set(Arc::new(key))
    }

    pub fn dict(key: Type, value: Type) -> Type {
        Type::Dict(Arc::new(key), Arc::new(value))
    }

    pub fn struct_of<S: Into<String>>(fields: Vec<(S, Type)>) -> Type {
        let fields: Vec<(String, Type)> =
            fields.into_iter().map(|(n, t)| (n.into(), t)).collect();
        debug_assert!(unique_names(fields.iter().map(|(n, _)| n.as_str())));
        Type::Struct(Arc::new(StructType { fields }))
    }

    pub fn variant_of<S: Into<String>>(tags: Vec<(S, Type)>) -> Type {
        let tags: Vec<(String, Type)> = tags.into_iter().map(|(n, t)| (n.into(), t)).collect();
        debug_assert!(unique_names(tags.iter().map(|(n, _)| n.as_str())));
        Type::Variant(Arc::new(VariantType { tags }))
    }

    pub fn recursive(body: Type) -> Type {
        Type::Recursive(Arc::new(body))
    }

    pub fn function(params: Vec<Type>, result: Type) -> Type {
        Type::Function(Arc::new(FunctionType {
            params,
            result,
            flavor: FunctionFlavor::Sync,
            allowlist: None,
        }))
    }

    pub fn async_function(params: Vec<Type>, result: Type) -> Type {
        Type::Function(Arc::new(FunctionType {
            params,
            result,
            flavor: FunctionFlavor::Async,
            allowlist: None,
        }))
    }

    pub fn function_with_allowlist(
        params: Vec<Type>,
        result: Type,
        flavor: FunctionFlavor,
        allowlist: Vec<String>,
    ) -> Type {
        Type::Function(Arc::new(FunctionType {
            params,
            result,
            flavor,
            allowlist: Some(allowlist),
        }))
    }

    /// Expand a recursive type one level: substitute the whole type for
    /// depth-0 back-references in its body. Non-recursive types unfold to
    /// themselves.
    pub fn unfold(&self) -> Type {
        match self {
            Type::Recursive(body) => substitute(body, 0, self),
            other => other.clone(),
        }
    }

    /// `Never` is a subtype of every type; otherwise subtyping is
    /// structural identity (no numeric coercion, no struct or variant
    /// widening, no implicit `Null`), modulo one fold/unfold step of
    /// recursive types.
    pub fn is_subtype(&self, other: &Type) -> bool {
        matches!(self, Type::Never) || self.compatible(other)
    }

    /// May a value of `source` be used where `self` is expected?
    pub fn is_assignable(&self, source: &Type) -> bool {
        source.is_subtype(self)
    }

    /// Equality modulo one level of recursive fold/unfold.
    pub fn compatible(&self, other: &Type) -> bool {
        if self == other {
            return true;
        }
        if matches!(self, Type::Recursive(_)) && self.unfold() == *other {
            return true;
        }
        if matches!(other, Type::Recursive(_)) && *self == other.unfold() {
            return true;
        }
        false
    }

    /// The canonical byte form: a self-contained, decodable spelling of
    /// the type with variant tags in name order. This is the preimage of
    /// [`Type::canonical_hash`] and the wire form of `TypeType` values.
    pub fn to_canonical_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        write_type(self, &mut out);
        out
    }

    /// Parse a type from its canonical byte form. Returns the type and the
    /// number of bytes consumed.
    pub fn from_canonical_bytes(bytes: &[u8]) -> Result<(Type, usize)> {
        let mut pos = 0usize;
        let ty = read_type(bytes, &mut pos, 0)?;
        Ok((ty, pos))
    }

    /// SHA-256 of the canonical byte form. Equal types (including types
    /// differing only in variant tag order) hash identically.
    pub fn canonical_hash(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.to_canonical_bytes());
        hasher.finalize().into()
    }
}

fn unique_names<'a>(names: impl Iterator<Item = &'a str>) -> bool {
    let mut seen = std::collections::HashSet::new();
    names.into_iter().all(|n| seen.insert(n))
}

/// Substitute `with` for back-references at `depth` throughout `ty`.
fn substitute(ty: &Type, depth: u32, with: &Type) -> Type {
    match ty {
        Type::RecRef(d) if *d == depth => with.clone(),
        Type::RecRef(d) => Type::RecRef(*d),
        Type::Recursive(body) => Type::Recursive(Arc::new(substitute(body, depth + 1, with))),
        Type::Ref(t) => Type::Ref(Arc::new(substitute(t, depth, with))),
        Type::Array(t) => Type::Array(Arc::new(substitute(t, depth, with))),
        Type::Set(t) => Type::Set(Arc::new(substitute(t, depth, with))),
        Type::Dict(k, v) => Type::Dict(
            Arc::new(substitute(k, depth, with)),
            Arc::new(substitute(v, depth, with)),
        ),
        Type::Struct(s) => Type::Struct(Arc::new(StructType {
            fields: s
                .fields
                .iter()
                .map(|(n, t)| (n.clone(), substitute(t, depth, with)))
                .collect(),
        })),
        Type::Variant(v) => Type::Variant(Arc::new(VariantType {
            tags: v
                .tags
                .iter()
                .map(|(n, t)| (n.clone(), substitute(t, depth, with)))
                .collect(),
        })),
        Type::Function(f) => Type::Function(Arc::new(FunctionType {
            params: f.params.iter().map(|t| substitute(t, depth, with)).collect(),
            result: substitute(&f.result, depth, with),
            flavor: f.flavor,
            allowlist: f.allowlist.clone(),
        })),
        leaf => leaf.clone(),
    }
}

// Canonical byte form tags. The form is decodable: it is also the wire
// encoding of TypeType values.
const TAG_NEVER: u8 = 0;
const TAG_NULL: u8 = 1;
const TAG_BOOLEAN: u8 = 2;
const TAG_INTEGER: u8 = 3;
const TAG_FLOAT: u8 = 4;
const TAG_STRING: u8 = 5;
const TAG_DATETIME: u8 = 6;
const TAG_BLOB: u8 = 7;
const TAG_REF: u8 = 8;
const TAG_ARRAY: u8 = 9;
const TAG_SET: u8 = 10;
const TAG_DICT: u8 = 11;
const TAG_STRUCT: u8 = 12;
const TAG_VARIANT: u8 = 13;
const TAG_RECURSIVE: u8 = 14;
const TAG_RECREF: u8 = 15;
const TAG_FUNCTION: u8 = 16;
const TAG_ASYNC_FUNCTION: u8 = 17;
const TAG_TYPE: u8 = 18;

fn write_uleb(mut value: u64, out: &mut Vec<u8>) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            break;
        }
    }
}

fn read_uleb(bytes: &[u8], pos: &mut usize) -> Result<u64> {
    let mut value: u64 = 0;
    let mut shift: u32 = 0;
    loop {
        let byte = *bytes.get(*pos).ok_or_else(|| {
            Error::new(ErrorKind::DecodingError, "truncated LEB128 in type form")
        })?;
        *pos += 1;
        if shift >= 64 {
            return Err(Error::new(
                ErrorKind::DecodingError,
                "LEB128 overrun in type form",
            ));
        }
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
    }
}

fn write_name(name: &str, out: &mut Vec<u8>) {
    write_uleb(name.len() as u64, out);
    out.extend_from_slice(name.as_bytes());
}

fn read_name(bytes: &[u8], pos: &mut usize) -> Result<String> {
    let len = read_uleb(bytes, pos)? as usize;
    let end = pos
        .checked_add(len)
        .filter(|&e| e <= bytes.len())
        .ok_or_else(|| Error::new(ErrorKind::DecodingError, "truncated name in type form"))?;
    let s = std::str::from_utf8(&bytes[*pos..end])
        .map_err(|_| Error::new(ErrorKind::DecodingError, "invalid UTF-8 in type form"))?
        .to_string();
    *pos = end;
    Ok(s)
}

fn write_type(ty: &Type, out: &mut Vec<u8>) {
    match ty {
        Type::Never => out.push(TAG_NEVER),
        Type::Null => out.push(TAG_NULL),
        Type::Boolean => out.push(TAG_BOOLEAN),
        Type::Integer => out.push(TAG_INTEGER),
        Type::Float => out.push(TAG_FLOAT),
        Type::String => out.push(TAG_STRING),
        Type::DateTime => out.push(TAG_DATETIME),
        Type::Blob => out.push(TAG_BLOB),
        Type::Ref(t) => {
            out.push(TAG_REF);
            write_type(t, out);
        }
        Type::Array(t) => {
            out.push(TAG_ARRAY);
            write_type(t, out);
        }
        Type::Set(t) => {
            out.push(TAG_SET);
            write_type(t, out);
        }
        Type::Dict(k, v) => {
            out.push(TAG_DICT);
            write_type(k, out);
            write_type(v, out);
        }
        Type::Struct(s) => {
            out.push(TAG_STRUCT);
            write_uleb(s.fields.len() as u64, out);
            for (name, field) in &s.fields {
                write_name(name, out);
                write_type(field, out);
            }
        }
        Type::Variant(v) => {
            out.push(TAG_VARIANT);
            write_uleb(v.tags.len() as u64, out);
            // Name order, so that equal types share one canonical form.
            let mut sorted: Vec<&(String, Type)> = v.tags.iter().collect();
            sorted.sort_by(|a, b| a.0.cmp(&b.0));
            for (name, payload) in sorted {
                write_name(name, out);
                write_type(payload, out);
            }
        }
        Type::Recursive(body) => {
            out.push(TAG_RECURSIVE);
            write_type(body, out);
        }
        Type::RecRef(depth) => {
            out.push(TAG_RECREF);
            write_uleb(u64::from(*depth), out);
        }
        Type::Function(f) => {
            out.push(match f.flavor {
                FunctionFlavor::Sync => TAG_FUNCTION,
                FunctionFlavor::Async => TAG_ASYNC_FUNCTION,
            });
            write_uleb(f.params.len() as u64, out);
            for param in &f.params {
                write_type(param, out);
            }
            write_type(&f.result, out);
            match &f.allowlist {
                None => out.push(0),
                Some(names) => {
                    out.push(1);
                    write_uleb(names.len() as u64, out);
                    for name in names {
                        write_name(name, out);
                    }
                }
            }
        }
        Type::TypeType => out.push(TAG_TYPE),
    }
}

// Nesting guard for untrusted input: corrupted bytes must produce an
// error, never exhaust the stack.
const MAX_TYPE_DEPTH: u32 = 512;

fn read_type(bytes: &[u8], pos: &mut usize, depth: u32) -> Result<Type> {
    if depth > MAX_TYPE_DEPTH {
        return Err(Error::new(
            ErrorKind::DecodingError,
            "type form nests too deeply",
        ));
    }
    let tag = *bytes
        .get(*pos)
        .ok_or_else(|| Error::new(ErrorKind::DecodingError, "truncated type form"))?;
    *pos += 1;
    match tag {
        TAG_NEVER => Ok(Type::Never),
        TAG_NULL => Ok(Type::Null),
        TAG_BOOLEAN => Ok(Type::Boolean),
        TAG_INTEGER => Ok(Type::Integer),
        TAG_FLOAT => Ok(Type::Float),
        TAG_STRING => Ok(Type::String),
        TAG_DATETIME => Ok(Type::DateTime),
        TAG_BLOB => Ok(Type::Blob),
        TAG_REF => Ok(Type::Ref(Arc::new(read_type(bytes, pos, depth + 1)?))),
        TAG_ARRAY => Ok(Type::Array(Arc::new(read_type(bytes, pos, depth + 1)?))),
        TAG_SET => Ok(Type::Set(Arc::new(read_type(bytes, pos, depth + 1)?))),
        TAG_DICT => {
            let key = read_type(bytes, pos, depth + 1)?;
            let value = read_type(bytes, pos, depth + 1)?;
            Ok(Type::Dict(Arc::new(key), Arc::new(value)))
        }
        TAG_STRUCT => {
            let count = read_uleb(bytes, pos)? as usize;
            let mut fields = Vec::with_capacity(count.min(1024));
            for _ in 0..count {
                let name = read_name(bytes, pos)?;
                let field = read_type(bytes, pos, depth + 1)?;
                fields.push((name, field));
            }
            Ok(Type::Struct(Arc::new(StructType { fields })))
        }
        TAG_VARIANT => {
            let count = read_uleb(bytes, pos)? as usize;
            if count == 0 {
                return Err(Error::new(
                    ErrorKind::DecodingError,
                    "variant type with no tags",
                ));
            }
            let mut tags = Vec::with_capacity(count.min(1024));
            for _ in 0..count {
                let name = read_name(bytes, pos)?;
                let payload = read_type(bytes, pos, depth + 1)?;
                tags.push((name, payload));
            }
            Ok(Type::Variant(Arc::new(VariantType { tags })))
        }
        TAG_RECURSIVE => Ok(Type::Recursive(Arc::new(read_type(bytes, pos, depth + 1)?))),
        TAG_RECREF => {
            let depth = read_uleb(bytes, pos)?;
            let depth = u32::try_from(depth).map_err(|_| {
                Error::new(ErrorKind::DecodingError, "recursion depth out of range")
            })?;
            Ok(Type::RecRef(depth))
        }
        TAG_FUNCTION | TAG_ASYNC_FUNCTION => {
            let count = read_uleb(bytes, pos)? as usize;
            let mut params = Vec::with_capacity(count.min(1024));
            for _ in 0..count {
                params.push(read_type(bytes, pos, depth + 1)?);
            }
            let result = read_type(bytes, pos, depth + 1)?;
            let allowlist = match bytes.get(*pos) {
                Some(0) => {
                    *pos += 1;
                    None
                }
                Some(1) => {
                    *pos += 1;
                    let n = read_uleb(bytes, pos)? as usize;
                    let mut names = Vec::with_capacity(n.min(1024));
                    for _ in 0..n {
                        names.push(read_name(bytes, pos)?);
                    }
                    Some(names)
                }
                Some(_) => {
                    return Err(Error::new(
                        ErrorKind::DecodingError,
                        "invalid allowlist marker in type form",
                    ));
                }
                None => {
                    return Err(Error::new(ErrorKind::DecodingError, "truncated type form"));
                }
            };
            Ok(Type::Function(Arc::new(FunctionType {
                params,
                result,
                flavor: if tag == TAG_FUNCTION {
                    FunctionFlavor::Sync
                } else {
                    FunctionFlavor::Async
                },
                allowlist,
            })))
        }
        TAG_TYPE => Ok(Type::TypeType),
        other => Err(Error::new(
            ErrorKind::DecodingError,
            format!("unknown type tag {}", other),
        )),
    }
}

// Equality, hashing and ordering all agree with the canonical byte form.

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Type::Never, Type::Never)
            | (Type::Null, Type::Null)
            | (Type::Boolean, Type::Boolean)
            | (Type::Integer, Type::Integer)
            | (Type::Float, Type::Float)
            | (Type::String, Type::String)
            | (Type::DateTime, Type::DateTime)
            | (Type::Blob, Type::Blob)
            | (Type::TypeType, Type::TypeType) => true,
            (Type::Ref(a), Type::Ref(b))
            | (Type::Array(a), Type::Array(b))
            | (Type::Set(a), Type::Set(b))
            | (Type::Recursive(a), Type::Recursive(b)) => a == b,
            (Type::Dict(ka, va), Type::Dict(kb, vb)) => ka == kb && va == vb,
            (Type::Struct(a), Type::Struct(b)) => a == b,
            (Type::Variant(a), Type::Variant(b)) => a == b,
            (Type::RecRef(a), Type::RecRef(b)) => a == b,
            (Type::Function(a), Type::Function(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Type {}

impl Hash for Type {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write(&self.to_canonical_bytes());
    }
}

impl PartialOrd for Type {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Type {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_canonical_bytes().cmp(&other.to_canonical_bytes())
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Never => write!(f, "Never"),
            Type::Null => write!(f, "Null"),
            Type::Boolean => write!(f, "Boolean"),
            Type::Integer => write!(f, "Integer"),
            Type::Float => write!(f, "Float"),
            Type::String => write!(f, "String"),
            Type::DateTime => write!(f, "DateTime"),
            Type::Blob => write!(f, "Blob"),
            Type::Ref(t) => write!(f, "Ref<{}>", t),
            Type::Array(t) => write!(f, "Array<{}>", t),
            Type::Set(t) => write!(f, "Set<{}>", t),
            Type::Dict(k, v) => write!(f, "Dict<{}, {}>", k, v),
            Type::Struct(s) => {
                write!(f, "Struct{{")?;
                for (i, (name, ty)) in s.fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", name, ty)?;
                }
                write!(f, "}}")
            }
            Type::Variant(v) => {
                write!(f, "Variant{{")?;
                for (i, (name, ty)) in v.tags.iter().enumerate() {
                    if i > 0 {
                        write!(f, " | ")?;
                    }
                    write!(f, "{}: {}", name, ty)?;
                }
                write!(f, "}}")
            }
            Type::Recursive(body) => write!(f, "Recursive<{}>", body),
            Type::RecRef(depth) => write!(f, "^{}", depth),
            Type::Function(func) => {
                let name = match func.flavor {
                    FunctionFlavor::Sync => "Function",
                    FunctionFlavor::Async => "AsyncFunction",
                };
                write!(f, "{}(", name)?;
                for (i, p) in func.params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", p)?;
                }
                write!(f, ") -> {}", func.result)?;
                if let Some(allow) = &func.allowlist {
                    write!(f, " [{}]", allow.join(", "))?;
                }
                Ok(())
            }
            Type::TypeType => write!(f, "Type"),
        }
    }
}
