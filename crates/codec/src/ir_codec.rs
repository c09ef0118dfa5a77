//! The IR wire schema
//!
//! Binary and JSON spellings of IR trees. Each node writes its kind, its
//! result type (canonical form), its source location and its children;
//! literals are encoded type-directed under the node's type, which is
//! how function values nested in IR travel. The JSON spelling is the
//! stable tooling schema: consumers must treat unknown node kinds as a
//! hard error, and this decoder does.

use crate::binary;
use crate::json as json_codec;
use crate::leb128::{self, ByteReader};
use east_core::ir::{
    BinaryOp, ContainerOp, Expr, ExprKind, MatchArm, StringOp, UnaryOp,
};
use east_core::location::SourceLocation;
use east_core::types::{FunctionFlavor, FunctionType, Type};
use east_core::{Error, ErrorKind, Result};
use east_runtime::platform::PlatformTable;
use serde_json::{json, Value as Json};
use std::sync::Arc;

const TAG_LITERAL: u8 = 0;
const TAG_VAR: u8 = 1;
const TAG_LET: u8 = 2;
const TAG_ASSIGN: u8 = 3;
const TAG_BLOCK: u8 = 4;
const TAG_IF: u8 = 5;
const TAG_FOR: u8 = 6;
const TAG_LOOP: u8 = 7;
const TAG_BREAK: u8 = 8;
const TAG_CONTINUE: u8 = 9;
const TAG_RETURN: u8 = 10;
const TAG_CALL: u8 = 11;
const TAG_PLATFORM_CALL: u8 = 12;
const TAG_FIELD: u8 = 13;
const TAG_CONSTRUCT: u8 = 14;
const TAG_VARIANT_CONSTRUCT: u8 = 15;
const TAG_MATCH: u8 = 16;
const TAG_LAMBDA: u8 = 17;
const TAG_UNARY: u8 = 18;
const TAG_BINARY: u8 = 19;
const TAG_STRING_OP: u8 = 20;
const TAG_CONTAINER_OP: u8 = 21;
const TAG_NEW_REF: u8 = 22;
const TAG_DEREF: u8 = 23;

pub fn encode_expr(expr: &Expr, out: &mut Vec<u8>) -> Result<()> {
    out.push(kind_tag(&expr.kind));
    out.extend_from_slice(&expr.ty.to_canonical_bytes());
    encode_loc(&expr.loc, out);
    match &expr.kind {
        ExprKind::Literal(value) => binary::encode_value(&expr.ty, value, out)?,
        ExprKind::Var(name) => leb128::write_string(name, out),
        ExprKind::Let { name, value } => {
            leb128::write_string(name, out);
            encode_expr(value, out)?;
        }
        ExprKind::Assign { target, value } => {
            encode_expr(target, out)?;
            encode_expr(value, out)?;
        }
        ExprKind::Block(children) => {
            leb128::write_len(children.len(), out);
            for child in children {
                encode_expr(child, out)?;
            }
        }
        ExprKind::If {
            cond,
            then_branch,
            else_branch,
        } => {
            encode_expr(cond, out)?;
            encode_expr(then_branch, out)?;
            match else_branch {
                Some(else_branch) => {
                    out.push(1);
                    encode_expr(else_branch, out)?;
                }
                None => out.push(0),
            }
        }
        ExprKind::For {
            binding,
            iterable,
            body,
        } => {
            leb128::write_string(binding, out);
            encode_expr(iterable, out)?;
            encode_expr(body, out)?;
        }
        ExprKind::Loop { body } => encode_expr(body, out)?,
        ExprKind::Break | ExprKind::Continue => {}
        ExprKind::Return(value) => encode_expr(value, out)?,
        ExprKind::Call { callee, args } => {
            encode_expr(callee, out)?;
            leb128::write_len(args.len(), out);
            for arg in args {
                encode_expr(arg, out)?;
            }
        }
        ExprKind::PlatformCall { name, args } => {
            leb128::write_string(name, out);
            leb128::write_len(args.len(), out);
            for arg in args {
                encode_expr(arg, out)?;
            }
        }
        ExprKind::Field { target, name } => {
            encode_expr(target, out)?;
            leb128::write_string(name, out);
        }
        ExprKind::Construct { fields } => {
            leb128::write_len(fields.len(), out);
            for (name, value) in fields {
                leb128::write_string(name, out);
                encode_expr(value, out)?;
            }
        }
        ExprKind::VariantConstruct { tag, payload } => {
            leb128::write_string(tag, out);
            encode_expr(payload, out)?;
        }
        ExprKind::Match {
            scrutinee,
            arms,
            default,
        } => {
            encode_expr(scrutinee, out)?;
            leb128::write_len(arms.len(), out);
            for arm in arms {
                leb128::write_string(&arm.tag, out);
                match &arm.binding {
                    Some(binding) => {
                        out.push(1);
                        leb128::write_string(binding, out);
                    }
                    None => out.push(0),
                }
                encode_expr(&arm.body, out)?;
            }
            match default {
                Some(default) => {
                    out.push(1);
                    encode_expr(default, out)?;
                }
                None => out.push(0),
            }
        }
        ExprKind::Lambda { params, body } => {
            leb128::write_len(params.len(), out);
            for param in params {
                leb128::write_string(param, out);
            }
            encode_expr(body, out)?;
        }
        ExprKind::Unary { op, operand } => {
            out.push(*op as u8);
            encode_expr(operand, out)?;
        }
        ExprKind::Binary { op, lhs, rhs } => {
            out.push(*op as u8);
            encode_expr(lhs, out)?;
            encode_expr(rhs, out)?;
        }
        ExprKind::StringOp { op, args } => {
            out.push(*op as u8);
            leb128::write_len(args.len(), out);
            for arg in args {
                encode_expr(arg, out)?;
            }
        }
        ExprKind::ContainerOp { op, args } => {
            out.push(*op as u8);
            leb128::write_len(args.len(), out);
            for arg in args {
                encode_expr(arg, out)?;
            }
        }
        ExprKind::NewRef(inner) | ExprKind::Deref(inner) => encode_expr(inner, out)?,
    }
    Ok(())
}

pub fn decode_expr(reader: &mut ByteReader<'_>, platform: &PlatformTable) -> Result<Expr> {
    decode_expr_at(reader, platform, 0)
}

// Nesting guard for untrusted input: corrupted bytes must produce an
// error, never exhaust the stack.
const MAX_IR_DEPTH: u32 = 512;

fn decode_expr_at(
    reader: &mut ByteReader<'_>,
    platform: &PlatformTable,
    depth: u32,
) -> Result<Expr> {
    if depth > MAX_IR_DEPTH {
        return Err(Error::new(
            ErrorKind::DecodingError,
            "IR tree nests too deeply",
        ));
    }
    let tag = reader.read_u8()?;
    let (ty, used) = Type::from_canonical_bytes(reader.tail())?;
    reader.advance(used)?;
    let loc = decode_loc(reader)?;
    let kind = match tag {
        TAG_LITERAL => ExprKind::Literal(binary::decode_value(&ty, reader, platform)?),
        TAG_VAR => ExprKind::Var(reader.read_string()?),
        TAG_LET => ExprKind::Let {
            name: reader.read_string()?,
            value: Box::new(decode_expr_at(reader, platform, depth + 1)?),
        },
        TAG_ASSIGN => ExprKind::Assign {
            target: Box::new(decode_expr_at(reader, platform, depth + 1)?),
            value: Box::new(decode_expr_at(reader, platform, depth + 1)?),
        },
        TAG_BLOCK => {
            let len = reader.read_len()?;
            let mut children = Vec::with_capacity(len);
            for _ in 0..len {
                children.push(decode_expr_at(reader, platform, depth + 1)?);
            }
            ExprKind::Block(children)
        }
        TAG_IF => {
            let cond = Box::new(decode_expr_at(reader, platform, depth + 1)?);
            let then_branch = Box::new(decode_expr_at(reader, platform, depth + 1)?);
            let else_branch = match reader.read_u8()? {
                0 => None,
                1 => Some(Box::new(decode_expr_at(reader, platform, depth + 1)?)),
                other => return Err(bad_marker("else", other)),
            };
            ExprKind::If {
                cond,
                then_branch,
                else_branch,
            }
        }
        TAG_FOR => ExprKind::For {
            binding: reader.read_string()?,
            iterable: Box::new(decode_expr_at(reader, platform, depth + 1)?),
            body: Box::new(decode_expr_at(reader, platform, depth + 1)?),
        },
        TAG_LOOP => ExprKind::Loop {
            body: Box::new(decode_expr_at(reader, platform, depth + 1)?),
        },
        TAG_BREAK => ExprKind::Break,
        TAG_CONTINUE => ExprKind::Continue,
        TAG_RETURN => ExprKind::Return(Box::new(decode_expr_at(reader, platform, depth + 1)?)),
        TAG_CALL => {
            let callee = Box::new(decode_expr_at(reader, platform, depth + 1)?);
            let len = reader.read_len()?;
            let mut args = Vec::with_capacity(len);
            for _ in 0..len {
                args.push(decode_expr_at(reader, platform, depth + 1)?);
            }
            ExprKind::Call { callee, args }
        }
        TAG_PLATFORM_CALL => {
            let name = reader.read_string()?;
            let len = reader.read_len()?;
            let mut args = Vec::with_capacity(len);
            for _ in 0..len {
                args.push(decode_expr_at(reader, platform, depth + 1)?);
            }
            ExprKind::PlatformCall { name, args }
        }
        TAG_FIELD => ExprKind::Field {
            target: Box::new(decode_expr_at(reader, platform, depth + 1)?),
            name: reader.read_string()?,
        },
        TAG_CONSTRUCT => {
            let len = reader.read_len()?;
            let mut fields = Vec::with_capacity(len);
            for _ in 0..len {
                let name = reader.read_string()?;
                fields.push((name, decode_expr_at(reader, platform, depth + 1)?));
            }
            ExprKind::Construct { fields }
        }
        TAG_VARIANT_CONSTRUCT => ExprKind::VariantConstruct {
            tag: reader.read_string()?,
            payload: Box::new(decode_expr_at(reader, platform, depth + 1)?),
        },
        TAG_MATCH => {
            let scrutinee = Box::new(decode_expr_at(reader, platform, depth + 1)?);
            let len = reader.read_len()?;
            let mut arms = Vec::with_capacity(len);
            for _ in 0..len {
                let tag = reader.read_string()?;
                let binding = match reader.read_u8()? {
                    0 => None,
                    1 => Some(reader.read_string()?),
                    other => return Err(bad_marker("binding", other)),
                };
                arms.push(MatchArm {
                    tag,
                    binding,
                    body: decode_expr_at(reader, platform, depth + 1)?,
                });
            }
            let default = match reader.read_u8()? {
                0 => None,
                1 => Some(Box::new(decode_expr_at(reader, platform, depth + 1)?)),
                other => return Err(bad_marker("default", other)),
            };
            ExprKind::Match {
                scrutinee,
                arms,
                default,
            }
        }
        TAG_LAMBDA => {
            let len = reader.read_len()?;
            let mut params = Vec::with_capacity(len);
            for _ in 0..len {
                params.push(reader.read_string()?);
            }
            ExprKind::Lambda {
                params,
                body: Box::new(decode_expr_at(reader, platform, depth + 1)?),
            }
        }
        TAG_UNARY => ExprKind::Unary {
            op: decode_unary_op(reader.read_u8()?)?,
            operand: Box::new(decode_expr_at(reader, platform, depth + 1)?),
        },
        TAG_BINARY => ExprKind::Binary {
            op: decode_binary_op(reader.read_u8()?)?,
            lhs: Box::new(decode_expr_at(reader, platform, depth + 1)?),
            rhs: Box::new(decode_expr_at(reader, platform, depth + 1)?),
        },
        TAG_STRING_OP => {
            let op = decode_string_op(reader.read_u8()?)?;
            let len = reader.read_len()?;
            let mut args = Vec::with_capacity(len);
            for _ in 0..len {
                args.push(decode_expr_at(reader, platform, depth + 1)?);
            }
            ExprKind::StringOp { op, args }
        }
        TAG_CONTAINER_OP => {
            let op = decode_container_op(reader.read_u8()?)?;
            let len = reader.read_len()?;
            let mut args = Vec::with_capacity(len);
            for _ in 0..len {
                args.push(decode_expr_at(reader, platform, depth + 1)?);
            }
            ExprKind::ContainerOp { op, args }
        }
        TAG_NEW_REF => ExprKind::NewRef(Box::new(decode_expr_at(reader, platform, depth + 1)?)),
        TAG_DEREF => ExprKind::Deref(Box::new(decode_expr_at(reader, platform, depth + 1)?)),
        other => {
            return Err(Error::new(
                ErrorKind::DecodingError,
                format!("unknown IR node tag {}", other),
            ));
        }
    };
    Ok(Expr::new(kind, ty, loc))
}

fn kind_tag(kind: &ExprKind) -> u8 {
    match kind {
        ExprKind::Literal(_) => TAG_LITERAL,
        ExprKind::Var(_) => TAG_VAR,
        ExprKind::Let { .. } => TAG_LET,
        ExprKind::Assign { .. } => TAG_ASSIGN,
        ExprKind::Block(_) => TAG_BLOCK,
        ExprKind::If { .. } => TAG_IF,
        ExprKind::For { .. } => TAG_FOR,
        ExprKind::Loop { .. } => TAG_LOOP,
        ExprKind::Break => TAG_BREAK,
        ExprKind::Continue => TAG_CONTINUE,
        ExprKind::Return(_) => TAG_RETURN,
        ExprKind::Call { .. } => TAG_CALL,
        ExprKind::PlatformCall { .. } => TAG_PLATFORM_CALL,
        ExprKind::Field { .. } => TAG_FIELD,
        ExprKind::Construct { .. } => TAG_CONSTRUCT,
        ExprKind::VariantConstruct { .. } => TAG_VARIANT_CONSTRUCT,
        ExprKind::Match { .. } => TAG_MATCH,
        ExprKind::Lambda { .. } => TAG_LAMBDA,
        ExprKind::Unary { .. } => TAG_UNARY,
        ExprKind::Binary { .. } => TAG_BINARY,
        ExprKind::StringOp { .. } => TAG_STRING_OP,
        ExprKind::ContainerOp { .. } => TAG_CONTAINER_OP,
        ExprKind::NewRef(_) => TAG_NEW_REF,
        ExprKind::Deref(_) => TAG_DEREF,
    }
}

fn bad_marker(what: &str, byte: u8) -> Error {
    Error::new(
        ErrorKind::DecodingError,
        format!("invalid {} marker 0x{:02x}", what, byte),
    )
}

fn encode_loc(loc: &SourceLocation, out: &mut Vec<u8>) {
    leb128::write_string(&loc.file, out);
    leb128::write_uleb(u64::from(loc.line), out);
    leb128::write_uleb(u64::from(loc.column), out);
    match loc.span {
        Some(span) => {
            out.push(1);
            leb128::write_uleb(u64::from(span), out);
        }
        None => out.push(0),
    }
}

fn decode_loc(reader: &mut ByteReader<'_>) -> Result<SourceLocation> {
    let file = reader.read_string()?;
    let line = read_u32(reader)?;
    let column = read_u32(reader)?;
    let span = match reader.read_u8()? {
        0 => None,
        1 => Some(read_u32(reader)?),
        other => return Err(bad_marker("span", other)),
    };
    Ok(SourceLocation {
        file,
        line,
        column,
        span,
    })
}

fn read_u32(reader: &mut ByteReader<'_>) -> Result<u32> {
    u32::try_from(reader.read_uleb()?)
        .map_err(|_| Error::new(ErrorKind::DecodingError, "location field out of range"))
}

fn decode_unary_op(byte: u8) -> Result<UnaryOp> {
    Ok(match byte {
        0 => UnaryOp::Not,
        1 => UnaryOp::Neg,
        other => return Err(bad_marker("unary op", other)),
    })
}

fn decode_binary_op(byte: u8) -> Result<BinaryOp> {
    Ok(match byte {
        0 => BinaryOp::Add,
        1 => BinaryOp::Sub,
        2 => BinaryOp::Mul,
        3 => BinaryOp::Div,
        4 => BinaryOp::Mod,
        5 => BinaryOp::Eq,
        6 => BinaryOp::Ne,
        7 => BinaryOp::Lt,
        8 => BinaryOp::Le,
        9 => BinaryOp::Gt,
        10 => BinaryOp::Ge,
        11 => BinaryOp::And,
        12 => BinaryOp::Or,
        other => return Err(bad_marker("binary op", other)),
    })
}

fn decode_string_op(byte: u8) -> Result<StringOp> {
    Ok(match byte {
        0 => StringOp::Concat,
        1 => StringOp::Length,
        2 => StringOp::Substring,
        3 => StringOp::Contains,
        other => return Err(bad_marker("string op", other)),
    })
}

fn decode_container_op(byte: u8) -> Result<ContainerOp> {
    Ok(match byte {
        0 => ContainerOp::Index,
        1 => ContainerOp::Size,
        2 => ContainerOp::Contains,
        3 => ContainerOp::Push,
        4 => ContainerOp::Insert,
        5 => ContainerOp::Remove,
        6 => ContainerOp::Keys,
        other => return Err(bad_marker("container op", other)),
    })
}

// ---------------------------------------------------------------------
// JSON spelling
// ---------------------------------------------------------------------

pub fn type_to_json(ty: &Type) -> Json {
    match ty {
        Type::Never => json!({"kind": "Never"}),
        Type::Null => json!({"kind": "Null"}),
        Type::Boolean => json!({"kind": "Boolean"}),
        Type::Integer => json!({"kind": "Integer"}),
        Type::Float => json!({"kind": "Float"}),
        Type::String => json!({"kind": "String"}),
        Type::DateTime => json!({"kind": "DateTime"}),
        Type::Blob => json!({"kind": "Blob"}),
        Type::Ref(t) => json!({"kind": "Ref", "content": type_to_json(t)}),
        Type::Array(t) => json!({"kind": "Array", "item": type_to_json(t)}),
        Type::Set(t) => json!({"kind": "Set", "key": type_to_json(t)}),
        Type::Dict(k, v) => {
            json!({"kind": "Dict", "key": type_to_json(k), "value": type_to_json(v)})
        }
        Type::Struct(s) => json!({
            "kind": "Struct",
            "fields": s.fields.iter()
                .map(|(n, t)| json!([n, type_to_json(t)]))
                .collect::<Vec<_>>(),
        }),
        Type::Variant(v) => json!({
            "kind": "Variant",
            "tags": v.tags.iter()
                .map(|(n, t)| json!([n, type_to_json(t)]))
                .collect::<Vec<_>>(),
        }),
        Type::Recursive(body) => json!({"kind": "Recursive", "body": type_to_json(body)}),
        Type::RecRef(depth) => json!({"kind": "RecRef", "depth": depth}),
        Type::Function(f) => {
            let kind = match f.flavor {
                FunctionFlavor::Sync => "Function",
                FunctionFlavor::Async => "AsyncFunction",
            };
            let mut obj = serde_json::Map::new();
            obj.insert("kind".to_string(), json!(kind));
            obj.insert(
                "params".to_string(),
                Json::Array(f.params.iter().map(type_to_json).collect()),
            );
            obj.insert("result".to_string(), type_to_json(&f.result));
            if let Some(allowlist) = &f.allowlist {
                obj.insert("allowlist".to_string(), json!(allowlist));
            }
            Json::Object(obj)
        }
        Type::TypeType => json!({"kind": "Type"}),
    }
}

pub fn type_from_json(value: &Json) -> Result<Type> {
    let obj = value
        .as_object()
        .ok_or_else(|| bad_json("type must be an object"))?;
    let kind = obj
        .get("kind")
        .and_then(Json::as_str)
        .ok_or_else(|| bad_json("type object missing 'kind'"))?;
    Ok(match kind {
        "Never" => Type::Never,
        "Null" => Type::Null,
        "Boolean" => Type::Boolean,
        "Integer" => Type::Integer,
        "Float" => Type::Float,
        "String" => Type::String,
        "DateTime" => Type::DateTime,
        "Blob" => Type::Blob,
        "Ref" => Type::Ref(Arc::new(type_from_json(field(obj, "content")?)?)),
        "Array" => Type::Array(Arc::new(type_from_json(field(obj, "item")?)?)),
        "Set" => Type::Set(Arc::new(type_from_json(field(obj, "key")?)?)),
        "Dict" => Type::Dict(
            Arc::new(type_from_json(field(obj, "key")?)?),
            Arc::new(type_from_json(field(obj, "value")?)?),
        ),
        "Struct" => Type::struct_of(named_types(field(obj, "fields")?)?),
        "Variant" => Type::variant_of(named_types(field(obj, "tags")?)?),
        "Recursive" => Type::Recursive(Arc::new(type_from_json(field(obj, "body")?)?)),
        "RecRef" => {
            let depth = field(obj, "depth")?
                .as_u64()
                .and_then(|d| u32::try_from(d).ok())
                .ok_or_else(|| bad_json("RecRef depth must be an integer"))?;
            Type::RecRef(depth)
        }
        "Function" | "AsyncFunction" => {
            let params = field(obj, "params")?
                .as_array()
                .ok_or_else(|| bad_json("function params must be an array"))?
                .iter()
                .map(type_from_json)
                .collect::<Result<Vec<_>>>()?;
            let result = type_from_json(field(obj, "result")?)?;
            let allowlist = match obj.get("allowlist") {
                None => None,
                Some(list) => Some(
                    list.as_array()
                        .ok_or_else(|| bad_json("allowlist must be an array"))?
                        .iter()
                        .map(|n| {
                            n.as_str()
                                .map(str::to_string)
                                .ok_or_else(|| bad_json("allowlist entries must be strings"))
                        })
                        .collect::<Result<Vec<_>>>()?,
                ),
            };
            Type::Function(Arc::new(FunctionType {
                params,
                result,
                flavor: if kind == "Function" {
                    FunctionFlavor::Sync
                } else {
                    FunctionFlavor::Async
                },
                allowlist,
            }))
        }
        "Type" => Type::TypeType,
        other => {
            return Err(Error::new(
                ErrorKind::DecodingError,
                format!("unknown type kind '{}'", other),
            ));
        }
    })
}

fn named_types(value: &Json) -> Result<Vec<(String, Type)>> {
    value
        .as_array()
        .ok_or_else(|| bad_json("expected an array of [name, type] pairs"))?
        .iter()
        .map(|entry| {
            let pair = entry
                .as_array()
                .filter(|p| p.len() == 2)
                .ok_or_else(|| bad_json("expected a [name, type] pair"))?;
            let name = pair[0]
                .as_str()
                .ok_or_else(|| bad_json("name must be a string"))?;
            Ok((name.to_string(), type_from_json(&pair[1])?))
        })
        .collect()
}

pub fn expr_to_json(expr: &Expr) -> Result<Json> {
    let mut obj = serde_json::Map::new();
    obj.insert("kind".to_string(), json!(expr.kind_name()));
    obj.insert("type".to_string(), type_to_json(&expr.ty));
    if !expr.loc.is_unknown() {
        let mut loc = serde_json::Map::new();
        loc.insert("file".to_string(), json!(expr.loc.file));
        loc.insert("line".to_string(), json!(expr.loc.line));
        loc.insert("column".to_string(), json!(expr.loc.column));
        if let Some(span) = expr.loc.span {
            loc.insert("span".to_string(), json!(span));
        }
        obj.insert("loc".to_string(), Json::Object(loc));
    }
    match &expr.kind {
        ExprKind::Literal(value) => {
            obj.insert("value".to_string(), json_codec::encode_value(&expr.ty, value)?);
        }
        ExprKind::Var(name) => {
            obj.insert("name".to_string(), json!(name));
        }
        ExprKind::Let { name, value } => {
            obj.insert("name".to_string(), json!(name));
            obj.insert("value".to_string(), expr_to_json(value)?);
        }
        ExprKind::Assign { target, value } => {
            obj.insert("target".to_string(), expr_to_json(target)?);
            obj.insert("value".to_string(), expr_to_json(value)?);
        }
        ExprKind::Block(children) => {
            obj.insert("body".to_string(), exprs_to_json(children)?);
        }
        ExprKind::If {
            cond,
            then_branch,
            else_branch,
        } => {
            obj.insert("cond".to_string(), expr_to_json(cond)?);
            obj.insert("then".to_string(), expr_to_json(then_branch)?);
            if let Some(else_branch) = else_branch {
                obj.insert("else".to_string(), expr_to_json(else_branch)?);
            }
        }
        ExprKind::For {
            binding,
            iterable,
            body,
        } => {
            obj.insert("binding".to_string(), json!(binding));
            obj.insert("iterable".to_string(), expr_to_json(iterable)?);
            obj.insert("body".to_string(), expr_to_json(body)?);
        }
        ExprKind::Loop { body } => {
            obj.insert("body".to_string(), expr_to_json(body)?);
        }
        ExprKind::Break | ExprKind::Continue => {}
        ExprKind::Return(value) => {
            obj.insert("value".to_string(), expr_to_json(value)?);
        }
        ExprKind::Call { callee, args } => {
            obj.insert("callee".to_string(), expr_to_json(callee)?);
            obj.insert("args".to_string(), exprs_to_json(args)?);
        }
        ExprKind::PlatformCall { name, args } => {
            obj.insert("name".to_string(), json!(name));
            obj.insert("args".to_string(), exprs_to_json(args)?);
        }
        ExprKind::Field { target, name } => {
            obj.insert("target".to_string(), expr_to_json(target)?);
            obj.insert("name".to_string(), json!(name));
        }
        ExprKind::Construct { fields } => {
            let fields = fields
                .iter()
                .map(|(n, e)| Ok(json!([n, expr_to_json(e)?])))
                .collect::<Result<Vec<_>>>()?;
            obj.insert("fields".to_string(), Json::Array(fields));
        }
        ExprKind::VariantConstruct { tag, payload } => {
            obj.insert("tag".to_string(), json!(tag));
            obj.insert("payload".to_string(), expr_to_json(payload)?);
        }
        ExprKind::Match {
            scrutinee,
            arms,
            default,
        } => {
            obj.insert("scrutinee".to_string(), expr_to_json(scrutinee)?);
            let arms = arms
                .iter()
                .map(|arm| {
                    let mut a = serde_json::Map::new();
                    a.insert("tag".to_string(), json!(arm.tag));
                    if let Some(binding) = &arm.binding {
                        a.insert("binding".to_string(), json!(binding));
                    }
                    a.insert("body".to_string(), expr_to_json(&arm.body)?);
                    Ok(Json::Object(a))
                })
                .collect::<Result<Vec<_>>>()?;
            obj.insert("arms".to_string(), Json::Array(arms));
            if let Some(default) = default {
                obj.insert("default".to_string(), expr_to_json(default)?);
            }
        }
        ExprKind::Lambda { params, body } => {
            obj.insert("params".to_string(), json!(params));
            obj.insert("body".to_string(), expr_to_json(body)?);
        }
        ExprKind::Unary { op, operand } => {
            obj.insert("op".to_string(), json!(unary_op_name(*op)));
            obj.insert("operand".to_string(), expr_to_json(operand)?);
        }
        ExprKind::Binary { op, lhs, rhs } => {
            obj.insert("op".to_string(), json!(binary_op_name(*op)));
            obj.insert("lhs".to_string(), expr_to_json(lhs)?);
            obj.insert("rhs".to_string(), expr_to_json(rhs)?);
        }
        ExprKind::StringOp { op, args } => {
            obj.insert("op".to_string(), json!(string_op_name(*op)));
            obj.insert("args".to_string(), exprs_to_json(args)?);
        }
        ExprKind::ContainerOp { op, args } => {
            obj.insert("op".to_string(), json!(container_op_name(*op)));
            obj.insert("args".to_string(), exprs_to_json(args)?);
        }
        ExprKind::NewRef(inner) | ExprKind::Deref(inner) => {
            obj.insert("value".to_string(), expr_to_json(inner)?);
        }
    }
    Ok(Json::Object(obj))
}

fn exprs_to_json(exprs: &[Expr]) -> Result<Json> {
    Ok(Json::Array(
        exprs.iter().map(expr_to_json).collect::<Result<Vec<_>>>()?,
    ))
}

pub fn expr_from_json(value: &Json, platform: &PlatformTable) -> Result<Expr> {
    let obj = value
        .as_object()
        .ok_or_else(|| bad_json("IR node must be an object"))?;
    let kind_name = obj
        .get("kind")
        .and_then(Json::as_str)
        .ok_or_else(|| bad_json("IR node missing 'kind'"))?;
    let ty = type_from_json(field(obj, "type")?)?;
    let loc = match obj.get("loc") {
        None => SourceLocation::unknown(),
        Some(loc) => {
            let loc = loc
                .as_object()
                .ok_or_else(|| bad_json("loc must be an object"))?;
            SourceLocation {
                file: field(loc, "file")?
                    .as_str()
                    .ok_or_else(|| bad_json("loc file must be a string"))?
                    .to_string(),
                line: json_u32(field(loc, "line")?)?,
                column: json_u32(field(loc, "column")?)?,
                span: match loc.get("span") {
                    None => None,
                    Some(span) => Some(json_u32(span)?),
                },
            }
        }
    };
    let kind = match kind_name {
        "literal" => {
            ExprKind::Literal(json_codec::decode_value(&ty, field(obj, "value")?, platform)?)
        }
        "var" => ExprKind::Var(json_string(field(obj, "name")?)?),
        "let" => ExprKind::Let {
            name: json_string(field(obj, "name")?)?,
            value: Box::new(expr_from_json(field(obj, "value")?, platform)?),
        },
        "assign" => ExprKind::Assign {
            target: Box::new(expr_from_json(field(obj, "target")?, platform)?),
            value: Box::new(expr_from_json(field(obj, "value")?, platform)?),
        },
        "block" => ExprKind::Block(exprs_from_json(field(obj, "body")?, platform)?),
        "if" => ExprKind::If {
            cond: Box::new(expr_from_json(field(obj, "cond")?, platform)?),
            then_branch: Box::new(expr_from_json(field(obj, "then")?, platform)?),
            else_branch: match obj.get("else") {
                None => None,
                Some(e) => Some(Box::new(expr_from_json(e, platform)?)),
            },
        },
        "for" => ExprKind::For {
            binding: json_string(field(obj, "binding")?)?,
            iterable: Box::new(expr_from_json(field(obj, "iterable")?, platform)?),
            body: Box::new(expr_from_json(field(obj, "body")?, platform)?),
        },
        "loop" => ExprKind::Loop {
            body: Box::new(expr_from_json(field(obj, "body")?, platform)?),
        },
        "break" => ExprKind::Break,
        "continue" => ExprKind::Continue,
        "return" => ExprKind::Return(Box::new(expr_from_json(field(obj, "value")?, platform)?)),
        "call" => ExprKind::Call {
            callee: Box::new(expr_from_json(field(obj, "callee")?, platform)?),
            args: exprs_from_json(field(obj, "args")?, platform)?,
        },
        "platform_call" => ExprKind::PlatformCall {
            name: json_string(field(obj, "name")?)?,
            args: exprs_from_json(field(obj, "args")?, platform)?,
        },
        "field" => ExprKind::Field {
            target: Box::new(expr_from_json(field(obj, "target")?, platform)?),
            name: json_string(field(obj, "name")?)?,
        },
        "construct" => {
            let fields = field(obj, "fields")?
                .as_array()
                .ok_or_else(|| bad_json("construct fields must be an array"))?
                .iter()
                .map(|entry| {
                    let pair = entry
                        .as_array()
                        .filter(|p| p.len() == 2)
                        .ok_or_else(|| bad_json("expected a [name, node] pair"))?;
                    Ok((
                        json_string(&pair[0])?,
                        expr_from_json(&pair[1], platform)?,
                    ))
                })
                .collect::<Result<Vec<_>>>()?;
            ExprKind::Construct { fields }
        }
        "variant_construct" => ExprKind::VariantConstruct {
            tag: json_string(field(obj, "tag")?)?,
            payload: Box::new(expr_from_json(field(obj, "payload")?, platform)?),
        },
        "match" => {
            let arms = field(obj, "arms")?
                .as_array()
                .ok_or_else(|| bad_json("match arms must be an array"))?
                .iter()
                .map(|arm| {
                    let arm = arm
                        .as_object()
                        .ok_or_else(|| bad_json("match arm must be an object"))?;
                    Ok(MatchArm {
                        tag: json_string(field(arm, "tag")?)?,
                        binding: match arm.get("binding") {
                            None => None,
                            Some(b) => Some(json_string(b)?),
                        },
                        body: expr_from_json(field(arm, "body")?, platform)?,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            ExprKind::Match {
                scrutinee: Box::new(expr_from_json(field(obj, "scrutinee")?, platform)?),
                arms,
                default: match obj.get("default") {
                    None => None,
                    Some(d) => Some(Box::new(expr_from_json(d, platform)?)),
                },
            }
        }
        "lambda" => ExprKind::Lambda {
            params: field(obj, "params")?
                .as_array()
                .ok_or_else(|| bad_json("lambda params must be an array"))?
                .iter()
                .map(json_string)
                .collect::<Result<Vec<_>>>()?,
            body: Box::new(expr_from_json(field(obj, "body")?, platform)?),
        },
        "unary" => ExprKind::Unary {
            op: unary_op_from_name(field(obj, "op")?)?,
            operand: Box::new(expr_from_json(field(obj, "operand")?, platform)?),
        },
        "binary" => ExprKind::Binary {
            op: binary_op_from_name(field(obj, "op")?)?,
            lhs: Box::new(expr_from_json(field(obj, "lhs")?, platform)?),
            rhs: Box::new(expr_from_json(field(obj, "rhs")?, platform)?),
        },
        "string_op" => ExprKind::StringOp {
            op: string_op_from_name(field(obj, "op")?)?,
            args: exprs_from_json(field(obj, "args")?, platform)?,
        },
        "container_op" => ExprKind::ContainerOp {
            op: container_op_from_name(field(obj, "op")?)?,
            args: exprs_from_json(field(obj, "args")?, platform)?,
        },
        "new_ref" => ExprKind::NewRef(Box::new(expr_from_json(field(obj, "value")?, platform)?)),
        "deref" => ExprKind::Deref(Box::new(expr_from_json(field(obj, "value")?, platform)?)),
        other => {
            return Err(Error::new(
                ErrorKind::DecodingError,
                format!("unknown IR node kind '{}'", other),
            ));
        }
    };
    Ok(Expr::new(kind, ty, loc))
}

fn exprs_from_json(value: &Json, platform: &PlatformTable) -> Result<Vec<Expr>> {
    value
        .as_array()
        .ok_or_else(|| bad_json("expected an array of IR nodes"))?
        .iter()
        .map(|e| expr_from_json(e, platform))
        .collect()
}

fn field<'a>(obj: &'a serde_json::Map<String, Json>, name: &str) -> Result<&'a Json> {
    obj.get(name)
        .ok_or_else(|| bad_json(&format!("missing field '{}'", name)))
}

fn json_string(value: &Json) -> Result<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| bad_json("expected a string"))
}

fn json_u32(value: &Json) -> Result<u32> {
    value
        .as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| bad_json("expected an unsigned integer"))
}

fn bad_json(message: &str) -> Error {
    Error::new(ErrorKind::DecodingError, message.to_string())
}

fn unary_op_name(op: UnaryOp) -> &'static str {
    match op {
        UnaryOp::Not => "not",
        UnaryOp::Neg => "neg",
    }
}

fn unary_op_from_name(value: &Json) -> Result<UnaryOp> {
    Ok(match value.as_str() {
        Some("not") => UnaryOp::Not,
        Some("neg") => UnaryOp::Neg,
        _ => return Err(bad_json("unknown unary op")),
    })
}

fn binary_op_name(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "add",
        BinaryOp::Sub => "sub",
        BinaryOp::Mul => "mul",
        BinaryOp::Div => "div",
        BinaryOp::Mod => "mod",
        BinaryOp::Eq => "eq",
        BinaryOp::Ne => "ne",
        BinaryOp::Lt => "lt",
        BinaryOp::Le => "le",
        BinaryOp::Gt => "gt",
        BinaryOp::Ge => "ge",
        BinaryOp::And => "and",
        BinaryOp::Or => "or",
    }
}

fn binary_op_from_name(value: &Json) -> Result<BinaryOp> {
    Ok(match value.as_str() {
        Some("add") => BinaryOp::Add,
        Some("sub") => BinaryOp::Sub,
        Some("mul") => BinaryOp::Mul,
        Some("div") => BinaryOp::Div,
        Some("mod") => BinaryOp::Mod,
        Some("eq") => BinaryOp::Eq,
        Some("ne") => BinaryOp::Ne,
        Some("lt") => BinaryOp::Lt,
        Some("le") => BinaryOp::Le,
        Some("gt") => BinaryOp::Gt,
        Some("ge") => BinaryOp::Ge,
        Some("and") => BinaryOp::And,
        Some("or") => BinaryOp::Or,
        _ => return Err(bad_json("unknown binary op")),
    })
}

fn string_op_name(op: StringOp) -> &'static str {
    match op {
        StringOp::Concat => "concat",
        StringOp::Length => "length",
        StringOp::Substring => "substring",
        StringOp::Contains => "contains",
    }
}

fn string_op_from_name(value: &Json) -> Result<StringOp> {
    Ok(match value.as_str() {
        Some("concat") => StringOp::Concat,
        Some("length") => StringOp::Length,
        Some("substring") => StringOp::Substring,
        Some("contains") => StringOp::Contains,
        _ => return Err(bad_json("unknown string op")),
    })
}

fn container_op_name(op: ContainerOp) -> &'static str {
    match op {
        ContainerOp::Index => "index",
        ContainerOp::Size => "size",
        ContainerOp::Contains => "contains",
        ContainerOp::Push => "push",
        ContainerOp::Insert => "insert",
        ContainerOp::Remove => "remove",
        ContainerOp::Keys => "keys",
    }
}

fn container_op_from_name(value: &Json) -> Result<ContainerOp> {
    Ok(match value.as_str() {
        Some("index") => ContainerOp::Index,
        Some("size") => ContainerOp::Size,
        Some("contains") => ContainerOp::Contains,
        Some("push") => ContainerOp::Push,
        Some("insert") => ContainerOp::Insert,
        Some("remove") => ContainerOp::Remove,
        Some("keys") => ContainerOp::Keys,
        _ => return Err(bad_json("unknown container op")),
    })
}
