//! Builder helpers for authoring IR
//!
//! Ergonomic constructors for well-typed IR nodes, so hosts and tests do
//! not write node structs by hand. Node types are derived from children
//! where the kind determines them; where they cannot be derived the
//! helper takes the type explicitly. Nodes are created with an unknown
//! location — use [`at`] to attach one.
//!
//! This is sugar only: the portable contract is the IR shape and the
//! compile/evaluate semantics, not these helpers.

use crate::analysis;
use east_core::ir::{
    BinaryOp, ContainerOp, Expr, ExprKind, FunctionValue, MatchArm, StringOp, UnaryOp,
};
use east_core::location::SourceLocation;
use east_core::types::{FunctionType, Type};
use east_core::value::Value;
use east_core::{Error, ErrorKind, Result};
use std::sync::Arc;

fn node(kind: ExprKind, ty: Type) -> Expr {
    Expr::new(kind, ty, SourceLocation::unknown())
}

/// Attach a source location to a node.
pub fn at(mut expr: Expr, loc: SourceLocation) -> Expr {
    expr.loc = loc;
    expr
}

/// A literal of an explicit type.
pub fn lit(value: Value, ty: Type) -> Expr {
    node(ExprKind::Literal(value), ty)
}

pub fn null() -> Expr {
    lit(Value::Null, Type::Null)
}

pub fn boolean(b: bool) -> Expr {
    lit(Value::Boolean(b), Type::Boolean)
}

pub fn integer(n: i64) -> Expr {
    lit(Value::integer(n), Type::Integer)
}

pub fn float(x: f64) -> Expr {
    lit(Value::Float(x), Type::Float)
}

pub fn string_lit(s: &str) -> Expr {
    lit(Value::string(s), Type::String)
}

pub fn var(name: &str, ty: Type) -> Expr {
    node(ExprKind::Var(name.to_string()), ty)
}

pub fn let_(name: &str, value: Expr) -> Expr {
    node(
        ExprKind::Let {
            name: name.to_string(),
            value: Box::new(value),
        },
        Type::Null,
    )
}

pub fn assign(target: Expr, value: Expr) -> Expr {
    node(
        ExprKind::Assign {
            target: Box::new(target),
            value: Box::new(value),
        },
        Type::Null,
    )
}

pub fn block(exprs: Vec<Expr>) -> Expr {
    let ty = exprs.last().map(|e| e.ty.clone()).unwrap_or(Type::Null);
    node(ExprKind::Block(exprs), ty)
}

pub fn if_(cond: Expr, then_branch: Expr, else_branch: Option<Expr>) -> Expr {
    let ty = match &else_branch {
        Some(_) => then_branch.ty.clone(),
        None => Type::Null,
    };
    node(
        ExprKind::If {
            cond: Box::new(cond),
            then_branch: Box::new(then_branch),
            else_branch: else_branch.map(Box::new),
        },
        ty,
    )
}

pub fn for_(binding: &str, iterable: Expr, body: Expr) -> Expr {
    node(
        ExprKind::For {
            binding: binding.to_string(),
            iterable: Box::new(iterable),
            body: Box::new(body),
        },
        Type::Null,
    )
}

pub fn loop_(body: Expr) -> Expr {
    node(ExprKind::Loop { body: Box::new(body) }, Type::Null)
}

pub fn break_() -> Expr {
    node(ExprKind::Break, Type::Never)
}

pub fn continue_() -> Expr {
    node(ExprKind::Continue, Type::Never)
}

pub fn ret(value: Expr) -> Expr {
    node(ExprKind::Return(Box::new(value)), Type::Never)
}

/// Call a function value. The node type is the callee's declared result;
/// a callee of non-function type yields `Never` and is caught by the
/// type checker.
pub fn call(callee: Expr, args: Vec<Expr>) -> Expr {
    let ty = match &callee.ty {
        Type::Function(f) => f.result.clone(),
        _ => Type::Never,
    };
    node(
        ExprKind::Call {
            callee: Box::new(callee),
            args,
        },
        ty,
    )
}

pub fn platform_call(name: &str, args: Vec<Expr>, result: Type) -> Expr {
    node(
        ExprKind::PlatformCall {
            name: name.to_string(),
            args,
        },
        result,
    )
}

/// Project a struct field; the node type is looked up in the target's
/// struct type (unfolded first).
pub fn field(target: Expr, name: &str) -> Expr {
    let ty = match target.ty.unfold() {
        Type::Struct(s) => s.field(name).cloned().unwrap_or(Type::Never),
        _ => Type::Never,
    };
    node(
        ExprKind::Field {
            target: Box::new(target),
            name: name.to_string(),
        },
        ty,
    )
}

pub fn construct(ty: Type, fields: Vec<(&str, Expr)>) -> Expr {
    node(
        ExprKind::Construct {
            fields: fields
                .into_iter()
                .map(|(n, e)| (n.to_string(), e))
                .collect(),
        },
        ty,
    )
}

pub fn variant_construct(ty: Type, tag: &str, payload: Expr) -> Expr {
    node(
        ExprKind::VariantConstruct {
            tag: tag.to_string(),
            payload: Box::new(payload),
        },
        ty,
    )
}

pub fn arm(tag: &str, binding: Option<&str>, body: Expr) -> MatchArm {
    MatchArm {
        tag: tag.to_string(),
        binding: binding.map(|b| b.to_string()),
        body,
    }
}

pub fn match_(ty: Type, scrutinee: Expr, arms: Vec<MatchArm>, default: Option<Expr>) -> Expr {
    node(
        ExprKind::Match {
            scrutinee: Box::new(scrutinee),
            arms,
            default: default.map(Box::new),
        },
        ty,
    )
}

/// A function literal. `ty` must be a function type; the node carries it
/// verbatim.
pub fn lambda(ty: Type, params: Vec<&str>, body: Expr) -> Expr {
    node(
        ExprKind::Lambda {
            params: params.into_iter().map(|p| p.to_string()).collect(),
            body: Box::new(body),
        },
        ty,
    )
}

pub fn not_(operand: Expr) -> Expr {
    node(
        ExprKind::Unary {
            op: UnaryOp::Not,
            operand: Box::new(operand),
        },
        Type::Boolean,
    )
}

pub fn neg(operand: Expr) -> Expr {
    let ty = operand.ty.clone();
    node(
        ExprKind::Unary {
            op: UnaryOp::Neg,
            operand: Box::new(operand),
        },
        ty,
    )
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr, ty: Type) -> Expr {
    node(
        ExprKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        },
        ty,
    )
}

fn arith(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    let ty = lhs.ty.clone();
    binary(op, lhs, rhs, ty)
}

pub fn add(lhs: Expr, rhs: Expr) -> Expr {
    arith(BinaryOp::Add, lhs, rhs)
}

pub fn sub(lhs: Expr, rhs: Expr) -> Expr {
    arith(BinaryOp::Sub, lhs, rhs)
}

pub fn mul(lhs: Expr, rhs: Expr) -> Expr {
    arith(BinaryOp::Mul, lhs, rhs)
}

pub fn div(lhs: Expr, rhs: Expr) -> Expr {
    arith(BinaryOp::Div, lhs, rhs)
}

pub fn modulo(lhs: Expr, rhs: Expr) -> Expr {
    arith(BinaryOp::Mod, lhs, rhs)
}

pub fn eq(lhs: Expr, rhs: Expr) -> Expr {
    binary(BinaryOp::Eq, lhs, rhs, Type::Boolean)
}

pub fn ne(lhs: Expr, rhs: Expr) -> Expr {
    binary(BinaryOp::Ne, lhs, rhs, Type::Boolean)
}

pub fn lt(lhs: Expr, rhs: Expr) -> Expr {
    binary(BinaryOp::Lt, lhs, rhs, Type::Boolean)
}

pub fn le(lhs: Expr, rhs: Expr) -> Expr {
    binary(BinaryOp::Le, lhs, rhs, Type::Boolean)
}

pub fn gt(lhs: Expr, rhs: Expr) -> Expr {
    binary(BinaryOp::Gt, lhs, rhs, Type::Boolean)
}

pub fn ge(lhs: Expr, rhs: Expr) -> Expr {
    binary(BinaryOp::Ge, lhs, rhs, Type::Boolean)
}

pub fn and_(lhs: Expr, rhs: Expr) -> Expr {
    binary(BinaryOp::And, lhs, rhs, Type::Boolean)
}

pub fn or_(lhs: Expr, rhs: Expr) -> Expr {
    binary(BinaryOp::Or, lhs, rhs, Type::Boolean)
}

fn string_op(op: StringOp, args: Vec<Expr>, ty: Type) -> Expr {
    node(ExprKind::StringOp { op, args }, ty)
}

pub fn concat(lhs: Expr, rhs: Expr) -> Expr {
    string_op(StringOp::Concat, vec![lhs, rhs], Type::String)
}

pub fn str_length(s: Expr) -> Expr {
    string_op(StringOp::Length, vec![s], Type::Integer)
}

pub fn substring(s: Expr, start: Expr, end: Expr) -> Expr {
    string_op(StringOp::Substring, vec![s, start, end], Type::String)
}

pub fn str_contains(haystack: Expr, needle: Expr) -> Expr {
    string_op(StringOp::Contains, vec![haystack, needle], Type::Boolean)
}

fn container_op(op: ContainerOp, args: Vec<Expr>, ty: Type) -> Expr {
    node(ExprKind::ContainerOp { op, args }, ty)
}

/// `index(array, i)` or `index(dict, key)`; the node type is derived
/// from the container type.
pub fn index(container: Expr, key: Expr) -> Expr {
    let ty = match container.ty.unfold() {
        Type::Array(item) => (*item).clone(),
        Type::Dict(_, value) => (*value).clone(),
        _ => Type::Never,
    };
    container_op(ContainerOp::Index, vec![container, key], ty)
}

pub fn size(container: Expr) -> Expr {
    container_op(ContainerOp::Size, vec![container], Type::Integer)
}

pub fn contains_key(container: Expr, key: Expr) -> Expr {
    container_op(ContainerOp::Contains, vec![container, key], Type::Boolean)
}

pub fn push(target: Expr, item: Expr) -> Expr {
    container_op(ContainerOp::Push, vec![target, item], Type::Null)
}

pub fn insert(target: Expr, mut rest: Vec<Expr>) -> Expr {
    let mut args = vec![target];
    args.append(&mut rest);
    container_op(ContainerOp::Insert, args, Type::Null)
}

pub fn remove(target: Expr, key: Expr) -> Expr {
    container_op(ContainerOp::Remove, vec![target, key], Type::Boolean)
}

pub fn keys(dict: Expr) -> Expr {
    let ty = match dict.ty.unfold() {
        Type::Dict(key, _) => Type::Array(key),
        _ => Type::Never,
    };
    container_op(ContainerOp::Keys, vec![dict], ty)
}

pub fn new_ref(value: Expr) -> Expr {
    let ty = Type::ref_of(value.ty.clone());
    node(ExprKind::NewRef(Box::new(value)), ty)
}

pub fn deref(reference: Expr) -> Expr {
    let ty = match reference.ty.unfold() {
        Type::Ref(content) => (*content).clone(),
        _ => Type::Never,
    };
    node(ExprKind::Deref(Box::new(reference)), ty)
}

/// Assemble a function value from its declared type, parameter names and
/// body: computes the platform-reference list and rejects bodies with
/// free variables beyond the parameters.
pub fn function_value(
    ty: FunctionType,
    params: Vec<&str>,
    body: Expr,
) -> Result<FunctionValue> {
    if params.len() != ty.params.len() {
        return Err(Error::new(
            ErrorKind::TypeMismatch,
            format!(
                "function declares {} parameter types but {} names",
                ty.params.len(),
                params.len()
            ),
        ));
    }
    let params: Vec<String> = params.into_iter().map(|p| p.to_string()).collect();
    let free = analysis::free_vars(&body);
    if let Some(unbound) = free.iter().find(|name| !params.contains(name)) {
        return Err(Error::new(
            ErrorKind::TypeMismatch,
            format!("function body has unbound variable '{}'", unbound),
        ));
    }
    let platform_refs = analysis::platform_refs(&body)?;
    Ok(FunctionValue {
        ty: Arc::new(ty),
        params,
        body,
        platform_refs,
    })
}
