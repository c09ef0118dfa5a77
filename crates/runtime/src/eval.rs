//! Compilation and evaluation of IR
//!
//! [`compile`] takes a function value and a platform table, type-checks
//! the body, resolves every platform call against the table, and yields a
//! [`CompiledFunction`] — an interpreter closure over the IR. Evaluation
//! is eager and left-to-right; semantics follow the node documentation in
//! `east_core::ir`.
//!
//! Integer arithmetic is arbitrary-precision and never wraps; integer
//! division by zero is an `ArithmeticError`. Float arithmetic is
//! IEEE-754: division by zero produces ±∞ and `0/0` produces NaN.

use crate::analysis;
use crate::platform::PlatformTable;
use crate::typecheck;
use east_core::compare::total_cmp;
use east_core::ir::{
    BinaryOp, ContainerOp, Expr, ExprKind, FunctionValue, StringOp, UnaryOp,
};
use east_core::types::{FunctionFlavor, Type};
use east_core::value::{StructValue, Value};
use east_core::{Error, ErrorKind, Result, SourceLocation};
use num_traits::{Signed, ToPrimitive, Zero};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Propagate loop/return control out of a subexpression evaluation.
macro_rules! flow {
    ($e:expr) => {
        match $e {
            Flow::Value(v) => v,
            other => return Ok(other),
        }
    };
}

pub(crate) use flow;

/// Result of evaluating one node: either a value, or control flow that
/// unwinds to the enclosing loop or function.
pub(crate) enum Flow {
    Value(Value),
    Return(Value),
    Break,
    Continue,
}

impl Flow {
    /// Unwrap a value in a position where loop control cannot occur.
    pub(crate) fn into_value(self, loc: &SourceLocation) -> Result<Value> {
        match self {
            Flow::Value(v) | Flow::Return(v) => Ok(v),
            Flow::Break | Flow::Continue => Err(Error::new(
                ErrorKind::TypeMismatch,
                "loop control escaped its loop",
            )
            .at(loc)),
        }
    }
}

/// A scope chain of variable bindings.
pub(crate) struct Env {
    frames: Vec<HashMap<String, Value>>,
}

impl Env {
    pub(crate) fn new() -> Self {
        Env {
            frames: vec![HashMap::new()],
        }
    }

    pub(crate) fn push(&mut self) {
        self.frames.push(HashMap::new());
    }

    pub(crate) fn pop(&mut self) {
        self.frames.pop();
    }

    pub(crate) fn bind(&mut self, name: String, value: Value) {
        self.frames
            .last_mut()
            .expect("scope stack never empty")
            .insert(name, value);
    }

    pub(crate) fn lookup(&self, name: &str) -> Option<&Value> {
        self.frames.iter().rev().find_map(|f| f.get(name))
    }
}

/// A function bound to a platform table, ready to call.
#[derive(Debug)]
pub struct CompiledFunction {
    func: Arc<FunctionValue>,
    platform: Arc<PlatformTable>,
}

/// Compile a function value against a platform table.
///
/// 1. Type-check the body against the declared function type.
/// 2. Recompute the platform-reference list, verify it matches the one
///    carried by the value, and resolve every reference against the
///    table (missing names and signature conflicts fail here).
/// 3. Reject sync bodies that call async platform entries.
pub fn compile(func: FunctionValue, platform: Arc<PlatformTable>) -> Result<CompiledFunction> {
    compile_arc(Arc::new(func), platform)
}

pub(crate) fn compile_arc(
    func: Arc<FunctionValue>,
    platform: Arc<PlatformTable>,
) -> Result<CompiledFunction> {
    validate_function(&func, &platform)?;
    debug!(
        platform_refs = func.platform_refs.len(),
        params = func.params.len(),
        "compiled function"
    );
    Ok(CompiledFunction { func, platform })
}

/// The checking half of compilation, also run when a function value is
/// decoded from the wire: type-check the body, verify the carried
/// platform-reference list, resolve every reference against the table,
/// and reject async platform calls in sync positions.
pub fn validate_function(func: &FunctionValue, platform: &PlatformTable) -> Result<()> {
    typecheck::check_function(func)?;
    let free = analysis::free_vars(&func.body);
    if let Some(unbound) = free.iter().find(|name| !func.params.contains(name)) {
        return Err(Error::new(
            ErrorKind::TypeMismatch,
            format!("function body has unbound variable '{}'", unbound),
        ));
    }
    let refs = analysis::platform_refs(&func.body)?;
    if refs != func.platform_refs {
        return Err(Error::new(
            ErrorKind::TypeMismatch,
            "platform reference list does not match the function body",
        ));
    }
    for reference in &refs {
        platform.resolve(reference)?;
    }
    check_platform_flavors(&func.body, func.ty.flavor, platform)
}

/// Reject async platform calls in positions that cannot suspend: a sync
/// function body, including sync lambdas nested in async functions (and
/// vice versa — an async lambda body may suspend even inside a sync
/// function, since it only runs when called asynchronously).
fn check_platform_flavors(
    expr: &Expr,
    flavor: FunctionFlavor,
    platform: &PlatformTable,
) -> Result<()> {
    if let ExprKind::PlatformCall { name, .. } = &expr.kind {
        if let Some(entry) = platform.get(name) {
            if entry.signature().flavor == FunctionFlavor::Async
                && flavor == FunctionFlavor::Sync
            {
                return Err(Error::new(
                    ErrorKind::PlatformSignatureMismatch,
                    format!(
                        "async platform function '{}' called from a sync function",
                        name
                    ),
                )
                .at(&expr.loc));
            }
        }
    }
    let inner_flavor = match &expr.kind {
        ExprKind::Lambda { .. } => match expr.ty.unfold() {
            Type::Function(f) => f.flavor,
            _ => flavor,
        },
        _ => flavor,
    };
    let mut outcome = Ok(());
    analysis::walk_children(&expr.kind, &mut |child| {
        if outcome.is_ok() {
            outcome = check_platform_flavors(child, inner_flavor, platform);
        }
    });
    outcome
}

impl CompiledFunction {
    pub fn function(&self) -> &Arc<FunctionValue> {
        &self.func
    }

    /// Call a sync function. Async functions must go through
    /// [`CompiledFunction::call_async`].
    pub fn call(&self, args: Vec<Value>) -> Result<Value> {
        if self.func.ty.flavor == FunctionFlavor::Async {
            return Err(Error::new(
                ErrorKind::TypeMismatch,
                "async function requires call_async",
            ));
        }
        let mut env = self.bind_args(args)?;
        let interp = Interpreter {
            platform: &self.platform,
        };
        interp
            .eval(&self.func.body, &mut env)?
            .into_value(&self.func.body.loc)
    }

    /// Call a function of either flavor, suspending at async platform
    /// calls.
    pub async fn call_async(&self, args: Vec<Value>) -> Result<Value> {
        let mut env = self.bind_args(args)?;
        let interp = Interpreter {
            platform: &self.platform,
        };
        interp
            .eval_async(&self.func.body, &mut env)
            .await?
            .into_value(&self.func.body.loc)
    }

    fn bind_args(&self, args: Vec<Value>) -> Result<Env> {
        if args.len() != self.func.params.len() {
            return Err(Error::new(
                ErrorKind::TypeMismatch,
                format!(
                    "function takes {} arguments, got {}",
                    self.func.params.len(),
                    args.len()
                ),
            ));
        }
        let mut env = Env::new();
        for ((name, ty), value) in self
            .func
            .params
            .iter()
            .zip(self.func.ty.params.iter())
            .zip(args)
        {
            if !value.conforms_to(ty) {
                return Err(Error::new(
                    ErrorKind::TypeMismatch,
                    format!("argument '{}' does not inhabit {}", name, ty),
                ));
            }
            env.bind(name.clone(), value);
        }
        Ok(env)
    }
}

pub(crate) struct Interpreter<'a> {
    pub(crate) platform: &'a PlatformTable,
}

impl Interpreter<'_> {
    pub(crate) fn eval(&self, expr: &Expr, env: &mut Env) -> Result<Flow> {
        match &expr.kind {
            ExprKind::Literal(value) => Ok(Flow::Value(value.clone())),
            ExprKind::Var(name) => match env.lookup(name) {
                Some(value) => Ok(Flow::Value(value.clone())),
                None => Err(Error::new(
                    ErrorKind::TypeMismatch,
                    format!("unbound variable '{}'", name),
                )
                .at(&expr.loc)),
            },
            ExprKind::Let { name, value } => {
                let value = flow!(self.eval(value, env)?);
                env.bind(name.clone(), value);
                Ok(Flow::Value(Value::Null))
            }
            ExprKind::Assign { target, value } => {
                let target = flow!(self.eval(target, env)?);
                let value = flow!(self.eval(value, env)?);
                match target {
                    Value::Ref(cell) => {
                        cell.set(value).map_err(|e| e.at(&expr.loc))?;
                        Ok(Flow::Value(Value::Null))
                    }
                    other => Err(Error::new(
                        ErrorKind::TypeMismatch,
                        format!("assignment target is {} not a ref", other.shape_name()),
                    )
                    .at(&expr.loc)),
                }
            }
            ExprKind::Block(children) => {
                env.push();
                let mut last = Value::Null;
                for child in children {
                    match self.eval(child, env) {
                        Ok(Flow::Value(v)) => last = v,
                        other => {
                            env.pop();
                            return other;
                        }
                    }
                }
                env.pop();
                Ok(Flow::Value(last))
            }
            ExprKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let cond = expect_boolean(flow!(self.eval(cond, env)?), &expr.loc)?;
                if cond {
                    let value = flow!(self.eval(then_branch, env)?);
                    Ok(Flow::Value(match else_branch {
                        Some(_) => value,
                        None => Value::Null,
                    }))
                } else {
                    match else_branch {
                        Some(else_branch) => self.eval(else_branch, env),
                        None => Ok(Flow::Value(Value::Null)),
                    }
                }
            }
            ExprKind::For {
                binding,
                iterable,
                body,
            } => {
                let container = flow!(self.eval(iterable, env)?);
                for item in iterate(container, &expr.loc)? {
                    env.push();
                    env.bind(binding.clone(), item);
                    let outcome = self.eval(body, env);
                    env.pop();
                    match outcome? {
                        Flow::Value(_) | Flow::Continue => {}
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                    }
                }
                Ok(Flow::Value(Value::Null))
            }
            ExprKind::Loop { body } => {
                loop {
                    match self.eval(body, env)? {
                        Flow::Value(_) | Flow::Continue => {}
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                    }
                }
                Ok(Flow::Value(Value::Null))
            }
            ExprKind::Break => Ok(Flow::Break),
            ExprKind::Continue => Ok(Flow::Continue),
            ExprKind::Return(value) => {
                let value = flow!(self.eval(value, env)?);
                Ok(Flow::Return(value))
            }
            ExprKind::Call { callee, args } => {
                let callee = flow!(self.eval(callee, env)?);
                let func = expect_function(callee, &expr.loc)?;
                if func.ty.flavor == FunctionFlavor::Async {
                    return Err(Error::new(
                        ErrorKind::TypeMismatch,
                        "async function called synchronously",
                    )
                    .at(&expr.loc));
                }
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(flow!(self.eval(arg, env)?));
                }
                self.invoke(&func, values, &expr.loc)
            }
            ExprKind::PlatformCall { name, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(flow!(self.eval(arg, env)?));
                }
                let entry = self.platform.get(name).ok_or_else(|| {
                    Error::new(
                        ErrorKind::MissingPlatform,
                        format!("platform function '{}' is not provided", name),
                    )
                    .at(&expr.loc)
                })?;
                let result = entry.call_sync(values).map_err(|e| e.at(&expr.loc))?;
                check_platform_result(entry.signature(), &result, &expr.loc)?;
                Ok(Flow::Value(result))
            }
            ExprKind::Field { target, name } => {
                let target = flow!(self.eval(target, env)?);
                match target {
                    Value::Struct(s) => match s.field(name) {
                        Some(value) => Ok(Flow::Value(value.clone())),
                        None => Err(Error::new(
                            ErrorKind::MissingField,
                            format!("struct has no field '{}'", name),
                        )
                        .at(&expr.loc)),
                    },
                    other => Err(Error::new(
                        ErrorKind::TypeMismatch,
                        format!("field access on {}", other.shape_name()),
                    )
                    .at(&expr.loc)),
                }
            }
            ExprKind::Construct { fields } => {
                let mut values = Vec::with_capacity(fields.len());
                for (name, value) in fields {
                    values.push((name.clone(), flow!(self.eval(value, env)?)));
                }
                Ok(Flow::Value(Value::Struct(Arc::new(StructValue {
                    fields: values,
                }))))
            }
            ExprKind::VariantConstruct { tag, payload } => {
                let payload = flow!(self.eval(payload, env)?);
                let value = Value::variant(&expr.ty, tag.clone(), payload)
                    .map_err(|e| e.at(&expr.loc))?;
                Ok(Flow::Value(value))
            }
            ExprKind::Match {
                scrutinee,
                arms,
                default,
            } => {
                let scrutinee = flow!(self.eval(scrutinee, env)?);
                let variant = match scrutinee {
                    Value::Variant(v) => v,
                    other => {
                        return Err(Error::new(
                            ErrorKind::TypeMismatch,
                            format!("match on {}", other.shape_name()),
                        )
                        .at(&expr.loc));
                    }
                };
                match arms.iter().find(|arm| arm.tag == variant.tag) {
                    Some(arm) => {
                        env.push();
                        if let Some(binding) = &arm.binding {
                            env.bind(binding.clone(), variant.payload.clone());
                        }
                        let outcome = self.eval(&arm.body, env);
                        env.pop();
                        outcome
                    }
                    None => match default {
                        Some(default) => self.eval(default, env),
                        None => Err(Error::new(
                            ErrorKind::UnknownVariantTag,
                            format!("no match arm for tag '{}'", variant.tag),
                        )
                        .at(&expr.loc)),
                    },
                }
            }
            ExprKind::Lambda { params, body } => {
                Ok(Flow::Value(self.close_lambda(expr, params, body)?))
            }
            ExprKind::Unary { op, operand } => {
                let operand = flow!(self.eval(operand, env)?);
                eval_unary(*op, operand, &expr.loc).map(Flow::Value)
            }
            ExprKind::Binary { op, lhs, rhs } => {
                // Short-circuit logic first; everything else is strict.
                match op {
                    BinaryOp::And => {
                        let lhs = expect_boolean(flow!(self.eval(lhs, env)?), &expr.loc)?;
                        if !lhs {
                            return Ok(Flow::Value(Value::Boolean(false)));
                        }
                        let rhs = expect_boolean(flow!(self.eval(rhs, env)?), &expr.loc)?;
                        Ok(Flow::Value(Value::Boolean(rhs)))
                    }
                    BinaryOp::Or => {
                        let lhs = expect_boolean(flow!(self.eval(lhs, env)?), &expr.loc)?;
                        if lhs {
                            return Ok(Flow::Value(Value::Boolean(true)));
                        }
                        let rhs = expect_boolean(flow!(self.eval(rhs, env)?), &expr.loc)?;
                        Ok(Flow::Value(Value::Boolean(rhs)))
                    }
                    _ => {
                        let lhs = flow!(self.eval(lhs, env)?);
                        let rhs = flow!(self.eval(rhs, env)?);
                        eval_binary(*op, lhs, rhs, &expr.loc).map(Flow::Value)
                    }
                }
            }
            ExprKind::StringOp { op, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(flow!(self.eval(arg, env)?));
                }
                eval_string_op(*op, values, &expr.loc).map(Flow::Value)
            }
            ExprKind::ContainerOp { op, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(flow!(self.eval(arg, env)?));
                }
                eval_container_op(*op, values, &expr.loc).map(Flow::Value)
            }
            ExprKind::NewRef(inner) => {
                let inner = flow!(self.eval(inner, env)?);
                Ok(Flow::Value(Value::ref_of(inner)))
            }
            ExprKind::Deref(inner) => {
                let inner = flow!(self.eval(inner, env)?);
                match inner {
                    Value::Ref(cell) => Ok(Flow::Value(cell.get())),
                    other => Err(Error::new(
                        ErrorKind::TypeMismatch,
                        format!("deref of {}", other.shape_name()),
                    )
                    .at(&expr.loc)),
                }
            }
        }
    }

    /// Invoke a function value in a fresh environment against this
    /// interpreter's platform table.
    pub(crate) fn invoke(
        &self,
        func: &FunctionValue,
        args: Vec<Value>,
        loc: &SourceLocation,
    ) -> Result<Flow> {
        let mut env = Env::new();
        for (name, value) in func.params.iter().zip(args) {
            env.bind(name.clone(), value);
        }
        let flow = self.eval(&func.body, &mut env).map_err(|e| e.at(loc))?;
        Ok(Flow::Value(flow.into_value(&func.body.loc)?))
    }

    /// Evaluate a lambda node to a function value.
    pub(crate) fn close_lambda(
        &self,
        expr: &Expr,
        params: &[String],
        body: &Expr,
    ) -> Result<Value> {
        let ty = match expr.ty.unfold() {
            Type::Function(f) => f,
            other => {
                return Err(Error::new(
                    ErrorKind::TypeMismatch,
                    format!("lambda typed as {}", other),
                )
                .at(&expr.loc));
            }
        };
        let platform_refs = analysis::platform_refs(body)?;
        Ok(Value::Function(Arc::new(FunctionValue {
            ty,
            params: params.to_vec(),
            body: body.clone(),
            platform_refs,
        })))
    }
}

pub(crate) fn expect_boolean(value: Value, loc: &SourceLocation) -> Result<bool> {
    match value {
        Value::Boolean(b) => Ok(b),
        other => Err(Error::new(
            ErrorKind::TypeMismatch,
            format!("expected boolean, found {}", other.shape_name()),
        )
        .at(loc)),
    }
}

pub(crate) fn expect_function(value: Value, loc: &SourceLocation) -> Result<Arc<FunctionValue>> {
    match value {
        Value::Function(f) => Ok(f),
        other => Err(Error::new(
            ErrorKind::TypeMismatch,
            format!("cannot call {}", other.shape_name()),
        )
        .at(loc)),
    }
}

/// Validate a host implementation's result against its declared type.
pub(crate) fn check_platform_result(
    signature: &crate::platform::PlatformSignature,
    result: &Value,
    loc: &SourceLocation,
) -> Result<()> {
    if !result.conforms_to(&signature.result) {
        return Err(Error::new(
            ErrorKind::TypeMismatch,
            format!(
                "platform function '{}' returned {} instead of {}",
                signature.name,
                result.shape_name(),
                signature.result
            ),
        )
        .at(loc));
    }
    Ok(())
}

/// Items of a container, in its defined iteration order.
pub(crate) fn iterate(container: Value, loc: &SourceLocation) -> Result<Vec<Value>> {
    match container {
        Value::Array(items) => Ok(items.as_ref().clone()),
        Value::Set(members) => Ok(members.iter().cloned().collect()),
        Value::Dict(entries) => Ok(entries
            .iter()
            .map(|(k, v)| {
                Value::struct_of(vec![("key", k.clone()), ("value", v.clone())])
            })
            .collect()),
        other => Err(Error::new(
            ErrorKind::TypeMismatch,
            format!("cannot iterate {}", other.shape_name()),
        )
        .at(loc)),
    }
}

pub(crate) fn eval_unary(op: UnaryOp, operand: Value, loc: &SourceLocation) -> Result<Value> {
    match (op, operand) {
        (UnaryOp::Not, Value::Boolean(b)) => Ok(Value::Boolean(!b)),
        (UnaryOp::Neg, Value::Integer(n)) => Ok(Value::Integer(-n)),
        (UnaryOp::Neg, Value::Float(x)) => Ok(Value::Float(-x)),
        (op, operand) => Err(Error::new(
            ErrorKind::TypeMismatch,
            format!("{:?} applied to {}", op, operand.shape_name()),
        )
        .at(loc)),
    }
}

pub(crate) fn eval_binary(
    op: BinaryOp,
    lhs: Value,
    rhs: Value,
    loc: &SourceLocation,
) -> Result<Value> {
    match op {
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
            match (lhs, rhs) {
                (Value::Integer(a), Value::Integer(b)) => {
                    if matches!(op, BinaryOp::Div | BinaryOp::Mod) && b.is_zero() {
                        return Err(Error::new(
                            ErrorKind::ArithmeticError,
                            "integer division by zero",
                        )
                        .at(loc));
                    }
                    Ok(Value::Integer(match op {
                        BinaryOp::Add => a + b,
                        BinaryOp::Sub => a - b,
                        BinaryOp::Mul => a * b,
                        BinaryOp::Div => a / b,
                        BinaryOp::Mod => a % b,
                        _ => unreachable!(),
                    }))
                }
                (Value::Float(a), Value::Float(b)) => Ok(Value::Float(match op {
                    BinaryOp::Add => a + b,
                    BinaryOp::Sub => a - b,
                    BinaryOp::Mul => a * b,
                    BinaryOp::Div => a / b,
                    BinaryOp::Mod => a % b,
                    _ => unreachable!(),
                })),
                (lhs, rhs) => Err(Error::new(
                    ErrorKind::TypeMismatch,
                    format!(
                        "{:?} applied to {} and {}",
                        op,
                        lhs.shape_name(),
                        rhs.shape_name()
                    ),
                )
                .at(loc)),
            }
        }
        BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt
        | BinaryOp::Ge => {
            let ordering = total_cmp(&lhs, &rhs);
            Ok(Value::Boolean(match op {
                BinaryOp::Eq => ordering == Ordering::Equal,
                BinaryOp::Ne => ordering != Ordering::Equal,
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Le => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                BinaryOp::Ge => ordering != Ordering::Less,
                _ => unreachable!(),
            }))
        }
        BinaryOp::And | BinaryOp::Or => {
            // Handled in eval with short-circuiting; direct calls are
            // strict.
            match (lhs, rhs) {
                (Value::Boolean(a), Value::Boolean(b)) => Ok(Value::Boolean(match op {
                    BinaryOp::And => a && b,
                    BinaryOp::Or => a || b,
                    _ => unreachable!(),
                })),
                (lhs, rhs) => Err(Error::new(
                    ErrorKind::TypeMismatch,
                    format!(
                        "{:?} applied to {} and {}",
                        op,
                        lhs.shape_name(),
                        rhs.shape_name()
                    ),
                )
                .at(loc)),
            }
        }
    }
}

pub(crate) fn eval_string_op(
    op: StringOp,
    args: Vec<Value>,
    loc: &SourceLocation,
) -> Result<Value> {
    let malformed = |what: &str| {
        Error::new(
            ErrorKind::TypeMismatch,
            format!("malformed string operation: {}", what),
        )
        .at(loc)
    };
    match (op, args.as_slice()) {
        (StringOp::Concat, [Value::String(a), Value::String(b)]) => {
            Ok(Value::String(format!("{}{}", a, b)))
        }
        (StringOp::Length, [Value::String(s)]) => {
            Ok(Value::integer(s.chars().count() as i64))
        }
        (StringOp::Substring, [Value::String(s), Value::Integer(start), Value::Integer(end)]) =>
        {
            let chars: Vec<char> = s.chars().collect();
            let clamp = |n: &num_bigint::BigInt| -> usize {
                if n.is_negative() {
                    0
                } else {
                    n.to_usize().unwrap_or(chars.len()).min(chars.len())
                }
            };
            let start = clamp(start);
            let end = clamp(end).max(start);
            Ok(Value::String(chars[start..end].iter().collect()))
        }
        (StringOp::Contains, [Value::String(haystack), Value::String(needle)]) => {
            Ok(Value::Boolean(haystack.contains(needle.as_str())))
        }
        _ => Err(malformed("argument shapes")),
    }
}

pub(crate) fn eval_container_op(
    op: ContainerOp,
    mut args: Vec<Value>,
    loc: &SourceLocation,
) -> Result<Value> {
    let malformed = |what: &str| {
        Error::new(
            ErrorKind::TypeMismatch,
            format!("malformed container operation: {}", what),
        )
        .at(loc)
    };
    match op {
        ContainerOp::Index => match (args.first(), args.get(1)) {
            (Some(Value::Array(items)), Some(Value::Integer(i))) => {
                let index = i.to_usize().filter(|&i| i < items.len()).ok_or_else(|| {
                    Error::new(
                        ErrorKind::ArithmeticError,
                        format!("array index {} out of range 0..{}", i, items.len()),
                    )
                    .at(loc)
                })?;
                Ok(items[index].clone())
            }
            (Some(Value::Dict(entries)), Some(key)) => {
                entries.get(key).cloned().ok_or_else(|| {
                    Error::new(
                        ErrorKind::ArithmeticError,
                        format!("dict has no key {}", key),
                    )
                    .at(loc)
                })
            }
            _ => Err(malformed("index")),
        },
        ContainerOp::Size => match args.first() {
            Some(Value::Array(items)) => Ok(Value::integer(items.len() as i64)),
            Some(Value::Set(members)) => Ok(Value::integer(members.len() as i64)),
            Some(Value::Dict(entries)) => Ok(Value::integer(entries.len() as i64)),
            _ => Err(malformed("size")),
        },
        ContainerOp::Contains => match (args.first(), args.get(1)) {
            (Some(Value::Set(members)), Some(key)) => {
                Ok(Value::Boolean(members.contains(key)))
            }
            (Some(Value::Dict(entries)), Some(key)) => {
                Ok(Value::Boolean(entries.contains_key(key)))
            }
            _ => Err(malformed("contains")),
        },
        ContainerOp::Push => {
            let item = args.pop().ok_or_else(|| malformed("push"))?;
            match args.pop() {
                Some(Value::Ref(cell)) => {
                    cell.update(|content| match content {
                        Value::Array(items) => {
                            Arc::make_mut(items).push(item);
                            Ok(())
                        }
                        other => Err(Error::new(
                            ErrorKind::TypeMismatch,
                            format!("push into {}", other.shape_name()),
                        )),
                    })
                    .map_err(|e| e.at(loc))?;
                    Ok(Value::Null)
                }
                _ => Err(malformed("push target")),
            }
        }
        ContainerOp::Insert => {
            if args.is_empty() {
                return Err(malformed("insert"));
            }
            let mut rest = args.split_off(1);
            match (args.pop(), rest.len()) {
                (Some(Value::Ref(cell)), 1) => {
                    let key = rest.pop().expect("length checked");
                    cell.update(|content| match content {
                        Value::Set(members) => {
                            Arc::make_mut(members).insert(key);
                            Ok(())
                        }
                        other => Err(Error::new(
                            ErrorKind::TypeMismatch,
                            format!("single-key insert into {}", other.shape_name()),
                        )),
                    })
                    .map_err(|e| e.at(loc))?;
                    Ok(Value::Null)
                }
                (Some(Value::Ref(cell)), 2) => {
                    let value = rest.pop().expect("length checked");
                    let key = rest.pop().expect("length checked");
                    cell.update(|content| match content {
                        Value::Dict(entries) => {
                            Arc::make_mut(entries).insert(key, value);
                            Ok(())
                        }
                        other => Err(Error::new(
                            ErrorKind::TypeMismatch,
                            format!("keyed insert into {}", other.shape_name()),
                        )),
                    })
                    .map_err(|e| e.at(loc))?;
                    Ok(Value::Null)
                }
                _ => Err(malformed("insert")),
            }
        }
        ContainerOp::Remove => {
            let key = args.pop().ok_or_else(|| malformed("remove"))?;
            match args.pop() {
                Some(Value::Ref(cell)) => {
                    let removed = cell
                        .update(|content| match content {
                            Value::Set(members) => {
                                Ok(Arc::make_mut(members).remove(&key))
                            }
                            Value::Dict(entries) => {
                                Ok(Arc::make_mut(entries).remove(&key).is_some())
                            }
                            other => Err(Error::new(
                                ErrorKind::TypeMismatch,
                                format!("remove from {}", other.shape_name()),
                            )),
                        })
                        .map_err(|e| e.at(loc))?;
                    Ok(Value::Boolean(removed))
                }
                _ => Err(malformed("remove target")),
            }
        }
        ContainerOp::Keys => match args.first() {
            Some(Value::Dict(entries)) => {
                Ok(Value::array(entries.keys().cloned().collect()))
            }
            _ => Err(malformed("keys")),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build;
    use east_core::types::FunctionType;

    fn sync_fn(params: Vec<Type>, result: Type) -> FunctionType {
        FunctionType {
            params,
            result,
            flavor: FunctionFlavor::Sync,
            allowlist: None,
        }
    }

    fn empty_platform() -> Arc<PlatformTable> {
        Arc::new(PlatformTable::new())
    }

    #[test]
    fn test_increment() {
        let func = build::function_value(
            sync_fn(vec![Type::Integer], Type::Integer),
            vec!["x"],
            build::add(build::var("x", Type::Integer), build::integer(1)),
        )
        .unwrap();
        let compiled = compile(func, empty_platform()).unwrap();
        assert_eq!(
            compiled.call(vec![Value::integer(10)]).unwrap(),
            Value::integer(11)
        );
    }

    #[test]
    fn test_multi_arg_arithmetic() {
        // (a, b) -> (a + b) * 2
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
        let compiled = compile(func, empty_platform()).unwrap();
        assert_eq!(
            compiled
                .call(vec![Value::integer(3), Value::integer(4)])
                .unwrap(),
            Value::integer(14)
        );
    }

    #[test]
    fn test_platform_call_binds_implementation() {
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
        // (x) -> double(x) + 1
        let func = build::function_value(
            sync_fn(vec![Type::Integer], Type::Integer),
            vec!["x"],
            build::add(
                build::platform_call(
                    "double",
                    vec![build::var("x", Type::Integer)],
                    Type::Integer,
                ),
                build::integer(1),
            ),
        )
        .unwrap();
        let compiled = compile(func, Arc::new(table)).unwrap();
        assert_eq!(
            compiled.call(vec![Value::integer(10)]).unwrap(),
            Value::integer(21)
        );
    }

    #[test]
    fn test_missing_platform_fails_compile() {
        let func = build::function_value(
            sync_fn(vec![Type::Integer], Type::Integer),
            vec!["x"],
            build::platform_call("double", vec![build::var("x", Type::Integer)], Type::Integer),
        )
        .unwrap();
        let err = compile(func, empty_platform()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingPlatform);
        assert!(format!("{}", err).contains("double"));
    }

    #[test]
    fn test_let_assign_and_loops() {
        // (n) -> { let acc = ref 0; for i in range-ish array; ... }
        // Sum an array with a ref accumulator.
        let array_ty = Type::array(Type::Integer);
        let acc_ty = Type::ref_of(Type::Integer);
        let func = build::function_value(
            sync_fn(vec![array_ty.clone()], Type::Integer),
            vec!["xs"],
            build::block(vec![
                build::let_("acc", build::new_ref(build::integer(0))),
                build::for_(
                    "x",
                    build::var("xs", array_ty),
                    build::assign(
                        build::var("acc", acc_ty.clone()),
                        build::add(
                            build::deref(build::var("acc", acc_ty.clone())),
                            build::var("x", Type::Integer),
                        ),
                    ),
                ),
                build::deref(build::var("acc", acc_ty)),
            ]),
        )
        .unwrap();
        let compiled = compile(func, empty_platform()).unwrap();
        let input = Value::array(vec![
            Value::integer(1),
            Value::integer(2),
            Value::integer(3),
        ]);
        assert_eq!(compiled.call(vec![input]).unwrap(), Value::integer(6));
    }

    #[test]
    fn test_break_and_continue() {
        // Count members below 3, stopping at 10.
        let set_ty = Type::set(Type::Integer);
        let acc_ty = Type::ref_of(Type::Integer);
        let func = build::function_value(
            sync_fn(vec![set_ty.clone()], Type::Integer),
            vec!["xs"],
            build::block(vec![
                build::let_("count", build::new_ref(build::integer(0))),
                build::for_(
                    "x",
                    build::var("xs", set_ty),
                    build::block(vec![
                        build::if_(
                            build::ge(build::var("x", Type::Integer), build::integer(10)),
                            build::break_(),
                            None,
                        ),
                        build::if_(
                            build::ge(build::var("x", Type::Integer), build::integer(3)),
                            build::continue_(),
                            None,
                        ),
                        build::assign(
                            build::var("count", acc_ty.clone()),
                            build::add(
                                build::deref(build::var("count", acc_ty.clone())),
                                build::integer(1),
                            ),
                        ),
                    ]),
                ),
                build::deref(build::var("count", acc_ty)),
            ]),
        )
        .unwrap();
        let compiled = compile(func, empty_platform()).unwrap();
        let input = Value::set_of(vec![
            Value::integer(1),
            Value::integer(2),
            Value::integer(5),
            Value::integer(12),
            Value::integer(20),
        ]);
        // 1 and 2 count; 5 is skipped; 12 breaks before 20.
        assert_eq!(compiled.call(vec![input]).unwrap(), Value::integer(2));
    }

    #[test]
    fn test_integer_division_by_zero() {
        let func = build::function_value(
            sync_fn(vec![Type::Integer], Type::Integer),
            vec!["x"],
            build::div(build::var("x", Type::Integer), build::integer(0)),
        )
        .unwrap();
        let compiled = compile(func, empty_platform()).unwrap();
        let err = compiled.call(vec![Value::integer(1)]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArithmeticError);
    }

    #[test]
    fn test_float_division_follows_ieee() {
        let func = build::function_value(
            sync_fn(vec![Type::Float, Type::Float], Type::Float),
            vec!["a", "b"],
            build::div(build::var("a", Type::Float), build::var("b", Type::Float)),
        )
        .unwrap();
        let compiled = compile(func, empty_platform()).unwrap();
        assert_eq!(
            compiled
                .call(vec![Value::Float(1.0), Value::Float(0.0)])
                .unwrap(),
            Value::Float(f64::INFINITY)
        );
        match compiled
            .call(vec![Value::Float(0.0), Value::Float(0.0)])
            .unwrap()
        {
            Value::Float(x) => assert!(x.is_nan()),
            other => panic!("expected float, got {}", other),
        }
    }

    #[test]
    fn test_match_dispatch_and_binding() {
        let shape = Type::variant_of(vec![
            ("circle", Type::Float),
            ("square", Type::Float),
        ]);
        let func = build::function_value(
            sync_fn(vec![shape.clone()], Type::Float),
            vec!["s"],
            build::match_(
                Type::Float,
                build::var("s", shape.clone()),
                vec![
                    build::arm(
                        "circle",
                        Some("r"),
                        build::mul(build::var("r", Type::Float), build::float(3.0)),
                    ),
                    build::arm(
                        "square",
                        Some("side"),
                        build::mul(
                            build::var("side", Type::Float),
                            build::var("side", Type::Float),
                        ),
                    ),
                ],
                None,
            ),
        )
        .unwrap();
        let compiled = compile(func, empty_platform()).unwrap();
        assert_eq!(
            compiled
                .call(vec![
                    Value::variant(&shape, "square", Value::Float(4.0)).unwrap()
                ])
                .unwrap(),
            Value::Float(16.0)
        );
    }

    #[test]
    fn test_first_class_function_call() {
        // (f, x) -> f(f(x))
        let f_ty = Type::function(vec![Type::Integer], Type::Integer);
        let twice = build::function_value(
            sync_fn(vec![f_ty.clone(), Type::Integer], Type::Integer),
            vec!["f", "x"],
            build::call(
                build::var("f", f_ty.clone()),
                vec![build::call(
                    build::var("f", f_ty.clone()),
                    vec![build::var("x", Type::Integer)],
                )],
            ),
        )
        .unwrap();
        let compiled = compile(twice, empty_platform()).unwrap();

        let add_three = build::function_value(
            sync_fn(vec![Type::Integer], Type::Integer),
            vec!["y"],
            build::add(build::var("y", Type::Integer), build::integer(3)),
        )
        .unwrap();
        let result = compiled
            .call(vec![
                Value::Function(Arc::new(add_three)),
                Value::integer(10),
            ])
            .unwrap();
        assert_eq!(result, Value::integer(16));
    }

    #[test]
    fn test_frozen_value_rejects_assign() {
        let acc_ty = Type::ref_of(Type::Integer);
        let func = build::function_value(
            sync_fn(vec![acc_ty.clone()], Type::Null),
            vec!["cell"],
            build::assign(build::var("cell", acc_ty), build::integer(9)),
        )
        .unwrap();
        let compiled = compile(func, empty_platform()).unwrap();
        let cell = Value::ref_of(Value::integer(1));
        cell.freeze();
        let err = compiled.call(vec![cell]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FrozenMutation);
    }

    #[test]
    fn test_container_ops_roundtrip() {
        // (d) -> { let r = ref d; insert(r, "k", 1); index(deref r, "k") }
        let dict_ty = Type::dict(Type::String, Type::Integer);
        let ref_ty = Type::ref_of(dict_ty.clone());
        let func = build::function_value(
            sync_fn(vec![dict_ty.clone()], Type::Integer),
            vec!["d"],
            build::block(vec![
                build::let_("r", build::new_ref(build::var("d", dict_ty.clone()))),
                build::insert(
                    build::var("r", ref_ty.clone()),
                    vec![build::string_lit("k"), build::integer(1)],
                ),
                build::index(
                    build::deref(build::var("r", ref_ty)),
                    build::string_lit("k"),
                ),
            ]),
        )
        .unwrap();
        let compiled = compile(func, empty_platform()).unwrap();
        assert_eq!(
            compiled.call(vec![Value::dict_of(vec![])]).unwrap(),
            Value::integer(1)
        );
    }
}
