//! The suspendable twin of the evaluator
//!
//! Async functions evaluate with the same semantics as sync ones; the
//! only difference is that a `platform_call` on an async platform entry
//! yields to the host scheduler and resumes when the host completes it.
//! Within one invocation all effects stay in program order; across
//! invocations East promises nothing.
//!
//! Every arm here must stay observationally identical to its sync
//! counterpart in `eval` — the two walks differ only in suspension.

use crate::eval::{
    check_platform_result, eval_binary, eval_container_op, eval_string_op, eval_unary,
    expect_boolean, expect_function, flow, iterate, Env, Flow, Interpreter,
};
use east_core::ir::{BinaryOp, Expr, ExprKind, FunctionValue};
use east_core::value::{StructValue, Value};
use east_core::{Error, ErrorKind, Result, SourceLocation};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

type FlowFuture<'a> = Pin<Box<dyn Future<Output = Result<Flow>> + Send + 'a>>;

impl Interpreter<'_> {
    pub(crate) fn eval_async<'a>(&'a self, expr: &'a Expr, env: &'a mut Env) -> FlowFuture<'a> {
        Box::pin(async move {
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
                    let value = flow!(self.eval_async(value, env).await?);
                    env.bind(name.clone(), value);
                    Ok(Flow::Value(Value::Null))
                }
                ExprKind::Assign { target, value } => {
                    let target = flow!(self.eval_async(target, env).await?);
                    let value = flow!(self.eval_async(value, env).await?);
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
                        match self.eval_async(child, env).await {
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
                    let cond =
                        expect_boolean(flow!(self.eval_async(cond, env).await?), &expr.loc)?;
                    if cond {
                        let value = flow!(self.eval_async(then_branch, env).await?);
                        Ok(Flow::Value(match else_branch {
                            Some(_) => value,
                            None => Value::Null,
                        }))
                    } else {
                        match else_branch {
                            Some(else_branch) => self.eval_async(else_branch, env).await,
                            None => Ok(Flow::Value(Value::Null)),
                        }
                    }
                }
                ExprKind::For {
                    binding,
                    iterable,
                    body,
                } => {
                    let container = flow!(self.eval_async(iterable, env).await?);
                    for item in iterate(container, &expr.loc)? {
                        env.push();
                        env.bind(binding.clone(), item);
                        let outcome = self.eval_async(body, env).await;
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
                        match self.eval_async(body, env).await? {
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
                    let value = flow!(self.eval_async(value, env).await?);
                    Ok(Flow::Return(value))
                }
                ExprKind::Call { callee, args } => {
                    let callee = flow!(self.eval_async(callee, env).await?);
                    let func = expect_function(callee, &expr.loc)?;
                    let mut values = Vec::with_capacity(args.len());
                    for arg in args {
                        values.push(flow!(self.eval_async(arg, env).await?));
                    }
                    self.invoke_async(func, values, &expr.loc).await
                }
                ExprKind::PlatformCall { name, args } => {
                    let mut values = Vec::with_capacity(args.len());
                    for arg in args {
                        values.push(flow!(self.eval_async(arg, env).await?));
                    }
                    let entry = self.platform.get(name).ok_or_else(|| {
                        Error::new(
                            ErrorKind::MissingPlatform,
                            format!("platform function '{}' is not provided", name),
                        )
                        .at(&expr.loc)
                    })?;
                    let result = entry.call(values).await.map_err(|e| e.at(&expr.loc))?;
                    check_platform_result(entry.signature(), &result, &expr.loc)?;
                    Ok(Flow::Value(result))
                }
                ExprKind::Field { target, name } => {
                    let target = flow!(self.eval_async(target, env).await?);
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
                        values.push((name.clone(), flow!(self.eval_async(value, env).await?)));
                    }
                    Ok(Flow::Value(Value::Struct(Arc::new(StructValue {
                        fields: values,
                    }))))
                }
                ExprKind::VariantConstruct { tag, payload } => {
                    let payload = flow!(self.eval_async(payload, env).await?);
                    let value = Value::variant(&expr.ty, tag.clone(), payload)
                        .map_err(|e| e.at(&expr.loc))?;
                    Ok(Flow::Value(value))
                }
                ExprKind::Match {
                    scrutinee,
                    arms,
                    default,
                } => {
                    let scrutinee = flow!(self.eval_async(scrutinee, env).await?);
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
                            let outcome = self.eval_async(&arm.body, env).await;
                            env.pop();
                            outcome
                        }
                        None => match default {
                            Some(default) => self.eval_async(default, env).await,
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
                    let operand = flow!(self.eval_async(operand, env).await?);
                    eval_unary(*op, operand, &expr.loc).map(Flow::Value)
                }
                ExprKind::Binary { op, lhs, rhs } => match op {
                    BinaryOp::And => {
                        let lhs =
                            expect_boolean(flow!(self.eval_async(lhs, env).await?), &expr.loc)?;
                        if !lhs {
                            return Ok(Flow::Value(Value::Boolean(false)));
                        }
                        let rhs =
                            expect_boolean(flow!(self.eval_async(rhs, env).await?), &expr.loc)?;
                        Ok(Flow::Value(Value::Boolean(rhs)))
                    }
                    BinaryOp::Or => {
                        let lhs =
                            expect_boolean(flow!(self.eval_async(lhs, env).await?), &expr.loc)?;
                        if lhs {
                            return Ok(Flow::Value(Value::Boolean(true)));
                        }
                        let rhs =
                            expect_boolean(flow!(self.eval_async(rhs, env).await?), &expr.loc)?;
                        Ok(Flow::Value(Value::Boolean(rhs)))
                    }
                    _ => {
                        let lhs = flow!(self.eval_async(lhs, env).await?);
                        let rhs = flow!(self.eval_async(rhs, env).await?);
                        eval_binary(*op, lhs, rhs, &expr.loc).map(Flow::Value)
                    }
                },
                ExprKind::StringOp { op, args } => {
                    let mut values = Vec::with_capacity(args.len());
                    for arg in args {
                        values.push(flow!(self.eval_async(arg, env).await?));
                    }
                    eval_string_op(*op, values, &expr.loc).map(Flow::Value)
                }
                ExprKind::ContainerOp { op, args } => {
                    let mut values = Vec::with_capacity(args.len());
                    for arg in args {
                        values.push(flow!(self.eval_async(arg, env).await?));
                    }
                    eval_container_op(*op, values, &expr.loc).map(Flow::Value)
                }
                ExprKind::NewRef(inner) => {
                    let inner = flow!(self.eval_async(inner, env).await?);
                    Ok(Flow::Value(Value::ref_of(inner)))
                }
                ExprKind::Deref(inner) => {
                    let inner = flow!(self.eval_async(inner, env).await?);
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
        })
    }

    async fn invoke_async(
        &self,
        func: Arc<FunctionValue>,
        args: Vec<Value>,
        loc: &SourceLocation,
    ) -> Result<Flow> {
        let mut env = Env::new();
        for (name, value) in func.params.iter().zip(args) {
            env.bind(name.clone(), value);
        }
        let flow = self
            .eval_async(&func.body, &mut env)
            .await
            .map_err(|e| e.at(loc))?;
        Ok(Flow::Value(flow.into_value(&func.body.loc)?))
    }
}
