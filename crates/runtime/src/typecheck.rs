//! Type checking of IR trees
//!
//! Verifies that every node's declared result type matches what its kind
//! and children imply, that every variable is bound with the type its
//! binder declared, that `match` arms cover the scrutinee's tags, and
//! that a function body's result is a subtype of the declared output.
//! Recursive types are unfolded one level wherever a composite is
//! destructured.
//!
//! Platform-call signatures are resolved against the table at compile
//! time, not here; this pass only enforces the function type's allowlist.

use east_core::ir::{Expr, ExprKind, StringOp, UnaryOp};
use east_core::ir::{BinaryOp, ContainerOp, FunctionValue};
use east_core::types::{FunctionFlavor, FunctionType, Type};
use east_core::{Error, ErrorKind, Result};
use std::collections::HashMap;

/// Check a function value: parameter arity, body well-typedness, and the
/// body result against the declared output type.
pub fn check_function(func: &FunctionValue) -> Result<()> {
    if func.params.len() != func.ty.params.len() {
        return Err(Error::new(
            ErrorKind::TypeMismatch,
            format!(
                "function declares {} parameter types but {} names",
                func.ty.params.len(),
                func.params.len()
            ),
        ));
    }
    let checker = Checker { func: &func.ty };
    let mut scopes = Scopes::new();
    for (name, ty) in func.params.iter().zip(func.ty.params.iter()) {
        scopes.bind(name.clone(), ty.clone());
    }
    checker.check(&func.body, &mut scopes, 0)?;
    if !func.body.ty.is_subtype(&func.ty.result) {
        return Err(Error::new(
            ErrorKind::TypeMismatch,
            format!(
                "function body has type {} but declares result {}",
                func.body.ty, func.ty.result
            ),
        )
        .at(&func.body.loc));
    }
    Ok(())
}

struct Scopes {
    frames: Vec<HashMap<String, Type>>,
}

impl Scopes {
    fn new() -> Self {
        Scopes {
            frames: vec![HashMap::new()],
        }
    }

    fn push(&mut self) {
        self.frames.push(HashMap::new());
    }

    fn pop(&mut self) {
        self.frames.pop();
    }

    fn bind(&mut self, name: String, ty: Type) {
        self.frames
            .last_mut()
            .expect("scope stack never empty")
            .insert(name, ty);
    }

    fn lookup(&self, name: &str) -> Option<&Type> {
        self.frames.iter().rev().find_map(|f| f.get(name))
    }
}

struct Checker<'a> {
    func: &'a FunctionType,
}

impl Checker<'_> {
    fn check(&self, expr: &Expr, scopes: &mut Scopes, loop_depth: u32) -> Result<()> {
        match &expr.kind {
            ExprKind::Literal(value) => {
                if !value.conforms_to(&expr.ty) {
                    return Err(self.mismatch(
                        expr,
                        format!("{} literal does not inhabit {}", value.shape_name(), expr.ty),
                    ));
                }
                Ok(())
            }
            ExprKind::Var(name) => match scopes.lookup(name) {
                Some(declared) if declared.compatible(&expr.ty) => Ok(()),
                Some(declared) => Err(self.mismatch(
                    expr,
                    format!(
                        "variable '{}' was bound as {} but is used as {}",
                        name, declared, expr.ty
                    ),
                )),
                None => Err(self.mismatch(expr, format!("unbound variable '{}'", name))),
            },
            ExprKind::Let { name, value } => {
                self.check(value, scopes, loop_depth)?;
                self.expect_null(expr)?;
                scopes.bind(name.clone(), value.ty.clone());
                Ok(())
            }
            ExprKind::Assign { target, value } => {
                self.check(target, scopes, loop_depth)?;
                self.check(value, scopes, loop_depth)?;
                match target.ty.unfold() {
                    Type::Ref(content) => {
                        if !content.is_assignable(&value.ty) {
                            return Err(self.mismatch(
                                expr,
                                format!("cannot assign {} into Ref<{}>", value.ty, content),
                            ));
                        }
                    }
                    other => {
                        return Err(self.mismatch(
                            expr,
                            format!("assignment target must be a Ref, found {}", other),
                        ));
                    }
                }
                self.expect_null(expr)
            }
            ExprKind::Block(children) => {
                scopes.push();
                let outcome = (|| {
                    for child in children {
                        self.check(child, scopes, loop_depth)?;
                    }
                    Ok(())
                })();
                scopes.pop();
                outcome?;
                let null_ty = Type::Null;
                let last_ty = children.last().map(|e| &e.ty).unwrap_or(&null_ty);
                if !last_ty.is_subtype(&expr.ty) {
                    return Err(self.mismatch(
                        expr,
                        format!("block ends with {} but is typed {}", last_ty, expr.ty),
                    ));
                }
                Ok(())
            }
            ExprKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.check(cond, scopes, loop_depth)?;
                self.expect(cond, &Type::Boolean)?;
                self.check(then_branch, scopes, loop_depth)?;
                match else_branch {
                    Some(else_branch) => {
                        self.check(else_branch, scopes, loop_depth)?;
                        if !then_branch.ty.is_subtype(&expr.ty)
                            || !else_branch.ty.is_subtype(&expr.ty)
                        {
                            return Err(self.mismatch(
                                expr,
                                format!(
                                    "if branches have types {} and {} but the node is typed {}",
                                    then_branch.ty, else_branch.ty, expr.ty
                                ),
                            ));
                        }
                        Ok(())
                    }
                    // Without an else the node is null; the then value is
                    // discarded.
                    None => self.expect_null(expr),
                }
            }
            ExprKind::For {
                binding,
                iterable,
                body,
            } => {
                self.check(iterable, scopes, loop_depth)?;
                let element = match iterable.ty.unfold() {
                    Type::Array(item) => (*item).clone(),
                    Type::Set(key) => (*key).clone(),
                    Type::Dict(key, value) => Type::struct_of(vec![
                        ("key", (*key).clone()),
                        ("value", (*value).clone()),
                    ]),
                    other => {
                        return Err(self.mismatch(
                            expr,
                            format!("for-loop cannot iterate {}", other),
                        ));
                    }
                };
                scopes.push();
                scopes.bind(binding.clone(), element);
                let outcome = self.check(body, scopes, loop_depth + 1);
                scopes.pop();
                outcome?;
                self.expect_null(expr)
            }
            ExprKind::Loop { body } => {
                self.check(body, scopes, loop_depth + 1)?;
                self.expect_null(expr)
            }
            ExprKind::Break | ExprKind::Continue => {
                if loop_depth == 0 {
                    return Err(self.mismatch(
                        expr,
                        format!("{} outside of a loop", expr.kind_name()),
                    ));
                }
                self.expect_never(expr)
            }
            ExprKind::Return(value) => {
                self.check(value, scopes, loop_depth)?;
                if !value.ty.is_subtype(&self.func.result) {
                    return Err(self.mismatch(
                        expr,
                        format!(
                            "return of {} from a function declaring {}",
                            value.ty, self.func.result
                        ),
                    ));
                }
                self.expect_never(expr)
            }
            ExprKind::Call { callee, args } => {
                self.check(callee, scopes, loop_depth)?;
                let func_ty = match callee.ty.unfold() {
                    Type::Function(f) => f,
                    other => {
                        return Err(self
                            .mismatch(expr, format!("cannot call a value of type {}", other)));
                    }
                };
                if func_ty.flavor == FunctionFlavor::Async
                    && self.func.flavor == FunctionFlavor::Sync
                {
                    return Err(self.mismatch(
                        expr,
                        "cannot call an async function from a sync function".to_string(),
                    ));
                }
                self.check_args(expr, &func_ty.params, args, scopes, loop_depth)?;
                if !func_ty.result.compatible(&expr.ty) {
                    return Err(self.mismatch(
                        expr,
                        format!("call returns {} but is typed {}", func_ty.result, expr.ty),
                    ));
                }
                Ok(())
            }
            ExprKind::PlatformCall { name, args } => {
                for arg in args {
                    self.check(arg, scopes, loop_depth)?;
                }
                if let Some(allowlist) = &self.func.allowlist {
                    if !allowlist.iter().any(|allowed| allowed == name) {
                        return Err(Error::new(
                            ErrorKind::PlatformSignatureMismatch,
                            format!(
                                "platform function '{}' is not in the function's allowlist",
                                name
                            ),
                        )
                        .at(&expr.loc));
                    }
                }
                Ok(())
            }
            ExprKind::Field { target, name } => {
                self.check(target, scopes, loop_depth)?;
                let field_ty = match target.ty.unfold() {
                    Type::Struct(s) => s.field(name).cloned(),
                    other => {
                        return Err(self.mismatch(
                            expr,
                            format!("field access on non-struct type {}", other),
                        ));
                    }
                };
                match field_ty {
                    Some(field_ty) if field_ty.compatible(&expr.ty) => Ok(()),
                    Some(field_ty) => Err(self.mismatch(
                        expr,
                        format!("field '{}' has type {} not {}", name, field_ty, expr.ty),
                    )),
                    None => Err(Error::new(
                        ErrorKind::MissingField,
                        format!("struct has no field '{}'", name),
                    )
                    .at(&expr.loc)),
                }
            }
            ExprKind::Construct { fields } => {
                let struct_ty = match expr.ty.unfold() {
                    Type::Struct(s) => s,
                    other => {
                        return Err(self.mismatch(
                            expr,
                            format!("construct node typed as non-struct {}", other),
                        ));
                    }
                };
                let mut declared = struct_ty.fields.iter();
                for (name, value) in fields {
                    self.check(value, scopes, loop_depth)?;
                    match declared.next() {
                        Some((decl_name, decl_ty)) if decl_name == name => {
                            if !decl_ty.is_assignable(&value.ty) {
                                return Err(self.mismatch(
                                    expr,
                                    format!(
                                        "field '{}' expects {} but got {}",
                                        name, decl_ty, value.ty
                                    ),
                                ));
                            }
                        }
                        Some((decl_name, _)) => {
                            return Err(Error::new(
                                ErrorKind::MissingField,
                                format!("expected field '{}', found '{}'", decl_name, name),
                            )
                            .at(&expr.loc));
                        }
                        None => {
                            return Err(Error::new(
                                ErrorKind::ExtraField,
                                format!("struct has no field '{}'", name),
                            )
                            .at(&expr.loc));
                        }
                    }
                }
                if let Some((decl_name, _)) = declared.next() {
                    return Err(Error::new(
                        ErrorKind::MissingField,
                        format!("field '{}' was not constructed", decl_name),
                    )
                    .at(&expr.loc));
                }
                Ok(())
            }
            ExprKind::VariantConstruct { tag, payload } => {
                self.check(payload, scopes, loop_depth)?;
                let variant_ty = match expr.ty.unfold() {
                    Type::Variant(v) => v,
                    other => {
                        return Err(self.mismatch(
                            expr,
                            format!("variant construct typed as non-variant {}", other),
                        ));
                    }
                };
                match variant_ty.payload(tag) {
                    Some(payload_ty) if payload_ty.is_assignable(&payload.ty) => Ok(()),
                    Some(payload_ty) => Err(self.mismatch(
                        expr,
                        format!("tag '{}' expects {} but got {}", tag, payload_ty, payload.ty),
                    )),
                    None => Err(Error::new(
                        ErrorKind::UnknownVariantTag,
                        format!("variant type has no tag '{}'", tag),
                    )
                    .at(&expr.loc)),
                }
            }
            ExprKind::Match {
                scrutinee,
                arms,
                default,
            } => {
                self.check(scrutinee, scopes, loop_depth)?;
                let variant_ty = match scrutinee.ty.unfold() {
                    Type::Variant(v) => v,
                    other => {
                        return Err(
                            self.mismatch(expr, format!("cannot match on type {}", other))
                        );
                    }
                };
                let mut covered: Vec<&str> = Vec::new();
                for arm in arms {
                    let payload_ty = variant_ty.payload(&arm.tag).ok_or_else(|| {
                        Error::new(
                            ErrorKind::UnknownVariantTag,
                            format!("match arm names unknown tag '{}'", arm.tag),
                        )
                        .at(&expr.loc)
                    })?;
                    if covered.contains(&arm.tag.as_str()) {
                        return Err(self.mismatch(
                            expr,
                            format!("duplicate match arm for tag '{}'", arm.tag),
                        ));
                    }
                    covered.push(&arm.tag);
                    scopes.push();
                    if let Some(binding) = &arm.binding {
                        scopes.bind(binding.clone(), payload_ty.clone());
                    }
                    let outcome = self.check(&arm.body, scopes, loop_depth);
                    scopes.pop();
                    outcome?;
                    if !arm.body.ty.is_subtype(&expr.ty) {
                        return Err(self.mismatch(
                            expr,
                            format!(
                                "arm '{}' has type {} but the match is typed {}",
                                arm.tag, arm.body.ty, expr.ty
                            ),
                        ));
                    }
                }
                match default {
                    Some(default) => {
                        self.check(default, scopes, loop_depth)?;
                        if !default.ty.is_subtype(&expr.ty) {
                            return Err(self.mismatch(
                                expr,
                                format!(
                                    "default arm has type {} but the match is typed {}",
                                    default.ty, expr.ty
                                ),
                            ));
                        }
                    }
                    None => {
                        if let Some((tag, _)) = variant_ty
                            .tags
                            .iter()
                            .find(|(tag, _)| !covered.contains(&tag.as_str()))
                        {
                            return Err(Error::new(
                                ErrorKind::UnknownVariantTag,
                                format!("match does not cover tag '{}'", tag),
                            )
                            .at(&expr.loc));
                        }
                    }
                }
                Ok(())
            }
            ExprKind::Lambda { params, body } => {
                let func_ty = match expr.ty.unfold() {
                    Type::Function(f) => f,
                    other => {
                        return Err(self.mismatch(
                            expr,
                            format!("lambda typed as non-function {}", other),
                        ));
                    }
                };
                if params.len() != func_ty.params.len() {
                    return Err(self.mismatch(
                        expr,
                        format!(
                            "lambda declares {} parameter types but {} names",
                            func_ty.params.len(),
                            params.len()
                        ),
                    ));
                }
                // Lambdas are closed: check the body in a fresh scope
                // against the lambda's own type.
                let inner = Checker {
                    func: func_ty.as_ref(),
                };
                let mut inner_scopes = Scopes::new();
                for (name, ty) in params.iter().zip(func_ty.params.iter()) {
                    inner_scopes.bind(name.clone(), ty.clone());
                }
                inner.check(body, &mut inner_scopes, 0)?;
                if !body.ty.is_subtype(&func_ty.result) {
                    return Err(self.mismatch(
                        expr,
                        format!(
                            "lambda body has type {} but declares result {}",
                            body.ty, func_ty.result
                        ),
                    ));
                }
                Ok(())
            }
            ExprKind::Unary { op, operand } => {
                self.check(operand, scopes, loop_depth)?;
                match op {
                    UnaryOp::Not => {
                        self.expect(operand, &Type::Boolean)?;
                        self.expect(expr, &Type::Boolean)
                    }
                    UnaryOp::Neg => {
                        if !matches!(operand.ty, Type::Integer | Type::Float) {
                            return Err(self
                                .mismatch(expr, format!("cannot negate {}", operand.ty)));
                        }
                        if !operand.ty.compatible(&expr.ty) {
                            return Err(self.mismatch(
                                expr,
                                format!("negation of {} typed as {}", operand.ty, expr.ty),
                            ));
                        }
                        Ok(())
                    }
                }
            }
            ExprKind::Binary { op, lhs, rhs } => {
                self.check(lhs, scopes, loop_depth)?;
                self.check(rhs, scopes, loop_depth)?;
                match op {
                    BinaryOp::Add
                    | BinaryOp::Sub
                    | BinaryOp::Mul
                    | BinaryOp::Div
                    | BinaryOp::Mod => {
                        if !matches!(lhs.ty, Type::Integer | Type::Float) {
                            return Err(self.mismatch(
                                expr,
                                format!("arithmetic on non-numeric type {}", lhs.ty),
                            ));
                        }
                        if !lhs.ty.compatible(&rhs.ty) || !lhs.ty.compatible(&expr.ty) {
                            return Err(self.mismatch(
                                expr,
                                format!(
                                    "arithmetic operand types {} and {} under node type {}",
                                    lhs.ty, rhs.ty, expr.ty
                                ),
                            ));
                        }
                        Ok(())
                    }
                    BinaryOp::Eq
                    | BinaryOp::Ne
                    | BinaryOp::Lt
                    | BinaryOp::Le
                    | BinaryOp::Gt
                    | BinaryOp::Ge => {
                        if !lhs.ty.compatible(&rhs.ty) {
                            return Err(self.mismatch(
                                expr,
                                format!("comparison between {} and {}", lhs.ty, rhs.ty),
                            ));
                        }
                        self.expect(expr, &Type::Boolean)
                    }
                    BinaryOp::And | BinaryOp::Or => {
                        self.expect(lhs, &Type::Boolean)?;
                        self.expect(rhs, &Type::Boolean)?;
                        self.expect(expr, &Type::Boolean)
                    }
                }
            }
            ExprKind::StringOp { op, args } => {
                for arg in args {
                    self.check(arg, scopes, loop_depth)?;
                }
                let arg_tys: Vec<&Type> = args.iter().map(|a| &a.ty).collect();
                let ok = match op {
                    StringOp::Concat => {
                        arg_tys == [&Type::String, &Type::String] && expr.ty == Type::String
                    }
                    StringOp::Length => arg_tys == [&Type::String] && expr.ty == Type::Integer,
                    StringOp::Substring => {
                        arg_tys == [&Type::String, &Type::Integer, &Type::Integer]
                            && expr.ty == Type::String
                    }
                    StringOp::Contains => {
                        arg_tys == [&Type::String, &Type::String] && expr.ty == Type::Boolean
                    }
                };
                if !ok {
                    return Err(self.mismatch(
                        expr,
                        format!("malformed string operation {:?}", op),
                    ));
                }
                Ok(())
            }
            ExprKind::ContainerOp { op, args } => {
                for arg in args {
                    self.check(arg, scopes, loop_depth)?;
                }
                self.check_container_op(expr, *op, args)
            }
            ExprKind::NewRef(inner) => {
                self.check(inner, scopes, loop_depth)?;
                match expr.ty.unfold() {
                    Type::Ref(content) if content.compatible(&inner.ty) => Ok(()),
                    other => Err(self.mismatch(
                        expr,
                        format!("new_ref of {} typed as {}", inner.ty, other),
                    )),
                }
            }
            ExprKind::Deref(inner) => {
                self.check(inner, scopes, loop_depth)?;
                match inner.ty.unfold() {
                    Type::Ref(content) if content.compatible(&expr.ty) => Ok(()),
                    Type::Ref(content) => Err(self.mismatch(
                        expr,
                        format!("deref of Ref<{}> typed as {}", content, expr.ty),
                    )),
                    other => {
                        Err(self.mismatch(expr, format!("deref of non-ref type {}", other)))
                    }
                }
            }
        }
    }

    fn check_container_op(&self, expr: &Expr, op: ContainerOp, args: &[Expr]) -> Result<()> {
        let arity_error = || {
            self.mismatch(
                expr,
                format!("container operation {:?} has wrong arity", op),
            )
        };
        match op {
            ContainerOp::Index => {
                let [container, key] = args else {
                    return Err(arity_error());
                };
                match container.ty.unfold() {
                    Type::Array(item) => {
                        self.expect(key, &Type::Integer)?;
                        if !item.compatible(&expr.ty) {
                            return Err(self.mismatch(
                                expr,
                                format!("array of {} indexed as {}", item, expr.ty),
                            ));
                        }
                        Ok(())
                    }
                    Type::Dict(key_ty, value_ty) => {
                        if !key_ty.is_assignable(&key.ty) {
                            return Err(self.mismatch(
                                expr,
                                format!("dict key is {} not {}", key.ty, key_ty),
                            ));
                        }
                        if !value_ty.compatible(&expr.ty) {
                            return Err(self.mismatch(
                                expr,
                                format!("dict of {} indexed as {}", value_ty, expr.ty),
                            ));
                        }
                        Ok(())
                    }
                    other => {
                        Err(self.mismatch(expr, format!("cannot index type {}", other)))
                    }
                }
            }
            ContainerOp::Size => {
                let [container] = args else {
                    return Err(arity_error());
                };
                match container.ty.unfold() {
                    Type::Array(_) | Type::Set(_) | Type::Dict(_, _) => {
                        self.expect(expr, &Type::Integer)
                    }
                    other => {
                        Err(self.mismatch(expr, format!("size of non-container {}", other)))
                    }
                }
            }
            ContainerOp::Contains => {
                let [container, key] = args else {
                    return Err(arity_error());
                };
                let key_ty = match container.ty.unfold() {
                    Type::Set(k) => k,
                    Type::Dict(k, _) => k,
                    other => {
                        return Err(self.mismatch(
                            expr,
                            format!("membership test on non-keyed container {}", other),
                        ));
                    }
                };
                if !key_ty.is_assignable(&key.ty) {
                    return Err(
                        self.mismatch(expr, format!("key is {} not {}", key.ty, key_ty))
                    );
                }
                self.expect(expr, &Type::Boolean)
            }
            ContainerOp::Push => {
                let [target, item] = args else {
                    return Err(arity_error());
                };
                match target.ty.unfold() {
                    Type::Ref(content) => match content.unfold() {
                        Type::Array(elem) if elem.is_assignable(&item.ty) => {
                            self.expect_null(expr)
                        }
                        other => Err(self.mismatch(
                            expr,
                            format!("push of {} into Ref<{}>", item.ty, other),
                        )),
                    },
                    other => Err(self.mismatch(
                        expr,
                        format!("push target must be Ref<Array>, found {}", other),
                    )),
                }
            }
            ContainerOp::Insert => {
                let (target, rest) = args.split_first().ok_or_else(arity_error)?;
                let content = match target.ty.unfold() {
                    Type::Ref(content) => content.unfold(),
                    other => {
                        return Err(self.mismatch(
                            expr,
                            format!("insert target must be a Ref, found {}", other),
                        ));
                    }
                };
                match (content, rest) {
                    (Type::Set(key_ty), [key]) if key_ty.is_assignable(&key.ty) => {
                        self.expect_null(expr)
                    }
                    (Type::Dict(key_ty, value_ty), [key, value])
                        if key_ty.is_assignable(&key.ty)
                            && value_ty.is_assignable(&value.ty) =>
                    {
                        self.expect_null(expr)
                    }
                    (content, _) => Err(self.mismatch(
                        expr,
                        format!("malformed insert into Ref<{}>", content),
                    )),
                }
            }
            ContainerOp::Remove => {
                let [target, key] = args else {
                    return Err(arity_error());
                };
                let content = match target.ty.unfold() {
                    Type::Ref(content) => content.unfold(),
                    other => {
                        return Err(self.mismatch(
                            expr,
                            format!("remove target must be a Ref, found {}", other),
                        ));
                    }
                };
                let key_ty = match content {
                    Type::Set(k) => k,
                    Type::Dict(k, _) => k,
                    other => {
                        return Err(self.mismatch(
                            expr,
                            format!("remove from non-keyed container {}", other),
                        ));
                    }
                };
                if !key_ty.is_assignable(&key.ty) {
                    return Err(
                        self.mismatch(expr, format!("key is {} not {}", key.ty, key_ty))
                    );
                }
                self.expect(expr, &Type::Boolean)
            }
            ContainerOp::Keys => {
                let [dict] = args else {
                    return Err(arity_error());
                };
                match dict.ty.unfold() {
                    Type::Dict(key_ty, _) => {
                        if !Type::Array(key_ty).compatible(&expr.ty) {
                            return Err(self.mismatch(
                                expr,
                                format!("keys node typed {} for dict {}", expr.ty, dict.ty),
                            ));
                        }
                        Ok(())
                    }
                    other => {
                        Err(self.mismatch(expr, format!("keys of non-dict type {}", other)))
                    }
                }
            }
        }
    }

    fn check_args(
        &self,
        expr: &Expr,
        params: &[Type],
        args: &[Expr],
        scopes: &mut Scopes,
        loop_depth: u32,
    ) -> Result<()> {
        if params.len() != args.len() {
            return Err(self.mismatch(
                expr,
                format!("expected {} arguments, got {}", params.len(), args.len()),
            ));
        }
        for (param, arg) in params.iter().zip(args.iter()) {
            self.check(arg, scopes, loop_depth)?;
            if !param.is_assignable(&arg.ty) {
                return Err(self.mismatch(
                    expr,
                    format!("argument of type {} where {} is expected", arg.ty, param),
                ));
            }
        }
        Ok(())
    }

    fn expect(&self, expr: &Expr, ty: &Type) -> Result<()> {
        if expr.ty.compatible(ty) {
            Ok(())
        } else {
            Err(self.mismatch(expr, format!("expected {}, found {}", ty, expr.ty)))
        }
    }

    fn expect_null(&self, expr: &Expr) -> Result<()> {
        self.expect(expr, &Type::Null)
    }

    fn expect_never(&self, expr: &Expr) -> Result<()> {
        self.expect(expr, &Type::Never)
    }

    fn mismatch(&self, expr: &Expr, message: String) -> Error {
        Error::new(ErrorKind::TypeMismatch, message).at(&expr.loc)
    }
}
