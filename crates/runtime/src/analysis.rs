//! IR analysis: free variables and platform dependencies
//!
//! `free_vars` reports variables not bound by a parameter, `let`, `for`
//! binding or `match` arm binding — a function body must have none.
//! `platform_refs` collects the platform functions a body calls, in
//! first-occurrence order, including calls inside nested lambdas; the
//! collected expectations are what compilation resolves against the
//! table.

use east_core::ir::{Expr, ExprKind, PlatformRef};
use east_core::{Error, ErrorKind, Result};
use std::collections::BTreeSet;

/// Variables read by `expr` that no enclosing construct binds.
pub fn free_vars(expr: &Expr) -> BTreeSet<String> {
    let mut free = BTreeSet::new();
    let mut bound: Vec<String> = Vec::new();
    collect_free(expr, &mut bound, &mut free);
    free
}

fn collect_free(expr: &Expr, bound: &mut Vec<String>, free: &mut BTreeSet<String>) {
    match &expr.kind {
        ExprKind::Var(name) => {
            if !bound.iter().any(|b| b == name) {
                free.insert(name.clone());
            }
        }
        ExprKind::Let { name, value } => {
            collect_free(value, bound, free);
            // The binding lives until the enclosing block ends; Block
            // below truncates.
            bound.push(name.clone());
        }
        ExprKind::Block(children) => {
            let depth = bound.len();
            for child in children {
                collect_free(child, bound, free);
            }
            bound.truncate(depth);
        }
        ExprKind::For {
            binding,
            iterable,
            body,
        } => {
            collect_free(iterable, bound, free);
            let depth = bound.len();
            bound.push(binding.clone());
            collect_free(body, bound, free);
            bound.truncate(depth);
        }
        ExprKind::Match {
            scrutinee,
            arms,
            default,
        } => {
            collect_free(scrutinee, bound, free);
            for arm in arms {
                let depth = bound.len();
                if let Some(binding) = &arm.binding {
                    bound.push(binding.clone());
                }
                collect_free(&arm.body, bound, free);
                bound.truncate(depth);
            }
            if let Some(default) = default {
                collect_free(default, bound, free);
            }
        }
        ExprKind::Lambda { params, body } => {
            // Lambdas are closed: only their own parameters are visible.
            let mut inner: Vec<String> = params.clone();
            collect_free(body, &mut inner, free);
        }
        other => {
            walk_children(other, &mut |child| collect_free(child, bound, free));
        }
    }
}

/// Platform-function expectations of a body, ordered by first occurrence
/// and deduplicated by name. Two calls to the same name with different
/// argument or result types are a conflict the table could never satisfy,
/// so they are reported here.
pub fn platform_refs(expr: &Expr) -> Result<Vec<PlatformRef>> {
    let mut refs: Vec<PlatformRef> = Vec::new();
    collect_platform(expr, &mut refs)?;
    Ok(refs)
}

fn collect_platform(expr: &Expr, refs: &mut Vec<PlatformRef>) -> Result<()> {
    if let ExprKind::PlatformCall { name, args } = &expr.kind {
        let expected = PlatformRef {
            name: name.clone(),
            params: args.iter().map(|a| a.ty.clone()).collect(),
            result: expr.ty.clone(),
        };
        match refs.iter().find(|r| r.name == *name) {
            None => refs.push(expected),
            Some(existing) if *existing == expected => {}
            Some(_) => {
                return Err(Error::new(
                    ErrorKind::PlatformSignatureMismatch,
                    format!(
                        "platform function '{}' is called with conflicting signatures",
                        name
                    ),
                )
                .at(&expr.loc));
            }
        }
    }
    let mut result = Ok(());
    walk_children(&expr.kind, &mut |child| {
        if result.is_ok() {
            result = collect_platform(child, refs);
        }
    });
    result
}

/// Apply `f` to each direct child expression of a node kind.
pub(crate) fn walk_children(kind: &ExprKind, f: &mut impl FnMut(&Expr)) {
    match kind {
        ExprKind::Literal(_)
        | ExprKind::Var(_)
        | ExprKind::Break
        | ExprKind::Continue => {}
        ExprKind::Let { value, .. } => f(value),
        ExprKind::Assign { target, value } => {
            f(target);
            f(value);
        }
        ExprKind::Block(children) => children.iter().for_each(f),
        ExprKind::If {
            cond,
            then_branch,
            else_branch,
        } => {
            f(cond);
            f(then_branch);
            if let Some(e) = else_branch {
                f(e);
            }
        }
        ExprKind::For {
            iterable, body, ..
        } => {
            f(iterable);
            f(body);
        }
        ExprKind::Loop { body } => f(body),
        ExprKind::Return(value) => f(value),
        ExprKind::Call { callee, args } => {
            f(callee);
            args.iter().for_each(f);
        }
        ExprKind::PlatformCall { args, .. } => args.iter().for_each(f),
        ExprKind::Field { target, .. } => f(target),
        ExprKind::Construct { fields } => fields.iter().for_each(|(_, e)| f(e)),
        ExprKind::VariantConstruct { payload, .. } => f(payload),
        ExprKind::Match {
            scrutinee,
            arms,
            default,
        } => {
            f(scrutinee);
            arms.iter().for_each(|arm| f(&arm.body));
            if let Some(d) = default {
                f(d);
            }
        }
        ExprKind::Lambda { body, .. } => f(body),
        ExprKind::Unary { operand, .. } => f(operand),
        ExprKind::Binary { lhs, rhs, .. } => {
            f(lhs);
            f(rhs);
        }
        ExprKind::StringOp { args, .. } | ExprKind::ContainerOp { args, .. } => {
            args.iter().for_each(f)
        }
        ExprKind::NewRef(inner) | ExprKind::Deref(inner) => f(inner),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build;
    use east_core::types::Type;

    #[test]
    fn test_let_binds_rest_of_block() {
        // { let x = 1; x + y }
        let body = build::block(vec![
            build::let_("x", build::integer(1)),
            build::add(
                build::var("x", Type::Integer),
                build::var("y", Type::Integer),
            ),
        ]);
        let free = free_vars(&body);
        assert!(!free.contains("x"));
        assert!(free.contains("y"));
    }

    #[test]
    fn test_for_binding_scoped_to_body() {
        let body = build::for_(
            "item",
            build::var("xs", Type::array(Type::Integer)),
            build::var("item", Type::Integer),
        );
        let free = free_vars(&body);
        assert_eq!(free.into_iter().collect::<Vec<_>>(), vec!["xs".to_string()]);
    }

    #[test]
    fn test_lambda_does_not_capture() {
        // A lambda body referring to an outer name leaves it free.
        let lambda = build::lambda(
            Type::function(vec![Type::Integer], Type::Integer),
            vec!["x"],
            build::add(
                build::var("x", Type::Integer),
                build::var("outer", Type::Integer),
            ),
        );
        let free = free_vars(&lambda);
        assert!(free.contains("outer"));
        assert!(!free.contains("x"));
    }

    #[test]
    fn test_platform_refs_first_occurrence_order() {
        let body = build::block(vec![
            build::platform_call("trace", vec![build::string_lit("hi")], Type::Null),
            build::platform_call(
                "double",
                vec![build::integer(2)],
                Type::Integer,
            ),
            build::platform_call("trace", vec![build::string_lit("bye")], Type::Null),
        ]);
        let refs = platform_refs(&body).unwrap();
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].name, "trace");
        assert_eq!(refs[1].name, "double");
    }

    #[test]
    fn test_conflicting_platform_expectations_rejected() {
        let body = build::block(vec![
            build::platform_call("f", vec![build::integer(1)], Type::Integer),
            build::platform_call("f", vec![build::string_lit("x")], Type::Integer),
        ]);
        let err = platform_refs(&body).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PlatformSignatureMismatch);
    }
}
