//! The East intermediate representation
//!
//! An IR tree is itself an East value (its type is the recursive `IR`
//! variant), which is how compiled functions travel through the codecs.
//! Each node carries its kind, its inferred result type and a source
//! location. The runtime crate owns checking and evaluation; this module
//! is only the data model.
//!
//! Iteration shapes for `for`: an `Array<T>` yields its items in order, a
//! `Set<K>` yields members in ascending order, and a `Dict<K, V>` yields
//! `Struct{key: K, value: V}` entries in ascending key order.

use crate::location::SourceLocation;
use crate::types::{FunctionType, Type};
use crate::value::Value;
use std::sync::Arc;

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UnaryOp {
    /// Boolean negation.
    Not,
    /// Arithmetic negation (Integer or Float).
    Neg,
}

/// Binary operators. `Add`..`Mod` are arithmetic on Integer or Float;
/// comparisons use the total order of the operand type; `And`/`Or`
/// short-circuit on Booleans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

/// String operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StringOp {
    /// Concatenate two strings.
    Concat,
    /// Length in Unicode scalars, as Integer.
    Length,
    /// `substring(s, start, end)` in Unicode scalars; out-of-range
    /// indices clamp.
    Substring,
    /// `contains(haystack, needle)`.
    Contains,
}

/// Container operators. Mutating operators (`Push`, `Insert`, `Remove`)
/// take a `Ref` to the container as their first argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ContainerOp {
    /// `index(array, i)` or `index(dict, key)`. Out-of-range or absent
    /// keys are an error.
    Index,
    /// Element count of an Array, Set or Dict, as Integer.
    Size,
    /// Membership: `contains(set, k)` or `contains(dict, k)`.
    Contains,
    /// `push(ref_array, item)` appends.
    Push,
    /// `insert(ref_dict, key, value)` or `insert(ref_set, key)`.
    Insert,
    /// `remove(ref_dict, key)` or `remove(ref_set, key)`; absent keys are
    /// a no-op returning false.
    Remove,
    /// Keys of a Dict in ascending order, as an Array.
    Keys,
}

/// One arm of a `match` expression: a variant tag, an optional binding
/// for the payload, and the arm body.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct MatchArm {
    pub tag: String,
    pub binding: Option<String>,
    pub body: Expr,
}

/// A free platform-function reference: the name and the signature the IR
/// expects of it. The sync/async flavor is declared on the table side.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct PlatformRef {
    pub name: String,
    pub params: Vec<Type>,
    pub result: Type,
}

/// A function value: the declared type, parameter names, the body IR and
/// the ordered list of platform functions the body calls. This is what
/// the codecs move between hosts; binding it to a platform table yields a
/// callable.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct FunctionValue {
    pub ty: Arc<FunctionType>,
    /// Parameter names, one per entry of `ty.params`.
    pub params: Vec<String>,
    pub body: Expr,
    /// Ordered by first occurrence in the body, deduplicated by name.
    pub platform_refs: Vec<PlatformRef>,
}

/// An IR node: kind, inferred result type, source location.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: Type,
    pub loc: SourceLocation,
}

impl Expr {
    pub fn new(kind: ExprKind, ty: Type, loc: SourceLocation) -> Self {
        Expr { kind, ty, loc }
    }

    /// Node kind name, as spelled in the JSON schema and in errors.
    pub fn kind_name(&self) -> &'static str {
        self.kind.name()
    }
}

/// The node kinds of the IR.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum ExprKind {
    /// A constant of the node's type.
    Literal(Value),
    /// A bound variable (parameter, `let`, `for` binding or `match` arm
    /// binding).
    Var(String),
    /// Introduce a binding for the remainder of the enclosing block.
    /// Evaluates to null.
    Let { name: String, value: Box<Expr> },
    /// Replace the inhabitant of a Ref cell. Evaluates to null.
    Assign { target: Box<Expr>, value: Box<Expr> },
    /// Sequence; evaluates to the last expression, or null when empty.
    Block(Vec<Expr>),
    If {
        cond: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Option<Box<Expr>>,
    },
    /// Iterate a container in its defined order. Evaluates to null.
    For {
        binding: String,
        iterable: Box<Expr>,
        body: Box<Expr>,
    },
    /// Loop until `break`. Evaluates to null.
    Loop { body: Box<Expr> },
    Break,
    Continue,
    /// Early return from the enclosing function.
    Return(Box<Expr>),
    /// Call a first-class function value.
    Call { callee: Box<Expr>, args: Vec<Expr> },
    /// Call a host-provided extern by name.
    PlatformCall { name: String, args: Vec<Expr> },
    /// Project a struct field.
    Field { target: Box<Expr>, name: String },
    /// Construct a struct; fields in declared order.
    Construct { fields: Vec<(String, Expr)> },
    /// Construct a variant with one tag.
    VariantConstruct { tag: String, payload: Box<Expr> },
    /// Dispatch on a variant's tag. `default` is the `_` wildcard arm;
    /// together the arms must cover every tag of the scrutinee type.
    Match {
        scrutinee: Box<Expr>,
        arms: Vec<MatchArm>,
        default: Option<Box<Expr>>,
    },
    /// A function literal. The node type is the function type; captured
    /// outer bindings are not permitted (parameters only), so a lambda is
    /// closed except for platform references.
    Lambda {
        params: Vec<String>,
        body: Box<Expr>,
    },
    Unary { op: UnaryOp, operand: Box<Expr> },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    StringOp { op: StringOp, args: Vec<Expr> },
    ContainerOp { op: ContainerOp, args: Vec<Expr> },
    /// Allocate a fresh Ref cell holding the operand.
    NewRef(Box<Expr>),
    /// Read a Ref cell's inhabitant.
    Deref(Box<Expr>),
}

impl ExprKind {
    pub fn name(&self) -> &'static str {
        match self {
            ExprKind::Literal(_) => "literal",
            ExprKind::Var(_) => "var",
            ExprKind::Let { .. } => "let",
            ExprKind::Assign { .. } => "assign",
            ExprKind::Block(_) => "block",
            ExprKind::If { .. } => "if",
            ExprKind::For { .. } => "for",
            ExprKind::Loop { .. } => "loop",
            ExprKind::Break => "break",
            ExprKind::Continue => "continue",
            ExprKind::Return(_) => "return",
            ExprKind::Call { .. } => "call",
            ExprKind::PlatformCall { .. } => "platform_call",
            ExprKind::Field { .. } => "field",
            ExprKind::Construct { .. } => "construct",
            ExprKind::VariantConstruct { .. } => "variant_construct",
            ExprKind::Match { .. } => "match",
            ExprKind::Lambda { .. } => "lambda",
            ExprKind::Unary { .. } => "unary",
            ExprKind::Binary { .. } => "binary",
            ExprKind::StringOp { .. } => "string_op",
            ExprKind::ContainerOp { .. } => "container_op",
            ExprKind::NewRef(_) => "new_ref",
            ExprKind::Deref(_) => "deref",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_are_stable() {
        let lit = Expr::new(
            ExprKind::Literal(Value::Null),
            Type::Null,
            SourceLocation::unknown(),
        );
        assert_eq!(lit.kind_name(), "literal");
        let pc = Expr::new(
            ExprKind::PlatformCall {
                name: "double".to_string(),
                args: vec![],
            },
            Type::Integer,
            SourceLocation::unknown(),
        );
        assert_eq!(pc.kind_name(), "platform_call");
    }
}
