//! East core: type algebra and value model
//!
//! The foundation the rest of East is built on: the closed type algebra
//! with structural identity, the canonical in-memory value shapes with
//! their total order, default values, the datetime-format token model and
//! its validator, and the kinded error type every East operation returns.
//!
//! The IR data model also lives here — an IR tree is itself an East
//! value, so the value model and the IR are one crate. Checking and
//! evaluating IR belongs to `east-runtime`; encoding values and IR
//! belongs to `east-codec`.

pub mod compare;
pub mod datetime_format;
pub mod default;
pub mod error;
pub mod ir;
pub mod location;
pub mod types;
pub mod value;

pub use compare::{float_cmp, total_cmp};
pub use datetime_format::{validate_format, DateCategory, DateTimeFormatToken};
pub use default::default_of;
pub use error::{Error, ErrorKind, Result};
pub use ir::{
    BinaryOp, ContainerOp, Expr, ExprKind, FunctionValue, MatchArm, PlatformRef, StringOp,
    UnaryOp,
};
pub use location::SourceLocation;
pub use types::{FunctionFlavor, FunctionType, StructType, Type, VariantType};
pub use value::{RefValue, StructValue, Value, VariantValue};
