//! East runtime: IR checking, compilation and evaluation
//!
//! Takes an IR function value plus a platform table and yields a
//! callable. Compilation type-checks the body, resolves every platform
//! reference against the table, and rejects bodies that could never run
//! (unbound variables, uncovered match tags, async platform calls in
//! sync positions). Evaluation is a tree-walking interpreter; async
//! functions evaluate through a suspendable twin of the same walk.
//!
//! The `build` module offers ergonomic IR constructors for hosts and
//! tests; the portable contract is the IR shape, not the builders.

pub use east_core::ir;

pub mod analysis;
pub mod build;
pub mod eval;
mod eval_async;
pub mod platform;
pub mod typecheck;

pub use analysis::{free_vars, platform_refs};
pub use eval::{compile, validate_function, CompiledFunction};
pub use platform::{
    AsyncHostFn, HostFuture, HostResult, PlatformFunction, PlatformSignature, PlatformTable,
    SyncHostFn,
};
pub use typecheck::check_function;
