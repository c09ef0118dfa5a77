//! Platform functions: host-provided externs callable from IR
//!
//! A platform function is declared by name, parameter types, result type
//! and sync/async flavor. The implementation is a host callable taking
//! East values and returning the declared result (or a future of it).
//! At compile time the runtime validates the IR's expectations against
//! the declarations; a missing or mismatched entry fails compilation.

use east_core::ir::PlatformRef;
use east_core::types::{FunctionFlavor, Type};
use east_core::value::Value;
use east_core::{Error, ErrorKind, Result};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// What a host implementation returns: the declared result value, or a
/// host-level error that East wraps as `PlatformFailure`.
pub type HostResult = std::result::Result<Value, Box<dyn std::error::Error + Send + Sync>>;

/// A boxed future of a host result, for async platform functions.
pub type HostFuture = Pin<Box<dyn Future<Output = HostResult> + Send>>;

pub type SyncHostFn = Arc<dyn Fn(Vec<Value>) -> HostResult + Send + Sync>;
pub type AsyncHostFn = Arc<dyn Fn(Vec<Value>) -> HostFuture + Send + Sync>;

/// A declared platform-function signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformSignature {
    pub name: String,
    pub params: Vec<Type>,
    pub result: Type,
    pub flavor: FunctionFlavor,
}

impl fmt::Display for PlatformSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.flavor == FunctionFlavor::Async {
            write!(f, "async ")?;
        }
        write!(f, "{}(", self.name)?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", p)?;
        }
        write!(f, ") -> {}", self.result)
    }
}

enum HostImpl {
    Sync(SyncHostFn),
    Async(AsyncHostFn),
}

/// A declared signature together with its host implementation.
pub struct PlatformFunction {
    signature: PlatformSignature,
    host: HostImpl,
}

impl PlatformFunction {
    pub fn signature(&self) -> &PlatformSignature {
        &self.signature
    }

    /// Invoke a sync entry. Async entries cannot be driven from here.
    pub fn call_sync(&self, args: Vec<Value>) -> Result<Value> {
        match &self.host {
            HostImpl::Sync(f) => f(args).map_err(|cause| {
                Error::with_cause(
                    ErrorKind::PlatformFailure,
                    format!("platform function '{}' failed", self.signature.name),
                    cause,
                )
            }),
            HostImpl::Async(_) => Err(Error::new(
                ErrorKind::PlatformSignatureMismatch,
                format!(
                    "platform function '{}' is async and cannot be called synchronously",
                    self.signature.name
                ),
            )),
        }
    }

    /// Invoke an entry of either flavor, awaiting async ones.
    pub async fn call(&self, args: Vec<Value>) -> Result<Value> {
        let outcome = match &self.host {
            HostImpl::Sync(f) => f(args),
            HostImpl::Async(f) => f(args).await,
        };
        outcome.map_err(|cause| {
            Error::with_cause(
                ErrorKind::PlatformFailure,
                format!("platform function '{}' failed", self.signature.name),
                cause,
            )
        })
    }
}

impl fmt::Debug for PlatformFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlatformFunction")
            .field("signature", &self.signature)
            .finish_non_exhaustive()
    }
}

/// The mapping from platform-function name to declaration and host
/// implementation, supplied at compile/decode time.
#[derive(Debug, Default)]
pub struct PlatformTable {
    entries: HashMap<String, PlatformFunction>,
}

impl PlatformTable {
    pub fn new() -> Self {
        PlatformTable {
            entries: HashMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Declare and register a synchronous platform function. A previous
    /// entry under the same name is replaced.
    pub fn register_sync(
        &mut self,
        name: impl Into<String>,
        params: Vec<Type>,
        result: Type,
        host: impl Fn(Vec<Value>) -> HostResult + Send + Sync + 'static,
    ) -> &mut Self {
        let name = name.into();
        self.entries.insert(
            name.clone(),
            PlatformFunction {
                signature: PlatformSignature {
                    name,
                    params,
                    result,
                    flavor: FunctionFlavor::Sync,
                },
                host: HostImpl::Sync(Arc::new(host)),
            },
        );
        self
    }

    /// Declare and register an asynchronous platform function.
    pub fn register_async(
        &mut self,
        name: impl Into<String>,
        params: Vec<Type>,
        result: Type,
        host: impl Fn(Vec<Value>) -> HostFuture + Send + Sync + 'static,
    ) -> &mut Self {
        let name = name.into();
        self.entries.insert(
            name.clone(),
            PlatformFunction {
                signature: PlatformSignature {
                    name,
                    params,
                    result,
                    flavor: FunctionFlavor::Async,
                },
                host: HostImpl::Async(Arc::new(host)),
            },
        );
        self
    }

    pub fn get(&self, name: &str) -> Option<&PlatformFunction> {
        self.entries.get(name)
    }

    /// Match an IR expectation against the table: the entry must exist
    /// and its declared parameter and result types must equal the IR's.
    pub fn resolve(&self, expected: &PlatformRef) -> Result<&PlatformFunction> {
        let entry = self.entries.get(&expected.name).ok_or_else(|| {
            Error::new(
                ErrorKind::MissingPlatform,
                format!("platform function '{}' is not provided", expected.name),
            )
        })?;
        let sig = &entry.signature;
        if sig.params != expected.params || sig.result != expected.result {
            return Err(Error::new(
                ErrorKind::PlatformSignatureMismatch,
                format!(
                    "platform function '{}' is declared as {} but the IR expects ({}) -> {}",
                    expected.name,
                    sig,
                    expected
                        .params
                        .iter()
                        .map(|t| t.to_string())
                        .collect::<Vec<_>>()
                        .join(", "),
                    expected.result
                ),
            ));
        }
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn double_table() -> PlatformTable {
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
        table
    }

    #[test]
    fn test_resolve_and_call_sync() {
        let table = double_table();
        let expected = PlatformRef {
            name: "double".to_string(),
            params: vec![Type::Integer],
            result: Type::Integer,
        };
        let entry = table.resolve(&expected).unwrap();
        let out = entry.call_sync(vec![Value::integer(21)]).unwrap();
        assert_eq!(out, Value::integer(42));
    }

    #[test]
    fn test_resolve_missing_names_the_function() {
        let table = PlatformTable::new();
        let expected = PlatformRef {
            name: "double".to_string(),
            params: vec![Type::Integer],
            result: Type::Integer,
        };
        let err = table.resolve(&expected).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingPlatform);
        assert!(format!("{}", err).contains("double"));
    }

    #[test]
    fn test_resolve_signature_mismatch() {
        let table = double_table();
        let expected = PlatformRef {
            name: "double".to_string(),
            params: vec![Type::Float],
            result: Type::Float,
        };
        let err = table.resolve(&expected).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PlatformSignatureMismatch);
    }

    #[test]
    fn test_host_error_becomes_platform_failure() {
        let table = double_table();
        let entry = table.get("double").unwrap();
        let err = entry.call_sync(vec![Value::Null]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PlatformFailure);
        assert!(std::error::Error::source(&err).is_some());
    }
}
