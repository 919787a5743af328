use crate::{guid::Guid, marshal::TypeCategory, runtime::HResult, types::TypeReference};
use thiserror::Error;

/// Failures raised while deriving identities or projecting types.
///
/// These propagate uncaught through the generation call stack; the driver
/// decides whether to abort the run or skip the offending type. A type's
/// projection is atomic: it either fully succeeds or produces no output.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ProjectionError {
    #[error("unresolved type reference {namespace}.{name}")]
    UnresolvedType { namespace: String, name: String },

    #[error("type {type_name} matches no signature production: {reason}")]
    InvalidType { type_name: String, reason: String },

    #[error("no marshaller strategy registered for category {0:?}")]
    UnsupportedMarshal(TypeCategory),

    #[error("malformed guid literal {0:?}")]
    MalformedGuid(String),
}

impl ProjectionError {
    pub(crate) fn unresolved(ty: &TypeReference) -> Self {
        ProjectionError::UnresolvedType {
            namespace: ty.namespace.clone(),
            name: ty.name.clone(),
        }
    }

    pub(crate) fn invalid_type(ty: &TypeReference, reason: impl Into<String>) -> Self {
        ProjectionError::InvalidType {
            type_name: format!("{}.{}", ty.namespace, ty.name),
            reason: reason.into(),
        }
    }
}

/// Failures raised by the generated-code support layer at run time.
///
/// Kept distinct from [`ProjectionError`]: a nonzero HRESULT from a native
/// call surfaces as [`RuntimeError::Hresult`], while generation-time
/// problems never reach this taxonomy.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("native call failed with {0}")]
    Hresult(HResult),

    #[error("interface {iid} not present in the object's capability table")]
    CapabilityNotPresent { iid: Guid },

    #[error("null interface pointer")]
    NullInterface,

    #[error("expected {expected} arguments, got {actual}")]
    ArityMismatch { expected: usize, actual: usize },

    #[error("value does not match the native representation for its category: {0}")]
    TypeMismatch(&'static str),

    #[error("managed callback produced no return value")]
    MissingReturnValue,

    #[error("native library error: {0}")]
    Library(#[from] libloading::Error),
}
