//! Metadata-driven projection core for Windows Runtime interop: canonical
//! signature encoding, deterministic IID derivation for generic interface
//! instantiations, marshalling strategy selection, and the delegate
//! trampoline/proxy machinery the generated bindings run on.

pub mod error;
pub mod guid;
pub mod marshal;
pub mod project;
pub mod runtime;
pub mod signature;
pub mod types;

pub use error::{ProjectionError, RuntimeError};
pub use guid::{derive_iid, Guid};
pub use signature::encode;
