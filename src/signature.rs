//! Canonical ABI signature encoding.
//!
//! `encode` is a pure function over the type reference model and the entity
//! model. The grammar is closed: nine mutually exclusive productions, tested
//! in priority order, with a hard error for anything else. Adding a new WinRT
//! primitive or shape means extending this function, never a silent default.

use crate::error::ProjectionError;
use crate::types::entities::{Entity, TypeLibrary};
use crate::types::TypeReference;
use tracing::trace;

/// Encodes a closed, well-formed type reference into its canonical signature
/// string.
pub fn encode(ty: &TypeReference, library: &TypeLibrary) -> Result<String, ProjectionError> {
    let tr = ty.normalize();

    if tr.is_system_type("Object") {
        return Ok("cinterface(IInspectable)".to_string());
    }
    if tr.is_system_type("String") {
        return Ok("string".to_string());
    }
    if let Some(code) = primitive_code(&tr) {
        return Ok(code.to_string());
    }
    if tr.is_open() {
        return Err(ProjectionError::invalid_type(
            &tr,
            "open generic reached the signature encoder",
        ));
    }

    let signature = match (library.lookup(&tr)?, &tr.generic_args) {
        (Entity::Enum(decl), _) => {
            let underlying = if decl.is_flags { "u4" } else { "i4" };
            format!("enum({}.{};{})", tr.namespace, tr.name, underlying)
        }
        (Entity::Struct(decl), _) => {
            let mut fields: Vec<_> = decl.fields.iter().collect();
            fields.sort_by_key(|f| f.index);
            let fields = fields
                .iter()
                .map(|f| encode(&f.ty, library))
                .collect::<Result<Vec<_>, _>>()?
                .join(";");
            format!("struct({}.{};{})", tr.namespace, tr.name, fields)
        }
        (Entity::Interface(decl), Some(args)) => {
            let base = decl.declared_iid.ok_or_else(|| {
                ProjectionError::invalid_type(&tr, "generic interface declaration without a guid")
            })?;
            format!(
                "pinterface({};{})",
                base.to_signature_string(),
                encode_arguments(&tr, args, library)?
            )
        }
        (Entity::Delegate(decl), Some(args)) => {
            // parameterized delegates share the pinterface production
            format!(
                "pinterface({};{})",
                decl.guid.to_signature_string(),
                encode_arguments(&tr, args, library)?
            )
        }
        (Entity::Delegate(decl), None) => {
            format!("delegate({})", decl.guid.to_signature_string())
        }
        (Entity::Interface(decl), None) => decl
            .declared_iid
            .ok_or_else(|| {
                ProjectionError::invalid_type(&tr, "non-generic interface without a declared iid")
            })?
            .to_signature_string(),
        (Entity::Class(decl), _) => {
            format!(
                "rc({}.{};{})",
                tr.namespace,
                tr.name,
                encode(&decl.default_interface, library)?
            )
        }
    };

    trace!(ty = ?tr, signature, "encoded signature");
    Ok(signature)
}

fn encode_arguments(
    tr: &TypeReference,
    args: &[crate::types::GenericArg],
    library: &TypeLibrary,
) -> Result<String, ProjectionError> {
    let encoded = args
        .iter()
        .map(|arg| {
            let resolved = arg.resolved.as_ref().ok_or_else(|| {
                ProjectionError::invalid_type(tr, "unresolved generic argument in instantiation")
            })?;
            encode(resolved, library)
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(encoded.join(";"))
}

/// The exhaustive primitive table. Exactly these thirteen codes; the encoder
/// must never grow an implicit entry.
fn primitive_code(ty: &TypeReference) -> Option<&'static str> {
    if ty.namespace != "System" {
        return None;
    }
    Some(match ty.name.as_str() {
        "Boolean" => "b1",
        "Byte" => "u1",
        "Char" => "c2",
        "Double" => "f8",
        "Guid" => "g16",
        "Int16" => "i2",
        "Int32" => "i4",
        "Int64" => "i8",
        "SByte" => "i1",
        "Single" => "f4",
        "UInt16" => "u2",
        "UInt32" => "u4",
        "UInt64" => "u8",
        _ => return None,
    })
}
