//! The delegate/ABI projector.
//!
//! A single stateless pass over the entity graph: resolve the type's
//! identity (declared or derived), classify every parameter, and describe
//! the native-callable trampoline and the proxy invocation path. A type is
//! either fully projected or the pass fails; there is no partial output.

use crate::error::ProjectionError;
use crate::guid::{derive_iid, Guid};
use crate::marshal::{Marshal, MarshallerRegistry, TypeCategory};
use crate::runtime::AbiType;
use crate::signature::encode;
use crate::types::entities::{Entity, ParamDecl, TypeLibrary};
use crate::types::TypeReference;
use std::collections::HashSet;
use tracing::debug;

/// The resolved identity of an interface or delegate type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeIdentity {
    pub iid: Guid,
    /// The canonical signature, present only when the identity was derived.
    pub signature: Option<String>,
    pub derived: bool,
}

/// Resolves identity the way callers consume it: the metadata-declared GUID
/// for non-generic interfaces and delegates, a signature-derived one for
/// closed generic instantiations.
pub fn resolve_type_identity(
    ty: &TypeReference,
    library: &TypeLibrary,
) -> Result<TypeIdentity, ProjectionError> {
    let tr = ty.normalize();
    let (declared, generic) = match library.lookup(&tr)? {
        Entity::Interface(decl) => (decl.declared_iid, decl.is_generic()),
        Entity::Delegate(decl) => (Some(decl.guid), decl.is_generic()),
        other => {
            return Err(ProjectionError::invalid_type(
                &tr,
                format!("identity resolution does not apply to a {}", other.kind()),
            ))
        }
    };

    if generic {
        if !tr.is_closed() {
            return Err(ProjectionError::invalid_type(
                &tr,
                "open generic has no instantiation identity",
            ));
        }
        let signature = encode(&tr, library)?;
        Ok(TypeIdentity {
            iid: derive_iid(&signature),
            signature: Some(signature),
            derived: true,
        })
    } else {
        let iid = declared.ok_or_else(|| {
            ProjectionError::invalid_type(&tr, "non-generic interface without a declared iid")
        })?;
        Ok(TypeIdentity {
            iid,
            signature: None,
            derived: false,
        })
    }
}

/// Maps a parameter type onto the scalar shape it occupies at the boundary.
///
/// By-value aggregates (structs, guids) are not representable in the
/// dynamic call path and are rejected here; arrays cross as a pointer to
/// their data.
pub fn abi_type_of(ty: &TypeReference, library: &TypeLibrary) -> Result<AbiType, ProjectionError> {
    match TypeCategory::of(ty, library)? {
        TypeCategory::Boolean => Ok(AbiType::U8),
        TypeCategory::String | TypeCategory::Interface | TypeCategory::Array => Ok(AbiType::Pointer),
        TypeCategory::Numeric => Ok(match ty.name.as_str() {
            "Byte" => AbiType::U8,
            "SByte" => AbiType::I8,
            "Char" | "UInt16" => AbiType::U16,
            "Int16" => AbiType::I16,
            "Int32" => AbiType::I32,
            "UInt32" => AbiType::U32,
            "Int64" => AbiType::I64,
            "UInt64" => AbiType::U64,
            "Single" => AbiType::F32,
            "Double" => AbiType::F64,
            _ => {
                return Err(ProjectionError::invalid_type(
                    ty,
                    "numeric category with no scalar shape",
                ))
            }
        }),
        TypeCategory::Enum => match library.lookup(ty)? {
            Entity::Enum(decl) => Ok(if decl.is_flags {
                AbiType::U32
            } else {
                AbiType::I32
            }),
            _ => Err(ProjectionError::invalid_type(ty, "enum category mismatch")),
        },
        category @ (TypeCategory::Struct | TypeCategory::Default) => {
            Err(ProjectionError::UnsupportedMarshal(category))
        }
    }
}

/// A delegate parameter with its marshalling classification.
#[derive(Clone, Debug)]
pub struct ProjectedParam {
    pub name: String,
    pub ty: TypeReference,
    pub category: TypeCategory,
    pub abi: AbiType,
    /// Declared type resolves to an interface entity, so the value crosses
    /// the boundary as a bare vtable pointer on every call site.
    pub interface_pointer: bool,
}

/// Description of the native-callable trampoline wrapping a managed callback.
#[derive(Clone, Debug)]
pub struct TrampolineDesc {
    /// The native signature: this pointer, marshalled parameters, and a
    /// trailing result slot for non-void delegates. The actual return slot
    /// carries the HRESULT.
    pub native_params: Vec<(String, AbiType)>,
    pub body: Vec<String>,
}

/// Description of the managed-side proxy invoking a native function pointer.
#[derive(Clone, Debug)]
pub struct ProxyDesc {
    pub body: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct DelegateProjection {
    pub namespace: String,
    /// Projected (flattened) name for closed instantiations, declared name
    /// otherwise.
    pub name: String,
    /// The metadata-declared identifier of the declaration.
    pub iid: Guid,
    /// The derived identifier of a closed generic instantiation, exposed
    /// separately so generic and non-generic access stay uniform.
    pub parameterized_iid: Option<Guid>,
    pub params: Vec<ProjectedParam>,
    pub return_param: Option<ProjectedParam>,
    pub trampoline: TrampolineDesc,
    pub proxy: ProxyDesc,
}

/// Projects a delegate declaration or closed instantiation.
pub fn project_delegate(
    ty: &TypeReference,
    library: &TypeLibrary,
    registry: &MarshallerRegistry,
) -> Result<DelegateProjection, ProjectionError> {
    let tr = ty.normalize();
    let decl = match library.lookup(&tr)? {
        Entity::Delegate(decl) => decl.clone(),
        other => {
            return Err(ProjectionError::invalid_type(
                &tr,
                format!("cannot project a {} as a delegate", other.kind()),
            ))
        }
    };

    // Close the declaration over the instantiation's arguments.
    let mut parameters = decl.parameters.clone();
    let mut return_type = decl
        .return_type
        .clone()
        .filter(|t| !t.is_system_type("Void"));
    if let Some(args) = &tr.generic_args {
        for arg in args {
            let replacement = arg.resolved.as_ref().ok_or_else(|| {
                ProjectionError::invalid_type(&tr, "open generic delegate cannot be projected")
            })?;
            for p in &mut parameters {
                p.ty = p.ty.substitute(&arg.param_name, replacement);
            }
            return_type = return_type.map(|t| t.substitute(&arg.param_name, replacement));
        }
    }

    let params = parameters
        .iter()
        .map(|p| project_param(p, library, registry))
        .collect::<Result<Vec<_>, _>>()?;
    let return_param = return_type
        .map(|t| project_param(&ParamDecl::new("ret_val", t), library, registry))
        .transpose()?;

    let parameterized_iid = if decl.is_generic() && tr.is_closed() {
        Some(derive_iid(&encode(&tr, library)?))
    } else {
        None
    };

    let trampoline = build_trampoline(&params, return_param.as_ref(), registry)?;
    let proxy = build_proxy(&params, return_param.as_ref(), registry)?;

    let name = tr.projected_name();
    debug!(namespace = %decl.namespace, name = %name, derived = parameterized_iid.is_some(), "projected delegate");

    Ok(DelegateProjection {
        namespace: decl.namespace,
        name,
        iid: decl.guid,
        parameterized_iid,
        params,
        return_param,
        trampoline,
        proxy,
    })
}

fn project_param(
    param: &ParamDecl,
    library: &TypeLibrary,
    registry: &MarshallerRegistry,
) -> Result<ProjectedParam, ProjectionError> {
    let category = TypeCategory::of(&param.ty, library)?;
    // surface UnsupportedMarshal at projection time, not mid-emission
    registry.for_category(category)?;
    let interface_pointer = param.ty.namespace != "System"
        && matches!(library.lookup(&param.ty), Ok(Entity::Interface(_)));
    let abi = if interface_pointer {
        AbiType::Pointer
    } else {
        abi_type_of(&param.ty, library)?
    };
    Ok(ProjectedParam {
        name: param.name.clone(),
        ty: param.ty.clone(),
        category,
        abi,
        interface_pointer,
    })
}

fn build_trampoline(
    params: &[ProjectedParam],
    ret: Option<&ProjectedParam>,
    registry: &MarshallerRegistry,
) -> Result<TrampolineDesc, ProjectionError> {
    let mut native_params = vec![("this_ptr".to_string(), AbiType::Pointer)];
    native_params.extend(params.iter().map(|p| (p.name.clone(), p.abi)));
    if ret.is_some() {
        // HRESULT occupies the return slot, so the value comes back through
        // a caller-allocated out parameter.
        native_params.push(("ret_val".to_string(), AbiType::Pointer));
    }

    let mut body = Vec::new();
    let mut call_args = Vec::new();
    for p in params {
        let fragment = registry.for_category(p.category)?.from_native(&p.name);
        body.extend(fragment.stmts);
        call_args.push(fragment.result);
    }
    match ret {
        Some(r) => {
            body.push(format!("let result = callback({});", call_args.join(", ")));
            let fragment = registry.for_category(r.category)?.to_native("result");
            body.extend(fragment.stmts);
            // ownership of an owned handle transfers to the caller with the slot
            body.push(format!("ret_val.write({});", fragment.result));
        }
        None => body.push(format!("callback({});", call_args.join(", "))),
    }
    body.push("HResult::OK".to_string());

    Ok(TrampolineDesc { native_params, body })
}

fn build_proxy(
    params: &[ProjectedParam],
    ret: Option<&ProjectedParam>,
    registry: &MarshallerRegistry,
) -> Result<ProxyDesc, ProjectionError> {
    let mut body = Vec::new();
    let mut invoke_args = vec!["self.this".to_string()];
    let mut releases = Vec::new();

    for p in params {
        let strategy = registry.for_category(p.category)?;
        let fragment = strategy.to_native(&p.name);
        body.extend(fragment.stmts.clone());
        // interface values cross as bare vtable pointers on every call site
        let arg = if p.interface_pointer {
            format!("{}.as_raw()", p.name)
        } else {
            fragment.result.clone()
        };
        invoke_args.push(arg);
        if let Some(release) = strategy.release_native(&fragment.result) {
            releases.push(release);
        }
    }
    if ret.is_some() {
        body.push("let mut ret_val = MaybeUninit::uninit();".to_string());
        invoke_args.push("ret_val.as_mut_ptr()".to_string());
    }

    body.push(format!(
        "let hr = (self.vtable.invoke)({});",
        invoke_args.join(", ")
    ));
    body.extend(releases);
    body.push("HResult(hr).ok()?;".to_string());

    if let Some(r) = ret {
        body.push("let ret_val = unsafe { ret_val.assume_init() };".to_string());
        let strategy = registry.for_category(r.category)?;
        let fragment = strategy.from_native("ret_val");
        body.extend(fragment.stmts.clone());
        if let Some(release) = strategy.release_native("ret_val") {
            // the callee handed us ownership through the slot
            body.push(release);
        }
        body.push(format!("Ok({})", fragment.result));
    } else {
        body.push("Ok(())".to_string());
    }

    Ok(ProxyDesc { body })
}

/// Memoizing projection walker: each distinct instantiation is projected at
/// most once per pass, and interface/delegate identities encountered in a
/// delegate's signature are resolved along the way.
pub struct Projector<'a> {
    library: &'a TypeLibrary,
    registry: &'a MarshallerRegistry,
    projected: HashSet<String>,
    identities: Vec<(String, TypeIdentity)>,
}

impl<'a> Projector<'a> {
    pub fn new(library: &'a TypeLibrary, registry: &'a MarshallerRegistry) -> Self {
        Projector {
            library,
            registry,
            projected: HashSet::new(),
            identities: Vec::new(),
        }
    }

    /// Projects the given delegate once; returns `None` if an identical
    /// instantiation was already projected in this pass.
    pub fn project(
        &mut self,
        ty: &TypeReference,
    ) -> Result<Option<DelegateProjection>, ProjectionError> {
        let key = format!("{}.{}", ty.namespace, ty.projected_name());
        if !self.projected.insert(key) {
            return Ok(None);
        }
        let projection = project_delegate(ty, self.library, self.registry)?;
        for param in &projection.params {
            self.record_identity(&param.ty)?;
        }
        if let Some(ret) = &projection.return_param {
            self.record_identity(&ret.ty)?;
        }
        Ok(Some(projection))
    }

    fn record_identity(&mut self, ty: &TypeReference) -> Result<(), ProjectionError> {
        if ty.generic_args.is_none() {
            return Ok(());
        }
        if !matches!(
            self.library.lookup(ty),
            Ok(Entity::Interface(_) | Entity::Delegate(_))
        ) {
            return Ok(());
        }
        let key = format!("{}.{}", ty.namespace, ty.projected_name());
        if self.identities.iter().any(|(k, _)| *k == key) {
            return Ok(());
        }
        let identity = resolve_type_identity(ty, self.library)?;
        self.identities.push((key, identity));
        Ok(())
    }

    /// Identities of generic instantiations reached through projected
    /// delegates, in first-seen order.
    pub fn identities(&self) -> &[(String, TypeIdentity)] {
        &self.identities
    }

    pub fn projected_count(&self) -> usize {
        self.projected.len()
    }
}
