//! Declarations looked up by type reference: the read-only entity model the
//! encoder and projector recurse through. Populated once by the metadata
//! collaborator; never mutated during generation.

use super::{GenericArg, TypeReference};
use crate::error::ProjectionError;
use crate::guid::Guid;
use std::collections::HashMap;

#[derive(Clone, Debug)]
pub enum Entity {
    Interface(InterfaceDecl),
    Class(ClassDecl),
    Delegate(DelegateDecl),
    Struct(StructDecl),
    Enum(EnumDecl),
}

impl Entity {
    pub fn namespace(&self) -> &str {
        match self {
            Entity::Interface(d) => &d.namespace,
            Entity::Class(d) => &d.namespace,
            Entity::Delegate(d) => &d.namespace,
            Entity::Struct(d) => &d.namespace,
            Entity::Enum(d) => &d.namespace,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Entity::Interface(d) => &d.name,
            Entity::Class(d) => &d.name,
            Entity::Delegate(d) => &d.name,
            Entity::Struct(d) => &d.name,
            Entity::Enum(d) => &d.name,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Entity::Interface(_) => "interface",
            Entity::Class(_) => "class",
            Entity::Delegate(_) => "delegate",
            Entity::Struct(_) => "struct",
            Entity::Enum(_) => "enum",
        }
    }
}

/// An interface declaration.
///
/// `declared_iid` is the identifier fixed by the metadata source. For a
/// generic declaration it identifies the open type and seeds `pinterface`
/// signatures; instantiation identity is always derived, never read from
/// here.
#[derive(Clone, Debug)]
pub struct InterfaceDecl {
    pub namespace: String,
    pub name: String,
    pub declared_iid: Option<Guid>,
    pub generic_params: Vec<String>,
    pub methods: Vec<MethodDecl>,
}

impl InterfaceDecl {
    pub fn is_generic(&self) -> bool {
        !self.generic_params.is_empty()
    }

    pub fn as_type_reference(&self) -> TypeReference {
        if self.is_generic() {
            TypeReference::generic(
                self.namespace.clone(),
                self.name.clone(),
                self.generic_params
                    .iter()
                    .map(GenericArg::unresolved)
                    .collect(),
            )
        } else {
            TypeReference::new(self.namespace.clone(), self.name.clone())
        }
    }
}

#[derive(Clone, Debug)]
pub struct MethodDecl {
    pub name: String,
    pub parameters: Vec<ParamDecl>,
    pub return_type: Option<TypeReference>,
}

#[derive(Clone, Debug)]
pub struct ParamDecl {
    pub name: String,
    pub ty: TypeReference,
}

impl ParamDecl {
    pub fn new(name: impl Into<String>, ty: TypeReference) -> Self {
        ParamDecl {
            name: name.into(),
            ty,
        }
    }
}

/// A delegate declaration. The declared guid identifies the open type; for
/// generic delegates the per-instantiation identity is derived.
#[derive(Clone, Debug)]
pub struct DelegateDecl {
    pub namespace: String,
    pub name: String,
    pub parameters: Vec<ParamDecl>,
    pub return_type: Option<TypeReference>,
    pub guid: Guid,
    pub generic_params: Vec<String>,
}

impl DelegateDecl {
    pub fn is_generic(&self) -> bool {
        !self.generic_params.is_empty()
    }

    pub fn as_type_reference(&self) -> TypeReference {
        if self.is_generic() {
            TypeReference::generic(
                self.namespace.clone(),
                self.name.clone(),
                self.generic_params
                    .iter()
                    .map(GenericArg::unresolved)
                    .collect(),
            )
        } else {
            TypeReference::new(self.namespace.clone(), self.name.clone())
        }
    }
}

/// Field order is significant for signature encoding: encode by ascending
/// `index`, not by declaration order.
#[derive(Clone, Debug)]
pub struct StructDecl {
    pub namespace: String,
    pub name: String,
    pub fields: Vec<FieldDecl>,
}

#[derive(Clone, Debug)]
pub struct FieldDecl {
    pub name: String,
    pub ty: TypeReference,
    pub index: u32,
}

#[derive(Clone, Debug)]
pub struct EnumDecl {
    pub namespace: String,
    pub name: String,
    pub is_flags: bool,
}

#[derive(Clone, Debug)]
pub struct ClassDecl {
    pub namespace: String,
    pub name: String,
    pub default_interface: TypeReference,
}

/// The entity model: built once from metadata, read-only afterwards.
///
/// Lookup normalizes synthetic instantiated names first, so a reference to
/// `IVector_Int32_` resolves to the `` IVector`1 `` declaration.
#[derive(Debug, Default)]
pub struct TypeLibrary {
    entities: HashMap<String, Entity>,
}

impl TypeLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entity: Entity) {
        let key = format!("{}.{}", entity.namespace(), entity.name());
        self.entities.insert(key, entity);
    }

    pub fn lookup(&self, ty: &TypeReference) -> Result<&Entity, ProjectionError> {
        let tr = ty.normalize();
        self.entities
            .get(&format!("{}.{}", tr.namespace, tr.name))
            .ok_or_else(|| ProjectionError::unresolved(&tr))
    }

    pub fn contains(&self, ty: &TypeReference) -> bool {
        self.lookup(ty).is_ok()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
