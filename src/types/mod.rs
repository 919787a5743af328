use std::fmt::{self, Debug, Formatter};
use std::hash::{Hash, Hasher};

pub mod entities;

/// An immutable description of a type usage: possibly generic, possibly an
/// array or by-reference slot.
///
/// Equality and hashing are by `(name, namespace)` only. Generic arguments do
/// not participate in identity because the same declaration is reused across
/// instantiations; a reference with all arguments resolved is a closed
/// instantiation eligible for signature encoding.
#[derive(Clone)]
pub struct TypeReference {
    pub name: String,
    pub namespace: String,
    pub generic_args: Option<Vec<GenericArg>>,
    pub is_array: bool,
    pub is_reference: bool,
}

/// One slot of a generic argument list: the declared parameter name plus the
/// concrete type it resolves to, once known.
#[derive(Clone, Debug)]
pub struct GenericArg {
    pub param_name: String,
    pub resolved: Option<TypeReference>,
}

impl GenericArg {
    pub fn unresolved(param_name: impl Into<String>) -> Self {
        GenericArg {
            param_name: param_name.into(),
            resolved: None,
        }
    }

    pub fn resolved(param_name: impl Into<String>, ty: TypeReference) -> Self {
        GenericArg {
            param_name: param_name.into(),
            resolved: Some(ty),
        }
    }

    fn substitute(&self, param: &str, replacement: &TypeReference) -> GenericArg {
        match &self.resolved {
            Some(ty) => GenericArg {
                param_name: self.param_name.clone(),
                resolved: Some(ty.substitute(param, replacement)),
            },
            None if self.param_name == param => GenericArg {
                param_name: self.param_name.clone(),
                resolved: Some(replacement.clone()),
            },
            None => self.clone(),
        }
    }
}

impl TypeReference {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        TypeReference {
            name: name.into(),
            namespace: namespace.into(),
            generic_args: None,
            is_array: false,
            is_reference: false,
        }
    }

    pub fn generic(
        namespace: impl Into<String>,
        name: impl Into<String>,
        args: Vec<GenericArg>,
    ) -> Self {
        TypeReference {
            name: name.into(),
            namespace: namespace.into(),
            generic_args: Some(args),
            is_array: false,
            is_reference: false,
        }
    }

    pub fn system(name: impl Into<String>) -> Self {
        TypeReference::new("System", name)
    }

    pub fn array_of(mut self) -> Self {
        self.is_array = true;
        self
    }

    pub fn is_type_of(&self, namespace: &str, name: &str) -> bool {
        self.namespace == namespace && self.name == name
    }

    pub fn is_system_type(&self, name: &str) -> bool {
        self.is_type_of("System", name)
    }

    /// All generic arguments resolved: a closed instantiation.
    pub fn is_closed(&self) -> bool {
        match &self.generic_args {
            Some(args) => args.iter().all(|a| a.resolved.is_some()),
            None => false,
        }
    }

    /// A generic argument list with at least one unresolved slot: an open
    /// declaration, never eligible for signature encoding.
    pub fn is_open(&self) -> bool {
        match &self.generic_args {
            Some(args) => args.iter().any(|a| a.resolved.is_none()),
            None => false,
        }
    }

    /// Replaces every occurrence of the generic parameter `param` with
    /// `replacement`, recursing through nested argument lists.
    pub fn substitute(&self, param: &str, replacement: &TypeReference) -> TypeReference {
        if self.name == param {
            return replacement.clone();
        }
        TypeReference {
            generic_args: self.generic_args.as_ref().map(|args| {
                args.iter()
                    .map(|a| a.substitute(param, replacement))
                    .collect()
            }),
            ..self.clone()
        }
    }

    /// Canonicalizes a synthetic instantiated name (`IVector_Int32_`) back to
    /// the backtick-arity form of the declaration (`` IVector`1 ``).
    pub fn normalize(&self) -> TypeReference {
        if !self.name.contains('_') {
            return self.clone();
        }
        let Some(args) = &self.generic_args else {
            return self.clone();
        };
        let base = match self.name.find('_') {
            Some(at) => &self.name[..at],
            None => return self.clone(),
        };
        TypeReference {
            name: format!("{}`{}", base, args.len()),
            ..self.clone()
        }
    }

    /// The flattened synthetic name of a closed instantiation, underscore
    /// separated: `` IVector`1 `` over `Int32` becomes `IVector_Int32_`.
    /// Open or non-generic references keep their declared name.
    pub fn projected_name(&self) -> String {
        if !self.is_closed() {
            return self.name.clone();
        }
        let base = match self.name.find('`') {
            Some(at) => &self.name[..at],
            None => self.name.as_str(),
        };
        let mut projected = format!("{base}_");
        for arg in self.generic_args.as_ref().into_iter().flatten() {
            // is_closed guarantees every slot is resolved
            if let Some(ty) = &arg.resolved {
                projected.push_str(&ty.projected_name());
                projected.push('_');
            }
        }
        projected
    }

    pub fn with_projected_name(&self) -> TypeReference {
        TypeReference {
            name: self.projected_name(),
            ..self.clone()
        }
    }
}

impl PartialEq for TypeReference {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.namespace == other.namespace
    }
}

impl Eq for TypeReference {}

impl Hash for TypeReference {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.namespace.hash(state);
    }
}

impl Debug for TypeReference {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace, self.name)?;
        if let Some(args) = &self.generic_args {
            write!(f, "<")?;
            for (i, arg) in args.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                match &arg.resolved {
                    Some(ty) => write!(f, "{ty:?}")?,
                    None => write!(f, "{}", arg.param_name)?,
                }
            }
            write!(f, ">")?;
        }
        if self.is_array {
            write!(f, "[]")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector_of(element: TypeReference) -> TypeReference {
        TypeReference::generic(
            "Windows.Foundation.Collections",
            "IVector`1",
            vec![GenericArg::resolved("T", element)],
        )
    }

    #[test]
    fn identity_ignores_generic_arguments() {
        let ints = vector_of(TypeReference::system("Int32"));
        let strings = vector_of(TypeReference::system("String"));
        assert_eq!(ints, strings);
    }

    #[test]
    fn substitution_resolves_open_slots_recursively() {
        let open = TypeReference::generic(
            "Windows.Foundation.Collections",
            "IVector`1",
            vec![GenericArg::unresolved("T")],
        );
        let closed = open.substitute("T", &TypeReference::system("Int32"));
        assert!(closed.is_closed());
        let args = closed.generic_args.unwrap();
        assert!(args[0].resolved.as_ref().unwrap().is_system_type("Int32"));
    }

    #[test]
    fn substitution_reaches_nested_instantiations() {
        let nested = TypeReference::generic(
            "Windows.Foundation.Collections",
            "IVector`1",
            vec![GenericArg::resolved(
                "T",
                TypeReference::generic(
                    "Windows.Foundation.Collections",
                    "IMap`2",
                    vec![GenericArg::unresolved("K"), GenericArg::unresolved("V")],
                ),
            )],
        );
        let closed = nested
            .substitute("K", &TypeReference::system("String"))
            .substitute("V", &TypeReference::system("Int32"));
        assert!(!closed.is_open());
    }

    #[test]
    fn projected_name_flattens_closed_instantiations() {
        let ty = vector_of(TypeReference::system("Int32"));
        assert_eq!(ty.projected_name(), "IVector_Int32_");

        let nested = vector_of(vector_of(TypeReference::system("String")));
        assert_eq!(nested.projected_name(), "IVector_IVector_String__");
    }

    #[test]
    fn normalize_recovers_the_declaration_name() {
        let projected = vector_of(TypeReference::system("Int32")).with_projected_name();
        assert_eq!(projected.name, "IVector_Int32_");
        assert_eq!(projected.normalize().name, "IVector`1");
    }

    #[test]
    fn open_references_keep_their_name() {
        let open = TypeReference::generic(
            "Windows.Foundation.Collections",
            "IVector`1",
            vec![GenericArg::unresolved("T")],
        );
        assert!(open.is_open());
        assert_eq!(open.projected_name(), "IVector`1");
    }
}
