//! Signature grammar and identity derivation, end to end against a small
//! hand-built entity model.

use winrt_rs::derive_iid;
use winrt_rs::error::ProjectionError;
use winrt_rs::guid::Guid;
use winrt_rs::signature::encode;
use winrt_rs::types::entities::{
    ClassDecl, DelegateDecl, Entity, EnumDecl, FieldDecl, InterfaceDecl, StructDecl, TypeLibrary,
};
use winrt_rs::types::{GenericArg, TypeReference};

const IVECTOR_GUID: &str = "913337e9-11a1-4345-a3a2-4e7f956e222d";
const IMAP_GUID: &str = "3c2925fe-8519-45c1-aa79-197b6718c1c1";
const ITHING_GUID: &str = "9de1c534-6ae1-11e0-84e1-18a905bcc53f";
const HANDLER_GUID: &str = "fcdcf02c-e5d8-4478-915a-4d90b74b83a5";
const SIMPLE_GUID: &str = "ed32a372-f3c8-4faa-9cfb-470148da3888";

fn guid(text: &str) -> Guid {
    Guid::parse(text).unwrap()
}

fn library() -> TypeLibrary {
    let mut lib = TypeLibrary::new();
    lib.insert(Entity::Enum(EnumDecl {
        namespace: "Windows.Test".into(),
        name: "Color".into(),
        is_flags: false,
    }));
    lib.insert(Entity::Enum(EnumDecl {
        namespace: "Windows.Test".into(),
        name: "FileAttributes".into(),
        is_flags: true,
    }));
    lib.insert(Entity::Struct(StructDecl {
        namespace: "Windows.Test".into(),
        name: "Blend".into(),
        // declared out of index order on purpose
        fields: vec![
            FieldDecl {
                name: "weight".into(),
                ty: TypeReference::system("Double"),
                index: 1,
            },
            FieldDecl {
                name: "steps".into(),
                ty: TypeReference::system("Int32"),
                index: 0,
            },
        ],
    }));
    lib.insert(Entity::Interface(InterfaceDecl {
        namespace: "Windows.Test".into(),
        name: "IThing".into(),
        declared_iid: Some(guid(ITHING_GUID)),
        generic_params: vec![],
        methods: vec![],
    }));
    lib.insert(Entity::Interface(InterfaceDecl {
        namespace: "Windows.Foundation.Collections".into(),
        name: "IVector`1".into(),
        declared_iid: Some(guid(IVECTOR_GUID)),
        generic_params: vec!["T".into()],
        methods: vec![],
    }));
    lib.insert(Entity::Interface(InterfaceDecl {
        namespace: "Windows.Foundation.Collections".into(),
        name: "IMap`2".into(),
        declared_iid: Some(guid(IMAP_GUID)),
        generic_params: vec!["K".into(), "V".into()],
        methods: vec![],
    }));
    lib.insert(Entity::Delegate(DelegateDecl {
        namespace: "Windows.Foundation".into(),
        name: "AsyncOperationCompletedHandler`1".into(),
        parameters: vec![],
        return_type: None,
        guid: guid(HANDLER_GUID),
        generic_params: vec!["TResult".into()],
    }));
    lib.insert(Entity::Delegate(DelegateDecl {
        namespace: "Windows.Test".into(),
        name: "SimpleHandler".into(),
        parameters: vec![],
        return_type: None,
        guid: guid(SIMPLE_GUID),
        generic_params: vec![],
    }));
    lib.insert(Entity::Class(ClassDecl {
        namespace: "Windows.Test".into(),
        name: "Widget".into(),
        default_interface: TypeReference::new("Windows.Test", "IThing"),
    }));
    lib
}

fn vector_of(element: TypeReference) -> TypeReference {
    TypeReference::generic(
        "Windows.Foundation.Collections",
        "IVector`1",
        vec![GenericArg::resolved("T", element)],
    )
}

#[test]
fn primitives_use_the_fixed_codes() {
    let lib = library();
    for (name, code) in [
        ("Boolean", "b1"),
        ("Byte", "u1"),
        ("Char", "c2"),
        ("Double", "f8"),
        ("Guid", "g16"),
        ("Int16", "i2"),
        ("Int32", "i4"),
        ("Int64", "i8"),
        ("SByte", "i1"),
        ("Single", "f4"),
        ("UInt16", "u2"),
        ("UInt32", "u4"),
        ("UInt64", "u8"),
    ] {
        assert_eq!(encode(&TypeReference::system(name), &lib).unwrap(), code);
    }
}

#[test]
fn object_and_string_have_dedicated_productions() {
    let lib = library();
    assert_eq!(
        encode(&TypeReference::system("Object"), &lib).unwrap(),
        "cinterface(IInspectable)"
    );
    assert_eq!(
        encode(&TypeReference::system("String"), &lib).unwrap(),
        "string"
    );
}

#[test]
fn enums_encode_their_underlying_type() {
    let lib = library();
    assert_eq!(
        encode(&TypeReference::new("Windows.Test", "Color"), &lib).unwrap(),
        "enum(Windows.Test.Color;i4)"
    );
    assert_eq!(
        encode(&TypeReference::new("Windows.Test", "FileAttributes"), &lib).unwrap(),
        "enum(Windows.Test.FileAttributes;u4)"
    );
}

#[test]
fn struct_fields_encode_in_index_order() {
    let lib = library();
    // declaration order is weight,steps but index order is steps,weight
    assert_eq!(
        encode(&TypeReference::new("Windows.Test", "Blend"), &lib).unwrap(),
        "struct(Windows.Test.Blend;i4;f8)"
    );
}

#[test]
fn non_generic_interface_encodes_as_its_bare_iid() {
    let lib = library();
    assert_eq!(
        encode(&TypeReference::new("Windows.Test", "IThing"), &lib).unwrap(),
        ITHING_GUID
    );
}

#[test]
fn declared_iids_are_emitted_lowercase() {
    let mut lib = library();
    lib.insert(Entity::Interface(InterfaceDecl {
        namespace: "Windows.Test".into(),
        name: "ILoud".into(),
        // metadata sources routinely carry uppercase braced identifiers
        declared_iid: Some(guid("{5A2B90C4-8F1E-4B7D-9E3A-0C6D5B4A3F21}")),
        generic_params: vec![],
        methods: vec![],
    }));
    assert_eq!(
        encode(&TypeReference::new("Windows.Test", "ILoud"), &lib).unwrap(),
        "5a2b90c4-8f1e-4b7d-9e3a-0c6d5b4a3f21"
    );
}

#[test]
fn closed_instantiation_uses_the_pinterface_production() {
    let lib = library();
    let ty = vector_of(TypeReference::system("Int32"));
    assert_eq!(
        encode(&ty, &lib).unwrap(),
        format!("pinterface({IVECTOR_GUID};i4)")
    );
}

#[test]
fn pinterface_arguments_recurse_through_the_grammar() {
    let lib = library();
    let nested = vector_of(vector_of(TypeReference::system("String")));
    assert_eq!(
        encode(&nested, &lib).unwrap(),
        format!("pinterface({IVECTOR_GUID};pinterface({IVECTOR_GUID};string))")
    );

    let of_enum = vector_of(TypeReference::new("Windows.Test", "Color"));
    assert_eq!(
        encode(&of_enum, &lib).unwrap(),
        format!("pinterface({IVECTOR_GUID};enum(Windows.Test.Color;i4))")
    );
}

#[test]
fn delegates_encode_by_parameterization() {
    let lib = library();
    assert_eq!(
        encode(&TypeReference::new("Windows.Test", "SimpleHandler"), &lib).unwrap(),
        format!("delegate({SIMPLE_GUID})")
    );

    let closed = TypeReference::generic(
        "Windows.Foundation",
        "AsyncOperationCompletedHandler`1",
        vec![GenericArg::resolved("TResult", TypeReference::system("Boolean"))],
    );
    assert_eq!(
        encode(&closed, &lib).unwrap(),
        format!("pinterface({HANDLER_GUID};b1)")
    );
}

#[test]
fn runtime_classes_encode_through_their_default_interface() {
    let lib = library();
    assert_eq!(
        encode(&TypeReference::new("Windows.Test", "Widget"), &lib).unwrap(),
        format!("rc(Windows.Test.Widget;{ITHING_GUID})")
    );
}

#[test]
fn open_generics_are_rejected() {
    let lib = library();
    let open = TypeReference::generic(
        "Windows.Foundation.Collections",
        "IVector`1",
        vec![GenericArg::unresolved("T")],
    );
    assert!(matches!(
        encode(&open, &lib),
        Err(ProjectionError::InvalidType { .. })
    ));
}

#[test]
fn unknown_types_are_rejected() {
    let lib = library();
    assert!(matches!(
        encode(&TypeReference::new("Windows.Test", "INotThere"), &lib),
        Err(ProjectionError::UnresolvedType { .. })
    ));
}

#[test]
fn derived_iids_are_deterministic_and_argument_sensitive() {
    let lib = library();
    let ints = vector_of(TypeReference::system("Int32"));
    let a = derive_iid(&encode(&ints, &lib).unwrap());
    let b = derive_iid(&encode(&ints, &lib).unwrap());
    assert_eq!(a, b);

    let strings = vector_of(TypeReference::system("String"));
    assert_ne!(a, derive_iid(&encode(&strings, &lib).unwrap()));
}

#[test]
fn argument_order_changes_the_derived_identity() {
    let lib = library();
    let map = |k: TypeReference, v: TypeReference| {
        TypeReference::generic(
            "Windows.Foundation.Collections",
            "IMap`2",
            vec![GenericArg::resolved("K", k), GenericArg::resolved("V", v)],
        )
    };
    let forward = map(TypeReference::system("String"), TypeReference::system("Int32"));
    let reversed = map(TypeReference::system("Int32"), TypeReference::system("String"));
    assert_ne!(
        derive_iid(&encode(&forward, &lib).unwrap()),
        derive_iid(&encode(&reversed, &lib).unwrap())
    );
}

#[test]
fn projected_names_resolve_back_to_the_declaration() {
    let lib = library();
    let projected = vector_of(TypeReference::system("Int32")).with_projected_name();
    assert_eq!(projected.name, "IVector_Int32_");
    assert_eq!(
        encode(&projected, &lib).unwrap(),
        format!("pinterface({IVECTOR_GUID};i4)")
    );
}
