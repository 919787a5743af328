//! The marshaller registry: a dispatch table from semantic type category to a
//! conversion strategy.
//!
//! Each strategy covers two planes. The code plane emits the
//! `(resultExpression, supportingStatements)` pairs the emission collaborator
//! turns into source text; the value plane performs the same conversion on
//! live values for the runtime trampoline and proxy machinery. Ownership is
//! tracked per strategy: every owned native handle produced by a `to_native`
//! or `lower` must pair with exactly one release.

use crate::error::{ProjectionError, RuntimeError};
use crate::runtime::object::InterfaceHandle;
use crate::runtime::strings::HString;
use crate::runtime::{NativeSlot, Value};
use crate::types::entities::{Entity, TypeLibrary};
use crate::types::TypeReference;
use enum_dispatch::enum_dispatch;
use std::collections::HashMap;

/// The fixed, closed enumeration of marshalling categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TypeCategory {
    Numeric,
    Boolean,
    String,
    Interface,
    Struct,
    Enum,
    Array,
    Default,
}

impl TypeCategory {
    /// Classifies a type reference via the entity model.
    pub fn of(ty: &TypeReference, library: &TypeLibrary) -> Result<Self, ProjectionError> {
        if ty.is_array {
            return Ok(TypeCategory::Array);
        }
        if ty.namespace == "System" {
            return Ok(match ty.name.as_str() {
                "String" => TypeCategory::String,
                "Boolean" => TypeCategory::Boolean,
                "Object" => TypeCategory::Interface,
                "Byte" | "SByte" | "Char" | "Int16" | "UInt16" | "Int32" | "UInt32" | "Int64"
                | "UInt64" | "Single" | "Double" => TypeCategory::Numeric,
                _ => TypeCategory::Default,
            });
        }
        Ok(match library.lookup(ty)? {
            Entity::Interface(_) | Entity::Class(_) | Entity::Delegate(_) => {
                TypeCategory::Interface
            }
            Entity::Struct(_) => TypeCategory::Struct,
            Entity::Enum(_) => TypeCategory::Enum,
        })
    }

    /// Categories whose managed and native representations coincide, so the
    /// identity strategy applies when nothing more specific is registered.
    pub fn identity_compatible(self) -> bool {
        matches!(
            self,
            TypeCategory::Numeric | TypeCategory::Enum | TypeCategory::Struct | TypeCategory::Default
        )
    }
}

/// Whether a conversion transferred ownership of a native resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ownership {
    Borrowed,
    Owned,
}

/// The explicit result of a code-plane conversion: the expression that yields
/// the converted value plus any supporting statements, threaded explicitly
/// rather than through a mutable builder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MarshalFragment {
    pub result: String,
    pub stmts: Vec<String>,
    pub ownership: Ownership,
}

impl MarshalFragment {
    fn passthrough(result: impl Into<String>) -> Self {
        MarshalFragment {
            result: result.into(),
            stmts: Vec::new(),
            ownership: Ownership::Borrowed,
        }
    }
}

/// The result of a value-plane conversion.
#[derive(Clone, Copy, Debug)]
pub struct Lowered {
    pub slot: NativeSlot,
    pub ownership: Ownership,
}

impl Lowered {
    fn borrowed(slot: NativeSlot) -> Self {
        Lowered {
            slot,
            ownership: Ownership::Borrowed,
        }
    }
}

#[enum_dispatch]
pub trait Marshal {
    /// Code plane: managed expression to native expression.
    fn to_native(&self, value: &str) -> MarshalFragment;

    /// Code plane: native expression to managed expression.
    fn from_native(&self, value: &str) -> MarshalFragment;

    /// Code plane: the statement releasing an owned native value, if this
    /// strategy's `to_native` produces one.
    fn release_native(&self, value: &str) -> Option<String> {
        let _ = value;
        None
    }

    /// Whether this strategy's lowered representation owns a native resource
    /// that must eventually be released.
    fn native_ownership(&self) -> Ownership {
        Ownership::Borrowed
    }

    /// Value plane: managed value to native slot.
    fn lower(&self, value: &Value) -> Result<Lowered, RuntimeError>;

    /// Value plane: native slot to managed value. Never takes ownership of a
    /// borrowed handle.
    fn lift(&self, slot: &NativeSlot) -> Result<Value, RuntimeError>;

    /// Value plane: releases an owned native slot produced by `lower`.
    fn release(&self, slot: &NativeSlot) {
        let _ = slot;
    }
}

/// Identity conversion for representations that coincide across the boundary.
#[derive(Clone, Copy, Debug)]
pub struct IdentityMarshaller;

impl Marshal for IdentityMarshaller {
    fn to_native(&self, value: &str) -> MarshalFragment {
        MarshalFragment::passthrough(value)
    }

    fn from_native(&self, value: &str) -> MarshalFragment {
        MarshalFragment::passthrough(value)
    }

    fn lower(&self, value: &Value) -> Result<Lowered, RuntimeError> {
        let slot = match *value {
            Value::I8(v) => NativeSlot::I8(v),
            Value::U8(v) => NativeSlot::U8(v),
            Value::I16(v) => NativeSlot::I16(v),
            Value::U16(v) => NativeSlot::U16(v),
            Value::I32(v) => NativeSlot::I32(v),
            Value::U32(v) => NativeSlot::U32(v),
            Value::I64(v) => NativeSlot::I64(v),
            Value::U64(v) => NativeSlot::U64(v),
            Value::F32(v) => NativeSlot::F32(v),
            Value::F64(v) => NativeSlot::F64(v),
            _ => {
                return Err(RuntimeError::TypeMismatch(
                    "identity strategy only lowers scalar values",
                ))
            }
        };
        Ok(Lowered::borrowed(slot))
    }

    fn lift(&self, slot: &NativeSlot) -> Result<Value, RuntimeError> {
        Ok(match *slot {
            NativeSlot::I8(v) => Value::I8(v),
            NativeSlot::U8(v) => Value::U8(v),
            NativeSlot::I16(v) => Value::I16(v),
            NativeSlot::U16(v) => Value::U16(v),
            NativeSlot::I32(v) => Value::I32(v),
            NativeSlot::U32(v) => Value::U32(v),
            NativeSlot::I64(v) => Value::I64(v),
            NativeSlot::U64(v) => Value::U64(v),
            NativeSlot::F32(v) => Value::F32(v),
            NativeSlot::F64(v) => Value::F64(v),
            NativeSlot::Ptr(_) => {
                return Err(RuntimeError::TypeMismatch(
                    "identity strategy cannot lift a pointer slot",
                ))
            }
        })
    }
}

/// Booleans cross the ABI as one byte, nonzero meaning true.
#[derive(Clone, Copy, Debug)]
pub struct BooleanMarshaller;

impl Marshal for BooleanMarshaller {
    fn to_native(&self, value: &str) -> MarshalFragment {
        MarshalFragment {
            result: format!("{value}__u8"),
            stmts: vec![format!(
                "let {value}__u8: u8 = if {value} {{ 1 }} else {{ 0 }};"
            )],
            ownership: Ownership::Borrowed,
        }
    }

    fn from_native(&self, value: &str) -> MarshalFragment {
        MarshalFragment {
            result: format!("{value}__bool"),
            stmts: vec![format!("let {value}__bool = {value} != 0;")],
            ownership: Ownership::Borrowed,
        }
    }

    fn lower(&self, value: &Value) -> Result<Lowered, RuntimeError> {
        match value {
            Value::Bool(b) => Ok(Lowered::borrowed(NativeSlot::U8(u8::from(*b)))),
            _ => Err(RuntimeError::TypeMismatch("expected a boolean value")),
        }
    }

    fn lift(&self, slot: &NativeSlot) -> Result<Value, RuntimeError> {
        match slot {
            NativeSlot::U8(v) => Ok(Value::Bool(*v != 0)),
            _ => Err(RuntimeError::TypeMismatch("expected a one-byte boolean slot")),
        }
    }
}

/// Strings cross the ABI as opaque reference-counted handles. `to_native`
/// allocates a handle the caller must release; `from_native` copies out of a
/// borrowed handle without touching its reference count.
#[derive(Clone, Copy, Debug)]
pub struct StringMarshaller;

impl Marshal for StringMarshaller {
    fn to_native(&self, value: &str) -> MarshalFragment {
        MarshalFragment {
            result: format!("{value}__h"),
            stmts: vec![format!("let {value}__h = HString::create(&{value});")],
            ownership: Ownership::Owned,
        }
    }

    fn from_native(&self, value: &str) -> MarshalFragment {
        MarshalFragment {
            result: format!("{value}__s"),
            stmts: vec![format!("let {value}__s = {value}.as_string();")],
            ownership: Ownership::Borrowed,
        }
    }

    fn release_native(&self, value: &str) -> Option<String> {
        Some(format!("HString::delete({value});"))
    }

    fn native_ownership(&self) -> Ownership {
        Ownership::Owned
    }

    fn lower(&self, value: &Value) -> Result<Lowered, RuntimeError> {
        match value {
            Value::Str(s) => Ok(Lowered {
                slot: NativeSlot::Ptr(HString::create(s).as_ptr()),
                ownership: Ownership::Owned,
            }),
            _ => Err(RuntimeError::TypeMismatch("expected a string value")),
        }
    }

    fn lift(&self, slot: &NativeSlot) -> Result<Value, RuntimeError> {
        match slot {
            // Borrowed: copy out, leave the reference count alone.
            NativeSlot::Ptr(p) => {
                let handle = unsafe { HString::from_raw(*p) };
                Ok(Value::Str(handle.as_string()))
            }
            _ => Err(RuntimeError::TypeMismatch("expected a string handle slot")),
        }
    }

    fn release(&self, slot: &NativeSlot) {
        if let NativeSlot::Ptr(p) = slot {
            unsafe { HString::from_raw(*p) }.delete();
        }
    }
}

/// Interface values cross the ABI as bare vtable pointers. Wrapping never
/// caches identity: each lift yields a fresh handle over the same pointer.
#[derive(Clone, Copy, Debug)]
pub struct InterfaceMarshaller;

impl Marshal for InterfaceMarshaller {
    fn to_native(&self, value: &str) -> MarshalFragment {
        MarshalFragment::passthrough(format!("{value}.as_raw()"))
    }

    fn from_native(&self, value: &str) -> MarshalFragment {
        MarshalFragment::passthrough(format!("InterfaceHandle::from_raw({value})"))
    }

    fn lower(&self, value: &Value) -> Result<Lowered, RuntimeError> {
        match value {
            Value::Interface(handle) => Ok(Lowered::borrowed(NativeSlot::Ptr(handle.as_raw()))),
            _ => Err(RuntimeError::TypeMismatch("expected an interface value")),
        }
    }

    fn lift(&self, slot: &NativeSlot) -> Result<Value, RuntimeError> {
        match slot {
            NativeSlot::Ptr(p) => Ok(Value::Interface(InterfaceHandle::from_raw(*p))),
            _ => Err(RuntimeError::TypeMismatch("expected an interface pointer slot")),
        }
    }
}

#[enum_dispatch(Marshal)]
#[derive(Clone, Copy, Debug)]
pub enum Strategy {
    IdentityMarshaller,
    BooleanMarshaller,
    StringMarshaller,
    InterfaceMarshaller,
}

const DEFAULT_STRATEGY: Strategy = Strategy::IdentityMarshaller(IdentityMarshaller);

/// Category-to-strategy table. Populated once at startup and treated as
/// immutable by the projector; `register` exists so new categories can be
/// supported without touching projector call sites.
#[derive(Clone, Debug, Default)]
pub struct MarshallerRegistry {
    table: HashMap<TypeCategory, Strategy>,
}

impl MarshallerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard table: booleans, strings and interfaces get their
    /// specialized strategies; identity-compatible categories fall back to
    /// the default.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(TypeCategory::Boolean, BooleanMarshaller.into());
        registry.register(TypeCategory::String, StringMarshaller.into());
        registry.register(TypeCategory::Interface, InterfaceMarshaller.into());
        registry
    }

    pub fn register(&mut self, category: TypeCategory, strategy: Strategy) {
        self.table.insert(category, strategy);
    }

    pub fn for_category(&self, category: TypeCategory) -> Result<&Strategy, ProjectionError> {
        if let Some(strategy) = self.table.get(&category) {
            return Ok(strategy);
        }
        if category.identity_compatible() {
            return Ok(&DEFAULT_STRATEGY);
        }
        Err(ProjectionError::UnsupportedMarshal(category))
    }
}
