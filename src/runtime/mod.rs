//! Support layer for generated code: status codes, value representations and
//! the native ABI plumbing trampolines and proxies are built on.

use crate::runtime::object::InterfaceHandle;
use libffi::middle::{Arg, Type};
use std::ffi::c_void;
use std::fmt::{self, Display, Formatter};

pub mod activation;
pub mod delegate;
pub mod object;
pub mod strings;

/// A 32-bit status code: zero is success, nonzero encodes a failure.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HResult(pub i32);

impl HResult {
    pub const OK: HResult = HResult(0);

    /// Reserved code a trampoline returns when the managed callback panics.
    ///
    /// A callback that returns normally always yields `OK`; a panic must not
    /// unwind across the ABI, so it maps to this code (`E_UNEXPECTED`).
    pub const CALLBACK_FAILURE: HResult = HResult(0x8000_FFFFu32 as i32);

    pub const fn is_success(self) -> bool {
        self.0 == 0
    }

    pub fn ok(self) -> Result<(), crate::error::RuntimeError> {
        if self.is_success() {
            Ok(())
        } else {
            Err(crate::error::RuntimeError::Hresult(self))
        }
    }
}

impl Display for HResult {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "HRESULT {:#010x}", self.0 as u32)
    }
}

/// A managed-side value crossing the delegate boundary.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Bool(bool),
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    Str(String),
    Interface(InterfaceHandle),
}

/// One native argument or result slot in its ABI representation.
#[derive(Clone, Copy, Debug)]
pub enum NativeSlot {
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    Ptr(*mut c_void),
}

impl NativeSlot {
    pub fn zeroed(abi: AbiType) -> NativeSlot {
        match abi {
            AbiType::I8 => NativeSlot::I8(0),
            AbiType::U8 => NativeSlot::U8(0),
            AbiType::I16 => NativeSlot::I16(0),
            AbiType::U16 => NativeSlot::U16(0),
            AbiType::I32 => NativeSlot::I32(0),
            AbiType::U32 => NativeSlot::U32(0),
            AbiType::I64 => NativeSlot::I64(0),
            AbiType::U64 => NativeSlot::U64(0),
            AbiType::F32 => NativeSlot::F32(0.0),
            AbiType::F64 => NativeSlot::F64(0.0),
            AbiType::Pointer => NativeSlot::Ptr(std::ptr::null_mut()),
        }
    }

    /// Borrows the payload as an untyped libffi argument. The slot must
    /// outlive the call that consumes the `Arg`.
    pub fn as_arg(&self) -> Arg {
        match self {
            NativeSlot::I8(v) => Arg::new(v),
            NativeSlot::U8(v) => Arg::new(v),
            NativeSlot::I16(v) => Arg::new(v),
            NativeSlot::U16(v) => Arg::new(v),
            NativeSlot::I32(v) => Arg::new(v),
            NativeSlot::U32(v) => Arg::new(v),
            NativeSlot::I64(v) => Arg::new(v),
            NativeSlot::U64(v) => Arg::new(v),
            NativeSlot::F32(v) => Arg::new(v),
            NativeSlot::F64(v) => Arg::new(v),
            NativeSlot::Ptr(v) => Arg::new(v),
        }
    }

    /// Pointer to the payload, for use as a caller-allocated result slot.
    pub fn as_mut_ptr(&mut self) -> *mut c_void {
        match self {
            NativeSlot::I8(v) => v as *mut i8 as *mut c_void,
            NativeSlot::U8(v) => v as *mut u8 as *mut c_void,
            NativeSlot::I16(v) => v as *mut i16 as *mut c_void,
            NativeSlot::U16(v) => v as *mut u16 as *mut c_void,
            NativeSlot::I32(v) => v as *mut i32 as *mut c_void,
            NativeSlot::U32(v) => v as *mut u32 as *mut c_void,
            NativeSlot::I64(v) => v as *mut i64 as *mut c_void,
            NativeSlot::U64(v) => v as *mut u64 as *mut c_void,
            NativeSlot::F32(v) => v as *mut f32 as *mut c_void,
            NativeSlot::F64(v) => v as *mut f64 as *mut c_void,
            NativeSlot::Ptr(v) => v as *mut *mut c_void as *mut c_void,
        }
    }

    /// Writes the payload through a caller-provided result pointer.
    ///
    /// # Safety
    /// `dest` must point to storage of this slot's ABI type.
    pub unsafe fn write_to(&self, dest: *mut c_void) {
        match *self {
            NativeSlot::I8(v) => *(dest as *mut i8) = v,
            NativeSlot::U8(v) => *(dest as *mut u8) = v,
            NativeSlot::I16(v) => *(dest as *mut i16) = v,
            NativeSlot::U16(v) => *(dest as *mut u16) = v,
            NativeSlot::I32(v) => *(dest as *mut i32) = v,
            NativeSlot::U32(v) => *(dest as *mut u32) = v,
            NativeSlot::I64(v) => *(dest as *mut i64) = v,
            NativeSlot::U64(v) => *(dest as *mut u64) = v,
            NativeSlot::F32(v) => *(dest as *mut f32) = v,
            NativeSlot::F64(v) => *(dest as *mut f64) = v,
            NativeSlot::Ptr(v) => *(dest as *mut *mut c_void) = v,
        }
    }
}

/// The closed set of scalar shapes a value can take at the native boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AbiType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    Pointer,
}

impl AbiType {
    pub fn libffi_type(self) -> Type {
        match self {
            AbiType::I8 => Type::i8(),
            AbiType::U8 => Type::u8(),
            AbiType::I16 => Type::i16(),
            AbiType::U16 => Type::u16(),
            AbiType::I32 => Type::i32(),
            AbiType::U32 => Type::u32(),
            AbiType::I64 => Type::i64(),
            AbiType::U64 => Type::u64(),
            AbiType::F32 => Type::f32(),
            AbiType::F64 => Type::f64(),
            AbiType::Pointer => Type::pointer(),
        }
    }

    /// Reads one incoming argument from a libffi argument pointer.
    ///
    /// # Safety
    /// `p` must point to live argument storage of this ABI type, as handed to
    /// a closure by libffi.
    pub unsafe fn read_slot(self, p: *const c_void) -> NativeSlot {
        match self {
            AbiType::I8 => NativeSlot::I8(*(p as *const i8)),
            AbiType::U8 => NativeSlot::U8(*(p as *const u8)),
            AbiType::I16 => NativeSlot::I16(*(p as *const i16)),
            AbiType::U16 => NativeSlot::U16(*(p as *const u16)),
            AbiType::I32 => NativeSlot::I32(*(p as *const i32)),
            AbiType::U32 => NativeSlot::U32(*(p as *const u32)),
            AbiType::I64 => NativeSlot::I64(*(p as *const i64)),
            AbiType::U64 => NativeSlot::U64(*(p as *const u64)),
            AbiType::F32 => NativeSlot::F32(*(p as *const f32)),
            AbiType::F64 => NativeSlot::F64(*(p as *const f64)),
            AbiType::Pointer => NativeSlot::Ptr(*(p as *const *mut c_void)),
        }
    }
}
