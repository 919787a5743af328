//! Explicit activation context over the platform runtime library.
//!
//! All entry points hang off a [`WinRtActivation`] value the caller
//! constructs and threads through; nothing here touches process-global
//! state beyond what the platform calls themselves do.

use crate::error::RuntimeError;
use crate::guid::{AbiGuid, Guid};
use crate::runtime::strings::HString;
use crate::runtime::HResult;
use std::ffi::c_void;

type RoInitializeFn = unsafe extern "system" fn(init_type: i32) -> i32;
type RoActivateInstanceFn =
    unsafe extern "system" fn(class_id: *mut c_void, instance: *mut *mut c_void) -> i32;
type RoGetActivationFactoryFn = unsafe extern "system" fn(
    class_id: *mut c_void,
    iid: *const AbiGuid,
    factory: *mut *mut c_void,
) -> i32;

/// Threading model passed to runtime initialization.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApartmentType {
    SingleThreaded,
    MultiThreaded,
}

impl ApartmentType {
    fn raw(self) -> i32 {
        match self {
            ApartmentType::SingleThreaded => 0,
            ApartmentType::MultiThreaded => 1,
        }
    }
}

/// A loaded runtime library plus the activation entry points resolved from
/// it on demand.
pub struct WinRtActivation {
    library: libloading::Library,
}

impl WinRtActivation {
    /// Opens the default platform runtime library.
    pub fn open() -> Result<Self, RuntimeError> {
        Self::open_library("combase.dll")
    }

    /// Opens a specific library exposing the activation entry points.
    pub fn open_library(name: &str) -> Result<Self, RuntimeError> {
        let library = unsafe { libloading::Library::new(name) }?;
        Ok(WinRtActivation { library })
    }

    pub fn initialize(&self, apartment: ApartmentType) -> Result<(), RuntimeError> {
        let init: libloading::Symbol<RoInitializeFn> =
            unsafe { self.library.get(b"RoInitialize") }?;
        HResult(unsafe { init(apartment.raw()) }).ok()
    }

    /// Activates the named runtime class, returning its default interface
    /// pointer. The single reference belongs to the caller.
    pub fn activate_instance(&self, class_name: &str) -> Result<*mut c_void, RuntimeError> {
        let activate: libloading::Symbol<RoActivateInstanceFn> =
            unsafe { self.library.get(b"RoActivateInstance") }?;
        let class_id = HString::create(class_name);
        let mut instance: *mut c_void = std::ptr::null_mut();
        let hr = unsafe { activate(class_id.as_ptr(), &mut instance) };
        class_id.delete();
        HResult(hr).ok()?;
        if instance.is_null() {
            return Err(RuntimeError::NullInterface);
        }
        Ok(instance)
    }

    /// Retrieves the activation factory for the named runtime class through
    /// the requested interface.
    pub fn get_activation_factory(
        &self,
        class_name: &str,
        iid: &Guid,
    ) -> Result<*mut c_void, RuntimeError> {
        let get_factory: libloading::Symbol<RoGetActivationFactoryFn> =
            unsafe { self.library.get(b"RoGetActivationFactory") }?;
        let class_id = HString::create(class_name);
        let abi_iid = AbiGuid::from(*iid);
        let mut factory: *mut c_void = std::ptr::null_mut();
        let hr = unsafe { get_factory(class_id.as_ptr(), &abi_iid, &mut factory) };
        class_id.delete();
        HResult(hr).ok()?;
        if factory.is_null() {
            return Err(RuntimeError::NullInterface);
        }
        Ok(factory)
    }
}
