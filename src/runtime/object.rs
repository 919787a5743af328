//! Runtime objects and interface handles.
//!
//! Composed objects expose a fixed capability table populated at
//! construction: a mapping from interface identity to facet pointer. Looking
//! up an interface the object does not implement fails with a typed error
//! instead of a runtime type test.

use crate::error::RuntimeError;
use crate::guid::Guid;
use std::collections::HashMap;
use std::ffi::c_void;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// A reference-counted native object carrying its capability table.
///
/// Interface pointers exchanged across the ABI for such an object are the
/// object pointer itself (its primary facet); capability entries for
/// secondary interfaces conventionally point back into the same allocation.
pub struct ComObject {
    refs: AtomicUsize,
    capabilities: HashMap<Guid, *mut c_void>,
}

// The capability table is immutable after construction and the count is
// atomic.
unsafe impl Send for ComObject {}
unsafe impl Sync for ComObject {}

impl ComObject {
    pub fn new(capabilities: impl IntoIterator<Item = (Guid, *mut c_void)>) -> Self {
        ComObject {
            refs: AtomicUsize::new(1),
            capabilities: capabilities.into_iter().collect(),
        }
    }

    /// Moves the object to the heap and returns its raw interface pointer.
    /// The single reference it starts with belongs to the caller.
    pub fn into_raw(self) -> *mut c_void {
        Box::into_raw(Box::new(self)) as *mut c_void
    }

    pub fn query(&self, iid: &Guid) -> Result<*mut c_void, RuntimeError> {
        self.capabilities
            .get(iid)
            .copied()
            .ok_or(RuntimeError::CapabilityNotPresent { iid: *iid })
    }

    /// # Safety
    /// `p` must be a pointer produced by [`ComObject::into_raw`] that has not
    /// yet dropped its last reference.
    pub unsafe fn add_ref_raw(p: *mut c_void) -> usize {
        let obj = &*(p as *const ComObject);
        obj.refs.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Releases one reference, dropping the object at zero.
    ///
    /// # Safety
    /// Same contract as [`ComObject::add_ref_raw`]; the pointer must not be
    /// used again if this returns zero.
    pub unsafe fn release_raw(p: *mut c_void) -> usize {
        let obj = &*(p as *const ComObject);
        let remaining = obj.refs.fetch_sub(1, Ordering::Release) - 1;
        if remaining == 0 {
            std::sync::atomic::fence(Ordering::Acquire);
            drop(Box::from_raw(p as *mut ComObject));
        }
        remaining
    }
}

static WRAP_COUNTER: AtomicU64 = AtomicU64::new(1);

/// The managed representation of an interface-typed value: a borrowed wrap
/// around a bare pointer.
///
/// Wrapping performs no identity caching: every `from_raw` yields a fresh
/// handle with its own `wrap_id`, so two marshals of the same raw pointer are
/// observably distinct instances. Equality compares the raw pointer only.
#[derive(Clone, Debug)]
pub struct InterfaceHandle {
    raw: *mut c_void,
    wrap_id: u64,
}

unsafe impl Send for InterfaceHandle {}
unsafe impl Sync for InterfaceHandle {}

impl InterfaceHandle {
    pub fn from_raw(raw: *mut c_void) -> Self {
        InterfaceHandle {
            raw,
            wrap_id: WRAP_COUNTER.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn null() -> Self {
        Self::from_raw(std::ptr::null_mut())
    }

    pub fn as_raw(&self) -> *mut c_void {
        self.raw
    }

    pub fn is_null(&self) -> bool {
        self.raw.is_null()
    }

    /// Distinguishes wrapper instances that share a raw pointer.
    pub fn wrap_id(&self) -> u64 {
        self.wrap_id
    }

    /// Re-queries the underlying object for another interface off the same
    /// identity, via its capability table.
    ///
    /// # Safety
    /// The handle must be null or wrap a pointer produced by
    /// [`ComObject::into_raw`] that has not yet dropped its last reference.
    /// Facet handles returned by a previous query satisfy this only if their
    /// capability entries point back at the object.
    pub unsafe fn query(&self, iid: &Guid) -> Result<InterfaceHandle, RuntimeError> {
        if self.raw.is_null() {
            return Err(RuntimeError::NullInterface);
        }
        let obj = &*(self.raw as *const ComObject);
        obj.query(iid).map(InterfaceHandle::from_raw)
    }
}

impl PartialEq for InterfaceHandle {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for InterfaceHandle {}
