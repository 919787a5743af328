//! Reference-counted native string handles.
//!
//! Creation and destruction are explicit, never garbage-collected: every
//! handle produced by [`HString::create`] or [`HString::duplicate`] must be
//! paired with exactly one [`HString::delete`]. The null handle represents
//! the empty string, matching `WindowsCreateString` semantics. Reference
//! counts are atomic because trampolines run on arbitrary threads.

use std::ffi::c_void;
use std::ptr;
use std::sync::atomic::{fence, AtomicUsize, Ordering};

struct HStringData {
    refs: AtomicUsize,
    chars: Vec<u16>,
}

/// An opaque handle to a reference-counted UTF-16 string buffer.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct HString(*mut HStringData);

// The buffer is immutable after creation and the count is atomic.
unsafe impl Send for HString {}
unsafe impl Sync for HString {}

impl HString {
    pub const NULL: HString = HString(ptr::null_mut());

    /// Allocates a new handle with a reference count of one. The empty
    /// string allocates nothing and yields the null handle.
    pub fn create(text: &str) -> HString {
        if text.is_empty() {
            return HString::NULL;
        }
        let data = Box::new(HStringData {
            refs: AtomicUsize::new(1),
            chars: text.encode_utf16().collect(),
        });
        HString(Box::into_raw(data))
    }

    /// Takes an additional reference. Returns the same handle value.
    pub fn duplicate(self) -> HString {
        if !self.0.is_null() {
            unsafe { &(*self.0).refs }.fetch_add(1, Ordering::Relaxed);
        }
        self
    }

    /// Releases one reference, freeing the buffer when the count hits zero.
    /// Deleting the null handle is a no-op.
    pub fn delete(self) {
        if self.0.is_null() {
            return;
        }
        if unsafe { &(*self.0).refs }.fetch_sub(1, Ordering::Release) == 1 {
            fence(Ordering::Acquire);
            drop(unsafe { Box::from_raw(self.0) });
        }
    }

    /// Copies the buffer out without touching the reference count.
    pub fn as_string(self) -> String {
        if self.0.is_null() {
            return String::new();
        }
        String::from_utf16_lossy(unsafe { &(*self.0).chars })
    }

    pub fn len(self) -> usize {
        if self.0.is_null() {
            0
        } else {
            unsafe { &(*self.0).chars }.len()
        }
    }

    pub fn is_empty(self) -> bool {
        self.len() == 0
    }

    pub fn is_null(self) -> bool {
        self.0.is_null()
    }

    pub fn as_ptr(self) -> *mut c_void {
        self.0 as *mut c_void
    }

    /// Reinterprets a raw ABI pointer as a handle.
    ///
    /// # Safety
    /// `p` must be null or a pointer previously produced by [`HString::as_ptr`]
    /// on a still-live handle.
    pub unsafe fn from_raw(p: *mut c_void) -> HString {
        HString(p as *mut HStringData)
    }

    /// Current reference count; zero for the null handle. Test hook.
    pub fn ref_count(self) -> usize {
        if self.0.is_null() {
            0
        } else {
            unsafe { &(*self.0).refs }.load(Ordering::Relaxed)
        }
    }
}
