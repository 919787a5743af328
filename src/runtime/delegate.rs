//! Live delegate machinery: trampolines wrapping managed callbacks behind a
//! native function pointer, and proxies invoking native delegates from the
//! managed side.
//!
//! Both directions share the same calling convention: the first argument is
//! the instance pointer, marshalled parameters follow, non-void delegates
//! take a trailing caller-allocated result slot, and the native return value
//! is always an HRESULT.

use crate::error::RuntimeError;
use crate::marshal::{Lowered, Marshal, MarshallerRegistry, Ownership, Strategy};
use crate::project::DelegateProjection;
use crate::runtime::{AbiType, HResult, NativeSlot, Value};
use libffi::low::ffi_cif;
use libffi::middle::{Arg, Cif, Closure, CodePtr, Type};
use std::ffi::c_void;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// The managed side of a delegate: lifted arguments in, optional value out.
pub type ManagedCallback = dyn Fn(&[Value]) -> Option<Value> + Send + Sync;

/// Per-slot marshalling plan, fixed at construction.
#[derive(Clone, Copy, Debug)]
struct ParamPlan {
    abi: AbiType,
    strategy: Strategy,
}

struct CallbackState {
    params: Vec<ParamPlan>,
    ret: Option<ParamPlan>,
    callback: Box<ManagedCallback>,
}

/// A managed callback made callable from native code.
///
/// The instance owns the closure and its state together; the function pointer
/// from [`DelegateInstance::code_ptr`] stays valid exactly as long as the
/// instance lives.
pub struct DelegateInstance {
    // Field order matters: the closure borrows `state` and must drop first.
    closure: Closure<'static>,
    state: Box<CallbackState>,
    cif: Cif,
}

impl DelegateInstance {
    pub fn new(
        projection: &DelegateProjection,
        registry: &MarshallerRegistry,
        callback: Box<ManagedCallback>,
    ) -> Result<Self, RuntimeError> {
        let params = projection
            .params
            .iter()
            .map(|p| {
                Ok(ParamPlan {
                    abi: p.abi,
                    strategy: *registry
                        .for_category(p.category)
                        .map_err(|_| RuntimeError::TypeMismatch("unmarshallable parameter"))?,
                })
            })
            .collect::<Result<Vec<_>, RuntimeError>>()?;
        let ret = projection
            .return_param
            .as_ref()
            .map(|r| {
                Ok::<ParamPlan, RuntimeError>(ParamPlan {
                    abi: r.abi,
                    strategy: *registry
                        .for_category(r.category)
                        .map_err(|_| RuntimeError::TypeMismatch("unmarshallable return"))?,
                })
            })
            .transpose()?;

        let mut arg_types = vec![Type::pointer()];
        arg_types.extend(params.iter().map(|p| p.abi.libffi_type()));
        if ret.is_some() {
            arg_types.push(Type::pointer());
        }
        let cif = Cif::new(arg_types, Type::i32());

        let state = Box::new(CallbackState {
            params,
            ret,
            callback,
        });
        // The box gives the state a stable address for the closure's lifetime;
        // the instance keeps both alive together.
        let state_ref: &'static CallbackState =
            unsafe { &*(state.as_ref() as *const CallbackState) };
        let closure = Closure::new(cif.clone(), invoke_trampoline, state_ref);

        Ok(DelegateInstance {
            closure,
            state,
            cif,
        })
    }

    /// The native entry point for this delegate instance.
    pub fn code_ptr(&self) -> CodePtr {
        CodePtr::from_fun(*self.closure.code_ptr())
    }

    /// Builds a proxy that round-trips through this instance's own entry
    /// point, passing `this` as the instance pointer.
    pub fn proxy(&self, this: *mut c_void) -> DelegateProxy {
        DelegateProxy {
            cif: self.cif.clone(),
            invoke: self.code_ptr(),
            this,
            params: self.state.params.clone(),
            ret: self.state.ret,
        }
    }
}

/// The native-facing entry point. Panics in the managed callback must not
/// unwind across the ABI, so they are caught and reported as a failure code.
unsafe extern "C" fn invoke_trampoline(
    _cif: &ffi_cif,
    result: &mut i32,
    args: *const *const c_void,
    state: &CallbackState,
) {
    let outcome = catch_unwind(AssertUnwindSafe(|| dispatch(state, args)));
    *result = match outcome {
        Ok(Ok(())) => HResult::OK.0,
        Ok(Err(_)) | Err(_) => HResult::CALLBACK_FAILURE.0,
    };
}

unsafe fn dispatch(
    state: &CallbackState,
    args: *const *const c_void,
) -> Result<(), RuntimeError> {
    // args[0] is the instance pointer, which the managed callback never sees.
    let mut lifted = Vec::with_capacity(state.params.len());
    for (i, plan) in state.params.iter().enumerate() {
        let slot = plan.abi.read_slot(*args.add(1 + i));
        lifted.push(plan.strategy.lift(&slot)?);
    }

    let returned = (state.callback)(&lifted);

    if let Some(ret) = &state.ret {
        let out = *(*args.add(1 + state.params.len()) as *const *mut c_void);
        let value = returned.ok_or(RuntimeError::MissingReturnValue)?;
        // ownership of an owned lowering transfers to the caller
        let lowered = ret.strategy.lower(&value)?;
        lowered.slot.write_to(out);
    }
    Ok(())
}

fn release_owned(params: &[ParamPlan], lowered: &[Lowered]) {
    for (plan, l) in params.iter().zip(lowered) {
        if l.ownership == Ownership::Owned {
            plan.strategy.release(&l.slot);
        }
    }
}

/// A managed-side caller for a native delegate function pointer.
pub struct DelegateProxy {
    cif: Cif,
    invoke: CodePtr,
    this: *mut c_void,
    params: Vec<ParamPlan>,
    ret: Option<ParamPlan>,
}

impl DelegateProxy {
    pub fn new(
        projection: &DelegateProjection,
        registry: &MarshallerRegistry,
        invoke: CodePtr,
        this: *mut c_void,
    ) -> Result<Self, RuntimeError> {
        let params = projection
            .params
            .iter()
            .map(|p| {
                Ok(ParamPlan {
                    abi: p.abi,
                    strategy: *registry
                        .for_category(p.category)
                        .map_err(|_| RuntimeError::TypeMismatch("unmarshallable parameter"))?,
                })
            })
            .collect::<Result<Vec<_>, RuntimeError>>()?;
        let ret = projection
            .return_param
            .as_ref()
            .map(|r| {
                Ok::<ParamPlan, RuntimeError>(ParamPlan {
                    abi: r.abi,
                    strategy: *registry
                        .for_category(r.category)
                        .map_err(|_| RuntimeError::TypeMismatch("unmarshallable return"))?,
                })
            })
            .transpose()?;

        let mut arg_types = vec![Type::pointer()];
        arg_types.extend(params.iter().map(|p| p.abi.libffi_type()));
        if ret.is_some() {
            arg_types.push(Type::pointer());
        }

        Ok(DelegateProxy {
            cif: Cif::new(arg_types, Type::i32()),
            invoke,
            this,
            params,
            ret,
        })
    }

    /// Lowers the arguments, performs the native call, checks the returned
    /// status and lifts the result.
    pub fn invoke(&self, args: &[Value]) -> Result<Option<Value>, RuntimeError> {
        if args.len() != self.params.len() {
            return Err(RuntimeError::ArityMismatch {
                expected: self.params.len(),
                actual: args.len(),
            });
        }

        // A failure partway through lowering still releases the owned prefix.
        let mut lowered = Vec::with_capacity(self.params.len());
        for (plan, value) in self.params.iter().zip(args) {
            match plan.strategy.lower(value) {
                Ok(l) => lowered.push(l),
                Err(e) => {
                    release_owned(&self.params, &lowered);
                    return Err(e);
                }
            }
        }

        let mut ret_slot = self.ret.map(|r| NativeSlot::zeroed(r.abi));
        let ret_ptr = ret_slot.as_mut().map(|s| s.as_mut_ptr());

        let mut ffi_args = Vec::with_capacity(lowered.len() + 2);
        ffi_args.push(Arg::new(&self.this));
        ffi_args.extend(lowered.iter().map(|l| l.slot.as_arg()));
        if let Some(p) = &ret_ptr {
            ffi_args.push(Arg::new(p));
        }

        let hr: i32 = unsafe { self.cif.call(self.invoke, &ffi_args) };

        release_owned(&self.params, &lowered);
        HResult(hr).ok()?;

        match (self.ret, ret_slot) {
            (Some(plan), Some(slot)) => {
                let value = plan.strategy.lift(&slot)?;
                // the callee handed ownership back through the slot
                if plan.strategy.native_ownership() == Ownership::Owned {
                    plan.strategy.release(&slot);
                }
                Ok(Some(value))
            }
            _ => Ok(None),
        }
    }
}
