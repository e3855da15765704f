//! Purpose: Wrap-and-forward access to the host's `SetEventCallbacks` entry point.
//! Exports: `RegistrationTarget`, `FunctionSlot`.
//! Role: Seam between the coordinator and the JVMTI function table.
//! Invariants: `FunctionSlot` remembers the original entry point before any substitution.
//! Invariants: `restore` writes back exactly the captured original.
use std::os::raw::c_void;
use std::ptr;

use crate::core::error::{Error, ErrorKind};
use crate::core::jvmti::{
    SET_EVENT_CALLBACKS_INDEX, SetEventCallbacksFn, jint, jvmtiEnv, jvmtiError, jvmtiEventCallbacks,
};

/// Where intercepted registrations are forwarded to.
pub trait RegistrationTarget: Send + Sync {
    /// Calls the host's real registration function.
    ///
    /// # Safety
    /// Arguments must satisfy the host's `SetEventCallbacks` contract.
    unsafe fn forward(
        &self,
        env: *mut jvmtiEnv,
        callbacks: *const jvmtiEventCallbacks,
        size_of_callbacks: jint,
    ) -> jvmtiError;

    /// Puts the original entry point back. No-op for targets that never substituted it.
    fn restore(&self) {}
}

/// The `SetEventCallbacks` entry of a live JVMTI function table.
#[derive(Clone, Debug)]
pub struct FunctionSlot {
    slot: *mut *const c_void,
    original: SetEventCallbacksFn,
}

// SAFETY: the slot points into the process-global JVMTI function table.
unsafe impl Send for FunctionSlot {}
unsafe impl Sync for FunctionSlot {}

impl FunctionSlot {
    /// Captures the current `SetEventCallbacks` of `env`'s function table.
    ///
    /// # Safety
    /// `env` must be a valid JVMTI environment pointer.
    pub unsafe fn capture(env: *mut jvmtiEnv) -> Result<Self, Error> {
        if env.is_null() {
            return Err(Error::new(ErrorKind::Usage).with_message("jvmti env is null"));
        }
        let table = unsafe { *env } as *mut *const c_void;
        if table.is_null() {
            return Err(Error::new(ErrorKind::Internal).with_message("jvmti function table is null"));
        }
        let slot = unsafe { table.add(SET_EVENT_CALLBACKS_INDEX) };
        let current = unsafe { ptr::read_volatile(slot) };
        if current.is_null() {
            return Err(Error::new(ErrorKind::Internal)
                .with_message("SetEventCallbacks function pointer is null"));
        }
        // SAFETY: non-null entries of this slot have the SetEventCallbacks signature.
        let original = unsafe { std::mem::transmute::<*const c_void, SetEventCallbacksFn>(current) };
        Ok(Self { slot, original })
    }

    /// Installs `replacement` as the entry point seen by every agent.
    pub fn install(&self, replacement: SetEventCallbacksFn) {
        unsafe { ptr::write_volatile(self.slot, replacement as *const c_void) };
    }

    pub fn current(&self) -> *const c_void {
        unsafe { ptr::read_volatile(self.slot) }
    }
}

impl RegistrationTarget for FunctionSlot {
    unsafe fn forward(
        &self,
        env: *mut jvmtiEnv,
        callbacks: *const jvmtiEventCallbacks,
        size_of_callbacks: jint,
    ) -> jvmtiError {
        unsafe { (self.original)(env, callbacks, size_of_callbacks) }
    }

    fn restore(&self) {
        self.install(self.original);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::jvmti::{JVMTI_ERROR_INTERNAL, JVMTI_ERROR_NONE, jvmtiInterface_1};

    unsafe extern "system" fn real_set_event_callbacks(
        _env: *mut jvmtiEnv,
        _callbacks: *const jvmtiEventCallbacks,
        _size: jint,
    ) -> jvmtiError {
        JVMTI_ERROR_NONE
    }

    unsafe extern "system" fn replacement(
        _env: *mut jvmtiEnv,
        _callbacks: *const jvmtiEventCallbacks,
        _size: jint,
    ) -> jvmtiError {
        JVMTI_ERROR_INTERNAL
    }

    fn fake_table() -> Vec<*const c_void> {
        let mut table = vec![ptr::null::<c_void>(); SET_EVENT_CALLBACKS_INDEX + 8];
        table[SET_EVENT_CALLBACKS_INDEX] = real_set_event_callbacks as *const c_void;
        table
    }

    #[test]
    fn capture_install_restore_round_trip() {
        let mut table = fake_table();
        let mut env: jvmtiEnv = table.as_mut_ptr() as *const jvmtiInterface_1;
        let slot = unsafe { FunctionSlot::capture(&mut env) }.expect("capture");

        slot.install(replacement);
        assert_eq!(slot.current(), replacement as *const c_void);
        assert_eq!(
            unsafe { slot.forward(&mut env, ptr::null(), 0) },
            JVMTI_ERROR_NONE,
            "forwarding must reach the captured original"
        );

        slot.restore();
        assert_eq!(slot.current(), real_set_event_callbacks as *const c_void);
        assert_eq!(table[SET_EVENT_CALLBACKS_INDEX], real_set_event_callbacks as *const c_void);
    }

    #[test]
    fn capture_rejects_null_entry_points() {
        let mut table = vec![ptr::null::<c_void>(); SET_EVENT_CALLBACKS_INDEX + 1];
        let mut env: jvmtiEnv = table.as_mut_ptr() as *const jvmtiInterface_1;
        let err = unsafe { FunctionSlot::capture(&mut env) }.expect_err("null slot");
        assert_eq!(err.kind(), ErrorKind::Internal);

        let err = unsafe { FunctionSlot::capture(ptr::null_mut()) }.expect_err("null env");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }
}
