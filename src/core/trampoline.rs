//! Purpose: Arena of statically distinct ClassFileLoadHook entry points, one per ordinal.
//! Exports: `CAPACITY`, `HookEvent`, `entry`.
//! Role: Recovers plugin identity from the callback address, since the hook signature has no user data.
//! Invariants: `entry(k)` is `trampoline::<k>`; the mapping is fixed at build time (see `build.rs`).
//! Invariants: Trampolines never unwind into the host; dispatch panics are caught and logged.
use std::os::raw::{c_char, c_uchar};
use std::panic::{AssertUnwindSafe, catch_unwind};

use crate::core::jvmti::{ClassFileLoadHookFn, JNIEnv, jclass, jint, jobject, jvmtiEnv};

/// Arguments of one ClassFileLoadHook delivery, captured verbatim.
#[derive(Clone, Copy, Debug)]
pub struct HookEvent {
    pub jvmti_env: *mut jvmtiEnv,
    pub jni_env: *mut JNIEnv,
    pub class_being_redefined: jclass,
    pub loader: jobject,
    pub name: *const c_char,
    pub protection_domain: jobject,
    pub class_data_len: jint,
    pub class_data: *const c_uchar,
    pub new_class_data_len: *mut jint,
    pub new_class_data: *mut *mut c_uchar,
}

impl HookEvent {
    /// Calls `callback` with exactly the arguments the host delivered.
    ///
    /// # Safety
    /// `callback` must be a valid ClassFileLoadHook and the pointers in `self`
    /// must be the ones the host handed to the trampoline for this event.
    pub unsafe fn forward_to(&self, callback: ClassFileLoadHookFn) {
        unsafe {
            callback(
                self.jvmti_env,
                self.jni_env,
                self.class_being_redefined,
                self.loader,
                self.name,
                self.protection_domain,
                self.class_data_len,
                self.class_data,
                self.new_class_data_len,
                self.new_class_data,
            )
        }
    }
}

unsafe extern "system" fn trampoline<const ORDINAL: usize>(
    jvmti_env: *mut jvmtiEnv,
    jni_env: *mut JNIEnv,
    class_being_redefined: jclass,
    loader: jobject,
    name: *const c_char,
    protection_domain: jobject,
    class_data_len: jint,
    class_data: *const c_uchar,
    new_class_data_len: *mut jint,
    new_class_data: *mut *mut c_uchar,
) {
    let event = HookEvent {
        jvmti_env,
        jni_env,
        class_being_redefined,
        loader,
        name,
        protection_domain,
        class_data_len,
        class_data,
        new_class_data_len,
        new_class_data,
    };
    let outcome = catch_unwind(AssertUnwindSafe(|| unsafe {
        crate::agent::dispatch_active(ORDINAL, event)
    }));
    if outcome.is_err() {
        tracing::error!(ordinal = ORDINAL, "dispatch panicked; event passed through");
    }
}

include!(concat!(env!("OUT_DIR"), "/trampolines.rs"));

/// Entry point bound to `ordinal`, or `None` past [`CAPACITY`].
pub fn entry(ordinal: usize) -> Option<ClassFileLoadHookFn> {
    TRAMPOLINES.get(ordinal).copied()
}
