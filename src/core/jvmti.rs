//! Purpose: Raw JNI/JVMTI ABI declarations for the entry points the agent touches.
//! Exports: JNI/JVMTI scalar types, status constants, table indices, callback signatures, `JNIInvokeInterface`.
//! Role: Single source of host layout facts for the rest of the crate.
//! Invariants: Function tables are opaque and addressed by index; only used slots are modelled.
//! Invariants: Callback signatures use the `system` ABI.
#![allow(non_camel_case_types, non_snake_case)]

use std::os::raw::{c_char, c_uchar, c_void};

pub type jint = i32;
pub type jobject = *mut c_void;
pub type jclass = jobject;
pub type jvmtiError = jint;

pub const JNI_OK: jint = 0;
pub const JNI_ERR: jint = -1;
pub const JNI_EVERSION: jint = -3;

pub const JVMTI_VERSION_1_2: jint = 0x3001_0200;

pub const JVMTI_ERROR_NONE: jvmtiError = 0;
pub const JVMTI_ERROR_NULL_POINTER: jvmtiError = 100;
pub const JVMTI_ERROR_ILLEGAL_ARGUMENT: jvmtiError = 103;
pub const JVMTI_ERROR_OUT_OF_MEMORY: jvmtiError = 110;
pub const JVMTI_ERROR_INTERNAL: jvmtiError = 113;

/// Opaque JNI thread environment; only passed through to plugins.
#[repr(C)]
pub struct JNIEnv {
    _private: [u8; 0],
}

/// Opaque JVMTI function table. Entries are addressed by index, see
/// [`SET_EVENT_CALLBACKS_INDEX`].
#[repr(C)]
pub struct jvmtiInterface_1 {
    _private: [u8; 0],
}

pub type jvmtiEnv = *const jvmtiInterface_1;

/// Zero-based index of `SetEventCallbacks` in `jvmtiInterface_1`
/// (function position 122, position 1 being reserved).
pub const SET_EVENT_CALLBACKS_INDEX: usize = 121;

/// Zero-based index of `ClassFileLoadHook` in `jvmtiEventCallbacks`
/// (event 54; callbacks start at event 50, `VMInit`).
pub const CLASS_FILE_LOAD_HOOK_INDEX: usize = 4;

/// Opaque `jvmtiEventCallbacks`. Its length is version dependent and always
/// travels with an explicit `size_of_callbacks`.
#[repr(C)]
pub struct jvmtiEventCallbacks {
    _private: [u8; 0],
}

pub type ClassFileLoadHookFn = unsafe extern "system" fn(
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
);

pub type SetEventCallbacksFn = unsafe extern "system" fn(
    env: *mut jvmtiEnv,
    callbacks: *const jvmtiEventCallbacks,
    size_of_callbacks: jint,
) -> jvmtiError;

#[repr(C)]
pub struct JNIInvokeInterface {
    pub reserved0: *mut c_void,
    pub reserved1: *mut c_void,
    pub reserved2: *mut c_void,
    pub DestroyJavaVM: Option<unsafe extern "system" fn(vm: *mut JavaVM) -> jint>,
    pub AttachCurrentThread: Option<
        unsafe extern "system" fn(vm: *mut JavaVM, penv: *mut *mut c_void, args: *mut c_void) -> jint,
    >,
    pub DetachCurrentThread: Option<unsafe extern "system" fn(vm: *mut JavaVM) -> jint>,
    pub GetEnv: Option<
        unsafe extern "system" fn(vm: *mut JavaVM, penv: *mut *mut c_void, version: jint) -> jint,
    >,
    pub AttachCurrentThreadAsDaemon: Option<
        unsafe extern "system" fn(vm: *mut JavaVM, penv: *mut *mut c_void, args: *mut c_void) -> jint,
    >,
}

pub type JavaVM = *const JNIInvokeInterface;
