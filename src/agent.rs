//! Purpose: Agent lifecycle and the C entry points the JVM calls (`Agent_OnLoad`, `Agent_OnUnload`).
//! Exports: `Agent_OnLoad`, `Agent_OnUnload`, `load`, `unload`, `state`, `active`, `LifecycleState`.
//! Role: Owns the single active `Coordinator` and the intercepted `SetEventCallbacks`.
//! Invariants: At most one coordinator is active per process; a second load is rejected untouched.
//! Invariants: `Active` is entered only after the registration entry point is substituted.
//! Invariants: Unload restores the captured entry point before the coordinator is withdrawn.
#![allow(non_snake_case)]

use std::ffi::CStr;
use std::os::raw::{c_char, c_void};
use std::path::PathBuf;
use std::ptr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::coordinator::Coordinator;
use crate::core::diff::DiffChannel;
use crate::core::error::{Error, ErrorKind};
use crate::core::host::FunctionSlot;
use crate::core::jvmti::{
    JNI_ERR, JNI_OK, JVMTI_ERROR_INTERNAL, JVMTI_VERSION_1_2, JavaVM, jint, jvmtiEnv, jvmtiError,
    jvmtiEventCallbacks,
};
use crate::core::options::{self, Directive, Parsed};
use crate::core::trampoline::{CAPACITY, HookEvent};
use crate::logging;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum LifecycleState {
    Unloaded = 0,
    Loading = 1,
    Active = 2,
}

impl LifecycleState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => LifecycleState::Loading,
            2 => LifecycleState::Active,
            _ => LifecycleState::Unloaded,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LoadOutcome {
    Activated,
    HelpShown,
}

static STATE: AtomicU8 = AtomicU8::new(LifecycleState::Unloaded as u8);
static ACTIVE: RwLock<Option<Arc<Coordinator>>> = RwLock::new(None);

pub fn state() -> LifecycleState {
    LifecycleState::from_u8(STATE.load(Ordering::Acquire))
}

/// The coordinator installed by the current load, if any.
pub fn active() -> Option<Arc<Coordinator>> {
    ACTIVE
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

fn set_active(coordinator: Option<Arc<Coordinator>>) -> Option<Arc<Coordinator>> {
    let mut guard = ACTIVE.write().unwrap_or_else(PoisonError::into_inner);
    std::mem::replace(&mut *guard, coordinator)
}

/// Called by every trampoline.
///
/// # Safety
/// `event` must carry the pointers the host delivered for a live ClassFileLoadHook event.
pub(crate) unsafe fn dispatch_active(ordinal: usize, event: HookEvent) {
    match active() {
        Some(coordinator) => unsafe { coordinator.dispatch(ordinal, event) },
        None => tracing::error!(ordinal, "ClassFileLoadHook delivered with no active coordinator"),
    }
}

unsafe extern "system" fn intercepted_set_event_callbacks(
    env: *mut jvmtiEnv,
    callbacks: *const jvmtiEventCallbacks,
    size_of_callbacks: jint,
) -> jvmtiError {
    match active() {
        Some(coordinator) => unsafe { coordinator.intercept(env, callbacks, size_of_callbacks) },
        None => {
            tracing::error!("SetEventCallbacks intercepted with no active coordinator");
            JVMTI_ERROR_INTERNAL
        }
    }
}

/// Activates the coordinator for `vm`.
///
/// # Safety
/// `vm` must be the `JavaVM` handed to `Agent_OnLoad`.
pub unsafe fn load(vm: *mut JavaVM, options: Option<&str>) -> Result<LoadOutcome, Error> {
    if STATE
        .compare_exchange(
            LifecycleState::Unloaded as u8,
            LifecycleState::Loading as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        )
        .is_err()
    {
        return Err(Error::new(ErrorKind::AlreadyActive).with_message(
            "agent is already loaded; each JVM process should load it only once",
        ));
    }

    let result = unsafe { activate(vm, options) };
    let next = match result {
        Ok(LoadOutcome::Activated) => LifecycleState::Active,
        _ => LifecycleState::Unloaded,
    };
    STATE.store(next as u8, Ordering::Release);
    result
}

unsafe fn activate(vm: *mut JavaVM, options: Option<&str>) -> Result<LoadOutcome, Error> {
    let parsed = match options::from_env(options) {
        Directive::Help => {
            println!("{}", options::usage());
            return Ok(LoadOutcome::HelpShown);
        }
        Directive::Activate(parsed) => parsed,
    };
    logging::init(parsed.options.verbosity);
    log_configuration(&parsed);

    let channel = DiffChannel::create(&std::env::temp_dir(), std::process::id())?;
    tracing::debug!(trampolines = CAPACITY, "dispatch table ready");

    let slot = match unsafe { jvmti_env(vm) }.and_then(|env| unsafe { FunctionSlot::capture(env) })
    {
        Ok(slot) => slot,
        Err(err) => {
            let _ = channel.remove();
            return Err(err);
        }
    };

    let coordinator = Coordinator::new(parsed.options, channel, Box::new(slot.clone()));
    set_active(Some(Arc::new(coordinator)));
    slot.install(intercepted_set_event_callbacks);

    tracing::info!("coordinator loaded");
    Ok(LoadOutcome::Activated)
}

fn log_configuration(parsed: &Parsed) {
    for issue in &parsed.issues {
        tracing::error!("{issue}");
    }
    let skip: Vec<&str> = parsed.options.skip.iter().collect();
    tracing::debug!(
        verbosity = ?parsed.options.verbosity,
        always = parsed.options.always_emit,
        skip = ?skip,
        dir = %public_dir().display(),
        "loading coordinator"
    );
}

unsafe fn jvmti_env(vm: *mut JavaVM) -> Result<*mut jvmtiEnv, Error> {
    if vm.is_null() || unsafe { (*vm).is_null() } {
        return Err(Error::new(ErrorKind::Usage).with_message("JavaVM is null"));
    }
    let get_env = unsafe { (**vm).GetEnv }
        .ok_or_else(|| Error::new(ErrorKind::Internal).with_message("JavaVM has no GetEnv"))?;
    let mut env: *mut c_void = ptr::null_mut();
    let rc = unsafe { get_env(vm, &mut env, JVMTI_VERSION_1_2) };
    if rc != JNI_OK || env.is_null() {
        return Err(Error::new(ErrorKind::Host)
            .with_code(rc)
            .with_message("unable to get JVMTI environment"));
    }
    Ok(env.cast())
}

/// Restores the host entry point, withdraws the coordinator, then removes the diff directories.
///
/// The entry point goes back first so no registration reaches the interceptor
/// once the coordinator is gone.
pub fn unload() -> Result<(), Error> {
    let result = match active() {
        Some(coordinator) => {
            coordinator.restore_host();
            set_active(None);
            coordinator.remove_records()
        }
        None => Ok(()),
    };
    STATE.store(LifecycleState::Unloaded as u8, Ordering::Release);
    result
}

/// Directory observers should poll for this process.
pub fn public_dir() -> PathBuf {
    crate::core::diff::dir_names(&std::env::temp_dir(), std::process::id()).0
}

#[unsafe(no_mangle)]
pub unsafe extern "system" fn Agent_OnLoad(
    vm: *mut JavaVM,
    options: *mut c_char,
    _reserved: *mut c_void,
) -> jint {
    let options = (!options.is_null())
        .then(|| unsafe { CStr::from_ptr(options) }.to_string_lossy().into_owned());
    match unsafe { load(vm, options.as_deref()) } {
        Ok(_) => JNI_OK,
        Err(err) => {
            tracing::error!("{err}");
            JNI_ERR
        }
    }
}

#[unsafe(no_mangle)]
pub unsafe extern "system" fn Agent_OnUnload(_vm: *mut JavaVM) {
    if let Err(err) = unload() {
        tracing::error!("unload incomplete: {err}");
    }
}
