//! Purpose: Registration interceptor and dispatch handler for multiplexed ClassFileLoadHook callbacks.
//! Exports: `Coordinator`.
//! Role: Owns options, plugin records, the diff channel, and the forwarding target for one load.
//! Invariants: Each plugin gets its own ordinal and trampoline; dispatch calls only that plugin.
//! Invariants: Dispatch-time failures are logged and never reach the host.
//! Invariants: A registration the host rejects gives its ordinal back.
//! Invariants: Skip-listed plugins are never invoked and never produce records.
use std::ffi::CStr;
use std::os::raw::c_void;

use crate::core::callbacks::CallbackTable;
use crate::core::diff::{DiffChannel, DiffRecord};
use crate::core::error::{Error, ErrorKind, to_jvmti_error};
use crate::core::host::RegistrationTarget;
use crate::core::jvmti::{
    JVMTI_ERROR_NONE, JVMTI_ERROR_NULL_POINTER, jint, jvmtiEnv, jvmtiError, jvmtiEventCallbacks,
};
use crate::core::naming;
use crate::core::options::{Options, truncate_name};
use crate::core::table::{PluginRecord, PluginTable};
use crate::core::trampoline::{self, CAPACITY, HookEvent};

pub struct Coordinator {
    options: Options,
    table: PluginTable,
    channel: DiffChannel,
    host: Box<dyn RegistrationTarget>,
}

impl Coordinator {
    pub fn new(options: Options, channel: DiffChannel, host: Box<dyn RegistrationTarget>) -> Self {
        Self::with_capacity(options, channel, host, CAPACITY)
    }

    /// Like [`Coordinator::new`] with fewer usable ordinals; capped at [`CAPACITY`].
    pub fn with_capacity(
        options: Options,
        channel: DiffChannel,
        host: Box<dyn RegistrationTarget>,
        capacity: usize,
    ) -> Self {
        Self {
            options,
            table: PluginTable::with_capacity(capacity.min(CAPACITY)),
            channel,
            host,
        }
    }

    pub fn channel(&self) -> &DiffChannel {
        &self.channel
    }

    pub fn registered_count(&self) -> usize {
        self.table.registered_count()
    }

    pub fn plugin(&self, ordinal: usize) -> Option<&PluginRecord> {
        self.table.get(ordinal)
    }

    pub fn plugins(&self) -> impl Iterator<Item = &PluginRecord> {
        self.table.records()
    }

    /// Intercepted `SetEventCallbacks`.
    ///
    /// Tables without a ClassFileLoadHook pass through untouched.
    ///
    /// # Safety
    /// Arguments must satisfy the host's `SetEventCallbacks` contract.
    pub unsafe fn intercept(
        &self,
        env: *mut jvmtiEnv,
        callbacks: *const jvmtiEventCallbacks,
        size_of_callbacks: jint,
    ) -> jvmtiError {
        let hook = unsafe { CallbackTable::copy_from(callbacks, size_of_callbacks) }
            .and_then(|table| table.class_file_load_hook());
        let Some(hook) = hook else {
            return unsafe { self.host.forward(env, callbacks, size_of_callbacks) };
        };
        let name = naming::resolve_plugin_name(hook as *const c_void);
        match unsafe { self.register(&name, env, callbacks, size_of_callbacks) } {
            Ok(_) => JVMTI_ERROR_NONE,
            Err(err) => to_jvmti_error(&err),
        }
    }

    /// Binds the table's ClassFileLoadHook to the next trampoline under `name`
    /// and forwards the substituted table to the host.
    ///
    /// # Safety
    /// Arguments must satisfy the host's `SetEventCallbacks` contract.
    pub unsafe fn register(
        &self,
        name: &str,
        env: *mut jvmtiEnv,
        callbacks: *const jvmtiEventCallbacks,
        size_of_callbacks: jint,
    ) -> Result<usize, Error> {
        let mut table = unsafe { CallbackTable::copy_from(callbacks, size_of_callbacks) }
            .ok_or_else(|| {
                Error::new(ErrorKind::Host)
                    .with_code(JVMTI_ERROR_NULL_POINTER)
                    .with_message("callback table is null")
            })?;
        let callback = table.class_file_load_hook().ok_or_else(|| {
            Error::new(ErrorKind::Usage).with_message("callback table has no ClassFileLoadHook")
        })?;

        let ordinal = self.table.allocate().inspect_err(|err| {
            tracing::error!(plugin = name, "{err}");
        })?;
        let Some(entry) = trampoline::entry(ordinal) else {
            self.table.rollback(ordinal);
            return Err(Error::new(ErrorKind::Exhausted)
                .with_message(format!("no trampoline for ordinal {ordinal}")));
        };
        let name = truncate_name(name).to_string();
        if let Err(err) = self.table.publish(PluginRecord {
            ordinal,
            name: name.clone(),
            callback,
        }) {
            self.table.rollback(ordinal);
            return Err(err);
        }
        tracing::info!(
            plugin = %name,
            ordinal,
            total = self.table.registered_count(),
            "registered plugin"
        );

        table.set_class_file_load_hook(entry);
        let status = unsafe { self.host.forward(env, table.as_ptr(), table.size()) };
        if status != JVMTI_ERROR_NONE {
            tracing::error!(plugin = %name, ordinal, status, "host rejected substituted callbacks");
            self.table.rollback(ordinal);
            return Err(Error::new(ErrorKind::Host)
                .with_code(status)
                .with_message(format!("SetEventCallbacks failed for {name}")));
        }
        tracing::debug!(plugin = %name, ordinal, "trampoline installed");
        Ok(ordinal)
    }

    /// Runs the plugin bound to `ordinal` and records its effect on the payload.
    ///
    /// Events for skip-listed plugins are dropped before the plugin sees them.
    ///
    /// # Safety
    /// `event` must carry the pointers the host delivered for a live ClassFileLoadHook event.
    pub unsafe fn dispatch(&self, ordinal: usize, event: HookEvent) {
        let registered = self.table.registered_count();
        if ordinal >= registered {
            tracing::error!(ordinal, registered, "invalid plugin ordinal");
            return;
        }
        let Some(record) = self.table.get(ordinal) else {
            tracing::error!(ordinal, "no plugin record for ordinal");
            return;
        };

        if self.options.skip.contains(&record.name) {
            tracing::debug!(plugin = %record.name, "plugin is skipped; event not delivered");
            return;
        }

        unsafe { event.forward_to(record.callback) };

        let original = unsafe { payload(event.class_data, event.class_data_len) };
        let subject = (!event.name.is_null())
            .then(|| unsafe { CStr::from_ptr(event.name) }.to_bytes());
        let changed = unsafe { replacement(&event) }.filter(|bytes| *bytes != original);

        let transformed = match changed {
            Some(bytes) => {
                tracing::info!(
                    plugin = %record.name,
                    class = %subject.map(String::from_utf8_lossy).unwrap_or_default(),
                    old_len = original.len(),
                    new_len = bytes.len(),
                    "plugin transformed class"
                );
                bytes
            }
            None if self.options.always_emit => original,
            None => return,
        };

        let diff = DiffRecord {
            plugin: &record.name,
            subject,
            original,
            transformed,
        };
        if let Err(err) = self.channel.emit(&diff) {
            tracing::error!(plugin = %record.name, "dropping diff record: {err}");
        }
    }

    /// Puts the host's own registration entry point back.
    pub fn restore_host(&self) {
        self.host.restore();
        tracing::debug!("restored original SetEventCallbacks");
    }

    /// Deletes the public and staging directories.
    pub fn remove_records(&self) -> Result<(), Error> {
        self.channel.remove()
    }
}

unsafe fn payload<'a>(data: *const u8, len: jint) -> &'a [u8] {
    if data.is_null() || len <= 0 {
        return &[];
    }
    unsafe { std::slice::from_raw_parts(data, len as usize) }
}

/// The payload a plugin wrote to the out-slots, if any.
unsafe fn replacement<'a>(event: &HookEvent) -> Option<&'a [u8]> {
    if event.new_class_data.is_null() || event.new_class_data_len.is_null() {
        return None;
    }
    let data = unsafe { *event.new_class_data };
    let len = unsafe { *event.new_class_data_len };
    if data.is_null() || len <= 0 {
        return None;
    }
    Some(unsafe { payload(data, len) })
}
