//! Purpose: Derive a plugin's display name from the shared object that owns its callback.
//! Exports: `FALLBACK_NAME`, `plugin_name_from_path`, `module_path_of`, `resolve_plugin_name`.
//! Role: Names plugins for logs, skip matching, and diff records.
//! Invariants: Names never exceed the option-store name limit.
//! Invariants: Unresolvable callbacks are named `agent`.
use std::ffi::CStr;
use std::os::raw::c_void;

use crate::core::options::truncate_name;

/// Name used when the owning module of a callback cannot be resolved.
pub const FALLBACK_NAME: &str = "agent";

/// Strips the directory and a leading `lib`, truncates, then drops the last extension.
///
/// `/opt/agents/libagent_minimal_cfh.so` becomes `agent_minimal_cfh`. The
/// extension is looked up after truncation, so a suffix cut off by the
/// length limit is never the one removed.
pub fn plugin_name_from_path(path: &str) -> String {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    let name = truncate_name(file_name.strip_prefix("lib").unwrap_or(file_name));
    let stem = match name.rfind('.') {
        Some(dot) => &name[..dot],
        None => name,
    };
    stem.to_string()
}

/// Path of the shared object containing `addr`, as reported by the dynamic loader.
#[cfg(unix)]
pub fn module_path_of(addr: *const c_void) -> Option<String> {
    if addr.is_null() {
        return None;
    }
    let mut info: libc::Dl_info = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::dladdr(addr, &mut info) };
    if rc == 0 || info.dli_fname.is_null() {
        return None;
    }
    let path = unsafe { CStr::from_ptr(info.dli_fname) };
    Some(path.to_string_lossy().into_owned())
}

#[cfg(not(unix))]
pub fn module_path_of(_addr: *const c_void) -> Option<String> {
    None
}

/// Display name of the plugin whose callback lives at `addr`.
pub fn resolve_plugin_name(addr: *const c_void) -> String {
    match module_path_of(addr) {
        Some(path) => {
            let name = plugin_name_from_path(&path);
            tracing::debug!(name = %name, library = %path, "derived plugin name");
            name
        }
        None => FALLBACK_NAME.to_string(),
    }
}
