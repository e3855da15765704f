// Core modules: host ABI, options, dispatch arena, and the diff channel.
pub mod callbacks;
pub mod diff;
pub mod error;
pub mod host;
pub mod jvmti;
pub mod naming;
pub mod options;
pub mod table;
pub mod trampoline;
