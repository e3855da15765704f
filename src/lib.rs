//! Purpose: JVMTI agent that lets several ClassFileLoadHook agents share one JVM.
//! Exports: `agent` (C entry points and lifecycle), `coordinator`, `core`, `logging`.
//! Role: Built as a `cdylib` for `-agentpath:`; the `rlib` backs the `hookmux` CLI and tests.
//! Invariants: The host-facing entry points never unwind and never abort the JVM.
//! Invariants: Every plugin keeps its own trampoline; identity never depends on call arguments.
pub mod agent;
pub mod coordinator;
pub mod core;
pub mod logging;
