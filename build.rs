//! Purpose: Generate the fixed trampoline table for the ClassFileLoadHook dispatch arena.
//! Role: Cargo build-script; writes `trampolines.rs` into `OUT_DIR` for `core::trampoline`.
//! Invariants: Entry `k` of the table is `trampoline::<k>`; the table length equals `CAPACITY`.
//! Invariants: Capacity is fixed at build time; there is no runtime growth path.
//! Invariants: Uses only Cargo-provided env vars (e.g. `OUT_DIR`).
use std::env;
use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;

const CAPACITY: usize = 4096;

fn main() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR"));

    println!("cargo:rerun-if-changed=build.rs");

    let mut source = String::with_capacity(CAPACITY * 32);
    source.push_str("// @generated by build.rs; do not edit.\n");
    let _ = writeln!(source, "pub const CAPACITY: usize = {CAPACITY};");
    source.push_str("pub(crate) static TRAMPOLINES: [ClassFileLoadHookFn; CAPACITY] = [\n");
    for ordinal in 0..CAPACITY {
        let _ = writeln!(source, "    trampoline::<{ordinal:#05x}>,");
    }
    source.push_str("];\n");

    fs::write(out_dir.join("trampolines.rs"), source)
        .expect("failed to write generated trampoline table");
}
