//! Purpose: Owned copy of a caller's `jvmtiEventCallbacks` with a patchable ClassFileLoadHook slot.
//! Exports: `CallbackTable`.
//! Role: Lets registration substitute a trampoline without writing to the caller's memory.
//! Invariants: Exactly `size_of_callbacks` bytes are copied; other entries pass through verbatim.
//! Invariants: Tables too short to hold the hook slot are never patched.
use std::mem::size_of;
use std::ptr;

use crate::core::jvmti::{
    CLASS_FILE_LOAD_HOOK_INDEX, ClassFileLoadHookFn, jint, jvmtiEventCallbacks,
};

type Word = usize;

pub struct CallbackTable {
    words: Vec<Word>,
    size: jint,
}

impl CallbackTable {
    /// Copies `size` bytes of the caller's table.
    ///
    /// Returns `None` for a null table or a negative size.
    ///
    /// # Safety
    /// `callbacks` must be null or readable for `size` bytes.
    pub unsafe fn copy_from(callbacks: *const jvmtiEventCallbacks, size: jint) -> Option<Self> {
        if callbacks.is_null() || size < 0 {
            return None;
        }
        let byte_len = size as usize;
        let mut words = vec![0 as Word; byte_len.div_ceil(size_of::<Word>())];
        unsafe {
            ptr::copy_nonoverlapping(callbacks.cast::<u8>(), words.as_mut_ptr().cast::<u8>(), byte_len);
        }
        Some(Self { words, size })
    }

    /// Whether the table is large enough to contain the ClassFileLoadHook slot.
    pub fn has_class_file_load_hook_slot(&self) -> bool {
        (self.size as usize) >= (CLASS_FILE_LOAD_HOOK_INDEX + 1) * size_of::<Word>()
    }

    pub fn class_file_load_hook(&self) -> Option<ClassFileLoadHookFn> {
        if !self.has_class_file_load_hook_slot() {
            return None;
        }
        let word = self.words[CLASS_FILE_LOAD_HOOK_INDEX];
        if word == 0 {
            return None;
        }
        // SAFETY: a non-null entry in this slot is a ClassFileLoadHook by ABI contract.
        Some(unsafe { std::mem::transmute::<Word, ClassFileLoadHookFn>(word) })
    }

    pub fn set_class_file_load_hook(&mut self, hook: ClassFileLoadHookFn) {
        if self.has_class_file_load_hook_slot() {
            self.words[CLASS_FILE_LOAD_HOOK_INDEX] = hook as Word;
        }
    }

    pub fn size(&self) -> jint {
        self.size
    }

    pub fn as_ptr(&self) -> *const jvmtiEventCallbacks {
        self.words.as_ptr().cast()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::jvmti::{JNIEnv, jclass, jobject, jvmtiEnv};
    use std::os::raw::{c_char, c_uchar};

    /// Full-size table as laid out by JDK 21 headers.
    pub(crate) const JDK21_CALLBACKS: usize = 39;

    unsafe extern "system" fn hook(
        _: *mut jvmtiEnv,
        _: *mut JNIEnv,
        _: jclass,
        _: jobject,
        _: *const c_char,
        _: jobject,
        _: jint,
        _: *const c_uchar,
        _: *mut jint,
        _: *mut *mut c_uchar,
    ) {
    }

    unsafe extern "system" fn other(
        _: *mut jvmtiEnv,
        _: *mut JNIEnv,
        _: jclass,
        _: jobject,
        _: *const c_char,
        _: jobject,
        _: jint,
        _: *const c_uchar,
        _: *mut jint,
        _: *mut *mut c_uchar,
    ) {
    }

    pub(crate) fn raw_table(class_file_load_hook: Option<ClassFileLoadHookFn>) -> Vec<usize> {
        let mut raw = vec![0usize; JDK21_CALLBACKS];
        raw[0] = 0xdead;
        if let Some(hook) = class_file_load_hook {
            raw[CLASS_FILE_LOAD_HOOK_INDEX] = hook as usize;
        }
        raw
    }

    fn byte_size(raw: &[usize]) -> jint {
        (raw.len() * size_of::<usize>()) as jint
    }

    #[test]
    fn null_table_is_not_copied() {
        assert!(unsafe { CallbackTable::copy_from(ptr::null(), 16) }.is_none());
    }

    #[test]
    fn copy_reads_the_hook_and_leaves_the_source_alone() {
        let raw = raw_table(Some(hook));
        let mut table =
            unsafe { CallbackTable::copy_from(raw.as_ptr().cast(), byte_size(&raw)) }.expect("copy");
        let found = table.class_file_load_hook().expect("hook");
        assert!(std::ptr::fn_addr_eq(found, hook as ClassFileLoadHookFn));

        table.set_class_file_load_hook(other);
        let patched = table.class_file_load_hook().expect("patched");
        assert!(std::ptr::fn_addr_eq(patched, other as ClassFileLoadHookFn));
        assert_eq!(raw[CLASS_FILE_LOAD_HOOK_INDEX], hook as usize);

        let copied = unsafe { std::slice::from_raw_parts(table.as_ptr().cast::<usize>(), raw.len()) };
        assert_eq!(copied[0], 0xdead);
        assert_eq!(table.size(), byte_size(&raw));
    }

    #[test]
    fn empty_hook_slot_reads_as_none() {
        let raw = raw_table(None);
        let table =
            unsafe { CallbackTable::copy_from(raw.as_ptr().cast(), byte_size(&raw)) }.expect("copy");
        assert!(table.class_file_load_hook().is_none());
    }

    #[test]
    fn truncated_table_has_no_hook_slot() {
        let raw = raw_table(Some(hook));
        let size = (CLASS_FILE_LOAD_HOOK_INDEX * size_of::<usize>()) as jint;
        let mut table = unsafe { CallbackTable::copy_from(raw.as_ptr().cast(), size) }.expect("copy");
        assert!(!table.has_class_file_load_hook_slot());
        assert!(table.class_file_load_hook().is_none());
        table.set_class_file_load_hook(other);
        assert!(table.class_file_load_hook().is_none());
    }
}
