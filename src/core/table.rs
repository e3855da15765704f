//! Purpose: Ordinal allocation and PluginRecord storage for registered plugins.
//! Exports: `PluginRecord`, `PluginTable`.
//! Role: Backing store of the dispatch table; one record per trampoline in use.
//! Invariants: Ordinals are dense, zero-based, and assigned in registration order.
//! Invariants: A published record is never mutated; readers never take a lock.
//! Invariants: Capacity exhaustion fails the allocation without touching the counter.
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

use crate::core::error::{Error, ErrorKind};
use crate::core::jvmti::ClassFileLoadHookFn;

#[derive(Clone, Debug)]
pub struct PluginRecord {
    pub ordinal: usize,
    pub name: String,
    pub callback: ClassFileLoadHookFn,
}

pub struct PluginTable {
    slots: Box<[AtomicPtr<PluginRecord>]>,
    next: AtomicUsize,
}

impl PluginTable {
    pub fn with_capacity(capacity: usize) -> Self {
        let slots = (0..capacity)
            .map(|_| AtomicPtr::new(ptr::null_mut()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            slots,
            next: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of ordinals handed out and not rolled back.
    pub fn registered_count(&self) -> usize {
        self.next.load(Ordering::Acquire)
    }

    /// Reserves the next ordinal.
    pub fn allocate(&self) -> Result<usize, Error> {
        let capacity = self.capacity();
        self.next
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |next| {
                (next < capacity).then_some(next + 1)
            })
            .map_err(|_| {
                Error::new(ErrorKind::Exhausted)
                    .with_message(format!("maximum number of plugins ({capacity}) reached"))
            })
    }

    /// Stores the record for an ordinal returned by [`PluginTable::allocate`].
    pub fn publish(&self, record: PluginRecord) -> Result<(), Error> {
        let Some(slot) = self.slots.get(record.ordinal) else {
            return Err(Error::new(ErrorKind::Internal)
                .with_message(format!("ordinal {} out of range", record.ordinal)));
        };
        let ordinal = record.ordinal;
        let fresh = Box::into_raw(Box::new(record));
        if let Err(_existing) =
            slot.compare_exchange(ptr::null_mut(), fresh, Ordering::AcqRel, Ordering::Acquire)
        {
            // SAFETY: `fresh` was never shared.
            drop(unsafe { Box::from_raw(fresh) });
            return Err(Error::new(ErrorKind::Internal)
                .with_message(format!("ordinal {ordinal} already has a record")));
        }
        Ok(())
    }

    /// Releases `ordinal` after its registration failed at the host.
    ///
    /// Returns `false` when a later ordinal was handed out in the meantime; the
    /// counter is then left alone and the slot simply stays empty.
    pub fn rollback(&self, ordinal: usize) -> bool {
        if let Some(slot) = self.slots.get(ordinal) {
            let old = slot.swap(ptr::null_mut(), Ordering::AcqRel);
            if !old.is_null() {
                // SAFETY: the host rejected this ordinal's trampoline, so no dispatch can observe it.
                drop(unsafe { Box::from_raw(old) });
            }
        }
        self.next
            .compare_exchange(ordinal + 1, ordinal, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn get(&self, ordinal: usize) -> Option<&PluginRecord> {
        if ordinal >= self.registered_count() {
            return None;
        }
        let record = self.slots.get(ordinal)?.load(Ordering::Acquire);
        // SAFETY: published records are only freed by `rollback` (never dispatched) or `Drop`.
        unsafe { record.as_ref() }
    }

    pub fn records(&self) -> impl Iterator<Item = &PluginRecord> {
        (0..self.registered_count()).filter_map(|ordinal| self.get(ordinal))
    }
}

impl Drop for PluginTable {
    fn drop(&mut self) {
        for slot in self.slots.iter_mut() {
            let record = std::mem::replace(slot.get_mut(), ptr::null_mut());
            if !record.is_null() {
                // SAFETY: `&mut self` guarantees no outstanding readers.
                drop(unsafe { Box::from_raw(record) });
            }
        }
        *self.next.get_mut() = 0;
    }
}
