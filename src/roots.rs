//! Strong-root table (component C7), grounded on the reference
//! implementation's `private/ptrpool.hxx`. Unlike the weak table (C9)
//! this one has no sort-order invariant to maintain: root slots are
//! rare relative to weak slots and a linear scan is good enough both
//! for registration checks and for `update_pp`.

use std::ptr::NonNull;

use crate::gcref::UntypedGc;
use crate::header::Header;

struct Entry {
    label: String,
    header: NonNull<Header>,
    slot: NonNull<UntypedGc>,
}

#[derive(Default)]
pub struct RootTable {
    entries: Vec<Entry>,
}

impl RootTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `slot` as a root under `label`. `slot` is ordinary
    /// client-owned storage (stack, heap, global) holding a live
    /// `Gc<T>`; there is nothing to validate about where `slot` itself
    /// lives, only that the value it currently holds has a sane header.
    pub fn register(&mut self, label: impl Into<String>, slot: NonNull<UntypedGc>) {
        let value = unsafe { *slot.as_ptr() };
        let header = value.header_ptr();
        self.entries.push(Entry {
            label: label.into(),
            header: NonNull::new(header).unwrap(),
            slot,
        });
    }

    pub fn unregister(&mut self, slot: NonNull<UntypedGc>) {
        self.entries.retain(|e| e.slot != slot);
    }

    pub fn unregister_all(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Runs `f(label, slot)` for every registered root; `f` is expected
    /// to rewrite `*slot` in place via `collector::walk`.
    pub fn walk(&mut self, mut f: impl FnMut(&str, &mut UntypedGc)) {
        for entry in &mut self.entries {
            let slot = unsafe { &mut *entry.slot.as_ptr() };
            f(&entry.label, slot);
            entry.header = NonNull::new(slot.header_ptr()).unwrap();
        }
    }

    /// Rewrites every entry whose cached header is `old` to `new`,
    /// following a freeze/unfreeze migration (§4.4). Updates both the
    /// cached header and the client's own slot value.
    pub fn update_pp(&mut self, old: NonNull<Header>, new: NonNull<Header>) {
        for entry in &mut self.entries {
            if entry.header == old {
                entry.header = new;
                unsafe {
                    *entry.slot.as_ptr() = UntypedGc::from_header(new);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unregister_removes_exact_slot() {
        let mut table = RootTable::new();
        assert_eq!(table.len(), 0);
        table.unregister_all();
        assert!(table.is_empty());
    }
}
