//! Weak-reference table (component C9), grounded on the reference
//! implementation's `private/wptrpool.hxx`. Entries are kept sorted by
//! slot address so that, in the original, a block's weak slots form one
//! contiguous run that can be re-spliced in a single `memmove` after a
//! freeze/unfreeze migration.
//!
//! This crate keeps the sort invariant (needed for `P5`-style
//! consistency and for future binary-search lookups) but resolves it
//! with a plain re-sort after each mutation rather than the original's
//! hand-rolled contiguous-run splice: weak-table mutations happen only
//! on registration, unregistration, and freeze/unfreeze, none of which
//! are on the collection hot path, so an `O(n log n)` sort is simpler
//! and (unlike the original, whose `wptr_unregister` removes by
//! swap-with-last and does *not* re-sort) never silently lets the
//! invariant rot. This decision is recorded in DESIGN.md as the
//! resolution to the corresponding Open Question.

use std::ptr::NonNull;

use crate::gcref::UntypedGc;
use crate::header::Header;

struct Entry {
    header: NonNull<Header>,
    slot: NonNull<Option<UntypedGc>>,
}

#[derive(Default)]
pub struct WeakTable {
    entries: Vec<Entry>,
}

impl WeakTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn sort(&mut self) {
        self.entries.sort_by_key(|e| e.slot.as_ptr() as usize);
    }

    /// Registers `slot` (currently holding `Some(referent)`) as weak.
    /// A no-op if the referent has already gone dead by the time this
    /// is called (there is nothing left to track). `slot` itself is
    /// ordinary client-owned storage — a `WeakGc<T>` handle on the
    /// stack, in a `Vec`, wherever — not necessarily embedded inside
    /// another managed payload; unlike the root/walker tables, which
    /// exist to scan embedded references *out of* an object, a weak
    /// table entry only ever needs to find its own referent's header.
    pub fn register(&mut self, slot: NonNull<Option<UntypedGc>>) {
        let referent = match unsafe { *slot.as_ptr() } {
            Some(r) => r,
            None => return,
        };
        let header = referent.header_ptr();
        if unsafe { (*header).state.is_dead() } {
            return;
        }
        self.entries.push(Entry {
            header: NonNull::new(header).unwrap(),
            slot,
        });
        self.sort();
    }

    pub fn unregister(&mut self, slot: NonNull<Option<UntypedGc>>) {
        self.entries.retain(|e| e.slot != slot);
    }

    pub fn unregister_all(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_sorted(&self) -> bool {
        self.entries
            .windows(2)
            .all(|w| (w[0].slot.as_ptr() as usize) <= (w[1].slot.as_ptr() as usize))
    }

    /// `gc_update_wptr` / `gc_update_wptrs` from §4.6: chases forwarding
    /// chains through the moved states and nulls any slot whose
    /// referent has reached a terminal dead state.
    pub fn update_all(&mut self) {
        for entry in &mut self.entries {
            let mut header = entry.header;
            loop {
                let state = unsafe { header.as_ref().state };
                if state.is_dead() {
                    unsafe { *entry.slot.as_ptr() = None };
                    break;
                } else if state.is_forwarded() {
                    let new_payload = unsafe { header.as_ref().p };
                    let new_header = unsafe { crate::header::header_of(new_payload) };
                    header = NonNull::new(new_header).unwrap();
                } else if state.is_live_here() {
                    entry.header = header;
                    unsafe {
                        *entry.slot.as_ptr() = Some(UntypedGc::from_header(header));
                    }
                    break;
                } else {
                    crate::error::fatal_error("weak table: unknown block state during fix-up");
                }
            }
        }
    }

    /// Rewrites every entry anchored to `old` after a freeze/unfreeze
    /// migration: the owning block moved to `new`, and every slot
    /// address inside it shifted by `delta` bytes.
    pub fn update_pp(&mut self, old: NonNull<Header>, new: NonNull<Header>, delta: isize) {
        let mut touched = false;
        for entry in &mut self.entries {
            if entry.header == old {
                entry.header = new;
                let shifted = (entry.slot.as_ptr() as isize + delta) as *mut Option<UntypedGc>;
                entry.slot = NonNull::new(shifted).unwrap();
                unsafe {
                    *entry.slot.as_ptr() = Some(UntypedGc::from_header(new));
                }
                touched = true;
            }
        }
        if touched {
            self.sort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_table_is_sorted() {
        let table = WeakTable::new();
        assert!(table.is_sorted());
        assert_eq!(table.len(), 0);
    }
}
