//! The copying region (component C4): two equal-sized semispaces,
//! `active` and `spare`. Grounded on the reference implementation's
//! `private/gcpool.hxx` (`GCpool::do_gc_`/`move`) and, for the
//! bump-allocator mechanics, the teacher crate's
//! `bump_pointer_space.rs`.
//!
//! Protocol: allocation always goes into `active`. A collection swaps
//! `active` and `spare` (the old `active`'s contents become the thing
//! being walked, under the name `spare`), copies every reachable object
//! from `spare` into the now-empty `active`, sweeps whatever in `spare`
//! was never visited, then clears `spare` so it is ready to serve as
//! the next collection's copy target.

use crate::gc_info_table::GCInfoIndex;
use crate::header::{BlockState, Header};

pub struct CopyingRegion {
    pub active: crate::arena::Arena,
    pub spare: crate::arena::Arena,
}

impl CopyingRegion {
    pub fn new(semispace_size: usize) -> Self {
        Self {
            active: crate::arena::Arena::new(semispace_size),
            spare: crate::arena::Arena::new(semispace_size),
        }
    }

    pub fn alloc(&mut self, usz: usize, gc_info: GCInfoIndex) -> Option<*mut Header> {
        self.active.alloc(usz, gc_info)
    }

    /// Grows both semispaces to `new_size`, discarding their contents.
    /// Callers must only invoke this with nothing live in either space
    /// (immediately after a collection reclaimed everything, before any
    /// new allocation).
    pub fn grow_empty(&mut self, new_size: usize) {
        self.active = crate::arena::Arena::new(new_size);
        self.spare = crate::arena::Arena::new(new_size);
    }

    /// Step 1 of collect (§4.3): swap the two semispaces. The caller
    /// then walks `spare` (which now holds everything that was live
    /// before this collection) and copies survivors into `active`.
    pub fn swap(&mut self) {
        std::mem::swap(&mut self.active, &mut self.spare);
    }

    /// Copies `old_header`'s payload into `active`, marks the old block
    /// forwarded, and returns the new header. Caller must only ever
    /// call this once per block per collection (guarded by the
    /// visited bit in `collector::walk`).
    pub unsafe fn copy_out(&mut self, old_header: *mut Header, state: BlockState) -> *mut Header {
        let old = &mut *old_header;
        let usz = old.usz;
        let gc_info = old.gc_info;
        let new_header = self
            .active
            .alloc(usz, gc_info)
            .unwrap_or_else(|| crate::error::fatal_error("copying region exhausted mid-collection"));
        std::ptr::copy_nonoverlapping(old.payload(), (*new_header).payload(), usz);
        old.forward_to(state, (*new_header).payload());
        crate::placeholder::overlay_moved(old_header, new_header);
        new_header
    }

    /// Sweep pass over `spare` after a walk: anything still `GcObj`
    /// (i.e. never visited, never forwarded) is unreachable.
    pub fn sweep_spare(&mut self, mut on_unreachable: impl FnMut(*mut Header)) {
        let mut dead = Vec::new();
        self.spare.iterate(|header: *mut Header| {
            let state = unsafe { (*header).state };
            match state {
                BlockState::GcObj => dead.push(header),
                BlockState::GcMoved | BlockState::GcFrozen | BlockState::GcRm => {
                    unsafe { (*header).clear_visited() };
                }
                _ => {}
            }
        });
        for header in dead {
            on_unreachable(header);
            unsafe {
                let h = &mut *header;
                crate::placeholder::overlay_removed(header);
                h.state = BlockState::GcRm;
                h.p = std::ptr::null_mut();
            }
        }
    }

    pub fn clear_spare(&mut self) {
        self.spare.clear();
    }

    pub fn contains(&self, p: *const u8) -> bool {
        self.active.contains(p) || self.spare.contains(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gc_info_table::GCInfoTrait;
    use crate::trace::{Collectable, Finalize, Trace, Walker};

    struct Leaf(u64);
    unsafe impl Trace for Leaf {
        fn trace(&mut self, _w: &mut dyn Walker) {}
    }
    unsafe impl Finalize for Leaf {}
    impl Collectable for Leaf {}

    #[test]
    fn copy_out_preserves_bytes_and_forwards() {
        let mut region = CopyingRegion::new(1 << 16);
        let idx = Leaf::index();
        let old = region.alloc(8, idx).unwrap();
        unsafe {
            *(*old).payload().cast::<u64>() = 0xdead_beef;
        }
        region.swap();
        let new = unsafe { region.copy_out(old, BlockState::GcMoved) };
        unsafe {
            assert_eq!(*(*new).payload().cast::<u64>(), 0xdead_beef);
            assert_eq!((*old).state, BlockState::GcMoved);
            assert_eq!((*old).p, (*new).payload());
        }
    }
}
