//! Large-object region (component C6), grounded on the reference
//! implementation's `private/lpool.hxx` and the teacher crate's
//! `large_space::PreciseAllocation` (individually `libc::malloc`-backed
//! blocks, never moved). Objects here are tracked in a flat table so
//! the collector can walk and sweep them without scanning arbitrary
//! heap memory.

use crate::gc_info_table::GCInfoIndex;
use crate::header::{BlockState, Header};

pub struct LargeRegion {
    blocks: Vec<*mut Header>,
}

impl Default for LargeRegion {
    fn default() -> Self {
        Self::new()
    }
}

impl LargeRegion {
    pub fn new() -> Self {
        Self { blocks: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.blocks
            .iter()
            .filter(|&&h| unsafe { (*h).state == BlockState::LObj })
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn alloc(&mut self, usz: usize, gc_info: GCInfoIndex) -> *mut Header {
        let sz = Header::block_size(usz);
        unsafe {
            let raw = libc::malloc(sz) as *mut Header;
            if raw.is_null() {
                crate::error::fatal_error("malloc failed allocating large object");
            }
            Header::init(raw, BlockState::LObj, sz, usz, gc_info, std::ptr::null_mut());
            self.blocks.push(raw);
            raw
        }
    }

    pub fn contains(&self, header: *mut Header) -> bool {
        self.blocks.contains(&header)
    }

    /// Calls `visitor` for every block still tracked (live or already
    /// `LRemoved` but not yet freed).
    pub fn iterate(&self, mut visitor: impl FnMut(*mut Header)) {
        for &header in &self.blocks {
            visitor(header);
        }
    }

    /// Sweep pass A: mark unvisited, unpinned blocks `LRemoved` and run
    /// their finalizer. Pass B (a separate call to `release_dead`) frees
    /// the storage — the split matches §4.5's requirement that weak
    /// fix-up observe the transitional `LRemoved` state before memory
    /// is returned to the system.
    pub fn sweep_mark(&mut self) {
        for &header in &self.blocks {
            unsafe {
                let h = &mut *header;
                if h.state != BlockState::LObj {
                    continue;
                }
                if h.visited || h.fcnt > 0 {
                    h.visited = false;
                    continue;
                }
                let info = crate::gc_info_table::gc_info_of(h.gc_info);
                (info.finalize)(h.payload());
                crate::placeholder::overlay_removed(header);
                h.state = BlockState::LRemoved;
                h.p = std::ptr::null_mut();
            }
        }
    }

    pub fn release_dead(&mut self) {
        self.blocks.retain(|&header| unsafe {
            let h = &*header;
            if h.state == BlockState::LRemoved {
                libc::free(header as *mut libc::c_void);
                false
            } else {
                true
            }
        });
    }

    /// Client-initiated `deallocate` (§4.8): finalize and free
    /// immediately rather than waiting for the next sweep.
    pub fn deallocate_now(&mut self, header: *mut Header) {
        self.blocks.retain(|&h| h != header);
        unsafe {
            libc::free(header as *mut libc::c_void);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gc_info_table::GCInfoTrait;
    use crate::trace::{Collectable, Finalize, Trace, Walker};

    struct Big([u8; 16]);
    unsafe impl Trace for Big {
        fn trace(&mut self, _w: &mut dyn Walker) {}
    }
    unsafe impl Finalize for Big {}
    impl Collectable for Big {}

    #[test]
    fn alloc_and_sweep() {
        let mut region = LargeRegion::new();
        let idx = Big::index();
        let h = region.alloc(16, idx);
        assert!(region.contains(h));
        region.sweep_mark();
        assert_eq!(unsafe { (*h).state }, BlockState::LRemoved);
        region.release_dead();
        assert!(!region.contains(h));
    }
}
