//! A contiguous, `mmap`-backed, bump-allocated byte region (component
//! C3). Grounded on the teacher crate's `mmap.rs` (raw `libc::mmap`,
//! not the unused `memmap2` dependency the teacher's `Cargo.toml`
//! declares) and `bump_pointer_space.rs` (bump-cursor allocation).
//! Single-mutator, so the cursor is a plain `usize`, not the teacher's
//! atomic `compare_exchange_weak` loop — there is nothing else that
//! could be racing it.

use crate::gc_info_table::GCInfoIndex;
use crate::header::{BlockState, Header};

/// Anonymous, zero-filled virtual memory reserved up front. Released on
/// `Drop`.
pub struct Mmap {
    start: *mut u8,
    size: usize,
}

impl Mmap {
    pub fn new(size: usize) -> Self {
        unsafe {
            let map = libc::mmap(
                std::ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANON,
                -1,
                0,
            );
            if map == libc::MAP_FAILED {
                crate::error::fatal_error("mmap failed while reserving arena");
            }
            libc::madvise(map, size, libc::MADV_SEQUENTIAL);
            Self {
                start: map as *mut u8,
                size,
            }
        }
    }

    pub fn start(&self) -> *mut u8 {
        self.start
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

impl Drop for Mmap {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.start as *mut _, self.size);
        }
    }
}

/// Visits a block during a scan of the arena. Returns whatever the
/// caller needs; `Arena::iterate` just calls it once per block in
/// address order.
pub trait BlockVisitor {
    fn visit(&mut self, header: *mut Header);
}

impl<F: FnMut(*mut Header)> BlockVisitor for F {
    fn visit(&mut self, header: *mut Header) {
        self(header)
    }
}

pub struct Arena {
    mmap: Mmap,
    /// Byte offset of the bump cursor, relative to `mmap.start()`.
    cursor: usize,
}

impl Arena {
    pub fn new(size: usize) -> Self {
        Self {
            mmap: Mmap::new(size),
            cursor: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.mmap.size()
    }

    pub fn used(&self) -> usize {
        self.cursor
    }

    pub fn start(&self) -> *mut u8 {
        self.mmap.start()
    }

    pub fn contains(&self, p: *const u8) -> bool {
        let start = self.mmap.start() as usize;
        let end = start + self.mmap.size();
        let p = p as usize;
        p >= start && p < end
    }

    /// Resets the bump cursor to the start, discarding all blocks. Used
    /// when a just-swapped-in semispace becomes the active one.
    pub fn clear(&mut self) {
        self.cursor = 0;
    }

    /// Sets the bump cursor directly. Used by `resize` after bulk
    /// copying an existing arena's raw bytes into a freshly grown one.
    pub fn adopt_used(&mut self, used: usize) {
        self.cursor = used;
    }

    /// Allocates a block for a `usz`-byte payload of the given
    /// `gc_info` type, in `GcObj` state. Returns `None` if the arena is
    /// exhausted.
    pub fn alloc(&mut self, usz: usize, gc_info: GCInfoIndex) -> Option<*mut Header> {
        let sz = Header::block_size(usz);
        if self.cursor + sz > self.mmap.size() {
            return None;
        }
        let header_ptr = (self.mmap.start() as usize + self.cursor) as *mut Header;
        self.cursor += sz;
        unsafe {
            Header::init(header_ptr, BlockState::GcObj, sz, usz, gc_info, self.mmap.start());
        }
        Some(header_ptr)
    }

    /// Calls `visitor` once per block from the start of the arena up to
    /// the current bump cursor, trusting each block's `sz` to advance.
    pub fn iterate(&self, mut visitor: impl BlockVisitor) {
        let mut offset = 0usize;
        while offset < self.cursor {
            let header_ptr = (self.mmap.start() as usize + offset) as *mut Header;
            let header = unsafe { &*header_ptr };
            if cfg!(debug_assertions) && unsafe { !header.check() } {
                crate::error::fatal_error("corrupt block header during arena scan");
            }
            visitor.visit(header_ptr);
            offset += header.sz;
        }
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
    fn bump_alloc_and_iterate() {
        let mut arena = Arena::new(1 << 16);
        let idx = Leaf::index();
        let h1 = arena.alloc(std::mem::size_of::<Leaf>(), idx).unwrap();
        let h2 = arena.alloc(std::mem::size_of::<Leaf>(), idx).unwrap();
        assert_ne!(h1, h2);
        let mut count = 0;
        arena.iterate(|_h: *mut Header| count += 1);
        assert_eq!(count, 2);
    }

    #[test]
    fn exhaustion_returns_none() {
        let mut arena = Arena::new(256);
        let idx = Leaf::index();
        let mut allocs = 0;
        while arena.alloc(64, idx).is_some() {
            allocs += 1;
            if allocs > 100 {
                break;
            }
        }
        assert!(allocs > 0);
        assert!(arena.alloc(usize::MAX / 2, idx).is_none());
    }
}
