//! Pinned region (component C5): objects here never move. Grounded on
//! the reference implementation's `private/fpool.hxx` — a sequence of
//! arenas plus an address-sorted free-list with split and adjacent-pair
//! coalescing.

use crate::arena::Arena;
use crate::gc_info_table::GCInfoIndex;
use crate::header::{BlockState, Header};

/// Below this remainder a split isn't worth it; the leftover becomes
/// internal fragmentation of the allocated block instead.
const MIN_SPLIT_REMAINDER: usize = 64;
const FIRST_ARENA_SIZE: usize = 4 * 1024 * 1024;

pub struct PinnedRegion {
    arenas: Vec<Arena>,
    /// Free blocks, kept sorted by address (invariant P5). A `Vec`
    /// rather than the reference implementation's intrusive
    /// doubly-linked free-list node chase: with no concurrent mutator
    /// there is no benefit to threading pointers through the payload
    /// itself, and a sorted `Vec` makes the "no two adjacent blocks
    /// unmerged" invariant trivial to check in tests.
    free_list: Vec<*mut Header>,
    /// Blocks released since the last [`coalesce_pending`] call. Merging
    /// is deferred to the next mutator-facing entry point rather than
    /// performed inline by `release` — coalescing during collection
    /// would rewrite a merged-away header's fields while weak-reference
    /// fix-up is still walking headers discovered earlier in the same
    /// pass.
    pending_coalesce: Vec<*mut Header>,
}

impl Default for PinnedRegion {
    fn default() -> Self {
        Self::new()
    }
}

impl PinnedRegion {
    pub fn new() -> Self {
        Self {
            arenas: vec![Arena::new(FIRST_ARENA_SIZE)],
            free_list: Vec::new(),
            pending_coalesce: Vec::new(),
        }
    }

    pub fn contains(&self, p: *const u8) -> bool {
        self.arenas.iter().any(|a| a.contains(p))
    }

    fn insert_free_sorted(&mut self, header: *mut Header) {
        let pos = self
            .free_list
            .partition_point(|&h| (h as usize) < (header as usize));
        self.free_list.insert(pos, header);
    }

    fn remove_free(&mut self, header: *mut Header) {
        if let Some(pos) = self.free_list.iter().position(|&h| h == header) {
            self.free_list.remove(pos);
        }
    }

    /// Attempts to coalesce the free block at `header` with its
    /// immediate predecessor and successor in the same arena. Adjacency
    /// is exact byte-adjacency: `predecessor + predecessor.sz ==
    /// header` or `header + header.sz == successor`.
    fn coalesce(&mut self, header: *mut Header) {
        let mut current = header;
        loop {
            let merged_next = self.try_merge_with_next(current);
            if !merged_next {
                break;
            }
        }
        loop {
            if let Some(prev) = self.find_predecessor(current) {
                if self.try_merge_pair(prev, current) {
                    current = prev;
                    continue;
                }
            }
            break;
        }
    }

    fn find_predecessor(&self, header: *mut Header) -> Option<*mut Header> {
        self.free_list
            .iter()
            .copied()
            .find(|&h| unsafe { (h as usize) + (*h).sz == header as usize })
    }

    fn try_merge_with_next(&mut self, header: *mut Header) -> bool {
        let next_addr = unsafe { header as usize + (*header).sz };
        if let Some(&next) = self.free_list.iter().find(|&&h| h as usize == next_addr) {
            self.try_merge_pair(header, next)
        } else {
            false
        }
    }

    /// Merges `second` into `first` (`first` must immediately precede
    /// `second`). `second`'s header becomes `FMerged` and is left in
    /// place so a stray interior pointer into it still resolves to
    /// `first` via linear scan.
    fn try_merge_pair(&mut self, first: *mut Header, second: *mut Header) -> bool {
        unsafe {
            if (*first).mp != (*second).mp {
                return false;
            }
            (*first).sz += (*second).sz;
            (*second).state = BlockState::FMerged;
            (*second).p = std::ptr::null_mut();
            self.remove_free(second);
            crate::placeholder::overlay_removed(second);
            true
        }
    }

    /// Splits `header` (a free block of size `>= needed_total`) so the
    /// first `needed_total` bytes become an allocatable block and the
    /// remainder (if large enough) stays on the free-list.
    fn split(&mut self, header: *mut Header, needed_total: usize) -> *mut Header {
        let total = unsafe { (*header).sz };
        let remainder = total - needed_total;
        if remainder < MIN_SPLIT_REMAINDER {
            return header;
        }
        unsafe {
            use std::ptr::addr_of_mut;
            (*header).sz = needed_total;
            let remainder_header = (header as usize + needed_total) as *mut Header;
            let mp = (*header).mp;
            addr_of_mut!((*remainder_header).magic).write(crate::header::HEADER_MAGIC);
            addr_of_mut!((*remainder_header).state).write(BlockState::FRemoved);
            addr_of_mut!((*remainder_header).sz).write(remainder);
            addr_of_mut!((*remainder_header).usz).write(0);
            addr_of_mut!((*remainder_header).fcnt).write(0);
            addr_of_mut!((*remainder_header).visited).write(false);
            addr_of_mut!((*remainder_header).gc_info).write(crate::gc_info_table::GCInfoIndex::default());
            addr_of_mut!((*remainder_header).mp).write(mp);
            addr_of_mut!((*remainder_header).p).write(std::ptr::null_mut());
            let tail = (remainder_header as usize + remainder - Header::TAIL_SIZE) as *mut crate::header::Tail;
            addr_of_mut!((*tail).magic).write(crate::header::TAIL_MAGIC);
            addr_of_mut!((*tail).sz).write(remainder);
            crate::placeholder::overlay_free_node(remainder_header, std::ptr::null_mut(), std::ptr::null_mut());
            self.insert_free_sorted(remainder_header);
        }
        header
    }

    /// `freeze` (§4.4): find-fit in the free-list, else bump-allocate,
    /// else grow. Returns a `Frozen` block with `fcnt == 1`.
    pub fn alloc_frozen(&mut self, usz: usize, gc_info: GCInfoIndex) -> *mut Header {
        let needed = Header::block_size(usz);
        if let Some(pos) = self.free_list.iter().position(|&h| unsafe { (*h).sz >= needed }) {
            let header = self.free_list.remove(pos);
            let header = self.split(header, needed);
            unsafe {
                Header::init(header, BlockState::Frozen, (*header).sz, usz, gc_info, (*header).mp);
                (*header).fcnt = 1;
            }
            return header;
        }
        if let Some(header) = self.arenas.last_mut().unwrap().alloc(usz, gc_info) {
            unsafe {
                (*header).state = BlockState::Frozen;
                (*header).fcnt = 1;
            }
            return header;
        }
        let last_size = self.arenas.last().unwrap().capacity().max(needed);
        let new_size = last_size.next_power_of_two().max(needed);
        self.arenas.push(Arena::new(new_size));
        let header = self
            .arenas
            .last_mut()
            .unwrap()
            .alloc(usz, gc_info)
            .unwrap_or_else(|| crate::error::fatal_error("pinned region exhausted after growth"));
        unsafe {
            (*header).state = BlockState::Frozen;
            (*header).fcnt = 1;
        }
        header
    }

    /// Releases a block back to the free-list, per `unfreeze` reaching
    /// `fcnt == 0` (§4.4). Marks it `FRemoved` and queues it for
    /// coalescing with its address-adjacent free neighbors; the merge
    /// itself runs on the next call to [`coalesce_pending`].
    pub fn release(&mut self, header: *mut Header) {
        unsafe {
            (*header).state = BlockState::FRemoved;
            (*header).p = std::ptr::null_mut();
            (*header).fcnt = 0;
        }
        unsafe {
            crate::placeholder::overlay_free_node(header, std::ptr::null_mut(), std::ptr::null_mut());
        }
        self.insert_free_sorted(header);
        self.pending_coalesce.push(header);
    }

    /// Merges every block queued by `release` since the last call. Must
    /// only be called from a mutator-facing entry point (`allocate`,
    /// `freeze`, `unfreeze`, `deallocate`) — never from inside a
    /// collection, where it would invalidate a weak-reference header
    /// the fix-up pass hasn't visited yet (§4.4).
    pub fn coalesce_pending(&mut self) {
        let pending = std::mem::take(&mut self.pending_coalesce);
        for header in pending {
            if self.free_list.contains(&header) {
                self.coalesce(header);
            }
        }
    }

    /// Iterates every live `Frozen` block across all arenas — these are
    /// unconditional collection roots (pinning implies reachable).
    pub fn iterate_frozen(&self, mut f: impl FnMut(*mut Header)) {
        for arena in &self.arenas {
            arena.iterate(|header: *mut Header| {
                if unsafe { (*header).state } == BlockState::Frozen {
                    f(header);
                }
            });
        }
    }

    /// Iterates every block (live or free) across all arenas, for
    /// `pointer_ok`/`data_ok` membership checks.
    pub fn iterate_all(&self, mut f: impl FnMut(*mut Header)) {
        for arena in &self.arenas {
            arena.iterate(|header: *mut Header| f(header));
        }
    }

    /// Reclaims every `Unfrozen` block's storage back to the free-list.
    /// Called once per collection (§4.3): by the time a stop-the-world
    /// collection runs, every live root and weak reference anchored to
    /// an `Unfrozen` block has already been rewritten to the migrated
    /// copying-region address by `unfreeze`'s own fix-up, so the old
    /// pinned storage is safe to free — mirroring how the copying
    /// region only reclaims a `GcMoved` original's space during its own
    /// next sweep rather than the instant it is forwarded.
    pub fn reclaim_unfrozen(&mut self) {
        let mut stale = Vec::new();
        self.iterate_all(|header| {
            if unsafe { (*header).state } == BlockState::Unfrozen {
                stale.push(header);
            }
        });
        for header in stale {
            self.release(header);
        }
    }

    pub fn free_list_len(&self) -> usize {
        self.free_list.len()
    }

    pub fn free_list_is_sorted_and_coalesced(&self) -> bool {
        self.free_list.windows(2).all(|w| unsafe {
            let a = w[0];
            let b = w[1];
            (a as usize) < (b as usize) && (a as usize + (*a).sz) != (b as usize)
        }) || self.free_list.len() < 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gc_info_table::GCInfoTrait;
    use crate::trace::{Collectable, Finalize, Trace, Walker};

    struct Pin(u64);
    unsafe impl Trace for Pin {
        fn trace(&mut self, _w: &mut dyn Walker) {}
    }
    unsafe impl Finalize for Pin {}
    impl Collectable for Pin {}

    #[test]
    fn alloc_release_roundtrip() {
        let mut region = PinnedRegion::new();
        let idx = Pin::index();
        let h = region.alloc_frozen(8, idx);
        assert_eq!(unsafe { (*h).state }, BlockState::Frozen);
        region.release(h);
        region.coalesce_pending();
        assert_eq!(region.free_list_len(), 1);
        assert!(region.free_list_is_sorted_and_coalesced());
    }

    #[test]
    fn adjacent_frees_coalesce() {
        let mut region = PinnedRegion::new();
        let idx = Pin::index();
        let h1 = region.alloc_frozen(8, idx);
        let h2 = region.alloc_frozen(8, idx);
        let h3 = region.alloc_frozen(8, idx);
        region.release(h1);
        region.release(h3);
        region.release(h2);
        region.coalesce_pending();
        // all three should have merged into a single free block
        assert_eq!(region.free_list_len(), 1);
    }
}
