//! Block metadata: the `Header`/`Tail` pair bracketing every managed
//! payload (component C1 of the design notes). Grounded on the
//! `head`/`head_base`/`tail` structs of the reference implementation's
//! `private/head.hxx` and `private/tail.hxx`, and on the teacher
//! crate's packed-bitfield `HeapObjectHeader` (`header.rs`) for the
//! idiom of carrying a `GCInfoIndex` inline in the header.

use crate::gc_info_table::GCInfoIndex;
use crate::util::align_up;
use std::mem::size_of;

pub const HEADER_MAGIC: u64 = 0x127f_3b0d_a95a_29db;
pub const TAIL_MAGIC: u64 = 0xdead_beef_dead_beef;

/// One of the ten block states from the data model (§3 of the design
/// notes). The discriminant values match the reference implementation's
/// `head::gcobj_state` enum so a reader cross-checking against
/// `private/head.hxx` can line them up directly.
#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BlockState {
    GcObj = 1,
    GcMoved = 2,
    GcRm = 3,
    GcFrozen = 4,
    Frozen = 5,
    Unfrozen = 6,
    FRemoved = 7,
    FMerged = 8,
    LObj = 9,
    LRemoved = 10,
}

impl BlockState {
    /// States in which `Header.p` must be null (invariant I2).
    pub fn is_dead(self) -> bool {
        matches!(
            self,
            BlockState::GcRm | BlockState::FRemoved | BlockState::FMerged | BlockState::LRemoved
        )
    }

    /// States that forward to a live block elsewhere.
    pub fn is_forwarded(self) -> bool {
        matches!(
            self,
            BlockState::GcMoved | BlockState::GcFrozen | BlockState::Unfrozen
        )
    }

    /// States in which the payload at this address is live and owned by
    /// the client (as opposed to overlaid by a placeholder).
    pub fn is_live_here(self) -> bool {
        matches!(self, BlockState::GcObj | BlockState::Frozen | BlockState::LObj)
    }
}

/// Three-valued result of testing whether an address range falls inside
/// a block or inside a block's user payload.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Membership {
    Outside,
    Partial,
    Fully,
}

/// Precedes every managed payload. `sz` is the total block size
/// (header + aligned payload area + tail); `usz` is the size the client
/// asked for. `p` is the forwarding pointer: it points at this block's
/// own payload while the block is live-in-place, at the new payload
/// once the block has been forwarded, and is null once the block is
/// dead (invariant I2).
#[repr(C)]
pub struct Header {
    pub magic: u64,
    pub state: BlockState,
    pub visited: bool,
    pub gc_info: GCInfoIndex,
    pub fcnt: u32,
    pub sz: usize,
    pub usz: usize,
    pub p: *mut u8,
    /// Owning arena, or null for large-region blocks (C6 never moves,
    /// so it has no arena back-pointer to rewrite).
    pub mp: *mut u8,
}

#[repr(C)]
pub struct Tail {
    pub magic: u64,
    pub sz: usize,
}

impl Header {
    pub const HEADER_SIZE: usize = size_of::<Header>();
    pub const TAIL_SIZE: usize = size_of::<Tail>();

    /// Total block size for a payload of `usz` bytes, word-aligned.
    pub fn block_size(usz: usize) -> usize {
        Self::HEADER_SIZE + align_up(usz.max(1), crate::util::WORD) + Self::TAIL_SIZE
    }

    pub unsafe fn payload(&self) -> *mut u8 {
        (self as *const Self as usize + Self::HEADER_SIZE) as *mut u8
    }

    unsafe fn tail(&self) -> *mut Tail {
        (self.payload() as usize + align_up(self.usz.max(1), crate::util::WORD)) as *mut Tail
    }

    /// Initializes a freshly carved-out, possibly uninitialized block
    /// in place. Takes a raw pointer rather than `&mut self` and writes
    /// every field through `addr_of_mut!` so no intermediate reference
    /// to the not-yet-valid `Header` is ever formed (the bytes behind
    /// `this` may still hold whatever the arena's backing memory last
    /// held, which is not a valid `BlockState` discriminant).
    pub unsafe fn init(
        this: *mut Self,
        state: BlockState,
        sz: usize,
        usz: usize,
        gc_info: GCInfoIndex,
        mp: *mut u8,
    ) {
        use std::ptr::addr_of_mut;
        addr_of_mut!((*this).magic).write(HEADER_MAGIC);
        addr_of_mut!((*this).state).write(state);
        addr_of_mut!((*this).visited).write(false);
        addr_of_mut!((*this).gc_info).write(gc_info);
        addr_of_mut!((*this).fcnt).write(0);
        addr_of_mut!((*this).sz).write(sz);
        addr_of_mut!((*this).usz).write(usz);
        addr_of_mut!((*this).mp).write(mp);
        let payload = (this as usize + Self::HEADER_SIZE) as *mut u8;
        addr_of_mut!((*this).p).write(payload);
        let tail = (payload as usize + align_up(usz.max(1), crate::util::WORD)) as *mut Tail;
        addr_of_mut!((*tail).magic).write(TAIL_MAGIC);
        addr_of_mut!((*tail).sz).write(sz);
    }

    /// `check()` from the design notes: validates magics and the
    /// header/tail size agreement. Gated behind debug assertions at call
    /// sites per the "`check()` vs. performance" design note.
    pub unsafe fn check(&self) -> bool {
        if self.magic != HEADER_MAGIC {
            return false;
        }
        let tail = &*self.tail();
        tail.magic == TAIL_MAGIC && tail.sz == self.sz
    }

    pub fn set_visited(&mut self) -> bool {
        if self.visited {
            return false;
        }
        self.visited = true;
        true
    }

    pub fn clear_visited(&mut self) {
        self.visited = false;
    }

    /// Three-valued membership test for a `[p, p+len)` range against
    /// this block's full extent (header through tail).
    pub unsafe fn in_block(&self, p: *const u8, len: usize) -> Membership {
        let start = self as *const Self as usize;
        let end = start + self.sz;
        membership(start, end, p as usize, len)
    }

    /// Same, but restricted to the user payload (used by the
    /// silent-ignore registration policy of C7/C8/C9).
    pub unsafe fn in_payload(&self, p: *const u8, len: usize) -> Membership {
        let start = self.payload() as usize;
        let end = start + self.usz;
        membership(start, end, p as usize, len)
    }

    /// Forwards this (now-dead-here) block to a new location, per
    /// `Header::forward_to` (§4.1). The caller is responsible for
    /// overlaying a placeholder payload and choosing the right
    /// forwarding state.
    pub fn forward_to(&mut self, state: BlockState, new_payload: *mut u8) {
        debug_assert!(state.is_forwarded());
        self.state = state;
        self.p = new_payload;
    }
}

fn membership(block_start: usize, block_end: usize, p: usize, len: usize) -> Membership {
    let p_end = p + len;
    if p >= block_start && p_end <= block_end {
        Membership::Fully
    } else if p < block_end && p_end > block_start {
        Membership::Partial
    } else {
        Membership::Outside
    }
}

/// Recovers the header from an interior pointer known to be exactly a
/// payload address (i.e. already validated against an arena via
/// `get_block_head`).
pub unsafe fn header_of(payload: *mut u8) -> *mut Header {
    (payload as usize - Header::HEADER_SIZE) as *mut Header
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gc_info_table::GCInfoIndex;

    fn dummy_index() -> GCInfoIndex {
        GCInfoIndex(1)
    }

    #[test]
    fn init_and_check_round_trip() {
        let usz = 24;
        let sz = Header::block_size(usz);
        let mut buf = vec![0u8; sz];
        unsafe {
            let header = &mut *(buf.as_mut_ptr() as *mut Header);
            Header::init(header, BlockState::GcObj, sz, usz, dummy_index(), std::ptr::null_mut());
            assert!(header.check());
            assert_eq!(
                header.payload() as usize,
                buf.as_ptr() as usize + Header::HEADER_SIZE
            );
        }
    }

    #[test]
    fn membership_distinguishes_outside_partial_fully() {
        let usz = 16;
        let sz = Header::block_size(usz);
        let mut buf = vec![0u8; sz];
        unsafe {
            let header = &mut *(buf.as_mut_ptr() as *mut Header);
            Header::init(header, BlockState::GcObj, sz, usz, dummy_index(), std::ptr::null_mut());
            let payload = header.payload();
            assert_eq!(header.in_payload(payload, 4), Membership::Fully);
            let past_end = (payload as usize + usz) as *mut u8;
            assert_eq!(header.in_payload(past_end, 4), Membership::Outside);
            let straddling = (payload as usize + usz - 2) as *mut u8;
            assert_eq!(header.in_payload(straddling, 4), Membership::Partial);
        }
    }
}
