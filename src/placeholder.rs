//! Fixed payload overlays written onto dead or forwarded blocks,
//! grounded on the reference implementation's `private/moved.hxx`,
//! `removed.hxx` and `fremoved.hxx`. The REDESIGN FLAGS section calls
//! for dispatching on these through the header's state tag rather than
//! through a polymorphic placeholder object reconstructed via
//! `transmute`-a-vtable; these structs exist purely so the bytes behind
//! a dead or forwarded payload read as a recognizable sentinel (useful
//! under a debugger or `check()`) — nothing in this crate ever calls a
//! method through them. All state-dependent behavior is driven by
//! `Header::state` (see `collector::walk`).

use crate::header::Header;

/// Overlaid on a `GcMoved`/`GcFrozen`/`Unfrozen` block's old payload.
/// `dest` duplicates `Header::p` so the overlay is self-describing even
/// without consulting the header.
#[repr(C)]
pub struct Moved {
    pub dest: *mut Header,
}

/// Overlaid on a `GcRm`/`LRemoved` block: there is nothing left to say.
#[repr(C)]
pub struct Removed;

/// Overlaid on an `FRemoved` block in the pinned region's free-list
/// (component C5). `next`/`prev` thread the list in address order.
#[repr(C)]
pub struct FreeListNode {
    pub next: *mut Header,
    pub prev: *mut Header,
}

/// # Safety
/// `header` must designate a block at least as large as `Moved` whose
/// state has just been set to one of the forwarded states.
pub unsafe fn overlay_moved(header: *mut Header, dest: *mut Header) {
    let payload = (*header).payload() as *mut Moved;
    payload.write(Moved { dest });
}

/// # Safety
/// `header` must designate a block whose state has just been set to a
/// terminal dead state with no free-list linkage (`GcRm`/`LRemoved`).
pub unsafe fn overlay_removed(header: *mut Header) {
    let payload = (*header).payload() as *mut Removed;
    payload.write(Removed);
}

/// # Safety
/// `header` must designate an `FRemoved` block at least as large as
/// `FreeListNode`, which `Header::block_size` guarantees for every
/// block (the minimum block size covers the free-list node payload).
pub unsafe fn overlay_free_node(header: *mut Header, next: *mut Header, prev: *mut Header) {
    let payload = (*header).payload() as *mut FreeListNode;
    payload.write(FreeListNode { next, prev });
}

/// # Safety
/// `header` must designate an `FRemoved` block previously overlaid with
/// `overlay_free_node`.
pub unsafe fn free_node(header: *mut Header) -> &'static mut FreeListNode {
    &mut *((*header).payload() as *mut FreeListNode)
}
