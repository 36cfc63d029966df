//! The collector driver (component C10): owns the copying, pinned and
//! large regions plus the three reference tables, and orchestrates
//! allocation, collection, freeze/unfreeze and pointer validation.
//! Grounded on the reference implementation's `private/gcpriv.cxx`
//! (global singleton state: one `GCpool`, one `Fpool`, one `Lpool`, one
//! each of `PtrPool`/`FPtrPool`/`WPtrPool`) and on the "Global singleton
//! state" design note, which substitutes the teacher's
//! `parking_lot`/`atomic`/`crossbeam-utils` locking stack (needed only
//! for its multi-threaded generational/immix variants) with a single
//! `thread_local!` `RefCell`, since this collector assumes one mutator.

use std::cell::RefCell;
use std::ptr::NonNull;
use std::time::Instant;

use crate::copying::CopyingRegion;
use crate::error::{fatal_error, GcError, GcResult};
use crate::gc_info_table::{gc_info_of, GCInfoTrait};
use crate::gcref::{Gc, UntypedGc, WeakGc};
use crate::header::{header_of, BlockState, Header};
use crate::large::LargeRegion;
use crate::options::CollectorOptions;
use crate::pinned::PinnedRegion;
use crate::roots::RootTable;
use crate::stats::Statistics;
use crate::trace::{Collectable, Trace, Walker};
use crate::walkers::WalkerTable;
use crate::weak::WeakTable;

fn nn<T>(p: *mut T) -> NonNull<T> {
    NonNull::new(p).unwrap_or_else(|| fatal_error("unexpected null pointer in collector internals"))
}

pub struct Collector {
    copying: CopyingRegion,
    pinned: PinnedRegion,
    large: LargeRegion,
    roots: RootTable,
    walkers: WalkerTable,
    weak: WeakTable,
    stats: Statistics,
    options: CollectorOptions,
    /// The first dangling-reference error encountered by `walk_checked`
    /// during the current walk, if any. Recorded here (rather than
    /// threaded through `impl Walker for Collector::walk`, whose `()`
    /// return type is fixed by the public `Walker` trait) so that a
    /// stale reference found while tracing one object's fields is not
    /// silently dropped; `gc()`/`gc_update_pointers()` surface it to
    /// their caller once the walk finishes instead of swallowing it.
    pending_error: Option<GcError>,
}

impl Collector {
    fn new(options: CollectorOptions) -> Self {
        Self {
            copying: CopyingRegion::new(options.semispace_size),
            pinned: PinnedRegion::new(),
            large: LargeRegion::new(),
            roots: RootTable::new(),
            walkers: WalkerTable::new(),
            weak: WeakTable::new(),
            stats: Statistics::default(),
            options,
            pending_error: None,
        }
    }

    fn assert_not_in_gc(&self) {
        if self.stats.in_gc {
            fatal_error("reentrant collector call: allocate/freeze/deallocate/gc called from within a walker");
        }
    }

    // ---- C0/C1: trace dispatch through the header's GcInfo index ----

    fn trace_payload(&mut self, header: *mut Header) {
        let info = gc_info_of(unsafe { (*header).gc_info });
        let payload = unsafe { (*header).payload() };
        unsafe { (info.trace)(payload, self) };
    }

    /// The sole mechanism by which references are traced (§4.10).
    /// Returns an error if `slot` designates a dead block (a dangling
    /// reference); otherwise rewrites `*slot` to the (possibly new)
    /// live address and, for never-before-visited `GcObj` blocks,
    /// copies them into the active semispace and recurses.
    fn walk_checked(&mut self, label: &str, slot: &mut UntypedGc) -> GcResult<()> {
        if let Some(err) = &self.pending_error {
            return Err(err.clone());
        }
        let header = slot.header_ptr();
        unsafe {
            if header.is_null() {
                return Ok(());
            }
            if (*header).magic != crate::header::HEADER_MAGIC {
                fatal_error(format!("corrupt header magic while walking `{}`", label));
            }
            if (self.options.force_checks || cfg!(debug_assertions)) && !(*header).check() {
                fatal_error(format!("header/tail mismatch while walking `{}`", label));
            }
            if (*header).visited {
                if (*header).state.is_forwarded() {
                    let new_header = header_of((*header).p);
                    *slot = UntypedGc::from_header(nn(new_header));
                }
                return Ok(());
            }
            (*header).set_visited();
            match (*header).state {
                BlockState::GcObj => {
                    let new_header = self.copying.copy_out(header, BlockState::GcMoved);
                    *slot = UntypedGc::from_header(nn(new_header));
                    self.trace_payload(new_header);
                    Ok(())
                }
                BlockState::Frozen | BlockState::LObj => {
                    self.trace_payload(header);
                    Ok(())
                }
                BlockState::GcMoved | BlockState::GcFrozen | BlockState::Unfrozen => {
                    let new_header = header_of((*header).p);
                    *slot = UntypedGc::from_header(nn(new_header));
                    self.walk_checked(label, slot)
                }
                state if state.is_dead() => {
                    let err = GcError::DanglingReference {
                        label: label.to_string(),
                    };
                    self.pending_error.get_or_insert_with(|| err.clone());
                    Err(err)
                }
                _ => fatal_error("unknown block state encountered during walk"),
            }
        }
    }

    fn notify_migrated(&mut self, old: *mut Header, new: *mut Header) {
        let delta = new as isize - old as isize;
        self.roots.update_pp(nn(old), nn(new));
        self.weak.update_pp(nn(old), nn(new), delta);
    }

    // ---- C4.8: allocate / deallocate ----

    pub fn allocate<T: Collectable>(&mut self, value: T) -> Gc<T> {
        self.assert_not_in_gc();
        self.pinned.coalesce_pending();
        let usz = std::mem::size_of::<T>();
        let gc_info = T::index();
        let header = if usz >= self.options.large_threshold {
            self.large.alloc(usz, gc_info)
        } else {
            self.alloc_copying(usz, gc_info)
        };
        unsafe {
            std::ptr::write((*header).payload().cast::<T>(), value);
            self.stats.record_alloc((*header).sz);
            Gc::from_header(nn(header))
        }
    }

    fn alloc_copying(&mut self, usz: usize, gc_info: crate::gc_info_table::GCInfoIndex) -> *mut Header {
        if let Some(h) = self.copying.alloc(usz, gc_info) {
            return h;
        }
        // a dangling root found here is still reported on the next
        // explicit `gc()`/`gc_update_pointers()` call; allocation itself
        // only needs the space this collection frees up.
        let _ = self.gc();
        if let Some(h) = self.copying.alloc(usz, gc_info) {
            return h;
        }
        let new_size = (self.copying.active.capacity() * 2).max(32 * 1024 * 1024);
        self.grow_copying(new_size);
        self.copying
            .alloc(usz, gc_info)
            .unwrap_or_else(|| fatal_error("allocation failed even after growing the copying region"))
    }

    /// Grows the active semispace to `new_semispace_size`, preserving
    /// everything currently live in it by bulk-copying its raw bytes and
    /// applying one constant address delta across the root and weak
    /// tables (the same technique `resize` uses for a client-initiated
    /// grow). The spare semispace is reallocated empty at the same size
    /// since it holds nothing live between collections.
    fn grow_copying(&mut self, new_semispace_size: usize) {
        let old_start = self.copying.active.start();
        let old_used = self.copying.active.used();

        let mut new_active = crate::arena::Arena::new(new_semispace_size);
        unsafe {
            std::ptr::copy_nonoverlapping(old_start, new_active.start(), old_used);
        }
        new_active.adopt_used(old_used);
        let delta = new_active.start() as isize - old_start as isize;

        let mut migrations = Vec::new();
        new_active.iterate(|new_header: *mut Header| {
            let old_header = (new_header as isize - delta) as *mut Header;
            migrations.push((old_header, new_header));
        });
        for (old_header, new_header) in migrations {
            self.notify_migrated(old_header, new_header);
        }

        self.copying.active = new_active;
        self.copying.spare = crate::arena::Arena::new(new_semispace_size);
    }

    pub fn deallocate<T: Collectable>(&mut self, g: Gc<T>) -> bool {
        self.assert_not_in_gc();
        self.pinned.coalesce_pending();
        let result = self.deallocate_raw(g.downcast());
        self.weak.update_all();
        result
    }

    fn deallocate_raw(&mut self, g: UntypedGc) -> bool {
        let header = g.header_ptr();
        unsafe {
            match (*header).state {
                BlockState::GcObj => {
                    let info = gc_info_of((*header).gc_info);
                    (info.finalize)((*header).payload());
                    crate::placeholder::overlay_removed(header);
                    (*header).state = BlockState::GcRm;
                    (*header).p = std::ptr::null_mut();
                    self.stats.record_dealloc((*header).sz);
                    true
                }
                BlockState::Frozen => {
                    let info = gc_info_of((*header).gc_info);
                    (info.finalize)((*header).payload());
                    self.stats.record_dealloc((*header).sz);
                    self.pinned.release(header);
                    true
                }
                BlockState::LObj => {
                    let info = gc_info_of((*header).gc_info);
                    (info.finalize)((*header).payload());
                    self.stats.record_dealloc((*header).sz);
                    self.large.deallocate_now(header);
                    true
                }
                BlockState::GcMoved | BlockState::GcFrozen | BlockState::Unfrozen => {
                    let new_header = header_of((*header).p);
                    self.deallocate_raw(UntypedGc::from_header(nn(new_header)))
                }
                _ => false,
            }
        }
    }

    // ---- C7/C8/C9: registration ----

    pub fn register_root<T: Collectable>(&mut self, label: &str, slot: &mut Gc<T>) {
        let ptr = slot as *mut Gc<T> as *mut UntypedGc;
        self.roots.register(label, nn(ptr));
    }

    pub fn unregister_root<T: Collectable>(&mut self, slot: &mut Gc<T>) {
        let ptr = slot as *mut Gc<T> as *mut UntypedGc;
        self.roots.unregister(nn(ptr));
    }

    pub fn unregister_all_roots(&mut self) {
        self.roots.unregister_all();
    }

    pub fn register_walker<O: Trace>(&mut self, label: &str, object: &mut O) {
        unsafe fn thunk<O: Trace>(object: *mut u8, walker: &mut dyn Walker) {
            (&mut *object.cast::<O>()).trace(walker);
        }
        self.walkers.register(label, (object as *mut O).cast(), thunk::<O>);
    }

    pub fn unregister_walker<O>(&mut self, object: &mut O) {
        self.walkers.unregister((object as *mut O).cast());
    }

    pub fn unregister_all_walkers(&mut self) {
        self.walkers.unregister_all();
    }

    pub fn register_weak<T: Collectable>(&mut self, slot: &mut WeakGc<T>) {
        let ptr = &mut slot.slot as *mut Option<UntypedGc>;
        self.weak.register(nn(ptr));
    }

    pub fn unregister_weak<T: Collectable>(&mut self, slot: &mut WeakGc<T>) {
        let ptr = &mut slot.slot as *mut Option<UntypedGc>;
        self.weak.unregister(nn(ptr));
    }

    pub fn unregister_all_weak(&mut self) {
        self.weak.unregister_all();
    }

    // ---- C4.9: freeze / unfreeze ----

    pub fn freeze<T: Collectable>(&mut self, slot: &mut Gc<T>, do_update_pointers: bool) {
        self.assert_not_in_gc();
        self.pinned.coalesce_pending();
        let header = slot.downcast().header_ptr();
        unsafe {
            match (*header).state {
                BlockState::GcObj => {
                    let usz = (*header).usz;
                    let gc_info = (*header).gc_info;
                    let new_header = self.pinned.alloc_frozen(usz, gc_info);
                    std::ptr::copy_nonoverlapping((*header).payload(), (*new_header).payload(), usz);
                    (*header).forward_to(BlockState::GcFrozen, (*new_header).payload());
                    crate::placeholder::overlay_moved(header, new_header);
                    self.notify_migrated(header, new_header);
                    *slot = Gc::from_header(nn(new_header));
                }
                BlockState::Frozen => {
                    (*header).fcnt += 1;
                }
                BlockState::LObj => {
                    (*header).fcnt += 1;
                }
                _ => fatal_error("freeze called on a block in an illegal state"),
            }
        }
        self.stats.record_freeze();
        if do_update_pointers {
            // freeze's own contract (§4.9) doesn't surface this error;
            // a dangling root found here is still reported on the next
            // explicit `gc()`/`gc_update_pointers()` call.
            let _ = self.gc_update_pointers();
        }
    }

    /// Returns `false` if there was nothing to do (already unpinned, or
    /// already dead — the ambiguous case flagged as an Open Question in
    /// the design notes; this crate resolves it by treating a dead
    /// referent as a no-op rather than a fatal error).
    pub fn unfreeze<T: Collectable>(&mut self, slot: &mut Gc<T>, do_update_pointers: bool) -> bool {
        self.assert_not_in_gc();
        self.pinned.coalesce_pending();
        let header = slot.downcast().header_ptr();
        let did_something = unsafe {
            match (*header).state {
                BlockState::Frozen => {
                    if (*header).fcnt > 0 {
                        (*header).fcnt -= 1;
                    }
                    if (*header).fcnt == 0 {
                        let usz = (*header).usz;
                        let gc_info = (*header).gc_info;
                        let new_header = self
                            .copying
                            .alloc(usz, gc_info)
                            .unwrap_or_else(|| fatal_error("copying region exhausted during unfreeze"));
                        std::ptr::copy_nonoverlapping((*header).payload(), (*new_header).payload(), usz);
                        (*header).forward_to(BlockState::Unfrozen, (*new_header).payload());
                        crate::placeholder::overlay_moved(header, new_header);
                        self.notify_migrated(header, new_header);
                        *slot = Gc::from_header(nn(new_header));
                    }
                    true
                }
                BlockState::LObj => {
                    if (*header).fcnt > 0 {
                        (*header).fcnt -= 1;
                    }
                    true
                }
                BlockState::GcObj => false,
                state if state.is_dead() => false,
                _ => fatal_error("unfreeze called on a block in an illegal state"),
            }
        };
        self.stats.record_unfreeze();
        if do_update_pointers {
            let _ = self.gc_update_pointers();
        }
        did_something
    }

    // ---- explicit client-facing walk (§4.10, scenario 4) ----

    pub fn check<T: Collectable>(&mut self, slot: &mut Gc<T>) -> GcResult<()> {
        let mut raw = slot.downcast();
        let result = self.walk_checked("check", &mut raw);
        if let Some(gc) = raw.cast::<T>() {
            *slot = gc;
        }
        self.clear_visited_all();
        result
    }

    fn clear_visited_all(&mut self) {
        self.copying.active.iterate(|h: *mut Header| unsafe { (*h).clear_visited() });
        self.copying.spare.iterate(|h: *mut Header| unsafe { (*h).clear_visited() });
        self.pinned.iterate_all(|h: *mut Header| unsafe { (*h).clear_visited() });
        self.large.iterate(|h: *mut Header| unsafe { (*h).clear_visited() });
    }

    // ---- C10: the collection itself (§4.3) ----

    /// Runs a full stop-the-world collection. Returns the first
    /// dangling-reference error encountered while walking a root or a
    /// walker object — a registered slot whose referent was explicitly
    /// `deallocate`d out from under it — rather than silently leaving
    /// the stale pointer in place (§4.10, §7). The rest of the
    /// collection still runs to completion (sweeping, weak-table
    /// fix-up) so the heap is left consistent; only the error report is
    /// deferred to the end.
    pub fn gc(&mut self) -> GcResult<()> {
        self.assert_not_in_gc();
        self.pending_error = None;
        let start = Instant::now();
        self.stats.in_gc = true;

        self.copying.swap();

        let mut roots = std::mem::take(&mut self.roots);
        roots.walk(|label, slot| {
            let _ = self.walk_checked(label, slot);
        });
        self.roots = roots;

        let mut walkers = std::mem::take(&mut self.walkers);
        walkers.walk(|label, slot| {
            let _ = self.walk_checked(label, slot);
        });
        self.walkers = walkers;

        let mut frozen = Vec::new();
        self.pinned.iterate_frozen(|h| frozen.push(h));
        for header in frozen {
            self.trace_payload(header);
        }

        let mut large_live = Vec::new();
        self.large.iterate(|h| large_live.push(h));
        for header in large_live {
            unsafe {
                if (*header).state == BlockState::LObj && (*header).fcnt > 0 {
                    (*header).visited = true;
                    self.trace_payload(header);
                }
            }
        }

        let mut reclaimed = 0u64;
        let mut dealloc_sizes = Vec::new();
        self.copying.sweep_spare(|dead_header| unsafe {
            let info = gc_info_of((*dead_header).gc_info);
            (info.finalize)((*dead_header).payload());
            reclaimed += (*dead_header).sz as u64;
            dealloc_sizes.push((*dead_header).sz);
        });
        for sz in dealloc_sizes {
            self.stats.record_dealloc(sz);
        }
        self.copying.clear_spare();

        self.large.sweep_mark();
        self.large.release_dead();
        self.pinned.reclaim_unfrozen();

        self.weak.update_all();

        self.stats.in_gc = false;
        let elapsed = start.elapsed();
        self.stats.record_gc(elapsed);
        if self.options.verbose {
            eprintln!(
                "[gc] pause reclaimed={}B elapsed={:?} live_roots={} live_weak={}",
                reclaimed,
                elapsed,
                self.roots.len(),
                self.weak.len()
            );
        }

        match self.pending_error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Rewrites every root's slot to its (possibly forwarded) current
    /// address without moving anything, for use after freeze/unfreeze/
    /// deallocate or a resize. Checks `is_dead()` the same way
    /// `walk_checked` does: a root whose referent has already been
    /// reclaimed is reported as a dangling reference rather than left
    /// pointing at reclaimed storage.
    pub fn gc_update_pointers(&mut self) -> GcResult<()> {
        let mut roots = std::mem::take(&mut self.roots);
        let mut first_err = None;
        roots.walk(|label, slot| unsafe {
            let mut header = slot.header_ptr();
            while (*header).state.is_forwarded() {
                header = header_of((*header).p);
            }
            if (*header).state.is_dead() {
                first_err.get_or_insert_with(|| GcError::DanglingReference {
                    label: label.to_string(),
                });
                return;
            }
            *slot = UntypedGc::from_header(nn(header));
        });
        self.roots = roots;
        self.weak.update_all();
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    // ---- §6: validation, configuration, statistics ----

    fn find_header(&self, p: *const u8) -> Option<*mut Header> {
        let mut found = None;
        let mut check = |h: *mut Header| {
            if found.is_none() && unsafe { (*h).in_block(p, 1) } != crate::header::Membership::Outside {
                found = Some(h);
            }
        };
        self.copying.active.iterate(&mut check);
        self.copying.spare.iterate(&mut check);
        self.pinned.iterate_all(&mut check);
        self.large.iterate(&mut check);
        found
    }

    pub fn pointer_ok(&self, p: *const u8) -> bool {
        match self.find_header(p) {
            Some(h) => unsafe { std::ptr::eq((*h).payload() as *const u8, p) && (*h).state.is_live_here() },
            None => false,
        }
    }

    pub fn data_ok(&self, p: *const u8, len: usize) -> bool {
        match self.find_header(p) {
            Some(h) => unsafe {
                (*h).state.is_live_here() && (*h).in_payload(p, len) == crate::header::Membership::Fully
            },
            None => false,
        }
    }

    pub fn set_large_threshold(&mut self, bytes: usize) -> usize {
        let previous = self.options.large_threshold;
        self.options.large_threshold = bytes.max(4 * 1024);
        previous
    }

    /// Grows both copying-region semispaces to hold at least
    /// `new_total` bytes combined, preserving every object currently in
    /// `active` by copying its raw bytes into the new arena and
    /// rewriting every root/weak table entry anchored to the old
    /// arena by the (constant, since relative layout is preserved)
    /// address delta. See the "resize() interaction" Open Question in
    /// the design notes for the limits of this approach (it does not
    /// touch the pinned or large regions, which never move anyway).
    pub fn resize(&mut self, new_total: usize) {
        self.assert_not_in_gc();
        let new_semi = (new_total / 2).max(self.copying.active.capacity());
        self.grow_copying(new_semi);
    }

    pub fn statistics(&self) -> &Statistics {
        &self.stats
    }

    pub fn report(&self) -> String {
        format!("{}", self.stats)
    }
}

impl Walker for Collector {
    fn walk(&mut self, label: &str, slot: &mut UntypedGc) {
        let _ = self.walk_checked(label, slot);
    }
}

thread_local! {
    static COLLECTOR: RefCell<Collector> = RefCell::new(Collector::new(CollectorOptions::default()));
}

/// Reinitializes the singleton with fresh options. Intended for test
/// setup; in a long-running process the defaults (or `with_options`
/// once at startup) are normally enough.
pub fn with_options(options: CollectorOptions) {
    COLLECTOR.with(|c| *c.borrow_mut() = Collector::new(options));
}

pub fn with<R>(f: impl FnOnce(&mut Collector) -> R) -> R {
    COLLECTOR.with(|c| f(&mut c.borrow_mut()))
}
