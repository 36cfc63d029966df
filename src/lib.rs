//! A precise, moving, copying garbage collector with pinning and weak
//! references. See `README.md` for the component overview.

mod arena;
mod collector;
mod copying;
mod error;
mod gc_info_table;
mod gcref;
mod header;
mod large;
mod options;
mod pinned;
mod placeholder;
mod roots;
mod stats;
mod trace;
mod util;
mod walkers;
mod weak;

#[cfg(test)]
mod tests;

pub use error::{GcError, GcResult};
pub use gcref::{Field, Gc, UntypedGc, WeakGc};
pub use options::CollectorOptions;
pub use stats::Statistics;
pub use trace::{Collectable, Finalize, Trace, Walker};

/// Allocates `value` on the managed heap and returns a handle to it.
/// The returned `Gc<T>` is not itself a root — keep it reachable either
/// by registering it with [`register_root`] or by storing it inside
/// another object already reachable from a root.
pub fn allocate<T: Collectable>(value: T) -> Gc<T> {
    collector::with(|c| c.allocate(value))
}

/// Reclaims `gc` immediately, without waiting for the next collection.
/// Returns `false` if the block was already dead or pinned via another
/// handle and this call merely dropped a pin count without freeing
/// anything.
pub fn deallocate<T: Collectable>(gc: Gc<T>) -> bool {
    collector::with(|c| c.deallocate(gc))
}

/// Registers `slot` as a root under `label`: it and everything
/// reachable from it survive every collection until unregistered.
pub fn register_root<T: Collectable>(label: &str, slot: &mut Gc<T>) {
    collector::with(|c| c.register_root(label, slot))
}

pub fn unregister_root<T: Collectable>(slot: &mut Gc<T>) {
    collector::with(|c| c.unregister_root(slot))
}

pub fn unregister_all_roots() {
    collector::with(|c| c.unregister_all_roots())
}

/// Registers a non-managed `object` (anything outside the collector's
/// own arenas) that embeds one or more managed references, so its
/// `Trace` impl gets walked on every collection.
pub fn register_walker<O: Trace>(label: &str, object: &mut O) {
    collector::with(|c| c.register_walker(label, object))
}

pub fn unregister_walker<O>(object: &mut O) {
    collector::with(|c| c.unregister_walker(object))
}

pub fn unregister_all_walkers() {
    collector::with(|c| c.unregister_all_walkers())
}

/// Registers a weak handle: the collector nulls it out once its
/// referent becomes unreachable instead of keeping it alive.
pub fn register_weak<T: Collectable>(slot: &mut WeakGc<T>) {
    collector::with(|c| c.register_weak(slot))
}

pub fn unregister_weak<T: Collectable>(slot: &mut WeakGc<T>) {
    collector::with(|c| c.unregister_weak(slot))
}

pub fn unregister_all_weak() {
    collector::with(|c| c.unregister_all_weak())
}

/// Moves `slot`'s referent into the pinned region (or increments its
/// pin count if already there), guaranteeing its address never changes
/// again until a matching [`unfreeze`]. Set `do_update_pointers` to
/// immediately fix up every other root/weak reference to the same
/// object; otherwise they settle on the next collection.
pub fn freeze<T: Collectable>(slot: &mut Gc<T>, do_update_pointers: bool) {
    collector::with(|c| c.freeze(slot, do_update_pointers))
}

/// Drops one pin count; once it reaches zero the referent becomes
/// movable again and rejoins the copying region.
pub fn unfreeze<T: Collectable>(slot: &mut Gc<T>, do_update_pointers: bool) -> bool {
    collector::with(|c| c.unfreeze(slot, do_update_pointers))
}

/// Walks `slot` without waiting for a full collection, returning an
/// error if it designates a block that has already been reclaimed.
pub fn check<T: Collectable>(slot: &mut Gc<T>) -> GcResult<()> {
    collector::with(|c| c.check(slot))
}

/// Runs a full stop-the-world collection now. Returns an error if a
/// registered root or walker object turned out to reference a block
/// that had already been reclaimed (e.g. via an explicit [`deallocate`]
/// call that bypassed the root table) — the collection itself still
/// runs to completion either way.
pub fn gc() -> GcResult<()> {
    collector::with(|c| c.gc())
}

/// Rewrites every root to its current (possibly forwarded) address
/// without performing a full collection. Returns an error under the
/// same dangling-reference condition as [`gc`].
pub fn gc_update_pointers() -> GcResult<()> {
    collector::with(|c| c.gc_update_pointers())
}

pub fn pointer_ok(p: *const u8) -> bool {
    collector::with(|c| c.pointer_ok(p))
}

pub fn data_ok(p: *const u8, len: usize) -> bool {
    collector::with(|c| c.data_ok(p, len))
}

/// Sets the minimum payload size (in bytes) routed to the large-object
/// region instead of the copying region; returns the previous value.
pub fn set_large_threshold(bytes: usize) -> usize {
    collector::with(|c| c.set_large_threshold(bytes))
}

/// Grows the copying region to hold at least `new_total` bytes across
/// its two semispaces combined.
pub fn resize(new_total: usize) {
    collector::with(|c| c.resize(new_total))
}

pub fn report() -> String {
    collector::with(|c| c.report())
}

pub fn with_statistics<R>(f: impl FnOnce(&Statistics) -> R) -> R {
    collector::with(|c| f(c.statistics()))
}

/// Reinitializes the collector singleton with fresh options. Intended
/// for test setup or a one-time call at process startup; state from
/// before the call (every live object, root and weak handle) is
/// dropped without finalization.
pub fn with_options(options: CollectorOptions) {
    collector::with_options(options)
}
