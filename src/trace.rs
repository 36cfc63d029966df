//! The client-facing contract: types that want to live on the managed
//! heap implement [`Trace`] (to enumerate outgoing reference slots) and
//! [`Collectable`] (to opt in to allocation). Grounded on the teacher
//! crate's `api::Trace`/`api::Collectable`, simplified to a single
//! mutator and without the mark-bit visitor the teacher's mark-sweep
//! variants need.

use crate::gcref::{Gc, UntypedGc};

/// Receives one callback per outgoing reference slot a [`Trace`]
/// implementation owns. `label` is an arbitrary, implementation-chosen
/// name surfaced in dangling-reference diagnostics (§4.10 of the design
/// notes); it does not have to be unique.
pub trait Walker {
    fn walk(&mut self, label: &str, slot: &mut UntypedGc);
}

/// Enumerates every managed reference a value owns. Must call
/// `walker.walk` once per slot, in a stable order (ordering invariant
/// (a) of the concurrency & resource model).
///
/// # Safety
/// Implementors must enumerate *every* outgoing managed reference; a
/// slot left untraced can be collected out from under the object while
/// it is still reachable.
pub unsafe trait Trace {
    fn trace(&mut self, walker: &mut dyn Walker);
}

/// Runs right before a block's storage is reused. Mirrors the teacher's
/// `Finalize` marker trait: most types need no custom teardown, but a
/// type wrapping a non-managed resource (a file descriptor, say) can
/// override `finalize`.
///
/// # Safety
/// Must not touch any other managed reference: by the time finalize
/// runs, referents may already have been reclaimed.
pub unsafe trait Finalize {
    fn finalize(&mut self) {}
}

/// Marker opting a type in to `allocate`/`freeze`. Requires `Trace` and
/// `Finalize` so the collector always has a trace and finalize thunk to
/// register in the `GcInfo` table (§4.0).
pub trait Collectable: Trace + Finalize + 'static {}

unsafe impl<T: Trace> Trace for Gc<T> {
    fn trace(&mut self, walker: &mut dyn Walker) {
        walker.walk("gc", &mut self.raw);
    }
}

macro_rules! impl_leaf {
    ($($t:ty)*) => {
        $(
            unsafe impl Trace for $t {
                fn trace(&mut self, _walker: &mut dyn Walker) {}
            }
            unsafe impl Finalize for $t {}
            impl Collectable for $t {}
        )*
    };
}

impl_leaf!(bool f32 f64 u8 u16 u32 u64 u128 i8 i16 i32 i64 i128 String);

unsafe impl<T: Trace> Trace for Option<T> {
    fn trace(&mut self, walker: &mut dyn Walker) {
        if let Some(inner) = self {
            inner.trace(walker);
        }
    }
}
unsafe impl<T: Finalize> Finalize for Option<T> {}
impl<T: Collectable> Collectable for Option<T> {}

unsafe impl<T: Trace> Trace for Vec<T> {
    fn trace(&mut self, walker: &mut dyn Walker) {
        for item in self.iter_mut() {
            item.trace(walker);
        }
    }
}
unsafe impl<T: Finalize> Finalize for Vec<T> {}
impl<T: Collectable> Collectable for Vec<T> {}
