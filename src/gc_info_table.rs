//! Type-erased trace/finalize dispatch, grounded on the teacher crate's
//! `gc_info_table.rs` / `internal/gc_info.rs`. The teacher's version is
//! built for a concurrently-mutated heap: a fixed `Mmap`-backed array,
//! atomics for the current index, and a `TypeId`-hash lookup table
//! sized for worst-case collisions. With a single mutator and no
//! cross-thread registration there is no need for any of that — a
//! growable `Vec` behind a `RefCell` is enough, keyed by `TypeId` in a
//! second `RefCell<HashMap<..>>` the first time each `Collectable` type
//! is allocated.
//!
//! An earlier draft tried to cache each type's index in a `static`
//! local to the body of the generic `GCInfoTrait::index` function,
//! relying on "one static per monomorphization" — that guarantee does
//! not actually hold when the static's own type never mentions the
//! generic parameter, so distinct types silently shared one cache slot.
//! The `TypeId` map below is the correct, if slightly less cute, fix.

use std::any::TypeId;
use std::cell::RefCell;
use std::collections::HashMap;

use crate::trace::{Collectable, Walker};

pub type TraceCallback = unsafe fn(*mut u8, &mut dyn Walker);
pub type FinalizeCallback = unsafe fn(*mut u8);

/// Per-type dispatch thunks, one entry per distinct `Collectable` type
/// ever allocated.
#[derive(Clone, Copy)]
pub struct GCInfo {
    pub trace: TraceCallback,
    pub finalize: FinalizeCallback,
}

/// Index of a [`GCInfo`] entry. `0` is never issued and is used as a
/// sentinel for "not yet registered".
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Debug, Hash)]
#[repr(transparent)]
pub struct GCInfoIndex(pub(crate) u16);

thread_local! {
    static GC_INFO_TABLE: RefCell<Vec<GCInfo>> = const { RefCell::new(Vec::new()) };
    static INDEX_BY_TYPE: RefCell<HashMap<TypeId, GCInfoIndex>> = RefCell::new(HashMap::new());
}

fn register(info: GCInfo) -> GCInfoIndex {
    GC_INFO_TABLE.with(|table| {
        let mut table = table.borrow_mut();
        table.push(info);
        GCInfoIndex(table.len() as u16)
    })
}

pub fn gc_info_of(index: GCInfoIndex) -> GCInfo {
    GC_INFO_TABLE.with(|table| table.borrow()[index.0 as usize - 1])
}

unsafe fn trace_thunk<T: Collectable>(object: *mut u8, walker: &mut dyn Walker) {
    (&mut *object.cast::<T>()).trace(walker);
}

unsafe fn finalize_thunk<T: Collectable>(object: *mut u8) {
    (&mut *object.cast::<T>()).finalize();
}

/// Lazily registers `T` the first time it is allocated and returns the
/// index to stash in its header from then on.
pub trait GCInfoTrait<T: Collectable> {
    fn index() -> GCInfoIndex;
}

impl<T: Collectable> GCInfoTrait<T> for T {
    fn index() -> GCInfoIndex {
        let type_id = TypeId::of::<T>();
        if let Some(index) = INDEX_BY_TYPE.with(|m| m.borrow().get(&type_id).copied()) {
            return index;
        }
        let index = register(GCInfo {
            trace: trace_thunk::<T>,
            finalize: finalize_thunk::<T>,
        });
        INDEX_BY_TYPE.with(|m| m.borrow_mut().insert(type_id, index));
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{Finalize, Trace};

    struct A;
    struct B;
    unsafe impl Trace for A {
        fn trace(&mut self, _walker: &mut dyn Walker) {}
    }
    unsafe impl Finalize for A {}
    impl Collectable for A {}
    unsafe impl Trace for B {
        fn trace(&mut self, _walker: &mut dyn Walker) {}
    }
    unsafe impl Finalize for B {}
    impl Collectable for B {}

    #[test]
    fn distinct_types_get_distinct_indices_and_cache() {
        let a1 = A::index();
        let a2 = A::index();
        let b = B::index();
        assert_eq!(a1, a2);
        assert_ne!(a1, b);
    }
}
