//! Ergonomic handles over a raw header pointer (component C11),
//! grounded on the teacher crate's `gcref::GcRef<T>`/`UntypedGcRef` and
//! `api::Gc<T>`/`Field<T>`.
//!
//! `Gc<T>` is what a client keeps in a local variable and registers as
//! a root; `Field<T>` is what a client embeds inside another managed
//! object's own fields so `Trace::trace` can walk it. Both are thin
//! `Copy` wrappers — see the "Copy of payload bytes" design note: a
//! `Gc<T>` read before a collection may be stale after one unless it
//! was registered as a root or reached during that collection's walk.

use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;

use crate::gc_info_table::GCInfoTrait;
use crate::header::Header;
use crate::trace::Collectable;

/// A header pointer with no compile-time type attached. Used by the
/// reference tables (C7/C8/C9), which don't know the static type of
/// what they're holding.
#[derive(Clone, Copy)]
#[repr(transparent)]
pub struct UntypedGc {
    pub(crate) header: NonNull<Header>,
}

impl UntypedGc {
    /// # Safety
    /// `header` must designate a live, `check()`-valid block.
    pub unsafe fn from_header(header: NonNull<Header>) -> Self {
        Self { header }
    }

    pub fn header_ptr(&self) -> *mut Header {
        self.header.as_ptr()
    }

    pub fn payload(&self) -> *mut u8 {
        unsafe { self.header.as_ref().payload() }
    }

    /// Downcasts to a typed handle iff the header's registered
    /// `GCInfoIndex` matches `T`'s.
    pub fn cast<T: Collectable>(self) -> Option<Gc<T>> {
        let want = T::index();
        let have = unsafe { self.header.as_ref().gc_info };
        if have == want {
            Some(Gc {
                raw: self,
                marker: PhantomData,
            })
        } else {
            None
        }
    }
}

impl PartialEq for UntypedGc {
    fn eq(&self, other: &Self) -> bool {
        self.header == other.header
    }
}
impl Eq for UntypedGc {}

impl fmt::Debug for UntypedGc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UntypedGc({:p})", self.header)
    }
}
impl fmt::Pointer for UntypedGc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:p}", self.header)
    }
}

/// A typed handle to a managed object of type `T`.
#[repr(C)]
pub struct Gc<T> {
    pub(crate) raw: UntypedGc,
    marker: PhantomData<T>,
}

impl<T> Clone for Gc<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for Gc<T> {}

impl<T: Collectable> Gc<T> {
    /// # Safety
    /// `header` must designate a live block whose registered
    /// `GCInfoIndex` matches `T`.
    pub unsafe fn from_header(header: NonNull<Header>) -> Self {
        Self {
            raw: UntypedGc::from_header(header),
            marker: PhantomData,
        }
    }

    pub fn downcast(self) -> UntypedGc {
        self.raw
    }

    pub fn as_ptr(&self) -> *mut T {
        self.raw.payload().cast()
    }
}

impl<T: Collectable> std::ops::Deref for Gc<T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.as_ptr() }
    }
}
impl<T: Collectable> std::ops::DerefMut for Gc<T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.as_ptr() }
    }
}

impl<T> PartialEq for Gc<T> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}
impl<T> Eq for Gc<T> {}

impl<T: Collectable + fmt::Debug> fmt::Debug for Gc<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}
impl<T: Collectable + fmt::Display> fmt::Display for Gc<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&**self, f)
    }
}
impl<T> fmt::Pointer for Gc<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Pointer::fmt(&self.raw, f)
    }
}

/// A `Gc<T>`-shaped slot embedded inside another managed object's own
/// fields. Identical representation to `Gc<T>`; the distinct name
/// exists only to make the "this slot must be traced" contract visible
/// at the call site, matching the teacher's `Field<T>`/`Gc<T>` split.
pub type Field<T> = Gc<T>;

/// A weak reference (component C9): holds no strong claim on its
/// referent and is nulled out by the collector once the referent is
/// reclaimed. Mirrors the teacher's `WeakGcRef`/`WeakSlot` split, minus
/// the separate heap-allocated slot object — here the `Option` lives
/// directly in the handle, which is what gets registered.
pub struct WeakGc<T> {
    pub(crate) slot: Option<UntypedGc>,
    marker: PhantomData<T>,
}

impl<T: Collectable> WeakGc<T> {
    pub fn new(target: Gc<T>) -> Self {
        Self {
            slot: Some(target.raw),
            marker: PhantomData,
        }
    }

    pub fn upgrade(&self) -> Option<Gc<T>> {
        self.slot.and_then(|raw| raw.cast())
    }

    pub fn is_live(&self) -> bool {
        self.slot.is_some()
    }
}
