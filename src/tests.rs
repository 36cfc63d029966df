//! End-to-end scenarios exercised through the public API only, in the
//! teacher crate's `tests.rs` style of small toy structs wired up with
//! `unsafe impl Trace`/`Finalize`/`impl Collectable`. Each test runs on
//! its own thread (the default for `cargo test`), so each gets a fresh
//! collector singleton and these never interfere with each other.

use std::cell::Cell;
use std::rc::Rc;

use crate::{
    allocate, check, data_ok, deallocate, freeze, gc, pointer_ok, register_root, register_weak,
    set_large_threshold, unfreeze, unregister_root, unregister_weak, with_options, CollectorOptions,
    Collectable, Finalize, Gc, Trace, Walker, WeakGc,
};

struct Node {
    next: Option<Gc<Node>>,
    dropped: Option<Rc<Cell<u32>>>,
}

unsafe impl Trace for Node {
    fn trace(&mut self, walker: &mut dyn Walker) {
        self.next.trace(walker);
    }
}
unsafe impl Finalize for Node {
    fn finalize(&mut self) {
        if let Some(counter) = &self.dropped {
            counter.set(counter.get() + 1);
        }
    }
}
impl Collectable for Node {}

struct Big {
    #[allow(dead_code)]
    payload: [u8; 8 * 1024],
    dropped: Option<Rc<Cell<u32>>>,
}
unsafe impl Trace for Big {
    fn trace(&mut self, _walker: &mut dyn Walker) {}
}
unsafe impl Finalize for Big {
    fn finalize(&mut self) {
        if let Some(counter) = &self.dropped {
            counter.set(counter.get() + 1);
        }
    }
}
impl Collectable for Big {}

fn fresh(semispace_size: usize) {
    with_options(CollectorOptions::new().with_semispace_size(semispace_size));
}

#[test]
fn cycle_is_collected_once_unreachable() {
    fresh(1 << 16);
    let finalized = Rc::new(Cell::new(0u32));

    {
        let mut a = allocate(Node {
            next: None,
            dropped: Some(finalized.clone()),
        });
        let mut b = allocate(Node {
            next: None,
            dropped: Some(finalized.clone()),
        });
        a.next = Some(b);
        b.next = Some(a);
        // neither handle is ever registered as a root; the cycle they
        // form has no path to anything reachable
    }

    gc().unwrap();
    assert_eq!(finalized.get(), 2);
}

#[test]
fn root_keeps_whole_subgraph_alive() {
    fresh(1 << 16);
    let finalized = Rc::new(Cell::new(0u32));

    let leaf = allocate(Node {
        next: None,
        dropped: Some(finalized.clone()),
    });
    let mut head = allocate(Node {
        next: Some(leaf),
        dropped: Some(finalized.clone()),
    });
    register_root("head", &mut head);

    gc().unwrap();
    assert_eq!(finalized.get(), 0);
    assert!(head.next.is_some());

    unregister_root(&mut head);
    gc().unwrap();
    assert_eq!(finalized.get(), 2);
}

#[test]
fn pinned_object_survives_without_a_root() {
    fresh(1 << 16);
    let finalized = Rc::new(Cell::new(0u32));

    let mut obj = allocate(Node {
        next: None,
        dropped: Some(finalized.clone()),
    });
    freeze(&mut obj, true);

    gc().unwrap();
    gc().unwrap();
    assert_eq!(finalized.get(), 0, "a frozen object must survive collections with no root");

    assert!(unfreeze(&mut obj, true));
    // no root was ever registered, so once unpinned the next gc reclaims it
    gc().unwrap();
    assert_eq!(finalized.get(), 1);
}

#[test]
fn walking_a_dangling_reference_reports_an_error() {
    fresh(1 << 16);
    let mut orphan = allocate(Node {
        next: None,
        dropped: None,
    });
    // never rooted; a collection reclaims it immediately
    gc().unwrap();
    assert!(check(&mut orphan).is_err());
}

#[test]
fn gc_reports_a_root_deallocated_out_from_under_it() {
    fresh(1 << 16);
    let mut y = allocate(Node {
        next: None,
        dropped: None,
    });
    register_root("y", &mut y);
    assert!(deallocate(y));
    // the root table still points at y's (now reclaimed) block; the
    // next collection must report this instead of leaving it dangling
    assert!(gc().is_err());
    unregister_root(&mut y);
}

#[test]
fn large_object_never_moves_and_is_swept_when_unreachable() {
    fresh(1 << 16);
    set_large_threshold(4096);
    let finalized = Rc::new(Cell::new(0u32));

    let mut big = allocate(Big {
        payload: [0u8; 8 * 1024],
        dropped: Some(finalized.clone()),
    });
    let addr_before = big.as_ptr();
    register_root("big", &mut big);

    gc().unwrap();
    assert_eq!(big.as_ptr(), addr_before, "large objects never move");
    assert_eq!(finalized.get(), 0);

    unregister_root(&mut big);
    gc().unwrap();
    assert_eq!(finalized.get(), 1);
}

#[test]
fn weak_reference_is_nulled_once_referent_is_collected() {
    fresh(1 << 16);
    let finalized = Rc::new(Cell::new(0u32));

    let target = allocate(Node {
        next: None,
        dropped: Some(finalized.clone()),
    });
    let mut weak = WeakGc::new(target);
    register_weak(&mut weak);
    assert!(weak.upgrade().is_some());

    gc().unwrap();
    assert_eq!(finalized.get(), 1);
    assert!(weak.upgrade().is_none());
    unregister_weak(&mut weak);
}

#[test]
fn pinned_region_free_list_coalesces_after_unfreeze() {
    fresh(1 << 16);
    let mut a = allocate(Node { next: None, dropped: None });
    let mut b = allocate(Node { next: None, dropped: None });
    let mut c = allocate(Node { next: None, dropped: None });
    freeze(&mut a, true);
    freeze(&mut b, true);
    freeze(&mut c, true);

    // release them out of allocation order to exercise both-neighbor
    // coalescing in the pinned region's free-list
    unfreeze(&mut a, true);
    unfreeze(&mut c, true);
    unfreeze(&mut b, true);

    // nothing left with a root or a pin, so a collection reclaims all three
    gc().unwrap();
}

#[test]
fn pointer_and_data_ok_validate_live_payload_ranges() {
    fresh(1 << 16);
    let mut node = allocate(Node { next: None, dropped: None });
    register_root("node", &mut node);
    let p = node.as_ptr() as *const u8;
    assert!(pointer_ok(p));
    assert!(data_ok(p, std::mem::size_of::<Node>()));
    assert!(!data_ok(p, std::mem::size_of::<Node>() + 1));
    unregister_root(&mut node);
}

#[test]
fn deallocate_runs_finalizer_immediately() {
    fresh(1 << 16);
    let finalized = Rc::new(Cell::new(0u32));
    let node = allocate(Node {
        next: None,
        dropped: Some(finalized.clone()),
    });
    assert!(deallocate(node));
    assert_eq!(finalized.get(), 1);
}
