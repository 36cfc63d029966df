//! Walker-callback table (component C8), grounded on the reference
//! implementation's `private/fptrpool.hxx`. Lets a client register a
//! *non-managed* object (one that lives on the Rust stack, or inside a
//! `Box`, or anywhere else outside the collector's own arenas) that
//! embeds one or more managed references, together with a function
//! that enumerates them.

use crate::gcref::UntypedGc;
use crate::trace::Walker;

type WalkerFn = unsafe fn(*mut u8, &mut dyn Walker);

struct Entry {
    label: String,
    object: *mut u8,
    walker_fn: WalkerFn,
}

#[derive(Default)]
pub struct WalkerTable {
    entries: Vec<Entry>,
}

impl WalkerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a non-managed `object` together with the function that
    /// walks its embedded managed references.
    pub fn register(&mut self, label: impl Into<String>, object: *mut u8, walker_fn: WalkerFn) {
        self.entries.push(Entry {
            label: label.into(),
            object,
            walker_fn,
        });
    }

    pub fn unregister(&mut self, object: *mut u8) {
        self.entries.retain(|e| e.object != object);
    }

    pub fn unregister_all(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Invokes every registered walker function, wiring it through
    /// `dispatch` so each embedded reference slot gets rewritten by the
    /// collector's `walk`.
    pub fn walk(&mut self, mut dispatch: impl FnMut(&str, &mut UntypedGc)) {
        struct Adapter<'a, F: FnMut(&str, &mut UntypedGc)> {
            label: &'a str,
            dispatch: &'a mut F,
        }
        impl<'a, F: FnMut(&str, &mut UntypedGc)> Walker for Adapter<'a, F> {
            fn walk(&mut self, _label: &str, slot: &mut UntypedGc) {
                (self.dispatch)(self.label, slot);
            }
        }
        for entry in &mut self.entries {
            let mut adapter = Adapter {
                label: &entry.label,
                dispatch: &mut dispatch,
            };
            unsafe { (entry.walker_fn)(entry.object, &mut adapter) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_unregister() {
        let mut table = WalkerTable::new();
        let mut obj = 0u8;
        unsafe fn noop(_o: *mut u8, _w: &mut dyn Walker) {}
        table.register("thing", &mut obj as *mut u8, noop);
        assert_eq!(table.len(), 1);
        table.unregister(&mut obj as *mut u8);
        assert_eq!(table.len(), 0);
    }
}
