use std::cell::{Cell, RefCell};
use std::fmt;

use rustc_hash::FxHashMap;

use crate::Ident;
use crate::eval::runtime_value::Value;

/// A heap-allocated class instance.
///
/// The reference count tracks bindings that own the object, not Rust
/// `Rc` handles. The destructor runs exactly once, either when the
/// count first reaches zero or on an explicit `Free`, whichever comes
/// first. After that the instance is a tombstone and member access on
/// it is a runtime error.
pub struct ObjectInstance {
    pub class_name: Ident,
    pub fields: RefCell<FxHashMap<Ident, Value>>,
    ref_count: Cell<i64>,
    destroying: Cell<bool>,
    destroyed: Cell<bool>,
}

impl ObjectInstance {
    pub fn new(class_name: Ident, fields: FxHashMap<Ident, Value>) -> Self {
        Self {
            class_name,
            fields: RefCell::new(fields),
            ref_count: Cell::new(0),
            destroying: Cell::new(false),
            destroyed: Cell::new(false),
        }
    }

    pub fn ref_count(&self) -> i64 {
        self.ref_count.get()
    }

    pub fn retain(&self) -> i64 {
        let count = self.ref_count.get() + 1;
        self.ref_count.set(count);
        count
    }

    /// Drops one owning reference and reports the remaining count.
    /// The caller decides whether a zero count triggers destruction.
    pub fn release(&self) -> i64 {
        let count = (self.ref_count.get() - 1).max(0);
        self.ref_count.set(count);
        count
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.get()
    }

    /// Fields stay reachable while the destructor chain runs, so the
    /// tombstone flag is only set once `finish_destroy` is called.
    pub fn begin_destroy(&self) -> bool {
        if self.destroyed.get() || self.destroying.get() {
            return false;
        }
        self.destroying.set(true);
        true
    }

    pub fn finish_destroy(&self) {
        self.destroying.set(false);
        self.destroyed.set(true);
    }

    /// Empties the field map, handing the contained values to the
    /// caller for release.
    pub fn take_fields(&self) -> FxHashMap<Ident, Value> {
        std::mem::take(&mut *self.fields.borrow_mut())
    }
}

impl fmt::Debug for ObjectInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectInstance")
            .field("class_name", &self.class_name)
            .field("ref_count", &self.ref_count.get())
            .field("destroyed", &self.destroyed.get())
            .finish_non_exhaustive()
    }
}
