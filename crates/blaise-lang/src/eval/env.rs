use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use itertools::Itertools;
use rustc_hash::{FxBuildHasher, FxHashMap};

use crate::Ident;
use crate::eval::runtime_value::Value;

/// A lexical scope. Call frames chain to the global scope through a
/// weak parent handle; the strong handle lives with whoever created
/// the frame, so dropping a frame cannot leak its parent chain.
pub struct Env {
    context: FxHashMap<Ident, Value>,
    parent: Option<Weak<RefCell<Env>>>,
}

impl Default for Env {
    fn default() -> Self {
        Self::new()
    }
}

impl Env {
    pub fn new() -> Self {
        Self {
            context: FxHashMap::default(),
            parent: None,
        }
    }

    pub fn with_parent(parent: Weak<RefCell<Env>>) -> Self {
        Self {
            context: FxHashMap::with_capacity_and_hasher(16, FxBuildHasher),
            parent: Some(parent),
        }
    }

    #[inline(always)]
    pub fn define(&mut self, ident: Ident, value: Value) {
        self.context.insert(ident, value);
    }

    /// Looks the name up through the scope chain. Fallback paths for
    /// `Self` members, enum members and builtins live in the
    /// evaluator, not here.
    #[inline(always)]
    pub fn resolve(&self, ident: Ident) -> Option<Value> {
        match self.context.get(&ident) {
            Some(value) => Some(value.clone()),
            None => self
                .parent
                .as_ref()
                .and_then(Weak::upgrade)
                .and_then(|parent| parent.borrow().resolve(ident)),
        }
    }

    #[inline(always)]
    pub fn get_local(&self, ident: Ident) -> Option<Value> {
        self.context.get(&ident).cloned()
    }

    pub fn has_local(&self, ident: Ident) -> bool {
        self.context.contains_key(&ident)
    }

    /// Empties this scope, handing the bindings to the caller. Used
    /// by frame teardown to release owned objects.
    pub fn take_all(&mut self) -> FxHashMap<Ident, Value> {
        std::mem::take(&mut self.context)
    }

    /// Finds the scope that holds `ident`, walking parents. This is
    /// how `var` parameters and compound assignment locate the slot
    /// they write through.
    pub fn owning_scope(env: &Rc<RefCell<Env>>, ident: Ident) -> Option<Rc<RefCell<Env>>> {
        let mut current = Rc::clone(env);
        loop {
            if current.borrow().has_local(ident) {
                return Some(current);
            }
            let parent = current.borrow().parent.as_ref().and_then(Weak::upgrade)?;
            current = parent;
        }
    }
}

impl fmt::Debug for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = self
            .context
            .keys()
            .map(Ident::to_string)
            .sorted()
            .join(", ");
        write!(
            f,
            "Env {{ bindings: [{names}], parent: {} }}",
            self.parent.is_some()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_define_and_resolve() {
        let env = Rc::new(RefCell::new(Env::new()));
        env.borrow_mut().define(Ident::new("x"), Value::Integer(1));
        assert_eq!(env.borrow().resolve(Ident::new("x")), Some(Value::Integer(1)));
        assert_eq!(env.borrow().resolve(Ident::new("y")), None);
    }

    #[test]
    fn test_resolve_walks_parent_chain() {
        let root = Rc::new(RefCell::new(Env::new()));
        root.borrow_mut().define(Ident::new("g"), Value::Integer(7));
        let frame = Rc::new(RefCell::new(Env::with_parent(Rc::downgrade(&root))));
        frame.borrow_mut().define(Ident::new("l"), Value::Integer(1));

        assert_eq!(frame.borrow().resolve(Ident::new("g")), Some(Value::Integer(7)));
        assert_eq!(frame.borrow().resolve(Ident::new("l")), Some(Value::Integer(1)));
        assert!(!frame.borrow().has_local(Ident::new("g")));
    }

    #[test]
    fn test_shadowing_resolves_innermost() {
        let root = Rc::new(RefCell::new(Env::new()));
        root.borrow_mut().define(Ident::new("x"), Value::Integer(1));
        let frame = Rc::new(RefCell::new(Env::with_parent(Rc::downgrade(&root))));
        frame.borrow_mut().define(Ident::new("x"), Value::Integer(2));

        assert_eq!(frame.borrow().resolve(Ident::new("x")), Some(Value::Integer(2)));
        assert_eq!(root.borrow().resolve(Ident::new("x")), Some(Value::Integer(1)));
    }

    #[test]
    fn test_owning_scope_finds_declaring_env() {
        let root = Rc::new(RefCell::new(Env::new()));
        root.borrow_mut().define(Ident::new("x"), Value::Integer(1));
        let frame = Rc::new(RefCell::new(Env::with_parent(Rc::downgrade(&root))));

        let owner = Env::owning_scope(&frame, Ident::new("x")).unwrap();
        assert!(Rc::ptr_eq(&owner, &root));
        assert!(Env::owning_scope(&frame, Ident::new("missing")).is_none());
    }
}
