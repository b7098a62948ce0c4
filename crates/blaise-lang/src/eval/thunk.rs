use std::cell::RefCell;
use std::rc::Rc;

use crate::ast::node::Node;
use crate::eval::Evaluator;
use crate::eval::env::Env;
use crate::eval::error::RuntimeError;
use crate::eval::runtime_value::Value;

/// A deferred argument: the unevaluated expression plus the scope it
/// was written in. Reading the parameter re-evaluates the expression
/// in that captured scope, every time, with no caching. Observable
/// side effects of the expression repeat on each read.
#[derive(Debug, Clone)]
pub struct LazyValue {
    pub node: Rc<Node>,
    pub env: Rc<RefCell<Env>>,
}

impl PartialEq for LazyValue {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.node, &other.node) && Rc::ptr_eq(&self.env, &other.env)
    }
}

impl Evaluator {
    /// Forces a value to something concrete. A thunk whose body is
    /// itself a lazy parameter delegates to the inner thunk, so
    /// chains of lazy arguments collapse one hop per level.
    pub(crate) fn force(&mut self, value: Value) -> Result<Value, RuntimeError> {
        let mut current = value;
        while let Value::Lazy(lazy) = current {
            current = self.eval_expr(&lazy.node, Rc::clone(&lazy.env))?;
        }
        Ok(current)
    }
}
