pub(crate) mod assign;
pub(crate) mod builtin;
pub mod env;
pub mod error;
pub mod object;
pub(crate) mod operator;
pub mod runtime_value;
pub(crate) mod symbol;
pub mod thunk;

use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::{FxHashMap, FxHashSet};
use smol_str::SmolStr;

use crate::Ident;
use crate::ast::Args;
use crate::ast::decl::{
    Decl, FunctionDecl, MethodKind, Param, ParamMode, Program, PropertyAccessor, PropertyDecl,
};
use crate::ast::node::{
    CaseLabel, ExceptBlock, Expr, Literal, Node, SetElem, Stmt, StmtKind, TypeSpec,
};
use crate::range::Range;

use self::env::Env;
use self::error::RuntimeError;
use self::object::ObjectInstance;
use self::runtime_value::{
    EnumValue, FunctionValue, InterfaceValue, RefValue, SetValue, SubrangeValue, Value,
    VariantValue,
};
use self::symbol::SymbolTable;
use self::thunk::LazyValue;

/// Set constructors refuse ranges wider than this many ordinals.
const MAX_SET_SPAN: i64 = 65536;

/// Runtime limits of an evaluator.
#[derive(Debug, Clone)]
pub struct Options {
    pub max_call_stack_depth: u32,
}

#[cfg(debug_assertions)]
impl Default for Options {
    fn default() -> Self {
        Self {
            max_call_stack_depth: 64,
        }
    }
}

#[cfg(not(debug_assertions))]
impl Default for Options {
    fn default() -> Self {
        Self {
            max_call_stack_depth: 192,
        }
    }
}

/// Statement outcome, threaded through the block walkers so `break`,
/// `continue` and `exit` unwind to the construct that consumes them.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Flow {
    Normal,
    Break,
    Continue,
    Exit(Option<Value>),
}

fn self_ident() -> Ident {
    Ident::new("Self")
}

/// The enclosing class marker cannot collide with user identifiers,
/// `::` never survives the parser.
fn class_marker() -> Ident {
    Ident::new("Self::Class")
}

fn result_ident() -> Ident {
    Ident::new("Result")
}

fn free_ident() -> Ident {
    Ident::new("Free")
}

fn message_ident() -> Ident {
    Ident::new("Message")
}

fn unwrap_boxed(value: Value) -> Value {
    let mut current = value;
    while let Value::Variant(VariantValue::Boxed(inner)) = current {
        current = *inner;
    }
    current
}

fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::Integer(n) => Value::Integer(*n),
        Literal::Float(f) => Value::Float(*f),
        Literal::String(s) => Value::String(s.clone()),
        Literal::Boolean(b) => Value::Boolean(*b),
        Literal::Nil => Value::Nil,
    }
}

/// The tree walker. Owns the global scope, the declaration table and
/// the output buffer; everything else lives in per-call frames.
#[derive(Debug)]
pub struct Evaluator {
    env: Rc<RefCell<Env>>,
    symbols: SymbolTable,
    class_vars: FxHashMap<Ident, FxHashMap<Ident, Value>>,
    pub(crate) options: Options,
    call_stack_depth: u32,
    current_exception: Option<RuntimeError>,
    output: String,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluator {
    pub fn new() -> Self {
        Self {
            env: Rc::new(RefCell::new(Env::new())),
            symbols: SymbolTable::default(),
            class_vars: FxHashMap::default(),
            options: Options::default(),
            call_stack_depth: 0,
            current_exception: None,
            output: String::new(),
        }
    }

    pub(crate) fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub(crate) fn env(&self) -> Rc<RefCell<Env>> {
        Rc::clone(&self.env)
    }

    pub(crate) fn output(&self) -> &str {
        &self.output
    }

    pub(crate) fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }

    /// Registers declarations and zero-initializes class variables.
    pub(crate) fn load_program(&mut self, program: &Program) -> Result<(), RuntimeError> {
        self.symbols.register(program);
        for decl in &program.decls {
            if let Decl::Class(class) = decl {
                for var in &class.class_vars {
                    if self
                        .class_vars
                        .get(&class.name)
                        .is_some_and(|vars| vars.contains_key(&var.name))
                    {
                        continue;
                    }
                    let zero = self.zero_value(&var.ty, class.range)?;
                    self.class_vars
                        .entry(class.name)
                        .or_default()
                        .insert(var.name, zero);
                }
            }
        }
        Ok(())
    }

    /// Runs a whole program. The result is the value of `exit(value)`
    /// in the main block, otherwise the value of the last top-level
    /// expression statement.
    pub(crate) fn eval_program(&mut self, program: &Program) -> Result<Value, RuntimeError> {
        self.load_program(program)?;
        let env = self.env();
        let mut result = Value::NIL;
        for stmt in &program.main {
            if let StmtKind::Expr(node) = &stmt.kind {
                result = self.eval_expr(node, Rc::clone(&env))?;
                continue;
            }
            match self.exec_stmt(stmt, Rc::clone(&env))? {
                Flow::Normal => {}
                Flow::Exit(value) => {
                    if let Some(value) = value {
                        result = value;
                    }
                    break;
                }
                Flow::Break | Flow::Continue => break,
            }
        }
        // Program end releases the globals, firing any pending
        // destructors.
        let bindings = { env.borrow_mut().take_all() };
        for (_, value) in bindings {
            if value.same_instance(&result) {
                self.release_count_only(&value);
                continue;
            }
            self.release_tree(value, Range::default())?;
        }
        Ok(result)
    }

    // ---- statements ----

    pub(crate) fn exec_block(
        &mut self,
        stmts: &[Stmt],
        env: Rc<RefCell<Env>>,
    ) -> Result<Flow, RuntimeError> {
        for stmt in stmts {
            match self.exec_stmt(stmt, Rc::clone(&env))? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    pub(crate) fn exec_stmt(
        &mut self,
        stmt: &Stmt,
        env: Rc<RefCell<Env>>,
    ) -> Result<Flow, RuntimeError> {
        match &stmt.kind {
            StmtKind::Block(stmts) => self.exec_block(stmts, env),
            StmtKind::Var(name, ty, init) => {
                self.exec_var(*name, ty, init.as_ref(), env, stmt.range)?;
                Ok(Flow::Normal)
            }
            StmtKind::Assign(op, target, value) => {
                self.eval_assign(*op, target, value, env)?;
                Ok(Flow::Normal)
            }
            StmtKind::Expr(node) => {
                self.eval_expr(node, env)?;
                Ok(Flow::Normal)
            }
            StmtKind::If(cond, then_body, else_body) => {
                if self.eval_condition(cond, Rc::clone(&env))? {
                    self.exec_stmt(then_body, env)
                } else if let Some(else_body) = else_body {
                    self.exec_stmt(else_body, env)
                } else {
                    Ok(Flow::Normal)
                }
            }
            StmtKind::While(cond, body) => {
                while self.eval_condition(cond, Rc::clone(&env))? {
                    match self.exec_stmt(body, Rc::clone(&env))? {
                        Flow::Normal | Flow::Continue => {}
                        Flow::Break => break,
                        exit @ Flow::Exit(_) => return Ok(exit),
                    }
                }
                Ok(Flow::Normal)
            }
            StmtKind::Repeat(body, cond) => loop {
                match self.exec_block(body, Rc::clone(&env))? {
                    Flow::Normal | Flow::Continue => {}
                    Flow::Break => return Ok(Flow::Normal),
                    exit @ Flow::Exit(_) => return Ok(exit),
                }
                if self.eval_condition(cond, Rc::clone(&env))? {
                    return Ok(Flow::Normal);
                }
            },
            StmtKind::For {
                var,
                from,
                to,
                downto,
                body,
            } => self.exec_for(*var, from, to, *downto, body, env, stmt.range),
            StmtKind::Case(selector, arms, else_body) => {
                self.exec_case(selector, arms, else_body.as_deref(), env, stmt.range)
            }
            StmtKind::Break => Ok(Flow::Break),
            StmtKind::Continue => Ok(Flow::Continue),
            StmtKind::Exit(value) => {
                let value = match value {
                    Some(node) => Some(self.eval_expr(node, env)?),
                    None => None,
                };
                Ok(Flow::Exit(value))
            }
            StmtKind::Raise(value) => self.exec_raise(value.as_ref(), env, stmt.range),
            StmtKind::Try {
                body,
                except,
                finally,
            } => self.exec_try(body, except.as_ref(), finally.as_deref(), env),
        }
    }

    fn exec_var(
        &mut self,
        name: Ident,
        ty: &TypeSpec,
        init: Option<&Rc<Node>>,
        env: Rc<RefCell<Env>>,
        range: Range,
    ) -> Result<(), RuntimeError> {
        let zero = self.zero_value(ty, range)?;
        match init {
            None => {
                env.borrow_mut().define(name, zero);
                Ok(())
            }
            Some(node) => {
                let incoming = self.eval_expr(node, Rc::clone(&env))?;
                self.store_local(&env, name, zero, incoming, range)
            }
        }
    }

    fn eval_condition(
        &mut self,
        node: &Node,
        env: Rc<RefCell<Env>>,
    ) -> Result<bool, RuntimeError> {
        let value = self.eval_expr(node, env)?;
        match unwrap_boxed(value) {
            Value::Boolean(b) => Ok(b),
            other => Err(RuntimeError::InvalidConversion {
                range: node.range,
                from: SmolStr::new(other.type_name()),
                to: SmolStr::new_static("Boolean"),
            }),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn exec_for(
        &mut self,
        var: Ident,
        from: &Rc<Node>,
        to: &Rc<Node>,
        downto: bool,
        body: &Stmt,
        env: Rc<RefCell<Env>>,
        range: Range,
    ) -> Result<Flow, RuntimeError> {
        let from_value = self.eval_expr(from, Rc::clone(&env))?;
        let to_value = self.eval_expr(to, Rc::clone(&env))?;
        let (Some(start), Some(stop)) = (from_value.ordinal(), to_value.ordinal()) else {
            return Err(RuntimeError::InvalidTypes {
                range,
                name: SmolStr::new_static("for"),
                args: vec![format!("{from_value:?}"), format!("{to_value:?}")],
            });
        };
        // A declared loop variable is written through its scope,
        // otherwise the counter is loop-local.
        let scope = Env::owning_scope(&env, var).unwrap_or_else(|| Rc::clone(&env));
        let mut counter = start;
        loop {
            let done = if downto { counter < stop } else { counter > stop };
            if done {
                break;
            }
            scope.borrow_mut().define(var, Value::Integer(counter));
            match self.exec_stmt(body, Rc::clone(&env))? {
                Flow::Normal | Flow::Continue => {}
                Flow::Break => break,
                exit @ Flow::Exit(_) => return Ok(exit),
            }
            counter = if downto { counter - 1 } else { counter + 1 };
        }
        Ok(Flow::Normal)
    }

    fn exec_case(
        &mut self,
        selector: &Rc<Node>,
        arms: &[crate::ast::node::CaseArm],
        else_body: Option<&[Stmt]>,
        env: Rc<RefCell<Env>>,
        range: Range,
    ) -> Result<Flow, RuntimeError> {
        let subject = unwrap_boxed(self.eval_expr(selector, Rc::clone(&env))?);
        for arm in arms {
            for label in &arm.labels {
                let matched = match label {
                    CaseLabel::Value(node) => {
                        let candidate = self.eval_expr(node, Rc::clone(&env))?;
                        unwrap_boxed(candidate) == subject
                    }
                    CaseLabel::Range(low, high) => {
                        let low = self.eval_expr(low, Rc::clone(&env))?;
                        let high = self.eval_expr(high, Rc::clone(&env))?;
                        match (subject.ordinal(), low.ordinal(), high.ordinal()) {
                            (Some(subject), Some(low), Some(high)) => {
                                subject >= low && subject <= high
                            }
                            _ => {
                                return Err(RuntimeError::InvalidTypes {
                                    range,
                                    name: SmolStr::new_static("case"),
                                    args: vec![format!("{low:?}"), format!("{high:?}")],
                                });
                            }
                        }
                    }
                };
                if matched {
                    return self.exec_block(&arm.body, env);
                }
            }
        }
        match else_body {
            Some(stmts) => self.exec_block(stmts, env),
            None => Ok(Flow::Normal),
        }
    }

    fn exec_raise(
        &mut self,
        value: Option<&Rc<Node>>,
        env: Rc<RefCell<Env>>,
        range: Range,
    ) -> Result<Flow, RuntimeError> {
        let Some(node) = value else {
            // Bare `raise` re-throws the exception a handler is
            // currently working on.
            return match self.current_exception.clone() {
                Some(err) => Err(err),
                None => Err(RuntimeError::NoActiveException { range }),
            };
        };
        let raised = self.eval_expr(node, env)?;
        match unwrap_boxed(raised) {
            Value::Object(object) => {
                let message = {
                    let fields = object.fields.borrow();
                    fields
                        .get(&message_ident())
                        .map(|v| SmolStr::new(v.to_string()))
                        .unwrap_or_default()
                };
                Err(RuntimeError::Raised {
                    range,
                    class_name: object.class_name,
                    message,
                    object: Box::new(Value::Object(object)),
                })
            }
            other => Err(RuntimeError::InvalidTypes {
                range,
                name: SmolStr::new_static("raise"),
                args: vec![format!("{other:?}")],
            }),
        }
    }

    /// Only exceptions raised by the program are catchable; runtime
    /// and type errors unwind past `except`. `finally` runs on every
    /// path out, and its own failure replaces the in-flight outcome.
    fn exec_try(
        &mut self,
        body: &[Stmt],
        except: Option<&ExceptBlock>,
        finally: Option<&[Stmt]>,
        env: Rc<RefCell<Env>>,
    ) -> Result<Flow, RuntimeError> {
        let outcome = self.exec_block(body, Rc::clone(&env));
        let outcome = match outcome {
            Err(err @ RuntimeError::Raised { .. }) => match except {
                Some(block) => self.exec_except(err, block, Rc::clone(&env)),
                None => Err(err),
            },
            other => other,
        };
        match finally {
            Some(stmts) => match self.exec_block(stmts, env) {
                Err(err) => Err(err),
                Ok(Flow::Normal) => outcome,
                Ok(flow) => Ok(flow),
            },
            None => outcome,
        }
    }

    fn exec_except(
        &mut self,
        raised: RuntimeError,
        block: &ExceptBlock,
        env: Rc<RefCell<Env>>,
    ) -> Result<Flow, RuntimeError> {
        let RuntimeError::Raised {
            class_name, object, ..
        } = &raised
        else {
            return Err(raised);
        };
        let handler = block.handlers.iter().find(|handler| {
            *class_name == handler.class_name
                || self.symbols.is_descendant_of(*class_name, handler.class_name)
        });
        if let Some(handler) = handler {
            let scope = Rc::new(RefCell::new(Env::with_parent(Rc::downgrade(&env))));
            if let Some(binding) = handler.binding {
                // The handler binding borrows the exception object.
                scope.borrow_mut().define(binding, (**object).clone());
            }
            let saved = self.current_exception.replace(raised.clone());
            let outcome = self.exec_block(&handler.body, scope);
            self.current_exception = saved;
            return outcome;
        }
        if let Some(fallback) = &block.fallback {
            let saved = self.current_exception.replace(raised.clone());
            let outcome = self.exec_block(fallback, env);
            self.current_exception = saved;
            return outcome;
        }
        Err(raised)
    }

    // ---- expressions ----

    pub(crate) fn eval_expr(
        &mut self,
        node: &Node,
        env: Rc<RefCell<Env>>,
    ) -> Result<Value, RuntimeError> {
        match &*node.expr {
            Expr::Literal(literal) => Ok(literal_value(literal)),
            Expr::Ident(name) => self.eval_ident(*name, env, node.range),
            Expr::SelfRef => match self.self_object(&env) {
                Some(object) => Ok(Value::Object(object)),
                None => Err(RuntimeError::UndefinedVariable {
                    range: node.range,
                    name: SmolStr::new_static("Self"),
                }),
            },
            Expr::Binary(op, lhs, rhs) => {
                let lhs = self.eval_expr(lhs, Rc::clone(&env))?;
                let rhs = self.eval_expr(rhs, Rc::clone(&env))?;
                self.eval_binary_op(*op, lhs, rhs, node.range)
            }
            Expr::Unary(op, operand) => {
                let operand = self.eval_expr(operand, env)?;
                self.eval_unary_op(*op, operand, node.range)
            }
            Expr::Index(base, args) => self.eval_index(base, args, env, node.range),
            Expr::Member(base, member) => self.eval_member(base, *member, env, node.range),
            Expr::Call(callee, args) => self.eval_call(callee, args, env, node.range),
            Expr::Inherited(name, args) => self.eval_inherited(*name, args, env, node.range),
            Expr::SetLit(elems) => self.eval_set_literal(elems, env, node.range),
            Expr::Cast(type_name, value) => self.eval_cast(*type_name, value, env, node.range),
            Expr::AddrOf(target) => self.eval_addr_of(target, env, node.range),
        }
    }

    fn eval_ident(
        &mut self,
        name: Ident,
        env: Rc<RefCell<Env>>,
        range: Range,
    ) -> Result<Value, RuntimeError> {
        let bound = env.borrow().resolve(name);
        if let Some(value) = bound {
            return self.read_slot(value, range);
        }
        if let Some(object) = self.self_object(&env) {
            if object.is_destroyed() {
                return Err(RuntimeError::AlreadyDestroyed {
                    range,
                    class_name: SmolStr::new(object.class_name.as_str()),
                });
            }
            let field = object.fields.borrow().get(&name).cloned();
            if let Some(value) = field {
                return self.read_slot(value, range);
            }
            if let Some((owner, property)) = self.symbols.find_property(object.class_name, name) {
                if property.params.is_empty() && property.read.is_some() {
                    return self.read_property(&property, Some(object), owner.name, Vec::new(), range);
                }
            }
            if let Some((owner, method)) = self.symbols.find_method(object.class_name, name) {
                if method.kind == MethodKind::Instance && method.decl.params.is_empty() {
                    return self.invoke_with_values(
                        &method.decl,
                        Some(object),
                        Some(owner.name),
                        Vec::new(),
                        range,
                    );
                }
            }
        }
        if let Some(class_name) = self.current_class(&env) {
            if let Some(owner) = self.symbols.find_class_var_owner(class_name, name) {
                if let Some(value) = self.class_var_get(owner, name) {
                    return self.read_slot(value, range);
                }
            }
        }
        if let Some(member) = self.symbols.enum_member(name) {
            return Ok(Value::Enum(member));
        }
        if let Some(decl) = self.symbols.function(name) {
            if decl.params.is_empty() {
                return self.invoke_with_values(&decl, None, None, Vec::new(), range);
            }
            return Ok(Value::Function(FunctionValue {
                decl,
                receiver: None,
                owner: None,
            }));
        }
        if builtin::is_zero_arg(name) {
            return builtin::eval_builtin(name, &[]).map_err(|err| err.into_runtime(range));
        }
        if self.symbols.class(name).is_some() {
            return Ok(Value::Class(name));
        }
        Err(RuntimeError::UndefinedVariable {
            range,
            name: SmolStr::new(name.as_str()),
        })
    }

    /// Reading through a slot dereferences `var` parameter aliases
    /// and forces lazy thunks.
    fn read_slot(&mut self, value: Value, range: Range) -> Result<Value, RuntimeError> {
        match value {
            Value::Reference(reference) => {
                let inner = reference.env.borrow().get_local(reference.name);
                match inner {
                    Some(value) => self.read_slot(value, range),
                    None => Err(RuntimeError::UndefinedVariable {
                        range,
                        name: SmolStr::new(reference.name.as_str()),
                    }),
                }
            }
            lazy @ Value::Lazy(_) => self.force(lazy),
            other => Ok(other),
        }
    }

    pub(crate) fn self_object(&self, env: &Rc<RefCell<Env>>) -> Option<Rc<ObjectInstance>> {
        match env.borrow().resolve(self_ident()) {
            Some(Value::Object(object)) => Some(object),
            _ => None,
        }
    }

    pub(crate) fn current_class(&self, env: &Rc<RefCell<Env>>) -> Option<Ident> {
        match env.borrow().resolve(class_marker()) {
            Some(Value::Class(name)) => Some(name),
            _ => None,
        }
    }

    pub(crate) fn class_var_get(&self, owner: Ident, name: Ident) -> Option<Value> {
        self.class_vars
            .get(&owner)
            .and_then(|vars| vars.get(&name))
            .cloned()
    }

    pub(crate) fn class_var_set(&mut self, owner: Ident, name: Ident, value: Value) {
        self.class_vars.entry(owner).or_default().insert(name, value);
    }

    // ---- indexing ----

    fn eval_index(
        &mut self,
        base: &Rc<Node>,
        args: &Args,
        env: Rc<RefCell<Env>>,
        range: Range,
    ) -> Result<Value, RuntimeError> {
        // Indexed property reads flatten into the getter call.
        if let Expr::Member(obj_node, prop_name) = &*base.expr {
            if let Some((object, owner, property)) =
                self.indexed_property_target(obj_node, *prop_name, Rc::clone(&env))?
            {
                if property.read.is_some() {
                    let mut index_values = Vec::with_capacity(args.len());
                    for arg in args {
                        index_values.push(self.eval_expr(arg, Rc::clone(&env))?);
                    }
                    return self.read_property(&property, object, owner, index_values, range);
                }
            }
        }
        let mut current = self.eval_expr(base, Rc::clone(&env))?;
        for arg in args {
            let index_value = self.eval_expr(arg, Rc::clone(&env))?;
            let index = index_value
                .ordinal()
                .ok_or_else(|| RuntimeError::InvalidTypes {
                    range,
                    name: SmolStr::new_static("[]"),
                    args: vec![format!("{index_value:?}")],
                })?;
            current = self.index_read(current, index, range)?;
        }
        Ok(current)
    }

    pub(crate) fn index_read(
        &mut self,
        container: Value,
        index: i64,
        range: Range,
    ) -> Result<Value, RuntimeError> {
        match container {
            Value::Array(array) => {
                let physical =
                    array
                        .physical_index(index)
                        .ok_or_else(|| RuntimeError::IndexOutOfBounds {
                            range,
                            index,
                            low: array.low(),
                            high: array.high(),
                        })?;
                let value = array.items.borrow()[physical].clone();
                Ok(value)
            }
            // String indexing is 1-based and rune-wise.
            Value::String(s) => {
                let length = s.chars().count() as i64;
                if index < 1 || index > length {
                    return Err(RuntimeError::IndexOutOfBounds {
                        range,
                        index,
                        low: 1,
                        high: length,
                    });
                }
                let rune = s.chars().nth((index - 1) as usize).unwrap_or_default();
                Ok(Value::String(rune.to_string()))
            }
            Value::Variant(VariantValue::Boxed(inner)) => self.index_read(*inner, index, range),
            Value::Nil => Err(RuntimeError::NilAccess { range }),
            other => Err(RuntimeError::InvalidTypes {
                range,
                name: SmolStr::new_static("[]"),
                args: vec![format!("{other:?}")],
            }),
        }
    }

    /// Resolves `obj.Prop` from the base of an indexed expression to
    /// an array-property target, or `None` for plain container
    /// indexing.
    pub(crate) fn indexed_property_target(
        &mut self,
        obj_node: &Rc<Node>,
        prop_name: Ident,
        env: Rc<RefCell<Env>>,
    ) -> Result<Option<(Option<Rc<ObjectInstance>>, Ident, PropertyDecl)>, RuntimeError> {
        if let Expr::Ident(name) = &*obj_node.expr {
            if Env::owning_scope(&env, *name).is_none() && self.symbols.class(*name).is_some() {
                if let Some((owner, property)) = self.symbols.find_property(*name, prop_name) {
                    if !property.params.is_empty() {
                        return Ok(Some((None, owner.name, property)));
                    }
                }
                return Ok(None);
            }
        }
        let base_value = self.eval_expr(obj_node, env)?;
        let object = match unwrap_boxed(base_value) {
            Value::Object(object) => object,
            Value::Interface(iface) => match iface.object {
                Some(object) => object,
                None => return Ok(None),
            },
            _ => return Ok(None),
        };
        if let Some((owner, property)) = self.symbols.find_property(object.class_name, prop_name) {
            if !property.params.is_empty() {
                return Ok(Some((Some(object), owner.name, property)));
            }
        }
        Ok(None)
    }

    // ---- member access ----

    fn eval_member(
        &mut self,
        base: &Rc<Node>,
        member: Ident,
        env: Rc<RefCell<Env>>,
        range: Range,
    ) -> Result<Value, RuntimeError> {
        // An unshadowed type name on the left addresses statics and
        // scoped enum members.
        if let Expr::Ident(name) = &*base.expr {
            if Env::owning_scope(&env, *name).is_none() {
                if self.symbols.class(*name).is_some() {
                    return self.eval_class_member(*name, member, env, range);
                }
                if self.symbols.enum_decl(*name).is_some() {
                    if let Some(value) = self.symbols.enum_member(member) {
                        if value.type_name == *name {
                            return Ok(Value::Enum(value));
                        }
                    }
                    return Err(RuntimeError::UndefinedMember {
                        range,
                        type_name: SmolStr::new(name.as_str()),
                        member: SmolStr::new(member.as_str()),
                    });
                }
            }
        }
        let base_value = self.eval_expr(base, Rc::clone(&env))?;
        match unwrap_boxed(base_value) {
            Value::Object(object) => self.object_member(object, member, env, range),
            Value::Interface(iface) => match iface.object {
                Some(object) => self.object_member(object, member, env, range),
                None => Err(RuntimeError::NilAccess { range }),
            },
            Value::Record(record) => {
                let value = record.fields.borrow().get(&member).cloned();
                match value {
                    Some(value) => Ok(value),
                    None => Err(RuntimeError::UndefinedMember {
                        range,
                        type_name: SmolStr::new(record.type_name.as_str()),
                        member: SmolStr::new(member.as_str()),
                    }),
                }
            }
            Value::Class(name) => self.eval_class_member(name, member, env, range),
            Value::Nil => Err(RuntimeError::NilAccess { range }),
            other => Err(RuntimeError::UndefinedMember {
                range,
                type_name: SmolStr::new(other.type_name()),
                member: SmolStr::new(member.as_str()),
            }),
        }
    }

    fn object_member(
        &mut self,
        object: Rc<ObjectInstance>,
        member: Ident,
        env: Rc<RefCell<Env>>,
        range: Range,
    ) -> Result<Value, RuntimeError> {
        if object.is_destroyed() {
            return Err(RuntimeError::AlreadyDestroyed {
                range,
                class_name: SmolStr::new(object.class_name.as_str()),
            });
        }
        let field = object.fields.borrow().get(&member).cloned();
        if let Some(value) = field {
            return self.read_slot(value, range);
        }
        if let Some((owner, property)) = self.symbols.find_property(object.class_name, member) {
            if property.params.is_empty() && property.read.is_some() {
                return self.read_property(&property, Some(object), owner.name, Vec::new(), range);
            }
        }
        if member == free_ident() {
            self.free_object(&object, range)?;
            return Ok(Value::NIL);
        }
        if let Some((owner, method)) = self.symbols.find_method(object.class_name, member) {
            return match method.kind {
                MethodKind::Destructor => {
                    self.free_object(&object, range)?;
                    Ok(Value::NIL)
                }
                _ if method.decl.params.is_empty() => {
                    let receiver = match method.kind {
                        MethodKind::Class => None,
                        _ => Some(object),
                    };
                    self.invoke_with_values(&method.decl, receiver, Some(owner.name), Vec::new(), range)
                }
                _ => Ok(Value::Function(FunctionValue {
                    decl: Rc::clone(&method.decl),
                    receiver: Some(object),
                    owner: Some(owner.name),
                })),
            };
        }
        if let Some(owner) = self.symbols.find_class_var_owner(object.class_name, member) {
            if let Some(value) = self.class_var_get(owner, member) {
                return self.read_slot(value, range);
            }
        }
        let _ = env;
        Err(RuntimeError::UndefinedMember {
            range,
            type_name: SmolStr::new(object.class_name.as_str()),
            member: SmolStr::new(member.as_str()),
        })
    }

    fn eval_class_member(
        &mut self,
        class_name: Ident,
        member: Ident,
        env: Rc<RefCell<Env>>,
        range: Range,
    ) -> Result<Value, RuntimeError> {
        if let Some(owner) = self.symbols.find_class_var_owner(class_name, member) {
            if let Some(value) = self.class_var_get(owner, member) {
                return self.read_slot(value, range);
            }
        }
        if let Some((owner, property)) = self.symbols.find_property(class_name, member) {
            if property.is_class && property.params.is_empty() && property.read.is_some() {
                return self.read_property(&property, None, owner.name, Vec::new(), range);
            }
        }
        if let Some(ctor) = self.symbols.find_constructor(class_name, member) {
            if ctor.params.is_empty() {
                return self.construct_with_values(class_name, &ctor, Vec::new(), range);
            }
        }
        if let Some((owner, method)) = self.symbols.find_method(class_name, member) {
            if method.kind == MethodKind::Class {
                if method.decl.params.is_empty() {
                    return self.invoke_with_values(
                        &method.decl,
                        None,
                        Some(owner.name),
                        Vec::new(),
                        range,
                    );
                }
                return Ok(Value::Function(FunctionValue {
                    decl: Rc::clone(&method.decl),
                    receiver: None,
                    owner: Some(owner.name),
                }));
            }
        }
        let _ = env;
        Err(RuntimeError::UndefinedMember {
            range,
            type_name: SmolStr::new(class_name.as_str()),
            member: SmolStr::new(member.as_str()),
        })
    }

    fn read_property(
        &mut self,
        property: &PropertyDecl,
        receiver: Option<Rc<ObjectInstance>>,
        owner: Ident,
        index_values: Vec<Value>,
        range: Range,
    ) -> Result<Value, RuntimeError> {
        match &property.read {
            Some(PropertyAccessor::Field(field)) => match receiver {
                Some(object) => {
                    let value = object.fields.borrow().get(field).cloned();
                    match value {
                        Some(value) => self.read_slot(value, range),
                        None => Err(RuntimeError::UndefinedMember {
                            range,
                            type_name: SmolStr::new(object.class_name.as_str()),
                            member: SmolStr::new(field.as_str()),
                        }),
                    }
                }
                None => match self.class_var_get(owner, *field) {
                    Some(value) => self.read_slot(value, range),
                    None => Err(RuntimeError::UndefinedMember {
                        range,
                        type_name: SmolStr::new(owner.as_str()),
                        member: SmolStr::new(field.as_str()),
                    }),
                },
            },
            Some(PropertyAccessor::Method(getter)) => {
                let search = receiver
                    .as_ref()
                    .map(|object| object.class_name)
                    .unwrap_or(owner);
                let Some((method_owner, method)) = self.symbols.find_method(search, *getter) else {
                    return Err(RuntimeError::UndefinedMember {
                        range,
                        type_name: SmolStr::new(search.as_str()),
                        member: SmolStr::new(getter.as_str()),
                    });
                };
                self.invoke_with_values(
                    &method.decl,
                    receiver,
                    Some(method_owner.name),
                    index_values,
                    range,
                )
            }
            None => Err(RuntimeError::UndefinedMember {
                range,
                type_name: SmolStr::new(owner.as_str()),
                member: SmolStr::new(property.name.as_str()),
            }),
        }
    }

    // ---- calls ----

    fn eval_call(
        &mut self,
        callee: &Rc<Node>,
        args: &Args,
        env: Rc<RefCell<Env>>,
        range: Range,
    ) -> Result<Value, RuntimeError> {
        match &*callee.expr {
            Expr::Member(base, member) => self.eval_method_call(base, *member, args, env, range),
            Expr::Ident(name) => self.eval_named_call(*name, args, env, range),
            _ => {
                let value = self.eval_expr(callee, Rc::clone(&env))?;
                match value {
                    Value::Function(function) => {
                        self.call_function_value(function, args, env, range)
                    }
                    other => Err(RuntimeError::NotCallable {
                        range,
                        type_name: SmolStr::new(other.type_name()),
                    }),
                }
            }
        }
    }

    fn eval_named_call(
        &mut self,
        name: Ident,
        args: &Args,
        env: Rc<RefCell<Env>>,
        range: Range,
    ) -> Result<Value, RuntimeError> {
        // Print and PrintLn write to the engine-owned output buffer.
        let newline = name.resolve_with(|s| {
            if s.eq_ignore_ascii_case("println") {
                Some(true)
            } else if s.eq_ignore_ascii_case("print") {
                Some(false)
            } else {
                None
            }
        });
        if let Some(newline) = newline {
            return self.eval_print(args, env, newline);
        }

        let bound = env.borrow().resolve(name);
        if let Some(value) = bound {
            let value = self.read_slot(value, range)?;
            return match value {
                Value::Function(function) => self.call_function_value(function, args, env, range),
                other => Err(RuntimeError::NotCallable {
                    range,
                    type_name: SmolStr::new(other.type_name()),
                }),
            };
        }
        if let Some(decl) = self.symbols.function(name) {
            return self.call_user_function(&decl, None, None, args, env, range);
        }
        // Bare method calls inside a method body.
        if let Some(object) = self.self_object(&env) {
            if let Some((owner, method)) = self.symbols.find_method(object.class_name, name) {
                let receiver = match method.kind {
                    MethodKind::Class => None,
                    _ => Some(object),
                };
                return self.call_user_function(
                    &method.decl,
                    receiver,
                    Some(owner.name),
                    args,
                    env,
                    range,
                );
            }
        }
        if let Some(class_name) = self.current_class(&env) {
            if let Some((owner, method)) = self.symbols.find_method(class_name, name) {
                if method.kind == MethodKind::Class {
                    return self.call_user_function(
                        &method.decl,
                        None,
                        Some(owner.name),
                        args,
                        env,
                        range,
                    );
                }
            }
        }
        if builtin::lookup(name).is_some() {
            let values = self.eval_args(args, env)?;
            return builtin::eval_builtin(name, &values).map_err(|err| err.into_runtime(range));
        }
        Err(RuntimeError::UndefinedFunction {
            range,
            name: SmolStr::new(name.as_str()),
        })
    }

    fn eval_method_call(
        &mut self,
        base: &Rc<Node>,
        member: Ident,
        args: &Args,
        env: Rc<RefCell<Env>>,
        range: Range,
    ) -> Result<Value, RuntimeError> {
        if let Expr::Ident(name) = &*base.expr {
            if Env::owning_scope(&env, *name).is_none() && self.symbols.class(*name).is_some() {
                return self.eval_class_call(*name, member, args, env, range);
            }
        }
        let base_value = self.eval_expr(base, Rc::clone(&env))?;
        match unwrap_boxed(base_value) {
            Value::Object(object) => self.call_object_method(object, member, args, env, range),
            Value::Interface(iface) => match iface.object {
                Some(object) => self.call_object_method(object, member, args, env, range),
                None => Err(RuntimeError::NilAccess { range }),
            },
            Value::Class(name) => self.eval_class_call(name, member, args, env, range),
            Value::Nil => Err(RuntimeError::NilAccess { range }),
            other => Err(RuntimeError::UndefinedMember {
                range,
                type_name: SmolStr::new(other.type_name()),
                member: SmolStr::new(member.as_str()),
            }),
        }
    }

    fn eval_class_call(
        &mut self,
        class_name: Ident,
        member: Ident,
        args: &Args,
        env: Rc<RefCell<Env>>,
        range: Range,
    ) -> Result<Value, RuntimeError> {
        if let Some(ctor) = self.symbols.find_constructor(class_name, member) {
            return self.construct_with_args(class_name, &ctor, args, env, range);
        }
        if let Some((owner, method)) = self.symbols.find_method(class_name, member) {
            if method.kind == MethodKind::Class {
                return self.call_user_function(&method.decl, None, Some(owner.name), args, env, range);
            }
        }
        Err(RuntimeError::UndefinedMember {
            range,
            type_name: SmolStr::new(class_name.as_str()),
            member: SmolStr::new(member.as_str()),
        })
    }

    fn call_object_method(
        &mut self,
        object: Rc<ObjectInstance>,
        member: Ident,
        args: &Args,
        env: Rc<RefCell<Env>>,
        range: Range,
    ) -> Result<Value, RuntimeError> {
        if object.is_destroyed() {
            return Err(RuntimeError::AlreadyDestroyed {
                range,
                class_name: SmolStr::new(object.class_name.as_str()),
            });
        }
        if member == free_ident() {
            self.free_object(&object, range)?;
            return Ok(Value::NIL);
        }
        if let Some((owner, method)) = self.symbols.find_method(object.class_name, member) {
            return match method.kind {
                MethodKind::Destructor => {
                    self.free_object(&object, range)?;
                    Ok(Value::NIL)
                }
                MethodKind::Class => {
                    self.call_user_function(&method.decl, None, Some(owner.name), args, env, range)
                }
                _ => self.call_user_function(
                    &method.decl,
                    Some(object),
                    Some(owner.name),
                    args,
                    env,
                    range,
                ),
            };
        }
        // A field holding a function pointer is callable through the
        // instance.
        let field = object.fields.borrow().get(&member).cloned();
        if let Some(value) = field {
            let value = self.read_slot(value, range)?;
            if let Value::Function(function) = value {
                return self.call_function_value(function, args, env, range);
            }
        }
        Err(RuntimeError::UndefinedMember {
            range,
            type_name: SmolStr::new(object.class_name.as_str()),
            member: SmolStr::new(member.as_str()),
        })
    }

    fn call_function_value(
        &mut self,
        function: FunctionValue,
        args: &Args,
        env: Rc<RefCell<Env>>,
        range: Range,
    ) -> Result<Value, RuntimeError> {
        let FunctionValue {
            decl,
            receiver,
            owner,
        } = function;
        self.call_user_function(&decl, receiver, owner, args, env, range)
    }

    fn eval_inherited(
        &mut self,
        name: Ident,
        args: &Args,
        env: Rc<RefCell<Env>>,
        range: Range,
    ) -> Result<Value, RuntimeError> {
        let Some(object) = self.self_object(&env) else {
            return Err(RuntimeError::UndefinedFunction {
                range,
                name: SmolStr::new(name.as_str()),
            });
        };
        let current = self.current_class(&env).unwrap_or(object.class_name);
        let Some(parent) = self.symbols.class(current).and_then(|class| class.parent) else {
            return Err(RuntimeError::UndefinedMember {
                range,
                type_name: SmolStr::new(current.as_str()),
                member: SmolStr::new(name.as_str()),
            });
        };
        // An inherited constructor re-initializes the same instance.
        if let Some(ctor) = self.symbols.find_constructor(parent, name) {
            return self.call_user_function(&ctor, Some(object), Some(parent), args, env, range);
        }
        if let Some((owner, method)) = self.symbols.find_method(parent, name) {
            return self.call_user_function(
                &method.decl,
                Some(object),
                Some(owner.name),
                args,
                env,
                range,
            );
        }
        Err(RuntimeError::UndefinedMember {
            range,
            type_name: SmolStr::new(parent.as_str()),
            member: SmolStr::new(name.as_str()),
        })
    }

    /// Evaluates call arguments against the parameter modes: value
    /// parameters evaluate eagerly, `var` parameters bind a
    /// write-through reference, lazy parameters capture the
    /// unevaluated expression.
    pub(crate) fn call_user_function(
        &mut self,
        decl: &Rc<FunctionDecl>,
        receiver: Option<Rc<ObjectInstance>>,
        owner: Option<Ident>,
        args: &Args,
        env: Rc<RefCell<Env>>,
        range: Range,
    ) -> Result<Value, RuntimeError> {
        if decl.params.len() != args.len() {
            return Err(RuntimeError::InvalidNumberOfArguments {
                range,
                name: SmolStr::new(decl.name.as_str()),
                expected: SmolStr::new(decl.params.len().to_string()),
                got: args.len() as u8,
            });
        }
        let mut values = Vec::with_capacity(args.len());
        for (param, arg) in decl.params.iter().zip(args) {
            let value = match param.mode {
                ParamMode::Value => self.eval_expr(arg, Rc::clone(&env))?,
                ParamMode::Var => self.reference_argument(param, arg, &env)?,
                ParamMode::Lazy => self.lazy_argument(arg, &env),
            };
            values.push(value);
        }
        self.invoke_with_values(decl, receiver, owner, values, range)
    }

    fn reference_argument(
        &mut self,
        param: &Param,
        arg: &Rc<Node>,
        env: &Rc<RefCell<Env>>,
    ) -> Result<Value, RuntimeError> {
        let Expr::Ident(name) = &*arg.expr else {
            return Err(RuntimeError::InvalidRefArgument {
                range: arg.range,
                name: SmolStr::new(param.name.as_str()),
            });
        };
        let Some(owner) = Env::owning_scope(env, *name) else {
            return Err(RuntimeError::UndefinedVariable {
                range: arg.range,
                name: SmolStr::new(name.as_str()),
            });
        };
        // A reference argument passes through unchanged, so chains of
        // `var` parameters alias one slot.
        if let Some(Value::Reference(reference)) = owner.borrow().get_local(*name) {
            return Ok(Value::Reference(reference));
        }
        Ok(Value::Reference(RefValue { env: owner, name: *name }))
    }

    fn lazy_argument(&self, arg: &Rc<Node>, env: &Rc<RefCell<Env>>) -> Value {
        // An identifier already bound to a thunk passes through
        // instead of wrapping again.
        if let Expr::Ident(name) = &*arg.expr {
            if let Some(Value::Lazy(lazy)) = env.borrow().resolve(*name) {
                return Value::Lazy(lazy);
            }
        }
        Value::Lazy(LazyValue {
            node: Rc::clone(arg),
            env: Rc::clone(env),
        })
    }

    /// Invokes a routine with already-produced argument values. This
    /// is the single frame entry point: constructors, destructors,
    /// methods, property accessors and operator overloads all come
    /// through here.
    pub(crate) fn invoke_with_values(
        &mut self,
        decl: &Rc<FunctionDecl>,
        receiver: Option<Rc<ObjectInstance>>,
        owner: Option<Ident>,
        values: Vec<Value>,
        range: Range,
    ) -> Result<Value, RuntimeError> {
        if decl.params.len() != values.len() {
            return Err(RuntimeError::InvalidNumberOfArguments {
                range,
                name: SmolStr::new(decl.name.as_str()),
                expected: SmolStr::new(decl.params.len().to_string()),
                got: values.len() as u8,
            });
        }
        if self.call_stack_depth >= self.options.max_call_stack_depth {
            return Err(RuntimeError::Recursion {
                range,
                depth: self.call_stack_depth,
            });
        }
        let frame = Rc::new(RefCell::new(Env::with_parent(Rc::downgrade(&self.env))));
        let outcome = self.run_frame(decl, &frame, receiver, owner, values, range);
        match outcome {
            Ok(flow) => {
                let result = match flow {
                    Flow::Exit(Some(value)) => value,
                    _ => match &decl.result {
                        Some(_) => frame
                            .borrow()
                            .get_local(result_ident())
                            .unwrap_or(Value::NIL),
                        None => Value::NIL,
                    },
                };
                self.teardown_frame(&frame, &result, range)?;
                Ok(result)
            }
            Err(err) => {
                // The original error outranks destructor failures in
                // teardown.
                let _ = self.teardown_frame(&frame, &Value::NIL, range);
                Err(err)
            }
        }
    }

    fn run_frame(
        &mut self,
        decl: &Rc<FunctionDecl>,
        frame: &Rc<RefCell<Env>>,
        receiver: Option<Rc<ObjectInstance>>,
        owner: Option<Ident>,
        values: Vec<Value>,
        range: Range,
    ) -> Result<Flow, RuntimeError> {
        for (param, value) in decl.params.iter().zip(values) {
            match param.mode {
                ParamMode::Value => {
                    let slot = self.zero_value(&param.ty, range)?;
                    self.store_local(frame, param.name, slot, value, range)?;
                }
                ParamMode::Var | ParamMode::Lazy => frame.borrow_mut().define(param.name, value),
            }
        }
        if let Some(object) = &receiver {
            frame
                .borrow_mut()
                .define(self_ident(), Value::Object(Rc::clone(object)));
        }
        if let Some(class_name) = owner {
            frame
                .borrow_mut()
                .define(class_marker(), Value::Class(class_name));
        }
        if let Some(result_ty) = &decl.result {
            let zero = self.zero_value(result_ty, decl.range)?;
            frame.borrow_mut().define(result_ident(), zero);
        }
        self.call_stack_depth += 1;
        let flow = self.exec_block(&decl.body, Rc::clone(frame));
        self.call_stack_depth -= 1;
        flow
    }

    /// Releases everything the frame owned. The callee borrows `Self`
    /// from the caller, and an escaping result hands its count back
    /// to the caller's store.
    fn teardown_frame(
        &mut self,
        frame: &Rc<RefCell<Env>>,
        keep: &Value,
        range: Range,
    ) -> Result<(), RuntimeError> {
        let bindings = { frame.borrow_mut().take_all() };
        for (name, value) in bindings {
            if name == self_ident() {
                continue;
            }
            if value.same_instance(keep) {
                self.release_count_only(&value);
                continue;
            }
            self.release_tree(value, range)?;
        }
        Ok(())
    }

    // ---- object construction and destruction ----

    fn construct_instance(
        &mut self,
        class_name: Ident,
        range: Range,
    ) -> Result<Rc<ObjectInstance>, RuntimeError> {
        let mut fields = FxHashMap::default();
        for field in self.symbols.all_fields(class_name) {
            let zero = self.zero_value(&field.ty, range)?;
            fields.insert(field.name, zero);
        }
        Ok(Rc::new(ObjectInstance::new(class_name, fields)))
    }

    fn construct_with_args(
        &mut self,
        class_name: Ident,
        ctor: &Rc<FunctionDecl>,
        args: &Args,
        env: Rc<RefCell<Env>>,
        range: Range,
    ) -> Result<Value, RuntimeError> {
        let object = self.construct_instance(class_name, range)?;
        self.call_user_function(ctor, Some(Rc::clone(&object)), Some(class_name), args, env, range)?;
        Ok(Value::Object(object))
    }

    fn construct_with_values(
        &mut self,
        class_name: Ident,
        ctor: &Rc<FunctionDecl>,
        values: Vec<Value>,
        range: Range,
    ) -> Result<Value, RuntimeError> {
        let object = self.construct_instance(class_name, range)?;
        self.invoke_with_values(ctor, Some(Rc::clone(&object)), Some(class_name), values, range)?;
        Ok(Value::Object(object))
    }

    /// Explicit destruction. A second `Free` on a tombstone is a
    /// reported error, unlike the silent no-op of the implicit path.
    pub(crate) fn free_object(
        &mut self,
        object: &Rc<ObjectInstance>,
        range: Range,
    ) -> Result<(), RuntimeError> {
        if object.is_destroyed() {
            return Err(RuntimeError::AlreadyDestroyed {
                range,
                class_name: SmolStr::new(object.class_name.as_str()),
            });
        }
        self.destroy_object(object, range)
    }

    /// Runs the destructor chain most derived first, tombstones the
    /// instance, then releases the field values.
    fn destroy_object(
        &mut self,
        object: &Rc<ObjectInstance>,
        range: Range,
    ) -> Result<(), RuntimeError> {
        if !object.begin_destroy() {
            return Ok(());
        }
        for (owner, decl) in self.symbols.destructor_chain(object.class_name) {
            self.invoke_with_values(&decl, Some(Rc::clone(object)), Some(owner), Vec::new(), range)?;
        }
        let fields = object.take_fields();
        object.finish_destroy();
        for (_, value) in fields {
            self.release_tree(value, range)?;
        }
        Ok(())
    }

    // ---- lifetime protocol ----

    /// Retains the objects a stored value owns: a direct instance, the
    /// instance behind an interface, or the bound receiver of a
    /// function pointer.
    pub(crate) fn retain_tree(&self, value: &Value) {
        match value {
            Value::Object(object) => {
                object.retain();
            }
            Value::Interface(iface) => {
                if let Some(object) = &iface.object {
                    object.retain();
                }
            }
            Value::Function(function) => {
                if let Some(object) = &function.receiver {
                    object.retain();
                }
            }
            _ => {}
        }
    }

    pub(crate) fn release_tree(&mut self, value: Value, range: Range) -> Result<(), RuntimeError> {
        match value {
            Value::Object(object) => self.release_object(&object, range),
            Value::Interface(iface) => match &iface.object {
                Some(object) => self.release_object(object, range),
                None => Ok(()),
            },
            Value::Function(function) => match &function.receiver {
                Some(object) => self.release_object(object, range),
                None => Ok(()),
            },
            _ => Ok(()),
        }
    }

    fn release_object(
        &mut self,
        object: &Rc<ObjectInstance>,
        range: Range,
    ) -> Result<(), RuntimeError> {
        let remaining = object.release();
        if remaining == 0 && !object.is_destroyed() {
            self.destroy_object(object, range)?;
        }
        Ok(())
    }

    /// Decrements without destroying, used when ownership transfers
    /// rather than ends.
    fn release_count_only(&self, value: &Value) {
        match value {
            Value::Object(object) => {
                object.release();
            }
            Value::Interface(iface) => {
                if let Some(object) = &iface.object {
                    object.release();
                }
            }
            Value::Function(function) => {
                if let Some(object) = &function.receiver {
                    object.release();
                }
            }
            _ => {}
        }
    }

    // ---- zero values ----

    /// The zero value of a declared type, with named types resolved
    /// through the declaration table. Class slots start at `nil`, and
    /// array elements of named types stay `nil` for the lazy record
    /// initialization path.
    pub(crate) fn zero_value(&mut self, spec: &TypeSpec, range: Range) -> Result<Value, RuntimeError> {
        match spec {
            TypeSpec::Named(name) => {
                if let Some(record) = self.symbols.record(*name) {
                    let mut fields = FxHashMap::default();
                    for field in &record.fields {
                        fields.insert(field.name, self.zero_value(&field.ty, range)?);
                    }
                    return Ok(Value::Record(runtime_value::RecordValue::new(*name, fields)));
                }
                if self.symbols.interface(*name).is_some() {
                    return Ok(Value::Interface(InterfaceValue {
                        interface_name: *name,
                        object: None,
                    }));
                }
                if self.symbols.class(*name).is_some() {
                    return Ok(Value::NIL);
                }
                if let Some(decl) = self.symbols.enum_decl(*name) {
                    let Some(member) = decl.members.first().copied() else {
                        return Err(RuntimeError::Internal {
                            range,
                            message: SmolStr::new_static("enum without members"),
                        });
                    };
                    return Ok(Value::Enum(EnumValue {
                        type_name: *name,
                        member,
                        ordinal: 0,
                    }));
                }
                if let Some(decl) = self.symbols.subrange(*name) {
                    return Ok(Value::Subrange(SubrangeValue {
                        type_name: *name,
                        value: decl.low,
                        low: decl.low,
                        high: decl.high,
                    }));
                }
                Err(RuntimeError::UndefinedType {
                    range,
                    name: SmolStr::new(name.as_str()),
                })
            }
            other => Ok(Value::zero_of(other)),
        }
    }

    // ---- remaining expression forms ----

    fn eval_set_literal(
        &mut self,
        elems: &[SetElem],
        env: Rc<RefCell<Env>>,
        range: Range,
    ) -> Result<Value, RuntimeError> {
        let mut members = FxHashSet::default();
        for elem in elems {
            match elem {
                SetElem::Single(node) => {
                    let value = self.eval_expr(node, Rc::clone(&env))?;
                    let ordinal = value.ordinal().ok_or_else(|| RuntimeError::InvalidTypes {
                        range,
                        name: SmolStr::new_static("set"),
                        args: vec![format!("{value:?}")],
                    })?;
                    members.insert(ordinal);
                }
                SetElem::Range(low, high) => {
                    let low_value = self.eval_expr(low, Rc::clone(&env))?;
                    let high_value = self.eval_expr(high, Rc::clone(&env))?;
                    let (Some(low), Some(high)) = (low_value.ordinal(), high_value.ordinal())
                    else {
                        return Err(RuntimeError::InvalidTypes {
                            range,
                            name: SmolStr::new_static("set"),
                            args: vec![format!("{low_value:?}"), format!("{high_value:?}")],
                        });
                    };
                    let span = high - low + 1;
                    if span > MAX_SET_SPAN {
                        return Err(RuntimeError::SetTooLarge { range, span });
                    }
                    for ordinal in low..=high {
                        members.insert(ordinal);
                    }
                }
            }
        }
        Ok(Value::Set(SetValue::new(members)))
    }

    fn eval_cast(
        &mut self,
        type_name: Ident,
        node: &Rc<Node>,
        env: Rc<RefCell<Env>>,
        range: Range,
    ) -> Result<Value, RuntimeError> {
        let value = unwrap_boxed(self.eval_expr(node, env)?);
        if self.symbols.interface(type_name).is_some() {
            return match value {
                Value::Object(object) if self.symbols.implements(object.class_name, type_name) => {
                    Ok(Value::Interface(InterfaceValue {
                        interface_name: type_name,
                        object: Some(object),
                    }))
                }
                Value::Interface(iface) => match &iface.object {
                    Some(object) if self.symbols.implements(object.class_name, type_name) => {
                        Ok(Value::Interface(InterfaceValue {
                            interface_name: type_name,
                            object: iface.object,
                        }))
                    }
                    None => Ok(Value::Interface(InterfaceValue {
                        interface_name: type_name,
                        object: None,
                    })),
                    Some(object) => Err(RuntimeError::InvalidConversion {
                        range,
                        from: SmolStr::new(object.class_name.as_str()),
                        to: SmolStr::new(type_name.as_str()),
                    }),
                },
                Value::Nil => Ok(Value::Interface(InterfaceValue {
                    interface_name: type_name,
                    object: None,
                })),
                other => Err(RuntimeError::InvalidConversion {
                    range,
                    from: SmolStr::new(other.type_name()),
                    to: SmolStr::new(type_name.as_str()),
                }),
            };
        }
        if self.symbols.class(type_name).is_some() {
            return match value {
                Value::Object(object) => {
                    if self.symbols.is_descendant_of(object.class_name, type_name) {
                        Ok(Value::Object(object))
                    } else {
                        Err(RuntimeError::InvalidConversion {
                            range,
                            from: SmolStr::new(object.class_name.as_str()),
                            to: SmolStr::new(type_name.as_str()),
                        })
                    }
                }
                Value::Interface(iface) => match iface.object {
                    Some(object) if self.symbols.is_descendant_of(object.class_name, type_name) => {
                        Ok(Value::Object(object))
                    }
                    Some(object) => Err(RuntimeError::InvalidConversion {
                        range,
                        from: SmolStr::new(object.class_name.as_str()),
                        to: SmolStr::new(type_name.as_str()),
                    }),
                    None => Ok(Value::NIL),
                },
                Value::Nil => Ok(Value::NIL),
                other => Err(RuntimeError::InvalidConversion {
                    range,
                    from: SmolStr::new(other.type_name()),
                    to: SmolStr::new(type_name.as_str()),
                }),
            };
        }
        if let Some(decl) = self.symbols.enum_decl(type_name) {
            let Some(ordinal) = value.ordinal() else {
                return Err(RuntimeError::InvalidConversion {
                    range,
                    from: SmolStr::new(value.type_name()),
                    to: SmolStr::new(type_name.as_str()),
                });
            };
            let Some(member) = usize::try_from(ordinal)
                .ok()
                .and_then(|i| decl.members.get(i).copied())
            else {
                return Err(RuntimeError::OutOfRange {
                    range,
                    value: SmolStr::new(ordinal.to_string()),
                    type_name: SmolStr::new(type_name.as_str()),
                    low: 0,
                    high: decl.members.len() as i64 - 1,
                });
            };
            return Ok(Value::Enum(EnumValue {
                type_name,
                member,
                ordinal,
            }));
        }
        if let Some(decl) = self.symbols.subrange(type_name) {
            let Some(ordinal) = value.ordinal() else {
                return Err(RuntimeError::InvalidConversion {
                    range,
                    from: SmolStr::new(value.type_name()),
                    to: SmolStr::new(type_name.as_str()),
                });
            };
            if ordinal < decl.low || ordinal > decl.high {
                return Err(RuntimeError::OutOfRange {
                    range,
                    value: SmolStr::new(ordinal.to_string()),
                    type_name: SmolStr::new(type_name.as_str()),
                    low: decl.low,
                    high: decl.high,
                });
            }
            return Ok(Value::Subrange(SubrangeValue {
                type_name,
                value: ordinal,
                low: decl.low,
                high: decl.high,
            }));
        }
        Err(RuntimeError::UndefinedType {
            range,
            name: SmolStr::new(type_name.as_str()),
        })
    }

    fn eval_addr_of(
        &mut self,
        target: &Rc<Node>,
        env: Rc<RefCell<Env>>,
        range: Range,
    ) -> Result<Value, RuntimeError> {
        match &*target.expr {
            Expr::Ident(name) => {
                if let Some(decl) = self.symbols.function(*name) {
                    return Ok(Value::Function(FunctionValue {
                        decl,
                        receiver: None,
                        owner: None,
                    }));
                }
                if let Some(object) = self.self_object(&env) {
                    if let Some((owner, method)) = self.symbols.find_method(object.class_name, *name)
                    {
                        return Ok(Value::Function(FunctionValue {
                            decl: Rc::clone(&method.decl),
                            receiver: Some(object),
                            owner: Some(owner.name),
                        }));
                    }
                }
                Err(RuntimeError::UndefinedFunction {
                    range,
                    name: SmolStr::new(name.as_str()),
                })
            }
            Expr::Member(base, member) => {
                let base_value = self.eval_expr(base, env)?;
                match unwrap_boxed(base_value) {
                    Value::Object(object) => {
                        if object.is_destroyed() {
                            return Err(RuntimeError::AlreadyDestroyed {
                                range,
                                class_name: SmolStr::new(object.class_name.as_str()),
                            });
                        }
                        match self.symbols.find_method(object.class_name, *member) {
                            Some((owner, method)) => Ok(Value::Function(FunctionValue {
                                decl: Rc::clone(&method.decl),
                                receiver: Some(object),
                                owner: Some(owner.name),
                            })),
                            None => Err(RuntimeError::UndefinedMember {
                                range,
                                type_name: SmolStr::new(object.class_name.as_str()),
                                member: SmolStr::new(member.as_str()),
                            }),
                        }
                    }
                    Value::Class(name) => match self.symbols.find_method(name, *member) {
                        Some((owner, method)) => Ok(Value::Function(FunctionValue {
                            decl: Rc::clone(&method.decl),
                            receiver: None,
                            owner: Some(owner.name),
                        })),
                        None => Err(RuntimeError::UndefinedMember {
                            range,
                            type_name: SmolStr::new(name.as_str()),
                            member: SmolStr::new(member.as_str()),
                        }),
                    },
                    other => Err(RuntimeError::UndefinedMember {
                        range,
                        type_name: SmolStr::new(other.type_name()),
                        member: SmolStr::new(member.as_str()),
                    }),
                }
            }
            _ => Err(RuntimeError::NotCallable {
                range,
                type_name: SmolStr::new_static("expression"),
            }),
        }
    }

    fn eval_args(
        &mut self,
        args: &Args,
        env: Rc<RefCell<Env>>,
    ) -> Result<Vec<Value>, RuntimeError> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval_expr(arg, Rc::clone(&env))?);
        }
        Ok(values)
    }

    fn eval_print(
        &mut self,
        args: &Args,
        env: Rc<RefCell<Env>>,
        newline: bool,
    ) -> Result<Value, RuntimeError> {
        for arg in args {
            let value = self.eval_expr(arg, Rc::clone(&env))?;
            self.output.push_str(&value.to_string());
        }
        if newline {
            self.output.push('\n');
        }
        Ok(Value::NIL)
    }
}
