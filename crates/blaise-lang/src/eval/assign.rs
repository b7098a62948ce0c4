use std::cell::RefCell;
use std::rc::Rc;

use smol_str::SmolStr;

use crate::Ident;
use crate::ast::node::{AssignOp, Expr, Node, TypeSpec};
use crate::eval::Evaluator;
use crate::eval::env::Env;
use crate::eval::error::RuntimeError;
use crate::eval::object::ObjectInstance;
use crate::eval::runtime_value::{ArrayKind, InterfaceValue, Value, VariantValue};
use crate::range::Range;

fn conversion_error(old: &Value, incoming: &Value, range: Range) -> RuntimeError {
    RuntimeError::InvalidConversion {
        range,
        from: SmolStr::new(incoming.type_name()),
        to: SmolStr::new(old.type_name()),
    }
}

/// Validates and adapts `incoming` against the slot's current value,
/// which acts as the witness of the declared type. Integers widen
/// into Float slots, nothing ever narrows. Variant slots box, subrange
/// slots validate their bounds, interface slots wrap objects.
fn convert_for_store(old: &Value, incoming: Value, range: Range) -> Result<Value, RuntimeError> {
    match (old, incoming) {
        (Value::Variant(_), incoming @ Value::Variant(_)) => Ok(incoming),
        (Value::Variant(_), incoming) => {
            Ok(Value::Variant(VariantValue::Boxed(Box::new(incoming))))
        }
        (old, Value::Variant(incoming)) => match incoming {
            VariantValue::Boxed(inner) => convert_for_store(old, *inner, range),
            nullish => conversion_error(old, &Value::Variant(nullish), range).pipe_err(),
        },
        (Value::Integer(_), incoming @ Value::Integer(_)) => Ok(incoming),
        (Value::Integer(_), Value::Subrange(s)) => Ok(Value::Integer(s.value)),
        (Value::Integer(_), incoming @ Value::Float(_)) => {
            Err(conversion_error(old, &incoming, range))
        }
        (Value::Float(_), Value::Integer(n)) => Ok(Value::Float(n as f64)),
        (Value::Float(_), incoming @ Value::Float(_)) => Ok(incoming),
        (Value::Float(_), Value::Subrange(s)) => Ok(Value::Float(s.value as f64)),
        (Value::Subrange(slot), incoming) => {
            let value = match &incoming {
                Value::Integer(n) => *n,
                Value::Subrange(s) => s.value,
                _ => return Err(conversion_error(old, &incoming, range)),
            };
            if value < slot.low || value > slot.high {
                return Err(RuntimeError::OutOfRange {
                    range,
                    value: SmolStr::new(value.to_string()),
                    type_name: SmolStr::new(slot.type_name.as_str()),
                    low: slot.low,
                    high: slot.high,
                });
            }
            Ok(Value::Subrange(crate::eval::runtime_value::SubrangeValue {
                type_name: slot.type_name,
                value,
                low: slot.low,
                high: slot.high,
            }))
        }
        (Value::Interface(slot), Value::Object(object)) => Ok(Value::Interface(InterfaceValue {
            interface_name: slot.interface_name,
            object: Some(object),
        })),
        (Value::Interface(slot), Value::Interface(incoming)) => {
            Ok(Value::Interface(InterfaceValue {
                interface_name: slot.interface_name,
                object: incoming.object,
            }))
        }
        (Value::Interface(slot), Value::Nil) => Ok(Value::Interface(InterfaceValue {
            interface_name: slot.interface_name,
            object: None,
        })),
        // Dropping an object or function handle; the release of the
        // previous value happens at commit time.
        (Value::Object(_) | Value::Class(_) | Value::Function(_), Value::Nil) => Ok(Value::Nil),
        (Value::Enum(slot), incoming @ Value::Enum(_)) => {
            if matches!(&incoming, Value::Enum(e) if e.type_name == slot.type_name) {
                Ok(incoming)
            } else {
                Err(conversion_error(old, &incoming, range))
            }
        }
        (Value::Record(slot), incoming @ Value::Record(_)) => {
            if matches!(&incoming, Value::Record(r) if r.type_name == slot.type_name) {
                Ok(incoming)
            } else {
                Err(conversion_error(old, &incoming, range))
            }
        }
        (Value::Nil | Value::Lazy(_), incoming) => Ok(incoming),
        (old, incoming) => {
            if std::mem::discriminant(old) == std::mem::discriminant(&incoming) {
                Ok(incoming)
            } else {
                Err(conversion_error(old, &incoming, range))
            }
        }
    }
}

trait PipeErr<T> {
    fn pipe_err(self) -> Result<T, RuntimeError>;
}

impl<T> PipeErr<T> for RuntimeError {
    fn pipe_err(self) -> Result<T, RuntimeError> {
        Err(self)
    }
}

/// Records and static arrays store as independent copies; everything
/// else, dynamic arrays included, stores the handle.
pub(crate) fn value_semantics_copy(value: Value) -> Value {
    match &value {
        Value::Record(_) | Value::Variant(VariantValue::Boxed(_)) => value.deep_copy(),
        Value::Array(array) if array.kind != ArrayKind::Dynamic => value.deep_copy(),
        _ => value,
    }
}

impl Evaluator {
    pub(crate) fn eval_assign(
        &mut self,
        op: AssignOp,
        target: &Node,
        value_node: &Node,
        env: Rc<RefCell<Env>>,
    ) -> Result<(), RuntimeError> {
        let incoming = match op.binary_op() {
            None => self.eval_expr(value_node, Rc::clone(&env))?,
            Some(binop) => {
                let current = self.eval_expr(target, Rc::clone(&env))?;
                let rhs = self.eval_expr(value_node, Rc::clone(&env))?;
                self.eval_binary_op(binop, current, rhs, value_node.range)?
            }
        };
        // `row := matrix[i]` keeps the reference so that writes
        // through `row` land in the container.
        let rhs_aliases = op == AssignOp::Assign
            && matches!(&*target.expr, Expr::Ident(_))
            && matches!(&*value_node.expr, Expr::Index(..));
        self.store_value_at(target, incoming, rhs_aliases, env)
    }

    pub(crate) fn store_value_at(
        &mut self,
        target: &Node,
        incoming: Value,
        rhs_aliases: bool,
        env: Rc<RefCell<Env>>,
    ) -> Result<(), RuntimeError> {
        match &*target.expr {
            Expr::Ident(name) => self.store_ident(*name, incoming, rhs_aliases, env, target.range),
            Expr::Member(base, member) => {
                self.store_member(base, *member, incoming, rhs_aliases, env, target.range)
            }
            Expr::Index(base, args) => {
                self.store_index(base, args, incoming, rhs_aliases, env, target.range)
            }
            _ => Err(RuntimeError::Internal {
                range: target.range,
                message: SmolStr::new_static("invalid assignment target"),
            }),
        }
    }

    fn store_ident(
        &mut self,
        name: Ident,
        incoming: Value,
        rhs_aliases: bool,
        env: Rc<RefCell<Env>>,
        range: Range,
    ) -> Result<(), RuntimeError> {
        if let Some(owner) = Env::owning_scope(&env, name) {
            return self.store_binding(owner, name, incoming, rhs_aliases, range);
        }
        // Bare identifiers fall back to members of Self and to class
        // variables of the enclosing class.
        if let Some(object) = self.self_object(&env) {
            if self.symbols().find_field(object.class_name, name).is_some() {
                return self.store_object_field(&object, name, incoming, rhs_aliases, range);
            }
            if let Some((owner, property)) = self.symbols().find_property(object.class_name, name)
            {
                if property.write.is_some() {
                    return self.store_property(
                        &property,
                        Some(object),
                        owner.name,
                        Vec::new(),
                        incoming,
                        range,
                    );
                }
            }
        }
        if let Some(class_name) = self.current_class(&env) {
            if let Some(owner) = self.symbols().find_class_var_owner(class_name, name) {
                return self.store_class_var(owner, name, incoming, rhs_aliases, range);
            }
        }
        Err(RuntimeError::UndefinedVariable {
            range,
            name: SmolStr::new(name.as_str()),
        })
    }

    /// Writes into a scope slot, following reference chains so that
    /// `var` parameters alias their caller binding.
    fn store_binding(
        &mut self,
        owner: Rc<RefCell<Env>>,
        name: Ident,
        incoming: Value,
        rhs_aliases: bool,
        range: Range,
    ) -> Result<(), RuntimeError> {
        let mut owner = owner;
        let mut name = name;
        let old = loop {
            let current = owner.borrow().get_local(name).ok_or_else(|| {
                RuntimeError::UndefinedVariable {
                    range,
                    name: SmolStr::new(name.as_str()),
                }
            })?;
            match current {
                Value::Reference(reference) => {
                    name = reference.name;
                    owner = reference.env;
                }
                other => break other,
            }
        };
        let new = self.prepare_store(&old, incoming, rhs_aliases, range)?;
        owner.borrow_mut().define(name, new.clone());
        self.commit_store(old, &new, range)
    }

    pub(crate) fn store_object_field(
        &mut self,
        object: &Rc<ObjectInstance>,
        name: Ident,
        incoming: Value,
        rhs_aliases: bool,
        range: Range,
    ) -> Result<(), RuntimeError> {
        if object.is_destroyed() {
            return Err(RuntimeError::AlreadyDestroyed {
                range,
                class_name: SmolStr::new(object.class_name.as_str()),
            });
        }
        let Some(old) = object.fields.borrow().get(&name).cloned() else {
            return Err(RuntimeError::UndefinedMember {
                range,
                type_name: SmolStr::new(object.class_name.as_str()),
                member: SmolStr::new(name.as_str()),
            });
        };
        let new = self.prepare_store(&old, incoming, rhs_aliases, range)?;
        object.fields.borrow_mut().insert(name, new.clone());
        self.commit_store(old, &new, range)
    }

    fn store_record_field(
        &mut self,
        record: &crate::eval::runtime_value::RecordValue,
        name: Ident,
        incoming: Value,
        rhs_aliases: bool,
        range: Range,
    ) -> Result<(), RuntimeError> {
        let Some(old) = record.fields.borrow().get(&name).cloned() else {
            return Err(RuntimeError::UndefinedMember {
                range,
                type_name: SmolStr::new(record.type_name.as_str()),
                member: SmolStr::new(name.as_str()),
            });
        };
        let new = self.prepare_store(&old, incoming, rhs_aliases, range)?;
        record.fields.borrow_mut().insert(name, new.clone());
        self.commit_store(old, &new, range)
    }

    pub(crate) fn store_class_var(
        &mut self,
        owner: Ident,
        name: Ident,
        incoming: Value,
        rhs_aliases: bool,
        range: Range,
    ) -> Result<(), RuntimeError> {
        let Some(old) = self.class_var_get(owner, name) else {
            return Err(RuntimeError::UndefinedMember {
                range,
                type_name: SmolStr::new(owner.as_str()),
                member: SmolStr::new(name.as_str()),
            });
        };
        let new = self.prepare_store(&old, incoming, rhs_aliases, range)?;
        self.class_var_set(owner, name, new.clone());
        self.commit_store(old, &new, range)
    }

    fn store_property(
        &mut self,
        property: &crate::ast::decl::PropertyDecl,
        receiver: Option<Rc<ObjectInstance>>,
        owner: Ident,
        index_args: Vec<Value>,
        incoming: Value,
        range: Range,
    ) -> Result<(), RuntimeError> {
        match &property.write {
            Some(crate::ast::decl::PropertyAccessor::Field(field)) => match receiver {
                Some(object) => self.store_object_field(&object, *field, incoming, false, range),
                None => self.store_class_var(owner, *field, incoming, false, range),
            },
            Some(crate::ast::decl::PropertyAccessor::Method(setter)) => {
                let Some((method_owner, method)) = self
                    .symbols()
                    .find_method(owner, *setter)
                    .or_else(|| receiver.as_ref().and_then(|o| {
                        self.symbols().find_method(o.class_name, *setter)
                    }))
                else {
                    return Err(RuntimeError::UndefinedMember {
                        range,
                        type_name: SmolStr::new(owner.as_str()),
                        member: SmolStr::new(setter.as_str()),
                    });
                };
                let mut values = index_args;
                values.push(incoming);
                self.invoke_with_values(
                    &method.decl,
                    receiver,
                    Some(method_owner.name),
                    values,
                    range,
                )?;
                Ok(())
            }
            None => Err(RuntimeError::UndefinedMember {
                range,
                type_name: SmolStr::new(owner.as_str()),
                member: SmolStr::new(property.name.as_str()),
            }),
        }
    }

    fn store_member(
        &mut self,
        base: &Rc<Node>,
        member: Ident,
        incoming: Value,
        rhs_aliases: bool,
        env: Rc<RefCell<Env>>,
        range: Range,
    ) -> Result<(), RuntimeError> {
        // A class name that is not shadowed addresses statics.
        if let Expr::Ident(name) = &*base.expr {
            if Env::owning_scope(&env, *name).is_none() && self.symbols().class(*name).is_some() {
                return self.store_class_member(*name, member, incoming, rhs_aliases, range);
            }
        }

        let base_value = self.eval_expr(base, Rc::clone(&env))?;
        let base_value = match base_value {
            Value::Variant(VariantValue::Boxed(inner)) => *inner,
            other => other,
        };
        match base_value {
            Value::Object(object) => {
                self.store_into_object(&object, member, incoming, rhs_aliases, range)
            }
            Value::Interface(iface) => match iface.object {
                Some(object) => {
                    self.store_into_object(&object, member, incoming, rhs_aliases, range)
                }
                None => Err(RuntimeError::NilAccess { range }),
            },
            Value::Record(record) => {
                self.store_record_field(&record, member, incoming, rhs_aliases, range)
            }
            Value::Nil => {
                // A nil record slot inside a record-typed array element
                // is initialized on demand, then the store retries.
                if let Expr::Index(container, args) = &*base.expr {
                    if let Some(record) =
                        self.auto_init_record_slot(container, args, Rc::clone(&env), range)?
                    {
                        return self
                            .store_record_field(&record, member, incoming, rhs_aliases, range);
                    }
                }
                Err(RuntimeError::NilAccess { range })
            }
            other => Err(RuntimeError::UndefinedMember {
                range,
                type_name: SmolStr::new(other.type_name()),
                member: SmolStr::new(member.as_str()),
            }),
        }
    }

    fn store_into_object(
        &mut self,
        object: &Rc<ObjectInstance>,
        member: Ident,
        incoming: Value,
        rhs_aliases: bool,
        range: Range,
    ) -> Result<(), RuntimeError> {
        if object.is_destroyed() {
            return Err(RuntimeError::AlreadyDestroyed {
                range,
                class_name: SmolStr::new(object.class_name.as_str()),
            });
        }
        if let Some((owner, property)) = self.symbols().find_property(object.class_name, member) {
            if property.write.is_some() && property.params.is_empty() {
                return self.store_property(
                    &property,
                    Some(Rc::clone(object)),
                    owner.name,
                    Vec::new(),
                    incoming,
                    range,
                );
            }
        }
        if object.fields.borrow().contains_key(&member) {
            return self.store_object_field(object, member, incoming, rhs_aliases, range);
        }
        if let Some(owner) = self
            .symbols()
            .find_class_var_owner(object.class_name, member)
        {
            return self.store_class_var(owner, member, incoming, rhs_aliases, range);
        }
        Err(RuntimeError::UndefinedMember {
            range,
            type_name: SmolStr::new(object.class_name.as_str()),
            member: SmolStr::new(member.as_str()),
        })
    }

    fn store_class_member(
        &mut self,
        class_name: Ident,
        member: Ident,
        incoming: Value,
        rhs_aliases: bool,
        range: Range,
    ) -> Result<(), RuntimeError> {
        if let Some(owner) = self.symbols().find_class_var_owner(class_name, member) {
            return self.store_class_var(owner, member, incoming, rhs_aliases, range);
        }
        if let Some((owner, property)) = self.symbols().find_property(class_name, member) {
            if property.is_class && property.write.is_some() {
                return self.store_property(&property, None, owner.name, Vec::new(), incoming, range);
            }
        }
        Err(RuntimeError::UndefinedMember {
            range,
            type_name: SmolStr::new(class_name.as_str()),
            member: SmolStr::new(member.as_str()),
        })
    }

    fn store_index(
        &mut self,
        base: &Rc<Node>,
        args: &crate::ast::Args,
        incoming: Value,
        rhs_aliases: bool,
        env: Rc<RefCell<Env>>,
        range: Range,
    ) -> Result<(), RuntimeError> {
        // Indexed properties flatten: `obj.Items[i] := v` goes through
        // the setter with the index arguments in front of the value.
        if let Expr::Member(obj_node, prop_name) = &*base.expr {
            if let Some((object, owner, property)) =
                self.indexed_property_target(obj_node, *prop_name, Rc::clone(&env))?
            {
                if property.write.is_some() {
                    let mut index_values = Vec::with_capacity(args.len());
                    for arg in args {
                        let value = self.eval_expr(arg, Rc::clone(&env))?;
                        index_values.push(value);
                    }
                    return self.store_property(
                        &property,
                        object,
                        owner,
                        index_values,
                        incoming,
                        range,
                    );
                }
            }
        }

        // Only the outermost index decomposes: the base, including any
        // inner indexing, is evaluated exactly once.
        let container = self.eval_expr(base, Rc::clone(&env))?;
        let container = match container {
            Value::Variant(VariantValue::Boxed(inner)) => *inner,
            other => other,
        };
        let mut current = container;
        for (position, arg) in args.iter().enumerate() {
            let index_value = self.eval_expr(arg, Rc::clone(&env))?;
            let index = index_value.ordinal().ok_or_else(|| {
                RuntimeError::InvalidTypes {
                    range,
                    name: SmolStr::new_static("[]"),
                    args: vec![format!("{index_value:?}")],
                }
            })?;
            let last = position == args.len() - 1;
            if last {
                return self.store_element(base, current, index, incoming, rhs_aliases, env, range);
            }
            current = self.index_read(current, index, range)?;
        }
        Err(RuntimeError::Internal {
            range,
            message: SmolStr::new_static("index store without subscripts"),
        })
    }

    fn store_element(
        &mut self,
        base: &Rc<Node>,
        container: Value,
        index: i64,
        incoming: Value,
        rhs_aliases: bool,
        env: Rc<RefCell<Env>>,
        range: Range,
    ) -> Result<(), RuntimeError> {
        match container {
            Value::Array(array) => {
                let physical = array.physical_index(index).ok_or_else(|| {
                    RuntimeError::IndexOutOfBounds {
                        range,
                        index,
                        low: array.low(),
                        high: array.high(),
                    }
                })?;
                let old = array.items.borrow()[physical].clone();
                let new = self.prepare_store(&old, incoming, rhs_aliases, range)?;
                array.items.borrow_mut()[physical] = new.clone();
                self.commit_store(old, &new, range)
            }
            Value::String(s) => {
                // Single character replacement, written back through
                // the base path since strings are plain values.
                let replacement = match &incoming {
                    Value::String(r) => r.clone(),
                    Value::Variant(VariantValue::Boxed(inner)) => match &**inner {
                        Value::String(r) => r.clone(),
                        other => {
                            return Err(RuntimeError::InvalidStringStore {
                                range,
                                got: SmolStr::new(other.type_name()),
                            });
                        }
                    },
                    other => {
                        return Err(RuntimeError::InvalidStringStore {
                            range,
                            got: SmolStr::new(other.type_name()),
                        });
                    }
                };
                let mut chars: Vec<char> = replacement.chars().collect();
                if chars.len() != 1 {
                    return Err(RuntimeError::InvalidStringStore {
                        range,
                        got: SmolStr::new(format!("\"{replacement}\"")),
                    });
                }
                let replacement = chars.pop().unwrap_or_default();
                let length = s.chars().count() as i64;
                if index < 1 || index > length {
                    return Err(RuntimeError::IndexOutOfBounds {
                        range,
                        index,
                        low: 1,
                        high: length,
                    });
                }
                let updated: String = s
                    .chars()
                    .enumerate()
                    .map(|(i, c)| if i as i64 == index - 1 { replacement } else { c })
                    .collect();
                self.store_value_at(base, Value::String(updated), false, env)
            }
            Value::Nil => Err(RuntimeError::NilAccess { range }),
            other => Err(RuntimeError::InvalidTypes {
                range,
                name: SmolStr::new_static("[]"),
                args: vec![format!("{other:?}")],
            }),
        }
    }

    /// Zero-initializes a nil record element of a record-typed array
    /// and returns the fresh record, or `None` when the element is
    /// not a record slot.
    fn auto_init_record_slot(
        &mut self,
        container_node: &Rc<Node>,
        args: &crate::ast::Args,
        env: Rc<RefCell<Env>>,
        range: Range,
    ) -> Result<Option<crate::eval::runtime_value::RecordValue>, RuntimeError> {
        let container = self.eval_expr(container_node, Rc::clone(&env))?;
        let Value::Array(array) = container else {
            return Ok(None);
        };
        let is_record_elem = matches!(
            &*array.elem,
            TypeSpec::Named(name) if self.symbols().record(*name).is_some()
        );
        if !is_record_elem || args.len() != 1 {
            return Ok(None);
        }
        let index_value = self.eval_expr(&args[0], Rc::clone(&env))?;
        let Some(index) = index_value.ordinal() else {
            return Ok(None);
        };
        let Some(physical) = array.physical_index(index) else {
            return Ok(None);
        };
        if !matches!(array.items.borrow()[physical], Value::Nil) {
            return Ok(None);
        }
        let fresh = self.zero_value(&array.elem, range)?;
        let Value::Record(record) = &fresh else {
            return Ok(None);
        };
        let record = record.clone();
        self.retain_tree(&fresh);
        array.items.borrow_mut()[physical] = fresh;
        Ok(Some(record))
    }

    /// Initializing store for `var` declarations and value-parameter
    /// binding. The freshly built zero value is the slot witness, so
    /// the usual conversion and copy rules apply to the first write.
    pub(crate) fn store_local(
        &mut self,
        env: &Rc<RefCell<Env>>,
        name: Ident,
        slot: Value,
        incoming: Value,
        range: Range,
    ) -> Result<(), RuntimeError> {
        let new = self.prepare_store(&slot, incoming, false, range)?;
        env.borrow_mut().define(name, new.clone());
        self.commit_store(slot, &new, range)
    }

    fn prepare_store(
        &mut self,
        old: &Value,
        incoming: Value,
        rhs_aliases: bool,
        range: Range,
    ) -> Result<Value, RuntimeError> {
        let converted = convert_for_store(old, incoming, range)?;
        if rhs_aliases {
            Ok(converted)
        } else {
            Ok(value_semantics_copy(converted))
        }
    }

    /// The lifetime half of a store: retain the new tree, release the
    /// displaced one. Rebinding a slot to the same instance is a
    /// no-op so the count stays put.
    fn commit_store(&mut self, old: Value, new: &Value, range: Range) -> Result<(), RuntimeError> {
        if new.same_instance(&old) {
            return Ok(());
        }
        self.retain_tree(new);
        self.release_tree(old, range)
    }
}
