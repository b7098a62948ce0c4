use std::borrow::Cow;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt::{self, Display};
use std::rc::Rc;

use itertools::Itertools;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::Ident;
use crate::ast::decl::FunctionDecl;
use crate::ast::node::TypeSpec;
use crate::eval::env::Env;
use crate::eval::object::ObjectInstance;
use crate::eval::thunk::LazyValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayKind {
    /// Declared bounds are inclusive and fixed, storage index 0 maps
    /// to `low`.
    Static { low: i64, high: i64 },
    /// Zero-based, resizable through `SetLength`.
    Dynamic,
}

/// Array storage is shared between bindings of the same dynamic array
/// and between a static array and references into it. Copying happens
/// in the assignment path, not here.
#[derive(Debug, Clone)]
pub struct ArrayValue {
    pub items: Rc<RefCell<Vec<Value>>>,
    pub kind: ArrayKind,
    pub elem: Rc<TypeSpec>,
}

impl ArrayValue {
    pub fn new_static(low: i64, high: i64, items: Vec<Value>, elem: TypeSpec) -> Self {
        Self {
            items: Rc::new(RefCell::new(items)),
            kind: ArrayKind::Static { low, high },
            elem: Rc::new(elem),
        }
    }

    pub fn new_dynamic(items: Vec<Value>, elem: TypeSpec) -> Self {
        Self {
            items: Rc::new(RefCell::new(items)),
            kind: ArrayKind::Dynamic,
            elem: Rc::new(elem),
        }
    }

    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    pub fn low(&self) -> i64 {
        match self.kind {
            ArrayKind::Static { low, .. } => low,
            ArrayKind::Dynamic => 0,
        }
    }

    pub fn high(&self) -> i64 {
        match self.kind {
            ArrayKind::Static { high, .. } => high,
            ArrayKind::Dynamic => self.len() as i64 - 1,
        }
    }

    /// Maps a declared index to a storage position, `None` when the
    /// index falls outside the declared bounds. Never clamps.
    pub fn physical_index(&self, index: i64) -> Option<usize> {
        match self.kind {
            ArrayKind::Static { low, high } => {
                if index < low || index > high {
                    None
                } else {
                    Some((index - low) as usize)
                }
            }
            ArrayKind::Dynamic => {
                if index < 0 || index >= self.len() as i64 {
                    None
                } else {
                    Some(index as usize)
                }
            }
        }
    }
}

impl PartialEq for ArrayValue {
    fn eq(&self, other: &Self) -> bool {
        if Rc::ptr_eq(&self.items, &other.items) {
            return self.kind == other.kind;
        }
        self.kind == other.kind && *self.items.borrow() == *other.items.borrow()
    }
}

#[derive(Debug, Clone)]
pub struct RecordValue {
    pub type_name: Ident,
    pub fields: Rc<RefCell<FxHashMap<Ident, Value>>>,
}

impl RecordValue {
    pub fn new(type_name: Ident, fields: FxHashMap<Ident, Value>) -> Self {
        Self {
            type_name,
            fields: Rc::new(RefCell::new(fields)),
        }
    }
}

impl PartialEq for RecordValue {
    fn eq(&self, other: &Self) -> bool {
        if Rc::ptr_eq(&self.fields, &other.fields) {
            return true;
        }
        self.type_name == other.type_name && *self.fields.borrow() == *other.fields.borrow()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnumValue {
    pub type_name: Ident,
    pub member: Ident,
    pub ordinal: i64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubrangeValue {
    pub type_name: Ident,
    pub value: i64,
    pub low: i64,
    pub high: i64,
}

/// The distinguished Variant states. A fresh Variant binding starts
/// out `Uninitialized`, which compares equal to falsey values as well
/// as to the nullish states. Explicit `Unassigned` and `Null` compare
/// equal only among themselves and `nil`.
#[derive(Debug, Clone, PartialEq)]
pub enum VariantValue {
    Uninitialized,
    Unassigned,
    Null,
    Boxed(Box<Value>),
}

impl VariantValue {
    pub fn is_nullish(&self) -> bool {
        !matches!(self, VariantValue::Boxed(_))
    }
}

#[derive(Debug, Clone)]
pub struct InterfaceValue {
    pub interface_name: Ident,
    pub object: Option<Rc<ObjectInstance>>,
}

impl InterfaceValue {
    pub fn is_nil(&self) -> bool {
        self.object.is_none()
    }
}

impl PartialEq for InterfaceValue {
    fn eq(&self, other: &Self) -> bool {
        match (&self.object, &other.object) {
            (None, None) => true,
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// A first-class routine, optionally bound to a receiver. A bound
/// receiver is retained by whatever binding ends up owning this value.
#[derive(Debug, Clone)]
pub struct FunctionValue {
    pub decl: Rc<FunctionDecl>,
    pub receiver: Option<Rc<ObjectInstance>>,
    pub owner: Option<Ident>,
}

impl PartialEq for FunctionValue {
    fn eq(&self, other: &Self) -> bool {
        let receivers = match (&self.receiver, &other.receiver) {
            (None, None) => true,
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            _ => false,
        };
        Rc::ptr_eq(&self.decl, &other.decl) && receivers
    }
}

/// A write-through alias for a binding in some scope, created for
/// `var` parameters.
#[derive(Debug, Clone)]
pub struct RefValue {
    pub env: Rc<RefCell<Env>>,
    pub name: Ident,
}

impl PartialEq for RefValue {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.env, &other.env) && self.name == other.name
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetValue {
    pub members: Rc<FxHashSet<i64>>,
}

impl SetValue {
    pub fn new(members: FxHashSet<i64>) -> Self {
        Self {
            members: Rc::new(members),
        }
    }

    pub fn contains(&self, ordinal: i64) -> bool {
        self.members.contains(&ordinal)
    }
}

#[derive(Clone)]
pub enum Value {
    Integer(i64),
    Float(f64),
    String(String),
    Boolean(bool),
    Nil,
    Array(ArrayValue),
    Record(RecordValue),
    Enum(EnumValue),
    Subrange(SubrangeValue),
    Set(SetValue),
    Variant(VariantValue),
    Object(Rc<ObjectInstance>),
    Interface(InterfaceValue),
    /// A class used as a value, as in `TPoint.Create`.
    Class(Ident),
    Function(FunctionValue),
    Lazy(LazyValue),
    Reference(RefValue),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Integer(a), Value::Float(b)) | (Value::Float(b), Value::Integer(a)) => {
                *a as f64 == *b
            }
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Nil, Value::Nil) => true,
            (Value::Subrange(a), Value::Subrange(b)) => a.value == b.value,
            (Value::Subrange(a), Value::Integer(b)) | (Value::Integer(b), Value::Subrange(a)) => {
                a.value == *b
            }
            (Value::Enum(a), Value::Enum(b)) => {
                a.type_name == b.type_name && a.ordinal == b.ordinal
            }
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Record(a), Value::Record(b)) => a == b,
            (Value::Set(a), Value::Set(b)) => a == b,
            (Value::Variant(a), Value::Variant(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Interface(a), Value::Interface(b)) => a == b,
            (Value::Interface(a), Value::Object(b)) | (Value::Object(b), Value::Interface(a)) => {
                matches!(&a.object, Some(o) if Rc::ptr_eq(o, b))
            }
            (Value::Class(a), Value::Class(b)) => a == b,
            (Value::Function(a), Value::Function(b)) => a == b,
            (Value::Lazy(a), Value::Lazy(b)) => a == b,
            (Value::Reference(a), Value::Reference(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a.partial_cmp(b),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Integer(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (Value::String(a), Value::String(b)) => a.partial_cmp(b),
            (Value::Boolean(a), Value::Boolean(b)) => a.partial_cmp(b),
            (Value::Subrange(a), Value::Subrange(b)) => a.value.partial_cmp(&b.value),
            (Value::Subrange(a), Value::Integer(b)) => a.value.partial_cmp(b),
            (Value::Integer(a), Value::Subrange(b)) => a.partial_cmp(&b.value),
            (Value::Enum(a), Value::Enum(b)) if a.type_name == b.type_name => {
                a.ordinal.partial_cmp(&b.ordinal)
            }
            _ => None,
        }
    }
}

impl Value {
    pub const NIL: Value = Value::Nil;
    pub const TRUE: Value = Value::Boolean(true);
    pub const FALSE: Value = Value::Boolean(false);
    pub const EMPTY_STRING: Value = Value::String(String::new());

    /// The name used when reporting this value's type in diagnostics.
    pub fn type_name(&self) -> Cow<'static, str> {
        match self {
            Value::Integer(_) => Cow::Borrowed("Integer"),
            Value::Float(_) => Cow::Borrowed("Float"),
            Value::String(_) => Cow::Borrowed("String"),
            Value::Boolean(_) => Cow::Borrowed("Boolean"),
            Value::Nil => Cow::Borrowed("nil"),
            Value::Array(_) => Cow::Borrowed("array"),
            Value::Record(record) => Cow::Owned(record.type_name.to_string()),
            Value::Enum(value) => Cow::Owned(value.type_name.to_string()),
            Value::Subrange(value) => Cow::Owned(value.type_name.to_string()),
            Value::Set(_) => Cow::Borrowed("set"),
            Value::Variant(_) => Cow::Borrowed("Variant"),
            Value::Object(object) => Cow::Owned(object.class_name.to_string()),
            Value::Interface(iface) => Cow::Owned(iface.interface_name.to_string()),
            Value::Class(name) => Cow::Owned(format!("class {name}")),
            Value::Function(_) => Cow::Borrowed("function"),
            Value::Lazy(_) => Cow::Borrowed("lazy"),
            Value::Reference(_) => Cow::Borrowed("reference"),
        }
    }

    /// Falsey values participate in the loose equality tier of
    /// uninitialized Variants: zero numbers, the empty string, False,
    /// nil and the nullish Variant states.
    pub fn is_falsey(&self) -> bool {
        match self {
            Value::Integer(n) => *n == 0,
            Value::Float(f) => *f == 0.0,
            Value::String(s) => s.is_empty(),
            Value::Boolean(b) => !b,
            Value::Nil => true,
            Value::Variant(VariantValue::Boxed(inner)) => inner.is_falsey(),
            Value::Variant(_) => true,
            Value::Interface(iface) => iface.is_nil(),
            _ => false,
        }
    }

    /// The ordinal of this value, if it has one. Used for set
    /// membership, case ranges and `for` loop stepping.
    pub fn ordinal(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            Value::Boolean(b) => Some(i64::from(*b)),
            Value::Enum(value) => Some(value.ordinal),
            Value::Subrange(value) => Some(value.value),
            Value::String(s) => {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Some(c as i64),
                    _ => None,
                }
            }
            Value::Variant(VariantValue::Boxed(inner)) => inner.ordinal(),
            _ => None,
        }
    }

    /// Performs the value-semantics copy used by assignment. Records
    /// and static arrays copy their storage, dynamic arrays share it.
    pub fn deep_copy(&self) -> Value {
        match self {
            Value::Record(record) => {
                let fields = record
                    .fields
                    .borrow()
                    .iter()
                    .map(|(name, value)| (*name, value.deep_copy()))
                    .collect();
                Value::Record(RecordValue::new(record.type_name, fields))
            }
            Value::Array(array) => match array.kind {
                ArrayKind::Static { low, high } => {
                    let items = array.items.borrow().iter().map(Value::deep_copy).collect();
                    Value::Array(ArrayValue {
                        items: Rc::new(RefCell::new(items)),
                        kind: ArrayKind::Static { low, high },
                        elem: Rc::clone(&array.elem),
                    })
                }
                ArrayKind::Dynamic => Value::Array(array.clone()),
            },
            Value::Variant(VariantValue::Boxed(inner)) => {
                Value::Variant(VariantValue::Boxed(Box::new(inner.deep_copy())))
            }
            _ => self.clone(),
        }
    }

    /// Identity check used to make rebinding a slot to the same
    /// instance a no-op in the lifetime protocol.
    pub fn same_instance(&self, other: &Value) -> bool {
        let underlying = |value: &Value| -> Option<Rc<ObjectInstance>> {
            match value {
                Value::Object(object) => Some(Rc::clone(object)),
                Value::Interface(iface) => iface.object.clone(),
                _ => None,
            }
        };
        match (underlying(self), underlying(other)) {
            (Some(a), Some(b)) => Rc::ptr_eq(&a, &b),
            _ => false,
        }
    }

    /// The zero value of a declared type, with named types degraded
    /// to `nil`. The evaluator resolves named types through the
    /// declaration table instead.
    pub fn zero_of(spec: &TypeSpec) -> Value {
        match spec {
            TypeSpec::Integer => Value::Integer(0),
            TypeSpec::Float => Value::Float(0.0),
            TypeSpec::String => Value::EMPTY_STRING,
            TypeSpec::Boolean => Value::FALSE,
            TypeSpec::Variant => Value::Variant(VariantValue::Uninitialized),
            TypeSpec::Named(_) => Value::Nil,
            TypeSpec::StaticArray { low, high, elem } => {
                let count = (high - low + 1).max(0) as usize;
                let items = (0..count).map(|_| Value::zero_of(elem)).collect();
                Value::Array(ArrayValue::new_static(*low, *high, items, (**elem).clone()))
            }
            TypeSpec::DynArray(elem) => {
                Value::Array(ArrayValue::new_dynamic(Vec::new(), (**elem).clone()))
            }
            TypeSpec::Set(_) => Value::Set(SetValue::new(FxHashSet::default())),
        }
    }

    fn string(&self) -> Cow<'_, str> {
        match self {
            Value::Integer(n) => Cow::Owned(n.to_string()),
            Value::Float(f) => Cow::Owned(f.to_string()),
            Value::String(s) => Cow::Borrowed(s.as_str()),
            Value::Boolean(true) => Cow::Borrowed("True"),
            Value::Boolean(false) => Cow::Borrowed("False"),
            Value::Nil => Cow::Borrowed("nil"),
            Value::Array(array) => {
                let items = array.items.borrow();
                Cow::Owned(format!("[{}]", items.iter().map(Value::string).join(", ")))
            }
            Value::Record(record) => {
                let fields = record.fields.borrow();
                let body = fields
                    .iter()
                    .sorted_by_key(|(name, _)| name.to_string())
                    .map(|(name, value)| format!("{name}: {value}"))
                    .join("; ");
                Cow::Owned(format!("({body})"))
            }
            Value::Enum(value) => Cow::Owned(value.member.to_string()),
            Value::Subrange(value) => Cow::Owned(value.value.to_string()),
            Value::Set(set) => {
                let body = set.members.iter().sorted().map(i64::to_string).join(", ");
                Cow::Owned(format!("[{body}]"))
            }
            Value::Variant(VariantValue::Uninitialized) => Cow::Borrowed(""),
            Value::Variant(VariantValue::Unassigned) => Cow::Borrowed("Unassigned"),
            Value::Variant(VariantValue::Null) => Cow::Borrowed("Null"),
            Value::Variant(VariantValue::Boxed(inner)) => Cow::Owned(inner.string().into_owned()),
            Value::Object(object) => Cow::Owned(format!("{} instance", object.class_name)),
            Value::Interface(iface) => match &iface.object {
                Some(object) => Cow::Owned(format!("{} instance", object.class_name)),
                None => Cow::Borrowed("nil"),
            },
            Value::Class(name) => Cow::Owned(name.to_string()),
            Value::Function(function) => Cow::Owned(format!("function {}", function.decl.name)),
            Value::Lazy(_) => Cow::Borrowed("<lazy>"),
            Value::Reference(reference) => Cow::Owned(format!("<reference {}>", reference.name)),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.string())
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "\"{s}\""),
            Value::Variant(VariantValue::Boxed(inner)) => write!(f, "{inner:?}"),
            _ => write!(f, "{}", self.string()),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Value::Integer(5), Value::Integer(5), true)]
    #[case(Value::Integer(5), Value::Float(5.0), true)]
    #[case(Value::Float(2.5), Value::Integer(2), false)]
    #[case(Value::String("a".into()), Value::String("a".into()), true)]
    #[case(Value::Nil, Value::Nil, true)]
    #[case(Value::Integer(0), Value::Boolean(false), false)]
    fn test_value_equality(#[case] lhs: Value, #[case] rhs: Value, #[case] expected: bool) {
        assert_eq!(lhs == rhs, expected);
    }

    #[rstest]
    #[case(Value::Integer(0), true)]
    #[case(Value::Float(0.0), true)]
    #[case(Value::String("".into()), true)]
    #[case(Value::Boolean(false), true)]
    #[case(Value::Nil, true)]
    #[case(Value::Variant(VariantValue::Null), true)]
    #[case(Value::Integer(1), false)]
    #[case(Value::String("x".into()), false)]
    fn test_is_falsey(#[case] value: Value, #[case] expected: bool) {
        assert_eq!(value.is_falsey(), expected);
    }

    #[rstest]
    #[case(Value::Integer(65), Some(65))]
    #[case(Value::Boolean(true), Some(1))]
    #[case(Value::String("A".into()), Some(65))]
    #[case(Value::String("AB".into()), None)]
    #[case(Value::Float(1.5), None)]
    fn test_ordinal(#[case] value: Value, #[case] expected: Option<i64>) {
        assert_eq!(value.ordinal(), expected);
    }

    #[test]
    fn test_deep_copy_detaches_record_fields() {
        let mut fields = FxHashMap::default();
        fields.insert(Ident::new("X"), Value::Integer(1));
        let original = Value::Record(RecordValue::new(Ident::new("TPoint"), fields));
        let copy = original.deep_copy();

        if let (Value::Record(a), Value::Record(b)) = (&original, &copy) {
            assert!(!Rc::ptr_eq(&a.fields, &b.fields));
            b.fields.borrow_mut().insert(Ident::new("X"), Value::Integer(9));
            assert_eq!(a.fields.borrow()[&Ident::new("X")], Value::Integer(1));
        } else {
            unreachable!();
        }
    }

    #[test]
    fn test_deep_copy_shares_dynamic_array_storage() {
        let original = Value::Array(ArrayValue::new_dynamic(
            vec![Value::Integer(1)],
            TypeSpec::Integer,
        ));
        let copy = original.deep_copy();

        if let (Value::Array(a), Value::Array(b)) = (&original, &copy) {
            assert!(Rc::ptr_eq(&a.items, &b.items));
        } else {
            unreachable!();
        }
    }

    #[test]
    fn test_static_array_physical_index() {
        let array = ArrayValue::new_static(
            1,
            3,
            vec![Value::Integer(0); 3],
            TypeSpec::Integer,
        );
        assert_eq!(array.physical_index(1), Some(0));
        assert_eq!(array.physical_index(3), Some(2));
        assert_eq!(array.physical_index(0), None);
        assert_eq!(array.physical_index(4), None);
    }

    #[test]
    fn test_object_equality_is_identity() {
        let a = Rc::new(ObjectInstance::new(Ident::new("TFoo"), FxHashMap::default()));
        let b = Rc::new(ObjectInstance::new(Ident::new("TFoo"), FxHashMap::default()));
        assert_eq!(Value::Object(Rc::clone(&a)), Value::Object(Rc::clone(&a)));
        assert_ne!(Value::Object(a), Value::Object(b));
    }

    #[rstest]
    #[case(Value::Integer(42), "42")]
    #[case(Value::Float(3.14), "3.14")]
    #[case(Value::Float(2.0), "2")]
    #[case(Value::Boolean(true), "True")]
    #[case(Value::Nil, "nil")]
    #[case(Value::Variant(VariantValue::Null), "Null")]
    fn test_display(#[case] value: Value, #[case] expected: &str) {
        assert_eq!(value.to_string(), expected);
    }

    #[test]
    fn test_zero_of_static_array() {
        let spec = TypeSpec::StaticArray {
            low: 1,
            high: 5,
            elem: Box::new(TypeSpec::Integer),
        };
        if let Value::Array(array) = Value::zero_of(&spec) {
            assert_eq!(array.len(), 5);
            assert_eq!(array.low(), 1);
            assert_eq!(array.high(), 5);
        } else {
            unreachable!();
        }
    }
}
