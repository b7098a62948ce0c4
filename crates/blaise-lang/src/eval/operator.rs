use std::cmp::Ordering;
use std::rc::Rc;

use smol_str::SmolStr;

use crate::ast::decl::{OperatorDecl, OperatorKind};
use crate::ast::node::{BinaryOp, TypeSpec, UnaryOp};
use crate::eval::Evaluator;
use crate::eval::error::RuntimeError;
use crate::eval::runtime_value::{ArrayKind, Value, VariantValue};
use crate::range::Range;

enum Scalar {
    Int(i64),
    Float(f64),
}

impl Scalar {
    fn as_float(&self) -> f64 {
        match self {
            Scalar::Int(n) => *n as f64,
            Scalar::Float(f) => *f,
        }
    }
}

fn scalar_of(value: &Value) -> Option<Scalar> {
    match value {
        Value::Integer(n) => Some(Scalar::Int(*n)),
        Value::Float(f) => Some(Scalar::Float(*f)),
        Value::Subrange(s) => Some(Scalar::Int(s.value)),
        _ => None,
    }
}

/// Subranges take part in arithmetic as their plain ordinal value.
fn normalize_scalar(value: Value) -> Value {
    match value {
        Value::Subrange(s) => Value::Integer(s.value),
        other => other,
    }
}

fn unwrap_variant(value: Value) -> Value {
    let mut current = value;
    while let Value::Variant(VariantValue::Boxed(inner)) = current {
        current = *inner;
    }
    current
}

fn is_nullish_like(value: &Value) -> bool {
    match value {
        Value::Nil => true,
        Value::Variant(variant) => variant.is_nullish(),
        _ => false,
    }
}

fn mismatch(op: impl std::fmt::Display, lhs: &Value, rhs: &Value, range: Range) -> RuntimeError {
    RuntimeError::InvalidBinaryOp {
        range,
        op: SmolStr::new(op.to_string()),
        lhs: SmolStr::new(lhs.type_name()),
        rhs: SmolStr::new(rhs.type_name()),
    }
}

fn zero_division(op: BinaryOp, lhs: &Value, rhs: &Value, range: Range) -> RuntimeError {
    RuntimeError::ZeroDivision {
        range,
        op: SmolStr::new(op.to_string()),
        lhs: SmolStr::new(lhs.to_string()),
        rhs: SmolStr::new(rhs.to_string()),
    }
}

fn eq_comparable(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::String(_), Value::String(_))
        | (Value::Boolean(_), Value::Boolean(_))
        | (Value::Nil, Value::Nil)
        | (Value::Object(_), Value::Object(_))
        | (Value::Object(_), Value::Interface(_))
        | (Value::Interface(_), Value::Object(_))
        | (Value::Interface(_), Value::Interface(_))
        | (Value::Set(_), Value::Set(_))
        | (Value::Array(_), Value::Array(_))
        | (Value::Function(_), Value::Function(_))
        | (Value::Class(_), Value::Class(_)) => true,
        (Value::Nil, Value::Object(_) | Value::Interface(_) | Value::Function(_))
        | (Value::Object(_) | Value::Interface(_) | Value::Function(_), Value::Nil) => true,
        (Value::Record(a), Value::Record(b)) => a.type_name == b.type_name,
        (Value::Enum(a), Value::Enum(b)) => a.type_name == b.type_name,
        _ => scalar_of(lhs).is_some() && scalar_of(rhs).is_some(),
    }
}

fn ordering_satisfies(op: BinaryOp, ordering: Ordering) -> bool {
    match op {
        BinaryOp::Less => ordering == Ordering::Less,
        BinaryOp::LessEq => ordering != Ordering::Greater,
        BinaryOp::Greater => ordering == Ordering::Greater,
        BinaryOp::GreaterEq => ordering != Ordering::Less,
        _ => false,
    }
}

/// The built-in binary operator tables. Overloads, `in` and the
/// Variant rules have already been tried by the time this runs.
pub(crate) fn dispatch_builtin_binary(
    op: BinaryOp,
    lhs: Value,
    rhs: Value,
    range: Range,
) -> Result<Value, RuntimeError> {
    use BinaryOp::*;
    let lhs = normalize_scalar(lhs);
    let rhs = normalize_scalar(rhs);
    match (op, &lhs, &rhs) {
        (Add, Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(a.wrapping_add(*b))),
        (Sub, Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(a.wrapping_sub(*b))),
        (Mul, Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(a.wrapping_mul(*b))),
        (Add, Value::String(a), Value::String(b)) => {
            let mut s = String::with_capacity(a.len() + b.len());
            s.push_str(a);
            s.push_str(b);
            Ok(Value::String(s))
        }
        (Add | Sub | Mul, _, _) => match (scalar_of(&lhs), scalar_of(&rhs)) {
            (Some(a), Some(b)) => {
                let (a, b) = (a.as_float(), b.as_float());
                let result = match op {
                    Add => a + b,
                    Sub => a - b,
                    _ => a * b,
                };
                Ok(Value::Float(result))
            }
            _ => Err(mismatch(op, &lhs, &rhs, range)),
        },
        // `/` always produces a Float, integer operands included.
        (Div, _, _) => match (scalar_of(&lhs), scalar_of(&rhs)) {
            (Some(a), Some(b)) => {
                if b.as_float() == 0.0 {
                    Err(zero_division(op, &lhs, &rhs, range))
                } else {
                    Ok(Value::Float(a.as_float() / b.as_float()))
                }
            }
            _ => Err(mismatch(op, &lhs, &rhs, range)),
        },
        (IntDiv, Value::Integer(a), Value::Integer(b)) => {
            if *b == 0 {
                Err(zero_division(op, &lhs, &rhs, range))
            } else {
                Ok(Value::Integer(a.wrapping_div(*b)))
            }
        }
        (Modulo, Value::Integer(a), Value::Integer(b)) => {
            if *b == 0 {
                Err(zero_division(op, &lhs, &rhs, range))
            } else {
                Ok(Value::Integer(a.wrapping_rem(*b)))
            }
        }
        (Shl | Shr | Sar, Value::Integer(a), Value::Integer(b)) => {
            if *b < 0 {
                return Err(RuntimeError::NegativeShift {
                    range,
                    op: SmolStr::new(op.to_string()),
                    lhs: SmolStr::new(a.to_string()),
                    amount: *b,
                });
            }
            let amount = *b as u32;
            let result = match op {
                Shl => a.wrapping_shl(amount),
                // `shr` is a logical shift, `sar` keeps the sign.
                Shr => ((*a as u64).wrapping_shr(amount)) as i64,
                _ => a.wrapping_shr(amount),
            };
            Ok(Value::Integer(result))
        }
        (And, Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(a & b)),
        (Or, Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(a | b)),
        (Xor, Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(a ^ b)),
        (And, Value::Boolean(a), Value::Boolean(b)) => Ok(Value::Boolean(*a && *b)),
        (Or, Value::Boolean(a), Value::Boolean(b)) => Ok(Value::Boolean(*a || *b)),
        (Xor, Value::Boolean(a), Value::Boolean(b)) => Ok(Value::Boolean(a != b)),
        (Eq, _, _) if eq_comparable(&lhs, &rhs) => Ok(Value::Boolean(lhs == rhs)),
        (NotEq, _, _) if eq_comparable(&lhs, &rhs) => Ok(Value::Boolean(lhs != rhs)),
        (Less | LessEq | Greater | GreaterEq, _, _) => match lhs.partial_cmp(&rhs) {
            Some(ordering) if !matches!((&lhs, &rhs), (Value::Boolean(_), _) | (_, Value::Boolean(_))) => {
                Ok(Value::Boolean(ordering_satisfies(op, ordering)))
            }
            _ => Err(mismatch(op, &lhs, &rhs, range)),
        },
        _ => Err(mismatch(op, &lhs, &rhs, range)),
    }
}

/// Membership: ordinal-in-set, or linear scan with value equality
/// when the right side is an array.
fn eval_membership(lhs: &Value, rhs: &Value, range: Range) -> Result<Value, RuntimeError> {
    match rhs {
        Value::Set(set) => match lhs.ordinal() {
            Some(ordinal) => Ok(Value::Boolean(set.contains(ordinal))),
            None => Err(mismatch(BinaryOp::In, lhs, rhs, range)),
        },
        Value::Array(array) => {
            let needle = unwrap_variant(lhs.clone());
            let found = array.items.borrow().iter().any(|item| *item == needle);
            Ok(Value::Boolean(found))
        }
        Value::Variant(VariantValue::Boxed(inner)) => eval_membership(lhs, inner, range),
        _ => Err(mismatch(BinaryOp::In, lhs, rhs, range)),
    }
}

/// The loose equality tier for nullish Variants: nullish states and
/// nil are all mutually equal, and an uninitialized Variant also
/// equals any falsey value. Explicit Null and Unassigned never equal
/// a falsey non-nullish value.
fn nullish_equal(lhs: &Value, rhs: &Value) -> bool {
    let lhs_nullish = is_nullish_like(lhs);
    let rhs_nullish = is_nullish_like(rhs);
    if lhs_nullish && rhs_nullish {
        return true;
    }
    let (nullish, other) = if lhs_nullish { (lhs, rhs) } else { (rhs, lhs) };
    matches!(nullish, Value::Variant(VariantValue::Uninitialized)) && other.is_falsey()
}

impl Evaluator {
    pub(crate) fn eval_binary_op(
        &mut self,
        op: BinaryOp,
        lhs: Value,
        rhs: Value,
        range: Range,
    ) -> Result<Value, RuntimeError> {
        if let Some(overload) = self.find_overload(OperatorKind::Binary(op), &[&lhs, &rhs]) {
            return self.invoke_with_values(&overload.decl, None, None, vec![lhs, rhs], range);
        }
        if op == BinaryOp::In {
            return eval_membership(&lhs, &rhs, range);
        }
        if matches!(lhs, Value::Variant(_)) || matches!(rhs, Value::Variant(_)) {
            return self.eval_variant_binary(op, lhs, rhs, range);
        }
        dispatch_builtin_binary(op, lhs, rhs, range)
    }

    pub(crate) fn eval_unary_op(
        &mut self,
        op: UnaryOp,
        operand: Value,
        range: Range,
    ) -> Result<Value, RuntimeError> {
        if let Some(overload) = self.find_overload(OperatorKind::Unary(op), &[&operand]) {
            return self.invoke_with_values(&overload.decl, None, None, vec![operand], range);
        }
        if let Value::Variant(variant) = &operand {
            if variant.is_nullish() {
                return Err(RuntimeError::NullishOperand {
                    range,
                    op: SmolStr::new(op.to_string()),
                });
            }
            let inner = unwrap_variant(operand);
            return self.eval_unary_op(op, inner, range);
        }
        let operand = normalize_scalar(operand);
        match (op, &operand) {
            (UnaryOp::Minus, Value::Integer(n)) => Ok(Value::Integer(n.wrapping_neg())),
            (UnaryOp::Minus, Value::Float(f)) => Ok(Value::Float(-f)),
            (UnaryOp::Plus, Value::Integer(_) | Value::Float(_)) => Ok(operand),
            (UnaryOp::Not, Value::Boolean(b)) => Ok(Value::Boolean(!b)),
            (UnaryOp::Not, Value::Integer(n)) => Ok(Value::Integer(!n)),
            _ => Err(RuntimeError::InvalidUnaryOp {
                range,
                op: SmolStr::new(op.to_string()),
                operand: SmolStr::new(operand.type_name()),
            }),
        }
    }

    /// Variant operands: nullish states get the three-tier equality
    /// and reject everything else, boxed values unwrap and
    /// re-dispatch with a few looser fallback rules.
    fn eval_variant_binary(
        &mut self,
        op: BinaryOp,
        lhs: Value,
        rhs: Value,
        range: Range,
    ) -> Result<Value, RuntimeError> {
        use BinaryOp::*;
        let lhs_nullish = matches!(&lhs, Value::Variant(v) if v.is_nullish());
        let rhs_nullish = matches!(&rhs, Value::Variant(v) if v.is_nullish());
        if lhs_nullish || rhs_nullish {
            return match op {
                Eq => Ok(Value::Boolean(nullish_equal(&lhs, &rhs))),
                NotEq => Ok(Value::Boolean(!nullish_equal(&lhs, &rhs))),
                _ => Err(RuntimeError::NullishOperand {
                    range,
                    op: SmolStr::new(op.to_string()),
                }),
            };
        }

        let lhs = unwrap_variant(lhs);
        let rhs = unwrap_variant(rhs);

        // `+` concatenates as soon as either side is a string.
        if op == Add && (matches!(lhs, Value::String(_)) || matches!(rhs, Value::String(_))) {
            return Ok(Value::String(format!("{lhs}{rhs}")));
        }
        // Logical operators coerce a numeric operand against a Boolean.
        if matches!(op, And | Or | Xor) {
            let coerced = match (&lhs, &rhs) {
                (Value::Boolean(a), other) => {
                    scalar_of(other).map(|n| (*a, n.as_float() != 0.0))
                }
                (other, Value::Boolean(b)) => {
                    scalar_of(other).map(|n| (n.as_float() != 0.0, *b))
                }
                _ => None,
            };
            if let Some((a, b)) = coerced {
                let result = match op {
                    And => a && b,
                    Or => a || b,
                    _ => a != b,
                };
                return Ok(Value::Boolean(result));
            }
        }

        match self.eval_binary_op(op, lhs.clone(), rhs.clone(), range) {
            Err(RuntimeError::InvalidBinaryOp { .. })
                if matches!(op, Eq | NotEq | Less | LessEq | Greater | GreaterEq) =>
            {
                // Last resort for mismatched relational operands:
                // compare display strings.
                let ordering = lhs.to_string().cmp(&rhs.to_string());
                let result = match op {
                    Eq => ordering == Ordering::Equal,
                    NotEq => ordering != Ordering::Equal,
                    _ => ordering_satisfies(op, ordering),
                };
                Ok(Value::Boolean(result))
            }
            other => other,
        }
    }

    /// Looks for a user overload: classes of object operands first,
    /// most derived first, then the global registry. First signature
    /// match in declaration order wins.
    fn find_overload(&self, kind: OperatorKind, operands: &[&Value]) -> Option<Rc<OperatorDecl>> {
        for operand in operands {
            if let Value::Object(object) = operand {
                for candidate in self.symbols().class_operators(object.class_name, kind) {
                    if self.operator_signature_matches(&candidate, operands) {
                        return Some(candidate);
                    }
                }
            }
        }
        for candidate in self.symbols().global_operators(kind) {
            if self.operator_signature_matches(candidate, operands) {
                return Some(Rc::clone(candidate));
            }
        }
        None
    }

    fn operator_signature_matches(&self, decl: &OperatorDecl, operands: &[&Value]) -> bool {
        decl.decl.params.len() == operands.len()
            && decl
                .decl
                .params
                .iter()
                .zip(operands)
                .all(|(param, operand)| self.value_matches_type(operand, &param.ty))
    }

    /// Structural type test used by overload signature matching.
    pub(crate) fn value_matches_type(&self, value: &Value, spec: &TypeSpec) -> bool {
        match spec {
            TypeSpec::Integer => matches!(value, Value::Integer(_) | Value::Subrange(_)),
            TypeSpec::Float => matches!(
                value,
                Value::Float(_) | Value::Integer(_) | Value::Subrange(_)
            ),
            TypeSpec::String => matches!(value, Value::String(_)),
            TypeSpec::Boolean => matches!(value, Value::Boolean(_)),
            TypeSpec::Variant => true,
            TypeSpec::Named(name) => match value {
                Value::Object(object) => {
                    self.symbols().is_descendant_of(object.class_name, *name)
                        || self.symbols().implements(object.class_name, *name)
                }
                Value::Interface(iface) => {
                    self.symbols().interface_descends(iface.interface_name, *name)
                }
                Value::Record(record) => record.type_name == *name,
                Value::Enum(value) => value.type_name == *name,
                Value::Subrange(value) => value.type_name == *name,
                _ => false,
            },
            TypeSpec::StaticArray { .. } => {
                matches!(value, Value::Array(a) if a.kind != ArrayKind::Dynamic)
            }
            TypeSpec::DynArray(_) => {
                matches!(value, Value::Array(a) if a.kind == ArrayKind::Dynamic)
            }
            TypeSpec::Set(_) => matches!(value, Value::Set(_)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::runtime_value::{SetValue, SubrangeValue};
    use crate::Ident;
    use rstest::rstest;
    use rustc_hash::FxHashSet;

    fn binop(op: BinaryOp, lhs: Value, rhs: Value) -> Result<Value, RuntimeError> {
        dispatch_builtin_binary(op, lhs, rhs, Range::default())
    }

    #[rstest]
    #[case::int_add(BinaryOp::Add, Value::Integer(2), Value::Integer(3), Value::Integer(5))]
    #[case::int_float_promotes(BinaryOp::Add, Value::Integer(2), Value::Float(0.5), Value::Float(2.5))]
    #[case::int_division_is_real(BinaryOp::Div, Value::Integer(7), Value::Integer(2), Value::Float(3.5))]
    #[case::int_div(BinaryOp::IntDiv, Value::Integer(7), Value::Integer(2), Value::Integer(3))]
    #[case::modulo_keeps_dividend_sign(BinaryOp::Modulo, Value::Integer(-7), Value::Integer(2), Value::Integer(-1))]
    #[case::string_concat(BinaryOp::Add, Value::String("ab".into()), Value::String("cd".into()), Value::String("abcd".into()))]
    #[case::shl(BinaryOp::Shl, Value::Integer(1), Value::Integer(4), Value::Integer(16))]
    #[case::sar_keeps_sign(BinaryOp::Sar, Value::Integer(-8), Value::Integer(1), Value::Integer(-4))]
    #[case::bitwise_and(BinaryOp::And, Value::Integer(6), Value::Integer(3), Value::Integer(2))]
    #[case::bool_xor(BinaryOp::Xor, Value::Boolean(true), Value::Boolean(true), Value::Boolean(false))]
    #[case::cross_numeric_eq(BinaryOp::Eq, Value::Integer(5), Value::Float(5.0), Value::Boolean(true))]
    #[case::string_lt(BinaryOp::Less, Value::String("abc".into()), Value::String("abd".into()), Value::Boolean(true))]
    #[case::nil_eq_nil(BinaryOp::Eq, Value::Nil, Value::Nil, Value::Boolean(true))]
    fn test_builtin_binary_table(
        #[case] op: BinaryOp,
        #[case] lhs: Value,
        #[case] rhs: Value,
        #[case] expected: Value,
    ) {
        assert_eq!(binop(op, lhs, rhs).unwrap(), expected);
    }

    #[test]
    fn test_shr_is_logical_shift() {
        assert_eq!(
            binop(BinaryOp::Shr, Value::Integer(-1), Value::Integer(62)).unwrap(),
            Value::Integer(3)
        );
    }

    #[rstest]
    #[case(BinaryOp::Div, Value::Integer(5), Value::Integer(0))]
    #[case(BinaryOp::Div, Value::Float(5.0), Value::Float(0.0))]
    #[case(BinaryOp::IntDiv, Value::Integer(5), Value::Integer(0))]
    #[case(BinaryOp::Modulo, Value::Integer(5), Value::Integer(0))]
    fn test_zero_divisor_is_error_with_operands(
        #[case] op: BinaryOp,
        #[case] lhs: Value,
        #[case] rhs: Value,
    ) {
        let err = binop(op, lhs.clone(), rhs).unwrap_err();
        match err {
            RuntimeError::ZeroDivision { lhs: reported, .. } => {
                assert_eq!(reported, SmolStr::new(lhs.to_string()));
            }
            other => panic!("expected ZeroDivision, got {other:?}"),
        }
    }

    #[test]
    fn test_negative_shift_is_error() {
        let err = binop(BinaryOp::Shl, Value::Integer(1), Value::Integer(-2)).unwrap_err();
        assert!(matches!(err, RuntimeError::NegativeShift { amount: -2, .. }));
    }

    #[test]
    fn test_mismatch_names_both_types_and_operator() {
        let err = binop(BinaryOp::Add, Value::Integer(1), Value::Boolean(true)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Operator is not overloaded: Integer + Boolean"
        );
    }

    #[test]
    fn test_subrange_operands_act_as_integers() {
        let day = Value::Subrange(SubrangeValue {
            type_name: Ident::new("TDay"),
            value: 15,
            low: 1,
            high: 31,
        });
        assert_eq!(
            binop(BinaryOp::Add, day.clone(), Value::Integer(1)).unwrap(),
            Value::Integer(16)
        );
        assert_eq!(
            binop(BinaryOp::Less, day, Value::Integer(20)).unwrap(),
            Value::Boolean(true)
        );
    }

    #[test]
    fn test_membership_in_set_and_array() {
        let set = Value::Set(SetValue::new(FxHashSet::from_iter([1, 3, 5])));
        assert_eq!(
            eval_membership(&Value::Integer(3), &set, Range::default()).unwrap(),
            Value::Boolean(true)
        );
        assert_eq!(
            eval_membership(&Value::Integer(2), &set, Range::default()).unwrap(),
            Value::Boolean(false)
        );

        let array = Value::Array(crate::eval::runtime_value::ArrayValue::new_dynamic(
            vec![Value::String("a".into()), Value::String("b".into())],
            crate::ast::node::TypeSpec::String,
        ));
        assert_eq!(
            eval_membership(&Value::String("b".into()), &array, Range::default()).unwrap(),
            Value::Boolean(true)
        );
    }

    #[rstest]
    #[case::uninit_equals_zero(VariantValue::Uninitialized, Value::Integer(0), true)]
    #[case::uninit_equals_empty_string(VariantValue::Uninitialized, Value::String("".into()), true)]
    #[case::uninit_equals_false(VariantValue::Uninitialized, Value::Boolean(false), true)]
    #[case::uninit_not_one(VariantValue::Uninitialized, Value::Integer(1), false)]
    #[case::null_not_zero(VariantValue::Null, Value::Integer(0), false)]
    #[case::unassigned_not_empty_string(VariantValue::Unassigned, Value::String("".into()), false)]
    #[case::null_equals_nil(VariantValue::Null, Value::Nil, true)]
    #[case::null_equals_unassigned(VariantValue::Null, Value::Variant(VariantValue::Unassigned), true)]
    fn test_nullish_equality_tiers(
        #[case] state: VariantValue,
        #[case] other: Value,
        #[case] expected: bool,
    ) {
        assert_eq!(nullish_equal(&Value::Variant(state), &other), expected);
    }

    #[test]
    fn test_unwrap_variant_collapses_nesting() {
        let nested = Value::Variant(VariantValue::Boxed(Box::new(Value::Variant(
            VariantValue::Boxed(Box::new(Value::Integer(5))),
        ))));
        assert_eq!(unwrap_variant(nested), Value::Integer(5));
    }

    #[test]
    fn test_boolean_relational_is_mismatch() {
        let err = binop(BinaryOp::Less, Value::Boolean(false), Value::Boolean(true)).unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidBinaryOp { .. }));
    }
}
