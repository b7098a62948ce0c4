use std::fmt;

use smol_str::SmolStr;
use thiserror::Error;

use crate::Ident;
use crate::eval::runtime_value::Value;
use crate::range::Range;

/// Coarse classification used by diagnostics and host embeddings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Type,
    Runtime,
    Contract,
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Type => write!(f, "Type error"),
            ErrorCategory::Runtime => write!(f, "Runtime error"),
            ErrorCategory::Contract => write!(f, "Contract violation"),
            ErrorCategory::Internal => write!(f, "Internal error"),
        }
    }
}

fn assertion_message(message: &SmolStr) -> String {
    if message.is_empty() {
        "Assertion failed".to_string()
    } else {
        format!("Assertion failed: {message}")
    }
}

#[derive(Error, Debug, PartialEq, Clone)]
pub enum RuntimeError {
    #[error("Operator is not overloaded: {lhs} {op} {rhs}")]
    InvalidBinaryOp {
        range: Range,
        op: SmolStr,
        lhs: SmolStr,
        rhs: SmolStr,
    },
    #[error("Operator is not overloaded: {op} {operand}")]
    InvalidUnaryOp {
        range: Range,
        op: SmolStr,
        operand: SmolStr,
    },
    #[error("Division by zero: {lhs} {op} {rhs}")]
    ZeroDivision {
        range: Range,
        op: SmolStr,
        lhs: SmolStr,
        rhs: SmolStr,
    },
    #[error("Negative shift count: {lhs} {op} {amount}")]
    NegativeShift {
        range: Range,
        op: SmolStr,
        lhs: SmolStr,
        amount: i64,
    },
    #[error("Index {index} is out of bounds [{low}..{high}]")]
    IndexOutOfBounds {
        range: Range,
        index: i64,
        low: i64,
        high: i64,
    },
    #[error("Value {value} is out of range for \"{type_name}\" [{low}..{high}]")]
    OutOfRange {
        range: Range,
        value: SmolStr,
        type_name: SmolStr,
        low: i64,
        high: i64,
    },
    #[error("Cannot convert {from} to {to}")]
    InvalidConversion {
        range: Range,
        from: SmolStr,
        to: SmolStr,
    },
    #[error("Undefined variable \"{name}\"")]
    UndefinedVariable { range: Range, name: SmolStr },
    #[error("Undefined function \"{name}\"")]
    UndefinedFunction { range: Range, name: SmolStr },
    #[error("\"{type_name}\" has no member \"{member}\"")]
    UndefinedMember {
        range: Range,
        type_name: SmolStr,
        member: SmolStr,
    },
    #[error("Undefined type \"{name}\"")]
    UndefinedType { range: Range, name: SmolStr },
    #[error("Value of type {type_name} is not callable")]
    NotCallable { range: Range, type_name: SmolStr },
    #[error("Invalid number of arguments to \"{name}\": expected {expected}, got {got}")]
    InvalidNumberOfArguments {
        range: Range,
        name: SmolStr,
        expected: SmolStr,
        got: u8,
    },
    #[error("Invalid types in call to \"{name}\": {}", .args.join(", "))]
    InvalidTypes {
        range: Range,
        name: SmolStr,
        args: Vec<String>,
    },
    #[error("Access violation: nil dereference")]
    NilAccess { range: Range },
    #[error("Object of class \"{class_name}\" was already destroyed")]
    AlreadyDestroyed { range: Range, class_name: SmolStr },
    #[error("Invalid variant operation: \"{op}\" on Null or Unassigned")]
    NullishOperand { range: Range, op: SmolStr },
    #[error("String element assignment requires a single character, got {got}")]
    InvalidStringStore { range: Range, got: SmolStr },
    #[error("Argument for var parameter \"{name}\" must be a variable")]
    InvalidRefArgument { range: Range, name: SmolStr },
    #[error("{}", assertion_message(.message))]
    AssertionFailed { range: Range, message: SmolStr },
    /// An exception raised by the program itself, catchable by
    /// `try..except`. Carries the raised value for handler bindings.
    #[error("{class_name}: {message}")]
    Raised {
        range: Range,
        class_name: Ident,
        message: SmolStr,
        object: Box<Value>,
    },
    #[error("No exception is active to re-raise")]
    NoActiveException { range: Range },
    #[error("Recursion limit exceeded ({depth})")]
    Recursion { range: Range, depth: u32 },
    #[error("Set range spans {span} ordinals, limit is 65536")]
    SetTooLarge { range: Range, span: i64 },
    #[error("Internal error: {message}")]
    Internal { range: Range, message: SmolStr },
}

impl RuntimeError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            RuntimeError::InvalidBinaryOp { .. }
            | RuntimeError::InvalidUnaryOp { .. }
            | RuntimeError::InvalidConversion { .. }
            | RuntimeError::NotCallable { .. }
            | RuntimeError::InvalidTypes { .. }
            | RuntimeError::NullishOperand { .. }
            | RuntimeError::InvalidStringStore { .. } => ErrorCategory::Type,
            RuntimeError::ZeroDivision { .. }
            | RuntimeError::NegativeShift { .. }
            | RuntimeError::IndexOutOfBounds { .. }
            | RuntimeError::OutOfRange { .. }
            | RuntimeError::UndefinedVariable { .. }
            | RuntimeError::UndefinedFunction { .. }
            | RuntimeError::UndefinedMember { .. }
            | RuntimeError::UndefinedType { .. }
            | RuntimeError::InvalidNumberOfArguments { .. }
            | RuntimeError::NilAccess { .. }
            | RuntimeError::AlreadyDestroyed { .. }
            | RuntimeError::InvalidRefArgument { .. }
            | RuntimeError::Raised { .. }
            | RuntimeError::NoActiveException { .. }
            | RuntimeError::Recursion { .. }
            | RuntimeError::SetTooLarge { .. } => ErrorCategory::Runtime,
            RuntimeError::AssertionFailed { .. } => ErrorCategory::Contract,
            RuntimeError::Internal { .. } => ErrorCategory::Internal,
        }
    }

    #[cold]
    pub fn range(&self) -> Range {
        match self {
            RuntimeError::InvalidBinaryOp { range, .. }
            | RuntimeError::InvalidUnaryOp { range, .. }
            | RuntimeError::ZeroDivision { range, .. }
            | RuntimeError::NegativeShift { range, .. }
            | RuntimeError::IndexOutOfBounds { range, .. }
            | RuntimeError::OutOfRange { range, .. }
            | RuntimeError::InvalidConversion { range, .. }
            | RuntimeError::UndefinedVariable { range, .. }
            | RuntimeError::UndefinedFunction { range, .. }
            | RuntimeError::UndefinedMember { range, .. }
            | RuntimeError::UndefinedType { range, .. }
            | RuntimeError::NotCallable { range, .. }
            | RuntimeError::InvalidNumberOfArguments { range, .. }
            | RuntimeError::InvalidTypes { range, .. }
            | RuntimeError::NilAccess { range }
            | RuntimeError::AlreadyDestroyed { range, .. }
            | RuntimeError::NullishOperand { range, .. }
            | RuntimeError::InvalidStringStore { range, .. }
            | RuntimeError::InvalidRefArgument { range, .. }
            | RuntimeError::AssertionFailed { range, .. }
            | RuntimeError::Raised { range, .. }
            | RuntimeError::NoActiveException { range }
            | RuntimeError::Recursion { range, .. }
            | RuntimeError::SetTooLarge { range, .. }
            | RuntimeError::Internal { range, .. } => *range,
        }
    }

    /// Stable identifier for diagnostic codes.
    pub fn name(&self) -> &'static str {
        match self {
            RuntimeError::InvalidBinaryOp { .. } => "invalid_binary_op",
            RuntimeError::InvalidUnaryOp { .. } => "invalid_unary_op",
            RuntimeError::ZeroDivision { .. } => "zero_division",
            RuntimeError::NegativeShift { .. } => "negative_shift",
            RuntimeError::IndexOutOfBounds { .. } => "index_out_of_bounds",
            RuntimeError::OutOfRange { .. } => "out_of_range",
            RuntimeError::InvalidConversion { .. } => "invalid_conversion",
            RuntimeError::UndefinedVariable { .. } => "undefined_variable",
            RuntimeError::UndefinedFunction { .. } => "undefined_function",
            RuntimeError::UndefinedMember { .. } => "undefined_member",
            RuntimeError::UndefinedType { .. } => "undefined_type",
            RuntimeError::NotCallable { .. } => "not_callable",
            RuntimeError::InvalidNumberOfArguments { .. } => "invalid_number_of_arguments",
            RuntimeError::InvalidTypes { .. } => "invalid_types",
            RuntimeError::NilAccess { .. } => "nil_access",
            RuntimeError::AlreadyDestroyed { .. } => "already_destroyed",
            RuntimeError::NullishOperand { .. } => "nullish_operand",
            RuntimeError::InvalidStringStore { .. } => "invalid_string_store",
            RuntimeError::InvalidRefArgument { .. } => "invalid_ref_argument",
            RuntimeError::AssertionFailed { .. } => "assertion_failed",
            RuntimeError::Raised { .. } => "raised",
            RuntimeError::NoActiveException { .. } => "no_active_exception",
            RuntimeError::Recursion { .. } => "recursion",
            RuntimeError::SetTooLarge { .. } => "set_too_large",
            RuntimeError::Internal { .. } => "internal",
        }
    }
}
