use std::sync::LazyLock;

use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use thiserror::Error;

use crate::Ident;
use crate::eval::error::RuntimeError;
use crate::eval::runtime_value::{ArrayKind, Value, VariantValue};
use crate::range::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ParamNum {
    None,
    Fixed(u8),
    Range(u8, u8),
}

impl ParamNum {
    pub fn is_valid(&self, count: u8) -> bool {
        match self {
            ParamNum::None => count == 0,
            ParamNum::Fixed(n) => count == *n,
            ParamNum::Range(min, max) => count >= *min && count <= *max,
        }
    }

    pub fn expected(&self) -> SmolStr {
        match self {
            ParamNum::None => SmolStr::new_static("0"),
            ParamNum::Fixed(n) => SmolStr::new(n.to_string()),
            ParamNum::Range(min, max) => SmolStr::new(format!("{min} to {max}")),
        }
    }
}

/// Errors raised inside builtins carry no location; the evaluator
/// attaches the call site range when mapping them.
#[derive(Error, Debug, PartialEq, Clone)]
pub(crate) enum Error {
    #[error("\"{0}\" is not defined")]
    NotDefined(SmolStr),
    #[error("Invalid number of arguments to \"{0}\": expected {1}, got {2}")]
    InvalidNumberOfArguments(SmolStr, SmolStr, u8),
    #[error("Invalid types in call to \"{name}\": {list}", name = .0, list = .1.join(", "))]
    InvalidTypes(SmolStr, Vec<String>),
    #[error("Cannot convert {0} to {1}")]
    InvalidConversion(SmolStr, SmolStr),
    #[error("Invalid argument to \"{0}\": {1}")]
    InvalidArgument(SmolStr, SmolStr),
    #[error("Assertion failed")]
    AssertionFailed(SmolStr),
}

impl Error {
    pub fn into_runtime(self, range: Range) -> RuntimeError {
        match self {
            Error::NotDefined(name) => RuntimeError::UndefinedFunction { range, name },
            Error::InvalidNumberOfArguments(name, expected, got) => {
                RuntimeError::InvalidNumberOfArguments {
                    range,
                    name,
                    expected,
                    got,
                }
            }
            Error::InvalidTypes(name, args) => RuntimeError::InvalidTypes { range, name, args },
            Error::InvalidConversion(from, to) => {
                RuntimeError::InvalidConversion { range, from, to }
            }
            Error::InvalidArgument(name, detail) => RuntimeError::InvalidTypes {
                range,
                name,
                args: vec![detail.to_string()],
            },
            Error::AssertionFailed(message) => RuntimeError::AssertionFailed { range, message },
        }
    }
}

pub(crate) struct BuiltinFunction {
    pub num_params: ParamNum,
    pub func: fn(Ident, &[Value]) -> Result<Value, Error>,
}

enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn as_float(&self) -> f64 {
        match self {
            Num::Int(n) => *n as f64,
            Num::Float(f) => *f,
        }
    }
}

fn as_num(value: &Value) -> Option<Num> {
    match value {
        Value::Integer(n) => Some(Num::Int(*n)),
        Value::Float(f) => Some(Num::Float(*f)),
        Value::Subrange(s) => Some(Num::Int(s.value)),
        Value::Variant(VariantValue::Boxed(inner)) => as_num(inner),
        _ => None,
    }
}

fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Boolean(b) => Some(*b),
        Value::Variant(VariantValue::Boxed(inner)) => as_bool(inner),
        _ => None,
    }
}

fn as_str(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) => Some(s),
        Value::Variant(VariantValue::Boxed(inner)) => as_str(inner),
        _ => None,
    }
}

fn invalid_types(name: Ident, args: &[Value]) -> Error {
    Error::InvalidTypes(
        SmolStr::new(name.as_str()),
        args.iter().map(|arg| format!("{arg:?}")).collect(),
    )
}

static BUILTIN_FUNCTIONS: LazyLock<FxHashMap<SmolStr, BuiltinFunction>> = LazyLock::new(|| {
    let mut map: FxHashMap<SmolStr, BuiltinFunction> = FxHashMap::default();

    map.insert(
        SmolStr::new_static("length"),
        BuiltinFunction {
            num_params: ParamNum::Fixed(1),
            func: |name, args| match args {
                [Value::Array(array)] => Ok(Value::Integer(array.len() as i64)),
                [Value::Set(set)] => Ok(Value::Integer(set.members.len() as i64)),
                [value] => match as_str(value) {
                    Some(s) => Ok(Value::Integer(s.chars().count() as i64)),
                    None => Err(invalid_types(name, args)),
                },
                _ => Err(invalid_types(name, args)),
            },
        },
    );
    map.insert(
        SmolStr::new_static("setlength"),
        BuiltinFunction {
            num_params: ParamNum::Fixed(2),
            func: |name, args| match args {
                [Value::Array(array), len] => {
                    if array.kind != ArrayKind::Dynamic {
                        return Err(invalid_types(name, args));
                    }
                    let new_len = match as_num(len) {
                        Some(Num::Int(n)) => n.max(0) as usize,
                        _ => return Err(invalid_types(name, args)),
                    };
                    let elem = std::rc::Rc::clone(&array.elem);
                    array
                        .items
                        .borrow_mut()
                        .resize_with(new_len, || Value::zero_of(&elem));
                    Ok(Value::Nil)
                }
                _ => Err(invalid_types(name, args)),
            },
        },
    );
    map.insert(
        SmolStr::new_static("low"),
        BuiltinFunction {
            num_params: ParamNum::Fixed(1),
            func: |name, args| match args {
                [Value::Array(array)] => Ok(Value::Integer(array.low())),
                [Value::String(_)] => Ok(Value::Integer(1)),
                _ => Err(invalid_types(name, args)),
            },
        },
    );
    map.insert(
        SmolStr::new_static("high"),
        BuiltinFunction {
            num_params: ParamNum::Fixed(1),
            func: |name, args| match args {
                [Value::Array(array)] => Ok(Value::Integer(array.high())),
                [Value::String(s)] => Ok(Value::Integer(s.chars().count() as i64)),
                _ => Err(invalid_types(name, args)),
            },
        },
    );
    map.insert(
        SmolStr::new_static("copy"),
        BuiltinFunction {
            num_params: ParamNum::Fixed(3),
            func: |name, args| match args {
                [value, start, count] => {
                    let (Some(s), Some(Num::Int(start)), Some(Num::Int(count))) =
                        (as_str(value), as_num(start), as_num(count))
                    else {
                        return Err(invalid_types(name, args));
                    };
                    // 1-based, clamped like the classic Copy.
                    let skip = (start.max(1) - 1) as usize;
                    let take = count.max(0) as usize;
                    Ok(Value::String(s.chars().skip(skip).take(take).collect()))
                }
                _ => Err(invalid_types(name, args)),
            },
        },
    );
    map.insert(
        SmolStr::new_static("pos"),
        BuiltinFunction {
            num_params: ParamNum::Fixed(2),
            func: |name, args| match args {
                [needle, hay] => match (as_str(needle), as_str(hay)) {
                    (Some(needle), Some(hay)) => {
                        let position = hay
                            .find(needle)
                            .map(|offset| hay[..offset].chars().count() as i64 + 1)
                            .unwrap_or(0);
                        Ok(Value::Integer(position))
                    }
                    _ => Err(invalid_types(name, args)),
                },
                _ => Err(invalid_types(name, args)),
            },
        },
    );
    map.insert(
        SmolStr::new_static("uppercase"),
        BuiltinFunction {
            num_params: ParamNum::Fixed(1),
            func: |name, args| match args {
                [value] => match as_str(value) {
                    Some(s) => Ok(Value::String(s.to_uppercase())),
                    None => Err(invalid_types(name, args)),
                },
                _ => Err(invalid_types(name, args)),
            },
        },
    );
    map.insert(
        SmolStr::new_static("lowercase"),
        BuiltinFunction {
            num_params: ParamNum::Fixed(1),
            func: |name, args| match args {
                [value] => match as_str(value) {
                    Some(s) => Ok(Value::String(s.to_lowercase())),
                    None => Err(invalid_types(name, args)),
                },
                _ => Err(invalid_types(name, args)),
            },
        },
    );
    map.insert(
        SmolStr::new_static("trim"),
        BuiltinFunction {
            num_params: ParamNum::Fixed(1),
            func: |name, args| match args {
                [value] => match as_str(value) {
                    Some(s) => Ok(Value::String(s.trim().to_string())),
                    None => Err(invalid_types(name, args)),
                },
                _ => Err(invalid_types(name, args)),
            },
        },
    );
    map.insert(
        SmolStr::new_static("abs"),
        BuiltinFunction {
            num_params: ParamNum::Fixed(1),
            func: |name, args| match args {
                [value] => match as_num(value) {
                    Some(Num::Int(n)) => Ok(Value::Integer(n.wrapping_abs())),
                    Some(Num::Float(f)) => Ok(Value::Float(f.abs())),
                    None => Err(invalid_types(name, args)),
                },
                _ => Err(invalid_types(name, args)),
            },
        },
    );
    map.insert(
        SmolStr::new_static("min"),
        BuiltinFunction {
            num_params: ParamNum::Fixed(2),
            func: |name, args| match args {
                [a, b] => match (as_num(a), as_num(b)) {
                    (Some(Num::Int(x)), Some(Num::Int(y))) => Ok(Value::Integer(x.min(y))),
                    (Some(x), Some(y)) => Ok(Value::Float(x.as_float().min(y.as_float()))),
                    _ => Err(invalid_types(name, args)),
                },
                _ => Err(invalid_types(name, args)),
            },
        },
    );
    map.insert(
        SmolStr::new_static("max"),
        BuiltinFunction {
            num_params: ParamNum::Fixed(2),
            func: |name, args| match args {
                [a, b] => match (as_num(a), as_num(b)) {
                    (Some(Num::Int(x)), Some(Num::Int(y))) => Ok(Value::Integer(x.max(y))),
                    (Some(x), Some(y)) => Ok(Value::Float(x.as_float().max(y.as_float()))),
                    _ => Err(invalid_types(name, args)),
                },
                _ => Err(invalid_types(name, args)),
            },
        },
    );
    map.insert(
        SmolStr::new_static("sqrt"),
        BuiltinFunction {
            num_params: ParamNum::Fixed(1),
            func: |name, args| match args {
                [value] => match as_num(value) {
                    Some(num) => {
                        let f = num.as_float();
                        if f < 0.0 {
                            Err(Error::InvalidArgument(
                                SmolStr::new(name.as_str()),
                                SmolStr::new(format!("negative operand {f}")),
                            ))
                        } else {
                            Ok(Value::Float(f.sqrt()))
                        }
                    }
                    None => Err(invalid_types(name, args)),
                },
                _ => Err(invalid_types(name, args)),
            },
        },
    );
    map.insert(
        SmolStr::new_static("trunc"),
        BuiltinFunction {
            num_params: ParamNum::Fixed(1),
            func: |name, args| match args {
                [value] => match as_num(value) {
                    Some(Num::Int(n)) => Ok(Value::Integer(n)),
                    Some(Num::Float(f)) => Ok(Value::Integer(f.trunc() as i64)),
                    None => Err(invalid_types(name, args)),
                },
                _ => Err(invalid_types(name, args)),
            },
        },
    );
    map.insert(
        SmolStr::new_static("round"),
        BuiltinFunction {
            num_params: ParamNum::Fixed(1),
            func: |name, args| match args {
                [value] => match as_num(value) {
                    Some(Num::Int(n)) => Ok(Value::Integer(n)),
                    // Banker's rounding, matching the classic Round.
                    Some(Num::Float(f)) => Ok(Value::Integer(f.round_ties_even() as i64)),
                    None => Err(invalid_types(name, args)),
                },
                _ => Err(invalid_types(name, args)),
            },
        },
    );
    map.insert(
        SmolStr::new_static("ord"),
        BuiltinFunction {
            num_params: ParamNum::Fixed(1),
            func: |name, args| match args {
                [value] => value
                    .ordinal()
                    .map(Value::Integer)
                    .ok_or_else(|| invalid_types(name, args)),
                _ => Err(invalid_types(name, args)),
            },
        },
    );
    map.insert(
        SmolStr::new_static("chr"),
        BuiltinFunction {
            num_params: ParamNum::Fixed(1),
            func: |name, args| match args {
                [value] => match as_num(value) {
                    Some(Num::Int(n)) => u32::try_from(n)
                        .ok()
                        .and_then(char::from_u32)
                        .map(|c| Value::String(c.to_string()))
                        .ok_or_else(|| {
                            Error::InvalidArgument(
                                SmolStr::new(name.as_str()),
                                SmolStr::new(format!("{n} is not a valid code point")),
                            )
                        }),
                    _ => Err(invalid_types(name, args)),
                },
                _ => Err(invalid_types(name, args)),
            },
        },
    );
    map.insert(
        SmolStr::new_static("inttostr"),
        BuiltinFunction {
            num_params: ParamNum::Fixed(1),
            func: |name, args| match args {
                [value] => match as_num(value) {
                    Some(Num::Int(n)) => Ok(Value::String(n.to_string())),
                    _ => Err(invalid_types(name, args)),
                },
                _ => Err(invalid_types(name, args)),
            },
        },
    );
    map.insert(
        SmolStr::new_static("strtoint"),
        BuiltinFunction {
            num_params: ParamNum::Fixed(1),
            func: |name, args| match args {
                [value] => {
                    let Some(s) = as_str(value) else {
                        return Err(invalid_types(name, args));
                    };
                    let trimmed = s.trim();
                    // `$` prefixes hexadecimal, as in the Pascal RTL.
                    let parsed = match trimmed.strip_prefix('$') {
                        Some(hex) => i64::from_str_radix(hex, 16),
                        None => trimmed.parse::<i64>(),
                    };
                    parsed.map(Value::Integer).map_err(|_| {
                        Error::InvalidConversion(
                            SmolStr::new(format!("\"{s}\"")),
                            SmolStr::new_static("Integer"),
                        )
                    })
                }
                _ => Err(invalid_types(name, args)),
            },
        },
    );
    map.insert(
        SmolStr::new_static("floattostr"),
        BuiltinFunction {
            num_params: ParamNum::Fixed(1),
            func: |name, args| match args {
                [value] => match as_num(value) {
                    Some(num) => Ok(Value::String(Value::Float(num.as_float()).to_string())),
                    None => Err(invalid_types(name, args)),
                },
                _ => Err(invalid_types(name, args)),
            },
        },
    );
    map.insert(
        SmolStr::new_static("assigned"),
        BuiltinFunction {
            num_params: ParamNum::Fixed(1),
            func: |_, args| match args {
                [Value::Nil] => Ok(Value::FALSE),
                [Value::Interface(iface)] => Ok(Value::Boolean(!iface.is_nil())),
                [Value::Variant(variant)] => Ok(Value::Boolean(!variant.is_nullish())),
                [_] => Ok(Value::TRUE),
                _ => unreachable!("arity checked"),
            },
        },
    );
    map.insert(
        SmolStr::new_static("varisnull"),
        BuiltinFunction {
            num_params: ParamNum::Fixed(1),
            func: |_, args| match args {
                [Value::Variant(VariantValue::Null)] => Ok(Value::TRUE),
                [_] => Ok(Value::FALSE),
                _ => unreachable!("arity checked"),
            },
        },
    );
    map.insert(
        SmolStr::new_static("varisempty"),
        BuiltinFunction {
            num_params: ParamNum::Fixed(1),
            func: |_, args| match args {
                [Value::Variant(VariantValue::Unassigned)]
                | [Value::Variant(VariantValue::Uninitialized)] => Ok(Value::TRUE),
                [_] => Ok(Value::FALSE),
                _ => unreachable!("arity checked"),
            },
        },
    );
    map.insert(
        SmolStr::new_static("assert"),
        BuiltinFunction {
            num_params: ParamNum::Range(1, 2),
            func: |name, args| {
                let message = match args.get(1) {
                    None => SmolStr::default(),
                    Some(value) => match as_str(value) {
                        Some(s) => SmolStr::new(s),
                        None => return Err(invalid_types(name, args)),
                    },
                };
                match as_bool(&args[0]) {
                    Some(true) => Ok(Value::Nil),
                    Some(false) => Err(Error::AssertionFailed(message)),
                    None => Err(invalid_types(name, args)),
                }
            },
        },
    );
    map.insert(
        SmolStr::new_static("pi"),
        BuiltinFunction {
            num_params: ParamNum::None,
            func: |_, _| Ok(Value::Float(std::f64::consts::PI)),
        },
    );
    map.insert(
        SmolStr::new_static("unassigned"),
        BuiltinFunction {
            num_params: ParamNum::None,
            func: |_, _| Ok(Value::Variant(VariantValue::Unassigned)),
        },
    );
    map.insert(
        SmolStr::new_static("null"),
        BuiltinFunction {
            num_params: ParamNum::None,
            func: |_, _| Ok(Value::Variant(VariantValue::Null)),
        },
    );

    map
});

pub(crate) fn lookup(name: Ident) -> Option<&'static BuiltinFunction> {
    name.resolve_with(|s| BUILTIN_FUNCTIONS.get(&SmolStr::new(s.to_lowercase())))
}

/// True when `name` is a builtin callable without parameters, which
/// the identifier resolution path may invoke as a bare name.
pub(crate) fn is_zero_arg(name: Ident) -> bool {
    matches!(lookup(name), Some(func) if func.num_params == ParamNum::None)
}

pub(crate) fn eval_builtin(name: Ident, args: &[Value]) -> Result<Value, Error> {
    let Some(func) = lookup(name) else {
        return Err(Error::NotDefined(SmolStr::new(name.as_str())));
    };
    if !func.num_params.is_valid(args.len() as u8) {
        return Err(Error::InvalidNumberOfArguments(
            SmolStr::new(name.as_str()),
            func.num_params.expected(),
            args.len() as u8,
        ));
    }
    (func.func)(name, args)
}
