use std::fmt;
use std::rc::Rc;

#[cfg(feature = "ast-json")]
use serde::{Deserialize, Serialize};

use crate::Ident;
use crate::ast::Args;
use crate::range::Range;

/// An expression together with its source location.
///
/// Nodes are shared via `Rc` so that lazily evaluated arguments and
/// method bodies can hold onto subtrees without cloning them.
#[cfg_attr(feature = "ast-json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub range: Range,
    pub expr: Rc<Expr>,
}

impl Node {
    pub fn new(expr: Expr, range: Range) -> Self {
        Self {
            range,
            expr: Rc::new(expr),
        }
    }
}

#[cfg_attr(feature = "ast-json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Integer(i64),
    Float(f64),
    String(String),
    Boolean(bool),
    Nil,
}

#[cfg_attr(feature = "ast-json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    IntDiv,
    Modulo,
    Eq,
    NotEq,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Sar,
    In,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::IntDiv => "div",
            BinaryOp::Modulo => "mod",
            BinaryOp::Eq => "=",
            BinaryOp::NotEq => "<>",
            BinaryOp::Less => "<",
            BinaryOp::LessEq => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEq => ">=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Xor => "xor",
            BinaryOp::Shl => "shl",
            BinaryOp::Shr => "shr",
            BinaryOp::Sar => "sar",
            BinaryOp::In => "in",
        };
        write!(f, "{symbol}")
    }
}

#[cfg_attr(feature = "ast-json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Minus,
    Plus,
    Not,
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            UnaryOp::Minus => "-",
            UnaryOp::Plus => "+",
            UnaryOp::Not => "not",
        };
        write!(f, "{symbol}")
    }
}

#[cfg_attr(feature = "ast-json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
}

impl AssignOp {
    /// The arithmetic operator applied before the store, if any.
    pub fn binary_op(&self) -> Option<BinaryOp> {
        match self {
            AssignOp::Assign => None,
            AssignOp::AddAssign => Some(BinaryOp::Add),
            AssignOp::SubAssign => Some(BinaryOp::Sub),
            AssignOp::MulAssign => Some(BinaryOp::Mul),
            AssignOp::DivAssign => Some(BinaryOp::Div),
        }
    }
}

impl fmt::Display for AssignOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            AssignOp::Assign => ":=",
            AssignOp::AddAssign => "+=",
            AssignOp::SubAssign => "-=",
            AssignOp::MulAssign => "*=",
            AssignOp::DivAssign => "/=",
        };
        write!(f, "{symbol}")
    }
}

/// A single element of a set constructor, either one ordinal or an
/// inclusive range of ordinals.
#[cfg_attr(feature = "ast-json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum SetElem {
    Single(Rc<Node>),
    Range(Rc<Node>, Rc<Node>),
}

#[cfg_attr(feature = "ast-json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Ident(Ident),
    SelfRef,
    Binary(BinaryOp, Rc<Node>, Rc<Node>),
    Unary(UnaryOp, Rc<Node>),
    /// Indexing with one or more subscripts, `a[i]` or `a[i, j]`.
    Index(Rc<Node>, Args),
    Member(Rc<Node>, Ident),
    /// A call whose callee is an identifier or member access node.
    Call(Rc<Node>, Args),
    /// A call of the parent class implementation of a method.
    Inherited(Ident, Args),
    SetLit(Vec<SetElem>),
    /// A checked cast to a class or interface type, `TShape(v)`.
    Cast(Ident, Rc<Node>),
    /// `@name` or `@obj.Method`, producing a function pointer.
    AddrOf(Rc<Node>),
}

/// Type annotations as they appear in declarations. The runtime keeps
/// them around to produce zero values and validate stores.
#[cfg_attr(feature = "ast-json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum TypeSpec {
    Integer,
    Float,
    String,
    Boolean,
    Variant,
    /// A class, interface, record, enum or subrange referenced by name.
    Named(Ident),
    StaticArray {
        low: i64,
        high: i64,
        elem: Box<TypeSpec>,
    },
    DynArray(Box<TypeSpec>),
    Set(Box<TypeSpec>),
}

impl fmt::Display for TypeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSpec::Integer => write!(f, "Integer"),
            TypeSpec::Float => write!(f, "Float"),
            TypeSpec::String => write!(f, "String"),
            TypeSpec::Boolean => write!(f, "Boolean"),
            TypeSpec::Variant => write!(f, "Variant"),
            TypeSpec::Named(name) => write!(f, "{name}"),
            TypeSpec::StaticArray { low, high, elem } => {
                write!(f, "array[{low}..{high}] of {elem}")
            }
            TypeSpec::DynArray(elem) => write!(f, "array of {elem}"),
            TypeSpec::Set(elem) => write!(f, "set of {elem}"),
        }
    }
}

#[cfg_attr(feature = "ast-json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub range: Range,
    pub kind: StmtKind,
}

impl Stmt {
    pub fn new(kind: StmtKind, range: Range) -> Self {
        Self { range, kind }
    }
}

#[cfg_attr(feature = "ast-json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Block(Vec<Stmt>),
    /// A local variable declaration with an optional initializer.
    Var(Ident, TypeSpec, Option<Rc<Node>>),
    Assign(AssignOp, Rc<Node>, Rc<Node>),
    Expr(Rc<Node>),
    If(Rc<Node>, Box<Stmt>, Option<Box<Stmt>>),
    While(Rc<Node>, Box<Stmt>),
    /// `repeat .. until cond`, body runs at least once.
    Repeat(Vec<Stmt>, Rc<Node>),
    For {
        var: Ident,
        from: Rc<Node>,
        to: Rc<Node>,
        downto: bool,
        body: Box<Stmt>,
    },
    Case(Rc<Node>, Vec<CaseArm>, Option<Vec<Stmt>>),
    Break,
    Continue,
    /// `exit` or `exit(value)`, returning from the enclosing routine.
    Exit(Option<Rc<Node>>),
    /// `raise expr`, or a bare `raise` re-throwing the active exception.
    Raise(Option<Rc<Node>>),
    Try {
        body: Vec<Stmt>,
        except: Option<ExceptBlock>,
        finally: Option<Vec<Stmt>>,
    },
}

#[cfg_attr(feature = "ast-json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct CaseArm {
    pub labels: Vec<CaseLabel>,
    pub body: Vec<Stmt>,
}

#[cfg_attr(feature = "ast-json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum CaseLabel {
    Value(Rc<Node>),
    Range(Rc<Node>, Rc<Node>),
}

#[cfg_attr(feature = "ast-json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptBlock {
    pub handlers: Vec<OnHandler>,
    /// Statements of a handler-less `except` part, or the trailing
    /// `else` of one with `on` handlers.
    pub fallback: Option<Vec<Stmt>>,
}

#[cfg_attr(feature = "ast-json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct OnHandler {
    pub binding: Option<Ident>,
    pub class_name: Ident,
    pub body: Vec<Stmt>,
}
