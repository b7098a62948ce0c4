//! `blaise-lang` is the runtime core for the Blaise scripting
//! language, a Pascal-family language with classes, interfaces,
//! properties, operator overloading and manually managed object
//! lifetimes.
//!
//! The crate evaluates already-parsed programs: a host builds a
//! [`Program`] out of AST nodes, hands it to an [`Engine`] and reads
//! back the result value and anything the program printed.
//!
//! ## Examples
//!
//! ```
//! use std::rc::Rc;
//! use blaise_lang::{
//!     BinaryOp, Engine, Expr, Literal, Node, Program, Range, Stmt, StmtKind, Value,
//! };
//!
//! // 40 + 2
//! let sum = Node::new(
//!     Expr::Binary(
//!         BinaryOp::Add,
//!         Rc::new(Node::new(Expr::Literal(Literal::Integer(40)), Range::default())),
//!         Rc::new(Node::new(Expr::Literal(Literal::Integer(2)), Range::default())),
//!     ),
//!     Range::default(),
//! );
//! let program = Program {
//!     decls: vec![],
//!     main: vec![Stmt::new(StmtKind::Expr(Rc::new(sum)), Range::default())],
//! };
//!
//! let mut engine = Engine::default();
//! assert_eq!(engine.run(&program).unwrap(), Value::Integer(42));
//! ```
mod ast;
mod engine;
mod error;
mod eval;
mod ident;
mod range;

pub use ast::decl::{
    ClassDecl, Decl, EnumDecl, FieldDecl, FunctionDecl, InterfaceDecl, MethodDecl, MethodKind,
    OperatorDecl, OperatorKind, Param, ParamMode, PropertyAccessor, PropertyDecl, RecordDecl,
    SubrangeDecl,
};
pub use ast::node::{
    AssignOp, BinaryOp, CaseArm, CaseLabel, ExceptBlock, Expr, Literal, Node, OnHandler, SetElem,
    Stmt, StmtKind, TypeSpec, UnaryOp,
};
pub use ast::{Args, Params, Program};
pub use engine::Engine;
pub use error::Error;
pub use eval::env::Env;
pub use eval::error::{ErrorCategory, RuntimeError};
pub use eval::object::ObjectInstance;
pub use eval::runtime_value::{
    ArrayValue, EnumValue, FunctionValue, InterfaceValue, RecordValue, RefValue, SetValue,
    SubrangeValue, Value, VariantValue,
};
pub use eval::thunk::LazyValue;
pub use ident::Ident;
pub use range::{Position, Range};
