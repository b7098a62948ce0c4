use std::rc::Rc;

#[cfg(feature = "ast-json")]
use serde::{Deserialize, Serialize};

use crate::Ident;
use crate::ast::Params;
use crate::ast::node::{BinaryOp, Stmt, TypeSpec, UnaryOp};
use crate::range::Range;

#[cfg_attr(feature = "ast-json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamMode {
    Value,
    /// `var` parameter, bound as a write-through reference.
    Var,
    /// `lazy` parameter, re-evaluated in the caller scope on each use.
    Lazy,
}

#[cfg_attr(feature = "ast-json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: Ident,
    pub ty: TypeSpec,
    pub mode: ParamMode,
}

impl Param {
    pub fn value(name: &str, ty: TypeSpec) -> Self {
        Self {
            name: Ident::new(name),
            ty,
            mode: ParamMode::Value,
        }
    }
}

#[cfg_attr(feature = "ast-json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: Ident,
    pub params: Params,
    /// `None` for procedures.
    pub result: Option<TypeSpec>,
    pub body: Vec<Stmt>,
    pub range: Range,
}

#[cfg_attr(feature = "ast-json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    Instance,
    Class,
    Constructor,
    Destructor,
}

#[cfg_attr(feature = "ast-json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDecl {
    pub kind: MethodKind,
    pub decl: Rc<FunctionDecl>,
}

#[cfg_attr(feature = "ast-json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecl {
    pub name: Ident,
    pub ty: TypeSpec,
}

#[cfg_attr(feature = "ast-json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyAccessor {
    /// Backed directly by a field.
    Field(Ident),
    /// Backed by a getter or setter method.
    Method(Ident),
}

#[cfg_attr(feature = "ast-json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDecl {
    pub name: Ident,
    /// Index parameters of an array property, empty otherwise.
    pub params: Params,
    pub read: Option<PropertyAccessor>,
    pub write: Option<PropertyAccessor>,
    pub is_class: bool,
}

#[cfg_attr(feature = "ast-json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatorKind {
    Binary(BinaryOp),
    Unary(UnaryOp),
}

/// An operator overload. The operand signature is given by the
/// parameter types of `decl`, two for binary and one for unary forms.
#[cfg_attr(feature = "ast-json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct OperatorDecl {
    pub kind: OperatorKind,
    pub decl: Rc<FunctionDecl>,
}

#[cfg_attr(feature = "ast-json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDecl {
    pub name: Ident,
    pub parent: Option<Ident>,
    pub interfaces: Vec<Ident>,
    pub fields: Vec<FieldDecl>,
    pub class_vars: Vec<FieldDecl>,
    pub methods: Vec<MethodDecl>,
    pub properties: Vec<PropertyDecl>,
    pub operators: Vec<OperatorDecl>,
    pub range: Range,
}

#[cfg_attr(feature = "ast-json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceDecl {
    pub name: Ident,
    pub parent: Option<Ident>,
    pub range: Range,
}

#[cfg_attr(feature = "ast-json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct RecordDecl {
    pub name: Ident,
    pub fields: Vec<FieldDecl>,
    pub range: Range,
}

/// Enum members get ordinals from their declaration order.
#[cfg_attr(feature = "ast-json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct EnumDecl {
    pub name: Ident,
    pub members: Vec<Ident>,
    pub range: Range,
}

#[cfg_attr(feature = "ast-json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct SubrangeDecl {
    pub name: Ident,
    pub low: i64,
    pub high: i64,
    pub range: Range,
}

#[cfg_attr(feature = "ast-json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum Decl {
    Function(Rc<FunctionDecl>),
    Class(Rc<ClassDecl>),
    Interface(Rc<InterfaceDecl>),
    Record(Rc<RecordDecl>),
    Enum(Rc<EnumDecl>),
    Subrange(Rc<SubrangeDecl>),
    /// A free-standing operator overload, registered globally.
    Operator(Rc<OperatorDecl>),
}

#[cfg_attr(feature = "ast-json", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub decls: Vec<Decl>,
    pub main: Vec<Stmt>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_value_helper() {
        let param = Param::value("x", TypeSpec::Integer);
        assert_eq!(param.name, Ident::new("x"));
        assert_eq!(param.mode, ParamMode::Value);
    }

    #[test]
    fn test_program_default_is_empty() {
        let program = Program::default();
        assert!(program.decls.is_empty());
        assert!(program.main.is_empty());
    }
}
