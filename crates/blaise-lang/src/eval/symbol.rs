use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::Ident;
use crate::ast::decl::{
    ClassDecl, Decl, EnumDecl, FieldDecl, FunctionDecl, InterfaceDecl, MethodDecl, MethodKind,
    OperatorDecl, OperatorKind, Program, PropertyDecl, RecordDecl, SubrangeDecl,
};
use crate::eval::runtime_value::EnumValue;

/// Ancestor chains are bounded so that a malformed declaration set
/// cannot spin the lookup forever.
const MAX_CHAIN_DEPTH: usize = 256;

/// All user declarations of a program, indexed by name. Populated
/// once when a program is loaded and read-only afterwards.
#[derive(Debug, Default)]
pub(crate) struct SymbolTable {
    functions: FxHashMap<Ident, Rc<FunctionDecl>>,
    classes: FxHashMap<Ident, Rc<ClassDecl>>,
    interfaces: FxHashMap<Ident, Rc<InterfaceDecl>>,
    records: FxHashMap<Ident, Rc<RecordDecl>>,
    enums: FxHashMap<Ident, Rc<EnumDecl>>,
    enum_members: FxHashMap<Ident, EnumValue>,
    subranges: FxHashMap<Ident, Rc<SubrangeDecl>>,
    operators: FxHashMap<OperatorKind, Vec<Rc<OperatorDecl>>>,
}

impl SymbolTable {
    pub fn register(&mut self, program: &Program) {
        for decl in &program.decls {
            match decl {
                Decl::Function(decl) => {
                    self.functions.insert(decl.name, Rc::clone(decl));
                }
                Decl::Class(decl) => {
                    self.classes.insert(decl.name, Rc::clone(decl));
                }
                Decl::Interface(decl) => {
                    self.interfaces.insert(decl.name, Rc::clone(decl));
                }
                Decl::Record(decl) => {
                    self.records.insert(decl.name, Rc::clone(decl));
                }
                Decl::Enum(decl) => {
                    self.enums.insert(decl.name, Rc::clone(decl));
                    for (ordinal, member) in decl.members.iter().enumerate() {
                        self.enum_members.insert(
                            *member,
                            EnumValue {
                                type_name: decl.name,
                                member: *member,
                                ordinal: ordinal as i64,
                            },
                        );
                    }
                }
                Decl::Subrange(decl) => {
                    self.subranges.insert(decl.name, Rc::clone(decl));
                }
                Decl::Operator(decl) => {
                    self.operators
                        .entry(decl.kind)
                        .or_default()
                        .push(Rc::clone(decl));
                }
            }
        }
    }

    pub fn function(&self, name: Ident) -> Option<Rc<FunctionDecl>> {
        self.functions.get(&name).cloned()
    }

    pub fn class(&self, name: Ident) -> Option<Rc<ClassDecl>> {
        self.classes.get(&name).cloned()
    }

    pub fn interface(&self, name: Ident) -> Option<Rc<InterfaceDecl>> {
        self.interfaces.get(&name).cloned()
    }

    pub fn record(&self, name: Ident) -> Option<Rc<RecordDecl>> {
        self.records.get(&name).cloned()
    }

    pub fn enum_decl(&self, name: Ident) -> Option<Rc<EnumDecl>> {
        self.enums.get(&name).cloned()
    }

    pub fn enum_member(&self, name: Ident) -> Option<EnumValue> {
        self.enum_members.get(&name).copied()
    }

    pub fn subrange(&self, name: Ident) -> Option<Rc<SubrangeDecl>> {
        self.subranges.get(&name).cloned()
    }

    pub fn global_operators(&self, kind: OperatorKind) -> &[Rc<OperatorDecl>] {
        self.operators.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The class and its ancestors, most derived first.
    pub fn class_chain(&self, name: Ident) -> Vec<Rc<ClassDecl>> {
        let mut chain = Vec::new();
        let mut current = self.class(name);
        while let Some(decl) = current {
            if chain.len() >= MAX_CHAIN_DEPTH {
                break;
            }
            current = decl.parent.and_then(|parent| self.class(parent));
            chain.push(decl);
        }
        chain
    }

    pub fn find_method(&self, class: Ident, name: Ident) -> Option<(Rc<ClassDecl>, MethodDecl)> {
        for decl in self.class_chain(class) {
            if let Some(method) = decl.methods.iter().find(|m| m.decl.name == name) {
                return Some((Rc::clone(&decl), method.clone()));
            }
        }
        None
    }

    pub fn find_property(&self, class: Ident, name: Ident) -> Option<(Rc<ClassDecl>, PropertyDecl)> {
        for decl in self.class_chain(class) {
            if let Some(property) = decl.properties.iter().find(|p| p.name == name) {
                return Some((Rc::clone(&decl), property.clone()));
            }
        }
        None
    }

    pub fn find_field(&self, class: Ident, name: Ident) -> Option<FieldDecl> {
        self.class_chain(class)
            .into_iter()
            .find_map(|decl| decl.fields.iter().find(|f| f.name == name).cloned())
    }

    /// The class in the chain that declares class variable `name`.
    pub fn find_class_var_owner(&self, class: Ident, name: Ident) -> Option<Ident> {
        self.class_chain(class)
            .into_iter()
            .find(|decl| decl.class_vars.iter().any(|v| v.name == name))
            .map(|decl| decl.name)
    }

    /// Field declarations of the full chain, root first so that a
    /// derived redeclaration wins when collected into a map.
    pub fn all_fields(&self, class: Ident) -> Vec<FieldDecl> {
        let mut chain = self.class_chain(class);
        chain.reverse();
        chain
            .into_iter()
            .flat_map(|decl| decl.fields.clone())
            .collect()
    }

    pub fn is_descendant_of(&self, class: Ident, ancestor: Ident) -> bool {
        self.class_chain(class)
            .iter()
            .any(|decl| decl.name == ancestor)
    }

    pub fn interface_descends(&self, iface: Ident, ancestor: Ident) -> bool {
        let mut current = Some(iface);
        let mut depth = 0;
        while let Some(name) = current {
            if name == ancestor {
                return true;
            }
            depth += 1;
            if depth >= MAX_CHAIN_DEPTH {
                return false;
            }
            current = self.interface(name).and_then(|decl| decl.parent);
        }
        false
    }

    pub fn implements(&self, class: Ident, iface: Ident) -> bool {
        self.class_chain(class).iter().any(|decl| {
            decl.interfaces
                .iter()
                .any(|declared| self.interface_descends(*declared, iface))
        })
    }

    pub fn find_constructor(&self, class: Ident, name: Ident) -> Option<Rc<FunctionDecl>> {
        self.class_chain(class).into_iter().find_map(|decl| {
            decl.methods
                .iter()
                .find(|m| m.kind == MethodKind::Constructor && m.decl.name == name)
                .map(|m| Rc::clone(&m.decl))
        })
    }

    /// Destructor bodies of the full chain, most derived first. The
    /// whole chain runs on destruction without an explicit
    /// `inherited` call.
    pub fn destructor_chain(&self, class: Ident) -> Vec<(Ident, Rc<FunctionDecl>)> {
        self.class_chain(class)
            .into_iter()
            .flat_map(|decl| {
                let owner = decl.name;
                decl.methods
                    .iter()
                    .filter(|m| m.kind == MethodKind::Destructor)
                    .map(move |m| (owner, Rc::clone(&m.decl)))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    pub fn class_operators(&self, class: Ident, kind: OperatorKind) -> Vec<Rc<OperatorDecl>> {
        self.class_chain(class)
            .into_iter()
            .flat_map(|decl| {
                decl.operators
                    .iter()
                    .filter(|o| o.kind == kind)
                    .map(|o| Rc::new(o.clone()))
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}
