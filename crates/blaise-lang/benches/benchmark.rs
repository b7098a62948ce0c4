use std::rc::Rc;

use blaise_lang::{
    Args, AssignOp, BinaryOp, ClassDecl, Decl, Engine, Expr, FieldDecl, FunctionDecl, Ident,
    Literal, MethodDecl, MethodKind, Node, Param, Program, Range, Stmt, StmtKind, TypeSpec, Value,
};

fn main() {
    divan::main();
}

fn node(expr: Expr) -> Rc<Node> {
    Rc::new(Node::new(expr, Range::default()))
}

fn int(n: i64) -> Rc<Node> {
    node(Expr::Literal(Literal::Integer(n)))
}

fn ident(name: &str) -> Rc<Node> {
    node(Expr::Ident(Ident::new(name)))
}

fn binary(op: BinaryOp, lhs: Rc<Node>, rhs: Rc<Node>) -> Rc<Node> {
    node(Expr::Binary(op, lhs, rhs))
}

fn call(callee: Rc<Node>, args: Vec<Rc<Node>>) -> Rc<Node> {
    node(Expr::Call(callee, Args::from_vec(args)))
}

fn stmt(kind: StmtKind) -> Stmt {
    Stmt::new(kind, Range::default())
}

fn expr_stmt(expr: Rc<Node>) -> Stmt {
    stmt(StmtKind::Expr(expr))
}

fn function(name: &str, params: Vec<Param>, result: Option<TypeSpec>, body: Vec<Stmt>) -> Decl {
    Decl::Function(Rc::new(FunctionDecl {
        name: Ident::new(name),
        params: params.into_iter().collect(),
        result,
        body,
        range: Range::default(),
    }))
}

#[divan::bench(args = [18])]
fn eval_fibonacci(n: i64) -> Value {
    let fib = function(
        "Fib",
        vec![Param::value("x", TypeSpec::Integer)],
        Some(TypeSpec::Integer),
        vec![stmt(StmtKind::If(
            binary(BinaryOp::Less, ident("x"), int(2)),
            Box::new(stmt(StmtKind::Exit(Some(ident("x"))))),
            Some(Box::new(stmt(StmtKind::Exit(Some(binary(
                BinaryOp::Add,
                call(ident("Fib"), vec![binary(BinaryOp::Sub, ident("x"), int(1))]),
                call(ident("Fib"), vec![binary(BinaryOp::Sub, ident("x"), int(2))]),
            )))))),
        ))],
    );
    let program = Program {
        decls: vec![fib],
        main: vec![expr_stmt(call(ident("Fib"), vec![int(n)]))],
    };
    let mut engine = Engine::default();
    engine.set_max_call_stack_depth(256);
    engine.run(&program).unwrap()
}

#[divan::bench(args = [100_000])]
fn eval_counting_loop(n: i64) -> Value {
    let program = Program {
        decls: vec![],
        main: vec![
            stmt(StmtKind::Var(
                Ident::new("sum"),
                TypeSpec::Integer,
                None,
            )),
            stmt(StmtKind::For {
                var: Ident::new("i"),
                from: int(1),
                to: int(n),
                downto: false,
                body: Box::new(stmt(StmtKind::Assign(
                    AssignOp::AddAssign,
                    ident("sum"),
                    ident("i"),
                ))),
            }),
            expr_stmt(ident("sum")),
        ],
    };
    Engine::default().run(&program).unwrap()
}

#[divan::bench(args = [10_000])]
fn eval_method_dispatch(n: i64) -> Value {
    let counter = Decl::Class(Rc::new(ClassDecl {
        name: Ident::new("TCounter"),
        parent: None,
        interfaces: vec![],
        fields: vec![FieldDecl {
            name: Ident::new("Count"),
            ty: TypeSpec::Integer,
        }],
        class_vars: vec![],
        methods: vec![
            MethodDecl {
                kind: MethodKind::Constructor,
                decl: Rc::new(FunctionDecl {
                    name: Ident::new("Create"),
                    params: Default::default(),
                    result: None,
                    body: vec![],
                    range: Range::default(),
                }),
            },
            MethodDecl {
                kind: MethodKind::Instance,
                decl: Rc::new(FunctionDecl {
                    name: Ident::new("Bump"),
                    params: Default::default(),
                    result: None,
                    body: vec![stmt(StmtKind::Assign(
                        AssignOp::AddAssign,
                        ident("Count"),
                        int(1),
                    ))],
                    range: Range::default(),
                }),
            },
        ],
        properties: vec![],
        operators: vec![],
        range: Range::default(),
    }));
    let program = Program {
        decls: vec![counter],
        main: vec![
            stmt(StmtKind::Var(
                Ident::new("c"),
                TypeSpec::Named(Ident::new("TCounter")),
                Some(call(
                    node(Expr::Member(ident("TCounter"), Ident::new("Create"))),
                    vec![],
                )),
            )),
            stmt(StmtKind::For {
                var: Ident::new("i"),
                from: int(1),
                to: int(n),
                downto: false,
                body: Box::new(expr_stmt(call(
                    node(Expr::Member(ident("c"), Ident::new("Bump"))),
                    vec![],
                ))),
            }),
            expr_stmt(node(Expr::Member(ident("c"), Ident::new("Count")))),
        ],
    };
    Engine::default().run(&program).unwrap()
}

#[divan::bench(args = [10_000])]
fn eval_object_churn(n: i64) -> Value {
    let thing = Decl::Class(Rc::new(ClassDecl {
        name: Ident::new("TThing"),
        parent: None,
        interfaces: vec![],
        fields: vec![FieldDecl {
            name: Ident::new("Tag"),
            ty: TypeSpec::Integer,
        }],
        class_vars: vec![],
        methods: vec![MethodDecl {
            kind: MethodKind::Constructor,
            decl: Rc::new(FunctionDecl {
                name: Ident::new("Create"),
                params: Default::default(),
                result: None,
                body: vec![],
                range: Range::default(),
            }),
        }],
        properties: vec![],
        operators: vec![],
        range: Range::default(),
    }));
    let program = Program {
        decls: vec![thing],
        main: vec![
            stmt(StmtKind::Var(
                Ident::new("t"),
                TypeSpec::Named(Ident::new("TThing")),
                None,
            )),
            stmt(StmtKind::For {
                var: Ident::new("i"),
                from: int(1),
                to: int(n),
                downto: false,
                body: Box::new(stmt(StmtKind::Assign(
                    AssignOp::Assign,
                    ident("t"),
                    call(
                        node(Expr::Member(ident("TThing"), Ident::new("Create"))),
                        vec![],
                    ),
                ))),
            }),
            expr_stmt(int(0)),
        ],
    };
    Engine::default().run(&program).unwrap()
}
