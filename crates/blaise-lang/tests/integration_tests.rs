use std::rc::Rc;

use blaise_lang::{
    Args, AssignOp, BinaryOp, CaseArm, CaseLabel, ClassDecl, Decl, Engine, EnumDecl, ErrorCategory,
    ExceptBlock, Expr, FieldDecl, FunctionDecl, Ident, InterfaceDecl, Literal, MethodDecl,
    MethodKind, Node, OnHandler, OperatorDecl, OperatorKind, Param, ParamMode, Program,
    PropertyAccessor, PropertyDecl, Range, RuntimeError, Stmt, StmtKind, SubrangeDecl, TypeSpec,
    Value,
};
use rstest::rstest;

fn node(expr: Expr) -> Rc<Node> {
    Rc::new(Node::new(expr, Range::default()))
}

fn int(n: i64) -> Rc<Node> {
    node(Expr::Literal(Literal::Integer(n)))
}

fn float(f: f64) -> Rc<Node> {
    node(Expr::Literal(Literal::Float(f)))
}

fn text(s: &str) -> Rc<Node> {
    node(Expr::Literal(Literal::String(s.to_string())))
}

fn nil() -> Rc<Node> {
    node(Expr::Literal(Literal::Nil))
}

fn ident(name: &str) -> Rc<Node> {
    node(Expr::Ident(Ident::new(name)))
}

fn binary(op: BinaryOp, lhs: Rc<Node>, rhs: Rc<Node>) -> Rc<Node> {
    node(Expr::Binary(op, lhs, rhs))
}

fn index(base: Rc<Node>, subscripts: Vec<Rc<Node>>) -> Rc<Node> {
    node(Expr::Index(base, Args::from_vec(subscripts)))
}

fn member(base: Rc<Node>, name: &str) -> Rc<Node> {
    node(Expr::Member(base, Ident::new(name)))
}

fn call(callee: Rc<Node>, args: Vec<Rc<Node>>) -> Rc<Node> {
    node(Expr::Call(callee, Args::from_vec(args)))
}

fn method_call(obj: &str, method: &str, args: Vec<Rc<Node>>) -> Rc<Node> {
    call(member(ident(obj), method), args)
}

fn stmt(kind: StmtKind) -> Stmt {
    Stmt::new(kind, Range::default())
}

fn expr_stmt(node: Rc<Node>) -> Stmt {
    stmt(StmtKind::Expr(node))
}

fn var_stmt(name: &str, ty: TypeSpec, init: Option<Rc<Node>>) -> Stmt {
    stmt(StmtKind::Var(Ident::new(name), ty, init))
}

fn assign(target: Rc<Node>, value: Rc<Node>) -> Stmt {
    stmt(StmtKind::Assign(AssignOp::Assign, target, value))
}

fn add_assign(target: Rc<Node>, value: Rc<Node>) -> Stmt {
    stmt(StmtKind::Assign(AssignOp::AddAssign, target, value))
}

fn exit_with(value: Rc<Node>) -> Stmt {
    stmt(StmtKind::Exit(Some(value)))
}

fn named(name: &str) -> TypeSpec {
    TypeSpec::Named(Ident::new(name))
}

fn var_param(name: &str, ty: TypeSpec) -> Param {
    Param {
        name: Ident::new(name),
        ty,
        mode: ParamMode::Var,
    }
}

fn lazy_param(name: &str, ty: TypeSpec) -> Param {
    Param {
        name: Ident::new(name),
        ty,
        mode: ParamMode::Lazy,
    }
}

fn function_decl(
    name: &str,
    params: Vec<Param>,
    result: Option<TypeSpec>,
    body: Vec<Stmt>,
) -> Rc<FunctionDecl> {
    Rc::new(FunctionDecl {
        name: Ident::new(name),
        params: params.into_iter().collect(),
        result,
        body,
        range: Range::default(),
    })
}

fn function(name: &str, params: Vec<Param>, result: Option<TypeSpec>, body: Vec<Stmt>) -> Decl {
    Decl::Function(function_decl(name, params, result, body))
}

fn method(
    kind: MethodKind,
    name: &str,
    params: Vec<Param>,
    result: Option<TypeSpec>,
    body: Vec<Stmt>,
) -> MethodDecl {
    MethodDecl {
        kind,
        decl: function_decl(name, params, result, body),
    }
}

fn field(name: &str, ty: TypeSpec) -> FieldDecl {
    FieldDecl {
        name: Ident::new(name),
        ty,
    }
}

fn plain_class(name: &str, fields: Vec<FieldDecl>, methods: Vec<MethodDecl>) -> ClassDecl {
    ClassDecl {
        name: Ident::new(name),
        parent: None,
        interfaces: vec![],
        fields,
        class_vars: vec![],
        methods,
        properties: vec![],
        operators: vec![],
        range: Range::default(),
    }
}

fn run(decls: Vec<Decl>, main: Vec<Stmt>) -> Result<Value, Box<blaise_lang::Error>> {
    Engine::default().run(&Program { decls, main })
}

fn run_collect(
    decls: Vec<Decl>,
    main: Vec<Stmt>,
) -> (Result<Value, Box<blaise_lang::Error>>, String) {
    let mut engine = Engine::default();
    let result = engine.run(&Program { decls, main });
    (result, engine.take_output())
}

// ---- arrays and strings ----

#[test]
fn test_dynamic_array_grows_with_setlength_and_reports_bounds() {
    let arr_ty = TypeSpec::DynArray(Box::new(TypeSpec::Integer));
    let main = vec![
        var_stmt("arr", arr_ty, None),
        expr_stmt(call(ident("SetLength"), vec![ident("arr"), int(3)])),
        assign(index(ident("arr"), vec![int(0)]), int(10)),
        assign(index(ident("arr"), vec![int(2)]), int(30)),
        expr_stmt(binary(
            BinaryOp::Add,
            binary(
                BinaryOp::Add,
                call(ident("Length"), vec![ident("arr")]),
                call(ident("Low"), vec![ident("arr")]),
            ),
            binary(
                BinaryOp::Add,
                call(ident("High"), vec![ident("arr")]),
                binary(
                    BinaryOp::Add,
                    index(ident("arr"), vec![int(0)]),
                    index(ident("arr"), vec![int(2)]),
                ),
            ),
        )),
    ];
    // 3 + 0 + 2 + 10 + 30
    assert_eq!(run(vec![], main).unwrap(), Value::Integer(45));
}

#[test]
fn test_dynamic_array_out_of_bounds_after_setlength() {
    let arr_ty = TypeSpec::DynArray(Box::new(TypeSpec::Integer));
    let main = vec![
        var_stmt("arr", arr_ty, None),
        expr_stmt(call(ident("SetLength"), vec![ident("arr"), int(2)])),
        expr_stmt(index(ident("arr"), vec![int(2)])),
    ];
    let err = run(vec![], main).unwrap_err();
    assert!(matches!(
        err.cause(),
        RuntimeError::IndexOutOfBounds { index: 2, low: 0, high: 1, .. }
    ));
}

#[test]
fn test_indexed_read_of_nested_array_keeps_the_reference() {
    let matrix_ty = TypeSpec::StaticArray {
        low: 1,
        high: 2,
        elem: Box::new(TypeSpec::StaticArray {
            low: 1,
            high: 2,
            elem: Box::new(TypeSpec::Integer),
        }),
    };
    let row_ty = TypeSpec::StaticArray {
        low: 1,
        high: 2,
        elem: Box::new(TypeSpec::Integer),
    };
    let main = vec![
        var_stmt("matrix", matrix_ty, None),
        var_stmt("row", row_ty, None),
        // `row := matrix[1]` aliases, so the write lands in the matrix.
        assign(ident("row"), index(ident("matrix"), vec![int(1)])),
        assign(index(ident("row"), vec![int(2)]), int(9)),
        expr_stmt(index(ident("matrix"), vec![int(1), int(2)])),
    ];
    assert_eq!(run(vec![], main).unwrap(), Value::Integer(9));
}

#[test]
fn test_string_indexing_is_one_based_and_rune_wise() {
    let main = vec![
        var_stmt("s", TypeSpec::String, Some(text("héllo"))),
        assign(index(ident("s"), vec![int(1)]), text("H")),
        expr_stmt(binary(
            BinaryOp::Add,
            index(ident("s"), vec![int(1)]),
            index(ident("s"), vec![int(2)]),
        )),
    ];
    assert_eq!(run(vec![], main).unwrap(), Value::String("Hé".into()));
}

#[test]
fn test_string_element_store_requires_single_character() {
    let main = vec![
        var_stmt("s", TypeSpec::String, Some(text("abc"))),
        assign(index(ident("s"), vec![int(1)]), text("xy")),
    ];
    let err = run(vec![], main).unwrap_err();
    assert!(matches!(err.cause(), RuntimeError::InvalidStringStore { .. }));
}

// ---- records ----

fn vec_record() -> Decl {
    Decl::Record(Rc::new(blaise_lang::RecordDecl {
        name: Ident::new("TVec"),
        fields: vec![field("X", TypeSpec::Integer), field("Y", TypeSpec::Integer)],
        range: Range::default(),
    }))
}

#[test]
fn test_record_assignment_copies_deeply() {
    let main = vec![
        var_stmt("a", named("TVec"), None),
        var_stmt("b", named("TVec"), None),
        assign(member(ident("a"), "X"), int(1)),
        assign(ident("b"), ident("a")),
        assign(member(ident("b"), "X"), int(5)),
        expr_stmt(binary(
            BinaryOp::Add,
            member(ident("a"), "X"),
            member(ident("b"), "X"),
        )),
    ];
    // a.X stays 1, b.X becomes 5.
    assert_eq!(run(vec![vec_record()], main).unwrap(), Value::Integer(6));
}

#[test]
fn test_record_array_element_initializes_on_first_field_store() {
    let arr_ty = TypeSpec::DynArray(Box::new(named("TVec")));
    let main = vec![
        var_stmt("items", arr_ty, None),
        expr_stmt(call(ident("SetLength"), vec![ident("items"), int(2)])),
        assign(member(index(ident("items"), vec![int(1)]), "Y"), int(7)),
        expr_stmt(member(index(ident("items"), vec![int(1)]), "Y")),
    ];
    assert_eq!(run(vec![vec_record()], main).unwrap(), Value::Integer(7));
}

// ---- functions, parameters, recursion ----

#[test]
fn test_recursive_function_through_if() {
    let fib = function(
        "Fib",
        vec![Param::value("n", TypeSpec::Integer)],
        Some(TypeSpec::Integer),
        vec![stmt(StmtKind::If(
            binary(BinaryOp::Less, ident("n"), int(2)),
            Box::new(exit_with(ident("n"))),
            Some(Box::new(exit_with(binary(
                BinaryOp::Add,
                call(ident("Fib"), vec![binary(BinaryOp::Sub, ident("n"), int(1))]),
                call(ident("Fib"), vec![binary(BinaryOp::Sub, ident("n"), int(2))]),
            )))),
        ))],
    );
    let main = vec![expr_stmt(call(ident("Fib"), vec![int(10)]))];
    assert_eq!(run(vec![fib], main).unwrap(), Value::Integer(55));
}

#[test]
fn test_var_parameters_swap_caller_slots() {
    let swap = function(
        "Swap",
        vec![
            var_param("a", TypeSpec::Integer),
            var_param("b", TypeSpec::Integer),
        ],
        None,
        vec![
            var_stmt("t", TypeSpec::Integer, Some(ident("a"))),
            assign(ident("a"), ident("b")),
            assign(ident("b"), ident("t")),
        ],
    );
    let main = vec![
        var_stmt("x", TypeSpec::Integer, Some(int(1))),
        var_stmt("y", TypeSpec::Integer, Some(int(2))),
        expr_stmt(call(ident("Swap"), vec![ident("x"), ident("y")])),
        expr_stmt(binary(
            BinaryOp::Sub,
            binary(BinaryOp::Mul, ident("x"), int(10)),
            ident("y"),
        )),
    ];
    // x = 2, y = 1 after the swap.
    assert_eq!(run(vec![swap], main).unwrap(), Value::Integer(19));
}

#[test]
fn test_lazy_argument_reevaluates_per_read() {
    // Next bumps a global on every call; Twice reads its lazy
    // parameter twice, so the argument expression runs twice.
    let next = function(
        "Next",
        vec![],
        Some(TypeSpec::Integer),
        vec![
            add_assign(ident("counter"), int(1)),
            exit_with(ident("counter")),
        ],
    );
    let twice = function(
        "Twice",
        vec![lazy_param("x", TypeSpec::Integer)],
        Some(TypeSpec::Integer),
        vec![exit_with(binary(BinaryOp::Add, ident("x"), ident("x")))],
    );
    let main = vec![
        var_stmt("counter", TypeSpec::Integer, None),
        var_stmt(
            "sum",
            TypeSpec::Integer,
            Some(call(ident("Twice"), vec![call(ident("Next"), vec![])])),
        ),
        expr_stmt(binary(
            BinaryOp::Add,
            binary(BinaryOp::Mul, ident("sum"), int(10)),
            ident("counter"),
        )),
    ];
    // sum = 1 + 2 = 3, counter = 2.
    assert_eq!(run(vec![next, twice], main).unwrap(), Value::Integer(32));
}

#[test]
fn test_exit_unwinds_out_of_nested_loops() {
    let find = function(
        "FirstOver",
        vec![Param::value("limit", TypeSpec::Integer)],
        Some(TypeSpec::Integer),
        vec![stmt(StmtKind::For {
            var: Ident::new("i"),
            from: int(1),
            to: int(100),
            downto: false,
            body: Box::new(stmt(StmtKind::If(
                binary(
                    BinaryOp::Greater,
                    binary(BinaryOp::Mul, ident("i"), ident("i")),
                    ident("limit"),
                ),
                Box::new(exit_with(ident("i"))),
                None,
            ))),
        })],
    );
    let main = vec![expr_stmt(call(ident("FirstOver"), vec![int(50)]))];
    assert_eq!(run(vec![find], main).unwrap(), Value::Integer(8));
}

// ---- object lifetime ----

fn thing_class() -> Decl {
    Decl::Class(Rc::new(plain_class(
        "TThing",
        vec![field("Tag", TypeSpec::Integer)],
        vec![
            method(
                MethodKind::Constructor,
                "Create",
                vec![Param::value("tag", TypeSpec::Integer)],
                None,
                vec![assign(ident("Tag"), ident("tag"))],
            ),
            method(
                MethodKind::Destructor,
                "Destroy",
                vec![],
                None,
                vec![expr_stmt(call(ident("PrintLn"), vec![text("destroyed")]))],
            ),
        ],
    )))
}

#[test]
fn test_object_returned_through_function_keeps_a_single_count() {
    // Pass takes the object by value and returns it; the count must
    // come back unchanged and the destructor must fire exactly once.
    let pass = function(
        "Pass",
        vec![Param::value("p", named("TThing"))],
        Some(named("TThing")),
        vec![exit_with(ident("p"))],
    );
    let main = vec![
        var_stmt(
            "a",
            named("TThing"),
            Some(method_call("TThing", "Create", vec![int(1)])),
        ),
        assign(ident("a"), call(ident("Pass"), vec![ident("a")])),
        expr_stmt(member(ident("a"), "Tag")),
        assign(ident("a"), nil()),
    ];
    let (result, output) = run_collect(vec![thing_class(), pass], main);
    assert_eq!(result.unwrap(), Value::Integer(1));
    assert_eq!(output, "destroyed\n");
}

#[test]
fn test_aliased_object_survives_dropping_one_binding() {
    let main = vec![
        var_stmt(
            "a",
            named("TThing"),
            Some(method_call("TThing", "Create", vec![int(5)])),
        ),
        var_stmt("b", named("TThing"), Some(ident("a"))),
        assign(ident("a"), nil()),
        expr_stmt(member(ident("b"), "Tag")),
    ];
    let (result, output) = run_collect(vec![thing_class()], main);
    assert_eq!(result.unwrap(), Value::Integer(5));
    // The remaining binding is released at program end.
    assert_eq!(output, "destroyed\n");
}

#[test]
fn test_free_then_any_use_is_already_destroyed() {
    let main = vec![
        var_stmt(
            "p",
            named("TThing"),
            Some(method_call("TThing", "Create", vec![int(1)])),
        ),
        expr_stmt(method_call("p", "Free", vec![])),
        expr_stmt(member(ident("p"), "Tag")),
    ];
    let (result, output) = run_collect(vec![thing_class()], main);
    let err = result.unwrap_err();
    assert!(matches!(err.cause(), RuntimeError::AlreadyDestroyed { .. }));
    assert_eq!(output, "destroyed\n");
}

// ---- classes, inheritance, statics ----

#[test]
fn test_inherited_call_composes_with_override() {
    let base = Decl::Class(Rc::new(plain_class(
        "TBase",
        vec![],
        vec![method(
            MethodKind::Instance,
            "Describe",
            vec![],
            Some(TypeSpec::String),
            vec![exit_with(text("base"))],
        )],
    )));
    let child = Decl::Class(Rc::new(ClassDecl {
        parent: Some(Ident::new("TBase")),
        ..plain_class(
            "TChild",
            vec![],
            vec![
                method(MethodKind::Constructor, "Create", vec![], None, vec![]),
                method(
                    MethodKind::Instance,
                    "Describe",
                    vec![],
                    Some(TypeSpec::String),
                    vec![exit_with(binary(
                        BinaryOp::Add,
                        node(Expr::Inherited(Ident::new("Describe"), Args::new())),
                        text("+child"),
                    ))],
                ),
            ],
        )
    }));
    let main = vec![
        var_stmt(
            "c",
            named("TChild"),
            Some(method_call("TChild", "Create", vec![])),
        ),
        expr_stmt(method_call("c", "Describe", vec![])),
    ];
    assert_eq!(
        run(vec![base, child], main).unwrap(),
        Value::String("base+child".into())
    );
}

#[test]
fn test_class_variable_is_shared_across_instances() {
    let counted = Decl::Class(Rc::new(ClassDecl {
        class_vars: vec![field("Total", TypeSpec::Integer)],
        ..plain_class(
            "TCounted",
            vec![],
            vec![method(
                MethodKind::Constructor,
                "Create",
                vec![],
                None,
                vec![add_assign(ident("Total"), int(1))],
            )],
        )
    }));
    let main = vec![
        var_stmt(
            "a",
            named("TCounted"),
            Some(method_call("TCounted", "Create", vec![])),
        ),
        var_stmt(
            "b",
            named("TCounted"),
            Some(method_call("TCounted", "Create", vec![])),
        ),
        expr_stmt(member(ident("TCounted"), "Total")),
    ];
    assert_eq!(run(vec![counted], main).unwrap(), Value::Integer(2));
}

#[test]
fn test_class_method_dispatches_without_an_instance() {
    let almanac = Decl::Class(Rc::new(plain_class(
        "TAlmanac",
        vec![],
        vec![method(
            MethodKind::Class,
            "DaysInWeek",
            vec![],
            Some(TypeSpec::Integer),
            vec![exit_with(int(7))],
        )],
    )));
    let main = vec![expr_stmt(method_call("TAlmanac", "DaysInWeek", vec![]))];
    assert_eq!(run(vec![almanac], main).unwrap(), Value::Integer(7));
}

// ---- properties ----

fn gauge_class() -> Decl {
    // FLevel is capped at 100 by the setter; Level reads the field
    // directly and writes through SetLevel.
    Decl::Class(Rc::new(ClassDecl {
        properties: vec![PropertyDecl {
            name: Ident::new("Level"),
            params: blaise_lang::Params::new(),
            read: Some(PropertyAccessor::Field(Ident::new("FLevel"))),
            write: Some(PropertyAccessor::Method(Ident::new("SetLevel"))),
            is_class: false,
        }],
        ..plain_class(
            "TGauge",
            vec![field("FLevel", TypeSpec::Integer)],
            vec![
                method(MethodKind::Constructor, "Create", vec![], None, vec![]),
                method(
                    MethodKind::Instance,
                    "SetLevel",
                    vec![Param::value("value", TypeSpec::Integer)],
                    None,
                    vec![assign(
                        ident("FLevel"),
                        call(ident("Min"), vec![ident("value"), int(100)]),
                    )],
                ),
            ],
        )
    }))
}

#[test]
fn test_property_reads_field_and_writes_through_setter() {
    let main = vec![
        var_stmt(
            "g",
            named("TGauge"),
            Some(method_call("TGauge", "Create", vec![])),
        ),
        assign(member(ident("g"), "Level"), int(250)),
        expr_stmt(member(ident("g"), "Level")),
    ];
    assert_eq!(run(vec![gauge_class()], main).unwrap(), Value::Integer(100));
}

#[test]
fn test_indexed_property_routes_through_accessor_methods() {
    let bits = Decl::Class(Rc::new(ClassDecl {
        properties: vec![PropertyDecl {
            name: Ident::new("Bit"),
            params: [Param::value("i", TypeSpec::Integer)].into_iter().collect(),
            read: Some(PropertyAccessor::Method(Ident::new("GetBit"))),
            write: Some(PropertyAccessor::Method(Ident::new("SetBit"))),
            is_class: false,
        }],
        ..plain_class(
            "TBits",
            vec![field("FWord", TypeSpec::Integer)],
            vec![
                method(MethodKind::Constructor, "Create", vec![], None, vec![]),
                method(
                    MethodKind::Instance,
                    "GetBit",
                    vec![Param::value("i", TypeSpec::Integer)],
                    Some(TypeSpec::Boolean),
                    vec![exit_with(binary(
                        BinaryOp::Eq,
                        binary(
                            BinaryOp::And,
                            binary(BinaryOp::Shr, ident("FWord"), ident("i")),
                            int(1),
                        ),
                        int(1),
                    ))],
                ),
                method(
                    MethodKind::Instance,
                    "SetBit",
                    vec![
                        Param::value("i", TypeSpec::Integer),
                        Param::value("value", TypeSpec::Boolean),
                    ],
                    None,
                    vec![stmt(StmtKind::If(
                        ident("value"),
                        Box::new(assign(
                            ident("FWord"),
                            binary(
                                BinaryOp::Or,
                                ident("FWord"),
                                binary(BinaryOp::Shl, int(1), ident("i")),
                            ),
                        )),
                        None,
                    ))],
                ),
            ],
        )
    }));
    let main = vec![
        var_stmt(
            "b",
            named("TBits"),
            Some(method_call("TBits", "Create", vec![])),
        ),
        assign(
            index(member(ident("b"), "Bit"), vec![int(3)]),
            node(Expr::Literal(Literal::Boolean(true))),
        ),
        expr_stmt(index(member(ident("b"), "Bit"), vec![int(3)])),
    ];
    assert_eq!(run(vec![bits], main).unwrap(), Value::Boolean(true));
}

// ---- interfaces ----

#[test]
fn test_interface_slot_wraps_object_and_dispatches_methods() {
    let greeter = Decl::Interface(Rc::new(InterfaceDecl {
        name: Ident::new("IGreeter"),
        parent: None,
        range: Range::default(),
    }));
    let english = Decl::Class(Rc::new(ClassDecl {
        interfaces: vec![Ident::new("IGreeter")],
        ..plain_class(
            "TEnglish",
            vec![],
            vec![
                method(MethodKind::Constructor, "Create", vec![], None, vec![]),
                method(
                    MethodKind::Instance,
                    "Greet",
                    vec![],
                    Some(TypeSpec::String),
                    vec![exit_with(text("hello"))],
                ),
            ],
        )
    }));
    let main = vec![
        var_stmt("g", named("IGreeter"), None),
        expr_stmt(call(ident("Assigned"), vec![ident("g")])),
        assign(ident("g"), method_call("TEnglish", "Create", vec![])),
        expr_stmt(method_call("g", "Greet", vec![])),
    ];
    assert_eq!(
        run(vec![greeter, english], main).unwrap(),
        Value::String("hello".into())
    );
}

#[test]
fn test_cast_recovers_the_class_from_an_interface() {
    let greeter = Decl::Interface(Rc::new(InterfaceDecl {
        name: Ident::new("IGreeter"),
        parent: None,
        range: Range::default(),
    }));
    let english = Decl::Class(Rc::new(ClassDecl {
        interfaces: vec![Ident::new("IGreeter")],
        ..plain_class(
            "TEnglish",
            vec![field("Count", TypeSpec::Integer)],
            vec![method(MethodKind::Constructor, "Create", vec![], None, vec![])],
        )
    }));
    let main = vec![
        var_stmt("g", named("IGreeter"), None),
        assign(ident("g"), method_call("TEnglish", "Create", vec![])),
        expr_stmt(member(
            node(Expr::Cast(Ident::new("TEnglish"), ident("g"))),
            "Count",
        )),
    ];
    assert_eq!(run(vec![greeter, english], main).unwrap(), Value::Integer(0));
}

// ---- operator overloads ----

#[test]
fn test_class_operator_builds_a_new_instance() {
    let vec_class = Decl::Class(Rc::new(ClassDecl {
        operators: vec![OperatorDecl {
            kind: OperatorKind::Binary(BinaryOp::Add),
            decl: function_decl(
                "AddVec",
                vec![
                    Param::value("a", named("TVector")),
                    Param::value("b", named("TVector")),
                ],
                Some(named("TVector")),
                vec![exit_with(call(
                    member(ident("TVector"), "Create"),
                    vec![binary(
                        BinaryOp::Add,
                        member(ident("a"), "X"),
                        member(ident("b"), "X"),
                    )],
                ))],
            ),
        }],
        ..plain_class(
            "TVector",
            vec![field("X", TypeSpec::Integer)],
            vec![method(
                MethodKind::Constructor,
                "Create",
                vec![Param::value("x", TypeSpec::Integer)],
                None,
                vec![assign(ident("X"), ident("x"))],
            )],
        )
    }));
    let main = vec![
        var_stmt(
            "p",
            named("TVector"),
            Some(method_call("TVector", "Create", vec![int(10)])),
        ),
        var_stmt(
            "q",
            named("TVector"),
            Some(method_call("TVector", "Create", vec![int(32)])),
        ),
        var_stmt(
            "r",
            named("TVector"),
            Some(binary(BinaryOp::Add, ident("p"), ident("q"))),
        ),
        expr_stmt(member(ident("r"), "X")),
    ];
    assert_eq!(run(vec![vec_class], main).unwrap(), Value::Integer(42));
}

// ---- exceptions ----

fn exception_classes() -> Vec<Decl> {
    let base = Decl::Class(Rc::new(plain_class(
        "EBase",
        vec![field("Message", TypeSpec::String)],
        vec![method(
            MethodKind::Constructor,
            "Create",
            vec![Param::value("m", TypeSpec::String)],
            None,
            vec![assign(ident("Message"), ident("m"))],
        )],
    )));
    let derived = Decl::Class(Rc::new(ClassDecl {
        parent: Some(Ident::new("EBase")),
        ..plain_class("EDerived", vec![], vec![])
    }));
    vec![base, derived]
}

#[test]
fn test_handler_for_ancestor_class_catches_derived_exception() {
    let main = vec![stmt(StmtKind::Try {
        body: vec![stmt(StmtKind::Raise(Some(method_call(
            "EDerived",
            "Create",
            vec![text("deep")],
        ))))],
        except: Some(ExceptBlock {
            handlers: vec![OnHandler {
                binding: Some(Ident::new("E")),
                class_name: Ident::new("EBase"),
                body: vec![expr_stmt(call(
                    ident("PrintLn"),
                    vec![member(ident("E"), "Message")],
                ))],
            }],
            fallback: None,
        }),
        finally: None,
    })];
    let (result, output) = run_collect(exception_classes(), main);
    assert!(result.is_ok());
    assert_eq!(output, "deep\n");
}

#[test]
fn test_unmatched_handler_falls_back_to_else_branch() {
    let unrelated = Decl::Class(Rc::new(plain_class(
        "EOther",
        vec![field("Message", TypeSpec::String)],
        vec![method(
            MethodKind::Constructor,
            "Create",
            vec![],
            None,
            vec![],
        )],
    )));
    let mut decls = exception_classes();
    decls.push(unrelated);
    let main = vec![stmt(StmtKind::Try {
        body: vec![stmt(StmtKind::Raise(Some(method_call(
            "EOther",
            "Create",
            vec![],
        ))))],
        except: Some(ExceptBlock {
            handlers: vec![OnHandler {
                binding: None,
                class_name: Ident::new("EBase"),
                body: vec![expr_stmt(call(ident("PrintLn"), vec![text("wrong")]))],
            }],
            fallback: Some(vec![expr_stmt(call(ident("PrintLn"), vec![text("else")]))]),
        }),
        finally: None,
    })];
    let (result, output) = run_collect(decls, main);
    assert!(result.is_ok());
    assert_eq!(output, "else\n");
}

#[test]
fn test_bare_raise_inside_handler_rethrows_the_original() {
    let main = vec![stmt(StmtKind::Try {
        body: vec![stmt(StmtKind::Raise(Some(method_call(
            "EBase",
            "Create",
            vec![text("again")],
        ))))],
        except: Some(ExceptBlock {
            handlers: vec![OnHandler {
                binding: None,
                class_name: Ident::new("EBase"),
                body: vec![stmt(StmtKind::Raise(None))],
            }],
            fallback: None,
        }),
        finally: None,
    })];
    let err = run(exception_classes(), main).unwrap_err();
    match err.cause() {
        RuntimeError::Raised { message, .. } => assert_eq!(message.as_str(), "again"),
        other => panic!("expected Raised, got {other:?}"),
    }
}

#[test]
fn test_finally_runs_even_when_handler_body_raises() {
    let main = vec![stmt(StmtKind::Try {
        body: vec![stmt(StmtKind::Raise(Some(method_call(
            "EBase",
            "Create",
            vec![text("first")],
        ))))],
        except: Some(ExceptBlock {
            handlers: vec![OnHandler {
                binding: None,
                class_name: Ident::new("EBase"),
                body: vec![stmt(StmtKind::Raise(Some(method_call(
                    "EBase",
                    "Create",
                    vec![text("second")],
                ))))],
            }],
            fallback: None,
        }),
        finally: Some(vec![expr_stmt(call(ident("PrintLn"), vec![text("fin")]))]),
    })];
    let (result, output) = run_collect(exception_classes(), main);
    match result.unwrap_err().cause() {
        RuntimeError::Raised { message, .. } => assert_eq!(message.as_str(), "second"),
        other => panic!("expected Raised, got {other:?}"),
    }
    assert_eq!(output, "fin\n");
}

#[test]
fn test_assertion_failure_is_a_contract_violation() {
    let main = vec![expr_stmt(call(
        ident("Assert"),
        vec![node(Expr::Literal(Literal::Boolean(false))), text("broken")],
    ))];
    let err = run(vec![], main).unwrap_err();
    assert!(matches!(err.cause(), RuntimeError::AssertionFailed { .. }));
    assert_eq!(err.category(), ErrorCategory::Contract);
}

// ---- enums, subranges, sets ----

fn color_enum() -> Decl {
    Decl::Enum(Rc::new(EnumDecl {
        name: Ident::new("TColor"),
        members: vec![Ident::new("Red"), Ident::new("Green"), Ident::new("Blue")],
        range: Range::default(),
    }))
}

#[test]
fn test_enum_ordinals_and_case_dispatch() {
    let main = vec![
        var_stmt("c", named("TColor"), None),
        var_stmt("seen", TypeSpec::String, None),
        assign(ident("c"), ident("Green")),
        stmt(StmtKind::Case(
            ident("c"),
            vec![
                CaseArm {
                    labels: vec![CaseLabel::Value(ident("Red"))],
                    body: vec![assign(ident("seen"), text("warm"))],
                },
                CaseArm {
                    labels: vec![CaseLabel::Value(ident("Green")), CaseLabel::Value(ident("Blue"))],
                    body: vec![assign(ident("seen"), text("cool"))],
                },
            ],
            None,
        )),
        expr_stmt(binary(
            BinaryOp::Add,
            call(ident("IntToStr"), vec![call(ident("Ord"), vec![ident("c")])]),
            ident("seen"),
        )),
    ];
    assert_eq!(
        run(vec![color_enum()], main).unwrap(),
        Value::String("1cool".into())
    );
}

#[test]
fn test_subrange_store_validates_bounds() {
    let digit = Decl::Subrange(Rc::new(SubrangeDecl {
        name: Ident::new("TDigit"),
        low: 0,
        high: 9,
        range: Range::default(),
    }));
    let ok_main = vec![
        var_stmt("d", named("TDigit"), None),
        assign(ident("d"), int(5)),
        expr_stmt(binary(BinaryOp::Add, ident("d"), int(1))),
    ];
    assert_eq!(run(vec![digit.clone()], ok_main).unwrap(), Value::Integer(6));

    let bad_main = vec![
        var_stmt("d", named("TDigit"), None),
        assign(ident("d"), int(12)),
    ];
    let err = run(vec![digit], bad_main).unwrap_err();
    assert!(matches!(
        err.cause(),
        RuntimeError::OutOfRange { low: 0, high: 9, .. }
    ));
}

#[test]
fn test_enum_membership_in_set_literal() {
    let in_set = binary(
        BinaryOp::In,
        ident("Green"),
        node(Expr::SetLit(vec![
            blaise_lang::SetElem::Single(ident("Red")),
            blaise_lang::SetElem::Single(ident("Green")),
        ])),
    );
    let main = vec![expr_stmt(in_set)];
    assert_eq!(run(vec![color_enum()], main).unwrap(), Value::Boolean(true));
}

// ---- variants ----

#[test]
fn test_variant_lifecycle_through_the_three_states() {
    let main = vec![
        var_stmt("v", TypeSpec::Variant, None),
        var_stmt("empty", TypeSpec::Boolean, Some(call(ident("VarIsEmpty"), vec![ident("v")]))),
        assign(ident("v"), call(ident("Null"), vec![])),
        var_stmt("null", TypeSpec::Boolean, Some(call(ident("VarIsNull"), vec![ident("v")]))),
        assign(ident("v"), int(5)),
        expr_stmt(binary(
            BinaryOp::And,
            binary(BinaryOp::And, ident("empty"), ident("null")),
            binary(
                BinaryOp::Eq,
                binary(BinaryOp::Add, ident("v"), int(1)),
                int(6),
            ),
        )),
    ];
    assert_eq!(run(vec![], main).unwrap(), Value::Boolean(true));
}

#[test]
fn test_uninitialized_variant_equals_falsey_but_null_does_not() {
    let main = vec![
        var_stmt("u", TypeSpec::Variant, None),
        var_stmt("n", TypeSpec::Variant, Some(call(ident("Null"), vec![]))),
        expr_stmt(binary(
            BinaryOp::And,
            binary(BinaryOp::Eq, ident("u"), int(0)),
            binary(
                BinaryOp::NotEq,
                ident("n"),
                node(Expr::Literal(Literal::Integer(0))),
            ),
        )),
    ];
    assert_eq!(run(vec![], main).unwrap(), Value::Boolean(true));
}

#[test]
fn test_arithmetic_on_nullish_variant_is_reported() {
    let main = vec![
        var_stmt("v", TypeSpec::Variant, None),
        expr_stmt(binary(BinaryOp::Add, ident("v"), int(1))),
    ];
    let err = run(vec![], main).unwrap_err();
    assert!(matches!(err.cause(), RuntimeError::NullishOperand { .. }));
}

// ---- numeric slot discipline ----

#[rstest]
#[case::int_plus_float_rejected(TypeSpec::Integer, int(1), float(0.5), true)]
#[case::float_plus_int_widens(TypeSpec::Float, float(1.5), int(1), false)]
fn test_compound_assignment_slot_rules(
    #[case] ty: TypeSpec,
    #[case] init: Rc<Node>,
    #[case] rhs: Rc<Node>,
    #[case] expect_error: bool,
) {
    let main = vec![
        var_stmt("x", ty, Some(init)),
        add_assign(ident("x"), rhs),
        expr_stmt(ident("x")),
    ];
    let result = run(vec![], main);
    if expect_error {
        assert!(matches!(
            result.unwrap_err().cause(),
            RuntimeError::InvalidConversion { .. }
        ));
    } else {
        assert_eq!(result.unwrap(), Value::Float(2.5));
    }
}

#[test]
fn test_division_always_produces_float() {
    let main = vec![expr_stmt(binary(BinaryOp::Div, int(6), int(3)))];
    assert_eq!(run(vec![], main).unwrap(), Value::Float(2.0));
}
