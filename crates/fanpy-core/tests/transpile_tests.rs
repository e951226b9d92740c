//! End-to-end lowering tests over whole types.

use fanpy_ast::{
    flags, CallExpr, Case, ClosureExpr, Expr, ExprKind, FieldDef, FieldExpr, FieldRef,
    Immutability, MethodDef, MethodRef, ParamDef, Pod, ShortcutExpr, ShortcutOp, Stmt, TypeDef,
    TypeRef,
};
use fanpy_core::Transpiler;
use smallvec::smallvec;

fn int_local(name: &str) -> Expr {
    Expr::local(TypeRef::sys("Int"), name)
}

fn int_binary(op: ShortcutOp, method: &str, lhs: Expr, rhs: Expr) -> Expr {
    Expr::new(
        TypeRef::sys("Int"),
        ExprKind::Shortcut(ShortcutExpr {
            op,
            method: MethodRef::new(TypeRef::sys("Int"), method),
            target: Box::new(lhs),
            args: vec![rhs],
            is_assign: false,
            is_postfix: false,
        }),
    )
}

fn counter_type() -> TypeDef {
    let sum_body = vec![
        Stmt::LocalDef {
            name: "total".into(),
            ty: TypeRef::sys("Int"),
            init: Some(Expr::int_lit(0)),
        },
        Stmt::For {
            init: Some(Box::new(Stmt::LocalDef {
                name: "i".into(),
                ty: TypeRef::sys("Int"),
                init: Some(Expr::int_lit(0)),
            })),
            cond: Some(int_binary(
                ShortcutOp::Lt,
                "compare",
                int_local("i"),
                int_local("n"),
            )),
            update: Some(Expr::new(
                TypeRef::sys("Int"),
                ExprKind::Shortcut(ShortcutExpr {
                    op: ShortcutOp::Increment,
                    method: MethodRef::new(TypeRef::sys("Int"), "increment"),
                    target: Box::new(int_local("i")),
                    args: vec![],
                    is_assign: true,
                    is_postfix: false,
                }),
            )),
            body: vec![Stmt::Expr {
                expr: Expr::new(
                    TypeRef::sys("Int"),
                    ExprKind::Shortcut(ShortcutExpr {
                        op: ShortcutOp::Plus,
                        method: MethodRef::new(TypeRef::sys("Int"), "plus"),
                        target: Box::new(int_local("total")),
                        args: vec![int_local("i")],
                        is_assign: true,
                        is_postfix: false,
                    }),
                ),
            }],
        },
        Stmt::Return {
            expr: Some(int_local("total")),
        },
    ];

    let describe_body = vec![Stmt::Switch {
        cond: int_local("n"),
        cases: vec![
            Case {
                matches: vec![Expr::int_lit(0)],
                body: vec![Stmt::Return {
                    expr: Some(Expr::str_lit("zero")),
                }],
            },
            Case {
                matches: vec![Expr::int_lit(1), Expr::int_lit(2)],
                body: vec![Stmt::Return {
                    expr: Some(Expr::str_lit("small")),
                }],
            },
        ],
        default_block: Some(vec![Stmt::Return {
            expr: Some(Expr::str_lit("big")),
        }]),
    }];

    let each_closure = ClosureExpr {
        signature: TypeRef::func(vec![TypeRef::sys("Int")], TypeRef::void()),
        params: smallvec![ParamDef::new("x", TypeRef::sys("Int"))],
        body: vec![
            Stmt::LocalDef {
                name: "doubled".into(),
                ty: TypeRef::sys("Int"),
                init: Some(int_binary(
                    ShortcutOp::Mult,
                    "mult",
                    int_local("x"),
                    Expr::int_lit(2),
                )),
            },
            Stmt::Expr {
                expr: Expr::new(
                    TypeRef::void(),
                    ExprKind::Call(CallExpr {
                        method: MethodRef::new(TypeRef::new("demo", "Counter"), "record"),
                        target: None,
                        args: vec![int_local("doubled")],
                        safe: false,
                        dynamic: false,
                    }),
                ),
            },
        ],
        captured_fields: vec![],
        immutability: Immutability::Never,
    };
    let record_all_body = vec![Stmt::Expr {
        expr: Expr::new(
            TypeRef::void(),
            ExprKind::Call(CallExpr {
                method: MethodRef::new(TypeRef::sys("List"), "each"),
                target: Some(Box::new(Expr::local(
                    TypeRef::list_of(TypeRef::sys("Int")),
                    "values",
                ))),
                args: vec![Expr::new(
                    TypeRef::func(vec![TypeRef::sys("Int")], TypeRef::void()),
                    ExprKind::Closure(each_closure),
                )],
                safe: false,
                dynamic: false,
            }),
        ),
    }];

    TypeDef {
        qname: "demo::Counter".into(),
        pod: "demo".into(),
        name: "Counter".into(),
        base: Some(TypeRef::obj()),
        mixins: vec![],
        flags: flags::PUBLIC,
        facets: vec![],
        fields: vec![FieldDef {
            name: "last".into(),
            ty: TypeRef::sys("Int").nullable(),
            flags: flags::PUBLIC,
            init: None,
            has_explicit_setter: false,
            setter_private: false,
            facets: vec![],
        }],
        methods: vec![
            MethodDef {
                name: "sumTo".into(),
                params: smallvec![ParamDef::new("n", TypeRef::sys("Int"))],
                returns: TypeRef::sys("Int"),
                flags: flags::PUBLIC,
                is_ctor: false,
                body: Some(sum_body),
                facets: vec![],
            },
            MethodDef {
                name: "describe".into(),
                params: smallvec![ParamDef::new("n", TypeRef::sys("Int"))],
                returns: TypeRef::sys("Str"),
                flags: flags::PUBLIC,
                is_ctor: false,
                body: Some(describe_body),
                facets: vec![],
            },
            MethodDef {
                name: "record".into(),
                params: smallvec![ParamDef::new("value", TypeRef::sys("Int"))],
                returns: TypeRef::void(),
                flags: flags::PUBLIC,
                is_ctor: false,
                body: Some(vec![Stmt::Expr {
                    expr: Expr::new(
                        TypeRef::sys("Int").nullable(),
                        ExprKind::Assign {
                            lhs: Box::new(Expr::new(
                                TypeRef::sys("Int").nullable(),
                                ExprKind::Field(FieldExpr {
                                    field: FieldRef::new(TypeRef::new("demo", "Counter"), "last"),
                                    target: None,
                                    safe: false,
                                    raw: true,
                                }),
                            )),
                            rhs: Box::new(int_local("value")),
                        },
                    ),
                }]),
                facets: vec![],
            },
            MethodDef {
                name: "recordAll".into(),
                params: smallvec![ParamDef::new(
                    "values",
                    TypeRef::list_of(TypeRef::sys("Int"))
                )],
                returns: TypeRef::void(),
                flags: flags::PUBLIC,
                is_ctor: false,
                body: Some(record_all_body),
                facets: vec![],
            },
        ],
        enum_defs: vec![],
    }
}

fn demo_pod() -> Pod {
    Pod {
        name: "demo".into(),
        version: "1.0".into(),
        depends_on: vec!["sys".into()],
        types: vec![counter_type()],
    }
}

#[test]
fn lowers_a_full_type() {
    let pod = demo_pod();
    let out = Transpiler::default()
        .transpile_type(&pod, &pod.types[0])
        .unwrap();

    // skeleton
    assert!(out.contains("class Counter(Obj):"));
    assert!(out.contains("    def __init__(self):"));
    assert!(out.contains("        self._last = None"));

    // for loop lowered to while with the update before the loop end
    assert!(out.contains("        total = 0"));
    assert!(out.contains("        while (i < n):"));
    assert!(out.contains("            (total := (total + i))"));
    assert!(out.contains("            (i := i + 1)"));
    assert!(out.contains("        return total"));

    // switch cached into a fresh variable, condition appears exactly once
    assert!(out.contains("        _switch_0 = n"));
    assert!(out.contains("        if (_switch_0 == 0):"));
    assert!(out.contains("        elif (_switch_0 == 1) or (_switch_0 == 2):"));
    assert!(out.contains("        else:"));

    // implicit-this store through raw storage
    assert!(out.contains("        self._last = value"));

    // the multi-statement closure is extracted before its use
    let def_pos = out.find("def _closure_0(x=None, _self=self):").unwrap();
    let use_pos = out.find("values.each(_closure_0)").unwrap();
    assert!(def_pos < use_pos);
    assert!(out.contains("            doubled = (x * 2)"));
    assert!(out.contains("            _self.record(doubled)"));
    assert!(out.contains("\"immutable\":\"never\""));

    // reflection block registers every slot with string signatures
    assert!(out.contains("_t = sys.Type.find('demo::Counter')"));
    assert!(out.contains("_t.af_('last'"));
    assert!(out.contains("'sys::Int?'"));
    assert!(out.contains(
        "_t.am_('sumTo', 8192, 'sys::Int', [sys.Param('n', 'sys::Int', False)], {})"
    ));
}

#[test]
fn emission_is_idempotent() {
    let pod = demo_pod();
    let transpiler = Transpiler::default();
    let first = transpiler.transpile_type(&pod, &pod.types[0]).unwrap();
    let second = transpiler.transpile_type(&pod, &pod.types[0]).unwrap();
    assert_eq!(first, second);
}
