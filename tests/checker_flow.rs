//! Checker behavior over whole programs: conditionals, returns,
//! declarations and the documented error codes.

mod common;

use common::check_program;
use flint::diagnostics::ErrorCode;
use flint::parser::ast::DeclKind;

#[test]
fn if_stmt_with_block() {
    let checked = check_program(
        r#"
    fun main(): i32 {
        var x: i32;
        if true {
            x = 1;
        }
        return x;
    }
"#,
    );
    assert_eq!(checked.errors, vec![]);
}

#[test]
fn if_stmt_single_statement_branch() {
    let checked = check_program(
        r#"
    fun main(): i32 {
        var x: i32;
        if true
            x = 1
        return x;
    }
"#,
    );
    assert_eq!(checked.errors, vec![]);
}

#[test]
fn if_else_single_statement_branches() {
    let checked = check_program(
        r#"
    fun main(): i32 {
        var x: i32;
        if true
            x = 1
        else
            x = 2
        return x;
    }
"#,
    );
    assert_eq!(checked.errors, vec![]);
}

#[test]
fn if_else_where_both_branches_return() {
    let checked = check_program(
        r#"
    fun main(): i32 {
        var x: i32;
        if true
            return 0
        else
            return 1
    }
"#,
    );
    assert_eq!(checked.errors, vec![]);
}

#[test]
fn incompatible_assignment_in_else_branch() {
    let checked = check_program(
        r#"
    fun main(): i32 {
        var x: i32;
        if true
            x = 1
        else
            x = true
    }
"#,
    );
    assert_eq!(checked.errors, vec![ErrorCode::IncompatibleTypes]);
}

#[test]
fn inconsistent_return_types_in_branches() {
    let checked = check_program(
        r#"
    fun main(): i32 {
        var x: i32;
        if true
            return x
        else
            return true
    }
"#,
    );
    assert_eq!(checked.errors, vec![ErrorCode::InconsistentReturnTypes]);
}

#[test]
fn non_bool_condition() {
    let checked = check_program(
        r#"
    fun main(): i32 {
        var x: i32;
        if x
            x = 0
        else
            x = 1
    }
"#,
    );
    assert_eq!(checked.errors, vec![ErrorCode::ConditionalWithoutBool]);
}

#[test]
fn else_if_chains() {
    let checked = check_program(
        r#"
    fun main(): i32 {
        var x: i32;
        if true
            x = 1
        else if false
            x = 2
        else
            x = 3

        return 0
    }
"#,
    );
    assert_eq!(checked.errors, vec![]);
}

// Single-line conditionals, as the statement grammar allows.
#[test]
fn one_line_if_else() {
    let checked = check_program(
        "fun main(): i32 {\n  var x: i32\n  if true x = 1 else x = 2\n  return x\n}\n",
    );
    assert_eq!(checked.errors, vec![]);
}

#[test]
fn invalid_main_signature() {
    let checked = check_program("fun main() { return; }\n");
    assert_eq!(checked.errors.first(), Some(&ErrorCode::InvalidMainSignature));
}

#[test]
fn main_with_argc_argv() {
    let checked = check_program(
        "fun main(var argc: i32, var argv: char**): i32 { return 0 }\n",
    );
    assert_eq!(checked.errors, vec![]);
}

#[test]
fn extern_main_is_rejected() {
    let checked = check_program("extern fun main(): i32\n");
    assert_eq!(checked.errors.first(), Some(&ErrorCode::InvalidMainSignature));
}

#[test]
fn duplicate_global_symbol() {
    let checked = check_program("var x: i32\nvar x: i32\n");
    assert_eq!(checked.errors.first(), Some(&ErrorCode::SymbolAlreadyDeclared));
}

#[test]
fn global_expression_statement_rejected() {
    let checked = check_program("1 + 2\n");
    assert_eq!(checked.errors, vec![ErrorCode::GlobalExpression]);
}

#[test]
fn struct_literal_and_member_access() {
    let checked = check_program(
        r#"
    struct Point { var x: i32; var y: i32 }
    fun main(): i32 { var a: Point = :Point { x: 1, y: 2 }; var b: i32 = a.x; return 0 }
"#,
    );
    assert_eq!(checked.errors, vec![]);

    // The initializer of `b` is typed ::i32.
    let b = checked.ast.find_decl("b").expect("no declaration 'b'");
    let DeclKind::Var {
        initializer: Some(init),
        ..
    } = checked.ast.decl(b).kind.clone()
    else {
        panic!("expected an initialized variable");
    };
    let ty = checked.ast.expr(init).ty.as_ref().expect("untyped initializer");
    assert_eq!(ty.to_string(), "::i32");
}

#[test]
fn pointers_and_dereference_assignment() {
    let checked = check_program(
        "fun main(): i32 { var a = 1; var b = &a; *b = 2; return 0 }\n",
    );
    assert_eq!(checked.errors, vec![]);

    let b = checked.ast.find_decl("b").expect("no declaration 'b'");
    assert_eq!(checked.env.decl_type(b).unwrap().to_string(), "::i32*");
}

#[test]
fn extern_printf_call() {
    let checked = check_program(
        "extern fun printf(char*): i32\nfun main(): i32 { printf(\"Hello\\n\"); return 0 }\n",
    );
    assert_eq!(checked.errors, vec![]);
}

#[test]
fn variadic_extern_allows_extra_arguments() {
    let checked = check_program(
        "extern fun printf(char*, ...): i32\nfun main(): i32 { printf(\"%d %d\\n\", 1, 2); return 0 }\n",
    );
    assert_eq!(checked.errors, vec![]);
}

#[test]
fn arity_mismatch() {
    let checked = check_program(
        "fun add(const a: i32, const b: i32): i32 { return a + b }\nfun main(): i32 { return add(1) }\n",
    );
    assert_eq!(checked.errors, vec![ErrorCode::InvalidArity]);
}

#[test]
fn call_on_non_function() {
    let checked = check_program("fun main(): i32 { var x = 1; x(); return 0 }\n");
    assert_eq!(checked.errors, vec![ErrorCode::CallOnNonFun]);
}

#[test]
fn assignment_to_const() {
    let checked = check_program("fun main(): i32 { const x = 1; x = 2; return 0 }\n");
    assert_eq!(checked.errors, vec![ErrorCode::AssignToConst]);
}

#[test]
fn assignment_to_non_lvalue() {
    let checked = check_program("fun main(): i32 { 5 = 10; return 0 }\n");
    assert_eq!(checked.errors, vec![ErrorCode::AssignToNonLvalue]);
}

#[test]
fn const_member_behind_var_binding() {
    let checked = check_program(
        r#"
    struct Point { var x: i32; const tag: i32 = 7 }
    fun main(): i32 {
        var p: Point = :Point { x: 1 }
        p.tag = 3
        return 0
    }
"#,
    );
    assert_eq!(checked.errors, vec![ErrorCode::AssignToConst]);
}

#[test]
fn const_binding_wins_over_var_member() {
    let checked = check_program(
        r#"
    struct Point { var x: i32; var y: i32 }
    fun main(): i32 {
        const p: Point = :Point { x: 1, y: 2 }
        p.x = 3
        return 0
    }
"#,
    );
    assert_eq!(checked.errors, vec![ErrorCode::AssignToConst]);
}

#[test]
fn missing_field_without_default() {
    let checked = check_program(
        r#"
    struct Point { var x: i32; var y: i32 }
    fun main(): i32 { var p: Point = :Point { x: 1 }; return 0 }
"#,
    );
    assert_eq!(checked.errors, vec![ErrorCode::MissingFieldInObj]);
}

#[test]
fn unknown_struct_member_in_literal() {
    let checked = check_program(
        r#"
    struct Point { var x: i32 }
    fun main(): i32 { var p: Point = :Point { z: 1 }; return 0 }
"#,
    );
    assert_eq!(checked.errors, vec![ErrorCode::InvalidStructMember]);
}

#[test]
fn uninitialized_const_rejected() {
    let checked = check_program("fun main(): i32 { const x: i32; return 0 }\n");
    assert_eq!(checked.errors, vec![ErrorCode::UninitializedConst]);
}

#[test]
fn auto_without_initializer_rejected() {
    let checked = check_program("fun main(): i32 { var x; return 0 }\n");
    assert_eq!(checked.errors, vec![ErrorCode::AutoWithoutInitializer]);
}

#[test]
fn empty_array_without_annotation() {
    let checked = check_program("fun main(): i32 { var a = []; return 0 }\n");
    assert_eq!(checked.errors, vec![ErrorCode::IndeterminateArrayType]);
}

#[test]
fn inconsistent_array_elements() {
    let checked = check_program("fun main(): i32 { var a = [1, true]; return 0 }\n");
    assert_eq!(checked.errors, vec![ErrorCode::InconsistentArrayTypes]);
}

#[test]
fn tuple_indexing_requires_literal() {
    let checked = check_program(
        "fun main(): i32 { var t = (1, true); var i = 0; var x = t[i]; return 0 }\n",
    );
    assert_eq!(checked.errors, vec![ErrorCode::NoLiteralIndexOnTuple]);
}

#[test]
fn tuple_index_out_of_range() {
    let checked = check_program("fun main(): i32 { var t = (1, true); var x = t[2]; return 0 }\n");
    assert_eq!(checked.errors, vec![ErrorCode::TupleIndexOutOfRange]);
}

#[test]
fn tuple_index_types_elements() {
    let checked = check_program(
        "fun main(): i32 { var t = (1, true); var x: bool = t[1]; return t[0] }\n",
    );
    assert_eq!(checked.errors, vec![]);
}

#[test]
fn nil_infers_pointer_type() {
    let checked = check_program("fun main(): i32 { var p: i32* = nil; return 0 }\n");
    assert_eq!(checked.errors, vec![]);
    let p = checked.ast.find_decl("p").unwrap();
    assert_eq!(checked.env.decl_type(p).unwrap().to_string(), "::i32*");
}

#[test]
fn invalid_cast_between_int_and_pointer() {
    let checked = check_program("fun main(): i32 { var p: i32* = nil; var x = p as i32; return 0 }\n");
    assert_eq!(checked.errors, vec![ErrorCode::InvalidCast]);
}

#[test]
fn numeric_and_bool_casts_allowed() {
    let checked = check_program(
        "fun main(): i32 { var x = 3.5 as i32; var b = x as bool; var f = x as f64; return 0 }\n",
    );
    assert_eq!(checked.errors, vec![]);
}

#[test]
fn break_outside_loop_is_a_warning() {
    let checked = check_program("fun main(): i32 { break\nreturn 0 }\n");
    // Non-fatal: the program still checks.
    assert_eq!(checked.errors, vec![]);
}

#[test]
fn while_loop_with_break_and_continue() {
    let checked = check_program(
        r#"
    fun main(): i32 {
        var i = 0
        while i < 10 {
            i = i + 1
            if i == 5
                continue
            if i == 8
                break
        }
        return i
    }
"#,
    );
    assert_eq!(checked.errors, vec![]);
}

#[test]
fn for_range_loop() {
    let checked = check_program(
        r#"
    fun main(): i32 {
        var total = 0
        for i in 0..10 {
            total = total + i
        }
        for j in 0...5
            total = total + j
        return total
    }
"#,
    );
    assert_eq!(checked.errors, vec![]);
}

#[test]
fn namespaces_resolve_by_path_and_upward() {
    let checked = check_program(
        r#"
    namespace math {
        fun square(const x: i32): i32 { return x * x }
        fun cube(const x: i32): i32 { return x * square(x) }
    }
    fun main(): i32 { return math::square(3) + math::cube(2) }
"#,
    );
    assert_eq!(checked.errors, vec![]);
}

#[test]
fn struct_static_function() {
    let checked = check_program(
        r#"
    struct Point {
        var x: i32
        var y: i32
        fun origin(): Point { return :Point { x: 0, y: 0 } }
    }
    fun main(): i32 {
        var p: Point = Point::origin()
        return p.x
    }
"#,
    );
    assert_eq!(checked.errors, vec![]);
}

#[test]
fn missing_return_in_non_void_function() {
    let checked = check_program("fun f(): i32 { var x = 1 }\nfun main(): i32 { return 0 }\n");
    assert_eq!(checked.errors, vec![ErrorCode::NoReturnInNonVoidFun]);
}

#[test]
fn return_type_mismatch() {
    let checked = check_program("fun f(): i32 { return true }\nfun main(): i32 { return 0 }\n");
    assert_eq!(checked.errors, vec![ErrorCode::ReturnIncompatible]);
}

#[test]
fn undeclared_symbol() {
    let checked = check_program("fun main(): i32 { return y }\n");
    assert_eq!(checked.errors, vec![ErrorCode::UndeclaredSymbol]);
}

#[test]
fn local_shadowing_across_scopes() {
    let checked = check_program(
        r#"
    fun main(): i32 {
        var x = 1
        {
            var y = x + 1
        }
        return x
    }
"#,
    );
    assert_eq!(checked.errors, vec![]);
}

#[test]
fn duplicate_parameter_names() {
    let checked = check_program("fun f(const a: i32, const a: i32): i32 { return a }\nfun main(): i32 { return 0 }\n");
    assert_eq!(checked.errors, vec![ErrorCode::DuplicateParamName]);
}

#[test]
fn every_checked_expression_has_a_type() {
    let checked = check_program(
        r#"
    fun main(): i32 {
        var a = 1 + 2 * 3
        var b = (a, true)
        var c = [1, 2, 3]
        var d = c[a]
        return a + d
    }
"#,
    );
    assert_eq!(checked.errors, vec![]);
    // Spot-check through declarations: all initializers carry a type.
    for decl in checked.ast.decl_ids() {
        if let DeclKind::Var {
            initializer: Some(init),
            ..
        } = checked.ast.decl(decl).kind.clone()
        {
            assert!(checked.ast.expr(init).ty.is_some());
        }
    }
}

#[test]
fn local_checker_is_idempotent() {
    use flint::checker::LocalChecker;
    use flint::diagnostics::DiagnosticSink;
    use flint::source::SourceRegistry;
    use std::rc::Rc;

    let source = r#"
    struct Point { var x: i32; var y: i32 }
    fun main(): i32 {
        var p: Point = :Point { x: 1, y: 2 }
        var q = p.x + p.y
        return q
    }
"#;
    let mut checked = check_program(source);
    assert_eq!(checked.errors, vec![]);

    let registry = Rc::new(SourceRegistry::new());
    let mut sink = DiagnosticSink::muted(registry);
    LocalChecker::new(&mut checked.env, &mut checked.ast, &mut sink).check(&checked.statements);
    assert_eq!(sink.error_count(), 0);

    let q = checked.ast.find_decl("q").unwrap();
    assert_eq!(checked.env.decl_type(q).unwrap().to_string(), "::i32");
}
