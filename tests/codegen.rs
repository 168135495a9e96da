//! End-to-end emission tests: programs are checked, lowered to an LLVM
//! module and verified.

mod common;

use common::check_program;
use flint::codegen::CodeGenerator;
use inkwell::context::Context;
use inkwell::module::Linkage;

use std::rc::Rc;

use flint::diagnostics::DiagnosticSink;
use flint::source::SourceRegistry;

/// Check a program and lower it to a verified module, asserting no
/// diagnostics along the way. The callback receives the module.
fn compile_and_verify(source: &str, inspect: impl FnOnce(&inkwell::module::Module)) {
    let mut checked = check_program(source);
    assert_eq!(checked.errors, vec![], "checking failed for {source:?}");

    let registry = Rc::new(SourceRegistry::new());
    let mut sink = DiagnosticSink::muted(registry);
    let context = Context::create();
    let mut generator = CodeGenerator::new(&context, &mut checked.env, &checked.ast, &mut sink);
    let ok = generator.generate(&checked.statements);
    let module = generator.module;
    assert!(ok, "code generation failed: {:?}", sink.error_codes());
    assert_eq!(sink.error_codes(), vec![]);

    if let Err(e) = module.verify() {
        panic!("module failed verification:\n{}", e.to_string());
    }
    inspect(&module);
}

#[test]
fn minimal_main() {
    compile_and_verify("fun main(): i32 { return 0 }\n", |module| {
        let main = module.get_function("main").expect("no main emitted");
        assert_eq!(main.get_linkage(), Linkage::External);
        assert_eq!(main.count_params(), 0);
    });
}

#[test]
fn struct_lowered_as_two_field_aggregate() {
    compile_and_verify(
        r#"
    struct Point { var x: i32; var y: i32 }
    fun main(): i32 { var a: Point = :Point { x: 1, y: 2 }; var b: i32 = a.x; return 0 }
"#,
        |module| {
            let point = module.get_struct_type("__Point").expect("no struct type");
            assert_eq!(point.count_fields(), 2);
        },
    );
}

#[test]
fn extern_printf_is_external_and_called() {
    compile_and_verify(
        "extern fun printf(char*, ...): i32\nfun main(): i32 { printf(\"Hello\\n\"); return 0 }\n",
        |module| {
            let printf = module.get_function("printf").expect("printf not declared");
            assert_eq!(printf.get_linkage(), Linkage::External);
            assert!(printf.get_type().is_var_arg());
        },
    );
}

#[test]
fn pointers_and_dereference() {
    compile_and_verify(
        "fun main(): i32 { var a = 1; var b = &a; *b = 2; return a }\n",
        |_| {},
    );
}

#[test]
fn internal_functions_use_mangled_names() {
    compile_and_verify(
        "fun helper(): i32 { return 7 }\nfun main(): i32 { return helper() }\n",
        |module| {
            let helper = module.get_function("__helper").expect("no mangled helper");
            assert_eq!(helper.get_linkage(), Linkage::Internal);
        },
    );
}

#[test]
fn namespaced_function_mangling() {
    compile_and_verify(
        r#"
    namespace math {
        fun square(const x: i32): i32 { return x * x }
    }
    fun main(): i32 { return math::square(4) }
"#,
        |module| {
            assert!(module.get_function("__math__square").is_some());
        },
    );
}

#[test]
fn control_flow_constructs() {
    compile_and_verify(
        r#"
    fun main(): i32 {
        var total = 0
        for i in 0..10 {
            if i % 2 == 0
                total = total + i
            else
                continue
        }
        while total > 20 {
            total = total - 1
        }
        loop {
            total = total + 1
            if total > 20
                break
        }
        return total
    }
"#,
        |_| {},
    );
}

#[test]
fn arrays_tuples_and_generators() {
    compile_and_verify(
        r#"
    fun main(): i32 {
        var xs = [1, 2, 3]
        var filled = [7; 4]
        var t = (xs[0], true)
        xs[1] = filled[2] + t[0]
        return xs[1]
    }
"#,
        |_| {},
    );
}

#[test]
fn global_variables_with_constant_initializers() {
    compile_and_verify(
        "var counter: i32 = 41\nfun main(): i32 { counter = counter + 1; return counter }\n",
        |module| {
            assert!(module.get_global("__counter").is_some());
        },
    );
}

#[test]
fn non_constant_global_initializer_is_rejected() {
    let mut checked = check_program(
        "fun f(): i32 { return 1 }\nvar x: i32 = f()\nfun main(): i32 { return 0 }\n",
    );
    assert_eq!(checked.errors, vec![]);

    let registry = Rc::new(SourceRegistry::new());
    let mut sink = DiagnosticSink::muted(registry);
    let context = Context::create();
    let mut generator = CodeGenerator::new(&context, &mut checked.env, &checked.ast, &mut sink);
    let ok = generator.generate(&checked.statements);
    assert!(!ok);
    assert!(sink
        .error_codes()
        .contains(&flint::diagnostics::ErrorCode::NotAConstant));
}

#[test]
fn power_operator_calls_pow() {
    compile_and_verify(
        "fun main(): i32 { var x = 2 ^ 10; return 0 }\n",
        |module| {
            assert!(module.get_function("pow").is_some());
        },
    );
}

#[test]
fn logical_operators_short_circuit_blocks() {
    compile_and_verify(
        r#"
    fun check(const a: bool, const b: bool): bool { return a and b or not a }
    fun main(): i32 {
        if check(true, false)
            return 1
        return 0
    }
"#,
        |_| {},
    );
}

#[test]
fn struct_static_function_emission() {
    compile_and_verify(
        r#"
    struct Point {
        var x: i32
        var y: i32
        fun origin(): Point { return :Point { x: 0, y: 0 } }
    }
    fun main(): i32 {
        var p: Point = Point::origin()
        return p.x + p.y
    }
"#,
        |module| {
            assert!(module.get_function("__Point__origin").is_some());
        },
    );
}

#[test]
fn aggregate_return_and_copy() {
    compile_and_verify(
        r#"
    struct Pair { var a: i32; var b: i32 }
    fun make(const a: i32, const b: i32): Pair { return :Pair { a: a, b: b } }
    fun main(): i32 {
        var p: Pair = make(3, 4)
        var q: Pair = p
        q.a = 9
        return p.a + q.b
    }
"#,
        |_| {},
    );
}

#[test]
fn casts_lower_to_conversions() {
    compile_and_verify(
        r#"
    fun main(): i32 {
        var f = 2.75
        var i = f as i32
        var w = i as i64
        var b = w as bool
        if b
            return i
        return 0
    }
"#,
        |_| {},
    );
}

#[test]
fn string_literals_in_locals() {
    compile_and_verify(
        r#"
    extern fun puts(char*): i32
    fun main(): i32 {
        var message = "hello"
        puts(message)
        return 0
    }
"#,
        |_| {},
    );
}
