//! Parser behavior pinned through the s-expression printer, including
//! the parse-print stability property.

mod common;

use common::parse_program;
use flint::diagnostics::ErrorCode;
use flint::parser::printer::AstPrinter;

fn print(source: &str) -> String {
    let (ast, statements, errors) = parse_program(source);
    assert_eq!(errors, vec![], "unexpected parse errors for {source:?}");
    AstPrinter::new(&ast).print_program(&statements)
}

#[test]
fn printing_is_stable_across_parses() {
    let source = r#"
    struct Point { var x: i32; var y: i32 }
    fun main(): i32 {
        var a: Point = :Point { x: 1, y: 2 }
        var xs = [1, 2, 3]
        var t = (a.x, true,)
        if a.x < 3 and true
            return xs[0]
        return a.y
    }
"#;
    assert_eq!(print(source), print(source));
}

#[test]
fn operator_precedence() {
    assert_eq!(print("var x = 1 + 2 * 3\n"), "(decl:var x auto (+ 1 (* 2 3))) (stmt:eof)");
    assert_eq!(print("var x = (1 + 2) * 3\n"), "(decl:var x auto (* (group (+ 1 2)) 3)) (stmt:eof)");
    assert_eq!(
        print("var x = 1 < 2 == true\n"),
        "(decl:var x auto (== (< 1 2) true)) (stmt:eof)"
    );
    assert_eq!(
        print("var b = not true or false and true\n"),
        "(decl:var b auto (or (! true) (and false true))) (stmt:eof)"
    );
}

#[test]
fn power_is_right_associative() {
    assert_eq!(
        print("var x = 2 ^ 3 ^ 2\n"),
        "(decl:var x auto (^ 2 (^ 3 2))) (stmt:eof)"
    );
}

#[test]
fn assignment_is_right_associative() {
    assert_eq!(
        print("fun f() { a = b = c }\n"),
        "(decl:fun f void { (= a (= b c)) }) (stmt:eof)"
    );
}

#[test]
fn tuple_vs_grouping() {
    assert_eq!(print("var x = ()\n"), "(decl:var x auto (tuple)) (stmt:eof)");
    assert_eq!(print("var x = (1)\n"), "(decl:var x auto (group 1)) (stmt:eof)");
    assert_eq!(print("var x = (1,)\n"), "(decl:var x auto (tuple 1)) (stmt:eof)");
    assert_eq!(
        print("var x = (1, 2)\n"),
        "(decl:var x auto (tuple 1 2)) (stmt:eof)"
    );
    assert_eq!(
        print("var x = (1, 2,)\n"),
        "(decl:var x auto (tuple 1 2)) (stmt:eof)"
    );
}

#[test]
fn array_literals_and_generators() {
    assert_eq!(
        print("var x = [1, 2, 3,]\n"),
        "(decl:var x auto (array 1 2 3)) (stmt:eof)"
    );
    assert_eq!(
        print("var x = [0; 8]\n"),
        "(decl:var x auto (arraygen 0 8)) (stmt:eof)"
    );
}

#[test]
fn newlines_are_transparent_inside_brackets() {
    let multi = "var x = [\n    1,\n    2,\n]\n";
    assert_eq!(print(multi), "(decl:var x auto (array 1 2)) (stmt:eof)");

    let call = "fun f(const a: i32, const b: i32) { }\nfun g() { f(\n  1,\n  2\n) }\n";
    let printed = print(call);
    assert!(printed.contains("(call f 1 2)"), "got: {printed}");
}

#[test]
fn line_continuation_joins_statements() {
    assert_eq!(
        print("var x = 1 + \\\n2\n"),
        "(decl:var x auto (+ 1 2)) (stmt:eof)"
    );
}

#[test]
fn access_call_and_index_chains() {
    assert_eq!(
        print("fun f() { a.b->c[0](1) }\n"),
        "(decl:fun f void { (call ([] (-> (. a b) c) 0) 1) }) (stmt:eof)"
    );
}

#[test]
fn identifier_paths() {
    assert_eq!(
        print("fun f() { std::io::print(1) }\n"),
        "(decl:fun f void { (call std::io::print 1) }) (stmt:eof)"
    );
}

#[test]
fn implicit_annotations_are_synthesized() {
    // A missing variable type becomes `auto`, a missing return type `void`.
    assert_eq!(print("var x = 5\n"), "(decl:var x auto 5) (stmt:eof)");
    assert_eq!(print("fun f() { }\n"), "(decl:fun f void { }) (stmt:eof)");
}

#[test]
fn extern_and_variadic_annotations() {
    assert_eq!(
        print("extern fun printf(char*, ...): i32\n"),
        "(decl:extern printf fun(char*, ...) => i32) (stmt:eof)"
    );
}

#[test]
fn cast_expressions() {
    assert_eq!(
        print("var x = 1 as f64\n"),
        "(decl:var x auto (as 1 f64)) (stmt:eof)"
    );
}

#[test]
fn compound_annotations() {
    assert_eq!(
        print("var x: i32*[4]\n"),
        "(decl:var x i32*[4]) (stmt:eof)"
    );
    assert_eq!(
        print("var f: fun(i32, var bool) => void\n"),
        "(decl:var f fun(i32, var bool) => void) (stmt:eof)"
    );
    assert_eq!(
        print("var t: (i32, bool)\n"),
        "(decl:var t (i32, bool)) (stmt:eof)"
    );
}

#[test]
fn error_recovery_continues_after_bad_statement() {
    let (_, statements, errors) = parse_program("var = 5\nvar y = 2\n");
    assert_eq!(errors, vec![ErrorCode::UnnamedVar]);
    // The second declaration still parses: one declaration + eof.
    assert_eq!(statements.len(), 2);
}

#[test]
fn too_many_arguments() {
    let args = (0..300).map(|i| i.to_string()).collect::<Vec<_>>().join(", ");
    let source = format!("fun f() {{ g({args}) }}\n");
    let (_, _, errors) = parse_program(&source);
    assert_eq!(errors.first(), Some(&ErrorCode::TooManyArgs));
}

#[test]
fn missing_statement_end() {
    let (_, _, errors) = parse_program("fun f() { var x = 1 var y = 2 }\n");
    assert_eq!(errors.first(), Some(&ErrorCode::MissingStmtEnd));
}

#[test]
fn unterminated_grouping() {
    let (_, _, errors) = parse_program("var x = (1 + 2\n");
    assert_eq!(errors, vec![ErrorCode::UnmatchedParenInGrouping]);
}
