//! Shared helpers for the integration tests: run the front-end pipeline
//! over a source string with a muted diagnostic sink.

use std::rc::Rc;

use flint::checker::{Environment, GlobalChecker, LocalChecker};
use flint::diagnostics::{DiagnosticSink, ErrorCode};
use flint::lexer::Scanner;
use flint::parser::ast::{Ast, StmtId};
use flint::parser::Parser;
use flint::source::SourceRegistry;

pub struct Checked {
    pub ast: Ast,
    pub statements: Vec<StmtId>,
    pub env: Environment,
    pub errors: Vec<ErrorCode>,
}

/// Scan, parse and type-check a program, mirroring the pipeline's stage
/// gating (later stages only run when earlier ones were clean).
pub fn check_program(source: &str) -> Checked {
    let mut registry = SourceRegistry::new();
    let id = registry.add_source("test.fl", source);
    let text = registry.file(id).text.clone();
    let registry = Rc::new(registry);
    let mut sink = DiagnosticSink::muted(registry);

    let mut scanner = Scanner::new(&mut sink);
    scanner.scan_file(id, &text);
    let tokens = scanner.into_tokens();

    let parser = Parser::new(tokens, &mut sink);
    let (mut ast, statements) = parser.parse();

    let mut env = Environment::new();
    if sink.error_count() == 0 {
        GlobalChecker::new(&mut env, &ast, &mut sink).check(&statements);
    }
    if sink.error_count() == 0 {
        LocalChecker::new(&mut env, &mut ast, &mut sink).check(&statements);
    }

    Checked {
        ast,
        statements,
        env,
        errors: sink.error_codes(),
    }
}

/// Scan and parse only.
pub fn parse_program(source: &str) -> (Ast, Vec<StmtId>, Vec<ErrorCode>) {
    let mut registry = SourceRegistry::new();
    let id = registry.add_source("test.fl", source);
    let text = registry.file(id).text.clone();
    let registry = Rc::new(registry);
    let mut sink = DiagnosticSink::muted(registry);

    let mut scanner = Scanner::new(&mut sink);
    scanner.scan_file(id, &text);
    let tokens = scanner.into_tokens();

    let parser = Parser::new(tokens, &mut sink);
    let (ast, statements) = parser.parse();
    (ast, statements, sink.error_codes())
}
