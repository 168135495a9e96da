//! Lisp-style AST printer.
//!
//! Renders statements and expressions as s-expressions, e.g. `(+ 1 2)` or
//! `(decl:var x i32 5)`. Used by the parser tests: two parses of the same
//! source must print identically.

use crate::lexer::{LiteralValue, TokenKind};
use crate::parser::ast::{Ast, DeclId, DeclKind, Declarer, ExprId, ExprKind, LoopKind, StmtId, StmtKind};

pub struct AstPrinter<'a> {
    ast: &'a Ast,
}

impl<'a> AstPrinter<'a> {
    pub fn new(ast: &'a Ast) -> Self {
        Self { ast }
    }

    pub fn print_program(&self, statements: &[StmtId]) -> String {
        statements
            .iter()
            .map(|&s| self.print_stmt(s))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn print_stmt(&self, id: StmtId) -> String {
        match &self.ast.stmt(id).kind {
            StmtKind::Declaration(decl) => self.print_decl(*decl),
            StmtKind::Expression(expr) => self.print_expr(*expr),
            StmtKind::Block(stmts) => {
                let mut result = String::from("(block");
                for stmt in stmts {
                    result.push(' ');
                    result.push_str(&self.print_stmt(*stmt));
                }
                result.push(')');
                result
            }
            StmtKind::Conditional {
                condition,
                then_branch,
                else_branch,
            } => {
                let mut result = format!(
                    "(stmt:if {} {}",
                    self.print_expr(*condition),
                    self.print_stmt(*then_branch)
                );
                if let Some(else_branch) = else_branch {
                    result.push(' ');
                    result.push_str(&self.print_stmt(*else_branch));
                }
                result.push(')');
                result
            }
            StmtKind::Loop { kind, body } => match kind {
                LoopKind::While { condition } => format!(
                    "(stmt:while {} {})",
                    self.print_expr(*condition),
                    self.print_stmt(*body)
                ),
                LoopKind::Infinite => format!("(stmt:loop {})", self.print_stmt(*body)),
                LoopKind::ForRange {
                    binding,
                    start,
                    end,
                    inclusive,
                } => format!(
                    "(stmt:for {} {} {}{} {})",
                    self.ast.decl(*binding).name,
                    self.print_expr(*start),
                    if *inclusive { "..." } else { ".." },
                    self.print_expr(*end),
                    self.print_stmt(*body)
                ),
            },
            StmtKind::Return { value } => match value {
                Some(value) => format!("(stmt:return {})", self.print_expr(*value)),
                None => "(stmt:return)".to_string(),
            },
            StmtKind::Break => "(stmt:break)".to_string(),
            StmtKind::Continue => "(stmt:continue)".to_string(),
            StmtKind::EndOfFile => "(stmt:eof)".to_string(),
        }
    }

    pub fn print_decl(&self, id: DeclId) -> String {
        let decl = self.ast.decl(id);
        match &decl.kind {
            DeclKind::Var {
                declarer,
                initializer,
            } => {
                let declarer = match declarer {
                    Declarer::Var => "var",
                    Declarer::Const => "const",
                };
                let mut result = format!("(decl:{declarer} {}", decl.name);
                if let Some(annotation) = &decl.annotation {
                    result.push_str(&format!(" {annotation}"));
                }
                if let Some(initializer) = initializer {
                    result.push(' ');
                    result.push_str(&self.print_expr(*initializer));
                }
                result.push(')');
                result
            }
            DeclKind::Fun {
                parameters,
                return_var,
                body,
            } => {
                let ret = self
                    .ast
                    .decl(*return_var)
                    .annotation
                    .as_ref()
                    .map(|a| a.to_string())
                    .unwrap_or_default();
                let mut result = format!("(decl:fun {} {ret} ", decl.name);
                for param in parameters {
                    result.push_str(&self.print_decl(*param));
                    result.push(' ');
                }
                result.push_str("{ ");
                for stmt in body {
                    result.push_str(&self.print_stmt(*stmt));
                    result.push(' ');
                }
                result.push_str("})");
                result
            }
            DeclKind::ExternFun => {
                let annotation = decl
                    .annotation
                    .as_ref()
                    .map(|a| a.to_string())
                    .unwrap_or_default();
                format!("(decl:extern {} {annotation})", decl.name)
            }
            DeclKind::Struct { declarations } => {
                let mut result = format!("(decl:struct {}", decl.name);
                for declaration in declarations {
                    result.push(' ');
                    result.push_str(&self.print_decl(*declaration));
                }
                result.push(')');
                result
            }
            DeclKind::Namespace { declarations } => {
                let mut result = format!("(decl:namespace {}", decl.name);
                for declaration in declarations {
                    result.push(' ');
                    result.push_str(&self.print_decl(*declaration));
                }
                result.push(')');
                result
            }
        }
    }

    pub fn print_expr(&self, id: ExprId) -> String {
        match &self.ast.expr(id).kind {
            ExprKind::Assign { op, left, right } => {
                self.parenthesize(op_lexeme(*op), &[*left, *right])
            }
            ExprKind::Logical { op, left, right } => {
                self.parenthesize(op_lexeme(*op), &[*left, *right])
            }
            ExprKind::Binary { op, left, right } => {
                self.parenthesize(op_lexeme(*op), &[*left, *right])
            }
            ExprKind::Unary { op, inner } => self.parenthesize(op_lexeme(*op), &[*inner]),
            ExprKind::Dereference { inner } => self.parenthesize("*", &[*inner]),
            ExprKind::Call { callee, arguments } => {
                let mut ids = vec![*callee];
                ids.extend(arguments);
                self.parenthesize("call", &ids)
            }
            ExprKind::Cast { inner, annotation } => {
                format!("(as {} {annotation})", self.print_expr(*inner))
            }
            ExprKind::Access {
                left, op, member, ..
            } => format!(
                "({} {} {})",
                op_lexeme(*op),
                self.print_expr(*left),
                member.name
            ),
            ExprKind::Index { left, index, .. } => self.parenthesize("[]", &[*left, *index]),
            ExprKind::Grouping { inner } => self.parenthesize("group", &[*inner]),
            ExprKind::Identifier { path } => path
                .iter()
                .map(|s| s.name.as_str())
                .collect::<Vec<_>>()
                .join("::"),
            ExprKind::Literal { value, .. } => match value {
                Some(LiteralValue::Int(v)) => v.to_string(),
                Some(LiteralValue::Float(v)) => format!("{v}"),
                Some(LiteralValue::Bool(v)) => v.to_string(),
                Some(LiteralValue::Char(v)) => format!("'{v}'"),
                Some(LiteralValue::Str(v)) => format!("{v:?}"),
                None => "nil".to_string(),
            },
            ExprKind::Array { elements } => self.parenthesize("array", elements),
            ExprKind::ArrayGen { generator, size } => {
                format!("(arraygen {} {size})", self.print_expr(*generator))
            }
            ExprKind::Tuple { elements } => self.parenthesize("tuple", elements),
            ExprKind::Object { annotation, fields } => {
                let mut result = format!("(object {annotation}");
                for (name, value) in fields {
                    result.push_str(&format!(" (field {} {})", name.name, self.print_expr(*value)));
                }
                result.push(')');
                result
            }
        }
    }

    fn parenthesize(&self, name: &str, exprs: &[ExprId]) -> String {
        let mut result = format!("({name}");
        for expr in exprs {
            result.push(' ');
            result.push_str(&self.print_expr(*expr));
        }
        result.push(')');
        result
    }
}

fn op_lexeme(kind: TokenKind) -> &'static str {
    match kind {
        TokenKind::Plus => "+",
        TokenKind::PlusEq => "+=",
        TokenKind::Minus => "-",
        TokenKind::MinusEq => "-=",
        TokenKind::Star => "*",
        TokenKind::StarEq => "*=",
        TokenKind::Slash => "/",
        TokenKind::SlashEq => "/=",
        TokenKind::Percent => "%",
        TokenKind::PercentEq => "%=",
        TokenKind::Caret => "^",
        TokenKind::CaretEq => "^=",
        TokenKind::Amp => "&",
        TokenKind::AmpEq => "&=",
        TokenKind::AmpAmpEq => "&&=",
        TokenKind::BarEq => "|=",
        TokenKind::BarBarEq => "||=",
        TokenKind::Bang | TokenKind::Not => "!",
        TokenKind::BangEq => "!=",
        TokenKind::Eq => "=",
        TokenKind::EqEq => "==",
        TokenKind::Gt => ">",
        TokenKind::Ge => ">=",
        TokenKind::Lt => "<",
        TokenKind::Le => "<=",
        TokenKind::Dot => ".",
        TokenKind::Arrow => "->",
        TokenKind::And => "and",
        TokenKind::Or => "or",
        _ => "?",
    }
}
