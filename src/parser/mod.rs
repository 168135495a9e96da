//! Recursive-descent parser.
//!
//! Statements are newline- or semicolon-terminated; inside any open
//! bracket pair the parser keeps a stack of expected closing tokens and
//! newline tokens become transparent, so expressions can span lines freely
//! within `()`, `[]` and object-literal braces.
//!
//! Error recovery is per statement: a [`ParserError`] unwinds to the
//! statement loop, which discards tokens up to the next plausible
//! statement start and carries on, so one malformed statement never hides
//! the rest of the file.

pub mod annotation;
pub mod ast;
pub mod printer;

use crate::diagnostics::{DiagnosticSink, ErrorCode};
use crate::lexer::{LiteralValue, Token, TokenKind};
use crate::source::Location;

use self::annotation::{Annotation, AnnotationKind, ClassSegment};
use self::ast::{
    Ast, Decl, DeclId, DeclKind, Declarer, ExprId, ExprKind, LoopKind, PathSegment, StmtId, StmtKind,
};

/// Marker for statement-level recovery; the diagnostic has already been
/// recorded by the time this is raised.
pub struct ParserError;

type PResult<T> = Result<T, ParserError>;

const ASSIGN_OPS: &[TokenKind] = &[
    TokenKind::Eq,
    TokenKind::PlusEq,
    TokenKind::MinusEq,
    TokenKind::StarEq,
    TokenKind::SlashEq,
    TokenKind::PercentEq,
    TokenKind::CaretEq,
    TokenKind::AmpEq,
    TokenKind::AmpAmpEq,
    TokenKind::BarEq,
    TokenKind::BarBarEq,
];

pub struct Parser<'a> {
    tokens: Vec<Token>,
    current: usize,
    grouping: Vec<TokenKind>,
    sink: &'a mut DiagnosticSink,
    ast: Ast,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: Vec<Token>, sink: &'a mut DiagnosticSink) -> Self {
        Self {
            tokens,
            current: 0,
            grouping: Vec::new(),
            sink,
            ast: Ast::new(),
        }
    }

    /// Parse the whole token stream into a list of top-level statements.
    pub fn parse(mut self) -> (Ast, Vec<StmtId>) {
        let mut statements = Vec::new();
        loop {
            self.skip_empty_statements();
            if self.is_at_end() {
                break;
            }
            if let Some(stmt) = self.statement() {
                statements.push(stmt);
            }
        }
        let location = self.peek().location;
        statements.push(self.ast.add_stmt(StmtKind::EndOfFile, location));
        (self.ast, statements)
    }

    // MARK: Token plumbing

    fn peek(&self) -> &Token {
        &self.tokens[self.current.min(self.tokens.len() - 1)]
    }

    fn prev_token(&self) -> Token {
        self.tokens[self.current - 1].clone()
    }

    fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn check_any(&self, kinds: &[TokenKind]) -> bool {
        kinds.contains(&self.peek().kind)
    }

    /// Consume one token. Closing the innermost open bracket pops the
    /// grouping stack; while any bracket remains open, trailing newline
    /// tokens are consumed silently.
    fn advance(&mut self) -> Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        let prev = self.prev_token();
        if self.grouping.last() == Some(&prev.kind) {
            self.grouping.pop();
        }
        self.skip_transparent_newlines();
        prev
    }

    fn skip_transparent_newlines(&mut self) {
        while !self.grouping.is_empty() && self.peek().kind == TokenKind::Newline {
            self.current += 1;
        }
    }

    fn push_group(&mut self, closing: TokenKind) {
        self.grouping.push(closing);
        self.skip_transparent_newlines();
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            return true;
        }
        false
    }

    fn match_any(&mut self, kinds: &[TokenKind]) -> bool {
        if self.check_any(kinds) {
            self.advance();
            return true;
        }
        false
    }

    fn consume(&mut self, kind: TokenKind, code: ErrorCode, message: &str) -> PResult<Token> {
        if self.check(kind) {
            return Ok(self.advance());
        }
        self.error(code, message)
    }

    fn error<T>(&mut self, code: ErrorCode, message: &str) -> PResult<T> {
        let location = self.peek().location;
        self.sink.error(location, code, message);
        Err(ParserError)
    }

    /// Discard tokens until the next statement boundary or a token that
    /// clearly begins a new declaration or control statement.
    fn synchronize(&mut self) {
        self.grouping.clear();
        self.advance();

        while !self.is_at_end() {
            if matches!(
                self.tokens[self.current - 1].kind,
                TokenKind::Newline | TokenKind::Semicolon
            ) {
                return;
            }
            match self.peek().kind {
                TokenKind::Struct
                | TokenKind::Fun
                | TokenKind::Var
                | TokenKind::For
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Loop
                | TokenKind::Return => return,
                _ => {}
            }
            self.advance();
        }
    }

    fn skip_empty_statements(&mut self) {
        while self.check_any(&[TokenKind::Newline, TokenKind::Semicolon]) {
            self.advance();
        }
    }

    /// A statement terminator: newline or `;`, or an upcoming `}`, `else`
    /// or end of input (which are left for the enclosing construct).
    fn expect_statement_end(&mut self) -> PResult<()> {
        if self.match_any(&[TokenKind::Newline, TokenKind::Semicolon]) {
            return Ok(());
        }
        if self.check_any(&[TokenKind::Eof, TokenKind::RightBrace, TokenKind::Else]) {
            return Ok(());
        }
        self.error(
            ErrorCode::MissingStmtEnd,
            "Expected newline or ';' after statement.",
        )
    }

    // MARK: Statements

    fn statement(&mut self) -> Option<StmtId> {
        match self.try_statement() {
            Ok(stmt) => Some(stmt),
            Err(_) => {
                self.synchronize();
                None
            }
        }
    }

    fn try_statement(&mut self) -> PResult<StmtId> {
        match self.peek().kind {
            TokenKind::Var
            | TokenKind::Const
            | TokenKind::Fun
            | TokenKind::Extern
            | TokenKind::Struct
            | TokenKind::Namespace => self.declaration_statement(),
            TokenKind::If => {
                let token = self.advance();
                self.conditional_statement(token.location)
            }
            TokenKind::While => self.while_statement(),
            TokenKind::Loop => self.loop_statement(),
            TokenKind::For => self.for_statement(),
            TokenKind::Return => {
                let token = self.advance();
                self.return_statement(token.location)
            }
            TokenKind::Break => {
                let token = self.advance();
                self.expect_statement_end()?;
                Ok(self.ast.add_stmt(StmtKind::Break, token.location))
            }
            TokenKind::Continue => {
                let token = self.advance();
                self.expect_statement_end()?;
                Ok(self.ast.add_stmt(StmtKind::Continue, token.location))
            }
            TokenKind::LeftBrace => self.block_statement(),
            _ => self.expression_statement(),
        }
    }

    fn declaration_statement(&mut self) -> PResult<StmtId> {
        let location = self.peek().location;
        let decl = self.declaration()?;
        Ok(self.ast.add_stmt(StmtKind::Declaration(decl), location))
    }

    fn declaration(&mut self) -> PResult<DeclId> {
        match self.peek().kind {
            TokenKind::Var | TokenKind::Const => {
                let keyword = self.advance();
                let declarer = Self::declarer_from(keyword.kind);
                let decl = self.var_decl(declarer)?;
                self.expect_statement_end()?;
                Ok(decl)
            }
            TokenKind::Fun => {
                self.advance();
                self.fun_decl()
            }
            TokenKind::Extern => {
                self.advance();
                self.consume(
                    TokenKind::Fun,
                    ErrorCode::UnnamedFun,
                    "Expected 'fun' after 'extern'.",
                )?;
                let decl = self.extern_fun_decl()?;
                self.expect_statement_end()?;
                Ok(decl)
            }
            TokenKind::Struct => {
                self.advance();
                self.struct_decl()
            }
            TokenKind::Namespace => {
                self.advance();
                self.namespace_decl()
            }
            _ => self.error(
                ErrorCode::NotAnExpression,
                "Expected declaration.",
            ),
        }
    }

    fn declarer_from(kind: TokenKind) -> Declarer {
        if kind == TokenKind::Var {
            Declarer::Var
        } else {
            Declarer::Const
        }
    }

    /// A variable declaration; the `var`/`const` keyword has already been
    /// consumed. A missing type annotation is synthesized as `auto`.
    fn var_decl(&mut self, declarer: Declarer) -> PResult<DeclId> {
        let name = self.consume(
            TokenKind::Ident,
            ErrorCode::UnnamedVar,
            "Expected identifier in declaration.",
        )?;

        let annotation = if self.matches(TokenKind::Colon) {
            self.annotation()?
        } else {
            Annotation::simple("auto", name.location)
        };

        let initializer = if self.matches(TokenKind::Eq) {
            Some(self.expression()?)
        } else {
            None
        };

        Ok(self.ast.add_decl(Decl {
            kind: DeclKind::Var {
                declarer,
                initializer,
            },
            name: name.lexeme,
            annotation: Some(annotation),
            location: name.location,
        }))
    }

    fn param_decl(&mut self) -> PResult<DeclId> {
        if !self.check_any(&[TokenKind::Var, TokenKind::Const]) {
            return self.error(
                ErrorCode::ParamWithoutDeclarer,
                "Expected 'var' or 'const' before parameter.",
            );
        }
        let keyword = self.advance();
        self.var_decl(Self::declarer_from(keyword.kind))
    }

    /// A function declaration; the `fun` keyword has already been
    /// consumed. A missing return type is synthesized as `void`, and the
    /// full `fun(...) => ...` annotation is assembled from the parameter
    /// and return annotations.
    fn fun_decl(&mut self) -> PResult<DeclId> {
        let name = self.consume(
            TokenKind::Ident,
            ErrorCode::UnnamedFun,
            "Expected identifier in function declaration.",
        )?;
        self.consume(
            TokenKind::LeftParen,
            ErrorCode::NoLparenInFunDecl,
            "Expected '(' after function name.",
        )?;
        self.push_group(TokenKind::RightParen);

        let mut parameters = Vec::new();
        if !self.check(TokenKind::RightParen) {
            loop {
                parameters.push(self.param_decl()?);
                if !self.matches(TokenKind::Comma) {
                    break;
                }
                if self.check(TokenKind::RightParen) {
                    break;
                }
            }
        }
        self.consume(
            TokenKind::RightParen,
            ErrorCode::UnmatchedParenInParams,
            "Expected ')' after function parameters.",
        )?;

        let return_annotation = if self.matches(TokenKind::Colon) {
            self.annotation()?
        } else {
            Annotation::simple("void", name.location)
        };

        let annotation_params = parameters
            .iter()
            .map(|&param| {
                let decl = self.ast.decl(param);
                (
                    decl.declarer() == Declarer::Var,
                    decl.annotation.clone().unwrap_or_else(|| Annotation::simple("auto", decl.location)),
                )
            })
            .collect();
        let fun_annotation = Annotation::new(
            AnnotationKind::Function {
                params: annotation_params,
                ret: Box::new(return_annotation.clone()),
                ret_mutable: false,
                variadic: false,
            },
            name.location,
        );

        let return_var = self.ast.add_decl(Decl {
            kind: DeclKind::Var {
                declarer: Declarer::Var,
                initializer: None,
            },
            name: "__return_val__".to_string(),
            annotation: Some(return_annotation),
            location: name.location,
        });

        self.consume(
            TokenKind::LeftBrace,
            ErrorCode::NoLbraceInFunDecl,
            "Expected '{' before function body.",
        )?;
        let mut body = Vec::new();
        loop {
            self.skip_empty_statements();
            if self.check(TokenKind::RightBrace) || self.is_at_end() {
                break;
            }
            if let Some(stmt) = self.statement() {
                body.push(stmt);
            }
        }
        self.consume(
            TokenKind::RightBrace,
            ErrorCode::UnmatchedBraceInFunDecl,
            "Expected '}' after function body.",
        )?;

        Ok(self.ast.add_decl(Decl {
            kind: DeclKind::Fun {
                parameters,
                return_var,
                body,
            },
            name: name.lexeme,
            annotation: Some(fun_annotation),
            location: name.location,
        }))
    }

    /// An external function declaration: `extern fun name(T, ...) : R`.
    /// Parameters are bare annotations; `...` marks the function variadic.
    fn extern_fun_decl(&mut self) -> PResult<DeclId> {
        let name = self.consume(
            TokenKind::Ident,
            ErrorCode::UnnamedFun,
            "Expected identifier in extern function declaration.",
        )?;
        self.consume(
            TokenKind::LeftParen,
            ErrorCode::NoLparenInFunDecl,
            "Expected '(' after function name.",
        )?;
        self.push_group(TokenKind::RightParen);

        let mut params = Vec::new();
        let mut variadic = false;
        if !self.check(TokenKind::RightParen) {
            loop {
                if self.matches(TokenKind::TripleDot) {
                    variadic = true;
                    break;
                }
                let mutable = self.matches(TokenKind::Var);
                params.push((mutable, self.annotation()?));
                if !self.matches(TokenKind::Comma) {
                    break;
                }
                if self.check(TokenKind::RightParen) {
                    break;
                }
            }
        }
        self.consume(
            TokenKind::RightParen,
            ErrorCode::UnmatchedParenInParams,
            "Expected ')' after function parameters.",
        )?;

        let ret = if self.matches(TokenKind::Colon) {
            self.annotation()?
        } else {
            Annotation::simple("void", name.location)
        };

        let annotation = Annotation::new(
            AnnotationKind::Function {
                params,
                ret: Box::new(ret),
                ret_mutable: false,
                variadic,
            },
            name.location,
        );

        Ok(self.ast.add_decl(Decl {
            kind: DeclKind::ExternFun,
            name: name.lexeme,
            annotation: Some(annotation),
            location: name.location,
        }))
    }

    fn struct_decl(&mut self) -> PResult<DeclId> {
        let name = self.consume(
            TokenKind::Ident,
            ErrorCode::UnnamedStruct,
            "Expected identifier in struct declaration.",
        )?;
        self.consume(
            TokenKind::LeftBrace,
            ErrorCode::NoLbraceInStructDecl,
            "Expected '{' after struct name.",
        )?;

        let mut declarations = Vec::new();
        loop {
            self.skip_empty_statements();
            if self.check(TokenKind::RightBrace) || self.is_at_end() {
                break;
            }
            match self.peek().kind {
                TokenKind::Var | TokenKind::Const => {
                    let keyword = self.advance();
                    let decl = self.var_decl(Self::declarer_from(keyword.kind))?;
                    self.expect_statement_end()?;
                    declarations.push(decl);
                }
                TokenKind::Fun => {
                    self.advance();
                    declarations.push(self.fun_decl()?);
                }
                TokenKind::Struct => {
                    self.advance();
                    declarations.push(self.struct_decl()?);
                }
                _ => {
                    return self.error(
                        ErrorCode::NotAnExpression,
                        "Expected member declaration in struct body.",
                    )
                }
            }
        }
        self.consume(
            TokenKind::RightBrace,
            ErrorCode::UnmatchedBraceInStructDecl,
            "Expected '}' after struct body.",
        )?;

        Ok(self.ast.add_decl(Decl {
            kind: DeclKind::Struct { declarations },
            name: name.lexeme,
            annotation: None,
            location: name.location,
        }))
    }

    fn namespace_decl(&mut self) -> PResult<DeclId> {
        let name = self.consume(
            TokenKind::Ident,
            ErrorCode::UnnamedNamespace,
            "Expected identifier in namespace declaration.",
        )?;
        self.consume(
            TokenKind::LeftBrace,
            ErrorCode::NoLbraceInNamespaceDecl,
            "Expected '{' after namespace name.",
        )?;

        let mut declarations = Vec::new();
        loop {
            self.skip_empty_statements();
            if self.check(TokenKind::RightBrace) || self.is_at_end() {
                break;
            }
            declarations.push(self.declaration()?);
        }
        self.consume(
            TokenKind::RightBrace,
            ErrorCode::UnmatchedBraceInNamespaceDecl,
            "Expected '}' after namespace body.",
        )?;

        Ok(self.ast.add_decl(Decl {
            kind: DeclKind::Namespace { declarations },
            name: name.lexeme,
            annotation: None,
            location: name.location,
        }))
    }

    /// A branch of `if`/`else`/`while`/`for`/`loop`: either a block or a
    /// single statement. Leading newlines are skipped so the branch may
    /// start on the following line.
    fn branch_statement(&mut self) -> PResult<StmtId> {
        while self.grouping.is_empty() && self.check(TokenKind::Newline) {
            self.advance();
        }
        self.try_statement()
    }

    fn conditional_statement(&mut self, location: Location) -> PResult<StmtId> {
        let condition = self.expression()?;
        let then_branch = self.branch_statement()?;

        // Look past blank lines for an `else`; the consumed newlines double
        // as the conditional's own terminator.
        while self.check(TokenKind::Newline) {
            self.advance();
        }
        let else_branch = if self.matches(TokenKind::Else) {
            Some(self.branch_statement()?)
        } else {
            None
        };

        Ok(self.ast.add_stmt(
            StmtKind::Conditional {
                condition,
                then_branch,
                else_branch,
            },
            location,
        ))
    }

    fn while_statement(&mut self) -> PResult<StmtId> {
        let token = self.advance();
        let condition = self.expression()?;
        let body = self.branch_statement()?;
        Ok(self.ast.add_stmt(
            StmtKind::Loop {
                kind: LoopKind::While { condition },
                body,
            },
            token.location,
        ))
    }

    fn loop_statement(&mut self) -> PResult<StmtId> {
        let token = self.advance();
        let body = self.branch_statement()?;
        Ok(self.ast.add_stmt(
            StmtKind::Loop {
                kind: LoopKind::Infinite,
                body,
            },
            token.location,
        ))
    }

    fn for_statement(&mut self) -> PResult<StmtId> {
        let token = self.advance();
        let name = self.consume(
            TokenKind::Ident,
            ErrorCode::UnnamedVar,
            "Expected identifier after 'for'.",
        )?;
        self.consume(
            TokenKind::In,
            ErrorCode::NoInKeywordInFor,
            "Expected 'in' after loop variable.",
        )?;
        let start = self.expression()?;
        let inclusive = if self.matches(TokenKind::DotDot) {
            false
        } else if self.matches(TokenKind::TripleDot) {
            true
        } else {
            return self.error(
                ErrorCode::NoRangeInFor,
                "Expected '..' or '...' range in for statement.",
            );
        };
        let end = self.expression()?;

        let binding = self.ast.add_decl(Decl {
            kind: DeclKind::Var {
                declarer: Declarer::Const,
                initializer: None,
            },
            name: name.lexeme,
            annotation: Some(Annotation::simple("auto", name.location)),
            location: name.location,
        });

        let body = self.branch_statement()?;
        Ok(self.ast.add_stmt(
            StmtKind::Loop {
                kind: LoopKind::ForRange {
                    binding,
                    start,
                    end,
                    inclusive,
                },
                body,
            },
            token.location,
        ))
    }

    fn return_statement(&mut self, location: Location) -> PResult<StmtId> {
        let value = if self.check_any(&[
            TokenKind::Newline,
            TokenKind::Semicolon,
            TokenKind::Eof,
            TokenKind::RightBrace,
            TokenKind::Else,
        ]) {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect_statement_end()?;
        Ok(self.ast.add_stmt(StmtKind::Return { value }, location))
    }

    fn block_statement(&mut self) -> PResult<StmtId> {
        let brace = self.advance();
        let mut statements = Vec::new();
        loop {
            self.skip_empty_statements();
            if self.check(TokenKind::RightBrace) || self.is_at_end() {
                break;
            }
            if let Some(stmt) = self.statement() {
                statements.push(stmt);
            }
        }
        self.consume(
            TokenKind::RightBrace,
            ErrorCode::UnmatchedBraceInBlock,
            "Expected '}' after block.",
        )?;
        Ok(self.ast.add_stmt(StmtKind::Block(statements), brace.location))
    }

    fn expression_statement(&mut self) -> PResult<StmtId> {
        let location = self.peek().location;
        let expr = self.expression()?;
        self.expect_statement_end()?;
        Ok(self.ast.add_stmt(StmtKind::Expression(expr), location))
    }

    // MARK: Expressions

    fn expression(&mut self) -> PResult<ExprId> {
        self.assign_expr()
    }

    fn assign_expr(&mut self) -> PResult<ExprId> {
        let expr = self.or_expr()?;

        // L-value checking is left to the type checker: `5 = 10` is
        // syntactically valid here but semantically rejected later.
        if self.match_any(ASSIGN_OPS) {
            let op = self.prev_token();
            let right = self.assign_expr()?;
            return Ok(self.ast.add_expr(
                ExprKind::Assign {
                    op: op.kind,
                    left: expr,
                    right,
                },
                op.location,
            ));
        }
        Ok(expr)
    }

    fn or_expr(&mut self) -> PResult<ExprId> {
        let mut expr = self.and_expr()?;
        while self.matches(TokenKind::Or) {
            let op = self.prev_token();
            let right = self.and_expr()?;
            expr = self.ast.add_expr(
                ExprKind::Logical {
                    op: op.kind,
                    left: expr,
                    right,
                },
                op.location,
            );
        }
        Ok(expr)
    }

    fn and_expr(&mut self) -> PResult<ExprId> {
        let mut expr = self.equality_expr()?;
        while self.matches(TokenKind::And) {
            let op = self.prev_token();
            let right = self.equality_expr()?;
            expr = self.ast.add_expr(
                ExprKind::Logical {
                    op: op.kind,
                    left: expr,
                    right,
                },
                op.location,
            );
        }
        Ok(expr)
    }

    fn equality_expr(&mut self) -> PResult<ExprId> {
        let mut expr = self.comparison_expr()?;
        while self.match_any(&[TokenKind::EqEq, TokenKind::BangEq]) {
            let op = self.prev_token();
            let right = self.comparison_expr()?;
            expr = self.binary(expr, op, right);
        }
        Ok(expr)
    }

    fn comparison_expr(&mut self) -> PResult<ExprId> {
        let mut expr = self.term_expr()?;
        while self.match_any(&[TokenKind::Lt, TokenKind::Le, TokenKind::Gt, TokenKind::Ge]) {
            let op = self.prev_token();
            let right = self.term_expr()?;
            expr = self.binary(expr, op, right);
        }
        Ok(expr)
    }

    fn term_expr(&mut self) -> PResult<ExprId> {
        let mut expr = self.factor_expr()?;
        while self.match_any(&[TokenKind::Plus, TokenKind::Minus]) {
            let op = self.prev_token();
            let right = self.factor_expr()?;
            expr = self.binary(expr, op, right);
        }
        Ok(expr)
    }

    fn factor_expr(&mut self) -> PResult<ExprId> {
        let mut expr = self.power_expr()?;
        while self.match_any(&[TokenKind::Star, TokenKind::Slash, TokenKind::Percent]) {
            let op = self.prev_token();
            let right = self.power_expr()?;
            expr = self.binary(expr, op, right);
        }
        Ok(expr)
    }

    fn power_expr(&mut self) -> PResult<ExprId> {
        let expr = self.unary_expr()?;
        if self.matches(TokenKind::Caret) {
            let op = self.prev_token();
            // Right associative: 2^3^2 is 2^(3^2).
            let right = self.power_expr()?;
            return Ok(self.binary(expr, op, right));
        }
        Ok(expr)
    }

    fn binary(&mut self, left: ExprId, op: Token, right: ExprId) -> ExprId {
        self.ast.add_expr(
            ExprKind::Binary {
                op: op.kind,
                left,
                right,
            },
            op.location,
        )
    }

    fn unary_expr(&mut self) -> PResult<ExprId> {
        if self.match_any(&[TokenKind::Bang, TokenKind::Not, TokenKind::Minus, TokenKind::Amp]) {
            let op = self.prev_token();
            let inner = self.unary_expr()?;
            return Ok(self.ast.add_expr(
                ExprKind::Unary {
                    op: op.kind,
                    inner,
                },
                op.location,
            ));
        }
        if self.matches(TokenKind::Star) {
            let op = self.prev_token();
            let inner = self.unary_expr()?;
            return Ok(self
                .ast
                .add_expr(ExprKind::Dereference { inner }, op.location));
        }
        self.access_expr()
    }

    /// The shared postfix level: calls, member access, indexing and casts,
    /// all left-associative.
    fn access_expr(&mut self) -> PResult<ExprId> {
        let mut expr = self.primary_expr()?;
        loop {
            if self.matches(TokenKind::LeftParen) {
                let paren = self.prev_token();
                self.push_group(TokenKind::RightParen);
                let mut arguments = Vec::new();
                if !self.check(TokenKind::RightParen) {
                    arguments.push(self.expression()?);
                    while self.matches(TokenKind::Comma) {
                        if self.check(TokenKind::RightParen) {
                            break;
                        }
                        arguments.push(self.expression()?);
                        if arguments.len() > 255 {
                            return self.error(
                                ErrorCode::TooManyArgs,
                                "Cannot have more than 255 arguments.",
                            );
                        }
                    }
                }
                self.consume(
                    TokenKind::RightParen,
                    ErrorCode::UnmatchedParenInArgs,
                    "Expected ')' after arguments.",
                )?;
                expr = self.ast.add_expr(
                    ExprKind::Call {
                        callee: expr,
                        arguments,
                    },
                    paren.location,
                );
            } else if self.match_any(&[TokenKind::Dot, TokenKind::Arrow]) {
                let op = self.prev_token();
                let member = self.consume(
                    TokenKind::Ident,
                    ErrorCode::NotAnIdentifier,
                    "Expected identifier after member access.",
                )?;
                expr = self.ast.add_expr(
                    ExprKind::Access {
                        left: expr,
                        op: op.kind,
                        member: PathSegment {
                            name: member.lexeme,
                            location: member.location,
                        },
                        lvalue: false,
                    },
                    op.location,
                );
            } else if self.matches(TokenKind::LeftSquare) {
                let bracket = self.prev_token();
                self.push_group(TokenKind::RightSquare);
                let index = self.expression()?;
                self.consume(
                    TokenKind::RightSquare,
                    ErrorCode::UnmatchedLeftSquare,
                    "Expected ']' after expression.",
                )?;
                expr = self.ast.add_expr(
                    ExprKind::Index {
                        left: expr,
                        index,
                        lvalue: false,
                    },
                    bracket.location,
                );
            } else if self.matches(TokenKind::As) {
                let as_kw = self.prev_token();
                let annotation = self.annotation()?;
                expr = self.ast.add_expr(
                    ExprKind::Cast {
                        inner: expr,
                        annotation,
                    },
                    as_kw.location,
                );
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn primary_expr(&mut self) -> PResult<ExprId> {
        if self.matches(TokenKind::Nil) {
            let token = self.prev_token();
            return Ok(self.ast.add_expr(
                ExprKind::Literal {
                    value: None,
                    kind: TokenKind::Nil,
                },
                token.location,
            ));
        }
        if self.match_any(&[
            TokenKind::Bool,
            TokenKind::Int,
            TokenKind::Float,
            TokenKind::Char,
            TokenKind::Str,
        ]) {
            let token = self.prev_token();
            return Ok(self.ast.add_expr(
                ExprKind::Literal {
                    value: token.literal.clone(),
                    kind: token.kind,
                },
                token.location,
            ));
        }
        if self.matches(TokenKind::Ident) {
            let first = self.prev_token();
            let mut path = vec![PathSegment {
                name: first.lexeme,
                location: first.location,
            }];
            while self.matches(TokenKind::ColonColon) {
                let name = self.consume(
                    TokenKind::Ident,
                    ErrorCode::NotAnIdentifier,
                    "Expected identifier after '::'.",
                )?;
                path.push(PathSegment {
                    name: name.lexeme,
                    location: name.location,
                });
            }
            return Ok(self.ast.add_expr(ExprKind::Identifier { path }, first.location));
        }
        if self.matches(TokenKind::LeftSquare) {
            return self.array_expr();
        }
        if self.matches(TokenKind::LeftParen) {
            return self.tuple_or_grouping_expr();
        }
        if self.check(TokenKind::Colon) {
            return self.object_expr();
        }
        self.error(ErrorCode::NotAnExpression, "Expected expression.")
    }

    /// `[a, b, c]` or the generator form `[expr; N]`.
    fn array_expr(&mut self) -> PResult<ExprId> {
        let bracket = self.prev_token();
        self.push_group(TokenKind::RightSquare);

        if self.matches(TokenKind::RightSquare) {
            return Ok(self
                .ast
                .add_expr(ExprKind::Array { elements: Vec::new() }, bracket.location));
        }

        let first = self.expression()?;
        if self.matches(TokenKind::Semicolon) {
            let size_token = self.consume(
                TokenKind::Int,
                ErrorCode::InvalidArraySize,
                "Expected integer literal as array size.",
            )?;
            let size = match size_token.literal {
                Some(LiteralValue::Int(v)) => v,
                _ => 0,
            };
            self.consume(
                TokenKind::RightSquare,
                ErrorCode::UnmatchedLeftSquare,
                "Expected ']' after array.",
            )?;
            return Ok(self.ast.add_expr(
                ExprKind::ArrayGen {
                    generator: first,
                    size,
                },
                bracket.location,
            ));
        }

        let mut elements = vec![first];
        while self.matches(TokenKind::Comma) {
            if self.check(TokenKind::RightSquare) {
                break;
            }
            elements.push(self.expression()?);
        }
        self.consume(
            TokenKind::RightSquare,
            ErrorCode::UnmatchedLeftSquare,
            "Expected ']' after array.",
        )?;
        Ok(self.ast.add_expr(ExprKind::Array { elements }, bracket.location))
    }

    /// `()` is the empty tuple, `(e)` a grouping, `(e,)` a 1-tuple and
    /// `(a, b)` a tuple; a trailing comma is permitted.
    fn tuple_or_grouping_expr(&mut self) -> PResult<ExprId> {
        let paren = self.prev_token();
        self.push_group(TokenKind::RightParen);

        if self.matches(TokenKind::RightParen) {
            return Ok(self
                .ast
                .add_expr(ExprKind::Tuple { elements: Vec::new() }, paren.location));
        }

        let first = self.expression()?;
        if self.check(TokenKind::Comma) {
            let mut elements = vec![first];
            while self.matches(TokenKind::Comma) {
                if self.check(TokenKind::RightParen) {
                    break;
                }
                elements.push(self.expression()?);
            }
            self.consume(
                TokenKind::RightParen,
                ErrorCode::UnmatchedParenInTuple,
                "Expected ')' after tuple.",
            )?;
            return Ok(self.ast.add_expr(ExprKind::Tuple { elements }, paren.location));
        }
        self.consume(
            TokenKind::RightParen,
            ErrorCode::UnmatchedParenInGrouping,
            "Expected ')' after expression.",
        )?;
        Ok(self.ast.add_expr(ExprKind::Grouping { inner: first }, paren.location))
    }

    /// A struct literal `:Path { field: expr, ... }`.
    fn object_expr(&mut self) -> PResult<ExprId> {
        let colon = self.advance();
        let annotation = self.segmented_annotation()?;
        self.consume(
            TokenKind::LeftBrace,
            ErrorCode::InvalidObjectField,
            "Expected '{' after struct name in object literal.",
        )?;
        self.push_group(TokenKind::RightBrace);

        let mut fields = Vec::new();
        if !self.check(TokenKind::RightBrace) {
            loop {
                let name = self.consume(
                    TokenKind::Ident,
                    ErrorCode::InvalidObjectField,
                    "Expected field name in object literal.",
                )?;
                self.consume(
                    TokenKind::Colon,
                    ErrorCode::InvalidObjectField,
                    "Expected ':' after field name.",
                )?;
                let value = self.expression()?;
                fields.push((
                    PathSegment {
                        name: name.lexeme,
                        location: name.location,
                    },
                    value,
                ));
                if !self.matches(TokenKind::Comma) {
                    break;
                }
                if self.check(TokenKind::RightBrace) {
                    break;
                }
            }
        }
        self.consume(
            TokenKind::RightBrace,
            ErrorCode::UnmatchedBraceInObject,
            "Expected '}' after object literal.",
        )?;
        Ok(self.ast.add_expr(ExprKind::Object { annotation, fields }, colon.location))
    }

    // MARK: Annotations

    /// The annotation grammar: a segmented path, tuple or `fun` type,
    /// followed by any number of `*` and `[...]` suffixes.
    fn annotation(&mut self) -> PResult<Annotation> {
        let mut annotation = if self.matches(TokenKind::Fun) {
            self.function_annotation()?
        } else if self.matches(TokenKind::LeftParen) {
            self.tuple_annotation()?
        } else {
            self.segmented_annotation()?
        };

        loop {
            if self.matches(TokenKind::Star) {
                let location = annotation.location;
                annotation = Annotation::new(
                    AnnotationKind::Pointer {
                        inner: Box::new(annotation),
                        mutable: true,
                    },
                    location,
                );
            } else if self.matches(TokenKind::LeftSquare) {
                self.push_group(TokenKind::RightSquare);
                let size = if self.matches(TokenKind::Star) {
                    None
                } else if self.check(TokenKind::Int) {
                    let token = self.advance();
                    match token.literal {
                        Some(LiteralValue::Int(v)) => Some(v),
                        _ => None,
                    }
                } else {
                    None
                };
                self.consume(
                    TokenKind::RightSquare,
                    ErrorCode::InvalidTypeAnnotation,
                    "Expected ']' in array type annotation.",
                )?;
                let location = annotation.location;
                annotation = Annotation::new(
                    AnnotationKind::Array {
                        inner: Box::new(annotation),
                        size,
                    },
                    location,
                );
            } else {
                break;
            }
        }
        Ok(annotation)
    }

    fn function_annotation(&mut self) -> PResult<Annotation> {
        let fun_kw = self.prev_token();
        self.consume(
            TokenKind::LeftParen,
            ErrorCode::InvalidTypeAnnotation,
            "Expected '(' in function type annotation.",
        )?;
        self.push_group(TokenKind::RightParen);

        let mut params = Vec::new();
        let mut variadic = false;
        if !self.check(TokenKind::RightParen) {
            loop {
                if self.matches(TokenKind::TripleDot) {
                    variadic = true;
                    break;
                }
                let mutable = self.matches(TokenKind::Var);
                params.push((mutable, self.annotation()?));
                if !self.matches(TokenKind::Comma) {
                    break;
                }
                if self.check(TokenKind::RightParen) {
                    break;
                }
            }
        }
        self.consume(
            TokenKind::RightParen,
            ErrorCode::InvalidTypeAnnotation,
            "Expected ')' in function type annotation.",
        )?;
        self.consume(
            TokenKind::DoubleArrow,
            ErrorCode::InvalidTypeAnnotation,
            "Expected '=>' after function parameter types.",
        )?;
        let ret_mutable = self.matches(TokenKind::Var);
        let ret = self.annotation()?;
        Ok(Annotation::new(
            AnnotationKind::Function {
                params,
                ret: Box::new(ret),
                ret_mutable,
                variadic,
            },
            fun_kw.location,
        ))
    }

    fn tuple_annotation(&mut self) -> PResult<Annotation> {
        let paren = self.prev_token();
        self.push_group(TokenKind::RightParen);
        let mut elements = Vec::new();
        if !self.check(TokenKind::RightParen) {
            loop {
                elements.push(self.annotation()?);
                if !self.matches(TokenKind::Comma) {
                    break;
                }
                if self.check(TokenKind::RightParen) {
                    break;
                }
            }
        }
        self.consume(
            TokenKind::RightParen,
            ErrorCode::InvalidTypeAnnotation,
            "Expected ')' in tuple type annotation.",
        )?;
        Ok(Annotation::new(AnnotationKind::Tuple(elements), paren.location))
    }

    fn segmented_annotation(&mut self) -> PResult<Annotation> {
        let first = self.consume(
            TokenKind::Ident,
            ErrorCode::InvalidTypeAnnotation,
            "Invalid type annotation.",
        )?;
        let mut segments = vec![ClassSegment {
            name: first.lexeme,
            type_args: self.type_args()?,
        }];
        while self.matches(TokenKind::ColonColon) {
            let name = self.consume(
                TokenKind::Ident,
                ErrorCode::NotAnIdentifier,
                "Expected identifier after '::'.",
            )?;
            segments.push(ClassSegment {
                name: name.lexeme,
                type_args: self.type_args()?,
            });
        }
        Ok(Annotation::new(
            AnnotationKind::Segmented(segments),
            first.location,
        ))
    }

    /// Type-argument syntax is parsed and carried through, but has no
    /// semantics yet.
    fn type_args(&mut self) -> PResult<Vec<Annotation>> {
        let mut args = Vec::new();
        if self.matches(TokenKind::Lt) {
            loop {
                args.push(self.annotation()?);
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
            self.consume(
                TokenKind::Gt,
                ErrorCode::InvalidTypeAnnotation,
                "Expected '>' after type arguments.",
            )?;
        }
        Ok(args)
    }
}
