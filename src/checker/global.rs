//! First checking pass: declares every top-level symbol into the
//! namespace tree, builds struct scopes, and enforces the restrictions on
//! global space (declarations only, valid `main` signature).
//!
//! Symbols whose written types mention names that are not resolvable yet
//! are declared *deferred*: the binding exists for forward references and
//! its type is filled in by the local pass.

use crate::checker::env::{EnvError, Environment};
use crate::checker::types::Type;
use crate::checker::TypeException;
use crate::diagnostics::{DiagnosticSink, ErrorCode};
use crate::parser::ast::{Ast, DeclId, DeclKind, StmtId, StmtKind};

type CheckResult = Result<(), TypeException>;

pub struct GlobalChecker<'a> {
    env: &'a mut Environment,
    ast: &'a Ast,
    sink: &'a mut DiagnosticSink,
}

impl<'a> GlobalChecker<'a> {
    pub fn new(env: &'a mut Environment, ast: &'a Ast, sink: &'a mut DiagnosticSink) -> Self {
        Self { env, ast, sink }
    }

    /// Check all top-level statements. Resilient per item: a failed
    /// declaration aborts only itself.
    pub fn check(&mut self, statements: &[StmtId]) {
        for &stmt in statements {
            let _ = self.check_stmt(stmt);
        }
    }

    fn check_stmt(&mut self, stmt: StmtId) -> CheckResult {
        let location = self.ast.stmt(stmt).location;
        match &self.ast.stmt(stmt).kind {
            StmtKind::Declaration(decl) => self.check_decl(*decl),
            StmtKind::Expression(_) => self.global_error(
                location,
                ErrorCode::GlobalExpression,
                "Global expression statements are not allowed.",
            ),
            StmtKind::Block(_) => self.global_error(
                location,
                ErrorCode::GlobalBlock,
                "Global block statements are not allowed.",
            ),
            StmtKind::Conditional { .. } => self.global_error(
                location,
                ErrorCode::GlobalConditional,
                "Global conditional statements are not allowed.",
            ),
            StmtKind::Loop { .. } => self.global_error(
                location,
                ErrorCode::GlobalLoop,
                "Global loop statements are not allowed.",
            ),
            StmtKind::Return { .. } => self.global_error(
                location,
                ErrorCode::GlobalReturn,
                "Global return statements are not allowed.",
            ),
            StmtKind::Break => self.global_error(
                location,
                ErrorCode::GlobalBreak,
                "Global break statements are not allowed.",
            ),
            StmtKind::Continue => self.global_error(
                location,
                ErrorCode::GlobalContinue,
                "Global continue statements are not allowed.",
            ),
            StmtKind::EndOfFile => Ok(()),
        }
    }

    fn global_error(
        &mut self,
        location: crate::source::Location,
        code: ErrorCode,
        message: &str,
    ) -> CheckResult {
        self.sink.error(location, code, message);
        Err(TypeException)
    }

    fn check_decl(&mut self, decl_id: DeclId) -> CheckResult {
        match &self.ast.decl(decl_id).kind {
            DeclKind::Var { .. } => {
                self.declare(decl_id)?;
                Ok(())
            }
            DeclKind::Fun { .. } => self.check_fun(decl_id),
            DeclKind::ExternFun => self.check_extern_fun(decl_id),
            DeclKind::Struct { .. } => self.check_struct(decl_id),
            DeclKind::Namespace { .. } => self.check_namespace(decl_id),
        }
    }

    /// Declare a symbol with deferral, reporting conflicts with a note at
    /// the previous declaration.
    fn declare(&mut self, decl_id: DeclId) -> Result<(), TypeException> {
        match self.env.declare_variable(self.ast, decl_id, true) {
            Ok(_) => Ok(()),
            Err(EnvError {
                code,
                location,
                message,
                previous,
            }) => {
                self.sink.error(location, code, message);
                if let Some(previous) = previous {
                    if let Some(loc) = self.env.node(previous).location() {
                        self.sink.note(loc, "Previous declaration was here.");
                    }
                }
                Err(TypeException)
            }
        }
    }

    fn check_fun(&mut self, decl_id: DeclId) -> CheckResult {
        self.declare(decl_id)?;

        let decl = self.ast.decl(decl_id);
        if decl.name == "main" && self.env.current() == crate::checker::env::ROOT {
            self.check_main_signature(decl_id);
        }
        Ok(())
    }

    /// `main` must be declared `fun` with type `fun() => ::i32` or
    /// `fun(::i32, ::char**) => ::i32`. Checked structurally so the
    /// canonical formatting of parameter lists cannot interfere.
    fn check_main_signature(&mut self, decl_id: DeclId) {
        let location = self.ast.decl(decl_id).location;
        let Some(Type::Function {
            params,
            return_type,
            variadic,
            ..
        }) = self.env.decl_type(decl_id)
        else {
            self.sink.error(
                location,
                ErrorCode::InvalidMainSignature,
                "The main function must have the signature 'fun() => i32' or 'fun(i32, char**) => i32'.",
            );
            return;
        };

        let returns_i32 = return_type.to_string() == "::i32";
        let params_ok = match params.len() {
            0 => true,
            2 => {
                params[0].1.to_string() == "::i32" && params[1].1.to_string() == "::char**"
            }
            _ => false,
        };
        if !returns_i32 || !params_ok || *variadic {
            let found = self.env.decl_type(decl_id).map(Type::to_string).unwrap_or_default();
            self.sink.error(
                location,
                ErrorCode::InvalidMainSignature,
                format!(
                    "The main function must have the signature 'fun() => i32' or 'fun(i32, char**) => i32'. Found type: {found}"
                ),
            );
        }
    }

    fn check_extern_fun(&mut self, decl_id: DeclId) -> CheckResult {
        self.declare(decl_id)?;

        let decl = self.ast.decl(decl_id);
        if decl.name == "main" {
            self.sink.error(
                decl.location,
                ErrorCode::InvalidMainSignature,
                "The main function cannot be declared as an external function.",
            );
        }
        Ok(())
    }

    /// Build the struct's scope: `var`/`const` members become ordered
    /// instance members, functions become static children, nested structs
    /// recurse.
    fn check_struct(&mut self, decl_id: DeclId) -> CheckResult {
        let decl = self.ast.decl(decl_id);
        let name = decl.name.clone();
        let location = decl.location;
        let DeclKind::Struct { declarations } = &decl.kind else {
            return Err(TypeException);
        };
        let declarations = declarations.clone();

        let struct_id = match self.env.add_struct(&name, location) {
            Ok(id) => id,
            Err(code) => {
                let message = match code {
                    ErrorCode::StructInLocalScope => "Structs cannot be declared in local scopes.",
                    ErrorCode::StructAlreadyDeclared => {
                        "A struct with the same name has already been declared in this scope."
                    }
                    _ => "Could not declare struct.",
                };
                self.sink.error(location, code, message);
                return Err(TypeException);
            }
        };

        self.env.enter(&name).map_err(|_| TypeException)?;
        for member in declarations {
            let member_decl = self.ast.decl(member);
            match &member_decl.kind {
                DeclKind::Var { .. } => {
                    let member_name = member_decl.name.clone();
                    let member_location = member_decl.location;
                    if let Err(code) = self.env.add_instance_member(struct_id, &member_name, member) {
                        self.sink.error(
                            member_location,
                            code,
                            "A member with the same name has already been declared in this struct.",
                        );
                    }
                }
                DeclKind::Fun { .. } => {
                    let _ = self.check_fun(member);
                }
                DeclKind::Struct { .. } => {
                    let _ = self.check_struct(member);
                }
                _ => {
                    self.sink.error(
                        member_decl.location,
                        ErrorCode::Unimplemented,
                        "Unsupported declaration in struct body.",
                    );
                }
            }
        }
        self.env.exit().map_err(|_| TypeException)?;
        Ok(())
    }

    fn check_namespace(&mut self, decl_id: DeclId) -> CheckResult {
        let decl = self.ast.decl(decl_id);
        let name = decl.name.clone();
        let location = decl.location;
        let DeclKind::Namespace { declarations } = &decl.kind else {
            return Err(TypeException);
        };
        let declarations = declarations.clone();

        if let Err(code) = self.env.add_namespace(&name, location) {
            let message = match code {
                ErrorCode::NamespaceInStruct => "Namespaces cannot be declared inside structs.",
                ErrorCode::NamespaceInLocalScope => "Namespaces cannot be declared in local scopes.",
                ErrorCode::SymbolAlreadyDeclared => {
                    "A symbol with the same name has already been declared in this scope."
                }
                _ => "Could not declare namespace.",
            };
            self.sink.error(location, code, message);
            return Err(TypeException);
        }
        for member in declarations {
            let _ = self.check_decl(member);
        }
        self.env.exit().map_err(|_| TypeException)?;
        Ok(())
    }
}
