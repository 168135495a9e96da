//! Second checking pass: walks function bodies, infers and records the
//! type of every expression, enforces l-value and mutability rules, and
//! resolves the declarations the global pass deferred.
//!
//! Resilience is per top-level item: the first error inside a function
//! aborts checking of that function only, which also means at most one
//! diagnostic per broken function body.

use std::mem;

use crate::checker::env::{EnvError, Environment};
use crate::checker::types::Type;
use crate::checker::TypeException;
use crate::diagnostics::{DiagnosticSink, ErrorCode};
use crate::lexer::{LiteralValue, TokenKind};
use crate::parser::ast::{
    Ast, DeclId, DeclKind, Declarer, ExprId, ExprKind, LoopKind, StmtId, StmtKind,
};
use crate::source::Location;

type CheckResult<T> = Result<T, TypeException>;

pub struct LocalChecker<'a> {
    env: &'a mut Environment,
    ast: &'a mut Ast,
    sink: &'a mut DiagnosticSink,
    loop_depth: usize,
    /// The value type and location of every `return` in the function
    /// currently being checked.
    fn_returns: Vec<(Type, Location)>,
}

impl<'a> LocalChecker<'a> {
    pub fn new(env: &'a mut Environment, ast: &'a mut Ast, sink: &'a mut DiagnosticSink) -> Self {
        Self {
            env,
            ast,
            sink,
            loop_depth: 0,
            fn_returns: Vec::new(),
        }
    }

    pub fn check(&mut self, statements: &[StmtId]) {
        for &stmt in statements {
            let _ = self.check_top_level(stmt);
        }
    }

    fn check_top_level(&mut self, stmt: StmtId) -> CheckResult<()> {
        let StmtKind::Declaration(decl) = &self.ast.stmt(stmt).kind else {
            // Non-declarations at global scope were already rejected by
            // the global pass.
            return Ok(());
        };
        self.check_top_level_decl(*decl)
    }

    fn check_top_level_decl(&mut self, decl_id: DeclId) -> CheckResult<()> {
        match &self.ast.decl(decl_id).kind {
            DeclKind::Var { .. } => self.check_var_decl(decl_id, false),
            DeclKind::Fun { .. } => self.check_function(decl_id),
            DeclKind::ExternFun => {
                self.resolve_decl_type(decl_id)?;
                Ok(())
            }
            DeclKind::Struct { .. } => self.check_struct_body(decl_id),
            DeclKind::Namespace { .. } => self.check_namespace_body(decl_id),
        }
    }

    fn error<T>(&mut self, location: Location, code: ErrorCode, message: impl Into<String>) -> CheckResult<T> {
        self.sink.error(location, code, message);
        Err(TypeException)
    }

    fn env_error<T>(&mut self, e: EnvError) -> CheckResult<T> {
        self.sink.error(e.location, e.code, e.message);
        if let Some(previous) = e.previous {
            if let Some(loc) = self.env.node(previous).location() {
                self.sink.note(loc, "Previous declaration was here.");
            }
        }
        Err(TypeException)
    }

    /// The resolved type of a declaration, resolving its annotation on
    /// first demand (this is where deferred global symbols pick up their
    /// types). `auto` resolves to a blank without being recorded.
    fn resolve_decl_type(&mut self, decl_id: DeclId) -> CheckResult<Type> {
        if let Some(ty) = self.env.decl_type(decl_id) {
            return Ok(ty.clone());
        }
        let Some(annotation) = self.ast.decl(decl_id).annotation.clone() else {
            let location = self.ast.decl(decl_id).location;
            return self.error(location, ErrorCode::Impossible, "Declaration has no type annotation.");
        };
        match self.env.get_type(&annotation) {
            Ok(ty) => {
                if !ty.is_blank() {
                    self.env.set_decl_type(decl_id, ty.clone());
                }
                Ok(ty)
            }
            Err(e) => self.env_error(e),
        }
    }

    // MARK: Declarations

    /// Shared checking for variable declarations. With `declare` set the
    /// binding is added to the current (local) scope; global variables
    /// already have their node from the first pass.
    fn check_var_decl(&mut self, decl_id: DeclId, declare: bool) -> CheckResult<()> {
        let decl = self.ast.decl(decl_id);
        let location = decl.location;
        let declarer = decl.declarer();
        let DeclKind::Var { initializer, .. } = decl.kind.clone() else {
            return self.error(location, ErrorCode::Impossible, "Expected a variable declaration.");
        };

        let mut declared = self.resolve_decl_type(decl_id)?;

        match initializer {
            Some(init) => {
                let mut init_ty = self.type_expr(init)?;
                if !Type::are_compatible(&mut declared, &mut init_ty) {
                    if declared.is_blank()
                        && matches!(&init_ty, Type::Array { inner, .. } if inner.is_blank())
                    {
                        return self.error(
                            location,
                            ErrorCode::IndeterminateArrayType,
                            "Cannot infer the element type of an empty array.",
                        );
                    }
                    return self.error(
                        location,
                        ErrorCode::IncompatibleTypes,
                        format!("Expected type '{declared}' but initializer has type '{init_ty}'."),
                    );
                }
                self.ast.expr_mut(init).ty = Some(init_ty.clone());

                if let (
                    Type::Array { size: declared_size, .. },
                    Type::Array { size: init_size, .. },
                ) = (&mut declared, &init_ty)
                {
                    if *declared_size < 0 {
                        *declared_size = *init_size;
                    } else if *init_size >= 0 && *declared_size != *init_size {
                        return self.error(
                            location,
                            ErrorCode::ArraySizeUnknown,
                            "Array initializer size does not match the annotation.",
                        );
                    }
                }
            }
            None => {
                if declarer == Declarer::Const {
                    return self.error(
                        location,
                        ErrorCode::UninitializedConst,
                        "A constant must be initialized.",
                    );
                }
                if declared.is_blank() {
                    return self.error(
                        location,
                        ErrorCode::AutoWithoutInitializer,
                        "A variable without a type annotation must be initialized.",
                    );
                }
                if let Type::Array { size, .. } = &declared {
                    let (code, message) = if *size >= 0 {
                        (
                            ErrorCode::SizedArrayWithoutInitializer,
                            "An array declaration must be initialized.",
                        )
                    } else {
                        (
                            ErrorCode::ArraySizeUnknown,
                            "The size of this array cannot be determined.",
                        )
                    };
                    return self.error(location, code, message);
                }
            }
        }

        self.env.set_decl_type(decl_id, declared);
        if declare {
            if let Err(e) = self.env.declare_variable(self.ast, decl_id, false) {
                return self.env_error(e);
            }
        }
        Ok(())
    }

    fn check_function(&mut self, decl_id: DeclId) -> CheckResult<()> {
        let fn_ty = self.resolve_decl_type(decl_id)?;
        let location = self.ast.decl(decl_id).location;
        let Type::Function {
            params: param_types,
            return_type,
            ..
        } = fn_ty
        else {
            return self.error(location, ErrorCode::Impossible, "Function declaration has a non-function type.");
        };
        let DeclKind::Fun {
            parameters,
            return_var,
            body,
        } = self.ast.decl(decl_id).kind.clone()
        else {
            return self.error(location, ErrorCode::Impossible, "Expected a function declaration.");
        };

        let return_type = *return_type;
        self.env.increase_local_scope();

        let mut result = self.declare_function_frame(&parameters, &param_types, return_var, &return_type);

        // Body in its own nested scope.
        let saved_returns = mem::take(&mut self.fn_returns);
        let saved_depth = mem::replace(&mut self.loop_depth, 0);
        if result.is_ok() {
            self.env.increase_local_scope();
            for &stmt in &body {
                if let Err(e) = self.check_stmt(stmt) {
                    result = Err(e);
                    break;
                }
            }
            if result.is_ok() {
                result = self.check_function_returns(&return_type, location);
            }
            let _ = self.env.exit();
        }
        self.fn_returns = saved_returns;
        self.loop_depth = saved_depth;
        let _ = self.env.exit();
        result
    }

    fn declare_function_frame(
        &mut self,
        parameters: &[DeclId],
        param_types: &[(Declarer, Type)],
        return_var: DeclId,
        return_type: &Type,
    ) -> CheckResult<()> {
        if !return_type.is_void() {
            self.env.set_decl_type(return_var, return_type.clone());
            if let Err(e) = self.env.declare_variable(self.ast, return_var, false) {
                return self.env_error(e);
            }
        }

        for (param, (_, param_ty)) in parameters.iter().zip(param_types) {
            let param_location = self.ast.decl(*param).location;
            if param_ty.is_blank() {
                return self.error(
                    param_location,
                    ErrorCode::AutoWithoutInitializer,
                    "A parameter must have a type annotation.",
                );
            }
            self.env.set_decl_type(*param, param_ty.clone());
            if let Err(e) = self.env.declare_variable(self.ast, *param, false) {
                if e.code == ErrorCode::SymbolAlreadyDeclared {
                    return self.error(
                        e.location,
                        ErrorCode::DuplicateParamName,
                        "Duplicate parameter name.",
                    );
                }
                return self.env_error(e);
            }
        }
        Ok(())
    }

    /// End-of-function return analysis: every recorded return type must
    /// unify with the declared return type, and a non-void function must
    /// return at least once.
    fn check_function_returns(&mut self, return_type: &Type, location: Location) -> CheckResult<()> {
        if self.fn_returns.is_empty() {
            if !return_type.is_void() {
                self.sink.error(
                    location,
                    ErrorCode::NoReturnInNonVoidFun,
                    "This function must return a value.",
                );
            }
            return Ok(());
        }
        let returns = mem::take(&mut self.fn_returns);
        for (ty, return_location) in &returns {
            let mut expected = return_type.clone();
            let mut actual = ty.clone();
            if !Type::are_compatible(&mut expected, &mut actual) {
                let result = self.error(
                    *return_location,
                    ErrorCode::ReturnIncompatible,
                    format!("Expected return type '{expected}' but found '{actual}'."),
                );
                self.fn_returns = returns;
                return result;
            }
        }
        self.fn_returns = returns;
        Ok(())
    }

    fn check_struct_body(&mut self, decl_id: DeclId) -> CheckResult<()> {
        let decl = self.ast.decl(decl_id);
        let name = decl.name.clone();
        let location = decl.location;
        let DeclKind::Struct { declarations } = decl.kind.clone() else {
            return self.error(location, ErrorCode::Impossible, "Expected a struct declaration.");
        };

        if self.env.enter(&name).is_err() {
            // The struct never made it into the tree (duplicate name);
            // the global pass already reported it.
            return Err(TypeException);
        }
        for member in declarations {
            match &self.ast.decl(member).kind {
                DeclKind::Var { .. } => {
                    let _ = self.check_member_var(member);
                }
                DeclKind::Fun { .. } => {
                    let _ = self.check_function(member);
                }
                DeclKind::Struct { .. } => {
                    let _ = self.check_struct_body(member);
                }
                _ => {}
            }
        }
        let _ = self.env.exit();
        Ok(())
    }

    /// An instance member: resolve its type and unify it with the default
    /// initializer when one is present.
    fn check_member_var(&mut self, decl_id: DeclId) -> CheckResult<()> {
        let decl = self.ast.decl(decl_id);
        let location = decl.location;
        let DeclKind::Var { initializer, .. } = decl.kind.clone() else {
            return self.error(location, ErrorCode::Impossible, "Expected a member declaration.");
        };

        let mut member_ty = self.resolve_decl_type(decl_id)?;
        if let Some(init) = initializer {
            let mut init_ty = self.type_expr(init)?;
            if !Type::are_compatible(&mut member_ty, &mut init_ty) {
                return self.error(
                    location,
                    ErrorCode::IncompatibleTypes,
                    format!("Expected type '{member_ty}' but default value has type '{init_ty}'."),
                );
            }
        } else if member_ty.is_blank() {
            return self.error(
                location,
                ErrorCode::AutoWithoutInitializer,
                "A member without a type annotation must have a default value.",
            );
        }
        self.env.set_decl_type(decl_id, member_ty);
        Ok(())
    }

    fn check_namespace_body(&mut self, decl_id: DeclId) -> CheckResult<()> {
        let decl = self.ast.decl(decl_id);
        let name = decl.name.clone();
        let DeclKind::Namespace { declarations } = decl.kind.clone() else {
            return Err(TypeException);
        };
        if self.env.enter(&name).is_err() {
            return Err(TypeException);
        }
        for member in declarations {
            let _ = self.check_top_level_decl(member);
        }
        let _ = self.env.exit();
        Ok(())
    }

    // MARK: Statements

    /// Check one statement. The returned type is the statement's definite
    /// return type: `Some` when every path through it returns.
    fn check_stmt(&mut self, stmt: StmtId) -> CheckResult<Option<Type>> {
        let location = self.ast.stmt(stmt).location;
        match self.ast.stmt(stmt).kind.clone() {
            StmtKind::Declaration(decl) => {
                match &self.ast.decl(decl).kind {
                    DeclKind::Var { .. } => self.check_var_decl(decl, true)?,
                    DeclKind::Fun { .. } => {
                        return self.error(
                            location,
                            ErrorCode::Unimplemented,
                            "Nested functions are not supported.",
                        )
                    }
                    DeclKind::ExternFun => {
                        return self.error(
                            location,
                            ErrorCode::ExternInLocalScope,
                            "External functions cannot be declared in local scopes.",
                        )
                    }
                    DeclKind::Struct { .. } => {
                        return self.error(
                            location,
                            ErrorCode::StructInLocalScope,
                            "Structs cannot be declared in local scopes.",
                        )
                    }
                    DeclKind::Namespace { .. } => {
                        return self.error(
                            location,
                            ErrorCode::NamespaceInLocalScope,
                            "Namespaces cannot be declared in local scopes.",
                        )
                    }
                }
                Ok(None)
            }
            StmtKind::Expression(expr) => {
                self.type_expr(expr)?;
                Ok(None)
            }
            StmtKind::Block(stmts) => self.check_block(&stmts),
            StmtKind::Conditional {
                condition,
                then_branch,
                else_branch,
            } => self.check_conditional(condition, then_branch, else_branch, location),
            StmtKind::Loop { kind, body } => self.check_loop(&kind, body),
            StmtKind::Return { value } => {
                let ty = match value {
                    Some(value) => self.type_expr(value)?,
                    None => self.env.primitive_type("void"),
                };
                self.fn_returns.push((ty.clone(), location));
                Ok(Some(ty))
            }
            StmtKind::Break => {
                if self.loop_depth == 0 {
                    self.sink.warning(
                        location,
                        ErrorCode::BreakOutsideLoop,
                        "'break' outside of a loop has no effect.",
                    );
                }
                Ok(None)
            }
            StmtKind::Continue => {
                if self.loop_depth == 0 {
                    self.sink.warning(
                        location,
                        ErrorCode::ContinueOutsideLoop,
                        "'continue' outside of a loop has no effect.",
                    );
                }
                Ok(None)
            }
            StmtKind::EndOfFile => Ok(None),
        }
    }

    fn check_block(&mut self, stmts: &[StmtId]) -> CheckResult<Option<Type>> {
        self.env.increase_local_scope();
        let mut definite = None;
        let mut failure = None;
        for &stmt in stmts {
            match self.check_stmt(stmt) {
                Ok(Some(ty)) if definite.is_none() => definite = Some(ty),
                Ok(_) => {}
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        let _ = self.env.exit();
        match failure {
            Some(e) => Err(e),
            None => Ok(definite),
        }
    }

    fn check_branch(&mut self, stmt: StmtId) -> CheckResult<Option<Type>> {
        self.env.increase_local_scope();
        let result = self.check_stmt(stmt);
        let _ = self.env.exit();
        result
    }

    fn check_conditional(
        &mut self,
        condition: ExprId,
        then_branch: StmtId,
        else_branch: Option<StmtId>,
        location: Location,
    ) -> CheckResult<Option<Type>> {
        let condition_location = self.ast.expr(condition).location;
        let condition_ty = self.type_expr(condition)?;
        if !condition_ty.is_bool() {
            return self.error(
                condition_location,
                ErrorCode::ConditionalWithoutBool,
                "The condition of an 'if' statement must be a bool.",
            );
        }

        let then_ty = self.check_branch(then_branch)?;
        let else_ty = match else_branch {
            Some(else_branch) => self.check_branch(else_branch)?,
            None => None,
        };

        if let (Some(then_ty), Some(else_ty)) = (&then_ty, &else_ty) {
            let mut a = then_ty.clone();
            let mut b = else_ty.clone();
            if !Type::are_compatible(&mut a, &mut b) {
                return self.error(
                    location,
                    ErrorCode::InconsistentReturnTypes,
                    format!("The branches of this 'if' return '{a}' and '{b}'."),
                );
            }
            return Ok(Some(a));
        }
        Ok(None)
    }

    fn check_loop(&mut self, kind: &LoopKind, body: StmtId) -> CheckResult<Option<Type>> {
        match kind {
            LoopKind::While { condition } => {
                let condition_location = self.ast.expr(*condition).location;
                let condition_ty = self.type_expr(*condition)?;
                if !condition_ty.is_bool() {
                    return self.error(
                        condition_location,
                        ErrorCode::ConditionalWithoutBool,
                        "The condition of a 'while' loop must be a bool.",
                    );
                }
                self.check_loop_body(body, None)
            }
            LoopKind::Infinite => self.check_loop_body(body, None),
            LoopKind::ForRange {
                binding,
                start,
                end,
                ..
            } => {
                let start_location = self.ast.expr(*start).location;
                let mut start_ty = self.type_expr(*start)?;
                let mut end_ty = self.type_expr(*end)?;
                if !start_ty.is_int() || !end_ty.is_int() {
                    return self.error(
                        start_location,
                        ErrorCode::IncompatibleTypes,
                        "Range endpoints must be integers.",
                    );
                }
                if !Type::are_compatible(&mut start_ty, &mut end_ty) {
                    return self.error(
                        start_location,
                        ErrorCode::IncompatibleTypes,
                        format!("Range endpoints have types '{start_ty}' and '{end_ty}'."),
                    );
                }
                self.check_loop_body(body, Some((*binding, start_ty)))
            }
        }
    }

    fn check_loop_body(
        &mut self,
        body: StmtId,
        binding: Option<(DeclId, Type)>,
    ) -> CheckResult<Option<Type>> {
        self.env.increase_local_scope();
        let mut result = Ok(None);
        if let Some((binding, ty)) = binding {
            self.env.set_decl_type(binding, ty);
            if let Err(e) = self.env.declare_variable(self.ast, binding, false) {
                result = self.env_error(e);
            }
        }
        if result.is_ok() {
            self.loop_depth += 1;
            result = self.check_stmt(body).map(|_| None);
            self.loop_depth -= 1;
        }
        let _ = self.env.exit();
        result
    }

    // MARK: Expressions

    /// Type one expression, recording the result in its `type` slot.
    fn type_expr(&mut self, id: ExprId) -> CheckResult<Type> {
        let location = self.ast.expr(id).location;
        let kind = self.ast.expr(id).kind.clone();
        let ty = match kind {
            ExprKind::Literal { value, kind } => self.type_literal(&value, kind),
            ExprKind::Identifier { path } => self.type_identifier(&path, location)?,
            ExprKind::Grouping { inner } => self.type_expr(inner)?,
            ExprKind::Unary { op, inner } => self.type_unary(op, inner, location)?,
            ExprKind::Dereference { inner } => self.type_dereference(inner, location)?,
            ExprKind::Logical { left, right, .. } => self.type_logical(left, right, location)?,
            ExprKind::Binary { op, left, right } => self.type_binary(op, left, right, location)?,
            ExprKind::Assign { op, left, right } => self.type_assign(op, left, right, location)?,
            ExprKind::Call { callee, arguments } => self.type_call(callee, &arguments, location)?,
            ExprKind::Cast { inner, annotation } => self.type_cast(inner, &annotation, location)?,
            ExprKind::Access {
                left, op, member, ..
            } => self.type_access(id, left, op, &member.name, location)?,
            ExprKind::Index { left, index, .. } => self.type_index(id, left, index, location)?,
            ExprKind::Array { elements } => self.type_array(&elements)?,
            ExprKind::ArrayGen { generator, size } => {
                let generator_ty = self.type_expr(generator)?;
                Type::Array {
                    inner: Box::new(generator_ty),
                    size,
                }
            }
            ExprKind::Tuple { elements } => {
                let mut types = Vec::new();
                for element in elements {
                    types.push(self.type_expr(element)?);
                }
                Type::Tuple(types)
            }
            ExprKind::Object { annotation, fields } => self.type_object(&annotation, &fields, location)?,
        };
        self.ast.expr_mut(id).ty = Some(ty.clone());
        Ok(ty)
    }

    fn type_literal(&mut self, value: &Option<LiteralValue>, kind: TokenKind) -> Type {
        match (kind, value) {
            (TokenKind::Int, _) => self.env.primitive_type("i32"),
            (TokenKind::Float, _) => self.env.primitive_type("f64"),
            (TokenKind::Bool, _) => self.env.primitive_type("bool"),
            (TokenKind::Char, _) => self.env.primitive_type("char"),
            (TokenKind::Str, _) => Type::Pointer {
                declarer: Declarer::Var,
                inner: Box::new(self.env.primitive_type("char")),
            },
            // nil: a null pointer whose pointee is inferred from context.
            _ => Type::Pointer {
                declarer: Declarer::Var,
                inner: Box::new(Type::Blank),
            },
        }
    }

    fn type_identifier(&mut self, path: &[crate::parser::ast::PathSegment], location: Location) -> CheckResult<Type> {
        let names: Vec<String> = path.iter().map(|s| s.name.clone()).collect();
        let Some(node) = self.env.get_variable(&names) else {
            return self.error(
                location,
                ErrorCode::UndeclaredSymbol,
                format!("Undeclared symbol '{}'.", names.join("::")),
            );
        };
        let decl = self.env.node(node).as_variable().map(|v| v.decl);
        match decl {
            Some(decl) => self.resolve_decl_type(decl),
            None => self.error(location, ErrorCode::Impossible, "Expected a variable node."),
        }
    }

    fn type_unary(&mut self, op: TokenKind, inner: ExprId, location: Location) -> CheckResult<Type> {
        let inner_ty = self.type_expr(inner)?;
        match op {
            TokenKind::Minus => {
                if !inner_ty.is_numeric() {
                    return self.error(
                        location,
                        ErrorCode::IncompatibleTypes,
                        format!("Operand of unary '-' must be numeric, found '{inner_ty}'."),
                    );
                }
                Ok(inner_ty)
            }
            TokenKind::Bang | TokenKind::Not => {
                if !inner_ty.is_bool() {
                    return self.error(
                        location,
                        ErrorCode::IncompatibleTypes,
                        format!("Operand of '!' must be a bool, found '{inner_ty}'."),
                    );
                }
                Ok(inner_ty)
            }
            TokenKind::Amp => {
                if !self.ast.is_lvalue(inner) {
                    return self.error(
                        location,
                        ErrorCode::AddressOfNonLvalue,
                        "Can only take the address of a variable, member or element.",
                    );
                }
                let declarer = self.lvalue_declarer(inner)?;
                Ok(Type::Pointer {
                    declarer,
                    inner: Box::new(inner_ty),
                })
            }
            _ => self.error(location, ErrorCode::Unreachable, "Unknown unary operator."),
        }
    }

    fn type_dereference(&mut self, inner: ExprId, location: Location) -> CheckResult<Type> {
        let inner_ty = self.type_expr(inner)?;
        match inner_ty {
            Type::Pointer { inner, .. } => Ok(*inner),
            _ => self.error(
                location,
                ErrorCode::DereferenceNonPointer,
                format!("Cannot dereference a value of type '{inner_ty}'."),
            ),
        }
    }

    fn type_logical(&mut self, left: ExprId, right: ExprId, location: Location) -> CheckResult<Type> {
        let left_ty = self.type_expr(left)?;
        let right_ty = self.type_expr(right)?;
        if !left_ty.is_bool() || !right_ty.is_bool() {
            return self.error(
                location,
                ErrorCode::IncompatibleTypes,
                "Operands of a logical operator must be bools.",
            );
        }
        Ok(self.env.primitive_type("bool"))
    }

    fn type_binary(&mut self, op: TokenKind, left: ExprId, right: ExprId, location: Location) -> CheckResult<Type> {
        let mut left_ty = self.type_expr(left)?;
        let mut right_ty = self.type_expr(right)?;

        let compatible = Type::are_compatible(&mut left_ty, &mut right_ty);
        self.ast.expr_mut(left).ty = Some(left_ty.clone());
        self.ast.expr_mut(right).ty = Some(right_ty.clone());

        match op {
            TokenKind::EqEq | TokenKind::BangEq => {
                if !compatible {
                    return self.error(
                        location,
                        ErrorCode::IncompatibleTypes,
                        format!("Cannot compare '{left_ty}' with '{right_ty}'."),
                    );
                }
                Ok(self.env.primitive_type("bool"))
            }
            TokenKind::Lt | TokenKind::Le | TokenKind::Gt | TokenKind::Ge => {
                if !compatible || !left_ty.is_numeric() {
                    return self.error(
                        location,
                        ErrorCode::IncompatibleTypes,
                        format!("Cannot compare '{left_ty}' with '{right_ty}'."),
                    );
                }
                Ok(self.env.primitive_type("bool"))
            }
            TokenKind::Caret => {
                if !left_ty.is_numeric() || !right_ty.is_numeric() {
                    return self.error(
                        location,
                        ErrorCode::IncompatibleTypes,
                        "Operands of '^' must be numeric.",
                    );
                }
                // Exponentiation always promotes to double.
                Ok(self.env.primitive_type("f64"))
            }
            _ => {
                if !compatible || !left_ty.is_numeric() {
                    return self.error(
                        location,
                        ErrorCode::IncompatibleTypes,
                        format!("Cannot apply arithmetic to '{left_ty}' and '{right_ty}'."),
                    );
                }
                Ok(left_ty)
            }
        }
    }

    fn type_assign(&mut self, op: TokenKind, left: ExprId, right: ExprId, location: Location) -> CheckResult<Type> {
        let mut left_ty = self.type_expr(left)?;
        if !self.ast.is_lvalue(left) {
            return self.error(
                location,
                ErrorCode::AssignToNonLvalue,
                "The left side of an assignment must be a variable, member or element.",
            );
        }
        if self.lvalue_declarer(left)? == Declarer::Const {
            return self.error(
                location,
                ErrorCode::AssignToConst,
                "Cannot assign to a constant.",
            );
        }
        let mut right_ty = self.type_expr(right)?;

        match op {
            TokenKind::Eq => {
                if !Type::are_compatible(&mut left_ty, &mut right_ty) {
                    return self.error(
                        location,
                        ErrorCode::IncompatibleTypes,
                        format!("Cannot assign '{right_ty}' to '{left_ty}'."),
                    );
                }
            }
            TokenKind::PlusEq
            | TokenKind::MinusEq
            | TokenKind::StarEq
            | TokenKind::SlashEq
            | TokenKind::PercentEq => {
                if !left_ty.is_numeric()
                    || !right_ty.is_numeric()
                    || !Type::are_compatible(&mut left_ty, &mut right_ty)
                {
                    return self.error(
                        location,
                        ErrorCode::IncompatibleTypes,
                        format!("Cannot apply compound assignment to '{left_ty}' and '{right_ty}'."),
                    );
                }
            }
            TokenKind::CaretEq => {
                // x ^= y stores a double, so x must already be one.
                if !left_ty.is_float() || !right_ty.is_numeric() {
                    return self.error(
                        location,
                        ErrorCode::IncompatibleTypes,
                        "The target of '^=' must be a float.",
                    );
                }
            }
            TokenKind::AmpAmpEq | TokenKind::BarBarEq => {
                if !left_ty.is_bool() || !right_ty.is_bool() {
                    return self.error(
                        location,
                        ErrorCode::IncompatibleTypes,
                        "Operands of a logical compound assignment must be bools.",
                    );
                }
            }
            TokenKind::AmpEq | TokenKind::BarEq => {
                return self.error(
                    location,
                    ErrorCode::Unimplemented,
                    "Bitwise compound assignment is not supported.",
                );
            }
            _ => {
                return self.error(location, ErrorCode::Unreachable, "Unknown assignment operator.");
            }
        }

        self.ast.expr_mut(right).ty = Some(right_ty);
        Ok(left_ty)
    }

    fn type_call(&mut self, callee: ExprId, arguments: &[ExprId], location: Location) -> CheckResult<Type> {
        let callee_ty = self.type_expr(callee)?;
        let Type::Function {
            params,
            return_type,
            variadic,
            ..
        } = callee_ty
        else {
            return self.error(
                location,
                ErrorCode::CallOnNonFun,
                format!("Cannot call a value of type '{callee_ty}'."),
            );
        };

        let arity_ok = if variadic {
            arguments.len() >= params.len()
        } else {
            arguments.len() == params.len()
        };
        if !arity_ok {
            return self.error(
                location,
                ErrorCode::InvalidArity,
                format!(
                    "Expected {} argument(s) but found {}.",
                    params.len(),
                    arguments.len()
                ),
            );
        }

        for (i, &argument) in arguments.iter().enumerate() {
            let argument_location = self.ast.expr(argument).location;
            let mut argument_ty = self.type_expr(argument)?;
            // The variadic tail is unchecked.
            if let Some((_, param_ty)) = params.get(i) {
                let mut param_ty = param_ty.clone();
                if !Type::are_compatible(&mut param_ty, &mut argument_ty) {
                    return self.error(
                        argument_location,
                        ErrorCode::IncompatibleTypes,
                        format!("Expected argument of type '{param_ty}' but found '{argument_ty}'."),
                    );
                }
                self.ast.expr_mut(argument).ty = Some(argument_ty);
            }
        }
        Ok(*return_type)
    }

    fn type_cast(&mut self, inner: ExprId, annotation: &crate::parser::annotation::Annotation, location: Location) -> CheckResult<Type> {
        let inner_ty = self.type_expr(inner)?;
        let target = match self.env.get_type(annotation) {
            Ok(target) => target,
            Err(e) => return self.env_error(e),
        };

        let numeric_to_numeric = inner_ty.is_numeric() && target.is_numeric();
        let to_bool = (inner_ty.is_numeric() || matches!(inner_ty, Type::Pointer { .. }))
            && target.is_bool();
        if !numeric_to_numeric && !to_bool {
            return self.error(
                location,
                ErrorCode::InvalidCast,
                format!("Cannot cast '{inner_ty}' to '{target}'."),
            );
        }
        Ok(target)
    }

    fn type_access(
        &mut self,
        id: ExprId,
        left: ExprId,
        op: TokenKind,
        member: &str,
        location: Location,
    ) -> CheckResult<Type> {
        let left_ty = self.type_expr(left)?;

        let (struct_scope, is_lvalue) = match op {
            TokenKind::Arrow => match &left_ty {
                Type::Pointer { inner, .. } => match inner.as_ref() {
                    Type::Struct { scope, .. } => (*scope, true),
                    _ => {
                        return self.error(
                            location,
                            ErrorCode::AccessOnNonStruct,
                            format!("'->' requires a pointer to a struct, found '{left_ty}'."),
                        )
                    }
                },
                _ => {
                    return self.error(
                        location,
                        ErrorCode::DereferenceNonPointer,
                        format!("'->' requires a pointer, found '{left_ty}'."),
                    )
                }
            },
            _ => match &left_ty {
                Type::Struct { scope, .. } => (*scope, self.ast.is_lvalue(left)),
                _ => {
                    return self.error(
                        location,
                        ErrorCode::AccessOnNonStruct,
                        format!("Member access requires a struct, found '{left_ty}'."),
                    )
                }
            },
        };

        // Instance members first, then static members.
        if let Some(member_decl) = self.env.get_instance_variable(struct_scope, member) {
            let member_ty = self.resolve_decl_type(member_decl)?;
            if is_lvalue {
                if let ExprKind::Access { lvalue, .. } = &mut self.ast.expr_mut(id).kind {
                    *lvalue = true;
                }
            }
            return Ok(member_ty);
        }

        let static_member = self
            .env
            .node(struct_scope)
            .scope()
            .and_then(|s| s.children.get(member))
            .copied();
        if let Some(node) = static_member {
            if let Some(variable) = self.env.node(node).as_variable() {
                let decl = variable.decl;
                return self.resolve_decl_type(decl);
            }
        }

        let struct_name = self.env.node(struct_scope).unique_name().to_string();
        self.error(
            location,
            ErrorCode::InvalidStructMember,
            format!("Struct '{struct_name}' has no member '{member}'."),
        )
    }

    fn type_index(&mut self, id: ExprId, left: ExprId, index: ExprId, location: Location) -> CheckResult<Type> {
        let left_ty = self.type_expr(left)?;
        let result = match &left_ty {
            Type::Tuple(elements) => {
                let literal_index = match &self.ast.expr(index).kind {
                    ExprKind::Literal {
                        value: Some(LiteralValue::Int(i)),
                        ..
                    } => Some(*i),
                    _ => None,
                };
                let Some(i) = literal_index else {
                    return self.error(
                        location,
                        ErrorCode::NoLiteralIndexOnTuple,
                        "A tuple index must be an integer literal.",
                    );
                };
                if i < 0 || i as usize >= elements.len() {
                    return self.error(
                        location,
                        ErrorCode::TupleIndexOutOfRange,
                        format!("Tuple index {i} is out of range for '{left_ty}'."),
                    );
                }
                self.type_expr(index)?;
                elements[i as usize].clone()
            }
            Type::Array { inner, .. } => {
                let index_ty = self.type_expr(index)?;
                if !index_ty.is_int() {
                    return self.error(
                        location,
                        ErrorCode::IncompatibleTypes,
                        format!("An array index must be an integer, found '{index_ty}'."),
                    );
                }
                (**inner).clone()
            }
            _ => {
                return self.error(
                    location,
                    ErrorCode::IncompatibleTypes,
                    format!("A value of type '{left_ty}' cannot be indexed."),
                )
            }
        };

        if self.ast.is_lvalue(left) {
            if let ExprKind::Index { lvalue, .. } = &mut self.ast.expr_mut(id).kind {
                *lvalue = true;
            }
        }
        Ok(result)
    }

    fn type_array(&mut self, elements: &[ExprId]) -> CheckResult<Type> {
        if elements.is_empty() {
            return Ok(Type::Array {
                inner: Box::new(Type::Blank),
                size: 0,
            });
        }
        let mut element_ty = self.type_expr(elements[0])?;
        for &element in &elements[1..] {
            let element_location = self.ast.expr(element).location;
            let mut ty = self.type_expr(element)?;
            if !Type::are_compatible(&mut element_ty, &mut ty) {
                return self.error(
                    element_location,
                    ErrorCode::InconsistentArrayTypes,
                    format!("Array elements have types '{element_ty}' and '{ty}'."),
                );
            }
            self.ast.expr_mut(element).ty = Some(ty);
        }
        self.ast.expr_mut(elements[0]).ty = Some(element_ty.clone());
        Ok(Type::Array {
            inner: Box::new(element_ty),
            size: elements.len() as i64,
        })
    }

    fn type_object(
        &mut self,
        annotation: &crate::parser::annotation::Annotation,
        fields: &[(crate::parser::ast::PathSegment, ExprId)],
        location: Location,
    ) -> CheckResult<Type> {
        let ty = match self.env.get_type(annotation) {
            Ok(ty) => ty,
            Err(e) => return self.env_error(e),
        };
        let Type::Struct { scope, .. } = &ty else {
            return self.error(
                location,
                ErrorCode::AccessOnNonStruct,
                format!("'{annotation}' does not name a struct."),
            );
        };
        let scope = *scope;

        for (field, value) in fields {
            let Some(member_decl) = self.env.get_instance_variable(scope, &field.name) else {
                let struct_name = self.env.node(scope).unique_name().to_string();
                return self.error(
                    field.location,
                    ErrorCode::InvalidStructMember,
                    format!("Struct '{struct_name}' has no member '{}'.", field.name),
                );
            };
            let mut member_ty = self.resolve_decl_type(member_decl)?;
            let mut value_ty = self.type_expr(*value)?;
            if !Type::are_compatible(&mut member_ty, &mut value_ty) {
                return self.error(
                    field.location,
                    ErrorCode::IncompatibleTypes,
                    format!("Expected '{member_ty}' for field '{}' but found '{value_ty}'.", field.name),
                );
            }
            self.ast.expr_mut(*value).ty = Some(value_ty);
        }

        // Absent fields must have defaults.
        let members: Vec<(String, DeclId)> = self
            .env
            .node(scope)
            .as_struct()
            .map(|s| {
                s.instance_members
                    .iter()
                    .map(|(name, decl)| (name.clone(), *decl))
                    .collect()
            })
            .unwrap_or_default();
        for (name, decl) in members {
            if fields.iter().any(|(field, _)| field.name == name) {
                continue;
            }
            let has_default = matches!(
                &self.ast.decl(decl).kind,
                DeclKind::Var {
                    initializer: Some(_),
                    ..
                }
            );
            if !has_default {
                return self.error(
                    location,
                    ErrorCode::MissingFieldInObj,
                    format!("Field '{name}' is missing and has no default value."),
                );
            }
        }
        Ok(ty)
    }

    /// The declarer governing mutability of an l-value expression.
    /// For member accesses, `const` anywhere on the path wins.
    fn lvalue_declarer(&mut self, id: ExprId) -> CheckResult<Declarer> {
        let location = self.ast.expr(id).location;
        match self.ast.expr(id).kind.clone() {
            ExprKind::Identifier { path } => {
                let names: Vec<String> = path.iter().map(|s| s.name.clone()).collect();
                let Some(node) = self.env.get_variable(&names) else {
                    return self.error(location, ErrorCode::UndeclaredSymbol, "Undeclared symbol.");
                };
                let decl = self.env.node(node).as_variable().map(|v| v.decl);
                match decl {
                    Some(decl) => Ok(self.ast.decl(decl).declarer()),
                    None => Ok(Declarer::Const),
                }
            }
            ExprKind::Dereference { inner } => match self.ast.expr(inner).ty.as_ref() {
                Some(Type::Pointer { declarer, .. }) => Ok(*declarer),
                _ => Ok(Declarer::Const),
            },
            ExprKind::Access {
                left, op, member, ..
            } => {
                let left_declarer = if op == TokenKind::Arrow {
                    match self.ast.expr(left).ty.as_ref() {
                        Some(Type::Pointer { declarer, .. }) => *declarer,
                        _ => Declarer::Const,
                    }
                } else {
                    self.lvalue_declarer(left)?
                };
                if left_declarer == Declarer::Const {
                    return Ok(Declarer::Const);
                }
                // The member's own declarer decides from here.
                let scope = match self.ast.expr(left).ty.as_ref() {
                    Some(Type::Struct { scope, .. }) => Some(*scope),
                    Some(Type::Pointer { inner, .. }) => match inner.as_ref() {
                        Type::Struct { scope, .. } => Some(*scope),
                        _ => None,
                    },
                    _ => None,
                };
                let member_decl =
                    scope.and_then(|scope| self.env.get_instance_variable(scope, &member.name));
                match member_decl {
                    Some(decl) => Ok(self.ast.decl(decl).declarer()),
                    None => Ok(Declarer::Const),
                }
            }
            ExprKind::Index { left, .. } => self.lvalue_declarer(left),
            ExprKind::Grouping { inner } => self.lvalue_declarer(inner),
            _ => Ok(Declarer::Const),
        }
    }
}
