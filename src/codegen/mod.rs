//! LLVM code generation over a fully type-checked AST.
//!
//! Three phases, so that forward references never matter: all struct
//! shells are created and then filled, all function prototypes are
//! declared, and only then are bodies emitted.
//!
//! Aggregate values (arrays, tuples, user structs) are represented as
//! pointers to stack storage; scalars are immediate values. Variable
//! slots always hold the storage form, so assigning an aggregate copies
//! it member-for-member via a load/store of the whole storage type.
//!
//! LLVM handles (allocations, prototypes, struct types) live in side
//! tables keyed by namespace-tree node id; the tree itself is not
//! mutated after checking.

pub mod emitter;
pub mod optimizer;

use std::collections::HashMap;

use inkwell::basic_block::BasicBlock;
use inkwell::builder::{Builder, BuilderError};
use inkwell::context::Context;
use inkwell::module::{Linkage, Module};
use inkwell::types::{BasicMetadataTypeEnum, BasicType, BasicTypeEnum, FunctionType, StructType};
use inkwell::values::{BasicMetadataValueEnum, BasicValueEnum, FunctionValue, PointerValue};
use inkwell::{AddressSpace, FloatPredicate, IntPredicate};

use crate::checker::env::Environment;
use crate::checker::node::NodeId;
use crate::checker::types::Type;
use crate::diagnostics::{DiagnosticSink, ErrorCode};
use crate::lexer::{LiteralValue, TokenKind};
use crate::parser::ast::{
    Ast, DeclId, DeclKind, ExprId, ExprKind, LoopKind, StmtId, StmtKind,
};
use crate::source::Location;

/// Raised when emission fails; caught by [`CodeGenerator::generate`].
pub struct CodeGenException;

impl From<BuilderError> for CodeGenException {
    fn from(_: BuilderError) -> Self {
        CodeGenException
    }
}

type GenResult<T> = Result<T, CodeGenException>;

pub struct CodeGenerator<'ctx, 'a> {
    context: &'ctx Context,
    pub module: Module<'ctx>,
    builder: Builder<'ctx>,

    env: &'a mut Environment,
    ast: &'a Ast,
    sink: &'a mut DiagnosticSink,

    /// Lowered struct bodies, keyed by struct scope.
    struct_types: HashMap<NodeId, StructType<'ctx>>,
    /// Function prototypes, keyed by variable node.
    functions: HashMap<NodeId, FunctionValue<'ctx>>,
    /// Memory locations of variables, keyed by variable node.
    allocations: HashMap<NodeId, PointerValue<'ctx>>,

    /// The current function's exit block; `return` branches here.
    exit_block: Option<BasicBlock<'ctx>>,
    /// (continue target, break target) per enclosing loop.
    loop_stack: Vec<(BasicBlock<'ctx>, BasicBlock<'ctx>)>,
}

impl<'ctx, 'a> CodeGenerator<'ctx, 'a> {
    pub fn new(
        context: &'ctx Context,
        env: &'a mut Environment,
        ast: &'a Ast,
        sink: &'a mut DiagnosticSink,
    ) -> Self {
        let module = context.create_module("main");
        let builder = context.create_builder();
        Self {
            context,
            module,
            builder,
            env,
            ast,
            sink,
            struct_types: HashMap::new(),
            functions: HashMap::new(),
            allocations: HashMap::new(),
            exit_block: None,
            loop_stack: Vec::new(),
        }
    }

    /// Emit the whole module. Returns false (with at least one diagnostic
    /// recorded) when generation fails.
    pub fn generate(&mut self, statements: &[StmtId]) -> bool {
        let result = self.generate_inner(statements);
        if result.is_err() && self.sink.error_count() == 0 {
            self.sink.error_global(
                ErrorCode::Unknown,
                "An error occurred during code generation.",
            );
        }
        result.is_ok()
    }

    fn generate_inner(&mut self, statements: &[StmtId]) -> GenResult<()> {
        self.declare_all_structs()?;
        self.declare_all_functions()?;
        for &stmt in statements {
            self.gen_stmt(stmt)?;
        }
        Ok(())
    }

    fn error<T>(&mut self, location: Location, code: ErrorCode, message: impl Into<String>) -> GenResult<T> {
        self.sink.error(location, code, message);
        Err(CodeGenException)
    }

    fn mangle(name: &str) -> String {
        name.replace(':', "_")
    }

    // MARK: Type lowering

    /// The value representation of a type: scalars are immediate,
    /// aggregates and pointers are `ptr`.
    fn basic_type(&self, ty: &Type) -> GenResult<BasicTypeEnum<'ctx>> {
        Ok(match ty {
            Type::Struct { .. } if !ty.is_aggregate() => match ty.to_string().as_str() {
                "::i8" | "::char" => self.context.i8_type().into(),
                "::i16" => self.context.i16_type().into(),
                "::i32" => self.context.i32_type().into(),
                "::i64" => self.context.i64_type().into(),
                "::f32" => self.context.f32_type().into(),
                "::f64" => self.context.f64_type().into(),
                "::bool" => self.context.bool_type().into(),
                _ => return Err(CodeGenException),
            },
            Type::Struct { .. } | Type::Array { .. } | Type::Tuple(_) => {
                self.context.i8_type().ptr_type(AddressSpace::default()).into()
            }
            Type::Pointer { .. } | Type::Function { .. } => {
                self.context.i8_type().ptr_type(AddressSpace::default()).into()
            }
            Type::Blank => return Err(CodeGenException),
        })
    }

    /// The in-memory layout of a type: the actual array/struct type for
    /// aggregates, the scalar type otherwise. Used for allocas, struct
    /// bodies and address computations.
    fn storage_type(&self, ty: &Type) -> GenResult<BasicTypeEnum<'ctx>> {
        Ok(match ty {
            Type::Array { inner, size } => {
                let element = self.storage_type(inner)?;
                element.array_type((*size).max(0) as u32).into()
            }
            Type::Tuple(elements) => {
                let mut types = Vec::new();
                for element in elements {
                    types.push(self.storage_type(element)?);
                }
                self.context.struct_type(&types, false).into()
            }
            Type::Struct { scope, .. } if ty.is_aggregate() => self
                .struct_types
                .get(scope)
                .copied()
                .ok_or(CodeGenException)?
                .into(),
            _ => self.basic_type(ty)?,
        })
    }

    fn function_type(&self, ty: &Type) -> GenResult<FunctionType<'ctx>> {
        let Type::Function {
            params,
            return_type,
            variadic,
            ..
        } = ty
        else {
            return Err(CodeGenException);
        };
        let mut param_types: Vec<BasicMetadataTypeEnum> = Vec::new();
        for (_, param) in params {
            param_types.push(self.basic_type(param)?.into());
        }
        Ok(if return_type.is_void() {
            self.context.void_type().fn_type(&param_types, *variadic)
        } else if return_type.is_aggregate() {
            self.storage_type(return_type)?.fn_type(&param_types, *variadic)
        } else {
            self.basic_type(return_type)?.fn_type(&param_types, *variadic)
        })
    }

    fn const_zero(ty: BasicTypeEnum<'ctx>) -> BasicValueEnum<'ctx> {
        match ty {
            BasicTypeEnum::IntType(t) => t.const_zero().into(),
            BasicTypeEnum::FloatType(t) => t.const_zero().into(),
            BasicTypeEnum::PointerType(t) => t.const_null().into(),
            BasicTypeEnum::StructType(t) => t.const_zero().into(),
            BasicTypeEnum::ArrayType(t) => t.const_zero().into(),
            BasicTypeEnum::VectorType(t) => t.const_zero().into(),
            BasicTypeEnum::ScalableVectorType(t) => t.const_zero().into(),
        }
    }

    // MARK: Preliminary declarations

    /// Create all struct shells first, then fill the bodies, so mutually
    /// recursive member types resolve.
    fn declare_all_structs(&mut self) -> GenResult<()> {
        let scopes = self.env.get_struct_scopes();
        for &scope in &scopes {
            let name = Self::mangle(self.env.node(scope).unique_name());
            let struct_type = self.context.opaque_struct_type(&name);
            self.struct_types.insert(scope, struct_type);
        }
        for &scope in &scopes {
            let members: Vec<DeclId> = self
                .env
                .node(scope)
                .as_struct()
                .map(|s| s.instance_members.values().copied().collect())
                .unwrap_or_default();
            let mut member_types = Vec::new();
            for member in members {
                let ty = self.env.decl_type(member).cloned().ok_or(CodeGenException)?;
                member_types.push(self.storage_type(&ty)?);
            }
            self.struct_types[&scope].set_body(&member_types, false);
        }
        Ok(())
    }

    /// Declare a prototype for every global (and struct-static) function.
    /// Externals keep their source name and external linkage; `main` is
    /// external as the program entry; everything else is internal under
    /// its mangled unique name.
    fn declare_all_functions(&mut self) -> GenResult<()> {
        for node in self.env.get_global_functions(self.ast) {
            let Some(variable) = self.env.node(node).as_variable() else {
                return Err(CodeGenException);
            };
            let decl = self.ast.decl(variable.decl);
            let is_extern = matches!(decl.kind, DeclKind::ExternFun);
            let is_main = decl.name == "main" && variable.unique_name == "::main";
            let unique_name = variable.unique_name.clone();

            let ty = self
                .env
                .decl_type(variable.decl)
                .cloned()
                .ok_or(CodeGenException)?;
            let fn_type = self.function_type(&ty)?;

            let (name, linkage) = if is_extern {
                (decl.name.clone(), Linkage::External)
            } else if is_main {
                ("main".to_string(), Linkage::External)
            } else {
                (Self::mangle(&unique_name), Linkage::Internal)
            };
            let function = self.module.add_function(&name, fn_type, Some(linkage));
            self.functions.insert(node, function);
        }
        Ok(())
    }

    // MARK: Statements

    fn gen_stmt(&mut self, stmt: StmtId) -> GenResult<()> {
        let location = self.ast.stmt(stmt).location;
        match self.ast.stmt(stmt).kind.clone() {
            StmtKind::Declaration(decl) => self.gen_decl(decl),
            StmtKind::Expression(expr) => {
                self.gen_expr(expr)?;
                Ok(())
            }
            StmtKind::Block(stmts) => {
                self.env.increase_local_scope();
                let mut result = Ok(());
                for &inner in &stmts {
                    result = self.gen_stmt(inner);
                    if result.is_err() {
                        break;
                    }
                }
                let _ = self.env.exit();
                result
            }
            StmtKind::Conditional {
                condition,
                then_branch,
                else_branch,
            } => self.gen_conditional(condition, then_branch, else_branch),
            StmtKind::Loop { kind, body } => self.gen_loop(&kind, body),
            StmtKind::Return { value } => self.gen_return(value, location),
            StmtKind::Break => {
                if let Some(&(_, break_target)) = self.loop_stack.last() {
                    self.builder.build_unconditional_branch(break_target)?;
                    self.start_unreachable_block()?;
                }
                Ok(())
            }
            StmtKind::Continue => {
                if let Some(&(continue_target, _)) = self.loop_stack.last() {
                    self.builder.build_unconditional_branch(continue_target)?;
                    self.start_unreachable_block()?;
                }
                Ok(())
            }
            StmtKind::EndOfFile => Ok(()),
        }
    }

    fn gen_decl(&mut self, decl_id: DeclId) -> GenResult<()> {
        match self.ast.decl(decl_id).kind.clone() {
            DeclKind::Var { initializer, .. } => {
                if self.env.in_global_scope() {
                    self.gen_global_var(decl_id, initializer)
                } else {
                    self.gen_local_var(decl_id, initializer)
                }
            }
            DeclKind::Fun { .. } => self.gen_function(decl_id),
            DeclKind::ExternFun => Ok(()),
            DeclKind::Struct { declarations } => {
                let name = self.ast.decl(decl_id).name.clone();
                self.env.enter(&name).map_err(|_| CodeGenException)?;
                for member in declarations {
                    match &self.ast.decl(member).kind {
                        DeclKind::Fun { .. } => self.gen_function(member)?,
                        DeclKind::Struct { .. } => self.gen_decl(member)?,
                        _ => {}
                    }
                }
                self.env.exit().map_err(|_| CodeGenException)?;
                Ok(())
            }
            DeclKind::Namespace { declarations } => {
                let name = self.ast.decl(decl_id).name.clone();
                self.env.enter(&name).map_err(|_| CodeGenException)?;
                let mut result = Ok(());
                for member in declarations {
                    result = self.gen_decl(member);
                    if result.is_err() {
                        break;
                    }
                }
                let _ = self.env.exit();
                result
            }
        }
    }

    /// A global variable: internal linkage, mangled name, and an
    /// initializer that must fold to an LLVM constant.
    fn gen_global_var(&mut self, decl_id: DeclId, initializer: Option<ExprId>) -> GenResult<()> {
        let decl = self.ast.decl(decl_id);
        let name = decl.name.clone();
        let location = decl.location;
        let node = self
            .env
            .get_variable(&[name])
            .ok_or(CodeGenException)?;
        let ty = self.env.decl_type(decl_id).cloned().ok_or(CodeGenException)?;
        let storage = self.storage_type(&ty)?;

        let value = match initializer {
            Some(init) => self.gen_expr_value(init)?,
            None => Self::const_zero(storage),
        };
        if !is_constant(value) {
            return self.error(
                location,
                ErrorCode::NotAConstant,
                "Global variable initializer is not a constant.",
            );
        }

        let unique_name = self.env.node(node).unique_name().to_string();
        let global = self
            .module
            .add_global(storage, Some(AddressSpace::default()), &Self::mangle(&unique_name));
        global.set_linkage(Linkage::Internal);
        global.set_initializer(&value);
        self.allocations.insert(node, global.as_pointer_value());
        Ok(())
    }

    /// A local variable: stack slot at the current position, initialized
    /// from the expression or zeroed.
    fn gen_local_var(&mut self, decl_id: DeclId, initializer: Option<ExprId>) -> GenResult<()> {
        let node = self
            .env
            .declare_variable(self.ast, decl_id, false)
            .map_err(|_| CodeGenException)?;
        let ty = self.env.decl_type(decl_id).cloned().ok_or(CodeGenException)?;
        let storage = self.storage_type(&ty)?;

        let unique_name = self.env.node(node).unique_name().to_string();
        let slot = self.builder.build_alloca(storage, &Self::mangle(&unique_name))?;
        self.allocations.insert(node, slot);

        match initializer {
            Some(init) => {
                let value = self.gen_expr_value(init)?;
                self.store_value(slot, value, &ty)?;
            }
            None => {
                self.builder.build_store(slot, Self::const_zero(storage))?;
            }
        }
        Ok(())
    }

    fn gen_function(&mut self, decl_id: DeclId) -> GenResult<()> {
        let decl = self.ast.decl(decl_id);
        let name = decl.name.clone();
        let DeclKind::Fun {
            parameters,
            return_var,
            body,
        } = decl.kind.clone()
        else {
            return Err(CodeGenException);
        };
        let node = self.env.get_variable(&[name]).ok_or(CodeGenException)?;
        let function = self.functions.get(&node).copied().ok_or(CodeGenException)?;
        let Some(Type::Function { return_type, .. }) = self.env.decl_type(decl_id) else {
            return Err(CodeGenException);
        };
        let return_type = (**return_type).clone();

        self.env.increase_local_scope();
        let entry = self.context.append_basic_block(function, "entry");
        let exit = self.context.append_basic_block(function, "exit");
        self.exit_block = Some(exit);
        self.builder.position_at_end(entry);

        // Return slot.
        let mut return_slot = None;
        if !return_type.is_void() {
            let slot_node = self
                .env
                .declare_variable(self.ast, return_var, false)
                .map_err(|_| CodeGenException)?;
            let storage = self.storage_type(&return_type)?;
            let slot = self.builder.build_alloca(storage, "__return_val__")?;
            self.allocations.insert(slot_node, slot);
            return_slot = Some(slot);
        }

        // Parameters are copied into their own slots immediately.
        for (param, arg) in parameters.iter().zip(function.get_param_iter()) {
            let param_node = self
                .env
                .declare_variable(self.ast, *param, false)
                .map_err(|_| CodeGenException)?;
            let param_ty = self.env.decl_type(*param).cloned().ok_or(CodeGenException)?;
            let storage = self.storage_type(&param_ty)?;
            let slot = self.builder.build_alloca(storage, &self.ast.decl(*param).name)?;
            self.store_value(slot, arg, &param_ty)?;
            self.allocations.insert(param_node, slot);
        }

        self.env.increase_local_scope();
        let mut result = Ok(());
        for &stmt in &body {
            result = self.gen_stmt(stmt);
            if result.is_err() {
                break;
            }
        }

        if result.is_ok() {
            if self.no_terminator() {
                self.builder.build_unconditional_branch(exit)?;
            }
            self.builder.position_at_end(exit);
            match return_slot {
                Some(slot) => {
                    let storage = self.storage_type(&return_type)?;
                    let value = self.builder.build_load(slot, "ret")?;
                    self.builder.build_return(Some(&value))?;
                }
                None => {
                    self.builder.build_return(None)?;
                }
            }
        }

        self.loop_stack.clear();
        self.exit_block = None;
        let _ = self.env.exit();
        let _ = self.env.exit();
        result
    }

    fn gen_conditional(
        &mut self,
        condition: ExprId,
        then_branch: StmtId,
        else_branch: Option<StmtId>,
    ) -> GenResult<()> {
        let condition_value = self.gen_expr_value(condition)?.into_int_value();
        let function = self.current_function()?;

        let then_block = self.context.append_basic_block(function, "if.then");
        let else_block = else_branch.map(|_| self.context.append_basic_block(function, "if.else"));
        let merge_block = self.context.append_basic_block(function, "if.end");

        self.builder.build_conditional_branch(
            condition_value,
            then_block,
            else_block.unwrap_or(merge_block),
        )?;

        self.builder.position_at_end(then_block);
        self.env.increase_local_scope();
        let then_result = self.gen_stmt(then_branch);
        let _ = self.env.exit();
        then_result?;
        if self.no_terminator() {
            self.builder.build_unconditional_branch(merge_block)?;
        }

        if let (Some(else_block), Some(else_branch)) = (else_block, else_branch) {
            self.builder.position_at_end(else_block);
            self.env.increase_local_scope();
            let else_result = self.gen_stmt(else_branch);
            let _ = self.env.exit();
            else_result?;
            if self.no_terminator() {
                self.builder.build_unconditional_branch(merge_block)?;
            }
        }

        self.builder.position_at_end(merge_block);
        Ok(())
    }

    fn gen_loop(&mut self, kind: &LoopKind, body: StmtId) -> GenResult<()> {
        match kind {
            LoopKind::While { condition } => self.gen_while(*condition, body),
            LoopKind::Infinite => self.gen_infinite_loop(body),
            LoopKind::ForRange {
                binding,
                start,
                end,
                inclusive,
            } => self.gen_for_range(*binding, *start, *end, *inclusive, body),
        }
    }

    fn gen_while(&mut self, condition: ExprId, body: StmtId) -> GenResult<()> {
        let function = self.current_function()?;
        let condition_block = self.context.append_basic_block(function, "while.condition");
        let body_block = self.context.append_basic_block(function, "while.body");
        let end_block = self.context.append_basic_block(function, "while.end");

        self.builder.build_unconditional_branch(condition_block)?;

        self.builder.position_at_end(condition_block);
        let condition_value = self.gen_expr_value(condition)?.into_int_value();
        self.builder
            .build_conditional_branch(condition_value, body_block, end_block)?;

        self.builder.position_at_end(body_block);
        self.env.increase_local_scope();
        self.loop_stack.push((condition_block, end_block));
        let result = self.gen_stmt(body);
        self.loop_stack.pop();
        let _ = self.env.exit();
        result?;
        if self.no_terminator() {
            self.builder.build_unconditional_branch(condition_block)?;
        }

        self.builder.position_at_end(end_block);
        Ok(())
    }

    fn gen_infinite_loop(&mut self, body: StmtId) -> GenResult<()> {
        let function = self.current_function()?;
        let body_block = self.context.append_basic_block(function, "loop.body");
        let end_block = self.context.append_basic_block(function, "loop.end");

        self.builder.build_unconditional_branch(body_block)?;
        self.builder.position_at_end(body_block);
        self.env.increase_local_scope();
        self.loop_stack.push((body_block, end_block));
        let result = self.gen_stmt(body);
        self.loop_stack.pop();
        let _ = self.env.exit();
        result?;
        if self.no_terminator() {
            self.builder.build_unconditional_branch(body_block)?;
        }

        self.builder.position_at_end(end_block);
        Ok(())
    }

    fn gen_for_range(
        &mut self,
        binding: DeclId,
        start: ExprId,
        end: ExprId,
        inclusive: bool,
        body: StmtId,
    ) -> GenResult<()> {
        self.env.increase_local_scope();
        let result = self.gen_for_range_inner(binding, start, end, inclusive, body);
        let _ = self.env.exit();
        result
    }

    fn gen_for_range_inner(
        &mut self,
        binding: DeclId,
        start: ExprId,
        end: ExprId,
        inclusive: bool,
        body: StmtId,
    ) -> GenResult<()> {
        let node = self
            .env
            .declare_variable(self.ast, binding, false)
            .map_err(|_| CodeGenException)?;
        let ty = self.env.decl_type(binding).cloned().ok_or(CodeGenException)?;
        let int_type = self.basic_type(&ty)?.into_int_type();

        let slot = self
            .builder
            .build_alloca(int_type, &self.ast.decl(binding).name)?;
        self.allocations.insert(node, slot);
        let start_value = self.gen_expr_value(start)?;
        self.builder.build_store(slot, start_value)?;
        // The end bound is evaluated once, before the loop.
        let end_value = self.gen_expr_value(end)?.into_int_value();

        let function = self.current_function()?;
        let condition_block = self.context.append_basic_block(function, "for.condition");
        let body_block = self.context.append_basic_block(function, "for.body");
        let increment_block = self.context.append_basic_block(function, "for.increment");
        let end_block = self.context.append_basic_block(function, "for.end");

        self.builder.build_unconditional_branch(condition_block)?;

        self.builder.position_at_end(condition_block);
        let current = self.builder.build_load(slot, "for.index")?.into_int_value();
        let predicate = if inclusive { IntPredicate::SLE } else { IntPredicate::SLT };
        let condition = self
            .builder
            .build_int_compare(predicate, current, end_value, "for.cmp")?;
        self.builder
            .build_conditional_branch(condition, body_block, end_block)?;

        self.builder.position_at_end(body_block);
        self.loop_stack.push((increment_block, end_block));
        let result = self.gen_stmt(body);
        self.loop_stack.pop();
        result?;
        if self.no_terminator() {
            self.builder.build_unconditional_branch(increment_block)?;
        }

        self.builder.position_at_end(increment_block);
        let current = self.builder.build_load(slot, "for.index")?.into_int_value();
        let next = self
            .builder
            .build_int_add(current, int_type.const_int(1, true), "for.next")?;
        self.builder.build_store(slot, next)?;
        self.builder.build_unconditional_branch(condition_block)?;

        self.builder.position_at_end(end_block);
        Ok(())
    }

    /// `return e` stores into the return slot and branches to the exit
    /// block; the statements that may follow land in a fresh block that
    /// dead-code elimination removes.
    fn gen_return(&mut self, value: Option<ExprId>, location: Location) -> GenResult<()> {
        if let Some(value) = value {
            let ty = self
                .ast
                .expr(value)
                .ty
                .clone()
                .ok_or(CodeGenException)?;
            let return_value = self.gen_expr_value(value)?;
            let slot_node = self
                .env
                .get_variable(&["__return_val__".to_string()])
                .ok_or(CodeGenException)?;
            let slot = self
                .allocations
                .get(&slot_node)
                .copied()
                .ok_or(CodeGenException)?;
            self.store_value(slot, return_value, &ty)?;
        }

        let Some(exit) = self.exit_block else {
            return self.error(
                location,
                ErrorCode::Impossible,
                "Return statement outside of function.",
            );
        };
        self.builder.build_unconditional_branch(exit)?;
        self.start_unreachable_block()?;
        Ok(())
    }

    /// Statements are allowed after a terminating statement; they are
    /// emitted into a fresh block the optimizer removes.
    fn start_unreachable_block(&mut self) -> GenResult<()> {
        let function = self.current_function()?;
        let block = self.context.append_basic_block(function, "unreachable");
        self.builder.position_at_end(block);
        Ok(())
    }

    fn current_function(&self) -> GenResult<FunctionValue<'ctx>> {
        self.builder
            .get_insert_block()
            .and_then(|b| b.get_parent())
            .ok_or(CodeGenException)
    }

    fn no_terminator(&self) -> bool {
        self.builder
            .get_insert_block()
            .map(|b| b.get_terminator().is_none())
            .unwrap_or(false)
    }

    /// Store a value into a slot holding `ty`. Aggregates are copied by
    /// value: the source pointer is loaded through its storage type first.
    fn store_value(
        &mut self,
        slot: PointerValue<'ctx>,
        value: BasicValueEnum<'ctx>,
        ty: &Type,
    ) -> GenResult<()> {
        if ty.is_aggregate() {
            let storage = self.storage_type(ty)?;
            let loaded = self
                .builder
                .build_load(value.into_pointer_value(), "agg.copy")?;
            self.builder.build_store(slot, loaded)?;
        } else {
            self.builder.build_store(slot, value)?;
        }
        Ok(())
    }

    // MARK: Expressions

    fn gen_expr_value(&mut self, id: ExprId) -> GenResult<BasicValueEnum<'ctx>> {
        match self.gen_expr(id)? {
            Some(value) => Ok(value),
            None => {
                let location = self.ast.expr(id).location;
                self.error(
                    location,
                    ErrorCode::Impossible,
                    "Expression did not produce a value.",
                )
            }
        }
    }

    fn expr_type(&self, id: ExprId) -> GenResult<Type> {
        self.ast.expr(id).ty.clone().ok_or(CodeGenException)
    }

    fn gen_expr(&mut self, id: ExprId) -> GenResult<Option<BasicValueEnum<'ctx>>> {
        let location = self.ast.expr(id).location;
        match self.ast.expr(id).kind.clone() {
            ExprKind::Literal { value, kind } => self.gen_literal(&value, kind).map(Some),
            ExprKind::Identifier { path } => {
                let names: Vec<String> = path.iter().map(|s| s.name.clone()).collect();
                self.gen_identifier(&names).map(Some)
            }
            ExprKind::Grouping { inner } => self.gen_expr(inner),
            ExprKind::Unary { op, inner } => self.gen_unary(op, inner).map(Some),
            ExprKind::Dereference { inner } => self.gen_dereference(id, inner).map(Some),
            ExprKind::Logical { op, left, right } => self.gen_logical(op, left, right).map(Some),
            ExprKind::Binary { op, left, right } => {
                self.gen_binary(op, left, right, location).map(Some)
            }
            ExprKind::Assign { op, left, right } => {
                self.gen_assign(op, left, right, location).map(Some)
            }
            ExprKind::Call { callee, arguments } => self.gen_call(id, callee, &arguments),
            ExprKind::Cast { inner, .. } => self.gen_cast(id, inner, location).map(Some),
            ExprKind::Access { left, op, member, .. } => {
                self.gen_access(id, left, op, &member.name).map(Some)
            }
            ExprKind::Index { left, index, .. } => self.gen_index(id, left, index).map(Some),
            ExprKind::Array { elements } => self.gen_array(id, &elements).map(Some),
            ExprKind::ArrayGen { generator, size } => {
                self.gen_array_gen(id, generator, size).map(Some)
            }
            ExprKind::Tuple { elements } => self.gen_tuple(id, &elements).map(Some),
            ExprKind::Object { fields, .. } => self.gen_object(id, &fields).map(Some),
        }
    }

    fn gen_literal(&mut self, value: &Option<LiteralValue>, kind: TokenKind) -> GenResult<BasicValueEnum<'ctx>> {
        Ok(match (kind, value) {
            (TokenKind::Nil, _) => self
                .context
                .i8_type()
                .ptr_type(AddressSpace::default())
                .const_null()
                .into(),
            (_, Some(LiteralValue::Bool(v))) => self
                .context
                .bool_type()
                .const_int(*v as u64, false)
                .into(),
            (_, Some(LiteralValue::Int(v))) => self
                .context
                .i32_type()
                .const_int(*v as u64, true)
                .into(),
            (_, Some(LiteralValue::Float(v))) => self.context.f64_type().const_float(*v).into(),
            (_, Some(LiteralValue::Char(v))) => self
                .context
                .i8_type()
                .const_int(*v as u64, false)
                .into(),
            (_, Some(LiteralValue::Str(v))) => self
                .builder
                .build_global_string_ptr(v, "str")?
                .as_pointer_value()
                .into(),
            _ => return Err(CodeGenException),
        })
    }

    fn gen_identifier(&mut self, path: &[String]) -> GenResult<BasicValueEnum<'ctx>> {
        let node = self.env.get_variable(path).ok_or(CodeGenException)?;
        let decl = self
            .env
            .node(node)
            .as_variable()
            .map(|v| v.decl)
            .ok_or(CodeGenException)?;
        let ty = self.env.decl_type(decl).cloned().ok_or(CodeGenException)?;

        // Functions are their own address.
        if matches!(ty, Type::Function { .. }) {
            let function = self.functions.get(&node).copied().ok_or(CodeGenException)?;
            return Ok(function.as_global_value().as_pointer_value().into());
        }

        let slot = self.allocations.get(&node).copied().ok_or(CodeGenException)?;
        if ty.is_aggregate() {
            // The slot itself is the aggregate's value representation.
            return Ok(slot.into());
        }
        Ok(self.builder.build_load(slot, "load")?)
    }

    fn gen_unary(&mut self, op: TokenKind, inner: ExprId) -> GenResult<BasicValueEnum<'ctx>> {
        match op {
            TokenKind::Amp => {
                let allocation = self.lvalue_allocation(inner)?;
                Ok(allocation.into())
            }
            TokenKind::Minus => {
                let value = self.gen_expr_value(inner)?;
                Ok(if value.is_float_value() {
                    self.builder.build_float_neg(value.into_float_value(), "neg")?.into()
                } else {
                    self.builder.build_int_neg(value.into_int_value(), "neg")?.into()
                })
            }
            TokenKind::Bang | TokenKind::Not => {
                let value = self.gen_expr_value(inner)?.into_int_value();
                let zero = value.get_type().const_zero();
                Ok(self
                    .builder
                    .build_int_compare(IntPredicate::EQ, value, zero, "not")?
                    .into())
            }
            _ => Err(CodeGenException),
        }
    }

    fn gen_dereference(&mut self, id: ExprId, inner: ExprId) -> GenResult<BasicValueEnum<'ctx>> {
        let pointer = self.gen_expr_value(inner)?.into_pointer_value();
        let pointee = self.expr_type(id)?;
        if pointee.is_aggregate() {
            // A pointer to an aggregate already is the aggregate's value
            // representation.
            return Ok(pointer.into());
        }
        Ok(self
            .builder
            .build_load(pointer, "deref")?)
    }

    fn gen_logical(
        &mut self,
        op: TokenKind,
        left: ExprId,
        right: ExprId,
    ) -> GenResult<BasicValueEnum<'ctx>> {
        let function = self.current_function()?;
        let left_value = self.gen_expr_value(left)?.into_int_value();
        let left_end = self.builder.get_insert_block().ok_or(CodeGenException)?;

        let rhs_block = self.context.append_basic_block(function, "logical.rhs");
        let merge_block = self.context.append_basic_block(function, "logical.end");

        // Short-circuit: `and` skips the right side when false, `or`
        // skips it when true.
        if op == TokenKind::And {
            self.builder
                .build_conditional_branch(left_value, rhs_block, merge_block)?;
        } else {
            self.builder
                .build_conditional_branch(left_value, merge_block, rhs_block)?;
        }

        self.builder.position_at_end(rhs_block);
        let right_value = self.gen_expr_value(right)?.into_int_value();
        let right_end = self.builder.get_insert_block().ok_or(CodeGenException)?;
        self.builder.build_unconditional_branch(merge_block)?;

        self.builder.position_at_end(merge_block);
        let bool_type = self.context.bool_type();
        let phi = self.builder.build_phi(bool_type, "logical")?;
        let short_circuit = bool_type.const_int((op == TokenKind::Or) as u64, false);
        phi.add_incoming(&[(&short_circuit, left_end), (&right_value, right_end)]);
        Ok(phi.as_basic_value())
    }

    fn gen_binary(
        &mut self,
        op: TokenKind,
        left: ExprId,
        right: ExprId,
        location: Location,
    ) -> GenResult<BasicValueEnum<'ctx>> {
        if op == TokenKind::Caret {
            let left_value = self.gen_expr_value(left)?;
            let right_value = self.gen_expr_value(right)?;
            return self.gen_pow(left_value, right_value);
        }

        let left_ty = self.expr_type(left)?;
        let left_value = self.gen_expr_value(left)?;
        let right_value = self.gen_expr_value(right)?;

        if left_ty.is_float() {
            let l = left_value.into_float_value();
            let r = right_value.into_float_value();
            let value: BasicValueEnum = match op {
                TokenKind::Plus => self.builder.build_float_add(l, r, "add")?.into(),
                TokenKind::Minus => self.builder.build_float_sub(l, r, "sub")?.into(),
                TokenKind::Star => self.builder.build_float_mul(l, r, "mul")?.into(),
                TokenKind::Slash => self.builder.build_float_div(l, r, "div")?.into(),
                TokenKind::Percent => self.builder.build_float_rem(l, r, "rem")?.into(),
                TokenKind::EqEq => self
                    .builder
                    .build_float_compare(FloatPredicate::OEQ, l, r, "cmp")?
                    .into(),
                TokenKind::BangEq => self
                    .builder
                    .build_float_compare(FloatPredicate::ONE, l, r, "cmp")?
                    .into(),
                TokenKind::Lt => self
                    .builder
                    .build_float_compare(FloatPredicate::OLT, l, r, "cmp")?
                    .into(),
                TokenKind::Le => self
                    .builder
                    .build_float_compare(FloatPredicate::OLE, l, r, "cmp")?
                    .into(),
                TokenKind::Gt => self
                    .builder
                    .build_float_compare(FloatPredicate::OGT, l, r, "cmp")?
                    .into(),
                TokenKind::Ge => self
                    .builder
                    .build_float_compare(FloatPredicate::OGE, l, r, "cmp")?
                    .into(),
                _ => return self.error(location, ErrorCode::Unreachable, "Unknown float operator."),
            };
            return Ok(value);
        }

        if left_ty.is_int() || left_ty.is_bool() {
            let l = left_value.into_int_value();
            let r = right_value.into_int_value();
            let value: BasicValueEnum = match op {
                TokenKind::Plus => self.builder.build_int_add(l, r, "add")?.into(),
                TokenKind::Minus => self.builder.build_int_sub(l, r, "sub")?.into(),
                TokenKind::Star => self.builder.build_int_mul(l, r, "mul")?.into(),
                TokenKind::Slash => self.builder.build_int_signed_div(l, r, "div")?.into(),
                TokenKind::Percent => self.builder.build_int_signed_rem(l, r, "rem")?.into(),
                TokenKind::EqEq => self
                    .builder
                    .build_int_compare(IntPredicate::EQ, l, r, "cmp")?
                    .into(),
                TokenKind::BangEq => self
                    .builder
                    .build_int_compare(IntPredicate::NE, l, r, "cmp")?
                    .into(),
                TokenKind::Lt => self
                    .builder
                    .build_int_compare(IntPredicate::SLT, l, r, "cmp")?
                    .into(),
                TokenKind::Le => self
                    .builder
                    .build_int_compare(IntPredicate::SLE, l, r, "cmp")?
                    .into(),
                TokenKind::Gt => self
                    .builder
                    .build_int_compare(IntPredicate::SGT, l, r, "cmp")?
                    .into(),
                TokenKind::Ge => self
                    .builder
                    .build_int_compare(IntPredicate::SGE, l, r, "cmp")?
                    .into(),
                _ => return self.error(location, ErrorCode::Unreachable, "Unknown integer operator."),
            };
            return Ok(value);
        }

        if matches!(left_ty, Type::Pointer { .. }) && matches!(op, TokenKind::EqEq | TokenKind::BangEq) {
            let int_type = self.context.i64_type();
            let l = self
                .builder
                .build_ptr_to_int(left_value.into_pointer_value(), int_type, "ptr")?;
            let r = self
                .builder
                .build_ptr_to_int(right_value.into_pointer_value(), int_type, "ptr")?;
            let predicate = if op == TokenKind::EqEq { IntPredicate::EQ } else { IntPredicate::NE };
            return Ok(self.builder.build_int_compare(predicate, l, r, "cmp")?.into());
        }

        self.error(
            location,
            ErrorCode::Unreachable,
            "Code generator could not perform binary operation.",
        )
    }

    /// `^` lowers to a call to the C runtime's `pow`, with integer
    /// operands widened to double.
    fn gen_pow(
        &mut self,
        left: BasicValueEnum<'ctx>,
        right: BasicValueEnum<'ctx>,
    ) -> GenResult<BasicValueEnum<'ctx>> {
        let f64_type = self.context.f64_type();
        let pow = match self.module.get_function("pow") {
            Some(f) => f,
            None => {
                let fn_type = f64_type.fn_type(&[f64_type.into(), f64_type.into()], false);
                self.module.add_function("pow", fn_type, Some(Linkage::External))
            }
        };

        let mut to_double = |value: BasicValueEnum<'ctx>| -> GenResult<BasicValueEnum<'ctx>> {
            Ok(if value.is_int_value() {
                self.builder
                    .build_signed_int_to_float(value.into_int_value(), f64_type, "fp")?
                    .into()
            } else if value.into_float_value().get_type() != f64_type {
                self.builder
                    .build_float_cast(value.into_float_value(), f64_type, "fp")?
                    .into()
            } else {
                value
            })
        };
        let l = to_double(left)?;
        let r = to_double(right)?;

        let call = self.builder.build_call(pow, &[l.into(), r.into()], "pow")?;
        call.try_as_basic_value().left().ok_or(CodeGenException)
    }

    fn gen_assign(
        &mut self,
        op: TokenKind,
        left: ExprId,
        right: ExprId,
        location: Location,
    ) -> GenResult<BasicValueEnum<'ctx>> {
        let allocation = self.lvalue_allocation(left)?;
        let left_ty = self.expr_type(left)?;

        if op == TokenKind::Eq {
            let value = self.gen_expr_value(right)?;
            self.store_value(allocation, value, &left_ty)?;
            return Ok(value);
        }

        let current = self
            .builder
            .build_load(allocation, "current")?;
        let right_value = self.gen_expr_value(right)?;

        let combined: BasicValueEnum = match op {
            TokenKind::CaretEq => self.gen_pow(current, right_value)?,
            TokenKind::AmpAmpEq => self
                .builder
                .build_and(current.into_int_value(), right_value.into_int_value(), "and")?
                .into(),
            TokenKind::BarBarEq => self
                .builder
                .build_or(current.into_int_value(), right_value.into_int_value(), "or")?
                .into(),
            _ if left_ty.is_float() => {
                let l = current.into_float_value();
                let r = right_value.into_float_value();
                match op {
                    TokenKind::PlusEq => self.builder.build_float_add(l, r, "add")?.into(),
                    TokenKind::MinusEq => self.builder.build_float_sub(l, r, "sub")?.into(),
                    TokenKind::StarEq => self.builder.build_float_mul(l, r, "mul")?.into(),
                    TokenKind::SlashEq => self.builder.build_float_div(l, r, "div")?.into(),
                    TokenKind::PercentEq => self.builder.build_float_rem(l, r, "rem")?.into(),
                    _ => return self.error(location, ErrorCode::Unreachable, "Unknown compound operator."),
                }
            }
            _ => {
                let l = current.into_int_value();
                let r = right_value.into_int_value();
                match op {
                    TokenKind::PlusEq => self.builder.build_int_add(l, r, "add")?.into(),
                    TokenKind::MinusEq => self.builder.build_int_sub(l, r, "sub")?.into(),
                    TokenKind::StarEq => self.builder.build_int_mul(l, r, "mul")?.into(),
                    TokenKind::SlashEq => self.builder.build_int_signed_div(l, r, "div")?.into(),
                    TokenKind::PercentEq => self.builder.build_int_signed_rem(l, r, "rem")?.into(),
                    _ => return self.error(location, ErrorCode::Unreachable, "Unknown compound operator."),
                }
            }
        };

        self.builder.build_store(allocation, combined)?;
        Ok(combined)
    }

    fn gen_call(
        &mut self,
        id: ExprId,
        callee: ExprId,
        arguments: &[ExprId],
    ) -> GenResult<Option<BasicValueEnum<'ctx>>> {
        let function = self.resolve_callee(callee)?;

        let mut args: Vec<BasicMetadataValueEnum> = Vec::new();
        for &argument in arguments {
            args.push(self.gen_expr_value(argument)?.into());
        }
        let call = self.builder.build_call(function, &args, "call")?;

        match call.try_as_basic_value().left() {
            Some(value) => {
                let return_ty = self.expr_type(id)?;
                if return_ty.is_aggregate() {
                    // Returned aggregates move into a fresh slot so later
                    // accesses uniformly go through an address.
                    let storage = self.storage_type(&return_ty)?;
                    let slot = self.builder.build_alloca(storage, "ret.agg")?;
                    self.builder.build_store(slot, value)?;
                    return Ok(Some(slot.into()));
                }
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Calls go directly to a declared function; there are no indirect
    /// calls through values yet.
    fn resolve_callee(&mut self, callee: ExprId) -> GenResult<FunctionValue<'ctx>> {
        match self.ast.expr(callee).kind.clone() {
            ExprKind::Identifier { path } => {
                let names: Vec<String> = path.iter().map(|s| s.name.clone()).collect();
                let node = self.env.get_variable(&names).ok_or(CodeGenException)?;
                self.functions.get(&node).copied().ok_or(CodeGenException)
            }
            ExprKind::Access { left, op, member, .. } => {
                let scope = self.struct_scope_of(left, op)?;
                let node = self
                    .env
                    .node(scope)
                    .scope()
                    .and_then(|s| s.children.get(member.name.as_str()))
                    .copied()
                    .ok_or(CodeGenException)?;
                self.functions.get(&node).copied().ok_or(CodeGenException)
            }
            ExprKind::Grouping { inner } => self.resolve_callee(inner),
            _ => {
                let location = self.ast.expr(callee).location;
                self.error(
                    location,
                    ErrorCode::Unimplemented,
                    "Indirect calls through function values are not supported.",
                )
            }
        }
    }

    fn gen_cast(&mut self, id: ExprId, inner: ExprId, location: Location) -> GenResult<BasicValueEnum<'ctx>> {
        let value = self.gen_expr_value(inner)?;
        let from = self.expr_type(inner)?;
        let to = self.expr_type(id)?;

        if from.is_int() && to.is_int() {
            let target = self.basic_type(&to)?.into_int_type();
            return Ok(self
                .builder
                .build_int_cast_sign_flag(value.into_int_value(), target, true, "cast")?
                .into());
        }
        if from.is_float() && to.is_float() {
            let target = self.basic_type(&to)?.into_float_type();
            return Ok(self
                .builder
                .build_float_cast(value.into_float_value(), target, "cast")?
                .into());
        }
        if from.is_int() && to.is_float() {
            let target = self.basic_type(&to)?.into_float_type();
            return Ok(self
                .builder
                .build_signed_int_to_float(value.into_int_value(), target, "cast")?
                .into());
        }
        if from.is_float() && to.is_int() {
            let target = self.basic_type(&to)?.into_int_type();
            return Ok(self
                .builder
                .build_float_to_signed_int(value.into_float_value(), target, "cast")?
                .into());
        }
        if to.is_bool() {
            if value.is_pointer_value() {
                return Ok(self
                    .builder
                    .build_is_not_null(value.into_pointer_value(), "cast")?
                    .into());
            }
            if value.is_float_value() {
                let zero = self.context.f64_type().const_zero();
                return Ok(self
                    .builder
                    .build_float_compare(FloatPredicate::ONE, value.into_float_value(), zero, "cast")?
                    .into());
            }
            let zero = value.into_int_value().get_type().const_zero();
            return Ok(self
                .builder
                .build_int_compare(IntPredicate::NE, value.into_int_value(), zero, "cast")?
                .into());
        }
        self.error(
            location,
            ErrorCode::Unreachable,
            format!("Code generator could not perform cast from '{from}' to '{to}'."),
        )
    }

    /// The struct scope behind an access expression's left side.
    fn struct_scope_of(&mut self, left: ExprId, op: TokenKind) -> GenResult<NodeId> {
        let left_ty = self.expr_type(left)?;
        let scope = match (&left_ty, op) {
            (Type::Pointer { inner, .. }, TokenKind::Arrow) => match inner.as_ref() {
                Type::Struct { scope, .. } => Some(*scope),
                _ => None,
            },
            (Type::Struct { scope, .. }, _) => Some(*scope),
            _ => None,
        };
        scope.ok_or(CodeGenException)
    }

    fn gen_access(
        &mut self,
        id: ExprId,
        left: ExprId,
        op: TokenKind,
        member: &str,
    ) -> GenResult<BasicValueEnum<'ctx>> {
        let scope = self.struct_scope_of(left, op)?;

        // Instance member: both `s.x` and `p->x` produce a pointer to the
        // struct storage on the left, so one GEP path covers them.
        let member_index = self
            .env
            .node(scope)
            .as_struct()
            .and_then(|s| s.instance_members.get_index_of(member));
        if let Some(index) = member_index {
            let base = self.gen_expr_value(left)?.into_pointer_value();
            let struct_type = self
                .struct_types
                .get(&scope)
                .copied()
                .ok_or(CodeGenException)?;
            let member_ptr =
                self.builder
                    .build_struct_gep(base, index as u32, "member")?;
            let member_ty = self.expr_type(id)?;
            if member_ty.is_aggregate() {
                return Ok(member_ptr.into());
            }
            return Ok(self
                .builder
                .build_load(member_ptr, "member.load")?);
        }

        // Static member: currently only functions.
        let node = self
            .env
            .node(scope)
            .scope()
            .and_then(|s| s.children.get(member))
            .copied()
            .ok_or(CodeGenException)?;
        let function = self.functions.get(&node).copied().ok_or(CodeGenException)?;
        Ok(function.as_global_value().as_pointer_value().into())
    }

    fn gen_index(&mut self, id: ExprId, left: ExprId, index: ExprId) -> GenResult<BasicValueEnum<'ctx>> {
        let element_ptr = self.index_pointer(left, index)?;
        let element_ty = self.expr_type(id)?;
        if element_ty.is_aggregate() {
            return Ok(element_ptr.into());
        }
        Ok(self
            .builder
            .build_load(element_ptr, "elem.load")?)
    }

    /// The address of `left[index]` for both arrays and tuples.
    fn index_pointer(&mut self, left: ExprId, index: ExprId) -> GenResult<PointerValue<'ctx>> {
        let left_ty = self.expr_type(left)?;
        match &left_ty {
            Type::Tuple(_) => {
                let base = self.gen_expr_value(left)?.into_pointer_value();
                let storage = self.storage_type(&left_ty)?.into_struct_type();
                let literal = match &self.ast.expr(index).kind {
                    ExprKind::Literal {
                        value: Some(LiteralValue::Int(i)),
                        ..
                    } => *i,
                    _ => return Err(CodeGenException),
                };
                Ok(self
                    .builder
                    .build_struct_gep(base, literal as u32, "tuple.elem")?)
            }
            Type::Array { .. } => {
                let base = self.gen_expr_value(left)?.into_pointer_value();
                let storage = self.storage_type(&left_ty)?.into_array_type();
                let index_value = self.gen_expr_value(index)?.into_int_value();
                let zero = self.context.i32_type().const_zero();
                // SAFETY: the zero index stays within the alloca and the
                // element index was checked to be an integer.
                let ptr = unsafe {
                    self.builder
                        .build_in_bounds_gep(base, &[zero, index_value], "elem")?
                };
                Ok(ptr)
            }
            _ => Err(CodeGenException),
        }
    }

    fn gen_array(&mut self, id: ExprId, elements: &[ExprId]) -> GenResult<BasicValueEnum<'ctx>> {
        let array_ty = self.expr_type(id)?;
        let Type::Array { inner, .. } = &array_ty else {
            return Err(CodeGenException);
        };
        let inner_ty = (**inner).clone();
        let storage = self.storage_type(&array_ty)?.into_array_type();
        let slot = self.builder.build_alloca(storage, "array")?;

        for (i, &element) in elements.iter().enumerate() {
            let value = self.gen_expr_value(element)?;
            let zero = self.context.i32_type().const_zero();
            let index = self.context.i32_type().const_int(i as u64, false);
            // SAFETY: i is within the array length by construction.
            let element_ptr = unsafe {
                self.builder
                    .build_in_bounds_gep(slot, &[zero, index], "array.elem")?
            };
            self.store_value(element_ptr, value, &inner_ty)?;
        }
        Ok(slot.into())
    }

    /// `[e; n]` allocates the array and fills it with a counter loop that
    /// re-evaluates the generator every iteration.
    fn gen_array_gen(&mut self, id: ExprId, generator: ExprId, size: i64) -> GenResult<BasicValueEnum<'ctx>> {
        let array_ty = self.expr_type(id)?;
        let Type::Array { inner, .. } = &array_ty else {
            return Err(CodeGenException);
        };
        let inner_ty = (**inner).clone();
        let storage = self.storage_type(&array_ty)?.into_array_type();
        let slot = self.builder.build_alloca(storage, "array")?;

        let i32_type = self.context.i32_type();
        let counter = self.builder.build_alloca(i32_type, "loop_counter")?;
        self.builder.build_store(counter, i32_type.const_zero())?;

        let function = self.current_function()?;
        let start_block = self.context.append_basic_block(function, "start_arraygen");
        let loop_block = self.context.append_basic_block(function, "loop_arraygen");
        let end_block = self.context.append_basic_block(function, "end_arraygen");
        self.builder.build_unconditional_branch(start_block)?;

        self.builder.position_at_end(start_block);
        let counter_value = self.builder.build_load(counter, "i")?.into_int_value();
        let condition = self.builder.build_int_compare(
            IntPredicate::SLT,
            counter_value,
            i32_type.const_int(size as u64, true),
            "cmp",
        )?;
        self.builder
            .build_conditional_branch(condition, loop_block, end_block)?;

        self.builder.position_at_end(loop_block);
        let index = self.builder.build_load(counter, "i")?.into_int_value();
        let value = self.gen_expr_value(generator)?;
        let zero = i32_type.const_zero();
        // SAFETY: the counter is bounded by the array length.
        let element_ptr = unsafe {
            self.builder
                .build_in_bounds_gep(slot, &[zero, index], "array.elem")?
        };
        self.store_value(element_ptr, value, &inner_ty)?;
        let next = self
            .builder
            .build_int_add(index, i32_type.const_int(1, true), "next")?;
        self.builder.build_store(counter, next)?;
        self.builder.build_unconditional_branch(start_block)?;

        self.builder.position_at_end(end_block);
        Ok(slot.into())
    }

    fn gen_tuple(&mut self, id: ExprId, elements: &[ExprId]) -> GenResult<BasicValueEnum<'ctx>> {
        let tuple_ty = self.expr_type(id)?;
        let Type::Tuple(element_types) = &tuple_ty else {
            return Err(CodeGenException);
        };
        let element_types = element_types.clone();
        // A tuple is an anonymous LLVM struct; members are addressed by
        // index, which is how tuples are accessed anyway.
        let storage = self.storage_type(&tuple_ty)?.into_struct_type();
        let slot = self.builder.build_alloca(storage, "tuple")?;

        for (i, &element) in elements.iter().enumerate() {
            let value = self.gen_expr_value(element)?;
            let member_ptr = self
                .builder
                .build_struct_gep(slot, i as u32, "tuple.elem")?;
            self.store_value(member_ptr, value, &element_types[i])?;
        }
        Ok(slot.into())
    }

    /// An object literal fills a stack slot member by member in the
    /// struct's declared order; omitted fields use the member's default
    /// initializer.
    fn gen_object(
        &mut self,
        id: ExprId,
        fields: &[(crate::parser::ast::PathSegment, ExprId)],
    ) -> GenResult<BasicValueEnum<'ctx>> {
        let object_ty = self.expr_type(id)?;
        let Type::Struct { scope, .. } = &object_ty else {
            return Err(CodeGenException);
        };
        let scope = *scope;
        let storage = self
            .struct_types
            .get(&scope)
            .copied()
            .ok_or(CodeGenException)?;
        let slot = self.builder.build_alloca(storage, "object")?;

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

        for (i, (member_name, member_decl)) in members.iter().enumerate() {
            let expr = fields
                .iter()
                .find(|(field, _)| field.name == *member_name)
                .map(|(_, expr)| *expr)
                .or_else(|| match &self.ast.decl(*member_decl).kind {
                    DeclKind::Var { initializer, .. } => *initializer,
                    _ => None,
                })
                .ok_or(CodeGenException)?;
            let value = self.gen_expr_value(expr)?;
            let member_ty = self
                .env
                .decl_type(*member_decl)
                .cloned()
                .ok_or(CodeGenException)?;
            let member_ptr = self
                .builder
                .build_struct_gep(slot, i as u32, "object.member")?;
            self.store_value(member_ptr, value, &member_ty)?;
        }
        Ok(slot.into())
    }

    /// The memory location of an l-value expression; storing through it
    /// is how assignment is lowered.
    fn lvalue_allocation(&mut self, id: ExprId) -> GenResult<PointerValue<'ctx>> {
        match self.ast.expr(id).kind.clone() {
            ExprKind::Identifier { path } => {
                let names: Vec<String> = path.iter().map(|s| s.name.clone()).collect();
                let node = self.env.get_variable(&names).ok_or(CodeGenException)?;
                self.allocations.get(&node).copied().ok_or(CodeGenException)
            }
            ExprKind::Dereference { inner } => {
                Ok(self.gen_expr_value(inner)?.into_pointer_value())
            }
            ExprKind::Access {
                left, op, member, lvalue,
            } => {
                if !lvalue {
                    return Err(CodeGenException);
                }
                let scope = self.struct_scope_of(left, op)?;
                let index = self
                    .env
                    .node(scope)
                    .as_struct()
                    .and_then(|s| s.instance_members.get_index_of(member.name.as_str()))
                    .ok_or(CodeGenException)?;
                let base = self.gen_expr_value(left)?.into_pointer_value();
                let struct_type = self
                    .struct_types
                    .get(&scope)
                    .copied()
                    .ok_or(CodeGenException)?;
                Ok(self
                    .builder
                    .build_struct_gep(base, index as u32, "member")?)
            }
            ExprKind::Index { left, index, lvalue } => {
                if !lvalue {
                    return Err(CodeGenException);
                }
                self.index_pointer(left, index)
            }
            ExprKind::Grouping { inner } => self.lvalue_allocation(inner),
            _ => Err(CodeGenException),
        }
    }
}

fn is_constant(value: BasicValueEnum) -> bool {
    match value {
        BasicValueEnum::IntValue(v) => v.is_const(),
        BasicValueEnum::FloatValue(v) => v.is_const(),
        BasicValueEnum::PointerValue(v) => v.is_const(),
        BasicValueEnum::StructValue(v) => v.is_const(),
        BasicValueEnum::ArrayValue(v) => v.is_const(),
        BasicValueEnum::VectorValue(v) => v.is_const(),
        BasicValueEnum::ScalableVectorValue(_) => false,
    }
}
