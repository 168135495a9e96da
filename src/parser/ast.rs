//! The abstract syntax tree.
//!
//! All nodes live in arenas owned by [`Ast`]; cross-references are plain
//! index newtypes. This keeps the tree free of reference cycles even
//! though the namespace tree later points back into it: a scope node holds
//! a [`DeclId`], never a pointer.
//!
//! Every expression carries a `ty` slot that is `None` until the local
//! checker accepts it.

use crate::checker::types::Type;
use crate::lexer::{LiteralValue, TokenKind};
use crate::parser::annotation::Annotation;
use crate::source::Location;

macro_rules! arena_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(pub u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

arena_id!(ExprId);
arena_id!(StmtId);
arena_id!(DeclId);

/// A single step of a qualified identifier path.
#[derive(Debug, Clone, PartialEq)]
pub struct PathSegment {
    pub name: String,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// `a = b`, including the compound forms (`+=`, `&&=`, ...).
    Assign { op: TokenKind, left: ExprId, right: ExprId },
    /// `a and b`, `a or b`.
    Logical { op: TokenKind, left: ExprId, right: ExprId },
    /// Arithmetic and comparison operators.
    Binary { op: TokenKind, left: ExprId, right: ExprId },
    /// Prefix `-`, `!`/`not`, `&`.
    Unary { op: TokenKind, inner: ExprId },
    /// Prefix `*`; an l-value whose declarer follows the pointer's.
    Dereference { inner: ExprId },
    Call { callee: ExprId, arguments: Vec<ExprId> },
    Cast { inner: ExprId, annotation: Annotation },
    /// `a.b` / `p->b`. `lvalue` is set by the checker when the left side
    /// is itself an l-value (or, for `->`, always).
    Access {
        left: ExprId,
        op: TokenKind,
        member: PathSegment,
        lvalue: bool,
    },
    /// `a[i]`. `lvalue` mirrors [`ExprKind::Access`].
    Index { left: ExprId, index: ExprId, lvalue: bool },
    Grouping { inner: ExprId },
    Identifier { path: Vec<PathSegment> },
    Literal { value: Option<LiteralValue>, kind: TokenKind },
    Array { elements: Vec<ExprId> },
    /// `[generator; size]` runs the generator `size` times at runtime.
    ArrayGen { generator: ExprId, size: i64 },
    Tuple { elements: Vec<ExprId> },
    /// A struct literal `:Path { field: expr, ... }`.
    Object {
        annotation: Annotation,
        fields: Vec<(PathSegment, ExprId)>,
    },
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub location: Location,
    /// Filled by the local checker; `None` until then.
    pub ty: Option<Type>,
}

/// The keyword that introduced a binding; governs mutability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Declarer {
    Var,
    Const,
}

impl Declarer {
    pub fn is_mutable(self) -> bool {
        matches!(self, Declarer::Var)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeclKind {
    Var {
        declarer: Declarer,
        initializer: Option<ExprId>,
    },
    Fun {
        parameters: Vec<DeclId>,
        /// Synthesized `__return_val__` variable; its annotation is the
        /// written (or injected `void`) return type. Unused when the
        /// function returns void.
        return_var: DeclId,
        body: Vec<StmtId>,
    },
    ExternFun,
    Struct { declarations: Vec<DeclId> },
    Namespace { declarations: Vec<DeclId> },
}

#[derive(Debug, Clone)]
pub struct Decl {
    pub kind: DeclKind,
    pub name: String,
    /// The written annotation; for functions this is the synthesized
    /// `fun(...) => ...` annotation. Structs and namespaces have none.
    pub annotation: Option<Annotation>,
    pub location: Location,
}

impl Decl {
    /// The declarer of a variable-declarable declaration (`var`, `const`,
    /// `fun`, `extern fun`). Functions bind immutably.
    pub fn declarer(&self) -> Declarer {
        match &self.kind {
            DeclKind::Var { declarer, .. } => *declarer,
            _ => Declarer::Const,
        }
    }

    pub fn is_var_declarable(&self) -> bool {
        matches!(
            self.kind,
            DeclKind::Var { .. } | DeclKind::Fun { .. } | DeclKind::ExternFun
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoopKind {
    While { condition: ExprId },
    Infinite,
    /// `for <binding> in start..end` (`inclusive` for `...`). The binding
    /// is a synthesized `const` declaration typed from the endpoints.
    ForRange {
        binding: DeclId,
        start: ExprId,
        end: ExprId,
        inclusive: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Declaration(DeclId),
    Expression(ExprId),
    Block(Vec<StmtId>),
    Conditional {
        condition: ExprId,
        then_branch: StmtId,
        else_branch: Option<StmtId>,
    },
    Loop { kind: LoopKind, body: StmtId },
    Return { value: Option<ExprId> },
    Break,
    Continue,
    EndOfFile,
}

#[derive(Debug, Clone)]
pub struct Stmt {
    pub kind: StmtKind,
    pub location: Location,
}

/// Arena ownership of every AST node produced by one parse.
#[derive(Debug, Default)]
pub struct Ast {
    exprs: Vec<Expr>,
    stmts: Vec<Stmt>,
    decls: Vec<Decl>,
}

impl Ast {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_expr(&mut self, kind: ExprKind, location: Location) -> ExprId {
        self.exprs.push(Expr {
            kind,
            location,
            ty: None,
        });
        ExprId(self.exprs.len() as u32 - 1)
    }

    pub fn add_stmt(&mut self, kind: StmtKind, location: Location) -> StmtId {
        self.stmts.push(Stmt { kind, location });
        StmtId(self.stmts.len() as u32 - 1)
    }

    pub fn add_decl(&mut self, decl: Decl) -> DeclId {
        self.decls.push(decl);
        DeclId(self.decls.len() as u32 - 1)
    }

    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id.index()]
    }

    pub fn expr_mut(&mut self, id: ExprId) -> &mut Expr {
        &mut self.exprs[id.index()]
    }

    pub fn stmt(&self, id: StmtId) -> &Stmt {
        &self.stmts[id.index()]
    }

    pub fn decl(&self, id: DeclId) -> &Decl {
        &self.decls[id.index()]
    }

    pub fn decl_count(&self) -> usize {
        self.decls.len()
    }

    pub fn decl_ids(&self) -> impl Iterator<Item = DeclId> + '_ {
        (0..self.decls.len() as u32).map(DeclId)
    }

    /// The first declaration with the given name, if any.
    pub fn find_decl(&self, name: &str) -> Option<DeclId> {
        self.decl_ids().find(|&id| self.decl(id).name == name)
    }

    /// Whether this expression denotes a storable location. Access and
    /// index expressions only count once the checker has promoted them.
    pub fn is_lvalue(&self, id: ExprId) -> bool {
        match &self.expr(id).kind {
            ExprKind::Identifier { .. } | ExprKind::Dereference { .. } => true,
            ExprKind::Access { lvalue, .. } | ExprKind::Index { lvalue, .. } => *lvalue,
            ExprKind::Grouping { inner } => self.is_lvalue(*inner),
            _ => false,
        }
    }
}
