//! The environment: namespace tree ownership, scope cursor and name
//! resolution.
//!
//! One instance lives for a whole compilation and is threaded through the
//! checkers and the code generator explicitly. Resetting between
//! compilations is just constructing a fresh value.

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::checker::node::{Node, NodeId, ScopeData, StructScope, Variable};
use crate::checker::types::{Type, PRIMITIVE_NAMES};
use crate::diagnostics::ErrorCode;
use crate::parser::annotation::{Annotation, AnnotationKind};
use crate::parser::ast::{Ast, DeclId, Declarer};
use crate::source::Location;

/// A resolution failure, carrying enough to turn into a diagnostic.
#[derive(Debug)]
pub struct EnvError {
    pub code: ErrorCode,
    pub location: Location,
    pub message: String,
    /// A "previous declaration was here" pointer when applicable.
    pub previous: Option<NodeId>,
}

impl EnvError {
    fn new(code: ErrorCode, location: Location, message: impl Into<String>) -> Self {
        Self {
            code,
            location,
            message: message.into(),
            previous: None,
        }
    }
}

pub struct Environment {
    nodes: Vec<Node>,
    current: NodeId,
    local_scope_count: usize,
    /// Resolved declaration types, keyed by [`DeclId`]. A side table so
    /// the AST itself stays untouched by resolution.
    decl_types: HashMap<DeclId, Type>,
}

pub const ROOT: NodeId = NodeId(0);

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    /// A fresh tree with the primitive types installed under the root.
    pub fn new() -> Self {
        let mut env = Self {
            nodes: vec![Node::Root(ScopeData {
                unique_name: String::new(),
                parent: None,
                children: HashMap::new(),
            })],
            current: ROOT,
            local_scope_count: 0,
            decl_types: HashMap::new(),
        };
        for name in PRIMITIVE_NAMES {
            let id = env.push(Node::Struct(StructScope {
                scope: ScopeData {
                    unique_name: format!("::{name}"),
                    parent: Some(ROOT),
                    children: HashMap::new(),
                },
                instance_members: IndexMap::new(),
                is_primitive: true,
                location: None,
            }));
            env.scope_mut(ROOT).children.insert(name.to_string(), id);
        }
        env
    }

    fn push(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() as u32 - 1)
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    fn scope_mut(&mut self, id: NodeId) -> &mut ScopeData {
        self.node_mut(id)
            .scope_mut()
            .expect("node is not a scope")
    }

    pub fn current(&self) -> NodeId {
        self.current
    }

    pub fn in_global_scope(&self) -> bool {
        self.node(self.current).is_global_scope()
    }

    // MARK: Scope transitions

    /// Move into an existing named child scope (namespace or struct).
    pub fn enter(&mut self, name: &str) -> Result<(), ErrorCode> {
        let child = self
            .node(self.current)
            .scope()
            .and_then(|s| s.children.get(name))
            .copied();
        match child {
            Some(id) if self.node(id).scope().is_some() => {
                self.current = id;
                Ok(())
            }
            _ => Err(ErrorCode::Impossible),
        }
    }

    pub fn exit(&mut self) -> Result<(), ErrorCode> {
        match self.node(self.current).parent() {
            Some(parent) => {
                self.current = parent;
                Ok(())
            }
            None => Err(ErrorCode::ExitedRootScope),
        }
    }

    /// Open a fresh anonymous local scope. The parent does not record it
    /// as a child, so it becomes unreachable once exited; the counter
    /// stamp keeps unique names unique.
    pub fn increase_local_scope(&mut self) {
        let unique_name = format!(
            "{}::{}",
            self.node(self.current).unique_name(),
            self.local_scope_count
        );
        self.local_scope_count += 1;
        let parent = self.current;
        let id = self.push(Node::Local(ScopeData {
            unique_name,
            parent: Some(parent),
            children: HashMap::new(),
        }));
        self.current = id;
    }

    /// Create (or re-open) a namespace under the current scope and enter
    /// it. Only allowed inside the root or another namespace.
    pub fn add_namespace(&mut self, name: &str, location: Location) -> Result<NodeId, ErrorCode> {
        match self.node(self.current) {
            Node::Struct(_) => return Err(ErrorCode::NamespaceInStruct),
            Node::Local(_) => return Err(ErrorCode::NamespaceInLocalScope),
            Node::Variable(_) => return Err(ErrorCode::Impossible),
            _ => {}
        }
        if let Some(&existing) = self.node(self.current).scope().unwrap().children.get(name) {
            if matches!(self.node(existing), Node::Namespace { .. }) {
                self.current = existing;
                return Ok(existing);
            }
            return Err(ErrorCode::SymbolAlreadyDeclared);
        }
        let unique_name = format!("{}::{name}", self.node(self.current).unique_name());
        let parent = self.current;
        let id = self.push(Node::Namespace {
            scope: ScopeData {
                unique_name,
                parent: Some(parent),
                children: HashMap::new(),
            },
            location,
        });
        self.scope_mut(parent).children.insert(name.to_string(), id);
        self.current = id;
        Ok(id)
    }

    /// Create a struct scope under the current scope. Allowed in the
    /// root, namespaces and (for nested structs) other structs; the cursor
    /// stays where it is.
    pub fn add_struct(&mut self, name: &str, location: Location) -> Result<NodeId, ErrorCode> {
        match self.node(self.current) {
            Node::Local(_) => return Err(ErrorCode::StructInLocalScope),
            Node::Variable(_) => return Err(ErrorCode::Impossible),
            _ => {}
        }
        if self
            .node(self.current)
            .scope()
            .unwrap()
            .children
            .contains_key(name)
        {
            return Err(ErrorCode::StructAlreadyDeclared);
        }
        let unique_name = format!("{}::{name}", self.node(self.current).unique_name());
        let parent = self.current;
        let id = self.push(Node::Struct(StructScope {
            scope: ScopeData {
                unique_name,
                parent: Some(parent),
                children: HashMap::new(),
            },
            instance_members: IndexMap::new(),
            is_primitive: false,
            location: Some(location),
        }));
        self.scope_mut(parent).children.insert(name.to_string(), id);
        Ok(id)
    }

    /// Register an instance member on a struct scope.
    pub fn add_instance_member(
        &mut self,
        struct_id: NodeId,
        name: &str,
        decl: DeclId,
    ) -> Result<(), ErrorCode> {
        let Node::Struct(s) = self.node_mut(struct_id) else {
            return Err(ErrorCode::Impossible);
        };
        if s.instance_members.contains_key(name) || s.scope.children.contains_key(name) {
            return Err(ErrorCode::SymbolAlreadyDeclared);
        }
        s.instance_members.insert(name.to_string(), decl);
        Ok(())
    }

    // MARK: Declarations

    /// Declare a variable-declarable AST declaration in the current scope.
    ///
    /// Resolves the written annotation into the declaration's type unless
    /// it was already resolved by an earlier pass. With `deferred` set, an
    /// unknown type reference is tolerated and left for the second pass.
    pub fn declare_variable(
        &mut self,
        ast: &Ast,
        decl_id: DeclId,
        deferred: bool,
    ) -> Result<NodeId, EnvError> {
        let decl = ast.decl(decl_id);
        let name = decl.name.clone();
        let location = decl.location;

        if let Some(&previous) = self
            .node(self.current)
            .scope()
            .and_then(|s| s.children.get(name.as_str()))
        {
            return Err(EnvError {
                code: ErrorCode::SymbolAlreadyDeclared,
                location,
                message: "A symbol with the same name has already been declared in this scope."
                    .to_string(),
                previous: Some(previous),
            });
        }

        if self.decl_type(decl_id).is_none() {
            let annotation = decl.annotation.clone();
            match annotation {
                Some(annotation) => match self.get_type(&annotation) {
                    Ok(ty) => {
                        if !ty.is_blank() {
                            self.decl_types.insert(decl_id, ty);
                        }
                    }
                    Err(e) if deferred => {
                        let _ = e; // left for the local pass to resolve
                    }
                    Err(e) => return Err(e),
                },
                None => {
                    return Err(EnvError::new(
                        ErrorCode::Impossible,
                        location,
                        "Declaration has no type annotation to resolve.",
                    ))
                }
            }
        }

        let unique_name = format!("{}::{name}", self.node(self.current).unique_name());
        let parent = self.current;
        let id = self.push(Node::Variable(Variable {
            unique_name,
            parent,
            decl: decl_id,
            location,
        }));
        self.scope_mut(parent).children.insert(name, id);
        Ok(id)
    }

    pub fn decl_type(&self, decl: DeclId) -> Option<&Type> {
        self.decl_types.get(&decl)
    }

    pub fn set_decl_type(&mut self, decl: DeclId, ty: Type) {
        self.decl_types.insert(decl, ty);
    }

    // MARK: Lookups

    /// Resolve a bare name by walking outward from the current scope.
    pub fn upward_lookup(&self, name: &str) -> Option<NodeId> {
        let mut cursor = Some(self.current);
        while let Some(id) = cursor {
            if let Some(scope) = self.node(id).scope() {
                if let Some(&child) = scope.children.get(name) {
                    return Some(child);
                }
            }
            cursor = self.node(id).parent();
        }
        None
    }

    /// Resolve a qualified path. The whole path is attempted from the
    /// current scope; on failure the attempt restarts from each ancestor
    /// in turn until the root fails too.
    pub fn downward_lookup(&self, path: &[String]) -> Option<NodeId> {
        let mut base = Some(self.current);
        while let Some(from) = base {
            if let Some(found) = self.descend(from, path) {
                return Some(found);
            }
            base = self.node(from).parent();
        }
        None
    }

    fn descend(&self, from: NodeId, path: &[String]) -> Option<NodeId> {
        let mut current = from;
        for step in &path[..path.len() - 1] {
            let scope = self.node(current).scope()?;
            current = *scope.children.get(step.as_str())?;
        }
        self.node(current)
            .scope()?
            .children
            .get(path.last()?.as_str())
            .copied()
    }

    /// Resolve a name or path to any node: bare names resolve upward with
    /// a downward fallback, paths resolve downward.
    pub fn lookup(&self, path: &[String]) -> Option<NodeId> {
        if path.len() == 1 {
            if let Some(found) = self.upward_lookup(&path[0]) {
                return Some(found);
            }
        }
        self.downward_lookup(path)
    }

    /// Resolve a name or path to a variable node.
    pub fn get_variable(&self, path: &[String]) -> Option<NodeId> {
        self.lookup(path)
            .filter(|&id| matches!(self.node(id), Node::Variable(_)))
    }

    /// Look up an instance member declaration on a struct type.
    pub fn get_instance_variable(&self, struct_id: NodeId, member: &str) -> Option<DeclId> {
        self.node(struct_id)
            .as_struct()
            .and_then(|s| s.instance_members.get(member))
            .copied()
    }

    /// Resolve a written annotation into a semantic type.
    pub fn get_type(&self, annotation: &Annotation) -> Result<Type, EnvError> {
        match &annotation.kind {
            AnnotationKind::Segmented(segments) => {
                if annotation.is_auto() {
                    return Ok(Type::Blank);
                }
                let path: Vec<String> = segments.iter().map(|s| s.name.clone()).collect();
                let node = self.lookup(&path).ok_or_else(|| {
                    EnvError::new(
                        ErrorCode::UnknownType,
                        annotation.location,
                        format!("Unknown type '{annotation}'."),
                    )
                })?;
                match self.node(node) {
                    Node::Struct(s) => Ok(Type::Struct {
                        scope: node,
                        name: s.scope.unique_name.clone(),
                    }),
                    _ => Err(EnvError::new(
                        ErrorCode::UnknownType,
                        annotation.location,
                        format!("'{annotation}' does not name a type."),
                    )),
                }
            }
            AnnotationKind::Pointer { inner, mutable } => Ok(Type::Pointer {
                declarer: if *mutable { Declarer::Var } else { Declarer::Const },
                inner: Box::new(self.get_type(inner)?),
            }),
            AnnotationKind::Array { inner, size } => Ok(Type::Array {
                inner: Box::new(self.get_type(inner)?),
                size: size.unwrap_or(-1),
            }),
            AnnotationKind::Tuple(elements) => {
                let mut types = Vec::new();
                for element in elements {
                    types.push(self.get_type(element)?);
                }
                Ok(Type::Tuple(types))
            }
            AnnotationKind::Function {
                params,
                ret,
                ret_mutable,
                variadic,
            } => {
                let mut param_types = Vec::new();
                for (mutable, param) in params {
                    let declarer = if *mutable { Declarer::Var } else { Declarer::Const };
                    param_types.push((declarer, self.get_type(param)?));
                }
                Ok(Type::Function {
                    params: param_types,
                    return_declarer: if *ret_mutable { Declarer::Var } else { Declarer::Const },
                    return_type: Box::new(self.get_type(ret)?),
                    variadic: *variadic,
                })
            }
        }
    }

    /// The type of a primitive by bare name.
    pub fn primitive_type(&self, name: &str) -> Type {
        let id = self.node(ROOT).scope().unwrap().children[name];
        Type::Struct {
            scope: id,
            name: format!("::{name}"),
        }
    }

    // MARK: Enumerations for the code generator

    /// All user-defined struct scopes, in declaration order.
    pub fn get_struct_scopes(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(i, node)| match node {
                Node::Struct(s) if !s.is_primitive => Some(NodeId(i as u32)),
                _ => None,
            })
            .collect()
    }

    /// All function bindings reachable through global scopes (root,
    /// namespaces, struct statics), in declaration order.
    pub fn get_global_functions(&self, ast: &Ast) -> Vec<NodeId> {
        use crate::parser::ast::DeclKind;
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(i, node)| {
                let variable = node.as_variable()?;
                let parent_is_global = !matches!(self.node(variable.parent), Node::Local(_));
                let is_function = matches!(
                    ast.decl(variable.decl).kind,
                    DeclKind::Fun { .. } | DeclKind::ExternFun
                );
                (parent_is_global && is_function).then_some(NodeId(i as u32))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ast::{Decl, DeclKind};

    fn dummy_location() -> Location {
        Location::new(crate::source::FileId(0), 1, 0, 1, 0)
    }

    fn var_decl(ast: &mut Ast, name: &str, annotation: &str) -> DeclId {
        ast.add_decl(Decl {
            kind: DeclKind::Var {
                declarer: Declarer::Var,
                initializer: None,
            },
            name: name.to_string(),
            annotation: Some(Annotation::simple(annotation, dummy_location())),
            location: dummy_location(),
        })
    }

    #[test]
    fn test_primitives_installed() {
        let env = Environment::new();
        for name in PRIMITIVE_NAMES {
            let node = env.upward_lookup(name).expect("primitive missing");
            let s = env.node(node).as_struct().expect("not a struct scope");
            assert!(s.is_primitive);
            assert_eq!(s.scope.unique_name, format!("::{name}"));
        }
    }

    #[test]
    fn test_unique_names_extend_parent() {
        let mut env = Environment::new();
        env.add_namespace("outer", dummy_location()).unwrap();
        env.add_namespace("inner", dummy_location()).unwrap();
        assert_eq!(env.node(env.current()).unique_name(), "::outer::inner");

        let mut ast = Ast::new();
        let decl = var_decl(&mut ast, "x", "i32");
        let node = env.declare_variable(&ast, decl, false).unwrap();
        assert_eq!(env.node(node).unique_name(), "::outer::inner::x");
    }

    #[test]
    fn test_upward_lookup_crosses_scopes() {
        let mut env = Environment::new();
        let mut ast = Ast::new();
        let decl = var_decl(&mut ast, "x", "i32");
        env.declare_variable(&ast, decl, false).unwrap();

        env.add_namespace("a", dummy_location()).unwrap();
        env.increase_local_scope();
        let found = env.upward_lookup("x").expect("x not found upward");
        assert!(env.node(found).as_variable().is_some());
    }

    #[test]
    fn test_downward_lookup_with_parent_retry() {
        let mut env = Environment::new();
        let mut ast = Ast::new();

        env.add_namespace("a", dummy_location()).unwrap();
        env.add_namespace("b", dummy_location()).unwrap();
        let decl = var_decl(&mut ast, "x", "i32");
        env.declare_variable(&ast, decl, false).unwrap();
        env.exit().unwrap();
        env.exit().unwrap();

        // From inside ::a, the whole path a::b::x only resolves after
        // retrying from the root.
        env.enter("a").unwrap();
        let path = vec!["a".to_string(), "b".to_string(), "x".to_string()];
        assert!(env.downward_lookup(&path).is_some());
        let direct = vec!["b".to_string(), "x".to_string()];
        assert!(env.downward_lookup(&direct).is_some());
    }

    #[test]
    fn test_redeclaration_reports_previous() {
        let mut env = Environment::new();
        let mut ast = Ast::new();
        let first = var_decl(&mut ast, "x", "i32");
        let second = var_decl(&mut ast, "x", "bool");
        let node = env.declare_variable(&ast, first, false).unwrap();
        let err = env.declare_variable(&ast, second, false).unwrap_err();
        assert_eq!(err.code, ErrorCode::SymbolAlreadyDeclared);
        assert_eq!(err.previous, Some(node));
    }

    #[test]
    fn test_local_scope_not_indexed_by_parent() {
        let mut env = Environment::new();
        let mut ast = Ast::new();
        env.increase_local_scope();
        let decl = var_decl(&mut ast, "tmp", "i32");
        env.declare_variable(&ast, decl, false).unwrap();
        env.exit().unwrap();
        assert!(env.upward_lookup("tmp").is_none());
    }

    #[test]
    fn test_deferred_type_left_unresolved() {
        let mut env = Environment::new();
        let mut ast = Ast::new();
        let decl = var_decl(&mut ast, "p", "Point");
        let node = env.declare_variable(&ast, decl, true).unwrap();
        assert!(env.decl_type(decl).is_none());
        assert!(env.node(node).as_variable().is_some());
    }

    #[test]
    fn test_get_type_builds_compound_types() {
        let env = Environment::new();
        let loc = dummy_location();
        let inner = Annotation::simple("i32", loc);
        let ptr = Annotation::new(
            AnnotationKind::Pointer {
                inner: Box::new(inner.clone()),
                mutable: true,
            },
            loc,
        );
        assert_eq!(env.get_type(&ptr).unwrap().to_string(), "::i32*");

        let tuple = Annotation::new(AnnotationKind::Tuple(vec![inner.clone(), Annotation::simple("bool", loc)]), loc);
        assert_eq!(env.get_type(&tuple).unwrap().to_string(), "(::i32, ::bool, )");

        let auto = Annotation::simple("auto", loc);
        assert!(env.get_type(&auto).unwrap().is_blank());
    }
}
