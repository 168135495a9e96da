//! Nodes of the namespace tree.
//!
//! The tree is arena-allocated inside the [`Environment`]; parents are
//! plain back-edge ids and children maps hold ids, so no reference cycles
//! arise even though variables also point back into the AST by [`DeclId`].
//!
//! [`Environment`]: crate::checker::env::Environment

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::parser::ast::DeclId;
use crate::source::Location;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// State shared by every scope node: the canonical `::a::b` name, the
/// parent back-edge and the named children.
#[derive(Debug, Default)]
pub struct ScopeData {
    pub unique_name: String,
    pub parent: Option<NodeId>,
    pub children: HashMap<String, NodeId>,
}

/// A struct scope. Children are the static members; instance members are
/// kept apart in declaration order since they are not part of the
/// namespace tree (and their order defines the lowered struct layout).
#[derive(Debug)]
pub struct StructScope {
    pub scope: ScopeData,
    pub instance_members: IndexMap<String, DeclId>,
    /// Built-ins have no body to lower.
    pub is_primitive: bool,
    pub location: Option<Location>,
}

/// A variable (or function) binding. The name, declarer and type live on
/// the AST declaration this node points to.
#[derive(Debug)]
pub struct Variable {
    pub unique_name: String,
    pub parent: NodeId,
    pub decl: DeclId,
    pub location: Location,
}

#[derive(Debug)]
pub enum Node {
    Root(ScopeData),
    Namespace { scope: ScopeData, location: Location },
    Struct(StructScope),
    /// Anonymous scope for a block or function body; never registered in
    /// its parent's children map, so it becomes unreachable on exit.
    Local(ScopeData),
    Variable(Variable),
}

impl Node {
    pub fn unique_name(&self) -> &str {
        match self {
            Node::Root(scope) | Node::Namespace { scope, .. } | Node::Local(scope) => &scope.unique_name,
            Node::Struct(s) => &s.scope.unique_name,
            Node::Variable(v) => &v.unique_name,
        }
    }

    pub fn parent(&self) -> Option<NodeId> {
        match self {
            Node::Root(scope) | Node::Namespace { scope, .. } | Node::Local(scope) => scope.parent,
            Node::Struct(s) => s.scope.parent,
            Node::Variable(v) => Some(v.parent),
        }
    }

    /// The scope data of a scope node; variables have none.
    pub fn scope(&self) -> Option<&ScopeData> {
        match self {
            Node::Root(scope) | Node::Namespace { scope, .. } | Node::Local(scope) => Some(scope),
            Node::Struct(s) => Some(&s.scope),
            Node::Variable(_) => None,
        }
    }

    pub fn scope_mut(&mut self) -> Option<&mut ScopeData> {
        match self {
            Node::Root(scope) | Node::Namespace { scope, .. } | Node::Local(scope) => Some(scope),
            Node::Struct(s) => Some(&mut s.scope),
            Node::Variable(_) => None,
        }
    }

    pub fn as_struct(&self) -> Option<&StructScope> {
        match self {
            Node::Struct(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_variable(&self) -> Option<&Variable> {
        match self {
            Node::Variable(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_global_scope(&self) -> bool {
        matches!(self, Node::Root(_) | Node::Namespace { .. })
    }

    pub fn location(&self) -> Option<Location> {
        match self {
            Node::Root(_) | Node::Local(_) => None,
            Node::Namespace { location, .. } => Some(*location),
            Node::Struct(s) => s.location,
            Node::Variable(v) => Some(v.location),
        }
    }
}
