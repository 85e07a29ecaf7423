//! Template syntax tree.
//!
//! Nodes live in a flat arena (`Tree`) and refer to their children by
//! `NodeId`. A tree is assembled bottom-up with a [`TreeBuilder`]: a node can
//! only name children that were allocated before it, so cycles cannot be
//! expressed and `finish` can validate the whole arena in one pass.
//!
//! Every tree gets a process-unique [`TreeId`]. Together with a `NodeId` it
//! forms a [`NodeKey`], which identifies a node across renders and is what
//! the introspection cache keys on.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::span::{Location, Span};

/// Index of a node within its tree.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, PartialOrd, Ord)]
#[repr(transparent)]
pub struct NodeId(u32);

impl NodeId {
    #[inline]
    pub const fn new(index: u32) -> Self {
        NodeId(index)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// Process-unique identity of a finished tree.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
#[repr(transparent)]
pub struct TreeId(u32);

impl TreeId {
    fn fresh() -> Self {
        static NEXT: AtomicU32 = AtomicU32::new(1);
        TreeId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// Stable identity of one node: which tree, which slot.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct NodeKey {
    pub tree: TreeId,
    pub node: NodeId,
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}#{}", self.tree.0, self.node.0)
    }
}

/// The closed set of node kinds.
///
/// Payload-carrying kinds hold the source text or literal the parser
/// extracted; structure is expressed only through children.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    /// Root of a template.
    Process,
    Expression,
    Assignment,
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Add,
    Subtract,
    Mul,
    Div,
    Mod,
    Not,
    IntegerLiteral(i64),
    FloatingPointLiteral(f64),
    StringLiteral(String),
    /// Property step in a reference chain (`$user.name`).
    Identifier(String),
    /// Method step in a reference chain; children are the arguments.
    Method(String),
    /// Variable reference; children are the property/method chain.
    Reference(String),
    True,
    False,
    Block,
    Text(String),
    IfStatement,
    ElseStatement,
    ElseIfStatement,
    Comment(String),
    ObjectArray,
    Word(String),
    SetDirective,
    /// Named directive or macro call; children are its arguments.
    Directive(String),
    EscapedDirective(String),
    Escape(String),
    Map,
    IntegerRange,
}

impl NodeKind {
    /// Short lowercase name, used in logs and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Process => "process",
            NodeKind::Expression => "expression",
            NodeKind::Assignment => "assignment",
            NodeKind::Or => "or",
            NodeKind::And => "and",
            NodeKind::Eq => "eq",
            NodeKind::Ne => "ne",
            NodeKind::Lt => "lt",
            NodeKind::Gt => "gt",
            NodeKind::Le => "le",
            NodeKind::Ge => "ge",
            NodeKind::Add => "add",
            NodeKind::Subtract => "subtract",
            NodeKind::Mul => "mul",
            NodeKind::Div => "div",
            NodeKind::Mod => "mod",
            NodeKind::Not => "not",
            NodeKind::IntegerLiteral(_) => "integer-literal",
            NodeKind::FloatingPointLiteral(_) => "float-literal",
            NodeKind::StringLiteral(_) => "string-literal",
            NodeKind::Identifier(_) => "identifier",
            NodeKind::Method(_) => "method",
            NodeKind::Reference(_) => "reference",
            NodeKind::True => "true",
            NodeKind::False => "false",
            NodeKind::Block => "block",
            NodeKind::Text(_) => "text",
            NodeKind::IfStatement => "if",
            NodeKind::ElseStatement => "else",
            NodeKind::ElseIfStatement => "elseif",
            NodeKind::Comment(_) => "comment",
            NodeKind::ObjectArray => "object-array",
            NodeKind::Word(_) => "word",
            NodeKind::SetDirective => "set",
            NodeKind::Directive(_) => "directive",
            NodeKind::EscapedDirective(_) => "escaped-directive",
            NodeKind::Escape(_) => "escape",
            NodeKind::Map => "map",
            NodeKind::IntegerRange => "integer-range",
        }
    }
}

/// One arena slot.
#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub children: Vec<NodeId>,
    pub span: Span,
    pub location: Location,
}

/// Tree construction defects, reported by [`TreeBuilder::finish`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    #[error("node {parent} refers to child {child}, which was not allocated before it")]
    ForwardChild { parent: u32, child: u32 },
    #[error("root {0} is not a node of this tree")]
    MissingRoot(u32),
}

/// An immutable template tree.
///
/// Shared read-only across renders (usually behind an `Arc`).
#[derive(Debug)]
pub struct Tree {
    id: TreeId,
    nodes: Vec<Node>,
    root: NodeId,
}

impl Tree {
    #[inline]
    pub fn id(&self) -> TreeId {
        self.id
    }

    /// Entry node of the tree.
    #[inline]
    pub fn root(&self) -> NodeRef<'_> {
        NodeRef {
            tree: self,
            id: self.root,
        }
    }

    /// Look up a node by id.
    pub fn get(&self, id: NodeId) -> Option<NodeRef<'_>> {
        (id.index() < self.nodes.len()).then_some(NodeRef { tree: self, id })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Bottom-up tree construction.
#[derive(Default)]
pub struct TreeBuilder {
    nodes: Vec<Node>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a node with no source position.
    pub fn node(&mut self, kind: NodeKind, children: impl IntoIterator<Item = NodeId>) -> NodeId {
        self.node_at(kind, Span::DUMMY, Location::UNKNOWN, children)
    }

    /// Allocate a childless node with no source position.
    pub fn leaf(&mut self, kind: NodeKind) -> NodeId {
        self.node(kind, [])
    }

    /// Allocate a node with a source position.
    pub fn node_at(
        &mut self,
        kind: NodeKind,
        span: Span,
        location: Location,
        children: impl IntoIterator<Item = NodeId>,
    ) -> NodeId {
        let id = NodeId::new(u32::try_from(self.nodes.len()).unwrap_or(u32::MAX));
        self.nodes.push(Node {
            kind,
            children: children.into_iter().collect(),
            span,
            location,
        });
        id
    }

    /// Validate the arena and seal it into a [`Tree`] rooted at `root`.
    pub fn finish(self, root: NodeId) -> Result<Tree, TreeError> {
        if root.index() >= self.nodes.len() {
            return Err(TreeError::MissingRoot(root.raw()));
        }
        for (index, node) in self.nodes.iter().enumerate() {
            if let Some(child) = node.children.iter().find(|c| c.index() >= index) {
                return Err(TreeError::ForwardChild {
                    parent: u32::try_from(index).unwrap_or(u32::MAX),
                    child: child.raw(),
                });
            }
        }
        Ok(Tree {
            id: TreeId::fresh(),
            nodes: self.nodes,
            root,
        })
    }
}

/// Borrowed handle to one node of a tree.
#[derive(Copy, Clone)]
pub struct NodeRef<'t> {
    tree: &'t Tree,
    id: NodeId,
}

impl<'t> NodeRef<'t> {
    #[inline]
    fn node(&self) -> &'t Node {
        // `finish` guarantees every reachable id is in range
        &self.tree.nodes[self.id.index()]
    }

    #[inline]
    pub fn id(&self) -> NodeId {
        self.id
    }

    #[inline]
    pub fn tree(&self) -> &'t Tree {
        self.tree
    }

    /// Identity of this node across renders.
    #[inline]
    pub fn key(&self) -> NodeKey {
        NodeKey {
            tree: self.tree.id,
            node: self.id,
        }
    }

    #[inline]
    pub fn kind(&self) -> &'t NodeKind {
        &self.node().kind
    }

    #[inline]
    pub fn span(&self) -> Span {
        self.node().span
    }

    #[inline]
    pub fn location(&self) -> Location {
        self.node().location
    }

    #[inline]
    pub fn child_count(&self) -> usize {
        self.node().children.len()
    }

    pub fn child(&self, index: usize) -> Option<NodeRef<'t>> {
        let tree = self.tree;
        self.node()
            .children
            .get(index)
            .map(|&id| NodeRef { tree, id })
    }

    /// Children in document order.
    pub fn children(&self) -> impl ExactSizeIterator<Item = NodeRef<'t>> + 't {
        let tree = self.tree;
        self.node()
            .children
            .iter()
            .map(move |&id| NodeRef { tree, id })
    }
}

impl fmt::Debug for NodeRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRef")
            .field("key", &self.key())
            .field("kind", self.kind())
            .finish()
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_build_and_navigate() {
        let mut b = TreeBuilder::new();
        let hello = b.leaf(NodeKind::Text("hello ".into()));
        let name = b.leaf(NodeKind::Reference("name".into()));
        let root = b.node(NodeKind::Process, [hello, name]);
        let tree = b.finish(root).unwrap();

        let root = tree.root();
        assert_eq!(root.kind(), &NodeKind::Process);
        assert_eq!(root.child_count(), 2);
        let kinds: Vec<_> = root.children().map(|c| c.kind().name()).collect();
        assert_eq!(kinds, vec!["text", "reference"]);
        assert_eq!(
            root.child(1).map(|c| c.kind().clone()),
            Some(NodeKind::Reference("name".into()))
        );
        assert!(root.child(2).is_none());
    }

    #[test]
    fn test_forward_child_rejected() {
        let mut b = TreeBuilder::new();
        let root = b.node(NodeKind::Process, [NodeId::new(1)]);
        b.leaf(NodeKind::True);
        assert_eq!(
            b.finish(root).unwrap_err(),
            TreeError::ForwardChild {
                parent: 0,
                child: 1
            }
        );
    }

    #[test]
    fn test_self_child_rejected() {
        let mut b = TreeBuilder::new();
        let root = b.node(NodeKind::Block, [NodeId::new(0)]);
        assert!(b.finish(root).is_err());
    }

    #[test]
    fn test_missing_root_rejected() {
        let b = TreeBuilder::new();
        assert_eq!(
            b.finish(NodeId::new(0)).unwrap_err(),
            TreeError::MissingRoot(0)
        );
    }

    #[test]
    fn test_tree_ids_unique() {
        let make = || {
            let mut b = TreeBuilder::new();
            let root = b.leaf(NodeKind::Process);
            b.finish(root).unwrap()
        };
        let a = make();
        let b = make();
        assert_ne!(a.id(), b.id());
        assert_ne!(a.root().key(), b.root().key());
        assert_eq!(a.root().key(), a.root().key());
    }

    #[test]
    fn test_positions_recorded() {
        let mut b = TreeBuilder::new();
        let text = b.node_at(
            NodeKind::Text("x".into()),
            Span::new(4, 5),
            Location::new(2, 1),
            [],
        );
        let tree = b.finish(text).unwrap();
        assert_eq!(tree.root().span(), Span::new(4, 5));
        assert_eq!(tree.root().location(), Location::new(2, 1));
    }
}
