//! End-to-end tests over hand-built trees.
//!
//! - `expr_tests`: expression evaluation and reference chains
//! - `render_tests`: directives, output, macros, includes, caching

mod render_tests;

use std::sync::Arc;

use quire_ir::{Location, NodeId, NodeKind, Span, Tree, TreeBuilder};

use crate::{Bindings, Value};

/// Small assembler for template trees.
#[derive(Default)]
pub(crate) struct Tpl {
    b: TreeBuilder,
}

impl Tpl {
    pub fn new() -> Self {
        crate::init_tracing();
        Self::default()
    }

    pub fn text(&mut self, s: &str) -> NodeId {
        self.b.leaf(NodeKind::Text(s.into()))
    }

    pub fn int(&mut self, i: i64) -> NodeId {
        self.b.leaf(NodeKind::IntegerLiteral(i))
    }

    pub fn float(&mut self, x: f64) -> NodeId {
        self.b.leaf(NodeKind::FloatingPointLiteral(x))
    }

    pub fn string(&mut self, s: &str) -> NodeId {
        self.b.leaf(NodeKind::StringLiteral(s.into()))
    }

    pub fn boolean(&mut self, v: bool) -> NodeId {
        self.b.leaf(if v { NodeKind::True } else { NodeKind::False })
    }

    /// `$name`
    pub fn var(&mut self, name: &str) -> NodeId {
        self.b.leaf(NodeKind::Reference(name.into()))
    }

    /// `$name.step.step`
    pub fn reference(&mut self, name: &str, steps: impl IntoIterator<Item = NodeId>) -> NodeId {
        self.b.node(NodeKind::Reference(name.into()), steps)
    }

    pub fn prop(&mut self, name: &str) -> NodeId {
        self.b.leaf(NodeKind::Identifier(name.into()))
    }

    pub fn method(&mut self, name: &str, args: impl IntoIterator<Item = NodeId>) -> NodeId {
        self.b.node(NodeKind::Method(name.into()), args)
    }

    pub fn op(&mut self, kind: NodeKind, children: impl IntoIterator<Item = NodeId>) -> NodeId {
        self.b.node(kind, children)
    }

    pub fn list(&mut self, items: impl IntoIterator<Item = NodeId>) -> NodeId {
        self.b.node(NodeKind::ObjectArray, items)
    }

    pub fn range(&mut self, lo: NodeId, hi: NodeId) -> NodeId {
        self.b.node(NodeKind::IntegerRange, [lo, hi])
    }

    pub fn block(&mut self, children: impl IntoIterator<Item = NodeId>) -> NodeId {
        self.b.node(NodeKind::Block, children)
    }

    pub fn set(&mut self, target: NodeId, value: NodeId) -> NodeId {
        self.b.node(NodeKind::SetDirective, [target, value])
    }

    pub fn directive(&mut self, name: &str, children: impl IntoIterator<Item = NodeId>) -> NodeId {
        self.b.node(NodeKind::Directive(name.into()), children)
    }

    /// `#if(cond) ... [#elseif / #else ...]`
    pub fn if_(
        &mut self,
        condition: NodeId,
        block: NodeId,
        branches: impl IntoIterator<Item = NodeId>,
    ) -> NodeId {
        let children: Vec<_> = [condition, block].into_iter().chain(branches).collect();
        self.b.node(NodeKind::IfStatement, children)
    }

    pub fn else_if(&mut self, condition: NodeId, block: NodeId) -> NodeId {
        self.b.node(NodeKind::ElseIfStatement, [condition, block])
    }

    pub fn else_(&mut self, block: NodeId) -> NodeId {
        self.b.node(NodeKind::ElseStatement, [block])
    }

    /// `#foreach($var in iterable) body #end`
    pub fn foreach(&mut self, var: &str, iterable: NodeId, body: NodeId) -> NodeId {
        let var = self.var(var);
        let word = self.b.leaf(NodeKind::Word("in".into()));
        self.directive("foreach", [var, word, iterable, body])
    }

    /// A node carrying a source position.
    pub fn at(&mut self, kind: NodeKind, line: u32, column: u32, children: Vec<NodeId>) -> NodeId {
        self.b
            .node_at(kind, Span::new(0, 1), Location::new(line, column), children)
    }

    /// Seal with a `Process` root over `children`.
    pub fn finish(mut self, children: impl IntoIterator<Item = NodeId>) -> Arc<Tree> {
        let root = self.b.node(NodeKind::Process, children);
        Arc::new(self.b.finish(root).unwrap())
    }
}

pub(crate) fn bindings<const N: usize>(entries: [(&str, Value); N]) -> Bindings {
    entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}
