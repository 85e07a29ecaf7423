//! Traversal protocol over template trees.
//!
//! One `visit_*` entry point per [`NodeKind`]. Every default is the same
//! kind-agnostic fold: visit the children left to right, threading the
//! accumulator through each call, and return what the last child produced.
//! The default touches no scope, no sink, no render state.
//!
//! Evaluators implement [`Visitor`] and override only the kinds whose
//! semantics they own. Inside an override, [`walk_children`] runs the default
//! fold (for a node that wants default handling of some children and custom
//! handling of others, fold the slice it needs with [`Visitor::visit_node`]).
//!
//! [`dispatch`] is an exhaustive `match` on the kind, so a node kind without
//! an entry point cannot exist.
//!
//! ```text
//! struct CountText(usize);
//!
//! impl<'t> Visitor<'t> for CountText {
//!     type Acc = ();
//!     type Error = std::convert::Infallible;
//!
//!     fn visit_text(&mut self, node: NodeRef<'t>, acc: ()) -> Result<(), Self::Error> {
//!         self.0 += 1;
//!         walk_children(self, node, acc)
//!     }
//! }
//! ```

use crate::node::{NodeKind, NodeRef};

/// Double-dispatch visitor over template nodes.
///
/// `Acc` is threaded through every call and owned entirely by the
/// implementor. `Error` aborts the traversal and unwinds to the caller.
pub trait Visitor<'t> {
    type Acc;
    type Error;

    /// Entry point used by [`walk_children`] for every child.
    ///
    /// Override to wrap each dispatch (stack growth, tracing spans). The
    /// override must still end in [`dispatch`].
    fn visit_node(
        &mut self,
        node: NodeRef<'t>,
        acc: Self::Acc,
    ) -> Result<Self::Acc, Self::Error> {
        dispatch(self, node, acc)
    }

    /// Template root.
    fn visit_process(
        &mut self,
        node: NodeRef<'t>,
        acc: Self::Acc,
    ) -> Result<Self::Acc, Self::Error> {
        walk_children(self, node, acc)
    }

    fn visit_expression(
        &mut self,
        node: NodeRef<'t>,
        acc: Self::Acc,
    ) -> Result<Self::Acc, Self::Error> {
        walk_children(self, node, acc)
    }

    fn visit_assignment(
        &mut self,
        node: NodeRef<'t>,
        acc: Self::Acc,
    ) -> Result<Self::Acc, Self::Error> {
        walk_children(self, node, acc)
    }

    /// Logical OR. Override to short-circuit.
    fn visit_or(
        &mut self,
        node: NodeRef<'t>,
        acc: Self::Acc,
    ) -> Result<Self::Acc, Self::Error> {
        walk_children(self, node, acc)
    }

    /// Logical AND. Override to short-circuit.
    fn visit_and(
        &mut self,
        node: NodeRef<'t>,
        acc: Self::Acc,
    ) -> Result<Self::Acc, Self::Error> {
        walk_children(self, node, acc)
    }

    fn visit_eq(
        &mut self,
        node: NodeRef<'t>,
        acc: Self::Acc,
    ) -> Result<Self::Acc, Self::Error> {
        walk_children(self, node, acc)
    }

    fn visit_ne(
        &mut self,
        node: NodeRef<'t>,
        acc: Self::Acc,
    ) -> Result<Self::Acc, Self::Error> {
        walk_children(self, node, acc)
    }

    fn visit_lt(
        &mut self,
        node: NodeRef<'t>,
        acc: Self::Acc,
    ) -> Result<Self::Acc, Self::Error> {
        walk_children(self, node, acc)
    }

    fn visit_gt(
        &mut self,
        node: NodeRef<'t>,
        acc: Self::Acc,
    ) -> Result<Self::Acc, Self::Error> {
        walk_children(self, node, acc)
    }

    fn visit_le(
        &mut self,
        node: NodeRef<'t>,
        acc: Self::Acc,
    ) -> Result<Self::Acc, Self::Error> {
        walk_children(self, node, acc)
    }

    fn visit_ge(
        &mut self,
        node: NodeRef<'t>,
        acc: Self::Acc,
    ) -> Result<Self::Acc, Self::Error> {
        walk_children(self, node, acc)
    }

    fn visit_add(
        &mut self,
        node: NodeRef<'t>,
        acc: Self::Acc,
    ) -> Result<Self::Acc, Self::Error> {
        walk_children(self, node, acc)
    }

    fn visit_subtract(
        &mut self,
        node: NodeRef<'t>,
        acc: Self::Acc,
    ) -> Result<Self::Acc, Self::Error> {
        walk_children(self, node, acc)
    }

    fn visit_mul(
        &mut self,
        node: NodeRef<'t>,
        acc: Self::Acc,
    ) -> Result<Self::Acc, Self::Error> {
        walk_children(self, node, acc)
    }

    fn visit_div(
        &mut self,
        node: NodeRef<'t>,
        acc: Self::Acc,
    ) -> Result<Self::Acc, Self::Error> {
        walk_children(self, node, acc)
    }

    fn visit_mod(
        &mut self,
        node: NodeRef<'t>,
        acc: Self::Acc,
    ) -> Result<Self::Acc, Self::Error> {
        walk_children(self, node, acc)
    }

    fn visit_not(
        &mut self,
        node: NodeRef<'t>,
        acc: Self::Acc,
    ) -> Result<Self::Acc, Self::Error> {
        walk_children(self, node, acc)
    }

    fn visit_integer_literal(
        &mut self,
        node: NodeRef<'t>,
        acc: Self::Acc,
    ) -> Result<Self::Acc, Self::Error> {
        walk_children(self, node, acc)
    }

    fn visit_float_literal(
        &mut self,
        node: NodeRef<'t>,
        acc: Self::Acc,
    ) -> Result<Self::Acc, Self::Error> {
        walk_children(self, node, acc)
    }

    fn visit_string_literal(
        &mut self,
        node: NodeRef<'t>,
        acc: Self::Acc,
    ) -> Result<Self::Acc, Self::Error> {
        walk_children(self, node, acc)
    }

    fn visit_identifier(
        &mut self,
        node: NodeRef<'t>,
        acc: Self::Acc,
    ) -> Result<Self::Acc, Self::Error> {
        walk_children(self, node, acc)
    }

    /// Method step in a reference chain.
    fn visit_method(
        &mut self,
        node: NodeRef<'t>,
        acc: Self::Acc,
    ) -> Result<Self::Acc, Self::Error> {
        walk_children(self, node, acc)
    }

    /// Variable reference with its property/method chain.
    fn visit_reference(
        &mut self,
        node: NodeRef<'t>,
        acc: Self::Acc,
    ) -> Result<Self::Acc, Self::Error> {
        walk_children(self, node, acc)
    }

    fn visit_true(
        &mut self,
        node: NodeRef<'t>,
        acc: Self::Acc,
    ) -> Result<Self::Acc, Self::Error> {
        walk_children(self, node, acc)
    }

    fn visit_false(
        &mut self,
        node: NodeRef<'t>,
        acc: Self::Acc,
    ) -> Result<Self::Acc, Self::Error> {
        walk_children(self, node, acc)
    }

    /// Statement block of a directive or branch.
    fn visit_block(
        &mut self,
        node: NodeRef<'t>,
        acc: Self::Acc,
    ) -> Result<Self::Acc, Self::Error> {
        walk_children(self, node, acc)
    }

    /// Literal template text.
    fn visit_text(
        &mut self,
        node: NodeRef<'t>,
        acc: Self::Acc,
    ) -> Result<Self::Acc, Self::Error> {
        walk_children(self, node, acc)
    }

    /// `#if`: condition, block, then else-if/else branches. Override to visit only the taken branch.
    fn visit_if(
        &mut self,
        node: NodeRef<'t>,
        acc: Self::Acc,
    ) -> Result<Self::Acc, Self::Error> {
        walk_children(self, node, acc)
    }

    fn visit_else(
        &mut self,
        node: NodeRef<'t>,
        acc: Self::Acc,
    ) -> Result<Self::Acc, Self::Error> {
        walk_children(self, node, acc)
    }

    fn visit_else_if(
        &mut self,
        node: NodeRef<'t>,
        acc: Self::Acc,
    ) -> Result<Self::Acc, Self::Error> {
        walk_children(self, node, acc)
    }

    fn visit_comment(
        &mut self,
        node: NodeRef<'t>,
        acc: Self::Acc,
    ) -> Result<Self::Acc, Self::Error> {
        walk_children(self, node, acc)
    }

    fn visit_object_array(
        &mut self,
        node: NodeRef<'t>,
        acc: Self::Acc,
    ) -> Result<Self::Acc, Self::Error> {
        walk_children(self, node, acc)
    }

    fn visit_word(
        &mut self,
        node: NodeRef<'t>,
        acc: Self::Acc,
    ) -> Result<Self::Acc, Self::Error> {
        walk_children(self, node, acc)
    }

    /// `#set`: target reference and value expression.
    fn visit_set(
        &mut self,
        node: NodeRef<'t>,
        acc: Self::Acc,
    ) -> Result<Self::Acc, Self::Error> {
        walk_children(self, node, acc)
    }

    /// Named directive or macro call.
    fn visit_directive(
        &mut self,
        node: NodeRef<'t>,
        acc: Self::Acc,
    ) -> Result<Self::Acc, Self::Error> {
        walk_children(self, node, acc)
    }

    fn visit_escaped_directive(
        &mut self,
        node: NodeRef<'t>,
        acc: Self::Acc,
    ) -> Result<Self::Acc, Self::Error> {
        walk_children(self, node, acc)
    }

    fn visit_escape(
        &mut self,
        node: NodeRef<'t>,
        acc: Self::Acc,
    ) -> Result<Self::Acc, Self::Error> {
        walk_children(self, node, acc)
    }

    fn visit_map(
        &mut self,
        node: NodeRef<'t>,
        acc: Self::Acc,
    ) -> Result<Self::Acc, Self::Error> {
        walk_children(self, node, acc)
    }

    fn visit_integer_range(
        &mut self,
        node: NodeRef<'t>,
        acc: Self::Acc,
    ) -> Result<Self::Acc, Self::Error> {
        walk_children(self, node, acc)
    }
}

/// Route `node` to the visitor method for its kind.
pub fn dispatch<'t, V: Visitor<'t> + ?Sized>(
    visitor: &mut V,
    node: NodeRef<'t>,
    acc: V::Acc,
) -> Result<V::Acc, V::Error> {
    match node.kind() {
        NodeKind::Process => visitor.visit_process(node, acc),
        NodeKind::Expression => visitor.visit_expression(node, acc),
        NodeKind::Assignment => visitor.visit_assignment(node, acc),
        NodeKind::Or => visitor.visit_or(node, acc),
        NodeKind::And => visitor.visit_and(node, acc),
        NodeKind::Eq => visitor.visit_eq(node, acc),
        NodeKind::Ne => visitor.visit_ne(node, acc),
        NodeKind::Lt => visitor.visit_lt(node, acc),
        NodeKind::Gt => visitor.visit_gt(node, acc),
        NodeKind::Le => visitor.visit_le(node, acc),
        NodeKind::Ge => visitor.visit_ge(node, acc),
        NodeKind::Add => visitor.visit_add(node, acc),
        NodeKind::Subtract => visitor.visit_subtract(node, acc),
        NodeKind::Mul => visitor.visit_mul(node, acc),
        NodeKind::Div => visitor.visit_div(node, acc),
        NodeKind::Mod => visitor.visit_mod(node, acc),
        NodeKind::Not => visitor.visit_not(node, acc),
        NodeKind::IntegerLiteral(_) => visitor.visit_integer_literal(node, acc),
        NodeKind::FloatingPointLiteral(_) => visitor.visit_float_literal(node, acc),
        NodeKind::StringLiteral(_) => visitor.visit_string_literal(node, acc),
        NodeKind::Identifier(_) => visitor.visit_identifier(node, acc),
        NodeKind::Method(_) => visitor.visit_method(node, acc),
        NodeKind::Reference(_) => visitor.visit_reference(node, acc),
        NodeKind::True => visitor.visit_true(node, acc),
        NodeKind::False => visitor.visit_false(node, acc),
        NodeKind::Block => visitor.visit_block(node, acc),
        NodeKind::Text(_) => visitor.visit_text(node, acc),
        NodeKind::IfStatement => visitor.visit_if(node, acc),
        NodeKind::ElseStatement => visitor.visit_else(node, acc),
        NodeKind::ElseIfStatement => visitor.visit_else_if(node, acc),
        NodeKind::Comment(_) => visitor.visit_comment(node, acc),
        NodeKind::ObjectArray => visitor.visit_object_array(node, acc),
        NodeKind::Word(_) => visitor.visit_word(node, acc),
        NodeKind::SetDirective => visitor.visit_set(node, acc),
        NodeKind::Directive(_) => visitor.visit_directive(node, acc),
        NodeKind::EscapedDirective(_) => visitor.visit_escaped_directive(node, acc),
        NodeKind::Escape(_) => visitor.visit_escape(node, acc),
        NodeKind::Map => visitor.visit_map(node, acc),
        NodeKind::IntegerRange => visitor.visit_integer_range(node, acc),
    }
}

/// Default fold: visit each child in order, threading the accumulator.
pub fn walk_children<'t, V: Visitor<'t> + ?Sized>(
    visitor: &mut V,
    node: NodeRef<'t>,
    acc: V::Acc,
) -> Result<V::Acc, V::Error> {
    node.children()
        .try_fold(acc, |acc, child| visitor.visit_node(child, acc))
}
