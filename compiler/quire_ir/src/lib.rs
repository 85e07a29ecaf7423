//! Quire IR - template syntax tree and traversal protocol.
//!
//! - [`Tree`] / [`TreeBuilder`]: immutable, arena-backed node trees
//! - [`NodeRef`]: borrowed handle used everywhere a node is passed around
//! - [`Visitor`], [`dispatch`], [`walk_children`]: the per-kind
//!   double-dispatch protocol evaluators build on

mod node;
mod span;
mod visitor;

pub use node::{Node, NodeId, NodeKey, NodeKind, NodeRef, Tree, TreeBuilder, TreeError, TreeId};
pub use span::{Location, Span};
pub use visitor::{dispatch, walk_children, Visitor};
