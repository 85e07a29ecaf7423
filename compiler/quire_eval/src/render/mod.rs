//! Reference evaluators built on the traversal protocol.
//!
//! - [`ExprEvaluator`]: computes the value of expression nodes
//! - [`Renderer`]: walks a template, writes text to the sink, and owns the
//!   directive semantics (`#set`, `#if`, `#foreach`, `#parse`, macro calls)
//!
//! Both override only the node kinds they give meaning to; everything else
//! falls back to the default child fold of [`Visitor`].
//!
//! The renderer's accumulator is passed through untouched. Output never
//! travels in the accumulator, only through the [`Sink`], in document order.

mod expr;

pub use expr::ExprEvaluator;

use std::sync::Arc;

use quire_ir::{dispatch, NodeKind, NodeRef, Tree, Visitor};
use rustc_hash::FxHashMap;

use crate::config::RenderConfig;
use crate::context::Frame;
use crate::errors::{internal_error, resource_not_found, RenderError, RenderResult};
use crate::macros::{Macro, MacroTable};
use crate::methods::MethodResolver;
use crate::resource::ResourceLoader;
use crate::sink::Sink;
use crate::value::Value;

use expr::source_text;

/// Read-only collaborators of one render.
#[derive(Clone, Copy)]
pub struct RenderEnv<'e> {
    pub config: &'e RenderConfig,
    pub loader: Option<&'e dyn ResourceLoader>,
    pub resolver: &'e dyn MethodResolver,
    /// Macros defined inline, consulted before any library.
    pub macros: &'e MacroTable,
    /// Macro libraries by name; searched in the order of the render state's
    /// macro-library list.
    pub libraries: &'e FxHashMap<String, MacroTable>,
    pub sink: &'e Sink,
}

/// Renders template trees into a sink.
pub struct Renderer<'a> {
    frame: &'a Frame<'a>,
    env: RenderEnv<'a>,
}

impl<'a> Renderer<'a> {
    pub fn new(frame: &'a Frame<'a>, env: RenderEnv<'a>) -> Self {
        Renderer { frame, env }
    }

    /// Render a whole tree from its root.
    pub fn render(&mut self, tree: &Tree) -> RenderResult<Value> {
        self.visit_node(tree.root(), Value::Null)
    }

    #[inline]
    pub fn frame(&self) -> &'a Frame<'a> {
        self.frame
    }

    fn expr(&self) -> ExprEvaluator<'a> {
        ExprEvaluator::new(self.frame, self.env.resolver)
    }

    fn write(&self, text: &str) -> RenderResult<()> {
        self.env.sink.write(text)
    }

    fn write_payload(&self, node: NodeRef<'_>, acc: Value) -> RenderResult<Value> {
        match node.kind() {
            NodeKind::Text(text)
            | NodeKind::Word(text)
            | NodeKind::Escape(text)
            | NodeKind::EscapedDirective(text) => self.write(text)?,
            _ => {}
        }
        Ok(acc)
    }

    /// `#foreach($item in $items)`: one loop frame for the whole loop, the
    /// item and `$foreach` rebound with `local_put` on every pass.
    fn render_foreach(&mut self, node: NodeRef<'_>, mut acc: Value) -> RenderResult<Value> {
        let children = (node.child(0), node.child(2), node.child(3));
        let (Some(var), Some(iterable), Some(body)) = children else {
            return Err(internal_error("#foreach needs a variable, an iterable and a body"));
        };
        let NodeKind::Reference(var) = var.kind() else {
            return Err(internal_error("#foreach variable must be a reference"));
        };

        let items: Vec<Value> = match self.expr().eval(iterable)? {
            Value::List(items) => items.as_ref().clone(),
            Value::Map(entries) => entries.values().cloned().collect(),
            Value::Null => return Ok(acc),
            other => {
                tracing::debug!(iterable = %other.runtime_type(), "#foreach over a non-collection");
                return Ok(acc);
            }
        };

        let frame = Frame::loop_scope(self.frame);
        let mut looped = Renderer::new(&frame, self.env);
        let count = items.len();
        for (index, item) in items.into_iter().enumerate() {
            frame.local_put(var, item);
            frame.local_put("foreach", loop_status(index, count));
            acc = looped.visit_node(body, acc)?;
        }
        Ok(acc)
    }

    /// `#parse("name")`: render another resource in a forwarding frame.
    fn render_parse(&mut self, node: NodeRef<'_>, acc: Value) -> RenderResult<Value> {
        let Some(arg) = node.child(0) else {
            return Err(internal_error("#parse needs a resource name"));
        };
        let requested = self.expr().eval(arg)?.to_string();

        let current = self.frame.current_template();
        let name = match self.frame.event_cartridge() {
            Some(cartridge) => cartridge.include_event(&requested, current.as_deref()),
            None => Some(requested.clone()),
        };
        let Some(name) = name else {
            tracing::debug!(resource = %requested, "include vetoed");
            return Ok(acc);
        };

        let loader = self.env.loader.ok_or_else(|| resource_not_found(&name))?;
        let resource = loader.load(&name)?;
        let tree = Arc::clone(resource.tree());
        tracing::debug!(resource = %name, "parse");

        let _template = self.frame.enter_template(resource.name());
        let _resource = self.frame.enter_resource(resource);
        let frame = Frame::forwarding(self.frame);
        let mut included = Renderer::new(&frame, self.env);
        included.visit_node(tree.root(), acc)
    }

    fn find_macro(&self, name: &str) -> Option<Arc<Macro>> {
        if let Some(definition) = self.env.macros.get(name) {
            return Some(Arc::clone(definition));
        }
        self.frame
            .macro_libraries()
            .iter()
            .find_map(|library| self.env.libraries.get(library)?.get(name).cloned())
    }

    /// `#name(args)`: a macro call.
    ///
    /// The name is pushed (and the depth bound checked) before any child of
    /// the call is visited. Arguments are then evaluated in the caller's
    /// frame and bound positionally in a fresh macro frame; missing
    /// arguments leave their parameter unbound, extra arguments are dropped.
    fn render_macro(&mut self, name: &str, node: NodeRef<'_>, acc: Value) -> RenderResult<Value> {
        let Some(definition) = self.find_macro(name) else {
            return self.render_unknown_directive(name, node, acc);
        };

        let _call = self.frame.enter_macro(name)?;
        let args = node
            .children()
            .map(|arg| self.expr().eval(arg))
            .collect::<RenderResult<Vec<_>>>()?;

        let frame = Frame::macro_scope(self.frame);
        for (param, value) in definition.params.iter().zip(args) {
            frame.local_put(param, value);
        }
        let mut body = Renderer::new(&frame, self.env);
        body.visit_node(definition.body.root(), acc)
    }

    /// `#set($map.key = value)`: copy-on-write update of a map binding.
    fn set_entry(&self, name: &str, target: NodeRef<'_>, value: Value) {
        let Some(step) = target.child(0) else {
            return;
        };
        let (NodeKind::Identifier(key), Some(Value::Map(mut entries))) =
            (step.kind(), self.frame.get(name))
        else {
            tracing::debug!(
                reference = %source_text(target),
                "#set on a non-map property ignored"
            );
            return;
        };
        let map = Arc::make_mut(&mut entries);
        if value.is_null() {
            map.remove(key);
        } else {
            map.insert(key.clone(), value);
        }
        self.frame.put(name, Value::Map(entries));
    }

    /// Unknown directives render as written.
    fn render_unknown_directive(
        &self,
        name: &str,
        node: NodeRef<'_>,
        acc: Value,
    ) -> RenderResult<Value> {
        tracing::trace!(directive = name, "unknown directive rendered literally");
        let mut text = format!("#{name}");
        if node.child_count() > 0 {
            let args: Vec<_> = node.children().map(source_text).collect();
            text.push('(');
            text.push_str(&args.join(" "));
            text.push(')');
        }
        self.write(&text)?;
        Ok(acc)
    }
}

/// `$foreach` for pass `index` of `count`.
fn loop_status(index: usize, count: usize) -> Value {
    let int = |n: usize| Value::Int(i64::try_from(n).unwrap_or(i64::MAX));
    let pass = index.saturating_add(1);
    Value::map([
        ("count", int(pass)),
        ("index", int(index)),
        ("hasNext", Value::Bool(pass < count)),
        ("first", Value::Bool(index == 0)),
        ("last", Value::Bool(pass == count)),
    ])
}

impl<'t> Visitor<'t> for Renderer<'_> {
    type Acc = Value;
    type Error = RenderError;

    fn visit_node(&mut self, node: NodeRef<'t>, acc: Value) -> RenderResult<Value> {
        quire_stack::ensure_sufficient_stack(|| dispatch(self, node, acc))
            .map_err(|err| self.frame.capture(err.at(node)))
    }

    fn visit_text(&mut self, node: NodeRef<'t>, acc: Value) -> RenderResult<Value> {
        self.write_payload(node, acc)
    }

    fn visit_word(&mut self, node: NodeRef<'t>, acc: Value) -> RenderResult<Value> {
        self.write_payload(node, acc)
    }

    fn visit_escape(&mut self, node: NodeRef<'t>, acc: Value) -> RenderResult<Value> {
        self.write_payload(node, acc)
    }

    fn visit_escaped_directive(&mut self, node: NodeRef<'t>, acc: Value) -> RenderResult<Value> {
        self.write_payload(node, acc)
    }

    fn visit_comment(&mut self, _: NodeRef<'t>, acc: Value) -> RenderResult<Value> {
        Ok(acc)
    }

    fn visit_reference(&mut self, node: NodeRef<'t>, acc: Value) -> RenderResult<Value> {
        match self.expr().resolve_reference(node)? {
            Some(value) => {
                let value = match self.frame.event_cartridge() {
                    Some(cartridge) => cartridge.reference_insert(&source_text(node), value),
                    None => value,
                };
                self.write(&value.to_string())?;
            }
            None if self.env.config.render_unresolved_references => {
                self.write(&source_text(node))?;
            }
            None => {}
        }
        Ok(acc)
    }

    /// `#set($name = value)` assigns with `put`; a `null` value removes the
    /// binding. `#set($map.key = value)` replaces one entry of a map.
    fn visit_set(&mut self, node: NodeRef<'t>, acc: Value) -> RenderResult<Value> {
        let (Some(target), Some(expr)) = (node.child(0), node.child(1)) else {
            return Err(internal_error("#set needs a target and a value"));
        };
        let NodeKind::Reference(name) = target.kind() else {
            return Err(internal_error("#set target must be a reference"));
        };
        let value = self.expr().eval(expr)?;

        match target.child_count() {
            0 if value.is_null() => {
                self.frame.remove(name);
            }
            0 => {
                self.frame.put(name, value);
            }
            1 => self.set_entry(name, target, value),
            _ => {
                tracing::debug!(reference = %source_text(target), "#set on a nested chain ignored");
            }
        }
        Ok(acc)
    }

    /// Conditions are tried in order; only the chosen block is visited.
    fn visit_if(&mut self, node: NodeRef<'t>, acc: Value) -> RenderResult<Value> {
        let (Some(condition), Some(block)) = (node.child(0), node.child(1)) else {
            return Err(internal_error("#if needs a condition and a block"));
        };
        if self.expr().eval(condition)?.is_truthy() {
            return self.visit_node(block, acc);
        }
        for branch in node.children().skip(2) {
            match branch.kind() {
                NodeKind::ElseIfStatement => {
                    let condition = branch.child(0);
                    let block = branch.child(1);
                    let (Some(condition), Some(block)) = (condition, block) else {
                        return Err(internal_error("#elseif needs a condition and a block"));
                    };
                    if self.expr().eval(condition)?.is_truthy() {
                        return self.visit_node(block, acc);
                    }
                }
                NodeKind::ElseStatement => return self.visit_node(branch, acc),
                other => {
                    return Err(internal_error(format!(
                        "unexpected {} in #if",
                        other.name()
                    )))
                }
            }
        }
        Ok(acc)
    }

    fn visit_directive(&mut self, node: NodeRef<'t>, acc: Value) -> RenderResult<Value> {
        let NodeKind::Directive(name) = node.kind() else {
            return Ok(acc);
        };
        match name.as_str() {
            "foreach" => self.render_foreach(node, acc),
            "parse" => self.render_parse(node, acc),
            _ => self.render_macro(name, node, acc),
        }
    }
}
