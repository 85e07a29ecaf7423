//! Expression evaluation.
//!
//! [`ExprEvaluator`] is a [`Visitor`] whose accumulator is the value of the
//! expression just evaluated. It reads variables through the frame it was
//! created on and never writes to it.
//!
//! Reference chains (`$user.name`, `$list.get(0).trim()`) are resolved step
//! by step. Each step is resolved once per `(node, runtime type)` through the
//! introspection cache; only a miss reaches the [`MethodResolver`].

use std::cmp::Ordering;
use std::collections::BTreeMap;

use quire_ir::{dispatch, NodeKind, NodeRef, Visitor};

use crate::context::Frame;
use crate::errors::{internal_error, RenderError, RenderResult};
use crate::icache::MethodHandle;
use crate::methods::MethodResolver;
use crate::value::Value;

/// Evaluates expression nodes to values.
pub struct ExprEvaluator<'a> {
    frame: &'a Frame<'a>,
    resolver: &'a dyn MethodResolver,
}

impl<'a> ExprEvaluator<'a> {
    pub fn new(frame: &'a Frame<'a>, resolver: &'a dyn MethodResolver) -> Self {
        ExprEvaluator { frame, resolver }
    }

    /// Value of the expression rooted at `node`.
    pub fn eval(&mut self, node: NodeRef<'_>) -> RenderResult<Value> {
        self.visit_node(node, Value::Null)
    }

    /// Resolve a `Reference` node and its property/method chain.
    ///
    /// `None` when the variable is unbound or a step of the chain does not
    /// resolve; the event cartridge hears about it through
    /// `invalid_reference`.
    pub fn resolve_reference(&mut self, node: NodeRef<'_>) -> RenderResult<Option<Value>> {
        let NodeKind::Reference(name) = node.kind() else {
            return Err(internal_error(format!(
                "expected a reference, found {}",
                node.kind().name()
            )));
        };

        let mut value = self.frame.get(name);
        for step in node.children() {
            let Some(target) = value.take().filter(|v| !v.is_null()) else {
                break;
            };
            value = self.apply_step(step, &target)?;
        }

        match value {
            Some(value) if !value.is_null() => Ok(Some(value)),
            _ => {
                if let Some(cartridge) = self.frame.event_cartridge() {
                    cartridge.invalid_reference(&source_text(node));
                }
                Ok(None)
            }
        }
    }

    fn apply_step(&mut self, step: NodeRef<'_>, target: &Value) -> RenderResult<Option<Value>> {
        match step.kind() {
            NodeKind::Identifier(property) => {
                if let Value::Map(entries) = target {
                    return Ok(entries.get(property.as_str()).cloned());
                }
                let candidates = property_accessors(property);
                match self.method_handle(step, target, &candidates, 0) {
                    Some(handle) => self.invoke(&handle, target, &[]).map(Some),
                    None => Ok(None),
                }
            }
            NodeKind::Method(method) => {
                let args = step
                    .children()
                    .map(|arg| self.eval(arg))
                    .collect::<RenderResult<Vec<_>>>()?;
                let candidates = std::slice::from_ref(method);
                match self.method_handle(step, target, candidates, args.len()) {
                    Some(handle) => self.invoke(&handle, target, &args).map(Some),
                    None => Ok(None),
                }
            }
            other => Err(internal_error(format!(
                "{} is not a reference step",
                other.name()
            ))),
        }
    }

    /// Cached handle for `step` on `target`, resolving the first matching
    /// candidate name on a miss.
    fn method_handle(
        &self,
        step: NodeRef<'_>,
        target: &Value,
        candidates: &[String],
        arg_count: usize,
    ) -> Option<MethodHandle> {
        let key = step.key();
        let ty = target.runtime_type();
        if let Some(handle) = self.frame.icache_get(key, ty) {
            return Some(handle);
        }
        tracing::trace!(node = %key, target_type = %ty, "introspection cache miss");
        let handle = candidates.iter().find_map(|name| {
            tracing::trace!(method = %name, target_type = %ty, arg_count, "resolve method");
            self.resolver.resolve(target, name, arg_count)
        })?;
        self.frame.icache_put(key, ty, handle.clone());
        Some(handle)
    }

    /// Call `handle`, giving the event cartridge a chance to recover a failure.
    fn invoke(
        &self,
        handle: &MethodHandle,
        target: &Value,
        args: &[Value],
    ) -> RenderResult<Value> {
        handle.invoke(target, args).or_else(|err| {
            let recovered = self
                .frame
                .event_cartridge()
                .and_then(|cartridge| cartridge.method_exception(handle.name(), &err));
            recovered.ok_or(err)
        })
    }

    fn operands(&mut self, node: NodeRef<'_>) -> RenderResult<(Value, Value)> {
        match (node.child(0), node.child(1)) {
            (Some(lhs), Some(rhs)) => Ok((self.eval(lhs)?, self.eval(rhs)?)),
            _ => Err(internal_error(format!(
                "{} needs two operands",
                node.kind().name()
            ))),
        }
    }

    fn operand(&mut self, node: NodeRef<'_>) -> RenderResult<Value> {
        match node.child(0) {
            Some(child) => self.eval(child),
            None => Err(internal_error(format!(
                "{} needs an operand",
                node.kind().name()
            ))),
        }
    }

    fn compare(
        &mut self,
        node: NodeRef<'_>,
        test: impl Fn(Ordering) -> bool,
    ) -> RenderResult<Value> {
        let (lhs, rhs) = self.operands(node)?;
        Ok(Value::Bool(compare(&lhs, &rhs).is_some_and(test)))
    }

    fn arithmetic(
        &mut self,
        node: NodeRef<'_>,
        int: fn(i64, i64) -> Option<i64>,
        float: fn(f64, f64) -> f64,
    ) -> RenderResult<Value> {
        let (lhs, rhs) = self.operands(node)?;
        Ok(arithmetic(&lhs, &rhs, int, float))
    }

    fn division(
        &mut self,
        node: NodeRef<'_>,
        int: fn(i64, i64) -> Option<i64>,
        float: fn(f64, f64) -> f64,
    ) -> RenderResult<Value> {
        let (lhs, rhs) = self.operands(node)?;
        if as_float(&rhs) == Some(0.0) {
            return Ok(Value::Null);
        }
        Ok(arithmetic(&lhs, &rhs, int, float))
    }
}

impl<'t> Visitor<'t> for ExprEvaluator<'_> {
    type Acc = Value;
    type Error = RenderError;

    fn visit_node(&mut self, node: NodeRef<'t>, acc: Value) -> RenderResult<Value> {
        quire_stack::ensure_sufficient_stack(|| dispatch(self, node, acc))
            .map_err(|err| self.frame.capture(err.at(node)))
    }

    fn visit_integer_literal(&mut self, node: NodeRef<'t>, _: Value) -> RenderResult<Value> {
        match node.kind() {
            NodeKind::IntegerLiteral(i) => Ok(Value::Int(*i)),
            _ => Ok(Value::Null),
        }
    }

    fn visit_float_literal(&mut self, node: NodeRef<'t>, _: Value) -> RenderResult<Value> {
        match node.kind() {
            NodeKind::FloatingPointLiteral(x) => Ok(Value::Float(*x)),
            _ => Ok(Value::Null),
        }
    }

    fn visit_string_literal(&mut self, node: NodeRef<'t>, _: Value) -> RenderResult<Value> {
        match node.kind() {
            NodeKind::StringLiteral(s) => Ok(Value::from(s.as_str())),
            _ => Ok(Value::Null),
        }
    }

    fn visit_true(&mut self, _: NodeRef<'t>, _: Value) -> RenderResult<Value> {
        Ok(Value::Bool(true))
    }

    fn visit_false(&mut self, _: NodeRef<'t>, _: Value) -> RenderResult<Value> {
        Ok(Value::Bool(false))
    }

    fn visit_reference(&mut self, node: NodeRef<'t>, _: Value) -> RenderResult<Value> {
        Ok(self.resolve_reference(node)?.unwrap_or_default())
    }

    fn visit_object_array(&mut self, node: NodeRef<'t>, _: Value) -> RenderResult<Value> {
        let items = node
            .children()
            .map(|child| self.eval(child))
            .collect::<RenderResult<Vec<_>>>()?;
        Ok(Value::from(items))
    }

    /// Children alternate key, value. Keys are stringified.
    fn visit_map(&mut self, node: NodeRef<'t>, _: Value) -> RenderResult<Value> {
        if node.child_count().checked_rem(2) != Some(0) {
            return Err(internal_error("map literal has a key without a value"));
        }
        let mut entries = BTreeMap::new();
        let mut children = node.children();
        while let (Some(key), Some(value)) = (children.next(), children.next()) {
            let key = self.eval(key)?.to_string();
            entries.insert(key, self.eval(value)?);
        }
        Ok(Value::Map(entries.into()))
    }

    /// `[lo..hi]`, inclusive, counting down when `lo > hi`.
    fn visit_integer_range(&mut self, node: NodeRef<'t>, _: Value) -> RenderResult<Value> {
        let (lo, hi) = self.operands(node)?;
        let (Some(lo), Some(hi)) = (lo.as_int(), hi.as_int()) else {
            tracing::debug!(%lo, %hi, "integer range bounds are not integers");
            return Ok(Value::Null);
        };
        let items: Vec<Value> = if lo <= hi {
            (lo..=hi).map(Value::Int).collect()
        } else {
            (hi..=lo).rev().map(Value::Int).collect()
        };
        Ok(Value::from(items))
    }

    fn visit_not(&mut self, node: NodeRef<'t>, _: Value) -> RenderResult<Value> {
        Ok(Value::Bool(!self.operand(node)?.is_truthy()))
    }

    fn visit_and(&mut self, node: NodeRef<'t>, _: Value) -> RenderResult<Value> {
        for child in node.children() {
            if !self.eval(child)?.is_truthy() {
                return Ok(Value::Bool(false));
            }
        }
        Ok(Value::Bool(true))
    }

    fn visit_or(&mut self, node: NodeRef<'t>, _: Value) -> RenderResult<Value> {
        for child in node.children() {
            if self.eval(child)?.is_truthy() {
                return Ok(Value::Bool(true));
            }
        }
        Ok(Value::Bool(false))
    }

    fn visit_eq(&mut self, node: NodeRef<'t>, _: Value) -> RenderResult<Value> {
        let (lhs, rhs) = self.operands(node)?;
        Ok(Value::Bool(values_equal(&lhs, &rhs)))
    }

    fn visit_ne(&mut self, node: NodeRef<'t>, _: Value) -> RenderResult<Value> {
        let (lhs, rhs) = self.operands(node)?;
        Ok(Value::Bool(!values_equal(&lhs, &rhs)))
    }

    fn visit_lt(&mut self, node: NodeRef<'t>, _: Value) -> RenderResult<Value> {
        self.compare(node, Ordering::is_lt)
    }

    fn visit_gt(&mut self, node: NodeRef<'t>, _: Value) -> RenderResult<Value> {
        self.compare(node, Ordering::is_gt)
    }

    fn visit_le(&mut self, node: NodeRef<'t>, _: Value) -> RenderResult<Value> {
        self.compare(node, Ordering::is_le)
    }

    fn visit_ge(&mut self, node: NodeRef<'t>, _: Value) -> RenderResult<Value> {
        self.compare(node, Ordering::is_ge)
    }

    /// Numeric addition, or concatenation when either side is a string.
    fn visit_add(&mut self, node: NodeRef<'t>, _: Value) -> RenderResult<Value> {
        let (lhs, rhs) = self.operands(node)?;
        if matches!(lhs, Value::Str(_)) || matches!(rhs, Value::Str(_)) {
            return Ok(Value::from(format!("{lhs}{rhs}")));
        }
        Ok(arithmetic(&lhs, &rhs, i64::checked_add, |a, b| a + b))
    }

    fn visit_subtract(&mut self, node: NodeRef<'t>, _: Value) -> RenderResult<Value> {
        self.arithmetic(node, i64::checked_sub, |a, b| a - b)
    }

    fn visit_mul(&mut self, node: NodeRef<'t>, _: Value) -> RenderResult<Value> {
        self.arithmetic(node, i64::checked_mul, |a, b| a * b)
    }

    fn visit_div(&mut self, node: NodeRef<'t>, _: Value) -> RenderResult<Value> {
        self.division(node, i64::checked_div, |a, b| a / b)
    }

    fn visit_mod(&mut self, node: NodeRef<'t>, _: Value) -> RenderResult<Value> {
        self.division(node, i64::checked_rem, |a, b| a % b)
    }
}

/// Accessor names tried for a property step: `name`, `getName`, `isName`.
fn property_accessors(property: &str) -> [String; 3] {
    let mut chars = property.chars();
    let capitalized = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
        None => String::new(),
    };
    [
        property.to_string(),
        format!("get{capitalized}"),
        format!("is{capitalized}"),
    ]
}

#[expect(
    clippy::cast_precision_loss,
    reason = "mixed arithmetic promotes integers to f64"
)]
fn as_float(value: &Value) -> Option<f64> {
    match value {
        Value::Int(i) => Some(*i as f64),
        Value::Float(x) => Some(*x),
        _ => None,
    }
}

/// Integer math when both sides are integers and the result fits, float
/// math otherwise, `null` for non-numbers.
fn arithmetic(
    lhs: &Value,
    rhs: &Value,
    int: fn(i64, i64) -> Option<i64>,
    float: fn(f64, f64) -> f64,
) -> Value {
    if let (Value::Int(a), Value::Int(b)) = (lhs, rhs) {
        if let Some(result) = int(*a, *b) {
            return Value::Int(result);
        }
    }
    match (as_float(lhs), as_float(rhs)) {
        (Some(a), Some(b)) => Value::Float(float(a, b)),
        _ => Value::Null,
    }
}

/// Equality with numeric promotion (`1 == 1.0`).
pub(crate) fn values_equal(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Int(_), Value::Float(_)) | (Value::Float(_), Value::Int(_)) => {
            as_float(lhs) == as_float(rhs)
        }
        _ => lhs == rhs,
    }
}

/// Ordering of numbers and of strings; `None` for anything else.
fn compare(lhs: &Value, rhs: &Value) -> Option<Ordering> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        _ => as_float(lhs)?.partial_cmp(&as_float(rhs)?),
    }
}

/// Template source of a reference, rebuilt from the tree: `$user.name`,
/// `$list.get(0)`.
pub(crate) fn source_text(node: NodeRef<'_>) -> String {
    match node.kind() {
        NodeKind::Reference(name) => {
            let mut text = format!("${name}");
            for step in node.children() {
                text.push('.');
                text.push_str(&source_text(step));
            }
            text
        }
        NodeKind::Identifier(name) => name.clone(),
        NodeKind::Method(name) => {
            let args: Vec<_> = node.children().map(source_text).collect();
            format!("{name}({})", args.join(", "))
        }
        NodeKind::StringLiteral(s) => format!("\"{s}\""),
        NodeKind::IntegerLiteral(i) => i.to_string(),
        NodeKind::FloatingPointLiteral(x) => x.to_string(),
        NodeKind::True => "true".to_string(),
        NodeKind::False => "false".to_string(),
        NodeKind::Word(w) => w.clone(),
        other => other.name().to_string(),
    }
}
