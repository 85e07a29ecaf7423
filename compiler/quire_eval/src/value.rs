//! Runtime values.
//!
//! Templates see a small closed set of values plus opaque host objects.
//! Every value reports a [`RuntimeType`], which is half of the
//! introspection-cache key: the same method node evaluated against a string
//! and against a list must resolve separately.

use std::any::{Any, TypeId};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// An object supplied by the host application.
///
/// Methods on host objects are reached through a
/// [`MethodResolver`](crate::MethodResolver); the engine itself only needs
/// the type identity and a textual rendering.
pub trait HostObject: Any + fmt::Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;

    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Text written when the object is rendered.
    fn render(&self) -> String {
        format!("{self:?}")
    }
}

/// Identity of a host type. Compared and hashed by `TypeId` only.
#[derive(Copy, Clone, Debug)]
pub struct HostType {
    pub id: TypeId,
    pub name: &'static str,
}

impl HostType {
    pub fn of<T: HostObject>() -> Self {
        HostType {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }
}

impl PartialEq for HostType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for HostType {}

impl Hash for HostType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Runtime type of a [`Value`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum RuntimeType {
    Null,
    Bool,
    Int,
    Float,
    Str,
    List,
    Map,
    Host(HostType),
}

impl RuntimeType {
    pub fn name(&self) -> &'static str {
        match self {
            RuntimeType::Null => "null",
            RuntimeType::Bool => "bool",
            RuntimeType::Int => "int",
            RuntimeType::Float => "float",
            RuntimeType::Str => "string",
            RuntimeType::List => "list",
            RuntimeType::Map => "map",
            RuntimeType::Host(host) => host.name,
        }
    }
}

impl fmt::Display for RuntimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A template value. Cloning is cheap: aggregates are shared.
#[derive(Clone, Debug, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    List(Arc<Vec<Value>>),
    Map(Arc<BTreeMap<String, Value>>),
    Host(Arc<dyn HostObject>),
}

impl Value {
    pub fn string(s: impl Into<Arc<str>>) -> Self {
        Value::Str(s.into())
    }

    pub fn list(items: impl IntoIterator<Item = Value>) -> Self {
        Value::List(Arc::new(items.into_iter().collect()))
    }

    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        Value::Map(Arc::new(
            entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    pub fn host<T: HostObject>(object: T) -> Self {
        Value::Host(Arc::new(object))
    }

    pub fn runtime_type(&self) -> RuntimeType {
        match self {
            Value::Null => RuntimeType::Null,
            Value::Bool(_) => RuntimeType::Bool,
            Value::Int(_) => RuntimeType::Int,
            Value::Float(_) => RuntimeType::Float,
            Value::Str(_) => RuntimeType::Str,
            Value::List(_) => RuntimeType::List,
            Value::Map(_) => RuntimeType::Map,
            Value::Host(obj) => RuntimeType::Host(HostType {
                id: obj.as_any().type_id(),
                name: obj.type_name(),
            }),
        }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Condition semantics: `null`, `false` and the empty string are false.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null | Value::Bool(false) => false,
            Value::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Downcast a host value to its concrete type.
    pub fn downcast_host<T: HostObject>(&self) -> Option<&T> {
        match self {
            Value::Host(obj) => obj.as_any().downcast_ref::<T>(),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Host(a), Value::Host(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => f.write_str(s),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Map(entries) => {
                f.write_str("{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}={v}")?;
                }
                f.write_str("}")
            }
            Value::Host(obj) => f.write_str(&obj.render()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Arc::from(s))
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(Arc::new(items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Debug)]
    struct Widget;

    impl HostObject for Widget {
        fn as_any(&self) -> &dyn Any {
            self
        }

        fn render(&self) -> String {
            "<widget>".to_string()
        }
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(Value::from("x").is_truthy());
        assert!(Value::Int(0).is_truthy());
        assert!(Value::list([]).is_truthy());
    }

    #[test]
    fn test_display() {
        let v = Value::map([
            ("b", Value::list([Value::Int(1), Value::from("two")])),
            ("a", Value::Bool(true)),
        ]);
        assert_eq!(v.to_string(), "{a=true, b=[1, two]}");
        assert_eq!(Value::Null.to_string(), "");
        assert_eq!(Value::host(Widget).to_string(), "<widget>");
    }

    #[test]
    fn test_runtime_types_distinguish_hosts() {
        let w = Value::host(Widget);
        assert_eq!(w.runtime_type(), RuntimeType::Host(HostType::of::<Widget>()));
        assert_ne!(w.runtime_type(), Value::from("w").runtime_type());
        assert_eq!(Value::Int(1).runtime_type().name(), "int");
        assert!(w.downcast_host::<Widget>().is_some());
    }

    #[test]
    fn test_host_equality_is_identity() {
        let a = Value::host(Widget);
        let b = Value::host(Widget);
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }
}
