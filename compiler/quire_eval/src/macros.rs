//! Macro definitions.
//!
//! Parsing `#macro` blocks is the host's job; the engine receives finished
//! definitions and looks them up by name when a directive is not built in.

use std::sync::Arc;

use quire_ir::Tree;
use rustc_hash::FxHashMap;

/// A named template fragment with positional parameters.
#[derive(Debug)]
pub struct Macro {
    pub name: String,
    /// Parameter names without the leading `$`.
    pub params: Vec<String>,
    pub body: Arc<Tree>,
}

impl Macro {
    pub fn new(name: impl Into<String>, params: Vec<String>, body: Arc<Tree>) -> Self {
        Macro {
            name: name.into(),
            params,
            body,
        }
    }
}

/// Macro definitions by name.
#[derive(Debug, Default, Clone)]
pub struct MacroTable {
    macros: FxHashMap<String, Arc<Macro>>,
}

impl MacroTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a definition, returning the replaced one.
    pub fn define(&mut self, definition: Macro) -> Option<Arc<Macro>> {
        self.macros
            .insert(definition.name.clone(), Arc::new(definition))
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Macro>> {
        self.macros.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.macros.contains_key(name)
    }

    /// Defined names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.macros.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.macros.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]
mod tests {
    use super::*;
    use quire_ir::{NodeKind, TreeBuilder};

    fn body(text: &str) -> Arc<Tree> {
        let mut b = TreeBuilder::new();
        let root = b.leaf(NodeKind::Text(text.into()));
        Arc::new(b.finish(root).unwrap())
    }

    #[test]
    fn test_define_and_replace() {
        let mut table = MacroTable::new();
        assert!(table
            .define(Macro::new("row", vec!["cell".into()], body("a")))
            .is_none());
        table.define(Macro::new("header", Vec::new(), body("h")));
        let old = table
            .define(Macro::new("row", Vec::new(), body("b")))
            .unwrap();

        assert_eq!(old.params, vec!["cell".to_string()]);
        assert!(table.get("row").unwrap().params.is_empty());
        assert!(table.contains("header"));
        assert_eq!(table.names(), vec!["header", "row"]);
        assert_eq!(table.len(), 2);
    }
}
