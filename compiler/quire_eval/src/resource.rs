//! Resources and the loading hook.
//!
//! Loading and caching templates from storage belongs to the host. The
//! engine only asks a [`ResourceLoader`] for a parsed tree by name when a
//! template pulls another one in, and records which resource is current.

use std::fmt;
use std::sync::Arc;

use quire_ir::Tree;
use rustc_hash::FxHashMap;

use crate::errors::{resource_not_found, RenderResult};

/// A named, parsed template.
#[derive(Clone)]
pub struct Resource {
    name: Arc<str>,
    tree: Arc<Tree>,
}

impl Resource {
    pub fn new(name: impl Into<Arc<str>>, tree: Arc<Tree>) -> Self {
        Resource {
            name: name.into(),
            tree,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tree(&self) -> &Arc<Tree> {
        &self.tree
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("name", &self.name)
            .field("tree", &self.tree.id())
            .finish()
    }
}

impl PartialEq for Resource {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && Arc::ptr_eq(&self.tree, &other.tree)
    }
}

/// Source of templates included by name.
pub trait ResourceLoader: Send + Sync {
    fn load(&self, name: &str) -> RenderResult<Resource>;
}

/// Loader over an in-memory table of parsed trees.
#[derive(Default)]
pub struct MemoryLoader {
    trees: FxHashMap<String, Arc<Tree>>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, tree: Tree) -> &mut Self {
        self.trees.insert(name.into(), Arc::new(tree));
        self
    }

    pub fn insert_shared(&mut self, name: impl Into<String>, tree: Arc<Tree>) -> &mut Self {
        self.trees.insert(name.into(), tree);
        self
    }
}

impl ResourceLoader for MemoryLoader {
    fn load(&self, name: &str) -> RenderResult<Resource> {
        self.trees
            .get(name)
            .map(|tree| Resource::new(name, Arc::clone(tree)))
            .ok_or_else(|| resource_not_found(name))
    }
}
