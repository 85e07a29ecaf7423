//! `EngineBuilder` for assembling an [`Engine`] from its collaborators.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use super::Engine;
use crate::config::RenderConfig;
use crate::events::{EventCartridge, SharedEventCartridge};
use crate::icache::IntrospectionCache;
use crate::macros::MacroTable;
use crate::methods::{MethodResolver, MethodTable};
use crate::resource::ResourceLoader;

/// Builder for [`Engine`].
///
/// Everything is optional: the default engine has the default
/// [`RenderConfig`], no resource loader (so `#parse` fails), the stock
/// [`MethodTable`], no macros and no event cartridge.
#[derive(Default)]
pub struct EngineBuilder {
    config: RenderConfig,
    loader: Option<Arc<dyn ResourceLoader>>,
    resolver: Option<Arc<dyn MethodResolver>>,
    macros: MacroTable,
    libraries: FxHashMap<String, MacroTable>,
    library_order: Vec<String>,
    cache: Option<IntrospectionCache>,
    cartridge: Option<SharedEventCartridge>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn config(mut self, config: RenderConfig) -> Self {
        self.config = config;
        self
    }

    /// Loader used by `#parse`.
    #[must_use]
    pub fn loader(mut self, loader: impl ResourceLoader + 'static) -> Self {
        self.loader = Some(Arc::new(loader));
        self
    }

    /// Method resolver. Replaces the stock [`MethodTable`].
    #[must_use]
    pub fn resolver(mut self, resolver: Arc<dyn MethodResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Inline macro definitions. They win over library macros of the same name.
    #[must_use]
    pub fn macros(mut self, macros: MacroTable) -> Self {
        self.macros = macros;
        self
    }

    /// Add a macro library. Libraries are searched in the order added.
    #[must_use]
    pub fn macro_library(mut self, name: impl Into<String>, macros: MacroTable) -> Self {
        let name = name.into();
        if self.libraries.insert(name.clone(), macros).is_none() {
            self.library_order.push(name);
        }
        self
    }

    /// Share this cache across every render. Implies
    /// `share_introspection_cache`.
    #[must_use]
    pub fn introspection_cache(mut self, cache: IntrospectionCache) -> Self {
        self.cache = Some(cache);
        self.config.share_introspection_cache = true;
        self
    }

    #[must_use]
    pub fn event_cartridge(mut self, cartridge: impl EventCartridge + 'static) -> Self {
        self.cartridge = Some(Arc::new(cartridge));
        self
    }

    #[must_use]
    pub fn shared_event_cartridge(mut self, cartridge: SharedEventCartridge) -> Self {
        self.cartridge = Some(cartridge);
        self
    }

    pub fn build(self) -> Engine {
        let shared_cache = match (self.cache, self.config.share_introspection_cache) {
            (Some(cache), _) => Some(cache),
            (None, true) => Some(IntrospectionCache::new()),
            (None, false) => None,
        };
        Engine {
            config: self.config,
            loader: self.loader,
            resolver: self
                .resolver
                .unwrap_or_else(|| Arc::new(MethodTable::new())),
            macros: self.macros,
            libraries: self.libraries,
            library_order: self.library_order,
            shared_cache,
            cartridge: self.cartridge,
        }
    }
}
