//! Handler registry and per-call sessions
//!
//! Every archive owns a [`HandlerRegistry`]. Nothing is process-global:
//! an `ice` or `deice` call opens a [`HandlerSession`] that binds each
//! registered provider to the archive's side-file store, uses the bound
//! handlers while encoding or decoding, and drops them when the call ends.

use std::fmt;
use std::sync::Arc;

use ahash::AHashMap;
use icer_format::Result;
use tracing::debug;

use crate::handler::{HandlerMetadata, HandlerProvider, TypeHandler};
use crate::side_file::SideFileStore;

/// Archive-owned map from record type name to handler provider
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    providers: AHashMap<String, Arc<dyn HandlerProvider>>,
}

impl HandlerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider, replacing any provider already registered for
    /// the same type name. Returns the replaced provider.
    pub fn register(
        &mut self,
        provider: Arc<dyn HandlerProvider>,
    ) -> Option<Arc<dyn HandlerProvider>> {
        let type_name = provider.type_name().to_string();
        debug!(type_name = %type_name, mode = provider.mode(), "registering handler");
        self.providers.insert(type_name, provider)
    }

    /// Remove the provider for `type_name`
    pub fn unregister(&mut self, type_name: &str) -> Option<Arc<dyn HandlerProvider>> {
        self.providers.remove(type_name)
    }

    /// Get the provider for `type_name`
    pub fn get(&self, type_name: &str) -> Option<Arc<dyn HandlerProvider>> {
        self.providers.get(type_name).cloned()
    }

    /// Whether a provider is registered for `type_name`
    pub fn contains(&self, type_name: &str) -> bool {
        self.providers.contains_key(type_name)
    }

    /// Number of registered providers
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether no provider is registered
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Metadata of every provider, sorted by type name
    pub fn list(&self) -> Vec<HandlerMetadata> {
        let mut list: Vec<HandlerMetadata> =
            self.providers.values().map(|p| p.metadata()).collect();
        list.sort_by(|a, b| a.type_name.cmp(&b.type_name));
        list
    }

    /// Bind every provider to `store`.
    ///
    /// Fails on the first provider whose mode cannot work against the store;
    /// handlers bound before the failure are dropped.
    pub fn open_session(&self, store: Arc<dyn SideFileStore>) -> Result<HandlerSession> {
        let mut handlers = AHashMap::with_capacity(self.providers.len());
        for (type_name, provider) in &self.providers {
            let handler = provider.bind(Arc::clone(&store))?;
            handlers.insert(type_name.clone(), handler);
        }
        debug!(handlers = handlers.len(), store = %store.kind(), "handler session opened");
        Ok(HandlerSession { handlers })
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("HandlerRegistry")
            .field("providers", &names)
            .finish()
    }
}

/// Handlers bound to one archive for the duration of one call
pub struct HandlerSession {
    handlers: AHashMap<String, Box<dyn TypeHandler>>,
}

impl HandlerSession {
    /// A session with no handlers; every record is encoded generically
    pub fn empty() -> Self {
        Self {
            handlers: AHashMap::new(),
        }
    }

    /// Handler bound for `type_name`
    pub fn get(&self, type_name: &str) -> Option<&dyn TypeHandler> {
        self.handlers.get(type_name).map(|h| h.as_ref())
    }

    /// Whether a handler is bound for `type_name`
    pub fn contains(&self, type_name: &str) -> bool {
        self.handlers.contains_key(type_name)
    }

    /// Number of bound handlers
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether the session has no handlers
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// End the session
    pub fn close(self) {}
}

impl Drop for HandlerSession {
    fn drop(&mut self) {
        debug!(handlers = self.handlers.len(), "handler session closed");
        self.handlers.clear();
    }
}

impl fmt::Debug for HandlerSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("HandlerSession")
            .field("handlers", &names)
            .finish()
    }
}
