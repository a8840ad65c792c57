//! Host integration - the attach hook and the host fallback resolver
//!
//! The host calls [`on_host_attach`] once, very early in process lifetime.
//! The core keeps only a weak [`HostHandle`] to the host's resolver: it never
//! extends the host's lifetime, and after [`HostHandle::detach`] every fallback
//! call is rejected with [`PluginError::HostDetached`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Instant;

use stowaway_bundle_api::{EntryPoint, ResourceValue};

use crate::config::CoreConfig;
use crate::error::PluginError;
use crate::manager::PluginManager;
use crate::resolver::ModuleCatalog;
use crate::source::BundleSource;

/// The host's own code and resource tables, consulted on bundle lookup misses
pub trait HostResolver: Send + Sync {
    fn resolve_symbol(&self, symbol: &str) -> Option<Arc<dyn EntryPoint>>;

    fn resource(&self, key: &str) -> Option<Arc<ResourceValue>>;

    fn resource_by_id(&self, id: u32) -> Option<Arc<ResourceValue>>;
}

/// A simple in-memory host resolver
#[derive(Default, Clone)]
pub struct HostTable {
    symbols: HashMap<String, Arc<dyn EntryPoint>>,
    resources: HashMap<String, Arc<ResourceValue>>,
    resources_by_id: HashMap<u32, Arc<ResourceValue>>,
}

impl HostTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: add a host-native symbol
    pub fn with_symbol<E>(mut self, symbol: impl Into<String>, entry: E) -> Self
    where
        E: EntryPoint + 'static,
    {
        self.symbols.insert(symbol.into(), Arc::new(entry));
        self
    }

    /// Builder: add a host base resource, optionally with a host id
    pub fn with_resource(
        mut self,
        key: impl Into<String>,
        id: Option<u32>,
        value: ResourceValue,
    ) -> Self {
        let value = Arc::new(value);
        if let Some(id) = id {
            self.resources_by_id.insert(id, Arc::clone(&value));
        }
        self.resources.insert(key.into(), value);
        self
    }
}

impl HostResolver for HostTable {
    fn resolve_symbol(&self, symbol: &str) -> Option<Arc<dyn EntryPoint>> {
        self.symbols.get(symbol).cloned()
    }

    fn resource(&self, key: &str) -> Option<Arc<ResourceValue>> {
        self.resources.get(key).cloned()
    }

    fn resource_by_id(&self, id: u32) -> Option<Arc<ResourceValue>> {
        self.resources_by_id.get(&id).cloned()
    }
}

/// Non-owning handle to the host resolver
#[derive(Clone)]
pub struct HostHandle {
    inner: Weak<dyn HostResolver>,
    detached: Arc<AtomicBool>,
}

impl HostHandle {
    /// Handle to a host resolver the host keeps alive itself
    pub fn new<H: HostResolver + 'static>(host: &Arc<H>) -> Self {
        let weak: Weak<H> = Arc::downgrade(host);
        Self {
            inner: weak,
            detached: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle with no host behind it; every fallback call is rejected
    pub fn unattached() -> Self {
        let weak: Weak<HostTable> = Weak::new();
        Self {
            inner: weak,
            detached: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Reject all further calls through this handle and its clones
    pub fn detach(&self) {
        self.detached.store(true, Ordering::Release);
    }

    pub fn is_attached(&self) -> bool {
        !self.detached.load(Ordering::Acquire) && self.inner.strong_count() > 0
    }

    fn upgrade(&self) -> Result<Arc<dyn HostResolver>, PluginError> {
        if self.detached.load(Ordering::Acquire) {
            return Err(PluginError::HostDetached);
        }
        self.inner.upgrade().ok_or(PluginError::HostDetached)
    }

    pub fn resolve_symbol(&self, symbol: &str) -> Result<Arc<dyn EntryPoint>, PluginError> {
        self.upgrade()?
            .resolve_symbol(symbol)
            .ok_or_else(|| PluginError::SymbolNotFound {
                symbol: symbol.to_string(),
            })
    }

    pub fn resource(&self, key: &str) -> Result<Option<Arc<ResourceValue>>, PluginError> {
        Ok(self.upgrade()?.resource(key))
    }

    pub fn resource_by_id(&self, id: u32) -> Result<Option<Arc<ResourceValue>>, PluginError> {
        Ok(self.upgrade()?.resource_by_id(id))
    }
}

/// Everything the core needs from the host at attach time
pub struct HostContext {
    pub host: HostHandle,
    pub config: CoreConfig,
    pub catalog: ModuleCatalog,
    /// Overrides the directory source built from `config`
    pub source: Option<Arc<dyn BundleSource>>,
}

impl HostContext {
    pub fn new(host: HostHandle, config: CoreConfig) -> Self {
        Self {
            host,
            config,
            catalog: ModuleCatalog::default(),
            source: None,
        }
    }

    /// Builder: modules linked into the host
    pub fn with_catalog(mut self, catalog: ModuleCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Builder: use a custom bundle source
    pub fn with_source(mut self, source: Arc<dyn BundleSource>) -> Self {
        self.source = Some(source);
        self
    }
}

static INSTANCE: OnceLock<Arc<PluginManager>> = OnceLock::new();

/// The host attach hook.
///
/// Creates the process-wide [`PluginManager`] on first call and runs
/// [`PluginManager::init`]. Later calls return the existing instance and
/// ignore their context.
pub fn on_host_attach(ctx: HostContext) -> Arc<PluginManager> {
    let start = Instant::now();
    let mut created = false;
    let manager = INSTANCE.get_or_init(|| {
        created = true;
        Arc::new(PluginManager::from_host_context(ctx))
    });

    if !created {
        tracing::debug!("Plugin core already attached, ignoring new host context");
    }

    let report = manager.init();
    tracing::info!(
        loaded = report.loaded.len(),
        failed = report.failed.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Plugin core attached"
    );

    Arc::clone(manager)
}

/// The process-wide manager, if the host has attached
pub fn instance() -> Option<Arc<PluginManager>> {
    INSTANCE.get().cloned()
}

/// Signal host shutdown: fallback calls through the core are rejected from now on
pub fn on_host_detach() {
    if let Some(manager) = INSTANCE.get() {
        manager.on_host_detach();
    }
}
