//! Active resolution scope for the current thread
//!
//! The dispatcher installs a [`BundleScope`] before invoking an entry point
//! and the returned [`ScopeGuard`] removes it again, also when the entry point
//! panics. Scopes nest: a dispatch issued from inside another dispatch pushes
//! its own scope and pops it on return. Each thread has its own stack, so
//! concurrent dispatches never see each other's scope.

use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::Arc;

use stowaway_bundle_api::{BundleError, EntryPoint, ResolutionScope, ResourceValue};

use crate::error::PluginError;
use crate::overlay::BundleResources;
use crate::resolver::CodeResolutionContext;

thread_local! {
    static ACTIVE: RefCell<Vec<Arc<BundleScope>>> = const { RefCell::new(Vec::new()) };
}

/// Everything one bundle's code may see: its own code and resources, then the host
#[derive(Debug)]
pub struct BundleScope {
    code: Arc<CodeResolutionContext>,
    resources: Arc<BundleResources>,
}

impl BundleScope {
    pub fn new(code: Arc<CodeResolutionContext>, resources: Arc<BundleResources>) -> Self {
        Self { code, resources }
    }

    pub fn code(&self) -> &Arc<CodeResolutionContext> {
        &self.code
    }

    pub fn resources(&self) -> &Arc<BundleResources> {
        &self.resources
    }
}

impl ResolutionScope for BundleScope {
    fn bundle_id(&self) -> &str {
        self.code.bundle_id()
    }

    fn resolve(&self, symbol: &str) -> Result<Arc<dyn EntryPoint>, BundleError> {
        self.code.resolve(symbol).map_err(|e| match e {
            PluginError::SymbolNotFound { symbol } => BundleError::SymbolNotFound(symbol),
            other => BundleError::custom(other.to_string()),
        })
    }

    fn resource(&self, key: &str) -> Option<Arc<ResourceValue>> {
        self.resources.query(key, self.code.host()).ok()
    }

    fn resource_by_id(&self, id: u32) -> Option<Arc<ResourceValue>> {
        self.resources.query_id(id, self.code.host()).ok()
    }
}

/// Removes the scope it installed when dropped.
///
/// Not `Send`: it must drop on the thread that installed it.
#[must_use = "the scope is removed as soon as the guard is dropped"]
pub struct ScopeGuard {
    depth: usize,
    _not_send: PhantomData<*const ()>,
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        ACTIVE.with(|active| active.borrow_mut().truncate(self.depth - 1));
    }
}

/// Push `scope` onto this thread's stack
pub fn install(scope: Arc<BundleScope>) -> ScopeGuard {
    let depth = ACTIVE.with(|active| {
        let mut active = active.borrow_mut();
        active.push(scope);
        active.len()
    });
    ScopeGuard {
        depth,
        _not_send: PhantomData,
    }
}

/// The innermost scope on this thread
pub fn current() -> Option<Arc<BundleScope>> {
    ACTIVE.with(|active| active.borrow().last().cloned())
}

/// Id of the bundle whose code is running on this thread, if any
pub fn current_bundle() -> Option<String> {
    ACTIVE.with(|active| {
        active
            .borrow()
            .last()
            .map(|scope| scope.bundle_id().to_string())
    })
}

/// Number of nested scopes on this thread
pub fn depth() -> usize {
    ACTIVE.with(|active| active.borrow().len())
}
