//! ResolutionScope - what an entry point can see while it runs

use std::sync::Arc;

use crate::{BundleError, EntryPoint, ResourceValue};

/// The resolution context installed for the duration of one dispatch.
///
/// Every lookup is restricted to the bundle that owns the dispatched component,
/// falling back to the host. Other loaded bundles are never visible.
pub trait ResolutionScope {
    /// Id of the bundle that owns the current call
    fn bundle_id(&self) -> &str;

    /// Resolve a symbol: bundle code first, then the host
    fn resolve(&self, symbol: &str) -> Result<Arc<dyn EntryPoint>, BundleError>;

    /// Look up a resource by key: bundle resources first, then the host
    fn resource(&self, key: &str) -> Option<Arc<ResourceValue>>;

    /// Look up a resource by host-compatible id: bundle resources first, then the host
    fn resource_by_id(&self, id: u32) -> Option<Arc<ResourceValue>>;

    /// Look up a text resource, failing with [`BundleError::ResourceNotFound`]
    fn text(&self, key: &str) -> Result<String, BundleError> {
        self.resource(key)
            .and_then(|value| value.as_text().map(str::to_string))
            .ok_or_else(|| BundleError::ResourceNotFound(key.to_string()))
    }

    /// Log an info message tagged with the bundle id
    fn log_info(&self, message: &str) {
        tracing::info!(bundle = %self.bundle_id(), "{}", message);
    }

    /// Log a warning tagged with the bundle id
    fn log_warn(&self, message: &str) {
        tracing::warn!(bundle = %self.bundle_id(), "{}", message);
    }

    /// Log a debug message tagged with the bundle id
    fn log_debug(&self, message: &str) {
        tracing::debug!(bundle = %self.bundle_id(), "{}", message);
    }
}
