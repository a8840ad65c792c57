//! Error types for the plugin core

use std::path::PathBuf;
use thiserror::Error;

use stowaway_bundle_api::BundleError;

/// Errors that can occur while loading, unloading, resolving or dispatching
#[derive(Error, Debug)]
pub enum PluginError {
    /// Manifest missing, unparsable or failing validation
    #[error("Malformed bundle at {path}: {reason}")]
    MalformedBundle { path: PathBuf, reason: String },

    /// The bundle's code payload could not be turned into a resolution context
    #[error("Failed to load code for bundle '{bundle}': {reason}")]
    CodeLoad { bundle: String, reason: String },

    /// The bundle's resources conflict with an already loaded bundle
    #[error("Resource conflict in bundle '{bundle}': {detail}")]
    ResourceConflict { bundle: String, detail: String },

    /// A declared dependency is not loaded
    #[error("Bundle '{bundle}' depends on bundles that are not loaded: {}", .missing.join(", "))]
    DependencyMissing { bundle: String, missing: Vec<String> },

    /// Other loaded bundles still depend on the bundle being unloaded
    #[error("Bundle '{bundle}' is still required by: {}", .dependents.join(", "))]
    DependentBundlesStillLoaded {
        bundle: String,
        dependents: Vec<String>,
    },

    /// No bundle with this id is loaded
    #[error("Bundle '{bundle}' is not loaded")]
    BundleNotLoaded { bundle: String },

    /// A bundle with this id is already loaded
    #[error("Bundle '{bundle}' is already loaded")]
    AlreadyLoaded { bundle: String },

    /// Symbol missing from the bundle and the host
    #[error("Symbol '{symbol}' not found")]
    SymbolNotFound { symbol: String },

    /// Resource missing from the overlay and the host
    #[error("Resource '{key}' not found")]
    ResourceNotFound { key: String },

    /// No loaded bundle owns the component (a routing miss, not a failure)
    #[error("No bundle owns component '{component}'")]
    ComponentNotFound { component: String },

    /// The bundle's entry point terminated abnormally
    #[error("Dispatch to '{component}' failed: {cause}")]
    Dispatch {
        component: String,
        cause: DispatchCause,
    },

    /// The host signalled shutdown or dropped its resolver
    #[error("Host resolver has been detached")]
    HostDetached,

    /// Selection file error (parsing, saving, etc.)
    #[error("Selection error: {0}")]
    Selection(String),

    /// The bundle source could not provide a payload
    #[error(transparent)]
    Source(#[from] SourceError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PluginError {
    /// Whether this error only means "no bundle owns the target".
    ///
    /// Hosts should fall back to their own resolution path instead of
    /// surfacing it.
    pub fn is_routing_miss(&self) -> bool {
        matches!(self, Self::ComponentNotFound { .. })
    }

    pub(crate) fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::MalformedBundle {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn code_load(bundle: &str, reason: impl Into<String>) -> Self {
        Self::CodeLoad {
            bundle: bundle.to_string(),
            reason: reason.into(),
        }
    }
}

/// Why a bundle entry point failed
#[derive(Error, Debug)]
pub enum DispatchCause {
    /// The entry point returned an error
    #[error("{0}")]
    Bundle(#[source] BundleError),

    /// The entry point panicked
    #[error("entry point panicked: {0}")]
    Panicked(String),
}

/// Errors from a bundle source
#[derive(Error, Debug)]
pub enum SourceError {
    /// Nothing at this path
    #[error("Bundle not found: {path}")]
    NotFound { path: PathBuf },

    /// Reading failed
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SourceError {
    /// The path the source failed on
    pub fn path(&self) -> &std::path::Path {
        match self {
            Self::NotFound { path } | Self::Io { path, .. } => path,
        }
    }

    pub(crate) fn from_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound { path }
        } else {
            Self::Io { path, source }
        }
    }
}
