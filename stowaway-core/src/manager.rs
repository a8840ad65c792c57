//! PluginManager - owns the loaded bundles and publishes their state
//!
//! All shared state (bundle map, component registry, resource overlay) lives
//! in one immutable [`Snapshot`] behind an [`ArcSwap`]. Readers load the
//! current snapshot without locking. Writers build everything they can off to
//! the side, then take the write lock only to re-check preconditions, derive
//! the next snapshot and publish it in a single store. A failed load never
//! publishes anything.

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Instant;

use stowaway_bundle_api::{EntryPoint, EventOutcome, LifecycleEvent, ResourceValue};

use crate::config::CoreConfig;
use crate::descriptor::{self, BundleDescriptor, BundleId};
use crate::dispatch::LifecycleDispatcher;
use crate::error::PluginError;
use crate::host::{HostContext, HostHandle};
use crate::overlay::{BundleResources, ResourceOverlay};
use crate::registry::{ComponentRegistry, RegistrationResult, RegistryEntry};
use crate::resolver::{CodePayload, CodeResolutionContext, ModuleCatalog};
use crate::scope::BundleScope;
use crate::selection::BundleSelection;
use crate::source::{BundleSource, DirectorySource};

/// A bundle that made it into the published state
#[derive(Debug)]
pub(crate) struct LoadedBundle {
    pub(crate) descriptor: BundleDescriptor,
    pub(crate) location: PathBuf,
    pub(crate) scope: Arc<BundleScope>,
    pub(crate) registration: RegistrationResult,
    pub(crate) loaded_at: DateTime<Utc>,
}

/// One consistent view of everything loaded
#[derive(Debug, Default)]
pub(crate) struct Snapshot {
    pub(crate) bundles: HashMap<BundleId, Arc<LoadedBundle>>,
    /// Bundle ids in load order
    pub(crate) order: Vec<BundleId>,
    pub(crate) registry: ComponentRegistry,
    pub(crate) overlay: ResourceOverlay,
}

impl Snapshot {
    fn missing_dependencies(&self, descriptor: &BundleDescriptor) -> Vec<BundleId> {
        descriptor
            .dependencies
            .iter()
            .filter(|dep| !self.bundles.contains_key(*dep))
            .cloned()
            .collect()
    }

    fn dependents_of(&self, bundle_id: &str) -> Vec<BundleId> {
        let mut dependents: Vec<BundleId> = self
            .bundles
            .values()
            .filter(|b| b.descriptor.dependencies.contains(bundle_id))
            .map(|b| b.descriptor.id.clone())
            .collect();
        dependents.sort();
        dependents
    }

    fn check_loadable(&self, descriptor: &BundleDescriptor) -> Result<(), PluginError> {
        if self.bundles.contains_key(&descriptor.id) {
            return Err(PluginError::AlreadyLoaded {
                bundle: descriptor.id.clone(),
            });
        }

        let missing = self.missing_dependencies(descriptor);
        if !missing.is_empty() {
            return Err(PluginError::DependencyMissing {
                bundle: descriptor.id.clone(),
                missing,
            });
        }

        Ok(())
    }
}

/// Information about a loaded bundle
#[derive(Debug, Clone, PartialEq)]
pub struct BundleInfo {
    pub id: BundleId,
    pub version: u64,
    pub description: Option<String>,
    pub path: PathBuf,
    pub dependencies: Vec<BundleId>,
    /// Exported symbols, sorted
    pub symbols: Vec<String>,
    /// Number of resources the bundle contributes
    pub resources: usize,
    pub registration: RegistrationResult,
    pub native: bool,
    pub loaded_at: DateTime<Utc>,
}

impl BundleInfo {
    fn from_loaded(bundle: &LoadedBundle) -> Self {
        Self {
            id: bundle.descriptor.id.clone(),
            version: bundle.descriptor.version,
            description: bundle.descriptor.description.clone(),
            path: bundle.location.clone(),
            dependencies: bundle.descriptor.dependencies.iter().cloned().collect(),
            symbols: bundle
                .scope
                .code()
                .symbols()
                .into_iter()
                .map(str::to_string)
                .collect(),
            resources: bundle.scope.resources().len(),
            registration: bundle.registration.clone(),
            native: bundle.scope.code().is_native(),
            loaded_at: bundle.loaded_at,
        }
    }
}

/// A bundle `init` could not load
#[derive(Debug)]
pub struct LoadFailure {
    pub location: PathBuf,
    /// Known once the manifest parsed
    pub bundle: Option<BundleId>,
    pub error: PluginError,
}

/// Outcome of the one discovery and load pass
#[derive(Debug, Default)]
pub struct InitReport {
    /// Loaded bundle ids, in load order
    pub loaded: Vec<BundleId>,
    /// Disabled in the selection file, shadowed by an earlier directory, or
    /// loaded before `init` ran
    pub skipped: Vec<BundleId>,
    pub failed: Vec<LoadFailure>,
}

impl InitReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// The plugin manager loads, unloads and routes to bundles
pub struct PluginManager {
    state: Arc<ArcSwap<Snapshot>>,
    /// Serializes writers; readers never take it
    write_lock: Mutex<()>,
    init: OnceLock<InitReport>,
    source: Arc<dyn BundleSource>,
    catalog: ModuleCatalog,
    host: HostHandle,
    selection_path: Option<PathBuf>,
}

impl PluginManager {
    /// Create a manager reading bundles from `source`, with no selection file
    pub fn new(source: Arc<dyn BundleSource>, host: HostHandle) -> Self {
        Self {
            state: Arc::new(ArcSwap::from_pointee(Snapshot::default())),
            write_lock: Mutex::new(()),
            init: OnceLock::new(),
            source,
            catalog: ModuleCatalog::default(),
            host,
            selection_path: None,
        }
    }

    /// Create a manager over the directories named by `config`
    pub fn from_config(config: &CoreConfig, host: HostHandle) -> Self {
        let source = DirectorySource::new(config.bundle_dirs());
        Self::new(Arc::new(source), host).with_selection(config.selection_path.clone())
    }

    pub fn from_host_context(ctx: HostContext) -> Self {
        let HostContext {
            host,
            config,
            catalog,
            source,
        } = ctx;

        let manager = match source {
            Some(source) => Self::new(source, host)
                .with_selection(config.selection_path.clone()),
            None => Self::from_config(&config, host),
        };
        manager.with_catalog(catalog)
    }

    /// Builder: modules linked into the host
    pub fn with_catalog(mut self, catalog: ModuleCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Builder: honor the selection file at `path` during `init`
    pub fn with_selection(mut self, path: impl Into<PathBuf>) -> Self {
        self.selection_path = Some(path.into());
        self
    }

    pub fn host(&self) -> &HostHandle {
        &self.host
    }

    /// Discover and load every enabled bundle, once.
    ///
    /// The first caller runs the pass; concurrent callers block until it is
    /// done, and every caller gets the same report.
    pub fn init(&self) -> &InitReport {
        self.init.get_or_init(|| self.run_init())
    }

    pub fn is_initialized(&self) -> bool {
        self.init.get().is_some()
    }

    fn run_init(&self) -> InitReport {
        let start = Instant::now();
        let mut report = InitReport::default();

        let selection = match &self.selection_path {
            Some(path) => BundleSelection::load(path).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable selection file");
                BundleSelection::default()
            }),
            None => BundleSelection::default(),
        };

        let locations = match self.source.discover() {
            Ok(locations) => locations,
            Err(e) => {
                tracing::error!(error = %e, "Bundle discovery failed");
                report.failed.push(LoadFailure {
                    location: e.path().to_path_buf(),
                    bundle: None,
                    error: e.into(),
                });
                return report;
            }
        };

        // 1. Parse every manifest before loading anything
        let mut pending: Vec<(BundleDescriptor, PathBuf)> = Vec::new();
        let mut seen = HashSet::new();
        for location in locations {
            let parsed = self
                .source
                .read_bundle(&location)
                .map_err(PluginError::from)
                .and_then(|payload| Ok((descriptor::read(&payload)?, payload.location)));

            let (descriptor, location) = match parsed {
                Ok(parsed) => parsed,
                Err(e) => {
                    tracing::error!(path = %location.display(), error = %e, "Failed to read bundle");
                    report.failed.push(LoadFailure {
                        location,
                        bundle: None,
                        error: e,
                    });
                    continue;
                }
            };

            if !selection.is_enabled(&descriptor.id) {
                tracing::debug!(bundle = %descriptor.id, "Bundle disabled, skipping");
                report.skipped.push(descriptor.id);
                continue;
            }
            if !seen.insert(descriptor.id.clone()) {
                tracing::debug!(
                    bundle = %descriptor.id,
                    path = %location.display(),
                    "Bundle shadowed by an earlier directory, skipping"
                );
                report.skipped.push(descriptor.id);
                continue;
            }
            if self.is_loaded(&descriptor.id) {
                tracing::debug!(bundle = %descriptor.id, "Bundle already loaded, skipping");
                report.skipped.push(descriptor.id);
                continue;
            }

            pending.push((descriptor, location));
        }

        // 2. Load in dependency order, one round per dependency level
        loop {
            let mut progressed = false;
            let mut deferred = Vec::new();

            for (descriptor, location) in pending {
                let ready = self.state.load().missing_dependencies(&descriptor).is_empty();
                if !ready {
                    deferred.push((descriptor, location));
                    continue;
                }

                let id = descriptor.id.clone();
                match self.load_descriptor(descriptor, location.clone()) {
                    Ok(id) => {
                        report.loaded.push(id);
                        progressed = true;
                    }
                    Err(e) => {
                        tracing::error!(bundle = %id, error = %e, "Failed to load bundle");
                        report.failed.push(LoadFailure {
                            location,
                            bundle: Some(id),
                            error: e,
                        });
                    }
                }
            }

            pending = deferred;
            if !progressed || pending.is_empty() {
                break;
            }
        }

        // 3. Whatever is left has a missing or cyclic dependency
        for (descriptor, location) in pending {
            let id = descriptor.id.clone();
            let error = match self.state.load().check_loadable(&descriptor) {
                Err(e) => e,
                Ok(()) => PluginError::DependencyMissing {
                    bundle: id.clone(),
                    missing: descriptor.dependencies.iter().cloned().collect(),
                },
            };
            tracing::error!(bundle = %id, error = %error, "Failed to load bundle");
            report.failed.push(LoadFailure {
                location,
                bundle: Some(id),
                error,
            });
        }

        tracing::info!(
            loaded = report.loaded.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Plugin manager initialized"
        );

        report
    }

    /// Load the bundle at `path` and return its id.
    ///
    /// Fails without changing any visible state.
    pub fn load(&self, path: &Path) -> Result<BundleId, PluginError> {
        let payload = self.source.read_bundle(path)?;
        let descriptor = descriptor::read(&payload)?;
        self.load_descriptor(descriptor, payload.location)
    }

    fn load_descriptor(
        &self,
        descriptor: BundleDescriptor,
        location: PathBuf,
    ) -> Result<BundleId, PluginError> {
        let id = descriptor.id.clone();

        // 1. Cheap checks against the current state before doing any work
        self.state.load().check_loadable(&descriptor)?;

        // 2. Build code and resources off-lock; this may hit storage
        let payload = CodePayload::locate(&descriptor, &location, &self.catalog)?;
        let code = Arc::new(CodeResolutionContext::build(
            &id,
            descriptor.api_version,
            payload,
            self.host.clone(),
        )?);
        let resources = Arc::new(BundleResources::build(
            &descriptor,
            &location,
            self.source.as_ref(),
        )?);

        // 3. Resolve entry points off-lock too
        let resolvable: HashSet<String> = descriptor
            .declared_components
            .iter()
            .map(|decl| decl.entry_point.symbol())
            .filter(|symbol| code.resolve(symbol).is_ok())
            .map(str::to_string)
            .collect();

        let scope = Arc::new(BundleScope::new(code, Arc::clone(&resources)));

        // 4. Publish
        let registration = {
            let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
            let current = self.state.load_full();
            current.check_loadable(&descriptor)?;

            let overlay = current.overlay.merge(resources)?;
            let mut registry = current.registry.clone();
            let registration =
                registry.register_checked(&id, &descriptor.declared_components, |entry| {
                    resolvable.contains(entry.symbol())
                });

            let loaded = Arc::new(LoadedBundle {
                descriptor,
                location,
                scope,
                registration: registration.clone(),
                loaded_at: Utc::now(),
            });

            let mut bundles = current.bundles.clone();
            bundles.insert(id.clone(), loaded);
            let mut order = current.order.clone();
            order.push(id.clone());

            self.state.store(Arc::new(Snapshot {
                bundles,
                order,
                registry,
                overlay,
            }));
            registration
        };

        tracing::info!(
            bundle = %id,
            components = registration.accepted.len(),
            rejected = registration.rejected.len(),
            "Bundle loaded"
        );

        Ok(id)
    }

    /// Unload a bundle no other loaded bundle depends on.
    ///
    /// New dispatches stop reaching it at once. Calls already running keep the
    /// bundle alive; its module's `on_unload` runs when the last one returns.
    pub fn unload(&self, bundle_id: &str) -> Result<(), PluginError> {
        let (previous, removed) = {
            let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
            let current = self.state.load_full();

            if !current.bundles.contains_key(bundle_id) {
                return Err(PluginError::BundleNotLoaded {
                    bundle: bundle_id.to_string(),
                });
            }

            let dependents = current.dependents_of(bundle_id);
            if !dependents.is_empty() {
                return Err(PluginError::DependentBundlesStillLoaded {
                    bundle: bundle_id.to_string(),
                    dependents,
                });
            }

            let mut registry = current.registry.clone();
            let removed = registry.unregister_all(bundle_id);
            let overlay = current.overlay.without(bundle_id);
            let mut bundles = current.bundles.clone();
            bundles.remove(bundle_id);
            let order = current
                .order
                .iter()
                .filter(|id| *id != bundle_id)
                .cloned()
                .collect();

            self.state.store(Arc::new(Snapshot {
                bundles,
                order,
                registry,
                overlay,
            }));
            (current, removed)
        };

        // The old snapshot may hold the last reference to the bundle; release
        // it after the write lock so on_unload never runs under it.
        drop(previous);

        tracing::info!(bundle = %bundle_id, components = removed.len(), "Bundle unloaded");
        Ok(())
    }

    /// Loaded bundles, in load order
    pub fn bundles(&self) -> Vec<BundleInfo> {
        let snapshot = self.state.load();
        snapshot
            .order
            .iter()
            .filter_map(|id| snapshot.bundles.get(id))
            .map(|bundle| BundleInfo::from_loaded(bundle))
            .collect()
    }

    pub fn bundle(&self, bundle_id: &str) -> Option<BundleInfo> {
        self.state
            .load()
            .bundles
            .get(bundle_id)
            .map(|bundle| BundleInfo::from_loaded(bundle))
    }

    pub fn is_loaded(&self, bundle_id: &str) -> bool {
        self.state.load().bundles.contains_key(bundle_id)
    }

    /// Loaded bundles that declare `bundle_id` as a dependency, sorted
    pub fn dependents_of(&self, bundle_id: &str) -> Vec<BundleId> {
        self.state.load().dependents_of(bundle_id)
    }

    /// The registry entry for a component
    pub fn lookup(&self, component_id: &str) -> Result<Arc<RegistryEntry>, PluginError> {
        self.state
            .load()
            .registry
            .lookup(component_id)
            .ok_or_else(|| PluginError::ComponentNotFound {
                component: component_id.to_string(),
            })
    }

    /// All registered components, sorted by id
    pub fn components(&self) -> Vec<Arc<RegistryEntry>> {
        self.state.load().registry.entries()
    }

    /// Look up a resource by key, optionally restricted to one bundle
    pub fn query_resource(
        &self,
        key: &str,
        bundle: Option<&str>,
    ) -> Result<Arc<ResourceValue>, PluginError> {
        let snapshot = self.state.load();
        if let Some(bundle) = bundle {
            Self::require_loaded(&snapshot, bundle)?;
        }
        snapshot.overlay.query(key, bundle, &self.host)
    }

    /// Look up a resource by host-compatible id, optionally restricted to one bundle
    pub fn query_resource_id(
        &self,
        id: u32,
        bundle: Option<&str>,
    ) -> Result<Arc<ResourceValue>, PluginError> {
        let snapshot = self.state.load();
        if let Some(bundle) = bundle {
            Self::require_loaded(&snapshot, bundle)?;
        }
        snapshot.overlay.query_id(id, bundle, &self.host)
    }

    /// Resolve a symbol in one bundle's code, falling back to the host.
    ///
    /// A bundle-local entry keeps the bundle's code loaded until it is dropped,
    /// even if the bundle is unloaded meanwhile.
    pub fn resolve(
        &self,
        bundle_id: &str,
        symbol: &str,
    ) -> Result<Arc<dyn EntryPoint>, PluginError> {
        let bundle = self.state.load().bundles.get(bundle_id).cloned().ok_or_else(|| {
            PluginError::BundleNotLoaded {
                bundle: bundle_id.to_string(),
            }
        })?;
        bundle.scope.code().resolve(symbol)
    }

    fn require_loaded(snapshot: &Snapshot, bundle_id: &str) -> Result<(), PluginError> {
        if snapshot.bundles.contains_key(bundle_id) {
            Ok(())
        } else {
            Err(PluginError::BundleNotLoaded {
                bundle: bundle_id.to_string(),
            })
        }
    }

    /// A dispatcher reading this manager's state
    pub fn dispatcher(&self) -> LifecycleDispatcher {
        LifecycleDispatcher::new(Arc::clone(&self.state))
    }

    /// Route a lifecycle event to the bundle that owns `component_id`
    pub fn dispatch(
        &self,
        component_id: &str,
        event: &LifecycleEvent,
    ) -> Result<EventOutcome, PluginError> {
        self.dispatcher().dispatch(component_id, event)
    }

    /// The host is shutting down: reject every later fallback call
    pub fn on_host_detach(&self) {
        self.host.detach();
        tracing::info!("Host detached from plugin core");
    }

    #[cfg(test)]
    pub(crate) fn snapshot(&self) -> Arc<Snapshot> {
        self.state.load_full()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use stowaway_bundle_api::{BundleError, BundleModule, ExportTable, ResolutionScope};

    #[derive(Default)]
    struct EchoModule;

    impl BundleModule for EchoModule {
        fn exports(&self, table: &mut ExportTable) -> Result<(), BundleError> {
            table.export(
                "Echo",
                |event: &LifecycleEvent,
                 scope: &dyn ResolutionScope|
                 -> Result<EventOutcome, BundleError> {
                    Ok(EventOutcome::Reply(serde_json::json!({
                        "bundle": scope.bundle_id(),
                        "event": event.name(),
                    })))
                },
            );
            Ok(())
        }
    }

    fn catalog() -> ModuleCatalog {
        ModuleCatalog::new().with_module("echo", || Box::new(EchoModule) as Box<dyn BundleModule>)
    }

    fn manifest(id: &str, deps: &[&str], components: &[&str]) -> String {
        let deps: Vec<String> = deps.iter().map(|d| format!("\"{d}\"")).collect();
        let mut text = format!(
            "id = \"{id}\"\nversion = 1\ndependencies = [{}]\n\n[code]\nformat = \"builtin\"\nmodule = \"echo\"\n",
            deps.join(", ")
        );
        for component in components {
            text.push_str(&format!(
                "\n[[components]]\nid = \"{component}\"\nkind = \"service\"\nentry = \"Echo\"\n"
            ));
        }
        text
    }

    fn manager(source: MemorySource) -> PluginManager {
        PluginManager::new(Arc::new(source), HostHandle::unattached()).with_catalog(catalog())
    }

    #[test]
    fn test_load_and_dispatch() {
        let source = MemorySource::new().with_bundle("mem/alpha", manifest("alpha", &[], &["svc.a"]));
        let manager = manager(source);

        let id = manager.load(Path::new("mem/alpha")).unwrap();
        assert_eq!(id, "alpha");
        assert!(manager.is_loaded("alpha"));
        assert_eq!(manager.lookup("svc.a").unwrap().bundle_id, "alpha");

        let outcome = manager.dispatch("svc.a", &LifecycleEvent::Start).unwrap();
        assert_eq!(
            outcome,
            EventOutcome::Reply(serde_json::json!({"bundle": "alpha", "event": "start"}))
        );
    }

    #[test]
    fn test_failed_load_publishes_nothing() {
        let source = MemorySource::new()
            .with_bundle("mem/alpha", manifest("alpha", &[], &["svc.a"]))
            .with_bundle("mem/beta", manifest("beta", &["missing"], &["svc.b"]));
        let manager = manager(source);
        manager.load(Path::new("mem/alpha")).unwrap();

        let before = manager.snapshot();
        let result = manager.load(Path::new("mem/beta"));

        assert!(matches!(result, Err(PluginError::DependencyMissing { .. })));
        assert!(Arc::ptr_eq(&before, &manager.snapshot()));
    }

    #[test]
    fn test_load_twice_is_already_loaded() {
        let source = MemorySource::new().with_bundle("mem/alpha", manifest("alpha", &[], &[]));
        let manager = manager(source);
        manager.load(Path::new("mem/alpha")).unwrap();

        let before = manager.snapshot();
        assert!(matches!(
            manager.load(Path::new("mem/alpha")),
            Err(PluginError::AlreadyLoaded { .. })
        ));
        assert!(Arc::ptr_eq(&before, &manager.snapshot()));
    }

    #[test]
    fn test_unresolved_entry_point_is_rejected_not_fatal() {
        let text = "id = \"alpha\"\nversion = 1\n\n[[components]]\nid = \"svc.a\"\nkind = \"service\"\nentry = \"Nowhere\"\n";
        let manager = manager(MemorySource::new().with_bundle("mem/alpha", text));

        manager.load(Path::new("mem/alpha")).unwrap();
        let info = manager.bundle("alpha").unwrap();
        assert!(info.registration.accepted.is_empty());
        assert_eq!(info.registration.rejected.len(), 1);
        assert!(manager.lookup("svc.a").is_err());
    }

    #[test]
    fn test_init_orders_by_dependency() {
        // "a-child" sorts before "z-base" but depends on it.
        let source = MemorySource::new()
            .with_bundle("mem/a-child", manifest("child", &["base"], &["svc.child"]))
            .with_bundle("mem/z-base", manifest("base", &[], &["svc.base"]));
        let manager = manager(source);

        let report = manager.init();
        assert!(report.is_clean());
        assert_eq!(report.loaded, vec!["base", "child"]);

        let order: Vec<_> = manager.bundles().into_iter().map(|b| b.id).collect();
        assert_eq!(order, vec!["base", "child"]);
    }

    #[test]
    fn test_init_reports_cycles_and_bad_manifests() {
        let source = MemorySource::new()
            .with_bundle("mem/one", manifest("one", &["two"], &[]))
            .with_bundle("mem/two", manifest("two", &["one"], &[]))
            .with_bundle("mem/broken", "this is not toml = [")
            .with_bundle("mem/fine", manifest("fine", &[], &[]));
        let manager = manager(source);

        let report = manager.init();
        assert_eq!(report.loaded, vec!["fine"]);
        assert_eq!(report.failed.len(), 3);
        assert!(report.failed.iter().any(|f| f.bundle.is_none()
            && matches!(f.error, PluginError::MalformedBundle { .. })));
        assert_eq!(
            report
                .failed
                .iter()
                .filter(|f| matches!(f.error, PluginError::DependencyMissing { .. }))
                .count(),
            2
        );
    }

    #[test]
    fn test_init_survives_panicking_module_constructor() {
        let catalog = catalog().with_module("boom", || -> Box<dyn BundleModule> {
            panic!("constructor exploded")
        });
        let source = MemorySource::new()
            .with_bundle(
                "mem/boom",
                "id = \"boom\"\nversion = 1\n\n[code]\nformat = \"builtin\"\nmodule = \"boom\"\n",
            )
            .with_bundle("mem/fine", manifest("fine", &[], &["svc.fine"]));
        let manager =
            PluginManager::new(Arc::new(source), HostHandle::unattached()).with_catalog(catalog);

        let report = manager.init();
        assert!(manager.is_initialized());
        assert_eq!(report.loaded, vec!["fine"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].bundle.as_deref(), Some("boom"));
        assert!(matches!(report.failed[0].error, PluginError::CodeLoad { .. }));
        assert!(manager.lookup("svc.fine").is_ok());
    }

    #[test]
    fn test_init_runs_once() {
        let source = MemorySource::new().with_bundle("mem/alpha", manifest("alpha", &[], &[]));
        let manager = manager(source);

        assert!(!manager.is_initialized());
        let first = manager.init() as *const InitReport;
        let second = manager.init() as *const InitReport;
        assert!(manager.is_initialized());
        assert_eq!(first, second);
        assert_eq!(manager.bundles().len(), 1);
    }

    #[test]
    fn test_init_honors_selection() {
        let dir = tempfile::TempDir::new().unwrap();
        let selection_path = dir.path().join("selection.toml");
        BundleSelection::update(&selection_path, |s| s.disable("beta")).unwrap();

        let source = MemorySource::new()
            .with_bundle("mem/alpha", manifest("alpha", &[], &[]))
            .with_bundle("mem/beta", manifest("beta", &[], &[]));
        let manager = manager(source).with_selection(&selection_path);

        let report = manager.init();
        assert_eq!(report.loaded, vec!["alpha"]);
        assert_eq!(report.skipped, vec!["beta"]);
    }

    #[test]
    fn test_unload_unknown_bundle() {
        let manager = manager(MemorySource::new());
        assert!(matches!(
            manager.unload("ghost"),
            Err(PluginError::BundleNotLoaded { .. })
        ));
    }

    #[test]
    fn test_query_resource_for_unloaded_bundle() {
        let manager = manager(MemorySource::new());
        assert!(matches!(
            manager.query_resource("key", Some("ghost")),
            Err(PluginError::BundleNotLoaded { .. })
        ));
        assert!(matches!(
            manager.resolve("ghost", "Echo"),
            Err(PluginError::BundleNotLoaded { .. })
        ));
    }

    #[test]
    fn test_resolve_through_manager() {
        let source = MemorySource::new().with_bundle("mem/alpha", manifest("alpha", &[], &[]));
        let manager = manager(source);
        manager.load(Path::new("mem/alpha")).unwrap();

        assert!(manager.resolve("alpha", "Echo").is_ok());
        // No host behind the handle.
        assert!(matches!(
            manager.resolve("alpha", "Other"),
            Err(PluginError::HostDetached)
        ));
    }
}
