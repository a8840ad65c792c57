//! Code resolver - per-bundle symbol tables with host fallback

use libloading::Library;
use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use stowaway_bundle_api::{
    API_VERSION, BundleError, BundleModule, EntryPoint, EventOutcome, ExportTable, LifecycleEvent,
    ResolutionScope,
};

use crate::descriptor::{BundleDescriptor, BundleId, CodeSpec};
use crate::error::PluginError;
use crate::host::HostHandle;

/// Creates a fresh module instance for a builtin bundle
pub type ModuleFactory = Arc<dyn Fn() -> Box<dyn BundleModule> + Send + Sync>;

/// Bundle modules linked into the host, addressed by `format = "builtin"`
#[derive(Default, Clone)]
pub struct ModuleCatalog {
    modules: HashMap<String, ModuleFactory>,
}

impl ModuleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: register a module by name
    pub fn with_module<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Box<dyn BundleModule> + Send + Sync + 'static,
    {
        self.modules.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn get(&self, name: &str) -> Option<&ModuleFactory> {
        self.modules.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }
}

/// A bundle's code payload, located but not yet loaded
pub enum CodePayload {
    /// Resource-only bundle
    Empty,
    /// Dynamic library on disk
    Native(PathBuf),
    /// Module linked into the host
    Builtin {
        name: String,
        factory: ModuleFactory,
    },
}

impl fmt::Debug for CodePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Native(path) => f.debug_tuple("Native").field(path).finish(),
            Self::Builtin { name, .. } => f.debug_struct("Builtin").field("name", name).finish(),
        }
    }
}

impl CodePayload {
    /// Interpret the `[code]` section of a descriptor.
    ///
    /// An unknown `format` or a missing `path`/`module` is a code load error.
    pub fn locate(
        descriptor: &BundleDescriptor,
        location: &Path,
        catalog: &ModuleCatalog,
    ) -> Result<Self, PluginError> {
        let id = &descriptor.id;
        let Some(CodeSpec {
            format,
            path,
            module,
        }) = &descriptor.code
        else {
            return Ok(Self::Empty);
        };

        match format.as_str() {
            "native" => {
                let path = path
                    .as_ref()
                    .ok_or_else(|| PluginError::code_load(id, "native code requires `path`"))?;
                Ok(Self::Native(location.join(path)))
            }
            "builtin" => {
                let name = module
                    .as_ref()
                    .ok_or_else(|| PluginError::code_load(id, "builtin code requires `module`"))?;
                let factory = catalog.get(name).cloned().ok_or_else(|| {
                    PluginError::code_load(id, format!("no builtin module named '{name}'"))
                })?;
                Ok(Self::Builtin {
                    name: name.clone(),
                    factory,
                })
            }
            other => Err(PluginError::code_load(
                id,
                format!("unsupported code format '{other}'"),
            )),
        }
    }
}

/// A bundle's code-lookup state.
///
/// Symbols resolve in the bundle's own table first and then through the weak
/// host handle. Other bundles are never consulted.
pub struct CodeResolutionContext {
    bundle_id: BundleId,
    symbols: HashMap<String, Arc<dyn EntryPoint>>,
    host: HostHandle,
    module: Option<Box<dyn BundleModule>>,
    /// Declared last so it is unmapped after the module and symbols are gone
    library: Option<Library>,
}

impl CodeResolutionContext {
    /// Build the context for one bundle.
    ///
    /// Fails with [`PluginError::CodeLoad`] on an unreadable or incompatible
    /// library, a module that fails or panics while exporting, or a symbol
    /// exported twice.
    pub fn build(
        bundle_id: &str,
        api_version: u32,
        payload: CodePayload,
        host: HostHandle,
    ) -> Result<Self, PluginError> {
        if api_version != API_VERSION {
            return Err(PluginError::code_load(
                bundle_id,
                format!("API version mismatch: core expects {API_VERSION}, bundle has {api_version}"),
            ));
        }

        let (library, module) = match payload {
            CodePayload::Empty => (None, None),
            CodePayload::Native(path) => {
                let (library, module) = open_native(bundle_id, &path)?;
                (Some(library), Some(module))
            }
            CodePayload::Builtin { factory, .. } => {
                (None, Some(create_module(bundle_id, || factory())?))
            }
        };

        // The module moves into the context before exporting so a failed build
        // still drops it ahead of the library.
        let mut context = Self {
            bundle_id: bundle_id.to_string(),
            symbols: HashMap::new(),
            host,
            module,
            library,
        };

        if let Some(module) = context.module.as_deref() {
            context.symbols = collect_exports(bundle_id, module)?;
        }

        Ok(context)
    }

    pub fn bundle_id(&self) -> &str {
        &self.bundle_id
    }

    /// Resolve a symbol: bundle code first, then the host.
    ///
    /// A bundle-local entry keeps this context alive for as long as the
    /// caller holds it, so the module is not unloaded underneath it.
    pub fn resolve(self: &Arc<Self>, symbol: &str) -> Result<Arc<dyn EntryPoint>, PluginError> {
        match self.resolve_local(symbol) {
            Some(entry) => Ok(entry),
            None => self.host.resolve_symbol(symbol),
        }
    }

    /// Resolve a symbol in the bundle's own table only
    pub fn resolve_local(self: &Arc<Self>, symbol: &str) -> Option<Arc<dyn EntryPoint>> {
        let entry = Arc::clone(self.symbols.get(symbol)?);
        Some(Arc::new(PinnedEntry {
            entry,
            _owner: Arc::clone(self),
        }))
    }

    pub fn exports(&self, symbol: &str) -> bool {
        self.symbols.contains_key(symbol)
    }

    /// Exported symbol names, sorted
    pub fn symbols(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.symbols.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn host(&self) -> &HostHandle {
        &self.host
    }

    pub fn is_native(&self) -> bool {
        self.library.is_some()
    }
}

impl fmt::Debug for CodeResolutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodeResolutionContext")
            .field("bundle_id", &self.bundle_id)
            .field("symbols", &self.symbols())
            .field("native", &self.is_native())
            .finish()
    }
}

impl Drop for CodeResolutionContext {
    fn drop(&mut self) {
        // Symbols and the module hold code from the library; release them
        // before the library handle is dropped.
        self.symbols.clear();

        if let Some(mut module) = self.module.take() {
            let result = std::panic::catch_unwind(AssertUnwindSafe(|| module.on_unload()));
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(bundle = %self.bundle_id, error = %e, "Bundle on_unload returned error");
                }
                Err(_) => {
                    tracing::error!(bundle = %self.bundle_id, "Bundle panicked in on_unload");
                }
            }
        }
    }
}

/// An exported entry point that holds its bundle's code alive
struct PinnedEntry {
    /// Dropped before the owner, which may unmap the code behind it
    entry: Arc<dyn EntryPoint>,
    _owner: Arc<CodeResolutionContext>,
}

impl EntryPoint for PinnedEntry {
    fn invoke(
        &self,
        event: &LifecycleEvent,
        scope: &dyn ResolutionScope,
    ) -> Result<EventOutcome, BundleError> {
        self.entry.invoke(event, scope)
    }
}

/// Run a module constructor, turning a panic into a code load error
fn create_module(
    bundle_id: &str,
    create: impl FnOnce() -> Box<dyn BundleModule>,
) -> Result<Box<dyn BundleModule>, PluginError> {
    std::panic::catch_unwind(AssertUnwindSafe(create)).map_err(|_| {
        tracing::error!(bundle = %bundle_id, "Bundle module panicked while being created");
        PluginError::code_load(bundle_id, "module panicked while being created")
    })
}

fn collect_exports(
    bundle_id: &str,
    module: &dyn BundleModule,
) -> Result<HashMap<String, Arc<dyn EntryPoint>>, PluginError> {
    let mut table = ExportTable::new();
    match std::panic::catch_unwind(AssertUnwindSafe(|| module.exports(&mut table))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            return Err(PluginError::code_load(
                bundle_id,
                format!("module failed to export symbols: {e}"),
            ));
        }
        Err(_) => {
            return Err(PluginError::code_load(
                bundle_id,
                "module panicked while exporting symbols",
            ));
        }
    }

    let mut symbols = HashMap::with_capacity(table.len());
    for (symbol, entry) in table.into_entries() {
        if symbols.contains_key(&symbol) {
            return Err(PluginError::code_load(
                bundle_id,
                format!("duplicate symbol '{symbol}'"),
            ));
        }
        symbols.insert(symbol, entry);
    }

    Ok(symbols)
}

fn open_native(
    bundle_id: &str,
    path: &Path,
) -> Result<(Library, Box<dyn BundleModule>), PluginError> {
    if !path.is_file() {
        return Err(PluginError::code_load(
            bundle_id,
            format!("library not found: {}", path.display()),
        ));
    }

    // SAFETY: loading a bundle the host asked for; the library is expected to
    // be built against this bundle API with `export_bundle!`.
    let library = unsafe { Library::new(path) }.map_err(|e| {
        PluginError::code_load(bundle_id, format!("failed to open {}: {e}", path.display()))
    })?;

    let module = {
        // SAFETY: symbol generated by `export_bundle!` with this signature.
        let api_version_fn: libloading::Symbol<extern "C-unwind" fn() -> u32> =
            unsafe { library.get(b"_stowaway_bundle_api_version") }.map_err(|e| {
                PluginError::code_load(bundle_id, format!("missing API version symbol: {e}"))
            })?;

        let found = std::panic::catch_unwind(AssertUnwindSafe(|| api_version_fn())).map_err(|_| {
            PluginError::code_load(bundle_id, "library panicked reporting its API version")
        })?;
        if found != API_VERSION {
            return Err(PluginError::code_load(
                bundle_id,
                format!("API version mismatch: core expects {API_VERSION}, library has {found}"),
            ));
        }

        // SAFETY: the create function returns a pointer from `Box::into_raw`,
        // which we take back ownership of exactly once.
        let create_fn: libloading::Symbol<extern "C-unwind" fn() -> *mut dyn BundleModule> =
            unsafe { library.get(b"_stowaway_bundle_create") }.map_err(|e| {
                PluginError::code_load(bundle_id, format!("missing create symbol: {e}"))
            })?;

        create_module(bundle_id, || unsafe { Box::from_raw(create_fn()) })?
    };

    Ok((library, module))
}
