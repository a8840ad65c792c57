//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use stowaway_bundle_api::{
    BundleError, BundleModule, EntryPoint, EventOutcome, ExportTable, LifecycleEvent,
    ResolutionScope,
};
use stowaway_core::{HostHandle, MemorySource, ModuleCatalog, PluginManager};

/// Module exporting a fixed set of entry points
#[derive(Clone, Default)]
pub struct FnModule {
    symbols: Vec<(String, Arc<dyn EntryPoint>)>,
    unloads: Option<Arc<AtomicUsize>>,
}

impl FnModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<E: EntryPoint + 'static>(mut self, symbol: &str, entry: E) -> Self {
        self.symbols.push((symbol.to_string(), Arc::new(entry)));
        self
    }

    /// Exports `symbol` replying with `{"bundle": .., "symbol": ..}`
    pub fn with_reply(self, symbol: &'static str) -> Self {
        self.with(symbol, reply(symbol))
    }

    pub fn counting_unloads(mut self, counter: Arc<AtomicUsize>) -> Self {
        self.unloads = Some(counter);
        self
    }
}

impl BundleModule for FnModule {
    fn exports(&self, table: &mut ExportTable) -> Result<(), BundleError> {
        for (symbol, entry) in &self.symbols {
            table.export_shared(symbol.clone(), Arc::clone(entry));
        }
        Ok(())
    }

    fn on_unload(&mut self) -> Result<(), BundleError> {
        if let Some(counter) = &self.unloads {
            counter.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

pub fn reply(symbol: &'static str) -> impl EntryPoint + 'static {
    move |_: &LifecycleEvent, scope: &dyn ResolutionScope| -> Result<EventOutcome, BundleError> {
        Ok(EventOutcome::Reply(serde_json::json!({
            "bundle": scope.bundle_id(),
            "symbol": symbol,
        })))
    }
}

/// Catalog entry for a module that is cloned for every load
pub fn catalog_with(catalog: ModuleCatalog, name: &str, module: FnModule) -> ModuleCatalog {
    catalog.with_module(name, move || Box::new(module.clone()) as Box<dyn BundleModule>)
}

/// A builtin bundle manifest
pub struct Manifest {
    text: String,
}

impl Manifest {
    pub fn new(id: &str) -> Self {
        Self {
            text: format!("id = \"{id}\"\nversion = 1\n"),
        }
    }

    pub fn depends_on(mut self, deps: &[&str]) -> Self {
        let deps: Vec<String> = deps.iter().map(|d| format!("\"{d}\"")).collect();
        self.text
            .push_str(&format!("dependencies = [{}]\n", deps.join(", ")));
        self
    }

    pub fn builtin(mut self, module: &str) -> Self {
        self.text
            .push_str(&format!("\n[code]\nformat = \"builtin\"\nmodule = \"{module}\"\n"));
        self
    }

    pub fn component(mut self, id: &str, entry: &str) -> Self {
        self.text.push_str(&format!(
            "\n[[components]]\nid = \"{id}\"\nkind = \"service\"\nentry = \"{entry}\"\n"
        ));
        self
    }

    pub fn text_resource(mut self, key: &str, id: Option<u32>, value: &str, override_host: bool) -> Self {
        self.text
            .push_str(&format!("\n[[resources]]\nkey = \"{key}\"\nvalue = \"{value}\"\n"));
        if let Some(id) = id {
            self.text.push_str(&format!("id = {id}\n"));
        }
        if override_host {
            self.text.push_str("override = true\n");
        }
        self
    }

    pub fn build(self) -> String {
        self.text
    }
}

pub fn manager(source: MemorySource, catalog: ModuleCatalog, host: HostHandle) -> PluginManager {
    PluginManager::new(Arc::new(source), host).with_catalog(catalog)
}

pub fn reply_bundle(outcome: &EventOutcome) -> Option<&str> {
    match outcome {
        EventOutcome::Reply(value) => value.get("bundle").and_then(|b| b.as_str()),
        EventOutcome::Handled => None,
    }
}
