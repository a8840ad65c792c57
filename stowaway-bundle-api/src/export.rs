//! ExportTable - where a bundle module publishes its entry points

use std::sync::Arc;

use crate::EntryPoint;

/// Symbols exported by a bundle module, in export order.
///
/// Duplicates are kept as exported; the core rejects a module that exports the
/// same symbol twice.
#[derive(Default)]
pub struct ExportTable {
    symbols: Vec<(String, Arc<dyn EntryPoint>)>,
}

impl ExportTable {
    /// Create an empty export table
    pub fn new() -> Self {
        Self::default()
    }

    /// Export an entry point under a symbol name
    pub fn export<E>(&mut self, symbol: impl Into<String>, entry: E) -> &mut Self
    where
        E: EntryPoint + 'static,
    {
        self.symbols.push((symbol.into(), Arc::new(entry)));
        self
    }

    /// Export an already shared entry point
    pub fn export_shared(
        &mut self,
        symbol: impl Into<String>,
        entry: Arc<dyn EntryPoint>,
    ) -> &mut Self {
        self.symbols.push((symbol.into(), entry));
        self
    }

    /// Names of the exported symbols, in export order
    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.symbols.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Consume the table (for use by the loader)
    pub fn into_entries(self) -> Vec<(String, Arc<dyn EntryPoint>)> {
        self.symbols
    }
}
