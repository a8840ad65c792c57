//! Bundle selection - tracks which discovered bundles are disabled

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

use crate::error::PluginError;

/// Bundles the user turned off.
///
/// Stored as TOML in `~/.config/stowaway/bundles/selection.toml`. Discovered
/// bundles are loaded unless listed here.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleSelection {
    /// Set of disabled bundle ids
    #[serde(default)]
    pub disabled: BTreeSet<String>,
}

impl BundleSelection {
    /// Load the selection from a TOML file
    ///
    /// Returns an empty selection if the file doesn't exist.
    pub fn load(path: &Path) -> Result<Self, PluginError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| PluginError::Selection(e.to_string()))
    }

    /// Save the selection to a TOML file
    pub fn save(&self, path: &Path) -> Result<(), PluginError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| PluginError::Selection(e.to_string()))?;

        if let Some(parent) = path.parent().filter(|p| !p.exists()) {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn is_enabled(&self, bundle_id: &str) -> bool {
        !self.disabled.contains(bundle_id)
    }

    pub fn enable(&mut self, bundle_id: &str) {
        self.disabled.remove(bundle_id);
    }

    pub fn disable(&mut self, bundle_id: &str) {
        self.disabled.insert(bundle_id.to_string());
    }

    /// Load, apply `f`, and save in one step
    pub fn update(path: &Path, f: impl FnOnce(&mut Self)) -> Result<Self, PluginError> {
        let mut selection = Self::load(path)?;
        f(&mut selection);
        selection.save(path)?;
        Ok(selection)
    }
}
