//! Resource overlay - bundle resources layered over the host's base table
//!
//! Each loaded bundle contributes one immutable [`BundleResources`] table.
//! [`ResourceOverlay`] is the ordered set of those tables; merging or removing
//! a bundle yields a new overlay and never mutates the host base.
//!
//! Host-compatible ids are namespaced per bundle. A bundle entry only shadows a
//! host id for bundle-less lookups when it is declared with `override = true`,
//! and at most one loaded bundle may override a given id.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use stowaway_bundle_api::ResourceValue;

use crate::descriptor::{BundleDescriptor, BundleId, ResourceSource};
use crate::error::PluginError;
use crate::host::HostHandle;
use crate::source::BundleSource;

/// One resource contributed by a bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceOverlayEntry {
    pub bundle_id: BundleId,
    pub local_key: String,
    pub host_id: Option<u32>,
    pub override_host: bool,
    pub payload: Arc<ResourceValue>,
}

/// The resource table of one bundle
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BundleResources {
    bundle_id: BundleId,
    by_key: HashMap<String, Arc<ResourceOverlayEntry>>,
    by_id: HashMap<u32, Arc<ResourceOverlayEntry>>,
}

impl BundleResources {
    /// Build a bundle's table, reading file payloads through `source`.
    ///
    /// An unreadable payload file makes the bundle malformed.
    pub fn build(
        descriptor: &BundleDescriptor,
        location: &Path,
        source: &dyn BundleSource,
    ) -> Result<Self, PluginError> {
        let mut table = Self::empty(&descriptor.id);

        for declaration in &descriptor.resources {
            let payload = match &declaration.source {
                ResourceSource::Text(text) => ResourceValue::Text(text.clone()),
                ResourceSource::File(relative) => {
                    let bytes = source.read_file(location, relative).map_err(|e| {
                        PluginError::malformed(
                            location,
                            format!("resource '{}': {e}", declaration.key),
                        )
                    })?;
                    ResourceValue::Binary(bytes)
                }
            };

            table.insert(ResourceOverlayEntry {
                bundle_id: descriptor.id.clone(),
                local_key: declaration.key.clone(),
                host_id: declaration.host_id,
                override_host: declaration.override_host,
                payload: Arc::new(payload),
            });
        }

        Ok(table)
    }

    pub fn empty(bundle_id: &str) -> Self {
        Self {
            bundle_id: bundle_id.to_string(),
            ..Self::default()
        }
    }

    fn insert(&mut self, entry: ResourceOverlayEntry) {
        let entry = Arc::new(entry);
        if let Some(id) = entry.host_id {
            self.by_id.insert(id, Arc::clone(&entry));
        }
        self.by_key.insert(entry.local_key.clone(), entry);
    }

    pub fn bundle_id(&self) -> &str {
        &self.bundle_id
    }

    pub fn get(&self, key: &str) -> Option<&Arc<ResourceOverlayEntry>> {
        self.by_key.get(key)
    }

    pub fn get_by_id(&self, id: u32) -> Option<&Arc<ResourceOverlayEntry>> {
        self.by_id.get(&id)
    }

    /// Entries sorted by key
    pub fn entries(&self) -> Vec<&Arc<ResourceOverlayEntry>> {
        let mut entries: Vec<_> = self.by_key.values().collect();
        entries.sort_by(|a, b| a.local_key.cmp(&b.local_key));
        entries
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// This bundle's entry, then the host base
    pub fn query(&self, key: &str, host: &HostHandle) -> Result<Arc<ResourceValue>, PluginError> {
        if let Some(entry) = self.get(key) {
            return Ok(Arc::clone(&entry.payload));
        }
        host.resource(key)?
            .ok_or_else(|| PluginError::ResourceNotFound {
                key: key.to_string(),
            })
    }

    /// This bundle's entry with that host id, then the host base
    pub fn query_id(&self, id: u32, host: &HostHandle) -> Result<Arc<ResourceValue>, PluginError> {
        if let Some(entry) = self.get_by_id(id) {
            return Ok(Arc::clone(&entry.payload));
        }
        host.resource_by_id(id)?
            .ok_or_else(|| PluginError::ResourceNotFound {
                key: format!("{id:#010x}"),
            })
    }
}

/// All loaded bundles' resources, in load order
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ResourceOverlay {
    tables: Vec<Arc<BundleResources>>,
    overrides: HashMap<u32, Arc<ResourceOverlayEntry>>,
}

impl ResourceOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// A new overlay with `resources` merged in.
    ///
    /// Fails with [`PluginError::ResourceConflict`] when an override has no
    /// host id or another loaded bundle already overrides the same id. `self`
    /// is left untouched either way.
    pub fn merge(&self, resources: Arc<BundleResources>) -> Result<Self, PluginError> {
        let bundle = resources.bundle_id();
        if self.table(bundle).is_some() {
            return Err(PluginError::ResourceConflict {
                bundle: bundle.to_string(),
                detail: "bundle already has resources in the overlay".to_string(),
            });
        }

        let mut overrides = self.overrides.clone();
        for entry in resources.entries() {
            if !entry.override_host {
                continue;
            }
            let Some(id) = entry.host_id else {
                return Err(PluginError::ResourceConflict {
                    bundle: bundle.to_string(),
                    detail: format!("resource '{}' overrides without an id", entry.local_key),
                });
            };
            if let Some(existing) = overrides.get(&id) {
                return Err(PluginError::ResourceConflict {
                    bundle: bundle.to_string(),
                    detail: format!(
                        "resource id {id:#010x} is already overridden by bundle '{}'",
                        existing.bundle_id
                    ),
                });
            }
            overrides.insert(id, Arc::clone(entry));
        }

        let mut tables = self.tables.clone();
        tables.push(resources);
        Ok(Self { tables, overrides })
    }

    /// A new overlay without `bundle_id`'s resources
    pub fn without(&self, bundle_id: &str) -> Self {
        Self {
            tables: self
                .tables
                .iter()
                .filter(|t| t.bundle_id() != bundle_id)
                .cloned()
                .collect(),
            overrides: self
                .overrides
                .iter()
                .filter(|(_, e)| e.bundle_id != bundle_id)
                .map(|(id, e)| (*id, Arc::clone(e)))
                .collect(),
        }
    }

    pub fn table(&self, bundle_id: &str) -> Option<&Arc<BundleResources>> {
        self.tables.iter().find(|t| t.bundle_id() == bundle_id)
    }

    /// Bundles with resources in the overlay, in load order
    pub fn bundles(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(|t| t.bundle_id())
    }

    /// Look up a resource by key.
    ///
    /// With a bundle id: that bundle's table, then the host base. Without: every
    /// bundle table in load order, then the host base.
    pub fn query(
        &self,
        key: &str,
        bundle: Option<&str>,
        host: &HostHandle,
    ) -> Result<Arc<ResourceValue>, PluginError> {
        match bundle {
            Some(bundle) => match self.table(bundle) {
                Some(table) => table.query(key, host),
                None => BundleResources::empty(bundle).query(key, host),
            },
            None => {
                for table in &self.tables {
                    if let Some(entry) = table.get(key) {
                        return Ok(Arc::clone(&entry.payload));
                    }
                }
                host.resource(key)?
                    .ok_or_else(|| PluginError::ResourceNotFound {
                        key: key.to_string(),
                    })
            }
        }
    }

    /// Look up a resource by host-compatible id.
    ///
    /// With a bundle id: that bundle's entry, then the host base. Without: an
    /// explicit override, then the host base.
    pub fn query_id(
        &self,
        id: u32,
        bundle: Option<&str>,
        host: &HostHandle,
    ) -> Result<Arc<ResourceValue>, PluginError> {
        match bundle {
            Some(bundle) => match self.table(bundle) {
                Some(table) => table.query_id(id, host),
                None => BundleResources::empty(bundle).query_id(id, host),
            },
            None => {
                if let Some(entry) = self.overrides.get(&id) {
                    return Ok(Arc::clone(&entry.payload));
                }
                host.resource_by_id(id)?
                    .ok_or_else(|| PluginError::ResourceNotFound {
                        key: format!("{id:#010x}"),
                    })
            }
        }
    }
}
