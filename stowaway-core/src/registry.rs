//! Component registry - which loaded bundle owns which component id
//!
//! The registry is a plain value. The manager clones it, applies a change
//! and publishes the result, so readers never see a half-registered bundle.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::descriptor::{BundleId, ComponentDeclaration, ComponentKind, EntryPointRef};

/// One registered component
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    pub component_id: String,
    pub bundle_id: BundleId,
    pub kind: ComponentKind,
    pub entry_point: EntryPointRef,
}

/// Why a declared component was not registered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Another bundle registered the id first
    Duplicate { owner: BundleId },
    /// The entry point resolves neither in the bundle nor in the host
    UnresolvedEntryPoint { entry: EntryPointRef },
}

impl RejectReason {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate { .. })
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Duplicate { owner } => write!(f, "duplicate, already owned by '{owner}'"),
            Self::UnresolvedEntryPoint { entry } => {
                write!(f, "entry point '{entry}' does not resolve")
            }
        }
    }
}

/// Outcome of registering one bundle's components
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationResult {
    pub accepted: Vec<String>,
    pub rejected: Vec<(String, RejectReason)>,
}

impl RegistrationResult {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// Map from component id to owning bundle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComponentRegistry {
    entries: HashMap<String, Arc<RegistryEntry>>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every declaration of `bundle_id`. First registration wins.
    pub fn register(
        &mut self,
        bundle_id: &str,
        declarations: &[ComponentDeclaration],
    ) -> RegistrationResult {
        self.register_checked(bundle_id, declarations, |_| true)
    }

    /// Like [`register`](Self::register), also rejecting declarations whose
    /// entry point fails `resolves`.
    pub fn register_checked(
        &mut self,
        bundle_id: &str,
        declarations: &[ComponentDeclaration],
        resolves: impl Fn(&EntryPointRef) -> bool,
    ) -> RegistrationResult {
        let mut result = RegistrationResult::default();

        for decl in declarations {
            if let Some(existing) = self.entries.get(&decl.component_id) {
                tracing::warn!(
                    component = %decl.component_id,
                    bundle = %bundle_id,
                    owner = %existing.bundle_id,
                    "Component already registered, keeping first owner"
                );
                result.rejected.push((
                    decl.component_id.clone(),
                    RejectReason::Duplicate {
                        owner: existing.bundle_id.clone(),
                    },
                ));
                continue;
            }

            if !resolves(&decl.entry_point) {
                tracing::warn!(
                    component = %decl.component_id,
                    bundle = %bundle_id,
                    entry = %decl.entry_point,
                    "Component entry point does not resolve"
                );
                result.rejected.push((
                    decl.component_id.clone(),
                    RejectReason::UnresolvedEntryPoint {
                        entry: decl.entry_point.clone(),
                    },
                ));
                continue;
            }

            self.entries.insert(
                decl.component_id.clone(),
                Arc::new(RegistryEntry {
                    component_id: decl.component_id.clone(),
                    bundle_id: bundle_id.to_string(),
                    kind: decl.kind,
                    entry_point: decl.entry_point.clone(),
                }),
            );
            result.accepted.push(decl.component_id.clone());
        }

        result
    }

    pub fn lookup(&self, component_id: &str) -> Option<Arc<RegistryEntry>> {
        self.entries.get(component_id).cloned()
    }

    /// Remove every entry owned by `bundle_id`, returning the removed ids sorted
    pub fn unregister_all(&mut self, bundle_id: &str) -> Vec<String> {
        let mut removed: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.bundle_id == bundle_id)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &removed {
            self.entries.remove(id);
        }
        removed.sort();
        removed
    }

    /// Components owned by `bundle_id`, sorted by id
    pub fn components_of(&self, bundle_id: &str) -> Vec<Arc<RegistryEntry>> {
        let mut owned: Vec<_> = self
            .entries
            .values()
            .filter(|entry| entry.bundle_id == bundle_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| a.component_id.cmp(&b.component_id));
        owned
    }

    /// All entries, sorted by component id
    pub fn entries(&self) -> Vec<Arc<RegistryEntry>> {
        let mut all: Vec<_> = self.entries.values().cloned().collect();
        all.sort_by(|a, b| a.component_id.cmp(&b.component_id));
        all
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
