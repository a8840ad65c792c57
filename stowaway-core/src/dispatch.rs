//! Lifecycle dispatcher - routes host events to bundle entry points
//!
//! Each call walks `Received -> ContextInstalled -> Executing ->
//! ContextTornDown -> Completed | Failed`. The owning bundle's scope is held
//! by a guard, so it is removed on every exit path before the result reaches
//! the host. The bundle itself is pinned for the duration of the call: an
//! unload that lands mid-dispatch only takes effect for later calls.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use arc_swap::ArcSwap;
use stowaway_bundle_api::{EventOutcome, LifecycleEvent};

use crate::error::{DispatchCause, PluginError};
use crate::manager::Snapshot;
use crate::scope;

/// Where an in-flight dispatch call is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchPhase {
    Received,
    ContextInstalled,
    Executing,
    ContextTornDown,
    Completed,
    Failed,
}

struct DispatchCall<'a> {
    component: &'a str,
    event: &'static str,
    phase: DispatchPhase,
}

impl<'a> DispatchCall<'a> {
    fn new(component: &'a str, event: &LifecycleEvent) -> Self {
        let call = Self {
            component,
            event: event.name(),
            phase: DispatchPhase::Received,
        };
        call.trace();
        call
    }

    fn advance(&mut self, phase: DispatchPhase) {
        self.phase = phase;
        self.trace();
    }

    fn trace(&self) {
        tracing::trace!(
            component = %self.component,
            event = self.event,
            phase = ?self.phase,
            "Dispatch"
        );
    }
}

/// Routes lifecycle events to the bundle that owns the target component.
///
/// Cheap to clone; every clone reads the manager's latest published state.
#[derive(Clone)]
pub struct LifecycleDispatcher {
    state: Arc<ArcSwap<Snapshot>>,
}

impl LifecycleDispatcher {
    pub(crate) fn new(state: Arc<ArcSwap<Snapshot>>) -> Self {
        Self { state }
    }

    /// Deliver `event` to the component's entry point.
    ///
    /// Returns [`PluginError::ComponentNotFound`] when no loaded bundle owns
    /// the component; hosts treat that as a routing miss. Errors and panics
    /// from the entry point come back as [`PluginError::Dispatch`] and are
    /// never retried.
    pub fn dispatch(
        &self,
        component_id: &str,
        event: &LifecycleEvent,
    ) -> Result<EventOutcome, PluginError> {
        let mut call = DispatchCall::new(component_id, event);

        let (entry, bundle) = {
            let snapshot = self.state.load();
            let entry = snapshot.registry.lookup(component_id);
            let bundle = entry
                .as_ref()
                .and_then(|e| snapshot.bundles.get(&e.bundle_id).cloned());
            match (entry, bundle) {
                (Some(entry), Some(bundle)) => (entry, bundle),
                _ => {
                    call.advance(DispatchPhase::Failed);
                    tracing::debug!(component = %component_id, "No bundle owns component");
                    return Err(PluginError::ComponentNotFound {
                        component: component_id.to_string(),
                    });
                }
            }
        };

        let bundle_scope = Arc::clone(&bundle.scope);
        let guard = scope::install(Arc::clone(&bundle_scope));
        call.advance(DispatchPhase::ContextInstalled);

        call.advance(DispatchPhase::Executing);
        let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
            let entry_point = bundle_scope.code().resolve(entry.entry_point.symbol())?;
            entry_point
                .invoke(event, bundle_scope.as_ref())
                .map_err(|e| PluginError::Dispatch {
                    component: component_id.to_string(),
                    cause: DispatchCause::Bundle(e),
                })
        }));

        drop(guard);
        call.advance(DispatchPhase::ContextTornDown);

        let result = match result {
            Ok(result) => result,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                tracing::error!(
                    component = %component_id,
                    bundle = %entry.bundle_id,
                    panic = %message,
                    "Bundle entry point panicked"
                );
                Err(PluginError::Dispatch {
                    component: component_id.to_string(),
                    cause: DispatchCause::Panicked(message),
                })
            }
        };

        match &result {
            Ok(_) => call.advance(DispatchPhase::Completed),
            Err(e) => {
                call.advance(DispatchPhase::Failed);
                tracing::warn!(
                    component = %component_id,
                    bundle = %entry.bundle_id,
                    error = %e,
                    "Dispatch failed"
                );
            }
        }

        result
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
