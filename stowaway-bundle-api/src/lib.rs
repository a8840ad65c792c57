//! stowaway-bundle-api - API for bundles loaded by the stowaway plugin core
//!
//! A bundle is a feature module the host never installed. Its code is either a
//! native dynamic library or a module linked into the host, and in both cases it
//! exposes a [`BundleModule`] that exports named [`EntryPoint`]s. The core routes
//! host lifecycle events to those entry points and hands each call a
//! [`ResolutionScope`] restricted to the owning bundle.
//!
//! # Example
//!
//! ```ignore
//! use stowaway_bundle_api::{
//!     BundleError, BundleModule, EventOutcome, ExportTable, LifecycleEvent, ResolutionScope,
//!     export_bundle,
//! };
//!
//! #[derive(Default)]
//! pub struct AlphaModule;
//!
//! impl BundleModule for AlphaModule {
//!     fn exports(&self, table: &mut ExportTable) -> Result<(), BundleError> {
//!         table.export("AlphaService", |event: &LifecycleEvent, scope: &dyn ResolutionScope| {
//!             scope.log_info(&format!("alpha got {}", event.name()));
//!             Ok(EventOutcome::Handled)
//!         });
//!         Ok(())
//!     }
//! }
//!
//! export_bundle!(AlphaModule);
//! ```

pub mod error;
pub mod export;
pub mod scope;
pub mod types;

pub use error::BundleError;
pub use export::ExportTable;
pub use scope::ResolutionScope;
pub use types::*;

/// Current bundle API version. Native bundles must match this exactly.
pub const API_VERSION: u32 = 1;

/// An executable unit exported by a bundle.
///
/// Implemented for any `Fn(&LifecycleEvent, &dyn ResolutionScope)` closure, so
/// small handlers don't need a named type.
pub trait EntryPoint: Send + Sync {
    /// Handle one lifecycle event routed to this entry point.
    fn invoke(
        &self,
        event: &LifecycleEvent,
        scope: &dyn ResolutionScope,
    ) -> Result<EventOutcome, BundleError>;
}

impl<F> EntryPoint for F
where
    F: Fn(&LifecycleEvent, &dyn ResolutionScope) -> Result<EventOutcome, BundleError>
        + Send
        + Sync,
{
    fn invoke(
        &self,
        event: &LifecycleEvent,
        scope: &dyn ResolutionScope,
    ) -> Result<EventOutcome, BundleError> {
        self(event, scope)
    }
}

/// The root object of a bundle's code payload.
pub trait BundleModule: Send + Sync {
    /// Export the bundle's executable units. Called once when the bundle loads.
    fn exports(&self, table: &mut ExportTable) -> Result<(), BundleError>;

    /// Called when the bundle is unloaded and no dispatch still uses it.
    fn on_unload(&mut self) -> Result<(), BundleError> {
        Ok(())
    }
}

/// Export a bundle module type for dynamic loading.
///
/// # Usage
///
/// ```ignore
/// stowaway_bundle_api::export_bundle!(MyModule);
/// ```
///
/// # Generated Functions
///
/// - `_stowaway_bundle_create()`: Creates the module instance
/// - `_stowaway_bundle_api_version()`: Returns the API version
///
/// Both use the `C-unwind` ABI so a panic in the module's constructor reaches
/// the loader as a load error instead of aborting the host.
#[macro_export]
macro_rules! export_bundle {
    ($module_type:ty) => {
        #[unsafe(no_mangle)]
        pub extern "C-unwind" fn _stowaway_bundle_create() -> *mut dyn $crate::BundleModule {
            let module: Box<dyn $crate::BundleModule> = Box::new(<$module_type>::default());
            Box::into_raw(module)
        }

        #[unsafe(no_mangle)]
        pub extern "C-unwind" fn _stowaway_bundle_api_version() -> u32 {
            $crate::API_VERSION
        }
    };
}
