//! Hello Bundle - A simple example bundle for stowaway
//!
//! This bundle demonstrates:
//! - Basic bundle structure with the `export_bundle!` macro
//! - Exporting entry points from a `BundleModule`
//! - Reading the bundle's own resources through the active scope
//! - Sharing state between entry points and `on_unload`
//!
//! ## Building
//!
//! ```bash
//! cargo build --release
//! ```
//!
//! ## Installing
//!
//! ```bash
//! mkdir -p ~/.config/stowaway/bundles/hello
//! cp bundle.toml ~/.config/stowaway/bundles/hello/
//! cp target/release/libhello_bundle.so ~/.config/stowaway/bundles/hello/
//! stowaway dispatch demo.hello.service
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use stowaway_bundle_api::{
    BundleError, BundleModule, EventOutcome, ExportTable, LifecycleEvent, ResolutionScope,
    export_bundle,
};

/// A bundle that greets on start and counts how often it was started.
#[derive(Default)]
pub struct HelloModule {
    starts: Arc<AtomicU32>,
}

impl BundleModule for HelloModule {
    fn exports(&self, table: &mut ExportTable) -> Result<(), BundleError> {
        let starts = Arc::clone(&self.starts);
        table.export(
            "HelloService",
            move |event: &LifecycleEvent,
                  scope: &dyn ResolutionScope|
                  -> Result<EventOutcome, BundleError> {
                match event {
                    LifecycleEvent::Start => {
                        let count = starts.fetch_add(1, Ordering::Relaxed) + 1;
                        scope.log_info(&format!("started {count} times"));
                        Ok(EventOutcome::Reply(serde_json::json!({
                            "greeting": scope.text("greeting")?,
                            "starts": count,
                        })))
                    }
                    LifecycleEvent::Stop | LifecycleEvent::Destroy => Ok(EventOutcome::Handled),
                    other => Err(BundleError::UnhandledEvent(other.name().to_string())),
                }
            },
        );

        table.export("HelloReceiver", receive);
        Ok(())
    }

    fn on_unload(&mut self) -> Result<(), BundleError> {
        eprintln!(
            "hello bundle unloading after {} starts",
            self.starts.load(Ordering::Relaxed)
        );
        Ok(())
    }
}

fn receive(event: &LifecycleEvent, _scope: &dyn ResolutionScope) -> Result<EventOutcome, BundleError> {
    match event {
        LifecycleEvent::Deliver { action, payload } => Ok(EventOutcome::Reply(serde_json::json!({
            "received": action,
            "payload": payload,
        }))),
        other => Err(BundleError::UnhandledEvent(other.name().to_string())),
    }
}

export_bundle!(HelloModule);
