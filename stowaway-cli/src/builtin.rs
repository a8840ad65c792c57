//! Bundle modules linked into the CLI
//!
//! A bundle directory with `format = "builtin"` and `module = "echo"` gets its
//! code from here instead of a dynamic library.

use stowaway_bundle_api::{
    BundleError, BundleModule, EventOutcome, ExportTable, LifecycleEvent, ResolutionScope,
};
use stowaway_core::ModuleCatalog;

/// Replies with the event it received and the bundle's `greeting` resource
#[derive(Default)]
pub struct EchoModule;

impl BundleModule for EchoModule {
    fn exports(&self, table: &mut ExportTable) -> Result<(), BundleError> {
        table.export("Echo", echo);
        Ok(())
    }
}

fn echo(event: &LifecycleEvent, scope: &dyn ResolutionScope) -> Result<EventOutcome, BundleError> {
    let greeting = scope.text("greeting").ok();
    scope.log_debug(&format!("echo {}", event.name()));
    Ok(EventOutcome::Reply(serde_json::json!({
        "bundle": scope.bundle_id(),
        "event": event,
        "greeting": greeting,
    })))
}

/// Every module the CLI can serve to builtin bundles
pub fn catalog() -> ModuleCatalog {
    ModuleCatalog::new().with_module("echo", || Box::new(EchoModule) as Box<dyn BundleModule>)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use stowaway_bundle_api::{EntryPoint, ResourceValue};

    struct GreetingScope;

    impl ResolutionScope for GreetingScope {
        fn bundle_id(&self) -> &str {
            "demo"
        }

        fn resolve(&self, symbol: &str) -> Result<Arc<dyn EntryPoint>, BundleError> {
            Err(BundleError::SymbolNotFound(symbol.to_string()))
        }

        fn resource(&self, key: &str) -> Option<Arc<ResourceValue>> {
            (key == "greeting").then(|| Arc::new(ResourceValue::Text("hi".into())))
        }

        fn resource_by_id(&self, _id: u32) -> Option<Arc<ResourceValue>> {
            None
        }
    }

    #[test]
    fn test_echo_replies_with_event_and_greeting() {
        let outcome = echo(&LifecycleEvent::Stop, &GreetingScope).unwrap();
        let EventOutcome::Reply(value) = outcome else {
            panic!("expected a reply");
        };
        assert_eq!(value["bundle"], "demo");
        assert_eq!(value["event"]["type"], "stop");
        assert_eq!(value["greeting"], "hi");
    }

    #[test]
    fn test_catalog_has_echo() {
        assert!(catalog().get("echo").is_some());
    }
}
