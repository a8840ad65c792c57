//! The CLI acting as a host process
//!
//! Attaches the plugin core with a host table built from config, so bundles
//! can fall back to the CLI's own resources.

use std::sync::Arc;

use stowaway_bundle_api::ResourceValue;
use stowaway_core::{HostContext, HostHandle, HostTable, PluginManager};

use crate::builtin;
use crate::config::StowawayConfig;

/// A running host: the attached manager plus the host table it falls back to
pub struct CliHost {
    pub manager: Arc<PluginManager>,
    // Held so the manager's weak handle stays valid.
    _table: Arc<HostTable>,
}

/// Build the host table and run the attach hook
pub fn attach(config: &StowawayConfig) -> CliHost {
    let table = Arc::new(host_table(config));
    let ctx = HostContext::new(HostHandle::new(&table), config.core_config())
        .with_catalog(builtin::catalog());
    let manager = stowaway_core::host::on_host_attach(ctx);

    for failure in &manager.init().failed {
        tracing::warn!(
            path = %failure.location.display(),
            error = %failure.error,
            "Bundle not loaded"
        );
    }

    CliHost {
        manager,
        _table: table,
    }
}

fn host_table(config: &StowawayConfig) -> HostTable {
    config
        .host
        .resources
        .iter()
        .fold(HostTable::new(), |table, (key, value)| {
            table.with_resource(key.clone(), None, ResourceValue::Text(value.clone()))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use stowaway_core::HostResolver;

    #[test]
    fn test_host_table_from_config() {
        let mut config = StowawayConfig::default();
        config
            .host
            .resources
            .insert("app.name".to_string(), "demo".to_string());

        let table = host_table(&config);
        assert_eq!(
            table.resource("app.name").unwrap().as_text(),
            Some("demo")
        );
        assert!(table.resource("missing").is_none());
    }
}
