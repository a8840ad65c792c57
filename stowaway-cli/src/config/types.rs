use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use stowaway_core::CoreConfig;

/// Configuration as stored in TOML files (with optional fields for merging)
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawStowawayConfig {
    #[serde(default)]
    pub bundles: RawBundlesConfig,

    #[serde(default)]
    pub host: HostConfigSection,
}

/// Bundle directories as stored in TOML (optional fields for proper merging)
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawBundlesConfig {
    /// User bundle directory
    pub user_dir: Option<PathBuf>,

    /// Project bundle directory, searched before the user directory
    pub project_dir: Option<PathBuf>,
}

/// Final configuration with defaults applied
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct StowawayConfig {
    #[serde(default)]
    pub bundles: BundlesConfig,

    #[serde(default)]
    pub host: HostConfigSection,
}

impl StowawayConfig {
    /// The plugin core's view of this configuration
    pub fn core_config(&self) -> CoreConfig {
        let config = CoreConfig::with_user_dir(&self.bundles.user_dir);
        match &self.bundles.project_dir {
            Some(dir) => config.with_project_dir(dir),
            None => config,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BundlesConfig {
    /// User bundle directory
    pub user_dir: PathBuf,

    /// Project bundle directory (`.stowaway/bundles` unless configured)
    pub project_dir: Option<PathBuf>,
}

impl Default for BundlesConfig {
    fn default() -> Self {
        Self {
            user_dir: stowaway_paths::bundles_dir(),
            project_dir: Some(stowaway_paths::project_bundles_dir()),
        }
    }
}

/// The base resources the CLI host offers to bundles
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct HostConfigSection {
    /// Text resources by key
    #[serde(default)]
    pub resources: BTreeMap<String, String>,
}
