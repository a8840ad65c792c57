use super::types::{BundlesConfig, HostConfigSection, RawBundlesConfig, RawStowawayConfig, StowawayConfig};
use anyhow::Result;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load merged configuration (user + project)
    pub fn load() -> Result<StowawayConfig> {
        let mut raw = RawStowawayConfig::default();

        // Layer 1: User config
        if let Some(user_path) = Self::user_config_path()
            && user_path.exists()
        {
            raw = Self::merge_raw(raw, Self::read_raw(&user_path)?);
        }

        // Layer 2: Project config
        let project_path = Self::project_config_path();
        if project_path.exists() {
            raw = Self::merge_raw(raw, Self::read_raw(&project_path)?);
        }

        // Convert to final config with defaults applied
        Ok(Self::finalize(raw))
    }

    fn read_raw(path: &Path) -> Result<RawStowawayConfig> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Get user config path (platform-specific)
    pub fn user_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "stowaway").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Get project config path
    /// Can be overridden with STOWAWAY_PROJECT_CONFIG_DIR env var (useful for isolated tests)
    pub fn project_config_path() -> PathBuf {
        stowaway_paths::project_dir().join("config.toml")
    }

    /// Merge two raw configs (overlay values override base only if explicitly set)
    fn merge_raw(base: RawStowawayConfig, overlay: RawStowawayConfig) -> RawStowawayConfig {
        let mut resources = base.host.resources;
        resources.extend(overlay.host.resources);

        RawStowawayConfig {
            bundles: RawBundlesConfig {
                user_dir: overlay.bundles.user_dir.or(base.bundles.user_dir),
                project_dir: overlay.bundles.project_dir.or(base.bundles.project_dir),
            },
            host: HostConfigSection { resources },
        }
    }

    /// Convert raw config to final config with defaults applied
    fn finalize(raw: RawStowawayConfig) -> StowawayConfig {
        let defaults = BundlesConfig::default();
        StowawayConfig {
            bundles: BundlesConfig {
                user_dir: raw.bundles.user_dir.unwrap_or(defaults.user_dir),
                project_dir: raw.bundles.project_dir.or(defaults.project_dir),
            },
            host: raw.host,
        }
    }
}
