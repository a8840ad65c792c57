//! Configuration for the plugin core

use std::path::PathBuf;

/// File name of the selection file inside the user bundle directory
pub const SELECTION_FILE: &str = "selection.toml";

/// Where the core looks for bundles
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    /// User bundle directory (~/.config/stowaway/bundles)
    pub user_bundle_dir: PathBuf,
    /// Project-level bundle directory (.stowaway/bundles)
    pub project_bundle_dir: Option<PathBuf>,
    /// Path of the selection file listing disabled bundles
    pub selection_path: PathBuf,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self::with_user_dir(stowaway_paths::bundles_dir())
    }
}

impl CoreConfig {
    /// Config rooted at `user_bundle_dir`, with no project directory
    pub fn with_user_dir(user_bundle_dir: impl Into<PathBuf>) -> Self {
        let user_bundle_dir = user_bundle_dir.into();
        Self {
            selection_path: user_bundle_dir.join(SELECTION_FILE),
            user_bundle_dir,
            project_bundle_dir: None,
        }
    }

    /// Builder: set the project bundle directory
    pub fn with_project_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.project_bundle_dir = Some(dir.into());
        self
    }

    /// Directories to search, project first
    pub fn bundle_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = Vec::with_capacity(2);
        if let Some(project_dir) = &self.project_bundle_dir {
            dirs.push(project_dir.clone());
        }
        dirs.push(self.user_bundle_dir.clone());
        dirs
    }
}
