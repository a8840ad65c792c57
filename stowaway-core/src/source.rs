//! Bundle sources - where bundle payloads come from

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::error::SourceError;

/// Name of the manifest file inside a bundle directory
pub const MANIFEST_FILE: &str = "bundle.toml";

/// The raw payload of one bundle: where it lives and its manifest bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundlePayload {
    /// Bundle location (a directory for [`DirectorySource`])
    pub location: PathBuf,
    /// Raw `bundle.toml` bytes
    pub manifest: Vec<u8>,
}

/// Provider of bundle payloads.
///
/// Reads may block on storage; the core never calls a source while holding
/// a registry lock.
pub trait BundleSource: Send + Sync {
    /// Locations of all bundles this source can provide
    fn discover(&self) -> Result<Vec<PathBuf>, SourceError>;

    /// Read the payload of the bundle at `path`
    fn read_bundle(&self, path: &Path) -> Result<BundlePayload, SourceError>;

    /// Read a file shipped inside a bundle, relative to its location
    fn read_file(&self, location: &Path, relative: &Path) -> Result<Vec<u8>, SourceError>;
}

/// Bundles stored as directories under one or more base directories.
///
/// Earlier directories take precedence: when two directories hold a bundle
/// with the same id, the first one discovered wins the load.
pub struct DirectorySource {
    dirs: Vec<PathBuf>,
}

impl DirectorySource {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }
}

impl BundleSource for DirectorySource {
    fn discover(&self) -> Result<Vec<PathBuf>, SourceError> {
        let mut found = Vec::new();

        for base_dir in &self.dirs {
            if !base_dir.exists() {
                tracing::debug!(dir = %base_dir.display(), "Bundle directory does not exist");
                continue;
            }

            let entries =
                std::fs::read_dir(base_dir).map_err(|e| SourceError::from_io(base_dir, e))?;
            let mut in_dir = Vec::new();
            for entry in entries {
                let path = entry.map_err(|e| SourceError::from_io(base_dir, e))?.path();
                if !path.is_dir() {
                    continue;
                }
                if path.join(MANIFEST_FILE).is_file() {
                    in_dir.push(path);
                } else {
                    tracing::debug!(dir = %path.display(), "No bundle manifest, skipping");
                }
            }

            in_dir.sort();
            found.extend(in_dir);
        }

        Ok(found)
    }

    fn read_bundle(&self, path: &Path) -> Result<BundlePayload, SourceError> {
        let manifest_path = path.join(MANIFEST_FILE);
        let manifest =
            std::fs::read(&manifest_path).map_err(|e| SourceError::from_io(&manifest_path, e))?;

        Ok(BundlePayload {
            location: path.to_path_buf(),
            manifest,
        })
    }

    fn read_file(&self, location: &Path, relative: &Path) -> Result<Vec<u8>, SourceError> {
        let path = location.join(relative);
        std::fs::read(&path).map_err(|e| SourceError::from_io(&path, e))
    }
}

#[derive(Debug, Default, Clone)]
struct MemoryBundle {
    manifest: Vec<u8>,
    files: HashMap<PathBuf, Vec<u8>>,
}

/// Bundles held in memory, keyed by a virtual location.
///
/// Used by hosts that fetch bundles themselves (archives, network) and by tests.
#[derive(Debug, Default, Clone)]
pub struct MemorySource {
    bundles: BTreeMap<PathBuf, MemoryBundle>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: add a bundle with its manifest text
    pub fn with_bundle(mut self, location: impl Into<PathBuf>, manifest: impl Into<String>) -> Self {
        self.insert(location, manifest);
        self
    }

    /// Builder: add a file to a bundle added earlier (or an empty one)
    pub fn with_file(
        mut self,
        location: impl Into<PathBuf>,
        relative: impl Into<PathBuf>,
        contents: impl Into<Vec<u8>>,
    ) -> Self {
        self.bundles
            .entry(location.into())
            .or_default()
            .files
            .insert(relative.into(), contents.into());
        self
    }

    pub fn insert(&mut self, location: impl Into<PathBuf>, manifest: impl Into<String>) {
        self.bundles.entry(location.into()).or_default().manifest = manifest.into().into_bytes();
    }
}

impl BundleSource for MemorySource {
    fn discover(&self) -> Result<Vec<PathBuf>, SourceError> {
        Ok(self.bundles.keys().cloned().collect())
    }

    fn read_bundle(&self, path: &Path) -> Result<BundlePayload, SourceError> {
        let bundle = self
            .bundles
            .get(path)
            .ok_or_else(|| SourceError::NotFound {
                path: path.to_path_buf(),
            })?;

        Ok(BundlePayload {
            location: path.to_path_buf(),
            manifest: bundle.manifest.clone(),
        })
    }

    fn read_file(&self, location: &Path, relative: &Path) -> Result<Vec<u8>, SourceError> {
        self.bundles
            .get(location)
            .and_then(|bundle| bundle.files.get(relative))
            .cloned()
            .ok_or_else(|| SourceError::NotFound {
                path: location.join(relative),
            })
    }
}
