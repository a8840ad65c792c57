//! Bundle descriptor reader - parses and validates `bundle.toml`
//!
//! Reading is a pure function of the payload: it never touches shared state
//! and is safe to run concurrently for different bundles.

use serde::Deserialize;
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::path::{Component, Path, PathBuf};

use stowaway_bundle_api::API_VERSION;

use crate::error::PluginError;
use crate::source::BundlePayload;

/// Identifier of a bundle
pub type BundleId = String;

/// What a declared component is, from the host's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Service,
    Receiver,
    LifecycleOwner,
    Other,
}

impl ComponentKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "service" => Some(Self::Service),
            "receiver" => Some(Self::Receiver),
            "lifecycle_owner" => Some(Self::LifecycleOwner),
            "other" => Some(Self::Other),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Service => "service",
            Self::Receiver => "receiver",
            Self::LifecycleOwner => "lifecycle_owner",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque reference to an executable unit in the bundle's code (a symbol name)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntryPointRef(String);

impl EntryPointRef {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self(symbol.into())
    }

    pub fn symbol(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryPointRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A component the bundle declares
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentDeclaration {
    pub component_id: String,
    pub kind: ComponentKind,
    pub entry_point: EntryPointRef,
}

/// The `[code]` section, uninterpreted. The code resolver decides whether the
/// format is supported.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CodeSpec {
    pub format: String,
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub module: Option<String>,
}

/// Where a resource's payload comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceSource {
    Text(String),
    File(PathBuf),
}

/// A resource the bundle declares
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDeclaration {
    pub key: String,
    pub host_id: Option<u32>,
    pub source: ResourceSource,
    pub override_host: bool,
}

/// Validated, immutable description of a bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleDescriptor {
    pub id: BundleId,
    pub version: u64,
    pub api_version: u32,
    pub description: Option<String>,
    pub declared_components: Vec<ComponentDeclaration>,
    pub dependencies: BTreeSet<BundleId>,
    pub code: Option<CodeSpec>,
    pub resources: Vec<ResourceDeclaration>,
}

impl BundleDescriptor {
    pub fn component(&self, component_id: &str) -> Option<&ComponentDeclaration> {
        self.declared_components
            .iter()
            .find(|c| c.component_id == component_id)
    }
}

#[derive(Debug, Deserialize)]
struct RawManifest {
    id: Option<String>,
    version: Option<i64>,
    api_version: Option<u32>,
    description: Option<String>,
    #[serde(default)]
    dependencies: Vec<String>,
    code: Option<CodeSpec>,
    #[serde(default)]
    components: Vec<RawComponent>,
    #[serde(default)]
    resources: Vec<RawResource>,
}

#[derive(Debug, Deserialize)]
struct RawComponent {
    id: Option<String>,
    kind: Option<String>,
    entry: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawResource {
    key: Option<String>,
    id: Option<u32>,
    value: Option<String>,
    file: Option<PathBuf>,
    #[serde(default, rename = "override")]
    override_host: bool,
}

/// Parse a bundle payload into a descriptor.
///
/// Fails with [`PluginError::MalformedBundle`] when the manifest is not UTF-8
/// TOML, a required field is missing, a component kind is unknown, or an id is
/// declared twice within the bundle.
pub fn read(payload: &BundlePayload) -> Result<BundleDescriptor, PluginError> {
    parse(&payload.location, &payload.manifest)
}

fn parse(location: &Path, bytes: &[u8]) -> Result<BundleDescriptor, PluginError> {
    let malformed = |reason: String| PluginError::malformed(location, reason);

    let text = std::str::from_utf8(bytes)
        .map_err(|e| malformed(format!("manifest is not valid UTF-8: {e}")))?;
    let raw: RawManifest =
        toml::from_str(text).map_err(|e| malformed(format!("invalid manifest: {e}")))?;

    let id = raw.id.ok_or_else(|| malformed("missing field `id`".into()))?;
    if !is_valid_bundle_id(&id) {
        return Err(malformed(format!("invalid bundle id '{id}'")));
    }

    let version = raw
        .version
        .ok_or_else(|| malformed("missing field `version`".into()))?;
    let version =
        u64::try_from(version).map_err(|_| malformed(format!("negative version {version}")))?;

    let mut dependencies = BTreeSet::new();
    for dep in raw.dependencies {
        if dep == id {
            return Err(malformed(format!("bundle '{id}' depends on itself")));
        }
        if !is_valid_bundle_id(&dep) {
            return Err(malformed(format!("invalid dependency id '{dep}'")));
        }
        dependencies.insert(dep);
    }

    let mut seen = HashSet::new();
    let mut declared_components = Vec::with_capacity(raw.components.len());
    for (index, component) in raw.components.into_iter().enumerate() {
        let component_id = component
            .id
            .filter(|c| is_valid_component_id(c))
            .ok_or_else(|| malformed(format!("component #{index}: missing or invalid `id`")))?;
        let kind_str = component
            .kind
            .ok_or_else(|| malformed(format!("component '{component_id}': missing `kind`")))?;
        let kind = ComponentKind::parse(&kind_str).ok_or_else(|| {
            malformed(format!(
                "component '{component_id}': unknown kind '{kind_str}'"
            ))
        })?;
        let entry = component
            .entry
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| malformed(format!("component '{component_id}': missing `entry`")))?;

        if !seen.insert(component_id.clone()) {
            return Err(malformed(format!(
                "duplicate component id '{component_id}'"
            )));
        }

        declared_components.push(ComponentDeclaration {
            component_id,
            kind,
            entry_point: EntryPointRef::new(entry),
        });
    }

    let resources = parse_resources(raw.resources, &malformed)?;

    if let Some(path) = raw.code.as_ref().and_then(|code| code.path.as_ref())
        && !is_bundle_relative(path)
    {
        return Err(malformed(format!(
            "code path '{}' must stay inside the bundle directory",
            path.display()
        )));
    }

    Ok(BundleDescriptor {
        id,
        version,
        api_version: raw.api_version.unwrap_or(API_VERSION),
        description: raw.description,
        declared_components,
        dependencies,
        code: raw.code,
        resources,
    })
}

fn parse_resources(
    raw: Vec<RawResource>,
    malformed: &impl Fn(String) -> PluginError,
) -> Result<Vec<ResourceDeclaration>, PluginError> {
    let mut keys = HashSet::new();
    let mut ids = HashSet::new();
    let mut resources = Vec::with_capacity(raw.len());

    for (index, resource) in raw.into_iter().enumerate() {
        let key = resource
            .key
            .filter(|k| !k.is_empty())
            .ok_or_else(|| malformed(format!("resource #{index}: missing `key`")))?;

        let source = match (resource.value, resource.file) {
            (Some(text), None) => ResourceSource::Text(text),
            (None, Some(file)) => {
                if !is_bundle_relative(&file) {
                    return Err(malformed(format!(
                        "resource '{key}': file '{}' must stay inside the bundle directory",
                        file.display()
                    )));
                }
                ResourceSource::File(file)
            }
            _ => {
                return Err(malformed(format!(
                    "resource '{key}': exactly one of `value` or `file` is required"
                )));
            }
        };

        if !keys.insert(key.clone()) {
            return Err(malformed(format!("duplicate resource key '{key}'")));
        }
        if let Some(id) = resource.id
            && !ids.insert(id)
        {
            return Err(malformed(format!("duplicate resource id {id:#010x}")));
        }

        resources.push(ResourceDeclaration {
            key,
            host_id: resource.id,
            source,
            override_host: resource.override_host,
        });
    }

    Ok(resources)
}

/// A non-empty relative path with no `..`, root or prefix component
fn is_bundle_relative(path: &Path) -> bool {
    path.components().next().is_some()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

fn is_valid_bundle_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

fn is_valid_component_id(id: &str) -> bool {
    !id.is_empty() && !id.chars().any(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(manifest: &str) -> BundlePayload {
        BundlePayload {
            location: PathBuf::from("/bundles/test"),
            manifest: manifest.as_bytes().to_vec(),
        }
    }

    fn reason(err: PluginError) -> String {
        match err {
            PluginError::MalformedBundle { reason, .. } => reason,
            other => panic!("expected MalformedBundle, got {other:?}"),
        }
    }

    const FULL: &str = r#"
id = "alpha"
version = 3
description = "Alpha features"
dependencies = ["base", "net"]

[code]
format = "builtin"
module = "alpha"

[[components]]
id = "svc.alpha"
kind = "service"
entry = "AlphaService"

[[components]]
id = "rcv.alpha"
kind = "receiver"
entry = "AlphaReceiver"

[[resources]]
key = "greeting"
id = 0x7f010001
value = "hello"

[[resources]]
key = "logo"
file = "res/logo.png"
"#;

    #[test]
    fn test_read_full_manifest() {
        let descriptor = read(&payload(FULL)).unwrap();

        assert_eq!(descriptor.id, "alpha");
        assert_eq!(descriptor.version, 3);
        assert_eq!(descriptor.api_version, API_VERSION);
        assert_eq!(descriptor.description.as_deref(), Some("Alpha features"));
        assert_eq!(
            descriptor.dependencies.iter().collect::<Vec<_>>(),
            vec!["base", "net"]
        );

        let code = descriptor.code.as_ref().unwrap();
        assert_eq!(code.format, "builtin");
        assert_eq!(code.module.as_deref(), Some("alpha"));

        assert_eq!(descriptor.declared_components.len(), 2);
        let svc = descriptor.component("svc.alpha").unwrap();
        assert_eq!(svc.kind, ComponentKind::Service);
        assert_eq!(svc.entry_point.symbol(), "AlphaService");

        assert_eq!(descriptor.resources.len(), 2);
        assert_eq!(descriptor.resources[0].host_id, Some(0x7f01_0001));
        assert_eq!(
            descriptor.resources[1].source,
            ResourceSource::File(PathBuf::from("res/logo.png"))
        );
    }

    #[test]
    fn test_components_keep_declaration_order() {
        let descriptor = read(&payload(FULL)).unwrap();
        let ids: Vec<&str> = descriptor
            .declared_components
            .iter()
            .map(|c| c.component_id.as_str())
            .collect();
        assert_eq!(ids, vec!["svc.alpha", "rcv.alpha"]);
    }

    #[test]
    fn test_minimal_manifest() {
        let descriptor = read(&payload("id = \"min\"\nversion = 0\n")).unwrap();
        assert!(descriptor.declared_components.is_empty());
        assert!(descriptor.dependencies.is_empty());
        assert!(descriptor.code.is_none());
    }

    #[test]
    fn test_missing_id() {
        let err = read(&payload("version = 1\n")).unwrap_err();
        assert!(reason(err).contains("`id`"));
    }

    #[test]
    fn test_missing_version() {
        let err = read(&payload("id = \"a\"\n")).unwrap_err();
        assert!(reason(err).contains("`version`"));
    }

    #[test]
    fn test_negative_version() {
        let err = read(&payload("id = \"a\"\nversion = -1\n")).unwrap_err();
        assert!(reason(err).contains("negative"));
    }

    #[test]
    fn test_invalid_bundle_id() {
        let err = read(&payload("id = \"has space\"\nversion = 1\n")).unwrap_err();
        assert!(reason(err).contains("invalid bundle id"));
    }

    #[test]
    fn test_self_dependency() {
        let err = read(&payload("id = \"a\"\nversion = 1\ndependencies = [\"a\"]\n")).unwrap_err();
        assert!(reason(err).contains("depends on itself"));
    }

    #[test]
    fn test_unknown_component_kind() {
        let manifest = r#"
id = "a"
version = 1
[[components]]
id = "x"
kind = "widget"
entry = "X"
"#;
        let err = read(&payload(manifest)).unwrap_err();
        assert!(reason(err).contains("unknown kind 'widget'"));
    }

    #[test]
    fn test_duplicate_component_id() {
        let manifest = r#"
id = "a"
version = 1
[[components]]
id = "svc.same"
kind = "service"
entry = "One"
[[components]]
id = "svc.same"
kind = "receiver"
entry = "Two"
"#;
        let err = read(&payload(manifest)).unwrap_err();
        assert!(reason(err).contains("duplicate component id 'svc.same'"));
    }

    #[test]
    fn test_component_missing_entry() {
        let manifest = r#"
id = "a"
version = 1
[[components]]
id = "svc.a"
kind = "service"
"#;
        let err = read(&payload(manifest)).unwrap_err();
        assert!(reason(err).contains("missing `entry`"));
    }

    #[test]
    fn test_duplicate_resource_key_and_id() {
        let dup_key = r#"
id = "a"
version = 1
[[resources]]
key = "k"
value = "1"
[[resources]]
key = "k"
value = "2"
"#;
        assert!(reason(read(&payload(dup_key)).unwrap_err()).contains("duplicate resource key"));

        let dup_id = r#"
id = "a"
version = 1
[[resources]]
key = "k1"
id = 7
value = "1"
[[resources]]
key = "k2"
id = 7
value = "2"
"#;
        assert!(reason(read(&payload(dup_id)).unwrap_err()).contains("duplicate resource id"));
    }

    #[test]
    fn test_resource_file_must_stay_in_bundle() {
        for file in ["../b/secret.txt", "res/../../b/secret.txt", "/etc/passwd"] {
            let manifest = format!(
                "id = \"a\"\nversion = 1\n[[resources]]\nkey = \"stolen\"\nfile = \"{file}\"\n"
            );
            let err = read(&payload(&manifest)).unwrap_err();
            assert!(reason(err).contains("inside the bundle directory"), "{file}");
        }

        let nested = "id = \"a\"\nversion = 1\n[[resources]]\nkey = \"logo\"\nfile = \"./res/logo.png\"\n";
        let descriptor = read(&payload(nested)).unwrap();
        assert_eq!(
            descriptor.resources[0].source,
            ResourceSource::File(PathBuf::from("./res/logo.png"))
        );
    }

    #[test]
    fn test_code_path_must_stay_in_bundle() {
        for path in ["../other/libother.so", "/usr/lib/libevil.so"] {
            let manifest = format!(
                "id = \"a\"\nversion = 1\n[code]\nformat = \"native\"\npath = \"{path}\"\n"
            );
            let err = read(&payload(&manifest)).unwrap_err();
            assert!(reason(err).contains("inside the bundle directory"), "{path}");
        }

        let local = "id = \"a\"\nversion = 1\n[code]\nformat = \"native\"\npath = \"lib/liba.so\"\n";
        assert!(read(&payload(local)).is_ok());
    }

    #[test]
    fn test_resource_needs_exactly_one_payload() {
        let both = r#"
id = "a"
version = 1
[[resources]]
key = "k"
value = "1"
file = "k.bin"
"#;
        assert!(reason(read(&payload(both)).unwrap_err()).contains("exactly one"));
    }

    #[test]
    fn test_not_utf8() {
        let bad = BundlePayload {
            location: PathBuf::from("/bundles/bad"),
            manifest: vec![0xff, 0xfe, 0x00],
        };
        assert!(reason(read(&bad).unwrap_err()).contains("UTF-8"));
    }

    #[test]
    fn test_not_toml() {
        let err = read(&payload("this is = = not toml")).unwrap_err();
        assert!(reason(err).contains("invalid manifest"));
    }

    #[test]
    fn test_component_kind_roundtrip() {
        for kind in [
            ComponentKind::Service,
            ComponentKind::Receiver,
            ComponentKind::LifecycleOwner,
            ComponentKind::Other,
        ] {
            assert_eq!(ComponentKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ComponentKind::parse("activity"), None);
    }
}
