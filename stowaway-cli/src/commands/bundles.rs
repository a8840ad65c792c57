//! Bundle management commands

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use stowaway_core::source::MANIFEST_FILE;
use stowaway_core::{BundleDescriptor, BundlePayload, BundleSelection, CoreConfig, descriptor};

use crate::config::ConfigLoader;
use crate::host;

/// Bundle management arguments
#[derive(Args)]
pub struct BundlesArgs {
    #[command(subcommand)]
    pub command: BundlesCommands,
}

/// Bundle subcommands
#[derive(Subcommand)]
pub enum BundlesCommands {
    /// Load all enabled bundles and list them
    List,
    /// Validate a bundle directory and show its manifest
    Inspect {
        /// Bundle directory containing bundle.toml
        dir: PathBuf,
    },
    /// Enable a bundle
    Enable {
        /// Bundle id to enable
        id: String,
    },
    /// Disable a bundle
    Disable {
        /// Bundle id to disable
        id: String,
    },
}

/// Run bundles command
pub fn run(args: BundlesArgs) -> Result<()> {
    let config = ConfigLoader::load()?;

    match args.command {
        BundlesCommands::List => list_bundles(&config),
        BundlesCommands::Inspect { dir } => inspect_bundle(&dir),
        BundlesCommands::Enable { id } => enable_bundle(&config.core_config(), &id),
        BundlesCommands::Disable { id } => disable_bundle(&config.core_config(), &id),
    }
}

fn list_bundles(config: &crate::config::StowawayConfig) -> Result<()> {
    let host = host::attach(config);
    let manager = &host.manager;
    let report = manager.init();

    if manager.bundles().is_empty() && report.failed.is_empty() {
        println!("No bundles installed");
        println!();
        println!("Bundle directory: {}", config.bundles.user_dir.display());
        println!();
        println!("To install a bundle:");
        println!("  1. Create a bundle directory: mkdir -p <bundle dir>/my-bundle");
        println!("  2. Add a manifest: <bundle dir>/my-bundle/{MANIFEST_FILE}");
        println!("  3. Check it: stowaway bundles inspect <bundle dir>/my-bundle");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Bundle").fg(Color::Cyan),
        Cell::new("Version").fg(Color::Cyan),
        Cell::new("Code").fg(Color::Cyan),
        Cell::new("Components").fg(Color::Cyan),
        Cell::new("Depends on").fg(Color::Cyan),
        Cell::new("Loaded").fg(Color::Cyan),
        Cell::new("Status").fg(Color::Cyan),
    ]);

    for info in manager.bundles() {
        let code = if info.native {
            "native"
        } else if info.symbols.is_empty() {
            "none"
        } else {
            "builtin"
        };
        let status = if info.registration.is_clean() {
            Cell::new("✓ loaded").fg(Color::Green)
        } else {
            Cell::new(format!("✓ loaded, {} rejected", info.registration.rejected.len()))
                .fg(Color::Yellow)
        };

        table.add_row(vec![
            Cell::new(&info.id),
            Cell::new(info.version),
            Cell::new(code),
            Cell::new(info.registration.accepted.len()),
            Cell::new(info.dependencies.join(", ")),
            Cell::new(
                info.loaded_at
                    .with_timezone(&chrono::Local)
                    .format("%H:%M:%S%.3f"),
            ),
            status,
        ]);
    }

    for id in &report.skipped {
        table.add_row(vec![
            Cell::new(id),
            Cell::new(""),
            Cell::new(""),
            Cell::new(""),
            Cell::new(""),
            Cell::new(""),
            Cell::new("○ skipped").fg(Color::DarkGrey),
        ]);
    }

    for failure in &report.failed {
        let name = failure
            .bundle
            .clone()
            .unwrap_or_else(|| failure.location.display().to_string());
        table.add_row(vec![
            Cell::new(name),
            Cell::new(""),
            Cell::new(""),
            Cell::new(""),
            Cell::new(""),
            Cell::new(""),
            Cell::new(format!("✗ {}", failure.error)).fg(Color::Red),
        ]);
    }

    println!("{table}");
    Ok(())
}

fn read_descriptor(dir: &Path) -> Result<BundleDescriptor> {
    let manifest_path = dir.join(MANIFEST_FILE);
    let manifest = std::fs::read(&manifest_path)
        .with_context(|| format!("Failed to read {}", manifest_path.display()))?;
    let payload = BundlePayload {
        location: dir.to_path_buf(),
        manifest,
    };
    Ok(descriptor::read(&payload)?)
}

fn inspect_bundle(dir: &Path) -> Result<()> {
    let d = read_descriptor(dir)?;

    println!("Id:          {}", d.id);
    println!("Version:     {}", d.version);
    println!("API Version: {}", d.api_version);
    println!(
        "Description: {}",
        d.description.as_deref().unwrap_or("No description")
    );
    match &d.code {
        Some(code) => {
            let target = code
                .path
                .as_ref()
                .map(|p| p.display().to_string())
                .or_else(|| code.module.clone())
                .unwrap_or_default();
            println!("Code:        {} ({})", code.format, target);
        }
        None => println!("Code:        none"),
    }
    if !d.dependencies.is_empty() {
        let deps: Vec<&str> = d.dependencies.iter().map(String::as_str).collect();
        println!("Depends on:  {}", deps.join(", "));
    }

    if !d.declared_components.is_empty() {
        println!();
        println!("Components:");
        for c in &d.declared_components {
            println!("  {} ({}) -> {}", c.component_id, c.kind, c.entry_point);
        }
    }

    if !d.resources.is_empty() {
        println!();
        println!("Resources:");
        for r in &d.resources {
            let id = r.host_id.map(|id| format!(" [{id:#010x}]")).unwrap_or_default();
            let overrides = if r.override_host { " overrides host" } else { "" };
            println!("  {}{}{}", r.key, id, overrides);
        }
    }

    Ok(())
}

fn enable_bundle(config: &CoreConfig, id: &str) -> Result<()> {
    BundleSelection::update(&config.selection_path, |s| s.enable(id))?;
    println!("Enabled bundle: {}", id);
    println!("Run 'stowaway bundles list' to verify the bundle loads correctly.");
    Ok(())
}

fn disable_bundle(config: &CoreConfig, id: &str) -> Result<()> {
    BundleSelection::update(&config.selection_path, |s| s.disable(id))?;
    println!("Disabled bundle: {}", id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_bundles_args_parsing() {
        use clap::Parser;

        #[derive(Parser)]
        struct TestCli {
            #[command(subcommand)]
            cmd: BundlesCommands,
        }

        let cli = TestCli::parse_from(["test", "list"]);
        assert!(matches!(cli.cmd, BundlesCommands::List));

        let cli = TestCli::parse_from(["test", "inspect", "./my-bundle"]);
        assert!(
            matches!(cli.cmd, BundlesCommands::Inspect { dir } if dir == Path::new("./my-bundle"))
        );

        let cli = TestCli::parse_from(["test", "enable", "alpha"]);
        assert!(matches!(cli.cmd, BundlesCommands::Enable { id } if id == "alpha"));

        let cli = TestCli::parse_from(["test", "disable", "alpha"]);
        assert!(matches!(cli.cmd, BundlesCommands::Disable { id } if id == "alpha"));
    }

    #[test]
    fn test_enable_disable_roundtrip() {
        let dir = TempDir::new().unwrap();
        let config = CoreConfig::with_user_dir(dir.path());

        disable_bundle(&config, "alpha").unwrap();
        let selection = BundleSelection::load(&config.selection_path).unwrap();
        assert!(!selection.is_enabled("alpha"));

        enable_bundle(&config, "alpha").unwrap();
        let selection = BundleSelection::load(&config.selection_path).unwrap();
        assert!(selection.is_enabled("alpha"));
    }

    #[test]
    fn test_read_descriptor_from_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(MANIFEST_FILE),
            "id = \"alpha\"\nversion = 4\n",
        )
        .unwrap();

        let d = read_descriptor(dir.path()).unwrap();
        assert_eq!(d.id, "alpha");
        assert_eq!(d.version, 4);
        assert!(inspect_bundle(dir.path()).is_ok());
    }

    #[test]
    fn test_read_descriptor_missing_manifest() {
        let dir = TempDir::new().unwrap();
        let err = read_descriptor(dir.path()).unwrap_err();
        assert!(err.to_string().contains(MANIFEST_FILE));
    }
}
