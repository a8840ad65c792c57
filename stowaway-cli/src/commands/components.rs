//! List registered components

use anyhow::Result;
use clap::Args;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};

use crate::config::ConfigLoader;
use crate::host;

/// Components arguments
#[derive(Args, Debug)]
pub struct ComponentsArgs {
    /// Only show components owned by this bundle
    #[arg(long)]
    pub bundle: Option<String>,
}

/// Run components command
pub fn run(args: ComponentsArgs) -> Result<()> {
    let config = ConfigLoader::load()?;
    let host = host::attach(&config);

    let entries: Vec<_> = host
        .manager
        .components()
        .into_iter()
        .filter(|e| args.bundle.as_deref().is_none_or(|b| e.bundle_id == b))
        .collect();

    if entries.is_empty() {
        println!("No components registered");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Component").fg(Color::Cyan),
        Cell::new("Kind").fg(Color::Cyan),
        Cell::new("Bundle").fg(Color::Cyan),
        Cell::new("Entry point").fg(Color::Cyan),
    ]);

    for entry in entries {
        table.add_row(vec![
            Cell::new(&entry.component_id),
            Cell::new(entry.kind),
            Cell::new(&entry.bundle_id),
            Cell::new(&entry.entry_point),
        ]);
    }

    println!("{table}");
    Ok(())
}
