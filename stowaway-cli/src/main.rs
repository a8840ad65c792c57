use anyhow::Result;
use clap::{Parser, Subcommand};

mod builtin;
mod commands;
mod config;
mod host;

#[derive(Parser)]
#[command(name = "stowaway", about = "Load feature bundles into a host at runtime")]
#[command(version, propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage bundles
    Bundles(commands::bundles::BundlesArgs),
    /// List registered components
    Components(commands::components::ComponentsArgs),
    /// Send a lifecycle event to a component
    Dispatch(commands::dispatch::DispatchArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Bundles(args) => commands::bundles::run(args),
        Commands::Components(args) => commands::components::run(args),
        Commands::Dispatch(args) => commands::dispatch::run(args),
    }
}
