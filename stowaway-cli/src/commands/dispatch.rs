//! Send one lifecycle event to a component

use anyhow::{Context, Result};
use clap::Args;
use stowaway_bundle_api::{EventOutcome, LifecycleEvent};

use crate::config::ConfigLoader;
use crate::host;

/// Dispatch arguments
#[derive(Args, Debug)]
pub struct DispatchArgs {
    /// Target component id
    pub component: String,

    /// Event as JSON, e.g. '{"type":"start"}'
    #[arg(default_value = r#"{"type":"start"}"#)]
    pub event: String,
}

/// Run dispatch command
pub fn run(args: DispatchArgs) -> Result<()> {
    let event = parse_event(&args.event)?;

    let config = ConfigLoader::load()?;
    let host = host::attach(&config);

    match host.manager.dispatch(&args.component, &event) {
        Ok(outcome) => {
            println!("{}", render_outcome(&outcome)?);
            Ok(())
        }
        Err(e) if e.is_routing_miss() => {
            println!("No bundle owns '{}'", args.component);
            println!("Run 'stowaway components' to see registered components.");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn parse_event(json: &str) -> Result<LifecycleEvent> {
    serde_json::from_str(json).with_context(|| format!("Invalid lifecycle event: {json}"))
}

fn render_outcome(outcome: &EventOutcome) -> Result<String> {
    Ok(match outcome {
        EventOutcome::Handled => "handled".to_string(),
        EventOutcome::Reply(value) => serde_json::to_string_pretty(value)?,
    })
}
