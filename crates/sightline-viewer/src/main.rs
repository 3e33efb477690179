//! Headless display viewer.
//!
//! Opens one display, lets values arrive for a while, applies any requested
//! writes and prints the resulting element state.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use sightline_runtime::{Engine, ViewerConfig, WindowId};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "sightline-viewer",
    version,
    about = "Open a display headless and print its live element state",
    after_help = "Examples:\n  sightline-viewer main.ui --macro P=SR1\n  sightline-viewer --config viewer.toml main --set SR1:MODE=On --describe SR1:MODE\n  sightline-viewer main --json"
)]
struct Args {
    /// Display file (`.ui` is appended when there is no extension).
    display: String,
    /// Viewer configuration file.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Macro definitions for the display, `K=V,K2=V2`.
    #[arg(long = "macro", short, default_value = "")]
    macros: String,
    /// Extra display search directory. May be repeated.
    #[arg(long = "search", value_name = "DIR")]
    search: Vec<PathBuf>,
    /// Write `NAME=VALUE` after the first values arrived. May be repeated.
    #[arg(long = "set", value_name = "NAME=VALUE")]
    sets: Vec<String>,
    /// Print the info panel of a channel. May be repeated.
    #[arg(long = "describe", value_name = "NAME")]
    describe: Vec<String>,
    /// How long to wait for values, in milliseconds.
    #[arg(long, default_value_t = 500)]
    wait_ms: u64,
    /// Print JSON instead of text.
    #[arg(long)]
    json: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => ViewerConfig::load(path)?,
        None => ViewerConfig::default(),
    };
    config.apply_env();
    config.display.search_path.extend(args.search.iter().cloned());

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(
                config
                    .log_level
                    .parse()
                    .with_context(|| format!("log level '{}'", config.log_level))?,
            ),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut engine = Engine::from_config(&config)?;
    let window = engine.open(&args.display, &args.macros)?;
    let wait = Duration::from_millis(args.wait_ms);
    let handled = engine.pump_for(wait);
    info!("{handled} updates after open");

    for set in &args.sets {
        let (name, value) = set
            .split_once('=')
            .with_context(|| format!("expected NAME=VALUE, got '{set}'"))?;
        engine.write_channel(name.trim(), value, "sightline-viewer")?;
    }
    if !args.sets.is_empty() {
        engine.pump_for(wait);
    }

    if args.json {
        print_json(&engine, window, &args.describe)?;
    } else {
        print_text(&engine, window, &args.describe)?;
    }
    Ok(())
}

fn print_text(engine: &Engine, window: WindowId, describe: &[String]) -> anyhow::Result<()> {
    let opened = engine.window(window).context("window closed")?;
    for missing in &opened.report.missing {
        println!("missing include: {missing}");
    }
    for element in opened.elements() {
        let view = &element.view;
        let state = if view.connected { "" } else { " (not connected)" };
        let shown = if view.text.is_empty() {
            view.value.map(|value| value.to_string()).unwrap_or_default()
        } else {
            view.text.to_string()
        };
        println!("{:<24} {:<14} {shown}{state}", element.name, format!("{:?}", element.class));
    }
    for name in describe {
        println!();
        println!("{}", engine.describe(name)?.render());
    }
    Ok(())
}

fn print_json(engine: &Engine, window: WindowId, describe: &[String]) -> anyhow::Result<()> {
    let opened = engine.window(window).context("window closed")?;
    let elements: Vec<_> = opened
        .elements()
        .iter()
        .map(|element| {
            serde_json::json!({
                "name": element.name,
                "class": element.class,
                "origin": element.origin,
                "view": element.view,
            })
        })
        .collect();
    let channels = describe
        .iter()
        .map(|name| engine.describe(name))
        .collect::<Result<Vec<_>, _>>()?;
    let out = serde_json::json!({
        "display": opened.file,
        "elements": elements,
        "missing": opened.report.missing,
        "channels": channels,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
