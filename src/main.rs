//! Replaydeck CLI
//!
//! Runs a standalone fixture from a TOML config file, in capture or
//! playback mode, until interrupted.

use std::path::Path;
use std::process;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use replaydeck::config::{FixtureConfig, Hooks, Mode};
use replaydeck::Fixture;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 3 {
        eprintln!("Replaydeck v{}", env!("CARGO_PKG_VERSION"));
        eprintln!();
        eprintln!("Usage: replaydeck <command> <config.toml>");
        eprintln!();
        eprintln!("Commands:");
        eprintln!("  capture    Proxy live traffic and record it to the cassette");
        eprintln!("  playback   Serve recorded responses from the cassette");
        process::exit(1);
    }

    let mode = match args[1].as_str() {
        "capture" => Mode::Capture,
        "playback" => Mode::Playback,
        other => {
            eprintln!("Unknown command: {other}");
            eprintln!("Run 'replaydeck' for usage information.");
            process::exit(1);
        }
    };

    if let Err(e) = run(mode, Path::new(&args[2])) {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn run(mode: Mode, config_path: &Path) -> anyhow::Result<()> {
    let mut config = FixtureConfig::from_file(config_path)
        .with_context(|| format!("load config from {}", config_path.display()))?;
    config.mode = mode;

    let mut fixture = Fixture::new(config, Hooks::default())?;
    let port = fixture.start().context("start fixture")?;
    info!(port, ?mode, "Fixture listening on 127.0.0.1:{port}");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async {
        tokio::signal::ctrl_c().await.ok();
    });

    info!("Received SIGINT, shutting down");
    fixture.stop();
    Ok(())
}
