//! Selecta CLI
//!
//! Mount the demo page or replay interaction scenarios against it.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use selecta_cn::ComboboxSettings;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod demo;
mod scenario;

use demo::DemoPage;
use scenario::Scenario;

#[derive(Parser)]
#[command(name = "selecta")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Headless combobox demo and scenario runner", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mount the demo page and print its snapshot as JSON
    Demo {
        /// Combobox settings file (TOML)
        #[arg(short, long)]
        settings: Option<PathBuf>,
    },

    /// Replay a scenario file against the demo page
    Run {
        /// Scenario file (JSON)
        scenario: PathBuf,

        /// Write the report to this file as JSON
        #[arg(short, long)]
        report: Option<PathBuf>,

        /// Combobox settings file (TOML)
        #[arg(short, long)]
        settings: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match cli.command {
        Commands::Demo { settings } => cmd_demo(settings.as_deref()),
        Commands::Run {
            scenario,
            report,
            settings,
        } => cmd_run(&scenario, report.as_deref(), settings.as_deref()),
    }
}

fn load_settings(path: Option<&Path>) -> Result<ComboboxSettings> {
    match path {
        Some(path) => {
            let settings = ComboboxSettings::from_path(path)
                .with_context(|| format!("Failed to load settings from {}", path.display()))?;
            info!("Loaded settings from {}", path.display());
            Ok(settings)
        }
        None => Ok(ComboboxSettings::default()),
    }
}

fn cmd_demo(settings: Option<&Path>) -> Result<()> {
    let settings = load_settings(settings)?;
    let demo = DemoPage::mount(&settings).context("Failed to mount demo page")?;

    let snapshot = serde_json::to_string_pretty(&demo.snapshot())?;
    println!("{snapshot}");
    Ok(())
}

fn cmd_run(path: &Path, report_path: Option<&Path>, settings: Option<&Path>) -> Result<()> {
    let settings = load_settings(settings)?;
    let source = fs::read_to_string(path)
        .with_context(|| format!("Failed to read scenario {}", path.display()))?;
    let scenario: Scenario = serde_json::from_str(&source)
        .with_context(|| format!("Invalid scenario {}", path.display()))?;

    if let Some(description) = &scenario.description {
        info!("{}", description);
    }

    let report = scenario::run(&scenario, &settings).context("Failed to mount demo page")?;
    report.print_summary();

    if let Some(report_path) = report_path {
        let json = serde_json::to_string_pretty(&report)?;
        fs::write(report_path, json)
            .with_context(|| format!("Failed to write report {}", report_path.display()))?;
        info!("Report written to {}", report_path.display());
    }

    // Exit with error code if the scenario failed
    if report.is_passed() {
        Ok(())
    } else {
        std::process::exit(1);
    }
}
