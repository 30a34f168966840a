use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use openclaw_bootstrap::settings::{Layout, Settings};
use openclaw_bootstrap::{Result, migrate, restore, supervisor, synth};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Override the canonical state directory
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,
    /// Override the backup volume root
    #[arg(long, global = true)]
    backup_dir: Option<PathBuf>,
    /// Override the agent workspace directory
    #[arg(long, global = true)]
    workspace_dir: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Full startup pipeline: migrate, restore, synthesize, supervise
    Run,
    /// Migrate the legacy state path and restore from backup, then stop
    Sync,
    /// Print the synthesized configuration document without writing it
    Render,
}

fn main() -> ExitCode {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let layout = match build_layout(&args) {
        Ok(l) => l,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };
    let settings = Settings::from_env();

    let res = match args.cmd {
        Command::Run => return cmd_run(&layout, &settings),
        Command::Sync => cmd_sync(&layout),
        Command::Render => cmd_render(&layout, &settings),
    };
    match res {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn build_layout(args: &Args) -> Result<Layout> {
    let mut layout = Layout::from_env()?;
    if let Some(dir) = &args.state_dir {
        layout.state_dir = dir.clone();
    }
    if let Some(dir) = &args.backup_dir {
        layout.backup_root = dir.clone();
    }
    if let Some(dir) = &args.workspace_dir {
        layout.workspace_dir = dir.clone();
    }
    Ok(layout)
}

/// The boot pipeline. Stages 1-3 are recoverable by design: whatever state
/// they leave behind, the gateway is still launched, and the process exit
/// code is the gateway's own.
fn cmd_run(layout: &Layout, settings: &Settings) -> ExitCode {
    // A live gateway means a previous boot already did all of this.
    if supervisor::gateway_already_running(&settings.gateway_program) {
        info!("gateway already running; startup pipeline skipped");
        return ExitCode::SUCCESS;
    }

    match migrate::migrate_legacy_state_dir(layout) {
        Ok(outcome) => info!("migrate: {outcome:?}"),
        Err(e) => warn!("migrate failed: {e}"),
    }
    match restore::restore_from_backup(layout) {
        Ok(outcome) => info!("restore: {outcome:?}"),
        Err(e) => warn!("restore failed: {e}"),
    }
    if let Err(e) = synth::synthesize(layout, settings) {
        warn!("config synthesis failed, gateway will start on existing state: {e}");
    }

    match supervisor::run(layout, settings) {
        Ok(code) => ExitCode::from(code.clamp(0, 255) as u8),
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn cmd_sync(layout: &Layout) -> Result<()> {
    let migrated = migrate::migrate_legacy_state_dir(layout)?;
    info!("migrate: {migrated:?}");
    let restored = restore::restore_from_backup(layout)?;
    info!("restore: {restored:?}");
    Ok(())
}

fn cmd_render(layout: &Layout, settings: &Settings) -> Result<()> {
    let doc = synth::render(layout, settings);
    println!("{}", serde_json::to_string_pretty(&doc)?);
    Ok(())
}
