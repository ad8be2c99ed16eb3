//! distup - Plesk distribution upgrade CLI.
//!
//! Upgrades a Debian 11 server running Plesk to Debian 12 in place:
//! - Pre-flight checks before anything is changed
//! - Repository switch and package dist-upgrade
//! - Automatic resume after every reboot through a systemd service

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use dialoguer::Confirm;
use tracing::{debug, error, info};

use distup::check::evaluate_all;
use distup::config::{Args, Config, LogFormat, Mode};
use distup::distro::Distro;
use distup::error::DistupError;
use distup::host::{HostProbe, SystemHost};
use distup::lock::RunLock;
use distup::output::{print_check_results, print_plan, print_status};
use distup::phase::Phase;
use distup::registry;
use distup::runner::{RunOutcome, Runner};
use distup::state::{CompletionRecord, FileStateStore, StateStore};
use distup::upgrader::UpgradeDefinition;

fn main() {
    let args = Args::parse();
    let bin_path = std::env::current_exe()
        .ok()
        .and_then(|p| p.canonicalize().ok())
        .unwrap_or_else(|| PathBuf::from(distup::config::DEFAULT_BIN_PATH));
    let config = Config::from_args(args, bin_path);

    if let Err(e) = init_tracing(&config.log_level, config.log_format) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    debug!("Starting distup {}", distup::config::VERSION);

    if let Err(e) = run(&config) {
        error!("{:#}", e);
        if e
            .downcast_ref::<DistupError>()
            .is_some_and(DistupError::is_host_untouched)
        {
            info!("The server was not changed, it is safe to run distup again");
        }
        std::process::exit(1);
    }
}

/// Initialize tracing subscriber.
fn init_tracing(log_level: &str, format: LogFormat) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .map_err(|e| anyhow::anyhow!("Failed to initialize log filter: {}", e))?;

    match format {
        LogFormat::Json => fmt().with_env_filter(filter).json().with_target(true).init(),
        LogFormat::Text => fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .init(),
    }

    Ok(())
}

/// Main application logic.
fn run(config: &Config) -> Result<()> {
    let mut host = SystemHost::new();
    let store = FileStateStore::new(&config.options.status_flag_path);

    match config.mode {
        Mode::Status => show_status(config, &host, &store),
        Mode::ShowPlan => show_plan(config, &host, &store),
        Mode::Revert => {
            let mut lock = RunLock::open(store.path())?;
            let _guard = lock.acquire()?;
            let (_, definition) = detect_definition(&host, &store)?;
            confirm(config, "Revert the prepared changes on this server?")?;
            Runner::new(&definition, store, config.options.clone(), &mut host).revert()
        }
        Mode::Resume | Mode::Run => upgrade(config, &mut host, store),
    }
}

fn upgrade(config: &Config, host: &mut SystemHost, store: FileStateStore) -> Result<()> {
    // Held until the run returns, so the resume service and a manual run
    // never drive the same host at once.
    let mut lock = RunLock::open(store.path())?;
    let _guard = lock.acquire()?;

    let (current, definition) = detect_definition(host, &store)?;

    if store.load()?.is_none() {
        if config.mode == Mode::Resume {
            return Err(DistupError::State(format!(
                "no upgrade in progress ({} not found)",
                store.path().display()
            ))
            .into());
        }
        println!(
            "{}",
            format!("This will upgrade {} to {}.", current, definition.to)
                .yellow()
                .bold()
        );
        println!("The server will be rebooted several times during the upgrade.");
        confirm(config, "Start the upgrade?")?;
    }

    let outcome = Runner::new(&definition, store, config.options.clone(), host).run()?;
    report(&outcome);
    Ok(())
}

fn show_plan(config: &Config, host: &SystemHost, store: &FileStateStore) -> Result<()> {
    let (_, definition) = detect_definition(host, store)?;
    let existing = store.load()?;
    let phase = existing.as_ref().map_or(Phase::Prepare, |state| state.phase);
    let options = existing.map_or_else(|| config.options.clone(), |state| state.options);

    print_check_results(&evaluate_all(
        &definition.check_actions(&options, phase),
        host,
    ));
    print_plan(&definition.build_plan(&options, phase));
    Ok(())
}

fn detect_definition(
    probe: &dyn HostProbe,
    store: &FileStateStore,
) -> Result<(Distro, UpgradeDefinition)> {
    let current = Distro::detect(probe)?;
    let definition = select_definition(&current, store)?;
    info!(
        "Using {} ({} -> {}) on {}",
        definition.name, definition.from, definition.to, current
    );
    Ok((current, definition))
}

/// Pick the upgrade definition for the running release. A run in progress
/// may already be on the target release, so fall back to the upgrader named
/// in the state file.
fn select_definition(current: &Distro, store: &FileStateStore) -> Result<UpgradeDefinition> {
    match registry::select(current, None) {
        Ok(definition) => Ok(definition),
        Err(e) => {
            let Some(state) = store.load()? else {
                return Err(e.into());
            };
            registry::all()
                .into_iter()
                .find(|definition| definition.name == state.upgrader)
                .ok_or_else(|| e.into())
        }
    }
}

fn confirm(config: &Config, prompt: &str) -> Result<()> {
    if !config.needs_confirmation() {
        return Ok(());
    }
    if !Confirm::new().with_prompt(prompt).default(false).interact()? {
        return Err(DistupError::UserCancelled.into());
    }
    Ok(())
}

fn show_status(config: &Config, probe: &dyn HostProbe, store: &FileStateStore) -> Result<()> {
    let state = store.load()?;
    let completion = match probe.read_file(&config.options.completion_flag_path) {
        Ok(content) => Some(CompletionRecord::from_json(&content).with_context(|| {
            format!(
                "Failed to read {}",
                config.options.completion_flag_path.display()
            )
        })?),
        Err(_) => None,
    };
    print_status(state.as_ref(), completion.as_ref());
    Ok(())
}

fn report(outcome: &RunOutcome) {
    match outcome {
        RunOutcome::Rebooting { phase, stage } => println!(
            "{} Rebooting after stage '{}'. The upgrade continues in phase '{}' after boot.",
            "→".cyan(),
            stage,
            phase
        ),
        RunOutcome::Completed { rebooting } => {
            println!("{} The upgrade has been completed.", "✓".green());
            if *rebooting {
                println!("The server is rebooting one last time.");
            }
        }
        RunOutcome::AlreadyCompleted => {
            println!("{} The upgrade was already completed.", "✓".green());
        }
    }
}
