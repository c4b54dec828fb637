//! Kinetix Replay
//!
//! Headless driver for kinetix_physics. Loads a level (or builds an empty
//! bordered scene), steps it with a constant binding-action vector and
//! reports how the episode ended.
//!
//! Run with: cargo run -p kinetix_runner -- level.json --steps 600
//!       or: cargo run --bin kinetix-replay -- --help

mod run_config;

use run_config::{RunConfig, USAGE};

use kinetix_physics::{Level, PhysicsError, StaticParams, Terminal};
use std::fs::File;
use std::io::BufReader;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Outcome of a replay run
#[derive(Debug, Clone, PartialEq)]
pub struct ReplaySummary {
    pub steps_run: u32,
    pub terminal: Terminal,
    pub interrupted: bool,
}

fn main() -> ExitCode {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match RunConfig::load() {
        Ok(config) => config,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("{}", USAGE);
            return ExitCode::from(2);
        }
    };
    if config.help {
        println!("{}", USAGE);
        return ExitCode::SUCCESS;
    }
    config.print_summary();

    // Ctrl-C ends the run after the current step
    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        if let Err(e) = ctrlc::set_handler(move || stop.store(true, Ordering::SeqCst)) {
            log::warn!("Could not install Ctrl-C handler: {}", e);
        }
    }

    let mut level = match load_level(&config) {
        Ok(level) => level,
        Err(e) => {
            log::error!("Failed to load level: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let summary = match run_replay(&mut level, &config, &stop) {
        Ok(summary) => summary,
        Err(e) => {
            log::error!("Replay failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    log::info!(
        "Finished after {} steps: {:?}{}",
        summary.steps_run,
        summary.terminal,
        if summary.interrupted { " (interrupted)" } else { "" }
    );

    if let Some(path) = &config.output {
        if let Err(e) = save_level(&level, path, config.compress) {
            log::error!("Failed to write {}: {}", path.display(), e);
            return ExitCode::FAILURE;
        }
        log::info!("Wrote final level to {}", path.display());
    }

    println!("{}", summary.terminal.value());
    ExitCode::SUCCESS
}

fn load_level(config: &RunConfig) -> Result<Level, Box<dyn std::error::Error>> {
    match &config.level {
        Some(path) => {
            let file = File::open(path)?;
            let level = Level::from_reader(BufReader::new(file))?;
            log::info!(
                "Loaded {} ({} active bodies)",
                path.display(),
                level.state.active_bodies().count()
            );
            Ok(level)
        }
        None => Ok(Level::empty(&config.size)?),
    }
}

fn save_level(level: &Level, path: &std::path::Path, compress: bool) -> Result<(), Box<dyn std::error::Error>> {
    std::fs::write(path, level.to_json_string(compress)?)?;
    Ok(())
}

/// Binding actions for the run, zero-filled when none were configured
fn binding_actions(config: &RunConfig, params: &StaticParams) -> Vec<f32> {
    if config.actions.is_empty() {
        vec![0.0; params.num_motor_bindings + params.num_thruster_bindings]
    } else {
        config.actions.clone()
    }
}

/// Step `level` as configured
pub fn run_replay(level: &mut Level, config: &RunConfig, stop: &AtomicBool) -> Result<ReplaySummary, PhysicsError> {
    let engine = level.engine()?;
    let actions = binding_actions(config, &level.static_params);
    let mut summary = ReplaySummary {
        steps_run: 0,
        terminal: Terminal::Ongoing,
        interrupted: false,
    };

    while summary.steps_run < config.steps {
        if stop.load(Ordering::SeqCst) {
            summary.interrupted = true;
            break;
        }

        let terminal = engine.step_bound(&mut level.state, &actions)?;
        summary.steps_run += 1;
        if terminal != summary.terminal {
            log::info!("Step {}: {:?}", summary.steps_run, terminal);
        }
        summary.terminal = terminal;

        if config.report_every > 0 && summary.steps_run % config.report_every == 0 {
            log::info!(
                "Step {}/{}: {} active bodies",
                summary.steps_run,
                config.steps,
                level.state.active_bodies().count()
            );
        }
        if terminal.is_done() && config.stop_on_terminal {
            break;
        }
    }
    Ok(summary)
}
