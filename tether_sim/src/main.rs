// tether_sim/src/main.rs

//! Runs a Tether control node on the built-in kinematic world.
//!
//! To run the bundled scenario with an in-process observer:
//! `cargo run --bin tether-sim -- --with-observer --ticks 500`

use clap::Parser;
use std::process::ExitCode;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use tether_sim::cli::Cli;
use tether_sim::prelude::*;

#[derive(Debug, Error)]
enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Loop(#[from] LoopError),
    #[error(transparent)]
    Bus(#[from] BusError),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG wins over --log.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), AppError> {
    // --- 1. Load Scenario Configuration ---
    info!("Loading scenario from: {}", cli.config.display());
    let mut config = tether_sim::simulation::config::load(&cli.config)?;
    if let Some(ticks) = cli.ticks {
        config.simulation.max_ticks = Some(ticks);
    }
    if let Some(role) = cli.role {
        config.control.role = role.into();
    }

    if cli.print_config {
        println!("{}", config.to_toml()?);
        return Ok(());
    }

    let bus = MessageBus::new()?;

    // --- 2. Optional in-process observer ---
    let heartbeats = Arc::new(AtomicU64::new(0));
    let mut heartbeat_watch = None;
    let mut observer = None;
    if cli.with_observer && config.control.role == Role::Authoritative {
        let counter = Arc::clone(&heartbeats);
        heartbeat_watch = Some(bus.subscribe(&config.bus.heartbeat_channel, move |_| {
            let n = counter.fetch_add(1, Ordering::Relaxed) + 1;
            if n % 100 == 0 {
                debug!("Observer confirmed {} snapshots.", n);
            }
        }));

        // Started here so it is listening before the first broadcast.
        let mut node = observer_node(&config, bus.clone());
        node.initialize()?;
        node.start()?;
        observer = Some(thread::spawn(move || node.run()));
    }

    // --- 3. Run the node ---
    let report = match config.control.role {
        Role::Authoritative => {
            let world = KinematicWorld::from_scene(&config.scene, config.simulation.step_size);
            let rig = VirtualControllerRig::from_config(&config);
            ControlLoop::from_config(world, rig, bus.clone(), &config).run()?
        }
        Role::Observer => {
            if config.simulation.max_ticks.is_none() {
                warn!("Observer without a tick limit runs until SHUTDOWN arrives.");
            }
            observer_node(&config, bus.clone()).run()?
        }
    };
    info!("Run finished: {:?}", report);

    // --- 4. Wind down ---
    if !bus.settle(Duration::from_secs(1)) {
        warn!("Bus did not drain within a second.");
    }
    if let Some(handle) = observer {
        match handle.join() {
            Ok(Ok(report)) => info!(
                "Observer mirrored {} snapshots over {} ticks.",
                report.received, report.ticks
            ),
            Ok(Err(e)) => error!("Observer failed: {}", e),
            Err(_) => error!("Observer thread panicked."),
        }
    }
    drop(heartbeat_watch);
    if cli.with_observer {
        info!("Heartbeats received: {}", heartbeats.load(Ordering::Relaxed));
    }
    Ok(())
}

/// A mirror of the authoritative world. It stops when SHUTDOWN arrives.
fn observer_node(
    config: &ScenarioConfig,
    bus: MessageBus,
) -> ControlLoop<KinematicWorld, ObserverSource> {
    let world = KinematicWorld::from_scene(&config.scene, config.simulation.step_size);
    let source = ObserverSource::new(config.scene.controllers.clone());
    let mut settings = LoopSettings::from_config(config);
    if config.control.role == Role::Authoritative {
        settings.max_ticks = None;
    }
    ControlLoop::new(world, source, bus, settings)
}
