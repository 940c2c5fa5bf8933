// tether_sim/src/cli.rs

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tether_core::types::Role;

/// Tether: tele-operation control and world-state synchronization.
///
/// Runs a control node on the built-in kinematic world. The authoritative
/// node owns simulation truth; observers mirror it over the bus.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// The path to the scenario TOML file to run.
    #[arg(short, long, default_value = "assets/scenarios/two_hands.toml")]
    pub config: PathBuf,

    /// Override the role from the scenario.
    #[arg(long, value_enum)]
    pub role: Option<RoleArg>,

    /// Stop after this many ticks, overriding `simulation.max_ticks`.
    #[arg(long)]
    pub ticks: Option<u64>,

    /// Also run an observer node in-process, subscribed to the same bus.
    #[arg(long, default_value_t = false)]
    pub with_observer: bool,

    /// Print the resolved scenario as TOML and exit.
    #[arg(long, default_value_t = false)]
    pub print_config: bool,

    /// Log filter used when `RUST_LOG` is not set.
    #[arg(long, default_value = "info,tether_sim=debug")]
    pub log: String,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleArg {
    Authoritative,
    Observer,
}

impl From<RoleArg> for Role {
    fn from(arg: RoleArg) -> Self {
        match arg {
            RoleArg::Authoritative => Role::Authoritative,
            RoleArg::Observer => Role::Observer,
        }
    }
}
