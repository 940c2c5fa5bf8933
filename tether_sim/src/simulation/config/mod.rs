// tether_sim/src/simulation/config/mod.rs

//! This module handles loading and validating all scenario configuration
//! from disk, with `TETHER_` environment variables layered on top.

mod serde_helpers;
pub mod structs;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

// Re-export public types
pub use structs::{
    BodyConfig, BusSection, ConstraintConfig, ControlSection, PoseConfig, RigSection,
    RoleChannels, SafetySection, ScenarioConfig, SceneSection, SimulationSection, TaskKind, TaskSection,
    WarningStyle, WorkspaceConfig,
};

/// Prefix of environment overrides, e.g. `TETHER_SIMULATION__SEED=7`.
pub const ENV_PREFIX: &str = "TETHER_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("scenario file not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to load scenario: {0}")]
    Extract(#[from] Box<figment::Error>),

    #[error("invalid scenario: {0}")]
    Invalid(String),
}

impl From<figment::Error> for ConfigError {
    fn from(e: figment::Error) -> Self {
        ConfigError::Extract(Box::new(e))
    }
}

/// The figment every loader starts from. Exposed so callers can layer
/// additional providers before extracting.
pub fn figment_for(path: &Path) -> Figment {
    Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
}

/// Loads, merges and validates the scenario at `path`.
pub fn load(path: &Path) -> Result<ScenarioConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }
    let config: ScenarioConfig = figment_for(path).extract()?;
    config.validate()?;
    Ok(config)
}

impl ScenarioConfig {
    /// Checks the invariants serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if !(self.simulation.step_size > 0.0) {
            return invalid(format!(
                "simulation.step_size must be positive, got {}",
                self.simulation.step_size
            ));
        }
        if self.simulation.broadcast_every == 0 {
            return invalid("simulation.broadcast_every must be at least 1".to_string());
        }
        if !(self.control.max_force > 0.0) || !self.control.max_force.is_finite() {
            return invalid(format!(
                "control.max_force must be positive, got {}",
                self.control.max_force
            ));
        }

        let bus = &self.bus;
        if bus.command_channel == bus.state_channel
            || bus.state_channel == bus.heartbeat_channel
            || bus.command_channel == bus.heartbeat_channel
        {
            return invalid("bus channels must be distinct".to_string());
        }

        let mut seen = BTreeSet::new();
        for c in &self.scene.controllers {
            if !seen.insert(*c) {
                return invalid(format!("controller {c} listed twice"));
            }
        }

        let bodies: BTreeSet<_> = self.scene.bodies.iter().map(|b| b.id).collect();
        if bodies.len() != self.scene.bodies.len() {
            return invalid("scene.bodies contains duplicate ids".to_string());
        }
        for constraint in &self.scene.constraints {
            if !bodies.contains(&constraint.body) {
                return invalid(format!(
                    "constraint {} drags unknown body {}",
                    constraint.id, constraint.body
                ));
            }
        }

        if let Some(ws) = &self.safety.workspace {
            if ws.min.iter().zip(&ws.max).any(|(lo, hi)| lo > hi) {
                return invalid("safety.workspace min exceeds max".to_string());
            }
        }
        Ok(())
    }

    /// Renders the resolved configuration back to TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}
