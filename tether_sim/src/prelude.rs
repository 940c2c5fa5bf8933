// tether_sim/src/prelude.rs

// Re-export the entire tether_core prelude so you can easily access
// pure types like `ControlMapping`, `Pose`, `Command`, etc.
pub use tether_core::prelude::*;

// Re-export common simulation-specific types for easy access.
pub use crate::simulation::config::{load, ConfigError, ScenarioConfig, WarningStyle};
pub use crate::simulation::core::app_state::ControlState;
pub use crate::simulation::core::bus::{BusError, MessageBus, Subscription};
pub use crate::simulation::core::control_loop::{ControlLoop, LoopError, LoopReport, LoopSettings};
pub use crate::simulation::core::inbox::{CommandInbox, InboxBatch};
pub use crate::simulation::core::prng::SimulationRng;

pub use crate::simulation::plugins::input::{ObserverSource, VirtualControllerRig};
pub use crate::simulation::plugins::world::KinematicWorld;
