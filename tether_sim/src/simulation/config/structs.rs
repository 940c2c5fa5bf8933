// tether_sim/src/simulation/config/structs.rs

use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use tether_core::prelude::*;

use super::serde_helpers;

// =========================================================================
// == Top-Level Configuration ==
// =========================================================================

/// # ScenarioConfig
/// The root of the data parsed from a `scenario.toml` file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)] // Fail if the TOML has fields not in our struct
pub struct ScenarioConfig {
    #[serde(default)] // Use default if the [simulation] section is missing
    pub simulation: SimulationSection,

    #[serde(default)]
    pub control: ControlSection,

    #[serde(default)]
    pub bus: BusSection,

    #[serde(default)]
    pub scene: SceneSection,

    #[serde(default)]
    pub rig: RigSection,

    #[serde(default)]
    pub safety: SafetySection,

    #[serde(default)]
    pub task: Option<TaskSection>,
}

// =========================================================================
// == Configuration Sub-Structs ==
// These map directly to the sections in a scenario.toml file.
// =========================================================================

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SimulationSection {
    /// Optional seed for the virtual controllers. Random when absent.
    pub seed: Option<u64>,
    /// Duration of one simulation step in seconds.
    #[serde(default = "default_step_size")]
    pub step_size: f64,
    /// Stop after this many ticks. Runs until SHUTDOWN when absent.
    pub max_ticks: Option<u64>,
    /// Sleep out the remainder of each step so ticks follow the wall clock.
    #[serde(default)]
    pub real_time: bool,
    /// Publish a snapshot every N ticks.
    #[serde(default = "default_broadcast_every")]
    pub broadcast_every: u64,
}

fn default_step_size() -> f64 {
    0.004
}

fn default_broadcast_every() -> u64 {
    1
}

impl Default for SimulationSection {
    fn default() -> Self {
        Self {
            seed: None,
            step_size: default_step_size(),
            max_ticks: None,
            real_time: false,
            broadcast_every: default_broadcast_every(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ControlSection {
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub redundancy: RedundancyPolicy,
    /// Ceiling for arm constraint forces.
    #[serde(default = "default_max_force")]
    pub max_force: f64,
}

fn default_max_force() -> f64 {
    DEFAULT_FORCE_CEILING
}

impl Default for ControlSection {
    fn default() -> Self {
        Self {
            role: Role::default(),
            redundancy: RedundancyPolicy::default(),
            max_force: default_max_force(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct BusSection {
    /// Remote clients → authoritative node.
    pub command_channel: String,
    /// Authoritative node → every subscriber.
    pub state_channel: String,
    /// Observer nodes → upstream confirmation snapshots.
    pub heartbeat_channel: String,
}

impl Default for BusSection {
    fn default() -> Self {
        Self {
            command_channel: "client_channel".to_string(),
            state_channel: "server_channel".to_string(),
            heartbeat_channel: "client_heartbeat".to_string(),
        }
    }
}

/// Which channels a node reads and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleChannels {
    /// Always the command channel.
    pub inbound: String,
    /// Extra feed merged into the same inbox. Observers mirror the state
    /// channel here.
    pub mirror: Option<String>,
    pub outbound: String,
}

impl BusSection {
    /// Channel names for a node playing `role`.
    pub fn channels_for(&self, role: Role) -> RoleChannels {
        match role {
            Role::Authoritative => RoleChannels {
                inbound: self.command_channel.clone(),
                mirror: None,
                outbound: self.state_channel.clone(),
            },
            Role::Observer => RoleChannels {
                inbound: self.command_channel.clone(),
                mirror: Some(self.state_channel.clone()),
                outbound: self.heartbeat_channel.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SceneSection {
    /// Controller ids, in mapping order.
    #[serde(default)]
    pub controllers: Vec<ControllerId>,
    #[serde(default)]
    pub free_bodies: Vec<EntityId>,
    #[serde(default)]
    pub grippers: Vec<EntityId>,
    /// Arm constraint ids.
    #[serde(default)]
    pub arms: Vec<EntityId>,
    #[serde(default)]
    pub arm_links: Vec<BodyId>,
    // The TOML has `[[scene.bodies]]`, which becomes a Vec of BodyConfig structs.
    #[serde(default)]
    pub bodies: Vec<BodyConfig>,
    #[serde(default)]
    pub constraints: Vec<ConstraintConfig>,
}

impl SceneSection {
    pub fn entities(&self) -> SceneEntities {
        SceneEntities {
            free_bodies: self.free_bodies.clone(),
            grippers: self.grippers.clone(),
            arms: self.arms.clone(),
            arm_links: self.arm_links.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BodyConfig {
    pub id: BodyId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub pose: PoseConfig,
    #[serde(default = "default_mass")]
    pub mass: f64,
}

fn default_mass() -> f64 {
    1.0
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConstraintConfig {
    pub id: ConstraintId,
    /// The body this constraint drags around.
    pub body: BodyId,
}

// =========================================================================
// == Helper Structs for Nested Configuration ==
// =========================================================================

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq)]
pub struct PoseConfig {
    #[serde(with = "serde_helpers::vec3_from_array", default = "Vector3::zeros")]
    pub translation: Vector3<f64>,

    #[serde(with = "serde_helpers::quat_from_euler_deg", default = "UnitQuaternion::identity")]
    pub rotation: UnitQuaternion<f64>,
}

impl Default for PoseConfig {
    fn default() -> Self {
        Self {
            translation: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
        }
    }
}

impl PoseConfig {
    pub fn to_pose(&self) -> Pose {
        Pose::new(self.translation, self.rotation)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RigSection {
    /// Largest per-tick wander of a virtual controller, in metres.
    #[serde(default = "default_jitter")]
    pub jitter: f64,
    /// Ticks for one full squeeze-and-release of the trigger.
    #[serde(default = "default_trigger_period")]
    pub trigger_period: u64,
    /// Starting pose of each controller, matched by position.
    #[serde(default)]
    pub home: Vec<PoseConfig>,
}

fn default_jitter() -> f64 {
    0.002
}

fn default_trigger_period() -> u64 {
    250
}

impl Default for RigSection {
    fn default() -> Self {
        Self {
            jitter: default_jitter(),
            trigger_period: default_trigger_period(),
            home: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SafetySection {
    /// Largest allowed tilt from upright, in degrees. No tilt bound when absent.
    pub max_tilt_deg: Option<f64>,
    #[serde(default = "default_tilt_categories")]
    pub tilt_categories: Vec<Category>,
    pub workspace: Option<WorkspaceConfig>,
    #[serde(default)]
    pub warning: WarningStyle,
}

fn default_tilt_categories() -> Vec<Category> {
    vec![Category::ArmConstraint]
}

impl Default for SafetySection {
    fn default() -> Self {
        Self {
            max_tilt_deg: None,
            tilt_categories: default_tilt_categories(),
            workspace: None,
            warning: WarningStyle::default(),
        }
    }
}

impl SafetySection {
    pub fn monitor(&self) -> ViolationMonitor {
        let mut monitor = ViolationMonitor::new();
        if let Some(deg) = self.max_tilt_deg {
            monitor.push(Box::new(TiltBound::new(
                deg.to_radians(),
                self.tilt_categories.clone(),
            )));
        }
        if let Some(ws) = &self.workspace {
            monitor.push(Box::new(WorkspaceBound::new(
                Vector3::from(ws.min),
                Vector3::from(ws.max),
                ws.categories.clone(),
            )));
        }
        monitor
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WorkspaceConfig {
    pub min: [f64; 3],
    pub max: [f64; 3],
    #[serde(default = "all_categories")]
    pub categories: Vec<Category>,
}

fn all_categories() -> Vec<Category> {
    Category::ALL.to_vec()
}

/// How a notice looks on screen. `{entity}` in the message is replaced by
/// the offending entity id.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct WarningStyle {
    pub message: String,
    pub anchor: [f64; 3],
    pub color: [u8; 3],
    pub size: f64,
    pub duration: f64,
}

impl Default for WarningStyle {
    fn default() -> Self {
        Self {
            message: "Warning: you are flipping arm link {entity}. Positions reset".to_string(),
            anchor: [1.7, 0.0, 1.0],
            color: [255, 0, 0],
            size: 12.0,
            duration: 1.5,
        }
    }
}

impl WarningStyle {
    pub fn task_complete() -> Self {
        Self {
            message: "Good job! You completed one piece of task".to_string(),
            duration: 5.0,
            ..Self::default()
        }
    }

    pub fn render(&self, entity: impl std::fmt::Display) -> Warning {
        Warning {
            text: self.message.replace("{entity}", &entity.to_string()),
            anchor: Vector3::from(self.anchor),
            color: self.color,
            size: self.size,
            duration: self.duration,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Push,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TaskSection {
    pub kind: TaskKind,
    pub cube: BodyId,
    pub table: BodyId,
    /// Reset the scene once the checker reports the episode done.
    #[serde(default = "default_true")]
    pub reset_on_done: bool,
    #[serde(default = "WarningStyle::task_complete")]
    pub notice: WarningStyle,
}

fn default_true() -> bool {
    true
}

impl TaskSection {
    pub fn checker(&self) -> Box<dyn TaskChecker> {
        match self.kind {
            TaskKind::Push => Box::new(PushTaskChecker::new(self.cube, self.table)),
        }
    }
}
