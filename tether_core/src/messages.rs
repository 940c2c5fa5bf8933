// tether_core/src/messages.rs

use crate::types::{BodyId, Category, ControllerId, EntityRef, Pose};
use nalgebra::Vector3;
use std::collections::BTreeMap;

// =========================================================================
// == Controller Input ==
// =========================================================================

/// One raw reading from a tracked controller for a single tick.
#[derive(Clone, Debug, PartialEq)]
pub struct ControlEvent {
    pub controller: ControllerId,
    /// Which kind of entity this reading is meant to drive.
    pub category: Category,
    /// The controller pose in world coordinates.
    pub pose: Pose,
    /// Trigger amount for grippers, requested force for arm constraints.
    pub aux: f64,
}

impl ControlEvent {
    pub fn new(controller: ControllerId, category: Category, pose: Pose, aux: f64) -> Self {
        Self {
            controller,
            category,
            pose,
            aux,
        }
    }
}

// =========================================================================
// == Adapter Commands ==
// =========================================================================

/// How the adapter should realise a command.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Actuation {
    /// Teleport a body to the pose.
    Reposition,
    /// Set the gripper closure, `0.0` fully open and `1.0` fully closed.
    Grip { closure: f64 },
    /// Drag an arm constraint to the pose, never pulling harder than `max_force`.
    Drive { max_force: f64 },
}

/// A normalized instruction for the `SimulationAdapter`.
#[derive(Clone, Debug, PartialEq)]
pub struct Command {
    pub target: EntityRef,
    pub pose: Pose,
    pub actuation: Actuation,
}

// =========================================================================
// == Public API Messages (Channel Data) ==
// =========================================================================

/// The pose of every live body at one broadcast tick.
/// Always a full picture, never a delta against a previous snapshot.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    pub poses: BTreeMap<BodyId, Pose>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, body: BodyId, pose: Pose) {
        self.poses.insert(body, pose);
    }

    pub fn get(&self, body: BodyId) -> Option<&Pose> {
        self.poses.get(&body)
    }

    pub fn len(&self) -> usize {
        self.poses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }

    /// Folds `other` into `self`; entries from `other` win.
    pub fn merge(&mut self, other: Snapshot) {
        self.poses.extend(other.poses);
    }
}

impl FromIterator<(BodyId, Pose)> for Snapshot {
    fn from_iter<I: IntoIterator<Item = (BodyId, Pose)>>(iter: I) -> Self {
        Self {
            poses: iter.into_iter().collect(),
        }
    }
}

/// An out-of-band notice rendered by viewers as floating text.
#[derive(Clone, Debug, PartialEq)]
pub struct Warning {
    pub text: String,
    /// World-space anchor of the text.
    pub anchor: Vector3<f64>,
    pub color: [u8; 3],
    pub size: f64,
    /// Display time in seconds.
    pub duration: f64,
}

/// Everything that can travel on the command and state channels.
#[derive(Clone, Debug, PartialEq)]
pub enum Instruction {
    Shutdown,
    Reset,
    PoseUpdate(Snapshot),
    Warning(Warning),
}

impl Instruction {
    pub fn kind(&self) -> &'static str {
        match self {
            Instruction::Shutdown => "shutdown",
            Instruction::Reset => "reset",
            Instruction::PoseUpdate(_) => "pose_update",
            Instruction::Warning(_) => "warning",
        }
    }
}
