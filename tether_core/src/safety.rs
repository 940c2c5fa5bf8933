// tether_core/src/safety.rs

use crate::error::IllegalOperation;
use crate::messages::Command;
use crate::types::{Category, EntityRef, Pose};
use dyn_clone::DynClone;
use nalgebra::Vector3;
use std::fmt::Debug;

// --- SAFETY BOUND TRAIT ---
// A region of pose space that commanded entities must not leave.
pub trait SafetyBound: DynClone + Debug + Send + Sync {
    /// Short name used in logs and in `IllegalOperation::bound`.
    fn name(&self) -> &str;

    /// Whether this bound applies to entities of `category`.
    fn covers(&self, category: Category) -> bool;

    /// Returns `true` when `pose` lies outside the allowed region.
    fn breached(&self, pose: &Pose) -> bool;
}

// This macro automatically generates the implementation of `Clone` for `Box<dyn SafetyBound>`.
dyn_clone::clone_trait_object!(SafetyBound);

/// Fires when a body's local up axis tilts further than `max_tilt` radians
/// from world up. A flipped arm link is the typical offender.
#[derive(Debug, Clone, PartialEq)]
pub struct TiltBound {
    pub max_tilt: f64,
    pub categories: Vec<Category>,
}

impl TiltBound {
    pub fn new(max_tilt: f64, categories: Vec<Category>) -> Self {
        Self {
            max_tilt,
            categories,
        }
    }

    /// Angle between the pose's up axis and world up, in radians.
    pub fn tilt(pose: &Pose) -> f64 {
        let up = pose.orientation * Vector3::z();
        up.angle(&Vector3::z())
    }
}

impl SafetyBound for TiltBound {
    fn name(&self) -> &str {
        "tilt"
    }

    fn covers(&self, category: Category) -> bool {
        self.categories.contains(&category)
    }

    fn breached(&self, pose: &Pose) -> bool {
        Self::tilt(pose) > self.max_tilt
    }
}

/// Fires when a position leaves an axis-aligned box.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkspaceBound {
    pub min: Vector3<f64>,
    pub max: Vector3<f64>,
    pub categories: Vec<Category>,
}

impl WorkspaceBound {
    pub fn new(min: Vector3<f64>, max: Vector3<f64>, categories: Vec<Category>) -> Self {
        Self {
            min,
            max,
            categories,
        }
    }
}

impl SafetyBound for WorkspaceBound {
    fn name(&self) -> &str {
        "workspace"
    }

    fn covers(&self, category: Category) -> bool {
        self.categories.contains(&category)
    }

    fn breached(&self, pose: &Pose) -> bool {
        let p = pose.position;
        (0..3).any(|i| p[i] < self.min[i] || p[i] > self.max[i])
    }
}

/// Checks commands and audited poses against a set of bounds.
/// Only reports; what happens next is up to the caller.
#[derive(Debug, Clone, Default)]
pub struct ViolationMonitor {
    bounds: Vec<Box<dyn SafetyBound>>,
}

impl ViolationMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bound(mut self, bound: impl SafetyBound + 'static) -> Self {
        self.bounds.push(Box::new(bound));
        self
    }

    pub fn push(&mut self, bound: Box<dyn SafetyBound>) {
        self.bounds.push(bound);
    }

    pub fn len(&self) -> usize {
        self.bounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bounds.is_empty()
    }

    /// Checks the pose a command would produce.
    pub fn check(&self, command: &Command) -> Result<(), IllegalOperation> {
        self.check_pose(command.target, &command.pose)
    }

    /// Checks an arbitrary pose for `target`; the first breached bound wins.
    pub fn check_pose(&self, target: EntityRef, pose: &Pose) -> Result<(), IllegalOperation> {
        match self
            .bounds
            .iter()
            .find(|b| b.covers(target.category) && b.breached(pose))
        {
            Some(bound) => Err(IllegalOperation {
                target,
                bound: bound.name().to_string(),
                pose: *pose,
            }),
            None => Ok(()),
        }
    }
}
