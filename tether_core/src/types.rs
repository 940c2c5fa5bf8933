// tether_core/src/types.rs

use nalgebra::{Quaternion, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;

// --- Core Identifiers ---
// Plain integers on the wire. The adapter decides what they refer to.

/// A tracked hand controller. Only meaningful while the controller is tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ControllerId(pub u64);

/// A body known to the simulation backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BodyId(pub u64);

/// A constraint known to the simulation backend (arm constraints).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConstraintId(pub u64);

/// The id of a controllable entity. Bodies and constraints live in separate
/// namespaces on the backend, so the `Category` decides how to read it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub u64);

impl EntityId {
    pub fn body(self) -> BodyId {
        BodyId(self.0)
    }

    pub fn constraint(self) -> ConstraintId {
        ConstraintId(self.0)
    }
}

impl From<BodyId> for EntityId {
    fn from(id: BodyId) -> Self {
        Self(id.0)
    }
}

impl From<ConstraintId> for EntityId {
    fn from(id: ConstraintId) -> Self {
        Self(id.0)
    }
}

impl fmt::Display for ControllerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for BodyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ConstraintId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// --- Entity Categories ---

/// The three kinds of things a controller can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// A body that is teleported to the controller pose.
    FreeBody,
    /// A gripper body with an open/close amount.
    Gripper,
    /// A constraint dragging an arm towards a target pose with a force limit.
    ArmConstraint,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::FreeBody, Category::Gripper, Category::ArmConstraint];
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Category::FreeBody => "free_body",
            Category::Gripper => "gripper",
            Category::ArmConstraint => "arm_constraint",
        };
        f.write_str(name)
    }
}

/// A fully qualified entity: which category and which id inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityRef {
    pub category: Category,
    pub id: EntityId,
}

impl EntityRef {
    pub fn new(category: Category, id: EntityId) -> Self {
        Self { category, id }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.category, self.id)
    }
}

/// Which side of the link a node plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Reads local controller hardware, applies directly, broadcasts state.
    #[default]
    Authoritative,
    /// Reads only from the network, applies, and pushes a heartbeat upstream.
    Observer,
}

// --- Poses ---

/// A 6-DoF pose in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vector3<f64>,
    pub orientation: UnitQuaternion<f64>,
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

impl Pose {
    pub fn new(position: Vector3<f64>, orientation: UnitQuaternion<f64>) -> Self {
        Self {
            position,
            orientation,
        }
    }

    pub fn identity() -> Self {
        Self::new(Vector3::zeros(), UnitQuaternion::identity())
    }

    /// Builds a pose from a position triple and an `(x, y, z, w)` quaternion.
    /// Returns `None` for non-finite input or a quaternion that cannot be normalized.
    pub fn from_arrays(position: [f64; 3], orientation: [f64; 4]) -> Option<Self> {
        if position.iter().chain(orientation.iter()).any(|v| !v.is_finite()) {
            return None;
        }
        let [x, y, z, w] = orientation;
        let raw = Quaternion::new(w, x, y, z);
        if raw.norm() < 1e-9 {
            return None;
        }
        Some(Self::new(
            Vector3::from(position),
            UnitQuaternion::from_quaternion(raw),
        ))
    }

    /// The inverse of [`Pose::from_arrays`]; quaternion in `(x, y, z, w)` order.
    pub fn to_arrays(&self) -> ([f64; 3], [f64; 4]) {
        let p = self.position;
        let q = self.orientation.coords;
        ([p.x, p.y, p.z], [q.x, q.y, q.z, q.w])
    }
}
