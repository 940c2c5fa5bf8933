// tether_core/src/adapter.rs

//! The two contracts the control layer consumes but does not implement:
//! the simulation backend and the controller hardware.

use crate::error::AdapterError;
use crate::messages::ControlEvent;
use crate::types::{BodyId, ConstraintId, ControllerId, Pose, Role};

// --- SIMULATION ADAPTER TRAIT ---
// The only path by which control code touches the physics backend.
/// Every call is fallible; callers log the error and keep going.
pub trait SimulationAdapter: Send {
    /// Attaches to the backend. Idempotent.
    fn connect(&mut self) -> Result<(), AdapterError>;

    /// Restores the initial scene and pauses real-time stepping.
    fn reset(&mut self) -> Result<(), AdapterError>;

    /// Ids of every live body, in ascending order.
    fn list_bodies(&self) -> Result<Vec<BodyId>, AdapterError>;

    fn get_pose(&self, body: BodyId) -> Result<Pose, AdapterError>;

    /// Teleports a body.
    fn set_pose(&mut self, body: BodyId, pose: &Pose) -> Result<(), AdapterError>;

    /// Moves a constraint target; the solver never pulls harder than `max_force`.
    fn move_constraint(
        &mut self,
        constraint: ConstraintId,
        pose: &Pose,
        max_force: f64,
    ) -> Result<(), AdapterError>;

    /// Sets a gripper's closure in `[0, 1]`.
    fn actuate_gripper(&mut self, gripper: BodyId, closure: f64) -> Result<(), AdapterError>;

    /// Advances the simulation by one configured step. Blocks for at most that long.
    fn step(&mut self) -> Result<(), AdapterError>;
}

// --- EVENT SOURCE TRAIT ---
/// Where a node's controller input comes from. The role it reports decides
/// which channels the control loop reads and writes.
pub trait EventSource: Send {
    fn role(&self) -> Role;

    /// Controllers currently tracked, in a stable order. Captured on reset.
    fn controllers(&self) -> Vec<ControllerId>;

    /// Everything that happened since the last poll. Never blocks; returns
    /// an empty list when nothing new arrived.
    fn poll(&mut self) -> Vec<ControlEvent>;
}
