// tether_sim/src/simulation/plugins/world/kinematic.rs

//! A headless stand-in for a physics backend.
//!
//! Bodies only move when teleported or dragged by a constraint. A constraint
//! pulls its body toward the target pose, covering at most the distance its
//! force limit allows in one step. No gravity, no contacts.

use std::collections::BTreeMap;
use tether_core::prelude::*;
use tracing::{debug, info};

use crate::simulation::config::SceneSection;

#[derive(Debug, Clone)]
struct BodyState {
    name: String,
    pose: Pose,
    initial: Pose,
    mass: f64,
}

#[derive(Debug, Clone, Copy)]
struct ConstraintState {
    body: BodyId,
    target: Option<(Pose, f64)>,
}

#[derive(Debug, Clone)]
pub struct KinematicWorld {
    step_size: f64,
    connected: bool,
    steps: u64,
    bodies: BTreeMap<BodyId, BodyState>,
    constraints: BTreeMap<ConstraintId, ConstraintState>,
    /// Closure of every gripper body, `0.0` is open.
    grippers: BTreeMap<BodyId, f64>,
}

impl KinematicWorld {
    pub fn new(step_size: f64) -> Self {
        Self {
            step_size,
            connected: false,
            steps: 0,
            bodies: BTreeMap::new(),
            constraints: BTreeMap::new(),
            grippers: BTreeMap::new(),
        }
    }

    /// Builds the world described by the `[scene]` section.
    pub fn from_scene(scene: &SceneSection, step_size: f64) -> Self {
        let mut world = Self::new(step_size);
        for body in &scene.bodies {
            world.add_body(body.id, &body.name, body.pose.to_pose(), body.mass);
        }
        for constraint in &scene.constraints {
            world.add_constraint(constraint.id, constraint.body);
        }
        for gripper in &scene.grippers {
            world.grippers.insert(gripper.body(), 0.0);
        }
        world
    }

    pub fn add_body(&mut self, id: BodyId, name: &str, pose: Pose, mass: f64) {
        self.bodies.insert(
            id,
            BodyState {
                name: name.to_string(),
                pose,
                initial: pose,
                mass: mass.max(f64::EPSILON),
            },
        );
    }

    pub fn add_constraint(&mut self, id: ConstraintId, body: BodyId) {
        self.constraints.insert(id, ConstraintState { body, target: None });
    }

    pub fn add_gripper(&mut self, body: BodyId) {
        self.grippers.insert(body, 0.0);
    }

    pub fn closure(&self, gripper: BodyId) -> Option<f64> {
        self.grippers.get(&gripper).copied()
    }

    pub fn body_name(&self, body: BodyId) -> Option<&str> {
        self.bodies.get(&body).map(|b| b.name.as_str())
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    fn ensure_connected(&self) -> Result<(), AdapterError> {
        if self.connected {
            Ok(())
        } else {
            Err(AdapterError::NotConnected)
        }
    }

    /// Moves `pose` toward `target`, by no more than `max_force` allows this step.
    fn pull(pose: &Pose, target: &Pose, max_force: f64, mass: f64, dt: f64) -> Pose {
        let delta = target.position - pose.position;
        let distance = delta.norm();
        let reach = max_force / mass * dt * dt;
        if distance <= reach || distance < 1e-12 {
            return *target;
        }
        let fraction = reach / distance;
        let orientation = pose
            .orientation
            .try_slerp(&target.orientation, fraction, 1e-9)
            .unwrap_or(target.orientation);
        Pose::new(pose.position + delta * fraction, orientation)
    }
}

impl SimulationAdapter for KinematicWorld {
    fn connect(&mut self) -> Result<(), AdapterError> {
        if !self.connected {
            info!(
                "Kinematic world connected: {} bodies, {} constraints.",
                self.bodies.len(),
                self.constraints.len()
            );
        }
        self.connected = true;
        Ok(())
    }

    fn reset(&mut self) -> Result<(), AdapterError> {
        self.ensure_connected()?;
        for body in self.bodies.values_mut() {
            body.pose = body.initial;
        }
        for constraint in self.constraints.values_mut() {
            constraint.target = None;
        }
        for closure in self.grippers.values_mut() {
            *closure = 0.0;
        }
        self.steps = 0;
        debug!("Kinematic world reset.");
        Ok(())
    }

    fn list_bodies(&self) -> Result<Vec<BodyId>, AdapterError> {
        self.ensure_connected()?;
        Ok(self.bodies.keys().copied().collect())
    }

    fn get_pose(&self, body: BodyId) -> Result<Pose, AdapterError> {
        self.ensure_connected()?;
        self.bodies
            .get(&body)
            .map(|b| b.pose)
            .ok_or(AdapterError::UnknownBody(body))
    }

    fn set_pose(&mut self, body: BodyId, pose: &Pose) -> Result<(), AdapterError> {
        self.ensure_connected()?;
        let state = self
            .bodies
            .get_mut(&body)
            .ok_or(AdapterError::UnknownBody(body))?;
        state.pose = *pose;
        Ok(())
    }

    fn move_constraint(
        &mut self,
        constraint: ConstraintId,
        pose: &Pose,
        max_force: f64,
    ) -> Result<(), AdapterError> {
        self.ensure_connected()?;
        if !(max_force >= 0.0) {
            return Err(AdapterError::Rejected(format!(
                "max_force must be non-negative, got {max_force}"
            )));
        }
        let state = self
            .constraints
            .get_mut(&constraint)
            .ok_or(AdapterError::UnknownConstraint(constraint))?;
        state.target = Some((*pose, max_force));
        Ok(())
    }

    fn actuate_gripper(&mut self, gripper: BodyId, closure: f64) -> Result<(), AdapterError> {
        self.ensure_connected()?;
        if !self.bodies.contains_key(&gripper) {
            return Err(AdapterError::UnknownBody(gripper));
        }
        let slot = self
            .grippers
            .get_mut(&gripper)
            .ok_or(AdapterError::NotAGripper(gripper))?;
        *slot = closure.clamp(0.0, 1.0);
        Ok(())
    }

    fn step(&mut self) -> Result<(), AdapterError> {
        self.ensure_connected()?;
        let dt = self.step_size;
        for constraint in self.constraints.values() {
            let Some((target, max_force)) = constraint.target else {
                continue;
            };
            if let Some(body) = self.bodies.get_mut(&constraint.body) {
                body.pose = Self::pull(&body.pose, &target, max_force, body.mass, dt);
            }
        }
        self.steps += 1;
        Ok(())
    }
}
