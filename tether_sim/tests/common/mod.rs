// tether_sim/tests/common/mod.rs

#![allow(dead_code)]

use nalgebra::{UnitQuaternion, Vector3};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::f64::consts::PI;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tether_core::wire;
use tether_sim::prelude::*;

pub const WAIT: Duration = Duration::from_secs(5);
pub const COMMANDS: &str = "client_channel";
pub const STATE: &str = "server_channel";
pub const HEARTBEAT: &str = "client_heartbeat";

// --- Poses ---

pub fn at(x: f64, y: f64, z: f64) -> Pose {
    Pose::new(Vector3::new(x, y, z), UnitQuaternion::identity())
}

/// Upside down: rolled half a turn about x.
pub fn flipped(x: f64, y: f64, z: f64) -> Pose {
    Pose::new(
        Vector3::new(x, y, z),
        UnitQuaternion::from_euler_angles(PI, 0.0, 0.0),
    )
}

// --- Recording adapter ---

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Connect,
    Reset,
    SetPose(BodyId, Pose),
    MoveConstraint(ConstraintId, Pose, f64),
    Grip(BodyId, f64),
    Step,
}

impl Call {
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            Call::SetPose(..) | Call::MoveConstraint(..) | Call::Grip(..)
        )
    }
}

/// Records every call, successful or not.
#[derive(Debug, Default)]
pub struct RecordingAdapter {
    pub initial: BTreeMap<BodyId, Pose>,
    pub bodies: BTreeMap<BodyId, Pose>,
    pub constraints: BTreeSet<ConstraintId>,
    pub calls: Vec<Call>,
    /// Every write fails with `Rejected` while set.
    pub fail_writes: bool,
    /// `list_bodies` fails while set.
    pub fail_listing: bool,
}

impl RecordingAdapter {
    pub fn with_bodies(ids: &[u64]) -> Self {
        let bodies: BTreeMap<_, _> = ids.iter().map(|&id| (BodyId(id), at(0.0, 0.0, 1.0))).collect();
        Self {
            initial: bodies.clone(),
            bodies,
            ..Self::default()
        }
    }

    pub fn with_constraints(mut self, ids: &[u64]) -> Self {
        self.constraints = ids.iter().map(|&id| ConstraintId(id)).collect();
        self
    }

    pub fn writes(&self) -> Vec<Call> {
        self.calls.iter().filter(|c| c.is_write()).cloned().collect()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }

    fn check_write(&self) -> Result<(), AdapterError> {
        if self.fail_writes {
            Err(AdapterError::Rejected("scripted failure".to_string()))
        } else {
            Ok(())
        }
    }
}

impl SimulationAdapter for RecordingAdapter {
    fn connect(&mut self) -> Result<(), AdapterError> {
        self.calls.push(Call::Connect);
        Ok(())
    }

    fn reset(&mut self) -> Result<(), AdapterError> {
        self.calls.push(Call::Reset);
        self.bodies = self.initial.clone();
        Ok(())
    }

    fn list_bodies(&self) -> Result<Vec<BodyId>, AdapterError> {
        if self.fail_listing {
            return Err(AdapterError::Rejected("scripted listing failure".to_string()));
        }
        Ok(self.bodies.keys().copied().collect())
    }

    fn get_pose(&self, body: BodyId) -> Result<Pose, AdapterError> {
        self.bodies
            .get(&body)
            .copied()
            .ok_or(AdapterError::UnknownBody(body))
    }

    fn set_pose(&mut self, body: BodyId, pose: &Pose) -> Result<(), AdapterError> {
        self.calls.push(Call::SetPose(body, *pose));
        self.check_write()?;
        let slot = self
            .bodies
            .get_mut(&body)
            .ok_or(AdapterError::UnknownBody(body))?;
        *slot = *pose;
        Ok(())
    }

    fn move_constraint(
        &mut self,
        constraint: ConstraintId,
        pose: &Pose,
        max_force: f64,
    ) -> Result<(), AdapterError> {
        self.calls
            .push(Call::MoveConstraint(constraint, *pose, max_force));
        self.check_write()?;
        if !self.constraints.contains(&constraint) {
            return Err(AdapterError::UnknownConstraint(constraint));
        }
        Ok(())
    }

    fn actuate_gripper(&mut self, gripper: BodyId, closure: f64) -> Result<(), AdapterError> {
        self.calls.push(Call::Grip(gripper, closure));
        self.check_write()
    }

    fn step(&mut self) -> Result<(), AdapterError> {
        self.calls.push(Call::Step);
        Ok(())
    }
}

// --- Scripted event source ---

#[derive(Debug, Clone, Default)]
pub struct ScriptedSource {
    pub role: Role,
    pub controllers: Vec<ControllerId>,
    /// One entry per poll; empty once exhausted.
    pub script: VecDeque<Vec<ControlEvent>>,
}

impl ScriptedSource {
    pub fn new(role: Role, controllers: &[u64]) -> Self {
        Self {
            role,
            controllers: controllers.iter().map(|&c| ControllerId(c)).collect(),
            script: VecDeque::new(),
        }
    }

    pub fn then(mut self, events: Vec<ControlEvent>) -> Self {
        self.script.push_back(events);
        self
    }
}

impl EventSource for ScriptedSource {
    fn role(&self) -> Role {
        self.role
    }

    fn controllers(&self) -> Vec<ControllerId> {
        self.controllers.clone()
    }

    fn poll(&mut self) -> Vec<ControlEvent> {
        self.script.pop_front().unwrap_or_default()
    }
}

pub fn event(controller: u64, category: Category, pose: Pose, aux: f64) -> ControlEvent {
    ControlEvent::new(ControllerId(controller), category, pose, aux)
}

// --- Scene & loop helpers ---

pub fn new_bus() -> MessageBus {
    MessageBus::new().expect("bus runtime should start")
}

/// One gripper (body 10) on one arm constraint (1), one audited arm link (11).
pub fn scene() -> SceneEntities {
    SceneEntities {
        free_bodies: Vec::new(),
        grippers: vec![EntityId(10)],
        arms: vec![EntityId(1)],
        arm_links: vec![BodyId(11)],
    }
}

pub fn adapter() -> RecordingAdapter {
    RecordingAdapter::with_bodies(&[5, 10, 11]).with_constraints(&[1])
}

pub fn settings() -> LoopSettings {
    LoopSettings {
        entities: scene(),
        redundancy: RedundancyPolicy::Off,
        ..LoopSettings::default()
    }
}

pub fn tilt_guard() -> ViolationMonitor {
    ViolationMonitor::new().with_bound(TiltBound::new(
        std::f64::consts::FRAC_PI_2,
        vec![Category::ArmConstraint],
    ))
}

/// A loop that is already initialized and listening.
pub fn running<S: EventSource>(
    adapter: RecordingAdapter,
    source: S,
    bus: &MessageBus,
    settings: LoopSettings,
) -> ControlLoop<RecordingAdapter, S> {
    let mut control = ControlLoop::new(adapter, source, bus.clone(), settings);
    control.initialize().unwrap();
    control.start().unwrap();
    control
}

/// Decodes everything published on `channel` from now on.
pub fn collect(bus: &MessageBus, channel: &str) -> (Subscription, Arc<Mutex<Vec<Instruction>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let sub = bus.subscribe(channel, move |payload| {
        sink.lock().unwrap().push(wire::decode(payload).unwrap());
    });
    (sub, seen)
}

pub fn warnings(seen: &Arc<Mutex<Vec<Instruction>>>) -> Vec<Warning> {
    seen.lock()
        .unwrap()
        .iter()
        .filter_map(|i| match i {
            Instruction::Warning(w) => Some(w.clone()),
            _ => None,
        })
        .collect()
}
