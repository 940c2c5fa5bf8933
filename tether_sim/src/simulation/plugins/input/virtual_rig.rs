// tether_sim/src/simulation/plugins/input/virtual_rig.rs

use nalgebra::Vector3;
use rand_distr::{Distribution, Normal};
use tether_core::prelude::*;
use tracing::warn;

use crate::simulation::config::ScenarioConfig;
use crate::simulation::core::prng::SimulationRng;

/// How far a virtual hand may drift from its home position, in metres.
const TETHER_RADIUS: f64 = 0.25;

/// Synthetic tracked hardware. Every poll, each controller drifts around its
/// home pose and squeezes its trigger on a slow cycle, producing one arm
/// event and one gripper event. The stream is fully determined by the seed.
pub struct VirtualControllerRig {
    controllers: Vec<ControllerId>,
    homes: Vec<Pose>,
    offsets: Vec<Vector3<f64>>,
    rng: SimulationRng,
    drift: Option<Normal<f64>>,
    trigger_period: u64,
    polls: u64,
}

impl VirtualControllerRig {
    pub fn new(
        controllers: Vec<ControllerId>,
        homes: Vec<Pose>,
        seed: Option<u64>,
        jitter: f64,
        trigger_period: u64,
    ) -> Self {
        let drift = Normal::new(0.0, jitter).ok();
        if drift.is_none() {
            warn!("Invalid rig jitter {}, controllers will hold still.", jitter);
        }
        let homes = (0..controllers.len())
            .map(|i| homes.get(i).copied().unwrap_or_else(Pose::identity))
            .collect();
        Self {
            offsets: vec![Vector3::zeros(); controllers.len()],
            controllers,
            homes,
            rng: SimulationRng::from_seed(seed),
            drift,
            trigger_period: trigger_period.max(2),
            polls: 0,
        }
    }

    pub fn from_config(config: &ScenarioConfig) -> Self {
        Self::new(
            config.scene.controllers.clone(),
            config.rig.home.iter().map(|h| h.to_pose()).collect(),
            config.simulation.seed,
            config.rig.jitter,
            config.rig.trigger_period,
        )
    }

    /// Trigger travel in `[0, 1]` as a triangle wave, phase-shifted per controller.
    fn trigger(&self, index: usize) -> f64 {
        let period = self.trigger_period;
        let phase = (self.polls + index as u64 * period / 2) % period;
        let half = period as f64 / 2.0;
        let t = phase as f64;
        if t <= half {
            t / half
        } else {
            (period as f64 - t) / half
        }
    }
}

impl EventSource for VirtualControllerRig {
    fn role(&self) -> Role {
        Role::Authoritative
    }

    fn controllers(&self) -> Vec<ControllerId> {
        self.controllers.clone()
    }

    fn poll(&mut self) -> Vec<ControlEvent> {
        self.polls += 1;
        let mut events = Vec::with_capacity(self.controllers.len() * 2);

        for index in 0..self.controllers.len() {
            if let Some(drift) = &self.drift {
                let step = Vector3::new(
                    drift.sample(&mut self.rng.0),
                    drift.sample(&mut self.rng.0),
                    drift.sample(&mut self.rng.0),
                );
                let offset = self.offsets[index] + step;
                self.offsets[index] = if offset.norm() > TETHER_RADIUS {
                    offset.normalize() * TETHER_RADIUS
                } else {
                    offset
                };
            }

            let home = self.homes[index];
            let pose = Pose::new(home.position + self.offsets[index], home.orientation);
            let controller = self.controllers[index];
            events.push(ControlEvent::new(controller, Category::ArmConstraint, pose, 0.0));
            events.push(ControlEvent::new(
                controller,
                Category::Gripper,
                pose,
                self.trigger(index),
            ));
        }
        events
    }
}
