// tether_sim/src/simulation/plugins/input/observer.rs

use tether_core::prelude::*;

/// A node with no controllers of its own. It mirrors the authoritative
/// world and pushes its view back upstream.
#[derive(Debug, Clone, Default)]
pub struct ObserverSource {
    controllers: Vec<ControllerId>,
}

impl ObserverSource {
    /// `controllers` only shapes the mapping used to place remote grippers.
    pub fn new(controllers: Vec<ControllerId>) -> Self {
        Self { controllers }
    }
}

impl EventSource for ObserverSource {
    fn role(&self) -> Role {
        Role::Observer
    }

    fn controllers(&self) -> Vec<ControllerId> {
        self.controllers.clone()
    }

    fn poll(&mut self) -> Vec<ControlEvent> {
        Vec::new()
    }
}
