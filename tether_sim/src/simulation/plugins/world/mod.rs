// tether_sim/src/simulation/plugins/world/mod.rs

pub mod kinematic;

pub use kinematic::KinematicWorld;
