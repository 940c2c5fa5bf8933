// tether_sim/src/simulation/plugins/mod.rs

pub mod input;
pub mod world;
