// tether_sim/src/simulation/core/mod.rs

pub mod app_state;
pub mod bus;
pub mod control_loop;
pub mod inbox;
pub mod prng;
