// tether_sim/src/simulation/plugins/input/mod.rs

//! Event source strategies. The one a node runs decides its role.

pub mod observer;
pub mod virtual_rig;

pub use observer::ObserverSource;
pub use virtual_rig::VirtualControllerRig;
