// tether_sim/src/lib.rs

//! The runtime half of Tether: the message bus, the control loop that owns
//! simulation truth, and the pieces a node is assembled from.

// This prelude is for convenience for other files WITHIN the tether_sim crate.
pub mod prelude;

// This module contains all the simulation-specific logic.
pub mod cli;
pub mod simulation;
