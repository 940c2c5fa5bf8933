// tether_core/src/lib.rs

// This file defines the public modules of the library.
pub mod adapter;
pub mod error;
pub mod mapping;
pub mod messages;
pub mod prelude;
pub mod redundancy;
pub mod safety;
pub mod task;
pub mod translate;
pub mod types;
pub mod wire;
