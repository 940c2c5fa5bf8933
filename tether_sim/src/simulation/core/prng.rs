// tether_sim/src/simulation/core/prng.rs

use rand::rngs::OsRng;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{info, warn};

/// A newtype wrapper around `ChaCha8Rng`.
/// This is the central, deterministic pseudo-random number generator for the simulation.
#[derive(Debug, Clone)]
pub struct SimulationRng(pub ChaCha8Rng);

impl SimulationRng {
    /// Seeds from the scenario when given, otherwise from the OS.
    /// The chosen seed is always logged so a run can be replayed.
    pub fn from_seed(seed: Option<u64>) -> Self {
        let seed = seed.unwrap_or_else(|| {
            let mut bytes = [0u8; 8];
            match OsRng.try_fill_bytes(&mut bytes) {
                Ok(()) => u64::from_le_bytes(bytes),
                Err(e) => {
                    warn!("OS entropy unavailable ({}), falling back to seed 0.", e);
                    0
                }
            }
        });
        info!("Simulation RNG seed: {}", seed);
        Self(ChaCha8Rng::seed_from_u64(seed))
    }
}
