// tether_core/src/prelude.rs

// --- Core Abstractions (The main contracts of the library) ---
pub use crate::adapter::{EventSource, SimulationAdapter};
pub use crate::safety::SafetyBound;
pub use crate::task::TaskChecker;

// --- Core Data Structures (The "nouns" of the library) ---
pub use crate::mapping::{ControlMapping, InvertedMapping, SceneEntities};
pub use crate::messages::{Actuation, Command, ControlEvent, Instruction, Snapshot, Warning};
pub use crate::types::{BodyId, Category, ConstraintId, ControllerId, EntityId, EntityRef, Pose, Role};

// --- Errors ---
pub use crate::error::{AdapterError, ControlError, IllegalOperation, WireError};

// --- Control Pipeline ---
pub use crate::redundancy::{Filtered, RedundancyFilter, RedundancyPolicy};
pub use crate::safety::{TiltBound, ViolationMonitor, WorkspaceBound};
pub use crate::task::{PushTaskChecker, TaskStatus};
pub use crate::translate::{CommandTranslator, DEFAULT_FORCE_CEILING};
