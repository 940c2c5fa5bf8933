// tether_core/src/task.rs

use crate::messages::Snapshot;
use crate::types::BodyId;

/// Outcome of one task check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskStatus {
    /// The episode is over, successfully or not.
    pub done: bool,
    pub success: bool,
}

impl TaskStatus {
    pub const RUNNING: TaskStatus = TaskStatus {
        done: false,
        success: false,
    };
}

/// The single call an environment/task definition exposes to the loop.
pub trait TaskChecker: Send {
    fn name(&self) -> &str;

    /// Inspects the latest snapshot. Called on broadcast ticks only.
    fn check(&mut self, snapshot: &Snapshot) -> TaskStatus;
}

/// Push a cube off one side of the table into a landing zone.
#[derive(Debug, Clone, PartialEq)]
pub struct PushTaskChecker {
    pub cube: BodyId,
    pub table: BodyId,
}

impl PushTaskChecker {
    /// The cube flew off the table top.
    const JUMP_HEIGHT: f64 = 0.69;
    /// The cube is on the floor.
    const FLOOR_HEIGHT: f64 = 0.06;
    /// Half width of the landing zone along y, centred on the table.
    const ZONE_HALF_WIDTH: f64 = 0.275;
    /// Landing zone extent along x, measured from the table centre.
    const ZONE_NEAR: f64 = 0.25;
    const ZONE_FAR: f64 = 0.65;

    pub fn new(cube: BodyId, table: BodyId) -> Self {
        Self { cube, table }
    }
}

impl TaskChecker for PushTaskChecker {
    fn name(&self) -> &str {
        "push"
    }

    fn check(&mut self, snapshot: &Snapshot) -> TaskStatus {
        let (Some(cube), Some(table)) = (snapshot.get(self.cube), snapshot.get(self.table)) else {
            return TaskStatus::RUNNING;
        };
        let c = cube.position;
        let t = table.position;

        if c.z >= Self::JUMP_HEIGHT {
            return TaskStatus {
                done: true,
                success: false,
            };
        }
        if c.z > Self::FLOOR_HEIGHT {
            return TaskStatus::RUNNING;
        }

        let in_lane = (t.y - Self::ZONE_HALF_WIDTH..=t.y + Self::ZONE_HALF_WIDTH).contains(&c.y);
        let in_reach = (t.x + Self::ZONE_NEAR..=t.x + Self::ZONE_FAR).contains(&c.x);
        TaskStatus {
            done: true,
            success: in_lane && in_reach,
        }
    }
}
