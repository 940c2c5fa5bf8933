// tether_core/src/translate.rs

use crate::error::ControlError;
use crate::mapping::{ControlMapping, SceneEntities};
use crate::messages::{Actuation, Command, ControlEvent};
use crate::types::{BodyId, Category, EntityId, EntityRef, Pose};

/// Force ceiling applied to arm constraints unless configured otherwise.
pub const DEFAULT_FORCE_CEILING: f64 = 500.0;

/// Turns controller events and remote pose updates into adapter commands.
///
/// Holds no state besides the force ceiling; the same inputs always give the
/// same command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommandTranslator {
    force_ceiling: f64,
}

impl Default for CommandTranslator {
    fn default() -> Self {
        Self::new(DEFAULT_FORCE_CEILING)
    }
}

impl CommandTranslator {
    pub fn new(force_ceiling: f64) -> Self {
        Self {
            force_ceiling: force_ceiling.abs(),
        }
    }

    pub fn force_ceiling(&self) -> f64 {
        self.force_ceiling
    }

    /// Returns `None` when the event's controller has nothing mapped in the
    /// hinted category.
    pub fn translate(&self, event: &ControlEvent, mapping: &ControlMapping) -> Option<Command> {
        let entity = mapping.get(event.category, event.controller)?;
        let actuation = match event.category {
            Category::FreeBody => Actuation::Reposition,
            Category::Gripper => Actuation::Grip {
                closure: clamp_unit(event.aux),
            },
            Category::ArmConstraint => Actuation::Drive {
                max_force: self.clamp_force(event.aux),
            },
        };
        Some(Command {
            target: EntityRef::new(event.category, entity),
            pose: event.pose,
            actuation,
        })
    }

    /// Translates one entry of a remote pose update.
    ///
    /// A gripper cannot be teleported: the arm constraint of the controller
    /// holding that gripper is dragged instead, at the force ceiling. Any
    /// other body is repositioned.
    pub fn translate_remote(
        &self,
        body: BodyId,
        pose: Pose,
        mapping: &ControlMapping,
        entities: &SceneEntities,
    ) -> Result<Command, ControlError> {
        if !entities.is_gripper(body) {
            return Ok(Command {
                target: EntityRef::new(Category::FreeBody, body.into()),
                pose,
                actuation: Actuation::Reposition,
            });
        }

        let controller = mapping
            .invert()
            .get(&Category::Gripper)
            .and_then(|table| table.get(&EntityId::from(body)))
            .copied()
            .ok_or(ControlError::UnmappedController {
                controller: None,
                category: Category::Gripper,
            })?;
        let constraint = mapping
            .get(Category::ArmConstraint, controller)
            .ok_or(ControlError::UnmappedController {
                controller: Some(controller),
                category: Category::ArmConstraint,
            })?;

        Ok(Command {
            target: EntityRef::new(Category::ArmConstraint, constraint),
            pose,
            actuation: Actuation::Drive {
                max_force: self.force_ceiling,
            },
        })
    }

    /// Requests above the ceiling are clamped, never rejected. A non-positive
    /// request means "as hard as allowed".
    fn clamp_force(&self, requested: f64) -> f64 {
        if !requested.is_finite() || requested <= 0.0 {
            self.force_ceiling
        } else {
            requested.min(self.force_ceiling)
        }
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
