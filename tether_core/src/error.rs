// tether_core/src/error.rs

use crate::types::{BodyId, Category, ConstraintId, ControllerId, EntityRef, Pose};
use thiserror::Error;

/// The simulation backend refused a call.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AdapterError {
    #[error("simulation backend is not connected")]
    NotConnected,
    #[error("unknown body {0}")]
    UnknownBody(BodyId),
    #[error("unknown constraint {0}")]
    UnknownConstraint(ConstraintId),
    #[error("body {0} is not a gripper")]
    NotAGripper(BodyId),
    #[error("simulation backend rejected the call: {0}")]
    Rejected(String),
}

/// A channel payload that is not a recognized instruction.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unrecognized instruction shape: {0}")]
    UnrecognizedShape(String),
    #[error("body key '{0}' is not an unsigned integer")]
    BadBodyKey(String),
    #[error("invalid pose for body {body}: {reason}")]
    BadPose { body: String, reason: String },
    #[error("invalid warning payload: {0}")]
    BadWarning(String),
}

/// A command was refused because its resulting pose crosses a safety bound.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("illegal operation on {target}: {bound} bound crossed")]
pub struct IllegalOperation {
    pub target: EntityRef,
    /// Name of the bound that fired.
    pub bound: String,
    /// The pose that would have been applied.
    pub pose: Pose,
}

/// Everything that can go wrong while turning input into adapter calls.
/// None of these stop the control loop.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error(transparent)]
    Adapter(#[from] AdapterError),
    #[error("malformed message: {0}")]
    MalformedMessage(#[from] WireError),
    #[error(transparent)]
    IllegalOperation(#[from] IllegalOperation),
    #[error("controller {controller:?} has no {category} mapped")]
    UnmappedController {
        controller: Option<ControllerId>,
        category: Category,
    },
}
