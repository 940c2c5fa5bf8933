// tether_core/src/wire.rs

//! The JSON framing used on the command and state channels.
//!
//! ```text
//! 0                                         SHUTDOWN
//! 1                                         RESET
//! {"5": [[x, y, z], [qx, qy, qz, qw]], ...} ENTITY_POSE_UPDATE / snapshot
//! ["warning", [text, [x, y, z], [r, g, b], size, duration]]
//! ```
//!
//! Decoding is strict: any other shape is rejected, never guessed at.

use crate::error::WireError;
use crate::messages::{Instruction, Snapshot, Warning};
use crate::types::{BodyId, Pose};
use nalgebra::Vector3;
use serde_json::{json, Map, Value};

pub const SHUTDOWN_SENTINEL: u64 = 0;
pub const RESET_SENTINEL: u64 = 1;
pub const WARNING_TAG: &str = "warning";

/// Serializes an instruction into its channel payload.
pub fn encode(instruction: &Instruction) -> Vec<u8> {
    let value = match instruction {
        Instruction::Shutdown => json!(SHUTDOWN_SENTINEL),
        Instruction::Reset => json!(RESET_SENTINEL),
        Instruction::PoseUpdate(snapshot) => encode_snapshot(snapshot),
        Instruction::Warning(warning) => json!([
            WARNING_TAG,
            [
                warning.text,
                [warning.anchor.x, warning.anchor.y, warning.anchor.z],
                warning.color,
                warning.size,
                warning.duration
            ]
        ]),
    };
    value.to_string().into_bytes()
}

/// Parses a channel payload, rejecting anything that is not an instruction.
pub fn decode(payload: &[u8]) -> Result<Instruction, WireError> {
    let value: Value = serde_json::from_slice(payload)?;
    match &value {
        Value::Number(n) => match n.as_u64() {
            Some(SHUTDOWN_SENTINEL) => Ok(Instruction::Shutdown),
            Some(RESET_SENTINEL) => Ok(Instruction::Reset),
            _ => Err(WireError::UnrecognizedShape(format!("sentinel {n}"))),
        },
        Value::Object(map) => decode_snapshot(map).map(Instruction::PoseUpdate),
        Value::Array(items) => match items.as_slice() {
            [Value::String(tag), Value::Array(fields)] if tag == WARNING_TAG => {
                decode_warning(fields).map(Instruction::Warning)
            }
            _ => Err(WireError::UnrecognizedShape("array".to_string())),
        },
        other => Err(WireError::UnrecognizedShape(shape_name(other).to_string())),
    }
}

fn encode_snapshot(snapshot: &Snapshot) -> Value {
    let map: Map<String, Value> = snapshot
        .poses
        .iter()
        .map(|(body, pose)| {
            let (p, q) = pose.to_arrays();
            (body.0.to_string(), json!([p, q]))
        })
        .collect();
    Value::Object(map)
}

fn decode_snapshot(map: &Map<String, Value>) -> Result<Snapshot, WireError> {
    let mut snapshot = Snapshot::new();
    for (key, value) in map {
        let body = key
            .parse::<u64>()
            .map(BodyId)
            .map_err(|_| WireError::BadBodyKey(key.clone()))?;
        let bad = |reason: &str| WireError::BadPose {
            body: key.clone(),
            reason: reason.to_string(),
        };
        let (position, orientation) = match value.as_array().map(Vec::as_slice) {
            Some([p, q]) => (
                numbers::<3>(p).ok_or_else(|| bad("position must be 3 numbers"))?,
                numbers::<4>(q).ok_or_else(|| bad("orientation must be 4 numbers"))?,
            ),
            _ => return Err(bad("expected [position, orientation]")),
        };
        let pose = Pose::from_arrays(position, orientation)
            .ok_or_else(|| bad("degenerate orientation"))?;
        snapshot.insert(body, pose);
    }
    Ok(snapshot)
}

fn decode_warning(fields: &[Value]) -> Result<Warning, WireError> {
    let [text, anchor, color, size, duration] = fields else {
        return Err(WireError::BadWarning(format!(
            "expected 5 fields, got {}",
            fields.len()
        )));
    };
    let text = text
        .as_str()
        .ok_or_else(|| WireError::BadWarning("text must be a string".to_string()))?;
    let anchor = numbers::<3>(anchor)
        .ok_or_else(|| WireError::BadWarning("anchor must be 3 numbers".to_string()))?;
    let color = color
        .as_array()
        .filter(|c| c.len() == 3)
        .and_then(|c| {
            let channels: Option<Vec<u8>> = c
                .iter()
                .map(|v| v.as_u64().and_then(|x| u8::try_from(x).ok()))
                .collect();
            channels.map(|ch| [ch[0], ch[1], ch[2]])
        })
        .ok_or_else(|| WireError::BadWarning("color must be 3 bytes".to_string()))?;
    let size = size
        .as_f64()
        .ok_or_else(|| WireError::BadWarning("size must be a number".to_string()))?;
    let duration = duration
        .as_f64()
        .ok_or_else(|| WireError::BadWarning("duration must be a number".to_string()))?;

    Ok(Warning {
        text: text.to_string(),
        anchor: Vector3::from(anchor),
        color,
        size,
        duration,
    })
}

fn numbers<const N: usize>(value: &Value) -> Option<[f64; N]> {
    let items = value.as_array()?;
    if items.len() != N {
        return None;
    }
    let mut out = [0.0; N];
    for (slot, item) in out.iter_mut().zip(items) {
        *slot = item.as_f64()?;
    }
    Some(out)
}

fn shape_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
