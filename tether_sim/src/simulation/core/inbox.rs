// tether_sim/src/simulation/core/inbox.rs

//! Hand-off between bus delivery tasks and the tick thread.
//!
//! The subscription handler only decodes and enqueues. Translation against the
//! mapping happens on the tick thread when the batch is drained.

use std::sync::{Arc, Mutex, PoisonError};
use tether_core::prelude::*;
use tether_core::wire;
use tracing::{debug, warn};

/// Everything that arrived since the previous drain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InboxBatch {
    pub shutdown: bool,
    pub reset: bool,
    /// Pose updates merged per body, later arrivals win.
    pub updates: Snapshot,
    pub warnings: Vec<Warning>,
    pub malformed: u64,
    /// Payloads accepted, malformed ones excluded.
    pub received: u64,
}

impl InboxBatch {
    pub fn is_empty(&self) -> bool {
        !self.shutdown
            && !self.reset
            && self.updates.is_empty()
            && self.warnings.is_empty()
            && self.malformed == 0
    }
}

#[derive(Debug, Clone, Default)]
pub struct CommandInbox {
    queue: Arc<Mutex<InboxBatch>>,
}

impl CommandInbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// A closure suitable for `MessageBus::subscribe`.
    pub fn handler(&self) -> impl FnMut(&[u8]) + Send + 'static {
        let inbox = self.clone();
        move |payload| inbox.accept(payload)
    }

    /// Decodes one payload and queues it. Anything that does not decode is
    /// logged and dropped.
    pub fn accept(&self, payload: &[u8]) {
        let decoded = wire::decode(payload);
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        match decoded {
            Ok(instruction) => {
                queue.received += 1;
                match instruction {
                    Instruction::Shutdown => queue.shutdown = true,
                    Instruction::Reset => {
                        // Poses aimed at the previous episode no longer apply.
                        queue.reset = true;
                        queue.updates = Snapshot::new();
                    }
                    Instruction::PoseUpdate(snapshot) => queue.updates.merge(snapshot),
                    Instruction::Warning(w) => queue.warnings.push(w),
                }
            }
            Err(e) => {
                queue.malformed += 1;
                warn!("Dropping malformed message ({} bytes): {}", payload.len(), e);
            }
        }
    }

    /// Takes the pending batch, leaving the inbox empty.
    pub fn drain(&self) -> InboxBatch {
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        let batch = std::mem::take(&mut *queue);
        if !batch.is_empty() {
            debug!(
                "Drained inbox: shutdown={} reset={} updates={} warnings={}",
                batch.shutdown,
                batch.reset,
                batch.updates.len(),
                batch.warnings.len()
            );
        }
        batch
    }
}
