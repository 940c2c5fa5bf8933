// tether_core/src/redundancy.rs

use crate::mapping::{ControlMapping, SceneEntities};
use crate::messages::ControlEvent;
use crate::types::{Category, ControllerId, EntityId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// How a primary controller gets designated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode", content = "controller")]
pub enum RedundancyPolicy {
    /// No primary: every event passes, the adapter sees the last write.
    Off,
    /// A fixed primary controller.
    Primary(ControllerId),
    /// The first controller becomes primary when the scene has fewer
    /// entities than controllers (one arm, two hands).
    #[default]
    Auto,
}

/// The result of filtering one tick worth of events.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filtered {
    pub events: Vec<ControlEvent>,
    /// Events dropped because a primary drives the same entity.
    pub suppressed: usize,
    /// Events dropped because a newer one from the same controller and category arrived in the same poll.
    pub stale: usize,
}

/// Drops secondary controllers' events for entities a primary is driving.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RedundancyFilter {
    primary: Option<ControllerId>,
}

impl RedundancyFilter {
    pub fn new(primary: Option<ControllerId>) -> Self {
        Self { primary }
    }

    pub fn for_policy(
        policy: RedundancyPolicy,
        mapping: &ControlMapping,
        entities: &SceneEntities,
    ) -> Self {
        let primary = match policy {
            RedundancyPolicy::Off => None,
            RedundancyPolicy::Primary(id) => Some(id),
            RedundancyPolicy::Auto => {
                if mapping.is_unicontrol(entities) {
                    mapping.controllers().first().copied()
                } else {
                    None
                }
            }
        };
        Self { primary }
    }

    pub fn primary(&self) -> Option<ControllerId> {
        self.primary
    }

    /// Filters one poll worth of events.
    ///
    /// Only the newest event per `(controller, category)` is kept. Then, if a
    /// primary is designated, every entity the mapping routes to more than
    /// one controller accepts events from a single winner: the primary when
    /// it is among the mapped contenders, otherwise the contender earliest in
    /// the controller sequence. The winner need not have sent anything this
    /// poll. Events for unshared entities are untouched.
    pub fn filter(&self, events: Vec<ControlEvent>, mapping: &ControlMapping) -> Filtered {
        let total = events.len();
        let events = latest_per_source(events);
        let stale = total - events.len();

        if self.primary.is_none() {
            return Filtered {
                events,
                suppressed: 0,
                stale,
            };
        }

        let mut winners: BTreeMap<(Category, EntityId), Option<ControllerId>> = BTreeMap::new();
        let before = events.len();
        let events: Vec<ControlEvent> = events
            .into_iter()
            .filter(|event| {
                let Some(entity) = mapping.get(event.category, event.controller) else {
                    return true;
                };
                let winner = *winners.entry((event.category, entity)).or_insert_with(|| {
                    let contenders = mapping.contenders(event.category, entity);
                    if contenders.len() > 1 {
                        self.pick_winner(&contenders, mapping)
                    } else {
                        None
                    }
                });
                winner.map_or(true, |w| w == event.controller)
            })
            .collect();

        Filtered {
            suppressed: before - events.len(),
            events,
            stale,
        }
    }

    fn pick_winner(&self, contenders: &[ControllerId], mapping: &ControlMapping) -> Option<ControllerId> {
        if let Some(primary) = self.primary.filter(|p| contenders.contains(p)) {
            return Some(primary);
        }
        contenders
            .iter()
            .copied()
            .min_by_key(|c| mapping.rank(*c).unwrap_or(usize::MAX))
    }
}

/// Keeps the last event of every `(controller, category)` pair, in poll order.
fn latest_per_source(events: Vec<ControlEvent>) -> Vec<ControlEvent> {
    let mut seen = HashSet::new();
    let mut kept: Vec<ControlEvent> = events
        .into_iter()
        .rev()
        .filter(|e| seen.insert((e.controller, e.category)))
        .collect();
    kept.reverse();
    kept
}
