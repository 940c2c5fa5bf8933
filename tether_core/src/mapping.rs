// tether_core/src/mapping.rs

//! Controller → entity routing tables.
//!
//! A [`ControlMapping`] is a plain value: it is built once per reset from the
//! controller sequence and the scene's entity lists, then passed by reference
//! to everything that needs to route input.

use crate::types::{BodyId, Category, ControllerId, EntityId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// The ordered entity ids of a scene, one list per category.
///
/// Order matters: [`ControlMapping::build`] pairs positions, so the first
/// controller gets the first gripper, the second controller the second, and
/// so on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SceneEntities {
    #[serde(default)]
    pub free_bodies: Vec<EntityId>,
    #[serde(default)]
    pub grippers: Vec<EntityId>,
    #[serde(default)]
    pub arms: Vec<EntityId>,
    /// Arm link bodies checked against the safety bounds after every step.
    #[serde(default)]
    pub arm_links: Vec<BodyId>,
}

impl SceneEntities {
    pub fn by_category(&self, category: Category) -> &[EntityId] {
        match category {
            Category::FreeBody => &self.free_bodies,
            Category::Gripper => &self.grippers,
            Category::ArmConstraint => &self.arms,
        }
    }

    pub fn contains(&self, category: Category, id: EntityId) -> bool {
        self.by_category(category).contains(&id)
    }

    pub fn is_gripper(&self, body: BodyId) -> bool {
        self.contains(Category::Gripper, body.into())
    }
}

/// Reverse lookup tables: `{category: {entity: controller}}`.
pub type InvertedMapping = BTreeMap<Category, BTreeMap<EntityId, ControllerId>>;

/// Three independent partial functions, one per category, from controller
/// to entity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControlMapping {
    controllers: Vec<ControllerId>,
    routes: BTreeMap<Category, BTreeMap<ControllerId, EntityId>>,
}

impl ControlMapping {
    /// Zips the controller sequence against each category's entity sequence.
    /// The shorter side decides how many pairs a category gets; a category
    /// with no pairs has no table at all. A repeated controller id counts
    /// once, at its first position.
    pub fn build(controllers: &[ControllerId], entities: &SceneEntities) -> Self {
        let mut seen = BTreeSet::new();
        let controllers: Vec<ControllerId> = controllers
            .iter()
            .copied()
            .filter(|c| seen.insert(*c))
            .collect();

        let mut routes = BTreeMap::new();
        for category in Category::ALL {
            let table: BTreeMap<ControllerId, EntityId> = controllers
                .iter()
                .copied()
                .zip(entities.by_category(category).iter().copied())
                .collect();
            if !table.is_empty() {
                routes.insert(category, table);
            }
        }
        Self {
            controllers,
            routes,
        }
    }

    /// The controller sequence this mapping was built from, in order.
    pub fn controllers(&self) -> &[ControllerId] {
        &self.controllers
    }

    pub fn get(&self, category: Category, controller: ControllerId) -> Option<EntityId> {
        self.routes
            .get(&category)
            .and_then(|table| table.get(&controller))
            .copied()
    }

    /// Routes `controller` to `entity`, returning the previous entity if any.
    /// Used while reconfiguring; may leave the table non-injective for a while.
    pub fn insert(
        &mut self,
        category: Category,
        controller: ControllerId,
        entity: EntityId,
    ) -> Option<EntityId> {
        if !self.controllers.contains(&controller) {
            self.controllers.push(controller);
        }
        self.routes
            .entry(category)
            .or_default()
            .insert(controller, entity)
    }

    /// All `(controller, entity)` pairs of one category.
    pub fn pairs(&self, category: Category) -> impl Iterator<Item = (ControllerId, EntityId)> + '_ {
        self.routes
            .get(&category)
            .into_iter()
            .flat_map(|table| table.iter().map(|(c, e)| (*c, *e)))
    }

    /// Number of pairs in one category.
    pub fn len(&self, category: Category) -> usize {
        self.routes.get(&category).map_or(0, |table| table.len())
    }

    pub fn is_empty(&self) -> bool {
        self.routes.values().all(|table| table.is_empty())
    }

    /// Every controller routed to `entity` in `category`, in controller-sequence order.
    pub fn contenders(&self, category: Category, entity: EntityId) -> Vec<ControllerId> {
        self.controllers
            .iter()
            .copied()
            .filter(|c| self.get(category, *c) == Some(entity))
            .collect()
    }

    /// Position of a controller in the controller sequence.
    pub fn rank(&self, controller: ControllerId) -> Option<usize> {
        self.controllers.iter().position(|c| *c == controller)
    }

    /// Reverse tables keyed by entity. When two controllers share an entity
    /// the one earlier in the controller sequence wins.
    pub fn invert(&self) -> InvertedMapping {
        let mut inverted = InvertedMapping::new();
        for (category, table) in &self.routes {
            let reverse = inverted.entry(*category).or_default();
            for controller in &self.controllers {
                if let Some(entity) = table.get(controller) {
                    reverse.entry(*entity).or_insert(*controller);
                }
            }
        }
        inverted
    }

    /// More controllers than entities in every category: one arm, two hands.
    pub fn is_unicontrol(&self, entities: &SceneEntities) -> bool {
        let most = Category::ALL
            .iter()
            .map(|c| entities.by_category(*c).len())
            .max()
            .unwrap_or(0);
        self.controllers.len() > most
    }
}
