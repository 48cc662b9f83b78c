//! Interest management: which entities each entity perceives, and the
//! spawn/despawn records that keep every client's view in step with it.
//!
//! An entity's `nearby` set is a cache of what its connection believes
//! exists. Every change to a player's set goes through this module or the
//! registry's destroy path and is paired with the matching record, so the
//! cache is never ahead of or behind the records actually sent.

use std::collections::BTreeSet;

use glam::DVec3;

use crate::encode::{despawn_records, spawn_records};
use crate::{
    AttachmentGraph, EntityError, EntityId, EntityKind, EntityRegistry, InterestState,
    SpatialQuery,
};

/// Distance an entity must move before its interest set is recomputed.
pub const DEFAULT_MOVEMENT_THRESHOLD: f64 = 2.0;

/// Entities that entered and left an interest set in one recomputation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterestDelta {
    /// Newly perceived entities, ascending.
    pub added: Vec<EntityId>,
    /// Entities no longer perceived, ascending.
    pub removed: Vec<EntityId>,
}

impl InterestDelta {
    /// Returns `true` if nothing changed.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Recomputes interest sets and emits the resulting records.
#[derive(Debug, Clone, Copy)]
pub struct InterestEngine {
    movement_threshold: f64,
}

impl Default for InterestEngine {
    fn default() -> Self {
        Self::new(DEFAULT_MOVEMENT_THRESHOLD)
    }
}

impl InterestEngine {
    /// Creates an engine that recomputes after moves longer than
    /// `movement_threshold`.
    pub fn new(movement_threshold: f64) -> Self {
        Self {
            movement_threshold: movement_threshold.max(0.0),
        }
    }

    /// The configured movement threshold.
    pub fn movement_threshold(&self) -> f64 {
        self.movement_threshold
    }

    /// Whether `id` is due for recomputation: never computed, or moved
    /// farther than the threshold since the last one.
    pub fn needs_update(&self, registry: &EntityRegistry, id: EntityId) -> bool {
        registry.get(id).is_some_and(|entity| match entity.interest_state() {
            InterestState::Untracked => true,
            InterestState::Tracked { last_position } => {
                entity.position().distance(last_position) > self.movement_threshold
            }
        })
    }

    /// Recomputes `id` if its last move crossed the threshold. Returns the
    /// delta when a recomputation happened.
    pub fn entity_moved(
        &self,
        registry: &mut EntityRegistry,
        mounts: &AttachmentGraph,
        id: EntityId,
    ) -> Result<Option<InterestDelta>, EntityError> {
        if !registry.contains(id) {
            return Err(EntityError::UnknownEntity(id));
        }
        if !self.needs_update(registry, id) {
            return Ok(None);
        }
        self.update_and_spawn(registry, mounts, id).map(Some)
    }

    /// Recomputes the interest set of `id` unconditionally.
    ///
    /// The entity's own connection (if it is a player) receives despawns for
    /// everything that left its range, then spawns for everything that
    /// entered. Every player on either side of the change, or already
    /// holding `id`, is reconciled against its own view distance so it
    /// learns that `id` came or went.
    pub fn update_and_spawn(
        &self,
        registry: &mut EntityRegistry,
        mounts: &AttachmentGraph,
        id: EntityId,
    ) -> Result<InterestDelta, EntityError> {
        let (position, world, view_distance, previous) = {
            let entity = registry.get(id).ok_or(EntityError::UnknownEntity(id))?;
            (
                entity.position(),
                entity.world(),
                entity.view_distance,
                entity.nearby.clone(),
            )
        };

        let current: BTreeSet<EntityId> = registry
            .entities_within(position, view_distance, world)
            .into_iter()
            .filter(|other| *other != id)
            .collect();
        let added: Vec<EntityId> = current.difference(&previous).copied().collect();
        let removed: Vec<EntityId> = previous.difference(&current).copied().collect();

        // The moving entity's own view.
        if let Some(session) = registry.session(id) {
            let caps = session.capabilities;
            registry.deliver(id, despawn_records(&removed, &caps));
        }
        for gone in &removed {
            registry.untrack(id, *gone);
        }
        for new in &added {
            let Some(subject) = registry.get(*new) else {
                tracing::error!("interest candidate {new} for {id} is not live, skipping");
                continue;
            };
            let subject_records = registry
                .session(id)
                .map(|session| spawn_records(subject, &session.capabilities));
            registry.track(id, *new);
            if let Some(mut records) = subject_records {
                if let Some(session) = registry.session(id) {
                    let caps = session.capabilities;
                    records.extend(
                        mounts.follow_up_records(*new, &caps, |x| registry.knows(id, x)),
                    );
                }
                registry.deliver(id, records);
            }
        }

        // Everyone else's view of the moving entity.
        let holders: Vec<EntityId> = registry.observers_of(id).collect();
        let mut others: BTreeSet<EntityId> = current.union(&previous).copied().collect();
        others.extend(holders);
        for other in others {
            self.reconcile(registry, mounts, other, id, position);
        }

        if let Some(entity) = registry.get_mut(id) {
            entity.interest = InterestState::Tracked {
                last_position: position,
            };
        }

        if !added.is_empty() || !removed.is_empty() {
            tracing::trace!(
                "interest of {id}: +{} -{} ({} nearby)",
                added.len(),
                removed.len(),
                current.len()
            );
        }
        Ok(InterestDelta { added, removed })
    }

    /// Brings the player `observer`'s holding of `subject` in line with the
    /// observer's own view distance.
    fn reconcile(
        &self,
        registry: &mut EntityRegistry,
        mounts: &AttachmentGraph,
        observer: EntityId,
        subject: EntityId,
        subject_position: DVec3,
    ) {
        let Some(caps) = registry.session(observer).map(|s| s.capabilities) else {
            return;
        };
        let Some(viewer) = registry.get(observer) else {
            return;
        };
        let Some(subject_world) = registry.get(subject).map(|s| s.world()) else {
            return;
        };
        if viewer.kind() != EntityKind::Player {
            return;
        }

        let wanted = viewer.world() == subject_world
            && viewer.position().distance_squared(subject_position)
                <= viewer.view_distance * viewer.view_distance;
        let held = viewer.nearby.contains(&subject);

        match (wanted, held) {
            (true, false) => {
                registry.track(observer, subject);
                let Some(entity) = registry.get(subject) else {
                    return;
                };
                let mut records = spawn_records(entity, &caps);
                records.extend(
                    mounts.follow_up_records(subject, &caps, |x| registry.knows(observer, x)),
                );
                registry.deliver(observer, records);
            }
            (false, true) => {
                registry.deliver(observer, despawn_records(&[subject], &caps));
                registry.untrack(observer, subject);
            }
            _ => {}
        }
    }

    /// Forgets the interest set of `id` without sending anything, for a
    /// client that has already dropped every entity (after a respawn). The
    /// next recomputation spawns the surroundings afresh.
    pub fn reset_interest(
        &self,
        registry: &mut EntityRegistry,
        id: EntityId,
    ) -> Result<(), EntityError> {
        if !registry.contains(id) {
            return Err(EntityError::UnknownEntity(id));
        }
        registry.set_nearby(id, BTreeSet::new());
        if let Some(entity) = registry.get_mut(id) {
            entity.interest = InterestState::Untracked;
        }
        Ok(())
    }
}
