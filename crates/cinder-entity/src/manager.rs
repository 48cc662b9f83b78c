//! The entity operations exposed to the rest of the server.

use std::time::Instant;

use cinder_protocol::{Capabilities, Record};
use glam::DVec3;

use crate::spawn::default_object_metadata;
use crate::{
    AttachmentGraph, EntityError, EntityId, EntityKind, EntityLimits, EntityRegistry,
    InterestDelta, InterestEngine, MobOptions, NewEntityHook, ObjectOptions, PlayerSession,
    SelectError, SelectorScope, SpatialQuery, WorldId, select_entities,
};

/// Owns the registry, the interest engine and the attachment graph, and
/// keeps them consistent: every creation is followed by an interest
/// computation, every destruction drops the entity's attachments.
pub struct EntityManager {
    registry: EntityRegistry,
    interest: InterestEngine,
    mounts: AttachmentGraph,
    /// Capabilities of the server's own protocol version, used for state
    /// stored on entities (default object metadata).
    server_caps: Capabilities,
}

impl EntityManager {
    /// Creates an empty manager.
    pub fn new(limits: EntityLimits, interest: InterestEngine, server_caps: Capabilities) -> Self {
        Self {
            registry: EntityRegistry::new(limits),
            interest,
            mounts: AttachmentGraph::new(),
            server_caps,
        }
    }

    /// Read-only view of the registry.
    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    /// The attachment graph.
    pub fn mounts(&self) -> &AttachmentGraph {
        &self.mounts
    }

    /// The interest engine configuration.
    pub fn interest(&self) -> &InterestEngine {
        &self.interest
    }

    /// Capabilities of the server's protocol version.
    pub fn server_capabilities(&self) -> Capabilities {
        self.server_caps
    }

    /// Mutable access to a player's session.
    pub fn session_mut(&mut self, id: EntityId) -> Option<&mut PlayerSession> {
        self.registry.session_mut(id)
    }

    /// Free slots below the entity ceiling.
    pub fn remaining_capacity(&self) -> usize {
        self.registry.remaining_capacity()
    }

    /// Registers a callback run after every entity creation.
    pub fn on_new_entity(&mut self, hook: NewEntityHook) {
        self.registry.on_new_entity(hook);
    }

    /// Creates a bare entity and announces it to the players around it.
    pub fn create_entity(
        &mut self,
        kind: EntityKind,
        entity_type: u32,
        world: WorldId,
        position: DVec3,
    ) -> Result<EntityId, EntityError> {
        let id = self.registry.create_entity(kind, entity_type, world, position)?;
        self.interest
            .update_and_spawn(&mut self.registry, &self.mounts, id)?;
        Ok(id)
    }

    /// Spawns an object with the default object metadata.
    pub fn spawn_object(
        &mut self,
        entity_type: u32,
        name: &str,
        world: WorldId,
        position: DVec3,
        options: ObjectOptions,
    ) -> Result<EntityId, EntityError> {
        let id = self
            .registry
            .create_entity(EntityKind::Object, entity_type, world, position)?;
        if let Some(object) = self.registry.get_mut(id) {
            object.name = name.to_string();
            object.pitch = options.pitch;
            object.yaw = options.yaw;
            object.velocity = options.velocity;
            object.object_data = options.data;
            object.metadata = default_object_metadata(options.item.as_ref(), &self.server_caps);
            object.item = options.item;
            object.pickup_delay = options.pickup_delay;
            object.lifetime = options.lifetime;
        }
        self.interest
            .update_and_spawn(&mut self.registry, &self.mounts, id)?;
        Ok(id)
    }

    /// Spawns a mob with the caller's metadata.
    pub fn spawn_mob(
        &mut self,
        entity_type: u32,
        name: &str,
        world: WorldId,
        position: DVec3,
        options: MobOptions,
    ) -> Result<EntityId, EntityError> {
        let id = self
            .registry
            .create_entity(EntityKind::Mob, entity_type, world, position)?;
        if let Some(mob) = self.registry.get_mut(id) {
            mob.name = name.to_string();
            mob.pitch = options.pitch;
            mob.yaw = options.yaw;
            mob.head_pitch = options.head_pitch;
            mob.velocity = options.velocity;
            mob.metadata = options.metadata.into_iter().collect();
        }
        self.interest
            .update_and_spawn(&mut self.registry, &self.mounts, id)?;
        Ok(id)
    }

    /// Adds a connected player at `position` and spawns its surroundings.
    pub fn add_player(
        &mut self,
        session: PlayerSession,
        world: WorldId,
        position: DVec3,
    ) -> Result<EntityId, EntityError> {
        let id = self.registry.add_player(session, world, position)?;
        self.interest
            .update_and_spawn(&mut self.registry, &self.mounts, id)?;
        Ok(id)
    }

    /// Moves an entity, recomputing its interest once it has travelled past
    /// the movement threshold.
    pub fn move_entity(
        &mut self,
        id: EntityId,
        position: DVec3,
        yaw: f32,
        pitch: f32,
    ) -> Result<Option<InterestDelta>, EntityError> {
        self.registry.set_position(id, position)?;
        if let Some(entity) = self.registry.get_mut(id) {
            entity.yaw = yaw;
            entity.pitch = pitch;
        }
        self.interest.entity_moved(&mut self.registry, &self.mounts, id)
    }

    /// Moves an entity without touching interest; the caller recomputes.
    pub fn teleport(&mut self, id: EntityId, position: DVec3) -> Result<(), EntityError> {
        self.registry.set_position(id, position)
    }

    /// Recomputes the interest of `id` now.
    pub fn update_and_spawn(&mut self, id: EntityId) -> Result<InterestDelta, EntityError> {
        self.interest
            .update_and_spawn(&mut self.registry, &self.mounts, id)
    }

    /// Forgets what a player's client holds without sending anything.
    pub fn reset_interest(&mut self, id: EntityId) -> Result<(), EntityError> {
        if self.registry.session(id).is_none() {
            return Err(EntityError::NotAPlayer(id));
        }
        self.interest.reset_interest(&mut self.registry, id)
    }

    /// Destroys an entity. Returns the number of connections sent a despawn.
    pub fn destroy_entity(&mut self, id: EntityId) -> Result<usize, EntityError> {
        let notified = self.registry.destroy_entity(id)?;
        self.mounts.remove_entity(id);
        Ok(notified)
    }

    /// Attaches `attached` to `carrier`.
    pub fn attach(
        &mut self,
        carrier: EntityId,
        attached: EntityId,
        leashed: bool,
    ) -> Result<usize, EntityError> {
        self.mounts.attach(&self.registry, carrier, attached, leashed)
    }

    /// Resolves a connected player by exact name.
    pub fn get_player_by_name(&self, name: &str) -> Option<EntityId> {
        self.registry.player_by_name(name)
    }

    /// Resolves a selector in `scope`.
    pub fn select_entities(
        &self,
        selector: &str,
        scope: &SelectorScope,
    ) -> Result<Vec<EntityId>, SelectError> {
        select_entities(&self.registry, selector, scope)
    }

    /// Objects whose lifetime has run out at `now`.
    pub fn expired_objects(&self, now: Instant) -> Vec<EntityId> {
        self.registry
            .entities()
            .filter(|e| e.kind() == EntityKind::Object && e.is_expired(now))
            .map(|e| e.id())
            .collect()
    }

    /// Players whose connection has dropped.
    pub fn disconnected_players(&self) -> Vec<EntityId> {
        self.registry.disconnected_players()
    }

    /// Lets connected players pick up items within `radius` whose pickup
    /// delay has passed at `now`. The nearest player wins (ties by id).
    /// Clients that know both the item and its collector get a collect
    /// record, then the item is destroyed. Returns `(item, collector)` pairs.
    pub fn collect_items(&mut self, now: Instant, radius: f64) -> Vec<(EntityId, EntityId)> {
        let pickups: Vec<(EntityId, EntityId, u8)> = self
            .registry
            .entities()
            .filter(|e| e.kind() == EntityKind::Object && e.can_be_picked_up(now))
            .filter_map(|item| {
                let collector = self
                    .registry
                    .entities_within(item.position(), radius, item.world())
                    .into_iter()
                    .filter(|id| {
                        self.registry
                            .session(*id)
                            .is_some_and(PlayerSession::is_connected)
                    })
                    .filter_map(|id| self.registry.get(id))
                    .min_by(|a, b| {
                        let da = a.position().distance_squared(item.position());
                        let db = b.position().distance_squared(item.position());
                        da.total_cmp(&db)
                    })?;
                let count = item.item.as_ref().map_or(1, |stack| stack.count);
                Some((item.id(), collector.id(), count))
            })
            .collect();

        let mut collected = Vec::with_capacity(pickups.len());
        for (item, collector, count) in pickups {
            let record = Record::CollectItem {
                collected_id: item.0,
                collector_id: collector.0,
                count,
            };
            let receivers: Vec<EntityId> = self
                .registry
                .observers_of(item)
                .filter(|receiver| self.registry.knows(*receiver, collector))
                .collect();
            for receiver in receivers {
                self.registry.deliver(receiver, [record.clone()]);
            }
            match self.destroy_entity(item) {
                Ok(_) => collected.push((item, collector)),
                Err(err) => tracing::warn!("collected item {item} could not be destroyed: {err}"),
            }
        }
        collected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinder_protocol::{MemoryConnection, MetadataValue, ProtocolVersion, Record, SpawnRecord};
    use crossbeam_channel::Receiver;
    use std::time::Duration;

    fn manager(max_entities: usize) -> EntityManager {
        EntityManager::new(
            EntityLimits {
                max_entities,
                view_distance: 150.0,
            },
            InterestEngine::default(),
            Capabilities::resolve(ProtocolVersion::new(1, 16, 5)),
        )
    }

    fn join(m: &mut EntityManager, name: &str, version: &str) -> (EntityId, Receiver<Record>) {
        let (conn, rx) = MemoryConnection::pair();
        let session = PlayerSession::new(name, Box::new(conn), Capabilities::resolve_str(version));
        let id = m.add_player(session, WorldId(0), DVec3::ZERO).unwrap();
        (id, rx)
    }

    #[test]
    fn test_spawn_object_fills_defaults_and_notifies() {
        let mut m = manager(10);
        let (_p, rx) = join(&mut m, "alice", "1.16.5");
        let id = m
            .spawn_object(2, "item", WorldId(0), DVec3::new(1.0, 0.0, 0.0), ObjectOptions::dropped_item(264))
            .unwrap();

        let object = m.registry().get(id).unwrap();
        assert_eq!(object.object_data, 1);
        assert_eq!(object.metadata.get(1), Some(&MetadataValue::VarInt(300)));
        assert!(object.item.is_some());

        let records: Vec<_> = rx.try_iter().collect();
        assert!(matches!(records[0], Record::Spawn(SpawnRecord::Object(_))));
        assert!(records[1..].iter().all(|r| r.entity_ids() == vec![id.0]));
    }

    #[test]
    fn test_spawn_mob_uses_caller_metadata() {
        let mut m = manager(10);
        let options = MobOptions {
            metadata: vec![cinder_protocol::MetadataEntry::new(0, MetadataValue::Byte(0x20))],
            ..MobOptions::default()
        };
        let id = m.spawn_mob(54, "zombie", WorldId(0), DVec3::ZERO, options).unwrap();
        let mob = m.registry().get(id).unwrap();
        assert_eq!(mob.name, "zombie");
        assert_eq!(mob.metadata.get(0), Some(&MetadataValue::Byte(0x20)));
    }

    #[test]
    fn test_destroy_drops_attachments() {
        let mut m = manager(10);
        let a = m.create_entity(EntityKind::Mob, 1, WorldId(0), DVec3::ZERO).unwrap();
        let b = m.create_entity(EntityKind::Mob, 1, WorldId(0), DVec3::ZERO).unwrap();
        m.attach(a, b, false).unwrap();

        m.destroy_entity(a).unwrap();
        assert_eq!(m.mounts().carrier_of(b), None);
        assert_eq!(m.destroy_entity(a), Err(EntityError::UnknownEntity(a)));
    }

    #[test]
    fn test_expired_objects() {
        let mut m = manager(10);
        let short = ObjectOptions {
            lifetime: Some(Duration::from_secs(1)),
            ..ObjectOptions::default()
        };
        let doomed = m.spawn_object(2, "item", WorldId(0), DVec3::ZERO, short).unwrap();
        let kept = m
            .spawn_object(2, "item", WorldId(0), DVec3::ZERO, ObjectOptions::default())
            .unwrap();

        let later = Instant::now() + Duration::from_secs(2);
        let expired = m.expired_objects(later);
        assert_eq!(expired, vec![doomed]);
        assert!(!expired.contains(&kept));
    }

    #[test]
    fn test_disconnected_players_are_reported() {
        let mut m = manager(10);
        let (p, rx) = join(&mut m, "bob", "1.8.8");
        assert!(m.disconnected_players().is_empty());
        drop(rx);
        m.spawn_mob(1, "pig", WorldId(0), DVec3::ZERO, MobOptions::default())
            .unwrap();
        assert_eq!(m.disconnected_players(), vec![p]);
    }

    #[test]
    fn test_items_are_collected_after_pickup_delay() {
        let mut m = manager(10);
        let (alice, rx) = join(&mut m, "alice", "1.16.5");
        let (bob, rx_bob) = join(&mut m, "bob", "1.16.5");
        m.teleport(bob, DVec3::new(1000.0, 0.0, 0.0)).unwrap();
        let options = ObjectOptions {
            pickup_delay: Some(Duration::from_millis(500)),
            ..ObjectOptions::dropped_item(264)
        };
        let item = m
            .spawn_object(2, "item", WorldId(0), DVec3::new(1.0, 0.0, 0.0), options)
            .unwrap();
        m.create_entity(EntityKind::Mob, 1, WorldId(0), DVec3::new(1.0, 0.0, 0.0))
            .unwrap();
        let born = m.registry().get(item).unwrap().born();
        rx.try_iter().for_each(drop);
        rx_bob.try_iter().for_each(drop);

        assert!(m.collect_items(born, 1.5).is_empty());
        assert!(m.registry().contains(item));

        assert_eq!(m.collect_items(born + Duration::from_secs(1), 1.5), vec![(item, alice)]);
        assert_eq!(
            rx.try_iter().collect::<Vec<_>>(),
            vec![
                Record::CollectItem {
                    collected_id: item.0,
                    collector_id: alice.0,
                    count: 1
                },
                Record::DestroyEntities {
                    entity_ids: vec![item.0]
                },
            ]
        );
        assert_eq!(rx_bob.try_iter().count(), 0);
        assert!(!m.registry().contains(item));
    }

    #[test]
    fn test_items_out_of_reach_stay() {
        let mut m = manager(10);
        let (_alice, _rx) = join(&mut m, "alice", "1.16.5");
        let item = m
            .spawn_object(
                2,
                "item",
                WorldId(0),
                DVec3::new(5.0, 0.0, 0.0),
                ObjectOptions::dropped_item(1),
            )
            .unwrap();
        assert!(m.collect_items(Instant::now(), 1.5).is_empty());
        assert!(m.registry().contains(item));
    }

    #[test]
    fn test_reset_interest_requires_a_player() {
        let mut m = manager(10);
        let mob = m.create_entity(EntityKind::Mob, 1, WorldId(0), DVec3::ZERO).unwrap();
        assert_eq!(m.reset_interest(mob), Err(EntityError::NotAPlayer(mob)));
    }
}
