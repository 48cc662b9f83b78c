//! The authoritative set of live entities and player sessions.
//!
//! The registry is the single writer of id allocation, the live-entity set,
//! the spatial index and the reverse interest index. It is owned by the tick
//! thread; other subsystems get read-only views.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use cinder_protocol::{Capabilities, Connection, Record};
use glam::DVec3;
use rustc_hash::FxHashMap;

use crate::encode::despawn_records;
use crate::entity::DEFAULT_VIEW_DISTANCE;
use crate::{Entity, EntityError, EntityId, EntityKind, SpatialGrid, SpatialQuery, WorldId};

/// Callback invoked for every newly created entity.
pub type NewEntityHook = Box<dyn FnMut(&Entity) + Send>;

/// Capacity and perception defaults applied to new entities.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntityLimits {
    /// Live-entity ceiling (players included). Creation is refused once the
    /// live count reaches it.
    pub max_entities: usize,
    /// View distance given to new entities.
    pub view_distance: f64,
}

impl Default for EntityLimits {
    fn default() -> Self {
        Self {
            max_entities: 100,
            view_distance: DEFAULT_VIEW_DISTANCE,
        }
    }
}

// ---------------------------------------------------------------------------
// PlayerSession
// ---------------------------------------------------------------------------

/// Player game mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GameMode {
    /// Survival.
    #[default]
    Survival,
    /// Creative.
    Creative,
    /// Adventure.
    Adventure,
    /// Spectator.
    Spectator,
}

impl GameMode {
    /// Wire value (0-3).
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Survival => 0,
            Self::Creative => 1,
            Self::Adventure => 2,
            Self::Spectator => 3,
        }
    }

    /// Lower-case name, as typed in commands.
    pub fn name(self) -> &'static str {
        match self {
            Self::Survival => "survival",
            Self::Creative => "creative",
            Self::Adventure => "adventure",
            Self::Spectator => "spectator",
        }
    }
}

impl FromStr for GameMode {
    type Err = EntityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "survival" | "0" => Ok(Self::Survival),
            "creative" | "1" => Ok(Self::Creative),
            "adventure" | "2" => Ok(Self::Adventure),
            "spectator" | "3" => Ok(Self::Spectator),
            other => Err(EntityError::UnknownGameMode(other.to_string())),
        }
    }
}

/// Connection-side state of a player entity.
pub struct PlayerSession {
    /// Unique name among connected players.
    pub username: String,
    connection: Box<dyn Connection>,
    /// Feature answers resolved at handshake.
    pub capabilities: Capabilities,
    /// Current game mode.
    pub game_mode: GameMode,
    /// Game mode before the last change.
    pub previous_game_mode: GameMode,
    /// Operator permission.
    pub op: bool,
    /// Where the player respawns.
    pub spawn_point: DVec3,
}

impl PlayerSession {
    /// Creates a survival-mode session.
    pub fn new(
        username: impl Into<String>,
        connection: Box<dyn Connection>,
        capabilities: Capabilities,
    ) -> Self {
        Self {
            username: username.into(),
            connection,
            capabilities,
            game_mode: GameMode::Survival,
            previous_game_mode: GameMode::Survival,
            op: false,
            spawn_point: DVec3::ZERO,
        }
    }

    /// Queues a record without blocking. Returns `false` if it was dropped.
    pub fn send(&self, record: Record) -> bool {
        match self.connection.send(record) {
            Ok(()) => true,
            Err(err) => {
                tracing::debug!("dropping record for {}: {err}", self.username);
                false
            }
        }
    }

    /// Whether the underlying connection is still open.
    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// Closes the underlying connection.
    pub fn disconnect(&self) {
        self.connection.close();
    }
}

impl fmt::Debug for PlayerSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlayerSession")
            .field("username", &self.username)
            .field("capabilities", &self.capabilities)
            .field("game_mode", &self.game_mode)
            .field("op", &self.op)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// EntityRegistry
// ---------------------------------------------------------------------------

/// Owns every live entity, keyed by id, plus the player sessions.
pub struct EntityRegistry {
    limits: EntityLimits,
    next_id: u32,
    entities: BTreeMap<EntityId, Entity>,
    sessions: BTreeMap<EntityId, PlayerSession>,
    /// subject -> entities whose interest set contains subject.
    observers: FxHashMap<EntityId, BTreeSet<EntityId>>,
    grid: SpatialGrid,
    hooks: Vec<NewEntityHook>,
}

impl EntityRegistry {
    /// Creates an empty registry.
    pub fn new(limits: EntityLimits) -> Self {
        Self {
            limits,
            next_id: 0,
            entities: BTreeMap::new(),
            sessions: BTreeMap::new(),
            observers: FxHashMap::default(),
            grid: SpatialGrid::default(),
            hooks: Vec::new(),
        }
    }

    /// Configured limits.
    pub fn limits(&self) -> EntityLimits {
        self.limits
    }

    /// Number of live entities.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns `true` if no entity is live.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Free slots below the entity ceiling.
    pub fn remaining_capacity(&self) -> usize {
        self.limits.max_entities.saturating_sub(self.entities.len())
    }

    /// Looks up a live entity.
    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    /// Looks up a live entity for mutation.
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    /// Whether `id` is live.
    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    /// Live entities in ascending id order.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// Player entities with their sessions, in ascending id order.
    pub fn players(&self) -> impl Iterator<Item = (&Entity, &PlayerSession)> {
        self.sessions
            .iter()
            .filter_map(|(id, session)| self.entities.get(id).map(|e| (e, session)))
    }

    /// The session of a player entity.
    pub fn session(&self, id: EntityId) -> Option<&PlayerSession> {
        self.sessions.get(&id)
    }

    /// The session of a player entity, for mutation.
    pub fn session_mut(&mut self, id: EntityId) -> Option<&mut PlayerSession> {
        self.sessions.get_mut(&id)
    }

    /// Entities whose interest set currently contains `subject`.
    pub fn observers_of(&self, subject: EntityId) -> impl Iterator<Item = EntityId> + '_ {
        self.observers
            .get(&subject)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    /// Whether the client of `receiver` currently knows `subject`: it is the
    /// receiver itself or held in the receiver's interest set.
    pub fn knows(&self, receiver: EntityId, subject: EntityId) -> bool {
        receiver == subject
            || self
                .entities
                .get(&receiver)
                .is_some_and(|e| e.nearby.contains(&subject))
    }

    /// Registers a callback run after every entity creation.
    pub fn on_new_entity(&mut self, hook: NewEntityHook) {
        self.hooks.push(hook);
    }

    /// Allocates an id and registers a new entity at `position`.
    pub fn create_entity(
        &mut self,
        kind: EntityKind,
        entity_type: u32,
        world: WorldId,
        position: DVec3,
    ) -> Result<EntityId, EntityError> {
        if self.entities.len() >= self.limits.max_entities {
            tracing::warn!(
                "refusing to create {kind:?} {entity_type}: {} live entities",
                self.entities.len()
            );
            return Err(EntityError::TooManyEntities {
                limit: self.limits.max_entities,
            });
        }

        let Some(next) = self.next_id.checked_add(1) else {
            tracing::warn!("entity ids exhausted, refusing to create {kind:?} {entity_type}");
            return Err(EntityError::TooManyEntities {
                limit: self.limits.max_entities,
            });
        };
        self.next_id = next;
        let id = EntityId(next);
        let entity = Entity::new(
            id,
            kind,
            entity_type,
            world,
            position,
            self.limits.view_distance,
        );
        self.grid.update(id, world, position);
        self.entities.insert(id, entity);
        tracing::debug!("created {kind:?} {id} (type {entity_type})");

        if let Some(entity) = self.entities.get(&id) {
            for hook in &mut self.hooks {
                hook(entity);
            }
        }
        Ok(id)
    }

    /// Creates a player entity and attaches its session.
    pub fn add_player(
        &mut self,
        session: PlayerSession,
        world: WorldId,
        position: DVec3,
    ) -> Result<EntityId, EntityError> {
        if self.player_by_name(&session.username).is_some() {
            return Err(EntityError::NameTaken(session.username));
        }
        let id = self.create_entity(EntityKind::Player, 0, world, position)?;
        if let Some(entity) = self.entities.get_mut(&id) {
            entity.name = session.username.clone();
        }
        tracing::info!("player {} joined as {id}", session.username);
        self.sessions.insert(id, session);
        Ok(id)
    }

    /// Despawns `id` for every connection holding it, retracts it from
    /// every interest set and removes it. Returns the number of connections
    /// that were sent a despawn.
    ///
    /// Destroying an id that is not live returns
    /// [`EntityError::UnknownEntity`] and leaves the registry untouched.
    pub fn destroy_entity(&mut self, id: EntityId) -> Result<usize, EntityError> {
        let Some(entity) = self.entities.remove(&id) else {
            tracing::warn!("destroy of unknown entity {id} ignored");
            return Err(EntityError::UnknownEntity(id));
        };

        let mut notified = 0;
        for observer in self.observers.remove(&id).unwrap_or_default() {
            if let Some(session) = self.sessions.get(&observer) {
                let mut delivered = false;
                for record in despawn_records(&[id], &session.capabilities) {
                    delivered |= session.send(record);
                }
                if delivered {
                    notified += 1;
                }
            }
            if let Some(other) = self.entities.get_mut(&observer) {
                other.nearby.remove(&id);
            }
        }

        for subject in &entity.nearby {
            if let Some(set) = self.observers.get_mut(subject) {
                set.remove(&id);
            }
        }

        self.grid.remove(id);
        if let Some(session) = self.sessions.remove(&id) {
            session.disconnect();
            tracing::info!("player {} removed", session.username);
        }
        tracing::debug!("destroyed {id}, despawned for {notified} connections");
        Ok(notified)
    }

    /// Moves an entity and updates the spatial index. Interest is not
    /// recomputed here.
    pub fn set_position(&mut self, id: EntityId, position: DVec3) -> Result<(), EntityError> {
        let entity = self
            .entities
            .get_mut(&id)
            .ok_or(EntityError::UnknownEntity(id))?;
        entity.set_position(position);
        self.grid.update(id, entity.world(), position);
        Ok(())
    }

    /// Resolves a connected player by exact name.
    pub fn player_by_name(&self, name: &str) -> Option<EntityId> {
        self.sessions
            .iter()
            .find(|(_, session)| session.username == name)
            .map(|(id, _)| *id)
    }

    /// Players whose connection has dropped.
    pub fn disconnected_players(&self) -> Vec<EntityId> {
        self.sessions
            .iter()
            .filter(|(_, session)| !session.is_connected())
            .map(|(id, _)| *id)
            .collect()
    }

    /// Sends `records` to the player `to`, if it has a session.
    pub fn deliver(&self, to: EntityId, records: impl IntoIterator<Item = Record>) {
        if let Some(session) = self.sessions.get(&to) {
            for record in records {
                session.send(record);
            }
        }
    }

    // -- interest set bookkeeping (kept in step with `observers`) --

    pub(crate) fn track(&mut self, observer: EntityId, subject: EntityId) {
        if let Some(entity) = self.entities.get_mut(&observer)
            && entity.nearby.insert(subject)
        {
            self.observers.entry(subject).or_default().insert(observer);
        }
    }

    pub(crate) fn untrack(&mut self, observer: EntityId, subject: EntityId) {
        if let Some(entity) = self.entities.get_mut(&observer)
            && entity.nearby.remove(&subject)
            && let Some(set) = self.observers.get_mut(&subject)
        {
            set.remove(&observer);
            if set.is_empty() {
                self.observers.remove(&subject);
            }
        }
    }

    pub(crate) fn set_nearby(&mut self, id: EntityId, nearby: BTreeSet<EntityId>) {
        let Some(entity) = self.entities.get_mut(&id) else {
            return;
        };
        let previous = std::mem::replace(&mut entity.nearby, nearby);
        let current = entity.nearby.clone();
        for gone in previous.difference(&current) {
            if let Some(set) = self.observers.get_mut(gone) {
                set.remove(&id);
                if set.is_empty() {
                    self.observers.remove(gone);
                }
            }
        }
        for new in current.difference(&previous) {
            self.observers.entry(*new).or_default().insert(id);
        }
    }
}

impl SpatialQuery for EntityRegistry {
    fn entities_within(&self, position: DVec3, radius: f64, world: WorldId) -> Vec<EntityId> {
        let radius_sq = radius * radius;
        let mut ids: Vec<EntityId> = self
            .grid
            .candidates(world, position, radius)
            .into_iter()
            .filter(|id| {
                self.entities
                    .get(id)
                    .is_some_and(|e| e.position().distance_squared(position) <= radius_sq)
            })
            .collect();
        ids.sort_unstable();
        ids
    }
}
