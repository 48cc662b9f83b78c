//! The entity data model.

use std::collections::BTreeSet;
use std::fmt;
use std::time::{Duration, Instant};

use cinder_protocol::{ItemStack, MetadataEntry, MetadataValue};
use glam::DVec3;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Number of equipment slots (main hand, off hand, four armour slots).
pub const EQUIPMENT_SLOTS: usize = 6;

/// Default distance within which an entity perceives others.
pub const DEFAULT_VIEW_DISTANCE: f64 = 150.0;

/// Server-local entity identifier. Allocated monotonically and never reused
/// while the server runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub u32);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifier of a world (dimension) entities live in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct WorldId(pub u32);

/// Entity kind. Fixed at creation and selects the spawn record shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    /// A connected player.
    Player,
    /// A non-living object (dropped item, arrow, minecart).
    Object,
    /// A living mob.
    Mob,
}

/// Interest tracking state of an entity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InterestState {
    /// Never recomputed (or reset); the next move recomputes unconditionally.
    Untracked,
    /// Recomputed at `last_position`.
    Tracked {
        /// Position snapshot at the last recomputation.
        last_position: DVec3,
    },
}

// ---------------------------------------------------------------------------
// MetadataList
// ---------------------------------------------------------------------------

/// Ordered key/value metadata. Setting a key replaces its value in place or
/// appends it; entries are never removed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataList {
    entries: Vec<MetadataEntry>,
}

impl MetadataList {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key` to `value`, keeping the entry's position if it exists.
    pub fn set(&mut self, key: u8, value: MetadataValue) {
        match self.entries.iter_mut().find(|e| e.key == key) {
            Some(entry) => entry.value = value,
            None => self.entries.push(MetadataEntry::new(key, value)),
        }
    }

    /// Returns the value stored under `key`.
    pub fn get(&self, key: u8) -> Option<&MetadataValue> {
        self.entries.iter().find(|e| e.key == key).map(|e| &e.value)
    }

    /// Entries in insertion order.
    pub fn entries(&self) -> &[MetadataEntry] {
        &self.entries
    }

    /// Copies the entries out.
    pub fn to_vec(&self) -> Vec<MetadataEntry> {
        self.entries.clone()
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no key is set.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<MetadataEntry> for MetadataList {
    fn from_iter<I: IntoIterator<Item = MetadataEntry>>(iter: I) -> Self {
        let mut list = Self::new();
        for entry in iter {
            list.set(entry.key, entry.value);
        }
        list
    }
}

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// A simulated presence in a world: a player, an object, or a mob.
///
/// Identity, kind, type code and world are fixed at creation. The position
/// is owned by the registry (it keys the spatial index); the remaining state
/// is freely mutable by gameplay code.
#[derive(Debug, Clone)]
pub struct Entity {
    id: EntityId,
    kind: EntityKind,
    entity_type: u32,
    world: WorldId,
    position: DVec3,
    born: Instant,
    pub(crate) interest: InterestState,
    pub(crate) nearby: BTreeSet<EntityId>,

    /// Globally unique identifier, assigned at spawn.
    pub uuid: Uuid,
    /// Type name from the static data tables (`"zombie"`, `"item"`).
    pub name: String,
    /// Velocity in blocks per second.
    pub velocity: DVec3,
    /// Yaw in degrees.
    pub yaw: f32,
    /// Pitch in degrees.
    pub pitch: f32,
    /// Head pitch in degrees (mobs).
    pub head_pitch: f32,
    /// Presentation metadata.
    pub metadata: MetadataList,
    /// Object-specific spawn data.
    pub object_data: i32,
    /// Equipment per slot.
    pub equipment: [Option<ItemStack>; EQUIPMENT_SLOTS],
    /// Item carried by a dropped-item object.
    pub item: Option<ItemStack>,
    /// Time after spawn before the object may be picked up.
    pub pickup_delay: Option<Duration>,
    /// Time after spawn at which the object despawns.
    pub lifetime: Option<Duration>,
    /// Radius within which this entity perceives others.
    pub view_distance: f64,
}

impl Entity {
    pub(crate) fn new(
        id: EntityId,
        kind: EntityKind,
        entity_type: u32,
        world: WorldId,
        position: DVec3,
        view_distance: f64,
    ) -> Self {
        Self {
            id,
            kind,
            entity_type,
            world,
            position,
            born: Instant::now(),
            interest: InterestState::Untracked,
            nearby: BTreeSet::new(),
            uuid: Uuid::new_v4(),
            name: String::new(),
            velocity: DVec3::ZERO,
            yaw: 0.0,
            pitch: 0.0,
            head_pitch: 0.0,
            metadata: MetadataList::new(),
            object_data: 0,
            equipment: [None; EQUIPMENT_SLOTS],
            item: None,
            pickup_delay: None,
            lifetime: None,
            view_distance,
        }
    }

    /// Server-local id.
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Entity kind.
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Numeric entity type code.
    pub fn entity_type(&self) -> u32 {
        self.entity_type
    }

    /// World the entity lives in.
    pub fn world(&self) -> WorldId {
        self.world
    }

    /// Current position.
    pub fn position(&self) -> DVec3 {
        self.position
    }

    pub(crate) fn set_position(&mut self, position: DVec3) {
        self.position = position;
    }

    /// When the entity was created.
    pub fn born(&self) -> Instant {
        self.born
    }

    /// Current interest tracking state.
    pub fn interest_state(&self) -> InterestState {
        self.interest
    }

    /// Entities this entity currently perceives.
    pub fn nearby_entities(&self) -> &BTreeSet<EntityId> {
        &self.nearby
    }

    /// Whether the object's lifetime has run out at `now`.
    pub fn is_expired(&self, now: Instant) -> bool {
        self.lifetime
            .is_some_and(|lifetime| now.saturating_duration_since(self.born) >= lifetime)
    }

    /// Whether the object may be picked up at `now`.
    pub fn can_be_picked_up(&self, now: Instant) -> bool {
        self.item.is_some()
            && self
                .pickup_delay
                .is_none_or(|delay| now.saturating_duration_since(self.born) >= delay)
    }
}
