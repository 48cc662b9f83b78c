//! Structured outbound records handed to a [`Connection`](crate::Connection).
//!
//! The byte layout of each record belongs to the transport codec; these
//! types only fix *which* externally-defined shape is populated and with
//! what values.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

/// A position as it appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum WirePosition {
    /// Fixed-point: `floor(value * 32)`.
    Fixed([i32; 3]),
    /// Floating point, passed through.
    Double([f64; 3]),
}

/// An item stack carried by equipment slots and dropped-item metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStack {
    /// Item (or block) id.
    pub item_id: i32,
    /// Stack size.
    pub count: u8,
    /// Damage / variant value.
    pub damage: i16,
}

impl ItemStack {
    /// Creates a stack with zero damage.
    pub fn new(item_id: i32, count: u8) -> Self {
        Self {
            item_id,
            count,
            damage: 0,
        }
    }
}

/// Typed value of one metadata entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MetadataValue {
    /// Signed byte (flags, small counters).
    Byte(i8),
    /// Variable-length integer.
    VarInt(i32),
    /// 32-bit float.
    Float(f32),
    /// Plain string.
    String(String),
    /// Optional chat component (custom names).
    OptionalChat(Option<String>),
    /// Item slot (flattened item ids).
    Slot(Option<ItemStack>),
    /// Pre-flattening item triple.
    LegacyItem {
        /// Block or item id.
        block_id: i32,
        /// Damage value.
        item_damage: i16,
        /// Stack size.
        item_count: u8,
    },
    /// Boolean.
    Boolean(bool),
    /// Entity pose enum value.
    Pose(i32),
}

/// One key/value metadata entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataEntry {
    /// Metadata index.
    pub key: u8,
    /// Typed value.
    pub value: MetadataValue,
}

impl MetadataEntry {
    /// Creates an entry.
    pub fn new(key: u8, value: MetadataValue) -> Self {
        Self { key, value }
    }
}

// ---------------------------------------------------------------------------
// Spawn records
// ---------------------------------------------------------------------------

/// Spawn record for another player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerSpawn {
    /// Server-local entity id.
    pub entity_id: u32,
    /// The player's UUID.
    pub player_uuid: Uuid,
    /// Encoded position.
    pub position: WirePosition,
    /// Yaw in degrees.
    pub yaw: f32,
    /// Pitch in degrees.
    pub pitch: f32,
    /// Held item id shown to observers.
    pub current_item: i16,
    /// Metadata, when it travels inside the spawn record.
    pub metadata: Option<Vec<MetadataEntry>>,
}

/// Spawn record for a non-living object (dropped item, projectile, vehicle).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectSpawn {
    /// Server-local entity id.
    pub entity_id: u32,
    /// Object UUID.
    pub object_uuid: Uuid,
    /// Numeric object type.
    pub entity_type: u32,
    /// Encoded position.
    pub position: WirePosition,
    /// Pitch in degrees.
    pub pitch: f32,
    /// Yaw in degrees.
    pub yaw: f32,
    /// Type-specific object data.
    pub object_data: i32,
    /// Encoded velocity.
    pub velocity: [i16; 3],
}

/// Spawn record for a mob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MobSpawn {
    /// Server-local entity id.
    pub entity_id: u32,
    /// Mob UUID.
    pub entity_uuid: Uuid,
    /// Numeric mob type.
    pub entity_type: u32,
    /// Encoded position.
    pub position: WirePosition,
    /// Yaw in degrees.
    pub yaw: f32,
    /// Pitch in degrees.
    pub pitch: f32,
    /// Head pitch in degrees.
    pub head_pitch: f32,
    /// Encoded velocity.
    pub velocity: [i16; 3],
    /// Metadata, when it travels inside the spawn record.
    pub metadata: Option<Vec<MetadataEntry>>,
}

/// Spawn record, one variant per entity kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SpawnRecord {
    /// A player became visible.
    Player(PlayerSpawn),
    /// An object became visible.
    Object(ObjectSpawn),
    /// A mob became visible.
    Mob(MobSpawn),
}

impl SpawnRecord {
    /// Id of the spawned entity.
    pub fn entity_id(&self) -> u32 {
        match self {
            Self::Player(p) => p.entity_id,
            Self::Object(o) => o.entity_id,
            Self::Mob(m) => m.entity_id,
        }
    }
}

// ---------------------------------------------------------------------------
// Other records
// ---------------------------------------------------------------------------

/// Equipment update, grouped per the connection's capabilities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EquipmentRecord {
    /// Every occupied slot in one record.
    Unified {
        /// Entity wearing the equipment.
        entity_id: u32,
        /// `(slot, item)` pairs.
        equipments: Vec<(u8, ItemStack)>,
    },
    /// A single slot.
    Slot {
        /// Entity wearing the equipment.
        entity_id: u32,
        /// Slot index.
        slot: u8,
        /// Item in the slot.
        item: ItemStack,
    },
}

/// Dimension identification inside a respawn record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dimension {
    /// Numeric dimension id.
    Id(i32),
    /// Dimension name.
    Named(String),
}

/// Respawn record sent after the client asked to respawn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RespawnRecord {
    /// Game mode before the respawn.
    pub previous_game_mode: u8,
    /// Dimension the player respawns into.
    pub dimension: Dimension,
    /// World name.
    pub world_name: String,
    /// Difficulty level (0-3).
    pub difficulty: u8,
    /// Hashed world seed.
    pub hashed_seed: i64,
    /// Current game mode.
    pub game_mode: u8,
    /// Level type string.
    pub level_type: String,
    /// Debug world flag.
    pub is_debug: bool,
    /// Superflat world flag.
    pub is_flat: bool,
    /// Keep metadata across the respawn.
    pub copy_metadata: bool,
}

/// A structured outbound record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Record {
    /// An entity entered the receiver's interest set.
    Spawn(SpawnRecord),
    /// Metadata update for an entity the receiver knows.
    EntityMetadata {
        /// Target entity.
        entity_id: u32,
        /// Entries to apply.
        metadata: Vec<MetadataEntry>,
    },
    /// Equipment update.
    EntityEquipment(EquipmentRecord),
    /// Entities left the receiver's interest set or were destroyed.
    DestroyEntities {
        /// Ids to forget.
        entity_ids: Vec<u32>,
    },
    /// Legacy mount / leash record.
    AttachEntity {
        /// Attached (riding or leashed) entity.
        entity_id: u32,
        /// Carrier (vehicle or leash holder).
        vehicle_id: u32,
        /// Whether this is a leash rather than a mount.
        leash: bool,
    },
    /// Complete passenger list of a carrier.
    SetPassengers {
        /// Carrier.
        entity_id: u32,
        /// Riding entities.
        passengers: Vec<u32>,
    },
    /// Respawn acknowledgement.
    Respawn(RespawnRecord),
    /// Authoritative position of the receiver's own player.
    SelfPosition {
        /// Position components.
        position: [f64; 3],
        /// Yaw in degrees.
        yaw: f32,
        /// Pitch in degrees.
        pitch: f32,
    },
    /// Health bar update.
    UpdateHealth {
        /// Health points.
        health: f32,
        /// Food level.
        food: i32,
        /// Food saturation.
        saturation: f32,
    },
    /// Plain system text (command results and errors).
    SystemMessage {
        /// Message text.
        message: String,
    },
    /// A player picked up an item entity, which is destroyed next.
    CollectItem {
        /// Item entity collected.
        collected_id: u32,
        /// Player that collected it.
        collector_id: u32,
        /// Items in the picked stack.
        count: u8,
    },
    /// The receiver's own game mode changed.
    GameModeChange {
        /// New game mode, 0 to 3.
        game_mode: u8,
    },
    /// World difficulty changed.
    Difficulty {
        /// Difficulty, 0 to 3.
        difficulty: u8,
        /// Whether the client may not change it.
        locked: bool,
    },
}

impl Record {
    /// Entity ids this record refers to, for ordering checks.
    pub fn entity_ids(&self) -> Vec<u32> {
        match self {
            Self::Spawn(spawn) => vec![spawn.entity_id()],
            Self::EntityMetadata { entity_id, .. } => vec![*entity_id],
            Self::EntityEquipment(EquipmentRecord::Unified { entity_id, .. })
            | Self::EntityEquipment(EquipmentRecord::Slot { entity_id, .. }) => vec![*entity_id],
            Self::DestroyEntities { entity_ids } => entity_ids.clone(),
            Self::AttachEntity {
                entity_id,
                vehicle_id,
                ..
            } => vec![*entity_id, *vehicle_id],
            Self::SetPassengers {
                entity_id,
                passengers,
            } => std::iter::once(*entity_id)
                .chain(passengers.iter().copied())
                .collect(),
            Self::CollectItem {
                collected_id,
                collector_id,
                ..
            } => vec![*collected_id, *collector_id],
            Self::Respawn(_)
            | Self::SelfPosition { .. }
            | Self::UpdateHealth { .. }
            | Self::SystemMessage { .. }
            | Self::GameModeChange { .. }
            | Self::Difficulty { .. } => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_record_reports_entity_id() {
        let record = SpawnRecord::Mob(MobSpawn {
            entity_id: 7,
            entity_uuid: Uuid::nil(),
            entity_type: 42,
            position: WirePosition::Double([0.0; 3]),
            yaw: 0.0,
            pitch: 0.0,
            head_pitch: 0.0,
            velocity: [0; 3],
            metadata: None,
        });
        assert_eq!(record.entity_id(), 7);
    }

    #[test]
    fn test_set_passengers_references_carrier_and_riders() {
        let record = Record::SetPassengers {
            entity_id: 5,
            passengers: vec![9, 10],
        };
        assert_eq!(record.entity_ids(), vec![5, 9, 10]);
    }

    #[test]
    fn test_records_survive_postcard() {
        let record = Record::EntityMetadata {
            entity_id: 3,
            metadata: vec![
                MetadataEntry::new(0, MetadataValue::Byte(0)),
                MetadataEntry::new(6, MetadataValue::Slot(Some(ItemStack::new(1, 64)))),
            ],
        };
        let bytes = postcard::to_allocvec(&record).unwrap();
        let decoded: Record = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, record);
    }
}
