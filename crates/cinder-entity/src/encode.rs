//! Entity state to outbound records, per connection capabilities.
//!
//! Everything version dependent is read from [`Capabilities`]; no function
//! here compares protocol versions.

use cinder_protocol::{
    Capabilities, DestroyShape, DroppedItemLayout, EquipmentDelivery, EquipmentRecord, ItemStack,
    MetadataDelivery, MetadataEntry, MetadataValue, MobSpawn, ObjectSpawn, PlayerSpawn, Record,
    SpawnRecord, encode_position, encode_velocity,
};

use crate::{Entity, EntityId, EntityKind};

/// Metadata key of the dropped-item slot after the flattening.
const FLATTENED_ITEM_KEY: u8 = 6;
/// Metadata key of the legacy dropped-item payload.
const LEGACY_ITEM_KEY: u8 = 10;

/// Builds the spawn record for `entity` as seen by a client with `caps`.
pub fn spawn_record(entity: &Entity, caps: &Capabilities) -> SpawnRecord {
    let entity_id = entity.id().0;
    let position = encode_position(entity.position(), caps);
    let inline_metadata = match caps.metadata {
        MetadataDelivery::InSpawn => Some(entity.metadata.to_vec()),
        MetadataDelivery::Separate => None,
    };

    match entity.kind() {
        EntityKind::Player => SpawnRecord::Player(PlayerSpawn {
            entity_id,
            player_uuid: entity.uuid,
            position,
            yaw: entity.yaw,
            pitch: entity.pitch,
            current_item: 0,
            metadata: inline_metadata,
        }),
        EntityKind::Object => SpawnRecord::Object(ObjectSpawn {
            entity_id,
            object_uuid: entity.uuid,
            entity_type: entity.entity_type(),
            position,
            pitch: entity.pitch,
            yaw: entity.yaw,
            object_data: entity.object_data,
            velocity: encode_velocity(entity.velocity, caps),
        }),
        EntityKind::Mob => SpawnRecord::Mob(MobSpawn {
            entity_id,
            entity_uuid: entity.uuid,
            entity_type: entity.entity_type(),
            position,
            yaw: entity.yaw,
            pitch: entity.pitch,
            head_pitch: entity.head_pitch,
            velocity: encode_velocity(entity.velocity, caps),
            metadata: inline_metadata,
        }),
    }
}

/// Every record a client needs to learn about `entity`, spawn first:
/// the spawn record, deferred metadata, the dropped-item payload and the
/// equipment.
pub fn spawn_records(entity: &Entity, caps: &Capabilities) -> Vec<Record> {
    let entity_id = entity.id().0;
    let mut records = vec![Record::Spawn(spawn_record(entity, caps))];

    // Objects have no metadata field in their spawn shape.
    let metadata_inline =
        caps.metadata == MetadataDelivery::InSpawn && entity.kind() != EntityKind::Object;
    if !metadata_inline && !entity.metadata.is_empty() {
        records.push(Record::EntityMetadata {
            entity_id,
            metadata: entity.metadata.to_vec(),
        });
    }

    if let Some(item) = &entity.item {
        records.push(Record::EntityMetadata {
            entity_id,
            metadata: vec![dropped_item_entry(item, caps)],
        });
    }

    records.extend(equipment_records(entity, caps));
    records
}

/// The metadata entry carrying a dropped item's payload.
pub fn dropped_item_entry(item: &ItemStack, caps: &Capabilities) -> MetadataEntry {
    match caps.dropped_item {
        DroppedItemLayout::Flattened => {
            MetadataEntry::new(FLATTENED_ITEM_KEY, MetadataValue::Slot(Some(*item)))
        }
        DroppedItemLayout::Legacy => MetadataEntry::new(
            LEGACY_ITEM_KEY,
            MetadataValue::LegacyItem {
                block_id: item.item_id,
                item_damage: item.damage,
                item_count: item.count,
            },
        ),
    }
}

/// Equipment records for every occupied slot. Nothing is emitted for an
/// entity with no equipment.
pub fn equipment_records(entity: &Entity, caps: &Capabilities) -> Vec<Record> {
    let entity_id = entity.id().0;
    let occupied = entity
        .equipment
        .iter()
        .enumerate()
        .filter_map(|(slot, item)| item.map(|item| (slot as u8, item)));

    match caps.equipment {
        EquipmentDelivery::Unified => {
            let equipments: Vec<_> = occupied.collect();
            if equipments.is_empty() {
                Vec::new()
            } else {
                vec![Record::EntityEquipment(EquipmentRecord::Unified {
                    entity_id,
                    equipments,
                })]
            }
        }
        EquipmentDelivery::PerSlot => occupied
            .map(|(slot, item)| {
                Record::EntityEquipment(EquipmentRecord::Slot {
                    entity_id,
                    slot,
                    item,
                })
            })
            .collect(),
    }
}

/// Despawn records for `ids`, batched or one per id.
pub fn despawn_records(ids: &[EntityId], caps: &Capabilities) -> Vec<Record> {
    if ids.is_empty() {
        return Vec::new();
    }
    match caps.destroy {
        DestroyShape::Batched => vec![Record::DestroyEntities {
            entity_ids: ids.iter().map(|id| id.0).collect(),
        }],
        DestroyShape::Single => ids
            .iter()
            .map(|id| Record::DestroyEntities {
                entity_ids: vec![id.0],
            })
            .collect(),
    }
}
