//! Spawn parameters for objects and mobs.

use std::time::Duration;

use cinder_protocol::{Capabilities, ItemStack, MetadataEntry, MetadataValue};
use glam::DVec3;

use crate::MetadataList;

/// Optional parameters of [`EntityManager::spawn_object`](crate::EntityManager::spawn_object).
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectOptions {
    /// Pitch in degrees.
    pub pitch: f32,
    /// Yaw in degrees.
    pub yaw: f32,
    /// Initial velocity in blocks per second.
    pub velocity: DVec3,
    /// Object data field of the spawn record.
    pub data: i32,
    /// Item payload, for dropped items.
    pub item: Option<ItemStack>,
    /// Time before the item may be picked up.
    pub pickup_delay: Option<Duration>,
    /// Time after which the object is destroyed.
    pub lifetime: Option<Duration>,
}

impl Default for ObjectOptions {
    fn default() -> Self {
        Self {
            pitch: 0.0,
            yaw: 0.0,
            velocity: DVec3::ZERO,
            data: 1,
            item: None,
            pickup_delay: None,
            lifetime: None,
        }
    }
}

impl ObjectOptions {
    /// A dropped stack of one `item_id`.
    pub fn dropped_item(item_id: i32) -> Self {
        Self {
            item: Some(ItemStack::new(item_id, 1)),
            ..Self::default()
        }
    }
}

/// Optional parameters of [`EntityManager::spawn_mob`](crate::EntityManager::spawn_mob).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MobOptions {
    /// Pitch in degrees.
    pub pitch: f32,
    /// Yaw in degrees.
    pub yaw: f32,
    /// Head pitch in degrees.
    pub head_pitch: f32,
    /// Initial velocity in blocks per second.
    pub velocity: DVec3,
    /// Initial metadata.
    pub metadata: Vec<MetadataEntry>,
}

/// Metadata every object starts with: flags, air, custom name, name
/// visibility and silence, then the no-gravity flag and pose where the
/// protocol has them, then the item slot when an item is carried.
pub fn default_object_metadata(item: Option<&ItemStack>, caps: &Capabilities) -> MetadataList {
    let mut list: MetadataList = [
        MetadataEntry::new(0, MetadataValue::Byte(0)),
        MetadataEntry::new(1, MetadataValue::VarInt(300)),
        MetadataEntry::new(2, MetadataValue::OptionalChat(None)),
        MetadataEntry::new(3, MetadataValue::Boolean(false)),
        MetadataEntry::new(4, MetadataValue::Boolean(false)),
    ]
    .into_iter()
    .collect();

    let mut key = 5;
    if caps.no_gravity_metadata {
        list.set(key, MetadataValue::Boolean(false));
        key += 1;
        if caps.pose_metadata {
            list.set(key, MetadataValue::Pose(0));
            key += 1;
        }
    }
    if let Some(item) = item {
        list.set(key, MetadataValue::Slot(Some(*item)));
    }
    list
}
