//! Static entity type table.

use cinder_entity::{EntityKind, skip_mc_prefix};

/// One summonable entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityInfo {
    /// Name without namespace, e.g. `"zombie"`.
    pub name: &'static str,
    /// Numeric type code sent in spawn records.
    pub id: u32,
    /// Whether it spawns as a mob or an object.
    pub kind: EntityKind,
}

const fn mob(name: &'static str, id: u32) -> EntityInfo {
    EntityInfo {
        name,
        id,
        kind: EntityKind::Mob,
    }
}

const fn object(name: &'static str, id: u32) -> EntityInfo {
    EntityInfo {
        name,
        id,
        kind: EntityKind::Object,
    }
}

/// Known entity types, sorted by name.
pub const ENTITY_TYPES: &[EntityInfo] = &[
    object("armor_stand", 1),
    object("arrow", 2),
    object("boat", 6),
    mob("chicken", 9),
    mob("cow", 11),
    mob("creeper", 12),
    object("falling_block", 26),
    mob("horse", 33),
    object("item", 37),
    object("minecart", 45),
    object("tnt", 59),
    mob("pig", 78),
    mob("sheep", 80),
    mob("skeleton", 84),
    mob("slime", 86),
    mob("spider", 89),
    mob("zombie", 102),
];

/// Looks up an entity type by name, with or without the `minecraft:` prefix.
pub fn by_name(name: &str) -> Option<&'static EntityInfo> {
    let name = skip_mc_prefix(name);
    ENTITY_TYPES.iter().find(|info| info.name == name)
}

/// Type code of dropped item objects.
pub fn item_type() -> u32 {
    by_name("item").map_or(37, |info| info.id)
}
