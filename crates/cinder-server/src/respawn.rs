//! Player respawn after death.

use cinder_config::WorldConfig;
use cinder_entity::{EntityError, EntityId, EntityManager};
use cinder_protocol::{Capabilities, Dimension, DimensionKind, Record, RespawnRecord, RespawnSignal};

/// Client command action that requests a respawn.
pub const RESPAWN_ACTION: i32 = 0;

/// World facts repeated in every respawn record.
#[derive(Debug, Clone, PartialEq)]
pub struct WorldInfo {
    /// Dimension names; players live in the first.
    pub dimension_names: Vec<String>,
    /// Difficulty, 0 to 3.
    pub difficulty: u8,
    /// Hashed world seed.
    pub hashed_seed: i64,
    /// Level type name.
    pub level_type: String,
}

impl Default for WorldInfo {
    fn default() -> Self {
        Self::from_config(&WorldConfig::default())
    }
}

impl WorldInfo {
    /// Takes the world section of the server configuration.
    pub fn from_config(config: &WorldConfig) -> Self {
        Self {
            dimension_names: config.dimension_names.clone(),
            difficulty: config.difficulty,
            hashed_seed: config.hashed_seed,
            level_type: config.level_type.clone(),
        }
    }

    /// Name of the dimension players live in.
    pub fn primary_dimension(&self) -> &str {
        self.dimension_names
            .first()
            .map_or("minecraft:overworld", String::as_str)
    }

    fn dimension_for(&self, caps: &Capabilities) -> Dimension {
        match caps.dimension {
            DimensionKind::Named => Dimension::Named(self.primary_dimension().to_string()),
            DimensionKind::Integer => Dimension::Id(0),
        }
    }
}

/// Picks the action field the client's protocol version fills.
pub fn client_action(caps: &Capabilities, payload: Option<i32>, action_id: Option<i32>) -> Option<i32> {
    match caps.respawn {
        RespawnSignal::Payload => payload,
        RespawnSignal::ActionId => action_id,
    }
}

/// Handles a client command from player `id`. Returns whether it was a
/// respawn request.
pub fn handle_client_command(
    manager: &mut EntityManager,
    world: &WorldInfo,
    id: EntityId,
    payload: Option<i32>,
    action_id: Option<i32>,
) -> Result<bool, EntityError> {
    let session = manager
        .registry()
        .session(id)
        .ok_or(EntityError::NotAPlayer(id))?;
    if client_action(&session.capabilities, payload, action_id) != Some(RESPAWN_ACTION) {
        return Ok(false);
    }
    respawn(manager, world, id)?;
    Ok(true)
}

/// Moves player `id` back to its spawn point and rebuilds its client view
/// from scratch: respawn, position and health records, then a full interest
/// recomputation.
pub fn respawn(manager: &mut EntityManager, world: &WorldInfo, id: EntityId) -> Result<(), EntityError> {
    let spawn_point = manager
        .registry()
        .session(id)
        .ok_or(EntityError::NotAPlayer(id))?
        .spawn_point;
    manager.teleport(id, spawn_point)?;

    let registry = manager.registry();
    let (Some(entity), Some(session)) = (registry.get(id), registry.session(id)) else {
        return Err(EntityError::UnknownEntity(id));
    };
    session.send(Record::Respawn(RespawnRecord {
        previous_game_mode: session.previous_game_mode.as_u8(),
        dimension: world.dimension_for(&session.capabilities),
        world_name: world.primary_dimension().to_string(),
        difficulty: world.difficulty,
        hashed_seed: world.hashed_seed,
        game_mode: session.game_mode.as_u8(),
        level_type: world.level_type.clone(),
        is_debug: false,
        is_flat: false,
        copy_metadata: false,
    }));
    session.send(Record::SelfPosition {
        position: spawn_point.to_array(),
        yaw: entity.yaw,
        pitch: entity.pitch,
    });
    session.send(Record::UpdateHealth {
        health: 20.0,
        food: 20,
        saturation: 5.0,
    });
    tracing::debug!("{} respawned", session.username);

    manager.reset_interest(id)?;
    manager.update_and_spawn(id)?;
    Ok(())
}
