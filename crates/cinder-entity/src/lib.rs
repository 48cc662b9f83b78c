//! Entity lifecycle and interest synchronization.
//!
//! The [`EntityRegistry`] owns every live entity and player session. The
//! [`InterestEngine`] keeps each entity's set of perceived neighbours in step
//! with the spawn/despawn records its connection has received, and the
//! [`AttachmentGraph`] layers mount and leash relationships on top.
//! [`EntityManager`] ties the three together behind the operations other
//! subsystems call.

pub mod attachment;
pub mod encode;
pub mod entity;
pub mod error;
pub mod interest;
pub mod manager;
pub mod registry;
pub mod selector;
pub mod spatial;
pub mod spawn;

pub use attachment::{AttachmentGraph, Mount};
pub use entity::{DEFAULT_VIEW_DISTANCE, EQUIPMENT_SLOTS, Entity, EntityId, EntityKind, InterestState, MetadataList, WorldId};
pub use error::EntityError;
pub use interest::{DEFAULT_MOVEMENT_THRESHOLD, InterestDelta, InterestEngine};
pub use manager::EntityManager;
pub use registry::{EntityLimits, EntityRegistry, GameMode, NewEntityHook, PlayerSession};
pub use selector::{SelectError, SelectorScope, select_entities, skip_mc_prefix};
pub use spatial::{SpatialGrid, SpatialQuery};
pub use spawn::{MobOptions, ObjectOptions, default_object_metadata};
