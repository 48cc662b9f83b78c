//! Protocol compatibility layer for the Cinder server.
//!
//! Answers "which wire variant does this client speak" through a single
//! feature table, defines the structured outbound records handed to
//! connections, and the inbound messages decoded from clients.

pub mod connection;
pub mod features;
pub mod inbound;
pub mod records;

pub use connection::{Connection, MemoryConnection, SendError};
pub use features::{
    Capabilities, DestroyShape, DimensionKind, DroppedItemLayout, EquipmentDelivery, Feature,
    MetadataDelivery, PassengerDelivery, PositionEncoding, ProtocolVersion, RespawnSignal,
    SUPPORTED_VERSIONS, VersionParseError, encode_position, encode_velocity, supports,
    supports_str,
};
pub use inbound::ClientMessage;
pub use records::{
    Dimension, EquipmentRecord, ItemStack, MetadataEntry, MetadataValue, MobSpawn, ObjectSpawn,
    PlayerSpawn, Record, RespawnRecord, SpawnRecord, WirePosition,
};
