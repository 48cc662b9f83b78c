//! Entity lifecycle errors.

use crate::EntityId;

/// Errors returned by registry, interest and attachment operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EntityError {
    /// The live-entity ceiling is reached; the creation was refused.
    #[error("too many entities: limit of {limit} reached")]
    TooManyEntities {
        /// Configured ceiling.
        limit: usize,
    },

    /// No live entity has this id (never existed or already destroyed).
    #[error("unknown entity {0}")]
    UnknownEntity(EntityId),

    /// The entity has no player session.
    #[error("entity {0} is not a connected player")]
    NotAPlayer(EntityId),

    /// A connected player already uses this name.
    #[error("player name {0:?} is already connected")]
    NameTaken(String),

    /// An entity was asked to carry itself.
    #[error("entity {0} cannot be attached to itself")]
    SelfAttachment(EntityId),

    /// The attachment would close a carry loop.
    #[error("attaching {attached} to {carrier} would create a cycle")]
    AttachmentCycle {
        /// Requested carrier.
        carrier: EntityId,
        /// Requested passenger.
        attached: EntityId,
    },

    /// A game mode name or number was not recognised.
    #[error("unknown game mode {0:?}, expected survival, creative, adventure, spectator or 0-3")]
    UnknownGameMode(String),
}
