//! Feature capability table: which wire-format variant is in effect for a
//! given protocol version.
//!
//! Every version-dependent decision made while building records goes through
//! [`supports`] or, more commonly, through a [`Capabilities`] value resolved
//! once per connection at handshake time. Supporting a new protocol version
//! means adding rows to [`FEATURE_TABLE`]; record builders never compare raw
//! version numbers.

use std::fmt;
use std::str::FromStr;

use glam::DVec3;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ProtocolVersion
// ---------------------------------------------------------------------------

/// A game protocol version such as `1.16.5`. Ordered by (major, minor, patch).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProtocolVersion {
    /// Major version component.
    pub major: u8,
    /// Minor version component.
    pub minor: u8,
    /// Patch component (`0` when omitted, e.g. `1.8`).
    pub patch: u8,
}

impl ProtocolVersion {
    /// Oldest version the feature table knows about. Unrecognised input
    /// degrades to this version's behaviour.
    pub const OLDEST: ProtocolVersion = ProtocolVersion::new(1, 8, 0);

    /// Creates a version from its components.
    pub const fn new(major: u8, minor: u8, patch: u8) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.patch == 0 {
            write!(f, "{}.{}", self.major, self.minor)
        } else {
            write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
        }
    }
}

/// Error returned when a version string is not of the form `X.Y` or `X.Y.Z`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid protocol version {0:?}")]
pub struct VersionParseError(pub String);

impl FromStr for ProtocolVersion {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || VersionParseError(s.to_string());
        let mut parts = s.trim().split('.');
        let major = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(invalid)?;
        let minor = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(invalid)?;
        let patch = match parts.next() {
            Some(p) => p.parse().map_err(|_| invalid())?,
            None => 0,
        };
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Self::new(major, minor, patch))
    }
}

/// Versions the server advertises as fully supported. Other parseable
/// versions still resolve through the table, with a startup warning.
pub const SUPPORTED_VERSIONS: &[ProtocolVersion] = &[
    ProtocolVersion::new(1, 8, 8),
    ProtocolVersion::new(1, 9, 4),
    ProtocolVersion::new(1, 10, 2),
    ProtocolVersion::new(1, 11, 2),
    ProtocolVersion::new(1, 12, 2),
    ProtocolVersion::new(1, 13, 2),
    ProtocolVersion::new(1, 14, 4),
    ProtocolVersion::new(1, 15, 2),
    ProtocolVersion::new(1, 16, 5),
    ProtocolVersion::new(1, 17, 0),
    ProtocolVersion::new(1, 17, 1),
    ProtocolVersion::new(1, 18, 2),
];

// ---------------------------------------------------------------------------
// Feature table
// ---------------------------------------------------------------------------

/// A named, version-dependent wire-format switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Feature {
    /// Positions are scaled by 32 and truncated to integers.
    FixedPointPosition,
    /// Positions are sent as doubles.
    DoublePosition,
    /// Entity metadata follows the spawn record as its own record.
    EntityMetadataSentSeparately,
    /// Item identifiers use the flattened item registry (slot metadata).
    TheFlattening,
    /// All equipment slots travel in a single record.
    AllEntityEquipmentInOne,
    /// Mounting uses the legacy "attach entity" record.
    AttachStackEntity,
    /// Mounting uses the "set passengers" record.
    SetPassengerStackEntity,
    /// The respawn client command carries its action in a payload field.
    RespawnIsPayload,
    /// The respawn client command carries an action id enum.
    RespawnIsActionId,
    /// Dimensions are identified by name rather than by integer.
    DimensionIsAString,
    /// Default object metadata contains a no-gravity flag.
    NoGravityMetadata,
    /// Default object metadata contains a pose entry.
    PoseMetadata,
    /// The destroy record carries exactly one entity id.
    SingleEntityDestroy,
}

const fn v(major: u8, minor: u8, patch: u8) -> ProtocolVersion {
    ProtocolVersion::new(major, minor, patch)
}

/// Inclusive version range per feature. `None` as upper bound means "and
/// every later version".
pub const FEATURE_TABLE: &[(Feature, ProtocolVersion, Option<ProtocolVersion>)] = &[
    (Feature::FixedPointPosition, v(1, 8, 0), Some(v(1, 8, 9))),
    (Feature::DoublePosition, v(1, 9, 0), None),
    (Feature::EntityMetadataSentSeparately, v(1, 15, 0), None),
    (Feature::TheFlattening, v(1, 13, 0), None),
    (Feature::AllEntityEquipmentInOne, v(1, 16, 0), None),
    (Feature::AttachStackEntity, v(1, 8, 0), Some(v(1, 8, 9))),
    (Feature::SetPassengerStackEntity, v(1, 9, 0), None),
    (Feature::RespawnIsPayload, v(1, 8, 0), Some(v(1, 8, 9))),
    (Feature::RespawnIsActionId, v(1, 9, 0), None),
    (Feature::DimensionIsAString, v(1, 16, 0), None),
    (Feature::NoGravityMetadata, v(1, 10, 0), None),
    (Feature::PoseMetadata, v(1, 14, 0), None),
    (Feature::SingleEntityDestroy, v(1, 17, 0), Some(v(1, 17, 0))),
];

/// Returns `true` if `feature` is in effect for `version`.
///
/// Versions older than every row simply report `false` for everything, so
/// callers fall through to the oldest variant of each axis.
pub fn supports(feature: Feature, version: ProtocolVersion) -> bool {
    FEATURE_TABLE
        .iter()
        .filter(|(f, _, _)| *f == feature)
        .any(|(_, min, max)| version >= *min && max.is_none_or(|max| version <= max))
}

/// Like [`supports`] but takes an unparsed version string. Unparseable input
/// resolves to [`ProtocolVersion::OLDEST`].
pub fn supports_str(feature: Feature, version: &str) -> bool {
    let version = version.parse().unwrap_or(ProtocolVersion::OLDEST);
    supports(feature, version)
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// How entity positions are encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PositionEncoding {
    /// `floor(value * 32)` as a 32-bit integer.
    #[default]
    FixedPoint,
    /// Raw 64-bit floating point.
    Double,
}

/// Where spawn-time metadata travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MetadataDelivery {
    /// Inside the spawn record.
    #[default]
    InSpawn,
    /// In an `EntityMetadata` record right after the spawn record.
    Separate,
}

/// How equipment updates are grouped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EquipmentDelivery {
    /// One record per occupied slot.
    #[default]
    PerSlot,
    /// One record carrying every occupied slot.
    Unified,
}

/// Which record carries mount relationships.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PassengerDelivery {
    /// Legacy `AttachEntity` only (riding and leashing share it).
    #[default]
    AttachOnly,
    /// `SetPassengers` for riding; leashing still uses `AttachEntity`.
    SetPassengers,
}

/// Which client-command field signals a respawn request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RespawnSignal {
    /// The `payload` field.
    #[default]
    Payload,
    /// The `action_id` field.
    ActionId,
}

/// How a dimension is identified in the respawn record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DimensionKind {
    /// Numeric dimension id.
    #[default]
    Integer,
    /// Dimension name string.
    Named,
}

/// Metadata layout for the item carried by a dropped-item object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DroppedItemLayout {
    /// Key 10, legacy block id / damage / count triple.
    #[default]
    Legacy,
    /// Key 6, slot value with flattened item id.
    Flattened,
}

/// Shape of the destroy record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DestroyShape {
    /// Many ids per record.
    #[default]
    Batched,
    /// One id per record; batches are split.
    Single,
}

/// Feature answers resolved once for one connection. `Default` is the oldest
/// behaviour on every axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    /// Version these answers were resolved for.
    pub version: Option<ProtocolVersion>,
    /// Position and velocity encoding.
    pub position: PositionEncoding,
    /// Spawn metadata placement.
    pub metadata: MetadataDelivery,
    /// Equipment grouping.
    pub equipment: EquipmentDelivery,
    /// Mount record selection.
    pub passengers: PassengerDelivery,
    /// Respawn signal field.
    pub respawn: RespawnSignal,
    /// Dimension identification.
    pub dimension: DimensionKind,
    /// Dropped item metadata layout.
    pub dropped_item: DroppedItemLayout,
    /// Destroy record shape.
    pub destroy: DestroyShape,
    /// Default object metadata includes a no-gravity flag.
    pub no_gravity_metadata: bool,
    /// Default object metadata includes a pose entry.
    pub pose_metadata: bool,
}

impl Capabilities {
    /// Resolves every feature axis for `version` through the feature table.
    pub fn resolve(version: ProtocolVersion) -> Self {
        let has = |feature| supports(feature, version);
        Self {
            version: Some(version),
            position: if has(Feature::DoublePosition) {
                PositionEncoding::Double
            } else {
                PositionEncoding::FixedPoint
            },
            metadata: if has(Feature::EntityMetadataSentSeparately) {
                MetadataDelivery::Separate
            } else {
                MetadataDelivery::InSpawn
            },
            equipment: if has(Feature::AllEntityEquipmentInOne) {
                EquipmentDelivery::Unified
            } else {
                EquipmentDelivery::PerSlot
            },
            passengers: if has(Feature::SetPassengerStackEntity) {
                PassengerDelivery::SetPassengers
            } else {
                PassengerDelivery::AttachOnly
            },
            respawn: if has(Feature::RespawnIsActionId) {
                RespawnSignal::ActionId
            } else {
                RespawnSignal::Payload
            },
            dimension: if has(Feature::DimensionIsAString) {
                DimensionKind::Named
            } else {
                DimensionKind::Integer
            },
            dropped_item: if has(Feature::TheFlattening) {
                DroppedItemLayout::Flattened
            } else {
                DroppedItemLayout::Legacy
            },
            destroy: if has(Feature::SingleEntityDestroy) {
                DestroyShape::Single
            } else {
                DestroyShape::Batched
            },
            no_gravity_metadata: has(Feature::NoGravityMetadata),
            pose_metadata: has(Feature::PoseMetadata),
        }
    }

    /// Resolves from a version string; unparseable input gets the oldest
    /// behaviour.
    pub fn resolve_str(version: &str) -> Self {
        match version.parse() {
            Ok(version) => Self::resolve(version),
            Err(err) => {
                tracing::warn!("{err}, falling back to {}", ProtocolVersion::OLDEST);
                Self::resolve(ProtocolVersion::OLDEST)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Value encoding
// ---------------------------------------------------------------------------

/// Velocity scale from blocks per second to the wire unit of 1/8000 block
/// per tick at 20 ticks per second.
const VELOCITY_SCALE: f64 = 8000.0 / 20.0;

/// Fixed-point scale factor for positions.
const FIXED_POINT_SCALE: f64 = 32.0;

/// Encodes a position for the wire according to `caps`.
pub fn encode_position(position: DVec3, caps: &Capabilities) -> crate::WirePosition {
    match caps.position {
        PositionEncoding::FixedPoint => {
            let p = (position * FIXED_POINT_SCALE).floor();
            crate::WirePosition::Fixed([p.x as i32, p.y as i32, p.z as i32])
        }
        PositionEncoding::Double => crate::WirePosition::Double(position.to_array()),
    }
}

/// Encodes a velocity given in blocks per second. Out-of-range components
/// saturate at the `i16` bounds.
pub fn encode_velocity(velocity: DVec3, caps: &Capabilities) -> [i16; 3] {
    let mut scaled = velocity * VELOCITY_SCALE;
    if caps.position == PositionEncoding::FixedPoint {
        scaled /= FIXED_POINT_SCALE;
    }
    let v = scaled.floor();
    [v.x as i16, v.y as i16, v.z as i16]
}
