//! Mount and leash relations between entities.
//!
//! Edges live outside the entities: both ends stay owned by the registry.
//! An entity rides at most one carrier; a carrier may hold any number of
//! passengers.

use std::collections::BTreeSet;

use cinder_protocol::{Capabilities, PassengerDelivery, Record};
use rustc_hash::FxHashMap;

use crate::{EntityError, EntityId, EntityRegistry};

/// The carrier side of an attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mount {
    /// Entity carrying (or leading) the attached one.
    pub carrier: EntityId,
    /// Leash rather than a ride.
    pub leashed: bool,
}

/// Directed carrier -> attached edges.
#[derive(Debug, Default)]
pub struct AttachmentGraph {
    mounts: FxHashMap<EntityId, Mount>,
    passengers: FxHashMap<EntityId, BTreeSet<EntityId>>,
}

impl AttachmentGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of attached entities.
    pub fn len(&self) -> usize {
        self.mounts.len()
    }

    /// Returns `true` if nothing is attached.
    pub fn is_empty(&self) -> bool {
        self.mounts.is_empty()
    }

    /// The carrier `id` is attached to.
    pub fn carrier_of(&self, id: EntityId) -> Option<Mount> {
        self.mounts.get(&id).copied()
    }

    /// Entities attached to `carrier`, ascending.
    pub fn passengers_of(&self, carrier: EntityId) -> impl Iterator<Item = EntityId> + '_ {
        self.passengers
            .get(&carrier)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    /// Attaches `attached` to `carrier` and tells every client that knows the
    /// carrier. Returns the number of connections that received records.
    ///
    /// Self-attachment and carry cycles are refused without touching the
    /// graph. An entity already riding something is moved to the new carrier.
    pub fn attach(
        &mut self,
        registry: &EntityRegistry,
        carrier: EntityId,
        attached: EntityId,
        leashed: bool,
    ) -> Result<usize, EntityError> {
        if carrier == attached {
            tracing::warn!("refusing to attach {carrier} to itself");
            return Err(EntityError::SelfAttachment(carrier));
        }
        for id in [carrier, attached] {
            if !registry.contains(id) {
                return Err(EntityError::UnknownEntity(id));
            }
        }
        if self.carries(attached, carrier) {
            tracing::warn!("refusing to attach {attached} to {carrier}: carry cycle");
            return Err(EntityError::AttachmentCycle { carrier, attached });
        }

        let previous = self.mounts.insert(attached, Mount { carrier, leashed });
        if let Some(old) = previous
            && old.carrier != carrier
        {
            self.detach_from(old.carrier, attached);
        }
        self.passengers.entry(carrier).or_default().insert(attached);
        tracing::debug!("attached {attached} to {carrier} (leash: {leashed})");

        let mut notified = 0;
        for receiver in receivers(registry, carrier) {
            let Some(caps) = registry.session(receiver).map(|s| s.capabilities) else {
                continue;
            };
            if !registry.knows(receiver, attached) {
                continue;
            }
            let knows = |x| registry.knows(receiver, x);
            let mut records = self.attach_records(carrier, attached, leashed, &caps, knows);
            if let Some(old) = previous.filter(|old| old.carrier != carrier)
                && registry.knows(receiver, old.carrier)
            {
                records.extend(self.passenger_list(old.carrier, &caps, knows));
            }
            if !records.is_empty() {
                registry.deliver(receiver, records);
                notified += 1;
            }
        }
        Ok(notified)
    }

    /// Whether `carrier` transitively carries `id`.
    fn carries(&self, carrier: EntityId, id: EntityId) -> bool {
        let mut current = id;
        // Chains are acyclic, so this walk terminates.
        while let Some(mount) = self.mounts.get(&current) {
            if mount.carrier == carrier {
                return true;
            }
            current = mount.carrier;
        }
        false
    }

    fn detach_from(&mut self, carrier: EntityId, attached: EntityId) {
        if let Some(set) = self.passengers.get_mut(&carrier) {
            set.remove(&attached);
            if set.is_empty() {
                self.passengers.remove(&carrier);
            }
        }
    }

    /// Drops every edge touching `id`.
    pub fn remove_entity(&mut self, id: EntityId) {
        if let Some(mount) = self.mounts.remove(&id) {
            self.detach_from(mount.carrier, id);
        }
        if let Some(riders) = self.passengers.remove(&id) {
            for rider in riders {
                self.mounts.remove(&rider);
            }
        }
    }

    /// Records announcing a new edge to one receiver.
    fn attach_records(
        &self,
        carrier: EntityId,
        attached: EntityId,
        leashed: bool,
        caps: &Capabilities,
        knows: impl Fn(EntityId) -> bool,
    ) -> Vec<Record> {
        let mut records = Vec::new();
        if caps.passengers == PassengerDelivery::AttachOnly || leashed {
            records.push(Record::AttachEntity {
                entity_id: attached.0,
                vehicle_id: carrier.0,
                leash: leashed,
            });
        }
        records.extend(self.passenger_list(carrier, caps, knows));
        records
    }

    /// The carrier's passenger list as the receiver knows it, for clients
    /// that take complete lists.
    fn passenger_list(
        &self,
        carrier: EntityId,
        caps: &Capabilities,
        knows: impl Fn(EntityId) -> bool,
    ) -> Option<Record> {
        if caps.passengers != PassengerDelivery::SetPassengers {
            return None;
        }
        Some(Record::SetPassengers {
            entity_id: carrier.0,
            passengers: self
                .passengers_of(carrier)
                .filter(|p| knows(*p))
                .map(|p| p.0)
                .collect(),
        })
    }

    /// Records restoring the attachments of `spawned` for a client that has
    /// just been sent its spawn. Only edges whose other end the client
    /// already knows are included, so each edge is announced once.
    pub(crate) fn follow_up_records(
        &self,
        spawned: EntityId,
        caps: &Capabilities,
        knows: impl Fn(EntityId) -> bool,
    ) -> Vec<Record> {
        let mut records = Vec::new();

        if let Some(mount) = self.carrier_of(spawned)
            && knows(mount.carrier)
        {
            records.extend(self.attach_records(
                mount.carrier,
                spawned,
                mount.leashed,
                caps,
                &knows,
            ));
        }

        let known: Vec<EntityId> = self.passengers_of(spawned).filter(|p| knows(*p)).collect();
        if !known.is_empty() {
            for passenger in &known {
                let leashed = self.carrier_of(*passenger).is_some_and(|m| m.leashed);
                if caps.passengers == PassengerDelivery::AttachOnly || leashed {
                    records.push(Record::AttachEntity {
                        entity_id: passenger.0,
                        vehicle_id: spawned.0,
                        leash: leashed,
                    });
                }
            }
            records.extend(self.passenger_list(spawned, caps, &knows));
        }
        records
    }
}

/// The carrier's own connection followed by every holder of the carrier.
fn receivers(registry: &EntityRegistry, carrier: EntityId) -> Vec<EntityId> {
    let mut out = Vec::new();
    if registry.session(carrier).is_some() {
        out.push(carrier);
    }
    out.extend(
        registry
            .observers_of(carrier)
            .filter(|id| registry.session(*id).is_some()),
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EntityKind, EntityLimits, PlayerSession, WorldId};
    use cinder_protocol::{MemoryConnection, ProtocolVersion};
    use crossbeam_channel::Receiver;
    use glam::DVec3;

    fn setup(version: ProtocolVersion) -> (EntityRegistry, EntityId, Receiver<Record>) {
        let mut registry = EntityRegistry::new(EntityLimits::default());
        let (conn, rx) = MemoryConnection::pair();
        let session = PlayerSession::new("viewer", Box::new(conn), Capabilities::resolve(version));
        let viewer = registry.add_player(session, WorldId(0), DVec3::ZERO).unwrap();
        (registry, viewer, rx)
    }

    fn mobs(registry: &mut EntityRegistry, viewer: EntityId, n: usize) -> Vec<EntityId> {
        (0..n)
            .map(|_| {
                let id = registry
                    .create_entity(EntityKind::Mob, 1, WorldId(0), DVec3::ZERO)
                    .unwrap();
                registry.track(viewer, id);
                id
            })
            .collect()
    }

    #[test]
    fn test_set_passengers_only_on_new_versions() {
        let (mut registry, viewer, rx) = setup(ProtocolVersion::new(1, 16, 5));
        let ids = mobs(&mut registry, viewer, 2);
        let mut graph = AttachmentGraph::new();

        assert_eq!(graph.attach(&registry, ids[0], ids[1], false), Ok(1));
        assert_eq!(
            rx.try_iter().collect::<Vec<_>>(),
            vec![Record::SetPassengers {
                entity_id: ids[0].0,
                passengers: vec![ids[1].0]
            }]
        );
    }

    #[test]
    fn test_attach_entity_on_legacy_versions() {
        let (mut registry, viewer, rx) = setup(ProtocolVersion::new(1, 8, 8));
        let ids = mobs(&mut registry, viewer, 2);
        let mut graph = AttachmentGraph::new();

        graph.attach(&registry, ids[0], ids[1], false).unwrap();
        assert_eq!(
            rx.try_iter().collect::<Vec<_>>(),
            vec![Record::AttachEntity {
                entity_id: ids[1].0,
                vehicle_id: ids[0].0,
                leash: false
            }]
        );
    }

    #[test]
    fn test_leash_on_new_versions_sends_both() {
        let (mut registry, viewer, rx) = setup(ProtocolVersion::new(1, 12, 2));
        let ids = mobs(&mut registry, viewer, 2);
        let mut graph = AttachmentGraph::new();

        graph.attach(&registry, ids[0], ids[1], true).unwrap();
        let records: Vec<_> = rx.try_iter().collect();
        assert_eq!(records.len(), 2);
        assert!(matches!(records[0], Record::AttachEntity { leash: true, .. }));
        assert!(matches!(records[1], Record::SetPassengers { .. }));
    }

    #[test]
    fn test_carrier_player_is_told_about_its_own_passenger() {
        let (mut registry, viewer, rx) = setup(ProtocolVersion::new(1, 16, 5));
        let ids = mobs(&mut registry, viewer, 1);
        let mut graph = AttachmentGraph::new();

        assert_eq!(graph.attach(&registry, viewer, ids[0], false), Ok(1));
        assert_eq!(
            rx.try_iter().collect::<Vec<_>>(),
            vec![Record::SetPassengers {
                entity_id: viewer.0,
                passengers: vec![ids[0].0]
            }]
        );
    }

    #[test]
    fn test_receivers_not_knowing_the_attached_entity_are_skipped() {
        let (mut registry, viewer, rx) = setup(ProtocolVersion::new(1, 16, 5));
        let carrier = mobs(&mut registry, viewer, 1)[0];
        let unseen = registry
            .create_entity(EntityKind::Mob, 1, WorldId(0), DVec3::ZERO)
            .unwrap();
        let mut graph = AttachmentGraph::new();

        assert_eq!(graph.attach(&registry, carrier, unseen, false), Ok(0));
        assert_eq!(rx.try_iter().count(), 0);
        assert_eq!(graph.carrier_of(unseen).map(|m| m.carrier), Some(carrier));
    }

    #[test]
    fn test_self_attachment_and_cycles_are_refused() {
        let (mut registry, viewer, rx) = setup(ProtocolVersion::new(1, 16, 5));
        let ids = mobs(&mut registry, viewer, 3);
        let mut graph = AttachmentGraph::new();

        assert_eq!(
            graph.attach(&registry, ids[0], ids[0], false),
            Err(EntityError::SelfAttachment(ids[0]))
        );
        graph.attach(&registry, ids[0], ids[1], false).unwrap();
        graph.attach(&registry, ids[1], ids[2], false).unwrap();
        rx.try_iter().count();

        assert_eq!(
            graph.attach(&registry, ids[2], ids[0], false),
            Err(EntityError::AttachmentCycle {
                carrier: ids[2],
                attached: ids[0]
            })
        );
        assert_eq!(graph.carrier_of(ids[0]), None);
        assert_eq!(rx.try_iter().count(), 0);
    }

    #[test]
    fn test_reattach_moves_the_passenger() {
        let (mut registry, viewer, rx) = setup(ProtocolVersion::new(1, 16, 5));
        let ids = mobs(&mut registry, viewer, 3);
        let mut graph = AttachmentGraph::new();

        graph.attach(&registry, ids[0], ids[2], false).unwrap();
        graph.attach(&registry, ids[1], ids[2], false).unwrap();

        assert_eq!(graph.passengers_of(ids[0]).count(), 0);
        assert_eq!(graph.passengers_of(ids[1]).collect::<Vec<_>>(), vec![ids[2]]);
        let records: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            records.last(),
            Some(&Record::SetPassengers {
                entity_id: ids[0].0,
                passengers: vec![]
            })
        );
    }

    #[test]
    fn test_remove_entity_drops_all_edges() {
        let (mut registry, viewer, _rx) = setup(ProtocolVersion::new(1, 16, 5));
        let ids = mobs(&mut registry, viewer, 3);
        let mut graph = AttachmentGraph::new();
        graph.attach(&registry, ids[1], ids[2], false).unwrap();
        graph.attach(&registry, ids[0], ids[1], false).unwrap();

        graph.remove_entity(ids[1]);
        assert!(graph.is_empty());
        assert_eq!(graph.passengers_of(ids[0]).count(), 0);
    }

    #[test]
    fn test_unknown_ends_are_rejected() {
        let (registry, viewer, _rx) = setup(ProtocolVersion::new(1, 16, 5));
        let mut graph = AttachmentGraph::new();
        assert_eq!(
            graph.attach(&registry, viewer, EntityId(99), false),
            Err(EntityError::UnknownEntity(EntityId(99)))
        );
    }
}
