//! The simulation tick: applies client traffic to the entity layer.
//!
//! Network tasks never touch entities. They push [`InboundEvent`]s into a
//! channel, and the single thread owning the [`Simulation`] drains it once
//! per tick, so every entity operation runs in one place and in order.

use std::time::{Duration, Instant};

use cinder_config::Config;
use cinder_entity::{
    EntityError, EntityId, EntityKind, EntityLimits, EntityManager, GameMode, InterestEngine,
    NewEntityHook, ObjectOptions, PlayerSession, SelectError, SelectorScope, WorldId,
};
use cinder_net::{ChannelConnection, ConnectionId, InboundEvent};
use cinder_protocol::{
    Capabilities, ClientMessage, Connection, ProtocolVersion, Record, SUPPORTED_VERSIONS,
};
use crossbeam_channel::Receiver;
use glam::DVec3;
use rustc_hash::FxHashMap;
use tracing::{debug, info, warn};

use crate::catalog;
use crate::commands::{self, CommandSource};
use crate::respawn::{self, WorldInfo};

/// Delay before a dropped item can be picked up.
pub const PICKUP_DELAY: Duration = Duration::from_millis(500);

/// How close a player must be to collect an item.
pub const PICKUP_RADIUS: f64 = 1.5;

/// Simulation settings taken from the server configuration.
#[derive(Debug, Clone)]
pub struct SimulationSettings {
    /// Entity ceiling and view distance.
    pub limits: EntityLimits,
    /// Movement threshold before interest is recomputed.
    pub movement_threshold: f64,
    /// Protocol version of the server itself.
    pub server_version: String,
    /// Where players join and respawn.
    pub spawn_point: DVec3,
    /// Game mode of new players.
    pub game_mode: GameMode,
    /// Every player is an operator.
    pub everybody_op: bool,
    /// Lifetime of dropped items.
    pub item_lifetime: Option<Duration>,
    /// Facts sent in respawn records.
    pub world: WorldInfo,
}

impl SimulationSettings {
    /// Derives the settings from a loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        let game_mode = config.world.game_mode.parse().unwrap_or_else(|err| {
            warn!("{err}, using survival");
            GameMode::Survival
        });
        Self {
            limits: EntityLimits {
                max_entities: config.entities.max_entities,
                view_distance: config.entities.view_distance,
            },
            movement_threshold: config.entities.movement_threshold,
            server_version: config.protocol.version.clone(),
            spawn_point: DVec3::from_array(config.world.spawn_point),
            game_mode,
            everybody_op: config.server.everybody_op,
            item_lifetime: config.entities.item_despawn_seconds.map(Duration::from_secs),
            world: WorldInfo::from_config(&config.world),
        }
    }
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Counters for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Inbound events applied.
    pub events: usize,
    /// Objects destroyed because their lifetime ran out.
    pub expired: usize,
    /// Items picked up by players.
    pub collected: usize,
    /// Players removed because their connection dropped.
    pub disconnected: usize,
}

/// Owns the entity manager and the mapping from transport connections to
/// player entities.
pub struct Simulation {
    manager: EntityManager,
    settings: SimulationSettings,
    events: Receiver<InboundEvent>,
    /// Connected, not yet logged in.
    pending: FxHashMap<ConnectionId, ChannelConnection>,
    players: FxHashMap<ConnectionId, EntityId>,
    connections: FxHashMap<EntityId, ConnectionId>,
    ticks: u64,
}

impl Simulation {
    /// Creates an empty world fed by `events`.
    pub fn new(settings: SimulationSettings, events: Receiver<InboundEvent>) -> Self {
        let server_caps = Capabilities::resolve_str(&settings.server_version);
        let manager = EntityManager::new(
            settings.limits,
            InterestEngine::new(settings.movement_threshold),
            server_caps,
        );
        Self {
            manager,
            settings,
            events,
            pending: FxHashMap::default(),
            players: FxHashMap::default(),
            connections: FxHashMap::default(),
            ticks: 0,
        }
    }

    /// The entity layer.
    pub fn manager(&self) -> &EntityManager {
        &self.manager
    }

    /// Settings in effect.
    pub fn settings(&self) -> &SimulationSettings {
        &self.settings
    }

    /// Ticks run so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Number of logged-in players.
    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Runs one tick at `now`: applies every queued event, removes expired
    /// objects, lets players collect items in reach, then removes players
    /// whose connection dropped.
    pub fn tick(&mut self, now: Instant) -> TickReport {
        let mut report = TickReport::default();
        while let Ok(event) = self.events.try_recv() {
            self.apply(event);
            report.events += 1;
        }

        for id in self.manager.expired_objects(now) {
            if self.manager.destroy_entity(id).is_ok() {
                report.expired += 1;
            }
        }
        for (item, collector) in self.manager.collect_items(now, PICKUP_RADIUS) {
            debug!("{collector} picked up {item}");
            report.collected += 1;
        }
        for id in self.manager.disconnected_players() {
            if self.remove_player(id) {
                report.disconnected += 1;
            }
        }

        self.ticks += 1;
        report
    }

    fn apply(&mut self, event: InboundEvent) {
        match event {
            InboundEvent::Connected { id, connection } => {
                debug!("{id:?} connected");
                self.pending.insert(id, connection);
            }
            InboundEvent::Message { id, message } => self.handle_message(id, message),
            InboundEvent::Disconnected { id } => {
                self.pending.remove(&id);
                if let Some(&entity) = self.players.get(&id) {
                    self.remove_player(entity);
                }
            }
        }
    }

    fn handle_message(&mut self, conn: ConnectionId, message: ClientMessage) {
        if let ClientMessage::Login { username, version } = message {
            self.login(conn, username, &version);
            return;
        }
        let Some(&player) = self.players.get(&conn) else {
            debug!("ignoring message from {conn:?} before login");
            return;
        };

        let result = match message {
            ClientMessage::Login { .. } => Ok(()),
            ClientMessage::Position {
                x, y, z, yaw, pitch, ..
            } => self
                .manager
                .move_entity(player, DVec3::new(x, y, z), yaw, pitch)
                .map(|_| ()),
            ClientMessage::ClientCommand { payload, action_id } => respawn::handle_client_command(
                &mut self.manager,
                &self.settings.world,
                player,
                payload,
                action_id,
            )
            .map(|_| ()),
            ClientMessage::Chat { message } => {
                self.chat(player, &message);
                Ok(())
            }
        };
        if let Err(err) = result {
            warn!("message from {conn:?} failed: {err}");
        }
    }

    fn login(&mut self, conn: ConnectionId, username: String, version: &str) {
        if self.players.contains_key(&conn) {
            warn!("{conn:?} sent a second login, ignoring");
            return;
        }
        let Some(connection) = self.pending.remove(&conn) else {
            warn!("login from unknown connection {conn:?}");
            return;
        };

        let caps = Capabilities::resolve_str(version);
        if caps.version.is_none_or(|v| !SUPPORTED_VERSIONS.contains(&v)) {
            warn!("{username} uses unsupported version {version}");
        }

        let spawn_point = self.settings.spawn_point;
        let mut session = PlayerSession::new(username.clone(), Box::new(connection.clone()), caps);
        session.game_mode = self.settings.game_mode;
        session.previous_game_mode = self.settings.game_mode;
        session.op = self.settings.everybody_op;
        session.spawn_point = spawn_point;

        // Position first, so the client is placed before anything spawns around it.
        if let Err(err) = connection.send(Record::SelfPosition {
            position: spawn_point.to_array(),
            yaw: 0.0,
            pitch: 0.0,
        }) {
            warn!("cannot place {username}: {err}");
        }

        match self.manager.add_player(session, WorldId::default(), spawn_point) {
            Ok(id) => {
                self.players.insert(conn, id);
                self.connections.insert(id, conn);
                debug!("{username} logged in as {id} with {version}");
            }
            Err(err) => {
                warn!("refusing {username}: {err}");
                if let Err(send_err) = connection.send(Record::SystemMessage {
                    message: err.to_string(),
                }) {
                    warn!("cannot tell {username} why: {send_err}");
                }
                connection.close();
            }
        }
    }

    fn chat(&mut self, player: EntityId, message: &str) {
        let Some(username) = self.manager.registry().session(player).map(|s| s.username.clone())
        else {
            return;
        };

        if let Some(command) = message.strip_prefix('/') {
            info!(
                "{username} issued command: {}",
                message.split(' ').next().unwrap_or(message)
            );
            let reply = match commands::execute(
                &mut self.manager,
                &mut self.settings.world,
                CommandSource::Player(player),
                command,
            ) {
                Ok(reply) => reply,
                Err(err) => Some(err.to_string()),
            };
            if let Some(text) = reply {
                self.manager
                    .registry()
                    .deliver(player, [Record::SystemMessage { message: text }]);
            }
            return;
        }

        let line = format!("<{username}> {message}");
        info!("{line}");
        self.broadcast(&line);
    }

    /// Sends a system message to every logged-in player.
    pub fn broadcast(&self, message: &str) {
        for (_, session) in self.manager.registry().players() {
            session.send(Record::SystemMessage {
                message: message.to_string(),
            });
        }
    }

    /// Runs a console command and logs its outcome.
    pub fn run_console_command(&mut self, line: &str) {
        match commands::execute(
            &mut self.manager,
            &mut self.settings.world,
            CommandSource::Console,
            line,
        ) {
            Ok(Some(reply)) => info!("{reply}"),
            Ok(None) => info!("done: {line}"),
            Err(err) => warn!("{line}: {err}"),
        }
    }

    fn remove_player(&mut self, id: EntityId) -> bool {
        if let Some(conn) = self.connections.remove(&id) {
            self.players.remove(&conn);
        }
        let name = self
            .manager
            .registry()
            .session(id)
            .map(|s| s.username.clone());
        match self.manager.destroy_entity(id) {
            Ok(_) => {
                if let Some(name) = name {
                    info!("{name} left");
                }
                true
            }
            Err(err) => {
                debug!("player {id} already gone: {err}");
                false
            }
        }
    }

    // -----------------------------------------------------------------------
    // Entity operations for gameplay code
    // -----------------------------------------------------------------------

    /// Creates a bare entity and announces it to nearby players.
    pub fn create_entity(
        &mut self,
        kind: EntityKind,
        entity_type: u32,
        world: WorldId,
        position: DVec3,
    ) -> Result<EntityId, EntityError> {
        self.manager.create_entity(kind, entity_type, world, position)
    }

    /// Drops a single item that despawns after the configured lifetime.
    pub fn drop_item(
        &mut self,
        item_id: i32,
        world: WorldId,
        position: DVec3,
    ) -> Result<EntityId, EntityError> {
        let options = ObjectOptions {
            pickup_delay: Some(PICKUP_DELAY),
            lifetime: self.settings.item_lifetime,
            ..ObjectOptions::dropped_item(item_id)
        };
        self.manager
            .spawn_object(catalog::item_type(), "item", world, position, options)
    }

    /// Destroys an entity. A player is also disconnected.
    pub fn destroy_entity(&mut self, id: EntityId) -> Result<usize, EntityError> {
        if let Some(conn) = self.connections.remove(&id) {
            self.players.remove(&conn);
        }
        self.manager.destroy_entity(id)
    }

    /// Attaches `attached` to `carrier`.
    pub fn attach(
        &mut self,
        carrier: EntityId,
        attached: EntityId,
        leashed: bool,
    ) -> Result<usize, EntityError> {
        self.manager.attach(carrier, attached, leashed)
    }

    /// Resolves a connected player by exact name.
    pub fn get_player_by_name(&self, name: &str) -> Option<EntityId> {
        self.manager.get_player_by_name(name)
    }

    /// Resolves a selector from `scope`.
    pub fn select_entities(
        &self,
        selector: &str,
        scope: &SelectorScope,
    ) -> Result<Vec<EntityId>, SelectError> {
        self.manager.select_entities(selector, scope)
    }

    /// Registers a callback run after every entity creation.
    pub fn on_new_entity(&mut self, hook: NewEntityHook) {
        self.manager.on_new_entity(hook);
    }

    /// Resolved capabilities of the server's own version.
    pub fn server_version(&self) -> Option<ProtocolVersion> {
        self.manager.server_capabilities().version
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinder_protocol::{SpawnRecord, SendError};
    use crossbeam_channel::{Sender, unbounded};
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc;

    struct World {
        sim: Simulation,
        tx: Sender<InboundEvent>,
        next: u64,
    }

    struct Client {
        id: ConnectionId,
        conn: ChannelConnection,
        rx: mpsc::Receiver<Record>,
    }

    impl Client {
        fn drain(&mut self) -> Vec<Record> {
            let mut out = Vec::new();
            while let Ok(record) = self.rx.try_recv() {
                out.push(record);
            }
            out
        }
    }

    impl World {
        fn new(settings: SimulationSettings) -> Self {
            let (tx, rx) = unbounded();
            Self {
                sim: Simulation::new(settings, rx),
                tx,
                next: 0,
            }
        }

        fn connect(&mut self) -> Client {
            self.next += 1;
            let id = ConnectionId(self.next);
            let (conn, rx) = ChannelConnection::new(id, 256);
            self.tx
                .send(InboundEvent::Connected {
                    id,
                    connection: conn.clone(),
                })
                .unwrap();
            Client { id, conn, rx }
        }

        fn send(&self, client: &Client, message: ClientMessage) {
            self.tx
                .send(InboundEvent::Message {
                    id: client.id,
                    message,
                })
                .unwrap();
        }

        fn login(&mut self, name: &str, version: &str) -> (Client, EntityId) {
            let client = self.connect();
            self.send(
                &client,
                ClientMessage::Login {
                    username: name.to_string(),
                    version: version.to_string(),
                },
            );
            self.sim.tick(Instant::now());
            let id = self.sim.get_player_by_name(name).unwrap();
            (client, id)
        }

        fn tick(&mut self) -> TickReport {
            self.sim.tick(Instant::now())
        }
    }

    fn settings() -> SimulationSettings {
        SimulationSettings {
            spawn_point: DVec3::ZERO,
            ..SimulationSettings::default()
        }
    }

    fn spawned_ids(records: &[Record]) -> Vec<u32> {
        records
            .iter()
            .filter_map(|r| match r {
                Record::Spawn(s) => Some(s.entity_id()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_login_places_player_then_spawns_others() {
        let mut world = World::new(settings());
        let (mut alice, alice_id) = world.login("alice", "1.16.5");
        let (mut bob, bob_id) = world.login("bob", "1.8.8");

        let to_bob = bob.drain();
        assert!(matches!(to_bob[0], Record::SelfPosition { .. }));
        assert_eq!(spawned_ids(&to_bob), vec![alice_id.0]);
        assert!(matches!(
            to_bob.iter().find(|r| matches!(r, Record::Spawn(_))),
            Some(Record::Spawn(SpawnRecord::Player(_)))
        ));
        assert!(spawned_ids(&alice.drain()).contains(&bob_id.0));
        assert_eq!(world.sim.player_count(), 2);
    }

    #[test]
    fn test_messages_before_login_are_ignored() {
        let mut world = World::new(settings());
        let client = world.connect();
        world.send(
            &client,
            ClientMessage::Chat {
                message: "hello".to_string(),
            },
        );
        assert_eq!(world.tick().events, 2);
        assert!(world.sim.manager().registry().is_empty());
    }

    #[test]
    fn test_duplicate_name_refused_and_closed() {
        let mut world = World::new(settings());
        let (_alice, _) = world.login("alice", "1.16.5");
        let mut second = world.connect();
        world.send(
            &second,
            ClientMessage::Login {
                username: "alice".to_string(),
                version: "1.16.5".to_string(),
            },
        );
        world.tick();

        assert_eq!(world.sim.player_count(), 1);
        assert!(!second.conn.is_connected());
        assert!(
            second
                .drain()
                .iter()
                .any(|r| matches!(r, Record::SystemMessage { message } if message.contains("alice")))
        );
    }

    #[test]
    fn test_movement_drives_interest() {
        let mut world = World::new(settings());
        let (mut alice, _) = world.login("alice", "1.16.5");
        let mob = world
            .sim
            .create_entity(EntityKind::Mob, 102, WorldId(0), DVec3::new(200.0, 0.0, 0.0))
            .unwrap();
        alice.drain();

        world.send(
            &alice,
            ClientMessage::Position {
                x: 100.0,
                y: 0.0,
                z: 0.0,
                yaw: 90.0,
                pitch: 0.0,
                on_ground: true,
            },
        );
        world.tick();
        assert_eq!(spawned_ids(&alice.drain()), vec![mob.0]);
    }

    #[test]
    fn test_disconnect_despawns_player_for_others() {
        let mut world = World::new(settings());
        let (alice, alice_id) = world.login("alice", "1.16.5");
        let (mut bob, _) = world.login("bob", "1.16.5");
        bob.drain();

        world
            .tx
            .send(InboundEvent::Disconnected { id: alice.id })
            .unwrap();
        world.tick();

        assert_eq!(
            bob.drain(),
            vec![Record::DestroyEntities {
                entity_ids: vec![alice_id.0]
            }]
        );
        assert!(world.sim.get_player_by_name("alice").is_none());
    }

    #[test]
    fn test_dropped_connection_reaped_on_tick() {
        let mut world = World::new(settings());
        let (alice, _) = world.login("alice", "1.16.5");
        alice.conn.close();
        assert_eq!(world.tick().disconnected, 1);
        assert_eq!(world.sim.player_count(), 0);
    }

    #[test]
    fn test_slow_client_is_dropped() {
        let mut world = World::new(settings());
        let id = ConnectionId(99);
        let (conn, _rx) = ChannelConnection::new(id, 1);
        world
            .tx
            .send(InboundEvent::Connected {
                id,
                connection: conn.clone(),
            })
            .unwrap();
        world
            .tx
            .send(InboundEvent::Message {
                id,
                message: ClientMessage::Login {
                    username: "slow".to_string(),
                    version: "1.16.5".to_string(),
                },
            })
            .unwrap();
        world.tick();
        world
            .sim
            .create_entity(EntityKind::Mob, 102, WorldId(0), DVec3::ZERO)
            .unwrap();

        assert_eq!(conn.send(Record::SystemMessage { message: String::new() }), Err(SendError::Closed));
        assert_eq!(world.tick().disconnected, 1);
    }

    #[test]
    fn test_chat_broadcast_and_commands() {
        let mut world = World::new(SimulationSettings {
            everybody_op: true,
            ..settings()
        });
        let (mut alice, _) = world.login("alice", "1.16.5");
        let (mut bob, _) = world.login("bob", "1.16.5");
        alice.drain();
        bob.drain();

        world.send(
            &alice,
            ClientMessage::Chat {
                message: "hi".to_string(),
            },
        );
        world.tick();
        let expected = Record::SystemMessage {
            message: "<alice> hi".to_string(),
        };
        assert!(bob.drain().contains(&expected));
        alice.drain();

        world.send(
            &alice,
            ClientMessage::Chat {
                message: "/summon dragonfly".to_string(),
            },
        );
        world.tick();
        assert_eq!(
            alice.drain(),
            vec![Record::SystemMessage {
                message: "No entity named dragonfly".to_string()
            }]
        );
        assert!(bob.drain().is_empty());

        world.send(
            &alice,
            ClientMessage::Chat {
                message: "/summon zombie".to_string(),
            },
        );
        world.tick();
        assert_eq!(spawned_ids(&bob.drain()).len(), 1);
    }

    #[test]
    fn test_respawn_command_from_client() {
        let mut world = World::new(settings());
        let (mut alice, alice_id) = world.login("alice", "1.16.5");
        world
            .sim
            .manager
            .teleport(alice_id, DVec3::new(40.0, 0.0, 0.0))
            .unwrap();
        alice.drain();

        world.send(
            &alice,
            ClientMessage::ClientCommand {
                payload: None,
                action_id: Some(0),
            },
        );
        world.tick();
        assert!(matches!(alice.drain().first(), Some(Record::Respawn(_))));
        assert_eq!(world.sim.manager().registry().get(alice_id).unwrap().position(), DVec3::ZERO);
    }

    #[test]
    fn test_expired_items_are_destroyed() {
        let mut world = World::new(SimulationSettings {
            item_lifetime: Some(Duration::from_secs(1)),
            ..settings()
        });
        let item = world.sim.drop_item(1, WorldId(0), DVec3::ZERO).unwrap();
        let born = world.sim.manager().registry().get(item).unwrap().born();

        assert_eq!(world.sim.tick(born).expired, 0);
        assert_eq!(world.sim.tick(born + Duration::from_secs(2)).expired, 1);
        assert!(!world.sim.manager().registry().contains(item));
    }

    #[test]
    fn test_dropped_items_are_collected_after_delay() {
        let mut world = World::new(settings());
        let (mut alice, alice_id) = world.login("alice", "1.16.5");
        let item = world
            .sim
            .drop_item(264, WorldId(0), DVec3::new(1.0, 0.0, 0.0))
            .unwrap();
        let born = world.sim.manager().registry().get(item).unwrap().born();
        alice.drain();

        assert_eq!(world.sim.tick(born).collected, 0);
        assert_eq!(world.sim.tick(born + PICKUP_DELAY * 2).collected, 1);
        assert_eq!(
            alice.drain(),
            vec![
                Record::CollectItem {
                    collected_id: item.0,
                    collector_id: alice_id.0,
                    count: 1
                },
                Record::DestroyEntities {
                    entity_ids: vec![item.0]
                },
            ]
        );
        assert!(!world.sim.manager().registry().contains(item));
    }

    #[test]
    fn test_login_on_closed_connection_is_reaped() {
        let mut world = World::new(settings());
        let client = world.connect();
        client.conn.close();
        world.send(
            &client,
            ClientMessage::Login {
                username: "ghost".to_string(),
                version: "1.16.5".to_string(),
            },
        );

        let report = world.tick();
        assert_eq!(report.events, 2);
        assert_eq!(report.disconnected, 1);
        assert_eq!(world.sim.player_count(), 0);
        assert!(world.sim.get_player_by_name("ghost").is_none());
    }

    #[test]
    fn test_new_entity_hook_sees_creations() {
        let mut world = World::new(settings());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        world
            .sim
            .on_new_entity(Box::new(move |e| sink.lock().unwrap().push(e.id())));

        let mob = world
            .sim
            .create_entity(EntityKind::Mob, 102, WorldId(0), DVec3::ZERO)
            .unwrap();
        let (_alice, alice_id) = world.login("alice", "1.16.5");
        assert_eq!(*seen.lock().unwrap(), vec![mob, alice_id]);
    }

    #[test]
    fn test_destroy_player_through_api_disconnects() {
        let mut world = World::new(settings());
        let (alice, alice_id) = world.login("alice", "1.16.5");
        assert_eq!(world.sim.destroy_entity(alice_id), Ok(0));
        assert!(!alice.conn.is_connected());
        assert_eq!(world.sim.player_count(), 0);
        assert_eq!(
            world.sim.destroy_entity(alice_id),
            Err(EntityError::UnknownEntity(alice_id))
        );
    }
}
