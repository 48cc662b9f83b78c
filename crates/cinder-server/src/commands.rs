//! Commands typed in chat (`/summon zombie`) or on the console.

use cinder_entity::{
    EntityError, EntityId, EntityKind, EntityManager, GameMode, MobOptions, ObjectOptions,
    SelectError, SelectorScope, WorldId,
};
use cinder_protocol::Record;
use glam::DVec3;
use rand::Rng;

use crate::catalog::{self, EntityInfo};
use crate::respawn::WorldInfo;

/// Who issued a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandSource {
    /// A player, by entity id.
    Player(EntityId),
    /// The server console. Always an operator.
    Console,
}

/// Why a command did not run. The display text is what the issuer sees.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CommandError {
    /// A gameplay refusal, shown verbatim.
    #[error("{0}")]
    User(String),

    /// The arguments did not parse.
    #[error("Usage: {0}")]
    Usage(&'static str),

    /// No command has this name.
    #[error("Unknown command: {0}")]
    Unknown(String),

    /// The issuer lacks operator rights.
    #[error("You do not have permission to use this command")]
    PermissionDenied,

    /// The command needs a position to act from.
    #[error("This command can only be used by players")]
    PlayerOnly,

    /// The entity layer rejected the operation.
    #[error(transparent)]
    Entity(#[from] EntityError),
}

/// A registered command.
#[derive(Debug, Clone, Copy)]
pub struct CommandSpec {
    /// Name typed after the slash.
    pub base: &'static str,
    /// One-line description.
    pub info: &'static str,
    /// Usage line shown on bad arguments.
    pub usage: &'static str,
    /// Needs a player issuer.
    pub only_player: bool,
    /// Needs operator rights.
    pub op: bool,
}

/// Every command this module handles.
pub const COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        base: "summon",
        info: "Summon an entity",
        usage: "/summon <entity_name>",
        only_player: true,
        op: true,
    },
    CommandSpec {
        base: "summonMany",
        info: "Summon many entities",
        usage: "/summonMany <number> <entity_name>",
        only_player: true,
        op: true,
    },
    CommandSpec {
        base: "pile",
        info: "make a pile of entities",
        usage: "/pile <entities types>",
        only_player: true,
        op: true,
    },
    CommandSpec {
        base: "attach",
        info: "attach an entity on an other entity",
        usage: "/attach <carrier> <attached>",
        only_player: false,
        op: true,
    },
    CommandSpec {
        base: "gamemode",
        info: "to change game mode",
        usage: "/gamemode <mode> [player]",
        only_player: false,
        op: true,
    },
    CommandSpec {
        base: "difficulty",
        info: "Sets the difficulty level",
        usage: "/difficulty <difficulty>",
        only_player: false,
        op: true,
    },
    CommandSpec {
        base: "tell",
        info: "Whispers a message to a player.",
        usage: "/tell <player> <message>",
        only_player: false,
        op: false,
    },
];

const TOO_MANY: &str = "Too many mobs !";

/// Where the issuer stands.
#[derive(Debug, Clone, Copy)]
struct Issuer {
    scope: SelectorScope,
    is_player: bool,
}

/// Runs one command line (without the leading slash). `world` holds the
/// world settings commands may change.
///
/// `Ok(Some(text))` is feedback for the issuer, `Ok(None)` means the command
/// ran silently.
pub fn execute(
    manager: &mut EntityManager,
    world: &mut WorldInfo,
    source: CommandSource,
    line: &str,
) -> Result<Option<String>, CommandError> {
    let line = line.trim();
    let (base, rest) = line.split_once(' ').unwrap_or((line, ""));
    let spec = COMMANDS
        .iter()
        .find(|c| c.base == base)
        .ok_or_else(|| CommandError::Unknown(base.to_string()))?;

    let issuer = resolve_issuer(manager, source)?;
    if spec.only_player && !issuer.is_player {
        return Err(CommandError::PlayerOnly);
    }
    if spec.op && !is_op(manager, source) {
        return Err(CommandError::PermissionDenied);
    }

    let args: Vec<&str> = rest.split_whitespace().collect();
    let mut rng = rand::rng();
    match spec.base {
        "summon" => summon(manager, &issuer, &args, spec, &mut rng),
        "summonMany" => summon_many(manager, &issuer, &args, spec, &mut rng),
        "pile" => pile(manager, &issuer, &args, spec, &mut rng),
        "attach" => attach(manager, &issuer, &args, spec),
        "gamemode" => gamemode(manager, &issuer, &args, spec),
        "difficulty" => difficulty(manager, world, &args, spec),
        "tell" => tell(manager, source, &issuer, rest, spec),
        _ => Err(CommandError::Unknown(base.to_string())),
    }
}

fn resolve_issuer(manager: &EntityManager, source: CommandSource) -> Result<Issuer, CommandError> {
    match source {
        CommandSource::Player(id) => {
            let entity = manager
                .registry()
                .get(id)
                .ok_or(EntityError::UnknownEntity(id))?;
            Ok(Issuer {
                scope: SelectorScope::of(entity),
                is_player: true,
            })
        }
        CommandSource::Console => Ok(Issuer {
            scope: SelectorScope {
                position: DVec3::ZERO,
                world: WorldId::default(),
                issuer: None,
            },
            is_player: false,
        }),
    }
}

fn is_op(manager: &EntityManager, source: CommandSource) -> bool {
    match source {
        CommandSource::Console => true,
        CommandSource::Player(id) => manager.registry().session(id).is_some_and(|s| s.op),
    }
}

fn ensure_capacity(manager: &EntityManager, needed: usize) -> Result<(), CommandError> {
    if manager.remaining_capacity() < needed {
        return Err(CommandError::User(TOO_MANY.to_string()));
    }
    Ok(())
}

/// Velocity that throws a summoned entity up and to a random side.
fn random_velocity(rng: &mut impl Rng) -> DVec3 {
    DVec3::new(
        (rng.random::<f64>() - 0.5) * 10.0,
        rng.random::<f64>() * 10.0 + 10.0,
        (rng.random::<f64>() - 0.5) * 10.0,
    )
}

fn spawn(
    manager: &mut EntityManager,
    info: &EntityInfo,
    world: WorldId,
    position: DVec3,
    rng: &mut impl Rng,
) -> Result<EntityId, EntityError> {
    let velocity = random_velocity(rng);
    match info.kind {
        EntityKind::Object => manager.spawn_object(
            info.id,
            info.name,
            world,
            position,
            ObjectOptions {
                velocity,
                ..ObjectOptions::default()
            },
        ),
        _ => manager.spawn_mob(
            info.id,
            info.name,
            world,
            position,
            MobOptions {
                velocity,
                ..MobOptions::default()
            },
        ),
    }
}

fn summon(
    manager: &mut EntityManager,
    issuer: &Issuer,
    args: &[&str],
    spec: &CommandSpec,
    rng: &mut impl Rng,
) -> Result<Option<String>, CommandError> {
    let [name] = args else {
        return Err(CommandError::Usage(spec.usage));
    };
    ensure_capacity(manager, 1)?;
    let Some(info) = catalog::by_name(name) else {
        return Ok(Some(format!("No entity named {name}")));
    };
    spawn(manager, info, issuer.scope.world, issuer.scope.position, rng)?;
    Ok(None)
}

/// Grid offset of the `i`-th entity when `number` are summoned in rows of
/// `floor(sqrt(number))`, ten blocks apart.
fn grid_offset(i: usize, number: usize) -> DVec3 {
    let side = (number as f64).sqrt().floor().max(1.0);
    let i = i as f64;
    DVec3::new((i / side * 10.0).floor(), 0.0, (i % side) * 10.0)
}

fn summon_many(
    manager: &mut EntityManager,
    issuer: &Issuer,
    args: &[&str],
    spec: &CommandSpec,
    rng: &mut impl Rng,
) -> Result<Option<String>, CommandError> {
    let [number, name] = args else {
        return Err(CommandError::Usage(spec.usage));
    };
    let number: usize = number
        .parse()
        .map_err(|_| CommandError::Usage(spec.usage))?;
    ensure_capacity(manager, number)?;
    let Some(info) = catalog::by_name(name) else {
        return Ok(Some(format!("No entity named {name}")));
    };
    for i in 0..number {
        let position = issuer.scope.position + grid_offset(i, number);
        spawn(manager, info, issuer.scope.world, position, rng)?;
    }
    Ok(None)
}

fn pile(
    manager: &mut EntityManager,
    issuer: &Issuer,
    args: &[&str],
    spec: &CommandSpec,
    rng: &mut impl Rng,
) -> Result<Option<String>, CommandError> {
    if args.is_empty() {
        return Err(CommandError::Usage(spec.usage));
    }
    let types: Vec<&EntityInfo> = args.iter().filter_map(|name| catalog::by_name(name)).collect();
    ensure_capacity(manager, types.len())?;

    let mut below: Option<EntityId> = None;
    for info in types {
        let id = spawn(manager, info, issuer.scope.world, issuer.scope.position, rng)?;
        if let Some(carrier) = below {
            manager.attach(carrier, id, false)?;
        }
        below = Some(id);
    }
    Ok(None)
}

fn attach(
    manager: &mut EntityManager,
    issuer: &Issuer,
    args: &[&str],
    spec: &CommandSpec,
) -> Result<Option<String>, CommandError> {
    let [carrier, attached] = args else {
        return Err(CommandError::Usage(spec.usage));
    };
    let carrier = first_match(manager, carrier, &issuer.scope, "one carrier")?;
    let attached = first_match(manager, attached, &issuer.scope, "one attached")?;
    manager.attach(carrier, attached, false)?;
    Ok(None)
}

/// Players among the entities `selector` picks.
fn select_players(
    manager: &EntityManager,
    selector: &str,
    scope: &SelectorScope,
) -> Result<Vec<EntityId>, SelectError> {
    let ids = manager.select_entities(selector, scope)?;
    Ok(ids
        .into_iter()
        .filter(|id| manager.registry().session(*id).is_some())
        .collect())
}

fn gamemode(
    manager: &mut EntityManager,
    issuer: &Issuer,
    args: &[&str],
    spec: &CommandSpec,
) -> Result<Option<String>, CommandError> {
    let (mode, target) = match args {
        [mode] => (*mode, None),
        [mode, target] => (*mode, Some(*target)),
        _ => return Err(CommandError::Usage(spec.usage)),
    };
    let mode: GameMode = mode.parse().map_err(|_| {
        CommandError::User(format!(
            "The gamemode you have entered ({mode}) is not valid, it must be survival, creative, adventure, spectator, or a number from 0-3"
        ))
    })?;
    if target.is_none() && !issuer.is_player {
        return Err(CommandError::User("Console cannot set gamemode itself".to_string()));
    }

    let selector = target.unwrap_or("@s");
    let not_found = || CommandError::User(format!("Player '{selector}' not found"));
    let players = match select_players(manager, selector, &issuer.scope) {
        Ok(players) if !players.is_empty() => players,
        Ok(_) | Err(SelectError::NoMatch(_)) => return Err(not_found()),
        Err(err @ SelectError::Invalid(_)) => return Err(CommandError::User(err.to_string())),
    };

    for &id in &players {
        if let Some(session) = manager.session_mut(id) {
            session.previous_game_mode = session.game_mode;
            session.game_mode = mode;
            session.send(Record::GameModeChange {
                game_mode: mode.as_u8(),
            });
            tracing::info!("{} is now in {} mode", session.username, mode.name());
        }
    }

    let feedback = match players.as_slice() {
        [only] if issuer.scope.issuer == Some(*only) => {
            format!("Set own game mode to {} Mode", mode.name())
        }
        [_] => format!("Set {selector}'s game mode to {} Mode", mode.name()),
        many => format!("Set {} players' game mode to {} Mode", many.len(), mode.name()),
    };
    Ok(Some(feedback))
}

fn difficulty(
    manager: &EntityManager,
    world: &mut WorldInfo,
    args: &[&str],
    spec: &CommandSpec,
) -> Result<Option<String>, CommandError> {
    let [level] = args else {
        return Err(CommandError::Usage(spec.usage));
    };
    let level: u8 = level
        .parse()
        .ok()
        .filter(|level| *level <= 3)
        .ok_or(CommandError::Usage(spec.usage))?;

    world.difficulty = level;
    for (_, session) in manager.registry().players() {
        session.send(Record::Difficulty {
            difficulty: level,
            locked: false,
        });
    }
    tracing::info!("difficulty set to {level}");
    Ok(None)
}

fn tell(
    manager: &EntityManager,
    source: CommandSource,
    issuer: &Issuer,
    rest: &str,
    spec: &CommandSpec,
) -> Result<Option<String>, CommandError> {
    let Some((target, message)) = rest.trim().split_once(' ') else {
        return Err(CommandError::Usage(spec.usage));
    };
    let message = message.trim();
    if message.is_empty() {
        return Err(CommandError::Usage(spec.usage));
    }

    let players = select_players(manager, target, &issuer.scope).unwrap_or_default();
    if players.is_empty() {
        return Err(CommandError::User("Player not found".to_string()));
    }
    let sender = match source {
        CommandSource::Player(id) => manager
            .registry()
            .session(id)
            .map_or("server", |s| s.username.as_str()),
        CommandSource::Console => "server",
    };
    let text = format!("from {sender}: {message}");
    for id in players {
        manager.registry().deliver(
            id,
            [Record::SystemMessage {
                message: text.clone(),
            }],
        );
    }
    Ok(None)
}

fn first_match(
    manager: &EntityManager,
    selector: &str,
    scope: &SelectorScope,
    missing: &str,
) -> Result<EntityId, CommandError> {
    match manager.select_entities(selector, scope) {
        Ok(ids) => ids
            .first()
            .copied()
            .ok_or_else(|| CommandError::User(missing.to_string())),
        Err(SelectError::NoMatch(_)) => Err(CommandError::User(missing.to_string())),
        Err(err @ SelectError::Invalid(_)) => Err(CommandError::User(err.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinder_entity::{EntityLimits, InterestEngine, PlayerSession};
    use cinder_protocol::{Capabilities, MemoryConnection, ProtocolVersion, Record};
    use crossbeam_channel::Receiver;

    fn manager(max_entities: usize) -> EntityManager {
        EntityManager::new(
            EntityLimits {
                max_entities,
                view_distance: 150.0,
            },
            InterestEngine::default(),
            Capabilities::resolve(ProtocolVersion::new(1, 16, 5)),
        )
    }

    fn join(m: &mut EntityManager, name: &str, op: bool, at: DVec3) -> (EntityId, Receiver<Record>) {
        let (conn, rx) = MemoryConnection::pair();
        let mut session = PlayerSession::new(
            name,
            Box::new(conn),
            Capabilities::resolve(ProtocolVersion::new(1, 16, 5)),
        );
        session.op = op;
        let id = m.add_player(session, WorldId(0), at).unwrap();
        (id, rx)
    }

    fn run(
        m: &mut EntityManager,
        source: CommandSource,
        line: &str,
    ) -> Result<Option<String>, CommandError> {
        execute(m, &mut WorldInfo::default(), source, line)
    }

    fn mobs(m: &EntityManager) -> Vec<EntityId> {
        m.registry()
            .entities()
            .filter(|e| e.kind() == EntityKind::Mob)
            .map(|e| e.id())
            .collect()
    }

    #[test]
    fn test_summon_spawns_at_issuer() {
        let mut m = manager(10);
        let at = DVec3::new(4.0, 64.0, -2.0);
        let (p, rx) = join(&mut m, "alice", true, at);
        rx.try_iter().for_each(drop);

        assert_eq!(run(&mut m, CommandSource::Player(p), "summon minecraft:zombie"), Ok(None));
        let spawned = mobs(&m);
        assert_eq!(spawned.len(), 1);
        let zombie = m.registry().get(spawned[0]).unwrap();
        assert_eq!(zombie.position(), at);
        assert_eq!(zombie.name, "zombie");
        assert!(zombie.velocity.y >= 10.0);
        assert!(rx.try_iter().any(|r| matches!(r, Record::Spawn(_))));
    }

    #[test]
    fn test_summon_unknown_entity() {
        let mut m = manager(10);
        let (p, _rx) = join(&mut m, "alice", true, DVec3::ZERO);
        assert_eq!(
            run(&mut m, CommandSource::Player(p), "summon dragonfly"),
            Ok(Some("No entity named dragonfly".to_string()))
        );
        assert_eq!(m.registry().len(), 1);
    }

    #[test]
    fn test_summon_refused_at_ceiling() {
        let mut m = manager(2);
        let (p, _rx) = join(&mut m, "alice", true, DVec3::ZERO);
        assert_eq!(run(&mut m, CommandSource::Player(p), "summon pig"), Ok(None));
        let err = run(&mut m, CommandSource::Player(p), "summon pig").unwrap_err();
        assert_eq!(err.to_string(), "Too many mobs !");
        assert_eq!(m.registry().len(), 2);
    }

    #[test]
    fn test_summon_many_lays_out_grid() {
        let mut m = manager(10);
        let (p, _rx) = join(&mut m, "alice", true, DVec3::ZERO);
        assert_eq!(run(&mut m, CommandSource::Player(p), "summonMany 4 pig"), Ok(None));

        let mut positions: Vec<_> = mobs(&m)
            .into_iter()
            .map(|id| m.registry().get(id).unwrap().position())
            .collect();
        positions.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.z.total_cmp(&b.z)));
        assert_eq!(
            positions,
            vec![
                DVec3::new(0.0, 0.0, 0.0),
                DVec3::new(5.0, 0.0, 10.0),
                DVec3::new(10.0, 0.0, 0.0),
                DVec3::new(15.0, 0.0, 10.0),
            ]
        );
    }

    #[test]
    fn test_summon_many_checks_capacity_up_front() {
        let mut m = manager(4);
        let (p, _rx) = join(&mut m, "alice", true, DVec3::ZERO);
        let err = run(&mut m, CommandSource::Player(p), "summonMany 5 pig").unwrap_err();
        assert_eq!(err, CommandError::User("Too many mobs !".to_string()));
        assert!(mobs(&m).is_empty());

        assert_eq!(
            run(&mut m, CommandSource::Player(p), "summonMany lots pig"),
            Err(CommandError::Usage("/summonMany <number> <entity_name>"))
        );
    }

    #[test]
    fn test_pile_stacks_each_on_previous() {
        let mut m = manager(10);
        let (p, _rx) = join(&mut m, "alice", true, DVec3::ZERO);
        assert_eq!(
            run(&mut m, CommandSource::Player(p), "pile zombie unknown pig skeleton"),
            Ok(None)
        );

        let stack = mobs(&m);
        assert_eq!(stack.len(), 3);
        let mounts = m.mounts();
        assert_eq!(mounts.carrier_of(stack[0]), None);
        assert_eq!(mounts.carrier_of(stack[1]).map(|mt| mt.carrier), Some(stack[0]));
        assert_eq!(mounts.carrier_of(stack[2]).map(|mt| mt.carrier), Some(stack[1]));
    }

    #[test]
    fn test_attach_from_console_with_selectors() {
        let mut m = manager(10);
        let (alice, _ra) = join(&mut m, "alice", false, DVec3::ZERO);
        let (bob, _rb) = join(&mut m, "bob", false, DVec3::new(3.0, 0.0, 0.0));

        assert_eq!(run(&mut m, CommandSource::Console, "attach alice @p[name=bob]"), Ok(None));
        assert_eq!(m.mounts().carrier_of(bob).map(|mt| mt.carrier), Some(alice));

        assert_eq!(
            run(&mut m, CommandSource::Console, "attach alice nobody"),
            Err(CommandError::User("one attached".to_string()))
        );
        assert_eq!(
            run(&mut m, CommandSource::Console, "attach alice alice"),
            Err(CommandError::Entity(EntityError::SelfAttachment(alice)))
        );
    }

    #[test]
    fn test_permissions_and_sources() {
        let mut m = manager(10);
        let (p, _rx) = join(&mut m, "guest", false, DVec3::ZERO);
        assert_eq!(
            run(&mut m, CommandSource::Player(p), "summon pig"),
            Err(CommandError::PermissionDenied)
        );
        assert_eq!(
            run(&mut m, CommandSource::Console, "summon pig"),
            Err(CommandError::PlayerOnly)
        );
        assert_eq!(
            run(&mut m, CommandSource::Console, "fly"),
            Err(CommandError::Unknown("fly".to_string()))
        );
    }

    #[test]
    fn test_gamemode_for_self_and_others() {
        let mut m = manager(10);
        let (alice, rx) = join(&mut m, "alice", true, DVec3::ZERO);
        let (bob, _rb) = join(&mut m, "bob", false, DVec3::new(3.0, 0.0, 0.0));
        rx.try_iter().for_each(drop);

        assert_eq!(
            run(&mut m, CommandSource::Player(alice), "gamemode creative"),
            Ok(Some("Set own game mode to creative Mode".to_string()))
        );
        let session = m.registry().session(alice).unwrap();
        assert_eq!(session.game_mode, GameMode::Creative);
        assert_eq!(session.previous_game_mode, GameMode::Survival);
        assert_eq!(
            rx.try_iter().collect::<Vec<_>>(),
            vec![Record::GameModeChange { game_mode: 1 }]
        );

        assert_eq!(
            run(&mut m, CommandSource::Player(alice), "gamemode 3 bob"),
            Ok(Some("Set bob's game mode to spectator Mode".to_string()))
        );
        assert_eq!(run(&mut m, CommandSource::Console, "gamemode 1 bob").map(|_| ()), Ok(()));
        let session = m.registry().session(bob).unwrap();
        assert_eq!(session.game_mode, GameMode::Creative);
        assert_eq!(session.previous_game_mode, GameMode::Spectator);

        assert_eq!(
            run(&mut m, CommandSource::Console, "gamemode survival @a"),
            Ok(Some("Set 2 players' game mode to survival Mode".to_string()))
        );
    }

    #[test]
    fn test_gamemode_refusals() {
        let mut m = manager(10);
        let (alice, _ra) = join(&mut m, "alice", true, DVec3::ZERO);
        let (bob, _rb) = join(&mut m, "bob", false, DVec3::ZERO);

        let err = run(&mut m, CommandSource::Player(alice), "gamemode hardcore").unwrap_err();
        assert!(err.to_string().starts_with("The gamemode you have entered (hardcore) is not valid"));
        assert_eq!(
            run(&mut m, CommandSource::Console, "gamemode 1"),
            Err(CommandError::User("Console cannot set gamemode itself".to_string()))
        );
        assert_eq!(
            run(&mut m, CommandSource::Console, "gamemode 1 nobody"),
            Err(CommandError::User("Player 'nobody' not found".to_string()))
        );
        assert_eq!(
            run(&mut m, CommandSource::Player(bob), "gamemode 1"),
            Err(CommandError::PermissionDenied)
        );
        assert_eq!(
            run(&mut m, CommandSource::Player(alice), "gamemode"),
            Err(CommandError::Usage("/gamemode <mode> [player]"))
        );
        assert_eq!(m.registry().session(bob).unwrap().game_mode, GameMode::Survival);
    }

    #[test]
    fn test_difficulty_updates_world_and_clients() {
        let mut m = manager(10);
        let (alice, rx) = join(&mut m, "alice", false, DVec3::ZERO);
        rx.try_iter().for_each(drop);
        let mut world = WorldInfo::default();

        assert_eq!(execute(&mut m, &mut world, CommandSource::Console, "difficulty 3"), Ok(None));
        assert_eq!(world.difficulty, 3);
        assert_eq!(
            rx.try_iter().collect::<Vec<_>>(),
            vec![Record::Difficulty {
                difficulty: 3,
                locked: false
            }]
        );

        for bad in ["difficulty 4", "difficulty hard", "difficulty"] {
            assert_eq!(
                execute(&mut m, &mut world, CommandSource::Console, bad),
                Err(CommandError::Usage("/difficulty <difficulty>"))
            );
        }
        assert_eq!(world.difficulty, 3);

        crate::respawn::respawn(&mut m, &world, alice).unwrap();
        assert!(matches!(rx.try_iter().next(), Some(Record::Respawn(r)) if r.difficulty == 3));
    }

    #[test]
    fn test_tell_whispers_to_target_only() {
        let mut m = manager(10);
        let (alice, _ra) = join(&mut m, "alice", false, DVec3::ZERO);
        let (_bob, rb) = join(&mut m, "bob", false, DVec3::ZERO);
        let (_carol, rc) = join(&mut m, "carol", false, DVec3::ZERO);
        rb.try_iter().for_each(drop);
        rc.try_iter().for_each(drop);

        assert_eq!(run(&mut m, CommandSource::Player(alice), "tell bob hello  there"), Ok(None));
        assert_eq!(run(&mut m, CommandSource::Console, "tell bob hi"), Ok(None));
        assert_eq!(
            rb.try_iter().collect::<Vec<_>>(),
            vec![
                Record::SystemMessage {
                    message: "from alice: hello  there".to_string()
                },
                Record::SystemMessage {
                    message: "from server: hi".to_string()
                },
            ]
        );
        assert_eq!(rc.try_iter().count(), 0);

        assert_eq!(
            run(&mut m, CommandSource::Player(alice), "tell nobody hi"),
            Err(CommandError::User("Player not found".to_string()))
        );
        assert_eq!(
            run(&mut m, CommandSource::Player(alice), "tell bob"),
            Err(CommandError::Usage("/tell <player> <message>"))
        );
    }

    #[test]
    fn test_grid_offset_single_row() {
        assert_eq!(grid_offset(0, 1), DVec3::ZERO);
        assert_eq!(grid_offset(2, 3), DVec3::new(20.0, 0.0, 0.0));
    }
}
