//! Target selectors (`@a`, `@p[r=10]`, bare player names).

use std::collections::BTreeMap;

use glam::DVec3;
use rand::seq::SliceRandom;

use crate::{Entity, EntityId, EntityKind, EntityRegistry, SpatialQuery, WorldId};

/// Where a selector is evaluated from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectorScope {
    /// Origin for distance arguments and sorting.
    pub position: DVec3,
    /// World searched.
    pub world: WorldId,
    /// The entity issuing the selector, for `@s`. `None` for the console.
    pub issuer: Option<EntityId>,
}

impl SelectorScope {
    /// Scope of an entity issuing a command from where it stands.
    pub fn of(entity: &Entity) -> Self {
        Self {
            position: entity.position(),
            world: entity.world(),
            issuer: Some(entity.id()),
        }
    }
}

/// Why a selector produced no entities.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectError {
    /// The selector text is malformed.
    #[error("invalid selector {0:?}")]
    Invalid(String),
    /// The selector is well formed but matched nothing.
    #[error("no entity matches {0:?}")]
    NoMatch(String),
}

/// Strips a `minecraft:` namespace.
pub fn skip_mc_prefix(name: &str) -> &str {
    name.strip_prefix("minecraft:").unwrap_or(name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    AllPlayers,
    NearestPlayer,
    RandomPlayer,
    AllEntities,
    Issuer,
}

#[derive(Debug, Default)]
struct Arguments<'a> {
    radius: Option<f64>,
    min_radius: Option<f64>,
    count: Option<i64>,
    entity_type: Option<(bool, &'a str)>,
    name: Option<(bool, &'a str)>,
}

/// Resolves `selector` against the live entities.
///
/// An empty result is [`SelectError::NoMatch`]. Results are ordered
/// nearest first (ties by id), except `@r` which is shuffled.
pub fn select_entities(
    registry: &EntityRegistry,
    selector: &str,
    scope: &SelectorScope,
) -> Result<Vec<EntityId>, SelectError> {
    let selector = selector.trim();
    let invalid = || SelectError::Invalid(selector.to_string());
    let no_match = || SelectError::NoMatch(selector.to_string());

    let Some(rest) = selector.strip_prefix('@') else {
        if selector.is_empty() || selector.contains(char::is_whitespace) {
            return Err(invalid());
        }
        return registry
            .player_by_name(selector)
            .map(|id| vec![id])
            .ok_or_else(no_match);
    };

    let mut chars = rest.chars();
    let target = match chars.next() {
        Some('a') => Target::AllPlayers,
        Some('p') => Target::NearestPlayer,
        Some('r') => Target::RandomPlayer,
        Some('e') => Target::AllEntities,
        Some('s') => Target::Issuer,
        _ => return Err(invalid()),
    };
    let args = parse_arguments(chars.as_str()).ok_or_else(invalid)?;

    if target == Target::Issuer {
        let issuer = scope.issuer.and_then(|id| registry.get(id)).ok_or_else(no_match)?;
        return if matches(issuer, &args, scope) {
            Ok(vec![issuer.id()])
        } else {
            Err(no_match())
        };
    }

    let candidates: Vec<EntityId> = match args.radius {
        Some(radius) => registry.entities_within(scope.position, radius, scope.world),
        None => registry
            .entities()
            .filter(|e| e.world() == scope.world)
            .map(Entity::id)
            .collect(),
    };

    let players_only = target != Target::AllEntities;
    let mut found: Vec<(f64, EntityId)> = candidates
        .into_iter()
        .filter_map(|id| registry.get(id))
        .filter(|e| !players_only || e.kind() == EntityKind::Player)
        .filter(|e| matches(e, &args, scope))
        .map(|e| (e.position().distance(scope.position), e.id()))
        .collect();
    found.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    let mut ids: Vec<EntityId> = found.into_iter().map(|(_, id)| id).collect();

    if target == Target::RandomPlayer {
        ids.shuffle(&mut rand::rng());
    }
    let count = args.count.or(match target {
        Target::NearestPlayer | Target::RandomPlayer => Some(1),
        _ => None,
    });
    if let Some(count) = count {
        if count < 0 {
            ids.reverse();
        }
        ids.truncate(count.unsigned_abs() as usize);
    }

    if ids.is_empty() {
        Err(no_match())
    } else {
        Ok(ids)
    }
}

fn parse_arguments(text: &str) -> Option<Arguments<'_>> {
    if text.is_empty() {
        return Some(Arguments::default());
    }
    let inner = text.strip_prefix('[')?.strip_suffix(']')?;

    let mut pairs = BTreeMap::new();
    for pair in inner.split(',').filter(|p| !p.trim().is_empty()) {
        let (key, value) = pair.split_once('=')?;
        if pairs.insert(key.trim(), value.trim()).is_some() {
            return None;
        }
    }

    let mut args = Arguments::default();
    for (key, value) in pairs {
        match key {
            "r" => args.radius = Some(parse_radius(value)?),
            "rm" => args.min_radius = Some(parse_radius(value)?),
            "c" => args.count = Some(value.parse().ok()?),
            "type" => args.entity_type = Some(split_negation(value)),
            "name" => args.name = Some(split_negation(value)),
            _ => return None,
        }
    }
    Some(args)
}

fn parse_radius(value: &str) -> Option<f64> {
    value.parse().ok().filter(|r: &f64| r.is_finite() && *r >= 0.0)
}

fn split_negation(value: &str) -> (bool, &str) {
    match value.strip_prefix('!') {
        Some(rest) => (true, rest),
        None => (false, value),
    }
}

fn matches(entity: &Entity, args: &Arguments<'_>, scope: &SelectorScope) -> bool {
    let distance = entity.position().distance(scope.position);
    if args.radius.is_some_and(|r| distance > r) {
        return false;
    }
    if args.min_radius.is_some_and(|rm| distance < rm) {
        return false;
    }
    if let Some((negated, wanted)) = args.entity_type {
        let wanted = skip_mc_prefix(wanted);
        let is = match entity.kind() {
            EntityKind::Player => wanted == "player",
            _ => skip_mc_prefix(&entity.name) == wanted,
        };
        if is == negated {
            return false;
        }
    }
    if let Some((negated, wanted)) = args.name
        && (entity.name == wanted) == negated
    {
        return false;
    }
    true
}
