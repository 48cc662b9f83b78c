//! Column-hashed spatial index for proximity queries.

use glam::DVec3;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::{EntityId, WorldId};

/// Default horizontal cell edge length in blocks.
pub const DEFAULT_CELL_SIZE: f64 = 32.0;

/// World proximity contract used by interest queries and selectors.
pub trait SpatialQuery {
    /// Ids of entities in `world` whose distance to `position` is at most
    /// `radius`, in ascending id order.
    fn entities_within(&self, position: DVec3, radius: f64, world: WorldId) -> Vec<EntityId>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CellKey {
    world: WorldId,
    x: i64,
    z: i64,
}

/// Buckets entities into vertical columns so a query touches only the
/// columns overlapping the query radius. Candidates still need an exact
/// distance check by the caller.
#[derive(Debug)]
pub struct SpatialGrid {
    cell_size: f64,
    cells: FxHashMap<CellKey, FxHashSet<EntityId>>,
    membership: FxHashMap<EntityId, CellKey>,
}

impl SpatialGrid {
    /// Creates a grid with the given column edge length.
    pub fn new(cell_size: f64) -> Self {
        Self {
            cell_size: cell_size.max(1.0),
            cells: FxHashMap::default(),
            membership: FxHashMap::default(),
        }
    }

    fn key(&self, world: WorldId, position: DVec3) -> CellKey {
        CellKey {
            world,
            x: (position.x / self.cell_size).floor() as i64,
            z: (position.z / self.cell_size).floor() as i64,
        }
    }

    /// Inserts or moves `id` to the column containing `position`.
    pub fn update(&mut self, id: EntityId, world: WorldId, position: DVec3) {
        let key = self.key(world, position);
        if let Some(old) = self.membership.insert(id, key) {
            if old == key {
                return;
            }
            self.detach(id, old);
        }
        self.cells.entry(key).or_default().insert(id);
    }

    /// Removes `id` from the index.
    pub fn remove(&mut self, id: EntityId) {
        if let Some(old) = self.membership.remove(&id) {
            self.detach(id, old);
        }
    }

    fn detach(&mut self, id: EntityId, key: CellKey) {
        if let Some(cell) = self.cells.get_mut(&key) {
            cell.remove(&id);
            if cell.is_empty() {
                self.cells.remove(&key);
            }
        }
    }

    /// Entities in columns overlapping the square of half-width `radius`
    /// around `position`.
    ///
    /// When the square spans more columns than there are indexed entities,
    /// every entity of `world` is returned instead of walking the columns.
    pub fn candidates(&self, world: WorldId, position: DVec3, radius: f64) -> Vec<EntityId> {
        let radius = radius.max(0.0);
        let min = self.key(world, position - DVec3::new(radius, 0.0, radius));
        let max = self.key(world, position + DVec3::new(radius, 0.0, radius));
        let span = (i128::from(max.x) - i128::from(min.x) + 1)
            .saturating_mul(i128::from(max.z) - i128::from(min.z) + 1);
        if !radius.is_finite() || span > self.membership.len() as i128 {
            return self
                .membership
                .iter()
                .filter(|(_, key)| key.world == world)
                .map(|(id, _)| *id)
                .collect();
        }
        let mut out = Vec::new();
        for x in min.x..=max.x {
            for z in min.z..=max.z {
                if let Some(cell) = self.cells.get(&CellKey { world, x, z }) {
                    out.extend(cell.iter().copied());
                }
            }
        }
        out
    }

    /// Number of indexed entities.
    pub fn len(&self) -> usize {
        self.membership.len()
    }

    /// Returns `true` if nothing is indexed.
    pub fn is_empty(&self) -> bool {
        self.membership.is_empty()
    }
}

impl Default for SpatialGrid {
    fn default() -> Self {
        Self::new(DEFAULT_CELL_SIZE)
    }
}
