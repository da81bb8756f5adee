//! Spatial hash grid over live characters
//!
//! Rebuilt from the character arena at fixed points of the tick (after
//! respawns and after the deferred physics pass). Character positions only
//! change inside the deferred pass, so between rebuilds the grid is exact.
//! All query results are ordered by handle so iteration order never depends
//! on hash order.

use hashbrown::HashMap;
use rustc_hash::FxBuildHasher;
use smallvec::SmallVec;

use crate::game::state::CharacterHandle;
use crate::util::vec2::Vec2;

// ============================================================================
// Grid Constants
// ============================================================================

/// Cell size in world units, a few character diameters
pub const CHARACTER_GRID_CELL_SIZE: f32 = 128.0;

/// Initial capacity for the cell map
const GRID_INITIAL_CAPACITY: usize = 128;

/// Initial capacity for entries within a cell
const CELL_INITIAL_CAPACITY: usize = 4;

/// Grid cell key - (x, y) cell coordinates
pub type CellKey = (i32, i32);

/// Character data stored in the grid
#[derive(Debug, Clone, Copy)]
pub struct GridEntry {
    pub handle: CharacterHandle,
    pub position: Vec2,
    pub radius: f32,
}

/// Query results rarely exceed a handful of characters
pub type GridHits = SmallVec<[GridEntry; 16]>;

pub struct CharacterGrid {
    cell_size: f32,
    inv_cell_size: f32,
    cells: HashMap<CellKey, Vec<GridEntry>, FxBuildHasher>,
    /// Largest radius inserted since the last clear (query margin)
    max_radius: f32,
    len: usize,
}

impl Default for CharacterGrid {
    fn default() -> Self {
        Self::new(CHARACTER_GRID_CELL_SIZE)
    }
}

impl CharacterGrid {
    pub fn new(cell_size: f32) -> Self {
        Self {
            cell_size,
            inv_cell_size: 1.0 / cell_size,
            cells: HashMap::with_capacity_and_hasher(GRID_INITIAL_CAPACITY, FxBuildHasher),
            max_radius: 0.0,
            len: 0,
        }
    }

    /// Keep allocated cell vectors, drop their contents
    #[inline]
    pub fn clear(&mut self) {
        for cell in self.cells.values_mut() {
            cell.clear();
        }
        self.max_radius = 0.0;
        self.len = 0;
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    #[inline]
    fn position_to_cell(&self, position: Vec2) -> CellKey {
        (
            (position.x * self.inv_cell_size).floor() as i32,
            (position.y * self.inv_cell_size).floor() as i32,
        )
    }

    pub fn insert(&mut self, entry: GridEntry) {
        let key = self.position_to_cell(entry.position);
        self.cells
            .entry(key)
            .or_insert_with(|| Vec::with_capacity(CELL_INITIAL_CAPACITY))
            .push(entry);
        self.max_radius = self.max_radius.max(entry.radius);
        self.len += 1;
    }

    /// Visit every entry in cells overlapping the box `min..=max`
    fn for_each_in_box<F>(&self, min: Vec2, max: Vec2, mut f: F)
    where
        F: FnMut(&GridEntry),
    {
        let (x0, y0) = self.position_to_cell(min);
        let (x1, y1) = self.position_to_cell(max);
        for cy in y0..=y1 {
            for cx in x0..=x1 {
                if let Some(cell) = self.cells.get(&(cx, cy)) {
                    cell.iter().for_each(&mut f);
                }
            }
        }
    }

    /// Characters whose body overlaps the circle `(position, radius)`
    pub fn query_radius(&self, position: Vec2, radius: f32) -> GridHits {
        let reach = radius + self.max_radius;
        let margin = Vec2::new(reach, reach);
        let mut hits = GridHits::new();
        self.for_each_in_box(position - margin, position + margin, |e| {
            if e.position.distance_to(position) < radius + e.radius {
                hits.push(*e);
            }
        });
        hits.sort_unstable_by_key(|e| e.handle);
        hits
    }

    /// Closest character center within `radius`, ties broken by handle
    pub fn nearest(
        &self,
        position: Vec2,
        radius: f32,
        exclude: Option<CharacterHandle>,
    ) -> Option<GridEntry> {
        let margin = Vec2::new(radius, radius);
        let mut best: Option<(f32, GridEntry)> = None;
        self.for_each_in_box(position - margin, position + margin, |e| {
            if Some(e.handle) == exclude {
                return;
            }
            let d = e.position.distance_to(position);
            if d > radius {
                return;
            }
            let better = match &best {
                None => true,
                Some((bd, be)) => d < *bd || (d == *bd && e.handle < be.handle),
            };
            if better {
                best = Some((d, *e));
            }
        });
        best.map(|(_, e)| e)
    }

    /// Characters within `radius` (plus body radius) of the segment `a -> b`
    pub fn query_segment(&self, a: Vec2, b: Vec2, radius: f32) -> GridHits {
        let reach = radius + self.max_radius;
        let min = Vec2::new(a.x.min(b.x) - reach, a.y.min(b.y) - reach);
        let max = Vec2::new(a.x.max(b.x) + reach, a.y.max(b.y) + reach);
        let mut hits = GridHits::new();
        self.for_each_in_box(min, max, |e| {
            let closest = e.position.closest_on_segment(a, b);
            if closest.distance_to(e.position) < radius + e.radius {
                hits.push(*e);
            }
        });
        hits.sort_unstable_by_key(|e| e.handle);
        hits
    }
}
